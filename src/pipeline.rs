//! The orchestrator: question → retrieve → compose → generate → answer.
//!
//! [`Pipeline::answer_question`] is the only entry point the surrounding
//! application (auth, history store, UI) calls. It performs no writes of its
//! own, so any failure can simply propagate — there is nothing to roll back.
//! Dropping the returned future (for example under `tokio::time::timeout`)
//! aborts the in-flight provider call rather than leaking it.
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::embedder::Embedder;
use crate::generator::{GenerationError, Generator};
use crate::prompt::{Language, PromptComposer, Turn};
use crate::retriever::{RetrieveError, Retriever};

/// A component failure, tagged by the stage it came from.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("retrieval failed: {0}")]
    Retrieve(#[from] RetrieveError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("retrieval worker failed: {0}")]
    Worker(String),
}

/// Wires the retriever, the composer, and the generator together.
pub struct Pipeline<E: Embedder + 'static> {
    retriever: Arc<Retriever<E>>,
    composer: PromptComposer,
    generator: Generator,
    top_k: usize,
}

impl<E: Embedder + 'static> Pipeline<E> {
    #[must_use]
    pub fn new(
        retriever: Arc<Retriever<E>>,
        composer: PromptComposer,
        generator: Generator,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            composer,
            generator,
            top_k,
        }
    }

    /// Answer `question` grounded in the corpus, in `target_language`.
    ///
    /// `history` is the caller's ordered conversation so far; it is read,
    /// windowed into the prompt, and never mutated. Persisting the new
    /// question/answer pair is the caller's job.
    pub async fn answer_question(
        &self,
        question: &str,
        history: &[Turn],
        target_language: Language,
    ) -> Result<String, PipelineError> {
        let retriever = Arc::clone(&self.retriever);
        let query = question.to_string();
        let top_k = self.top_k;

        // Embedding and the SQLite scan both block; keep them off the
        // async executor.
        let retrieved = tokio::task::spawn_blocking(move || retriever.retrieve(&query, top_k))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;

        debug!(
            question_chars = question.len(),
            retrieved = retrieved.len(),
            language = %target_language,
            "Composing prompt"
        );
        let prompt = self
            .composer
            .compose(question, history, &retrieved, target_language);

        let answer = self.generator.generate(&prompt).await?;
        info!(
            retrieved = retrieved.len(),
            answer_chars = answer.len(),
            "Question answered"
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::generator::{ChatClient, MockChatClient};
    use crate::indexer::{Document, IndexBuilder};
    use tempfile::tempdir;

    async fn fever_pipeline(
        primary: MockChatClient,
        fallback: MockChatClient,
    ) -> (
        Pipeline<MockEmbedder>,
        Arc<MockChatClient>,
        Arc<MockChatClient>,
        tempfile::TempDir,
    ) {
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.db");
        let builder = IndexBuilder::new(Arc::new(MockEmbedder::new(64)), 500, 50).unwrap();
        builder
            .build(
                &[Document {
                    id: "fever.txt".to_string(),
                    text: "Paracetamol is commonly recommended for fever reduction.".to_string(),
                }],
                &out,
            )
            .await
            .unwrap();

        let retriever =
            Arc::new(Retriever::open(&out, Arc::new(MockEmbedder::new(64)), 2).unwrap());
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let generator = Generator::new(
            Arc::clone(&primary) as Arc<dyn ChatClient>,
            Arc::clone(&fallback) as Arc<dyn ChatClient>,
            4,
        );
        (
            Pipeline::new(retriever, PromptComposer::new(6), generator, 3),
            primary,
            fallback,
            dir,
        )
    }

    #[tokio::test]
    async fn test_answer_question_grounds_prompt() {
        let (pipeline, primary, _, _dir) = fever_pipeline(
            MockChatClient::new("primary").with_ok("Paracetamol can help; see a doctor if it persists."),
            MockChatClient::new("fallback"),
        )
        .await;
        let answer = pipeline
            .answer_question("What helps with fever?", &[], Language::English)
            .await
            .unwrap();

        assert_eq!(answer, "Paracetamol can help; see a doctor if it persists.");

        let prompt = primary.last_prompt().unwrap();
        let chunk = prompt
            .find("Paracetamol is commonly recommended for fever reduction.")
            .expect("retrieved chunk text appears verbatim");
        let question = prompt.find("What helps with fever?").unwrap();
        assert!(chunk < question, "grounding context precedes the question");
    }

    #[tokio::test]
    async fn test_answer_question_passes_history_window() {
        let (pipeline, primary, _, _dir) = fever_pipeline(
            MockChatClient::new("primary").with_ok("ok"),
            MockChatClient::new("fallback"),
        )
        .await;
        let history = vec![
            Turn::user("Mujhe kal se bukhar hai."),
            Turn::assistant("Aaram kijiye aur paani peejiye."),
        ];
        pipeline
            .answer_question("Kya dawa loon?", &history, Language::Hinglish)
            .await
            .unwrap();

        let prompt = primary.last_prompt().unwrap();
        assert!(prompt.contains("Mujhe kal se bukhar hai."));
        assert!(prompt.contains("Hinglish"));
    }

    #[tokio::test]
    async fn test_generation_error_propagates_tagged() {
        let (pipeline, _, fallback, _dir) = fever_pipeline(
            MockChatClient::new("primary").with_err(GenerationError::Rejected {
                status: 400,
                message: "rejected".to_string(),
            }),
            MockChatClient::new("fallback").with_ok("never used"),
        )
        .await;
        let err = pipeline
            .answer_question("What helps with fever?", &[], Language::English)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Generation(GenerationError::Rejected { .. })
        ));
        assert_eq!(fallback.calls(), 0);
    }
}
