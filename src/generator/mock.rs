//! Scriptable chat client for tests.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ChatClient, GenerationError};

/// A chat client that replays queued responses and counts its calls.
///
/// Responses are consumed front-to-back; the last dispensed response repeats
/// once the queue runs dry, so a single `with_ok` answers every call.
pub struct MockChatClient {
    model: String,
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    last_response: Mutex<Option<Result<String, GenerationError>>>,
    last_prompt: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockChatClient {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            responses: Mutex::new(VecDeque::new()),
            last_response: Mutex::new(None),
            last_prompt: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a successful answer.
    #[must_use]
    pub fn with_ok(self, answer: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(answer.into()));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_err(self, error: GenerationError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// How many times `complete` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt most recently passed to `complete`, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        let next = self.responses.lock().unwrap().pop_front();
        let mut last_response = self.last_response.lock().unwrap();
        match next {
            Some(response) => {
                *last_response = Some(response.clone());
                response
            }
            None => last_response.clone().unwrap_or_else(|| {
                Err(GenerationError::Connection {
                    message: "mock has no queued responses".to_string(),
                })
            }),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
