use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mediguide::config::Config;
use mediguide::embedder::download::download_model_files;
use mediguide::embedder::onnx::OnnxEmbedder;
use mediguide::generator::{ChatClient, Generator, OpenAiChatClient};
use mediguide::indexer::{IndexBuilder, load_documents, resolve_corpus_files};
use mediguide::pipeline::Pipeline;
use mediguide::prompt::{Language, PromptComposer};
use mediguide::retriever::Retriever;

#[derive(Parser)]
#[command(name = "mediguide", version, about = "Grounded medical Q&A over a local reference corpus")]
struct Cli {
    /// Path to the configuration file (default: mediguide.json).
    #[arg(short, long, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the embedding model files from HuggingFace.
    FetchModel,
    /// Build the index artifact from the configured corpus.
    Build,
    /// Ask a single question against the built index.
    Ask {
        /// The question text.
        question: Vec<String>,
        /// Answer language: english, hindi, or hinglish (default: detected
        /// from the question).
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Verify the index artifact matches the active embedder.
    Check,
}

fn parse_language(name: &str) -> Result<Language> {
    match name.to_lowercase().as_str() {
        "english" | "en" => Ok(Language::English),
        "hindi" | "hi" => Ok(Language::Hindi),
        "hinglish" => Ok(Language::Hinglish),
        other => bail!("unknown language '{other}' (expected english, hindi, or hinglish)"),
    }
}

fn load_embedder(config: &Config) -> Result<Arc<OnnxEmbedder>> {
    let embedder = OnnxEmbedder::new(Path::new(&config.model.dir))
        .context("failed to load embedding model (run `mediguide fetch-model` first)")?;
    Ok(Arc::new(embedder))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::FetchModel => {
            download_model_files(Path::new(&config.model.dir))?;
            println!("Model files ready in {}", config.model.dir);
        }

        Command::Build => {
            let files = resolve_corpus_files(&config.corpus_patterns)?;
            if files.is_empty() {
                bail!(
                    "no corpus files matched {:?}; check corpus_patterns in the config",
                    config.corpus_patterns
                );
            }
            let documents = load_documents(&files)?;

            let embedder = load_embedder(&config)?;
            let builder = IndexBuilder::new(embedder, config.chunk_size, config.chunk_overlap)?
                .with_concurrency(config.embed_workers, config.embed_batch_size);
            let report = builder.build(&documents, &config.index_path).await?;
            println!(
                "Indexed {} documents into {} chunks at {}",
                report.documents, report.chunks, config.index_path
            );
        }

        Command::Ask { question, language } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                bail!("no question given");
            }
            let target_language = match language {
                Some(name) => parse_language(&name)?,
                None => Language::detect(&question),
            };

            let embedder = load_embedder(&config)?;
            let retriever = Arc::new(Retriever::open(
                &config.index_path,
                embedder,
                config.read_pool_size,
            )?);

            let primary: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::primary(
                &config.generation,
                config.generation.primary_key()?,
            ));
            let fallback: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::fallback(
                &config.generation,
                config.generation.fallback_key()?,
            ));
            let generator = Generator::new(primary, fallback, config.generation.max_in_flight);

            let pipeline = Pipeline::new(
                retriever,
                PromptComposer::new(config.history_window),
                generator,
                config.top_k,
            );

            // Single-shot CLI call: no prior conversation. Applications keep
            // their own history store and pass the trailing turns here.
            let answer = pipeline
                .answer_question(&question, &[], target_language)
                .await?;
            println!("{answer}");
        }

        Command::Check => {
            let embedder = load_embedder(&config)?;
            let retriever = Retriever::open(&config.index_path, embedder, 1)?;
            let meta = retriever.meta()?;
            println!("Index artifact:   {}", config.index_path);
            println!(
                "Embedder:         {} ({} dims)",
                meta.embedder_id, meta.dimensions
            );
            println!(
                "Chunk policy:     size {} / overlap {}",
                meta.chunk_size, meta.chunk_overlap
            );
            println!("Built at:         {}", meta.built_at);
            println!("Index is compatible with the active embedder.");
        }
    }

    Ok(())
}
