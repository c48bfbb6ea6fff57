//! Answer generation against an OpenAI-compatible chat provider.
//!
//! A [`Generator`] owns two [`ChatClient`]s: a primary and a fallback. Every
//! request goes to the primary first; a transient failure (timeout, rate
//! limit, server error) earns exactly one retry against the fallback, with a
//! fresh timeout of its own. Permanent failures (bad credentials, rejected
//! request) surface immediately — sending the same broken request to a second
//! provider cannot succeed.
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub mod mock;
pub mod openai;

pub use mock::MockChatClient;
pub use openai::OpenAiChatClient;

/// Errors from a provider attempt.
///
/// [`GenerationError::is_transient`] splits the taxonomy in two: transient
/// errors justify one fallback attempt, permanent errors do not.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider connection failed: {message}")]
    Connection { message: String },

    #[error("provider server error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("authentication failed for model {model}")]
    AuthFailed { model: String },

    #[error("could not parse provider response: {message}")]
    ResponseParse { message: String },

    #[error("generator is shutting down")]
    Closed,
}

impl GenerationError {
    /// Whether a second attempt against a different credential could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Timeout { .. }
            | GenerationError::RateLimited { .. }
            | GenerationError::Connection { .. }
            | GenerationError::Upstream { .. } => true,
            // A well-formed 200 that fails to parse is a provider quirk, not
            // a defect in the request; the fallback may answer cleanly.
            GenerationError::ResponseParse { .. } => true,
            GenerationError::Rejected { .. }
            | GenerationError::AuthFailed { .. }
            | GenerationError::Closed => false,
        }
    }
}

/// One chat-completion backend: a model plus a credential.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `prompt` as a single user message and return the answer text.
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Primary/fallback generation with a bounded number of in-flight calls.
pub struct Generator {
    primary: Arc<dyn ChatClient>,
    fallback: Arc<dyn ChatClient>,
    in_flight: Arc<Semaphore>,
}

impl Generator {
    /// `max_in_flight` bounds concurrent provider calls across all requests;
    /// it should be sized to the provider's rate limit.
    #[must_use]
    pub fn new(
        primary: Arc<dyn ChatClient>,
        fallback: Arc<dyn ChatClient>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Produce an answer for `prompt`.
    ///
    /// Attempts the primary once. On a transient failure the fallback gets
    /// one attempt of its own; its result, success or failure, is final. A
    /// permanent failure from the primary propagates without touching the
    /// fallback.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| GenerationError::Closed)?;

        debug!(model = self.primary.model(), "Calling primary provider");
        let primary_err = match self.primary.complete(prompt).await {
            Ok(answer) => return Ok(answer),
            Err(e) => e,
        };

        if !primary_err.is_transient() {
            return Err(primary_err);
        }

        warn!(
            model = self.primary.model(),
            error = %primary_err,
            "Primary provider failed transiently, trying fallback"
        );
        debug!(model = self.fallback.model(), "Calling fallback provider");
        self.fallback.complete(prompt).await
    }
}
