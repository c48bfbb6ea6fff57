//! Chat client for OpenAI-compatible completion endpoints (Groq, OpenAI,
//! vLLM, any `/chat/completions` clone).
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{ChatClient, GenerationError};
use crate::config::GenerationConfig;

/// One provider attempt: an endpoint, a model, and a credential.
///
/// Each request carries its own timeout; when it fires, dropping the request
/// future aborts the in-flight HTTP call rather than abandoning it.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            temperature,
            max_tokens,
            timeout,
        }
    }

    /// Build the primary-attempt client from config.
    pub fn primary(config: &GenerationConfig, api_key: String) -> Self {
        Self::new(
            &config.base_url,
            &config.model,
            api_key,
            config.temperature,
            config.max_tokens,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Build the fallback-attempt client from config.
    ///
    /// The fallback gets its own full timeout, not whatever the primary
    /// attempt left over.
    pub fn fallback(config: &GenerationConfig, api_key: String) -> Self {
        Self::new(
            &config.base_url,
            &config.fallback_model,
            api_key,
            config.temperature,
            config.max_tokens,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> GenerationError {
        match status.as_u16() {
            401 | 403 => GenerationError::AuthFailed {
                model: self.model.clone(),
            },
            429 => {
                // Groq puts "try again in Xs" in the error message.
                let retry_after_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?.get("message")?.as_str().map(str::to_string)
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                GenerationError::RateLimited { retry_after_secs }
            }
            s if s >= 500 => GenerationError::Upstream {
                status: s,
                message: truncate_body(body),
            },
            s => GenerationError::Rejected {
                status: s,
                message: truncate_body(body),
            },
        }
    }

    fn parse_answer(body: &str) -> Result<String, GenerationError> {
        let json: Value =
            serde_json::from_str(body).map_err(|e| GenerationError::ResponseParse {
                message: format!("invalid JSON: {e}"),
            })?;

        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "no choices[0].message.content in response".to_string(),
            })?;

        Ok(content.to_string())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() > MAX {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}…", &body[..cut])
    } else {
        body.to_string()
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        debug!(url = %url, model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    GenerationError::Connection {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Connection {
                message: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(self.map_http_error(status, &text));
        }

        Self::parse_answer(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> OpenAiChatClient {
        OpenAiChatClient::new(
            "https://api.groq.com/openai/v1",
            "llama-3.1-8b-instant",
            "test-key",
            0.7,
            512,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_parse_answer() {
        let body = r#"{
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Rest and fluids help." },
                "finish_reason": "stop"
            }]
        }"#;
        assert_eq!(
            OpenAiChatClient::parse_answer(body).unwrap(),
            "Rest and fluids help."
        );
    }

    #[test]
    fn test_parse_answer_no_choices() {
        let err = OpenAiChatClient::parse_answer(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, GenerationError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_answer_invalid_json() {
        let err = OpenAiChatClient::parse_answer("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, GenerationError::ResponseParse { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_map_401_is_permanent_auth() {
        let client = test_client();
        let err = client.map_http_error(reqwest::StatusCode::UNAUTHORIZED, "unauthorized");
        assert!(matches!(err, GenerationError::AuthFailed { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_map_429_parses_retry_after() {
        let client = test_client();
        let err = client.map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached, please try again in 7s"}}"#,
        );
        assert!(matches!(
            err,
            GenerationError::RateLimited { retry_after_secs: 7 }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_map_429_default_retry_after() {
        let client = test_client();
        let err = client.map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(
            err,
            GenerationError::RateLimited { retry_after_secs: 5 }
        ));
    }

    #[test]
    fn test_map_500_is_transient_upstream() {
        let client = test_client();
        let err = client.map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, GenerationError::Upstream { status: 500, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_map_400_is_permanent_rejection() {
        let client = test_client();
        let err = client.map_http_error(reqwest::StatusCode::BAD_REQUEST, "malformed prompt");
        assert!(matches!(err, GenerationError::Rejected { status: 400, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_primary_and_fallback_models_from_config() {
        let mut config = GenerationConfig::default();
        config.fallback_model = "llama-3.3-70b-versatile".to_string();

        let primary = OpenAiChatClient::primary(&config, "key-a".to_string());
        let fallback = OpenAiChatClient::fallback(&config, "key-b".to_string());
        assert_eq!(primary.model(), "llama-3.1-8b-instant");
        assert_eq!(fallback.model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_truncate_body_multibyte_safe() {
        let long = "घ".repeat(400);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= 510);
    }
}
