//! Chat-completion endpoint client.
//!
//! Speaks the `{model, messages, max_tokens, temperature}` request shape
//! and expects `choices[0].message.content` back. Any deviation from that
//! shape is a per-unit parse failure, never a fatal error.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// Default endpoint when the caller does not configure one.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// One chat message on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: String) -> Self {
        Self {
            role: "system",
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

/// A fully-formed completion request for one work unit.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponseBody {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Boundary to the completion endpoint. Object-safe so the dispatcher can
/// run against a mock in tests.
pub trait CompletionClient: Send + Sync {
    /// Send one request and return the raw completion text.
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;
}

/// HTTP client for a hosted chat-completion endpoint.
pub struct HttpCompletionClient {
    endpoint: String,
    credential: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpCompletionClient {
    /// Create a client with an explicit endpoint and per-request timeout.
    pub fn new(endpoint: &str, credential: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
            client,
            timeout_secs,
        }
    }

    /// Client for the default hosted endpoint with a 30s timeout.
    pub fn default_hosted(credential: &str) -> Self {
        Self::new(DEFAULT_ENDPOINT, credential, 30)
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.credential)
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() {
                        CompletionError::Connection(self.endpoint.clone())
                    } else if e.is_timeout() {
                        CompletionError::Timeout {
                            secs: self.timeout_secs,
                        }
                    } else {
                        CompletionError::ResponseShape(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CompletionError::Endpoint {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: CompletionResponseBody = response
                .json()
                .await
                .map_err(|e| CompletionError::ResponseShape(e.to_string()))?;

            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| CompletionError::ResponseShape("empty choices array".into()))
        })
    }
}

/// Mock completion client for testing; returns a configurable response.
pub struct MockCompletionClient {
    response: String,
}

impl MockCompletionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

impl CompletionClient for MockCompletionClient {
    fn complete<'a>(
        &'a self,
        _request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        let response = self.response.clone();
        Box::pin(async move { Ok(response) })
    }
}
