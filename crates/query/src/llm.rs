use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::provider::ProviderDescriptor;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One chat-style completion against a resolved provider.
#[async_trait]
pub trait ChatCompletionTransport: Send + Sync {
    async fn complete(
        &self,
        descriptor: &ProviderDescriptor,
        request: &CompletionRequest,
    ) -> Result<String>;

    /// Drop anything held for previously seen descriptors.
    fn reset(&self) {}
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// A constructed, read-only handle for one descriptor.
#[derive(Debug, Clone)]
pub struct Connection {
    pub client: reqwest::Client,
    pub url: String,
    auth: (&'static str, String),
}

impl Connection {
    /// Build a handle for `operation` (e.g. `chat/completions`, `embeddings`).
    pub fn open(descriptor: &ProviderDescriptor, operation: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: descriptor.request_url(operation),
            auth: descriptor.auth_header(),
        })
    }

    pub fn post(&self) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .header(self.auth.0, self.auth.1.as_str())
    }
}

/// OpenAI wire-format transport shared by the OpenAI, Azure and Groq kinds.
///
/// Connections are built by `connect` and cached per descriptor; a changed
/// descriptor (new key, new deployment) gets a fresh connection.
pub struct HttpChatTransport {
    timeout: Duration,
    connections: DashMap<ProviderDescriptor, Arc<Connection>>,
}

impl HttpChatTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            connections: DashMap::new(),
        }
    }

    pub fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }

    pub fn connect(&self, descriptor: &ProviderDescriptor) -> Result<Arc<Connection>> {
        if let Some(existing) = self.connections.get(descriptor) {
            return Ok(Arc::clone(existing.value()));
        }

        let connection = Arc::new(Connection::open(
            descriptor,
            "chat/completions",
            self.timeout,
        )?);

        tracing::info!(provider = %descriptor.describe(), "Connected chat transport");

        Ok(Arc::clone(
            self.connections
                .entry(descriptor.clone())
                .or_insert(connection)
                .value(),
        ))
    }

    pub fn cached_connections(&self) -> usize {
        self.connections.len()
    }
}

#[async_trait]
impl ChatCompletionTransport for HttpChatTransport {
    async fn complete(
        &self,
        descriptor: &ProviderDescriptor,
        request: &CompletionRequest,
    ) -> Result<String> {
        let connection = self.connect(descriptor)?;

        let body = ChatRequest {
            // Azure routes by deployment in the URL.
            model: match descriptor.kind {
                crate::provider::ProviderKind::AzureHosted => None,
                _ => Some(descriptor.model_or_deployment.as_str()),
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = connection
            .post()
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send chat request to {}", descriptor.kind))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Chat request failed ({}): {}", status, error_text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat completion response contained no message content")
    }

    fn reset(&self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;

    fn descriptor(credential: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::OpenAiCompatible,
            endpoint: Some("http://127.0.0.1:9/v1".to_string()),
            credential: credential.to_string(),
            model_or_deployment: "gpt-4o".to_string(),
            api_version: None,
        }
    }

    #[test]
    fn test_connect_caches_per_descriptor() {
        let transport = HttpChatTransport::default();

        let a = transport.connect(&descriptor("k1")).unwrap();
        let b = transport.connect(&descriptor("k1")).unwrap();
        let _c = transport.connect(&descriptor("k2")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.url, "http://127.0.0.1:9/v1/chat/completions");
        assert_eq!(transport.cached_connections(), 2);
    }

    #[test]
    fn test_reset_drops_cached_connections() {
        let transport = HttpChatTransport::default();
        let before = transport.connect(&descriptor("k1")).unwrap();

        transport.reset();
        assert_eq!(transport.cached_connections(), 0);

        let after = transport.connect(&descriptor("k1")).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(transport.cached_connections(), 1);
    }

    #[test]
    fn test_chat_request_omits_model_when_absent() {
        let body = ChatRequest {
            model: None,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.3,
            max_tokens: 10,
        };

        let json = serde_json::to_value(&body).unwrap();

        assert!(json.get("model").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 10);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let transport = HttpChatTransport::new(Duration::from_millis(500));
        let request = CompletionRequest {
            system_prompt: "s".to_string(),
            user_prompt: "u".to_string(),
            temperature: 0.3,
            max_tokens: 10,
        };

        let result = transport.complete(&descriptor("k"), &request).await;

        assert!(result.is_err());
    }
}
