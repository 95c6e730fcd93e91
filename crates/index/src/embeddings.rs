use anyhow::{Context, Result};
use async_trait::async_trait;
use query::{Connection, ProviderDescriptor, ProviderKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier used to namespace cached vectors.
    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for the OpenAI-style `/embeddings` operation.
pub struct EmbeddingClient {
    connection: Connection,
    kind: ProviderKind,
    model: String,
}

impl EmbeddingClient {
    pub fn new(descriptor: &ProviderDescriptor, timeout: Duration) -> Result<Self> {
        let connection = Connection::open(descriptor, "embeddings", timeout)?;
        Ok(Self {
            connection,
            kind: descriptor.kind,
            model: descriptor.model_or_deployment.clone(),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: match self.kind {
                ProviderKind::AzureHosted => None,
                _ => Some(self.model.as_str()),
            },
            input: text,
        };

        let response = self
            .connection
            .post()
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("Embedding response contained no vectors")
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
