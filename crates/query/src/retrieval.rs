use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_SOURCE: &str = "Unknown source";

/// One unit of retrieved evidence. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalFact {
    pub description: String,
    #[serde(default)]
    pub entity_source: Option<String>,
    #[serde(default)]
    pub related_entities: Vec<String>,
    #[serde(default)]
    pub score: f32,
}

impl RetrievalFact {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            entity_source: None,
            related_entities: Vec::new(),
            score: 0.0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.entity_source = Some(source.into());
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn source(&self) -> &str {
        self.entity_source
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Knowledge-store lookup. "No results" is an empty vector, never an error.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        group_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalFact>>;
}
