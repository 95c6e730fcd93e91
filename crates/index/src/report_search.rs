use anyhow::Result;
use async_trait::async_trait;
use query::{RetrievalFact, RetrievalProvider};
use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::embeddings::{Embedder, cosine_similarity};
use crate::output::{CommunityReport, GraphOutput};
use crate::workspace::WorkspaceRegistry;

const MAX_DESCRIPTION_CHARS: usize = 1000;

/// Retrieval over the community reports the graph engine exported for a
/// group, ranked by embedding similarity to the query.
pub struct CommunityReportSearch {
    registry: Arc<WorkspaceRegistry>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    default_group: String,
}

impl CommunityReportSearch {
    pub fn new(
        registry: Arc<WorkspaceRegistry>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        default_group: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            embedder,
            cache,
            default_group: default_group.into(),
        }
    }

    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.embedder.model();
        if let Some(hit) = self.cache.get(model, text) {
            return Ok(hit);
        }
        let embedding = self.embedder.embed(text).await?;
        self.cache.insert(model, text, embedding.clone());
        Ok(embedding)
    }

    fn to_fact(report: CommunityReport, score: f32) -> RetrievalFact {
        let description: String = report.summary.chars().take(MAX_DESCRIPTION_CHARS).collect();
        let source = if report.title.is_empty() {
            format!("Community {}", report.community)
        } else {
            report.title
        };

        RetrievalFact::new(description)
            .with_source(source)
            .with_entities(report.entities)
            .with_score(score.clamp(0.0, 1.0))
    }
}

#[async_trait]
impl RetrievalProvider for CommunityReportSearch {
    async fn search(
        &self,
        query: &str,
        group_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalFact>> {
        let group_id = group_id.unwrap_or(&self.default_group);

        // Step 1: Load community reports
        let reports = GraphOutput::new(&self.registry)
            .community_reports(group_id)
            .await?;
        if reports.is_empty() || top_k == 0 {
            tracing::debug!(group = group_id, "No community reports to search");
            return Ok(Vec::new());
        }
        let total_reports = reports.len();

        // Step 2: Embed the query
        let query_embedding = self.embedder.embed(query).await?;

        // Step 3: Score reports by similarity
        let mut scored = Vec::with_capacity(reports.len());
        for report in reports {
            let report_embedding = self.embed_cached(&report.summary).await?;
            let similarity = cosine_similarity(&query_embedding, &report_embedding);
            scored.push((report, similarity));
        }

        // Sort by relevance
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        // Step 4: Take top-k reports
        let facts: Vec<RetrievalFact> = scored
            .into_iter()
            .take(top_k)
            .map(|(report, score)| Self::to_fact(report, score))
            .collect();

        tracing::info!(
            group = group_id,
            searched = total_reports,
            returned = facts.len(),
            "Community report search complete"
        );

        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::COMMUNITY_REPORTS_FILE;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as keyword presence over a tiny vocabulary.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = text.to_lowercase();
            Ok(["paris", "berlin", "rust"]
                .iter()
                .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
                .collect())
        }

        fn model(&self) -> &str {
            "keyword"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("embedding endpoint returned 401")
        }

        fn model(&self) -> &str {
            "failing"
        }
    }

    async fn registry_with_reports(dir: &std::path::Path) -> Arc<WorkspaceRegistry> {
        let registry = WorkspaceRegistry::open(dir).await.unwrap();
        let path = registry.ensure_layout("geo").await.unwrap();
        let reports = json!([
            {"community": 0, "title": "German cities", "summary": "Berlin is the capital of Germany", "rank": 7.5, "entities": ["Berlin", "Germany"]},
            {"community": 1, "title": "French cities", "summary": "Paris is the capital of France", "rank": 8.0, "entities": ["Paris", "France"]},
            {"community": 2, "title": "", "summary": "Rust is a systems language", "entities": []}
        ]);
        std::fs::write(
            path.join("output").join(COMMUNITY_REPORTS_FILE),
            reports.to_string(),
        )
        .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_ranks_reports_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_reports(dir.path()).await;
        let search = CommunityReportSearch::new(
            registry,
            Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) }),
            Arc::new(EmbeddingCache::new(100)),
            "geo",
        );

        let facts = search.search("Tell me about Paris", None, 2).await.unwrap();

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].description, "Paris is the capital of France");
        assert_eq!(facts[0].source(), "French cities");
        assert_eq!(facts[0].related_entities, vec!["Paris", "France"]);
        assert!((facts[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_report_embeddings_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_reports(dir.path()).await;
        let embedder = Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) });
        let search = CommunityReportSearch::new(
            registry,
            embedder.clone(),
            Arc::new(EmbeddingCache::new(100)),
            "geo",
        );

        search.search("paris", Some("geo"), 3).await.unwrap();
        search.search("berlin", Some("geo"), 3).await.unwrap();

        // 3 reports once, plus one query embedding per search
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_untitled_report_uses_community_number() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_reports(dir.path()).await;
        let search = CommunityReportSearch::new(
            registry,
            Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) }),
            Arc::new(EmbeddingCache::new(100)),
            "geo",
        );

        let facts = search.search("rust", None, 1).await.unwrap();

        assert_eq!(facts[0].source(), "Community 2");
    }

    #[tokio::test]
    async fn test_unknown_group_returns_no_facts() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_reports(dir.path()).await;
        let search = CommunityReportSearch::new(
            registry,
            Arc::new(FailingEmbedder),
            Arc::new(EmbeddingCache::new(100)),
            "geo",
        );

        let facts = search.search("anything", Some("nobody"), 5).await.unwrap();

        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_a_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_reports(dir.path()).await;
        let search = CommunityReportSearch::new(
            registry,
            Arc::new(FailingEmbedder),
            Arc::new(EmbeddingCache::new(100)),
            "geo",
        );

        let err = search.search("paris", None, 5).await.unwrap_err();

        assert!(err.to_string().contains("401"));
    }
}
