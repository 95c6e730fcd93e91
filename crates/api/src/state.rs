//! Shared application state for the HTTP server

use index::{CommunityReportSearch, Embedder, EmbeddingCache, EmbeddingClient, WorkspaceRegistry};
use query::{
    AnswerPipeline, ChatCompletionTransport, HttpChatTransport, ProviderDescriptor,
    ProviderResolver, ProviderSettings, QueryError, Role,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::metrics::Metrics;

/// Builds the embedder for a resolved embedding descriptor.
pub type EmbedderFactory =
    Arc<dyn Fn(&ProviderDescriptor) -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync>;

/// Provider configuration and the pipeline built from it. Replaced as a
/// whole when the configuration changes; requests keep the one they started
/// with.
pub struct Snapshot {
    resolver: ProviderResolver,
    pipeline: Result<Arc<AnswerPipeline>, String>,
}

impl Snapshot {
    pub fn resolver(&self) -> &ProviderResolver {
        &self.resolver
    }

    pub fn settings(&self) -> &ProviderSettings {
        self.resolver.settings()
    }

    pub fn pipeline(&self) -> query::Result<Arc<AnswerPipeline>> {
        self.pipeline.clone().map_err(QueryError::Config)
    }
}

/// Long-lived pieces every snapshot is assembled from.
struct PipelineParts {
    registry: Arc<WorkspaceRegistry>,
    transport: Arc<dyn ChatCompletionTransport>,
    embedders: EmbedderFactory,
    embedding_cache: Arc<EmbeddingCache>,
    default_group: String,
    generation_timeout: Option<Duration>,
}

impl PipelineParts {
    fn build_snapshot(&self, settings: ProviderSettings) -> Snapshot {
        let resolver = ProviderResolver::new(settings);

        let pipeline = resolver
            .resolve(Role::Embedding)
            .map_err(|e| e.to_string())
            .and_then(|descriptor| {
                (self.embedders)(&descriptor)
                    .map_err(|e| format!("Failed to build embedding client: {e:#}"))
            })
            .map(|embedder| {
                let retriever = Arc::new(CommunityReportSearch::new(
                    Arc::clone(&self.registry),
                    embedder,
                    Arc::clone(&self.embedding_cache),
                    self.default_group.clone(),
                ));
                let pipeline =
                    AnswerPipeline::new(resolver.clone(), Arc::clone(&self.transport), retriever);
                Arc::new(match self.generation_timeout {
                    Some(limit) => pipeline.with_generation_timeout(limit),
                    None => pipeline,
                })
            });

        match &pipeline {
            Ok(_) => tracing::info!("Answer pipeline ready"),
            Err(message) => tracing::warn!(
                error = %message,
                "Answer pipeline unavailable until the provider configuration is fixed"
            ),
        }

        Snapshot { resolver, pipeline }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    parts: PipelineParts,
    snapshot: RwLock<Arc<Snapshot>>,
    metrics: Metrics,
}

impl AppState {
    /// Open the workspace root and wire the HTTP-backed providers.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let registry = WorkspaceRegistry::open(config.workspace.root.clone()).await?;
        let timeout = Duration::from_secs(config.timeouts.request_timeout_secs);

        let transport = Arc::new(HttpChatTransport::new(timeout));
        let embedders: EmbedderFactory = Arc::new(
            move |descriptor: &ProviderDescriptor| -> anyhow::Result<Arc<dyn Embedder>> {
                let client = EmbeddingClient::new(descriptor, timeout)?;
                Ok(Arc::new(client))
            },
        );

        Ok(Self::with_components(config, registry, transport, embedders))
    }

    pub fn with_components(
        config: AppConfig,
        registry: WorkspaceRegistry,
        transport: Arc<dyn ChatCompletionTransport>,
        embedders: EmbedderFactory,
    ) -> Self {
        let parts = PipelineParts {
            registry: Arc::new(registry),
            transport,
            embedders,
            embedding_cache: Arc::new(EmbeddingCache::new(config.cache.embedding_entries)),
            default_group: config.workspace.default_group_id.clone(),
            generation_timeout: match config.timeouts.generation_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        };
        let snapshot = parts.build_snapshot(config.providers.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                parts,
                snapshot: RwLock::new(Arc::new(snapshot)),
                metrics: Metrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.inner.parts.registry
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn embedding_cache(&self) -> &EmbeddingCache {
        &self.inner.parts.embedding_cache
    }

    /// `group_id` or the configured default, validated.
    pub fn group_or_default(&self, group_id: Option<&str>) -> Result<String, String> {
        let group_id = group_id
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(self.inner.config.workspace.default_group_id.as_str());
        index::workspace::validate_group_id(group_id).map_err(|e| e.to_string())?;
        Ok(group_id.to_string())
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.inner.snapshot.read().await)
    }

    /// Apply `KEY=value` overrides and swap in a freshly built snapshot.
    /// Returns the applied keys and the unrecognised ones, both sorted.
    pub async fn update_providers(
        &self,
        overrides: &HashMap<String, String>,
    ) -> (Vec<String>, Vec<String>) {
        let mut current = self.inner.snapshot.write().await;
        let (settings, unknown) = current.settings().with_overrides(overrides);

        let mut applied: Vec<String> = overrides
            .keys()
            .filter(|k| !unknown.contains(k))
            .map(|k| k.to_uppercase())
            .collect();
        applied.sort();

        if settings != *current.settings() {
            self.inner.parts.embedding_cache.clear();
            self.inner.parts.transport.reset();
            *current = Arc::new(self.inner.parts.build_snapshot(settings));
            tracing::info!(updated = applied.len(), "Provider configuration replaced");
        }

        (applied, unknown)
    }
}
