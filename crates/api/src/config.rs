use anyhow::{Context, Result};
use index::ChunkingConfig;
use query::ProviderSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub chunking: ChunkingConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub log_format: LogFormat,
    pub providers: ProviderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub default_group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per HTTP call to a provider.
    pub request_timeout_secs: u64,
    /// Upper bound on one answer generation; 0 disables it.
    pub generation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub embedding_entries: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_upload_bytes: 50 * 1024 * 1024,
            },
            workspace: WorkspaceConfig {
                root: PathBuf::from("./graphrag_workspaces"),
                default_group_id: "default_knowledge_graph".to_string(),
            },
            chunking: ChunkingConfig::default(),
            timeouts: TimeoutConfig {
                request_timeout_secs: 60,
                generation_timeout_secs: 120,
            },
            cache: CacheConfig {
                embedding_entries: 10000,
            },
            log_format: LogFormat::Text,
            providers: ProviderSettings::default(),
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            server: ServerConfig {
                host: parse(&lookup, "HOST", defaults.server.host)?,
                port: parse(&lookup, "PORT", defaults.server.port)?,
                max_upload_bytes: parse(&lookup, "MAX_UPLOAD_BYTES", defaults.server.max_upload_bytes)?,
            },
            workspace: WorkspaceConfig {
                root: parse(&lookup, "WORKSPACE_ROOT", defaults.workspace.root)?,
                default_group_id: parse(
                    &lookup,
                    "DEFAULT_GROUP_ID",
                    defaults.workspace.default_group_id,
                )?,
            },
            chunking: ChunkingConfig {
                size: parse(&lookup, "CHUNK_SIZE", defaults.chunking.size)?,
                overlap: parse(&lookup, "CHUNK_OVERLAP", defaults.chunking.overlap)?,
            },
            timeouts: TimeoutConfig {
                request_timeout_secs: parse(
                    &lookup,
                    "REQUEST_TIMEOUT_SECS",
                    defaults.timeouts.request_timeout_secs,
                )?,
                generation_timeout_secs: parse(
                    &lookup,
                    "GENERATION_TIMEOUT_SECS",
                    defaults.timeouts.generation_timeout_secs,
                )?,
            },
            cache: CacheConfig {
                embedding_entries: parse(
                    &lookup,
                    "EMBEDDING_CACHE_ENTRIES",
                    defaults.cache.embedding_entries,
                )?,
            },
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            providers: ProviderSettings::from_lookup(&lookup),
        };

        index::workspace::validate_group_id(&config.workspace.default_group_id)
            .context("Invalid DEFAULT_GROUP_ID")?;
        if config.chunking.overlap >= config.chunking.size {
            anyhow::bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                config.chunking.overlap,
                config.chunking.size
            );
        }

        Ok(config)
    }
}
