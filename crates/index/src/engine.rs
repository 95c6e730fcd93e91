//! Settings file handed to the external graph engine for a workspace.

use anyhow::{Context, Result};
use query::{ProviderDescriptor, ProviderKind, ProviderResolver, Role};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::workspace::WorkspaceRegistry;

pub const ENGINE_SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    #[serde(rename = "type")]
    pub model_type: String,
    pub model: String,
    /// Environment variable reference, never the secret itself.
    pub api_key: String,
    pub api_base: Option<String>,
    pub api_version: Option<String>,
    pub deployment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectorySettings {
    #[serde(rename = "type")]
    pub storage_type: String,
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    pub default_chat_model: ModelSettings,
    pub default_embedding_model: ModelSettings,
    pub input: DirectorySettings,
    pub chunks: ChunkingConfig,
    pub output: DirectorySettings,
    pub cache: DirectorySettings,
    pub reporting: DirectorySettings,
}

fn credential_env(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAiCompatible => "${OPENAI_API_KEY}",
        ProviderKind::AzureHosted => "${AZURE_OPENAI_API_KEY}",
        ProviderKind::GroqCompatible => "${GROQ_API_KEY}",
    }
}

fn model_settings(descriptor: &ProviderDescriptor, suffix: &str, max_tokens: Option<u32>) -> ModelSettings {
    let azure = descriptor.kind == ProviderKind::AzureHosted;
    ModelSettings {
        model_type: if azure {
            format!("azure_openai_{}", suffix)
        } else {
            format!("openai_{}", suffix)
        },
        model: descriptor.model_or_deployment.clone(),
        api_key: credential_env(descriptor.kind).to_string(),
        api_base: descriptor.endpoint.clone(),
        api_version: descriptor.api_version.clone(),
        deployment_name: azure.then(|| descriptor.model_or_deployment.clone()),
        max_tokens,
    }
}

fn directory(workspace: &Path, name: &str) -> DirectorySettings {
    DirectorySettings {
        storage_type: "file".to_string(),
        base_dir: workspace.join(name),
    }
}

impl EngineSettings {
    pub fn build(
        workspace: &Path,
        resolver: &ProviderResolver,
        chunks: ChunkingConfig,
    ) -> query::Result<Self> {
        let chat = resolver.resolve(Role::Generation)?;
        let embedding = resolver.resolve(Role::Embedding)?;

        Ok(Self {
            default_chat_model: model_settings(&chat, "chat", Some(2000)),
            default_embedding_model: model_settings(&embedding, "embedding", None),
            input: directory(workspace, "input"),
            chunks,
            output: directory(workspace, "output"),
            cache: directory(workspace, "cache"),
            reporting: directory(workspace, "reports"),
        })
    }
}

/// Lay out the group's workspace and (re)write its engine settings.
pub async fn prepare_workspace(
    registry: &WorkspaceRegistry,
    group_id: &str,
    resolver: &ProviderResolver,
    chunks: ChunkingConfig,
) -> Result<PathBuf> {
    let workspace = registry.ensure_layout(group_id).await?;
    let settings = EngineSettings::build(&workspace, resolver, chunks)?;

    let json = serde_json::to_string_pretty(&settings)?;
    let path = workspace.join(ENGINE_SETTINGS_FILE);
    fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write engine settings: {:?}", path))?;

    Ok(workspace)
}
