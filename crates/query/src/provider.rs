use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{DEFAULT_AZURE_API_VERSION, DEFAULT_OPENAI_MODEL, ProviderSettings};
use crate::error::{QueryError, Result};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAiCompatible,
    AzureHosted,
    GroqCompatible,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai",
            Self::AzureHosted => "azure",
            Self::GroqCompatible => "groq",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAiCompatible),
            "azure" => Ok(Self::AzureHosted),
            "groq" => Ok(Self::GroqCompatible),
            _ => Err(QueryError::UnsupportedProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Generation,
    Embedding,
}

/// Fully resolved connection parameters for one role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    pub credential: String,
    /// Model name, or the deployment name for Azure.
    pub model_or_deployment: String,
    /// Present for Azure only.
    pub api_version: Option<String>,
}

impl ProviderDescriptor {
    /// Full URL for an OpenAI-style operation such as `chat/completions`.
    pub fn request_url(&self, operation: &str) -> String {
        match self.kind {
            ProviderKind::AzureHosted => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                self.endpoint.as_deref().unwrap_or_default().trim_end_matches('/'),
                self.model_or_deployment,
                operation,
                self.api_version.as_deref().unwrap_or(DEFAULT_AZURE_API_VERSION),
            ),
            ProviderKind::OpenAiCompatible | ProviderKind::GroqCompatible => format!(
                "{}/{}",
                self.endpoint
                    .as_deref()
                    .unwrap_or(OPENAI_BASE_URL)
                    .trim_end_matches('/'),
                operation,
            ),
        }
    }

    /// Header name and value carrying the credential.
    pub fn auth_header(&self) -> (&'static str, String) {
        match self.kind {
            ProviderKind::AzureHosted => ("api-key", self.credential.clone()),
            _ => ("Authorization", format!("Bearer {}", self.credential)),
        }
    }

    /// Label that is safe to log.
    pub fn describe(&self) -> String {
        format!("{}:{}", self.kind, self.model_or_deployment)
    }
}

/// Maps the configured provider names onto descriptors. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct ProviderResolver {
    settings: ProviderSettings,
    generation: std::result::Result<ProviderKind, String>,
    embedding: std::result::Result<ProviderKind, String>,
}

impl ProviderResolver {
    pub fn new(settings: ProviderSettings) -> Self {
        let generation = Self::select(settings.llm_provider.as_deref());
        let embedding = Self::select(settings.embedding_provider.as_deref());

        Self {
            settings,
            generation,
            embedding,
        }
    }

    fn select(name: Option<&str>) -> std::result::Result<ProviderKind, String> {
        let name = name.unwrap_or_default();
        name.parse::<ProviderKind>().map_err(|_| name.to_string())
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn kind(&self, role: Role) -> Result<ProviderKind> {
        let selection = match role {
            Role::Generation => &self.generation,
            Role::Embedding => &self.embedding,
        };
        selection
            .clone()
            .map_err(QueryError::UnsupportedProvider)
    }

    pub fn resolve(&self, role: Role) -> Result<ProviderDescriptor> {
        let kind = self.kind(role)?;
        let s = &self.settings;
        let text = |v: &Option<String>| v.clone().unwrap_or_default();

        let descriptor = match kind {
            ProviderKind::OpenAiCompatible => ProviderDescriptor {
                kind,
                endpoint: s.openai_base_url.clone(),
                credential: text(&s.openai_api_key),
                model_or_deployment: match role {
                    Role::Generation => s
                        .openai_model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    Role::Embedding => text(&s.openai_embedding_model),
                },
                api_version: None,
            },
            ProviderKind::AzureHosted => ProviderDescriptor {
                kind,
                endpoint: s.azure_openai_endpoint.clone(),
                credential: text(&s.azure_openai_api_key),
                // Azure invokes deployments, never bare model names.
                model_or_deployment: match role {
                    Role::Generation => text(&s.azure_openai_deployment_name),
                    Role::Embedding => text(&s.azure_openai_embedding_deployment),
                },
                api_version: Some(
                    s.azure_openai_api_version
                        .clone()
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                ),
            },
            ProviderKind::GroqCompatible => ProviderDescriptor {
                kind,
                endpoint: Some(GROQ_BASE_URL.to_string()),
                credential: text(&s.groq_api_key),
                model_or_deployment: match role {
                    Role::Generation => text(&s.groq_model),
                    Role::Embedding => text(&s.groq_embedding_model),
                },
                api_version: None,
            },
        };

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> ProviderSettings {
        ProviderSettings {
            llm_provider: Some(provider.to_string()),
            embedding_provider: Some(provider.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_provider_names() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAiCompatible);
        assert_eq!(" Azure ".parse::<ProviderKind>().unwrap(), ProviderKind::AzureHosted);
        assert_eq!("GROQ".parse::<ProviderKind>().unwrap(), ProviderKind::GroqCompatible);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_unsupported_provider_is_config_error() {
        let resolver = ProviderResolver::new(settings("ollama"));

        let err = resolver.resolve(Role::Generation).unwrap_err();

        assert!(matches!(err, QueryError::UnsupportedProvider(ref name) if name == "ollama"));
        assert!(err.is_config());
    }

    #[test]
    fn test_azure_uses_deployment_and_api_version() {
        let mut s = settings("azure");
        s.azure_openai_endpoint = Some("https://res.openai.azure.com/".to_string());
        s.azure_openai_api_key = Some("az-key".to_string());
        s.azure_openai_deployment_name = Some("prod-gpt4o".to_string());
        s.openai_model = Some("gpt-4o-mini".to_string());

        let d = ProviderResolver::new(s).resolve(Role::Generation).unwrap();

        assert_eq!(d.kind, ProviderKind::AzureHosted);
        assert_eq!(d.model_or_deployment, "prod-gpt4o");
        assert_eq!(d.api_version.as_deref(), Some(DEFAULT_AZURE_API_VERSION));
        assert_eq!(
            d.request_url("chat/completions"),
            "https://res.openai.azure.com/openai/deployments/prod-gpt4o/chat/completions?api-version=2024-02-01"
        );
        assert_eq!(d.auth_header(), ("api-key", "az-key".to_string()));
    }

    #[test]
    fn test_azure_without_deployment_still_resolves() {
        let d = ProviderResolver::new(settings("azure"))
            .resolve(Role::Generation)
            .unwrap();

        assert_eq!(d.model_or_deployment, "");
        assert!(d.api_version.is_some());
    }

    #[test]
    fn test_groq_endpoint_is_fixed() {
        let mut s = settings("groq");
        s.groq_model = Some("llama-3.3-70b-versatile".to_string());
        s.openai_base_url = Some("https://ignored.example".to_string());

        let d = ProviderResolver::new(s).resolve(Role::Generation).unwrap();

        assert_eq!(d.endpoint.as_deref(), Some(GROQ_BASE_URL));
        assert_eq!(d.api_version, None);
        assert_eq!(
            d.request_url("chat/completions"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_openai_defaults_model_and_endpoint() {
        let mut s = settings("openai");
        s.openai_api_key = Some("sk-test".to_string());

        let d = ProviderResolver::new(s).resolve(Role::Generation).unwrap();

        assert_eq!(d.model_or_deployment, DEFAULT_OPENAI_MODEL);
        assert_eq!(d.endpoint, None);
        assert_eq!(d.request_url("embeddings"), "https://api.openai.com/v1/embeddings");
        assert_eq!(d.auth_header(), ("Authorization", "Bearer sk-test".to_string()));
    }

    #[test]
    fn test_embedding_role_uses_embedding_fields() {
        let mut s = settings("azure");
        s.llm_provider = Some("openai".to_string());
        s.azure_openai_embedding_deployment = Some("embed-3-small".to_string());

        let resolver = ProviderResolver::new(s);

        assert_eq!(resolver.kind(Role::Generation).unwrap(), ProviderKind::OpenAiCompatible);
        let d = resolver.resolve(Role::Embedding).unwrap();
        assert_eq!(d.kind, ProviderKind::AzureHosted);
        assert_eq!(d.model_or_deployment, "embed-3-small");
    }
}
