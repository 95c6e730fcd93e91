use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_PROVIDER: &str = "azure";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GROQ_EMBEDDING_MODEL: &str = "nomic-embed-text-v1.5";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt-4o";

/// Snapshot of the provider section of the configuration.
///
/// Every field is optional: absence is a data problem for whoever consumes
/// the value, never a reason to fail while reading configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub llm_provider: Option<String>,
    pub embedding_provider: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_embedding_model: Option<String>,

    pub groq_api_key: Option<String>,
    pub groq_model: Option<String>,
    pub groq_embedding_model: Option<String>,

    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_api_version: Option<String>,
    pub azure_openai_deployment_name: Option<String>,
    pub azure_openai_embedding_deployment: Option<String>,
}

/// Environment variable names, in the order they are reported.
pub const SETTING_KEYS: [&str; 14] = [
    "LLM_PROVIDER",
    "EMBEDDING_PROVIDER",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_MODEL",
    "OPENAI_EMBEDDING_MODEL",
    "GROQ_API_KEY",
    "GROQ_MODEL",
    "GROQ_EMBEDDING_MODEL",
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_API_VERSION",
    "AZURE_OPENAI_DEPLOYMENT_NAME",
    "AZURE_OPENAI_EMBEDDING_DEPLOYMENT",
];

const SENSITIVE_MARKERS: [&str; 2] = ["API_KEY", "PASSWORD"];

impl ProviderSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup, applying defaults for
    /// provider names and model identifiers.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).or_else(|| Some(default.to_string()));

        Self {
            llm_provider: or("LLM_PROVIDER", DEFAULT_PROVIDER),
            embedding_provider: or("EMBEDDING_PROVIDER", DEFAULT_PROVIDER),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            openai_model: or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            openai_embedding_model: or("OPENAI_EMBEDDING_MODEL", DEFAULT_OPENAI_EMBEDDING_MODEL),
            groq_api_key: get("GROQ_API_KEY"),
            groq_model: or("GROQ_MODEL", DEFAULT_GROQ_MODEL),
            groq_embedding_model: or("GROQ_EMBEDDING_MODEL", DEFAULT_GROQ_EMBEDDING_MODEL),
            azure_openai_endpoint: get("AZURE_OPENAI_ENDPOINT"),
            azure_openai_api_key: get("AZURE_OPENAI_API_KEY"),
            azure_openai_api_version: or("AZURE_OPENAI_API_VERSION", DEFAULT_AZURE_API_VERSION),
            azure_openai_deployment_name: or("AZURE_OPENAI_DEPLOYMENT_NAME", DEFAULT_AZURE_DEPLOYMENT),
            azure_openai_embedding_deployment: get("AZURE_OPENAI_EMBEDDING_DEPLOYMENT"),
        }
    }

    fn field(&self, key: &str) -> Option<&Option<String>> {
        let field = match key {
            "LLM_PROVIDER" => &self.llm_provider,
            "EMBEDDING_PROVIDER" => &self.embedding_provider,
            "OPENAI_API_KEY" => &self.openai_api_key,
            "OPENAI_BASE_URL" => &self.openai_base_url,
            "OPENAI_MODEL" => &self.openai_model,
            "OPENAI_EMBEDDING_MODEL" => &self.openai_embedding_model,
            "GROQ_API_KEY" => &self.groq_api_key,
            "GROQ_MODEL" => &self.groq_model,
            "GROQ_EMBEDDING_MODEL" => &self.groq_embedding_model,
            "AZURE_OPENAI_ENDPOINT" => &self.azure_openai_endpoint,
            "AZURE_OPENAI_API_KEY" => &self.azure_openai_api_key,
            "AZURE_OPENAI_API_VERSION" => &self.azure_openai_api_version,
            "AZURE_OPENAI_DEPLOYMENT_NAME" => &self.azure_openai_deployment_name,
            "AZURE_OPENAI_EMBEDDING_DEPLOYMENT" => &self.azure_openai_embedding_deployment,
            _ => return None,
        };
        Some(field)
    }

    /// Raw value for an environment-style key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.field(&key.to_uppercase())
            .and_then(|v| v.as_deref())
    }

    /// Build a new snapshot with `KEY=value` overrides applied on top of this
    /// one. Returns the snapshot plus the keys that were not recognised.
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> (Self, Vec<String>) {
        let mut unknown: Vec<String> = overrides
            .keys()
            .filter(|k| self.field(&k.to_uppercase()).is_none())
            .cloned()
            .collect();
        unknown.sort();

        let upper: HashMap<String, &String> = overrides
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();

        let updated = Self::from_lookup(|key| match upper.get(key) {
            Some(value) => Some((*value).clone()),
            None => self.get(key).map(str::to_string),
        });

        (updated, unknown)
    }

    /// Key/value view with credentials replaced by `***`.
    pub fn masked(&self) -> BTreeMap<String, String> {
        SETTING_KEYS
            .iter()
            .filter_map(|key| {
                let value = self.get(key)?;
                let shown = if is_sensitive(key) {
                    "***".to_string()
                } else {
                    value.to_string()
                };
                Some((key.to_string(), shown))
            })
            .collect()
    }
}

pub fn is_sensitive(key: &str) -> bool {
    let key = key.to_uppercase();
    SENSITIVE_MARKERS.iter().any(|marker| key.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied_when_unset() {
        let settings = ProviderSettings::from_lookup(lookup(&[]));

        assert_eq!(settings.llm_provider.as_deref(), Some("azure"));
        assert_eq!(settings.openai_model.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.azure_openai_api_version.as_deref(), Some("2024-02-01"));
        assert_eq!(settings.openai_api_key, None);
        assert_eq!(settings.azure_openai_embedding_deployment, None);
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let settings = ProviderSettings::from_lookup(lookup(&[
            ("OPENAI_BASE_URL", "   "),
            ("GROQ_MODEL", ""),
        ]));

        assert_eq!(settings.openai_base_url, None);
        assert_eq!(settings.groq_model.as_deref(), Some(DEFAULT_GROQ_MODEL));
    }

    #[test]
    fn test_overrides_keep_existing_values() {
        let base = ProviderSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-old")]));

        let mut overrides = HashMap::new();
        overrides.insert("llm_provider".to_string(), "openai".to_string());
        overrides.insert("NOT_A_SETTING".to_string(), "x".to_string());

        let (updated, unknown) = base.with_overrides(&overrides);

        assert_eq!(updated.llm_provider.as_deref(), Some("openai"));
        assert_eq!(updated.openai_api_key.as_deref(), Some("sk-old"));
        assert_eq!(unknown, vec!["NOT_A_SETTING".to_string()]);
    }

    #[test]
    fn test_masked_hides_credentials() {
        let settings = ProviderSettings::from_lookup(lookup(&[
            ("AZURE_OPENAI_API_KEY", "secret"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
        ]));

        let masked = settings.masked();

        assert_eq!(masked.get("AZURE_OPENAI_API_KEY").map(String::as_str), Some("***"));
        assert_eq!(
            masked.get("AZURE_OPENAI_ENDPOINT").map(String::as_str),
            Some("https://example.openai.azure.com")
        );
        assert!(!masked.contains_key("OPENAI_API_KEY"));
    }
}
