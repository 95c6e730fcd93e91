use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Failures that cross the answering boundary.
///
/// Generation failures are not in here: they are reported inside the
/// returned `Answer` instead of being raised.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unsupported provider: {0}. Supported: 'openai', 'azure', 'groq'")]
    UnsupportedProvider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Retrieval failed: {0:#}")]
    Retrieval(#[source] anyhow::Error),
}

impl QueryError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::UnsupportedProvider(_) | Self::Config(_))
    }
}
