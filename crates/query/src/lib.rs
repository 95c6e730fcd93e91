pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod retrieval;

pub use config::ProviderSettings;
pub use error::{QueryError, Result};
pub use llm::{ChatCompletionTransport, CompletionRequest, Connection, HttpChatTransport};
pub use pipeline::{Answer, AnswerPipeline, SourceRef, FALLBACK_ANSWER};
pub use provider::{ProviderDescriptor, ProviderKind, ProviderResolver, Role};
pub use retrieval::{RetrievalFact, RetrievalProvider};
