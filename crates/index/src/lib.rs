pub mod cache;
pub mod embeddings;
pub mod engine;
pub mod output;
pub mod report_search;
pub mod workspace;

pub use cache::EmbeddingCache;
pub use embeddings::{Embedder, EmbeddingClient};
pub use engine::{ChunkingConfig, EngineSettings, prepare_workspace};
pub use output::{GraphOutput, GraphStats, GraphVisualization};
pub use report_search::CommunityReportSearch;
pub use workspace::WorkspaceRegistry;
