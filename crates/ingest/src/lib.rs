//! Staging of uploaded documents into a group's engine workspace.

pub mod reader;

pub use reader::{ALLOWED_EXTENSIONS, DocumentReader};

use anyhow::Context;
use index::WorkspaceRegistry;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Empty upload")]
    EmptyUpload,

    #[error("Document contains no text")]
    EmptyDocument,

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Document is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error(transparent)]
    Workspace(#[from] anyhow::Error),
}

impl IngestError {
    /// True when the upload itself is at fault rather than the server.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Workspace(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagedDocument {
    pub document_id: String,
    pub group_id: String,
    pub filename: String,
    pub chars: usize,
    pub checksum: String,
    pub path: PathBuf,
}

/// `doc_` followed by 12 hex characters of a random UUID.
pub fn generate_document_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("doc_{}", &simple[..12])
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Validate an upload, extract its text and write it to `input/<id>.txt`
/// in the group's workspace.
pub async fn stage_document(
    registry: &WorkspaceRegistry,
    group_id: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<StagedDocument, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::EmptyUpload);
    }
    let text = DocumentReader::extract_text(filename, bytes)?;

    let workspace = registry.ensure_layout(group_id).await?;
    let document_id = generate_document_id();
    let path = workspace.join("input").join(format!("{}.txt", document_id));

    fs::write(&path, &text)
        .await
        .with_context(|| format!("Failed to stage document: {:?}", path))?;

    let staged = StagedDocument {
        document_id,
        group_id: group_id.to_string(),
        filename: filename.to_string(),
        chars: text.chars().count(),
        checksum: checksum(bytes),
        path,
    };

    tracing::info!(
        document_id = %staged.document_id,
        group = group_id,
        filename,
        chars = staged.chars,
        checksum = %staged.checksum,
        "Document staged"
    );

    Ok(staged)
}
