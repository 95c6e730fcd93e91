use std::path::Path;

use crate::IngestError;

/// Extensions accepted for upload, lower-case without the dot.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["txt", "md", "pdf", "docx"];

/// Extensions whose text can be extracted in-process.
const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

pub struct DocumentReader;

impl DocumentReader {
    pub fn extension(filename: &str) -> Option<String> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let extension = Self::extension(filename).unwrap_or_default();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(IngestError::UnsupportedFormat(format!(
                "'{}' (allowed: {})",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(IngestError::UnsupportedFormat(format!(
                "'{}' text extraction is not available",
                extension
            )));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| IngestError::InvalidEncoding(e.to_string()))?
            .trim_start_matches('\u{feff}')
            .to_string();

        if text.trim().is_empty() {
            return Err(IngestError::EmptyDocument);
        }
        Ok(text)
    }
}
