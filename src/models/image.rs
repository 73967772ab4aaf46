use anyhow::{Context, Result};
use bytes::Bytes;
use camino::Utf8Path;
use serde::Serialize;

/// A user-selected file pending validation.
///
/// Holds the raw bytes together with the metadata the selection event carried.
/// Pixel dimensions are not known until [`crate::services::ImageValidator`]
/// has probed the data; they are reported in [`ImageInfo`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    file_name: String,
    declared_mime: String,
    bytes: Bytes,
}

impl ImageCandidate {
    pub fn new(
        file_name: impl Into<String>,
        declared_mime: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            declared_mime: declared_mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, declaring its MIME type from the extension.
    pub async fn from_path(path: &Utf8Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image file: {}", path))?;

        let file_name = path.file_name().unwrap_or(path.as_str()).to_string();
        let declared_mime = mime_for_extension(path.extension());

        tracing::debug!(
            "Loaded candidate {} ({} bytes, declared {})",
            file_name,
            bytes.len(),
            declared_mime
        );

        Ok(Self::new(file_name, declared_mime, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn declared_mime(&self) -> &str {
        &self.declared_mime
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Replace the declared MIME type with the one detected from the content.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = mime.into();
        self
    }
}

fn mime_for_extension(extension: Option<&str>) -> &'static str {
    extension
        .map(str::to_ascii_lowercase)
        .and_then(image::ImageFormat::from_extension)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// What validation learned about an accepted image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub file_name: String,
    /// MIME type of the decoded format, which wins over the declared one.
    pub mime: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
}
