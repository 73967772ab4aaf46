use crate::models::ImageCandidate;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use tempfile::NamedTempFile;

/// Temporary on-disk copy of the accepted image for the renderer to display.
///
/// The file lives exactly as long as the handle. [`PreviewHandle::release`]
/// consumes the handle, so a preview cannot be released twice; dropping an
/// unreleased handle deletes the file as well.
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
    path: Utf8PathBuf,
}

impl PreviewHandle {
    /// Write the candidate's bytes to a fresh temporary file.
    pub fn create(candidate: &ImageCandidate) -> Result<Self> {
        let suffix = Utf8Path::new(candidate.file_name())
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix("dental-preview-")
            .suffix(&suffix)
            .tempfile()
            .context("Failed to create preview file")?;

        file.write_all(candidate.bytes())
            .context("Failed to write preview file")?;
        file.flush().context("Failed to flush preview file")?;

        let path = Utf8PathBuf::try_from(file.path().to_path_buf())
            .map_err(|e| anyhow!("Preview path is not valid UTF-8: {}", e))?;

        tracing::debug!("Created preview {}", path);

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Delete the preview file now, logging (not propagating) failures.
    pub fn release(self) {
        let path = self.path;
        match self.file.close() {
            Ok(()) => tracing::debug!("Released preview {}", path),
            Err(e) => tracing::warn!("Failed to remove preview {}: {}", path, e),
        }
    }
}
