use crate::models::{ImageCandidate, ImageInfo, ValidationSettings};
use crate::services::ValidationError;
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// Outcome of validating a candidate image
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Accepted(ImageInfo),
    Rejected(ValidationError),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Checks a candidate against size, format and dimension limits.
///
/// Checks run in order and stop at the first failure:
/// 1. byte size ≤ `max_file_size_bytes`
/// 2. decodable as one of `accepted_formats`
/// 3. both dimensions ≥ `min_dimension`
/// 4. both dimensions ≤ `max_dimension`
///
/// Dimensions come from the image header. Images whose header passes are then
/// fully decoded on the blocking pool to make sure the pixel data is intact;
/// the decoded buffer is dropped before `validate` returns.
#[derive(Debug, Clone)]
pub struct ImageValidator {
    settings: ValidationSettings,
    accepted: Vec<ImageFormat>,
}

impl ImageValidator {
    pub fn new(settings: ValidationSettings) -> Self {
        let accepted = settings
            .accepted_formats
            .iter()
            .filter_map(|name| ImageFormat::from_extension(name.to_ascii_lowercase()))
            .collect();

        Self { settings, accepted }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    pub async fn validate(&self, candidate: &ImageCandidate) -> ValidationResult {
        let settings = &self.settings;

        if candidate.byte_size() > settings.max_file_size_bytes {
            tracing::warn!(
                "Rejecting {}: {} bytes exceeds limit of {} bytes",
                candidate.file_name(),
                candidate.byte_size(),
                settings.max_file_size_bytes
            );
            return ValidationResult::Rejected(ValidationError::FileTooLarge {
                limit_bytes: settings.max_file_size_bytes,
            });
        }

        let Some((format, width, height)) = self.probe(candidate.bytes()) else {
            tracing::warn!("Rejecting {}: not a decodable image", candidate.file_name());
            return ValidationResult::Rejected(ValidationError::InvalidFormat);
        };

        if width < settings.min_dimension || height < settings.min_dimension {
            tracing::warn!(
                "Rejecting {}: {}x{} is below the {}px minimum",
                candidate.file_name(),
                width,
                height,
                settings.min_dimension
            );
            return ValidationResult::Rejected(ValidationError::TooSmall {
                min: settings.min_dimension,
            });
        }

        if width > settings.max_dimension || height > settings.max_dimension {
            tracing::warn!(
                "Rejecting {}: {}x{} is above the {}px maximum",
                candidate.file_name(),
                width,
                height,
                settings.max_dimension
            );
            return ValidationResult::Rejected(ValidationError::TooLarge {
                max: settings.max_dimension,
            });
        }

        if !Self::decodes(candidate.bytes().clone(), format).await {
            tracing::warn!("Rejecting {}: pixel data is corrupt", candidate.file_name());
            return ValidationResult::Rejected(ValidationError::InvalidFormat);
        }

        tracing::info!(
            "Accepted {} ({:?}, {}x{}, {} bytes)",
            candidate.file_name(),
            format,
            width,
            height,
            candidate.byte_size()
        );

        ValidationResult::Accepted(ImageInfo {
            file_name: candidate.file_name().to_string(),
            mime: format.to_mime_type().to_string(),
            byte_size: candidate.byte_size(),
            width,
            height,
        })
    }

    /// Read format and dimensions from the header only.
    fn probe(&self, bytes: &[u8]) -> Option<(ImageFormat, u32, u32)> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        let format = reader.format()?;
        if !self.accepted.contains(&format) {
            tracing::debug!("Format {:?} is not in the accepted list", format);
            return None;
        }
        let (width, height) = reader.into_dimensions().ok()?;
        Some((format, width, height))
    }

    async fn decodes(bytes: Bytes, format: ImageFormat) -> bool {
        let decoded = tokio::task::spawn_blocking(move || {
            let mut reader = ImageReader::new(Cursor::new(bytes.as_ref()));
            reader.set_format(format);
            reader.decode().map(|_| ())
        })
        .await;

        match decoded {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("Full decode failed: {}", e);
                false
            }
            Err(e) => {
                tracing::error!("Decode task failed: {}", e);
                false
            }
        }
    }
}
