use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Reasons a candidate image is refused before anything touches the network
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Image must be at least {min}x{min} pixels")]
    TooSmall { min: u32 },

    #[error("Image must be at most {max}x{max} pixels")]
    TooLarge { max: u32 },

    #[error("Image size should be less than {}", size_label(.limit_bytes))]
    FileTooLarge { limit_bytes: u64 },

    #[error("Unsupported or unreadable image, please upload a JPEG or PNG file")]
    InvalidFormat,
}

/// Byte count as `5MB` / `5.5MB` (KB below one MiB), rounded down so the
/// label never overstates the limit.
fn size_label(bytes: &u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if *bytes < MIB {
        return format!("{}KB", bytes / 1024);
    }
    let tenths = bytes * 10 / MIB;
    if tenths % 10 == 0 {
        format!("{}MB", tenths / 10)
    } else {
        format!("{}.{}MB", tenths / 10, tenths % 10)
    }
}

/// Machine-readable error category handed to the rendering layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NetworkUnreachable,
    Timeout,
    ServiceWarming,
    PayloadTooLarge,
    Server,
    Parse,
    Encoding,
    RetriesExhausted,
}

/// Outcome of a failed classification attempt or submission.
///
/// The client only reports what happened on one attempt; whether a variant is
/// worth retrying is decided by [`crate::services::RetryPolicy`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service is warming up (HTTP 503)")]
    ServiceWarming,

    #[error("payload rejected as too large (HTTP 413)")]
    PayloadTooLarge,

    #[error("server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("malformed classification response: {0}")]
    Parse(String),

    #[error("failed to encode image: {0}")]
    Encoding(String),

    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClassificationError>,
    },
}

impl ClassificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NetworkUnreachable(_) => ErrorKind::NetworkUnreachable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::ServiceWarming => ErrorKind::ServiceWarming,
            Self::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            Self::Server { .. } => ErrorKind::Server,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
        }
    }

    /// Whether the failure belongs to a class that may clear up on its own
    /// (cold start, flaky network, slow response).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServiceWarming | Self::NetworkUnreachable(_) | Self::Timeout(_)
        )
    }

    /// Text shown in the error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) => reason.to_string(),
            Self::NetworkUnreachable(_) => {
                "Network error. Please check your connection.".to_string()
            }
            Self::Timeout(_) => {
                "The server took too long to respond. Please try again.".to_string()
            }
            Self::ServiceWarming => {
                "Server is starting up. Please wait a moment and try again.".to_string()
            }
            Self::PayloadTooLarge => {
                "The image is too large for the server to accept. Please choose a smaller file."
                    .to_string()
            }
            Self::Server { .. } => "Failed to classify image. Please try again.".to_string(),
            Self::Parse(_) => {
                "The server returned an unexpected response. Please try again later.".to_string()
            }
            Self::Encoding(_) => "Failed to process image.".to_string(),
            Self::RetriesExhausted { .. } => {
                "Server is not responding after multiple attempts. Please try again later."
                    .to_string()
            }
        }
    }

    /// Secondary line under the banner, if the error has one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ServiceWarming => Some(
                "This might take up to 50 seconds as the server needs to wake up from idle.",
            ),
            Self::RetriesExhausted { last, .. } if last.kind() == ErrorKind::ServiceWarming => {
                Some("The server may still be waking up; retrying in a minute usually works.")
            }
            _ => None,
        }
    }
}
