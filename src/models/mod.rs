//! Data models for the classifier client.
//!
//! - [`SubmissionState`]: the snapshot the rendering layer draws from
//! - [`ClassifierConfig`]: endpoint, validation, retry, progress and logging settings
//! - [`ImageCandidate`] / [`ImageInfo`]: a selected file before and after validation
//! - [`PreviewHandle`]: the temporary preview file of the accepted image
//! - [`Prediction`] / [`ClassificationResult`]: what the service answered
//!
//! Mutations of [`SubmissionState`] go through
//! [`StateManager`](crate::state::StateManager) so every change is observed.

pub mod config;
pub mod image;
pub mod prediction;
pub mod preview;
pub mod submission_state;

pub use config::{
    ClassifierConfig, EndpointSettings, LoggingSettings, ProgressSettings, RetrySettings,
    TransportEncoding, ValidationSettings,
};
pub use image::{ImageCandidate, ImageInfo};
pub use prediction::{ClassificationResult, ConfidenceBand, Prediction};
pub use preview::PreviewHandle;
pub use submission_state::{AttemptPhase, AttemptState, SubmissionPhase, SubmissionState};
