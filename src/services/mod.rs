//! Services: the submission pipeline below the controller.
//!
//! Nothing here touches [`crate::state`]; each service is a plain value built
//! from its slice of [`crate::models::ClassifierConfig`].
//!
//! - [`ImageValidator`]: size, format and dimension checks before any upload
//! - [`ClassificationRequest`] / [`HttpClassifier`]: encoding plus one HTTP exchange,
//!   behind the [`Classifier`] trait
//! - [`RetryPolicy`]: which failures are retried and how long to wait
//! - [`ProgressEstimator`]: synthetic progress while a request is in flight
//! - [`ClassificationError`] / [`ValidationError`]: the error vocabulary shared by all of them

pub mod client;
pub mod error;
pub mod progress;
pub mod retry;
pub mod validator;

pub use client::{
    ClassificationRequest, Classifier, HttpClassifier, RequestPayload, parse_predictions,
};
pub use error::{ClassificationError, ErrorKind, ValidationError};
pub use progress::ProgressEstimator;
pub use retry::{RetryDecision, RetryPolicy};
pub use validator::{ImageValidator, ValidationResult};
