// Dental Classifier - submission client for a remote dental image classification service
//
// This is the library crate containing the submission pipeline and its state machine.
// The binary crate (main.rs) drives it from the command line with a console renderer.

pub mod config;
pub mod controller;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use controller::{ControllerError, SubmissionController, SubmissionOutcome};
pub use metrics::Metrics;
pub use models::{ClassifierConfig, ImageCandidate, SubmissionPhase, SubmissionState};
pub use services::{ClassificationError, Classifier, HttpClassifier, ValidationError};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
