use crate::models::{ClassificationResult, ImageInfo};
use crate::services::{ClassificationError, ValidationError};
use camino::Utf8PathBuf;

/// Top-level phase of the submission state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionPhase {
    #[default]
    Idle,
    HasImage,
    Submitting,
    Succeeded,
    Failed,
}

/// Where the current attempt is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Validating,
    Encoding,
    AwaitingServer,
    /// The last response was a 503; shown as "Starting server..."
    ServerWarming,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptState {
    /// 1-based number of the attempt in flight (or the last one made)
    pub attempt_number: u32,
    pub phase: AttemptPhase,
    pub last_error: Option<ClassificationError>,
}

impl AttemptState {
    pub fn first() -> Self {
        Self {
            attempt_number: 1,
            phase: AttemptPhase::Validating,
            last_error: None,
        }
    }
}

/// Read-only snapshot of everything the rendering layer needs.
///
/// This is the single source of truth for the controller's observable state.
/// It is owned by [`crate::state::StateManager`], which clones it out for
/// readers and re-emits it after every transition.
///
/// # Invariants
///
/// - `result` and `error` are never both set, and neither is set without `image`
/// - `progress_percent` only decreases when a submission starts, fails or is reset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubmissionState {
    pub phase: SubmissionPhase,

    /// Incremented on every selection, submission and reset; work started
    /// for an older id must not touch the state.
    pub submission_id: u64,

    // Selected image
    pub image: Option<ImageInfo>,
    pub preview_path: Option<Utf8PathBuf>,

    // Submission progress
    pub attempt: Option<AttemptState>,
    pub progress_percent: u8,

    // Outcome
    pub result: Option<ClassificationResult>,
    pub error: Option<ClassificationError>,

    /// Set by the first 503 of a submission and held until it ends, so the
    /// retried attempts keep the "Starting server..." label.
    pub server_warming: bool,

    /// Why the most recent selection was refused; the held image is unaffected
    pub rejection: Option<ValidationError>,

    /// Number of refused selections so far. Like `submission_id` it survives
    /// `clear`, so a repeated identical rejection is still a visible change.
    pub rejection_count: u64,
}

impl SubmissionState {
    pub fn attempt_number(&self) -> u32 {
        self.attempt.as_ref().map_or(0, |a| a.attempt_number)
    }

    pub fn is_submitting(&self) -> bool {
        self.phase == SubmissionPhase::Submitting
    }

    /// True from the first 503 of a submission until it ends.
    pub fn is_server_warming(&self) -> bool {
        self.is_submitting() && self.server_warming
    }

    /// Check the image/result/error invariant.
    pub fn is_consistent(&self) -> bool {
        let outcome_ok = !(self.result.is_some() && self.error.is_some());
        let requires_image = (self.result.is_none() && self.error.is_none()) || self.image.is_some();
        let phase_ok = match self.phase {
            SubmissionPhase::Idle => self.image.is_none(),
            SubmissionPhase::Succeeded => self.result.is_some(),
            SubmissionPhase::Failed => self.error.is_some(),
            SubmissionPhase::HasImage | SubmissionPhase::Submitting => self.image.is_some(),
        };
        outcome_ok && requires_image && phase_ok
    }

    /// Label for the busy indicator while submitting.
    pub fn activity_label(&self) -> &'static str {
        if self.is_server_warming() {
            "Starting server..."
        } else {
            "Analyzing image..."
        }
    }

    /// Forget the image and everything derived from it.
    pub fn clear(&mut self) {
        self.phase = SubmissionPhase::Idle;
        self.image = None;
        self.preview_path = None;
        self.attempt = None;
        self.progress_percent = 0;
        self.result = None;
        self.error = None;
        self.server_warming = false;
        self.rejection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Prediction;

    fn image() -> ImageInfo {
        ImageInfo {
            file_name: "scan.jpg".to_string(),
            mime: "image/jpeg".to_string(),
            byte_size: 1024,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn test_default_state() {
        let state = SubmissionState::default();
        assert_eq!(state.phase, SubmissionPhase::Idle);
        assert_eq!(state.attempt_number(), 0);
        assert_eq!(state.progress_percent, 0);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_result_and_error_are_exclusive() {
        let mut state = SubmissionState {
            phase: SubmissionPhase::Succeeded,
            image: Some(image()),
            result: Some(ClassificationResult::new(vec![Prediction::new("Caries", 0.9)])),
            ..Default::default()
        };
        assert!(state.is_consistent());

        state.error = Some(ClassificationError::ServiceWarming);
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_outcome_requires_image() {
        let state = SubmissionState {
            phase: SubmissionPhase::Failed,
            error: Some(ClassificationError::PayloadTooLarge),
            ..Default::default()
        };
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_rejection_while_idle_is_consistent() {
        let state = SubmissionState {
            rejection: Some(ValidationError::InvalidFormat),
            ..Default::default()
        };
        assert!(state.is_consistent());
    }

    #[test]
    fn test_warming_label() {
        let mut state = SubmissionState {
            phase: SubmissionPhase::Submitting,
            image: Some(image()),
            attempt: Some(AttemptState::first()),
            ..Default::default()
        };
        assert_eq!(state.activity_label(), "Analyzing image...");

        state.server_warming = true;
        assert!(state.is_server_warming());
        assert_eq!(state.activity_label(), "Starting server...");

        // A later attempt of the same submission keeps the label
        state.attempt = Some(AttemptState {
            attempt_number: 2,
            phase: AttemptPhase::AwaitingServer,
            last_error: Some(ClassificationError::ServiceWarming),
        });
        assert_eq!(state.activity_label(), "Starting server...");

        state.phase = SubmissionPhase::Failed;
        assert!(!state.is_server_warming());
    }

    #[test]
    fn test_clear_keeps_submission_id() {
        let mut state = SubmissionState {
            phase: SubmissionPhase::Succeeded,
            submission_id: 7,
            image: Some(image()),
            progress_percent: 100,
            result: Some(ClassificationResult::default()),
            ..Default::default()
        };

        state.rejection_count = 2;
        state.server_warming = true;

        state.clear();

        assert_eq!(state.submission_id, 7);
        assert_eq!(state.rejection_count, 2);
        assert!(!state.server_warming);
        assert_eq!(state.phase, SubmissionPhase::Idle);
        assert!(state.image.is_none());
        assert!(state.result.is_none());
        assert_eq!(state.progress_percent, 0);
    }
}
