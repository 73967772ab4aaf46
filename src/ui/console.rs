use crate::models::{SubmissionPhase, SubmissionState};
use crate::ui::Renderer;
use std::sync::{Mutex, PoisonError};

/// Renderer that prints transitions as plain lines on stdout.
///
/// Only what changed since the previous snapshot is printed, so progress
/// ticks produce one line per new percentage.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    last: Mutex<Option<SubmissionState>>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&self, state: &SubmissionState) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        for line in describe(last.as_ref(), state) {
            println!("{}", line);
        }
        *last = Some(state.clone());
    }

    fn on_unexpected_failure(&self, error: &anyhow::Error) {
        eprintln!("Something went wrong: {:#}", error);
    }
}

/// Lines describing the step from `previous` to `state`.
pub fn describe(previous: Option<&SubmissionState>, state: &SubmissionState) -> Vec<String> {
    let mut lines = Vec::new();
    let prev_phase = previous.map(|p| p.phase);

    let new_rejection = previous.is_none_or(|p| p.rejection_count != state.rejection_count);
    if let Some(reason) = state.rejection.filter(|_| new_rejection) {
        lines.push(format!("Rejected: {}", reason));
    }

    match state.phase {
        SubmissionPhase::Idle => {
            if prev_phase.is_some_and(|p| p != SubmissionPhase::Idle) {
                lines.push("Cleared".to_string());
            }
        }
        SubmissionPhase::HasImage => {
            let changed_image = previous.is_none_or(|p| p.image != state.image);
            if let Some(image) = state.image.as_ref().filter(|_| changed_image) {
                lines.push(format!(
                    "Selected {} ({}x{}, {:.1} KB)",
                    image.file_name,
                    image.width,
                    image.height,
                    image.byte_size as f64 / 1024.0
                ));
                if let Some(path) = &state.preview_path {
                    lines.push(format!("Preview: {}", path));
                }
            }
        }
        SubmissionPhase::Submitting => {
            let prev_attempt = previous.map_or(0, |p| p.attempt_number());
            let prev_warming = previous.is_some_and(|p| p.is_server_warming());
            if state.attempt_number() != prev_attempt || state.is_server_warming() != prev_warming {
                lines.push(format!(
                    "{} (attempt {})",
                    state.activity_label(),
                    state.attempt_number()
                ));
            }
            if let Some(error) = state.attempt.as_ref().and_then(|a| a.last_error.as_ref()) {
                let prev_error = previous
                    .and_then(|p| p.attempt.as_ref())
                    .and_then(|a| a.last_error.as_ref());
                if prev_error != Some(error) || prev_attempt != state.attempt_number() {
                    if let Some(hint) = error.hint() {
                        lines.push(hint.to_string());
                    }
                }
            }
            let prev_progress = previous
                .filter(|p| p.is_submitting())
                .map_or(0, |p| p.progress_percent);
            if state.progress_percent != prev_progress {
                lines.push(progress_bar(state.progress_percent));
            }
        }
        SubmissionPhase::Succeeded => {
            if prev_phase != Some(SubmissionPhase::Succeeded) {
                lines.push(progress_bar(100));
                if let Some(result) = &state.result {
                    lines.push("Analysis results:".to_string());
                    for prediction in result.predictions() {
                        lines.push(format!(
                            "  {:<24} {:>6}  ({:?})",
                            prediction.class_name,
                            prediction.percent_label(),
                            prediction.band()
                        ));
                    }
                }
            }
        }
        SubmissionPhase::Failed => {
            if prev_phase != Some(SubmissionPhase::Failed) {
                if let Some(error) = &state.error {
                    lines.push(format!("Error: {}", error.user_message()));
                    if let Some(hint) = error.hint() {
                        lines.push(hint.to_string());
                    }
                }
            }
        }
    }

    lines
}

fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) / 5;
    format!("[{}{}] {:>3}%", "#".repeat(filled), ".".repeat(20 - filled), percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptPhase, AttemptState, ClassificationResult, ImageInfo, Prediction};
    use crate::services::{ClassificationError, ValidationError};

    fn with_image(phase: SubmissionPhase) -> SubmissionState {
        SubmissionState {
            phase,
            image: Some(ImageInfo {
                file_name: "scan.jpg".to_string(),
                mime: "image/jpeg".to_string(),
                byte_size: 2048,
                width: 640,
                height: 480,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "[....................]   0%");
        assert_eq!(progress_bar(50), "[##########..........]  50%");
        assert_eq!(progress_bar(100), "[####################] 100%");
    }

    #[test]
    fn test_selection_lines() {
        let state = with_image(SubmissionPhase::HasImage);
        let lines = describe(None, &state);
        assert_eq!(lines, vec!["Selected scan.jpg (640x480, 2.0 KB)".to_string()]);

        // Same snapshot again prints nothing
        assert!(describe(Some(&state), &state).is_empty());
    }

    #[test]
    fn test_rejection_line() {
        let state = SubmissionState {
            rejection: Some(ValidationError::TooSmall { min: 100 }),
            rejection_count: 1,
            ..Default::default()
        };
        assert_eq!(
            describe(Some(&SubmissionState::default()), &state),
            vec!["Rejected: Image must be at least 100x100 pixels".to_string()]
        );

        // A second bad file with the same problem is reported again
        let again = SubmissionState {
            rejection_count: 2,
            ..state.clone()
        };
        assert_eq!(describe(Some(&state), &again).len(), 1);
        assert!(describe(Some(&again), &again).is_empty());
    }

    #[test]
    fn test_warming_lines() {
        let before = SubmissionState {
            attempt: Some(AttemptState::first()),
            ..with_image(SubmissionPhase::Submitting)
        };
        let after = SubmissionState {
            attempt: Some(AttemptState {
                attempt_number: 1,
                phase: AttemptPhase::ServerWarming,
                last_error: Some(ClassificationError::ServiceWarming),
            }),
            server_warming: true,
            ..with_image(SubmissionPhase::Submitting)
        };

        let lines = describe(Some(&before), &after);
        assert_eq!(lines[0], "Starting server... (attempt 1)");
        assert!(lines[1].contains("50 seconds"));

        let retried = SubmissionState {
            attempt: Some(AttemptState {
                attempt_number: 2,
                phase: AttemptPhase::AwaitingServer,
                last_error: Some(ClassificationError::ServiceWarming),
            }),
            ..after.clone()
        };
        let lines = describe(Some(&after), &retried);
        assert_eq!(lines[0], "Starting server... (attempt 2)");
    }

    #[test]
    fn test_result_lines() {
        let before = with_image(SubmissionPhase::Submitting);
        let after = SubmissionState {
            progress_percent: 100,
            result: Some(ClassificationResult::new(vec![
                Prediction::new("Caries", 0.92),
                Prediction::new("Healthy", 0.05),
            ])),
            ..with_image(SubmissionPhase::Succeeded)
        };

        let lines = describe(Some(&before), &after);
        assert_eq!(lines[1], "Analysis results:");
        assert!(lines[2].contains("Caries") && lines[2].contains("92.0%"));
        assert!(lines[3].contains("Healthy") && lines[3].contains("Low"));
    }

    #[test]
    fn test_failure_lines() {
        let after = SubmissionState {
            error: Some(ClassificationError::RetriesExhausted {
                attempts: 3,
                last: Box::new(ClassificationError::ServiceWarming),
            }),
            ..with_image(SubmissionPhase::Failed)
        };

        let lines = describe(Some(&with_image(SubmissionPhase::Submitting)), &after);
        assert_eq!(
            lines[0],
            "Error: Server is not responding after multiple attempts. Please try again later."
        );
        assert_eq!(lines.len(), 2);
    }
}
