// State management module
//
// StateManager wraps SubmissionState with thread-safe access using
// Arc<RwLock<T>>, emits change events and re-publishes the full snapshot
// after every transition.

use crate::models::{
    AttemptPhase, AttemptState, ClassificationResult, ImageInfo, SubmissionPhase, SubmissionState,
};
use crate::services::{ClassificationError, ErrorKind, ValidationError};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};

/// Change events emitted when state is modified
///
/// Fine-grained companions to the snapshot channel, for consumers that only
/// care about particular transitions.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    PhaseChanged {
        from: SubmissionPhase,
        to: SubmissionPhase,
    },

    /// A new image was accepted
    ImageSelected {
        file_name: String,
        width: u32,
        height: u32,
    },

    /// A selection was refused by validation
    SelectionRejected { reason: ValidationError },

    AttemptStarted { attempt_number: u32 },

    AttemptPhaseChanged {
        attempt_number: u32,
        phase: AttemptPhase,
    },

    ProgressUpdated { percent: u8 },

    ResultReady { prediction_count: usize },

    SubmissionFailed { kind: ErrorKind, message: String },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`SubmissionState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Publishes the whole snapshot on a watch channel after every change
/// - Drops mutations made on behalf of a submission that is no longer current
///
/// # Usage
///
/// - [`read()`](Self::read) for reading single fields
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`apply_for_submission()`](Self::apply_for_submission) for mutations from
///   an in-flight submission
/// - [`subscribe()`](Self::subscribe) / [`watch_snapshots()`](Self::watch_snapshots)
///   for listening
pub struct StateManager {
    state: Arc<RwLock<SubmissionState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,

    snapshot_tx: watch::Sender<SubmissionState>,
}

impl StateManager {
    /// Create a new StateManager with default state and a broadcast buffer of
    /// 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        let (snapshot_tx, _) = watch::channel(SubmissionState::default());
        Self {
            state: Arc::new(RwLock::new(SubmissionState::default())),
            state_tx,
            snapshot_tx,
        }
    }

    /// Clone of the current state, safe to hold without locks
    pub fn snapshot(&self) -> SubmissionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_submitting());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SubmissionState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed and emits events
    /// 4. Publishes the new snapshot if anything changed
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut SubmissionState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        self.publish(&old_state, &state)
    }

    /// Apply `update_fn` only if `submission_id` is still the current
    /// submission and it is still in flight.
    ///
    /// Returns `None` when the mutation was discarded.
    pub fn apply_for_submission<F>(
        &self,
        submission_id: u64,
        update_fn: F,
    ) -> Option<Vec<StateChange>>
    where
        F: FnOnce(&mut SubmissionState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.submission_id != submission_id || !state.is_submitting() {
            tracing::debug!(
                "Discarding update for stale submission {} (current {}, {:?})",
                submission_id,
                state.submission_id,
                state.phase
            );
            return None;
        }

        let old_state = state.clone();
        update_fn(&mut state);

        Some(self.publish(&old_state, &state))
    }

    /// Subscribe to fine-grained change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Receiver that always holds the latest snapshot
    pub fn watch_snapshots(&self) -> watch::Receiver<SubmissionState> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self, old: &SubmissionState, new: &SubmissionState) -> Vec<StateChange> {
        let changes = self.detect_changes(old, new);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        if old != new {
            self.snapshot_tx.send_replace(new.clone());
        }

        changes
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(&self, old: &SubmissionState, new: &SubmissionState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged {
                from: old.phase,
                to: new.phase,
            });
        }

        if let Some(image) = new.image.as_ref().filter(|_| old.image != new.image) {
            changes.push(StateChange::ImageSelected {
                file_name: image.file_name.clone(),
                width: image.width,
                height: image.height,
            });
        }

        if let Some(reason) = new
            .rejection
            .filter(|_| old.rejection_count != new.rejection_count)
        {
            changes.push(StateChange::SelectionRejected { reason });
        }

        match (&old.attempt, &new.attempt) {
            (_, Some(attempt)) if old.attempt_number() != attempt.attempt_number => {
                changes.push(StateChange::AttemptStarted {
                    attempt_number: attempt.attempt_number,
                });
            }
            (Some(before), Some(after)) if before.phase != after.phase => {
                changes.push(StateChange::AttemptPhaseChanged {
                    attempt_number: after.attempt_number,
                    phase: after.phase,
                });
            }
            _ => {}
        }

        if old.progress_percent != new.progress_percent {
            changes.push(StateChange::ProgressUpdated {
                percent: new.progress_percent,
            });
        }

        if let Some(result) = new.result.as_ref().filter(|_| old.result != new.result) {
            changes.push(StateChange::ResultReady {
                prediction_count: result.len(),
            });
        }

        if let Some(error) = new.error.as_ref().filter(|_| old.error != new.error) {
            changes.push(StateChange::SubmissionFailed {
                kind: error.kind(),
                message: error.user_message(),
            });
        }

        changes
    }

    // Convenience methods for common transitions

    /// Hold a newly accepted image; returns the new submission id.
    pub fn select_image(&self, image: ImageInfo, preview_path: Option<Utf8PathBuf>) -> u64 {
        let mut id = 0;
        self.update(|state| {
            state.clear();
            state.submission_id += 1;
            state.phase = SubmissionPhase::HasImage;
            state.image = Some(image);
            state.preview_path = preview_path;
            id = state.submission_id;
        });
        id
    }

    /// Record why a selection was refused, leaving everything else alone.
    ///
    /// Every call is a change, even when the reason repeats.
    pub fn reject_selection(&self, reason: ValidationError) -> Vec<StateChange> {
        self.update(|state| {
            state.rejection = Some(reason);
            state.rejection_count += 1;
        })
    }

    /// Enter Submitting with attempt 1; returns the new submission id.
    pub fn begin_submission(&self) -> u64 {
        let mut id = 0;
        self.update(|state| {
            state.submission_id += 1;
            state.phase = SubmissionPhase::Submitting;
            state.attempt = Some(AttemptState::first());
            state.progress_percent = 0;
            state.result = None;
            state.error = None;
            state.server_warming = false;
            state.rejection = None;
            id = state.submission_id;
        });
        id
    }

    pub fn set_attempt_phase(&self, submission_id: u64, phase: AttemptPhase) -> bool {
        self.apply_for_submission(submission_id, |state| {
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.phase = phase;
            }
        })
        .is_some()
    }

    pub fn start_attempt(&self, submission_id: u64, attempt_number: u32) -> bool {
        self.apply_for_submission(submission_id, |state| {
            let last_error = state.attempt.take().and_then(|a| a.last_error);
            state.attempt = Some(AttemptState {
                attempt_number,
                phase: AttemptPhase::AwaitingServer,
                last_error,
            });
        })
        .is_some()
    }

    /// Note a retryable failure of the current attempt.
    pub fn record_attempt_error(&self, submission_id: u64, error: ClassificationError) -> bool {
        self.apply_for_submission(submission_id, |state| {
            let warming = matches!(error, ClassificationError::ServiceWarming);
            state.server_warming |= warming;
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.phase = if warming {
                    AttemptPhase::ServerWarming
                } else {
                    AttemptPhase::Failed
                };
                attempt.last_error = Some(error);
            }
        })
        .is_some()
    }

    pub fn set_progress(&self, submission_id: u64, percent: u8) -> bool {
        self.apply_for_submission(submission_id, |state| {
            state.progress_percent = state.progress_percent.max(percent.min(100));
        })
        .is_some()
    }

    pub fn succeed(&self, submission_id: u64, result: ClassificationResult) -> bool {
        self.apply_for_submission(submission_id, |state| {
            state.phase = SubmissionPhase::Succeeded;
            state.progress_percent = 100;
            state.server_warming = false;
            state.error = None;
            state.result = Some(result);
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.phase = AttemptPhase::Succeeded;
            }
        })
        .is_some()
    }

    pub fn fail(&self, submission_id: u64, error: ClassificationError) -> bool {
        self.apply_for_submission(submission_id, |state| {
            state.phase = SubmissionPhase::Failed;
            state.progress_percent = 0;
            state.server_warming = false;
            state.result = None;
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.phase = AttemptPhase::Failed;
                attempt.last_error = Some(error.clone());
            }
            state.error = Some(error);
        })
        .is_some()
    }

    /// Return to Idle, invalidating any in-flight submission.
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.clear();
            state.submission_id += 1;
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and channels
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
            snapshot_tx: self.snapshot_tx.clone(),
        }
    }
}
