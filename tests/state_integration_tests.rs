//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on transitions
//! - Publishes full snapshots to watchers
//! - Discards updates from superseded submissions, including across threads

use dental_classifier::models::{
    AttemptPhase, ClassificationResult, ImageInfo, Prediction, SubmissionPhase,
};
use dental_classifier::services::{ClassificationError, ErrorKind, ValidationError};
use dental_classifier::{StateChange, StateManager};
use std::sync::Arc;
use std::thread;
use tokio::time::{Duration, timeout};

fn image(name: &str) -> ImageInfo {
    ImageInfo {
        file_name: name.to_string(),
        mime: "image/png".to_string(),
        byte_size: 2048,
        width: 800,
        height: 600,
    }
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<StateChange>) -> StateChange {
    timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

#[tokio::test]
async fn test_selection_events_emitted() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.select_image(image("scan.png"), None);

    assert_eq!(
        next_event(&mut rx).await,
        StateChange::PhaseChanged {
            from: SubmissionPhase::Idle,
            to: SubmissionPhase::HasImage,
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        StateChange::ImageSelected {
            file_name: "scan.png".to_string(),
            width: 800,
            height: 600,
        }
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_rejection() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();

    state.reject_selection(ValidationError::TooSmall { min: 100 });

    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(
            next_event(rx).await,
            StateChange::SelectionRejected {
                reason: ValidationError::TooSmall { min: 100 },
            }
        );
    }
    assert_eq!(state.snapshot().phase, SubmissionPhase::Idle);
}

#[tokio::test]
async fn test_full_submission_lifecycle_events() {
    let state = StateManager::new();
    state.select_image(image("scan.png"), None);
    let mut rx = state.subscribe();

    let id = state.begin_submission();
    assert!(state.start_attempt(id, 1));
    assert!(state.record_attempt_error(id, ClassificationError::ServiceWarming));
    assert!(state.set_progress(id, 40));
    assert!(state.start_attempt(id, 2));
    assert!(state.succeed(id, ClassificationResult::new(vec![Prediction::new("Caries", 0.8)])));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(events.contains(&StateChange::AttemptPhaseChanged {
        attempt_number: 1,
        phase: AttemptPhase::ServerWarming,
    }));
    assert!(events.contains(&StateChange::AttemptStarted { attempt_number: 2 }));
    assert!(events.contains(&StateChange::ProgressUpdated { percent: 40 }));
    assert!(events.contains(&StateChange::ResultReady { prediction_count: 1 }));
    assert_eq!(
        events.last(),
        Some(&StateChange::ResultReady { prediction_count: 1 })
    );

    let snapshot = state.snapshot();
    assert_eq!(snapshot.phase, SubmissionPhase::Succeeded);
    assert_eq!(snapshot.progress_percent, 100);
    assert!(snapshot.is_consistent());
}

#[tokio::test]
async fn test_failure_event_carries_kind_and_message() {
    let state = StateManager::new();
    state.select_image(image("scan.png"), None);
    let id = state.begin_submission();
    let mut rx = state.subscribe();

    state.fail(id, ClassificationError::PayloadTooLarge);

    let mut failure = None;
    while let Ok(event) = rx.try_recv() {
        if let StateChange::SubmissionFailed { kind, message } = event {
            failure = Some((kind, message));
        }
    }
    let (kind, message) = failure.expect("no failure event");
    assert_eq!(kind, ErrorKind::PayloadTooLarge);
    assert!(!message.is_empty());
    assert_eq!(state.snapshot().progress_percent, 0);
}

#[tokio::test]
async fn test_watchers_see_latest_snapshot() {
    let state = StateManager::new();
    let mut watcher = state.watch_snapshots();

    state.select_image(image("a.png"), None);
    state.select_image(image("b.png"), None);

    timeout(Duration::from_millis(100), watcher.changed())
        .await
        .expect("Timeout waiting for snapshot")
        .expect("Sender dropped");

    let latest = watcher.borrow_and_update().clone();
    assert_eq!(latest.image.map(|i| i.file_name), Some("b.png".to_string()));
    assert_eq!(latest.submission_id, 2);
}

#[tokio::test]
async fn test_unchanged_update_publishes_nothing() {
    let state = StateManager::new();
    let watcher = state.watch_snapshots();
    let mut rx = state.subscribe();

    let changes = state.update(|_| {});

    assert!(changes.is_empty());
    assert!(rx.try_recv().is_err());
    assert!(!watcher.has_changed().unwrap());
}

#[test]
fn test_stale_updates_discarded_across_threads() {
    let state = Arc::new(StateManager::new());
    state.select_image(image("scan.png"), None);
    let stale_id = state.begin_submission();
    state.reset();
    state.select_image(image("next.png"), None);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let applied = [
                    state.set_progress(stale_id, 50 + i),
                    state.record_attempt_error(stale_id, ClassificationError::ServiceWarming),
                    state.succeed(stale_id, ClassificationResult::default()),
                    state.fail(stale_id, ClassificationError::ServiceWarming),
                ];
                applied.iter().any(|a| *a)
            })
        })
        .collect();

    for handle in handles {
        assert!(!handle.join().unwrap(), "stale update was applied");
    }

    let snapshot = state.snapshot();
    assert_eq!(snapshot.phase, SubmissionPhase::HasImage);
    assert_eq!(snapshot.image.map(|i| i.file_name), Some("next.png".to_string()));
    assert!(snapshot.result.is_none());
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.progress_percent, 0);
}

#[test]
fn test_concurrent_progress_is_monotonic() {
    let state = Arc::new(StateManager::new());
    state.select_image(image("scan.png"), None);
    let id = state.begin_submission();

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for step in 0..10u8 {
                    state.set_progress(id, i * 10 + step);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(state.snapshot().progress_percent, 79);
}

#[tokio::test]
async fn test_reset_emits_state_reset_last() {
    let state = StateManager::new();
    state.select_image(image("scan.png"), None);
    let mut rx = state.subscribe();

    let changes = state.reset();

    assert_eq!(changes.last(), Some(&StateChange::StateReset));
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert_eq!(last, Some(StateChange::StateReset));
    assert_eq!(state.snapshot().phase, SubmissionPhase::Idle);
}
