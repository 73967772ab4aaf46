// Submission controller
//
// Orchestrates the submission state machine:
// Idle -> HasImage -> Submitting -> {Succeeded | Failed}, with reset back to
// Idle from anywhere. All observable state lives in the StateManager; the
// controller only keeps the resources behind it (candidate bytes, preview
// file, cancellation sender).

use crate::metrics::Metrics;
use crate::models::{
    AttemptPhase, ClassificationResult, ClassifierConfig, ImageCandidate, PreviewHandle,
    ProgressSettings, SubmissionState,
};
use crate::services::{
    ClassificationError, ClassificationRequest, Classifier, ImageValidator, ProgressEstimator,
    RetryDecision, RetryPolicy, ValidationResult,
};
use crate::state::StateManager;
use camino::Utf8Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Commands refused because of the current phase
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    #[error("no image selected")]
    NoImage,

    #[error("a submission is already in progress")]
    Busy,
}

/// How a call to [`SubmissionController::submit`] ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Succeeded(ClassificationResult),
    Failed(ClassificationError),
    /// A reset arrived before the submission finished; nothing was recorded
    Cancelled,
}

enum AttemptOutcome {
    Completed(Result<ClassificationResult, ClassificationError>),
    Cancelled,
}

/// Resources owned on behalf of the current selection
#[derive(Default)]
struct Slot {
    candidate: Option<ImageCandidate>,
    preview: Option<PreviewHandle>,
    /// Submission id and its cancellation sender
    cancel: Option<(u64, watch::Sender<bool>)>,
}

/// The orchestrating state machine behind the rendering layer.
///
/// Every command takes `&self`, so one controller can be shared between the
/// task driving a submission and the input handlers that may reset it.
///
/// # Example
/// ```ignore
/// let classifier = HttpClassifier::new(&config.endpoint)?;
/// let controller = SubmissionController::new(
///     &config,
///     classifier,
///     Arc::new(StateManager::new()),
///     Arc::new(Metrics::new()),
/// );
///
/// controller.select_path(Utf8Path::new("scan.jpg")).await?;
/// match controller.submit().await? {
///     SubmissionOutcome::Succeeded(result) => println!("{:?}", result.top()),
///     other => println!("{:?}", other),
/// }
/// ```
pub struct SubmissionController<C: Classifier> {
    state: Arc<StateManager>,
    classifier: Arc<C>,
    validator: ImageValidator,
    retry: RetryPolicy,
    progress: ProgressSettings,
    metrics: Arc<Metrics>,
    slot: Mutex<Slot>,
}

impl<C: Classifier> SubmissionController<C> {
    pub fn new(
        config: &ClassifierConfig,
        classifier: C,
        state: Arc<StateManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            classifier: Arc::new(classifier),
            validator: ImageValidator::new(config.validation.clone()),
            retry: RetryPolicy::from(&config.retry),
            progress: config.progress.clone(),
            metrics,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn snapshot(&self) -> SubmissionState {
        self.state.snapshot()
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Validate `candidate` and, if accepted, make it the held image.
    ///
    /// A rejection leaves the held image (if any) untouched and records the
    /// reason in the snapshot.
    pub async fn select_file(
        &self,
        candidate: ImageCandidate,
    ) -> Result<ValidationResult, ControllerError> {
        if self.state.read(|s| s.is_submitting()) {
            tracing::warn!("Ignoring selection of {} while submitting", candidate.file_name());
            return Err(ControllerError::Busy);
        }

        let validation = self.validator.validate(&candidate).await;

        let info = match &validation {
            ValidationResult::Accepted(info) => info.clone(),
            ValidationResult::Rejected(reason) => {
                let _slot = self.lock_slot();
                if self.state.read(|s| s.is_submitting()) {
                    return Err(ControllerError::Busy);
                }
                self.metrics.record_rejection();
                self.state.reject_selection(*reason);
                return Ok(validation);
            }
        };

        let preview = match PreviewHandle::create(&candidate) {
            Ok(preview) => Some(preview),
            Err(e) => {
                tracing::warn!("Continuing without preview for {}: {:#}", info.file_name, e);
                None
            }
        };

        let mut slot = self.lock_slot();
        if self.state.read(|s| s.is_submitting()) {
            // The new preview is dropped (and deleted) with this scope
            return Err(ControllerError::Busy);
        }

        if let Some(previous) = slot.preview.take() {
            previous.release();
        }
        let preview_path = preview.as_ref().map(|p| p.path().to_path_buf());
        slot.preview = preview;
        slot.candidate = Some(candidate.with_mime(info.mime.clone()));

        let id = self.state.select_image(info.clone(), preview_path);
        tracing::info!(
            "Selected {} ({}x{}), submission id {}",
            info.file_name,
            info.width,
            info.height,
            id
        );

        Ok(validation)
    }

    /// Read a file from disk and select it.
    pub async fn select_path(&self, path: &Utf8Path) -> anyhow::Result<ValidationResult> {
        let candidate = ImageCandidate::from_path(path).await?;
        Ok(self.select_file(candidate).await?)
    }

    /// Classify the held image, retrying transient failures.
    ///
    /// Resolves once the submission succeeded, failed terminally or was
    /// cancelled by [`reset`](Self::reset).
    pub async fn submit(&self) -> Result<SubmissionOutcome, ControllerError> {
        let (id, candidate, mut cancel_rx) = {
            let mut slot = self.lock_slot();
            let (busy, has_image) = self.state.read(|s| (s.is_submitting(), s.image.is_some()));
            if busy {
                tracing::warn!("Submit ignored: a submission is already in flight");
                return Err(ControllerError::Busy);
            }
            let Some(candidate) = slot.candidate.clone().filter(|_| has_image) else {
                tracing::warn!("Submit ignored: no image selected");
                return Err(ControllerError::NoImage);
            };

            let (cancel_tx, cancel_rx) = watch::channel(false);
            let id = self.state.begin_submission();
            slot.cancel = Some((id, cancel_tx));
            (id, candidate, cancel_rx)
        };

        self.metrics.record_submission_started();
        tracing::info!("Submitting {} (submission {})", candidate.file_name(), id);

        let outcome = self.run_submission(id, &candidate, &mut cancel_rx).await;

        let mut slot = self.lock_slot();
        if slot.cancel.as_ref().is_some_and(|(owner, _)| *owner == id) {
            slot.cancel = None;
        }

        Ok(outcome)
    }

    /// Return to Idle from any phase, cancelling in-flight work.
    pub fn reset(&self) {
        let mut slot = self.lock_slot();

        self.state.reset();

        if let Some((id, cancel_tx)) = slot.cancel.take() {
            tracing::info!("Cancelling submission {}", id);
            let _ = cancel_tx.send(true);
        }
        if let Some(preview) = slot.preview.take() {
            preview.release();
        }
        slot.candidate = None;

        tracing::info!("Controller reset");
    }

    async fn run_submission(
        &self,
        id: u64,
        candidate: &ImageCandidate,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> SubmissionOutcome {
        let mut progress = ProgressEstimator::new(&self.progress);

        if !self.state.set_attempt_phase(id, AttemptPhase::Encoding) {
            return self.finish_cancelled(id);
        }
        let request = match ClassificationRequest::encode(candidate, self.classifier.encoding()) {
            Ok(request) => request,
            Err(e) => return self.finish_failed(id, e, &mut progress),
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            if !self.state.start_attempt(id, attempts) {
                return self.finish_cancelled(id);
            }
            self.metrics.record_attempt();
            tracing::info!(
                "Attempt {}/{} for submission {}",
                attempts,
                self.retry.max_attempts(),
                id
            );

            progress.begin_attempt();
            let started = Instant::now();
            let result = match self.run_attempt(id, &request, &mut progress, cancel_rx).await {
                AttemptOutcome::Completed(result) => result,
                AttemptOutcome::Cancelled => return self.finish_cancelled(id),
            };
            self.metrics.record_request_time(started.elapsed());

            let error = match result {
                Ok(result) => return self.finish_succeeded(id, result, &mut progress),
                Err(error) => error,
            };

            match self.retry.decide(error.clone(), attempts) {
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        "Attempt {} failed ({}), retrying in {}s",
                        attempts,
                        error,
                        delay.as_secs_f64()
                    );
                    self.metrics.record_retry();
                    if !self.state.record_attempt_error(id, error) {
                        return self.finish_cancelled(id);
                    }
                    if !wait_unless_cancelled(delay, cancel_rx).await {
                        return self.finish_cancelled(id);
                    }
                }
                RetryDecision::GiveUp(error) => {
                    return self.finish_failed(id, error, &mut progress);
                }
            }
        }
    }

    /// One exchange raced against cancellation, ticking progress meanwhile.
    ///
    /// The ticker is local to this future and is dropped on every exit.
    async fn run_attempt(
        &self,
        id: u64,
        request: &ClassificationRequest,
        progress: &mut ProgressEstimator,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> AttemptOutcome {
        let exchange = self.classifier.classify(request);
        tokio::pin!(exchange);

        let period = progress.tick_interval().max(Duration::from_millis(1));
        let started = Instant::now();
        let mut ticker = tokio::time::interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancelled(cancel_rx) => {
                    tracing::info!("Submission {} cancelled during attempt", id);
                    return AttemptOutcome::Cancelled;
                }
                result = &mut exchange => return AttemptOutcome::Completed(result),
                _ = ticker.tick() => {
                    let percent = progress.tick(started.elapsed());
                    if !self.state.set_progress(id, percent) {
                        return AttemptOutcome::Cancelled;
                    }
                }
            }
        }
    }

    fn finish_succeeded(
        &self,
        id: u64,
        result: ClassificationResult,
        progress: &mut ProgressEstimator,
    ) -> SubmissionOutcome {
        progress.complete();
        if !self.state.succeed(id, result.clone()) {
            return self.finish_cancelled(id);
        }
        self.metrics.record_submission_succeeded();
        tracing::info!(
            "Submission {} succeeded with {} predictions",
            id,
            result.len()
        );
        SubmissionOutcome::Succeeded(result)
    }

    fn finish_failed(
        &self,
        id: u64,
        error: ClassificationError,
        progress: &mut ProgressEstimator,
    ) -> SubmissionOutcome {
        tracing::error!("Submission {} failed: {}", id, error);
        progress.reset();
        if !self.state.fail(id, error.clone()) {
            return self.finish_cancelled(id);
        }
        self.metrics.record_submission_failed();
        SubmissionOutcome::Failed(error)
    }

    fn finish_cancelled(&self, id: u64) -> SubmissionOutcome {
        tracing::info!("Submission {} cancelled", id);
        self.metrics.record_submission_cancelled();
        SubmissionOutcome::Cancelled
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Classifier> Drop for SubmissionController<C> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, cancel_tx)) = slot.cancel.take() {
            let _ = cancel_tx.send(true);
        }
        if let Some(preview) = slot.preview.take() {
            preview.release();
        }
    }
}

/// Resolves once cancellation is requested or the sender is gone.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay`; false if cancelled first.
async fn wait_unless_cancelled(delay: Duration, cancel_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;

        _ = cancelled(cancel_rx) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Prediction, SubmissionPhase, TransportEncoding};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers from a fixed script, one entry per call
    struct Scripted {
        responses: Mutex<VecDeque<Result<ClassificationResult, ClassificationError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(
            responses: impl IntoIterator<Item = Result<ClassificationResult, ClassificationError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn idle() -> Self {
            Self::new(Vec::new())
        }
    }

    impl Classifier for Scripted {
        fn encoding(&self) -> TransportEncoding {
            TransportEncoding::DataUri
        }

        async fn classify(
            &self,
            _request: &ClassificationRequest,
        ) -> Result<ClassificationResult, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or(Err(ClassificationError::ServiceWarming))
        }
    }

    fn png(width: u32, height: u32) -> ImageCandidate {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        ImageCandidate::new("scan.png", "image/png", buf.into_inner())
    }

    fn controller(script: Scripted) -> SubmissionController<Scripted> {
        SubmissionController::new(
            &ClassifierConfig::default(),
            script,
            Arc::new(StateManager::new()),
            Arc::new(Metrics::new()),
        )
    }

    fn ok() -> Result<ClassificationResult, ClassificationError> {
        Ok(ClassificationResult::new(vec![Prediction::new("Caries", 0.92)]))
    }

    #[tokio::test]
    async fn test_submit_without_image() {
        let controller = controller(Scripted::idle());
        assert_eq!(controller.submit().await, Err(ControllerError::NoImage));
        assert_eq!(controller.classifier().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_accepted_selection_creates_preview() {
        let controller = controller(Scripted::idle());

        let result = controller.select_file(png(200, 200)).await.unwrap();
        assert!(result.is_accepted());

        let state = controller.snapshot();
        assert_eq!(state.phase, SubmissionPhase::HasImage);
        let preview = state.preview_path.expect("preview path");
        assert!(preview.exists());

        controller.reset();
        assert!(!preview.exists());
        assert_eq!(controller.snapshot().phase, SubmissionPhase::Idle);
    }

    #[tokio::test]
    async fn test_new_selection_replaces_preview() {
        let controller = controller(Scripted::idle());

        controller.select_file(png(200, 200)).await.unwrap();
        let first = controller.snapshot().preview_path.unwrap();
        controller.select_file(png(300, 300)).await.unwrap();
        let second = controller.snapshot().preview_path.unwrap();

        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_rejected_selection_keeps_previous_image() {
        let controller = controller(Scripted::idle());
        controller.select_file(png(200, 200)).await.unwrap();

        let result = controller.select_file(png(50, 50)).await.unwrap();
        assert!(!result.is_accepted());

        let state = controller.snapshot();
        assert_eq!(state.phase, SubmissionPhase::HasImage);
        assert_eq!(state.image.map(|i| i.width), Some(200));
        assert!(state.rejection.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_fails_immediately() {
        let controller = controller(Scripted::new([Err(ClassificationError::PayloadTooLarge)]));
        controller.select_file(png(200, 200)).await.unwrap();

        let outcome = controller.submit().await.unwrap();

        assert_eq!(outcome, SubmissionOutcome::Failed(ClassificationError::PayloadTooLarge));
        assert_eq!(controller.classifier().calls.load(Ordering::SeqCst), 1);
        let state = controller.snapshot();
        assert_eq!(state.phase, SubmissionPhase::Failed);
        assert_eq!(state.progress_percent, 0);
        assert!(state.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_again_after_failure() {
        let controller = controller(Scripted::new([
            Err(ClassificationError::Server {
                status: 500,
                body: String::new(),
            }),
            ok(),
        ]));
        controller.select_file(png(200, 200)).await.unwrap();

        assert!(matches!(
            controller.submit().await.unwrap(),
            SubmissionOutcome::Failed(_)
        ));
        assert!(matches!(
            controller.submit().await.unwrap(),
            SubmissionOutcome::Succeeded(_)
        ));

        let state = controller.snapshot();
        assert_eq!(state.phase, SubmissionPhase::Succeeded);
        assert!(state.error.is_none());
        assert_eq!(state.progress_percent, 100);
    }
}
