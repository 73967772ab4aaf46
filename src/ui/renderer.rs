use crate::models::SubmissionState;

/// What the rendering layer must provide.
///
/// The controller never calls this directly: snapshots reach it through
/// [`crate::ui::RenderBridge`], which also reports failures of spawned work
/// via [`on_unexpected_failure`](Renderer::on_unexpected_failure).
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync + 'static {
    /// Draw the given snapshot. Called after every transition.
    fn render(&self, state: &SubmissionState);

    /// Show a failure that escaped the submission pipeline.
    fn on_unexpected_failure(&self, error: &anyhow::Error);
}
