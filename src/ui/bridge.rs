// RenderBridge - Connects the state snapshot stream to a Renderer
//
// The bridge provides:
// - A pump task that re-renders every snapshot published by the StateManager
// - Spawning async work whose unexpected errors are routed to the renderer

use crate::state::StateManager;
use crate::ui::Renderer;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};

/// Coordinates between the tokio runtime and a [`Renderer`]
///
/// # Example
/// ```ignore
/// let bridge = RenderBridge::new(Arc::new(ConsoleRenderer::new()), &state, Handle::current());
///
/// bridge.spawn_async(move || async move {
///     controller.submit().await?;
///     Ok(())
/// });
/// ```
pub struct RenderBridge<R: Renderer> {
    renderer: Arc<R>,

    /// Handle to the tokio runtime for spawning async tasks
    tokio_handle: tokio::runtime::Handle,

    pump: AbortHandle,
}

impl<R: Renderer> RenderBridge<R> {
    /// Render the current snapshot, then keep rendering each new one until
    /// the bridge is dropped.
    pub fn new(renderer: Arc<R>, state: &StateManager, tokio_handle: tokio::runtime::Handle) -> Self {
        let mut snapshots = state.watch_snapshots();
        renderer.render(&state.snapshot());

        let pump_renderer = Arc::clone(&renderer);
        let pump = tokio_handle.spawn(async move {
            tracing::debug!("Render pump started");

            while snapshots.changed().await.is_ok() {
                // Clone so the watch lock is not held while rendering
                let snapshot = snapshots.borrow_and_update().clone();
                pump_renderer.render(&snapshot);
            }

            tracing::debug!("Render pump terminated");
        });

        Self {
            renderer,
            tokio_handle,
            pump: pump.abort_handle(),
        }
    }

    pub fn renderer(&self) -> &Arc<R> {
        &self.renderer
    }

    /// Spawn work on the runtime; an `Err` is logged and shown through
    /// [`Renderer::on_unexpected_failure`].
    pub fn spawn_async<F, Fut>(&self, future_factory: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let renderer = Arc::clone(&self.renderer);
        self.tokio_handle.spawn(async move {
            if let Err(e) = future_factory().await {
                tracing::error!("Unexpected failure: {:#}", e);
                renderer.on_unexpected_failure(&e);
            }
        })
    }
}

impl<R: Renderer> Drop for RenderBridge<R> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
