//! UI-facing orchestration
//!
//! `StreamClient` ties the pieces together for the view layer: it owns the
//! connection manager, spawns one sampling loop per session, and exposes
//! the pipeline-selection and retry actions. Pipeline switching is always
//! disconnect-then-connect; an empty selection does nothing at all.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::overlay::{CanvasSize, DrawCommand, OverlayRenderer, VisibleLayers};
use crate::session::{
    ConnectionManager, ConnectionState, SessionSnapshot, SessionStore, Subscription,
};
use crate::source::FrameSource;
use crate::submit::{shared_source, FrameSubmitter, SharedSource, TargetRate};
use crate::transport::Connector;

pub struct StreamClient {
    manager: Arc<ConnectionManager>,
    source: SharedSource,
    target_rate: Arc<Mutex<TargetRate>>,
    layers: Mutex<VisibleLayers>,
    renderer: OverlayRenderer,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl StreamClient {
    pub fn new(
        connector: Arc<dyn Connector>,
        source: impl FrameSource + 'static,
        canvas: CanvasSize,
    ) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(connector, SessionStore::new())),
            source: shared_source(source),
            target_rate: Arc::new(Mutex::new(TargetRate::default())),
            layers: Mutex::new(VisibleLayers::default()),
            renderer: OverlayRenderer::new(canvas),
            sampler: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &SessionStore {
        self.manager.store()
    }

    /// Observe session state changes; drop the handle to unsubscribe
    #[must_use = "dropping the subscription immediately unsubscribes"]
    pub fn subscribe(
        &self,
        callback: impl Fn(&SessionSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.store().subscribe(callback)
    }

    /// Select a pipeline to stream to.
    ///
    /// An empty id is not a selection: neither connect nor disconnect runs.
    /// Otherwise any live session is disconnected first, then a fresh one
    /// opens against the chosen pipeline.
    pub async fn select_pipeline(&self, pipeline_id: &str) -> Result<()> {
        if pipeline_id.is_empty() {
            return Ok(());
        }
        if self.store().state() != ConnectionState::Disconnected {
            self.disconnect();
        }
        self.open_session(pipeline_id).await
    }

    /// Retry action for session-fatal errors: disconnect, then connect to
    /// the same pipeline id. Never a silent resend.
    pub async fn retry(&self) -> Result<()> {
        let pipeline_id = self.store().pipeline_id().unwrap_or_default();
        self.disconnect();
        self.open_session(&pipeline_id).await
    }

    /// Tear down the live session and its sampling loop
    pub fn disconnect(&self) {
        self.manager.disconnect();
        if let Some(handle) = self.sampler.lock().take() {
            handle.abort();
        }
    }

    async fn open_session(&self, pipeline_id: &str) -> Result<()> {
        self.manager.connect(pipeline_id).await?;
        let submitter = FrameSubmitter::new(
            self.manager.clone(),
            self.source.clone(),
            self.target_rate.clone(),
        );
        *self.sampler.lock() = Some(tokio::spawn(submitter.run()));
        Ok(())
    }

    /// Update the sampling rate; applies to the running session on its
    /// next tick
    pub fn set_target_fps(&self, fps: u32) {
        *self.target_rate.lock() = TargetRate::new(fps);
    }

    pub fn target_fps(&self) -> u32 {
        self.target_rate.lock().fps()
    }

    pub fn layers(&self) -> VisibleLayers {
        *self.layers.lock()
    }

    pub fn set_layers(&self, layers: VisibleLayers) {
        *self.layers.lock() = layers;
    }

    /// Render the most recent result (or the explicit empty surface when
    /// none has arrived) with the current layer toggles
    pub fn render_latest(&self) -> Vec<DrawCommand> {
        let snapshot = self.store().snapshot();
        let layers = self.layers();
        self.renderer.render(snapshot.last_result.as_ref(), &layers)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
