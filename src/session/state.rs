//! Shared session state
//!
//! One explicit state struct per session, owned by the connection manager
//! and observed by the UI through `subscribe`. Subscribers receive a full
//! snapshot on every state-changing update and release their slot by
//! dropping (or explicitly unsubscribing) the returned handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::decode::NormalizedFrame;
use crate::session::classifier::ClassifiedError;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Non-terminal: `connect` exits it back through `Connecting`
    Error,
}

/// Streaming health counters; reset to zero on disconnect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub dropped_frames: u64,
    pub slow_down_warnings: u64,
}

/// Point-in-time view of the session handed to subscribers
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub pipeline_id: Option<String>,
    pub state: ConnectionState,
    pub last_result: Option<NormalizedFrame>,
    pub last_error: Option<ClassifiedError>,
    pub last_result_at: Option<DateTime<Utc>>,
    pub metrics: SessionMetrics,
}

type Callback = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

#[derive(Default)]
struct StateFields {
    session_id: Option<Uuid>,
    pipeline_id: Option<String>,
    state: ConnectionState,
    last_result: Option<NormalizedFrame>,
    last_error: Option<ClassifiedError>,
    last_result_at: Option<DateTime<Utc>>,
    /// Highest frame index stored so far, for the monotonic guard
    last_frame_index: Option<u64>,
}

#[derive(Default)]
struct Inner {
    fields: Mutex<StateFields>,
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_subscriber_id: AtomicU64,
    dropped_frames: AtomicU64,
    slow_down_warnings: AtomicU64,
}

/// Cloneable handle to the shared session state
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, without the full snapshot
    pub fn state(&self) -> ConnectionState {
        self.inner.fields.lock().state
    }

    /// Pipeline id of the active (or connecting) session
    pub fn pipeline_id(&self) -> Option<String> {
        self.inner.fields.lock().pipeline_id.clone()
    }

    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            dropped_frames: self.inner.dropped_frames.load(Ordering::Relaxed),
            slow_down_warnings: self.inner.slow_down_warnings.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let fields = self.inner.fields.lock();
        SessionSnapshot {
            session_id: fields.session_id,
            pipeline_id: fields.pipeline_id.clone(),
            state: fields.state,
            last_result: fields.last_result.clone(),
            last_error: fields.last_error.clone(),
            last_result_at: fields.last_result_at,
            metrics: self.metrics(),
        }
    }

    /// Register a state observer. The returned handle must be kept alive;
    /// dropping it (or calling `unsubscribe`) releases the slot.
    #[must_use = "dropping the subscription immediately unsubscribes"]
    pub fn subscribe(&self, callback: impl Fn(&SessionSnapshot) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every subscriber with a fresh snapshot
    fn notify(&self) {
        let snapshot = self.snapshot();
        // Callbacks run outside the subscriber lock so they may themselves
        // subscribe or unsubscribe
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    /// Move to `Connecting` for the given pipeline; returns the session id
    pub(crate) fn begin_connect(&self, pipeline_id: &str) -> Uuid {
        let session_id = Uuid::new_v4();
        {
            let mut fields = self.inner.fields.lock();
            fields.session_id = Some(session_id);
            fields.pipeline_id = Some(pipeline_id.to_string());
            fields.state = ConnectionState::Connecting;
            fields.last_error = None;
            // A fresh session starts a fresh frame stream; nothing from the
            // previous one may survive, including the monotonic guard
            fields.last_result = None;
            fields.last_result_at = None;
            fields.last_frame_index = None;
        }
        self.notify();
        session_id
    }

    pub(crate) fn mark_connected(&self) {
        self.inner.fields.lock().state = ConnectionState::Connected;
        self.notify();
    }

    /// Record an error; fatal ones force the session into `Error`
    pub(crate) fn mark_error(&self, error: ClassifiedError) {
        {
            let mut fields = self.inner.fields.lock();
            if error.is_fatal() {
                fields.state = ConnectionState::Error;
            }
            fields.last_error = Some(error);
        }
        self.notify();
    }

    /// Store a newly arrived result and clear any lingering error.
    ///
    /// Returns false when the monotonic guard rejects a stale frame index
    /// (not greater than the last stored one); rejected results leave the
    /// state untouched.
    pub(crate) fn store_result(&self, frame: NormalizedFrame) -> bool {
        {
            let mut fields = self.inner.fields.lock();
            if let Some(last) = fields.last_frame_index {
                if frame.frame_index <= last {
                    return false;
                }
            }
            fields.last_frame_index = Some(frame.frame_index);
            fields.last_result = Some(frame);
            fields.last_result_at = Some(Utc::now());
            fields.last_error = None;
        }
        self.notify();
        true
    }

    pub(crate) fn record_dropped_frame(&self) {
        self.inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_down(&self) {
        self.inner.slow_down_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Clear everything back to `Disconnected` in one step: state, error,
    /// result references, and metrics all reset together so no stale frame
    /// can render after a disconnect.
    pub(crate) fn reset_disconnected(&self) {
        {
            let mut fields = self.inner.fields.lock();
            *fields = StateFields::default();
        }
        self.inner.dropped_frames.store(0, Ordering::Relaxed);
        self.inner.slow_down_warnings.store(0, Ordering::Relaxed);
        self.notify();
    }
}

/// Handle returned by `SessionStore::subscribe`; unsubscribes on drop
pub struct Subscription {
    id: u64,
    inner: std::sync::Weak<Inner>,
}

impl Subscription {
    /// Explicitly release the subscription
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::classifier::Severity;
    use std::sync::atomic::AtomicUsize;

    fn frame(index: u64) -> NormalizedFrame {
        NormalizedFrame {
            frame_index: index,
            detections: Vec::new(),
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let store = SessionStore::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_cb = seen.clone();
        let sub = store.subscribe(move |_| {
            seen_cb.fetch_add(1, Ordering::SeqCst);
        });

        store.begin_connect("demo");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        store.mark_connected();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_result_clears_error() {
        let store = SessionStore::new();
        store.begin_connect("demo");
        store.mark_connected();
        store.mark_error(ClassifiedError::backend(
            crate::protocol::ErrorCode::InvalidFrame,
            "bad frame",
            Severity::Recoverable,
        ));
        assert!(store.snapshot().last_error.is_some());

        assert!(store.store_result(frame(1)));
        let snapshot = store.snapshot();
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.last_result.unwrap().frame_index, 1);
    }

    #[test]
    fn test_monotonic_guard_rejects_stale_results() {
        let store = SessionStore::new();
        assert!(store.store_result(frame(5)));
        assert!(!store.store_result(frame(5)));
        assert!(!store.store_result(frame(3)));
        assert!(store.store_result(frame(6)));
        assert_eq!(store.snapshot().last_result.unwrap().frame_index, 6);
    }

    #[test]
    fn test_fatal_error_forces_error_state() {
        let store = SessionStore::new();
        store.begin_connect("demo");
        store.mark_connected();
        store.mark_error(ClassifiedError::backend(
            crate::protocol::ErrorCode::PipelineFailure,
            "boom",
            Severity::Fatal,
        ));
        assert_eq!(store.state(), ConnectionState::Error);
    }

    #[test]
    fn test_recoverable_error_keeps_connected_state() {
        let store = SessionStore::new();
        store.begin_connect("demo");
        store.mark_connected();
        store.mark_error(ClassifiedError::backend(
            crate::protocol::ErrorCode::FrameTooLarge,
            "too big",
            Severity::Recoverable,
        ));
        assert_eq!(store.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_reset_clears_everything_at_once() {
        let store = SessionStore::new();
        store.begin_connect("demo");
        store.mark_connected();
        store.store_result(frame(1));
        store.record_dropped_frame();
        store.record_slow_down();

        store.reset_disconnected();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert!(snapshot.last_result.is_none());
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.metrics, SessionMetrics::default());

        // The guard resets with the session, so a fresh stream starts clean
        assert!(store.store_result(frame(1)));
    }

    #[test]
    fn test_reconnect_from_error_state_starts_a_fresh_stream() {
        let store = SessionStore::new();
        store.begin_connect("demo");
        store.mark_connected();
        store.store_result(frame(9));
        store.mark_error(ClassifiedError::backend(
            crate::protocol::ErrorCode::PipelineFailure,
            "boom",
            Severity::Fatal,
        ));

        // Connecting again without an intervening disconnect still clears
        // the old stream and its monotonic guard
        store.begin_connect("demo");
        let snapshot = store.snapshot();
        assert!(snapshot.last_result.is_none());
        assert!(snapshot.last_error.is_none());
        assert!(store.store_result(frame(1)));
    }
}
