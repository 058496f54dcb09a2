//! Public session facade.

use crate::capture::{MediaBackend, MediaDeviceHandle};
use crate::callbacks::SessionCallbacks;
use crate::config::SessionConfig;
use crate::connection::{SessionConnection, SessionState};
use crate::error::Result;
use crate::playback::{PlaybackScheduler, PlaybackSink};
use crate::transport::RealtimeConnector;
use std::sync::Arc;

/// Manages the lifecycle of realtime conversation sessions.
///
/// The manager owns one [`SessionConnection`] at a time. The expected flow
/// is `prepare` (acquire microphone and optionally camera), then `connect`
/// (open the transport and start streaming), then `stop`. `prepare` may be
/// called again at any point to begin a new session, replacing the old one.
///
/// ```rust,ignore
/// let connector = Arc::new(WsConnector::new("wss://example.com/session?key=..."));
/// let manager = SessionManager::new(backend, connector, sink);
/// manager.prepare(true).await?;
/// manager.connect(SessionConfig::default(), Arc::new(MyCallbacks)).await?;
/// // ... converse ...
/// manager.stop();
/// ```
pub struct SessionManager {
    connection: Arc<SessionConnection>,
}

impl SessionManager {
    /// Create a manager with no session in progress.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        connector: Arc<dyn RealtimeConnector>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Self {
        let playback = Arc::new(PlaybackScheduler::new(sink));
        Self {
            connection: Arc::new(SessionConnection::new(backend, connector, playback)),
        }
    }

    /// Acquire capture devices for a new session, tearing down any
    /// previous one. With `use_video` set, degrades to audio-only when no
    /// camera is available.
    pub async fn prepare(&self, use_video: bool) -> Result<()> {
        self.connection.prepare(use_video).await
    }

    /// The acquired device handle, available after a successful
    /// `prepare`. Lets the application show a local preview.
    pub fn capture_handle(&self) -> Option<Arc<MediaDeviceHandle>> {
        self.connection.capture_handle()
    }

    /// Connect the prepared session and start duplex streaming.
    pub async fn connect(
        &self,
        config: SessionConfig,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<()> {
        self.connection.connect(config, callbacks).await
    }

    /// Tear the current session down. Safe to call at any time, any
    /// number of times.
    pub fn stop(&self) {
        self.connection.stop();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.connection.state()
    }
}

// The dispatch task keeps the connection alive through its own Arc, so
// the manager must initiate teardown itself or the task would outlive it.
impl Drop for SessionManager {
    fn drop(&mut self) {
        self.connection.stop();
    }
}
