//! Session connection lifecycle.
//!
//! Owns one logical conversation: media acquisition, connect with retry,
//! the wake-up handshake, inbound message dispatch and ordered teardown.
//! Every asynchronous continuation is gated on a per-session active flag:
//! each `connect()` installs a fresh flag, and clones captured by spawned
//! work act as that session's cancellation token. Once teardown clears the
//! flag, in-flight callbacks become no-ops and can never touch released
//! resources (or a newer session's).

use crate::audio::{AudioChunk, AudioFormat, encode_base64};
use crate::callbacks::SessionCallbacks;
use crate::capture::{CapturePipeline, MediaBackend, MediaDeviceHandle, acquire_media};
use crate::config::{STREAM_START_DELAY, SessionConfig, WAKE_UP_SILENCE_BYTES};
use crate::error::{LiveError, Result};
use crate::events::{ClientMessage, ServerEvent, ToolCall, ToolInvocation, ToolResponse};
use crate::playback::PlaybackScheduler;
use crate::transport::{RealtimeConnector, Transport, connect_with_retry};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a session connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No media acquired, nothing connected.
    Idle,
    /// Media acquisition in progress or complete, transport not yet opened.
    Preparing,
    /// Transport connection (with retry) in progress.
    Connecting,
    /// Duplex streaming in progress.
    Active,
    /// Teardown in progress.
    Closing,
    /// Torn down. `prepare()` starts a new generation from here.
    Closed,
}

/// One logical conversation with the remote service.
pub struct SessionConnection {
    backend: Arc<dyn MediaBackend>,
    connector: Arc<dyn RealtimeConnector>,
    playback: Arc<PlaybackScheduler>,
    state: Mutex<SessionState>,
    capture: Mutex<CapturePipeline>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    active: Mutex<Arc<AtomicBool>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionConnection {
    /// Create an idle connection.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        connector: Arc<dyn RealtimeConnector>,
        playback: Arc<PlaybackScheduler>,
    ) -> Self {
        Self {
            backend,
            connector,
            playback,
            state: Mutex::new(SessionState::Idle),
            capture: Mutex::new(CapturePipeline::new()),
            transport: Mutex::new(None),
            active: Mutex::new(Arc::new(AtomicBool::new(false))),
            dispatch_task: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The acquired device handle, for local preview only.
    pub fn capture_handle(&self) -> Option<Arc<MediaDeviceHandle>> {
        self.capture.lock().handle()
    }

    /// Acquire capture media, replacing any previous session entirely.
    pub async fn prepare(&self, use_video: bool) -> Result<()> {
        self.stop();
        *self.state.lock() = SessionState::Preparing;

        let handle = match acquire_media(self.backend.as_ref(), use_video).await {
            Ok(handle) => handle,
            Err(e) => {
                *self.state.lock() = SessionState::Idle;
                return Err(e);
            }
        };

        // The session may have been stopped while acquisition was pending.
        if *self.state.lock() != SessionState::Preparing {
            handle.stop();
            return Err(LiveError::Closed);
        }

        self.capture.lock().install(handle);
        Ok(())
    }

    /// Open the transport and start duplex streaming.
    ///
    /// Retries the connection up to the configured bound, then sends the
    /// wake-up priming signal and, after a short delay, starts capture
    /// streaming. A call while already connecting or active is a no-op.
    pub async fn connect(
        self: &Arc<Self>,
        config: SessionConfig,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Connecting | SessionState::Active => return Ok(()),
                _ => {
                    if self.capture.lock().handle().is_none() {
                        return Err(LiveError::NotPrepared);
                    }
                    *state = SessionState::Connecting;
                }
            }
        }

        let active = Arc::new(AtomicBool::new(true));
        *self.active.lock() = active.clone();

        let transport = match connect_with_retry(self.connector.as_ref(), &config).await {
            Ok(transport) => transport,
            Err(e) => {
                self.stop();
                callbacks.on_error(&e);
                return Err(e);
            }
        };

        // Stopped while the connection was pending: discard the fresh
        // transport without ever going active.
        if !active.load(Ordering::SeqCst) {
            let _ = transport.close().await;
            return Err(LiveError::Closed);
        }

        let transport: Arc<dyn Transport> = Arc::from(transport);
        *self.transport.lock() = Some(transport.clone());
        *self.state.lock() = SessionState::Active;
        info!(session_id = transport.session_id(), "session active");

        self.send_wake_up(transport.as_ref()).await;

        self.capture.lock().start_streaming(
            transport.clone(),
            active.clone(),
            STREAM_START_DELAY,
        );

        let task = tokio::spawn(dispatch_loop(
            self.clone(),
            transport,
            self.playback.clone(),
            callbacks,
            active,
        ));
        *self.dispatch_task.lock() = Some(task);

        Ok(())
    }

    /// Send a short silent audio segment to elicit the remote side's first
    /// turn. Some conversational backends will not speak first without an
    /// initial audio signal. Failure is non-fatal.
    async fn send_wake_up(&self, transport: &dyn Transport) {
        let silence = vec![0u8; WAKE_UP_SILENCE_BYTES];
        let message =
            ClientMessage::media(AudioFormat::pcm16_16khz().mime_type(), encode_base64(&silence));
        match transport.send(&message).await {
            Ok(()) => debug!("wake-up signal sent"),
            Err(e) => warn!(error = %e, "wake-up signal failed (non-fatal)"),
        }
    }

    /// Tear the session down. Idempotent and safe from any state,
    /// including before `prepare()` ever ran.
    ///
    /// Order: gate callbacks, cancel the video timer, release the device
    /// handle, cancel audio capture, flush playback, close the transport
    /// best-effort, drop the transport.
    pub fn stop(&self) {
        self.active.lock().store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            if !matches!(*state, SessionState::Idle | SessionState::Closed) {
                *state = SessionState::Closing;
            }
        }

        self.capture.lock().stop();
        self.playback.flush();

        if let Some(transport) = self.transport.lock().take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = transport.close().await {
                        debug!(error = %e, "transport close failed during teardown");
                    }
                });
            }
        }

        if let Some(task) = self.dispatch_task.lock().take() {
            task.abort();
        }

        *self.state.lock() = SessionState::Closed;
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pull inbound events until the transport closes or fails.
async fn dispatch_loop(
    connection: Arc<SessionConnection>,
    transport: Arc<dyn Transport>,
    playback: Arc<PlaybackScheduler>,
    callbacks: Arc<dyn SessionCallbacks>,
    active: Arc<AtomicBool>,
) {
    loop {
        let event = transport.next_event().await;
        if !active.load(Ordering::SeqCst) {
            return;
        }

        match event {
            Some(Ok(event)) => {
                handle_event(event, transport.as_ref(), &playback, callbacks.as_ref()).await;
            }
            Some(Err(e)) => {
                error!(error = %e, "transport failure, tearing session down");
                connection.stop();
                callbacks.on_error(&e);
                return;
            }
            None => {
                info!("transport closed by remote");
                connection.stop();
                callbacks.on_close();
                return;
            }
        }
    }
}

async fn handle_event(
    event: ServerEvent,
    transport: &dyn Transport,
    playback: &PlaybackScheduler,
    callbacks: &dyn SessionCallbacks,
) {
    match event {
        ServerEvent::AudioDelta(bytes) => {
            callbacks.on_audio_data(&bytes);
            playback.enqueue(AudioChunk::new(bytes, AudioFormat::pcm16_24khz()));
        }
        ServerEvent::Interrupted => {
            playback.flush();
            callbacks.on_interrupted();
        }
        ServerEvent::TurnComplete => {
            callbacks.on_turn_complete();
        }
        ServerEvent::ToolCall(calls) => {
            handle_tool_calls(transport, callbacks, calls).await;
        }
        ServerEvent::Unknown => {}
    }
}

/// Execute each requested tool call and send one correlated response
/// message back. Unsupported tool names get no response.
async fn handle_tool_calls(
    transport: &dyn Transport,
    callbacks: &dyn SessionCallbacks,
    calls: Vec<ToolCall>,
) {
    let mut responses = Vec::new();

    for call in calls {
        let result = ToolInvocation::parse(&call).and_then(|invocation| match invocation {
            ToolInvocation::CreateNote { title, items } => {
                info!(%title, items = items.len(), "creating note");
                callbacks.on_create_note(&title, &items)?;
                Ok(Some(ToolResponse::success(&call, json!({ "result": "Note created successfully." }))))
            }
            ToolInvocation::Unsupported { name } => {
                warn!(tool = %name, "unsupported tool call ignored");
                Ok(None)
            }
        });

        match result {
            Ok(Some(response)) => responses.push(response),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, tool = %call.name, "tool execution failed");
                responses.push(ToolResponse::failure(&call, "Failed to create note."));
            }
        }
    }

    if !responses.is_empty() {
        if let Err(e) = transport.send(&ClientMessage::ToolResponses(responses)).await {
            warn!(error = %e, "failed to send tool responses");
        }
    }
}
