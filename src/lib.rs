//! # voicelink
//!
//! Real-time bidirectional audio/video conversation sessions over a
//! WebSocket transport.
//!
//! The crate manages the full lifecycle of a voice session: acquiring
//! capture devices with graceful degradation, connecting with bounded
//! retry, streaming resampled microphone audio (and optional video
//! stills) upstream, and scheduling inbound audio for gapless playback
//! downstream. Server-initiated interruptions flush playback instantly,
//! and tool calls from the model are executed locally and answered on the
//! same session.
//!
//! ## Architecture
//!
//! ```text
//!   MediaBackend ──► CapturePipeline ──► Transport ──► remote service
//!        (devices)      (resample,          (WebSocket)       │
//!                        frame timer)                          │
//!   PlaybackSink ◄── PlaybackScheduler ◄── dispatch loop ◄─────┘
//!        (speakers)     (gapless cursor,     (events, tools,
//!                        flush)               callbacks)
//! ```
//!
//! Device and speaker I/O stay behind the [`MediaBackend`] and
//! [`PlaybackSink`] traits so the session logic is independent of any
//! particular audio stack.
//!
//! ## Example
//!
//! ```rust,ignore
//! use voicelink::{SessionManager, SessionConfig, VoicePreference};
//! use voicelink::ws::WsConnector;
//!
//! let manager = SessionManager::new(backend, Arc::new(WsConnector::new(url)), sink);
//! manager.prepare(true).await?;
//!
//! let config = SessionConfig::default()
//!     .with_language("pt-BR")
//!     .with_voice(VoicePreference::Female);
//! manager.connect(config, Arc::new(MyCallbacks)).await?;
//! ```

pub mod audio;
pub mod callbacks;
pub mod capture;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod manager;
pub mod playback;
pub mod transport;
pub mod ws;

// Re-exports
pub use audio::{AudioChunk, AudioFormat, VideoFrame, resample_to_pcm16};
pub use callbacks::{NoOpCallbacks, SessionCallbacks};
pub use capture::{
    AudioConstraints, AudioFrame, AudioSource, CapturePipeline, MediaBackend, MediaConstraints,
    MediaDeviceHandle, VideoConstraints, VideoSource,
};
pub use config::{SessionConfig, ToolDefinition, VoicePreference};
pub use connection::{SessionConnection, SessionState};
pub use error::{LiveError, Result};
pub use events::{ClientMessage, ServerEvent, ToolCall, ToolInvocation, ToolResponse};
pub use manager::SessionManager;
pub use playback::{PlaybackScheduler, PlaybackSink};
pub use transport::{BoxedTransport, RealtimeConnector, Transport, connect_with_retry};
