//! Error types for live sessions.

use thiserror::Error;

/// Result type for live session operations.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Errors that can occur while managing a live session.
#[derive(Error, Debug)]
pub enum LiveError {
    /// No usable capture device combination could be opened.
    #[error("device access error: {0}")]
    DeviceAccess(String),

    /// The transport could not be established after bounded retries.
    #[error("connection error: {0}")]
    Connection(String),

    /// Mid-session failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A tool handler failed; reported back to the remote side, non-fatal.
    #[error("tool execution error: {0}")]
    Tool(String),

    /// `connect()` was called before a successful `prepare()`.
    #[error("session not prepared: call prepare() before connect()")]
    NotPrepared,

    /// The session was stopped while an operation was still pending.
    #[error("session closed")]
    Closed,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveError {
    /// Create a new device access error.
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceAccess(msg.into())
    }

    /// Create a new connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new tool execution error.
    pub fn tool<S: Into<String>>(msg: S) -> Self {
        Self::Tool(msg.into())
    }
}
