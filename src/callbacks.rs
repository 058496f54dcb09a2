//! Caller-supplied callback set.
//!
//! The surrounding application is the session manager's only external
//! collaborator; it observes the session exclusively through this trait.
//! All methods default to no-ops so callers implement only what they need.

use crate::error::{LiveError, Result};

/// Observer for session events, supplied by the caller at `connect()`.
///
/// Callbacks are invoked from the session's dispatch task and must not
/// block; hand heavy work off to the application's own executor.
pub trait SessionCallbacks: Send + Sync {
    /// An inbound audio segment was decoded (raw PCM16 bytes at 24 kHz).
    fn on_audio_data(&self, _pcm: &[u8]) {}

    /// The transport closed, expectedly or not.
    fn on_close(&self) {}

    /// An unrecoverable error occurred; the session is already torn down.
    fn on_error(&self, _error: &LiveError) {}

    /// The remote side signaled a user interruption; any playing audio was
    /// flushed.
    fn on_interrupted(&self) {}

    /// The remote side finished its turn and is composing the next one.
    fn on_turn_complete(&self) {}

    /// The remote side invoked the note-creation tool.
    ///
    /// Returning an error reports a failed tool result back to the remote
    /// side; it does not terminate the session.
    fn on_create_note(&self, _title: &str, _items: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Default no-op callback set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallbacks;

impl SessionCallbacks for NoOpCallbacks {}
