//! Event types crossing the transport boundary.
//!
//! These follow a unified model: provider-specific wire formats are
//! translated to and from these events at the transport edge, so the rest
//! of the crate never sees protocol JSON. Inbound audio arrives as raw
//! bytes, already decoded from the transport's base64 framing.

use crate::error::{LiveError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from the local session to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// One outbound media chunk: PCM16 audio or a JPEG still frame,
    /// base64-encoded and tagged with its media type.
    MediaChunk {
        /// Media-type tag, e.g. `audio/pcm;rate=16000` or `image/jpeg`.
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },

    /// Correlated responses to one or more tool calls.
    ToolResponses(Vec<ToolResponse>),
}

impl ClientMessage {
    /// Build a media chunk message.
    pub fn media(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::MediaChunk { mime_type: mime_type.into(), data: data.into() }
    }
}

/// Events received from the remote service.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A chunk of synthesized output audio (raw PCM16 bytes at 24 kHz).
    AudioDelta(Vec<u8>),

    /// The remote side detected the user interrupting its speech.
    Interrupted,

    /// The remote side finished composing its current turn.
    TurnComplete,

    /// The remote side requests one or more tool invocations.
    ToolCall(Vec<ToolCall>),

    /// Unrecognized event (forward compatibility).
    Unknown,
}

/// A tool/function call requested by the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID, referenced by the response.
    pub call_id: String,
    /// Tool name.
    pub name: String,
    /// Structured arguments as JSON.
    pub arguments: Value,
}

/// A parsed tool invocation: the finite set of operations this session
/// understands, plus an explicit variant for everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    /// Create a note in the caller's notepad.
    CreateNote {
        /// Short descriptive title.
        title: String,
        /// Ordered list of note items.
        items: Vec<String>,
    },

    /// A tool this session does not implement. No response is sent.
    Unsupported {
        /// The unrecognized tool name.
        name: String,
    },
}

impl ToolInvocation {
    /// Validate a raw tool call against the supported argument schemas.
    ///
    /// Unknown names parse to [`ToolInvocation::Unsupported`]; a known name
    /// with malformed arguments is a [`LiveError::Tool`].
    pub fn parse(call: &ToolCall) -> Result<Self> {
        match call.name.as_str() {
            "createNote" => {
                #[derive(Deserialize)]
                struct CreateNoteArgs {
                    title: String,
                    items: Vec<String>,
                }
                let args: CreateNoteArgs =
                    serde_json::from_value(call.arguments.clone()).map_err(|e| {
                        LiveError::tool(format!("invalid createNote arguments: {e}"))
                    })?;
                Ok(Self::CreateNote { title: args.title, items: args.items })
            }
            other => Ok(Self::Unsupported { name: other.to_string() }),
        }
    }
}

/// A tool response to send back to the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// The call ID being responded to.
    pub call_id: String,
    /// The tool name the call referenced.
    pub name: String,
    /// Structured result payload.
    pub output: Value,
}

impl ToolResponse {
    /// Successful result for `call`.
    pub fn success(call: &ToolCall, output: Value) -> Self {
        Self { call_id: call.call_id.clone(), name: call.name.clone(), output }
    }

    /// Failed result for `call`, reported to the remote side as an error.
    pub fn failure(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            output: serde_json::json!({ "error": message.into() }),
        }
    }
}
