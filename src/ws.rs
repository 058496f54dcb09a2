//! WebSocket transport implementation.
//!
//! Speaks a JSON protocol shaped like the Gemini Live wire format the
//! session core was originally built against: a `setup` message on open,
//! `realtimeInput` media chunks outbound, and `serverContent`/`toolCall`
//! messages inbound. Translation to the crate's unified [`ServerEvent`]
//! model happens here so nothing above this module sees protocol JSON.

use crate::audio::decode_base64;
use crate::config::{SessionConfig, ToolDefinition};
use crate::error::{LiveError, Result};
use crate::events::{ClientMessage, ServerEvent, ToolCall};
use crate::transport::{BoxedTransport, RealtimeConnector, Transport};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    setup: Option<WireSetup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    realtime_input: Option<WireRealtimeInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_response: Option<WireToolResponse>,
}

impl WireClientMessage {
    fn empty() -> Self {
        Self { setup: None, realtime_input: None, tool_response: None }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSetup {
    model: String,
    system_instruction: Value,
    generation_config: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRealtimeInput {
    media_chunks: Vec<WireMediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMediaChunk {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolResponse {
    function_responses: Vec<WireFunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFunctionResponse {
    id: String,
    name: String,
    response: Value,
}

/// Connector building a fresh WebSocket client per attempt.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Create a connector for the given endpoint URL (credentials included
    /// however the endpoint expects them).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RealtimeConnector for WsConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<BoxedTransport> {
        let transport = WsTransport::connect(&self.url, config).await?;
        Ok(Box::new(transport))
    }
}

/// WebSocket transport session.
pub struct WsTransport {
    session_id: String,
    connected: Arc<AtomicBool>,
    sender: Mutex<WsSink>,
    receiver: Mutex<WsSource>,
}

impl WsTransport {
    /// Connect and perform protocol setup.
    pub async fn connect(url: &str, config: &SessionConfig) -> Result<Self> {
        let request = url
            .into_client_request()
            .map_err(|e| LiveError::connection(format!("invalid endpoint url: {e}")))?;
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| LiveError::connection(format!("websocket connect error: {e}")))?;
        let (sink, source) = stream.split();

        let transport = Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            connected: Arc::new(AtomicBool::new(true)),
            sender: Mutex::new(sink),
            receiver: Mutex::new(source),
        };

        transport.send_setup(config).await?;
        info!(session_id = %transport.session_id, model = %config.model, "transport session opened");
        Ok(transport)
    }

    async fn send_setup(&self, config: &SessionConfig) -> Result<()> {
        let generation_config = json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": config.voice.voice_name() }
                }
            }
        });

        let setup = WireClientMessage {
            setup: Some(WireSetup {
                model: config.model.clone(),
                system_instruction: json!({
                    "parts": [{ "text": config.system_instruction() }]
                }),
                generation_config,
                tools: convert_tools(&config.tools),
            }),
            ..WireClientMessage::empty()
        };

        self.send_raw(&setup).await
    }

    async fn send_raw<T: Serialize>(&self, value: &T) -> Result<()> {
        let msg = serde_json::to_string(value)?;
        debug!(raw = %msg, "sending wire message");

        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(msg.into()))
            .await
            .map_err(|e| LiveError::transport(format!("send error: {e}")))?;
        Ok(())
    }

    async fn receive_raw(&self) -> Option<Result<ServerEvent>> {
        let mut receiver = self.receiver.lock().await;

        match receiver.next().await {
            Some(Ok(Message::Text(text))) => Some(translate_event(&text)),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => Some(translate_event(&text)),
                Err(e) => {
                    Some(Err(LiveError::transport(format!("invalid utf-8 in binary message: {e}"))))
                }
            },
            Some(Ok(Message::Close(_))) => {
                self.connected.store(false, Ordering::SeqCst);
                None
            }
            Some(Ok(_)) => Some(Ok(ServerEvent::Unknown)),
            Some(Err(e)) => {
                self.connected.store(false, Ordering::SeqCst);
                Some(Err(LiveError::transport(format!("receive error: {e}"))))
            }
            None => {
                self.connected.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: &ClientMessage) -> Result<()> {
        let wire = match message {
            ClientMessage::MediaChunk { mime_type, data } => WireClientMessage {
                realtime_input: Some(WireRealtimeInput {
                    media_chunks: vec![WireMediaChunk {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    }],
                }),
                ..WireClientMessage::empty()
            },
            ClientMessage::ToolResponses(responses) => WireClientMessage {
                tool_response: Some(WireToolResponse {
                    function_responses: responses
                        .iter()
                        .map(|r| WireFunctionResponse {
                            id: r.call_id.clone(),
                            name: r.name.clone(),
                            response: r.output.clone(),
                        })
                        .collect(),
                }),
                ..WireClientMessage::empty()
            },
        };
        self.send_raw(&wire).await
    }

    async fn next_event(&self) -> Option<Result<ServerEvent>> {
        self.receive_raw().await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);

        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Close(None))
            .await
            .map_err(|e| LiveError::transport(format!("close error: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("session_id", &self.session_id)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

/// Translate one inbound JSON message to a unified [`ServerEvent`].
///
/// One event per message. When a message carries several recognized
/// fields, precedence is interrupted, then turnComplete, then model
/// audio, then tool calls; the rest of the message is dropped. Audio
/// riding along with an interruption would be flushed immediately
/// anyway, so nothing observable is lost.
fn translate_event(raw: &str) -> Result<ServerEvent> {
    debug!(%raw, "translating inbound message");
    let value: Value =
        serde_json::from_str(raw).map_err(|e| LiveError::transport(format!("parse error: {e}")))?;

    if let Some(content) = value.get("serverContent") {
        if content.get("interrupted").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(ServerEvent::Interrupted);
        }

        if content.get("turnComplete").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(ServerEvent::TurnComplete);
        }

        if let Some(parts) = content.pointer("/modelTurn/parts").and_then(Value::as_array) {
            for part in parts {
                if let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) {
                    return Ok(ServerEvent::AudioDelta(decode_base64(data)?));
                }
            }
        }
    }

    if let Some(calls) = value.pointer("/toolCall/functionCalls").and_then(Value::as_array) {
        let calls = calls
            .iter()
            .map(|call| ToolCall {
                call_id: call.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
            })
            .collect::<Vec<_>>();
        if !calls.is_empty() {
            return Ok(ServerEvent::ToolCall(calls));
        }
    }

    Ok(ServerEvent::Unknown)
}

fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<Value>> {
    if tools.is_empty() {
        return None;
    }

    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect();

    Some(vec![json!({ "functionDeclarations": declarations })])
}
