//! End-to-end session lifecycle against scripted transports and media
//! backends.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use voicelink::audio::encode_base64;
use voicelink::{
    AudioFrame, AudioSource, BoxedTransport, ClientMessage, LiveError, MediaBackend,
    MediaConstraints, MediaDeviceHandle, NoOpCallbacks, PlaybackSink, RealtimeConnector, Result,
    ServerEvent, SessionCallbacks, SessionConfig, SessionManager, SessionState, ToolCall,
    Transport,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .try_init();
}

struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&self, _pcm: Vec<u8>) {}
}

struct SilenceSource;

#[async_trait]
impl AudioSource for SilenceSource {
    async fn next_frame(&mut self) -> Option<AudioFrame> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Some(AudioFrame { samples: vec![0.0; 4096], sample_rate: 48_000 })
    }
}

/// Grants audio; refuses any rung that asks for video.
struct AudioOnlyBackend;

#[async_trait]
impl MediaBackend for AudioOnlyBackend {
    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaDeviceHandle> {
        if constraints.video.is_some() {
            return Err(LiveError::device("no camera"));
        }
        Ok(MediaDeviceHandle::new(Box::new(SilenceSource), None))
    }
}

struct ScriptedTransport {
    sent: Arc<parking_lot::Mutex<Vec<ClientMessage>>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<ServerEvent>>>,
}

impl ScriptedTransport {
    fn new() -> (
        BoxedTransport,
        mpsc::UnboundedSender<Result<ServerEvent>>,
        Arc<parking_lot::Mutex<Vec<ClientMessage>>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let transport = Box::new(Self { sent: sent.clone(), events: tokio::sync::Mutex::new(rx) });
        (transport, tx, sent)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn session_id(&self) -> &str {
        "scripted"
    }

    fn is_open(&self) -> bool {
        true
    }

    async fn send(&self, message: &ClientMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        Ok(())
    }

    async fn next_event(&self) -> Option<Result<ServerEvent>> {
        self.events.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct ScriptedConnector {
    outcomes: parking_lot::Mutex<VecDeque<Result<BoxedTransport>>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    fn new(outcomes: Vec<Result<BoxedTransport>>) -> Self {
        Self { outcomes: parking_lot::Mutex::new(outcomes.into()), attempts: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl RealtimeConnector for ScriptedConnector {
    async fn connect(&self, _config: &SessionConfig) -> Result<BoxedTransport> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LiveError::connection("script exhausted")))
    }
}

#[derive(Default)]
struct RecordingCallbacks {
    audio_events: AtomicUsize,
    interruptions: AtomicUsize,
    turns: AtomicUsize,
    closes: AtomicUsize,
    errors: AtomicUsize,
    notes: parking_lot::Mutex<Vec<(String, Vec<String>)>>,
}

impl SessionCallbacks for RecordingCallbacks {
    fn on_audio_data(&self, _pcm: &[u8]) {
        self.audio_events.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interrupted(&self) {
        self.interruptions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_turn_complete(&self) {
        self.turns.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &LiveError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_create_note(&self, title: &str, items: &[String]) -> Result<()> {
        self.notes.lock().push((title.to_string(), items.to_vec()));
        Ok(())
    }
}

/// Poll `condition` until it holds or a real-time deadline passes.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn test_connect_without_prepare_fails() {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));

    let result = manager.connect(SessionConfig::default(), Arc::new(NoOpCallbacks)).await;
    assert!(matches!(result, Err(LiveError::NotPrepared)));
}

#[tokio::test]
async fn test_prepare_degrades_to_audio_only() -> anyhow::Result<()> {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));

    manager.prepare(true).await?;
    let handle = manager.capture_handle().unwrap();
    assert!(!handle.has_video());
    assert!(!handle.is_released());
    Ok(())
}

#[tokio::test]
async fn test_wake_up_signal_is_first_outbound_message() -> anyhow::Result<()> {
    init_tracing();
    let (transport, _tx, sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), Arc::new(NoOpCallbacks)).await?;

    {
        let messages = sent.lock();
        assert_eq!(
            messages[0],
            ClientMessage::media("audio/pcm;rate=16000", encode_base64(&[0u8; 3200]))
        );
    }
    manager.stop();
    Ok(())
}

#[tokio::test]
async fn test_connect_while_active_is_noop() -> anyhow::Result<()> {
    init_tracing();
    let (transport, _tx, _sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager =
        SessionManager::new(Arc::new(AudioOnlyBackend), connector.clone(), Arc::new(NullSink));

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), Arc::new(NoOpCallbacks)).await?;
    assert_eq!(manager.state(), SessionState::Active);

    manager.connect(SessionConfig::default(), Arc::new(NoOpCallbacks)).await?;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    manager.stop();
    Ok(())
}

#[tokio::test]
async fn test_server_events_reach_callbacks() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, _sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;

    tx.send(Ok(ServerEvent::AudioDelta(vec![0u8; 4800])))?;
    tx.send(Ok(ServerEvent::Interrupted))?;
    tx.send(Ok(ServerEvent::TurnComplete))?;

    wait_for(|| callbacks.turns.load(Ordering::SeqCst) == 1).await;
    assert_eq!(callbacks.audio_events.load(Ordering::SeqCst), 1);
    assert_eq!(callbacks.interruptions.load(Ordering::SeqCst), 1);
    manager.stop();
    Ok(())
}

#[tokio::test]
async fn test_create_note_tool_call_round_trip() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;

    tx.send(Ok(ServerEvent::ToolCall(vec![ToolCall {
        call_id: "call-42".to_string(),
        name: "createNote".to_string(),
        arguments: json!({"title": "Resumo", "items": ["Ponto 1", "Ponto 2"]}),
    }])))?;

    wait_for(|| !callbacks.notes.lock().is_empty()).await;
    {
        let notes = callbacks.notes.lock();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "Resumo");
        assert_eq!(notes[0].1, vec!["Ponto 1".to_string(), "Ponto 2".to_string()]);
    }

    wait_for(|| sent.lock().iter().any(|m| matches!(m, ClientMessage::ToolResponses(_)))).await;
    let messages = sent.lock();
    let responses = messages
        .iter()
        .find_map(|m| match m {
            ClientMessage::ToolResponses(r) => Some(r.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].call_id, "call-42");
    assert_eq!(responses[0].name, "createNote");
    assert_eq!(responses[0].output, json!({"result": "Note created successfully."}));
    drop(messages);
    manager.stop();
    Ok(())
}

#[tokio::test]
async fn test_unknown_tool_gets_no_response() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;

    tx.send(Ok(ServerEvent::ToolCall(vec![ToolCall {
        call_id: "call-9".to_string(),
        name: "launchRockets".to_string(),
        arguments: json!({}),
    }])))?;
    tx.send(Ok(ServerEvent::TurnComplete))?;

    wait_for(|| callbacks.turns.load(Ordering::SeqCst) == 1).await;
    assert!(callbacks.notes.lock().is_empty());
    assert!(!sent.lock().iter().any(|m| matches!(m, ClientMessage::ToolResponses(_))));
    manager.stop();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_reports_error_once_and_releases_media() -> anyhow::Result<()> {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let manager =
        SessionManager::new(Arc::new(AudioOnlyBackend), connector.clone(), Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    let handle = manager.capture_handle().unwrap();

    let result = manager.connect(SessionConfig::default(), callbacks.clone()).await;
    assert!(matches!(result, Err(LiveError::Connection(_))));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(callbacks.errors.load(Ordering::SeqCst), 1);
    assert!(handle.is_released());
    assert_eq!(manager.state(), SessionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_remote_close_fires_on_close_and_tears_down() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, _sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    let handle = manager.capture_handle().unwrap();
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;

    drop(tx); // remote closes

    wait_for(|| callbacks.closes.load(Ordering::SeqCst) == 1).await;
    assert_eq!(manager.state(), SessionState::Closed);
    assert!(handle.is_released());
    assert_eq!(callbacks.errors.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_transport_error_fires_on_error_and_tears_down() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, _sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;

    tx.send(Err(LiveError::transport("socket reset")))?;

    wait_for(|| callbacks.errors.load(Ordering::SeqCst) == 1).await;
    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(callbacks.closes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_is_idempotent_from_any_state() -> anyhow::Result<()> {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));

    // Never prepared: still safe.
    manager.stop();
    manager.stop();

    manager.prepare(false).await?;
    let handle = manager.capture_handle().unwrap();
    manager.stop();
    manager.stop();
    assert!(handle.is_released());
    assert!(manager.capture_handle().is_none());
    assert_eq!(manager.state(), SessionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_callbacks_silent_after_stop() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, _sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;
    manager.stop();

    // Events after local teardown must not reach callbacks.
    let _ = tx.send(Ok(ServerEvent::TurnComplete));
    drop(tx);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(callbacks.turns.load(Ordering::SeqCst), 0);
    assert_eq!(callbacks.closes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_drop_without_stop_releases_resources() -> anyhow::Result<()> {
    init_tracing();
    let (transport, tx, _sent) = ScriptedTransport::new();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));
    let callbacks = Arc::new(RecordingCallbacks::default());

    manager.prepare(false).await?;
    let handle = manager.capture_handle().unwrap();
    manager.connect(SessionConfig::default(), callbacks.clone()).await?;

    // Dropping the manager without stop() must tear the session down, not
    // leave the dispatch task parked on the transport.
    drop(manager);
    assert!(handle.is_released());

    let _ = tx.send(Ok(ServerEvent::TurnComplete));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(callbacks.turns.load(Ordering::SeqCst), 0);
    assert_eq!(callbacks.closes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_prepare_replaces_previous_session() -> anyhow::Result<()> {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let manager = SessionManager::new(Arc::new(AudioOnlyBackend), connector, Arc::new(NullSink));

    manager.prepare(false).await?;
    let first = manager.capture_handle().unwrap();

    manager.prepare(false).await?;
    assert!(first.is_released());
    assert!(!manager.capture_handle().unwrap().is_released());
    Ok(())
}
