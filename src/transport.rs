//! Transport abstraction and bounded connection retry.

use crate::config::{MAX_CONNECT_ATTEMPTS, RETRY_BACKOFF_STEP, SessionConfig};
use crate::error::{LiveError, Result};
use crate::events::{ClientMessage, ServerEvent};
use async_trait::async_trait;
use tracing::{info, warn};

/// One open realtime transport session with the remote service.
///
/// Implementations are assumed to preserve delivery order in both
/// directions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Unique id of this transport session.
    fn session_id(&self) -> &str;

    /// Whether the transport is still open.
    fn is_open(&self) -> bool;

    /// Send one message to the remote service.
    async fn send(&self, message: &ClientMessage) -> Result<()>;

    /// Wait for the next inbound event. `None` means the transport closed.
    async fn next_event(&self) -> Option<Result<ServerEvent>>;

    /// Close the transport gracefully.
    async fn close(&self) -> Result<()>;
}

/// A boxed transport for dynamic dispatch.
pub type BoxedTransport = Box<dyn Transport>;

/// Factory opening transport sessions.
///
/// Every `connect` call builds a fresh client from scratch, so a retry
/// never reuses possibly-poisoned state from a failed attempt.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Open a new transport session configured by `config`.
    async fn connect(&self, config: &SessionConfig) -> Result<BoxedTransport>;
}

/// Attempt to connect up to [`MAX_CONNECT_ATTEMPTS`] times with increasing
/// backoff (0, 1.5 s, 3 s) between attempts.
pub async fn connect_with_retry(
    connector: &dyn RealtimeConnector,
    config: &SessionConfig,
) -> Result<BoxedTransport> {
    let mut last_error = None;

    for attempt in 0..MAX_CONNECT_ATTEMPTS {
        if attempt > 0 {
            let delay = RETRY_BACKOFF_STEP * attempt;
            info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying connection");
            tokio::time::sleep(delay).await;
        }

        match connector.connect(config).await {
            Ok(transport) => return Ok(transport),
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "connection attempt failed");
                last_error = Some(e);
            }
        }
    }

    let detail = last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string());
    Err(LiveError::connection(format!(
        "could not establish session after {MAX_CONNECT_ATTEMPTS} attempts: {detail}"
    )))
}
