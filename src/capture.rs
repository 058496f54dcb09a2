//! Capture pipeline: device acquisition with layered fallback, the audio
//! frame pull loop and throttled video stills.
//!
//! Real device I/O lives outside the crate behind [`MediaBackend`]; the
//! pipeline owns the acquired handle, converts frames to the outbound wire
//! format and pushes them into the transport. Capture never blocks on
//! network backpressure: a failed send is logged and dropped, since stale
//! realtime audio has no value.

use crate::audio::{self, AudioChunk, AudioFormat, VideoFrame};
use crate::config::VIDEO_FRAME_INTERVAL;
use crate::error::{LiveError, Result};
use crate::events::ClientMessage;
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Requested audio capture processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    /// Enable acoustic echo cancellation.
    pub echo_cancellation: bool,
    /// Enable noise suppression.
    pub noise_suppression: bool,
    /// Enable automatic gain control.
    pub auto_gain_control: bool,
    /// Requested channel count (the pipeline consumes mono).
    pub channel_count: u8,
}

impl AudioConstraints {
    /// Full processing chain, requested first.
    pub fn preferred() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            channel_count: 1,
        }
    }

    /// Minimal constraints, the last fallback rung.
    pub fn basic() -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            channel_count: 1,
        }
    }
}

/// Requested video capture parameters (ideal values, not hard limits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Ideal capture width in pixels.
    pub width: u32,
    /// Ideal capture height in pixels.
    pub height: u32,
    /// Ideal capture frame rate.
    pub frame_rate: u32,
}

impl VideoConstraints {
    /// Default camera request: 640x480 at 15 fps.
    pub fn preferred() -> Self {
        Self { width: 640, height: 480, frame_rate: 15 }
    }
}

/// One rung of the device acquisition ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Audio constraints; audio is always requested.
    pub audio: AudioConstraints,
    /// Video constraints, when camera capture was requested.
    pub video: Option<VideoConstraints>,
}

impl MediaConstraints {
    /// Minimal audio-only constraints.
    pub fn basic() -> Self {
        Self { audio: AudioConstraints::basic(), video: None }
    }
}

/// A fixed-size window of mono f32 samples at the device rate. Ephemeral:
/// produced by the device, consumed immediately by the resampler.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Sample values in [-1, 1].
    pub samples: Vec<f32>,
    /// Device sample rate in Hz.
    pub sample_rate: u32,
}

/// Pull-based source of captured audio frames.
///
/// Implementations should yield windows of roughly
/// [`CAPTURE_FRAME_SAMPLES`] samples and return `None` once the underlying
/// device is gone.
#[async_trait]
pub trait AudioSource: Send {
    /// Wait for and return the next captured frame.
    async fn next_frame(&mut self) -> Option<AudioFrame>;
}

/// Source of still frames sampled from a live camera feed.
#[async_trait]
pub trait VideoSource: Send {
    /// Capture the current camera image as a downsized compressed still.
    async fn capture_frame(&mut self) -> Result<VideoFrame>;
}

/// Opaque ownership of live microphone/camera capture.
///
/// Exclusively owned by the capture pipeline; `stop()` releases all tracks
/// and is idempotent.
pub struct MediaDeviceHandle {
    audio: Mutex<Option<Box<dyn AudioSource>>>,
    video: Mutex<Option<Box<dyn VideoSource>>>,
    has_video: bool,
    released: AtomicBool,
}

impl std::fmt::Debug for MediaDeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDeviceHandle")
            .field("has_video", &self.has_video)
            .field("released", &self.is_released())
            .finish()
    }
}

impl MediaDeviceHandle {
    /// Wrap freshly acquired capture sources.
    pub fn new(audio: Box<dyn AudioSource>, video: Option<Box<dyn VideoSource>>) -> Self {
        let has_video = video.is_some();
        Self { audio: Mutex::new(Some(audio)), video: Mutex::new(video), has_video, released: AtomicBool::new(false) }
    }

    /// Whether this handle carries a live camera track.
    pub fn has_video(&self) -> bool {
        self.has_video
    }

    /// Take exclusive ownership of the audio source. Returns `None` if
    /// already taken or released.
    pub fn take_audio(&self) -> Option<Box<dyn AudioSource>> {
        self.audio.lock().take()
    }

    /// Take exclusive ownership of the video source, if any.
    pub fn take_video(&self) -> Option<Box<dyn VideoSource>> {
        self.video.lock().take()
    }

    /// Stop all tracks. Idempotent.
    pub fn stop(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            *self.audio.lock() = None;
            *self.video.lock() = None;
        }
    }

    /// Whether `stop()` has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Device access abstraction supplied by the embedding application.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open capture devices satisfying `constraints`.
    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaDeviceHandle>;
}

/// Acquire media with descending fallback.
///
/// Ladder: requested audio+video constraints; then, if video was requested,
/// audio-only with the same audio constraints; then minimal audio.
/// Exhausting every rung is a [`LiveError::DeviceAccess`].
pub async fn acquire_media(
    backend: &dyn MediaBackend,
    use_video: bool,
) -> Result<MediaDeviceHandle> {
    let preferred = MediaConstraints {
        audio: AudioConstraints::preferred(),
        video: use_video.then(VideoConstraints::preferred),
    };

    let first_err = match backend.open(&preferred).await {
        Ok(handle) => return Ok(handle),
        Err(e) => e,
    };
    warn!(error = %first_err, "preferred media constraints failed, trying fallbacks");

    if use_video {
        let audio_only = MediaConstraints { audio: AudioConstraints::preferred(), video: None };
        match backend.open(&audio_only).await {
            Ok(handle) => return Ok(handle),
            Err(e) => warn!(error = %e, "audio-only constraints failed, trying basic audio"),
        }
    }

    backend.open(&MediaConstraints::basic()).await.map_err(|e| {
        LiveError::device(format!(
            "could not access the microphone or camera; check device permissions ({e})"
        ))
    })
}

/// Converts captured frames into outbound media chunks and pushes them to
/// the transport until stopped.
pub struct CapturePipeline {
    handle: Option<Arc<MediaDeviceHandle>>,
    audio_task: Option<JoinHandle<()>>,
    video_task: Option<JoinHandle<()>>,
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturePipeline {
    /// Create an idle pipeline.
    pub fn new() -> Self {
        Self { handle: None, audio_task: None, video_task: None }
    }

    /// Install a freshly acquired device handle, releasing any previous one.
    pub fn install(&mut self, handle: MediaDeviceHandle) {
        self.stop();
        self.handle = Some(Arc::new(handle));
    }

    /// The current device handle, for local preview only.
    pub fn handle(&self) -> Option<Arc<MediaDeviceHandle>> {
        self.handle.clone()
    }

    /// Begin periodic emission of outbound media to `sink` after `delay`.
    ///
    /// Spawns one task pulling audio frames (resample to 16 kHz PCM16,
    /// base64-encode, send) and, when the handle carries video, a second
    /// task sending one still per second. Both re-check `active` every
    /// iteration and fall silent once it clears. At most one video frame is
    /// ever in flight; ticks that fall behind are skipped, never queued.
    pub fn start_streaming(
        &mut self,
        sink: Arc<dyn Transport>,
        active: Arc<AtomicBool>,
        delay: Duration,
    ) {
        let Some(handle) = self.handle.clone() else {
            warn!("start_streaming called with no device handle");
            return;
        };

        if let Some(mut source) = handle.take_audio() {
            let sink = sink.clone();
            let active = active.clone();
            self.audio_task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                info!(rate = audio::CAPTURE_SAMPLE_RATE, "capture streaming started");

                while active.load(Ordering::SeqCst) {
                    let Some(frame) = source.next_frame().await else {
                        debug!("audio source exhausted");
                        break;
                    };
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }

                    let pcm = audio::resample_to_pcm16(
                        &frame.samples,
                        frame.sample_rate,
                        audio::CAPTURE_SAMPLE_RATE,
                    );
                    let chunk = AudioChunk::from_i16_samples(&pcm, AudioFormat::pcm16_16khz());
                    let message =
                        ClientMessage::media(chunk.format.mime_type(), chunk.to_base64());

                    // Stale audio has no value: drop failed sends, never retry.
                    if let Err(e) = sink.send(&message).await {
                        warn!(error = %e, "outbound audio send failed, dropping frame");
                    }
                }
            }));
        } else {
            warn!("audio source already taken or released");
        }

        if let Some(mut source) = handle.take_video() {
            self.video_task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut ticks = tokio::time::interval(VIDEO_FRAME_INTERVAL);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    ticks.tick().await;
                    if !active.load(Ordering::SeqCst) {
                        return;
                    }
                    match source.capture_frame().await {
                        Ok(frame) => {
                            let message = ClientMessage::media(
                                frame.mime_type(),
                                audio::encode_base64(&frame.data),
                            );
                            if let Err(e) = sink.send(&message).await {
                                warn!(error = %e, "video frame send failed, dropping frame");
                            }
                        }
                        Err(e) => warn!(error = %e, "video frame capture failed"),
                    }
                }
            }));
        }
    }

    /// Release the device and cancel capture tasks. Idempotent.
    ///
    /// Order matters for teardown: video timer first, then the device
    /// tracks, then the audio pull loop.
    pub fn stop(&mut self) {
        if let Some(task) = self.video_task.take() {
            task.abort();
        }
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        if let Some(task) = self.audio_task.take() {
            task.abort();
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
