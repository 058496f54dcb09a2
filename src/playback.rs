//! Gapless playback scheduling for inbound audio segments.
//!
//! Segments arrive whenever the network delivers them, faster or slower
//! than real time. The scheduler keeps a running "next free playback time"
//! cursor and starts each segment at `max(now, cursor)`, so segments play
//! back-to-back in arrival order with no gap or overlap regardless of
//! arrival jitter. The cursor, not wall-clock arrival time, is
//! authoritative.

use crate::audio::AudioChunk;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Receives scheduled audio and speaking transitions.
///
/// `play` is called at each segment's scheduled start with the raw PCM16
/// bytes; the implementation owns the actual audio output device.
pub trait PlaybackSink: Send + Sync {
    /// Play one segment of PCM16 audio, starting now.
    fn play(&self, pcm: Vec<u8>);

    /// The first segment since silence started playing.
    fn speaking_started(&self) {}

    /// The last scheduled segment finished and nothing else is queued.
    fn speaking_ended(&self) {}
}

struct SchedulerState {
    cursor: Instant,
    epoch: u64,
    outstanding: usize,
    speaking: bool,
}

/// Schedules decoded audio segments back-to-back and flushes them on
/// interruption.
pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    state: Arc<Mutex<SchedulerState>>,
}

impl PlaybackScheduler {
    /// Create a scheduler delivering audio to `sink`.
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(SchedulerState {
                cursor: Instant::now(),
                epoch: 0,
                outstanding: 0,
                speaking: false,
            })),
        }
    }

    /// Schedule one segment at `max(now, cursor)` and advance the cursor
    /// past it.
    ///
    /// An odd trailing byte is truncated to the nearest whole sample; a
    /// chunk without a whole sample is dropped.
    pub fn enqueue(&self, chunk: AudioChunk) {
        let whole = chunk.data.len() & !1;
        if whole == 0 {
            return;
        }
        let pcm = chunk.data[..whole].to_vec();
        let duration = chunk.format.duration(whole);

        let now = Instant::now();
        let (start, epoch) = {
            let mut state = self.state.lock();
            let start = state.cursor.max(now);
            state.cursor = start + duration;
            state.outstanding += 1;
            (start, state.epoch)
        };

        let sink = self.sink.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(start).await;

            let started = {
                let mut st = state.lock();
                if st.epoch != epoch {
                    // Flushed while we slept; the segment is cancelled.
                    return;
                }
                !std::mem::replace(&mut st.speaking, true)
            };
            if started {
                sink.speaking_started();
            }
            sink.play(pcm);

            tokio::time::sleep(duration).await;
            let ended = {
                let mut st = state.lock();
                if st.epoch != epoch {
                    return;
                }
                st.outstanding -= 1;
                st.outstanding == 0 && std::mem::replace(&mut st.speaking, false)
            };
            if ended {
                sink.speaking_ended();
            }
        });
    }

    /// Cancel every scheduled and playing segment immediately and reset the
    /// cursor to now, so the next segment starts exactly "now" rather than
    /// after previously planned audio. No-op when nothing is scheduled.
    pub fn flush(&self) {
        let was_speaking = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.outstanding = 0;
            state.cursor = Instant::now();
            std::mem::replace(&mut state.speaking, false)
        };
        if was_speaking {
            debug!("playback flushed mid-speech");
            self.sink.speaking_ended();
        }
    }

    /// The earliest time the next segment may start.
    pub fn cursor(&self) -> Instant {
        self.state.lock().cursor
    }

    /// Whether a segment is currently playing.
    pub fn is_speaking(&self) -> bool {
        self.state.lock().speaking
    }

    /// Number of segments scheduled but not yet finished.
    pub fn scheduled(&self) -> usize {
        self.state.lock().outstanding
    }
}
