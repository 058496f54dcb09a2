//! Audio formats, sample-rate conversion and the binary/text codec.
//!
//! The remote service consumes mono PCM16 at 16 kHz and produces mono PCM16
//! at 24 kHz. Captured device audio arrives as f32 frames at whatever rate
//! the device runs at; [`resample_to_pcm16`] converts it. The transport is
//! text-oriented, so binary payloads cross it base64-encoded.

use crate::error::{LiveError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample rate for outbound (captured) audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate for inbound (synthesized) audio.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Encode bytes as standard-alphabet base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard-alphabet base64 back into bytes.
///
/// Exact inverse of [`encode_base64`] for every byte sequence.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| LiveError::transport(format!("invalid base64 payload: {e}")))
}

/// Quantize one f32 sample to PCM16.
///
/// The signed range is asymmetric, so negative samples scale by 0x8000 and
/// non-negative ones by 0x7FFF; values outside [-1, 1] clamp first.
fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 { (s * 32768.0).round() as i16 } else { (s * 32767.0).round() as i16 }
}

/// Resample f32 samples at `source_rate` into PCM16 at `target_rate`.
///
/// Equal rates quantize sample-for-sample. Otherwise each output sample is
/// linearly interpolated between the two nearest input samples at the
/// fractional source index, and the output holds
/// `floor(input.len() / (source_rate / target_rate))` samples.
///
/// Pure and stateless; safe to call concurrently on independent inputs.
pub fn resample_to_pcm16(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if source_rate == target_rate {
        return input.iter().copied().map(quantize).collect();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = (input.len() as f64 / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let index = pos as usize;
        let next = (index + 1).min(input.len() - 1);
        let frac = (pos - index as f64) as f32;
        let value = input[index] * (1.0 - frac) + input[next] * frac;
        out.push(quantize(value));
    }

    out
}

/// Complete audio format specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono).
    pub channels: u8,
    /// Bits per sample.
    pub bits_per_sample: u8,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_24khz()
    }
}

impl AudioFormat {
    /// Outbound capture format: mono PCM16 at 16 kHz.
    pub fn pcm16_16khz() -> Self {
        Self { sample_rate: CAPTURE_SAMPLE_RATE, channels: 1, bits_per_sample: 16 }
    }

    /// Inbound playback format: mono PCM16 at 24 kHz.
    pub fn pcm16_24khz() -> Self {
        Self { sample_rate: PLAYBACK_SAMPLE_RATE, channels: 1, bits_per_sample: 16 }
    }

    /// Media-type tag used on the wire for this format.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Bytes per second of audio in this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (self.bits_per_sample / 8) as u32
    }

    /// Playback duration of `bytes` bytes of audio in this format.
    pub fn duration(&self, bytes: usize) -> Duration {
        Duration::from_secs_f64(bytes as f64 / self.bytes_per_second() as f64)
    }
}

/// One encoded audio segment crossing the capture→transport or
/// transport→playback boundary. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw PCM16 little-endian bytes.
    pub data: Vec<u8>,
    /// Format of this chunk.
    pub format: AudioFormat,
}

impl AudioChunk {
    /// Create a new audio chunk.
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    /// Create a chunk from i16 samples (PCM16 little-endian bytes).
    pub fn from_i16_samples(samples: &[i16], format: AudioFormat) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(data, format)
    }

    /// Playback duration of this chunk.
    pub fn duration(&self) -> Duration {
        self.format.duration(self.data.len())
    }

    /// Encode the payload for the text-oriented transport.
    pub fn to_base64(&self) -> String {
        encode_base64(&self.data)
    }
}

/// A downsized still image sampled from the live camera feed.
/// Immutable once captured.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Compressed (JPEG) image bytes.
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Create a new video frame.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Media-type tag used on the wire for still frames.
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_resample_preserves_length_and_sign() {
        let input = [0.5f32, -0.5, 0.0, 1.0, -1.0, 0.25, -0.75];
        let out = resample_to_pcm16(&input, 16_000, 16_000);
        assert_eq!(out.len(), input.len());
        for (src, dst) in input.iter().zip(&out) {
            assert_eq!(src.is_sign_negative() && *src != 0.0, *dst < 0);
        }
    }

    #[test]
    fn test_resample_output_length() {
        let input = vec![0.0f32; 4800];
        // 48 kHz -> 16 kHz: ratio 3, floor(4800 / 3) = 1600
        assert_eq!(resample_to_pcm16(&input, 48_000, 16_000).len(), 1600);
        // 44.1 kHz -> 16 kHz: floor(4800 / 2.75625) = 1741
        assert_eq!(resample_to_pcm16(&input, 44_100, 16_000).len(), 1741);
    }

    #[test]
    fn test_quantization_bounds() {
        let out = resample_to_pcm16(&[1.0, -1.0, 2.0, -2.0], 16_000, 16_000);
        assert_eq!(out, vec![32767, -32768, 32767, -32768]);
    }

    #[test]
    fn test_resample_empty_input() {
        assert!(resample_to_pcm16(&[], 48_000, 16_000).is_empty());
        assert!(resample_to_pcm16(&[], 16_000, 16_000).is_empty());
    }

    #[test]
    fn test_linear_interpolation_midpoint() {
        // 2:1 downsample of a ramp hits every other source sample exactly.
        let input = [0.0f32, 0.1, 0.2, 0.3];
        let out = resample_to_pcm16(&input, 32_000, 16_000);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], quantize(0.2));
    }

    #[test]
    fn test_format_duration() {
        let format = AudioFormat::pcm16_24khz();
        assert_eq!(format.bytes_per_second(), 48_000);
        assert_eq!(format.duration(48_000), Duration::from_secs(1));
        assert_eq!(format.duration(4800), Duration::from_millis(100));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(AudioFormat::pcm16_16khz().mime_type(), "audio/pcm;rate=16000");
        assert_eq!(AudioFormat::pcm16_24khz().mime_type(), "audio/pcm;rate=24000");
    }

    #[test]
    fn test_chunk_from_i16_samples() {
        let chunk = AudioChunk::from_i16_samples(&[1, -1, 256], AudioFormat::pcm16_16khz());
        assert_eq!(chunk.data, vec![1, 0, 255, 255, 0, 1]);
    }

    #[test]
    fn test_base64_empty_roundtrip() {
        assert_eq!(decode_base64(&encode_base64(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(decode_base64("not base64!!").is_err());
    }

    proptest! {
        #[test]
        fn prop_base64_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let encoded = encode_base64(&bytes);
            prop_assert_eq!(decode_base64(&encoded).unwrap(), bytes);
        }

        #[test]
        fn prop_quantization_in_range(sample in -1.0f32..=1.0f32) {
            // i16 cannot be out of range by construction; check monotonic sign.
            let q = quantize(sample);
            if sample < 0.0 {
                prop_assert!(q <= 0);
            } else {
                prop_assert!(q >= 0);
            }
        }
    }
}
