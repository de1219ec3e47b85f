//! Frame encoding and PCM16 wire helpers.
//!
//! Capture blocks arrive as `f32` samples at [`INPUT_SAMPLE_RATE`]; the remote
//! service expects little-endian PCM16, base64 encoded and tagged with a MIME
//! type. Inbound speech comes back the same way at [`OUTPUT_SAMPLE_RATE`].

use crate::error::DecodeError;
use base64::Engine;
use serde::Serialize;

pub const INPUT_SAMPLE_RATE: u32 = 16_000;
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Samples per capture block (~256 ms at 16 kHz).
pub const CAPTURE_BLOCK_SIZE: usize = 4096;
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// An immutable block of mono linear PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decodes a base64 PCM16 payload into a frame at `sample_rate`.
    pub fn from_pcm16_base64(data: &str, sample_rate: u32) -> Result<Self, DecodeError> {
        Ok(Self::new(decode_pcm16_base64(data)?, sample_rate))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// A wire-ready media payload understood by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: String,
}

/// The result of encoding one capture block.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBlock {
    pub blob: MediaBlob,
    /// RMS loudness in `[0, 1]`.
    pub level: f32,
}

/// Turns captured float blocks into outbound frames.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    mime_type: String,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self {
            mime_type: INPUT_MIME_TYPE.to_string(),
        }
    }
}

impl FrameEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            mime_type: format!("audio/pcm;rate={sample_rate}"),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn encode(&self, block: &[f32]) -> EncodedBlock {
        EncodedBlock {
            blob: MediaBlob {
                mime_type: self.mime_type.clone(),
                data: encode_f32_to_base64_i16(block),
            },
            level: rms_level(block),
        }
    }
}

/// Root-mean-square of the block, clamped to `[0, 1]`. Empty and non-finite
/// blocks report silence.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum / samples.len() as f64).sqrt() as f32;
    if rms.is_nan() {
        0.0
    } else {
        rms.clamp(0.0, 1.0)
    }
}

/// Encodes `f32` samples as base64 little-endian PCM16.
pub fn encode_f32_to_base64_i16(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Decodes base64 little-endian PCM16 into `f32` samples in `[-1, 1]`.
pub fn decode_pcm16_base64(base64_fragment: &str) -> Result<Vec<f32>, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rms_level_bounds() {
        assert_eq!(rms_level(&[0.0; CAPTURE_BLOCK_SIZE]), 0.0);
        assert_abs_diff_eq!(rms_level(&[1.0; CAPTURE_BLOCK_SIZE]), 1.0, epsilon = 0.01);
        assert_abs_diff_eq!(rms_level(&[-1.0; CAPTURE_BLOCK_SIZE]), 1.0, epsilon = 0.01);
        assert_eq!(rms_level(&[]), 0.0);

        // Out-of-range input still clamps.
        assert_eq!(rms_level(&[4.0, -4.0]), 1.0);
        assert_eq!(rms_level(&[f32::NAN, 0.5]), 0.0);
        assert_eq!(rms_level(&[f32::INFINITY]), 1.0);
    }

    #[test]
    fn test_rms_level_square_wave() {
        let block: Vec<f32> = (0..CAPTURE_BLOCK_SIZE)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_abs_diff_eq!(rms_level(&block), 0.5, epsilon = 0.001);
    }

    #[test]
    fn test_encoder_tags_and_levels() {
        let encoder = FrameEncoder::default();
        let encoded = encoder.encode(&[0.5, -0.5, 0.5, -0.5]);

        assert_eq!(encoded.blob.mime_type, "audio/pcm;rate=16000");
        assert_abs_diff_eq!(encoded.level, 0.5, epsilon = 0.001);

        // 0.5 * 32768 = 16384 = 0x4000 -> [0x00, 0x40]
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded.blob.data)
            .unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &[0x00, 0x40]);
        assert_eq!(&bytes[2..4], &[0x00, 0xC0]);
    }

    #[test]
    fn test_encoder_custom_rate() {
        assert_eq!(FrameEncoder::new(24_000).mime_type(), "audio/pcm;rate=24000");
    }

    #[test]
    fn test_blob_serializes_camel_case() {
        let blob = FrameEncoder::default().encode(&[0.0]).blob;
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["data"], "AAA=");
    }

    #[test]
    fn test_encode_clamps_full_scale() {
        let encoded = encode_f32_to_base64_i16(&[2.0, -2.0, 1.0]);
        let decoded = decode_pcm16_base64(&encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(decoded.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_abs_diff_eq!(decoded[1], -1.0, epsilon = 0.0001);
    }

    #[test]
    fn test_decode_pcm16_base64() {
        let data = base64::engine::general_purpose::STANDARD.encode([0x00u8, 0x40, 0x00, 0x80]);
        let decoded = decode_pcm16_base64(&data).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_abs_diff_eq!(decoded[0], 0.5, epsilon = 0.0001);
        assert_abs_diff_eq!(decoded[1], -1.0, epsilon = 0.0001);

        assert!(decode_pcm16_base64("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            decode_pcm16_base64("invalid_base64!"),
            Err(DecodeError::InvalidBase64(_))
        ));

        let odd = base64::engine::general_purpose::STANDARD.encode([0x00u8, 0x40, 0x01]);
        assert_eq!(decode_pcm16_base64(&odd), Err(DecodeError::OddLength(3)));
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 12_000], OUTPUT_SAMPLE_RATE);
        assert_abs_diff_eq!(frame.duration(), 0.5, epsilon = 1e-9);
        assert_eq!(AudioFrame::new(vec![0.0; 10], 0).duration(), 0.0);

        let data = encode_f32_to_base64_i16(&vec![0.1; 2400]);
        let frame = AudioFrame::from_pcm16_base64(&data, OUTPUT_SAMPLE_RATE).unwrap();
        assert_abs_diff_eq!(frame.duration(), 0.1, epsilon = 1e-9);
        assert_eq!(frame.sample_rate(), OUTPUT_SAMPLE_RATE);
    }
}
