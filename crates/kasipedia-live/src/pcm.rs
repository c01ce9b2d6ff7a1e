//! PCM codec — float samples to 16-bit little-endian wire form and back.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use kasipedia_core::error::{KasipediaError, Result};

/// Microphone capture rate expected by the live API.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Rate of synthesized audio coming back from the live API.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// A window of mono samples at a fixed sample rate. Immutable once produced.
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

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Encode float samples in [-1, 1] as signed 16-bit little-endian PCM.
///
/// Out-of-range samples are clamped. Negative values scale by 32768,
/// positive by 32767, so both rails are reachable without overflow.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let v = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode 16-bit little-endian PCM into a mono frame, dividing by 32768.0.
///
/// Multi-channel input is downmixed by averaging. Fails with
/// `MalformedAudio` if the byte length is not a whole number of sample
/// groups.
pub fn decode_chunk(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioFrame> {
    if channels == 0 {
        return Err(KasipediaError::MalformedAudio("zero channels".into()));
    }
    let stride = 2 * channels as usize;
    if bytes.len() % stride != 0 {
        return Err(KasipediaError::MalformedAudio(format!(
            "chunk of {} bytes is not a multiple of {} (16-bit x {} channels)",
            bytes.len(),
            stride,
            channels
        )));
    }

    let mut samples = Vec::with_capacity(bytes.len() / stride);
    for group in bytes.chunks_exact(stride) {
        let mut acc = 0.0f32;
        for pair in group.chunks_exact(2) {
            let v = i16::from_le_bytes([pair[0], pair[1]]);
            acc += v as f32 / 32768.0;
        }
        samples.push(acc / channels as f32);
    }

    Ok(AudioFrame::new(samples, sample_rate))
}

/// Binary-to-text wire encoding (standard base64).
pub fn wire_encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Inverse of [`wire_encode`]; fails with `MalformedAudio` on invalid input.
pub fn wire_decode(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| KasipediaError::MalformedAudio(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip_within_one_step() {
        let samples: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.013).sin() * 0.9)
            .collect();

        let bytes = encode_frame(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);

        let frame = decode_chunk(&bytes, CAPTURE_SAMPLE_RATE, 1).unwrap();
        assert_eq!(frame.samples().len(), samples.len());
        for (orig, decoded) in samples.iter().zip(frame.samples()) {
            assert!(
                (orig - decoded).abs() <= 1.0 / 32768.0,
                "sample drifted more than one quantization step: {orig} vs {decoded}"
            );
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_frame(&[2.0, -2.0, 1.0, -1.0]);
        let decode = |i: usize| i16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        assert_eq!(decode(0), i16::MAX);
        assert_eq!(decode(1), i16::MIN);
        assert_eq!(decode(2), i16::MAX);
        assert_eq!(decode(3), i16::MIN);
    }

    #[test]
    fn test_encode_empty() {
        assert!(encode_frame(&[]).is_empty());
        let frame = decode_chunk(&[], PLAYBACK_SAMPLE_RATE, 1).unwrap();
        assert!(frame.samples().is_empty());
        assert_eq!(frame.duration(), 0.0);
    }

    #[test]
    fn test_decode_rejects_partial_sample_group() {
        let err = decode_chunk(&[0, 1, 2], PLAYBACK_SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, KasipediaError::MalformedAudio(_)));

        // 6 bytes is 3 mono samples but 1.5 stereo groups
        assert!(decode_chunk(&[0; 6], PLAYBACK_SAMPLE_RATE, 2).is_err());
        assert!(decode_chunk(&[0; 6], PLAYBACK_SAMPLE_RATE, 1).is_ok());
    }

    #[test]
    fn test_decode_zero_channels() {
        assert!(decode_chunk(&[0, 0], PLAYBACK_SAMPLE_RATE, 0).is_err());
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1000i16.to_le_bytes());
        bytes.extend_from_slice(&3000i16.to_le_bytes());
        let frame = decode_chunk(&bytes, PLAYBACK_SAMPLE_RATE, 2).unwrap();
        assert_eq!(frame.samples().len(), 1);
        assert!((frame.samples()[0] - 2000.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_wire_roundtrip_all_lengths() {
        for len in 0..64usize {
            let bytes: Vec<u8> = (0..len).map(|i| ((i * 31 + 7) % 256) as u8).collect();
            let text = wire_encode(&bytes);
            assert!(text.is_ascii());
            assert_eq!(wire_decode(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn test_wire_decode_rejects_garbage() {
        assert!(matches!(
            wire_decode("not base64!!"),
            Err(KasipediaError::MalformedAudio(_))
        ));
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 24_000], PLAYBACK_SAMPLE_RATE);
        assert_eq!(frame.duration(), 1.0);
        let frame = AudioFrame::new(vec![0.0; 4096], CAPTURE_SAMPLE_RATE);
        assert!((frame.duration() - 0.256).abs() < 1e-9);
    }
}
