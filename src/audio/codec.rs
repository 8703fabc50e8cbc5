//! PCM transport codec.
//!
//! The live endpoint exchanges audio as base64-wrapped 16-bit little-endian
//! PCM. Encoding clamps input samples to [-1, 1] before quantizing; the
//! decode side rejects odd byte counts and invalid base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::VoiceError;

/// A decoded audio buffer ready for the playback scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PlaybackSegment {
    /// Playable duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Encode f32 samples as base64 16-bit LE PCM for the transport.
pub fn encode_pcm(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32768.0) as i16;
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }
    BASE64.encode(&bytes)
}

/// Decode base64 16-bit LE PCM back to f32 samples.
pub fn decode_samples(data: &str) -> Result<Vec<f32>, VoiceError> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| VoiceError::Decode(format!("invalid base64: {}", e)))?;
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "odd PCM byte count: {}",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|chunk| {
            let pcm = i16::from_le_bytes([chunk[0], chunk[1]]);
            pcm as f32 / 32768.0
        })
        .collect();
    Ok(samples)
}

/// Decode a transport payload into a playback segment at the given
/// output rate and channel count.
pub fn decode_pcm(
    data: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<PlaybackSegment, VoiceError> {
    let samples = decode_samples(data)?;
    Ok(PlaybackSegment {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_quantization_error() {
        let input: Vec<f32> = (0..256).map(|i| (i as f32 / 128.0) - 1.0).collect();
        let encoded = encode_pcm(&input);
        let decoded = decode_samples(&encoded).unwrap();
        assert_eq!(decoded.len(), input.len());
        for (a, b) in input.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let encoded = encode_pcm(&[2.0, -2.0]);
        let decoded = decode_samples(&encoded).unwrap();
        // 2.0 clamps to 1.0 which quantizes to i16::MAX (32768 saturates).
        assert!(decoded[0] > 0.99);
        assert!(decoded[1] <= -0.99);
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let err = decode_samples("not!!base64@@").unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_odd_byte_count() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        let odd = BASE64.encode([0u8, 1, 2]);
        let err = decode_samples(&odd).unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn test_decode_pcm_segment_duration() {
        let encoded = encode_pcm(&vec![0.0f32; 24_000]);
        let segment = decode_pcm(&encoded, 24_000, 1).unwrap();
        assert_eq!(segment.samples.len(), 24_000);
        assert!((segment.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_round_trips() {
        let encoded = encode_pcm(&[]);
        assert_eq!(decode_samples(&encoded).unwrap(), Vec::<f32>::new());
    }
}
