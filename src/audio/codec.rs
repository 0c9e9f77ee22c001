//! PCM16 <-> base64 conversions for the live session wire format
//!
//! The Gemini Live API only carries raw little-endian PCM16 inside JSON, so
//! every binary frame crossing the network goes through this module.
//!
//! # Formats
//!
//! - Outbound (microphone): 16kHz mono, `audio/pcm;rate=16000`
//! - Inbound (model speech): 24kHz mono

use base64::{engine::general_purpose::STANDARD, Engine};

/// Sample rate of microphone frames sent to the live session
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio returned by the live session and TTS
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME type attached to every outbound capture frame
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Error decoding wire audio
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 audio payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Multi-channel float sample buffer (one `Vec` per channel)
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frame_count())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Encode raw bytes as transport-safe base64 text
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text back into raw bytes
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(text)?)
}

/// Interpret little-endian PCM16 bytes as a de-interleaved float buffer.
///
/// Each sample is normalized by 32768, so values land in [-1.0, 1.0).
/// A trailing odd byte or incomplete frame is dropped.
pub fn bytes_to_pcm_buffer(bytes: &[u8], sample_rate: u32, channel_count: usize) -> PcmBuffer {
    let channel_count = channel_count.max(1);
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let frame_count = samples.len() / channel_count;

    let channels = (0..channel_count)
        .map(|channel| {
            (0..frame_count)
                .map(|i| samples[i * channel_count + channel] as f32 / 32768.0)
                .collect()
        })
        .collect();

    PcmBuffer {
        sample_rate,
        channels,
    }
}

/// Convert float samples (nominally [-1, 1]) to PCM16.
///
/// Scales by 32768 and saturates; out-of-range input clips instead of
/// wrapping around.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            if s.is_nan() {
                return 0;
            }
            (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Serialize PCM16 samples as little-endian bytes
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|&s| s.to_le_bytes()).collect()
}

/// Resample using linear interpolation.
///
/// Used to bring device-rate capture down to 16kHz and to stretch 24kHz
/// speech to whatever rate the output device runs at.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    // Guard against division by zero
    if target_rate == 0 || source_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let step = source_rate as f64 / target_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

/// Stretch or squeeze `samples` to exactly `out_len` samples.
///
/// Linear interpolation; used per output callback where the device asks for
/// a fixed number of frames.
pub fn stretch(samples: &[f32], out_len: usize) -> Vec<f32> {
    if samples.len() == out_len {
        return samples.to_vec();
    }
    if samples.is_empty() || out_len == 0 {
        return vec![0.0; out_len];
    }

    let step = samples.len() as f64 / out_len as f64;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_arbitrary_bytes() {
        let inputs: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0xff, 0x00, 0x7f],
            (0..=255u8).collect(),
        ];
        for bytes in inputs {
            assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not base64!!").is_err());
    }

    #[test]
    fn test_bytes_to_pcm_buffer_mono() {
        // 0x4000 = 16384 -> 0.5, 0x8000 = -32768 -> -1.0
        let bytes = vec![0x00, 0x40, 0x00, 0x80, 0x00, 0x00];
        let buffer = bytes_to_pcm_buffer(&bytes, OUTPUT_SAMPLE_RATE, 1);

        assert_eq!(buffer.channels.len(), 1);
        assert_eq!(buffer.channels[0], vec![0.5, -1.0, 0.0]);
        assert_eq!(buffer.frame_count(), 3);
    }

    #[test]
    fn test_bytes_to_pcm_buffer_deinterleaves() {
        let samples = [100i16, -100, 200, -200];
        let buffer = bytes_to_pcm_buffer(&pcm16_to_bytes(&samples), 16_000, 2);

        assert_eq!(buffer.channels[0], vec![100.0 / 32768.0, 200.0 / 32768.0]);
        assert_eq!(buffer.channels[1], vec![-100.0 / 32768.0, -200.0 / 32768.0]);
    }

    #[test]
    fn test_bytes_to_pcm_buffer_drops_odd_byte() {
        let buffer = bytes_to_pcm_buffer(&[0x01, 0x00, 0x05], 24_000, 1);
        assert_eq!(buffer.frame_count(), 1);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let bytes = pcm16_to_bytes(&[i16::MIN, i16::MAX]);
        let buffer = bytes_to_pcm_buffer(&bytes, 24_000, 1);
        assert!(buffer.channels[0].iter().all(|s| (-1.0..1.0).contains(s)));
    }

    #[test]
    fn test_duration() {
        let buffer = bytes_to_pcm_buffer(&vec![0u8; 48_000], OUTPUT_SAMPLE_RATE, 1);
        assert!((buffer.duration_secs() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_float_to_pcm16_saturates() {
        let out = float_to_pcm16(&[0.0, 0.5, -1.0, 1.0, 2.0, -3.0, f32::NAN]);
        assert_eq!(out, vec![0, 16384, i16::MIN, i16::MAX, i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn test_pcm16_to_bytes_little_endian() {
        assert_eq!(pcm16_to_bytes(&[0x1234, 0x5678]), vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn test_resample_same_rate() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_resample_down_3x() {
        let input: Vec<f32> = (0..48).map(|i| i as f32).collect();
        let output = resample(&input, 48_000, 16_000);
        assert_eq!(output.len(), 16);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 3.0);
    }

    #[test]
    fn test_resample_up_interpolates() {
        let output = resample(&[0.0, 1.0], 12_000, 24_000);
        assert_eq!(output.len(), 4);
        assert_eq!(output[1], 0.5);
    }

    #[test]
    fn test_resample_zero_rate() {
        let input = vec![0.25, 0.5];
        assert_eq!(resample(&input, 0, 16_000), input);
        assert_eq!(resample(&input, 48_000, 0), input);
    }

    #[test]
    fn test_stretch_exact_length() {
        assert_eq!(stretch(&[0.0, 1.0], 4), vec![0.0, 0.5, 1.0, 1.0]);
        assert_eq!(stretch(&[], 3), vec![0.0; 3]);
        assert_eq!(stretch(&[0.2; 5], 5), vec![0.2; 5]);
    }

    #[test]
    fn test_to_mono_averages() {
        let buffer = PcmBuffer {
            sample_rate: 16_000,
            channels: vec![vec![1.0, 0.0], vec![0.0, 0.0]],
        };
        assert_eq!(buffer.to_mono(), vec![0.5, 0.0]);
    }
}
