//! Spoken narration of a report summary
//!
//! The TTS model returns raw 24kHz mono PCM16 as base64 inline data. It is
//! played through its own [`PlaybackQueue`] and can be saved as a WAV file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use hound::{WavSpec, WavWriter};

use crate::audio::codec::{self, OUTPUT_SAMPLE_RATE};
use crate::audio::{AudioError, PlaybackQueue, SpeakerOutput};
use crate::gemini::{Content, GeminiClient, GenerateContentRequest, GenerationConfig, SpeechConfig};

pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_TTS_VOICE: &str = "Kore";

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("nothing to save")]
    Empty,
    #[error("failed to write WAV file: {0}")]
    Wav(#[from] hound::Error),
}

impl SpeechError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SpeechError::Empty => "There is no narration to save yet.",
            SpeechError::Wav(_) => "Could not save the narration.",
        }
    }
}

pub fn narration_prompt(text: &str) -> String {
    format!("Read this summary naturally: {}", text)
}

/// Text-to-speech over `generateContent`
#[derive(Debug, Clone)]
pub struct Narrator {
    client: GeminiClient,
    model: String,
    voice: String,
}

impl Narrator {
    pub fn new(client: GeminiClient, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            voice: voice.into(),
        }
    }

    fn build_request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text(narration_prompt(text))],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::voice(self.voice.clone())),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Synthesize `text` into 24kHz mono PCM16 bytes.
    ///
    /// Returns an empty buffer on any failure; the cause is logged.
    pub async fn synthesize(&self, text: &str) -> Vec<u8> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let response = match self
            .client
            .generate_content(&self.model, &self.build_request(text))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::error!("Narration request failed: {}", e);
                return Vec::new();
            }
        };

        let Some(blob) = response.inline_data() else {
            log::warn!("Narration response carried no audio");
            return Vec::new();
        };

        match codec::decode(&blob.data) {
            Ok(bytes) => {
                log::info!("Narration ready: {} bytes", bytes.len());
                bytes
            }
            Err(e) => {
                log::error!("Narration audio undecodable: {}", e);
                Vec::new()
            }
        }
    }
}

/// Write 24kHz mono PCM16 bytes to a WAV file
pub fn write_wav(path: &Path, pcm: &[u8]) -> Result<(), SpeechError> {
    if pcm.len() < 2 {
        return Err(SpeechError::Empty);
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: OUTPUT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for pair in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
    }
    writer.finalize()?;

    log::info!("Narration saved: {:?}", path);
    Ok(())
}

/// Plays narration audio. Opening the speaker is deferred to the first play.
pub struct NarrationPlayer {
    queue: Arc<Mutex<PlaybackQueue>>,
    output: Option<SpeakerOutput>,
}

impl Default for NarrationPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrationPlayer {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(PlaybackQueue::new(OUTPUT_SAMPLE_RATE))),
            output: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.output.is_some()
            && self
                .queue
                .lock()
                .map(|q| !q.is_idle())
                .unwrap_or(false)
    }

    /// Replace anything currently playing with `pcm`
    pub fn play(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        let buffer = codec::bytes_to_pcm_buffer(pcm, OUTPUT_SAMPLE_RATE, 1);
        if let Ok(mut queue) = self.queue.lock() {
            queue.interrupt();
            queue.enqueue(&buffer);
        }

        if self.output.is_none() {
            self.output = Some(SpeakerOutput::open(self.queue.clone())?);
        }
        log::info!("Narration playing ({:.1}s)", buffer.duration_secs());
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.interrupt();
        }
        if let Some(mut output) = self.output.take() {
            output.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrator() -> Narrator {
        let client = GeminiClient::new("http://127.0.0.1:9/v1beta", "test-key").unwrap();
        Narrator::new(client, DEFAULT_TTS_MODEL, DEFAULT_TTS_VOICE)
    }

    #[test]
    fn test_request_shape() {
        let json = serde_json::to_value(narrator().build_request("Quiet street.")).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["text"],
            "Read this summary naturally: Quiet street."
        );
        assert_eq!(json["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
    }

    #[tokio::test]
    async fn test_synthesize_failure_is_empty() {
        assert!(narrator().synthesize("Quiet street.").await.is_empty());
        assert!(narrator().synthesize("  ").await.is_empty());
    }

    #[test]
    fn test_write_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.wav");
        let pcm = codec::pcm16_to_bytes(&[0, 1000, -1000, i16::MAX]);

        write_wav(&path, &pcm).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX]);
    }

    #[test]
    fn test_write_wav_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            write_wav(&dir.path().join("x.wav"), &[]),
            Err(SpeechError::Empty)
        ));
    }

    #[test]
    fn test_player_idle_before_play() {
        let mut player = NarrationPlayer::new();
        assert!(!player.is_playing());
        player.stop();
        assert!(!player.is_playing());
    }
}
