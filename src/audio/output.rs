//! Speaker output driving a shared [`PlaybackQueue`]
//!
//! The output callback pulls samples from the queue at the queue's rate
//! (24kHz) and stretches them to the device rate. The queue's clock therefore
//! advances exactly as fast as the device consumes audio.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};

use super::codec;
use super::playback::PlaybackQueue;
use super::{AudioError, StreamThread};

/// Running speaker stream. Dropping it stops playback.
pub struct SpeakerOutput {
    thread: StreamThread,
}

impl SpeakerOutput {
    /// Open the default output device and start rendering from `queue`
    pub fn open(queue: Arc<Mutex<PlaybackQueue>>) -> Result<Self, AudioError> {
        let thread = StreamThread::spawn("output", move || build_output_stream(queue))?;
        Ok(Self { thread })
    }

    pub fn sample_rate(&self) -> u32 {
        self.thread.sample_rate()
    }

    /// Stop playback. Safe to call more than once.
    pub fn close(&mut self) {
        self.thread.stop();
    }
}

fn build_output_stream(
    queue: Arc<Mutex<PlaybackQueue>>,
) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)?;

    log::info!("Using audio output device: {:?}", device.name());

    let supported_config = device
        .default_output_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::I16 => build_output_typed::<i16>(&device, &config, queue)?,
        SampleFormat::U16 => build_output_typed::<u16>(&device, &config, queue)?,
        SampleFormat::F32 => build_output_typed::<f32>(&device, &config, queue)?,
        _ => return Err(AudioError::NoSupportedConfig),
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e)))?;

    Ok((stream, sample_rate))
}

fn build_output_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    queue: Arc<Mutex<PlaybackQueue>>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let device_rate = config.sample_rate.0;
    let err_fn = |err| log::error!("Audio output stream error: {}", err);
    let mut puller = RatePuller::default();
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                let mono = match queue.lock() {
                    Ok(mut q) => {
                        let needed = puller.frames_needed(frames, q.sample_rate(), device_rate);
                        scratch.resize(needed, 0.0);
                        q.render(&mut scratch);
                        codec::stretch(&scratch, frames)
                    }
                    Err(_) => vec![0.0; frames],
                };

                for (frame, &value) in data.chunks_mut(channels).zip(mono.iter()) {
                    for sample in frame.iter_mut() {
                        *sample = T::from_sample_(value);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))
}

/// Converts device frame counts to queue frame counts without drifting.
#[derive(Debug, Default)]
struct RatePuller {
    carry: f64,
}

impl RatePuller {
    fn frames_needed(&mut self, device_frames: usize, queue_rate: u32, device_rate: u32) -> usize {
        if device_rate == 0 {
            return device_frames;
        }
        let exact = device_frames as f64 * queue_rate as f64 / device_rate as f64 + self.carry;
        let whole = exact.floor();
        self.carry = exact - whole;
        whole as usize
    }
}
