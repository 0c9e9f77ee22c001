//! Microphone capture pipeline for the live advisor
//!
//! Bridges the CPAL input callback (sync) to the live session (async).
//!
//! # Architecture
//!
//! ```text
//! Audio Thread (sync)              Tokio Runtime (async)
//! ┌──────────────────┐             ┌────────────────────────┐
//! │ CPAL Callback    │──channel──▶ │ run_capture_pump()     │
//! │ mono + try_send  │             │   ├─ mute gate         │
//! └──────────────────┘             │   ├─ resample (16kHz)  │
//!                                  │   ├─ frame (4096)      │
//!                                  │   └─ base64 → session  │
//!                                  └────────────────────────┘
//! ```
//!
//! The callback never blocks: when the channel is full the batch is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::codec::{self, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE};
use super::{AudioError, StreamThread};

/// Default frame size in samples at 16kHz (256ms)
pub const DEFAULT_FRAME_SAMPLES: usize = 4096;

/// Capacity of the callback → pump channel (batches, not samples)
const CAPTURE_CHANNEL_CAPACITY: usize = 64;

/// One encoded capture frame ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Base64 PCM16 little-endian mono
    pub data: String,
    pub mime_type: &'static str,
}

/// Linear resampler that keeps its read position across batches.
///
/// `pos` is measured from the start of the next batch and may sit between the
/// previous batch's last sample (index -1) and the first new one.
#[derive(Debug)]
struct StreamResampler {
    step: f64,
    pos: f64,
    last: Option<f32>,
}

impl StreamResampler {
    fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = if source_rate == 0 || target_rate == 0 {
            1.0
        } else {
            source_rate as f64 / target_rate as f64
        };
        Self {
            step,
            pos: 0.0,
            last: None,
        }
    }

    fn process(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        if self.step == 1.0 {
            out.extend_from_slice(samples);
            return;
        }

        let end = (samples.len() - 1) as f64;
        let previous = self.last.unwrap_or(samples[0]);
        let at = |i: isize| -> f32 {
            if i < 0 {
                previous
            } else {
                samples[(i as usize).min(samples.len() - 1)]
            }
        };

        while self.pos <= end {
            let idx = self.pos.floor();
            let frac = (self.pos - idx) as f32;
            let a = at(idx as isize);
            let b = at(idx as isize + 1);
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        self.pos -= samples.len() as f64;
        self.last = samples.last().copied();
    }
}

/// Slices device-rate samples into fixed 16kHz frames and encodes them.
///
/// The mute flag is read once per frame. Muted frames are still sliced so
/// framing stays aligned, but they are dropped before encoding.
#[derive(Debug)]
pub struct CaptureFramer {
    resampler: StreamResampler,
    frame_samples: usize,
    buffer: Vec<f32>,
    muted: Arc<AtomicBool>,
    frames_sent: u64,
    frames_muted: u64,
}

impl CaptureFramer {
    pub fn new(source_rate: u32, frame_samples: usize, muted: Arc<AtomicBool>) -> Self {
        let frame_samples = frame_samples.max(1);
        log::info!(
            "CaptureFramer: initialized ({}Hz → {}Hz, {} samples per frame)",
            source_rate,
            INPUT_SAMPLE_RATE,
            frame_samples
        );

        Self {
            resampler: StreamResampler::new(source_rate, INPUT_SAMPLE_RATE),
            frame_samples,
            buffer: Vec::with_capacity(frame_samples * 2),
            muted,
            frames_sent: 0,
            frames_muted: 0,
        }
    }

    /// Feed mono samples at the device rate; returns every completed frame
    pub fn push(&mut self, samples: &[f32]) -> Vec<EncodedFrame> {
        self.resampler.process(samples, &mut self.buffer);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_samples {
            let chunk: Vec<f32> = self.buffer.drain(..self.frame_samples).collect();

            if self.muted.load(Ordering::Relaxed) {
                self.frames_muted += 1;
                continue;
            }

            let pcm = codec::float_to_pcm16(&chunk);
            frames.push(EncodedFrame {
                data: codec::encode(&codec::pcm16_to_bytes(&pcm)),
                mime_type: INPUT_MIME_TYPE,
            });
            self.frames_sent += 1;

            // Periodic logging (every 20 frames = ~5 seconds)
            if self.frames_sent % 20 == 0 {
                log::debug!("CaptureFramer: {} frames encoded", self.frames_sent);
            }
        }
        frames
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_muted(&self) -> u64 {
        self.frames_muted
    }

    /// Samples waiting for the next full frame
    pub fn pending_samples(&self) -> usize {
        self.buffer.len()
    }
}

/// Live microphone tap. Dropping it stops capture.
pub struct MicrophoneTap {
    thread: StreamThread,
    dropped_batches: Arc<AtomicU64>,
}

impl MicrophoneTap {
    /// Open the default input device and start forwarding mono samples.
    ///
    /// Returns the tap and the receiver of sample batches at
    /// [`MicrophoneTap::sample_rate`].
    pub fn open() -> Result<(Self, mpsc::Receiver<Vec<f32>>), AudioError> {
        let (tx, rx) = mpsc::channel::<Vec<f32>>(CAPTURE_CHANNEL_CAPACITY);
        let dropped_batches = Arc::new(AtomicU64::new(0));
        let dropped = dropped_batches.clone();

        let thread = StreamThread::spawn("input", move || build_input_stream(tx, dropped))?;

        Ok((
            Self {
                thread,
                dropped_batches,
            },
            rx,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.thread.sample_rate()
    }

    /// Stop capture. Safe to call more than once.
    pub fn close(&mut self) {
        let dropped = self.dropped_batches.load(Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("Capture: {} sample batches dropped (channel full)", dropped);
        }
        self.thread.stop();
    }
}

fn build_input_stream(
    tx: mpsc::Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device
        .default_input_config()
        .map_err(|e| AudioError::PermissionDenied(e.to_string()))?;

    log::info!(
        "Audio input config: {} Hz, {} channels, {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::I16 => build_input_typed::<i16>(&device, &config, tx, dropped)?,
        SampleFormat::U16 => build_input_typed::<u16>(&device, &config, tx, dropped)?,
        SampleFormat::F32 => build_input_typed::<f32>(&device, &config, tx, dropped)?,
        _ => return Err(AudioError::NoSupportedConfig),
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e)))?;

    Ok((stream, sample_rate))
}

fn build_input_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    tx: mpsc::Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let err_fn = |err| log::error!("Audio input stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix::<T>(data, channels);
                if tx.try_send(mono).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::PermissionDenied("input device not available".to_string())
            }
            other => AudioError::StreamCreationFailed(other.to_string()),
        })
}

/// Average interleaved frames down to mono f32
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from_sample_(s)).sum();
            sum / frame.len() as f32
        })
        .collect()
}

/// Drive the framer until the tap closes or the session is cancelled.
///
/// Encoded frames are handed to `out`; the pump stops when the receiver of
/// `out` goes away. Returns the number of frames forwarded.
pub async fn run_capture_pump(
    mut framer: CaptureFramer,
    mut samples_rx: mpsc::Receiver<Vec<f32>>,
    out: mpsc::Sender<EncodedFrame>,
    cancel: CancellationToken,
) -> u64 {
    log::info!("Capture: pump started");
    let mut forwarded = 0u64;

    'pump: loop {
        let samples = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = samples_rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        for frame in framer.push(&samples) {
            // A stalled receiver must not outlive cancellation
            tokio::select! {
                _ = cancel.cancelled() => break 'pump,
                sent = out.send(frame) => {
                    if sent.is_err() {
                        log::debug!("Capture: frame receiver closed");
                        return forwarded;
                    }
                }
            }
            forwarded += 1;
        }
    }

    log::info!(
        "Capture: pump stopped ({} frames forwarded, {} muted)",
        forwarded,
        framer.frames_muted()
    );
    forwarded
}
