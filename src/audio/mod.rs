//! Audio module for NestCheck
//!
//! Microphone capture and speaker playback for the live advisor and the
//! narrated summary. Uses CPAL for device I/O; wire conversions live in
//! [`codec`].
//!
//! CPAL streams are not `Send`, so each one is owned by a dedicated thread
//! ([`StreamThread`]) and controlled through a channel.

pub mod capture;
pub mod codec;
mod output;
pub mod playback;

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

pub use capture::{run_capture_pump, CaptureFramer, EncodedFrame, MicrophoneTap};
pub use codec::{PcmBuffer, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
pub use output::SpeakerOutput;
pub use playback::{PlaybackHandle, PlaybackQueue};

/// Errors that can occur opening or running audio devices.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoInputDevice,
    #[error("No audio output device found")]
    NoOutputDevice,
    #[error("No supported audio configuration")]
    NoSupportedConfig,
    #[error("Microphone access was denied: {0}")]
    PermissionDenied(String),
    #[error("Failed to create audio stream: {0}")]
    StreamCreationFailed(String),
    #[error("Failed to write audio data: {0}")]
    WriteFailed(String),
}

/// A CPAL stream living on its own thread.
///
/// Dropping the handle (or calling [`StreamThread::stop`]) stops the stream.
pub struct StreamThread {
    stop_tx: Option<std_mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
    sample_rate: u32,
    label: &'static str,
}

impl StreamThread {
    /// Spawn a thread that builds and plays a stream, then parks until stopped.
    ///
    /// `build` runs on the new thread and returns the playing stream and its
    /// sample rate. Build errors are returned to the caller.
    pub fn spawn<F>(label: &'static str, build: F) -> Result<Self, AudioError>
    where
        F: FnOnce() -> Result<(cpal::Stream, u32), AudioError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, AudioError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name(format!("nestcheck-{}", label))
            .spawn(move || match build() {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    // Returns on stop() or when the handle is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                    log::debug!("Audio thread {} exiting", label);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        let sample_rate = ready_rx.recv().map_err(|_| {
            AudioError::StreamCreationFailed(format!("{} thread exited during setup", label))
        })??;

        log::info!("Audio {} stream running at {} Hz", label, sample_rate);

        Ok(Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
            sample_rate,
            label,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop the stream and join its thread. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("Audio {} thread panicked", self.label);
            } else {
                log::info!("Audio {} stream stopped", self.label);
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}
