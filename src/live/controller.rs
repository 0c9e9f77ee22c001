//! Runs one live session: owns the microphone tap, the playback queue and
//! the socket, and executes the effects produced by [`LiveSession`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::{Inbound, LiveConnection};
use super::protocol::SetupConfig;
use super::session::{events_for, Effect, LiveSession, SessionEvent, SessionState};
use super::LiveError;
use crate::audio::codec::{self, OUTPUT_SAMPLE_RATE};
use crate::audio::{
    run_capture_pump, CaptureFramer, EncodedFrame, MicrophoneTap, PlaybackQueue, SpeakerOutput,
};
use crate::report::PropertyReport;

/// How long to wait for `setupComplete` after the socket opens
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub frame_samples: usize,
}

/// Progress reported to the front-end
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    Active,
    Transcript(String),
    Muted(bool),
    /// Final update; `error` is a user-facing message
    Closed { error: Option<String> },
}

pub fn system_instruction(report: &PropertyReport) -> String {
    let json = serde_json::to_string(report).unwrap_or_default();
    format!(
        "You are a professional UK Property Consultant for NestCheck UK. \
         You are talking to a user about the property at {}. \
         Use this data for your advice: {}. \
         Be helpful, concise, and professional. You have access to the full report data provided. \
         Keep your spoken responses relatively short and conversational.",
        report.address, json
    )
}

#[derive(Debug)]
enum Command {
    ToggleMute,
    Close,
}

/// Handle to a running session task
pub struct LiveController {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveController {
    /// Spawn the session. Must be called inside a tokio runtime.
    pub fn start(
        config: LiveConfig,
        report: &PropertyReport,
    ) -> (Self, mpsc::UnboundedReceiver<LiveUpdate>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let instruction = system_instruction(report);

        log::info!("Live: starting advisor for {}", report.address);
        let task = tokio::spawn(run_session(
            config,
            instruction,
            commands_rx,
            updates_tx,
            cancel.clone(),
        ));

        (
            Self {
                commands: commands_tx,
                cancel,
                task: Some(task),
            },
            updates_rx,
        )
    }

    pub fn toggle_mute(&self) {
        let _ = self.commands.send(Command::ToggleMute);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Close the session and wait for teardown to finish
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Live: session task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything a session owns. Teardown releases each resource once.
struct SessionResources {
    updates: mpsc::UnboundedSender<LiveUpdate>,
    cancel: CancellationToken,
    muted: Arc<AtomicBool>,
    frame_samples: usize,
    queue: Arc<Mutex<PlaybackQueue>>,
    mic: Option<MicrophoneTap>,
    mic_rx: Option<mpsc::Receiver<Vec<f32>>>,
    frames_tx: Option<mpsc::Sender<EncodedFrame>>,
    pump: Option<JoinHandle<u64>>,
    speaker: Option<SpeakerOutput>,
    connection: Option<LiveConnection>,
    error: Option<String>,
    torn_down: bool,
}

impl SessionResources {
    fn new(
        updates: mpsc::UnboundedSender<LiveUpdate>,
        cancel: CancellationToken,
        frame_samples: usize,
    ) -> Self {
        Self {
            updates,
            cancel,
            muted: Arc::new(AtomicBool::new(false)),
            frame_samples,
            queue: Arc::new(Mutex::new(PlaybackQueue::new(OUTPUT_SAMPLE_RATE))),
            mic: None,
            mic_rx: None,
            frames_tx: None,
            pump: None,
            speaker: None,
            connection: None,
            error: None,
            torn_down: false,
        }
    }

    fn notify(&self, update: LiveUpdate) {
        let _ = self.updates.send(update);
    }

    async fn send_frame(&mut self, frame: EncodedFrame) -> Result<(), LiveError> {
        match self.connection.as_mut() {
            Some(connection) => connection.send_frame(frame).await,
            None => Ok(()),
        }
    }

    async fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartCapture => self.start_capture(),
                Effect::EnqueueAudio(bytes) => {
                    let buffer = codec::bytes_to_pcm_buffer(&bytes, OUTPUT_SAMPLE_RATE, 1);
                    if let Ok(mut queue) = self.queue.lock() {
                        queue.enqueue(&buffer);
                    }
                }
                Effect::InterruptPlayback => {
                    if let Ok(mut queue) = self.queue.lock() {
                        queue.interrupt();
                    }
                }
                Effect::TranscriptUpdated(text) => self.notify(LiveUpdate::Transcript(text)),
                Effect::MuteChanged(muted) => {
                    self.muted.store(muted, Ordering::Relaxed);
                    self.notify(LiveUpdate::Muted(muted));
                }
                Effect::ReportError(message) => self.error = Some(message),
                Effect::Teardown => self.teardown().await,
            }
        }
    }

    fn start_capture(&mut self) {
        let (Some(tap), Some(mut samples_rx), Some(frames_tx)) =
            (self.mic.as_ref(), self.mic_rx.take(), self.frames_tx.clone())
        else {
            log::warn!("Live: capture already started");
            return;
        };

        // Discard audio captured while the session was still connecting
        while samples_rx.try_recv().is_ok() {}

        let framer = CaptureFramer::new(tap.sample_rate(), self.frame_samples, self.muted.clone());
        self.pump = Some(tokio::spawn(run_capture_pump(
            framer,
            samples_rx,
            frames_tx,
            self.cancel.clone(),
        )));

        match SpeakerOutput::open(self.queue.clone()) {
            Ok(speaker) => self.speaker = Some(speaker),
            Err(e) => log::error!("Live: failed to open speaker, advisor will be silent: {}", e),
        }

        self.notify(LiveUpdate::Active);
    }

    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        log::info!("Live: tearing down session");

        self.cancel.cancel();
        if let Some(mut mic) = self.mic.take() {
            mic.close();
        }
        self.mic_rx = None;
        self.frames_tx = None;
        if let Some(pump) = self.pump.take() {
            match pump.await {
                Ok(frames) => log::debug!("Live: capture pump forwarded {} frames", frames),
                Err(e) => log::warn!("Live: capture pump failed: {}", e),
            }
        }

        if let Ok(mut queue) = self.queue.lock() {
            queue.interrupt();
        }
        if let Some(mut speaker) = self.speaker.take() {
            speaker.close();
        }
        if let Some(connection) = self.connection.take() {
            connection.disconnect().await;
        }

        let error = self.error.take();
        self.notify(LiveUpdate::Closed { error });
    }
}

async fn apply(session: &mut LiveSession, resources: &mut SessionResources, event: SessionEvent) {
    let effects = session.dispatch(event);
    resources.run(effects).await;
}

async fn run_session(
    config: LiveConfig,
    instruction: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedSender<LiveUpdate>,
    cancel: CancellationToken,
) {
    let mut session = LiveSession::new();
    let mut res = SessionResources::new(updates, cancel.child_token(), config.frame_samples);

    if config.api_key.trim().is_empty() {
        let message = LiveError::MissingApiKey.user_message().to_string();
        apply(&mut session, &mut res, SessionEvent::SetupFailed(message)).await;
        return;
    }

    match MicrophoneTap::open() {
        Ok((tap, samples_rx)) => {
            res.mic = Some(tap);
            res.mic_rx = Some(samples_rx);
        }
        Err(e) => {
            log::error!("Live: microphone unavailable: {}", e);
            let message = LiveError::from(e).user_message().to_string();
            apply(&mut session, &mut res, SessionEvent::SetupFailed(message)).await;
            return;
        }
    }

    let setup = SetupConfig::audio(&config.model, &config.voice, instruction);
    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = LiveConnection::connect(&config.url, &config.api_key, setup) => Some(result),
    };
    let mut connection = match connected {
        None => {
            apply(&mut session, &mut res, SessionEvent::CloseRequested).await;
            return;
        }
        Some(Err(e)) => {
            log::error!("Live: {}", e);
            let message = e.user_message().to_string();
            apply(&mut session, &mut res, SessionEvent::SetupFailed(message)).await;
            return;
        }
        Some(Ok(connection)) => connection,
    };

    let Some(mut incoming) = connection.take_incoming_receiver() else {
        let message = LiveError::SetupTimeout.user_message().to_string();
        apply(&mut session, &mut res, SessionEvent::SetupFailed(message)).await;
        return;
    };
    res.connection = Some(connection);

    let (frames_tx, mut frames_rx) = mpsc::channel::<EncodedFrame>(32);
    res.frames_tx = Some(frames_tx);

    let setup_deadline = tokio::time::sleep(SETUP_TIMEOUT);
    tokio::pin!(setup_deadline);

    while !session.is_closed() {
        let connecting = session.state() == SessionState::Connecting;
        let event = tokio::select! {
            _ = cancel.cancelled() => SessionEvent::CloseRequested,
            command = commands.recv() => match command {
                Some(Command::ToggleMute) => SessionEvent::MuteToggled,
                Some(Command::Close) | None => SessionEvent::CloseRequested,
            },
            inbound = incoming.recv() => match inbound {
                Some(Inbound::Message(message)) => {
                    for event in events_for(&message) {
                        apply(&mut session, &mut res, event).await;
                    }
                    continue;
                }
                Some(Inbound::Closed(reason)) => {
                    log::info!("Live: server closed ({:?})", reason);
                    SessionEvent::Closed
                }
                Some(Inbound::Error(e)) => {
                    let err = LiveError::TransportRuntimeError(e);
                    log::error!("Live: {}", err);
                    SessionEvent::Errored(err.user_message().to_string())
                }
                None => SessionEvent::Closed,
            },
            Some(frame) = frames_rx.recv() => match res.send_frame(frame).await {
                Ok(()) => continue,
                Err(e) => {
                    log::error!("Live: {}", e);
                    SessionEvent::Errored(e.user_message().to_string())
                }
            },
            _ = &mut setup_deadline, if connecting => {
                log::error!("Live: {}", LiveError::SetupTimeout);
                SessionEvent::SetupFailed(LiveError::SetupTimeout.user_message().to_string())
            }
        };
        apply(&mut session, &mut res, event).await;
    }

    log::info!("Live: session finished");
}
