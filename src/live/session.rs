//! Live advisor session state machine
//!
//! All transitions go through [`LiveSession::dispatch`], which returns the
//! effects the controller must carry out. Nothing here touches audio devices
//! or sockets.
//!
//! ```text
//! Connecting ──Opened──▶ Active ──Closed/Errored/CloseRequested──▶ Closed
//!     │                                                            ▲
//!     └────────SetupFailed/Closed/Errored/CloseRequested───────────┘
//! ```

use crate::audio::codec;

use super::protocol::ServerMessage;

/// Maximum characters of model transcript kept for display
pub const TRANSCRIPT_WINDOW_CHARS: usize = 200;

/// Reported when the server hangs up before `setupComplete`
pub const SETUP_CLOSED_MESSAGE: &str = "The live advisor could not start a session.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// `setupComplete` received
    Opened,
    ContentReceived {
        audio: Option<String>,
        transcript: Option<String>,
    },
    Interrupted,
    /// Transport closed by the server
    Closed,
    /// Transport failed after setup (user-facing message)
    Errored(String),
    /// Setup never completed (user-facing message)
    SetupFailed(String),
    CloseRequested,
    MuteToggled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartCapture,
    /// Decoded 24kHz PCM16 bytes
    EnqueueAudio(Vec<u8>),
    InterruptPlayback,
    TranscriptUpdated(String),
    MuteChanged(bool),
    Teardown,
    ReportError(String),
}

/// Rolling window over the model's spoken transcript
#[derive(Debug, Clone, Default)]
pub struct TranscriptWindow {
    text: String,
    fragments: u64,
}

impl TranscriptWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment separated by a space, keeping only the newest
    /// [`TRANSCRIPT_WINDOW_CHARS`] characters.
    pub fn push(&mut self, fragment: &str) -> &str {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(fragment);
        self.fragments += 1;

        let len = self.text.chars().count();
        if len > TRANSCRIPT_WINDOW_CHARS {
            let skip = len - TRANSCRIPT_WINDOW_CHARS;
            let cut = self
                .text
                .char_indices()
                .nth(skip)
                .map(|(i, _)| i)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
        }
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> u64 {
        self.fragments
    }
}

/// Translate one server message into session events, in the order they
/// must be applied (audio, then interruption, then transcript).
pub fn events_for(message: &ServerMessage) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    if message.is_setup_complete() {
        events.push(SessionEvent::Opened);
    }
    for data in message.audio_chunks() {
        events.push(SessionEvent::ContentReceived {
            audio: Some(data.to_string()),
            transcript: None,
        });
    }
    if message.is_interrupted() {
        events.push(SessionEvent::Interrupted);
    }
    if let Some(text) = message.transcript_text() {
        events.push(SessionEvent::ContentReceived {
            audio: None,
            transcript: Some(text.to_string()),
        });
    }
    if let Some(go_away) = &message.go_away {
        log::warn!("Live: server going away ({:?} left)", go_away.time_left);
    }

    events
}

#[derive(Debug, Clone)]
pub struct LiveSession {
    state: SessionState,
    transcript: TranscriptWindow,
    muted: bool,
    dropped_chunks: u64,
}

impl Default for LiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSession {
    /// A new session starts in `Connecting`
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            transcript: TranscriptWindow::new(),
            muted: false,
            dropped_chunks: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn transcript(&self) -> &str {
        self.transcript.text()
    }

    fn close(&mut self, error: Option<String>) -> Vec<Effect> {
        self.state = SessionState::Closed;
        match error {
            Some(message) => vec![Effect::ReportError(message), Effect::Teardown],
            None => vec![Effect::Teardown],
        }
    }

    /// Apply one event; returns the effects to run, in order
    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<Effect> {
        use SessionEvent as E;
        use SessionState as S;

        match (self.state, event) {
            // Closed is absorbing
            (S::Closed, event) => {
                log::debug!("Live: ignoring {:?} after close", event);
                vec![]
            }

            (_, E::MuteToggled) => {
                self.muted = !self.muted;
                log::info!(
                    "Live: microphone {}",
                    if self.muted { "muted" } else { "unmuted" }
                );
                vec![Effect::MuteChanged(self.muted)]
            }
            (_, E::CloseRequested) => {
                log::info!("Live: close requested");
                self.close(None)
            }

            // -----------------
            // Connecting
            // -----------------
            (S::Connecting, E::Opened) => {
                log::info!("Live: session active");
                self.state = S::Active;
                vec![Effect::StartCapture]
            }
            (S::Connecting, E::SetupFailed(message)) | (S::Connecting, E::Errored(message)) => {
                log::warn!("Live: setup failed: {}", message);
                self.close(Some(message))
            }
            (S::Connecting, E::Closed) => {
                log::warn!("Live: connection closed before setup completed");
                self.close(Some(SETUP_CLOSED_MESSAGE.to_string()))
            }
            (S::Connecting, event) => {
                log::debug!("Live: ignoring {:?} while connecting", event);
                vec![]
            }

            // -----------------
            // Active
            // -----------------
            (S::Active, E::ContentReceived { audio, transcript }) => {
                let mut effects = Vec::new();
                if let Some(data) = audio {
                    match codec::decode(&data) {
                        Ok(bytes) => effects.push(Effect::EnqueueAudio(bytes)),
                        Err(e) => {
                            self.dropped_chunks += 1;
                            log::warn!(
                                "Live: dropping undecodable audio ({} so far): {}",
                                self.dropped_chunks,
                                e
                            );
                        }
                    }
                }
                if let Some(text) = transcript {
                    let window = self.transcript.push(&text).to_string();
                    effects.push(Effect::TranscriptUpdated(window));
                }
                effects
            }
            (S::Active, E::Interrupted) => {
                log::debug!("Live: model interrupted");
                vec![Effect::InterruptPlayback]
            }
            (S::Active, E::Closed) => {
                log::info!("Live: server closed the session");
                self.close(None)
            }
            (S::Active, E::Errored(message)) => {
                log::warn!("Live: transport error: {}", message);
                self.close(Some(message))
            }
            (S::Active, event) => {
                log::debug!("Live: ignoring {:?} while active", event);
                vec![]
            }
        }
    }
}
