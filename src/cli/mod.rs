//! Interactive terminal front-end
//!
//! One loop owns [`AppState`]. User commands and task completions both
//! arrive as [`Inbox`] messages; screen changes go through
//! [`app_state::reduce`] and the resulting effects are spawned as tasks that
//! report back into the same inbox.

pub mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::app_state::{self, AppState, Effect, Event};
use crate::gemini::GeminiClient;
use crate::identity::{AuthError, FirebaseAuth, IdentityProvider, IDENTITY_TOOLKIT_URL};
use crate::lead::{ChatMessage, GeminiDialogueModel, LeadAgent};
use crate::live::{LiveConfig, LiveController, LiveUpdate};
use crate::report::{DeepDiveStreamer, ReportFetcher};
use crate::settings::AppSettings;
use crate::speech::{self, NarrationPlayer, Narrator};

/// One parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Compare(String),
    Back,
    Deep,
    Listen,
    Save(PathBuf),
    Advisor,
    Mute,
    Hangup,
    Pro(Option<String>),
    New,
    SignIn { email: String, password: String },
    SignUp { email: String, password: String },
    SignOut,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let required = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("Usage: {} {}", word, what))
        } else {
            Ok(rest.to_string())
        }
    };
    let credentials = || -> Result<(String, String), String> {
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(email), Some(password), None) => Ok((email.to_string(), password.to_string())),
            _ => Err(format!("Usage: {} <email> <password>", word)),
        }
    };

    match word.to_ascii_lowercase().as_str() {
        "search" => required("<address>").map(Command::Search),
        "compare" => required("<address>").map(Command::Compare),
        "back" => Ok(Command::Back),
        "deep" => Ok(Command::Deep),
        "listen" => Ok(Command::Listen),
        "save" => required("<file.wav>").map(|p| Command::Save(PathBuf::from(p))),
        "advisor" => Ok(Command::Advisor),
        "mute" => Ok(Command::Mute),
        "hangup" => Ok(Command::Hangup),
        "pro" => Ok(Command::Pro(
            Some(rest.to_string()).filter(|r| !r.is_empty()),
        )),
        "new" => Ok(Command::New),
        "signin" => credentials().map(|(email, password)| Command::SignIn { email, password }),
        "signup" => credentials().map(|(email, password)| Command::SignUp { email, password }),
        "signout" => Ok(Command::SignOut),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err(String::new()),
        other => Err(format!("Unknown command `{}`. Type `help`.", other)),
    }
}

/// Remote collaborators, built once from settings
pub struct Services {
    pub fetcher: Arc<ReportFetcher>,
    pub deep_dive: DeepDiveStreamer,
    pub narrator: Narrator,
    pub chat: GeminiDialogueModel,
    pub live: LiveConfig,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl Services {
    pub fn new(
        settings: &AppSettings,
        client: GeminiClient,
        firebase_api_key: Option<String>,
    ) -> Self {
        let identity: Option<Arc<dyn IdentityProvider>> = match firebase_api_key {
            Some(key) => match FirebaseAuth::new(IDENTITY_TOOLKIT_URL, key) {
                Ok(auth) => Some(Arc::new(auth)),
                Err(e) => {
                    log::warn!("Identity service unavailable: {}", e);
                    None
                }
            },
            None => None,
        };

        Self {
            fetcher: Arc::new(ReportFetcher::new(
                client.clone(),
                settings.report_model.clone(),
                settings.report_temperature,
            )),
            deep_dive: DeepDiveStreamer::new(
                client.clone(),
                settings.deep_dive_model.clone(),
                settings.thinking_budget,
            ),
            narrator: Narrator::new(
                client.clone(),
                settings.tts_model.clone(),
                settings.tts_voice.clone(),
            ),
            chat: GeminiDialogueModel::new(client.clone(), settings.chat_model.clone()),
            live: LiveConfig {
                url: settings.live_url.clone(),
                api_key: client.api_key().to_string(),
                model: settings.live_model.clone(),
                voice: settings.live_voice.clone(),
                frame_samples: settings.capture_frame_samples,
            },
            identity,
        }
    }
}

/// Everything the loop reacts to
#[derive(Debug)]
enum Inbox {
    Line(String),
    InputClosed,
    App(Event),
    Live(LiveUpdate),
    LeadReply(Vec<ChatMessage>, Option<String>),
    Narration(Vec<u8>),
    SignedIn(Result<String, AuthError>),
    SignedUp(Result<String, AuthError>),
}

pub struct App {
    services: Services,
    state: AppState,
    inbox_tx: mpsc::UnboundedSender<Inbox>,
    inbox_rx: mpsc::UnboundedReceiver<Inbox>,
    player: NarrationPlayer,
    last_narration: Vec<u8>,
    live: Option<LiveController>,
    lead: Option<Arc<Mutex<LeadAgent<GeminiDialogueModel>>>>,
}

impl App {
    /// `skip_auth` opens the search form without an identity check
    pub fn new(services: Services, skip_auth: bool) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let verified = skip_auth
            || services
                .identity
                .as_ref()
                .map(|i| i.is_verified())
                .unwrap_or(false);
        Self {
            services,
            state: AppState {
                verified,
                ..Default::default()
            },
            inbox_tx,
            inbox_rx,
            player: NarrationPlayer::new(),
            last_narration: Vec::new(),
            live: None,
            lead: None,
        }
    }

    /// Run until `quit` or end of input
    pub async fn run(mut self) {
        spawn_stdin_reader(self.inbox_tx.clone());
        println!("NestCheck UK property reports. Type `help` for commands.");
        println!("{}", render::screen(&self.state));
        prompt();

        while let Some(message) = self.inbox_rx.recv().await {
            match message {
                Inbox::Line(line) => match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => self.handle_command(command).await,
                    Err(usage) if usage.is_empty() => {}
                    Err(usage) => println!("{}", usage),
                },
                Inbox::InputClosed => break,
                Inbox::App(event) => self.dispatch(event),
                Inbox::Live(update) => self.on_live_update(update),
                Inbox::LeadReply(messages, error) => {
                    for message in &messages {
                        println!("{}", render::chat_message(message));
                    }
                    if let Some(error) = error {
                        println!("{}", error);
                    }
                }
                Inbox::Narration(pcm) => self.on_narration(pcm),
                Inbox::SignedIn(result) => self.on_signed_in(result),
                Inbox::SignedUp(result) => match result {
                    Ok(email) => println!(
                        "{}",
                        AuthError::VerificationSent(email).user_message()
                    ),
                    Err(e) => println!("{}", e.user_message()),
                },
            }
            prompt();
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        log::info!("Shutting down");
        self.player.stop();
        if let Some(live) = self.live.take() {
            live.close().await;
        }
    }

    fn dispatch(&mut self, event: Event) {
        log::debug!("App event: {:?}", event);
        let before = self.state.screen.name();
        let (next, effects) = app_state::reduce(&self.state, event);
        if before != next.screen.name() {
            log::info!("Screen: {} -> {}", before, next.screen.name());
        }
        self.state = next;

        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Render => println!("{}", render::screen(&self.state)),
            Effect::ShowAuth => println!("{}", render::screen(&AppState::default())),
            Effect::Notify(message) => println!("{}", message),
            Effect::Print(text) => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            Effect::FetchReport { id, address } => {
                let fetcher = self.services.fetcher.clone();
                let tx = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let result = fetcher
                        .fetch(&address)
                        .await
                        .map_err(|e| e.user_message().to_string());
                    let _ = tx.send(Inbox::App(Event::ReportFetched { id, result }));
                });
            }
            Effect::FetchComparison { id, address } => {
                let fetcher = self.services.fetcher.clone();
                let tx = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let result = fetcher
                        .fetch(&address)
                        .await
                        .map_err(|e| e.user_message().to_string());
                    let _ = tx.send(Inbox::App(Event::ComparisonFetched { id, result }));
                });
            }
            Effect::StreamDeepDive { id, report } => {
                let mut chunks = self.services.deep_dive.stream(&report);
                let tx = self.inbox_tx.clone();
                tokio::spawn(async move {
                    while let Some(chunk) = chunks.next().await {
                        if tx.send(Inbox::App(Event::DeepDiveChunk { id, chunk })).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Inbox::App(Event::DeepDiveFinished { id }));
                });
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Search(address) => self.dispatch(Event::Search { address }),
            Command::Compare(address) => {
                if self.state.screen.primary_report().is_none() {
                    println!("Search for a property first.");
                }
                self.dispatch(Event::Compare { address })
            }
            Command::Back => self.dispatch(Event::CloseComparison),
            Command::New => {
                self.player.stop();
                self.dispatch(Event::Reset)
            }
            Command::Deep => self.dispatch(Event::DeepDive),
            Command::Listen => self.toggle_narration(),
            Command::Save(path) => {
                if self.last_narration.is_empty() {
                    println!("Nothing to save yet. Use `listen` first.");
                    return;
                }
                match speech::write_wav(&path, &self.last_narration) {
                    Ok(()) => println!("Saved {}", path.display()),
                    Err(e) => {
                        log::error!("Saving narration failed: {}", e);
                        println!("{}", e.user_message());
                    }
                }
            }
            Command::Advisor => self.start_advisor(),
            Command::Mute => match &self.live {
                Some(live) => live.toggle_mute(),
                None => println!("No live session is open."),
            },
            Command::Hangup => match self.live.take() {
                Some(live) => live.close().await,
                None => println!("No live session is open."),
            },
            Command::Pro(message) => self.lead_turn(message).await,
            Command::SignIn { email, password } => {
                let Some(identity) = self.services.identity.clone() else {
                    println!("{}", AuthError::MissingApiKey.user_message());
                    return;
                };
                let tx = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let result = identity.sign_in(&email, &password).await.map(|i| i.email);
                    let _ = tx.send(Inbox::SignedIn(result));
                });
            }
            Command::SignUp { email, password } => {
                let Some(identity) = self.services.identity.clone() else {
                    println!("{}", AuthError::MissingApiKey.user_message());
                    return;
                };
                let tx = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let result = identity.sign_up(&email, &password).await;
                    let _ = tx.send(Inbox::SignedUp(result));
                });
            }
            Command::SignOut => {
                if let Some(identity) = &self.services.identity {
                    identity.sign_out();
                }
                self.player.stop();
                if let Some(live) = self.live.take() {
                    live.close().await;
                }
                self.lead = None;
                self.dispatch(Event::SignedOut);
            }
            Command::Help => println!("{}", render::help()),
            Command::Quit => {}
        }
    }

    fn on_signed_in(&mut self, result: Result<String, AuthError>) {
        match result {
            Ok(email) => {
                println!("Signed in as {}", email);
                self.dispatch(Event::SignedIn);
            }
            Err(e) => println!("{}", e.user_message()),
        }
    }

    fn toggle_narration(&mut self) {
        if self.player.is_playing() {
            self.player.stop();
            println!("Narration stopped.");
            return;
        }
        let Some(report) = self.state.screen.primary_report() else {
            println!("Search for a property first.");
            return;
        };

        let narrator = self.services.narrator.clone();
        let summary = report.summary.clone();
        let tx = self.inbox_tx.clone();
        println!("Preparing narration...");
        tokio::spawn(async move {
            let pcm = narrator.synthesize(&summary).await;
            let _ = tx.send(Inbox::Narration(pcm));
        });
    }

    fn on_narration(&mut self, pcm: Vec<u8>) {
        if pcm.is_empty() {
            println!("{}", crate::speech::SpeechError::Empty.user_message());
            return;
        }
        if !narration_allowed(self.live.as_ref().map(LiveController::is_finished)) {
            log::info!("Narration ready while the live advisor is open; not playing");
            println!("Narration is ready. Use `hangup` then `listen` to hear it.");
            self.last_narration = pcm;
            return;
        }
        if let Err(e) = self.player.play(&pcm) {
            log::error!("Narration playback failed: {}", e);
            println!("Could not play audio on this device.");
        }
        self.last_narration = pcm;
    }

    fn start_advisor(&mut self) {
        if self.live.as_ref().is_some_and(|l| !l.is_finished()) {
            println!("A live session is already open. Use `hangup` to end it.");
            return;
        }
        let Some(report) = self.state.screen.primary_report() else {
            println!("Search for a property first.");
            return;
        };

        // Narration and the advisor share the speaker
        self.player.stop();
        let (controller, mut updates) = LiveController::start(self.services.live.clone(), report);
        self.live = Some(controller);
        println!("Connecting to the live advisor...");

        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if tx.send(Inbox::Live(update)).is_err() {
                    break;
                }
            }
        });
    }

    fn on_live_update(&mut self, update: LiveUpdate) {
        match update {
            LiveUpdate::Active => println!("Advisor connected. Speak now; `hangup` to end."),
            LiveUpdate::Transcript(text) => println!("advisor> {}", text),
            LiveUpdate::Muted(true) => println!("Microphone muted."),
            LiveUpdate::Muted(false) => println!("Microphone live."),
            LiveUpdate::Closed { error } => {
                self.live = None;
                match error {
                    Some(message) => println!("Advisor session ended: {}", message),
                    None => println!("Advisor session ended."),
                }
            }
        }
    }

    async fn lead_turn(&mut self, message: Option<String>) {
        let agent = match &self.lead {
            Some(agent) => agent.clone(),
            None => {
                let agent = Arc::new(Mutex::new(LeadAgent::new(self.services.chat.clone())));
                for line in agent.lock().await.transcript() {
                    println!("{}", render::chat_message(line));
                }
                self.lead = Some(agent.clone());
                agent
            }
        };
        let Some(message) = message else {
            return;
        };

        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let mut agent = agent.lock().await;
            let before = agent.transcript().len();
            let error = match agent.send(&message).await {
                Ok(_) => None,
                Err(e) => Some(e.user_message().to_string()),
            };
            // Skip the echoed user line
            let replies = agent.transcript()[before..]
                .iter()
                .filter(|m| m.speaker == crate::lead::Speaker::Agent)
                .cloned()
                .collect();
            let _ = tx.send(Inbox::LeadReply(replies, error));
        });
    }
}

/// Narration may only open the speaker when no live session holds it.
///
/// `live_finished` is `None` without a session, otherwise whether it ended.
fn narration_allowed(live_finished: Option<bool>) -> bool {
    live_finished.unwrap_or(true)
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Inbox>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(Inbox::Line(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(Inbox::InputClosed);
                    break;
                }
                Err(e) => {
                    log::error!("Reading input failed: {}", e);
                    let _ = tx.send(Inbox::InputClosed);
                    break;
                }
            }
        }
    });
}
