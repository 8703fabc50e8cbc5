//! Serene — voice companion core.
//!
//! Communicates with the UI frontend via JSON-line IPC on stdin/stdout.
//! This is the entry point that loads configuration and runs the main
//! event loop: frontend commands on one side, live-session events on the
//! other.

mod audio;
mod chat;
mod config;
mod error;
mod gemini;
mod ipc;
mod session;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audio::capture::{list_input_devices, list_output_devices};
use audio::codec::PlaybackSegment;
use audio::playback::{PlaybackScheduler, OUTPUT_SAMPLE_RATE};
use chat::emotion::{analyze_emotion, Emotion};
use chat::strategies::find_relevant_strategy;
use chat::title::generate_title;
use chat::{ChatMessage, ChatSession, MessageSender};
use config::Config;
use error::VoiceError;
use gemini::GeminiClient;
use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{UiCommand, UiEvent};
use session::{LiveSession, LiveSessionConfig, SessionEvent};

/// Results from spawned enrichment tasks, applied on the main loop.
/// Each carries the chat session id it was computed for so results
/// arriving after a `new_session` are dropped.
#[derive(Debug)]
enum Enrichment {
    Emotion {
        chat_id: String,
        message_id: String,
        emotion: Emotion,
    },
    Strategy {
        chat_id: String,
        title: String,
        description: String,
    },
    Title {
        chat_id: String,
        title: String,
    },
}

struct App {
    config: Config,
    gemini: GeminiClient,
    session: Option<LiveSession>,
    chat: ChatSession,
    /// First-turn title generation has been kicked off for this chat.
    titled: bool,
    /// Spoken replies silenced; sticky across calls.
    muted: bool,
    /// A call start is in flight on a spawned task. Cleared by the
    /// arriving result or by `end_call` cancelling it.
    call_pending: bool,
    /// Identifies the current start attempt so a result from a cancelled
    /// or superseded attempt is torn down instead of installed.
    call_seq: u64,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    call_tx: mpsc::UnboundedSender<(u64, Result<LiveSession, VoiceError>)>,
    enrich_tx: mpsc::UnboundedSender<Enrichment>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // Logs go to stderr; stdout is the IPC channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Emit starting event immediately so the frontend knows we're alive.
    emit_event(&UiEvent::Starting {});

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            emit_error(&e.to_string());
            std::process::exit(1);
        }
    };
    info!(settings = ?config.settings, "Configuration loaded");

    let mut cmd_rx = spawn_stdin_reader();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();
    let (call_tx, mut call_rx) = mpsc::unbounded_channel();
    let (enrich_tx, mut enrich_rx) = mpsc::unbounded_channel();

    let mut app = App {
        gemini: GeminiClient::new(&config.api_key),
        config,
        session: None,
        chat: ChatSession::new(),
        titled: false,
        muted: false,
        call_pending: false,
        call_seq: 0,
        session_tx,
        call_tx,
        enrich_tx,
    };

    emit_event(&UiEvent::Ready {});
    info!("Serene core ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !app.handle_command(command) {
                            break; // Stop command received
                        }
                    }
                    None => {
                        // stdin closed — parent process gone
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            Some(event) = session_rx.recv() => {
                app.handle_session_event(event);
            }
            Some((seq, result)) = call_rx.recv() => {
                app.handle_call_result(seq, result);
            }
            Some(result) = enrich_rx.recv() => {
                app.apply_enrichment(result);
            }
        }
    }

    if let Some(mut session) = app.session.take() {
        session.stop();
    }
    info!("Serene core shutting down");
}

impl App {
    /// Handle a single command from the frontend.
    /// Returns `false` if the main loop should exit.
    fn handle_command(&mut self, cmd: UiCommand) -> bool {
        match cmd {
            UiCommand::Ping {} => {
                emit_event(&UiEvent::Pong {});
            }

            UiCommand::Stop {} => {
                emit_event(&UiEvent::Stopping {});
                return false;
            }

            UiCommand::ListAudioDevices {} => {
                emit_event(&UiEvent::AudioDevices {
                    input: list_input_devices(),
                    output: list_output_devices(),
                });
            }

            UiCommand::StartCall { voice } => {
                self.start_call(voice);
            }

            UiCommand::EndCall {} => {
                if let Some(mut session) = self.session.take() {
                    info!(state = %session.state(), "Ending call");
                    session.stop();
                } else if self.call_pending {
                    // Still connecting; the arriving handle will be torn
                    // down instead of installed.
                    info!("Cancelling call still being set up");
                    self.call_pending = false;
                }
            }

            UiCommand::SetVoiceReply { enabled } => {
                self.muted = !enabled;
                if let Some(session) = &self.session {
                    session.set_muted(self.muted);
                }
            }

            UiCommand::Speak { text } => {
                self.speak(text);
            }

            UiCommand::NewSession {} => {
                self.chat = ChatSession::new();
                self.titled = false;
                info!(id = %self.chat.id, "New chat session");
            }
        }
        true
    }

    fn start_call(&mut self, voice: Option<String>) {
        // A previous session in Error state still holds its handle; a
        // live or still-connecting one refuses the request.
        if self.call_pending || self.session.as_ref().is_some_and(|s| s.is_live()) {
            emit_error("a call is already active");
            return;
        }
        if let Some(mut stale) = self.session.take() {
            stale.stop();
        }

        let settings = &self.config.settings;
        let mut live_config = LiveSessionConfig::new(&self.config.api_key);
        if let Some(model) = &settings.model {
            live_config.model = model.clone();
        }
        if let Some(instruction) = &settings.system_instruction {
            live_config.system_instruction = instruction.clone();
        }
        if let Some(voice) = voice.or_else(|| settings.voice.clone()) {
            if session::LIVE_VOICES.contains(&voice.as_str()) {
                live_config.voice = voice;
            } else {
                warn!(voice = %voice, "Unknown voice, using {}", live_config.voice);
            }
        }
        live_config.input_device = settings.input_device.clone();
        live_config.muted = self.muted;

        // Start on a spawned task so the command loop keeps draining
        // while the transport connects; the handle comes back through
        // call_rx. Failures surface through the session event channel
        // as Error + state events.
        self.call_seq += 1;
        self.call_pending = true;
        let seq = self.call_seq;
        let events = self.session_tx.clone();
        let results = self.call_tx.clone();
        tokio::spawn(async move {
            let result = LiveSession::start(live_config, events).await;
            let _ = results.send((seq, result));
        });
    }

    fn handle_call_result(&mut self, seq: u64, result: Result<LiveSession, VoiceError>) {
        let current = self.call_pending && seq == self.call_seq;
        if current {
            self.call_pending = false;
        }
        match result {
            Ok(mut session) => {
                if current {
                    self.session = Some(session);
                } else {
                    // Cancelled or superseded while connecting.
                    session.stop();
                }
            }
            Err(e) => warn!("Call failed to start: {}", e),
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::State(state) => {
                emit_event(&UiEvent::CallState {
                    state: state.to_string(),
                });
            }
            SessionEvent::UserTranscript(text) => {
                emit_event(&UiEvent::UserTranscript { text });
            }
            SessionEvent::ModelTranscript(text) => {
                emit_event(&UiEvent::ModelTranscript { text });
            }
            SessionEvent::TurnComplete { user, model } => {
                self.handle_turn(&user, &model);
            }
            SessionEvent::Error(message) => {
                // Resources are already released; the handle stays so the
                // error state remains visible until end_call/start_call.
                emit_error(&message);
            }
            SessionEvent::Closed => {
                if let Some(mut session) = self.session.take() {
                    session.stop();
                }
            }
        }
    }

    fn handle_turn(&mut self, user: &str, model: &str) {
        let added = self.chat.record_turn(user, model);
        if added.is_empty() {
            return;
        }
        emit_event(&UiEvent::Turn {
            messages: added.clone(),
        });

        if let Some(user_msg) = added.iter().find(|m| m.sender == MessageSender::User) {
            self.spawn_turn_enrichment(user_msg);
        }
        if !self.titled {
            self.titled = true;
            self.spawn_title_generation();
        }
    }

    /// Classify the user's utterance and, for negative emotions, look up
    /// a coping strategy. Fire-and-forget; failures degrade to Neutral
    /// and no suggestion inside the helpers.
    fn spawn_turn_enrichment(&self, user_msg: &ChatMessage) {
        let client = self.gemini.clone();
        let tx = self.enrich_tx.clone();
        let chat_id = self.chat.id.clone();
        let message_id = user_msg.id.clone();
        let text = user_msg.text.clone();
        tokio::spawn(async move {
            let emotion = analyze_emotion(&client, &text).await;
            let _ = tx.send(Enrichment::Emotion {
                chat_id: chat_id.clone(),
                message_id,
                emotion,
            });
            if emotion.is_negative() {
                if let Some(strategy) = find_relevant_strategy(&client, &text).await {
                    let _ = tx.send(Enrichment::Strategy {
                        chat_id,
                        title: strategy.title.to_string(),
                        description: strategy.description.to_string(),
                    });
                }
            }
        });
    }

    fn spawn_title_generation(&self) {
        let client = self.gemini.clone();
        let tx = self.enrich_tx.clone();
        let chat_id = self.chat.id.clone();
        let opening: Vec<ChatMessage> = self.chat.messages.iter().take(4).cloned().collect();
        tokio::spawn(async move {
            let title = generate_title(&client, &opening).await;
            let _ = tx.send(Enrichment::Title { chat_id, title });
        });
    }

    fn apply_enrichment(&mut self, result: Enrichment) {
        match result {
            Enrichment::Emotion {
                chat_id,
                message_id,
                emotion,
            } => {
                if chat_id != self.chat.id {
                    return;
                }
                self.chat.set_emotion(&message_id, emotion);
                emit_event(&UiEvent::Emotion {
                    message_id,
                    emotion,
                });
            }
            Enrichment::Strategy {
                chat_id,
                title,
                description,
            } => {
                if chat_id != self.chat.id {
                    return;
                }
                emit_event(&UiEvent::Strategy { title, description });
            }
            Enrichment::Title { chat_id, title } => {
                if chat_id != self.chat.id {
                    return;
                }
                self.chat.title = title.clone();
                emit_event(&UiEvent::SessionTitle { title });
            }
        }
    }

    /// Synthesize and play one utterance outside a call. Fire-and-forget;
    /// failures surface as a non-fatal error event.
    fn speak(&self, text: String) {
        if self.call_pending || self.session.as_ref().is_some_and(|s| s.is_live()) {
            emit_error("cannot speak while a call is active");
            return;
        }
        let client = self.gemini.clone();
        let voice = self
            .config
            .settings
            .voice
            .clone()
            .unwrap_or_else(|| session::DEFAULT_VOICE.to_string());
        let muted = self.muted;
        tokio::spawn(async move {
            emit_event(&UiEvent::SpeakingStart {});
            match client.generate_speech(&text, &voice).await {
                Ok(samples) => {
                    let segment = PlaybackSegment {
                        samples,
                        sample_rate: OUTPUT_SAMPLE_RATE,
                        channels: 1,
                    };
                    let duration = segment.duration_secs();
                    match PlaybackScheduler::new() {
                        Ok(mut scheduler) => {
                            scheduler.set_muted(muted);
                            scheduler.enqueue(segment);
                            // Hold the output device until the sink drains.
                            tokio::time::sleep(std::time::Duration::from_secs_f64(duration)).await;
                        }
                        Err(e) => emit_error(&e.to_string()),
                    }
                }
                Err(e) => {
                    warn!("Speech synthesis failed: {:#}", e);
                    emit_error("speech synthesis failed");
                }
            }
            emit_event(&UiEvent::SpeakingEnd {});
        });
    }
}
