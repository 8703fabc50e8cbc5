//! Live duplex voice session.
//!
//! Owns one conversation attempt against the live endpoint: microphone
//! capture feeding encoded chunks out, inbound frames demultiplexed into
//! transcript updates, scheduled playback, and turn completion. Exactly one
//! session is live at a time; the microphone, the output sink, and the
//! socket all belong to it until teardown.

pub mod protocol;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::audio::capture::{start_capture, CaptureHandle, INPUT_SAMPLE_RATE};
use crate::audio::codec::{self, decode_pcm};
use crate::audio::playback::{PlaybackScheduler, OUTPUT_SAMPLE_RATE};
use crate::error::VoiceError;
use protocol::{ServerContent, ServerFrame};

/// Live endpoint for bidirectional audio conversation.
const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Native-audio conversation model.
pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice for replies.
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Prebuilt voices the frontend may select from.
pub const LIVE_VOICES: &[&str] = &["Zephyr", "Puck", "Charon", "Kore", "Fenrir"];

/// Give up on an unresponsive endpoint rather than waiting out the OS
/// TCP timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Behavior instructions sent with the session setup.
pub const SYSTEM_INSTRUCTION: &str = "You are Serene, an empathetic AI mental \
health companion. Your role is to comfort, validate emotions, and guide users \
through anxiety, sadness, or stress using gentle, short replies. Avoid medical \
advice or diagnosis. Keep your responses concise and conversational.";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Connection state ────────────────────────────────────────────────

/// Session connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Listening = 3,
    Error = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Listening,
            4 => Self::Error,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Listening => write!(f, "listening"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ── Session events ──────────────────────────────────────────────────

/// Events the session delivers to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection state changed.
    State(ConnectionState),
    /// Interim "user is saying X so far" update. Empty text clears it.
    UserTranscript(String),
    /// Interim "model is saying X so far" update. Empty text clears it.
    ModelTranscript(String),
    /// A turn finished: both transcripts finalized and reset.
    TurnComplete { user: String, model: String },
    /// Primary-path failure; the session has been torn down.
    Error(String),
    /// The remote endpoint closed the connection cleanly.
    Closed,
}

// ── Session configuration ───────────────────────────────────────────

/// Fixed configuration for one session attempt.
#[derive(Debug, Clone)]
pub struct LiveSessionConfig {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    /// Named input device, or `None` for the system default.
    pub input_device: Option<String>,
    /// Start with replies silenced (transcripts still flow).
    pub muted: bool,
}

impl LiveSessionConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: LIVE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            input_device: None,
            muted: false,
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the session handle and its background task.
struct SessionShared {
    state: AtomicU8,
    /// Checked at the top of every callback; late completions after
    /// teardown become no-ops.
    live: AtomicBool,
    /// Replies silenced; transcripts keep flowing.
    muted: AtomicBool,
    capture: Mutex<Option<CaptureHandle>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionShared {
    fn new(events: mpsc::UnboundedSender<SessionEvent>, muted: bool) -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Idle as u8),
            live: AtomicBool::new(true),
            muted: AtomicBool::new(muted),
            capture: Mutex::new(None),
            events,
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
        let _ = self.events.send(SessionEvent::State(state));
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Transition to Error and surface a human-readable message.
    fn fail(&self, message: String) {
        error!("Session failed: {}", message);
        self.set_state(ConnectionState::Error);
        let _ = self.events.send(SessionEvent::Error(message));
    }

    /// Stop capture and mark the session dead. Idempotent; safe from any
    /// thread. Does not touch the connection state.
    fn release_resources(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.capture.lock() {
            if let Some(mut handle) = guard.take() {
                handle.stop();
            }
        }
    }
}

// ── Transcript aggregation ──────────────────────────────────────────

/// Running input/output transcript buffers for the current turn.
#[derive(Debug, Default)]
struct TranscriptBuffers {
    input: String,
    output: String,
}

/// Apply one inbound content payload to the session.
///
/// Field order matters and matches the endpoint contract: transcripts
/// first, then turn completion (snapshot-then-clear), then audio, then
/// interruption. All fields on one frame are independent.
fn dispatch_content(
    content: &ServerContent,
    bufs: &mut TranscriptBuffers,
    playback: &mut Option<PlaybackScheduler>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    if let Some(fragment) = &content.input_transcription {
        bufs.input.push_str(&fragment.text);
        let _ = events.send(SessionEvent::UserTranscript(bufs.input.clone()));
    }
    if let Some(fragment) = &content.output_transcription {
        bufs.output.push_str(&fragment.text);
        let _ = events.send(SessionEvent::ModelTranscript(bufs.output.clone()));
    }
    if content.turn_complete {
        // Snapshot both buffers atomically, then clear the interim state.
        let user = std::mem::take(&mut bufs.input);
        let model = std::mem::take(&mut bufs.output);
        let _ = events.send(SessionEvent::TurnComplete { user, model });
        let _ = events.send(SessionEvent::UserTranscript(String::new()));
        let _ = events.send(SessionEvent::ModelTranscript(String::new()));
    }
    if let Some(data) = content.audio_data() {
        match decode_pcm(data, OUTPUT_SAMPLE_RATE, 1) {
            Ok(segment) => {
                if let Some(scheduler) = playback {
                    scheduler.enqueue(segment);
                }
            }
            // A malformed segment is skipped, never fatal to the session.
            Err(e) => warn!("Dropping undecodable audio segment: {}", e),
        }
    }
    if content.interrupted {
        if let Some(scheduler) = playback {
            scheduler.interrupt();
        }
    }
}

// ── Live session ────────────────────────────────────────────────────

/// Handle to one live conversation. Created by [`LiveSession::start`];
/// all resources are released by [`LiveSession::stop`] or drop.
pub struct LiveSession {
    shared: Arc<SessionShared>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LiveSession {
    /// Open the transport, wire the capture pipeline, and begin streaming.
    ///
    /// Fails with `Transport` when the endpoint cannot be reached and
    /// `Permission`/`Device` when the microphone cannot be opened; either
    /// way all partially-acquired resources are released before returning.
    pub async fn start(
        config: LiveSessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, VoiceError> {
        let shared = Arc::new(SessionShared::new(events, config.muted));
        shared.set_state(ConnectionState::Connecting);

        let url = format!("{}?key={}", LIVE_ENDPOINT, config.api_key);
        let mut ws = match open_transport(&url, CONNECT_TIMEOUT).await {
            Ok(ws) => ws,
            Err(e) => {
                shared.fail(e.to_string());
                shared.release_resources();
                return Err(e);
            }
        };

        let setup = protocol::setup_frame(&config.model, &config.voice, &config.system_instruction);
        if let Err(e) = ws.send(Message::Text(setup.to_string())).await {
            let err = VoiceError::Transport(format!("failed to send session setup: {e}"));
            shared.fail(err.to_string());
            shared.release_resources();
            return Err(err);
        }
        shared.set_state(ConnectionState::Connected);
        info!(model = %config.model, voice = %config.voice, "Live session connected");

        let mut playback = match PlaybackScheduler::new() {
            Ok(mut scheduler) => {
                scheduler.set_muted(config.muted);
                Some(scheduler)
            }
            Err(e) => {
                shared.fail(e.to_string());
                shared.release_resources();
                let _ = ws.close(None).await;
                return Err(e);
            }
        };

        // Capture sink: encode each chunk and hand it to the session task.
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<String>();
        let sink_shared = Arc::clone(&shared);
        let capture = match start_capture(config.input_device.as_deref(), move |chunk| {
            if !sink_shared.is_live() {
                return;
            }
            let _ = chunk_tx.send(codec::encode_pcm(&chunk));
        }) {
            Ok(handle) => handle,
            Err(e) => {
                shared.fail(e.to_string());
                shared.release_resources();
                let _ = ws.close(None).await;
                return Err(e);
            }
        };
        if let Ok(mut guard) = shared.capture.lock() {
            *guard = Some(capture);
        }
        shared.set_state(ConnectionState::Listening);

        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            run_loop(ws, chunk_rx, &mut playback, &task_shared).await;
        });

        Ok(Self {
            shared,
            task: Some(task),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether this session is still holding its devices and transport.
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    /// Silence or restore spoken replies; takes effect on the next
    /// inbound frame. Transcripts are unaffected.
    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::SeqCst);
    }

    /// Stop the session and release every resource. Idempotent; safe from
    /// any state. Closing the transport is fire-and-forget.
    pub fn stop(&mut self) {
        self.shared.release_resources();
        if let Some(task) = self.task.take() {
            // Aborting drops the socket and the playback scheduler.
            task.abort();
        }
        if self.shared.state() != ConnectionState::Idle {
            self.shared.set_state(ConnectionState::Idle);
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the live transport, bounded by `timeout` so an endpoint that
/// accepts the TCP connection but never answers the handshake cannot
/// hold the caller indefinitely.
async fn open_transport(url: &str, timeout: Duration) -> Result<WsStream, VoiceError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((ws, _resp))) => Ok(ws),
        Ok(Err(e)) => Err(VoiceError::Transport(format!(
            "failed to open live connection: {e}"
        ))),
        Err(_) => Err(VoiceError::Transport(format!(
            "live endpoint did not answer within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Session task: pump capture chunks out and demultiplex inbound frames
/// until the socket closes, an error occurs, or the session is stopped.
async fn run_loop(
    mut ws: WsStream,
    mut chunk_rx: mpsc::UnboundedReceiver<String>,
    playback: &mut Option<PlaybackScheduler>,
    shared: &Arc<SessionShared>,
) {
    let mut bufs = TranscriptBuffers::default();

    loop {
        if !shared.is_live() {
            break;
        }
        tokio::select! {
            maybe_chunk = chunk_rx.recv() => {
                let Some(encoded) = maybe_chunk else { break };
                let frame = protocol::media_frame(&encoded, INPUT_SAMPLE_RATE);
                if ws.send(Message::Text(frame.to_string())).await.is_err() {
                    shared.fail("live connection lost while sending audio".to_string());
                    break;
                }
            }
            maybe_msg = ws.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_raw_frame(text.as_bytes(), &mut bufs, playback, shared);
                    }
                    Some(Ok(Message::Binary(bin))) => {
                        handle_raw_frame(&bin, &mut bufs, playback, shared);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Live session closed by remote");
                        shared.release_resources();
                        shared.set_state(ConnectionState::Idle);
                        let _ = shared.events.send(SessionEvent::Closed);
                        return;
                    }
                    Some(Err(e)) => {
                        shared.fail(format!("live connection error: {e}"));
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Error or explicit-stop exit: free resources, leave any Error state
    // visible for the caller.
    shared.release_resources();
}

fn handle_raw_frame(
    raw: &[u8],
    bufs: &mut TranscriptBuffers,
    playback: &mut Option<PlaybackScheduler>,
    shared: &Arc<SessionShared>,
) {
    if !shared.is_live() {
        return;
    }
    if let Some(scheduler) = playback.as_mut() {
        scheduler.set_muted(shared.muted.load(Ordering::SeqCst));
    }
    let frame: ServerFrame = match serde_json::from_slice(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Ignoring unparseable frame: {}", e);
            return;
        }
    };
    if frame.setup_complete.is_some() {
        debug!("Live session setup complete");
    }
    if let Some(content) = frame.server_content {
        dispatch_content(&content, bufs, playback, &shared.events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_from(raw: &str) -> ServerContent {
        let frame: ServerFrame = serde_json::from_str(raw).unwrap();
        frame.server_content.unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_state_u8_round_trip() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Listening,
            ConnectionState::Error,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_turn_emission_concatenates_fragments() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bufs = TranscriptBuffers::default();
        let mut playback = None;

        for raw in [
            r#"{"serverContent":{"inputTranscription":{"text":"Hel"}}}"#,
            r#"{"serverContent":{"inputTranscription":{"text":"lo"}}}"#,
            r#"{"serverContent":{"outputTranscription":{"text":"Hi there"}}}"#,
            r#"{"serverContent":{"turnComplete":true}}"#,
        ] {
            dispatch_content(&content_from(raw), &mut bufs, &mut playback, &tx);
        }

        let events = drain(&mut rx);
        let turns: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::TurnComplete { .. }))
            .collect();
        assert_eq!(turns.len(), 1);
        assert_eq!(
            turns[0],
            &SessionEvent::TurnComplete {
                user: "Hello".to_string(),
                model: "Hi there".to_string(),
            }
        );
        // Both buffers reset for the next turn.
        assert!(bufs.input.is_empty());
        assert!(bufs.output.is_empty());
        // Interim state cleared for both sides after the turn.
        assert!(events.contains(&SessionEvent::UserTranscript(String::new())));
        assert!(events.contains(&SessionEvent::ModelTranscript(String::new())));
    }

    #[test]
    fn test_fragment_on_turn_complete_frame_is_included() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bufs = TranscriptBuffers::default();
        let mut playback = None;

        dispatch_content(
            &content_from(r#"{"serverContent":{"inputTranscription":{"text":"Hey"}}}"#),
            &mut bufs,
            &mut playback,
            &tx,
        );
        // Final fragment arrives on the same frame as turnComplete.
        dispatch_content(
            &content_from(
                r#"{"serverContent":{"inputTranscription":{"text":" you"},"turnComplete":true}}"#,
            ),
            &mut bufs,
            &mut playback,
            &tx,
        );

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::TurnComplete {
            user: "Hey you".to_string(),
            model: String::new(),
        }));
        assert!(bufs.input.is_empty());
    }

    #[test]
    fn test_interim_updates_reflect_running_buffer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bufs = TranscriptBuffers::default();
        let mut playback = None;

        dispatch_content(
            &content_from(r#"{"serverContent":{"inputTranscription":{"text":"I fe"}}}"#),
            &mut bufs,
            &mut playback,
            &tx,
        );
        dispatch_content(
            &content_from(r#"{"serverContent":{"inputTranscription":{"text":"el sad"}}}"#),
            &mut bufs,
            &mut playback,
            &tx,
        );

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                SessionEvent::UserTranscript("I fe".to_string()),
                SessionEvent::UserTranscript("I feel sad".to_string()),
            ]
        );
    }

    #[test]
    fn test_bad_audio_segment_is_skipped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bufs = TranscriptBuffers::default();
        let mut playback = None;

        let raw = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"!!!"}}]}}}"#;
        dispatch_content(&content_from(raw), &mut bufs, &mut playback, &tx);

        // No events, no panic, buffers untouched.
        assert!(drain(&mut rx).is_empty());
        assert!(bufs.input.is_empty());
    }

    #[test]
    fn test_interrupt_without_playback_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bufs = TranscriptBuffers::default();
        let mut playback = None;

        dispatch_content(
            &content_from(r#"{"serverContent":{"interrupted":true}}"#),
            &mut bufs,
            &mut playback,
            &tx,
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_connect_gives_up_on_silent_endpoint() {
        // A listener that accepts the TCP connection but never answers the
        // handshake must not hold the caller past the timeout.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let started = std::time::Instant::now();
        let err = open_transport(&url, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_release_resources_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let shared = SessionShared::new(tx, false);
        assert!(shared.is_live());
        shared.release_resources();
        assert!(!shared.is_live());
        // Second call is a no-op.
        shared.release_resources();
        assert!(!shared.is_live());
    }

    #[test]
    fn test_late_frame_after_teardown_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared::new(tx, false));
        shared.release_resources();

        let mut bufs = TranscriptBuffers::default();
        let mut playback = None;
        handle_raw_frame(
            br#"{"serverContent":{"inputTranscription":{"text":"late"}}}"#,
            &mut bufs,
            &mut playback,
            &shared,
        );
        assert!(drain(&mut rx).is_empty());
        assert!(bufs.input.is_empty());
    }
}
