use std::sync::Arc;

use milo_core::speech::{
    AudioPlayer, CommandPlayer, CommandSynthesizer, ElevenLabsClient, LocalSynthesizer,
    VoiceService,
};
use milo_core::{
    CannedTutor, ChatMessage, ChatRole, ChatSession, GeminiClient, Mode, PlaybackState,
    SessionOptions, SpeechOutput, SubmitOutcome, TutorModel,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::Config;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    ModeSelect,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Footer note after a failed question.
pub const FAILED_STATUS: &str = "Couldn't reach the tutor. Details are in milo.log.";

/// Which credential the key dialog is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    Gemini,
    ElevenLabs,
}

impl KeyTarget {
    pub fn display_name(&self) -> &'static str {
        match self {
            KeyTarget::Gemini => "Gemini",
            KeyTarget::ElevenLabs => "ElevenLabs",
        }
    }
}

/// Settings fixed at startup from the CLI and config file.
#[derive(Debug, Clone)]
pub struct Launch {
    pub mode: Option<Mode>,
    pub model: Option<String>,
    pub options: SessionOptions,
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    config: Config,
    launch: Launch,
    events: UnboundedSender<AppEvent>,

    // Mode picker
    pub mode_state: ListState,

    // Chat state
    pub session: Option<ChatSession>,
    pub query_in_flight: bool,
    pub query_input: String,
    pub query_cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,
    pub status: Option<String>,

    // One speech toggle per assistant message, in transcript order
    pub speech: Vec<SpeechOutput>,
    pub selected_reply: Option<usize>,
    player: Arc<dyn AudioPlayer>,
    local_voice: Arc<dyn LocalSynthesizer>,

    // API key dialog
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
    pub api_key_target: Option<KeyTarget>,
}

impl App {
    pub fn new(config: Config, launch: Launch, events: UnboundedSender<AppEvent>) -> Self {
        let mut mode_state = ListState::default();
        let initial = launch
            .mode
            .or_else(|| config.default_mode.as_deref().and_then(Mode::from_str))
            .unwrap_or(Mode::Sweet);
        let initial_idx = Mode::all().iter().position(|m| *m == initial).unwrap_or(0);
        mode_state.select(Some(initial_idx));

        let mut app = Self {
            should_quit: false,
            screen: Screen::ModeSelect,
            input_mode: InputMode::Normal,
            config,
            launch,
            events,
            mode_state,
            session: None,
            query_in_flight: false,
            query_input: String::new(),
            query_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            status: None,
            speech: Vec::new(),
            selected_reply: None,
            player: Arc::new(CommandPlayer::new()),
            local_voice: Arc::new(CommandSynthesizer::new()),
            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            api_key_target: None,
        };

        if let Some(mode) = app.launch.mode {
            app.start_chat(mode);
        }
        app
    }

    pub fn mode(&self) -> Option<Mode> {
        self.session.as_ref().map(|s| s.mode())
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.session.as_ref().map(|s| s.history()).unwrap_or_default()
    }

    pub fn is_loading(&self) -> bool {
        self.query_in_flight || self.session.as_ref().is_some_and(|s| s.is_pending())
    }

    pub fn has_gemini_key(&self) -> bool {
        self.config.gemini_key().is_some()
    }

    pub fn has_voice_key(&self) -> bool {
        self.config.elevenlabs_key().is_some()
    }

    fn build_model(&self, mode: Mode) -> Arc<dyn TutorModel> {
        match self.config.gemini_key() {
            Some(key) => {
                let model = self
                    .launch
                    .model
                    .clone()
                    .or_else(|| self.config.model.clone());
                let client = GeminiClient::new(&key);
                Arc::new(match model {
                    Some(m) => client.with_model(&m),
                    None => client,
                })
            }
            None => {
                tracing::info!("No Gemini key configured; using offline replies");
                Arc::new(CannedTutor::new(mode))
            }
        }
    }

    fn build_speech(&self) -> SpeechOutput {
        let remote = self
            .config
            .elevenlabs_key()
            .map(|key| Arc::new(ElevenLabsClient::new(&key)) as Arc<dyn VoiceService>);
        SpeechOutput::new(remote, self.player.clone(), self.local_voice.clone())
    }

    // Mode picker navigation
    pub fn mode_nav_down(&mut self) {
        let count = Mode::all().len();
        let i = self.mode_state.selected().map_or(0, |i| (i + 1) % count);
        self.mode_state.select(Some(i));
    }

    pub fn mode_nav_up(&mut self) {
        let count = Mode::all().len();
        let i = self
            .mode_state
            .selected()
            .map_or(0, |i| (i + count - 1) % count);
        self.mode_state.select(Some(i));
    }

    pub fn selected_mode(&self) -> Mode {
        self.mode_state
            .selected()
            .and_then(|i| Mode::all().get(i).copied())
            .unwrap_or(Mode::Sweet)
    }

    /// Begin a fresh conversation in `mode`.
    pub fn start_chat(&mut self, mode: Mode) {
        self.end_chat();
        let session = ChatSession::new(mode, self.build_model(mode), self.launch.options.clone());
        tracing::info!(mode = %mode, model = session.model_name(), "Starting chat");
        self.session = Some(session);
        self.screen = Screen::Chat;
        self.input_mode = InputMode::Editing;
    }

    /// Drop the current conversation and return to the mode picker.
    pub fn back_to_modes(&mut self) {
        self.end_chat();
        self.screen = Screen::ModeSelect;
        self.input_mode = InputMode::Normal;
    }

    /// Silence speech and drop any in-flight question before exit.
    pub fn shutdown(&mut self) {
        self.end_chat();
    }

    fn end_chat(&mut self) {
        if let Some(session) = self.session.take() {
            session.clear();
        }
        self.stop_all_speech();
        self.query_input.clear();
        self.query_cursor = 0;
        self.chat_scroll = 0;
        self.status = None;
    }

    /// Empty the transcript. A reply still in flight is discarded.
    pub fn clear_chat(&mut self) {
        if let Some(mode) = self.mode() {
            // Rebuilt so a key entered since the chat started takes effect
            self.start_chat(mode);
            self.input_mode = InputMode::Normal;
        }
    }

    fn stop_all_speech(&mut self) {
        for speech in self.speech.drain(..) {
            speech.stop();
        }
        self.selected_reply = None;
    }

    /// Submit the input box. Ignored while another question is pending.
    pub fn submit_query(&mut self) {
        let question = self.query_input.trim().to_string();
        if question.is_empty() || self.is_loading() {
            return;
        }
        let Some(session) = self.session.clone() else {
            return;
        };

        self.query_input.clear();
        self.query_cursor = 0;
        self.status = None;
        self.query_in_flight = true;

        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = session.submit(&question).await;
            let _ = events.send(AppEvent::Answered(outcome));
        });

        self.scroll_chat_to_bottom();
    }

    pub fn on_answered(&mut self, outcome: SubmitOutcome) {
        self.query_in_flight = false;
        match outcome {
            SubmitOutcome::Failed(e) => {
                // Details stay in the log; the transcript already holds the apology
                tracing::warn!(error = %e, "Question failed");
                self.status = Some(FAILED_STATUS.to_string());
            }
            SubmitOutcome::Answered | SubmitOutcome::Cancelled => {}
            SubmitOutcome::Ignored | SubmitOutcome::Rejected => {
                tracing::debug!(?outcome, "Question not sent");
            }
        }
        self.sync_speech();
        self.scroll_chat_to_bottom();
    }

    /// Give every assistant message its own speech toggle.
    fn sync_speech(&mut self) {
        let replies = self
            .history()
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .count();
        while self.speech.len() < replies {
            let speech = self.build_speech();
            self.speech.push(speech);
        }
        if replies > 0 {
            self.selected_reply = Some(replies - 1);
        }
    }

    pub fn select_next_reply(&mut self) {
        if self.speech.is_empty() {
            return;
        }
        let i = self
            .selected_reply
            .map_or(0, |i| (i + 1).min(self.speech.len() - 1));
        self.selected_reply = Some(i);
    }

    pub fn select_prev_reply(&mut self) {
        if self.speech.is_empty() {
            return;
        }
        let i = self.selected_reply.map_or(0, |i| i.saturating_sub(1));
        self.selected_reply = Some(i);
    }

    /// Toggle reading the selected reply aloud.
    pub fn toggle_speech(&mut self) {
        let Some(idx) = self.selected_reply else {
            return;
        };
        let Some(speech) = self.speech.get(idx).cloned() else {
            return;
        };
        let Some(text) = self
            .history()
            .into_iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .nth(idx)
            .map(|m| m.content)
        else {
            return;
        };

        if speech.state() == PlaybackState::Playing {
            speech.stop();
            return;
        }
        tokio::spawn(async move {
            speech.speak(&text).await;
        });
    }

    pub fn speech_state(&self, reply_idx: usize) -> PlaybackState {
        self.speech
            .get(reply_idx)
            .map_or(PlaybackState::Idle, |s| s.state())
    }

    pub fn on_tick(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        for speech in &self.speech {
            speech.poll();
        }
    }

    // API key dialog
    pub fn open_key_input(&mut self, target: KeyTarget) {
        self.show_api_key_input = true;
        self.api_key_target = Some(target);
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    pub fn close_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.api_key_target = None;
    }

    /// Persist the entered key. Gemini keys apply from the next chat; voice
    /// keys apply to replies that arrive afterwards.
    pub fn save_key_input(&mut self) {
        let key = self.api_key_input.trim().to_string();
        let Some(target) = self.api_key_target else {
            self.close_key_input();
            return;
        };
        if !key.is_empty() {
            match target {
                KeyTarget::Gemini => self.config.gemini_api_key = Some(key),
                KeyTarget::ElevenLabs => self.config.elevenlabs_api_key = Some(key),
            }
            match self.config.save() {
                Ok(()) => {
                    tracing::info!(provider = target.display_name(), "Saved API key");
                    self.status = Some(match target {
                        KeyTarget::Gemini => "Gemini key saved. Press c for a new chat that uses it.".to_string(),
                        KeyTarget::ElevenLabs => "ElevenLabs key saved for new replies.".to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not save config");
                    self.status = Some(format!("Could not save key: {}", e));
                }
            }
        }
        self.close_key_input();
    }

    // Chat scrolling
    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_add(half);
    }

    pub fn scroll_half_page_up(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_sub(half);
    }

    /// Scroll so the newest message (or "Thinking...") is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        let history = self.history();
        let mut total_lines = chat_line_count(&history, wrap_width);
        if self.is_loading() && history.last().map(|m| m.role) == Some(ChatRole::User) {
            total_lines += 2;
        }

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}

/// Rendered height of a transcript: a label line, wrapped content, a blank line.
pub fn chat_line_count(messages: &[ChatMessage], wrap_width: usize) -> u16 {
    let wrap_width = wrap_width.max(1);
    let mut total: usize = 0;
    for msg in messages {
        total += 1;
        for line in msg.content.lines() {
            let char_count = line.chars().count();
            total += if char_count == 0 { 1 } else { char_count.div_ceil(wrap_width) };
        }
        total += 1;
    }
    u16::try_from(total).unwrap_or(u16::MAX)
}
