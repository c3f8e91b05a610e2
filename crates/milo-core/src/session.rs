//! Chat session state machine.
//!
//! A session owns the transcript for one mode. It is `Idle` until a question
//! is submitted, `Awaiting` until that question's answer (or the apology) is
//! appended, then `Idle` again. Only one question may be in flight at a time;
//! the guard lives here rather than in the UI so it holds for every caller.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::ai::TutorModel;
use crate::error::TutorError;
use crate::mode::Mode;
use crate::prompt::{PromptBuilder, DEFAULT_HISTORY_WINDOW};
use crate::state::ChatMessage;

/// Assistant turn appended when the model call fails.
pub const APOLOGY: &str = "Sorry, I'm having trouble connecting right now. Please try again!";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Prior messages forwarded into each prompt.
    pub history_window: usize,
    /// When false, prompts carry no transcript at all.
    pub track_history: bool,
    /// Learner level named in the prompt preamble.
    pub level: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            track_history: true,
            level: "curious".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Awaiting,
}

/// What happened to a submitted question.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The model replied and the reply was appended.
    Answered,
    /// The model failed; the apology was appended instead.
    Failed(TutorError),
    /// Another question was already pending. Nothing changed.
    Ignored,
    /// The question was blank. Nothing changed.
    Rejected,
    /// The session was cleared while the question was in flight; the reply was dropped.
    Cancelled,
}

#[derive(Default)]
struct Inner {
    history: Vec<ChatMessage>,
    pending: bool,
    cancel: Option<CancellationToken>,
    // Bumped by clear() so late replies from an older conversation are dropped.
    epoch: u64,
}

/// Releases the pending flag if a `submit` future is dropped before it
/// finishes, so an abandoned question can't wedge the session in `Awaiting`.
struct PendingGuard<'a> {
    inner: &'a Mutex<Inner>,
    epoch: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.epoch == self.epoch && inner.pending {
            tracing::debug!("Submit abandoned before a reply; releasing pending question");
            inner.pending = false;
            inner.cancel = None;
        }
    }
}

#[derive(Clone)]
pub struct ChatSession {
    mode: Mode,
    model: Arc<dyn TutorModel>,
    prompts: PromptBuilder,
    track_history: bool,
    inner: Arc<Mutex<Inner>>,
}

impl ChatSession {
    pub fn new(mode: Mode, model: Arc<dyn TutorModel>, options: SessionOptions) -> Self {
        Self {
            mode,
            model,
            prompts: PromptBuilder::new(options.level).with_window(options.history_window),
            track_history: options.track_history,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn state(&self) -> SessionState {
        if self.lock().pending {
            SessionState::Awaiting
        } else {
            SessionState::Idle
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == SessionState::Awaiting
    }

    /// Snapshot of the transcript, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask one question and wait for its answer.
    ///
    /// The user message is appended immediately; exactly one assistant message
    /// follows unless the session is cleared first.
    pub async fn submit(&self, question: &str) -> SubmitOutcome {
        let question = question.trim();
        if question.is_empty() {
            return SubmitOutcome::Rejected;
        }

        let (prompt, token, epoch) = {
            let mut inner = self.lock();
            if inner.pending {
                tracing::debug!("Ignoring submit while a question is pending");
                return SubmitOutcome::Ignored;
            }

            let recent: &[ChatMessage] = if self.track_history {
                let start = inner.history.len().saturating_sub(self.prompts.window());
                &inner.history[start..]
            } else {
                &[]
            };
            let prompt = self.prompts.build(question, self.mode, recent);

            inner.history.push(ChatMessage::user(question));
            inner.pending = true;
            let token = CancellationToken::new();
            inner.cancel = Some(token.clone());
            (prompt, token, inner.epoch)
        };
        // Declared before the final lock below, so it drops after that lock is released
        let _pending = PendingGuard {
            inner: &self.inner,
            epoch,
        };

        tracing::info!(mode = %self.mode, model = self.model.name(), "Submitting question");

        let result = tokio::select! {
            _ = token.cancelled() => None,
            reply = self.model.answer(question, &prompt) => Some(reply),
        };

        let mut inner = self.lock();
        let result = match result {
            Some(result) if inner.epoch == epoch => result,
            _ => {
                tracing::info!("Session cleared while awaiting; dropping reply");
                return SubmitOutcome::Cancelled;
            }
        };

        inner.pending = false;
        inner.cancel = None;
        match result {
            Ok(reply) => {
                inner.history.push(ChatMessage::assistant(reply));
                SubmitOutcome::Answered
            }
            Err(e) => {
                tracing::warn!(error = %e, "Model request failed");
                inner.history.push(ChatMessage::assistant(APOLOGY));
                SubmitOutcome::Failed(e)
            }
        }
    }

    /// Empty the transcript and abandon any question in flight.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.history.clear();
        inner.pending = false;
        inner.epoch += 1;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        tracing::debug!("Session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    // Mock model that records prompts and replays scripted results
    struct MockModel {
        replies: Mutex<Vec<Result<String, TutorError>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl MockModel {
        fn new(replies: Vec<Result<String, TutorError>>) -> Self {
            MockModel {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(replies: Vec<Result<String, TutorError>>, gate: Arc<Notify>) -> Self {
            MockModel {
                gate: Some(gate),
                ..Self::new(replies)
            }
        }
    }

    #[async_trait]
    impl TutorModel for MockModel {
        fn name(&self) -> &str {
            "mock"
        }

        async fn ask(&self, prompt: &str) -> Result<String, TutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(TutorError::MalformedResponse("no more mock replies".to_string()))
            } else {
                replies.remove(0)
            }
        }
    }

    fn session(model: Arc<MockModel>) -> ChatSession {
        ChatSession::new(Mode::Sweet, model, SessionOptions::default())
    }

    async fn wait_until_pending(session: &ChatSession) {
        for _ in 0..100 {
            if session.is_pending() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("session never became pending");
    }

    #[tokio::test]
    async fn test_new_session_is_idle_and_empty() {
        let s = session(Arc::new(MockModel::new(vec![])));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.is_empty());
        assert_eq!(s.mode(), Mode::Sweet);
    }

    #[tokio::test]
    async fn test_successful_submits_grow_history_by_two() {
        let replies = (0..3).map(|i| Ok(format!("answer {}", i))).collect();
        let s = session(Arc::new(MockModel::new(replies)));
        for i in 0..3 {
            let outcome = s.submit(&format!("question {}", i)).await;
            assert!(matches!(outcome, SubmitOutcome::Answered));
            assert_eq!(s.len(), 2 * (i + 1));
        }
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_submits_append_apology() {
        let replies = (0..3).map(|_| Err(TutorError::status(503, "unavailable"))).collect();
        let s = session(Arc::new(MockModel::new(replies)));
        for _ in 0..3 {
            let outcome = s.submit("anyone there?").await;
            assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        }
        let history = s.history();
        assert_eq!(history.len(), 6);
        assert!(history
            .iter()
            .skip(1)
            .step_by(2)
            .all(|m| m == &ChatMessage::assistant(APOLOGY)));
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let model = Arc::new(MockModel::new(vec![]));
        let s = session(model.clone());
        assert!(matches!(s.submit("   \n\t").await, SubmitOutcome::Rejected));
        assert!(s.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_question_is_trimmed() {
        let s = session(Arc::new(MockModel::new(vec![Ok("ok".to_string())])));
        s.submit("  What is gravity?  ").await;
        assert_eq!(s.history()[0], ChatMessage::user("What is gravity?"));
    }

    #[tokio::test]
    async fn test_submit_while_awaiting_is_noop() {
        let gate = Arc::new(Notify::new());
        let model = Arc::new(MockModel::gated(vec![Ok("first".to_string())], gate.clone()));
        let s = session(model.clone());

        let first = tokio::spawn({
            let s = s.clone();
            async move { s.submit("first question").await }
        });
        wait_until_pending(&s).await;
        assert_eq!(s.len(), 1);

        let second = s.submit("second question").await;
        assert!(matches!(second, SubmitOutcome::Ignored));
        assert_eq!(s.len(), 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), SubmitOutcome::Answered));
        assert_eq!(s.len(), 2);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prompt_uses_history_before_new_question() {
        let replies = (0..4).map(|i| Ok(format!("answer {}", i))).collect();
        let model = Arc::new(MockModel::new(replies));
        let s = session(model.clone());
        for i in 0..4 {
            s.submit(&format!("question {}", i)).await;
        }
        let prompts = model.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Conversation so far"));
        let last = &prompts[3];
        // Six prior messages; only the last four are forwarded.
        assert!(!last.contains("Student: question 0"));
        assert!(!last.contains("Assistant: answer 0"));
        assert!(last.contains("Student: question 1"));
        assert!(last.contains("Assistant: answer 2"));
        assert!(!last.contains("Student: question 3"));
        assert!(last.contains("Question: question 3"));
    }

    #[tokio::test]
    async fn test_untracked_history_sends_no_transcript() {
        let replies = (0..2).map(|i| Ok(format!("answer {}", i))).collect();
        let model = Arc::new(MockModel::new(replies));
        let options = SessionOptions {
            track_history: false,
            ..SessionOptions::default()
        };
        let s = ChatSession::new(Mode::Nerdy, model.clone(), options);
        s.submit("one").await;
        s.submit("two").await;
        assert!(!model.prompts.lock().unwrap()[1].contains("Conversation so far"));
        assert_eq!(s.len(), 4);
    }

    #[tokio::test]
    async fn test_abandoned_submit_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let model = Arc::new(MockModel::gated(vec![Ok("second".to_string())], gate.clone()));
        let s = session(model.clone());

        let timed_out = tokio::time::timeout(Duration::from_millis(50), s.submit("slow one")).await;
        assert!(timed_out.is_err());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.history(), vec![ChatMessage::user("slow one")]);

        gate.notify_one();
        assert!(matches!(s.submit("another").await, SubmitOutcome::Answered));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.history().last(), Some(&ChatMessage::assistant("second")));
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_clear_resets_history_and_state() {
        let s = session(Arc::new(MockModel::new(vec![Ok("a".to_string())])));
        s.submit("q").await;
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.state(), SessionState::Idle);
        s.clear();
        assert!(s.is_empty());
    }

    #[tokio::test]
    async fn test_clear_while_awaiting_drops_late_reply() {
        let gate = Arc::new(Notify::new());
        // The cancelled call never reaches its reply, so one scripted reply serves the
        // follow-up question.
        let model = Arc::new(MockModel::gated(vec![Ok("fresh".to_string())], gate.clone()));
        let s = session(model.clone());

        let first = tokio::spawn({
            let s = s.clone();
            async move { s.submit("old question").await }
        });
        wait_until_pending(&s).await;

        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(matches!(first.await.unwrap(), SubmitOutcome::Cancelled));
        assert!(s.is_empty());

        // A new question can be asked right away.
        let next = tokio::spawn({
            let s = s.clone();
            async move { s.submit("new question").await }
        });
        wait_until_pending(&s).await;
        gate.notify_one();
        assert!(matches!(next.await.unwrap(), SubmitOutcome::Answered));
        assert_eq!(
            s.history(),
            vec![ChatMessage::user("new question"), ChatMessage::assistant("fresh")]
        );
    }
}
