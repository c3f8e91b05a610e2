//! Prompt construction for the tutor model.

use crate::mode::Mode;
use crate::state::{ChatMessage, ChatRole};

/// Number of prior messages forwarded into each prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 4;

/// Builds the text prompt sent to the model for one question.
///
/// The output depends only on the builder's settings and the arguments, so
/// identical calls produce byte-identical prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    level: String,
    window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("curious")
    }
}

impl PromptBuilder {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Render the prompt for `question` in `mode`, embedding at most the last
    /// `window` messages of `recent_history` (oldest first).
    pub fn build(&self, question: &str, mode: Mode, recent_history: &[ChatMessage]) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are Milo, an AI tutor helping a {} student. You are in {} mode {}.\n\n",
            self.level,
            mode.display_name(),
            mode.badge()
        ));

        prompt.push_str("🎓 Role: Act as a helpful, friendly friend who can switch between styles:\n");
        for m in Mode::all() {
            prompt.push_str(&format!(
                "- {} ({}): {} {}\n",
                m.display_name(),
                m.description(),
                m.tone_directive(),
                m.emojis().join("")
            ));
        }
        prompt.push('\n');

        prompt.push_str(&format!(
            "🎭 Style: Use the \"{}\" mode for your tone, examples, and word choice. {} Sprinkle in {}.\n\n",
            mode.display_name(),
            mode.tone_directive(),
            mode.emojis().join(" ")
        ));

        let start = recent_history.len().saturating_sub(self.window);
        let transcript = &recent_history[start..];
        if !transcript.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for msg in transcript {
                match msg.role {
                    ChatRole::User => prompt.push_str(&format!("Student: {}\n", msg.content)),
                    ChatRole::Assistant => {
                        prompt.push_str(&format!("Assistant: {}\n", msg.content))
                    }
                }
            }
            prompt.push('\n');
        }

        prompt.push_str("Question: ");
        prompt.push_str(question);
        prompt.push_str("\n\n");

        prompt.push_str("📚 Format:\n");
        prompt.push_str("- Keep it to 2-3 short paragraphs at most.\n");
        prompt.push_str("- Be conversational, like a cool friend sitting right beside them.\n");
        prompt.push_str("- Use simple language and real-life comparisons.\n");
        prompt.push_str("- End with a quick takeaway.");

        prompt
    }
}
