//! Offline stand-in used when no model credential is configured.
//!
//! Replies are fixed per mode and quote the question back, so the chat still
//! works end to end without a network call.

use async_trait::async_trait;

use super::TutorModel;
use crate::error::TutorError;
use crate::mode::Mode;

#[derive(Debug, Clone)]
pub struct CannedTutor {
    mode: Mode,
}

impl CannedTutor {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Produce the canned reply for an already-trimmed question.
    pub fn reply(&self, question: &str) -> String {
        format!("Great question about \"{}\"! {}", question, self.body())
    }

    fn body(&self) -> String {
        let body = match self.mode {
            Mode::Sweet => {
                "🌸 Don't worry, this is totally manageable! Think of it like learning to ride a bike: \
                 it might seem scary at first, but once you get the hang of it, you'll wonder why you \
                 were ever worried. Everyone learns at their own pace, and you're doing amazing just by \
                 asking! 💕 Keep going, you've got this! ✨"
            }
            Mode::Savage => {
                "🔥 Alright, let's cut through the fluff. This concept trips people up because they \
                 overthink it, but it's simpler than you think. Stop making it complicated! If you \
                 understand the first step, the next one follows logically. No excuses, no shortcuts. \
                 Now stop doubting yourself and own this knowledge! 💪"
            }
            Mode::Nerdy => {
                "🤓 OH, this is SO cool! Think of it like debugging code: you need to understand each \
                 component before the whole system makes sense. Break it into steps, check each one, \
                 and you'll hit that \"AHA!\" moment. 🧠✨"
            }
        };
        format!(
            "{}\n\n(Offline mode: set GEMINI_API_KEY or press K to add a Gemini key for real answers.)",
            body
        )
    }
}

#[async_trait]
impl TutorModel for CannedTutor {
    fn name(&self) -> &str {
        "Offline"
    }

    /// Without the question itself there is nothing to quote.
    async fn ask(&self, _prompt: &str) -> Result<String, TutorError> {
        Ok(self.body())
    }

    async fn answer(&self, question: &str, _prompt: &str) -> Result<String, TutorError> {
        Ok(self.reply(question))
    }
}
