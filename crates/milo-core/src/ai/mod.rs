pub mod canned;
pub mod gemini;

use async_trait::async_trait;

use crate::error::TutorError;

pub use canned::CannedTutor;
pub use gemini::GeminiClient;

/// A text-generation backend: one prompt in, one reply out.
#[async_trait]
pub trait TutorModel: Send + Sync {
    /// Human-readable backend name for titles and logs.
    fn name(&self) -> &str;

    async fn ask(&self, prompt: &str) -> Result<String, TutorError>;

    /// Answer `question`, given the full `prompt` built for it. Backends that
    /// work from the prompt alone keep the default.
    async fn answer(&self, _question: &str, prompt: &str) -> Result<String, TutorError> {
        self.ask(prompt).await
    }
}
