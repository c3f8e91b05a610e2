pub mod ai;
pub mod error;
pub mod mode;
pub mod prompt;
pub mod session;
pub mod speech;
pub mod state;

// Re-export main types for convenience
pub use ai::{CannedTutor, GeminiClient, TutorModel};
pub use error::TutorError;
pub use mode::Mode;
pub use prompt::PromptBuilder;
pub use session::{ChatSession, SessionOptions, SessionState, SubmitOutcome, APOLOGY};
pub use speech::{PlaybackState, SpeechOutput};
pub use state::{ChatMessage, ChatRole};
