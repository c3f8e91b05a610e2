use serde::{Deserialize, Serialize};

/// Milo's personality for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Sweet,
    Savage,
    Nerdy,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sweet => "sweet",
            Mode::Savage => "savage",
            Mode::Nerdy => "nerdy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sweet" => Some(Mode::Sweet),
            "savage" => Some(Mode::Savage),
            "nerdy" => Some(Mode::Nerdy),
            _ => None,
        }
    }

    pub fn all() -> Vec<Mode> {
        vec![Mode::Sweet, Mode::Savage, Mode::Nerdy]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Sweet => "Sweet",
            Mode::Savage => "Savage",
            Mode::Nerdy => "Nerdy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mode::Sweet => "Gentle, encouraging, and supportive",
            Mode::Savage => "Tough love with brutal honesty",
            Mode::Nerdy => "Deep dives with geeky excitement",
        }
    }

    /// How the tutor should sound when this mode is active.
    pub fn tone_directive(&self) -> &'static str {
        match self {
            Mode::Sweet => {
                "Use comforting words, gentle encouragement, and relatable analogies."
            }
            Mode::Savage => {
                "Use tough love, brutally honest truth bombs, and sarcasm to drive clarity."
            }
            Mode::Nerdy => "Dive into fun facts, detailed logic, and geeky excitement.",
        }
    }

    /// Emoji set, badge first.
    pub fn emojis(&self) -> &'static [&'static str] {
        match self {
            Mode::Sweet => &["🌸", "💕", "✨"],
            Mode::Savage => &["🔥", "💪"],
            Mode::Nerdy => &["🤓", "🧠", "✨"],
        }
    }

    pub fn badge(&self) -> &'static str {
        self.emojis()[0]
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
