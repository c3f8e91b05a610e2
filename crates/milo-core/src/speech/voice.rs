//! Local voice metadata and selection.

use std::sync::LazyLock;

use regex::Regex;

static SAY_VOICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>\S.*?)\s+(?P<lang>[a-z]{2,3}[_-][A-Za-z0-9]+)\s+#")
        .expect("say voice pattern is valid")
});

static ESPEAK_VOICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\s+(?P<lang>\S+)\s+(?:(?P<age>[-\d]+)/)?(?P<gender>[MF-])\s+(?P<name>\S+)")
        .expect("espeak voice pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceAge {
    Child,
    Adult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoiceQuality {
    Standard,
    Enhanced,
}

/// A voice offered by the local synthesis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    /// Identifier passed back to the engine when speaking.
    pub id: String,
    pub name: String,
    pub language: String,
    pub gender: Option<Gender>,
    pub age: Option<VoiceAge>,
    pub quality: VoiceQuality,
}

impl VoiceDescriptor {
    pub fn new(id: impl Into<String>, language: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            language: language.into(),
            gender: None,
            age: None,
            quality: VoiceQuality::Standard,
        }
    }

    fn is_youthful_or_female(&self) -> bool {
        self.gender == Some(Gender::Female) || self.age == Some(VoiceAge::Child)
    }

    fn is_english(&self) -> bool {
        self.language.to_lowercase().starts_with("en")
    }
}

/// Pick the voice that best fits Milo: a youthful or female timbre first, then
/// an enhanced-quality voice, then whatever comes first. English voices win
/// ties within a tier. `None` means use the platform default.
pub fn select_voice(voices: &[VoiceDescriptor]) -> Option<&VoiceDescriptor> {
    voices.iter().min_by_key(|v| {
        let tier = if v.is_youthful_or_female() {
            0
        } else if v.quality == VoiceQuality::Enhanced {
            1
        } else {
            2
        };
        (tier, !v.is_english())
    })
}

/// Parse the output of `say -v '?'`.
///
/// Lines look like `Samantha            en_US    # Hello! My name is Samantha.`
pub fn parse_say_voices(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let caps = SAY_VOICE_RE.captures(line)?;
            let name = caps["name"].trim().to_string();
            let mut voice = VoiceDescriptor::new(name.clone(), &caps["lang"]);
            if name.contains("(Enhanced)") || name.contains("(Premium)") {
                voice.quality = VoiceQuality::Enhanced;
            }
            Some(voice)
        })
        .collect()
}

/// Parse the output of `espeak --voices` / `espeak-ng --voices`.
///
/// Lines look like ` 5  en-us          --/M      English_(America)  gmw/en-US`;
/// older espeak prints a bare `M`/`F` in the gender column.
pub fn parse_espeak_voices(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let caps = ESPEAK_VOICE_RE.captures(line)?;
            let lang = caps["lang"].to_string();
            let mut voice = VoiceDescriptor::new(lang.clone(), lang);
            voice.name = caps["name"].replace('_', " ");
            voice.gender = match &caps["gender"] {
                "F" => Some(Gender::Female),
                "M" => Some(Gender::Male),
                _ => None,
            };
            voice.age = caps
                .name("age")
                .and_then(|a| a.as_str().parse::<u32>().ok())
                .map(|age| if age < 18 { VoiceAge::Child } else { VoiceAge::Adult });
            Some(voice)
        })
        .collect()
}
