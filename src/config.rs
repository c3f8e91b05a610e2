use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const ELEVENLABS_KEY_ENV: &str = "ELEVENLABS_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub default_mode: Option<String>,
    pub level: Option<String>,
    pub model: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Gemini key, with `GEMINI_API_KEY` taking precedence over the file.
    pub fn gemini_key(&self) -> Option<String> {
        resolve_key(std::env::var(GEMINI_KEY_ENV).ok(), self.gemini_api_key.as_deref())
    }

    /// ElevenLabs key, with `ELEVENLABS_API_KEY` taking precedence over the file.
    pub fn elevenlabs_key(&self) -> Option<String> {
        resolve_key(
            std::env::var(ELEVENLABS_KEY_ENV).ok(),
            self.elevenlabs_api_key.as_deref(),
        )
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("milo"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("milo.log"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

/// Blank values count as unset so an empty env var doesn't mask the file.
fn resolve_key(env: Option<String>, file: Option<&str>) -> Option<String> {
    env.as_deref()
        .into_iter()
        .chain(file)
        .map(str::trim)
        .find(|k| !k.is_empty())
        .map(str::to_string)
}
