//! Platform speech and audio backends driven by external commands.
//!
//! macOS ships `say` and `afplay`; elsewhere we look for `espeak-ng`/`espeak`
//! and `mpg123`/`ffplay`. Each candidate is tried in order until one spawns.

use std::future::Future;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;

use super::voice::{parse_espeak_voices, parse_say_voices, VoiceDescriptor};
use super::{AudioPlayer, LocalSynthesizer, Playback, Utterance};
use crate::error::TutorError;

/// Upper bound on waiting for the engine to list its voices.
pub const VOICE_LIST_TIMEOUT: Duration = Duration::from_secs(3);

/// A running player or synthesizer process.
///
/// Holds the temp file backing remote audio, so the file is removed once the
/// playback is dropped.
pub struct ChildPlayback {
    child: Child,
    _audio: Option<NamedTempFile>,
}

impl ChildPlayback {
    fn new(child: Child, audio: Option<NamedTempFile>) -> Self {
        Self {
            child,
            _audio: audio,
        }
    }
}

impl Playback for ChildPlayback {
    fn poll_finished(&mut self) -> Option<Result<(), TutorError>> {
        match self.child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) if status.success() => Some(Ok(())),
            Ok(Some(status)) => Some(Err(TutorError::Playback(format!(
                "process exited with {}",
                status
            )))),
            Err(e) => Some(Err(e.into())),
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "Playback process already gone");
        }
    }
}

fn spawn_first(candidates: &[(&str, Vec<String>)]) -> Result<Child, TutorError> {
    let mut last_err = None;
    for (program, args) in candidates {
        match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => {
                tracing::debug!(program, "Spawned speech process");
                return Ok(child);
            }
            Err(e) => last_err = Some(format!("{}: {}", program, e)),
        }
    }
    Err(TutorError::Playback(
        last_err.unwrap_or_else(|| "no playback command available".to_string()),
    ))
}

/// Plays MPEG audio through a command-line player.
#[derive(Debug, Default, Clone)]
pub struct CommandPlayer;

impl CommandPlayer {
    pub fn new() -> Self {
        Self
    }

    fn candidates(path: &str) -> Vec<(&'static str, Vec<String>)> {
        if cfg!(target_os = "macos") {
            vec![("afplay", vec![path.to_string()])]
        } else {
            vec![
                ("mpg123", vec!["-q".to_string(), path.to_string()]),
                (
                    "ffplay",
                    vec![
                        "-nodisp".to_string(),
                        "-autoexit".to_string(),
                        "-loglevel".to_string(),
                        "quiet".to_string(),
                        path.to_string(),
                    ],
                ),
            ]
        }
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&self, audio: Vec<u8>) -> Result<Box<dyn Playback>, TutorError> {
        let mut file = tempfile::Builder::new()
            .prefix("milo-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&audio)?;
        file.flush()?;

        let path = file.path().to_string_lossy().to_string();
        let child = spawn_first(&Self::candidates(&path))?;
        Ok(Box::new(ChildPlayback::new(child, Some(file))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Say,
    Espeak,
}

/// Local text-to-speech through `say` or `espeak`.
pub struct CommandSynthesizer {
    engine: Engine,
    voices: OnceCell<Vec<VoiceDescriptor>>,
}

impl Default for CommandSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSynthesizer {
    pub fn new() -> Self {
        let engine = if cfg!(target_os = "macos") {
            Engine::Say
        } else {
            Engine::Espeak
        };
        Self {
            engine,
            voices: OnceCell::new(),
        }
    }

    fn programs(&self) -> &'static [&'static str] {
        match self.engine {
            Engine::Say => &["say"],
            Engine::Espeak => &["espeak-ng", "espeak"],
        }
    }

    /// `None` when the engine was too slow to answer; worth asking again later.
    async fn list_voices(&self) -> Option<Vec<VoiceDescriptor>> {
        for program in self.programs() {
            let mut cmd = Command::new(program);
            match self.engine {
                Engine::Say => cmd.args(["-v", "?"]),
                Engine::Espeak => cmd.arg("--voices"),
            };

            match run_listing(cmd, VOICE_LIST_TIMEOUT).await {
                ListingOutput::Text(text) => {
                    let voices = match self.engine {
                        Engine::Say => parse_say_voices(&text),
                        Engine::Espeak => parse_espeak_voices(&text),
                    };
                    tracing::debug!(program, count = voices.len(), "Listed local voices");
                    return Some(voices);
                }
                ListingOutput::Failed => continue,
                ListingOutput::TimedOut => {
                    tracing::warn!(program, "Timed out listing voices; using default voice for now");
                    return None;
                }
            }
        }
        Some(Vec::new())
    }

    fn args(&self, utterance: &Utterance) -> Vec<String> {
        let mut args = Vec::new();
        match self.engine {
            Engine::Say => {
                if let Some(voice) = &utterance.voice {
                    args.push("-v".to_string());
                    args.push(voice.id.clone());
                }
                args.push("-r".to_string());
                args.push(words_per_minute(utterance.rate, 180.0).to_string());
                // `say` has no pitch flag; the baseline pitch command is embedded in the text.
                args.push(format!(
                    "[[pbas {}]] {}",
                    (40.0 * utterance.pitch).round() as u32,
                    utterance.text
                ));
            }
            Engine::Espeak => {
                if let Some(voice) = &utterance.voice {
                    args.push("-v".to_string());
                    args.push(voice.id.clone());
                }
                args.push("-s".to_string());
                args.push(words_per_minute(utterance.rate, 175.0).to_string());
                args.push("-p".to_string());
                args.push(((50.0 * utterance.pitch).round() as u32).min(99).to_string());
                args.push("-a".to_string());
                args.push(((100.0 * utterance.volume).round() as u32).min(200).to_string());
                args.push("--".to_string());
                args.push(utterance.text.clone());
            }
        }
        args
    }
}

enum ListingOutput {
    Text(String),
    Failed,
    TimedOut,
}

async fn run_listing(mut cmd: Command, timeout: Duration) -> ListingOutput {
    cmd.stdin(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            ListingOutput::Text(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            tracing::debug!(status = %output.status, "Voice listing failed");
            ListingOutput::Failed
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Voice listing unavailable");
            ListingOutput::Failed
        }
        Err(_) => ListingOutput::TimedOut,
    }
}

/// Cache a definitive voice list; a timed-out listing is retried on the next call.
async fn cached_voices<F, Fut>(cell: &OnceCell<Vec<VoiceDescriptor>>, list: F) -> Vec<VoiceDescriptor>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<Vec<VoiceDescriptor>>>,
{
    cell.get_or_try_init(|| async { list().await.ok_or(()) })
        .await
        .cloned()
        .unwrap_or_default()
}

fn words_per_minute(rate: f32, base: f32) -> u32 {
    (base * rate).round().max(80.0) as u32
}

#[async_trait]
impl LocalSynthesizer for CommandSynthesizer {
    async fn voices(&self) -> Vec<VoiceDescriptor> {
        cached_voices(&self.voices, || self.list_voices()).await
    }

    fn speak(&self, utterance: Utterance) -> Result<Box<dyn Playback>, TutorError> {
        let args = self.args(&utterance);
        let candidates: Vec<(&str, Vec<String>)> = self
            .programs()
            .iter()
            .map(|program| (*program, args.clone()))
            .collect();
        let child = spawn_first(&candidates)?;
        Ok(Box::new(ChildPlayback::new(child, None)))
    }
}
