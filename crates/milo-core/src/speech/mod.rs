//! Reading assistant replies aloud.
//!
//! [`SpeechOutput`] is a per-message toggle: the first `speak` starts audio,
//! the next one stops it. It tries the remote voice service when one is
//! configured and falls back to local synthesis on any failure. Nothing here
//! returns an error to the caller; failures end in `Idle`.

pub mod command;
pub mod elevenlabs;
pub mod voice;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::TutorError;

pub use command::{CommandPlayer, CommandSynthesizer};
pub use elevenlabs::ElevenLabsClient;
pub use voice::{select_voice, Gender, VoiceAge, VoiceDescriptor, VoiceQuality};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
}

/// Remote high-fidelity text-to-speech.
#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Returns encoded audio for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TutorError>;
}

/// Something audible that is currently running.
pub trait Playback: Send {
    /// `None` while still playing; `Some` once it ended or failed.
    fn poll_finished(&mut self) -> Option<Result<(), TutorError>>;
    fn stop(&mut self);
}

/// Plays audio returned by a [`VoiceService`].
pub trait AudioPlayer: Send + Sync {
    fn play(&self, audio: Vec<u8>) -> Result<Box<dyn Playback>, TutorError>;
}

/// Platform-native text-to-speech.
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    /// Voices the engine offers. Empty means only the default voice.
    async fn voices(&self) -> Vec<VoiceDescriptor>;
    fn speak(&self, utterance: Utterance) -> Result<Box<dyn Playback>, TutorError>;
}

/// Text plus the prosody used to read it locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<VoiceDescriptor>,
}

impl Utterance {
    /// A slightly slower, higher reading that sounds younger and warmer, and
    /// more so when the text exclaims or asks.
    pub fn expressive(text: &str) -> Self {
        let emphatic = text.contains('!') || text.contains('?');
        Self {
            text: text.to_string(),
            rate: if emphatic { 0.8 } else { 0.85 },
            pitch: if emphatic { 1.4 } else { 1.3 },
            volume: 1.0,
            voice: None,
        }
    }
}

struct Inner {
    state: PlaybackState,
    active: Option<Box<dyn Playback>>,
    // Bumped whenever an outstanding request is abandoned.
    generation: u64,
}

/// Returns to `Idle` if a `speak` future is dropped while still loading.
struct LoadingGuard<'a> {
    inner: &'a Mutex<Inner>,
    generation: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.generation == self.generation && inner.state == PlaybackState::Loading {
            tracing::debug!("Speech request abandoned while loading");
            inner.state = PlaybackState::Idle;
        }
    }
}

#[derive(Clone)]
pub struct SpeechOutput {
    remote: Option<Arc<dyn VoiceService>>,
    player: Arc<dyn AudioPlayer>,
    local: Arc<dyn LocalSynthesizer>,
    inner: Arc<Mutex<Inner>>,
}

impl SpeechOutput {
    /// `remote = None` disables the remote voice path entirely.
    pub fn new(
        remote: Option<Arc<dyn VoiceService>>,
        player: Arc<dyn AudioPlayer>,
        local: Arc<dyn LocalSynthesizer>,
    ) -> Self {
        Self {
            remote,
            player,
            local,
            inner: Arc::new(Mutex::new(Inner {
                state: PlaybackState::Idle,
                active: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Toggle reading `text` aloud and return the resulting state.
    pub async fn speak(&self, text: &str) -> PlaybackState {
        let generation = {
            let mut inner = self.lock();
            match inner.state {
                PlaybackState::Playing => {
                    Self::halt(&mut inner);
                    return PlaybackState::Idle;
                }
                PlaybackState::Loading => return PlaybackState::Loading,
                PlaybackState::Idle => {}
            }
            inner.generation += 1;
            inner.state = PlaybackState::Loading;
            inner.generation
        };
        let _loading = LoadingGuard {
            inner: &self.inner,
            generation,
        };

        if let Some(remote) = &self.remote {
            let attempt = match remote.synthesize(text).await {
                Ok(audio) => self.player.play(audio),
                Err(e) => Err(e),
            };
            match attempt {
                Ok(playback) => return self.begin(generation, playback),
                Err(e) => {
                    let stale = self.lock().generation != generation;
                    if stale {
                        return self.state();
                    }
                    tracing::warn!(error = %e, "Remote voice failed; falling back to local synthesis");
                }
            }
        }

        self.speak_local(generation, text).await
    }

    async fn speak_local(&self, generation: u64, text: &str) -> PlaybackState {
        let voices = self.local.voices().await;
        let mut utterance = Utterance::expressive(text);
        utterance.voice = select_voice(&voices).cloned();

        let mut inner = self.lock();
        if inner.generation != generation {
            return inner.state;
        }
        match self.local.speak(utterance) {
            Ok(playback) => {
                inner.active = Some(playback);
                inner.state = PlaybackState::Playing;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Local speech synthesis failed");
                inner.state = PlaybackState::Idle;
            }
        }
        inner.state
    }

    fn begin(&self, generation: u64, mut playback: Box<dyn Playback>) -> PlaybackState {
        let mut inner = self.lock();
        if inner.generation != generation {
            playback.stop();
            return inner.state;
        }
        inner.active = Some(playback);
        inner.state = PlaybackState::Playing;
        inner.state
    }

    fn halt(inner: &mut Inner) {
        if let Some(mut playback) = inner.active.take() {
            playback.stop();
        }
        if inner.state == PlaybackState::Loading {
            inner.generation += 1;
        }
        inner.state = PlaybackState::Idle;
    }

    /// Silence any output and abandon an outstanding request. Safe to call in any state.
    pub fn stop(&self) {
        let mut inner = self.lock();
        Self::halt(&mut inner);
    }

    /// Check for natural completion; call on every UI tick.
    pub fn poll(&self) -> PlaybackState {
        let mut inner = self.lock();
        if let Some(playback) = inner.active.as_mut() {
            if let Some(result) = playback.poll_finished() {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Playback ended with an error");
                }
                inner.active = None;
                inner.state = PlaybackState::Idle;
            }
        }
        inner.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeHandle {
        finished: AtomicBool,
        failed: AtomicBool,
        stopped: AtomicBool,
    }

    struct FakePlayback(Arc<FakeHandle>);

    impl Playback for FakePlayback {
        fn poll_finished(&mut self) -> Option<Result<(), TutorError>> {
            if self.0.failed.load(Ordering::SeqCst) {
                Some(Err(TutorError::Playback("device lost".to_string())))
            } else if self.0.finished.load(Ordering::SeqCst) {
                Some(Ok(()))
            } else {
                None
            }
        }

        fn stop(&mut self) {
            self.0.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct FakeRemote {
        result: Result<Vec<u8>, u16>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl VoiceService for FakeRemote {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, TutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result
                .clone()
                .map_err(|status| TutorError::status(status, "voice service error"))
        }
    }

    #[derive(Default)]
    struct FakePlayer {
        played: Mutex<Vec<Vec<u8>>>,
        handles: Mutex<Vec<Arc<FakeHandle>>>,
    }

    impl AudioPlayer for FakePlayer {
        fn play(&self, audio: Vec<u8>) -> Result<Box<dyn Playback>, TutorError> {
            self.played.lock().unwrap().push(audio);
            let handle = Arc::new(FakeHandle::default());
            self.handles.lock().unwrap().push(handle.clone());
            Ok(Box::new(FakePlayback(handle)))
        }
    }

    #[derive(Default)]
    struct FakeLocal {
        voices: Vec<VoiceDescriptor>,
        spoken: Mutex<Vec<Utterance>>,
        handles: Mutex<Vec<Arc<FakeHandle>>>,
        fail: bool,
    }

    #[async_trait]
    impl LocalSynthesizer for FakeLocal {
        async fn voices(&self) -> Vec<VoiceDescriptor> {
            self.voices.clone()
        }

        fn speak(&self, utterance: Utterance) -> Result<Box<dyn Playback>, TutorError> {
            self.spoken.lock().unwrap().push(utterance);
            if self.fail {
                return Err(TutorError::Playback("no speech engine".to_string()));
            }
            let handle = Arc::new(FakeHandle::default());
            self.handles.lock().unwrap().push(handle.clone());
            Ok(Box::new(FakePlayback(handle)))
        }
    }

    fn remote(result: Result<Vec<u8>, u16>) -> Arc<FakeRemote> {
        Arc::new(FakeRemote {
            result,
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn output(
        remote: Option<Arc<FakeRemote>>,
        player: Arc<FakePlayer>,
        local: Arc<FakeLocal>,
    ) -> SpeechOutput {
        SpeechOutput::new(remote.map(|r| r as Arc<dyn VoiceService>), player, local)
    }

    #[test]
    fn test_expressive_prosody() {
        let calm = Utterance::expressive("Gravity pulls things down.");
        assert_eq!((calm.rate, calm.pitch, calm.volume), (0.85, 1.3, 1.0));
        let excited = Utterance::expressive("Hello?");
        assert_eq!((excited.rate, excited.pitch), (0.8, 1.4));
        let shout = Utterance::expressive("Wow!");
        assert_eq!((shout.rate, shout.pitch), (0.8, 1.4));
    }

    #[tokio::test]
    async fn test_local_only_speak_twice_toggles() {
        let local = Arc::new(FakeLocal::default());
        let speech = output(None, Arc::new(FakePlayer::default()), local.clone());

        assert_eq!(speech.state(), PlaybackState::Idle);
        assert_eq!(speech.speak("Hi").await, PlaybackState::Playing);
        assert_eq!(speech.speak("Hi").await, PlaybackState::Idle);
        assert_eq!(speech.state(), PlaybackState::Idle);

        assert_eq!(local.spoken.lock().unwrap().len(), 1);
        assert!(local.handles.lock().unwrap()[0].stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_remote_success_plays_remote_audio() {
        let r = remote(Ok(vec![1, 2, 3]));
        let player = Arc::new(FakePlayer::default());
        let local = Arc::new(FakeLocal::default());
        let speech = output(Some(r.clone()), player.clone(), local.clone());

        assert_eq!(speech.speak("Hello").await, PlaybackState::Playing);
        assert_eq!(player.played.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
        assert!(local.spoken.lock().unwrap().is_empty());

        assert_eq!(speech.speak("Hello").await, PlaybackState::Idle);
        assert!(player.handles.lock().unwrap()[0].stopped.load(Ordering::SeqCst));
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local_once() {
        let r = remote(Err(401));
        let player = Arc::new(FakePlayer::default());
        let local = Arc::new(FakeLocal::default());
        let speech = output(Some(r.clone()), player.clone(), local.clone());

        assert_eq!(speech.speak("Hello?").await, PlaybackState::Playing);

        let spoken = local.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "Hello?");
        assert_eq!((spoken[0].rate, spoken[0].pitch), (0.8, 1.4));
        assert!(player.played.lock().unwrap().is_empty());
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_failure_ends_idle() {
        let local = Arc::new(FakeLocal {
            fail: true,
            ..FakeLocal::default()
        });
        let speech = output(Some(remote(Err(500))), Arc::new(FakePlayer::default()), local);
        assert_eq!(speech.speak("Hi").await, PlaybackState::Idle);
        assert_eq!(speech.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_local_voice_is_selected_from_metadata() {
        let mut female = VoiceDescriptor::new("en-us", "en-us");
        female.gender = Some(Gender::Female);
        let local = Arc::new(FakeLocal {
            voices: vec![VoiceDescriptor::new("de", "de"), female.clone()],
            ..FakeLocal::default()
        });
        let speech = output(None, Arc::new(FakePlayer::default()), local.clone());
        speech.speak("Hi").await;
        assert_eq!(local.spoken.lock().unwrap()[0].voice, Some(female));
    }

    #[tokio::test]
    async fn test_poll_returns_to_idle_on_completion() {
        let local = Arc::new(FakeLocal::default());
        let speech = output(None, Arc::new(FakePlayer::default()), local.clone());
        speech.speak("Hi").await;
        assert_eq!(speech.poll(), PlaybackState::Playing);

        local.handles.lock().unwrap()[0].finished.store(true, Ordering::SeqCst);
        assert_eq!(speech.poll(), PlaybackState::Idle);

        // A finished message can be replayed.
        assert_eq!(speech.speak("Hi").await, PlaybackState::Playing);
        assert_eq!(local.spoken.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_returns_to_idle_on_playback_error() {
        let player = Arc::new(FakePlayer::default());
        let speech = output(Some(remote(Ok(vec![9]))), player.clone(), Arc::new(FakeLocal::default()));
        speech.speak("Hi").await;
        player.handles.lock().unwrap()[0].failed.store(true, Ordering::SeqCst);
        assert_eq!(speech.poll(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let local = Arc::new(FakeLocal::default());
        let speech = output(None, Arc::new(FakePlayer::default()), local.clone());
        speech.stop();
        assert_eq!(speech.state(), PlaybackState::Idle);
        speech.speak("Hi").await;
        speech.stop();
        speech.stop();
        assert_eq!(speech.state(), PlaybackState::Idle);
        assert_eq!(speech.poll(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_loading_rejects_second_request_and_stop_discards_result() {
        let gate = Arc::new(Notify::new());
        let r = Arc::new(FakeRemote {
            result: Ok(vec![7]),
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });
        let player = Arc::new(FakePlayer::default());
        let local = Arc::new(FakeLocal::default());
        let speech = output(Some(r.clone()), player.clone(), local.clone());

        let first = tokio::spawn({
            let speech = speech.clone();
            async move { speech.speak("Hi").await }
        });
        for _ in 0..100 {
            if speech.state() == PlaybackState::Loading {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(speech.state(), PlaybackState::Loading);
        assert_eq!(speech.speak("Hi").await, PlaybackState::Loading);
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);

        speech.stop();
        assert_eq!(speech.state(), PlaybackState::Idle);
        gate.notify_one();
        assert_eq!(first.await.unwrap(), PlaybackState::Idle);

        // The late audio was started and immediately stopped; nothing is active.
        assert!(player.handles.lock().unwrap()[0].stopped.load(Ordering::SeqCst));
        assert!(local.spoken.lock().unwrap().is_empty());
        assert_eq!(speech.poll(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_abandoned_speak_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let r = Arc::new(FakeRemote {
            result: Ok(vec![7]),
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });
        let player = Arc::new(FakePlayer::default());
        let speech = output(Some(r.clone()), player.clone(), Arc::new(FakeLocal::default()));

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), speech.speak("Hi")).await;
        assert!(timed_out.is_err());
        assert_eq!(speech.state(), PlaybackState::Idle);

        gate.notify_one();
        assert_eq!(speech.speak("Hi").await, PlaybackState::Playing);
        assert_eq!(r.calls.load(Ordering::SeqCst), 2);
        assert_eq!(player.played.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_independent_outputs_do_not_share_state() {
        let local = Arc::new(FakeLocal::default());
        let player = Arc::new(FakePlayer::default());
        let a = output(None, player.clone(), local.clone());
        let b = output(None, player, local.clone());
        a.speak("one").await;
        assert_eq!(b.state(), PlaybackState::Idle);
        assert_eq!(b.speak("two").await, PlaybackState::Playing);
        assert_eq!(a.state(), PlaybackState::Playing);
        assert_eq!(local.spoken.lock().unwrap().len(), 2);
    }
}
