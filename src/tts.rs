//! Text-to-speech playback.
//!
//! Text is split into sentences and handed to a [`SpeechEngine`] one chunk
//! at a time from a background thread. Stopping is cooperative: the stop
//! flag is checked between chunks and the engine is asked to cut the chunk
//! currently playing.

use crate::config::SpeechConfig;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Synthesizes and plays speech.
pub trait SpeechEngine: Send + Sync {
    /// Speak one chunk, blocking until playback ends or is interrupted.
    fn speak(&self, chunk: &str, voice: &str, speed: f32) -> Result<()>;

    /// Cut the chunk currently playing, if any.
    fn interrupt(&self);

    /// Clear a previous interrupt before a new run.
    fn reset(&self) {}
}

/// Speech engine backed by an external synthesizer such as `espeak-ng`.
pub struct CommandEngine {
    program: String,
    base_wpm: u32,
    child: Mutex<Option<Child>>,
    interrupted: AtomicBool,
}

impl CommandEngine {
    /// Create an engine running `program`.
    pub fn new(program: impl Into<String>, base_wpm: u32) -> Self {
        Self {
            program: program.into(),
            base_wpm,
            child: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Words per minute for a speed multiplier.
    pub fn words_per_minute(&self, speed: f32) -> u32 {
        ((self.base_wpm as f32) * speed.max(0.1)).round() as u32
    }
}

impl SpeechEngine for CommandEngine {
    fn speak(&self, chunk: &str, voice: &str, speed: f32) -> Result<()> {
        let mut slot = self.child.lock();
        // `interrupt` sets the flag before taking the lock.
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(());
        }

        let child = Command::new(&self.program)
            .arg("-v")
            .arg(voice)
            .arg("-s")
            .arg(self.words_per_minute(speed).to_string())
            .arg(chunk)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::Speech(format!("Failed to start {}: {}", self.program, e)))?;

        *slot = Some(child);
        drop(slot);

        // Poll so that `interrupt` can take the lock and kill the child.
        let status = loop {
            {
                let mut guard = self.child.lock();
                let Some(child) = guard.as_mut() else {
                    return Ok(());
                };
                if let Some(status) = child.try_wait()? {
                    guard.take();
                    break status;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        if status.success() || self.interrupted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Speech(format!("{} exited with {}", self.program, status)))
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }
    }

    fn reset(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

/// Split text into sentence chunks.
///
/// A chunk ends after `.`, `?` or `!` when followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '?' | '!') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            push_chunk(&mut chunks, &current);
            current.clear();
        }
    }
    push_chunk(&mut chunks, &current);

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Plays text through a speech engine on a background thread.
pub struct TtsPlayer {
    engine: Arc<dyn SpeechEngine>,
    voice: String,
    speed: f32,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TtsPlayer {
    /// Create a player over any engine.
    pub fn new(engine: Arc<dyn SpeechEngine>, voice: impl Into<String>, speed: f32) -> Self {
        Self {
            engine,
            voice: voice.into(),
            speed,
            stop_flag: Arc::new(AtomicBool::new(true)),
            thread: None,
        }
    }

    /// Create a player using the configured external synthesizer.
    pub fn from_config(config: &SpeechConfig) -> Self {
        let engine = CommandEngine::new(config.program.clone(), config.base_words_per_minute);
        Self::new(Arc::new(engine), config.voice.clone(), config.speed)
    }

    /// Speak `text` asynchronously, replacing any ongoing speech.
    pub fn speak(&mut self, text: &str) {
        self.stop();

        let chunks = split_sentences(text);
        if chunks.is_empty() {
            return;
        }

        self.engine.reset();

        // Fresh flag per run so a late stop of the old run cannot leak in.
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = stop_flag.clone();

        let engine = self.engine.clone();
        let voice = self.voice.clone();
        let speed = self.speed;

        tracing::debug!(chunks = chunks.len(), voice = %voice, speed, "Starting speech");

        self.thread = Some(std::thread::spawn(move || {
            for chunk in chunks {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = engine.speak(&chunk, &voice, speed) {
                    tracing::warn!(error = %e, "Speech playback failed");
                    break;
                }
            }
            stop_flag.store(true, Ordering::SeqCst);
        }));
    }

    /// Stop any ongoing speech and wait for the speaker thread.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            self.engine.interrupt();
            if handle.join().is_err() {
                tracing::warn!("Speech thread panicked");
            }
        }
    }

    /// Whether speech is currently playing.
    pub fn is_speaking(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
            && !self.stop_flag.load(Ordering::SeqCst)
    }
}

impl Drop for TtsPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Instant;

    /// Engine that records chunks instead of playing them.
    #[derive(Default)]
    pub(crate) struct RecordingEngine {
        pub spoken: Mutex<Vec<String>>,
        pub delay: Duration,
        pub interrupts: std::sync::atomic::AtomicUsize,
    }

    impl RecordingEngine {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        pub fn spoken(&self) -> Vec<String> {
            self.spoken.lock().clone()
        }
    }

    impl SpeechEngine for RecordingEngine {
        fn speak(&self, chunk: &str, _voice: &str, _speed: f32) -> Result<()> {
            std::thread::sleep(self.delay);
            self.spoken.lock().push(chunk.to_string());
            Ok(())
        }

        fn interrupt(&self) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn wait_until_silent(player: &TtsPlayer) {
        let start = Instant::now();
        while player.is_speaking() && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Hello there. How are you?  Fine!\nBye"),
            vec!["Hello there.", "How are you?", "Fine!", "Bye"]
        );
        assert_eq!(split_sentences("Version 1.5 is out."), vec!["Version 1.5 is out."]);
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn test_speaks_every_chunk_in_order() {
        let engine = Arc::new(RecordingEngine::default());
        let mut player = TtsPlayer::new(engine.clone(), "en", 1.0);

        player.speak("One. Two. Three.");
        wait_until_silent(&player);

        assert_eq!(engine.spoken(), vec!["One.", "Two.", "Three."]);
        assert!(!player.is_speaking());
    }

    #[test]
    fn test_stop_between_chunks() {
        let engine = Arc::new(RecordingEngine::with_delay(Duration::from_millis(40)));
        let mut player = TtsPlayer::new(engine.clone(), "en", 1.0);

        player.speak("A. B. C. D. E. F. G. H. I. J.");
        std::thread::sleep(Duration::from_millis(60));
        player.stop();

        let spoken = engine.spoken().len();
        assert!(spoken < 10, "spoke {} chunks after stop", spoken);
        assert!(!player.is_speaking());

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(engine.spoken().len(), spoken);
    }

    #[test]
    fn test_speak_replaces_ongoing_speech() {
        let engine = Arc::new(RecordingEngine::with_delay(Duration::from_millis(30)));
        let mut player = TtsPlayer::new(engine.clone(), "en", 1.0);

        player.speak("Old one. Old two. Old three. Old four. Old five.");
        std::thread::sleep(Duration::from_millis(10));
        player.speak("New.");
        wait_until_silent(&player);

        let spoken = engine.spoken();
        assert_eq!(spoken.last().map(String::as_str), Some("New."));
        assert!(spoken.len() < 6);
    }

    #[test]
    fn test_empty_text_does_not_start() {
        let engine = Arc::new(RecordingEngine::default());
        let mut player = TtsPlayer::new(engine.clone(), "en", 1.0);
        player.speak("  ");
        assert!(!player.is_speaking());
        assert!(engine.spoken().is_empty());
    }

    #[test]
    fn test_missing_program_stops_quietly() {
        let engine = Arc::new(CommandEngine::new("definitely-not-a-synthesizer", 175));
        assert!(engine.speak("Hello.", "en", 1.0).is_err());

        let mut player = TtsPlayer::new(engine, "en", 1.0);
        player.speak("Hello. World.");
        wait_until_silent(&player);
        assert!(!player.is_speaking());
    }

    #[test]
    fn test_interrupted_engine_skips_spawn() {
        let engine = CommandEngine::new("definitely-not-a-synthesizer", 175);

        engine.interrupt();
        assert!(engine.speak("Hello.", "en", 1.0).is_ok());
        assert!(engine.speak("Again.", "en", 1.0).is_ok());

        engine.reset();
        assert!(engine.speak("Hello.", "en", 1.0).is_err());
    }

    #[test]
    fn test_player_clears_interrupt_for_next_run() {
        let engine = Arc::new(CommandEngine::new("true", 175));
        let mut player = TtsPlayer::new(engine.clone(), "en", 1.0);

        engine.interrupt();
        player.speak("Hello.");
        wait_until_silent(&player);
        assert!(!engine.interrupted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_words_per_minute_scales_with_speed() {
        let engine = CommandEngine::new("espeak-ng", 175);
        assert_eq!(engine.words_per_minute(1.0), 175);
        assert_eq!(engine.words_per_minute(2.0), 350);
    }
}
