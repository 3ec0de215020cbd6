//! eSpeak/eSpeak-NG speech engine.
//!
//! Uses the `espeak-ng` or `espeak` command. Common on Linux systems, also
//! available on macOS and Windows. The process speaks a whole string and can
//! only be killed, which is exactly the primitive the controller expects.

use std::process::Stdio;
use std::sync::Mutex;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::errors::NarrateError;
use crate::traits::{SpeechEngine, VoiceInventory};
use crate::types::{EngineEvent, InstalledVoice, Utterance, VoiceQuality};

/// eSpeak's default speaking rate in words per minute.
pub const BASE_WORDS_PER_MINUTE: f32 = 175.0;
/// eSpeak's default pitch on its 0-99 scale.
pub const BASE_PITCH: f32 = 50.0;

/// eSpeak/eSpeak-NG engine and voice inventory.
///
/// ## Voice Selection
///
/// - `-v` is the utterance's voice id when present, otherwise its language
/// - `-s` is 175 words per minute scaled by the rate multiplier
/// - `-p` is 50 scaled by the pitch multiplier, clamped to 0-99
///
/// ## Examples
///
/// ```ignore
/// use biscuit_narrates::providers::ESpeakEngine;
/// use biscuit_narrates::{PlaybackController, MemoryPreferenceStore};
/// use std::sync::Arc;
///
/// let engine = Arc::new(ESpeakEngine::new());
/// let controller = PlaybackController::new(
///     Arc::clone(&engine),
///     engine,
///     MemoryPreferenceStore::default(),
///     Default::default(),
/// );
/// ```
#[derive(Debug)]
pub struct ESpeakEngine {
    /// The binary to use (espeak-ng or espeak).
    binary: String,
    /// Kill switch for the utterance currently being spoken.
    current: Mutex<Option<oneshot::Sender<()>>>,
}

impl Default for ESpeakEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ESpeakEngine {
    /// Create an engine, auto-detecting the available binary.
    pub fn new() -> Self {
        let binary = if which::which("espeak-ng").is_ok() {
            "espeak-ng"
        } else {
            "espeak"
        };
        Self::with_binary(binary)
    }

    /// Create an engine with a specific binary name.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            current: Mutex::new(None),
        }
    }

    /// Whether the binary can be found on `PATH`.
    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    /// Command-line arguments for `utterance` (text goes on stdin).
    fn build_args(utterance: &Utterance) -> Vec<String> {
        let voice = utterance
            .voice_id
            .clone()
            .unwrap_or_else(|| utterance.language_code.to_lowercase());
        let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).round().max(1.0) as u32;
        let pitch = (BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32;

        vec![
            "-v".into(),
            voice,
            "-s".into(),
            words_per_minute.to_string(),
            "-p".into(),
            pitch.to_string(),
        ]
    }

    fn take_kill_switch(&self) -> Option<oneshot::Sender<()>> {
        match self.current.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn store_kill_switch(&self, kill: oneshot::Sender<()>) {
        let previous = match self.current.lock() {
            Ok(mut guard) => guard.replace(kill),
            Err(poisoned) => poisoned.into_inner().replace(kill),
        };
        if let Some(previous) = previous {
            let _ = previous.send(());
        }
    }
}

impl SpeechEngine for ESpeakEngine {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn speak(
        &self,
        utterance: Utterance,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), NarrateError> {
        if let Some(previous) = self.take_kill_switch() {
            let _ = previous.send(());
        }

        let args = Self::build_args(&utterance);
        tracing::debug!(binary = %self.binary, ?args, chars = utterance.text.len(), "Spawning eSpeak");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NarrateError::ProcessSpawnFailed {
                engine: self.binary.clone(),
                source: e,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| NarrateError::StdinWriteError {
            engine: self.binary.clone(),
        })?;
        stdin
            .write_all(utterance.text.as_bytes())
            .await
            .map_err(|_| NarrateError::StdinWriteError {
                engine: self.binary.clone(),
            })?;
        // Closing stdin is the end-of-text signal.
        drop(stdin);

        let (kill_tx, kill_rx) = oneshot::channel();
        self.store_kill_switch(kill_tx);
        let _ = events.send(EngineEvent::Started);

        let binary = self.binary.clone();
        let mut stderr = child.stderr.take();
        tokio::spawn(async move {
            let event = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => EngineEvent::Finished,
                    Ok(status) => {
                        let mut message = String::new();
                        if let Some(stderr) = stderr.as_mut() {
                            let _ = stderr.read_to_string(&mut message).await;
                        }
                        let message = message.trim();
                        EngineEvent::Failed(if message.is_empty() {
                            format!("{binary} exited with {status}")
                        } else {
                            message.to_string()
                        })
                    }
                    Err(e) => EngineEvent::Failed(e.to_string()),
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(binary = %binary, error = %e, "Failed to kill eSpeak");
                    }
                    EngineEvent::Stopped
                }
            };
            tracing::debug!(binary = %binary, ?event, "eSpeak exited");
            let _ = events.send(event);
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), NarrateError> {
        if let Some(kill) = self.take_kill_switch() {
            let _ = kill.send(());
        }
        Ok(())
    }
}

impl VoiceInventory for ESpeakEngine {
    async fn list_voices(&self) -> Result<Vec<InstalledVoice>, NarrateError> {
        let output = Command::new(&self.binary)
            .arg("--voices")
            .output()
            .await
            .map_err(|e| NarrateError::VoiceEnumerationFailed {
                engine: self.binary.clone(),
                message: format!("Failed to run '{} --voices': {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(NarrateError::VoiceEnumerationFailed {
                engine: self.binary.clone(),
                message: format!(
                    "Command failed with status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_espeak_voices(&stdout, &self.binary))
    }
}

/// Parse the output of `espeak-ng --voices` or `espeak --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af                 -/M    Afrikaans          gmw/af
///  2  en-us              --/M   English_(America)  gmw/en-US            (en 2)
/// ```
fn parse_espeak_voices(output: &str, binary: &str) -> Vec<InstalledVoice> {
    output
        .lines()
        .filter(|line| !line.starts_with("Pty") && !line.trim().is_empty())
        .filter_map(|line| {
            let voice = parse_espeak_voice_line(line);
            if voice.is_none() {
                tracing::debug!(binary, line, "Skipping unparseable eSpeak voice line");
            }
            voice
        })
        .collect()
}

/// Parse one whitespace-separated line: Pty, Language, Age/Gender, VoiceName, File.
///
/// The language column doubles as the voice id, since `-v` accepts it.
fn parse_espeak_voice_line(line: &str) -> Option<InstalledVoice> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 || parts[0].parse::<u32>().is_err() {
        return None;
    }

    let language = parts[1];
    let name = parts[3].replace('_', " ");
    if language.is_empty() || name.is_empty() {
        return None;
    }

    Some(
        InstalledVoice::new(language, normalize_language_code(language))
            .with_name(name)
            .with_quality(VoiceQuality::Low),
    )
}

/// eSpeak writes `en-us`; everything else expects `en-US`.
fn normalize_language_code(code: &str) -> String {
    code.split('-')
        .enumerate()
        .map(|(idx, part)| {
            if idx == 1 && part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()) {
                part.to_ascii_uppercase()
            } else if idx == 0 {
                part.to_ascii_lowercase()
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

// ============================================================================
// Tests
// ============================================================================
