//! Core types for the biscuit-narrates playback orchestrator.
//!
//! This module defines the values that flow between the orchestrator's parts:
//! - Installed and catalogued voices, grouped by language
//! - The utterance handed to a speech engine and the events it reports back
//! - Playback states, events and outcomes exposed to callers
//! - `NarratorConfig`, built with the builder pattern

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pitch_bias::PitchBias;

/// Lowest pitch or speed multiplier accepted by `play()`.
pub const MIN_MULTIPLIER: f32 = 0.5;
/// Highest pitch or speed multiplier accepted by `play()`.
pub const MAX_MULTIPLIER: f32 = 2.0;

/// Clamp a pitch or speed multiplier into `[0.5, 2.0]`.
///
/// Non-finite values (NaN, infinities) become `1.0`.
pub fn clamp_multiplier(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
    } else {
        1.0
    }
}

// ============================================================================
// Voices
// ============================================================================

/// The quality of a specific voice as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceQuality {
    /// Low quality (robotic, limited prosody).
    Low,
    /// Moderate quality (understandable but artificial).
    Moderate,
    /// Good quality (natural-sounding with occasional artifacts).
    Good,
    /// Excellent quality (near-human, minimal artifacts).
    Excellent,
    /// The platform did not say.
    #[default]
    Unknown,
}

impl fmt::Display for VoiceQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VoiceQuality::Low => "low",
            VoiceQuality::Moderate => "moderate",
            VoiceQuality::Good => "good",
            VoiceQuality::Excellent => "excellent",
            VoiceQuality::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Gender preference for voice selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Prefer a male voice.
    Male,
    /// Prefer a female voice.
    Female,
    /// No gender preference (use any available voice).
    #[default]
    Any,
}

/// A voice as reported by the platform's voice enumeration.
///
/// Nothing about it is trusted: the identifier may be empty or malformed and
/// the language may be missing. [`VoiceCatalog`](crate::VoiceCatalog) cleans
/// these up before anything else sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVoice {
    /// Engine-specific voice identifier.
    pub identifier: String,
    /// Human-facing technical name, when the platform provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// BCP-47 language code (`en-US`); may be empty.
    #[serde(default)]
    pub language: String,
    /// Reported quality.
    #[serde(default)]
    pub quality: VoiceQuality,
}

impl InstalledVoice {
    /// Create a voice with no name and unknown quality.
    pub fn new(identifier: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
            language: language.into(),
            quality: VoiceQuality::Unknown,
        }
    }

    /// Set the technical name of this voice.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the reported quality of this voice.
    #[must_use]
    pub fn with_quality(mut self, quality: VoiceQuality) -> Self {
        self.quality = quality;
        self
    }

    /// The name used for sorting and display, falling back to the identifier.
    pub fn technical_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.identifier)
    }
}

/// A validated voice, ready to be shown to a user or handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    /// Identifier accepted by the speech engine.
    pub id: String,
    /// Ordinal label within the language group (`Voice A`).
    pub display_label: String,
    /// The platform's own name for the voice.
    pub technical_name: String,
    /// BCP-47 language code.
    pub language_code: String,
    /// Reported quality.
    pub quality: VoiceQuality,
}

/// All catalogued voices for one exact language code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageGroup {
    /// BCP-47 language code shared by every voice in the group.
    pub language_code: String,
    /// Human-readable language name.
    pub display_name: String,
    /// A flag emoji, or a globe when no region is known.
    pub flag_hint: String,
    /// Whether this is one of the product's priority languages.
    pub is_priority: bool,
    /// The key under which this language's voice preference is stored.
    pub preference_key: String,
    /// Voices, sorted and labelled.
    pub voices: Vec<VoiceDescriptor>,
}

/// The grouped voice catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCatalogListing {
    /// Number of voices across all groups.
    pub total_count: usize,
    /// Groups, priority languages first.
    pub language_groups: Vec<LanguageGroup>,
}

impl VoiceCatalogListing {
    /// Whether no usable voices were found.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Iterate over every voice in group order.
    pub fn voices(&self) -> impl Iterator<Item = &VoiceDescriptor> {
        self.language_groups.iter().flat_map(|g| g.voices.iter())
    }
}

/// A selectable language for front ends, one per catalog group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageOption {
    /// Selector identifier (`en_us_f`, `lang_es_MX`).
    pub id: String,
    /// Label including the flag and voice count.
    pub label: String,
    /// BCP-47 language code.
    pub language_code: String,
    /// Number of voices available.
    pub voice_count: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// One request to the speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    /// Text to speak.
    pub text: String,
    /// BCP-47 language code.
    pub language_code: String,
    /// Concrete voice; `None` lets the engine choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Pitch multiplier (1.0 is the voice's natural pitch).
    pub pitch: f32,
    /// Rate multiplier (1.0 is the engine's normal rate).
    pub rate: f32,
}

/// Lifecycle notifications from the speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    /// Audio began.
    Started,
    /// The whole utterance was spoken.
    Finished,
    /// The utterance was cut short by `stop()`.
    Stopped,
    /// Synthesis failed.
    Failed(String),
}

// ============================================================================
// Playback
// ============================================================================

/// Where the controller's state machine currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing is being spoken.
    #[default]
    Idle,
    /// The engine is speaking and the estimator is ticking.
    Speaking,
    /// Audio is stopped but the session remembers its position.
    Paused,
    /// The last session ran to completion.
    Done,
    /// The engine reported a failure.
    Error,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Speaking => "speaking",
            PlaybackState::Paused => "paused",
            PlaybackState::Done => "done",
            PlaybackState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Typed notifications broadcast by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// The engine reported that audio began.
    Started,
    /// Estimated position.
    Progress {
        /// Segment believed to be playing.
        segment_index: usize,
        /// Overall progress in `[0, 1]`.
        fraction: f64,
    },
    /// Playback was paused.
    Paused,
    /// Playback resumed.
    Resumed,
    /// The cursor jumped to a new word.
    Skipped {
        /// Word the engine restarted from.
        word_index: usize,
    },
    /// The session finished naturally.
    Completed,
    /// The session was stopped or superseded.
    Stopped,
    /// The engine failed.
    Failed {
        /// What the engine reported.
        message: String,
    },
}

/// How a call to `play()` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackOutcome {
    /// The text was spoken to the end.
    Completed,
    /// The session was stopped, or replaced by a newer `play()`.
    Stopped,
}

/// How far a skip moves the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipStep {
    /// Move by a number of words.
    Words(usize),
    /// Move by a number of sentences, landing on a sentence start.
    Sentences(usize),
}

impl Default for SkipStep {
    fn default() -> Self {
        SkipStep::Words(10)
    }
}

/// Where `resume()` restarts the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePoint {
    /// Repeat the sentence that was interrupted.
    #[default]
    SentenceStart,
    /// Continue from the estimated word.
    Word,
}

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for a [`PlaybackController`](crate::PlaybackController).
///
/// ## Examples
///
/// ```
/// use std::time::Duration;
/// use biscuit_narrates::types::{NarratorConfig, SkipStep, ResumePoint};
///
/// let config = NarratorConfig::new()
///     .with_skip_step(SkipStep::Sentences(1))
///     .with_resume_point(ResumePoint::Word)
///     .with_tick_interval(Duration::from_millis(250));
/// assert_eq!(config.ms_per_word, 400.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NarratorConfig {
    /// How often the progress estimator ticks.
    pub tick_interval: Duration,
    /// Average milliseconds per word at 1.0x speed.
    pub ms_per_word: f64,
    /// Distance moved by `skip_forward()` / `skip_backward()`.
    pub skip_step: SkipStep,
    /// Where `resume()` restarts.
    pub resume_point: ResumePoint,
    /// Optional gender differentiation by pitch.
    pub pitch_bias: Option<PitchBias>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            ms_per_word: 400.0,
            skip_step: SkipStep::default(),
            resume_point: ResumePoint::default(),
            pitch_bias: None,
        }
    }
}

impl NarratorConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the estimator tick interval. Zero is raised to one millisecond.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the average milliseconds per word at 1.0x.
    #[must_use]
    pub fn with_ms_per_word(mut self, ms: f64) -> Self {
        if ms.is_finite() && ms > 0.0 {
            self.ms_per_word = ms;
        }
        self
    }

    /// Set the skip distance.
    #[must_use]
    pub fn with_skip_step(mut self, step: SkipStep) -> Self {
        self.skip_step = step;
        self
    }

    /// Set where `resume()` restarts.
    #[must_use]
    pub fn with_resume_point(mut self, point: ResumePoint) -> Self {
        self.resume_point = point;
        self
    }

    /// Enable pitch-based gender differentiation.
    #[must_use]
    pub fn with_pitch_bias(mut self, bias: PitchBias) -> Self {
        self.pitch_bias = Some(bias);
        self
    }
}
