//! Optional pitch nudging toward a requested voice gender.
//!
//! Many devices ship only one or two voices per language, so asking for a
//! "male" or "female" reader can't always be satisfied by voice choice. When
//! enabled, [`PitchBias`] lowers or raises the user's pitch a little if the
//! resolved voice does not already sound like the requested gender.
//!
//! ## Accuracy Note
//!
//! Gender is inferred from voice names with the `gender_guesser` crate,
//! which has limitations for non-Western names, unisex names, and technical
//! identifiers (e.g., "Voice A", "en-us-x-iol-local"). The bias is a
//! heuristic and is off by default.

use gender_guesser::{Detector, Gender as GuesserGender};
use serde::{Deserialize, Serialize};

use crate::types::{Gender, clamp_multiplier};

/// Default pitch adjustment (15%).
pub const DEFAULT_BIAS_FACTOR: f32 = 0.15;

/// Pitch-based gender differentiation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchBias {
    /// The gender the listener asked for.
    pub preferred: Gender,
    /// Relative adjustment applied when the voice doesn't match.
    pub factor: f32,
}

impl PitchBias {
    /// A bias toward `preferred` with the default factor.
    pub fn toward(preferred: Gender) -> Self {
        Self {
            preferred,
            factor: DEFAULT_BIAS_FACTOR,
        }
    }

    /// Set the relative adjustment, clamped to `[0.0, 0.5]`.
    #[must_use]
    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = if factor.is_finite() {
            factor.clamp(0.0, 0.5)
        } else {
            DEFAULT_BIAS_FACTOR
        };
        self
    }

    /// The pitch to use for `voice_name` given the user's `pitch`.
    ///
    /// The result is the user's pitch scaled by the bias, so a user who set
    /// 1.3 for a female voice still hears their 1.3 times the nudge.
    pub fn apply(&self, pitch: f32, voice_name: &str) -> f32 {
        let multiplier = match self.preferred {
            Gender::Any => return pitch,
            preferred if voice_gender(voice_name) == preferred => return pitch,
            Gender::Male => 1.0 - self.factor,
            Gender::Female => 1.0 + self.factor,
        };
        let biased = clamp_multiplier(pitch * multiplier);
        tracing::debug!(
            voice = voice_name,
            requested = ?self.preferred,
            pitch,
            biased,
            "Applied pitch bias"
        );
        biased
    }
}

/// Infer gender from a voice name.
///
/// Uses the `gender_guesser` crate on the first word (alphabetic characters
/// only).
///
/// | gender_guesser result | Mapped to |
/// |----------------------|-----------|
/// | `Male`, `MayBeMale` | `Gender::Male` |
/// | `Female`, `MayBeFemale` | `Gender::Female` |
/// | `BothMaleFemale`, `NotSure`, `NotFound` | `Gender::Any` |
///
/// ## Examples
///
/// ```
/// use biscuit_narrates::pitch_bias::infer_gender;
/// use biscuit_narrates::types::Gender;
///
/// assert_eq!(infer_gender("Samantha"), Gender::Female);
/// assert_eq!(infer_gender("Albert"), Gender::Male);
/// assert_eq!(infer_gender(""), Gender::Any);
/// ```
pub fn infer_gender(name: &str) -> Gender {
    let first_word = name.split_whitespace().next().unwrap_or(name);
    guess(first_word)
}

/// Gender of a platform voice name.
///
/// Explicit markers win (`female`, `male`, eSpeak's `+f1` / `+m3` variants);
/// otherwise every alphabetic token is offered to [`infer_gender`]'s
/// detector, so `com.apple.voice.compact.en-US.Samantha` reads as female.
pub fn voice_gender(voice_name: &str) -> Gender {
    let lower = voice_name.to_lowercase();
    if lower.contains("female") || has_variant(&lower, 'f') {
        return Gender::Female;
    }
    if lower.contains("male") || has_variant(&lower, 'm') {
        return Gender::Male;
    }

    voice_name
        .split(|c: char| !c.is_alphabetic())
        .filter(|token| token.len() >= 3)
        .map(guess)
        .find(|g| *g != Gender::Any)
        .unwrap_or(Gender::Any)
}

fn has_variant(lower: &str, marker: char) -> bool {
    lower.split('+').skip(1).any(|variant| {
        let mut chars = variant.chars();
        chars.next() == Some(marker) && chars.all(|c| c.is_ascii_digit()) && variant.len() > 1
    })
}

fn guess(word: &str) -> Gender {
    let cleaned: String = word.chars().filter(|c| c.is_alphabetic()).collect();
    if cleaned.is_empty() {
        return Gender::Any;
    }

    match Detector::new().get_gender(&cleaned) {
        GuesserGender::Male | GuesserGender::MayBeMale => Gender::Male,
        GuesserGender::Female | GuesserGender::MayBeFemale => Gender::Female,
        GuesserGender::BothMaleFemale | GuesserGender::NotSure | GuesserGender::NotFound => {
            Gender::Any
        }
    }
}
