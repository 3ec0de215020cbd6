//! Biscuit Narrates
//!
//! Read text aloud through a speech engine that can only "speak this whole
//! string" or "stop", with pause, resume, skip and live position tracking
//! layered on top.
//!
//! ## Features
//!
//! - **Voice catalog**: installed voices grouped by language, malformed
//!   entries filtered, stable "Voice A", "Voice B" labels
//! - **Voice preferences**: a default voice is picked and remembered the
//!   first time each language is used
//! - **Simulated transport**: pause/resume/skip restart the engine on a
//!   suffix of the text
//! - **Open-loop progress**: a 10 Hz estimator predicts the sentence being
//!   spoken and races the engine to signal completion exactly once
//! - **Async-first**: built on tokio, collaborators are native async traits
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use biscuit_narrates::{LanguageSelector, NarratorConfig, PlaybackController};
//! use biscuit_narrates::providers::{ESpeakEngine, JsonFilePreferenceStore, MemoryPreferenceStore};
//!
//! let engine = Arc::new(ESpeakEngine::new());
//! let controller = PlaybackController::new(
//!     Arc::clone(&engine),
//!     engine,
//!     MemoryPreferenceStore::default(),
//!     NarratorConfig::default(),
//! );
//!
//! let mut events = controller.subscribe();
//! controller.play("Hello there. How are you today?", &LanguageSelector::UsEnglish, 1.0, 1.0).await?;
//! ```
//!
//! ## Module Structure
//!
//! - [`types`] - Voices, utterances, playback states/events, `NarratorConfig`
//! - [`languages`] - Language selectors, display names, flags, preference keys
//! - [`catalog`] - The grouped voice catalog
//! - [`resolver`] - Language → voice resolution and preference writes
//! - [`segmenter`] - Sentence segmentation and duration estimates
//! - [`estimator`] - The progress model and its timer task
//! - [`controller`] - The playback state machine
//! - [`providers`] - eSpeak engine and preference stores
//! - [`library`] - Saved readings

pub mod catalog;
pub mod controller;
pub mod errors;
pub mod estimator;
pub mod languages;
pub mod library;
pub mod pitch_bias;
pub mod preferences;
pub mod providers;
pub mod resolver;
pub mod segmenter;
pub mod traits;
pub mod types;

// Re-export main types at crate root for convenience
pub use catalog::VoiceCatalog;
pub use controller::PlaybackController;
pub use errors::NarrateError;
pub use estimator::{Progress, ProgressEstimator, ProgressModel};
pub use languages::LanguageSelector;
pub use library::{JsonlReadingLibrary, ReadingLibrary, SavedReading};
pub use pitch_bias::{PitchBias, infer_gender};
pub use preferences::is_malformed_voice_id;
pub use providers::{ESpeakEngine, JsonFilePreferenceStore, MemoryPreferenceStore};
pub use resolver::VoicePreferenceResolver;
pub use segmenter::{Segment, UtteranceSegmenter, segment, word_spans};
pub use traits::{PreferenceStore, SpeechEngine, VoiceInventory};
pub use types::{
    EngineEvent, Gender, InstalledVoice, LanguageGroup, LanguageOption, NarratorConfig,
    PlaybackEvent, PlaybackOutcome, PlaybackState, ResumePoint, SkipStep, Utterance,
    VoiceCatalogListing, VoiceDescriptor, VoiceQuality,
};
