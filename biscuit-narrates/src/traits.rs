//! Traits for the collaborators the orchestrator drives.
//!
//! The orchestrator never talks to a platform directly. It is handed a
//! [`SpeechEngine`], a [`VoiceInventory`] and a [`PreferenceStore`] and only
//! ever uses these interfaces.
//!
//! ## Native Async Traits
//!
//! These traits use native Rust async functions in traits (AFIT) returning
//! `Send` futures. No `async-trait` crate is needed. Implementations must be
//! `Send + Sync` so the controller can share them with its driver task.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::errors::NarrateError;
use crate::types::{EngineEvent, InstalledVoice, Utterance};

/// A speech primitive that can only speak a whole string or stop.
///
/// `speak` returns once the engine has accepted the utterance; the lifecycle
/// arrives afterwards on `events`. An engine must emit at most one terminal
/// event (`Finished`, `Stopped` or `Failed`) per accepted utterance.
pub trait SpeechEngine: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Start speaking `utterance`, reporting lifecycle events on `events`.
    ///
    /// ## Errors
    ///
    /// Returns `NarrateError` if the engine could not accept the utterance.
    fn speak(
        &self,
        utterance: Utterance,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> impl Future<Output = Result<(), NarrateError>> + Send;

    /// Stop whatever is being spoken. Stopping an idle engine is not an error.
    fn stop(&self) -> impl Future<Output = Result<(), NarrateError>> + Send;
}

/// Enumerates the voices installed on the device.
pub trait VoiceInventory: Send + Sync {
    /// List every installed voice, unfiltered.
    fn list_voices(&self) -> impl Future<Output = Result<Vec<InstalledVoice>, NarrateError>> + Send;
}

/// Persists the preference blob, a JSON object shared with other settings.
pub trait PreferenceStore: Send + Sync {
    /// Load the whole blob. A store with nothing saved returns `{}`.
    fn load(&self) -> impl Future<Output = Result<serde_json::Value, NarrateError>> + Send;

    /// Replace the whole blob.
    fn save(
        &self,
        preferences: serde_json::Value,
    ) -> impl Future<Output = Result<(), NarrateError>> + Send;
}

impl<T: SpeechEngine> SpeechEngine for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn speak(
        &self,
        utterance: Utterance,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> impl Future<Output = Result<(), NarrateError>> + Send {
        (**self).speak(utterance, events)
    }

    fn stop(&self) -> impl Future<Output = Result<(), NarrateError>> + Send {
        (**self).stop()
    }
}

impl<T: VoiceInventory> VoiceInventory for Arc<T> {
    fn list_voices(&self) -> impl Future<Output = Result<Vec<InstalledVoice>, NarrateError>> + Send {
        (**self).list_voices()
    }
}

impl<T: PreferenceStore> PreferenceStore for Arc<T> {
    fn load(&self) -> impl Future<Output = Result<serde_json::Value, NarrateError>> + Send {
        (**self).load()
    }

    fn save(
        &self,
        preferences: serde_json::Value,
    ) -> impl Future<Output = Result<(), NarrateError>> + Send {
        (**self).save(preferences)
    }
}

// ============================================================================
// Tests
// ============================================================================
