//! Turning a language choice into a concrete voice.
//!
//! The first time a language is used without a saved voice, the resolver
//! picks the catalog's first voice for it ("Voice A") and saves that as the
//! default, so the listener hears the same voice next time.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::catalog::VoiceCatalog;
use crate::errors::NarrateError;
use crate::languages::{LanguageSelector, base_language};
use crate::preferences::{
    is_malformed_voice_id, set_voice, strip_malformed, voice_entries, voice_for,
};
use crate::traits::{PreferenceStore, VoiceInventory};
use crate::types::{VoiceCatalogListing, VoiceDescriptor};

/// Resolves language selectors to voices and manages voice preferences.
///
/// Every read-modify-write of the preference blob happens under one async
/// lock. Between an automatic default and an explicit choice the last
/// writer wins, except that an automatic default never replaces a key that
/// changed in the meantime.
#[derive(Debug)]
pub struct VoicePreferenceResolver<I, S> {
    catalog: VoiceCatalog<I>,
    store: S,
    write_lock: Mutex<()>,
}

impl<I, S> VoicePreferenceResolver<I, S>
where
    I: VoiceInventory,
    S: PreferenceStore,
{
    /// Build a resolver over an inventory and a preference store.
    pub fn new(inventory: I, store: S) -> Self {
        Self {
            catalog: VoiceCatalog::new(inventory),
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// The voice catalog.
    pub fn catalog(&self) -> &VoiceCatalog<I> {
        &self.catalog
    }

    /// The preference store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The voice id to use for `selector`, or `None` for the engine default.
    pub async fn resolve(&self, selector: &LanguageSelector) -> Option<String> {
        self.resolve_voice(selector).await.map(|voice| voice.id)
    }

    /// Like [`resolve`](Self::resolve), returning the full descriptor.
    ///
    /// Never fails: persistence and enumeration problems are logged.
    pub async fn resolve_voice(&self, selector: &LanguageSelector) -> Option<VoiceDescriptor> {
        let language_code = selector.language_code();
        let key = selector.preference_key();

        let preferences = self.load_preferences().await;
        let listing = self.catalog.list_grouped_voices().await;

        let saved = voice_for(&preferences, &key);
        if let Some(saved) = saved.as_deref() {
            if let Some(voice) = find_voice(&listing, saved) {
                tracing::debug!(language = language_code, voice_id = %saved, "Using saved voice");
                return Some(voice.clone());
            }
            tracing::debug!(
                language = language_code,
                voice_id = %saved,
                "Saved voice is no longer installed"
            );
        }

        let Some(voice) = default_voice(&listing, language_code) else {
            tracing::debug!(language = language_code, "No installed voice, using engine default");
            return None;
        };

        self.save_default(&key, &voice.id, saved.as_deref()).await;
        Some(voice)
    }

    /// Save `voice_id` as the voice for `key`.
    ///
    /// Returns `false` without writing when the id is empty or malformed,
    /// and `false` when the store could not be read or written.
    pub async fn set_voice_preference(&self, key: &str, voice_id: &str) -> bool {
        let voice_id = voice_id.trim();
        if is_malformed_voice_id(voice_id) {
            tracing::debug!(key, voice_id, "Rejected malformed voice id");
            return false;
        }
        self.write_voice(key, Some(voice_id)).await
    }

    /// Reset the voice for `key` to automatic selection.
    pub async fn clear_voice_preference(&self, key: &str) -> bool {
        self.write_voice(key, None).await
    }

    /// Every saved voice key with its voice id (`None` for automatic).
    pub async fn voice_preferences(&self) -> BTreeMap<String, Option<String>> {
        voice_entries(&self.load_preferences().await)
    }

    /// Voices offered for `selector`, or every voice when `None`.
    pub async fn list_voice_options(
        &self,
        selector: Option<&LanguageSelector>,
    ) -> Vec<VoiceDescriptor> {
        match selector {
            Some(selector) => self.catalog.voices_for(selector.language_code()).await,
            None => self.catalog.list_grouped_voices().await.voices().cloned().collect(),
        }
    }

    async fn load_preferences(&self) -> Value {
        match self.try_load().await {
            Ok(preferences) => preferences,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load preferences, using defaults");
                Value::Object(Map::new())
            }
        }
    }

    async fn try_load(&self) -> Result<Value, NarrateError> {
        let mut preferences = self.store.load().await?;
        let removed = strip_malformed(&mut preferences);
        if !removed.is_empty() {
            tracing::debug!(?removed, "Dropped malformed saved voices");
        }
        Ok(preferences)
    }

    /// Persist `voice_id` for `key` unless the key changed since it was read
    /// as `replacing` (`None` meaning unset).
    async fn save_default(&self, key: &str, voice_id: &str, replacing: Option<&str>) {
        let _guard = self.write_lock.lock().await;

        let mut preferences = match self.try_load().await {
            Ok(preferences) => preferences,
            Err(e) => {
                tracing::warn!(error = %e, key, "Skipping default voice save");
                return;
            }
        };
        if voice_for(&preferences, key).as_deref() != replacing {
            tracing::debug!(key, "Voice preference changed meanwhile, keeping it");
            return;
        }

        set_voice(&mut preferences, key, Some(voice_id));
        match self.store.save(preferences).await {
            Ok(()) => tracing::info!(key, voice_id, "Saved default voice"),
            Err(e) => tracing::warn!(error = %e, key, "Failed to save default voice"),
        }
    }

    async fn write_voice(&self, key: &str, voice_id: Option<&str>) -> bool {
        let _guard = self.write_lock.lock().await;

        let mut preferences = match self.try_load().await {
            Ok(preferences) => preferences,
            Err(e) => {
                tracing::warn!(error = %e, key, "Cannot update voice preference");
                return false;
            }
        };

        set_voice(&mut preferences, key, voice_id);
        match self.store.save(preferences).await {
            Ok(()) => {
                tracing::debug!(key, voice_id, "Saved voice preference");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, key, "Failed to save voice preference");
                false
            }
        }
    }
}

fn find_voice<'a>(listing: &'a VoiceCatalogListing, voice_id: &str) -> Option<&'a VoiceDescriptor> {
    if is_malformed_voice_id(voice_id) {
        return None;
    }
    listing.voices().find(|v| v.id == voice_id)
}

/// The first voice for `language_code`, falling back to its base language.
fn default_voice(listing: &VoiceCatalogListing, language_code: &str) -> Option<VoiceDescriptor> {
    if let Some(group) = listing
        .language_groups
        .iter()
        .find(|g| g.language_code == language_code)
        && let Some(first) = group.voices.first()
    {
        return Some(first.clone());
    }

    let base = base_language(language_code);
    listing
        .voices()
        .filter(|v| base_language(&v.language_code) == base)
        .min_by(|a, b| {
            a.technical_name
                .to_lowercase()
                .cmp(&b.technical_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        })
        .cloned()
}
