//! Grouped, labelled view of the installed voices.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::languages::{
    LanguageSelector, display_name, flag_hint, preference_key_for, priority_rank, voice_label,
};
use crate::preferences::is_malformed_voice_id;
use crate::traits::VoiceInventory;
use crate::types::{
    InstalledVoice, LanguageGroup, LanguageOption, VoiceCatalogListing, VoiceDescriptor,
};

/// Language code used for voices that report none.
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Voice catalog over a [`VoiceInventory`].
///
/// Nothing is cached: installed voices can change while the program runs,
/// so every call re-queries the inventory.
#[derive(Debug, Clone)]
pub struct VoiceCatalog<I> {
    inventory: I,
}

impl<I: VoiceInventory> VoiceCatalog<I> {
    /// Wrap an inventory.
    pub fn new(inventory: I) -> Self {
        Self { inventory }
    }

    /// The underlying inventory.
    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    /// Query, filter, group and label the installed voices.
    ///
    /// An enumeration failure is logged and yields an empty listing.
    pub async fn list_grouped_voices(&self) -> VoiceCatalogListing {
        match self.inventory.list_voices().await {
            Ok(voices) => build_listing(voices),
            Err(e) => {
                tracing::warn!(error = %e, "Voice enumeration failed, catalog is empty");
                VoiceCatalogListing::default()
            }
        }
    }

    /// Voices whose language is exactly `language_code`.
    pub async fn voices_for(&self, language_code: &str) -> Vec<VoiceDescriptor> {
        self.list_grouped_voices()
            .await
            .language_groups
            .into_iter()
            .find(|g| g.language_code == language_code)
            .map(|g| g.voices)
            .unwrap_or_default()
    }

    /// One selectable option per language group, priority languages first.
    pub async fn language_options(&self) -> Vec<LanguageOption> {
        self.list_grouped_voices()
            .await
            .language_groups
            .into_iter()
            .map(|group| {
                let count = group.voices.len();
                LanguageOption {
                    id: LanguageSelector::from_code(&group.language_code).id(),
                    label: format!(
                        "{} {} ({} {})",
                        group.flag_hint,
                        group.display_name,
                        count,
                        if count == 1 { "voice" } else { "voices" }
                    ),
                    language_code: group.language_code,
                    voice_count: count,
                }
            })
            .collect()
    }
}

/// Build a listing from raw inventory output.
pub fn build_listing(voices: Vec<InstalledVoice>) -> VoiceCatalogListing {
    let mut by_language: BTreeMap<String, Vec<InstalledVoice>> = BTreeMap::new();

    for voice in voices {
        if is_malformed_voice_id(&voice.identifier) {
            tracing::trace!(id = %voice.identifier, "Dropping malformed voice");
            continue;
        }
        let language = match voice.language.trim() {
            "" => UNDETERMINED_LANGUAGE.to_string(),
            code => code.to_string(),
        };
        by_language.entry(language).or_default().push(voice);
    }

    let mut language_groups: Vec<LanguageGroup> = by_language
        .into_iter()
        .map(|(language_code, voices)| build_group(language_code, voices))
        .collect();
    language_groups.sort_by(compare_groups);

    let total_count = language_groups.iter().map(|g| g.voices.len()).sum();
    VoiceCatalogListing {
        total_count,
        language_groups,
    }
}

fn build_group(language_code: String, mut voices: Vec<InstalledVoice>) -> LanguageGroup {
    let mut seen = HashSet::new();
    voices.retain(|v| seen.insert(v.identifier.trim().to_string()));
    voices.sort_by(compare_voices);

    let descriptors = voices
        .into_iter()
        .enumerate()
        .map(|(idx, voice)| VoiceDescriptor {
            id: voice.identifier.trim().to_string(),
            display_label: voice_label(idx),
            technical_name: voice.technical_name().to_string(),
            language_code: language_code.clone(),
            quality: voice.quality,
        })
        .collect();

    LanguageGroup {
        display_name: display_name(&language_code),
        flag_hint: flag_hint(&language_code),
        is_priority: priority_rank(&language_code).is_some(),
        preference_key: preference_key_for(&language_code),
        voices: descriptors,
        language_code,
    }
}

/// Case-insensitive by technical name, ties broken by id.
fn compare_voices(a: &InstalledVoice, b: &InstalledVoice) -> Ordering {
    a.technical_name()
        .to_lowercase()
        .cmp(&b.technical_name().to_lowercase())
        .then_with(|| a.identifier.trim().cmp(b.identifier.trim()))
}

fn compare_groups(a: &LanguageGroup, b: &LanguageGroup) -> Ordering {
    match (priority_rank(&a.language_code), priority_rank(&b.language_code)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .display_name
            .cmp(&b.display_name)
            .then_with(|| a.language_code.cmp(&b.language_code)),
    }
}
