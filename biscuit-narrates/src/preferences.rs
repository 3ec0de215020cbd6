//! Voice keys inside the preference blob.
//!
//! Voice preferences live next to unrelated settings in one JSON object. A
//! key maps to a voice id, or to `null` meaning "pick automatically".

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Identifier suffixes some platforms report for entries that are not real
/// voices. `-network-language` is covered by `-language`.
const MALFORMED_SUFFIXES: &[&str] = &["-language", "-voice"];

/// Whether `voice_id` can never be handed to a speech engine.
pub fn is_malformed_voice_id(voice_id: &str) -> bool {
    let trimmed = voice_id.trim();
    trimmed.is_empty() || MALFORMED_SUFFIXES.iter().any(|s| trimmed.ends_with(s))
}

/// Whether `key` names a voice preference.
pub fn is_voice_key(key: &str) -> bool {
    key.starts_with("voice")
}

/// The voice saved under `key`, if any.
pub fn voice_for(preferences: &Value, key: &str) -> Option<String> {
    preferences
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Save `voice_id` under `key`, or reset it to automatic with `None`.
///
/// A blob that is not an object is replaced by one.
pub fn set_voice(preferences: &mut Value, key: &str, voice_id: Option<&str>) {
    if !preferences.is_object() {
        *preferences = Value::Object(Map::new());
    }
    if let Some(map) = preferences.as_object_mut() {
        let value = voice_id.map_or(Value::Null, |id| Value::String(id.to_string()));
        map.insert(key.to_string(), value);
    }
}

/// Every saved voice key and its voice id (`None` for automatic).
pub fn voice_entries(preferences: &Value) -> BTreeMap<String, Option<String>> {
    preferences
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| is_voice_key(key))
                .map(|(key, value)| {
                    let id = value.as_str().filter(|s| !s.is_empty()).map(str::to_string);
                    (key.clone(), id)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Drop malformed voice ids from the blob. Returns the keys removed.
pub fn strip_malformed(preferences: &mut Value) -> Vec<String> {
    let Some(map) = preferences.as_object_mut() else {
        return Vec::new();
    };

    let bad: Vec<String> = map
        .iter()
        .filter(|(key, value)| {
            is_voice_key(key) && value.as_str().is_some_and(is_malformed_voice_id)
        })
        .map(|(key, _)| key.clone())
        .collect();

    for key in &bad {
        map.remove(key);
    }
    bad
}
