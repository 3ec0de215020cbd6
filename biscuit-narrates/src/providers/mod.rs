//! Concrete collaborators for the orchestrator.
//!
//! Engines drive a host CLI through `tokio::process`; the preference stores
//! persist the shared settings blob.

mod espeak;
mod preference_store;

pub use espeak::ESpeakEngine;
pub use preference_store::{JsonFilePreferenceStore, MemoryPreferenceStore};
