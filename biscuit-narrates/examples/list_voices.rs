//! List Voices Example
//!
//! Prints the eSpeak voice catalog grouped by language, the way a voice
//! picker would show it.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example list_voices
//! cargo run --example list_voices -- en-GB   # only one language
//! ```

use biscuit_narrates::{ESpeakEngine, VoiceCatalog};

#[tokio::main]
async fn main() {
    let engine = ESpeakEngine::new();
    if !engine.is_available() {
        eprintln!("eSpeak is not installed; no voices to list.");
        return;
    }

    let only = std::env::args().nth(1);
    let catalog = VoiceCatalog::new(engine);
    let listing = catalog.list_grouped_voices().await;

    println!(
        "Found {} voices in {} languages:\n",
        listing.total_count,
        listing.language_groups.len()
    );

    for group in &listing.language_groups {
        if only.as_deref().is_some_and(|code| code != group.language_code) {
            continue;
        }
        let marker = if group.is_priority { " *" } else { "" };
        println!(
            "## {} {} [{}]{}",
            group.flag_hint, group.display_name, group.language_code, marker
        );
        for voice in &group.voices {
            println!(
                "   {:<10} {:<32} {} ({})",
                voice.display_label, voice.technical_name, voice.id, voice.quality
            );
        }
        println!();
    }
}
