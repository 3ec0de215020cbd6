//! Terminal output: voice listings, the library, and the follow-along line.

use std::io::{self, Write};

use biscuit_narrates::{PlaybackEvent, SavedReading, VoiceCatalogListing};
use owo_colors::{OwoColorize, Stream};

/// Print the voice catalog, optionally for one language code only.
pub fn print_voices(listing: &VoiceCatalogListing, only: Option<&str>) {
    if listing.is_empty() {
        println!("No voices found.");
        return;
    }

    let groups: Vec<_> = listing
        .language_groups
        .iter()
        .filter(|group| only.is_none_or(|code| code == group.language_code))
        .collect();
    if groups.is_empty() {
        println!("No voices for {}.", only.unwrap_or_default());
        return;
    }

    for group in groups {
        let code = format!("[{}]", group.language_code);
        println!(
            "{} {} {}{}",
            group.flag_hint,
            group.display_name.if_supports_color(Stream::Stdout, |t| t.bold()),
            code.if_supports_color(Stream::Stdout, |t| t.dimmed()),
            if group.is_priority { " *" } else { "" }
        );
        for voice in &group.voices {
            let label = format!("{:<9}", voice.display_label);
            let name = format!("{:<32}", voice.technical_name);
            println!(
                "   {} {} {}",
                label.if_supports_color(Stream::Stdout, |t| t.cyan()),
                name,
                voice.id.if_supports_color(Stream::Stdout, |t| t.dimmed())
            );
        }
        println!();
    }
}

/// Print saved readings, oldest first.
pub fn print_library(readings: &[SavedReading]) {
    if readings.is_empty() {
        println!("No saved readings.");
        return;
    }

    for reading in readings {
        let id = reading.id.to_string();
        println!(
            "{}  {}  {}  {}",
            id.if_supports_color(Stream::Stdout, |t| t.yellow()),
            reading.created_at.format("%Y-%m-%d %H:%M"),
            reading.language,
            reading.name.if_supports_color(Stream::Stdout, |t| t.bold())
        );
    }
}

/// One-line reminder of the keyboard commands.
pub fn print_key_help() {
    let help = "keys: p pause / r resume / f forward / b back / s stop, then Enter";
    println!("{}", help.if_supports_color(Stream::Stdout, |t| t.dimmed()));
}

/// Percentage shown for an overall progress fraction.
pub fn percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// The sentence being read, redrawn in place on every tick.
///
/// A finished sentence keeps its line; the next one starts below it.
pub struct ProgressLine {
    sentences: Vec<String>,
    current: Option<usize>,
}

impl ProgressLine {
    pub fn new(sentences: Vec<String>) -> Self {
        Self {
            sentences,
            current: None,
        }
    }

    pub fn apply(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::Progress {
                segment_index,
                fraction,
            } => self.draw(*segment_index, *fraction),
            PlaybackEvent::Paused => self.note("paused"),
            PlaybackEvent::Resumed => self.note("resumed"),
            PlaybackEvent::Skipped { word_index } => self.note(&format!("skipped to word {word_index}")),
            PlaybackEvent::Failed { message } => self.note(message),
            PlaybackEvent::Started
            | PlaybackEvent::Completed
            | PlaybackEvent::Stopped => {}
        }
    }

    /// Leave the cursor on a fresh line.
    pub fn finish(&mut self) {
        if self.current.take().is_some() {
            println!();
        }
    }

    fn draw(&mut self, segment: usize, fraction: f64) {
        if self.current.is_some_and(|current| current != segment) {
            println!();
        }
        self.current = Some(segment);

        let sentence = self.sentences.get(segment).map_or("", String::as_str);
        let badge = format!("[{:>3}%]", percent(fraction));
        print!(
            "\r\x1b[2K{} {}",
            badge.if_supports_color(Stream::Stdout, |t| t.dimmed()),
            sentence.if_supports_color(Stream::Stdout, |t| t.bold())
        );
        let _ = io::stdout().flush();
    }

    fn note(&mut self, label: &str) {
        self.finish();
        println!("{}", label.if_supports_color(Stream::Stdout, |t| t.yellow()));
    }
}
