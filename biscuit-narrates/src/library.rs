//! Saved readings.
//!
//! A saved reading is the text plus the settings it was read with, so it can
//! be narrated again later. Readings are stored as newline-delimited JSON
//! with file locking for concurrent access safety.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::errors::NarrateError;
use crate::languages::LanguageSelector;
use crate::types::clamp_multiplier;

/// Default library file name.
const DEFAULT_LIBRARY_FILE: &str = ".biscuit-narrates-library.jsonl";

/// Text and settings kept for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReading {
    /// Unique id (creation time in milliseconds).
    pub id: u64,
    /// Short name shown in listings.
    pub name: String,
    /// When the reading was saved.
    pub created_at: DateTime<Utc>,
    /// The full text.
    pub text: String,
    /// Language it was read in.
    pub language: LanguageSelector,
    /// Pitch multiplier.
    pub pitch: f32,
    /// Speed multiplier.
    pub speed: f32,
}

impl SavedReading {
    /// A new reading stamped with the current time.
    ///
    /// An empty `name` is replaced by the first few words of the text.
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        language: LanguageSelector,
        pitch: f32,
        speed: f32,
    ) -> Self {
        let created_at = Utc::now();
        let text = text.into();
        let name = name.into();
        let name = if name.trim().is_empty() {
            default_name(&text)
        } else {
            name.trim().to_string()
        };

        Self {
            id: u64::try_from(created_at.timestamp_millis()).unwrap_or_default(),
            name,
            created_at,
            text,
            language,
            pitch: clamp_multiplier(pitch),
            speed: clamp_multiplier(speed),
        }
    }

    /// Override the id.
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

fn default_name(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(6).collect();
    let mut name = words.join(" ");
    if text.split_whitespace().count() > words.len() {
        name.push('…');
    }
    name
}

/// Storage for saved readings.
pub trait ReadingLibrary {
    /// Loads every saved reading, oldest first.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading or parsing fails.
    fn load_all(&self) -> Result<Vec<SavedReading>, NarrateError>;

    /// Appends a reading and returns the id it was stored under.
    ///
    /// Ids are unique within the library: a reading whose id is already
    /// taken is stored under one past the highest existing id.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading, writing, or parsing fails.
    fn save(&self, reading: &SavedReading) -> Result<u64, NarrateError>;

    /// Removes the reading with `id`. Returns whether one was removed.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading, writing, or parsing fails.
    fn remove(&self, id: u64) -> Result<bool, NarrateError>;
}

/// JSONL file-backed reading library.
///
/// Uses `fs2` for cross-platform file locking.
///
/// ## Examples
///
/// ```no_run
/// use biscuit_narrates::library::{JsonlReadingLibrary, ReadingLibrary, SavedReading};
/// use biscuit_narrates::LanguageSelector;
///
/// let library = JsonlReadingLibrary::new("/tmp/readings.jsonl".into());
/// let reading = SavedReading::new("Greeting", "Hello there.", LanguageSelector::UsEnglish, 1.0, 1.0);
/// library.save(&reading).unwrap();
/// assert_eq!(library.load_all().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct JsonlReadingLibrary {
    path: PathBuf,
}

impl JsonlReadingLibrary {
    /// A library stored at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// A library at `~/.biscuit-narrates-library.jsonl`.
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn in_home_dir() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(DEFAULT_LIBRARY_FILE)))
    }

    /// Returns the path to the library file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn ensure_file_exists(&self) -> Result<(), NarrateError> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            File::create(&self.path)?;
        }
        Ok(())
    }
}

fn read_readings(file: &File) -> Result<Vec<SavedReading>, NarrateError> {
    let reader = BufReader::new(file);
    let mut readings = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        readings.push(serde_json::from_str(&line)?);
    }
    Ok(readings)
}

impl ReadingLibrary for JsonlReadingLibrary {
    fn load_all(&self) -> Result<Vec<SavedReading>, NarrateError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared().map_err(|_| NarrateError::Lock)?;
        let readings = read_readings(&file);
        file.unlock().map_err(|_| NarrateError::Lock)?;
        readings
    }

    fn save(&self, reading: &SavedReading) -> Result<u64, NarrateError> {
        self.ensure_file_exists()?;

        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        file.lock_exclusive().map_err(|_| NarrateError::Lock)?;

        let existing = read_readings(&file)?;
        let mut stored = reading.clone();
        if existing.iter().any(|r| r.id == stored.id) {
            let highest = existing.iter().map(|r| r.id).max().unwrap_or(stored.id);
            stored.id = highest.saturating_add(1);
            tracing::debug!(requested = reading.id, assigned = stored.id, "Reading id taken");
        }

        let json = serde_json::to_string(&stored)?;
        writeln!(file, "{json}")?;

        file.unlock().map_err(|_| NarrateError::Lock)?;
        tracing::debug!(id = stored.id, name = %stored.name, "Saved reading");
        Ok(stored.id)
    }

    fn remove(&self, id: u64) -> Result<bool, NarrateError> {
        if !self.path.exists() {
            return Ok(false);
        }

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.lock_exclusive().map_err(|_| NarrateError::Lock)?;

        let readings = read_readings(&file)?;
        let before = readings.len();
        let kept: Vec<_> = readings.into_iter().filter(|r| r.id != id).collect();
        let removed = kept.len() != before;

        if removed {
            let mut rewrite = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
            for reading in &kept {
                let json = serde_json::to_string(reading)?;
                writeln!(rewrite, "{json}")?;
            }
        }

        file.unlock().map_err(|_| NarrateError::Lock)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_library() -> (JsonlReadingLibrary, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test-library.jsonl");
        (JsonlReadingLibrary::new(path), temp_dir)
    }

    fn reading(id: u64, name: &str) -> SavedReading {
        SavedReading::new(name, "Hello there. How are you?", LanguageSelector::UkEnglish, 1.0, 1.2)
            .with_id(id)
    }

    #[test]
    fn load_all_returns_empty_vec_for_nonexistent_file() {
        let (library, _dir) = create_test_library();
        assert!(library.load_all().unwrap().is_empty());
    }

    #[test]
    fn save_appends_in_order() {
        let (library, _dir) = create_test_library();
        library.save(&reading(1, "first")).unwrap();
        library.save(&reading(2, "second")).unwrap();

        let readings = library.load_all().unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].name, "first");
        assert_eq!(readings[1].language, LanguageSelector::UkEnglish);
        assert_eq!(readings[1].speed, 1.2);
    }

    #[test]
    fn same_millisecond_saves_get_distinct_ids() {
        let (library, _dir) = create_test_library();
        assert_eq!(library.save(&reading(7, "first")).unwrap(), 7);
        assert_eq!(library.save(&reading(7, "second")).unwrap(), 8);
        assert_eq!(library.save(&reading(7, "third")).unwrap(), 9);

        assert!(library.remove(7).unwrap());
        let names: Vec<_> = library.load_all().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["second", "third"]);
    }

    #[test]
    fn remove_rewrites_without_the_reading() {
        let (library, _dir) = create_test_library();
        library.save(&reading(1, "first")).unwrap();
        library.save(&reading(2, "second")).unwrap();

        assert!(library.remove(1).unwrap());
        assert!(!library.remove(99).unwrap());

        let readings = library.load_all().unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].id, 2);
    }

    #[test]
    fn corrupt_line_is_a_parse_error() {
        let (library, _dir) = create_test_library();
        std::fs::write(library.path(), "not json\n").unwrap();
        assert!(matches!(library.load_all(), Err(NarrateError::LibraryParse(_))));
    }

    #[test]
    fn dynamic_language_round_trips() {
        let (library, _dir) = create_test_library();
        let saved = SavedReading::new("", "Hola", LanguageSelector::Code("es-MX".into()), 1.0, 1.0);
        library.save(&saved).unwrap();
        assert_eq!(library.load_all().unwrap()[0].language, LanguageSelector::Code("es-MX".into()));
    }

    #[test]
    fn empty_name_uses_opening_words() {
        let saved = SavedReading::new(
            "  ",
            "One two three four five six seven eight",
            LanguageSelector::UsEnglish,
            1.0,
            1.0,
        );
        assert_eq!(saved.name, "One two three four five six…");
    }

    #[test]
    fn settings_are_clamped() {
        let saved = SavedReading::new("x", "y", LanguageSelector::UsEnglish, 9.0, 0.1);
        assert_eq!(saved.pitch, 2.0);
        assert_eq!(saved.speed, 0.5);
    }
}
