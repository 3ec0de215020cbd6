//! Preference blob persistence.
//!
//! The blob is a JSON object shared with any other settings a front end
//! keeps; voice keys are only one part of it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value};

use crate::errors::NarrateError;
use crate::traits::PreferenceStore;

/// File name used under the home directory.
pub const PREFERENCES_FILE_NAME: &str = ".biscuit-narrates-prefs.json";

/// Preferences in a JSON file, written atomically.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    /// Store preferences at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store preferences at `~/.biscuit-narrates-prefs.json`.
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn in_home_dir() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(PREFERENCES_FILE_NAME)))
    }

    /// Where the preferences live.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    async fn load(&self) -> Result<Value, NarrateError> {
        let path_str = self.path.display().to_string();

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Value::Object(Map::new()));
            }
            Err(e) => {
                return Err(NarrateError::PreferenceReadError {
                    path: path_str,
                    message: e.to_string(),
                });
            }
        };

        if contents.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        match serde_json::from_str(&contents) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(_) => Err(NarrateError::PreferenceReadError {
                path: path_str,
                message: "preferences are not a JSON object".into(),
            }),
            Err(e) => Err(NarrateError::PreferenceReadError {
                path: path_str,
                message: format!("JSON parse error: {}", e),
            }),
        }
    }

    async fn save(&self, preferences: Value) -> Result<(), NarrateError> {
        let path = self.path.clone();
        let path_str = path.display().to_string();

        let result = tokio::task::spawn_blocking(move || write_atomically(&path, &preferences))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
            .and_then(|inner| inner);

        result.map_err(|e| NarrateError::PreferenceWriteError {
            path: path_str,
            message: e.to_string(),
        })
    }
}

/// Write using the temp file + rename pattern so readers never see a partial file.
fn write_atomically(path: &Path, preferences: &Value) -> Result<(), std::io::Error> {
    let json = serde_json::to_string_pretty(preferences)?;

    let parent = path.parent().unwrap_or(path);
    std::fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(json.as_bytes())?;
    temp_file.flush()?;
    temp_file.persist(path)?;

    Ok(())
}

/// Preferences held in memory.
///
/// Used for `--ephemeral` sessions and by tests, which can count writes or
/// make every save fail.
#[derive(Debug)]
pub struct MemoryPreferenceStore {
    value: Mutex<Value>,
    saves: AtomicUsize,
    read_only: bool,
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::with_value(Value::Object(Map::new()))
    }
}

impl MemoryPreferenceStore {
    /// A store pre-populated with `value`.
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Mutex::new(value),
            saves: AtomicUsize::new(0),
            read_only: false,
        }
    }

    /// A store whose saves always fail.
    pub fn read_only(value: Value) -> Self {
        Self {
            read_only: true,
            ..Self::with_value(value)
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// A copy of the current blob.
    pub fn snapshot(&self) -> Value {
        match self.value.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self) -> Result<Value, NarrateError> {
        Ok(self.snapshot())
    }

    async fn save(&self, preferences: Value) -> Result<(), NarrateError> {
        if self.read_only {
            return Err(NarrateError::PreferenceWriteError {
                path: "memory".into(),
                message: "store is read-only".into(),
            });
        }
        match self.value.lock() {
            Ok(mut guard) => *guard = preferences,
            Err(poisoned) => *poisoned.into_inner() = preferences,
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
