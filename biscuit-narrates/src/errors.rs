/// Errors that can occur while narrating text.
///
/// Only [`NarrateError::EmptyText`] and the engine variants ever reach a
/// caller of [`PlaybackController::play`](crate::PlaybackController::play);
/// preference and enumeration failures are logged and recovered from inside
/// the orchestrator.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum NarrateError {
    /// The text to speak was empty or contained only whitespace.
    #[error("No text provided")]
    EmptyText,

    /// The speech engine reported a synthesis failure.
    #[error("Speech engine '{engine}' failed: {message}")]
    EngineFailed {
        /// The engine that failed.
        engine: String,
        /// What the engine reported.
        message: String,
    },

    /// The engine process could not be started.
    #[error("Failed to spawn '{engine}'")]
    ProcessSpawnFailed {
        /// The engine binary that failed to start.
        engine: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the utterance to the engine's stdin failed.
    #[error("Failed to write text to '{engine}' stdin")]
    StdinWriteError {
        /// The engine binary.
        engine: String,
    },

    /// The installed voices could not be listed.
    #[error("Voice enumeration failed for '{engine}': {message}")]
    VoiceEnumerationFailed {
        /// The engine that was queried.
        engine: String,
        /// Description of the failure.
        message: String,
    },

    /// The preference blob could not be read.
    #[error("Failed to read preferences from {path}: {message}")]
    PreferenceReadError {
        /// Where the preferences live.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The preference blob could not be written.
    #[error("Failed to write preferences to {path}: {message}")]
    PreferenceWriteError {
        /// Where the preferences live.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// A saved-readings library entry could not be parsed.
    #[error("failed to parse library entry: {0}")]
    LibraryParse(#[from] serde_json::Error),

    /// Failed to acquire the saved-readings library file lock.
    #[error("failed to acquire library lock")]
    Lock,

    /// Generic I/O failure.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl NarrateError {
    /// Convenience constructor for engine-reported failures.
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        NarrateError::EngineFailed {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Whether this error is one a caller is expected to see from `play()`.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            NarrateError::EmptyText
                | NarrateError::EngineFailed { .. }
                | NarrateError::ProcessSpawnFailed { .. }
                | NarrateError::StdinWriteError { .. }
        )
    }
}
