mod keys;
mod render;

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use biscuit_narrates::{
    ESpeakEngine, Gender, JsonFilePreferenceStore, JsonlReadingLibrary, LanguageSelector,
    MemoryPreferenceStore, NarrateError, NarratorConfig, PitchBias, PlaybackController,
    PlaybackOutcome, PreferenceStore, ReadingLibrary, ResumePoint, SavedReading, SkipStep,
    VoiceCatalog, VoiceDescriptor, segment,
};
use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::{OwoColorize, Stream};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::keys::KeyCommand;
use crate::render::ProgressLine;

/// Stdin is read up to this many bytes.
const MAX_STDIN_BYTES: u64 = 10_000;

type Narrator<S> = PlaybackController<Arc<ESpeakEngine>, Arc<ESpeakEngine>, S>;

/// Read text aloud and follow along sentence by sentence
///
/// # Examples
///
/// ```no_run
/// // Read text from command-line arguments
/// // read-along Hello there. How are you today?
///
/// // Read text from stdin, in British English, a little faster
/// // cat notes.txt | read-along --language uk --speed 1.25
/// ```
#[derive(Parser)]
#[command(name = "read-along")]
#[command(about = "Read text aloud and follow along sentence by sentence", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Text to read (reads from stdin if not provided)
    text: Vec<String>,

    /// Language: `us`, `uk`, `fil`, or a code such as `fr-FR`
    #[arg(short, long, default_value = "us")]
    language: String,

    /// Pitch multiplier, 0.5 to 2.0
    #[arg(long, default_value_t = 1.0)]
    pitch: f32,

    /// Speed multiplier, 0.5 to 2.0
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Skip forward or back by this many words
    #[arg(long, value_name = "N", conflicts_with = "skip_sentences")]
    skip_words: Option<usize>,

    /// Skip forward or back by this many sentences
    #[arg(long, value_name = "N")]
    skip_sentences: Option<usize>,

    /// Where reading picks up after a pause
    #[arg(long, value_enum, default_value_t = ResumeAt::Sentence)]
    resume_at: ResumeAt,

    /// Nudge pitch toward a voice gender
    #[arg(long, value_enum)]
    prefer_gender: Option<PreferGender>,

    /// Pick the voice for --language interactively
    #[arg(long)]
    choose_voice: bool,

    /// Save a voice preference, e.g. `--set-voice voiceUK en-gb`
    #[arg(long, num_args = 2, value_names = ["KEY", "ID"])]
    set_voice: Option<Vec<String>>,

    /// Save the text to the library before reading it
    #[arg(long)]
    save: bool,

    /// Name for the saved reading (defaults to its opening words)
    #[arg(long, requires = "save")]
    name: Option<String>,

    /// List saved readings
    #[arg(long)]
    library: bool,

    /// Read a saved reading again with its original settings
    #[arg(long, value_name = "ID")]
    replay: Option<u64>,

    /// Delete a saved reading
    #[arg(long, value_name = "ID")]
    forget: Option<u64>,

    /// Keep voice preferences in memory for this run only
    #[arg(long)]
    ephemeral: bool,

    /// Enable debug logging to ~/.read-along-debug.log
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List installed voices grouped by language
    Voices {
        /// Only show this language code, e.g. en-GB
        language: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResumeAt {
    Word,
    Sentence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PreferGender {
    Male,
    Female,
}

impl From<PreferGender> for Gender {
    fn from(value: PreferGender) -> Self {
        match value {
            PreferGender::Male => Gender::Male,
            PreferGender::Female => Gender::Female,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("No input provided")]
    NoInput,

    #[error("failed to read stdin: {0}")]
    Stdin(#[source] io::Error),

    #[error("failed to open debug log: {0}")]
    DebugLog(#[source] io::Error),

    #[error("could not determine the home directory")]
    NoHomeDir,

    #[error("neither espeak-ng nor espeak is installed")]
    NoEngine,

    #[error("no saved reading with id {0}")]
    UnknownReading(u64),

    #[error("'{id}' is not an installed voice, or '{key}' is not a voice key")]
    VoiceRejected { key: String, id: String },

    #[error("no voices installed for {0}")]
    NoVoices(String),

    #[error("voice prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("playback task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Narrate(#[from] NarrateError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{} {e}",
                "Error:".if_supports_color(Stream::Stderr, |t| t.red())
            );
            if matches!(e, CliError::NoInput) {
                eprintln!("Usage: read-along <text> or echo \"text\" | read-along");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    init_logging(cli.debug)?;

    if let Some(Command::Voices { language }) = &cli.command {
        let listing = VoiceCatalog::new(available_engine()?)
            .list_grouped_voices()
            .await;
        render::print_voices(&listing, language.as_deref());
        return Ok(());
    }

    let library = JsonlReadingLibrary::in_home_dir().ok_or(CliError::NoHomeDir)?;
    if cli.library {
        render::print_library(&library.load_all()?);
        return Ok(());
    }
    if let Some(id) = cli.forget {
        if !library.remove(id)? {
            return Err(CliError::UnknownReading(id));
        }
        println!("Forgot reading {id}");
        return Ok(());
    }

    if cli.ephemeral {
        narrate(cli, &library, MemoryPreferenceStore::default()).await
    } else {
        let store = JsonFilePreferenceStore::in_home_dir().ok_or(CliError::NoHomeDir)?;
        narrate(cli, &library, store).await
    }
}

/// Sets up logging: `RUST_LOG` (default `warn`) to stderr, or everything at
/// debug level to `~/.read-along-debug.log` with `--debug`.
fn init_logging(debug: bool) -> Result<(), CliError> {
    use tracing_subscriber::EnvFilter;

    if debug {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let log_path = home.join(".read-along-debug.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(CliError::DebugLog)?;

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(io::stderr)
            .init();
    }

    Ok(())
}

async fn narrate<S>(cli: Cli, library: &JsonlReadingLibrary, store: S) -> Result<(), CliError>
where
    S: PreferenceStore + 'static,
{
    let selector = LanguageSelector::from(cli.language.as_str());
    let voice_only = cli.choose_voice || cli.set_voice.is_some();

    // Work out what to read before touching the engine.
    let reading = match cli.replay {
        Some(id) => Some(find_reading(library, id)?),
        None if voice_only && cli.text.is_empty() => None,
        None => {
            let text = if cli.text.is_empty() {
                read_from_stdin()?
            } else {
                join_args(&cli.text)
            };
            let text = text.trim();
            if text.is_empty() {
                return Err(CliError::NoInput);
            }

            let mut reading = SavedReading::new(
                cli.name.clone().unwrap_or_default(),
                text,
                selector.clone(),
                cli.pitch,
                cli.speed,
            );
            if cli.save {
                reading.id = library.save(&reading)?;
                println!("Saved \"{}\" as {}", reading.name, reading.id);
            }
            Some(reading)
        }
    };

    let engine = Arc::new(available_engine()?);
    let controller: Narrator<S> =
        PlaybackController::new(Arc::clone(&engine), engine, store, narrator_config(&cli));

    if let Some([key, id]) = cli.set_voice.as_deref() {
        if !controller.set_voice_preference(key, id).await {
            return Err(CliError::VoiceRejected {
                key: key.clone(),
                id: id.clone(),
            });
        }
        println!("{key} = {id}");
    }

    if cli.choose_voice {
        choose_voice(&controller, &selector).await?;
    }

    let Some(reading) = reading else {
        return Ok(());
    };
    // Stdin carries key commands only when it did not carry the text.
    let reads_keys = cli.replay.is_some() || !cli.text.is_empty();
    let interactive = reads_keys && io::stdin().is_terminal();
    read_aloud(&controller, reading, interactive).await
}

fn narrator_config(cli: &Cli) -> NarratorConfig {
    let resume_point = match cli.resume_at {
        ResumeAt::Word => ResumePoint::Word,
        ResumeAt::Sentence => ResumePoint::SentenceStart,
    };
    let mut config = NarratorConfig::new().with_resume_point(resume_point);

    if let Some(n) = cli.skip_sentences {
        config = config.with_skip_step(SkipStep::Sentences(n));
    } else if let Some(n) = cli.skip_words {
        config = config.with_skip_step(SkipStep::Words(n));
    }
    if let Some(gender) = cli.prefer_gender {
        config = config.with_pitch_bias(PitchBias::toward(gender.into()));
    }
    config
}

fn available_engine() -> Result<ESpeakEngine, CliError> {
    let engine = ESpeakEngine::new();
    if engine.is_available() {
        Ok(engine)
    } else {
        Err(CliError::NoEngine)
    }
}

fn find_reading(library: &JsonlReadingLibrary, id: u64) -> Result<SavedReading, CliError> {
    library
        .load_all()?
        .into_iter()
        .find(|reading| reading.id == id)
        .ok_or(CliError::UnknownReading(id))
}

/// Joins multiple arguments into a single string with spaces
fn join_args(args: &[String]) -> String {
    args.join(" ")
}

/// Reads text from stdin, keeping at most the first 10,000 bytes.
fn read_from_stdin() -> Result<String, CliError> {
    let mut buffer = Vec::new();
    io::stdin()
        .take(MAX_STDIN_BYTES)
        .read_to_end(&mut buffer)
        .map_err(CliError::Stdin)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// A voice as shown in the picker.
struct VoiceChoice(VoiceDescriptor);

impl fmt::Display for VoiceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  ({}, {})", self.0.display_label, self.0.technical_name, self.0.quality)
    }
}

async fn choose_voice<S>(controller: &Narrator<S>, selector: &LanguageSelector) -> Result<(), CliError>
where
    S: PreferenceStore + 'static,
{
    let options: Vec<VoiceChoice> = controller
        .list_voice_options(Some(selector))
        .await
        .into_iter()
        .map(VoiceChoice)
        .collect();
    if options.is_empty() {
        return Err(CliError::NoVoices(selector.to_string()));
    }

    let prompt = format!("Voice for {selector}:");
    let VoiceChoice(voice) = inquire::Select::new(&prompt, options).prompt()?;

    let key = selector.preference_key();
    if !controller.set_voice_preference(&key, &voice.id).await {
        return Err(CliError::VoiceRejected {
            key: key.to_string(),
            id: voice.id,
        });
    }
    println!("{key} = {} ({})", voice.id, voice.display_label);
    controller.test_voice(&voice.id, selector.language_code()).await?;
    Ok(())
}

async fn read_aloud<S>(
    controller: &Narrator<S>,
    reading: SavedReading,
    interactive: bool,
) -> Result<(), CliError>
where
    S: PreferenceStore + 'static,
{
    let sentences = segment(&reading.text, f64::from(reading.speed))
        .into_iter()
        .map(|s| s.text)
        .collect();
    let mut view = ProgressLine::new(sentences);
    let mut events = controller.subscribe();

    let (key_tx, mut key_rx) = mpsc::unbounded_channel();
    if interactive {
        render::print_key_help();
        keys::spawn_reader(key_tx);
    } else {
        drop(key_tx);
    }

    let mut play = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .play(&reading.text, &reading.language, reading.pitch, reading.speed)
                .await
        })
    };

    let outcome = loop {
        tokio::select! {
            joined = &mut play => break joined??,
            event = events.recv() => match event {
                Ok(event) => view.apply(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Display fell behind playback events");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            Some(key) = key_rx.recv() => apply_key(controller, key).await,
        }
    };
    view.finish();

    match outcome {
        PlaybackOutcome::Completed => tracing::debug!("Reading completed"),
        PlaybackOutcome::Stopped => println!("Stopped."),
    }
    Ok(())
}

async fn apply_key<S>(controller: &Narrator<S>, key: KeyCommand)
where
    S: PreferenceStore + 'static,
{
    let applied = match key {
        KeyCommand::Pause => controller.pause().await,
        KeyCommand::Resume => controller.resume().await,
        KeyCommand::Forward => controller.skip_forward().await,
        KeyCommand::Back => controller.skip_backward().await,
        KeyCommand::Stop => {
            controller.stop().await;
            true
        }
    };
    if !applied {
        tracing::debug!(?key, state = %controller.state(), "Key had no effect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("read-along").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_join_args_multi_word() {
        let args = vec!["Hello".to_string(), "world".to_string()];
        assert_eq!(join_args(&args), "Hello world");
    }

    #[test]
    fn test_join_args_unicode() {
        let args = vec!["Hello".to_string(), "世界".to_string(), "🚀".to_string()];
        assert_eq!(join_args(&args), "Hello 世界 🚀");
    }

    #[test]
    fn text_and_voices_subcommand_parse_apart() {
        let cli = parse(&["Hello", "there."]);
        assert!(cli.command.is_none());
        assert_eq!(cli.text, vec!["Hello", "there."]);

        let cli = parse(&["voices", "en-GB"]);
        assert!(matches!(
            cli.command,
            Some(Command::Voices { language: Some(ref code) }) if code == "en-GB"
        ));
    }

    #[test]
    fn skip_flags_map_to_steps() {
        let config = narrator_config(&parse(&["--skip-sentences", "2", "hi"]));
        assert_eq!(config.skip_step, SkipStep::Sentences(2));

        let config = narrator_config(&parse(&["--skip-words", "4", "hi"]));
        assert_eq!(config.skip_step, SkipStep::Words(4));

        let config = narrator_config(&parse(&["hi"]));
        assert_eq!(config.skip_step, SkipStep::default());
        assert_eq!(config.resume_point, ResumePoint::SentenceStart);
        assert!(config.pitch_bias.is_none());
    }

    #[test]
    fn skip_flags_conflict() {
        let result =
            Cli::try_parse_from(["read-along", "--skip-words", "3", "--skip-sentences", "1", "hi"]);
        assert!(result.is_err());
    }

    #[test]
    fn resume_and_gender_flags_configure_the_narrator() {
        let config = narrator_config(&parse(&["--resume-at", "word", "--prefer-gender", "female", "hi"]));
        assert_eq!(config.resume_point, ResumePoint::Word);
        assert_eq!(config.pitch_bias, Some(PitchBias::toward(Gender::Female)));
    }

    #[test]
    fn set_voice_takes_key_and_id() {
        let cli = parse(&["--set-voice", "voiceUK", "en-gb"]);
        assert_eq!(cli.set_voice.as_deref(), Some(&["voiceUK".to_string(), "en-gb".to_string()][..]));
        assert!(cli.text.is_empty());
    }
}
