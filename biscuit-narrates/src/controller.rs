//! The playback state machine.
//!
//! A [`PlaybackController`] drives a [`SpeechEngine`] that can only speak a
//! whole string or stop. Pause, resume and skip are simulated by stopping the
//! engine and speaking a suffix of the original text, while a
//! [`ProgressEstimator`] keeps a timer-based guess of the position.
//!
//! ## Ordering
//!
//! Every engine run is tagged with a generation number. Engine events and
//! estimator ticks are funnelled into one driver task which drops anything
//! tagged with an old generation, so a late "finished" from an earlier
//! utterance can never touch the current one. Completion bumps the
//! generation too, which makes it single-fire: whichever of the engine or
//! the estimator reports the end first wins and the other is discarded.
//!
//! ## Locking
//!
//! Public operations and the driver take the same async lock for their
//! whole duration, so they never interleave.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::errors::NarrateError;
use crate::estimator::{EstimatorSeed, Progress, ProgressEstimator, ProgressModel};
use crate::languages::{LanguageSelector, sample_sentence};
use crate::preferences::is_malformed_voice_id;
use crate::resolver::VoicePreferenceResolver;
use crate::segmenter::{Segment, UtteranceSegmenter, word_spans};
use crate::traits::{PreferenceStore, SpeechEngine, VoiceInventory};
use crate::types::{
    EngineEvent, NarratorConfig, PlaybackEvent, PlaybackOutcome, PlaybackState, SkipStep,
    ResumePoint, Utterance, VoiceDescriptor, clamp_multiplier,
};

/// Capacity of the broadcast event channel.
const EVENT_CAPACITY: usize = 256;

type Completion = oneshot::Sender<Result<PlaybackOutcome, NarrateError>>;
type ProgressListener = Arc<dyn Fn(usize, f64) + Send + Sync>;
type Listener = Arc<dyn Fn() + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug)]
struct Signal {
    generation: u64,
    kind: SignalKind,
}

#[derive(Debug)]
enum SignalKind {
    Engine(EngineEvent),
    Tick(Progress),
    EstimateComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finisher {
    Engine,
    Estimator,
    Skip,
}

#[derive(Default)]
struct Listeners {
    progress: Option<ProgressListener>,
    started: Option<Listener>,
    completed: Option<Listener>,
    error: Option<ErrorListener>,
}

/// One utterance being narrated.
struct Session {
    text: String,
    language_code: String,
    voice_id: Option<String>,
    pitch: f32,
    speed: f32,
    words: Vec<Range<usize>>,
    segments: Vec<Segment>,
    model: Arc<ProgressModel>,
    /// When the current engine run began.
    started_at: Instant,
    /// Audio offset the current run started at.
    offset_ms: f64,
    /// Reported position never drops below this.
    hold_ms: f64,
    /// Audio position captured by `pause()`.
    paused_audio_ms: f64,
    last_progress: Option<Progress>,
    completion: Option<Completion>,
}

impl Session {
    fn audio_ms(&self) -> f64 {
        let spoken = self.started_at.elapsed().as_micros() as f64 / 1000.0;
        (self.offset_ms + spoken).min(self.model.total_ms())
    }

    fn shown_ms(&self, audio_ms: f64) -> f64 {
        audio_ms.max(self.hold_ms)
    }

    fn utterance_from(&self, word: usize) -> Utterance {
        let start = self.words.get(word).map_or(self.text.len(), |span| span.start);
        Utterance {
            text: self.text[start..].to_string(),
            language_code: self.language_code.clone(),
            voice_id: self.voice_id.clone(),
            pitch: self.pitch,
            rate: self.speed,
        }
    }

    fn finish(&mut self, result: Result<PlaybackOutcome, NarrateError>) {
        if let Some(completion) = self.completion.take() {
            let _ = completion.send(result);
        }
    }
}

#[derive(Default)]
struct Machine {
    session: Option<Session>,
    estimator: ProgressEstimator,
}

struct Inner<E, I, S> {
    engine: E,
    resolver: VoicePreferenceResolver<I, S>,
    config: NarratorConfig,
    segmenter: UtteranceSegmenter,
    machine: Mutex<Machine>,
    generation: AtomicU64,
    state: watch::Sender<PlaybackState>,
    events: broadcast::Sender<PlaybackEvent>,
    signals: mpsc::UnboundedSender<Signal>,
    listeners: StdMutex<Listeners>,
}

/// Play/pause/resume/skip over a speak-or-stop speech engine.
///
/// Cloning is cheap; clones share one state machine. Construction spawns a
/// driver task, so it must happen inside a Tokio runtime.
///
/// ## Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use biscuit_narrates::{LanguageSelector, NarratorConfig, PlaybackController};
/// use biscuit_narrates::providers::{ESpeakEngine, MemoryPreferenceStore};
///
/// let engine = Arc::new(ESpeakEngine::new());
/// let controller = PlaybackController::new(
///     Arc::clone(&engine),
///     engine,
///     MemoryPreferenceStore::default(),
///     NarratorConfig::default(),
/// );
/// controller.play("Hello there.", &LanguageSelector::UsEnglish, 1.0, 1.0).await?;
/// ```
pub struct PlaybackController<E, I, S> {
    inner: Arc<Inner<E, I, S>>,
}

impl<E, I, S> Clone for PlaybackController<E, I, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, I, S> PlaybackController<E, I, S>
where
    E: SpeechEngine + 'static,
    I: VoiceInventory + 'static,
    S: PreferenceStore + 'static,
{
    /// Create a controller and start its driver task.
    pub fn new(engine: E, inventory: I, store: S, config: NarratorConfig) -> Self {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(PlaybackState::Idle);

        let inner = Arc::new(Inner {
            engine,
            resolver: VoicePreferenceResolver::new(inventory, store),
            segmenter: UtteranceSegmenter::new(config.ms_per_word),
            config,
            machine: Mutex::new(Machine::default()),
            generation: AtomicU64::new(0),
            state,
            events,
            signals,
            listeners: StdMutex::new(Listeners::default()),
        });

        tokio::spawn(drive(Arc::downgrade(&inner), signal_rx));
        Self { inner }
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Speak `text`, returning when it completes, is stopped, or fails.
    ///
    /// Any session already playing is stopped first and its own `play()`
    /// returns `Ok(PlaybackOutcome::Stopped)`. Pitch and speed are clamped to
    /// `[0.5, 2.0]`.
    ///
    /// ## Errors
    ///
    /// - `NarrateError::EmptyText` for empty or whitespace-only text, before
    ///   the engine is touched.
    /// - Engine errors, after which the controller is `Idle` again.
    pub async fn play(
        &self,
        text: &str,
        selector: &LanguageSelector,
        pitch: f32,
        speed: f32,
    ) -> Result<PlaybackOutcome, NarrateError> {
        if text.trim().is_empty() {
            return Err(NarrateError::EmptyText);
        }
        let pitch = clamp_multiplier(pitch);
        let speed = clamp_multiplier(speed);
        let inner = &self.inner;

        let done = {
            let mut machine = inner.machine.lock().await;
            inner.halt(&mut machine).await;

            let voice = inner.resolver.resolve_voice(selector).await;
            let pitch = inner.biased_pitch(pitch, voice.as_ref());
            let segments = inner.segmenter.segment(text, f64::from(speed));
            let model = ProgressModel::new(&segments, inner.segmenter.ms_per_word_at(f64::from(speed)));
            let (completion, done) = oneshot::channel();

            tracing::debug!(
                language = selector.language_code(),
                voice_id = voice.as_ref().map(|v| v.id.as_str()),
                segments = segments.len(),
                total_ms = model.total_ms(),
                "Starting playback"
            );

            machine.session = Some(Session {
                text: text.to_string(),
                language_code: selector.language_code().to_string(),
                voice_id: voice.map(|v| v.id),
                pitch,
                speed,
                words: word_spans(text),
                segments,
                model: Arc::new(model),
                started_at: Instant::now(),
                offset_ms: 0.0,
                hold_ms: 0.0,
                paused_audio_ms: 0.0,
                last_progress: None,
                completion: Some(completion),
            });

            if let Err(e) = inner.start_run(&mut machine, 0, EstimatorSeed::start()).await {
                inner.fail(&mut machine, &e.to_string(), Some(e));
            }
            done
        };

        done.await.unwrap_or(Ok(PlaybackOutcome::Stopped))
    }

    /// Pause a speaking session. Returns `false` if nothing is speaking or the
    /// engine refused to stop.
    pub async fn pause(&self) -> bool {
        let inner = &self.inner;
        let mut machine = inner.machine.lock().await;
        if machine.session.is_none() || inner.state() != PlaybackState::Speaking {
            return false;
        }

        if let Err(e) = inner.engine.stop().await {
            tracing::warn!(error = %e, "Engine refused to stop, staying in speaking state");
            return false;
        }
        inner.bump_generation();
        machine.estimator.stop();

        let Some(session) = machine.session.as_mut() else {
            return false;
        };
        let audio_ms = session.audio_ms();
        session.paused_audio_ms = audio_ms;
        session.hold_ms = session.shown_ms(audio_ms);
        tracing::debug!(
            elapsed_ms = audio_ms,
            word = session.model.word_at(audio_ms),
            "Paused"
        );

        inner.set_state(PlaybackState::Paused);
        inner.emit(PlaybackEvent::Paused);
        true
    }

    /// Resume a paused session. Returns `false` if nothing is paused or the
    /// engine failed to restart (in which case the session ends in error).
    pub async fn resume(&self) -> bool {
        let inner = &self.inner;
        let mut machine = inner.machine.lock().await;
        if inner.state() != PlaybackState::Paused {
            return false;
        }
        let Some(session) = machine.session.as_ref() else {
            return false;
        };

        let model = Arc::clone(&session.model);
        let paused_word = model.word_at(session.paused_audio_ms);
        let hold_ms = session.hold_ms;
        if paused_word >= model.total_words() {
            inner.complete(&mut machine, Finisher::Skip).await;
            return true;
        }

        let word = match inner.config.resume_point {
            ResumePoint::SentenceStart => model.first_word_of(model.segment_of_word(paused_word)),
            ResumePoint::Word => paused_word,
        };
        let seed =
            EstimatorSeed::at(model.segment_of_word(word), model.offset_of_word(word)).holding(hold_ms);

        if let Err(e) = inner.start_run(&mut machine, word, seed).await {
            inner.fail(&mut machine, &e.to_string(), None);
            return false;
        }
        tracing::debug!(word, "Resumed");
        inner.emit(PlaybackEvent::Resumed);
        true
    }

    /// Jump forward by the configured skip step.
    pub async fn skip_forward(&self) -> bool {
        self.skip(true).await
    }

    /// Jump backward by the configured skip step.
    pub async fn skip_backward(&self) -> bool {
        self.skip(false).await
    }

    async fn skip(&self, forward: bool) -> bool {
        let inner = &self.inner;
        let mut machine = inner.machine.lock().await;
        let state = inner.state();
        if !matches!(state, PlaybackState::Speaking | PlaybackState::Paused) {
            return false;
        }
        let Some(session) = machine.session.as_ref() else {
            return false;
        };

        let model = Arc::clone(&session.model);
        let cursor = match state {
            PlaybackState::Speaking => model.word_at(session.audio_ms()),
            _ => model.word_at(session.paused_audio_ms),
        };
        let target = step_cursor(&model, cursor, inner.config.skip_step, forward);

        if let Err(e) = inner.engine.stop().await {
            tracing::warn!(error = %e, "Engine stop failed during skip");
        }
        inner.bump_generation();
        machine.estimator.stop();

        if target >= model.total_words() {
            tracing::debug!(cursor, "Skipped past the end");
            inner.complete(&mut machine, Finisher::Skip).await;
            return true;
        }

        if let Some(session) = machine.session.as_mut() {
            session.hold_ms = 0.0;
        }
        let seed = EstimatorSeed::at(model.segment_of_word(target), model.offset_of_word(target));
        if let Err(e) = inner.start_run(&mut machine, target, seed).await {
            inner.fail(&mut machine, &e.to_string(), None);
            return false;
        }
        tracing::debug!(from = cursor, to = target, "Skipped");
        inner.emit(PlaybackEvent::Skipped { word_index: target });
        true
    }

    /// Stop everything. Always safe; the engine's "not speaking" errors are
    /// ignored.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut machine = inner.machine.lock().await;
        inner.halt(&mut machine).await;
    }

    /// Change speed mid-utterance.
    ///
    /// The duration table is rebuilt for the new speed and the elapsed time
    /// rescaled so the estimate keeps its place; a speaking session restarts
    /// from the current word. Returns `false` when nothing is playing.
    pub async fn set_speed(&self, speed: f32) -> bool {
        let inner = &self.inner;
        let speed = clamp_multiplier(speed);
        let mut machine = inner.machine.lock().await;
        let state = inner.state();
        if !matches!(state, PlaybackState::Speaking | PlaybackState::Paused) {
            return false;
        }
        let Some(session) = machine.session.as_mut() else {
            return false;
        };

        let ratio = f64::from(session.speed) / f64::from(speed);
        let audio_ms = match state {
            PlaybackState::Speaking => session.audio_ms(),
            _ => session.paused_audio_ms,
        };
        let word = session.model.word_at(audio_ms);
        let shown_ms = session.shown_ms(audio_ms);

        session.segments = inner.segmenter.segment(&session.text, f64::from(speed));
        session.model = Arc::new(ProgressModel::new(
            &session.segments,
            inner.segmenter.ms_per_word_at(f64::from(speed)),
        ));
        session.speed = speed;
        session.paused_audio_ms = audio_ms * ratio;
        session.hold_ms = shown_ms * ratio;
        tracing::debug!(speed, ratio, word, "Speed changed");

        if state == PlaybackState::Paused {
            return true;
        }

        let model = Arc::clone(&session.model);
        let hold_ms = session.hold_ms;
        if let Err(e) = inner.engine.stop().await {
            tracing::warn!(error = %e, "Engine stop failed during speed change");
        }
        inner.bump_generation();
        machine.estimator.stop();

        if word >= model.total_words() {
            inner.complete(&mut machine, Finisher::Skip).await;
            return true;
        }
        let seed = EstimatorSeed::at(model.segment_of_word(word), model.offset_of_word(word))
            .holding(hold_ms);
        if let Err(e) = inner.start_run(&mut machine, word, seed).await {
            inner.fail(&mut machine, &e.to_string(), None);
            return false;
        }
        true
    }

    /// Stop any playback and speak a short sample with `voice_id`.
    ///
    /// The sample is not a session: it has no progress and no completion.
    ///
    /// ## Errors
    ///
    /// Returns the engine's error if it could not start speaking.
    pub async fn test_voice(&self, voice_id: &str, language_code: &str) -> Result<(), NarrateError> {
        let inner = &self.inner;
        let mut machine = inner.machine.lock().await;
        inner.halt(&mut machine).await;

        let voice_id = Some(voice_id.trim())
            .filter(|id| !is_malformed_voice_id(id))
            .map(str::to_string);
        let utterance = Utterance {
            text: sample_sentence(language_code).to_string(),
            language_code: language_code.to_string(),
            voice_id,
            pitch: 1.0,
            rate: 1.0,
        };
        tracing::debug!(language = language_code, voice_id = ?utterance.voice_id, "Testing voice");

        let (events, _) = mpsc::unbounded_channel();
        inner.engine.speak(utterance, events).await
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// The current state.
    pub fn state(&self) -> PlaybackState {
        self.inner.state()
    }

    /// A receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to typed playback events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// The segments of the current session, if any.
    pub async fn segments(&self) -> Vec<Segment> {
        let machine = self.inner.machine.lock().await;
        machine
            .session
            .as_ref()
            .map(|s| s.segments.clone())
            .unwrap_or_default()
    }

    /// The most recent progress estimate of the current session.
    pub async fn progress(&self) -> Option<Progress> {
        let machine = self.inner.machine.lock().await;
        machine.session.as_ref().and_then(|s| s.last_progress)
    }

    /// Called with `(segment_index, fraction)` on every estimator tick.
    ///
    /// Listeners run on the driver task and must not block.
    pub fn on_progress(&self, listener: impl Fn(usize, f64) + Send + Sync + 'static) {
        self.inner.with_listeners(|l| l.progress = Some(Arc::new(listener)));
    }

    /// Called when the engine reports that audio began.
    pub fn on_started(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.with_listeners(|l| l.started = Some(Arc::new(listener)));
    }

    /// Called exactly once per naturally completed session.
    pub fn on_completed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.with_listeners(|l| l.completed = Some(Arc::new(listener)));
    }

    /// Called with the engine's message when synthesis fails.
    pub fn on_error(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.with_listeners(|l| l.error = Some(Arc::new(listener)));
    }

    // ========================================================================
    // Voices
    // ========================================================================

    /// The resolver, for preference management beyond the shortcuts below.
    pub fn resolver(&self) -> &VoicePreferenceResolver<I, S> {
        &self.inner.resolver
    }

    /// Voices offered for `selector`, or every voice when `None`.
    pub async fn list_voice_options(
        &self,
        selector: Option<&LanguageSelector>,
    ) -> Vec<VoiceDescriptor> {
        self.inner.resolver.list_voice_options(selector).await
    }

    /// Save the voice used for `key`. See
    /// [`VoicePreferenceResolver::set_voice_preference`].
    pub async fn set_voice_preference(&self, key: &str, voice_id: &str) -> bool {
        self.inner.resolver.set_voice_preference(key, voice_id).await
    }
}

impl<E, I, S> Inner<E, I, S>
where
    E: SpeechEngine + 'static,
    I: VoiceInventory + 'static,
    S: PreferenceStore + 'static,
{
    fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    fn set_state(&self, state: PlaybackState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Playback state changed");
        }
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn with_listeners(&self, f: impl FnOnce(&mut Listeners)) {
        match self.listeners.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn listener<T>(&self, pick: impl FnOnce(&Listeners) -> Option<T>) -> Option<T> {
        match self.listeners.lock() {
            Ok(guard) => pick(&guard),
            Err(poisoned) => pick(&poisoned.into_inner()),
        }
    }

    fn biased_pitch(&self, pitch: f32, voice: Option<&VoiceDescriptor>) -> f32 {
        match (&self.config.pitch_bias, voice) {
            (Some(bias), Some(voice)) => bias.apply(pitch, &voice.technical_name),
            _ => pitch,
        }
    }

    /// Speak the session's text from `word` and start the estimator at `seed`.
    async fn start_run(
        &self,
        machine: &mut Machine,
        word: usize,
        seed: EstimatorSeed,
    ) -> Result<(), NarrateError> {
        let generation = self.bump_generation();
        machine.estimator.stop();
        let Some(session) = machine.session.as_mut() else {
            return Ok(());
        };

        let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();
        self.engine.speak(session.utterance_from(word), engine_tx).await?;

        let signals = self.signals.clone();
        tokio::spawn(async move {
            while let Some(event) = engine_rx.recv().await {
                let signal = Signal {
                    generation,
                    kind: SignalKind::Engine(event),
                };
                if signals.send(signal).is_err() {
                    break;
                }
            }
        });

        session.started_at = Instant::now();
        session.offset_ms = seed.offset_ms;
        session.hold_ms = seed.hold_ms;

        let tick_signals = self.signals.clone();
        let done_signals = self.signals.clone();
        machine.estimator = ProgressEstimator::start(
            Arc::clone(&session.model),
            seed,
            self.config.tick_interval,
            move |progress| {
                let _ = tick_signals.send(Signal {
                    generation,
                    kind: SignalKind::Tick(progress),
                });
            },
            move || {
                let _ = done_signals.send(Signal {
                    generation,
                    kind: SignalKind::EstimateComplete,
                });
            },
        );

        tracing::debug!(generation, word, offset_ms = seed.offset_ms, "Engine run started");
        self.set_state(PlaybackState::Speaking);
        Ok(())
    }

    /// End the current session, if any, as stopped.
    async fn halt(&self, machine: &mut Machine) {
        if let Err(e) = self.engine.stop().await {
            tracing::debug!(error = %e, "Ignoring engine stop error");
        }
        self.bump_generation();
        machine.estimator.stop();

        if let Some(mut session) = machine.session.take() {
            session.finish(Ok(PlaybackOutcome::Stopped));
            self.emit(PlaybackEvent::Stopped);
        }
        self.set_state(PlaybackState::Idle);
    }

    /// The single terminal transition for a naturally finished session.
    async fn complete(&self, machine: &mut Machine, finisher: Finisher) {
        self.bump_generation();
        machine.estimator.stop();
        let Some(mut session) = machine.session.take() else {
            return;
        };

        if finisher != Finisher::Engine
            && let Err(e) = self.engine.stop().await
        {
            tracing::debug!(error = %e, "Ignoring engine stop error on completion");
        }

        tracing::debug!(?finisher, "Playback completed");
        session.finish(Ok(PlaybackOutcome::Completed));
        self.set_state(PlaybackState::Done);
        self.emit(PlaybackEvent::Completed);
        if let Some(listener) = self.listener(|l| l.completed.clone()) {
            listener();
        }
    }

    /// End the session after an engine failure and return to idle.
    fn fail(&self, machine: &mut Machine, message: &str, error: Option<NarrateError>) {
        self.bump_generation();
        machine.estimator.stop();
        tracing::warn!(engine = self.engine.name(), error = message, "Speech engine failed");

        if let Some(mut session) = machine.session.take() {
            let error = error.unwrap_or_else(|| NarrateError::engine(self.engine.name(), message));
            session.finish(Err(error));
        }
        self.set_state(PlaybackState::Error);
        self.emit(PlaybackEvent::Failed {
            message: message.to_string(),
        });
        if let Some(listener) = self.listener(|l| l.error.clone()) {
            listener(message);
        }
        self.set_state(PlaybackState::Idle);
    }

    async fn handle(&self, signal: Signal) {
        let mut machine = self.machine.lock().await;
        let current = self.generation.load(Ordering::SeqCst);
        if signal.generation != current {
            tracing::trace!(
                stale = signal.generation,
                current,
                kind = ?signal.kind,
                "Discarding stale signal"
            );
            return;
        }

        match signal.kind {
            SignalKind::Engine(EngineEvent::Started) => {
                self.emit(PlaybackEvent::Started);
                if let Some(listener) = self.listener(|l| l.started.clone()) {
                    listener();
                }
            }
            SignalKind::Engine(EngineEvent::Finished) => {
                self.complete(&mut machine, Finisher::Engine).await;
            }
            SignalKind::Engine(EngineEvent::Stopped) => {
                // Nobody asked for this stop; the audio is gone.
                tracing::debug!("Engine stopped on its own");
                self.halt(&mut machine).await;
            }
            SignalKind::Engine(EngineEvent::Failed(message)) => {
                self.fail(&mut machine, &message, None);
            }
            SignalKind::Tick(progress) => {
                if let Some(session) = machine.session.as_mut() {
                    session.last_progress = Some(progress);
                }
                self.emit(PlaybackEvent::Progress {
                    segment_index: progress.segment_index,
                    fraction: progress.fraction,
                });
                if let Some(listener) = self.listener(|l| l.progress.clone()) {
                    listener(progress.segment_index, progress.fraction);
                }
            }
            SignalKind::EstimateComplete => {
                self.complete(&mut machine, Finisher::Estimator).await;
            }
        }
    }
}

/// Driver task: applies engine and estimator signals in arrival order.
async fn drive<E, I, S>(inner: Weak<Inner<E, I, S>>, mut signals: mpsc::UnboundedReceiver<Signal>)
where
    E: SpeechEngine + 'static,
    I: VoiceInventory + 'static,
    S: PreferenceStore + 'static,
{
    while let Some(signal) = signals.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle(signal).await;
    }
}

/// Where a skip from `cursor` lands. A result at or past the last word means
/// the skip ran off the end.
fn step_cursor(model: &ProgressModel, cursor: usize, step: SkipStep, forward: bool) -> usize {
    match (step, forward) {
        (SkipStep::Words(n), true) => cursor.saturating_add(n.max(1)),
        (SkipStep::Words(n), false) => cursor.saturating_sub(n.max(1)),
        (SkipStep::Sentences(n), true) => {
            let segment = model.segment_of_word(cursor);
            model.first_word_of(segment.saturating_add(n.max(1)))
        }
        (SkipStep::Sentences(n), false) => {
            let segment = model.segment_of_word(cursor);
            model.first_word_of(segment.saturating_sub(n.max(1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::segment;

    fn model() -> ProgressModel {
        // Words: [Hello there.] [How are you today?] [Fine.]
        ProgressModel::new(&segment("Hello there. How are you today? Fine.", 1.0), 400.0)
    }

    #[test]
    fn word_steps_saturate_at_the_start() {
        let model = model();
        assert_eq!(step_cursor(&model, 3, SkipStep::Words(10), false), 0);
        assert_eq!(step_cursor(&model, 3, SkipStep::Words(2), true), 5);
        assert_eq!(step_cursor(&model, 3, SkipStep::Words(10), true), 13);
    }

    #[test]
    fn sentence_steps_land_on_sentence_starts() {
        let model = model();
        assert_eq!(step_cursor(&model, 3, SkipStep::Sentences(1), true), 6);
        assert_eq!(step_cursor(&model, 3, SkipStep::Sentences(1), false), 0);
        assert_eq!(step_cursor(&model, 6, SkipStep::Sentences(1), true), 7);
    }

    #[test]
    fn zero_step_still_moves() {
        let model = model();
        assert_eq!(step_cursor(&model, 3, SkipStep::Words(0), true), 4);
    }
}
