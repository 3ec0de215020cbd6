//! End-to-end playback scenarios against a scripted engine on virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use biscuit_narrates::{
    EngineEvent, Gender, InstalledVoice, LanguageSelector, MemoryPreferenceStore, NarrateError,
    NarratorConfig, PitchBias, PlaybackController, PlaybackEvent, PlaybackOutcome, PlaybackState,
    ResumePoint, SkipStep, SpeechEngine, Utterance, VoiceInventory,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, sleep, timeout};

// ============================================================================
// Fakes
// ============================================================================

/// Engine that finishes after a fixed delay. `stop()` does not cancel the
/// scheduled finish, so late events from old runs really do arrive.
#[derive(Default)]
struct ScriptedEngine {
    finish_after: Option<Duration>,
    fail_with: Option<String>,
    fail_first_after: Option<(Duration, String)>,
    reject: bool,
    runs: AtomicUsize,
    spoken: Mutex<Vec<Utterance>>,
    stops: AtomicUsize,
}

impl ScriptedEngine {
    fn finishing_after(ms: u64) -> Self {
        Self {
            finish_after: Some(Duration::from_millis(ms)),
            ..Self::default()
        }
    }

    fn silent() -> Self {
        Self::default()
    }

    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Fails only the first run, after `ms`; later runs stay silent.
    fn failing_first_after(ms: u64, message: &str) -> Self {
        Self {
            fail_first_after: Some((Duration::from_millis(ms), message.into())),
            ..Self::default()
        }
    }

    fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }

    fn last_spoken(&self) -> Utterance {
        self.spoken().last().cloned().expect("engine never spoke")
    }
}

impl SpeechEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn speak(
        &self,
        utterance: Utterance,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), NarrateError> {
        if self.reject {
            return Err(NarrateError::engine("scripted", "engine unavailable"));
        }
        self.spoken.lock().unwrap().push(utterance);
        let _ = events.send(EngineEvent::Started);
        let run = self.runs.fetch_add(1, Ordering::SeqCst);

        if let Some((delay, message)) = self.fail_first_after.clone()
            && run == 0
        {
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = events.send(EngineEvent::Failed(message));
            });
        } else if let Some(message) = self.fail_with.clone() {
            tokio::spawn(async move {
                sleep(Duration::from_millis(10)).await;
                let _ = events.send(EngineEvent::Failed(message));
            });
        } else if let Some(delay) = self.finish_after {
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = events.send(EngineEvent::Finished);
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), NarrateError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FixedInventory(Vec<InstalledVoice>);

impl VoiceInventory for FixedInventory {
    async fn list_voices(&self) -> Result<Vec<InstalledVoice>, NarrateError> {
        Ok(self.0.clone())
    }
}

fn standard_voices() -> FixedInventory {
    FixedInventory(vec![
        InstalledVoice::new("us-sam", "en-US").with_name("Samantha"),
        InstalledVoice::new("us-alex", "en-US").with_name("Alex"),
        InstalledVoice::new("gb-albert", "en-GB").with_name("Albert"),
        InstalledVoice::new("en-us-x-net-network-language", "en-US").with_name("Aaron"),
    ])
}

type Controller =
    PlaybackController<Arc<ScriptedEngine>, FixedInventory, Arc<MemoryPreferenceStore>>;

struct Harness {
    controller: Controller,
    engine: Arc<ScriptedEngine>,
    store: Arc<MemoryPreferenceStore>,
    completions: Arc<AtomicUsize>,
}

fn harness_with(engine: ScriptedEngine, inventory: FixedInventory, config: NarratorConfig) -> Harness {
    let engine = Arc::new(engine);
    let store = Arc::new(MemoryPreferenceStore::default());
    let controller = PlaybackController::new(Arc::clone(&engine), inventory, Arc::clone(&store), config);

    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    controller.on_completed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    Harness {
        controller,
        engine,
        store,
        completions,
    }
}

fn harness(engine: ScriptedEngine) -> Harness {
    harness_with(engine, standard_voices(), NarratorConfig::default())
}

fn spawn_play(
    controller: &Controller,
    text: &'static str,
) -> tokio::task::JoinHandle<Result<PlaybackOutcome, NarrateError>> {
    let controller = controller.clone();
    tokio::spawn(async move {
        controller
            .play(text, &LanguageSelector::UsEnglish, 1.0, 1.0)
            .await
    })
}

fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn next_progress(rx: &mut broadcast::Receiver<PlaybackEvent>) -> f64 {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PlaybackEvent::Progress { fraction, .. }) = rx.recv().await {
                return fraction;
            }
        }
    })
    .await
    .expect("no progress tick")
}

const HELLO: &str = "Hello there. How are you today?";
const TEN_WORDS: &str = "One two three four five. Six seven eight nine ten.";

// ============================================================================
// Progress
// ============================================================================

#[tokio::test(start_paused = true)]
async fn tick_at_one_second_reports_second_sentence() {
    let h = harness(ScriptedEngine::silent());
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&ticks);
    h.controller
        .on_progress(move |segment, fraction| recorded.lock().unwrap().push((segment, fraction)));

    let outcome = spawn_play(&h.controller, HELLO).await.unwrap().unwrap();
    assert_eq!(outcome, PlaybackOutcome::Completed);

    let ticks = ticks.lock().unwrap();
    let (segment, fraction) = ticks[9];
    assert_eq!(segment, 1);
    assert!((fraction - 0.4167).abs() < 0.001);
    assert_eq!(ticks.last().unwrap().1, 1.0);
    assert_eq!(ticks.len(), 24);
}

#[tokio::test(start_paused = true)]
async fn segments_are_exposed_while_playing() {
    let h = harness(ScriptedEngine::silent());
    let play = spawn_play(&h.controller, HELLO);
    sleep(Duration::from_millis(50)).await;

    let segments = h.controller.segments().await;
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].estimated_duration_ms, 800.0);
    assert_eq!(segments[1].estimated_duration_ms, 1600.0);

    h.controller.stop().await;
    assert_eq!(play.await.unwrap().unwrap(), PlaybackOutcome::Stopped);
}

// ============================================================================
// Single-fire completion
// ============================================================================

#[tokio::test(start_paused = true)]
async fn engine_finishing_first_completes_once() {
    let h = harness(ScriptedEngine::finishing_after(1000));
    let mut events = h.controller.subscribe();

    let started = Instant::now();
    let outcome = spawn_play(&h.controller, HELLO).await.unwrap().unwrap();
    assert_eq!(outcome, PlaybackOutcome::Completed);
    assert!(started.elapsed() < Duration::from_millis(1100));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.state(), PlaybackState::Done);

    let events = drain(&mut events);
    let completed_at = events
        .iter()
        .position(|e| *e == PlaybackEvent::Completed)
        .unwrap();
    assert!(
        events[completed_at + 1..]
            .iter()
            .all(|e| !matches!(e, PlaybackEvent::Progress { .. } | PlaybackEvent::Completed))
    );
}

#[tokio::test(start_paused = true)]
async fn estimator_finishing_first_completes_once_and_stops_engine() {
    let h = harness(ScriptedEngine::finishing_after(10_000));
    let mut events = h.controller.subscribe();

    let outcome = spawn_play(&h.controller, HELLO).await.unwrap().unwrap();
    assert_eq!(outcome, PlaybackOutcome::Completed);
    let stops_at_completion = h.engine.stops.load(Ordering::SeqCst);
    assert!(stops_at_completion >= 2);

    // The engine's own late "finished" must be ignored.
    sleep(Duration::from_secs(15)).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    let completed = drain(&mut events)
        .into_iter()
        .filter(|e| *e == PlaybackEvent::Completed)
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test(start_paused = true)]
async fn simultaneous_finish_completes_once() {
    let h = harness(ScriptedEngine::finishing_after(2400));

    let outcome = spawn_play(&h.controller, HELLO).await.unwrap().unwrap();
    assert_eq!(outcome, PlaybackOutcome::Completed);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Generations
// ============================================================================

#[tokio::test(start_paused = true)]
async fn late_events_from_a_replaced_session_are_ignored() {
    let h = harness(ScriptedEngine::finishing_after(3000));
    let origin = Instant::now();

    let first = spawn_play(&h.controller, "First text here.");
    sleep(Duration::from_millis(500)).await;
    let second = spawn_play(
        &h.controller,
        "Second text is a bit longer than the first one.",
    );

    assert_eq!(first.await.unwrap().unwrap(), PlaybackOutcome::Stopped);
    assert_eq!(second.await.unwrap().unwrap(), PlaybackOutcome::Completed);

    // The first run's "finished" lands at 3.0s; the second run's at 3.5s.
    assert!(origin.elapsed() >= Duration::from_millis(3500));
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn late_failure_from_a_replaced_session_is_ignored() {
    let h = harness(ScriptedEngine::failing_first_after(700, "late"));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&errors);
    h.controller
        .on_error(move |message| recorded.lock().unwrap().push(message.to_string()));

    let first = spawn_play(&h.controller, TEN_WORDS);
    sleep(Duration::from_millis(200)).await;
    let second = spawn_play(&h.controller, HELLO);

    // The first run's failure lands at 700ms, while the second is speaking.
    sleep(Duration::from_millis(600)).await;
    assert_eq!(h.controller.state(), PlaybackState::Speaking);

    assert_eq!(first.await.unwrap().unwrap(), PlaybackOutcome::Stopped);
    assert_eq!(second.await.unwrap().unwrap(), PlaybackOutcome::Completed);
    assert_eq!(h.engine.spoken().len(), 2);
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.state(), PlaybackState::Done);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_session_without_completion() {
    let h = harness(ScriptedEngine::silent());
    let play = spawn_play(&h.controller, HELLO);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(h.controller.state(), PlaybackState::Speaking);

    h.controller.stop().await;
    assert_eq!(play.await.unwrap().unwrap(), PlaybackOutcome::Stopped);
    assert_eq!(h.controller.state(), PlaybackState::Idle);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 0);
    assert!(h.controller.progress().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_is_safe_when_idle() {
    let h = harness(ScriptedEngine::silent());
    h.controller.stop().await;
    h.controller.stop().await;
    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert!(!h.controller.pause().await);
    assert!(!h.controller.resume().await);
    assert!(!h.controller.skip_forward().await);
}

// ============================================================================
// Pause / resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn resume_continues_progress_from_the_pause_point() {
    let h = harness(ScriptedEngine::silent());
    let mut events = h.controller.subscribe();
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(2450)).await;
    assert!(h.controller.pause().await);
    assert_eq!(h.controller.state(), PlaybackState::Paused);
    let paused = h.controller.progress().await.unwrap().fraction;

    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.controller.progress().await.unwrap().fraction, paused);
    drain(&mut events);

    assert!(h.controller.resume().await);
    assert_eq!(h.controller.state(), PlaybackState::Speaking);
    let next = next_progress(&mut events).await;
    assert!(next >= paused, "{next} < {paused}");

    // Paused in the second sentence, so it is repeated from its start.
    assert_eq!(h.engine.last_spoken().text, "Six seven eight nine ten.");

    h.controller.stop().await;
    play.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn resume_at_word_restarts_mid_sentence() {
    let config = NarratorConfig::new().with_resume_point(ResumePoint::Word);
    let h = harness_with(ScriptedEngine::silent(), standard_voices(), config);
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(2450)).await;
    assert!(h.controller.pause().await);
    assert!(h.controller.resume().await);
    assert_eq!(h.engine.last_spoken().text, "seven eight nine ten.");

    assert_eq!(play.await.unwrap().unwrap(), PlaybackOutcome::Completed);
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_twice_is_rejected() {
    let h = harness(ScriptedEngine::silent());
    let play = spawn_play(&h.controller, TEN_WORDS);
    sleep(Duration::from_millis(300)).await;

    assert!(h.controller.pause().await);
    assert!(!h.controller.pause().await);
    h.controller.stop().await;
    play.await.unwrap().unwrap();
}

// ============================================================================
// Skips
// ============================================================================

#[tokio::test(start_paused = true)]
async fn skip_forward_restarts_from_a_later_word() {
    let config = NarratorConfig::new().with_skip_step(SkipStep::Words(3));
    let h = harness_with(ScriptedEngine::silent(), standard_voices(), config);
    let mut events = h.controller.subscribe();
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(450)).await;
    assert!(h.controller.skip_forward().await);
    assert_eq!(h.engine.last_spoken().text, "five. Six seven eight nine ten.");
    assert!(drain(&mut events).contains(&PlaybackEvent::Skipped { word_index: 4 }));

    h.controller.stop().await;
    play.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn skip_backward_stops_at_the_beginning() {
    let h = harness(ScriptedEngine::silent());
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(900)).await;
    assert!(h.controller.skip_backward().await);
    assert_eq!(h.engine.last_spoken().text, TEN_WORDS);

    h.controller.stop().await;
    play.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn skipping_past_the_end_completes() {
    let h = harness(ScriptedEngine::silent());
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(450)).await;
    assert!(h.controller.skip_forward().await);

    assert_eq!(play.await.unwrap().unwrap(), PlaybackOutcome::Completed);
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.state(), PlaybackState::Done);
}

#[tokio::test(start_paused = true)]
async fn sentence_skip_from_pause_starts_next_sentence() {
    let config = NarratorConfig::new().with_skip_step(SkipStep::Sentences(1));
    let h = harness_with(ScriptedEngine::silent(), standard_voices(), config);
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(450)).await;
    assert!(h.controller.pause().await);
    assert!(h.controller.skip_forward().await);
    assert_eq!(h.controller.state(), PlaybackState::Speaking);
    assert_eq!(h.engine.last_spoken().text, "Six seven eight nine ten.");

    h.controller.stop().await;
    play.await.unwrap().unwrap();
}

// ============================================================================
// Speed
// ============================================================================

#[tokio::test(start_paused = true)]
async fn speed_change_restarts_at_the_current_word() {
    let h = harness(ScriptedEngine::silent());
    let mut events = h.controller.subscribe();
    let play = spawn_play(&h.controller, TEN_WORDS);

    sleep(Duration::from_millis(850)).await;
    let before = h.controller.progress().await.unwrap().fraction;
    assert!(h.controller.set_speed(2.0).await);

    let spoken = h.engine.last_spoken();
    assert_eq!(spoken.rate, 2.0);
    assert_eq!(spoken.text, "three four five. Six seven eight nine ten.");

    drain(&mut events);
    let next = next_progress(&mut events).await;
    assert!(next >= before);

    let started = Instant::now();
    assert_eq!(play.await.unwrap().unwrap(), PlaybackOutcome::Completed);
    // Eight words left at 200ms each.
    assert!(started.elapsed() <= Duration::from_millis(1700));
}

#[tokio::test(start_paused = true)]
async fn speed_change_when_idle_is_rejected() {
    let h = harness(ScriptedEngine::silent());
    assert!(!h.controller.set_speed(1.5).await);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test(start_paused = true)]
async fn empty_text_is_rejected_before_the_engine() {
    let h = harness(ScriptedEngine::silent());
    let result = h
        .controller
        .play("  \n\t", &LanguageSelector::UsEnglish, 1.0, 1.0)
        .await;

    assert!(matches!(result, Err(NarrateError::EmptyText)));
    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert!(h.engine.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn engine_failure_surfaces_and_returns_to_idle() {
    let h = harness(ScriptedEngine::failing("synth exploded"));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&errors);
    h.controller
        .on_error(move |message| recorded.lock().unwrap().push(message.to_string()));

    let result = spawn_play(&h.controller, HELLO).await.unwrap();
    match result {
        Err(NarrateError::EngineFailed { message, .. }) => assert_eq!(message, "synth exploded"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert_eq!(*errors.lock().unwrap(), vec!["synth exploded".to_string()]);
    assert_eq!(h.completions.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn engine_rejecting_speech_fails_play() {
    let engine = ScriptedEngine {
        reject: true,
        ..ScriptedEngine::default()
    };
    let h = harness(engine);

    let result = spawn_play(&h.controller, HELLO).await.unwrap();
    assert!(matches!(result, Err(NarrateError::EngineFailed { .. })));
    assert_eq!(h.controller.state(), PlaybackState::Idle);
}

// ============================================================================
// Voices
// ============================================================================

#[tokio::test(start_paused = true)]
async fn first_use_persists_one_default_voice() {
    let h = harness(ScriptedEngine::finishing_after(100));

    spawn_play(&h.controller, HELLO).await.unwrap().unwrap();
    spawn_play(&h.controller, HELLO).await.unwrap().unwrap();

    let spoken = h.engine.spoken();
    assert_eq!(spoken.len(), 2);
    assert!(spoken.iter().all(|u| u.voice_id.as_deref() == Some("us-alex")));
    assert_eq!(h.store.save_count(), 1);
    assert_eq!(h.store.snapshot()["voiceUS"], "us-alex");
}

#[tokio::test(start_paused = true)]
async fn malformed_voices_are_never_used() {
    let inventory = FixedInventory(vec![
        InstalledVoice::new("en-us-x-a-network-language", "en-US"),
        InstalledVoice::new("en-us-voice", "en-US"),
    ]);
    let h = harness_with(ScriptedEngine::finishing_after(100), inventory, NarratorConfig::default());

    assert!(h.controller.list_voice_options(None).await.is_empty());
    spawn_play(&h.controller, HELLO).await.unwrap().unwrap();

    assert_eq!(h.engine.last_spoken().voice_id, None);
    assert_eq!(h.store.save_count(), 0);
    assert!(!h.controller.set_voice_preference("voiceUS", "en-us-voice").await);
}

#[tokio::test(start_paused = true)]
async fn explicit_preference_is_used() {
    let h = harness(ScriptedEngine::finishing_after(100));
    assert!(h.controller.set_voice_preference("voiceUS", "us-sam").await);

    spawn_play(&h.controller, HELLO).await.unwrap().unwrap();
    assert_eq!(h.engine.last_spoken().voice_id.as_deref(), Some("us-sam"));
}

#[tokio::test(start_paused = true)]
async fn pitch_and_speed_are_clamped() {
    let h = harness(ScriptedEngine::finishing_after(100));
    h.controller
        .play(HELLO, &LanguageSelector::UsEnglish, 5.0, f32::NAN)
        .await
        .unwrap();

    let spoken = h.engine.last_spoken();
    assert_eq!(spoken.pitch, 2.0);
    assert_eq!(spoken.rate, 1.0);
}

#[tokio::test(start_paused = true)]
async fn pitch_bias_nudges_mismatched_voices() {
    let config = NarratorConfig::new().with_pitch_bias(PitchBias::toward(Gender::Female));
    let h = harness_with(ScriptedEngine::finishing_after(100), standard_voices(), config);

    h.controller
        .play(HELLO, &LanguageSelector::UkEnglish, 1.0, 1.0)
        .await
        .unwrap();

    let spoken = h.engine.last_spoken();
    assert_eq!(spoken.voice_id.as_deref(), Some("gb-albert"));
    assert!((spoken.pitch - 1.15).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn voice_test_speaks_a_language_sample() {
    let h = harness(ScriptedEngine::silent());
    h.controller.test_voice("gb-albert", "en-GB").await.unwrap();

    let spoken = h.engine.last_spoken();
    assert_eq!(spoken.text, "Hello, this is a British voice test.");
    assert_eq!(spoken.voice_id.as_deref(), Some("gb-albert"));
    assert_eq!(h.controller.state(), PlaybackState::Idle);
}
