//! Open-loop progress estimation.
//!
//! The speech engine never says where it is, so position is *simulated*: a
//! timer ticks at a fixed cadence and maps elapsed time onto the cumulative
//! duration table built by the segmenter. [`ProgressModel`] is the pure part;
//! [`ProgressEstimator`] is the timer task that drives it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::segmenter::Segment;

/// An estimated position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Segment believed to be playing.
    pub segment_index: usize,
    /// Overall progress in `[0, 1]`.
    pub fraction: f64,
    /// Estimated milliseconds of audio spoken so far.
    pub elapsed_ms: f64,
}

impl Progress {
    /// Whether the estimate has reached the end.
    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }
}

/// Cumulative duration table for one utterance at one speed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressModel {
    cumulative_ms: Vec<f64>,
    first_word: Vec<usize>,
    total_words: usize,
    ms_per_word: f64,
}

impl ProgressModel {
    /// Build a model from segments produced at `ms_per_word` (already speed-adjusted).
    pub fn new(segments: &[Segment], ms_per_word: f64) -> Self {
        let mut cumulative_ms = Vec::with_capacity(segments.len());
        let mut first_word = Vec::with_capacity(segments.len());
        let mut running_ms = 0.0;
        let mut running_words = 0;

        for seg in segments {
            first_word.push(running_words);
            running_words += seg.word_count;
            running_ms += seg.estimated_duration_ms;
            cumulative_ms.push(running_ms);
        }

        Self {
            cumulative_ms,
            first_word,
            total_words: running_words,
            ms_per_word,
        }
    }

    /// Running totals: entry `i` is the end time of segment `i`.
    pub fn cumulative_ms(&self) -> &[f64] {
        &self.cumulative_ms
    }

    /// Estimated length of the whole utterance.
    pub fn total_ms(&self) -> f64 {
        self.cumulative_ms.last().copied().unwrap_or(0.0)
    }

    /// Number of words across all segments.
    pub fn total_words(&self) -> usize {
        self.total_words
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.cumulative_ms.len()
    }

    /// Milliseconds per word at this model's speed.
    pub fn ms_per_word(&self) -> f64 {
        self.ms_per_word
    }

    /// Position at `elapsed_ms`, searching forward from `from_segment`.
    ///
    /// The segment is the first one at or after `from_segment` whose end time
    /// lies beyond `elapsed_ms`; past the end it stays on the last segment.
    pub fn position_at(&self, from_segment: usize, elapsed_ms: f64) -> Progress {
        let elapsed_ms = elapsed_ms.max(0.0);
        let last = self.segment_count().saturating_sub(1);
        let segment_index = self
            .cumulative_ms
            .iter()
            .enumerate()
            .skip(from_segment.min(last))
            .find(|(_, end)| elapsed_ms < **end)
            .map_or(last, |(idx, _)| idx);

        let total = self.total_ms();
        let fraction = if total > 0.0 {
            (elapsed_ms / total).min(1.0)
        } else {
            1.0
        };

        Progress {
            segment_index,
            fraction,
            elapsed_ms,
        }
    }

    /// Word index reached at `elapsed_ms`; equals `total_words()` at the end.
    pub fn word_at(&self, elapsed_ms: f64) -> usize {
        if self.ms_per_word <= 0.0 {
            return 0;
        }
        let word = (elapsed_ms.max(0.0) / self.ms_per_word).floor() as usize;
        word.min(self.total_words)
    }

    /// Offset at which `word` starts.
    pub fn offset_of_word(&self, word: usize) -> f64 {
        word.min(self.total_words) as f64 * self.ms_per_word
    }

    /// Segment containing `word`.
    pub fn segment_of_word(&self, word: usize) -> usize {
        match self.first_word.partition_point(|first| *first <= word) {
            0 => 0,
            n => n - 1,
        }
    }

    /// First word of `segment`.
    pub fn first_word_of(&self, segment: usize) -> usize {
        self.first_word
            .get(segment)
            .copied()
            .unwrap_or(self.total_words)
    }

    /// The same utterance with every duration rescaled to `ms_per_word`.
    pub fn rescaled(&self, ms_per_word: f64) -> Self {
        let factor = if self.ms_per_word > 0.0 {
            ms_per_word / self.ms_per_word
        } else {
            1.0
        };
        Self {
            cumulative_ms: self.cumulative_ms.iter().map(|c| c * factor).collect(),
            first_word: self.first_word.clone(),
            total_words: self.total_words,
            ms_per_word,
        }
    }
}

/// Where a freshly started estimator picks up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorSeed {
    /// Segment to start searching from.
    pub from_segment: usize,
    /// Audio offset the engine restarted at.
    pub offset_ms: f64,
    /// Reported position never drops below this.
    pub hold_ms: f64,
}

impl EstimatorSeed {
    /// Start at the very beginning.
    pub fn start() -> Self {
        Self::at(0, 0.0)
    }

    /// Start at `offset_ms` inside `from_segment`.
    pub fn at(from_segment: usize, offset_ms: f64) -> Self {
        Self {
            from_segment,
            offset_ms,
            hold_ms: offset_ms,
        }
    }

    /// Keep the reported position at or above `hold_ms`.
    #[must_use]
    pub fn holding(mut self, hold_ms: f64) -> Self {
        self.hold_ms = hold_ms.max(self.offset_ms);
        self
    }
}

/// A running tick task over a [`ProgressModel`].
///
/// Dropping the estimator cancels it.
#[derive(Debug, Default)]
pub struct ProgressEstimator {
    handle: Option<JoinHandle<()>>,
}

impl ProgressEstimator {
    /// Start ticking every `interval`.
    ///
    /// `on_tick` sees every estimate. When the estimate reaches the end of the
    /// model `on_complete` fires once and the task ends.
    pub fn start<T, C>(
        model: Arc<ProgressModel>,
        seed: EstimatorSeed,
        interval: Duration,
        mut on_tick: T,
        on_complete: C,
    ) -> Self
    where
        T: FnMut(Progress) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        // A zero period would panic in `interval_at`.
        let interval = interval.max(Duration::from_millis(1));
        let anchor = Instant::now();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(anchor + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let audio_ms = seed.offset_ms + anchor.elapsed().as_micros() as f64 / 1000.0;
                let progress = model.position_at(seed.from_segment, audio_ms.max(seed.hold_ms));
                tracing::trace!(
                    segment = progress.segment_index,
                    fraction = progress.fraction,
                    "estimator tick"
                );
                on_tick(progress);

                if audio_ms >= model.total_ms() {
                    on_complete();
                    break;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Cancel the timer. Calling this more than once is harmless.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether the tick task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ProgressEstimator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::segmenter::segment;

    fn hello_model() -> ProgressModel {
        ProgressModel::new(&segment("Hello there. How are you today?", 1.0), 400.0)
    }

    // ========================================================================
    // ProgressModel
    // ========================================================================

    #[test]
    fn cumulative_table_sums_segment_durations() {
        let model = hello_model();
        assert_eq!(model.cumulative_ms(), &[800.0, 2400.0]);
        assert_eq!(model.total_ms(), 2400.0);
        assert_eq!(model.total_words(), 6);
    }

    #[test]
    fn position_at_one_second_is_second_segment() {
        let progress = hello_model().position_at(0, 1000.0);
        assert_eq!(progress.segment_index, 1);
        assert!((progress.fraction - 1000.0 / 2400.0).abs() < 1e-9);
    }

    #[test]
    fn position_clamps_past_the_end() {
        let progress = hello_model().position_at(0, 9000.0);
        assert_eq!(progress.segment_index, 1);
        assert_eq!(progress.fraction, 1.0);
        assert!(progress.is_complete());
    }

    #[test]
    fn position_searches_from_the_given_segment() {
        let progress = hello_model().position_at(1, 100.0);
        assert_eq!(progress.segment_index, 1);
    }

    #[test]
    fn word_lookup_round_trips_through_offsets() {
        let model = hello_model();
        assert_eq!(model.word_at(0.0), 0);
        assert_eq!(model.word_at(799.0), 1);
        assert_eq!(model.word_at(800.0), 2);
        assert_eq!(model.word_at(99_999.0), 6);
        assert_eq!(model.offset_of_word(3), 1200.0);
        assert_eq!(model.segment_of_word(1), 0);
        assert_eq!(model.segment_of_word(2), 1);
        assert_eq!(model.first_word_of(1), 2);
    }

    #[test]
    fn rescaling_scales_every_entry() {
        let model = hello_model().rescaled(200.0);
        assert_eq!(model.cumulative_ms(), &[400.0, 1200.0]);
        assert_eq!(model.ms_per_word(), 200.0);
    }

    // ========================================================================
    // ProgressEstimator
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_estimator_ticks_and_completes_once() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&ticks);
        let (done_tx, done_rx) = oneshot::channel();

        let _estimator = ProgressEstimator::start(
            Arc::new(hello_model()),
            EstimatorSeed::start(),
            Duration::from_millis(100),
            move |p| recorded.lock().unwrap().push(p),
            move || {
                let _ = done_tx.send(());
            },
        );

        done_rx.await.unwrap();
        let ticks = ticks.lock().unwrap();
        assert_eq!(ticks.len(), 24);
        let at_one_second = ticks[9];
        assert_eq!(at_one_second.segment_index, 1);
        assert!((at_one_second.fraction - 0.4167).abs() < 0.001);
        assert_eq!(ticks.last().unwrap().fraction, 1.0);
        assert!(ticks.windows(2).all(|w| w[0].fraction <= w[1].fraction));
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimator_resumes_from_offset() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _estimator = ProgressEstimator::start(
            Arc::new(hello_model()),
            EstimatorSeed::at(1, 1200.0),
            Duration::from_millis(100),
            move |p| {
                let _ = tx.send(p);
            },
            || {},
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.segment_index, 1);
        assert!((first.elapsed_ms - 1300.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimator_holds_reported_position() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _estimator = ProgressEstimator::start(
            Arc::new(hello_model()),
            EstimatorSeed::at(0, 0.0).holding(1000.0),
            Duration::from_millis(100),
            move |p| {
                let _ = tx.send(p);
            },
            || {},
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.elapsed_ms, 1000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_ticks() {
        let (done_tx, done_rx) = oneshot::channel();
        let _estimator = ProgressEstimator::start(
            Arc::new(hello_model()),
            EstimatorSeed::start(),
            Duration::ZERO,
            |_| {},
            move || {
                let _ = done_tx.send(());
            },
        );
        done_rx.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_silences_ticks() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Progress>();
        let mut estimator = ProgressEstimator::start(
            Arc::new(hello_model()),
            EstimatorSeed::start(),
            Duration::from_millis(100),
            move |p| {
                let _ = tx.send(p);
            },
            || {},
        );
        assert!(rx.recv().await.is_some());

        estimator.stop();
        estimator.stop();
        assert!(!estimator.is_running());

        // The sender lives in the aborted task, so the channel closes.
        assert!(rx.recv().await.is_none());
    }
}
