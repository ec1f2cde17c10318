//! Session driver: owns the buffer of one stream session and runs the paced
//! parse, normalize, diff and emit cycle on a Tokio task.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};

use crate::card::{CardModel, Normalized, Normalizer};
use crate::config::validation::validate_config;
use crate::config::{AssemblerConfig, PacingConfig, PacingOverrides};
use crate::diff::DiffDetector;
use crate::error::AssemblerError;
use crate::pacing::{EmissionGate, PacingScheduler};
use crate::partial::{parse_partial, ParseError, PartialDocument};
use crate::stream::emitter::{
    AssemblerEvent, BufferGrowth, CardUpdate, EventKind, EventReceiver, StageTransition,
    UpdateEmitter,
};
use crate::stream::feed::{FeedSource, FeedTake, SessionFeeder};
use crate::stream::state::{StageMachine, StreamStage, StreamingState};

/// Per-session options for [`StreamingAssembler::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Skip every delay and consume the source in one tick.
    pub instant: bool,
    /// Seed for the chunk-size sequence.
    pub seed: Option<u64>,
}

impl StartOptions {
    #[must_use]
    pub fn instant() -> Self {
        Self {
            instant: true,
            seed: None,
        }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            instant: false,
            seed: Some(seed),
        }
    }
}

/// Turns streamed JSON card text into a paced sequence of card snapshots.
///
/// One session runs at a time; starting a new one aborts the current one.
/// Sessions run on the Tokio runtime that `start` is called from.
#[derive(Debug)]
pub struct StreamingAssembler {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    config: RwLock<AssemblerConfig>,
    session: Mutex<SessionRecord>,
    emitter: UpdateEmitter,
}

#[derive(Debug, Default)]
struct SessionRecord {
    generation: u64,
    machine: StageMachine,
    last_card: Option<Arc<CardModel>>,
    feed: Option<Arc<FeedSource>>,
    task: Option<JoinHandle<()>>,
    failure: Option<ParseError>,
}

impl SessionRecord {
    fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.machine.stage().is_active()
    }

    fn transition(&mut self, to: StreamStage, emitter: &UpdateEmitter) -> bool {
        match self.machine.transition(to) {
            Ok(from) => {
                emitter.publish(&AssemblerEvent::Stage(StageTransition {
                    session: self.generation,
                    from,
                    to,
                    state: self.machine.snapshot(),
                }));
                true
            }
            Err(err) => {
                tracing::debug!(session = self.generation, "{err}");
                false
            }
        }
    }

    fn reset(&mut self, emitter: &UpdateEmitter) {
        let from = self.machine.stage();
        if from == StreamStage::Idle {
            return;
        }
        self.machine.reset();
        emitter.publish(&AssemblerEvent::Stage(StageTransition {
            session: self.generation,
            from,
            to: StreamStage::Idle,
            state: self.machine.snapshot(),
        }));
    }

    /// Detach the finished session's feed and task.
    fn release(&mut self) {
        self.task = None;
        if let Some(feed) = self.feed.take() {
            feed.close();
        }
    }

    fn abort(&mut self, emitter: &UpdateEmitter) -> bool {
        if !self.machine.stage().is_active() {
            return false;
        }
        self.transition(StreamStage::Aborted, emitter);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.release();
        true
    }
}

impl Default for StreamingAssembler {
    fn default() -> Self {
        Self::from_valid(AssemblerConfig::default())
    }
}

impl StreamingAssembler {
    /// Build an assembler; `config` is the first-ever configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::Config`] when `config` is invalid.
    pub fn new(config: AssemblerConfig) -> Result<Self, AssemblerError> {
        validate_config(&config)?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: AssemblerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: RwLock::new(config),
                session: Mutex::new(SessionRecord::default()),
                emitter: UpdateEmitter::new(),
            }),
        }
    }

    /// Begin a session over the complete `source` text.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::NoRuntime`] outside a Tokio runtime.
    pub fn start(
        &self,
        source: impl Into<String>,
        options: StartOptions,
    ) -> Result<(), AssemblerError> {
        self.launch(FeedSource::complete(source.into()), options)
            .map(|_| ())
    }

    /// Begin a session whose source text is pushed through the returned
    /// feeder.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::NoRuntime`] outside a Tokio runtime.
    pub fn start_incremental(&self, options: StartOptions) -> Result<SessionFeeder, AssemblerError> {
        let feed = FeedSource::open();
        let session = self.launch(Arc::clone(&feed), options)?;
        Ok(SessionFeeder::new(feed, session))
    }

    fn launch(&self, feed: Arc<FeedSource>, options: StartOptions) -> Result<u64, AssemblerError> {
        let handle = Handle::try_current().map_err(|_| AssemblerError::NoRuntime)?;
        let config = self.shared.config.read().clone();
        let emitter = &self.shared.emitter;

        let mut record = self.shared.session.lock();
        if record.abort(emitter) {
            tracing::info!(session = record.generation, "session aborted by restart");
        }
        record.reset(emitter);

        record.generation += 1;
        let generation = record.generation;
        let (target_length, _) = feed.length();
        record.last_card = None;
        record.failure = None;
        record.machine.record_progress(0, target_length, false);
        record.transition(StreamStage::Thinking, emitter);
        record.feed = Some(Arc::clone(&feed));

        let run = SessionRun::new(Arc::clone(&self.shared), generation, feed, options, &config);
        record.task = Some(handle.spawn(run.run()));
        tracing::info!(
            session = generation,
            instant = options.instant,
            target_length,
            "session started"
        );
        Ok(generation)
    }

    /// Abort the running session. No-op when nothing is running.
    pub fn stop(&self) {
        let mut record = self.shared.session.lock();
        if record.abort(&self.shared.emitter) {
            tracing::info!(session = record.generation, "session aborted");
        }
    }

    #[must_use]
    pub fn get_state(&self) -> StreamingState {
        self.shared.session.lock().machine.snapshot()
    }

    /// Last snapshot emitted by the current or most recent session.
    #[must_use]
    pub fn last_card(&self) -> Option<Arc<CardModel>> {
        self.shared.session.lock().last_card.clone()
    }

    /// Parse failure that ended the current or most recent session.
    #[must_use]
    pub fn last_error(&self) -> Option<AssemblerError> {
        self.shared.session.lock().failure.map(AssemblerError::Parse)
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.shared.emitter.subscribe()
    }

    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventReceiver {
        self.shared.emitter.subscribe_to(kinds)
    }

    /// Update pacing knobs. Unset fields keep their value; a running session
    /// picks the new values up on its next tick.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::Config`] and keeps the previous
    /// configuration when the merged result is invalid.
    pub fn configure(&self, overrides: &PacingOverrides) -> Result<PacingConfig, AssemblerError> {
        let mut config = self.shared.config.write();
        let merged = config.pacing.apply(overrides)?;
        config.pacing = merged.clone();
        tracing::info!(
            min_chunk_size = merged.min_chunk_size,
            max_chunk_size = merged.max_chunk_size,
            tokens_per_second = merged.tokens_per_second,
            "pacing reconfigured"
        );
        Ok(merged)
    }

    #[must_use]
    pub fn config(&self) -> AssemblerConfig {
        self.shared.config.read().clone()
    }
}

impl Drop for StreamingAssembler {
    fn drop(&mut self) {
        self.shared.session.lock().abort(&self.shared.emitter);
    }
}

enum Tick {
    Continue,
    Finished,
    Halted,
}

/// State owned by the session task.
struct SessionRun {
    shared: Arc<Shared>,
    generation: u64,
    feed: Arc<FeedSource>,
    instant: bool,
    scheduler: PacingScheduler,
    normalizer: Normalizer,
    detector: DiffDetector,
    gate: EmissionGate,
    buffer: String,
}

impl SessionRun {
    fn new(
        shared: Arc<Shared>,
        generation: u64,
        feed: Arc<FeedSource>,
        options: StartOptions,
        config: &AssemblerConfig,
    ) -> Self {
        Self {
            shared,
            generation,
            feed,
            instant: options.instant,
            scheduler: PacingScheduler::new(config.pacing.clone(), options.seed),
            normalizer: Normalizer::new(&config.normalizer),
            detector: DiffDetector::new(),
            gate: EmissionGate::new(),
            buffer: String::new(),
        }
    }

    async fn run(mut self) {
        if !self.instant {
            sleep(self.scheduler.thinking_delay()).await;
            if !self.enter_streaming() {
                return;
            }
        }

        loop {
            self.refresh_pacing();
            let budget = if self.instant {
                None
            } else {
                Some(self.scheduler.next_chunk_size())
            };
            let take = self.feed.take(self.buffer.len(), budget);
            if take.chunk.is_empty() && !take.finished {
                match self.gate.flush_at(self.scheduler.config()) {
                    Some(due) => {
                        // Held snapshots go out even while the feed is idle.
                        let idle = timeout_at(due, self.feed.changed()).await.is_err();
                        if idle && !matches!(self.tick(take), Tick::Continue) {
                            return;
                        }
                    }
                    None => self.feed.changed().await,
                }
                continue;
            }

            if !self.instant {
                let released = take.chunk.chars().count();
                sleep(self.scheduler.tick_delay(released)).await;
            }
            let is_final =
                take.finished && self.buffer.len() + take.chunk.len() >= take.target_length;
            if is_final {
                // The final card is spaced like any other.
                if let Some(until) = self.gate.throttled_until(self.scheduler.config()) {
                    sleep_until(until).await;
                }
            }

            match self.tick(take) {
                Tick::Continue => {}
                Tick::Finished | Tick::Halted => return,
            }
        }
    }

    fn enter_streaming(&self) -> bool {
        let mut record = self.shared.session.lock();
        record.is_live(self.generation)
            && record.transition(StreamStage::Streaming, &self.shared.emitter)
    }

    fn refresh_pacing(&mut self) {
        let pacing = self.shared.config.read().pacing.clone();
        if &pacing != self.scheduler.config() {
            self.scheduler.set_config(pacing);
        }
    }

    fn tick(&mut self, take: FeedTake) -> Tick {
        self.buffer.push_str(&take.chunk);
        let is_final = take.finished && self.buffer.len() >= take.target_length;
        let growth = (!take.chunk.is_empty()).then(|| BufferGrowth {
            session: self.generation,
            chunk: take.chunk,
            buffer_length: self.buffer.len(),
            target_length: take.target_length,
        });

        let update = match parse_partial(&self.buffer) {
            Ok(doc) => self.snapshot(&doc, is_final),
            Err(err) => return self.fail(growth, &err, take.target_length, take.finished),
        };

        let emitter = &self.shared.emitter;
        let mut record = self.shared.session.lock();
        if !record.is_live(self.generation) {
            return Tick::Halted;
        }
        record
            .machine
            .record_progress(self.buffer.len(), take.target_length, take.finished);
        tracing::debug!(
            session = self.generation,
            buffer_length = self.buffer.len(),
            target_length = take.target_length,
            emitted = update.is_some(),
            "tick"
        );

        if let Some(growth) = growth {
            emitter.publish(&AssemblerEvent::Buffer(growth));
        }
        if let Some(update) = update {
            record.last_card = Some(Arc::clone(&update.card));
            emitter.publish(&AssemblerEvent::Card(update));
        }
        if !is_final {
            return Tick::Continue;
        }

        record.transition(StreamStage::Complete, emitter);
        record.release();
        tracing::info!(
            session = self.generation,
            bytes = self.buffer.len(),
            "session complete"
        );
        Tick::Finished
    }

    /// Normalize and diff the parsed buffer; `Some` when the snapshot is due.
    fn snapshot(&mut self, doc: &PartialDocument, is_final: bool) -> Option<CardUpdate> {
        let Normalized { mut card, warnings } = self.normalizer.normalize(doc);
        for warning in &warnings {
            tracing::warn!(session = self.generation, "{warning}");
        }

        let diff = self.detector.compare(&mut card);
        let now = Instant::now();
        if !is_final {
            if diff.unchanged {
                self.gate.settle();
                return None;
            }
            let has_new_completions = !diff.completed_sections.is_empty();
            if !self
                .gate
                .should_emit(now, self.scheduler.config(), has_new_completions, false)
            {
                return None;
            }
        }

        self.gate.record_emit(now);
        let card = Arc::new(card);
        self.detector.commit(Arc::clone(&card));
        Some(CardUpdate {
            session: self.generation,
            card,
            change_type: diff.change_type,
            completed_sections: diff.completed_sections,
            changed_sections: diff.changed_sections,
            is_final,
        })
    }

    fn fail(
        &self,
        growth: Option<BufferGrowth>,
        err: &ParseError,
        target_length: usize,
        finished: bool,
    ) -> Tick {
        let emitter = &self.shared.emitter;
        let mut record = self.shared.session.lock();
        if !record.is_live(self.generation) {
            return Tick::Halted;
        }
        record
            .machine
            .record_progress(self.buffer.len(), target_length, finished);
        if let Some(growth) = growth {
            emitter.publish(&AssemblerEvent::Buffer(growth));
        }
        tracing::error!(
            session = self.generation,
            offset = err.offset,
            "unrecoverable parse error: {err}"
        );
        record.failure = Some(*err);
        record.transition(StreamStage::Error, emitter);
        record.release();
        Tick::Halted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    async fn run_to_end(rx: &mut EventReceiver) -> Vec<AssemblerEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(&event, AssemblerEvent::Stage(t) if t.to.is_terminal());
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn start_outside_runtime_fails() {
        let assembler = StreamingAssembler::default();
        assert!(matches!(
            assembler.start("{}", StartOptions::instant()),
            Err(AssemblerError::NoRuntime)
        ));
        assert_eq!(assembler.get_state().stage, StreamStage::Idle);
    }

    #[test]
    fn invalid_initial_config_is_rejected() {
        let mut config = AssemblerConfig::default();
        config.pacing.min_chunk_size = 0;
        assert!(matches!(
            StreamingAssembler::new(config),
            Err(AssemblerError::Config(ConfigError::Validation(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn instant_session_emits_one_final_card() {
        let assembler = StreamingAssembler::default();
        let mut rx = assembler.subscribe_to(&[EventKind::Card, EventKind::Stage]);
        assembler
            .start(r#"{"title":"T","sections":[]}"#, StartOptions::instant())
            .unwrap();
        let events = run_to_end(&mut rx).await;

        let cards: Vec<&CardUpdate> = events
            .iter()
            .filter_map(|event| match event {
                AssemblerEvent::Card(update) => Some(update),
                _ => None,
            })
            .collect();
        assert_eq!(cards.len(), 1);
        assert!(cards[0].is_final);
        assert_eq!(cards[0].card.title, "T");

        let stages: Vec<StreamStage> = events
            .iter()
            .filter_map(|event| match event {
                AssemblerEvent::Stage(t) => Some(t.to),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![StreamStage::Thinking, StreamStage::Complete]);

        let state = assembler.get_state();
        assert!(!state.is_active);
        assert!((state.progress - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let assembler = StreamingAssembler::default();
        assembler.stop();
        assert_eq!(assembler.get_state().stage, StreamStage::Idle);
        assembler
            .start(r#"{"title":"Slow"}"#, StartOptions::seeded(1))
            .unwrap();
        assembler.stop();
        assembler.stop();
        assert_eq!(assembler.get_state().stage, StreamStage::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_aborts_then_resets() {
        let assembler = StreamingAssembler::default();
        let mut rx = assembler.subscribe_to(&[EventKind::Stage]);
        assembler.start(r#"{"title":"A"}"#, StartOptions::seeded(1)).unwrap();
        assembler.start(r#"{"title":"B"}"#, StartOptions::instant()).unwrap();
        // Published synchronously by the two `start` calls.
        let events = rx.drain();
        let stages: Vec<(u64, StreamStage)> = events
            .iter()
            .filter_map(|event| match event {
                AssemblerEvent::Stage(t) => Some((t.session, t.to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                (1, StreamStage::Thinking),
                (1, StreamStage::Aborted),
                (1, StreamStage::Idle),
                (2, StreamStage::Thinking),
            ]
        );
        // The instant session finishes on its own.
        let events = run_to_end(&mut rx).await;
        assert!(matches!(
            events.last(),
            Some(AssemblerEvent::Stage(t)) if t.session == 2 && t.to == StreamStage::Complete
        ));
        assert_eq!(assembler.last_card().unwrap().title, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn configure_rejects_invalid_and_keeps_previous() {
        let assembler = StreamingAssembler::default();
        let before = assembler.config().pacing;
        let err = assembler.configure(&PacingOverrides {
            tokens_per_second: Some(0.0),
            ..PacingOverrides::default()
        });
        assert!(matches!(
            err,
            Err(AssemblerError::Config(ConfigError::Validation(_)))
        ));
        assert_eq!(assembler.config().pacing, before);

        let merged = assembler
            .configure(&PacingOverrides {
                thinking_delay_ms: Some(0),
                ..PacingOverrides::default()
            })
            .unwrap();
        assert_eq!(merged.thinking_delay_ms, 0);
        assert_eq!(merged.max_chunk_size, before.max_chunk_size);
    }
}
