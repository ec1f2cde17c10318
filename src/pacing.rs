//! Pacing: how much of the source is released per tick, how long each tick
//! waits, and when a tick may publish a snapshot.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::PacingConfig;

/// Upper bound on a single tick delay, whatever the configured rate.
const MAX_TICK_DELAY: Duration = Duration::from_secs(60);

/// Chunk sizing and delay computation for one session.
#[derive(Debug)]
pub struct PacingScheduler {
    config: PacingConfig,
    rng: fastrand::Rng,
}

impl PacingScheduler {
    /// `seed` makes the chunk-size sequence reproducible.
    #[must_use]
    pub fn new(config: PacingConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self { config, rng }
    }

    #[must_use]
    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Swap in new knobs; they apply from the next tick on.
    pub fn set_config(&mut self, config: PacingConfig) {
        self.config = config;
    }

    /// Characters to release on the next tick, uniform in
    /// `[min_chunk_size, max_chunk_size]`.
    pub fn next_chunk_size(&mut self) -> usize {
        let min = self.config.min_chunk_size.max(1);
        let max = self.config.max_chunk_size.max(min);
        self.rng.usize(min..=max)
    }

    /// Time a tick that released `chunk_chars` characters takes at the
    /// configured generation rate.
    #[must_use]
    pub fn tick_delay(&self, chunk_chars: usize) -> Duration {
        let rate = self.config.chars_per_second();
        if !rate.is_finite() || rate <= 0.0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = chunk_chars as f64 / rate;
        Duration::try_from_secs_f64(secs).map_or(MAX_TICK_DELAY, |delay| delay.min(MAX_TICK_DELAY))
    }

    #[must_use]
    pub fn thinking_delay(&self) -> Duration {
        self.config.thinking_delay()
    }
}

/// Byte offset reached after taking up to `max_chars` characters of `text`
/// starting at byte `offset`. Never splits a character.
#[must_use]
pub fn advance_chars(text: &str, offset: usize, max_chars: usize) -> usize {
    let Some(rest) = text.get(offset..) else {
        return text.len();
    };
    if max_chars == 0 {
        return offset;
    }
    match rest.char_indices().nth(max_chars) {
        Some((byte, _)) => offset + byte,
        None => text.len(),
    }
}

/// Decides whether a tick publishes its snapshot.
///
/// Snapshots are spaced at least `card_update_throttle_ms` apart, the final
/// one included. When a tick finds newly completed sections, publication is
/// held for `completion_batch_delay_ms` so that nearby completions share one
/// snapshot. The final snapshot of a session is delayed, never dropped.
#[derive(Debug, Default)]
pub struct EmissionGate {
    last_emit: Option<Instant>,
    batch_deadline: Option<Instant>,
    /// A changed snapshot was held back and has not gone out since.
    held: bool,
}

impl EmissionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_emit(
        &mut self,
        now: Instant,
        pacing: &PacingConfig,
        has_new_completions: bool,
        is_final: bool,
    ) -> bool {
        if is_final {
            return true;
        }

        if has_new_completions && pacing.completion_batch_delay_ms > 0 {
            match self.batch_deadline {
                None => {
                    self.batch_deadline = Some(now + pacing.completion_batch_delay());
                    self.held = true;
                    return false;
                }
                Some(deadline) if now < deadline => {
                    self.held = true;
                    return false;
                }
                Some(_) => {}
            }
        }

        let open = self
            .throttled_until(pacing)
            .map_or(true, |until| now >= until);
        if !open {
            self.held = true;
        }
        open
    }

    /// Earliest instant the next snapshot clears the throttle.
    #[must_use]
    pub fn throttled_until(&self, pacing: &PacingConfig) -> Option<Instant> {
        self.last_emit.map(|last| last + pacing.card_update_throttle())
    }

    /// When a held snapshot may go out, if one is held.
    #[must_use]
    pub fn flush_at(&self, pacing: &PacingConfig) -> Option<Instant> {
        if !self.held {
            return None;
        }
        match (self.batch_deadline, self.throttled_until(pacing)) {
            (Some(deadline), Some(until)) => Some(deadline.max(until)),
            (Some(at), None) | (None, Some(at)) => Some(at),
            // Held with nothing to wait for: due now.
            (None, None) => Some(Instant::now()),
        }
    }

    /// The snapshot matches what subscribers already have; nothing is held.
    pub fn settle(&mut self) {
        self.held = false;
        self.batch_deadline = None;
    }

    pub fn record_emit(&mut self, now: Instant) {
        self.last_emit = Some(now);
        self.batch_deadline = None;
        self.held = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacing() -> PacingConfig {
        PacingConfig {
            min_chunk_size: 2,
            max_chunk_size: 5,
            thinking_delay_ms: 300,
            chars_per_token: 4.0,
            tokens_per_second: 25.0,
            card_update_throttle_ms: 50,
            completion_batch_delay_ms: 100,
        }
    }

    #[test]
    fn chunk_sizes_stay_in_range() {
        let mut scheduler = PacingScheduler::new(pacing(), Some(7));
        for _ in 0..500 {
            let size = scheduler.next_chunk_size();
            assert!((2..=5).contains(&size), "chunk size {size} out of range");
        }
    }

    #[test]
    fn seeded_schedulers_agree() {
        let mut a = PacingScheduler::new(pacing(), Some(42));
        let mut b = PacingScheduler::new(pacing(), Some(42));
        let left: Vec<usize> = (0..32).map(|_| a.next_chunk_size()).collect();
        let right: Vec<usize> = (0..32).map(|_| b.next_chunk_size()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn fixed_chunk_size() {
        let mut config = pacing();
        config.min_chunk_size = 4;
        config.max_chunk_size = 4;
        let mut scheduler = PacingScheduler::new(config, None);
        assert_eq!(scheduler.next_chunk_size(), 4);
    }

    #[test]
    fn tick_delay_scales_with_chunk() {
        // 4 chars/token * 25 tokens/s = 100 chars/s
        let scheduler = PacingScheduler::new(pacing(), None);
        assert_eq!(scheduler.tick_delay(10), Duration::from_millis(100));
        assert_eq!(scheduler.tick_delay(0), Duration::ZERO);
        assert_eq!(scheduler.thinking_delay(), Duration::from_millis(300));
    }

    #[test]
    fn tick_delay_is_capped() {
        let mut config = pacing();
        config.tokens_per_second = 1e-9;
        let scheduler = PacingScheduler::new(config, None);
        assert_eq!(scheduler.tick_delay(10), MAX_TICK_DELAY);
    }

    #[test]
    fn set_config_applies() {
        let mut scheduler = PacingScheduler::new(pacing(), Some(1));
        let mut faster = pacing();
        faster.tokens_per_second = 50.0;
        scheduler.set_config(faster);
        assert_eq!(scheduler.tick_delay(10), Duration::from_millis(50));
        assert!((scheduler.config().tokens_per_second - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn advance_chars_respects_boundaries() {
        let text = "aé😀b";
        assert_eq!(advance_chars(text, 0, 1), 1);
        assert_eq!(advance_chars(text, 1, 1), 3);
        assert_eq!(advance_chars(text, 3, 1), 7);
        assert_eq!(advance_chars(text, 0, 10), text.len());
        assert_eq!(advance_chars(text, 3, 0), 3);
        assert_eq!(advance_chars(text, text.len(), 3), text.len());
    }

    #[test]
    fn gate_throttles_consecutive_emissions() {
        let config = pacing();
        let mut gate = EmissionGate::new();
        let start = Instant::now();
        assert!(gate.should_emit(start, &config, false, false));
        gate.record_emit(start);
        assert!(!gate.should_emit(start + Duration::from_millis(10), &config, false, false));
        assert!(gate.should_emit(start + Duration::from_millis(50), &config, false, false));
    }

    #[test]
    fn gate_batches_completions() {
        let config = pacing();
        let mut gate = EmissionGate::new();
        let start = Instant::now();
        assert!(!gate.should_emit(start, &config, true, false));
        assert!(!gate.should_emit(start + Duration::from_millis(60), &config, true, false));
        assert!(gate.should_emit(start + Duration::from_millis(100), &config, true, false));
        gate.record_emit(start + Duration::from_millis(100));
        // A fresh completion opens a fresh window.
        assert!(!gate.should_emit(start + Duration::from_millis(200), &config, true, false));
    }

    #[test]
    fn flush_at_covers_batch_and_throttle() {
        let mut config = pacing();
        let mut gate = EmissionGate::new();
        let start = Instant::now();
        assert_eq!(gate.flush_at(&config), None);

        assert!(!gate.should_emit(start, &config, true, false));
        assert_eq!(gate.flush_at(&config), Some(start + Duration::from_millis(100)));

        config.card_update_throttle_ms = 500;
        gate.last_emit = Some(start);
        let due = gate.flush_at(&config).unwrap();
        assert_eq!(due, start + Duration::from_millis(500));
        assert!(gate.should_emit(due, &config, true, false));
    }

    #[test]
    fn throttled_snapshot_is_held_until_due() {
        let config = pacing();
        let mut gate = EmissionGate::new();
        let start = Instant::now();
        assert!(gate.should_emit(start, &config, false, false));
        gate.record_emit(start);
        assert_eq!(gate.flush_at(&config), None);

        assert!(!gate.should_emit(start + Duration::from_millis(10), &config, false, false));
        assert_eq!(gate.flush_at(&config), Some(start + Duration::from_millis(50)));

        gate.record_emit(start + Duration::from_millis(50));
        assert_eq!(gate.flush_at(&config), None);
    }

    #[test]
    fn settle_drops_the_hold() {
        let config = pacing();
        let mut gate = EmissionGate::new();
        let start = Instant::now();
        assert!(!gate.should_emit(start, &config, true, false));
        gate.settle();
        assert_eq!(gate.flush_at(&config), None);
        assert_eq!(gate.throttled_until(&config), None);
        gate.record_emit(start);
        assert_eq!(
            gate.throttled_until(&config),
            Some(start + Duration::from_millis(50))
        );
    }

    #[test]
    fn gate_without_batch_delay_emits_completions_at_once() {
        let mut config = pacing();
        config.completion_batch_delay_ms = 0;
        let mut gate = EmissionGate::new();
        assert!(gate.should_emit(Instant::now(), &config, true, false));
    }

    #[test]
    fn final_snapshot_always_emits() {
        let config = pacing();
        let mut gate = EmissionGate::new();
        let start = Instant::now();
        gate.record_emit(start);
        assert!(gate.should_emit(start, &config, true, true));
    }
}
