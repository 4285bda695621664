//! Recognition state machine: cooldown after a match, duplicate-track
//! suppression, sustained-silence reset, and failure-backoff pause.
//!
//! All time-driven transitions happen in [`RecognitionState::tick`], which
//! the trigger loop calls once per cycle before reading any query. Queries
//! never mutate, so an expired pause stays visible in [`StatusSnapshot`]
//! until the next tick clears it.

use std::fmt;
use std::time::{Duration, Instant};

use spinwatch_foundation::SharedClock;

/// Identity of a recognized track for duplicate detection. Comparison is
/// exact and case-sensitive; the service is trusted to return stable
/// metadata for the same recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackKey {
    pub title: String,
    pub artist: String,
}

impl TrackKey {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.artist)
    }
}

/// Configured durations and limits governing the state machine.
#[derive(Debug, Clone)]
pub struct RecognitionPolicy {
    /// Minimum time after a completed recognition before the next attempt.
    pub cooldown: Duration,
    /// Contiguous silence required before the state resets.
    pub silence_duration: Duration,
    /// Consecutive failures that trigger the pause.
    pub max_failed_attempts: u32,
    /// How long recognition stays suppressed after repeated failures.
    pub pause_duration: Duration,
}

/// Read-only projection for logging and status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub can_recognize: bool,
    /// Remaining cooldown; `None` when no cooldown is active.
    pub cooldown_remaining: Option<Duration>,
    /// Remaining pause; `Some(ZERO)` for a pause that elapsed but has not
    /// been cleared by `tick()` yet.
    pub pause_remaining: Option<Duration>,
    pub consecutive_failures: u32,
    pub last_track: Option<TrackKey>,
    pub silence_accumulated: Duration,
}

pub struct RecognitionState {
    policy: RecognitionPolicy,
    clock: SharedClock,

    last_recognition_at: Option<Instant>,
    last_track: Option<TrackKey>,
    silence_accumulated: Duration,
    consecutive_failures: u32,
    paused_until: Option<Instant>,
    display_clear_pending: bool,
}

impl RecognitionState {
    pub fn new(policy: RecognitionPolicy, clock: SharedClock) -> Self {
        Self {
            policy,
            clock,
            last_recognition_at: None,
            last_track: None,
            silence_accumulated: Duration::ZERO,
            consecutive_failures: 0,
            paused_until: None,
            display_clear_pending: false,
        }
    }

    /// Apply time-driven transitions. Called once per loop cycle, before any
    /// query is read.
    pub fn tick(&mut self) {
        if let Some(until) = self.paused_until {
            if self.clock.now() >= until {
                tracing::info!("Failure pause elapsed, recognition re-enabled");
                self.paused_until = None;
                self.consecutive_failures = 0;
            }
        }
    }

    /// Whether a recognition attempt may start now. Pure; relies on `tick()`
    /// having cleared any elapsed pause.
    pub fn can_recognize(&self) -> bool {
        let now = self.clock.now();

        if let Some(until) = self.paused_until {
            if now < until {
                return false;
            }
        }

        match self.last_recognition_at {
            None => true,
            Some(at) => now.duration_since(at) >= self.policy.cooldown,
        }
    }

    pub fn is_same_track(&self, candidate: &TrackKey) -> bool {
        self.last_track.as_ref() == Some(candidate)
    }

    /// Record a completed recognition. Runs for duplicates as well: the
    /// cooldown restarts either way, only the announcement is skipped (the
    /// trigger loop decides that, not this type).
    pub fn on_recognition_succeeded(&mut self, track: TrackKey) {
        self.last_recognition_at = Some(self.clock.now());
        self.last_track = Some(track);
        self.consecutive_failures = 0;
        // A completed recognition means the room was not silent.
        self.silence_accumulated = Duration::ZERO;
    }

    /// Record a no-match or service error. Does not start a cooldown, so the
    /// next tick may retry immediately, until the failure limit pauses us.
    pub fn on_recognition_failed(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.policy.max_failed_attempts {
            self.paused_until = Some(self.clock.now() + self.policy.pause_duration);
            tracing::warn!(
                failures = self.consecutive_failures,
                pause_secs = self.policy.pause_duration.as_secs(),
                "Too many failed recognitions, pausing"
            );
        }
    }

    /// Account one tick of silence (or not). Returns true exactly when
    /// sustained silence fires: the accumulated contiguous silence first
    /// reaches the configured duration, clearing the last recognition and
    /// latching the display-clear request.
    pub fn update_silence(&mut self, is_silent: bool, tick_duration: Duration) -> bool {
        if !is_silent {
            self.silence_accumulated = Duration::ZERO;
            return false;
        }

        self.silence_accumulated += tick_duration;
        if self.silence_accumulated >= self.policy.silence_duration {
            tracing::info!("Sustained silence, resetting recognition state");
            self.last_recognition_at = None;
            self.last_track = None;
            self.display_clear_pending = true;
            self.silence_accumulated = Duration::ZERO;
            return true;
        }

        false
    }

    pub fn display_clear_pending(&self) -> bool {
        self.display_clear_pending
    }

    pub fn acknowledge_display_clear(&mut self) {
        self.display_clear_pending = false;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let now = self.clock.now();

        let cooldown_remaining = self
            .last_recognition_at
            .map(|at| self.policy.cooldown.saturating_sub(now.duration_since(at)))
            .filter(|remaining| !remaining.is_zero());

        let pause_remaining = self
            .paused_until
            .map(|until| until.saturating_duration_since(now));

        StatusSnapshot {
            can_recognize: self.can_recognize(),
            cooldown_remaining,
            pause_remaining,
            consecutive_failures: self.consecutive_failures,
            last_track: self.last_track.clone(),
            silence_accumulated: self.silence_accumulated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinwatch_foundation::{manual_clock, ManualClock};
    use std::sync::Arc;

    fn policy() -> RecognitionPolicy {
        RecognitionPolicy {
            cooldown: Duration::from_secs(120),
            silence_duration: Duration::from_secs_f64(5.0),
            max_failed_attempts: 3,
            pause_duration: Duration::from_secs(900),
        }
    }

    fn state_with_clock() -> (RecognitionState, Arc<ManualClock>) {
        let clock = manual_clock();
        let state = RecognitionState::new(policy(), clock.clone());
        (state, clock)
    }

    fn track_a() -> TrackKey {
        TrackKey::new("Blue in Green", "Miles Davis")
    }

    #[test]
    fn fresh_state_allows_recognition() {
        let (state, _clock) = state_with_clock();
        assert!(state.can_recognize());
    }

    #[test]
    fn cooldown_blocks_until_boundary() {
        let (mut state, clock) = state_with_clock();
        state.on_recognition_succeeded(track_a());
        assert!(!state.can_recognize());

        clock.advance(Duration::from_secs(119));
        assert!(!state.can_recognize());

        // Boundary is inclusive.
        clock.advance(Duration::from_secs(1));
        assert!(state.can_recognize());
    }

    #[test]
    fn zero_cooldown_always_allows_when_not_paused() {
        let clock = manual_clock();
        let mut state = RecognitionState::new(
            RecognitionPolicy {
                cooldown: Duration::ZERO,
                ..policy()
            },
            clock.clone(),
        );
        state.on_recognition_succeeded(track_a());
        assert!(state.can_recognize());
    }

    #[test]
    fn failure_does_not_start_cooldown() {
        let (mut state, _clock) = state_with_clock();
        state.on_recognition_failed();
        assert!(state.can_recognize());
        assert_eq!(state.snapshot().cooldown_remaining, None);
    }

    #[test]
    fn failures_below_limit_do_not_pause() {
        let (mut state, _clock) = state_with_clock();
        state.on_recognition_failed();
        state.on_recognition_failed();
        assert!(state.can_recognize());
        assert_eq!(state.snapshot().consecutive_failures, 2);
    }

    #[test]
    fn reaching_failure_limit_pauses() {
        let (mut state, _clock) = state_with_clock();
        for _ in 0..3 {
            state.on_recognition_failed();
        }
        assert!(!state.can_recognize());
        assert_eq!(
            state.snapshot().pause_remaining,
            Some(Duration::from_secs(900))
        );
    }

    #[test]
    fn pause_blocks_even_with_cooldown_satisfied() {
        let (mut state, clock) = state_with_clock();
        state.on_recognition_succeeded(track_a());
        clock.advance(Duration::from_secs(200));
        assert!(state.can_recognize());

        for _ in 0..3 {
            state.on_recognition_failed();
        }
        assert!(!state.can_recognize());
    }

    #[test]
    fn tick_clears_elapsed_pause_and_failures() {
        let (mut state, clock) = state_with_clock();
        for _ in 0..3 {
            state.on_recognition_failed();
        }

        clock.advance(Duration::from_secs(900));
        state.tick();
        assert!(state.can_recognize());
        assert_eq!(state.snapshot().consecutive_failures, 0);
        assert_eq!(state.snapshot().pause_remaining, None);

        // One failure after the reset must not immediately re-pause.
        state.on_recognition_failed();
        assert!(state.can_recognize());
    }

    #[test]
    fn tick_before_expiry_leaves_pause_in_place() {
        let (mut state, clock) = state_with_clock();
        for _ in 0..3 {
            state.on_recognition_failed();
        }

        clock.advance(Duration::from_secs(899));
        state.tick();
        assert!(!state.can_recognize());
        assert_eq!(state.snapshot().consecutive_failures, 3);
    }

    #[test]
    fn success_resets_failure_counter() {
        let (mut state, _clock) = state_with_clock();
        state.on_recognition_failed();
        state.on_recognition_failed();
        state.on_recognition_succeeded(track_a());
        assert_eq!(state.snapshot().consecutive_failures, 0);

        // The streak starts over: one more failure is far from the limit.
        state.on_recognition_failed();
        assert_eq!(state.snapshot().pause_remaining, None);
    }

    #[test]
    fn is_same_track_matches_exactly() {
        let (mut state, _clock) = state_with_clock();
        assert!(!state.is_same_track(&track_a()));

        state.on_recognition_succeeded(track_a());
        assert!(state.is_same_track(&track_a()));
        assert!(!state.is_same_track(&TrackKey::new("Blue in Green", "Bill Evans")));
        assert!(!state.is_same_track(&TrackKey::new("So What", "Miles Davis")));
        // Case-sensitive on purpose.
        assert!(!state.is_same_track(&TrackKey::new("blue in green", "Miles Davis")));
    }

    #[test]
    fn silence_accumulates_and_fires_once() {
        let (mut state, _clock) = state_with_clock();
        state.on_recognition_succeeded(track_a());

        let step = Duration::from_secs_f64(1.5);
        assert!(!state.update_silence(true, step)); // 1.5
        assert!(!state.update_silence(true, step)); // 3.0
        assert!(!state.update_silence(true, step)); // 4.5
        assert!(state.update_silence(true, step)); // 6.0 -> fires

        assert!(state.display_clear_pending());
        assert!(!state.is_same_track(&track_a()));
        assert_eq!(state.snapshot().last_track, None);
        assert_eq!(state.snapshot().cooldown_remaining, None);
        assert_eq!(state.snapshot().silence_accumulated, Duration::ZERO);

        // Continued silence starts a fresh accumulation, no immediate re-fire.
        assert!(!state.update_silence(true, step));
    }

    #[test]
    fn loud_tick_resets_silence_accumulator() {
        let (mut state, _clock) = state_with_clock();
        let step = Duration::from_secs_f64(1.5);
        state.update_silence(true, step);
        state.update_silence(true, step);
        state.update_silence(false, step);
        assert_eq!(state.snapshot().silence_accumulated, Duration::ZERO);

        // Accumulation restarts from zero afterwards.
        assert!(!state.update_silence(true, step));
        assert_eq!(state.snapshot().silence_accumulated, step);
    }

    #[test]
    fn success_resets_silence_accumulator() {
        let (mut state, _clock) = state_with_clock();
        state.update_silence(true, Duration::from_secs(4));
        state.on_recognition_succeeded(track_a());
        assert_eq!(state.snapshot().silence_accumulated, Duration::ZERO);
    }

    #[test]
    fn acknowledge_consumes_display_clear_latch() {
        let (mut state, _clock) = state_with_clock();
        state.update_silence(true, Duration::from_secs(5));
        assert!(state.display_clear_pending());
        state.acknowledge_display_clear();
        assert!(!state.display_clear_pending());
    }

    #[test]
    fn snapshot_reports_cooldown_remaining() {
        let (mut state, clock) = state_with_clock();
        state.on_recognition_succeeded(track_a());
        clock.advance(Duration::from_secs(50));

        let status = state.snapshot();
        assert!(!status.can_recognize);
        assert_eq!(status.cooldown_remaining, Some(Duration::from_secs(70)));
        assert_eq!(status.last_track, Some(track_a()));
    }
}
