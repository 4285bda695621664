//! End-to-end scenarios for the recognition state machine, driven through
//! the public API with a manually advanced clock.

use std::time::Duration;

use spinwatch_app::state::{RecognitionPolicy, RecognitionState, TrackKey};
use spinwatch_foundation::manual_clock;

fn policy() -> RecognitionPolicy {
    RecognitionPolicy {
        cooldown: Duration::from_secs(120),
        silence_duration: Duration::from_secs_f64(5.0),
        max_failed_attempts: 3,
        pause_duration: Duration::from_secs(900),
    }
}

#[test]
fn cooldown_scenario_120s() {
    let clock = manual_clock();
    let mut state = RecognitionState::new(policy(), clock.clone());

    // Track A recognized at t=0.
    state.on_recognition_succeeded(TrackKey::new("Track A", "Artist"));
    assert!(!state.can_recognize());

    // Blocked through the whole window...
    for _ in 0..119 {
        clock.advance(Duration::from_secs(1));
        state.tick();
        assert!(!state.can_recognize());
    }

    // ...and allowed exactly at t=120.
    clock.advance(Duration::from_secs(1));
    state.tick();
    assert!(state.can_recognize());
}

#[test]
fn failure_pause_scenario_overrides_satisfied_cooldown() {
    let clock = manual_clock();
    let mut state = RecognitionState::new(policy(), clock.clone());

    // Cooldown long since satisfied.
    state.on_recognition_succeeded(TrackKey::new("Track A", "Artist"));
    clock.advance(Duration::from_secs(600));
    state.tick();
    assert!(state.can_recognize());

    state.on_recognition_failed();
    state.on_recognition_failed();
    assert!(state.can_recognize());
    state.on_recognition_failed();
    assert!(!state.can_recognize());
}

#[test]
fn pause_recovery_scenario() {
    let clock = manual_clock();
    let mut state = RecognitionState::new(policy(), clock.clone());

    for _ in 0..3 {
        state.on_recognition_failed();
    }
    let paused = state.snapshot();
    assert!(!paused.can_recognize);
    assert_eq!(paused.pause_remaining, Some(Duration::from_secs(900)));

    // Half-way through the pause nothing changes.
    clock.advance(Duration::from_secs(450));
    state.tick();
    assert!(!state.can_recognize());

    clock.advance(Duration::from_secs(450));
    state.tick();
    let recovered = state.snapshot();
    assert!(recovered.can_recognize);
    assert_eq!(recovered.consecutive_failures, 0);
    assert_eq!(recovered.pause_remaining, None);

    // A single failure after recovery starts a fresh streak.
    state.on_recognition_failed();
    assert!(state.can_recognize());
}

#[test]
fn silence_scenario_four_ticks_of_1_5s() {
    let clock = manual_clock();
    let mut state = RecognitionState::new(policy(), clock.clone());

    state.on_recognition_succeeded(TrackKey::new("Track A", "Artist"));

    let step = Duration::from_secs_f64(1.5);
    let fired: Vec<bool> = (0..4).map(|_| state.update_silence(true, step)).collect();
    assert_eq!(fired, vec![false, false, false, true]);

    let status = state.snapshot();
    assert_eq!(status.last_track, None);
    assert_eq!(status.cooldown_remaining, None);
    assert!(status.can_recognize);
    assert!(state.display_clear_pending());
}

#[test]
fn snapshot_is_pure_and_tick_owns_the_transition() {
    let clock = manual_clock();
    let mut state = RecognitionState::new(policy(), clock.clone());

    for _ in 0..3 {
        state.on_recognition_failed();
    }
    clock.advance(Duration::from_secs(1000));

    // The pause elapsed, but only tick() may clear it. Reading status twice
    // changes nothing.
    let first = state.snapshot();
    let second = state.snapshot();
    assert_eq!(first, second);
    assert_eq!(first.pause_remaining, Some(Duration::ZERO));
    assert_eq!(first.consecutive_failures, 3);

    state.tick();
    let after_tick = state.snapshot();
    assert_eq!(after_tick.pause_remaining, None);
    assert_eq!(after_tick.consecutive_failures, 0);
}

#[test]
fn interleaved_noise_keeps_silence_from_firing() {
    let clock = manual_clock();
    let mut state = RecognitionState::new(policy(), clock.clone());
    state.on_recognition_succeeded(TrackKey::new("Track A", "Artist"));

    let step = Duration::from_secs(2);
    assert!(!state.update_silence(true, step));
    assert!(!state.update_silence(true, step));
    // A single loud tick resets the whole accumulation.
    assert!(!state.update_silence(false, step));
    assert!(!state.update_silence(true, step));
    assert!(!state.update_silence(true, step));

    // Still the same track; nothing was cleared.
    assert!(state.is_same_track(&TrackKey::new("Track A", "Artist")));
}
