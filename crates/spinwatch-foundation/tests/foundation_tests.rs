//! Foundation crate tests: clock abstraction, lifecycle transitions, and
//! error formatting.

use spinwatch_foundation::clock::{manual_clock, real_clock, Clock, ManualClock, RealClock};
use spinwatch_foundation::error::{AppError, AudioError};
use spinwatch_foundation::state::{AppState, StateManager};
use std::time::{Duration, Instant};

#[test]
fn real_clock_now_tracks_wall_clock() {
    let clock = RealClock::new();
    let before = Instant::now();
    let t = clock.now();
    let after = Instant::now();
    assert!(t >= before);
    assert!(t <= after);
}

#[test]
fn real_clock_factory_returns_usable_clock() {
    let clock = real_clock();
    assert!(clock.now().elapsed() < Duration::from_secs(1));
}

#[test]
fn manual_clock_advance_moves_now() {
    let clock = ManualClock::new();
    let t0 = clock.now();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now().duration_since(t0), Duration::from_secs(5));
}

#[test]
fn manual_clock_advance_accumulates() {
    let clock = ManualClock::new();
    let start = clock.now();
    clock.advance(Duration::from_millis(100));
    clock.advance(Duration::from_millis(200));
    clock.advance(Duration::from_millis(300));
    assert_eq!(
        clock.now().duration_since(start),
        Duration::from_millis(600)
    );
}

#[test]
fn manual_clock_sleep_is_virtual() {
    let clock = manual_clock();
    let start = clock.now();
    let wall_before = Instant::now();
    clock.sleep(Duration::from_secs(3600));
    assert!(wall_before.elapsed() < Duration::from_secs(1));
    assert_eq!(clock.now().duration_since(start), Duration::from_secs(3600));
}

#[test]
fn state_manager_happy_path() {
    let mgr = StateManager::new();
    assert_eq!(mgr.current(), AppState::Initializing);
    mgr.transition(AppState::Running).unwrap();
    mgr.transition(AppState::Stopping).unwrap();
    mgr.transition(AppState::Stopped).unwrap();
    assert_eq!(mgr.current(), AppState::Stopped);
}

#[test]
fn state_manager_rejects_invalid_transition() {
    let mgr = StateManager::new();
    assert!(mgr.transition(AppState::Stopped).is_err());
    assert_eq!(mgr.current(), AppState::Initializing);
}

#[test]
fn state_manager_allows_abort_during_init() {
    let mgr = StateManager::new();
    mgr.transition(AppState::Stopping).unwrap();
    mgr.transition(AppState::Stopped).unwrap();
}

#[test]
fn state_manager_notifies_subscribers() {
    let mgr = StateManager::new();
    let rx = mgr.subscribe();
    mgr.transition(AppState::Running).unwrap();
    assert_eq!(rx.try_recv().unwrap(), AppState::Running);
}

#[test]
fn device_not_found_lists_alternatives() {
    let err = AudioError::DeviceNotFound {
        name: Some("USB Turntable".into()),
        available: vec!["default".into(), "pipewire".into()],
    };
    let msg = err.to_string();
    assert!(msg.contains("USB Turntable"));
    assert!(msg.contains("pipewire"));
}

#[test]
fn app_error_wraps_audio_error() {
    let err: AppError = AudioError::StreamClosed.into();
    assert!(matches!(err, AppError::Audio(AudioError::StreamClosed)));
}
