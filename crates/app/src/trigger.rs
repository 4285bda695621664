//! Per-tick decision procedure: meter the room, account silence, and gate
//! the expensive capture+recognize path behind the volume trigger and the
//! recognition state machine.
//!
//! The loop is strictly sequential. Capturing a clip blocks it for the full
//! clip duration and the recognition request blocks until the service
//! answers; cooldown and pause are wall-clock timestamps, so the missed
//! ticks do not skew the state. The stop flag is honored at tick boundaries
//! only, never mid-capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::journal::JournalError;
use crate::state::{RecognitionState, TrackKey};
use spinwatch_foundation::{AppError, AudioError, SharedClock};
use spinwatch_recognize::{RecognizeError, TrackMatch};

#[cfg_attr(test, mockall::automock)]
pub trait AudioSource: Send {
    /// Level over a fresh window of the given length, in dBFS.
    fn sample_level(&mut self, window: Duration) -> Result<f32, AudioError>;

    /// Record a clip of the given length as WAV bytes. Blocks for the full
    /// duration.
    fn capture_clip(&mut self, duration: Duration) -> Result<Vec<u8>, AudioError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RecognitionService: Send {
    /// One identification attempt. `Ok(None)` is an explicit no-match; the
    /// loop treats no-match and error identically.
    fn recognize(&mut self, audio: &[u8]) -> Result<Option<TrackMatch>, RecognizeError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait DisplaySink: Send {
    fn show_track(&mut self, text: &str) -> bool;

    fn clear(&mut self) -> bool;
}

#[cfg_attr(test, mockall::automock)]
pub trait Journal: Send {
    fn record(&mut self, track: &TrackMatch) -> Result<(), JournalError>;
}

impl DisplaySink for Box<dyn DisplaySink> {
    fn show_track(&mut self, text: &str) -> bool {
        (**self).show_track(text)
    }

    fn clear(&mut self) -> bool {
        (**self).clear()
    }
}

/// Display sink for dry-run mode: announcements are logged, nothing is
/// pushed to a device.
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show_track(&mut self, text: &str) -> bool {
        tracing::info!(%text, "Dry run, would display track");
        true
    }

    fn clear(&mut self) -> bool {
        tracing::debug!("Dry run, would clear display");
        true
    }
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub tick_interval: Duration,
    pub volume_threshold_db: f32,
    /// Must be below `volume_threshold_db`; config validation enforces it.
    pub silence_threshold_db: f32,
    pub clip_duration: Duration,
}

pub struct TriggerLoop<A, R, D, J> {
    config: TriggerConfig,
    state: RecognitionState,
    audio: A,
    recognizer: R,
    display: D,
    journal: J,
    clock: SharedClock,
}

impl<A, R, D, J> TriggerLoop<A, R, D, J>
where
    A: AudioSource,
    R: RecognitionService,
    D: DisplaySink,
    J: Journal,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TriggerConfig,
        state: RecognitionState,
        audio: A,
        recognizer: R,
        display: D,
        journal: J,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            state,
            audio,
            recognizer,
            display,
            journal,
            clock,
        }
    }

    /// Run until the stop flag is set. The flag is checked only at the top
    /// of a tick, so in-flight capture and recognition always complete.
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        tracing::info!(
            volume_threshold_db = self.config.volume_threshold_db,
            silence_threshold_db = self.config.silence_threshold_db,
            clip_secs = self.config.clip_duration.as_secs_f64(),
            "Trigger loop running"
        );

        while !stop.load(Ordering::SeqCst) {
            let tick_started = self.clock.now();
            self.tick();

            let elapsed = self.clock.now().duration_since(tick_started);
            if let Some(remaining) = self.config.tick_interval.checked_sub(elapsed) {
                self.clock.sleep(remaining);
            }
        }

        tracing::info!("Trigger loop stopped");
    }

    fn tick(&mut self) {
        self.state.tick();

        let level_db = match self.audio.sample_level(self.config.tick_interval) {
            Ok(db) => db,
            Err(e) => {
                tracing::warn!("Level sampling failed: {}", e);
                return;
            }
        };

        let is_silent = level_db < self.config.silence_threshold_db;
        if self
            .state
            .update_silence(is_silent, self.config.tick_interval)
        {
            if !self.display.clear() {
                tracing::warn!("Failed to clear display after sustained silence");
            }
            self.state.acknowledge_display_clear();
        }

        if level_db <= self.config.volume_threshold_db {
            return;
        }

        if !self.state.can_recognize() {
            self.trace_blocked(level_db);
            return;
        }

        tracing::info!(level_db, "Volume trigger, starting recognition");
        self.attempt_recognition();
    }

    fn attempt_recognition(&mut self) {
        let clip = match self.audio.capture_clip(self.config.clip_duration) {
            Ok(clip) => clip,
            Err(e) => {
                // An audio hiccup is not a recognition failure; the counter
                // only tracks answers from the service.
                tracing::warn!("Clip capture failed: {}", e);
                return;
            }
        };

        match self.recognizer.recognize(&clip) {
            Ok(Some(track)) => self.on_match(track),
            Ok(None) => {
                tracing::info!("No match for sample");
                self.state.on_recognition_failed();
            }
            Err(e) => {
                tracing::warn!("Recognition request failed: {}", e);
                self.state.on_recognition_failed();
            }
        }
    }

    fn on_match(&mut self, track: TrackMatch) {
        let key = TrackKey::new(track.title.clone(), track.artist.clone());

        if self.state.is_same_track(&key) {
            tracing::info!(track = %key, "Same track still playing, suppressing announcement");
        } else {
            let text = key.to_string();
            if !self.display.show_track(&text) {
                tracing::warn!("Failed to push track to display");
            }
            if let Err(e) = self.journal.record(&track) {
                tracing::warn!("Failed to journal recognition: {}", e);
            }
        }

        // The cooldown restarts for duplicates as well; only the
        // announcement above is skipped.
        self.state.on_recognition_succeeded(key);
        tracing::info!("Cooldown started");
    }

    fn trace_blocked(&self, level_db: f32) {
        let status = self.state.snapshot();
        if let Some(remaining) = status.pause_remaining {
            tracing::trace!(
                level_db,
                pause_remaining_secs = remaining.as_secs(),
                failures = status.consecutive_failures,
                "Loud but paused after repeated failures"
            );
        } else if let Some(remaining) = status.cooldown_remaining {
            tracing::trace!(
                level_db,
                cooldown_remaining_secs = remaining.as_secs(),
                last_track = ?status.last_track,
                "Loud but in cooldown"
            );
        }
    }
}

// Production wiring: the real collaborators behind the loop's seams.

impl AudioSource for spinwatch_audio::CaptureSession {
    fn sample_level(&mut self, window: Duration) -> Result<f32, AudioError> {
        spinwatch_audio::CaptureSession::sample_level(self, window)
    }

    fn capture_clip(&mut self, duration: Duration) -> Result<Vec<u8>, AudioError> {
        spinwatch_audio::CaptureSession::capture_clip(self, duration)
    }
}

impl RecognitionService for spinwatch_recognize::AcrCloudClient {
    fn recognize(&mut self, audio: &[u8]) -> Result<Option<TrackMatch>, RecognizeError> {
        self.identify(audio)
    }
}

impl DisplaySink for spinwatch_display::LaMetricClient {
    fn show_track(&mut self, text: &str) -> bool {
        match self.push(text, spinwatch_display::Priority::Info) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Display push error: {}", e);
                false
            }
        }
    }

    fn clear(&mut self) -> bool {
        match spinwatch_display::LaMetricClient::clear(self, None) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Display clear error: {}", e);
                false
            }
        }
    }
}

impl Journal for crate::journal::RecognitionJournal {
    fn record(&mut self, track: &TrackMatch) -> Result<(), JournalError> {
        crate::journal::RecognitionJournal::record(self, track)
    }
}

/// Handle to the trigger loop thread, following the capture-thread pattern:
/// a named OS thread plus an atomic stop flag.
pub struct TriggerLoopHandle {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl TriggerLoopHandle {
    pub fn spawn<A, R, D, J>(
        trigger: TriggerLoop<A, R, D, J>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, AppError>
    where
        A: AudioSource + 'static,
        R: RecognitionService + 'static,
        D: DisplaySink + 'static,
        J: Journal + 'static,
    {
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("trigger-loop".to_string())
            .spawn(move || trigger.run(thread_stop))
            .map_err(|e| AppError::Fatal(format!("Failed to spawn trigger loop thread: {}", e)))?;

        Ok(Self { handle, stop })
    }

    /// Request a stop and wait for the loop to exit at its next tick
    /// boundary (plus any in-flight capture or recognition call).
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join();
    }

    /// Wait for the loop to exit; used when something else (the shutdown
    /// guard) already set the shared stop flag.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
