use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::device::DeviceManager;
use super::level::LevelMeter;
use spinwatch_foundation::AudioError;

/// Longest we wait for the stream to deliver the next chunk before treating
/// the device as dead.
const DATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Chunk backlog while the consumer is busy (e.g. a recognition request in
/// flight). Beyond this, chunks are dropped and counted.
const CHANNEL_CAPACITY: usize = 256;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: Option<String>,
    pub preferred_sample_rate: u32,
}

#[derive(Debug, Clone, Copy)]
struct StreamInfo {
    sample_rate: u32,
    channels: u16,
}

/// Handle to a continuously running input stream.
///
/// A dedicated "audio-capture" thread owns the cpal stream and pushes mono
/// i16 chunks into a bounded channel. The consumer side meters levels over a
/// fresh window or collects a fixed-duration WAV clip; both calls block until
/// enough audio has arrived.
pub struct CaptureSession {
    rx: Receiver<Vec<i16>>,
    sample_rate: u32,
    pending: VecDeque<i16>,
    meter: LevelMeter,
    dropped: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Open the configured device and start streaming. Fails fast when the
    /// device is missing or the stream cannot be built; there is no per-tick
    /// recovery path, the device must be present at startup.
    pub fn start(config: CaptureConfig) -> Result<Self, AudioError> {
        let (chunk_tx, chunk_rx) = bounded(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));

        let thread_running = Arc::clone(&running);
        let thread_dropped = Arc::clone(&dropped);
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                capture_thread(config, chunk_tx, ready_tx, thread_running, thread_dropped);
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn audio thread: {}", e)))?;

        let info = match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::Fatal(
                    "Audio capture thread did not become ready within timeout".to_string(),
                ));
            }
        };

        tracing::info!(
            sample_rate = info.sample_rate,
            channels = info.channels,
            "Audio capture started"
        );

        Ok(Self {
            rx: chunk_rx,
            sample_rate: info.sample_rate,
            pending: VecDeque::new(),
            meter: LevelMeter::new(),
            dropped,
            running,
            handle: Some(handle),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Meter the current level over `window` of fresh audio, in dBFS.
    ///
    /// Backlog older than one window is discarded first so a delayed call
    /// (after a blocking recognition request) reports the room as it sounds
    /// now, not as it sounded during the request.
    pub fn sample_level(&mut self, window: Duration) -> Result<f32, AudioError> {
        let needed = self.samples_for(window);

        while let Ok(chunk) = self.rx.try_recv() {
            self.pending.extend(chunk);
        }
        if self.pending.len() > needed {
            let excess = self.pending.len() - needed;
            self.pending.drain(..excess);
        }
        self.fill_pending(needed)?;

        let samples: Vec<i16> = self.pending.drain(..).collect();
        Ok(self.meter.level_dbfs(&samples))
    }

    /// Record `duration` of fresh audio and return it as a 16-bit mono WAV.
    /// Blocks for the full duration; the trigger loop accepts that.
    pub fn capture_clip(&mut self, duration: Duration) -> Result<Vec<u8>, AudioError> {
        let needed = self.samples_for(duration);

        // The clip starts now; whatever queued up before the trigger fired
        // is not part of it.
        self.pending.clear();
        while self.rx.try_recv().is_ok() {}

        self.fill_pending(needed)?;
        let samples: Vec<i16> = self.pending.drain(..needed).collect();
        encode_wav_mono16(&samples, self.sample_rate)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn samples_for(&self, duration: Duration) -> usize {
        ((duration.as_secs_f64() * self.sample_rate as f64) as usize).max(1)
    }

    fn fill_pending(&mut self, needed: usize) -> Result<(), AudioError> {
        while self.pending.len() < needed {
            match self.rx.recv_timeout(DATA_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AudioError::NoDataTimeout {
                        duration: DATA_TIMEOUT,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(AudioError::StreamClosed),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_thread(
    config: CaptureConfig,
    chunk_tx: Sender<Vec<i16>>,
    ready_tx: Sender<Result<StreamInfo, AudioError>>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) {
    let manager = DeviceManager::new();
    let device = match manager.resolve_input(config.device.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let device_name = device.name().unwrap_or_else(|_| "<unknown>".to_string());

    let native = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    let stream_config = StreamConfig {
        channels: native.channels(),
        sample_rate: native.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    if stream_config.sample_rate.0 != config.preferred_sample_rate {
        tracing::warn!(
            requested = config.preferred_sample_rate,
            native = stream_config.sample_rate.0,
            "Device does not run at the configured sample rate, using native rate"
        );
    }

    tracing::info!(
        device = %device_name,
        host = ?manager.host_id(),
        rate = stream_config.sample_rate.0,
        channels = stream_config.channels,
        format = ?native.sample_format(),
        "Opening input stream"
    );

    let stream = match build_stream(
        &device,
        &stream_config,
        native.sample_format(),
        chunk_tx,
        Arc::clone(&running),
        dropped,
    ) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }

    let _ = ready_tx.send(Ok(StreamInfo {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    }));

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    tracing::info!("Audio capture thread shutting down");
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    chunk_tx: Sender<Vec<i16>>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) -> Result<Stream, AudioError> {
    let channels = config.channels as usize;

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
    };

    let push_mono = move |mono: Vec<i16>| {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let len = mono.len() as u64;
        if chunk_tx.try_send(mono).is_err() {
            dropped.fetch_add(len, Ordering::Relaxed);
            tracing::trace!("Capture channel full, dropping chunk");
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &_| {
                push_mono(frames_to_mono(data, channels));
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &_| {
                let converted: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                push_mono(frames_to_mono(&converted, channels));
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _: &_| {
                let converted: Vec<i16> = data.iter().map(|&s| u16_to_i16(s)).collect();
                push_mono(frames_to_mono(&converted, channels));
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    Ok(stream)
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}

fn frames_to_mono(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Encode mono i16 samples as a WAV byte buffer suitable for the
/// recognition upload.
pub fn encode_wav_mono16(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;

    Ok(cursor.into_inner())
}

fn wav_err(e: hound::Error) -> AudioError {
    AudioError::Fatal(format!("WAV encoding failed: {}", e))
}
