//! Audio device integration using rodio

use super::SOURCE_BATCH_SAMPLES;
use crate::engine::{AudioEngine, EngineState, RenderMode};
use crate::{Pt2Error, Result};
use parking_lot::Mutex;
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Channel count and rate the engine currently renders at
fn stream_format(state: &EngineState) -> (u16, u32) {
    match state.render_mode() {
        RenderMode::Normal => (2, state.config().output_rate),
        RenderMode::PatternToSample(quality) => (1, quality.output_rate()),
    }
}

/// rodio source rendering straight from the engine
///
/// The stream format is re-read from the engine on every batch, so a rate or
/// render mode change reaches rodio at the next frame boundary.
pub struct EngineSource {
    engine: Arc<Mutex<EngineState>>,
    channels: u16,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// Internal batch (reduces lock contention)
    buffer: Vec<i16>,
    /// Current position in the batch
    buffer_pos: usize,
}

impl EngineSource {
    /// Source over `engine` at its current output rate
    pub fn new(engine: Arc<Mutex<EngineState>>, finished: Arc<AtomicBool>) -> Self {
        let (channels, sample_rate) = stream_format(&engine.lock());
        let mut source = EngineSource {
            engine,
            channels,
            sample_rate,
            finished,
            buffer: vec![0; SOURCE_BATCH_SAMPLES],
            buffer_pos: 0,
        };
        source.refill();
        source
    }

    fn refill(&mut self) {
        let mut engine = self.engine.lock();
        let (channels, sample_rate) = stream_format(&engine);
        if (channels, sample_rate) != (self.channels, self.sample_rate) {
            debug!(channels, sample_rate, "stream format changed");
            self.channels = channels;
            self.sample_rate = sample_rate;
        }
        engine.output_audio(&mut self.buffer);
        self.buffer_pos = 0;
    }
}

impl Source for EngineSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.buffer.len() - self.buffer_pos)
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for EngineSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;

        // a batch is one rodio frame: the next one is rendered before the
        // format is queried again
        if self.buffer_pos >= self.buffer.len() {
            self.refill();
        }
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from `engine`
    pub fn new(engine: &AudioEngine) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            Pt2Error::AudioDeviceError(format!("Failed to create audio stream: {}", e))
        })?;

        let sink = Sink::try_new(&stream_handle).map_err(|e| {
            Pt2Error::AudioDeviceError(format!("Failed to create audio sink: {}", e))
        })?;

        let finished = Arc::new(AtomicBool::new(false));
        let source = EngineSource::new(engine.shared(), Arc::clone(&finished));
        info!(sample_rate = source.sample_rate(), "audio device opened");
        sink.append(source);

        Ok(AudioDevice {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Pause playback
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.sink.play();
    }

    /// Playing and not yet finished
    pub fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Relaxed) && !self.sink.is_paused()
    }

    /// Signal that no more samples will be produced
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.pause();
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::Quality;

    fn try_audio_device() -> Option<AudioDevice> {
        let engine = AudioEngine::new(EngineConfig::default()).expect("engine");
        match AudioDevice::new(&engine) {
            Ok(device) => Some(device),
            Err(err) => {
                eprintln!(
                    "Skipping streaming::audio_device test (audio backend unavailable): {}",
                    err
                );
                None
            }
        }
    }

    #[test]
    fn test_audio_device_creation() {
        let Some(device) = try_audio_device() else {
            return;
        };
        assert!(device.is_running(), "Audio device should be running after creation");
        device.finish();
    }

    #[test]
    fn test_running_follows_pause_and_finish() {
        let Some(device) = try_audio_device() else {
            return;
        };
        device.pause();
        assert!(!device.is_running(), "paused device is not running");
        device.play();
        assert!(device.is_running(), "resumed device runs again");
        device.finish();
        assert!(!device.is_running(), "finished device stays stopped");
        device.play();
        assert!(!device.is_running(), "play cannot revive a finished device");
    }

    #[test]
    fn test_source_format() {
        let engine = AudioEngine::new(EngineConfig::default().with_output_rate(48_000))
            .expect("engine");
        let source = EngineSource::new(engine.shared(), Arc::new(AtomicBool::new(false)));
        assert_eq!(source.sample_rate(), 48_000);
        assert_eq!(source.channels(), 2);
        assert!(source.current_frame_len().is_some());
    }

    #[test]
    fn test_source_renders_and_finishes() {
        let engine = AudioEngine::new(EngineConfig::default()).expect("engine");
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = EngineSource::new(engine.shared(), Arc::clone(&finished));

        let first: Vec<i16> = source.by_ref().take(SOURCE_BATCH_SAMPLES + 10).collect();
        assert_eq!(first.len(), SOURCE_BATCH_SAMPLES + 10);
        assert!(
            first.iter().all(|&s| (s as i32).abs() <= 1),
            "stopped engine yields silence plus dither"
        );
        // two stereo batches of SOURCE_BATCH_SAMPLES / 2 frames each
        assert_eq!(
            engine.lock_audio().tick_sync().sample_count(),
            SOURCE_BATCH_SAMPLES as u64
        );

        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None, "Source should return None after finished signal");
    }

    #[test]
    fn test_source_follows_rate_and_mode_changes() {
        let engine = AudioEngine::new(EngineConfig::default()).expect("engine");
        let mut source = EngineSource::new(engine.shared(), Arc::new(AtomicBool::new(false)));
        source.next();
        assert_eq!(source.sample_rate(), 44_100);

        engine
            .lock_audio()
            .apply_config(EngineConfig::default().with_output_rate(22_050))
            .expect("valid config");
        assert_eq!(source.sample_rate(), 44_100, "the batch in flight keeps its rate");

        let left = source.current_frame_len().unwrap_or(0);
        source.by_ref().take(left).for_each(drop);
        assert_eq!(source.sample_rate(), 22_050, "new rate reported at the next batch");
        assert_eq!(source.current_frame_len(), Some(SOURCE_BATCH_SAMPLES));
        assert_eq!(source.channels(), 2);

        engine
            .lock_audio()
            .set_render_mode(RenderMode::PatternToSample(Quality::High));
        let left = source.current_frame_len().unwrap_or(0);
        source.by_ref().take(left).for_each(drop);
        assert_eq!(source.channels(), 1, "sampling renders mono");
        assert_eq!(source.sample_rate(), Quality::High.output_rate());
    }
}
