//! Offline rendering
//!
//! Runs a private [`EngineState`] as fast as possible instead of from an
//! audio callback:
//! - [`render_to_wav`]: the song as 16-bit stereo WAV
//! - [`render_to_vec`]: the same into memory
//! - [`render_pattern_to_sample`]: one pattern as an 8-bit sample
//!
//! # Examples
//!
//! ```no_run
//! use pt2_paula::export::{render_to_wav, ExportConfig};
//! use pt2_paula::Module;
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let module = Module::new();
//! let abort = AtomicBool::new(false);
//! let summary = render_to_wav(&module, "song.wav", &ExportConfig::default(), &abort)?;
//! println!("{:.1}s rendered", summary.seconds);
//! # Ok(())
//! # }
//! ```

mod pattern;
mod wav;

pub use pattern::{render_pattern_to_sample, RenderedSample};
pub use wav::render_to_wav;

use crate::config::EngineConfig;
use crate::engine::EngineState;
use crate::module::Module;
use crate::paula::{AmigaModel, DEFAULT_STEREO_SEPARATION};
use crate::replayer::PlayMode;
use crate::{Pt2Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Frames rendered between abort-flag polls
pub const RENDER_CHUNK_FRAMES: usize = 1024;

/// Export configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Sample rate for export (default: 44100 Hz)
    pub output_rate: u32,
    /// Stereo separation in percent
    pub stereo_separation: u8,
    /// Emulated output stage
    pub amiga_model: AmigaModel,
    /// LED filter at song start
    pub led_filter: bool,
    /// TPDF dither
    pub dither: bool,
    /// Hard stop in seconds for songs that never loop
    pub max_seconds: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_rate: 44_100,
            stereo_separation: DEFAULT_STEREO_SEPARATION,
            amiga_model: AmigaModel::A500,
            led_filter: false,
            dither: true,
            max_seconds: 3600.0,
        }
    }
}

impl ExportConfig {
    /// Create config with custom sample rate
    pub fn with_output_rate(output_rate: u32) -> Self {
        Self {
            output_rate,
            ..Default::default()
        }
    }

    /// Cap the render length
    pub fn max_seconds(mut self, seconds: f64) -> Self {
        self.max_seconds = seconds;
        self
    }

    /// Enable or disable dither
    pub fn dither(mut self, enable: bool) -> Self {
        self.dither = enable;
        self
    }

    /// Select the Amiga model
    pub fn model(mut self, model: AmigaModel) -> Self {
        self.amiga_model = model;
        self
    }

    /// Engine settings for the render
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            output_rate: self.output_rate,
            stereo_separation: self.stereo_separation,
            amiga_model: self.amiga_model,
            led_filter: self.led_filter,
            dither: self.dither,
        }
    }

    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.max_seconds.is_finite() && self.max_seconds > 0.0) {
            return Err(Pt2Error::InvalidConfig(format!(
                "maximum render length {} s must be positive",
                self.max_seconds
            )));
        }
        self.engine_config().validate()
    }

    fn max_frames(&self) -> u64 {
        (self.max_seconds * self.output_rate as f64).ceil() as u64
    }
}

/// Why a render ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The song returned to a row it had already played
    SongEnd,
    /// `F00` stopped the replayer
    Stopped,
    /// `max_seconds` reached
    TimeLimit,
    /// The abort flag was raised
    Aborted,
}

/// Result of an offline render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    /// Stereo frames written
    pub frames: u64,
    /// Duration in seconds
    pub seconds: f64,
    /// Output sample rate
    pub sample_rate: u32,
    /// Replayer ticks run
    pub ticks: u64,
    /// Why rendering stopped
    pub stop_reason: StopReason,
}

/// Play `module` from order 0 and hand every rendered chunk (interleaved
/// stereo) to `sink` until the song ends.
fn render_song<F>(
    module: &Module,
    config: &ExportConfig,
    abort: &AtomicBool,
    mut sink: F,
) -> Result<RenderSummary>
where
    F: FnMut(&[i16]) -> Result<()>,
{
    config.validate()?;

    let mut state = EngineState::with_module(module.clone(), config.engine_config())?;
    state.set_row_tracking(true);
    state.mod_play(PlayMode::Song, 0, 0);

    info!(
        title = %module.title,
        output_rate = config.output_rate,
        max_seconds = config.max_seconds,
        "render started"
    );

    let max_frames = config.max_frames();
    let mut buffer = vec![0i16; RENDER_CHUNK_FRAMES * 2];
    let mut frames = 0u64;

    let stop_reason = loop {
        if abort.load(Ordering::Relaxed) {
            break StopReason::Aborted;
        }
        if state.song_end_reached() {
            break StopReason::SongEnd;
        }
        if !state.is_playing() {
            break StopReason::Stopped;
        }
        if frames >= max_frames {
            break StopReason::TimeLimit;
        }

        let n = (RENDER_CHUNK_FRAMES as u64).min(max_frames - frames) as usize;
        state.output_audio(&mut buffer[..n * 2]);
        sink(&buffer[..n * 2])?;
        frames += n as u64;
    };

    let summary = RenderSummary {
        frames,
        seconds: frames as f64 / config.output_rate as f64,
        sample_rate: config.output_rate,
        ticks: state.tick_sync().tick_count(),
        stop_reason,
    };
    info!(
        frames = summary.frames,
        seconds = summary.seconds,
        reason = ?summary.stop_reason,
        "render finished"
    );
    Ok(summary)
}

/// Render the whole song into memory as interleaved stereo
pub fn render_to_vec(
    module: &Module,
    config: &ExportConfig,
    abort: &AtomicBool,
) -> Result<(Vec<i16>, RenderSummary)> {
    let mut samples = Vec::new();
    let summary = render_song(module, config, abort, |chunk| {
        samples.extend_from_slice(chunk);
        Ok(())
    })?;
    Ok((samples, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Note;

    fn looping_module() -> Module {
        let mut module = Module::new();
        let data: Vec<i8> = (0..256).map(|i| (((i * 7) % 200) - 100) as i8).collect();
        module
            .set_sample(0, &data, 0, 256, 64, 0)
            .expect("valid sample");
        module
            .set_note(0, 0, 0, Note::new(428, 1))
            .expect("cell in range");
        module
    }

    #[test]
    fn test_song_end_detected() {
        let abort = AtomicBool::new(false);
        let (samples, summary) =
            render_to_vec(&looping_module(), &ExportConfig::default(), &abort).expect("render");
        assert_eq!(summary.stop_reason, StopReason::SongEnd);
        // 64 rows of 6 ticks at 882 samples, rounded up to whole chunks
        let song_frames = 64 * 6 * 882;
        assert!(summary.frames >= song_frames, "whole pattern rendered");
        assert!(summary.frames < song_frames + 2 * RENDER_CHUNK_FRAMES as u64);
        assert_eq!(samples.len() as u64, summary.frames * 2);
    }

    #[test]
    fn test_f00_stops_render() {
        let mut module = looping_module();
        module
            .set_note(0, 3, 1, Note::effect(0xF, 0x00))
            .expect("cell in range");
        let abort = AtomicBool::new(false);
        let (_, summary) =
            render_to_vec(&module, &ExportConfig::default(), &abort).expect("render");
        assert_eq!(summary.stop_reason, StopReason::Stopped);
        assert!(summary.frames < 5 * 6 * 882);
    }

    #[test]
    fn test_time_limit() {
        let abort = AtomicBool::new(false);
        let config = ExportConfig::default().max_seconds(0.5);
        let (_, summary) = render_to_vec(&looping_module(), &config, &abort).expect("render");
        assert_eq!(summary.stop_reason, StopReason::TimeLimit);
        assert_eq!(summary.frames, 22_050);
    }

    #[test]
    fn test_abort_flag() {
        let abort = AtomicBool::new(true);
        let (samples, summary) =
            render_to_vec(&looping_module(), &ExportConfig::default(), &abort).expect("render");
        assert_eq!(summary.stop_reason, StopReason::Aborted);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_renders_are_deterministic() {
        let abort = AtomicBool::new(false);
        let config = ExportConfig::default().max_seconds(0.25);
        let (a, _) = render_to_vec(&looping_module(), &config, &abort).expect("render");
        let (b, _) = render_to_vec(&looping_module(), &config, &abort).expect("render");
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_config() {
        let abort = AtomicBool::new(false);
        let config = ExportConfig::default().max_seconds(0.0);
        assert!(matches!(
            render_to_vec(&Module::new(), &config, &abort),
            Err(Pt2Error::InvalidConfig(_))
        ));
    }
}
