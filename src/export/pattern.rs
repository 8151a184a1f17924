//! Pattern-to-sample rendering
//!
//! Plays one pattern once at a low internal rate without the analog filters
//! and dither, then normalizes the mono result to 8 bits so it can be loaded
//! back as an instrument.

use crate::config::EngineConfig;
use crate::engine::{EngineState, Quality, RenderMode};
use crate::module::{Module, MAX_SAMPLE_LEN};
use crate::replayer::PlayMode;
use crate::{Pt2Error, Result};
use tracing::info;

/// An 8-bit sample rendered from a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSample {
    /// Signed 8-bit PCM, even length
    pub data: Vec<i8>,
    /// Rate the sample was rendered at
    pub rate: u32,
    /// Period that replays it at the original pitch
    pub period: u16,
}

/// Render one pass of `pattern` (until a row repeats or `F00`), capped at
/// the largest sample a module can hold.
pub fn render_pattern_to_sample(
    module: &Module,
    pattern: u8,
    quality: Quality,
) -> Result<RenderedSample> {
    if module.pattern(pattern as usize).is_none() {
        return Err(Pt2Error::InvalidModule(format!("no pattern {}", pattern)));
    }

    let config = EngineConfig::default().with_dither(false);
    let mut state = EngineState::with_module(module.clone(), config)?;
    state.set_render_mode(RenderMode::PatternToSample(quality));
    state.set_row_tracking(true);
    state.mod_play(PlayMode::Pattern(pattern), 0, 0);

    let mut rendered: Vec<i16> = Vec::new();
    let mut buffer = vec![0i16; 4096];

    while rendered.len() < MAX_SAMPLE_LEN {
        // render up to the next tick, or one frame to run the tick itself
        let until_tick = match state.tick_sync().samples_left() {
            0 => 1,
            left => left as usize,
        };
        let n = until_tick
            .min(buffer.len())
            .min(MAX_SAMPLE_LEN - rendered.len());

        state.output_audio(&mut buffer[..n]);

        // the chunk that starts the second pass (or follows F00) is dropped
        if state.song_end_reached() || !state.is_playing() {
            break;
        }
        rendered.extend_from_slice(&buffer[..n]);
    }

    let data = normalize_to_i8(&rendered);
    info!(
        pattern,
        ?quality,
        bytes = data.len(),
        "pattern rendered to sample"
    );

    Ok(RenderedSample {
        data,
        rate: quality.output_rate(),
        period: quality.period(),
    })
}

/// Scale so the peak hits 127 and trim to whole words
fn normalize_to_i8(samples: &[i16]) -> Vec<i8> {
    let len = samples.len().min(MAX_SAMPLE_LEN) & !1;
    let samples = &samples[..len];

    let peak = samples
        .iter()
        .map(|&s| (s as i32).abs())
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return vec![0; len];
    }

    let scale = 127.0 / peak as f64;
    samples
        .iter()
        .map(|&s| (s as f64 * scale).round().clamp(-128.0, 127.0) as i8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cia::bpm_to_samples_per_tick;
    use crate::module::Note;

    #[test]
    fn test_normalize_peak() {
        let data = normalize_to_i8(&[0, 1000, -2000, 500, 7]);
        assert_eq!(data.len(), 4, "odd lengths are trimmed");
        assert_eq!(data[2], -127);
        assert_eq!(data[1], 64);
    }

    #[test]
    fn test_silent_pattern() {
        let data = normalize_to_i8(&[0; 10]);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pattern_renders_one_pass() {
        let mut module = Module::new();
        let square: Vec<i8> = (0..64).map(|i| if i < 32 { 100 } else { -100 }).collect();
        module
            .set_sample(0, &square, 0, 64, 64, 0)
            .expect("valid sample");
        module
            .set_note(0, 0, 0, Note::new(428, 1))
            .expect("cell in range");
        module
            .set_note(0, 1, 0, Note::effect(0xD, 0x00))
            .expect("cell in range");

        let sample = render_pattern_to_sample(&module, 0, Quality::High).expect("render");
        assert_eq!(sample.rate, 28_836);
        assert_eq!(sample.period, 123);

        // two rows of six ticks
        let expected = 12 * bpm_to_samples_per_tick(125, 28_836) as usize;
        assert_eq!(sample.data.len(), expected & !1);
        assert_eq!(
            sample.data.iter().map(|&b| (b as i32).abs()).max(),
            Some(127),
            "peak normalized to full scale"
        );
    }

    #[test]
    fn test_missing_pattern() {
        let result = render_pattern_to_sample(&Module::new(), 7, Quality::Low);
        assert!(matches!(result, Err(Pt2Error::InvalidModule(_))));
    }
}
