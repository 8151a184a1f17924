//! Paula output mixer
//!
//! Sums the four voices into stereo float buffers with BLEP-corrected sample
//! and volume steps, then runs the analog filter chain, inverts and scales to
//! 16-bit, dithers and clamps.
//!
//! Two post-mix pipelines exist:
//! - [`Mixer::output_stereo`]: real-time/WAV path (filters + TPDF dither)
//! - [`Mixer::output_raw_mono`]: pattern-to-sample path (no filters, no dither)

use crate::paula::{AmigaModel, Dither, FilterBank, Paula, Voice, PAULA_VOICES};

/// 16-bit full scale split across four voices, inverted like the real output stage
const OUTPUT_SCALE: f64 = -((i16::MAX as i32 / PAULA_VOICES as i32) as f64);
/// Raw renders keep the original polarity
const RAW_SCALE: f64 = (i16::MAX as i32 / PAULA_VOICES as i32) as f64;

const SAMPLE_NORM: f64 = 1.0 / 128.0;

/// Stereo mix buffers plus the post-mix signal chain
#[derive(Debug, Clone)]
pub struct Mixer {
    mix_l: Vec<f64>,
    mix_r: Vec<f64>,
    filters: FilterBank,
    dither: Dither,
    dither_enabled: bool,
}

impl Mixer {
    /// Create a mixer for `output_rate` Hz and `model`
    pub fn new(output_rate: u32, model: AmigaModel) -> Self {
        Mixer {
            mix_l: Vec::new(),
            mix_r: Vec::new(),
            filters: FilterBank::new(output_rate as f64, model),
            dither: Dither::new(),
            dither_enabled: true,
        }
    }

    /// Output filter chain
    pub fn filters(&self) -> &FilterBank {
        &self.filters
    }

    /// Output filter chain (mutable, e.g. for the LED toggle)
    pub fn filters_mut(&mut self) -> &mut FilterBank {
        &mut self.filters
    }

    /// Enable or disable TPDF dither on the stereo path
    pub fn set_dither(&mut self, enabled: bool) {
        self.dither_enabled = enabled;
    }

    /// Dither enabled
    pub fn dither_enabled(&self) -> bool {
        self.dither_enabled
    }

    /// Dither state
    pub fn dither(&self) -> &Dither {
        &self.dither
    }

    fn ensure_capacity(&mut self, frames: usize) {
        if self.mix_l.len() < frames {
            self.mix_l.resize(frames, 0.0);
            self.mix_r.resize(frames, 0.0);
        }
    }

    /// Mix `frames` output frames of all active voices into the float buffers.
    ///
    /// `multi_step` lets a voice consume more than one source byte per output
    /// frame; it is required when the output rate is below the fastest DMA
    /// fetch rate.
    pub fn mix_channels(
        &mut self,
        paula: &mut Paula,
        sample_data: &[i8],
        frames: usize,
        multi_step: bool,
    ) {
        self.ensure_capacity(frames);
        let mix_l = &mut self.mix_l[..frames];
        let mix_r = &mut self.mix_r[..frames];

        for v in paula.voices_mut().iter_mut() {
            if !v.active {
                continue;
            }

            for (l, r) in mix_l.iter_mut().zip(mix_r.iter_mut()) {
                let mut smp = v.sample;
                let mut vol = v.volume;

                if smp != v.blep.last_value() {
                    if v.last_delta > v.last_phase {
                        let step = v.blep.last_value() - smp;
                        v.blep.add(v.last_phase * v.last_delta_mul, step);
                    }
                    v.blep.set_last_value(smp);
                }

                if vol != v.blep_vol.last_value() {
                    let step = v.blep_vol.last_value() - vol;
                    v.blep_vol.add_volume(step);
                    v.blep_vol.set_last_value(vol);
                }

                if v.blep.samples_left() > 0 {
                    smp = v.blep.run(smp);
                }
                if v.blep_vol.samples_left() > 0 {
                    vol = v.blep_vol.run(vol);
                }

                if !v.muted {
                    let s = smp * vol;
                    *l += s * v.pan_l;
                    *r += s * v.pan_r;
                }

                v.phase += v.delta;
                if multi_step {
                    while v.phase >= 1.0 {
                        fetch_next(v, sample_data);
                    }
                } else if v.phase >= 1.0 {
                    fetch_next(v, sample_data);
                }
            }
        }

        paula.publish_scope();
    }

    /// Filter, scale, dither and quantize `frames` mixed frames into
    /// interleaved stereo `out` (`out.len() >= frames * 2`).
    pub fn output_stereo(&mut self, out: &mut [i16], frames: usize) {
        self.ensure_capacity(frames);
        for (i, frame) in out.chunks_exact_mut(2).take(frames).enumerate() {
            let filtered = self.filters.process([self.mix_l[i], self.mix_r[i]]);
            self.mix_l[i] = 0.0;
            self.mix_r[i] = 0.0;

            for (ch, (dst, &x)) in frame.iter_mut().zip(filtered.iter()).enumerate() {
                let mut y = x * OUTPUT_SCALE;
                if self.dither_enabled {
                    y = self.dither.apply(ch, y);
                }
                *dst = clamp16(y as i32);
            }
        }
    }

    /// Downmix `frames` mixed frames to mono without filtering or dither.
    pub fn output_raw_mono(&mut self, out: &mut [i16], frames: usize) {
        self.ensure_capacity(frames);
        for (i, dst) in out.iter_mut().take(frames).enumerate() {
            let l = self.mix_l[i] * RAW_SCALE;
            let r = self.mix_r[i] * RAW_SCALE;
            self.mix_l[i] = 0.0;
            self.mix_r[i] = 0.0;
            *dst = clamp16(((l + r) * 0.5) as i32);
        }
    }

    /// Stop all voices and return every piece of signal state to power-on.
    pub fn turn_off_voices(&mut self, paula: &mut Paula) {
        paula.reset_voices();
        self.filters.reset();
        self.dither.reset();
        self.mix_l.iter_mut().for_each(|s| *s = 0.0);
        self.mix_r.iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Advance one source byte, adopting the latched block on wrap.
#[inline]
fn fetch_next(v: &mut Voice, sample_data: &[i8]) {
    v.phase -= 1.0;

    v.last_phase = v.phase;
    v.last_delta = v.delta;
    v.last_delta_mul = v.delta_mul;

    v.sample = sample_data
        .get(v.data + v.pos)
        .map_or(0.0, |&b| b as f64 * SAMPLE_NORM);

    v.pos += 1;
    if v.pos >= v.length {
        v.pos = 0;
        v.length = v.new_length;
        v.data = v.new_data;
    }
}

#[inline]
fn clamp16(x: i32) -> i16 {
    x.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
