//! Paula (Amiga 8364) audio emulation
//!
//! Four DMA-driven 8-bit voices. The replayer only talks to them through the
//! register API below (`set_period`, `set_volume`, `set_length`, `set_data`,
//! `start_dma`, `stop_dma`, `set_dmacon`), mirroring the hardware registers
//! AUDxPER, AUDxVOL, AUDxLEN, AUDxLC and DMACON.
//!
//! Pointer and length writes are latched: they only take effect when DMA is
//! (re)started or when the running sample wraps, exactly like the real chip.
//! Sample memory is addressed by byte offset into the module's sample buffer.

pub mod blep;
pub mod dither;
pub mod filters;
pub mod scope;

pub use blep::Blep;
pub use dither::{Dither, DITHER_SEED};
pub use filters::{AmigaModel, FilterBank};
pub use scope::{ScopeReading, ScopeTap};

use bitflags::bitflags;
use std::f64::consts::PI;
use std::sync::Arc;

/// Number of hardware voices
pub const PAULA_VOICES: usize = 4;
/// PAL Paula clock in Hz
pub const PAULA_PAL_CLK: f64 = 3_546_895.0;
/// Lowest period the DMA can fetch at
pub const MIN_PERIOD: u32 = 113;
/// Internal value used for a period register of 0
pub const ZERO_PERIOD: u32 = 65_536;
/// Default stereo separation in percent
pub const DEFAULT_STEREO_SEPARATION: u8 = 20;

bitflags! {
    /// DMACON channel bits plus the SET/CLR bit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DmaBits: u16 {
        /// Voice 0
        const AUD0 = 0x0001;
        /// Voice 1
        const AUD1 = 0x0002;
        /// Voice 2
        const AUD2 = 0x0004;
        /// Voice 3
        const AUD3 = 0x0008;
        /// Set (1) or clear (0) the selected bits
        const SET = 0x8000;
    }
}

impl DmaBits {
    /// Bit for voice `ch`
    pub fn voice(ch: usize) -> Self {
        DmaBits::from_bits_truncate(1 << (ch & 3))
    }
}

/// State of one Paula voice
#[derive(Debug, Clone)]
pub struct Voice {
    pub(crate) active: bool,
    pub(crate) muted: bool,
    pub(crate) data: usize,
    pub(crate) new_data: usize,
    pub(crate) length: usize,
    pub(crate) new_length: usize,
    pub(crate) pos: usize,
    pub(crate) sample: f64,
    pub(crate) volume: f64,
    pub(crate) volume_reg: u8,
    pub(crate) period: u32,
    pub(crate) phase: f64,
    pub(crate) delta: f64,
    pub(crate) delta_mul: f64,
    pub(crate) last_phase: f64,
    pub(crate) last_delta: f64,
    pub(crate) last_delta_mul: f64,
    pub(crate) pan_l: f64,
    pub(crate) pan_r: f64,
    pub(crate) blep: Blep,
    pub(crate) blep_vol: Blep,
    cached_period: u32,
    cached_delta: f64,
    cached_delta_mul: f64,
}

impl Voice {
    fn new() -> Self {
        Voice {
            active: false,
            muted: false,
            data: 0,
            new_data: 0,
            length: 2,
            new_length: 2,
            pos: 0,
            sample: 0.0,
            volume: 0.0,
            volume_reg: 0,
            period: 0,
            phase: 0.0,
            delta: 0.0,
            delta_mul: 0.0,
            last_phase: 0.0,
            last_delta: 0.0,
            last_delta_mul: 0.0,
            pan_l: 1.0,
            pan_r: 1.0,
            blep: Blep::new(),
            blep_vol: Blep::new(),
            cached_period: 0,
            cached_delta: 0.0,
            cached_delta_mul: 0.0,
        }
    }

    /// DMA running
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Effective period after clamping (113..=65536), 0 if never written
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Volume register after masking and clamping (0..=64)
    pub fn volume(&self) -> u8 {
        self.volume_reg
    }

    /// Offset of the sample currently being fetched
    pub fn data_offset(&self) -> usize {
        self.data
    }

    /// Latched offset adopted at the next DMA start or wrap
    pub fn pending_data_offset(&self) -> usize {
        self.new_data
    }

    /// Current length in bytes
    pub fn length(&self) -> usize {
        self.length
    }

    /// Latched length in bytes
    pub fn pending_length(&self) -> usize {
        self.new_length
    }

    /// Read position in bytes
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Per-sample phase increment at the current output rate
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Constant-power pan gains (left, right)
    pub fn pan(&self) -> (f64, f64) {
        (self.pan_l, self.pan_r)
    }

    /// Channel mute (voice keeps running, contributes silence)
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn reset(&mut self) {
        let (pan_l, pan_r) = (self.pan_l, self.pan_r);
        let muted = self.muted;
        *self = Voice::new();
        self.pan_l = pan_l;
        self.pan_r = pan_r;
        self.muted = muted;
    }
}

/// The four-voice Paula model
#[derive(Debug)]
pub struct Paula {
    voices: [Voice; PAULA_VOICES],
    output_rate: f64,
    period_to_delta: f64,
    stereo_separation: u8,
    scope: Arc<ScopeTap>,
}

impl Paula {
    /// Create Paula running at `output_rate` Hz
    pub fn new(output_rate: u32) -> Self {
        let rate = output_rate.max(1) as f64;
        let mut paula = Paula {
            voices: std::array::from_fn(|_| Voice::new()),
            output_rate: rate,
            period_to_delta: PAULA_PAL_CLK / rate,
            stereo_separation: DEFAULT_STEREO_SEPARATION,
            scope: Arc::new(ScopeTap::new()),
        };
        paula.set_stereo_separation(DEFAULT_STEREO_SEPARATION);
        paula
    }

    /// Output rate in Hz
    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    /// Change the output rate; deltas of all voices are recomputed.
    pub fn set_output_rate(&mut self, output_rate: u32) {
        let rate = output_rate.max(1) as f64;
        if rate == self.output_rate {
            return;
        }
        self.output_rate = rate;
        self.period_to_delta = PAULA_PAL_CLK / rate;
        for ch in 0..PAULA_VOICES {
            let v = &mut self.voices[ch];
            v.cached_period = 0;
            if v.period != 0 {
                let period = v.period;
                self.apply_period(ch, period);
            }
        }
    }

    /// Whether a single output frame can advance a voice by more than one byte
    pub fn needs_multi_step(&self) -> bool {
        self.output_rate < PAULA_PAL_CLK / MIN_PERIOD as f64
    }

    /// Voice state (read-only)
    pub fn voice(&self, ch: usize) -> &Voice {
        &self.voices[ch & 3]
    }

    pub(crate) fn voices_mut(&mut self) -> &mut [Voice; PAULA_VOICES] {
        &mut self.voices
    }

    /// Shared scope tap
    pub fn scope(&self) -> Arc<ScopeTap> {
        Arc::clone(&self.scope)
    }

    /// AUDxPER: 0 means 65536, values below 113 are raised to 113.
    pub fn set_period(&mut self, ch: usize, period: u16) {
        let real = match period as u32 {
            0 => ZERO_PERIOD,
            p if p < MIN_PERIOD => MIN_PERIOD,
            p => p,
        };
        self.apply_period(ch & 3, real);
    }

    fn apply_period(&mut self, ch: usize, real: u32) {
        let ratio = self.period_to_delta;
        let v = &mut self.voices[ch];
        v.period = real;

        if real != v.cached_period {
            v.cached_period = real;
            v.cached_delta = ratio / real as f64;
            v.cached_delta_mul = 1.0 / v.cached_delta;
        }
        v.delta = v.cached_delta;
        v.delta_mul = v.cached_delta_mul;

        if v.last_delta == 0.0 {
            v.last_delta = v.delta;
        }
        if v.last_delta_mul == 0.0 {
            v.last_delta_mul = v.delta_mul;
        }
    }

    /// AUDxVOL: masked to 7 bits, then clamped to 64.
    pub fn set_volume(&mut self, ch: usize, volume: u16) {
        let vol = ((volume & 127) as u8).min(64);
        let v = &mut self.voices[ch & 3];
        v.volume_reg = vol;
        v.volume = vol as f64 / 64.0;
    }

    /// AUDxLEN in words; 0 is treated as 1. Latched until DMA start or wrap.
    pub fn set_length(&mut self, ch: usize, words: u16) {
        let words = words.max(1) as usize;
        self.voices[ch & 3].new_length = words * 2;
    }

    /// AUDxLC as a byte offset into sample memory. Latched like the length.
    pub fn set_data(&mut self, ch: usize, offset: usize) {
        self.voices[ch & 3].new_data = offset;
    }

    /// Start DMA: restart from the latched pointer/length.
    pub fn start_dma(&mut self, ch: usize) {
        let v = &mut self.voices[ch & 3];
        v.phase = 0.0;
        v.pos = 0;
        v.sample = 0.0;
        v.data = v.new_data;
        v.length = v.new_length;
        v.active = true;
    }

    /// Start DMA and immediately latch the loop part as the next block,
    /// the usual two-step register sequence used by replayers.
    pub fn start_dma_looped(&mut self, ch: usize, loop_offset: usize, loop_words: u16) {
        self.start_dma(ch);
        self.set_data(ch, loop_offset);
        self.set_length(ch, loop_words);
    }

    /// Stop DMA. Position is kept.
    pub fn stop_dma(&mut self, ch: usize) {
        self.voices[ch & 3].active = false;
    }

    /// Stop all four voices
    pub fn stop_all_dma(&mut self) {
        for ch in 0..PAULA_VOICES {
            self.stop_dma(ch);
        }
    }

    /// DMACON write: SET starts the selected voices, otherwise they are stopped.
    pub fn set_dmacon(&mut self, bits: u16) {
        let bits = DmaBits::from_bits_truncate(bits);
        let set = bits.contains(DmaBits::SET);
        for ch in 0..PAULA_VOICES {
            if bits.contains(DmaBits::voice(ch)) {
                if set {
                    self.start_dma(ch);
                } else {
                    self.stop_dma(ch);
                }
            }
        }
    }

    /// Mute or unmute a voice
    pub fn set_muted(&mut self, ch: usize, muted: bool) {
        self.voices[ch & 3].muted = muted;
    }

    /// Stereo separation in percent; pans are LRRL.
    pub fn set_stereo_separation(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.stereo_separation = percent;
        let scaled = (percent as i32 * 128) / 100;
        let pans = [128 - scaled, 128 + scaled, 128 + scaled, 128 - scaled];
        for (v, pan) in self.voices.iter_mut().zip(pans) {
            let (l, r) = pan_gains(pan as f64);
            v.pan_l = l;
            v.pan_r = r;
        }
    }

    /// Current stereo separation
    pub fn stereo_separation(&self) -> u8 {
        self.stereo_separation
    }

    /// Stop every voice and wipe its state (pans and mutes survive).
    pub fn reset_voices(&mut self) {
        for v in self.voices.iter_mut() {
            v.reset();
        }
        self.scope.clear();
    }

    pub(crate) fn publish_scope(&self) {
        for (ch, v) in self.voices.iter().enumerate() {
            self.scope.publish(ch, v.active, v.data, v.pos, v.volume_reg);
        }
    }
}

impl Default for Paula {
    fn default() -> Self {
        Self::new(44_100)
    }
}

/// Constant-power gains for a pan position on a 0..256 scale
fn pan_gains(pan: f64) -> (f64, f64) {
    let p = pan * (1.0 / 256.0);
    let sqrt2 = std::f64::consts::SQRT_2;
    ((p * (PI / 2.0)).cos() * sqrt2, (p * (PI / 2.0)).sin() * sqrt2)
}
