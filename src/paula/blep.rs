//! Band-limited step (BLEP) correction
//!
//! Paula outputs stepped 8-bit values. Every time a voice's sample value or
//! volume jumps, a band-limited residual is injected into a small ring buffer
//! and added to the following output samples, which removes most of the
//! aliasing a naive zero-order hold would produce.
//!
//! The residual table is a minimum-phase BLEP built from a Blackman-windowed
//! sinc through the real cepstrum. It is computed once, when the first
//! voice state is constructed, and shared by all voices.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;
use std::sync::OnceLock;

/// Zero crossings of the windowed sinc
pub const BLEP_ZC: usize = 16;
/// Oversampling factor of the residual table
pub const BLEP_OS: usize = 16;
/// Table step between two output samples
pub const BLEP_SP: usize = 16;
/// Number of output samples a single step correction spans
pub const BLEP_NS: usize = BLEP_ZC * BLEP_OS / BLEP_SP;
/// Ring buffer mask (buffer holds `BLEP_RNS + 1` entries)
pub const BLEP_RNS: usize = 31;

const TABLE_LEN: usize = BLEP_ZC * BLEP_OS * 2 + 1;
const CEPSTRUM_LEN: usize = 1024;

static BLEP_TABLE: OnceLock<Vec<f64>> = OnceLock::new();

/// Shared residual table (`1 - minBLEP step`).
///
/// The first call computes it. [`Blep::new`] calls this, so by the time a
/// [`Paula`](super::Paula) exists the audio path only reads the table.
pub fn blep_table() -> &'static [f64] {
    BLEP_TABLE.get_or_init(generate_min_blep)
}

/// Per-voice BLEP state
#[derive(Debug, Clone)]
pub struct Blep {
    table: &'static [f64],
    index: usize,
    samples_left: usize,
    last_value: f64,
    buffer: [f64; BLEP_RNS + 1],
}

impl Blep {
    /// Create an idle BLEP state
    pub fn new() -> Self {
        Blep {
            table: blep_table(),
            index: 0,
            samples_left: 0,
            last_value: 0.0,
            buffer: [0.0; BLEP_RNS + 1],
        }
    }

    /// Inject a step of `amplitude` at fractional position `offset` (0..1).
    #[inline]
    pub fn add(&mut self, offset: f64, amplitude: f64) {
        let table = self.table;

        let f = offset * BLEP_SP as f64;
        let whole = (f as usize).min(BLEP_SP - 1);
        let frac = f - whole as f64;

        let mut src = whole + BLEP_OS;
        let mut i = self.index;
        for _ in 0..BLEP_NS {
            let a = table[src];
            let b = table[src + 1];
            self.buffer[i] += amplitude * (a + (b - a) * frac);
            src += BLEP_SP;
            i = (i + 1) & BLEP_RNS;
        }

        self.samples_left = BLEP_NS;
    }

    /// Volume steps are always aligned to the output sample.
    #[inline]
    pub fn add_volume(&mut self, amplitude: f64) {
        self.add(0.0, amplitude);
    }

    /// Add the pending correction to `input` and advance the ring buffer.
    #[inline]
    pub fn run(&mut self, input: f64) -> f64 {
        let output = input + self.buffer[self.index];
        self.buffer[self.index] = 0.0;
        self.index = (self.index + 1) & BLEP_RNS;
        self.samples_left = self.samples_left.saturating_sub(1);
        output
    }

    /// Remaining samples of the current correction
    pub fn samples_left(&self) -> usize {
        self.samples_left
    }

    /// Last stepped value seen by this state
    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    /// Record the new stepped value
    pub fn set_last_value(&mut self, value: f64) {
        self.last_value = value;
    }

    /// Drop all pending corrections
    pub fn reset(&mut self) {
        *self = Blep::new();
    }
}

impl Default for Blep {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_min_blep() -> Vec<f64> {
    let n = TABLE_LEN;

    // Blackman-windowed sinc impulse, zero padded
    let mut buf: Vec<Complex<f64>> = (0..CEPSTRUM_LEN)
        .map(|i| {
            if i >= n {
                return Complex::new(0.0, 0.0);
            }
            let x = (i as f64 - (n - 1) as f64 / 2.0) / BLEP_OS as f64;
            let sinc = if x == 0.0 { 1.0 } else { (PI * x).sin() / (PI * x) };
            let t = i as f64 / (n - 1) as f64;
            let window = 0.42 - 0.5 * (2.0 * PI * t).cos() + 0.08 * (4.0 * PI * t).cos();
            Complex::new(sinc * window, 0.0)
        })
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(CEPSTRUM_LEN);
    let inverse = planner.plan_fft_inverse(CEPSTRUM_LEN);
    // rustfft leaves the inverse unnormalized
    let scale = 1.0 / CEPSTRUM_LEN as f64;

    // real cepstrum
    forward.process(&mut buf);
    for v in buf.iter_mut() {
        *v = Complex::new(v.norm().max(1e-100).ln(), 0.0);
    }
    inverse.process(&mut buf);

    // fold onto the causal half
    let half = CEPSTRUM_LEN / 2;
    for (i, v) in buf.iter_mut().enumerate() {
        let re = v.re * scale;
        let folded = if i == 0 || i == half {
            re
        } else if i < half {
            2.0 * re
        } else {
            0.0
        };
        *v = Complex::new(folded, 0.0);
    }

    forward.process(&mut buf);
    for v in buf.iter_mut() {
        *v = v.exp();
    }
    inverse.process(&mut buf);

    // integrate the minimum-phase impulse into a step, keep the residual
    let mut acc = 0.0;
    let step: Vec<f64> = buf
        .iter()
        .take(n)
        .map(|v| {
            acc += v.re * scale;
            acc
        })
        .collect();
    let total = step.last().copied().unwrap_or(1.0);
    step.iter().map(|&s| 1.0 - s / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_table_shape() {
        let table = blep_table();
        assert_eq!(table.len(), TABLE_LEN);
        assert_abs_diff_eq!(table[0], 1.0, epsilon = 1e-4);
        assert!(
            table[BLEP_OS + BLEP_SP * (BLEP_NS - 1) + BLEP_SP].abs() < 0.01,
            "residual should be almost settled at the end of the used window"
        );
        assert!(table.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_table_built_at_construction() {
        let blep = Blep::new();
        assert!(
            BLEP_TABLE.get().is_some(),
            "constructing a voice state must build the table"
        );
        assert!(std::ptr::eq(blep.table, blep_table()), "all states share one table");
    }

    #[test]
    fn test_residual_is_minimum_phase() {
        let table = blep_table();
        // most of the step settles in the first few taps
        let early = (1.0 - table[BLEP_OS + 2 * BLEP_SP]).abs();
        assert!(early > 0.5, "residual drops fast, got {}", table[BLEP_OS + 2 * BLEP_SP]);
        assert!(
            table.iter().all(|v| v.abs() < 1.2),
            "overshoot stays within the Gibbs bound"
        );
    }

    #[test]
    fn test_idle_run_is_transparent() {
        let mut blep = Blep::new();
        assert_eq!(blep.run(0.25), 0.25);
        assert_eq!(blep.samples_left(), 0);
    }

    #[test]
    fn test_correction_drains_to_zero() {
        let mut blep = Blep::new();
        blep.add(0.5, 1.0);
        assert_eq!(blep.samples_left(), BLEP_NS);

        let taps: Vec<f64> = (0..BLEP_NS).map(|_| blep.run(0.0)).collect();
        assert_eq!(blep.samples_left(), 0);
        assert_eq!(blep.run(0.0), 0.0, "buffer must be empty after BLEP_NS runs");
        assert!(taps[0].abs() > 0.5, "first correction tap should be large");
        assert!(taps[BLEP_NS - 1].abs() < 0.05, "last tap should be small");
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut blep = Blep::new();
        blep.add_volume(-1.0);
        blep.set_last_value(1.0);
        blep.reset();
        assert_eq!(blep.run(0.0), 0.0);
        assert_eq!(blep.last_value(), 0.0);
    }
}
