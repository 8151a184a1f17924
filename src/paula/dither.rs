//! Triangular-PDF dither for the 16-bit output stage
//!
//! Noise comes from a 32-bit LCG (`seed * 134775813 + 1`). Each output
//! channel adds the current rectangular noise value and subtracts the
//! previous one, which yields a triangular distribution. The recurrence and
//! seed are fixed so renders are bit-identical between runs.

/// Seed restored every time the voices are turned off
pub const DITHER_SEED: u32 = 0x1234_5000;

const LCG_MUL: u32 = 134_775_813;
const NOISE_SCALE: f64 = 0.5 / i32::MAX as f64;

/// LCG noise source plus per-channel history
#[derive(Debug, Clone)]
pub struct Dither {
    seed: u32,
    prev: [f64; 2],
}

impl Dither {
    /// Create a dither source at the default seed
    pub fn new() -> Self {
        Dither {
            seed: DITHER_SEED,
            prev: [0.0; 2],
        }
    }

    /// Next raw LCG output as a signed 32-bit value
    #[inline]
    pub fn random32(&mut self) -> i32 {
        self.seed = self.seed.wrapping_mul(LCG_MUL).wrapping_add(1);
        self.seed as i32
    }

    /// Apply TPDF dither to one channel of a frame already scaled to 16-bit range
    #[inline]
    pub fn apply(&mut self, channel: usize, sample: f64) -> f64 {
        let noise = self.random32() as f64 * NOISE_SCALE;
        let out = (sample + noise) - self.prev[channel];
        self.prev[channel] = noise;
        out
    }

    /// Current LCG state
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Restore seed and history
    pub fn reset(&mut self) {
        *self = Dither::new();
    }
}

impl Default for Dither {
    fn default() -> Self {
        Self::new()
    }
}
