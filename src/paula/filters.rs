//! Amiga analog output filters
//!
//! The mixed Paula signal passes through the same stages as on the real
//! machine:
//! - A one-pole RC low-pass (A500 only, ~4.4kHz)
//! - The switchable Sallen-Key "LED" low-pass (~3.1kHz, Q ~0.66)
//! - A one-pole RC high-pass that removes DC (~5Hz)
//!
//! All filters run on the stereo mix, not per voice. Coefficients are a pure
//! function of sample rate and cutoff and are only recomputed when either
//! changes.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tiny constant fed into the LED stages to keep them out of denormals
pub const DENORMAL_OFFSET: f64 = 1e-10;

/// Upper bound for the bilinear `tan()` prewarp of the LED filter.
/// Above this the two-pole loop starts to run away near Nyquist.
const LED_MAX_COEFF: f64 = 32.0;

/// Which Amiga's output stage is emulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmigaModel {
    /// Amiga 500: RC low-pass + LED + high-pass
    #[default]
    A500,
    /// Amiga 1200: no audible RC low-pass, LED + high-pass
    A1200,
}

impl AmigaModel {
    /// Cutoff of the fixed RC low-pass, if the model has an audible one
    pub fn lowpass_cutoff(self) -> Option<f64> {
        match self {
            // R321 360 ohm, C321 0.1uF
            AmigaModel::A500 => Some(rc_cutoff(360.0, 1e-7)),
            AmigaModel::A1200 => None,
        }
    }

    /// Cutoff of the DC-blocking RC high-pass
    pub fn highpass_cutoff(self) -> f64 {
        match self {
            // R324 1390 ohm, C334 22.33uF
            AmigaModel::A500 => rc_cutoff(1390.0, 2.233e-5),
            // R324 1360 ohm, C334 22uF
            AmigaModel::A1200 => rc_cutoff(1360.0, 2.2e-5),
        }
    }
}

#[inline]
fn rc_cutoff(r: f64, c: f64) -> f64 {
    1.0 / (2.0 * PI * r * c)
}

/// Cutoff and Q of the LED Sallen-Key stage (identical on A500 and A1200)
pub fn led_cutoff_and_q() -> (f64, f64) {
    let (r1, r2): (f64, f64) = (10_000.0, 10_000.0);
    let (c1, c2): (f64, f64) = (6.8e-9, 3.9e-9);
    let root = (r1 * r2 * c1 * c2).sqrt();
    (1.0 / (2.0 * PI * root), root / (c2 * (r1 + r2)))
}

#[inline]
fn prewarp(sample_rate: f64, cutoff_hz: f64) -> f64 {
    if cutoff_hz < sample_rate / 2.0 {
        (PI * cutoff_hz / sample_rate).tan()
    } else {
        1.0
    }
}

/// One-pole RC coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RcCoefficients {
    c: f64,
    c2: f64,
    g: f64,
    cg: f64,
}

impl RcCoefficients {
    /// Bilinear one-pole coefficients for `cutoff_hz` at `sample_rate`
    pub fn new(sample_rate: f64, cutoff_hz: f64) -> Self {
        let c = prewarp(sample_rate, cutoff_hz);
        let g = 1.0 / (1.0 + c);
        RcCoefficients {
            c,
            c2: c * 2.0,
            g,
            cg: c * g,
        }
    }
}

/// Stereo one-pole RC filter (used as low-pass and as high-pass)
#[derive(Debug, Clone, Copy)]
pub struct RcFilter {
    coeffs: RcCoefficients,
    state: [f64; 2],
}

impl RcFilter {
    /// Create a filter with cleared history
    pub fn new(coeffs: RcCoefficients) -> Self {
        RcFilter {
            coeffs,
            state: [0.0; 2],
        }
    }

    /// Replace coefficients, keeping history
    pub fn set_coefficients(&mut self, coeffs: RcCoefficients) {
        self.coeffs = coeffs;
    }

    /// Low-pass one stereo frame
    #[inline]
    pub fn run_lowpass(&mut self, input: [f64; 2]) -> [f64; 2] {
        let k = &self.coeffs;
        let mut out = [0.0; 2];
        for (i, &x) in input.iter().enumerate() {
            let y = self.state[i] * k.g + x * k.cg;
            self.state[i] += k.c2 * (x - y);
            out[i] = y;
        }
        out
    }

    /// High-pass one stereo frame (input minus low-pass)
    #[inline]
    pub fn run_highpass(&mut self, input: [f64; 2]) -> [f64; 2] {
        let low = self.run_lowpass(input);
        [input[0] - low[0], input[1] - low[1]]
    }

    /// Clear history
    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }
}

/// Coefficients of the two-pole LED stage
///
/// This is not a textbook biquad. The feedback path is shaped by a sigmoid
/// so resonance stays bounded, which gives the LED filter its character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedCoefficients {
    c: f64,
    c2: f64,
    g: f64,
    cg: f64,
    bg: f64,
}

#[inline]
fn sigmoid(x: f64, k: f64) -> f64 {
    x / (x + k) * (k + 1.0)
}

impl LedCoefficients {
    /// Compute coefficients for `cutoff_hz` with feedback amount `feedback`
    pub fn new(sample_rate: f64, cutoff_hz: f64, feedback: f64) -> Self {
        let c = prewarp(sample_rate, cutoff_hz).min(LED_MAX_COEFF);
        let g = 1.0 / (1.0 + c);

        let s = 0.5;
        let t = 0.5;
        let ic = if c > t {
            1.0 / ((1.0 - s * t) + s * c)
        } else {
            1.0
        };
        let cg = c * g;
        let fbg = 1.0 / (1.0 + feedback * cg * cg);
        let shaped = 2.0 * sigmoid(feedback, 0.5);

        LedCoefficients {
            c,
            c2: c * 2.0,
            g,
            cg,
            bg: fbg * shaped * ic,
        }
    }
}

/// Stereo two-pole LED filter
#[derive(Debug, Clone, Copy)]
pub struct LedFilter {
    coeffs: LedCoefficients,
    state: [f64; 4],
}

impl LedFilter {
    /// Create a filter with cleared history
    pub fn new(coeffs: LedCoefficients) -> Self {
        LedFilter {
            coeffs,
            state: [0.0; 4],
        }
    }

    /// Replace coefficients, keeping history
    pub fn set_coefficients(&mut self, coeffs: LedCoefficients) {
        self.coeffs = coeffs;
    }

    /// Filter one stereo frame
    #[inline]
    pub fn run(&mut self, input: [f64; 2]) -> [f64; 2] {
        let k = &self.coeffs;
        let in1 = DENORMAL_OFFSET;
        let in2 = DENORMAL_OFFSET;
        let mut out = [0.0; 2];

        for (ch, &x) in input.iter().enumerate() {
            let (v0, v1) = (self.state[ch * 2], self.state[ch * 2 + 1]);

            let estimate = in2 + k.g * (v1 + k.c * (in1 + k.g * (v0 + k.c * x)));
            let y0 = v0 * k.g + x * k.cg + in1 + estimate * k.bg;
            let y1 = v1 * k.g + y0 * k.cg + in2;

            self.state[ch * 2] = v0 + k.c2 * (x - y0);
            self.state[ch * 2 + 1] = v1 + k.c2 * (y0 - y1);
            out[ch] = y1;
        }
        out
    }

    /// Clear history
    pub fn reset(&mut self) {
        self.state = [0.0; 4];
    }
}

/// The complete output filter chain of one Amiga model
#[derive(Debug, Clone)]
pub struct FilterBank {
    model: AmigaModel,
    sample_rate: f64,
    led_enabled: bool,
    lowpass: RcFilter,
    led: LedFilter,
    highpass: RcFilter,
}

impl FilterBank {
    /// Build the chain for `model` at `sample_rate`
    pub fn new(sample_rate: f64, model: AmigaModel) -> Self {
        let (lp, led, hp) = Self::coefficients(sample_rate, model);
        FilterBank {
            model,
            sample_rate,
            led_enabled: false,
            lowpass: RcFilter::new(lp),
            led: LedFilter::new(led),
            highpass: RcFilter::new(hp),
        }
    }

    fn coefficients(
        sample_rate: f64,
        model: AmigaModel,
    ) -> (RcCoefficients, LedCoefficients, RcCoefficients) {
        let lp_cutoff = model.lowpass_cutoff().unwrap_or(sample_rate / 2.0);
        let (led_cutoff, led_q) = led_cutoff_and_q();
        (
            RcCoefficients::new(sample_rate, lp_cutoff),
            LedCoefficients::new(sample_rate, led_cutoff, led_q),
            RcCoefficients::new(sample_rate, model.highpass_cutoff()),
        )
    }

    fn recompute(&mut self) {
        let (lp, led, hp) = Self::coefficients(self.sample_rate, self.model);
        self.lowpass.set_coefficients(lp);
        self.led.set_coefficients(led);
        self.highpass.set_coefficients(hp);
    }

    /// Emulated model
    pub fn model(&self) -> AmigaModel {
        self.model
    }

    /// Switch model; recomputes coefficients and clears history
    pub fn set_model(&mut self, model: AmigaModel) {
        if model == self.model {
            return;
        }
        self.model = model;
        self.recompute();
        self.reset();
    }

    /// Change output rate; recomputes coefficients and clears history
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.recompute();
        self.reset();
    }

    /// LED filter switch state
    pub fn led_enabled(&self) -> bool {
        self.led_enabled
    }

    /// Toggle the LED stage. Turning it on starts from clean history.
    pub fn set_led_enabled(&mut self, enabled: bool) {
        if enabled == self.led_enabled {
            return;
        }
        self.led_enabled = enabled;
        if enabled {
            self.led.reset();
        }
    }

    /// Run one stereo frame through the whole chain
    #[inline]
    pub fn process(&mut self, input: [f64; 2]) -> [f64; 2] {
        let mut out = input;
        if self.model == AmigaModel::A500 {
            out = self.lowpass.run_lowpass(out);
        }
        if self.led_enabled {
            out = self.led.run(out);
        }
        self.highpass.run_highpass(out)
    }

    /// Clear all filter history
    pub fn reset(&mut self) {
        self.lowpass.reset();
        self.led.reset();
        self.highpass.reset();
    }
}
