//! Engine configuration
//!
//! Everything the setup layer chooses once and the audio core derives its
//! tables and coefficients from. Serializable so a front end can persist it.

use crate::paula::{AmigaModel, DEFAULT_STEREO_SEPARATION};
use crate::{Pt2Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Accepted output rates
pub const OUTPUT_RATE_RANGE: RangeInclusive<u32> = 8_000..=192_000;
/// Default output rate
pub const DEFAULT_OUTPUT_RATE: u32 = 44_100;

/// Settings of an [`EngineState`](crate::engine::EngineState)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub output_rate: u32,
    /// Stereo separation in percent (0 = mono, 100 = hard LRRL)
    pub stereo_separation: u8,
    /// Emulated output stage
    pub amiga_model: AmigaModel,
    /// LED filter state at startup
    pub led_filter: bool,
    /// TPDF dither on the 16-bit output
    pub dither: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            output_rate: DEFAULT_OUTPUT_RATE,
            stereo_separation: DEFAULT_STEREO_SEPARATION,
            amiga_model: AmigaModel::A500,
            led_filter: false,
            dither: true,
        }
    }
}

impl EngineConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if !OUTPUT_RATE_RANGE.contains(&self.output_rate) {
            return Err(Pt2Error::InvalidConfig(format!(
                "output rate {} Hz outside {}..={} Hz",
                self.output_rate,
                OUTPUT_RATE_RANGE.start(),
                OUTPUT_RATE_RANGE.end()
            )));
        }
        if self.stereo_separation > 100 {
            return Err(Pt2Error::InvalidConfig(format!(
                "stereo separation {}% above 100%",
                self.stereo_separation
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the output rate
    pub fn with_output_rate(mut self, output_rate: u32) -> Self {
        self.output_rate = output_rate;
        self
    }

    /// Set the stereo separation
    pub fn with_stereo_separation(mut self, percent: u8) -> Self {
        self.stereo_separation = percent;
        self
    }

    /// Set the Amiga model
    pub fn with_amiga_model(mut self, model: AmigaModel) -> Self {
        self.amiga_model = model;
        self
    }

    /// Set the initial LED filter state
    pub fn with_led_filter(mut self, enabled: bool) -> Self {
        self.led_filter = enabled;
        self
    }

    /// Enable or disable dither
    pub fn with_dither(mut self, enabled: bool) -> Self {
        self.dither = enabled;
        self
    }
}
