//! ProTracker 2.3D replayer with Amiga Paula emulation
//!
//! A four-voice Paula model with BLEP-corrected sample and volume steps, the
//! A500/A1200 analog output stage (RC low-pass, LED Sallen-Key, RC high-pass),
//! TPDF dither, the PT2.3D effect interpreter and the CIA tempo clock.
//!
//! # Features
//! - Paula voice registers with DMA latching and period/volume quirks
//! - BLEP synthesis for sample and volume discontinuities
//! - A500/A1200 filter models and the LED filter toggle
//! - Complete PT2.3D effect set including EFx, E6x and EEx interactions
//! - CIA tempo latch: Fxx tempo changes land on the next interrupt
//! - Offline WAV and pattern-to-sample rendering
//! - Optional real-time output through rodio
//!
//! # Crate feature flags
//! - `export-wav` (default): offline renderers in [`export`] (uses `hound`)
//! - `streaming` (opt-in): real-time audio output (enables optional `rodio` dep)
//!
//! # Quick start
//! ```no_run
//! use pt2_paula::{AudioEngine, EngineConfig, Module, Note, PlayMode};
//!
//! let mut module = Module::new();
//! let square: Vec<i8> = (0..64).map(|i| if i < 32 { 100 } else { -100 }).collect();
//! module.set_sample(0, &square, 0, 64, 64, 0)?;
//! module.set_note(0, 0, 0, Note::new(428, 1))?;
//!
//! let engine = AudioEngine::new(EngineConfig::default())?;
//! let mut audio = engine.lock_audio();
//! audio.load_module(module)?;
//! audio.mod_play(PlayMode::Song, 0, 0);
//!
//! let mut frames = vec![0i16; 882 * 2];
//! audio.output_audio(&mut frames);
//! # Ok::<(), pt2_paula::Pt2Error>(())
//! ```

#![warn(missing_docs)]

pub mod cia; // CIA tempo clock
pub mod config; // Engine configuration
pub mod engine; // Audio lock and output entry point
pub mod mixer; // Voice mixing and output stage
pub mod module; // In-memory module
pub mod paula; // Paula emulation
pub mod replayer; // PT2.3D replay routine

#[cfg(feature = "export-wav")]
pub mod export; // Offline renderers
#[cfg(feature = "streaming")]
pub mod streaming; // Audio output

/// Error types for replayer and engine operations
#[derive(thiserror::Error, Debug)]
pub enum Pt2Error {
    /// Invalid engine or export configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Module data rejected by the editing API
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Pt2Error {
    /// Converts a String into `Pt2Error::Other`.
    ///
    /// Convenient for ad-hoc messages; prefer a specific variant where the
    /// caller may want to tell failures apart.
    fn from(msg: String) -> Self {
        Pt2Error::Other(msg)
    }
}

impl From<&str> for Pt2Error {
    /// Converts a string slice into `Pt2Error::Other`.
    fn from(msg: &str) -> Self {
        Pt2Error::Other(msg.to_string())
    }
}

/// Result type for replayer operations
pub type Result<T> = std::result::Result<T, Pt2Error>;

// Public API exports
pub use cia::{BpmTable, CiaTimer, TickSync};
pub use config::EngineConfig;
pub use engine::{AudioEngine, EngineState, Quality, RenderMode};
pub use mixer::Mixer;
pub use module::{Module, Note, Pattern, SampleInfo};
pub use paula::{AmigaModel, Paula, ScopeReading, ScopeTap};
pub use replayer::{PlayMode, PlaybackPosition, PlaybackState, Replayer};

#[cfg(feature = "export-wav")]
pub use export::{
    render_pattern_to_sample, render_to_vec, render_to_wav, ExportConfig, RenderSummary,
    RenderedSample, StopReason,
};
#[cfg(feature = "streaming")]
pub use streaming::{AudioDevice, EngineSource};
