//! Real-time audio output
//!
//! [`EngineSource`] pulls interleaved stereo from a shared engine in batches,
//! taking the audio lock once per batch. [`AudioDevice`] plays it on the
//! default output device through rodio.

mod audio_device;

pub use audio_device::{AudioDevice, EngineSource};

/// Samples (not frames) pulled from the engine per lock
pub const SOURCE_BATCH_SAMPLES: usize = 2048;
