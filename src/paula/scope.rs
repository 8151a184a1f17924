//! Lock-free voice state for visualizers
//!
//! The mixer publishes each voice's DMA state after every mixed chunk. Readers
//! (oscilloscopes, meters) poll these atomics from any thread without taking
//! the audio lock. Values are informational and may lag by one chunk.

use super::PAULA_VOICES;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

#[derive(Debug, Default)]
struct ScopeVoice {
    active: AtomicBool,
    data: AtomicU32,
    pos: AtomicU32,
    volume: AtomicU8,
}

/// Snapshot of one voice as seen by the scope tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeReading {
    /// Byte offset of the sample being played inside module sample memory
    pub data_offset: usize,
    /// Read position inside that sample
    pub position: usize,
    /// Paula volume (0..=64)
    pub volume: u8,
}

/// Shared, non-blocking view of the four voices
#[derive(Debug, Default)]
pub struct ScopeTap {
    voices: [ScopeVoice; PAULA_VOICES],
}

impl ScopeTap {
    /// Create an empty tap
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, ch: usize, active: bool, data: usize, pos: usize, volume: u8) {
        let v = &self.voices[ch];
        v.data.store(data as u32, Ordering::Relaxed);
        v.pos.store(pos as u32, Ordering::Relaxed);
        v.volume.store(volume, Ordering::Relaxed);
        v.active.store(active, Ordering::Release);
    }

    /// Current read position of `ch`, or `None` when the voice is idle
    pub fn reading(&self, ch: usize) -> Option<ScopeReading> {
        let v = self.voices.get(ch)?;
        if !v.active.load(Ordering::Acquire) {
            return None;
        }
        Some(ScopeReading {
            data_offset: v.data.load(Ordering::Relaxed) as usize,
            position: v.pos.load(Ordering::Relaxed) as usize,
            volume: v.volume.load(Ordering::Relaxed),
        })
    }

    pub(crate) fn clear(&self) {
        for ch in 0..PAULA_VOICES {
            self.publish(ch, false, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_voice_reads_none() {
        let tap = ScopeTap::new();
        assert_eq!(tap.reading(0), None);
        assert_eq!(tap.reading(7), None, "out-of-range channel must not panic");
    }

    #[test]
    fn test_publish_and_clear() {
        let tap = ScopeTap::new();
        tap.publish(2, true, 0x1FFFE, 17, 48);
        assert_eq!(
            tap.reading(2),
            Some(ScopeReading {
                data_offset: 0x1FFFE,
                position: 17,
                volume: 48
            })
        );
        tap.clear();
        assert_eq!(tap.reading(2), None);
    }
}
