//! CIA timer tempo clock
//!
//! ProTracker drives its replay routine from CIA-B timer A. The timer period
//! for a tempo is `1773447 / bpm` (truncated), and the CIA ticks at
//! `PAULA_PAL_CLK / 5`. From that we derive how many output samples make up
//! one replayer tick, once per BPM at start-up.
//!
//! The CIA latches a new period and only reloads it on the following
//! interrupt, so a tempo change requested during a tick takes effect one tick
//! later. [`CiaTimer`] models that latch.

pub mod tick_sync;

pub use tick_sync::TickSync;

use crate::paula::PAULA_PAL_CLK;

/// CIA clock on a PAL machine
pub const CIA_PAL_CLK: f64 = PAULA_PAL_CLK / 5.0;
/// `CIA_PAL_CLK * 2.5`, the numerator ProTracker divides by BPM
pub const CIA_BPM_NUMERATOR: u32 = 1_773_447;
/// Lowest settable tempo
pub const MIN_BPM: u8 = 32;
/// Highest settable tempo
pub const MAX_BPM: u8 = 255;
/// Default tempo
pub const DEFAULT_BPM: u8 = 125;

const TABLE_LEN: usize = (MAX_BPM - MIN_BPM) as usize + 1;

/// CIA timer period for `bpm` (integer truncation is intentional)
pub fn cia_period(bpm: u8) -> u32 {
    CIA_BPM_NUMERATOR / bpm.max(1) as u32
}

/// Samples per replayer tick for `bpm` at `output_rate` Hz
pub fn bpm_to_samples_per_tick(bpm: u8, output_rate: u32) -> u32 {
    let tick_hz = CIA_PAL_CLK / cia_period(bpm) as f64;
    (output_rate as f64 / tick_hz).round() as u32
}

/// Precomputed samples-per-tick for every BPM in 32..=255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpmTable {
    output_rate: u32,
    samples_per_tick: [u32; TABLE_LEN],
}

impl BpmTable {
    /// Build the table for `output_rate` Hz
    pub fn new(output_rate: u32) -> Self {
        let mut samples_per_tick = [0u32; TABLE_LEN];
        for (i, slot) in samples_per_tick.iter_mut().enumerate() {
            *slot = bpm_to_samples_per_tick(MIN_BPM + i as u8, output_rate);
        }
        BpmTable {
            output_rate,
            samples_per_tick,
        }
    }

    /// Rate the table was built for
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Samples per tick at `bpm` (clamped to the table range)
    pub fn samples_per_tick(&self, bpm: u8) -> u32 {
        let bpm = bpm.max(MIN_BPM);
        self.samples_per_tick[(bpm - MIN_BPM) as usize]
    }
}

/// Tempo register of the CIA with its reload latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiaTimer {
    bpm: u8,
    pending: Option<u8>,
}

impl CiaTimer {
    /// Timer at `bpm`
    pub fn new(bpm: u8) -> Self {
        CiaTimer {
            bpm: bpm.max(MIN_BPM),
            pending: None,
        }
    }

    /// Tempo currently driving the interrupt
    pub fn bpm(&self) -> u8 {
        self.bpm
    }

    /// Tempo waiting for the next interrupt
    pub fn pending(&self) -> Option<u8> {
        self.pending
    }

    /// Change tempo immediately. Values below 32 are ignored.
    pub fn set_bpm(&mut self, bpm: u8) {
        if bpm >= MIN_BPM {
            self.bpm = bpm;
            self.pending = None;
        }
    }

    /// Latch a tempo that is loaded on the next interrupt.
    pub fn latch_bpm(&mut self, bpm: u8) {
        if bpm >= MIN_BPM {
            self.pending = Some(bpm);
        }
    }

    /// Called at the start of every interrupt: reload a latched tempo.
    /// Returns true if the tempo changed.
    pub fn reload(&mut self) -> bool {
        match self.pending.take() {
            Some(bpm) => {
                self.bpm = bpm;
                true
            }
            None => false,
        }
    }
}

impl Default for CiaTimer {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}
