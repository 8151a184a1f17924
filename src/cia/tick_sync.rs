//! Tick boundary tracking
//!
//! Counts output samples down to the next CIA interrupt. The engine asks how
//! many samples it may mix before the replayer has to run again and reloads
//! the counter from the BPM table after each tick.

/// Samples-until-next-tick counter
#[derive(Debug, Clone, Default)]
pub struct TickSync {
    /// Samples left before the next interrupt fires
    samples_left: u32,
    /// Interrupts fired since reset
    tick_count: u64,
    /// Samples consumed since reset
    sample_count: u64,
}

impl TickSync {
    /// Counter that fires on the very first request
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the replayer must run before more samples are mixed
    pub fn tick_due(&self) -> bool {
        self.samples_left == 0
    }

    /// Start a new tick lasting `samples_per_tick` samples
    pub fn reload(&mut self, samples_per_tick: u32) {
        self.samples_left = samples_per_tick.max(1);
        self.tick_count += 1;
    }

    /// How many of `wanted` samples fit before the next tick
    pub fn chunk(&self, wanted: usize) -> usize {
        wanted.min(self.samples_left as usize)
    }

    /// Mark `samples` as mixed
    pub fn consume(&mut self, samples: usize) {
        let samples = samples.min(self.samples_left as usize);
        self.samples_left -= samples as u32;
        self.sample_count += samples as u64;
    }

    /// Samples left in the current tick
    pub fn samples_left(&self) -> u32 {
        self.samples_left
    }

    /// Ticks started since reset
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Samples mixed since reset
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Elapsed time at `output_rate`
    pub fn elapsed_seconds(&self, output_rate: u32) -> f64 {
        self.sample_count as f64 / output_rate.max(1) as f64
    }

    /// Restart so the next request fires a tick immediately
    pub fn reset(&mut self) {
        *self = TickSync::new();
    }
}
