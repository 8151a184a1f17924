//! In-memory ProTracker module
//!
//! Pattern, order list and sample storage in the layout the replayer and
//! Paula expect. Loading from disk is left to callers; this type only offers a
//! validated editing API.
//!
//! Sample memory is one contiguous buffer with a fixed slot per sample plus
//! two spare slots. The first spare (`RESERVED_SAMPLE_OFFSET`) is an all-zero
//! dummy sample voices fall back to; the second is padding so reads slightly
//! past a sample's end stay inside the buffer.

use crate::{Pt2Error, Result};

/// Rows per pattern
pub const MOD_ROWS: usize = 64;
/// Entries in the order list
pub const MOD_ORDERS: usize = 128;
/// Sample slots
pub const MOD_SAMPLES: usize = 31;
/// Highest pattern count a PT module can address
pub const MAX_PATTERNS: usize = 100;
/// Channels per row
pub const MOD_CHANNELS: usize = 4;
/// Largest sample, in bytes
pub const MAX_SAMPLE_LEN: usize = 0x1FFFE;
/// Byte offset of the reserved zero sample
pub const RESERVED_SAMPLE_OFFSET: usize = MOD_SAMPLES * MAX_SAMPLE_LEN;
/// Total sample memory (31 samples + reserved + padding)
pub const SAMPLE_DATA_LEN: usize = (MOD_SAMPLES + 2) * MAX_SAMPLE_LEN;

/// One pattern cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Note {
    /// Amiga period (0 = no note)
    pub period: u16,
    /// Sample number 1..=31 (0 = none)
    pub sample: u8,
    /// Effect nibble 0x0..=0xF
    pub command: u8,
    /// Effect parameter
    pub param: u8,
}

impl Note {
    /// Note with period and sample, no effect
    pub fn new(period: u16, sample: u8) -> Self {
        Note {
            period,
            sample,
            command: 0,
            param: 0,
        }
    }

    /// Effect-only cell
    pub fn effect(command: u8, param: u8) -> Self {
        Note {
            period: 0,
            sample: 0,
            command: command & 0x0F,
            param,
        }
    }

    /// Same cell with an effect attached
    pub fn with_effect(mut self, command: u8, param: u8) -> Self {
        self.command = command & 0x0F;
        self.param = param;
        self
    }

    /// 12-bit effect word as stored in channel state (`0xCPP`)
    pub fn command_word(&self) -> u16 {
        ((self.command as u16 & 0x0F) << 8) | self.param as u16
    }
}

/// 64 rows of four notes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    rows: Vec<[Note; MOD_CHANNELS]>,
}

impl Pattern {
    /// Empty pattern
    pub fn new() -> Self {
        Pattern {
            rows: vec![[Note::default(); MOD_CHANNELS]; MOD_ROWS],
        }
    }

    /// Cell at `row`/`channel`
    pub fn note(&self, row: usize, channel: usize) -> Note {
        self.rows
            .get(row)
            .and_then(|r| r.get(channel))
            .copied()
            .unwrap_or_default()
    }

    /// All four cells of `row`
    pub fn row(&self, row: usize) -> [Note; MOD_CHANNELS] {
        self.rows.get(row).copied().unwrap_or_default()
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample header (all sizes in bytes)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleInfo {
    /// Sample name
    pub name: String,
    /// Length in bytes (even)
    pub length: u32,
    /// Loop start in bytes (even)
    pub loop_start: u32,
    /// Loop length in bytes (2 = no loop)
    pub loop_length: u32,
    /// Default volume 0..=64
    pub volume: u8,
    /// Finetune nibble (0..=7, 8..=15 for -8..=-1)
    pub fine_tune: u8,
}

impl SampleInfo {
    /// Offset of sample slot `index` (0-based) in sample memory
    pub fn slot_offset(index: usize) -> usize {
        index * MAX_SAMPLE_LEN
    }
}

/// A complete module: orders, patterns, sample headers and sample memory
#[derive(Debug, Clone)]
pub struct Module {
    /// Song title
    pub title: String,
    orders: [u8; MOD_ORDERS],
    song_length: u8,
    patterns: Vec<Pattern>,
    samples: Vec<SampleInfo>,
    sample_data: Vec<i8>,
    /// Speed the replayer starts with
    pub initial_speed: u8,
    /// Tempo the replayer starts with
    pub initial_bpm: u8,
}

impl Module {
    /// One empty pattern, song length 1, silent samples
    pub fn new() -> Self {
        Module {
            title: String::new(),
            orders: [0; MOD_ORDERS],
            song_length: 1,
            patterns: vec![Pattern::new()],
            samples: vec![
                SampleInfo {
                    loop_length: 2,
                    ..SampleInfo::default()
                };
                MOD_SAMPLES
            ],
            sample_data: vec![0; SAMPLE_DATA_LEN],
            initial_speed: 6,
            initial_bpm: 125,
        }
    }

    /// Number of orders played
    pub fn song_length(&self) -> u8 {
        self.song_length
    }

    /// Pattern number at order `pos`
    pub fn order(&self, pos: usize) -> u8 {
        self.orders.get(pos).copied().unwrap_or(0)
    }

    /// Order list
    pub fn orders(&self) -> &[u8; MOD_ORDERS] {
        &self.orders
    }

    /// Number of stored patterns
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Pattern by number
    pub fn pattern(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)
    }

    /// Sample header, 0-based
    pub fn sample(&self, index: usize) -> Option<&SampleInfo> {
        self.samples.get(index)
    }

    /// Whole sample memory
    pub fn sample_data(&self) -> &[i8] {
        &self.sample_data
    }

    /// Whole sample memory, mutable (effects like EFx write into it)
    pub fn sample_data_mut(&mut self) -> &mut [i8] {
        &mut self.sample_data
    }

    /// Bytes of sample `index` (0-based), trimmed to its length
    pub fn sample_bytes(&self, index: usize) -> &[i8] {
        match self.samples.get(index) {
            Some(info) => {
                let start = SampleInfo::slot_offset(index);
                &self.sample_data[start..start + info.length as usize]
            }
            None => &[],
        }
    }

    /// Append an empty pattern and return its number
    pub fn add_pattern(&mut self) -> Result<usize> {
        if self.patterns.len() >= MAX_PATTERNS {
            return Err(Pt2Error::InvalidModule(format!(
                "pattern limit of {} reached",
                MAX_PATTERNS
            )));
        }
        self.patterns.push(Pattern::new());
        Ok(self.patterns.len() - 1)
    }

    /// Write one cell
    pub fn set_note(&mut self, pattern: usize, row: usize, channel: usize, note: Note) -> Result<()> {
        if row >= MOD_ROWS || channel >= MOD_CHANNELS {
            return Err(Pt2Error::InvalidModule(format!(
                "cell {}:{} out of range",
                row, channel
            )));
        }
        if note.sample as usize > MOD_SAMPLES {
            return Err(Pt2Error::InvalidModule(format!(
                "sample number {} out of range",
                note.sample
            )));
        }
        let pat = self
            .patterns
            .get_mut(pattern)
            .ok_or_else(|| Pt2Error::InvalidModule(format!("no pattern {}", pattern)))?;
        pat.rows[row][channel] = Note {
            command: note.command & 0x0F,
            ..note
        };
        Ok(())
    }

    /// Point order `pos` at `pattern`
    pub fn set_order(&mut self, pos: usize, pattern: u8) -> Result<()> {
        if pos >= MOD_ORDERS {
            return Err(Pt2Error::InvalidModule(format!("order {} out of range", pos)));
        }
        if pattern as usize >= self.patterns.len() {
            return Err(Pt2Error::InvalidModule(format!("no pattern {}", pattern)));
        }
        self.orders[pos] = pattern;
        Ok(())
    }

    /// Set the number of played orders (1..=128)
    pub fn set_song_length(&mut self, length: u8) -> Result<()> {
        if length == 0 || length as usize > MOD_ORDERS {
            return Err(Pt2Error::InvalidModule(format!(
                "song length {} out of range",
                length
            )));
        }
        self.song_length = length;
        Ok(())
    }

    /// Store sample `index` (0-based) with its loop and defaults.
    ///
    /// Odd lengths are rounded down to whole words. A loop length below two
    /// bytes means "no loop"; such samples get their first word cleared,
    /// since that word is what Paula repeats after the single pass.
    pub fn set_sample(
        &mut self,
        index: usize,
        data: &[i8],
        loop_start: u32,
        loop_length: u32,
        volume: u8,
        fine_tune: u8,
    ) -> Result<()> {
        if index >= MOD_SAMPLES {
            return Err(Pt2Error::InvalidModule(format!(
                "sample slot {} out of range",
                index
            )));
        }
        if data.len() > MAX_SAMPLE_LEN {
            return Err(Pt2Error::InvalidModule(format!(
                "sample of {} bytes exceeds {} bytes",
                data.len(),
                MAX_SAMPLE_LEN
            )));
        }

        let length = (data.len() & !1) as u32;
        let loop_start = loop_start & !1;
        let mut loop_length = loop_length & !1;
        if loop_length < 2 {
            loop_length = 2;
        }
        if loop_length > 2 && loop_start + loop_length > length {
            return Err(Pt2Error::InvalidModule(format!(
                "loop {}+{} runs past sample end {}",
                loop_start, loop_length, length
            )));
        }

        let start = SampleInfo::slot_offset(index);
        let slot = &mut self.sample_data[start..start + MAX_SAMPLE_LEN];
        slot.fill(0);
        slot[..length as usize].copy_from_slice(&data[..length as usize]);
        // one-shot samples idle on their first word once played: keep it silent
        if loop_length <= 2 {
            slot[..2].fill(0);
        }

        let info = &mut self.samples[index];
        info.length = length;
        info.loop_start = if loop_length > 2 { loop_start } else { 0 };
        info.loop_length = loop_length;
        info.volume = volume.min(64);
        info.fine_tune = fine_tune & 0x0F;
        Ok(())
    }

    /// Check that every played order points at a stored pattern
    pub fn validate(&self) -> Result<()> {
        if self.song_length == 0 || self.song_length as usize > MOD_ORDERS {
            return Err(Pt2Error::InvalidModule(format!(
                "song length {} out of range",
                self.song_length
            )));
        }
        for pos in 0..self.song_length as usize {
            let pattern = self.orders[pos] as usize;
            if pattern >= self.patterns.len() {
                return Err(Pt2Error::InvalidModule(format!(
                    "order {} references missing pattern {}",
                    pos, pattern
                )));
            }
        }
        Ok(())
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_module_layout() {
        let module = Module::new();
        assert_eq!(module.sample_data().len(), SAMPLE_DATA_LEN);
        assert_eq!(module.pattern_count(), 1);
        assert_eq!(module.song_length(), 1);
        assert!(module.validate().is_ok());
        assert!(module.sample_data()[RESERVED_SAMPLE_OFFSET..]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_set_sample_rounds_to_words() {
        let mut module = Module::new();
        let data = vec![5i8; 101];
        module.set_sample(2, &data, 0, 0, 80, 0x1F).expect("valid sample");
        let info = module.sample(2).expect("slot exists");
        assert_eq!(info.length, 100);
        assert_eq!(info.loop_length, 2);
        assert_eq!(info.volume, 64);
        assert_eq!(info.fine_tune, 0x0F);
        assert_eq!(module.sample_bytes(2).len(), 100);
        assert_eq!(module.sample_data()[SampleInfo::slot_offset(2) + 100], 0);
    }

    #[test]
    fn test_one_shot_clears_first_word() {
        let mut module = Module::new();
        module.set_sample(0, &[100; 64], 0, 0, 64, 0).expect("valid sample");
        assert_eq!(&module.sample_bytes(0)[..4], &[0, 0, 100, 100]);

        module.set_sample(1, &[100; 64], 0, 64, 64, 0).expect("valid sample");
        assert_eq!(module.sample_bytes(1)[0], 100, "looped samples are stored as given");
    }

    #[test]
    fn test_rejects_bad_loop() {
        let mut module = Module::new();
        let err = module.set_sample(0, &[1; 64], 32, 64, 64, 0);
        assert!(matches!(err, Err(Pt2Error::InvalidModule(_))));
    }

    #[test]
    fn test_note_and_order_bounds() {
        let mut module = Module::new();
        assert!(module.set_note(0, 64, 0, Note::default()).is_err());
        assert!(module.set_note(1, 0, 0, Note::default()).is_err());
        assert!(module.set_order(0, 3).is_err());
        let p = module.add_pattern().expect("room for patterns");
        assert_eq!(p, 1);
        module.set_order(1, 1).expect("pattern exists");
        module.set_song_length(2).expect("valid length");
        assert!(module.validate().is_ok());
        assert!(module.set_song_length(0).is_err());
    }

    #[test]
    fn test_command_word() {
        let note = Note::new(428, 1).with_effect(0xC, 0x20);
        assert_eq!(note.command_word(), 0xC20);
    }
}
