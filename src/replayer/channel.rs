//! Per-channel replayer state
//!
//! Field names follow the classic `n_*` channel block layout; the replayer
//! mutates these every tick and mirrors the relevant values into Paula.

use crate::paula::DmaBits;

/// Runtime state of one replayer channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    /// Voice this channel drives
    pub index: usize,
    /// DMACON bit of the voice
    pub dma_bit: DmaBits,
    /// Period of the current cell (0 = none)
    pub note: u16,
    /// Effect word of the current cell (`0xCPP`)
    pub cmd: u16,
    /// Sample start (byte offset into sample memory)
    pub start: usize,
    /// Sample length in words
    pub length: u16,
    /// Loop start (byte offset)
    pub loop_start: usize,
    /// Loop length in words
    pub replen: u16,
    /// EFx write cursor (byte offset)
    pub wave_start: usize,
    /// Current period
    pub period: u16,
    /// Tone portamento target (0 = reached)
    pub wanted_period: i16,
    /// Tone portamento speed
    pub tone_port_speed: u8,
    /// Tone portamento direction (1 = towards lower periods)
    pub tone_port_direction: u8,
    /// Finetune nibble
    pub fine_tune: u8,
    /// Volume 0..=64
    pub volume: i8,
    /// Vibrato speed/depth memory
    pub vibrato_cmd: u8,
    /// Vibrato table position
    pub vibrato_pos: u8,
    /// Tremolo speed/depth memory
    pub tremolo_cmd: u8,
    /// Tremolo table position
    pub tremolo_pos: u8,
    /// Low nibble vibrato waveform, high nibble tremolo waveform
    pub wave_control: u8,
    /// Low nibble glissando, high nibble funk speed
    pub gliss_funk: u8,
    /// EFx accumulator
    pub funk_offset: u8,
    /// 9xx memory
    pub sample_offset: u8,
    /// E6x loop row
    pub loop_row: u8,
    /// E6x loop counter
    pub loop_count: u8,
    /// Last sample number played (0-based)
    pub sample_num: u8,
}

impl ChannelState {
    /// Cleared channel for voice `index`, pointed at `reserved` sample memory
    pub fn new(index: usize, reserved: usize) -> Self {
        ChannelState {
            index,
            dma_bit: DmaBits::voice(index),
            note: 0,
            cmd: 0,
            start: reserved,
            length: 1,
            loop_start: reserved,
            replen: 1,
            wave_start: reserved,
            period: 0,
            wanted_period: 0,
            tone_port_speed: 0,
            tone_port_direction: 0,
            fine_tune: 0,
            volume: 0,
            vibrato_cmd: 0,
            vibrato_pos: 0,
            tremolo_cmd: 0,
            tremolo_pos: 0,
            wave_control: 0,
            gliss_funk: 0,
            funk_offset: 0,
            sample_offset: 0,
            loop_row: 0,
            loop_count: 0,
            sample_num: 0,
        }
    }

    /// Effect nibble of the current cell
    #[inline]
    pub fn effect(&self) -> u8 {
        ((self.cmd >> 8) & 0x0F) as u8
    }

    /// Parameter byte of the current cell
    #[inline]
    pub fn param(&self) -> u8 {
        (self.cmd & 0xFF) as u8
    }

    /// True when the cell carries a note
    #[inline]
    pub fn has_note(&self) -> bool {
        self.note & 0x0FFF != 0
    }
}
