//! Effect interpreter
//!
//! `play_voice` handles a new row for one channel, `check_more_efx` runs the
//! tick-0 effects and `check_efx` runs the per-tick effects on the other ticks.
//! Register writes go straight to Paula through the [`TickContext`].

use super::tables::{finetune_row, FUNK_TABLE, PERIODS_PER_FINETUNE, VIBRATO_TABLE};
use super::{PlayMode, Replayer, TickContext};
use crate::module::{Module, Note, SampleInfo, MOD_SAMPLES, RESERVED_SAMPLE_OFFSET};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Main effect nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum Effect {
    /// 0xy
    Arpeggio = 0x0,
    /// 1xx
    PortaUp = 0x1,
    /// 2xx
    PortaDown = 0x2,
    /// 3xx
    TonePortamento = 0x3,
    /// 4xy
    Vibrato = 0x4,
    /// 5xy
    TonePortaVolSlide = 0x5,
    /// 6xy
    VibratoVolSlide = 0x6,
    /// 7xy
    Tremolo = 0x7,
    /// 8xx, ignored by the replayer
    Unused = 0x8,
    /// 9xx
    SampleOffset = 0x9,
    /// Axy
    VolumeSlide = 0xA,
    /// Bxx
    PositionJump = 0xB,
    /// Cxx
    SetVolume = 0xC,
    /// Dxy (decimal row)
    PatternBreak = 0xD,
    /// Exy
    Extended = 0xE,
    /// Fxx
    SetSpeed = 0xF,
}

/// Sub-command of Exy
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ExtendedEffect {
    /// E0x, LED filter (0 = on)
    Filter = 0x0,
    /// E1x
    FinePortaUp = 0x1,
    /// E2x
    FinePortaDown = 0x2,
    /// E3x
    Glissando = 0x3,
    /// E4x
    VibratoControl = 0x4,
    /// E5x
    SetFineTune = 0x5,
    /// E6x
    PatternLoop = 0x6,
    /// E7x
    TremoloControl = 0x7,
    /// E8x, ignored
    Karplus = 0x8,
    /// E9x
    Retrigger = 0x9,
    /// EAx
    FineVolumeUp = 0xA,
    /// EBx
    FineVolumeDown = 0xB,
    /// ECx
    NoteCut = 0xC,
    /// EDx
    NoteDelay = 0xD,
    /// EEx
    PatternDelay = 0xE,
    /// EFx
    InvertLoop = 0xF,
}

impl Effect {
    /// Decode the effect nibble of a `0xCPP` word
    pub fn from_command(cmd: u16) -> Option<Self> {
        Effect::from_u16((cmd >> 8) & 0x0F)
    }
}

impl ExtendedEffect {
    /// Decode the high parameter nibble of an Exy word
    pub fn from_param(param: u8) -> Option<Self> {
        ExtendedEffect::from_u8(param >> 4)
    }
}

/// First index of the finetune-0 row whose period is not above `period`
fn note_index(period: i32) -> usize {
    let base = finetune_row(0);
    (0..PERIODS_PER_FINETUNE)
        .find(|&i| period >= base[i] as i32)
        .unwrap_or(PERIODS_PER_FINETUNE - 1)
}

/// Like [`note_index`] on an arbitrary row, falling back to index 35
fn row_index_or_35(row: &[i16], period: i32) -> usize {
    (0..PERIODS_PER_FINETUNE)
        .find(|&i| period >= row[i] as i32)
        .unwrap_or(35)
}

impl Replayer {
    pub(super) fn play_voice(&mut self, ch: usize, note: Note, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];

        // an empty previous cell restores the period vibrato/arpeggio bent
        if c.note == 0 && c.cmd == 0 {
            ctx.paula.set_period(ch, c.period);
        }

        c.note = note.period & 0x0FFF;
        c.cmd = note.command_word();

        if (1..=MOD_SAMPLES as u8).contains(&note.sample) {
            let idx = note.sample as usize - 1;
            if let Some(info) = ctx.module.sample(idx) {
                c.sample_num = idx as u8;
                c.start = SampleInfo::slot_offset(idx);
                c.fine_tune = info.fine_tune & 0x0F;
                c.volume = info.volume.min(64) as i8;
                c.length = (info.length >> 1) as u16;
                c.replen = (info.loop_length >> 1) as u16;

                let repeat = (info.loop_start >> 1) as u16;
                if repeat > 0 {
                    c.loop_start = c.start + repeat as usize * 2;
                    c.wave_start = c.loop_start;
                    c.length = repeat.wrapping_add(c.replen);
                } else {
                    c.loop_start = c.start;
                    c.wave_start = c.start;
                }

                if c.length == 0 {
                    c.start = RESERVED_SAMPLE_OFFSET;
                    c.loop_start = RESERVED_SAMPLE_OFFSET;
                    c.wave_start = RESERVED_SAMPLE_OFFSET;
                }

                ctx.paula.set_volume(ch, c.volume as u16);
            }
        }

        if !c.has_note() {
            self.check_more_efx(ch, ctx);
            return;
        }

        if c.cmd & 0x0FF0 == 0x0E50 {
            c.fine_tune = c.param() & 0x0F;
            self.set_period(ch, ctx);
            return;
        }

        match Effect::from_command(c.cmd) {
            Some(Effect::TonePortamento) | Some(Effect::TonePortaVolSlide) => {
                self.set_tone_porta(ch);
                self.check_more_efx(ch, ctx);
            }
            Some(Effect::SampleOffset) => {
                self.check_more_efx(ch, ctx);
                self.set_period(ch, ctx);
            }
            _ => self.set_period(ch, ctx),
        }
    }

    /// Trigger the cell's note: look up its period for the channel finetune
    /// and restart the sample unless the note is delayed (EDx).
    fn set_period(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        let i = note_index(c.note as i32);
        c.period = finetune_row(c.fine_tune)[i] as u16;

        if c.cmd & 0x0FF0 != 0x0ED0 {
            if c.wave_control & 0x04 == 0 {
                c.vibrato_pos = 0;
            }
            if c.wave_control & 0x40 == 0 {
                c.tremolo_pos = 0;
            }

            ctx.paula.set_dmacon(c.dma_bit.bits());
            ctx.paula.set_data(ch, c.start);
            ctx.paula.set_length(ch, c.length);
            ctx.paula.set_period(ch, c.period);
            self.dmacon_temp |= c.dma_bit;
        }

        self.check_more_efx(ch, ctx);
    }

    /// Tick-0 effects
    fn check_more_efx(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        self.update_funk(ch, ctx.module);

        match Effect::from_command(self.channels[ch].cmd) {
            Some(Effect::SampleOffset) => self.sample_offset(ch),
            Some(Effect::PositionJump) => self.position_jump(ch),
            Some(Effect::PatternBreak) => self.pattern_break(ch),
            Some(Effect::Extended) => self.extended(ch, ctx),
            Some(Effect::SetSpeed) => self.set_speed_command(ch, ctx),
            Some(Effect::SetVolume) => self.volume_change(ch, ctx),
            _ => ctx.paula.set_period(ch, self.channels[ch].period),
        }
    }

    /// Effects on ticks 1..speed (and on repeated rows of a pattern delay)
    pub(super) fn check_efx(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        self.update_funk(ch, ctx.module);

        let cmd = self.channels[ch].cmd;
        if cmd & 0x0FFF == 0 {
            ctx.paula.set_period(ch, self.channels[ch].period);
            return;
        }

        match Effect::from_command(cmd) {
            Some(Effect::Arpeggio) => self.arpeggio(ch, ctx),
            Some(Effect::PortaUp) => self.porta_up(ch, ctx),
            Some(Effect::PortaDown) => self.porta_down(ch, ctx),
            Some(Effect::TonePortamento) => self.tone_portamento(ch, ctx),
            Some(Effect::Vibrato) => self.vibrato(ch, ctx),
            Some(Effect::TonePortaVolSlide) => {
                self.tone_port_no_change(ch, ctx);
                self.volume_slide(ch, ctx);
            }
            Some(Effect::VibratoVolSlide) => {
                self.vibrato_no_change(ch, ctx);
                self.volume_slide(ch, ctx);
            }
            Some(Effect::Extended) => self.extended(ch, ctx),
            Some(Effect::Tremolo) => {
                ctx.paula.set_period(ch, self.channels[ch].period);
                self.tremolo(ch, ctx);
            }
            Some(Effect::VolumeSlide) => {
                ctx.paula.set_period(ch, self.channels[ch].period);
                self.volume_slide(ch, ctx);
            }
            _ => ctx.paula.set_period(ch, self.channels[ch].period),
        }
    }

    fn extended(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let param = self.channels[ch].param();
        let Some(effect) = ExtendedEffect::from_param(param) else {
            return;
        };

        match effect {
            ExtendedEffect::Filter => ctx.filters.set_led_enabled(param & 1 == 0),
            ExtendedEffect::FinePortaUp => {
                if self.tick == 0 {
                    self.low_mask = 0x0F;
                    self.porta_up(ch, ctx);
                }
            }
            ExtendedEffect::FinePortaDown => {
                if self.tick == 0 {
                    self.low_mask = 0x0F;
                    self.porta_down(ch, ctx);
                }
            }
            ExtendedEffect::Glissando => {
                let c = &mut self.channels[ch];
                c.gliss_funk = (c.gliss_funk & 0xF0) | (param & 0x0F);
            }
            ExtendedEffect::VibratoControl => {
                let c = &mut self.channels[ch];
                c.wave_control = (c.wave_control & 0xF0) | (param & 0x0F);
            }
            ExtendedEffect::SetFineTune => self.channels[ch].fine_tune = param & 0x0F,
            ExtendedEffect::PatternLoop => self.jump_loop(ch),
            ExtendedEffect::TremoloControl => {
                let c = &mut self.channels[ch];
                c.wave_control = ((param & 0x0F) << 4) | (c.wave_control & 0x0F);
            }
            ExtendedEffect::Karplus => {}
            ExtendedEffect::Retrigger => self.retrigger_note(ch, ctx),
            ExtendedEffect::FineVolumeUp => {
                if self.tick == 0 {
                    let c = &mut self.channels[ch];
                    c.volume = (c.volume + (param & 0x0F) as i8).min(64);
                    ctx.paula.set_volume(ch, c.volume as u16);
                }
            }
            ExtendedEffect::FineVolumeDown => {
                if self.tick == 0 {
                    let c = &mut self.channels[ch];
                    c.volume = (c.volume - (param & 0x0F) as i8).max(0);
                    ctx.paula.set_volume(ch, c.volume as u16);
                }
            }
            ExtendedEffect::NoteCut => {
                if self.tick == param & 0x0F {
                    self.channels[ch].volume = 0;
                    ctx.paula.set_volume(ch, 0);
                }
            }
            ExtendedEffect::NoteDelay => {
                if self.tick == param & 0x0F && self.channels[ch].has_note() {
                    self.do_retrigger(ch, ctx);
                }
            }
            ExtendedEffect::PatternDelay => {
                if self.tick == 0 && self.patt_del_time2 == 0 {
                    self.patt_del_time = (param & 0x0F) + 1;
                }
            }
            ExtendedEffect::InvertLoop => {
                if self.tick == 0 {
                    let c = &mut self.channels[ch];
                    c.gliss_funk = ((param & 0x0F) << 4) | (c.gliss_funk & 0x0F);
                    if c.gliss_funk & 0xF0 != 0 {
                        self.update_funk(ch, ctx.module);
                    }
                }
            }
        }
    }

    fn arpeggio(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &self.channels[ch];
        let arp = match self.tick % 3 {
            1 => c.param() >> 4,
            2 => c.param() & 0x0F,
            _ => {
                ctx.paula.set_period(ch, c.period);
                return;
            }
        };

        let row = finetune_row(c.fine_tune);
        if let Some(base) = (0..PERIODS_PER_FINETUNE).find(|&i| c.period as i32 >= row[i] as i32) {
            ctx.paula.set_period(ch, row[base + arp as usize] as u16);
        }
    }

    fn porta_up(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        c.period = c.period.wrapping_sub((c.param() & self.low_mask) as u16);
        self.low_mask = 0xFF;

        if c.period & 0x0FFF < 113 {
            c.period = (c.period & 0xF000) | 113;
        }
        ctx.paula.set_period(ch, c.period & 0x0FFF);
    }

    fn porta_down(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        c.period = c.period.wrapping_add((c.param() & self.low_mask) as u16);
        self.low_mask = 0xFF;

        if c.period & 0x0FFF > 856 {
            c.period = (c.period & 0xF000) | 856;
        }
        ctx.paula.set_period(ch, c.period & 0x0FFF);
    }

    fn set_tone_porta(&mut self, ch: usize) {
        let c = &mut self.channels[ch];
        let row = finetune_row(c.fine_tune);
        let mut i = row_index_or_35(row, c.note as i32);

        if c.fine_tune & 8 != 0 && i > 0 {
            i -= 1;
        }

        c.wanted_period = row[i];
        c.tone_port_direction = 0;

        if c.period as i32 == c.wanted_period as i32 {
            c.wanted_period = 0;
        } else if c.period as i32 > c.wanted_period as i32 {
            c.tone_port_direction = 1;
        }
    }

    fn tone_portamento(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        if c.param() > 0 {
            c.tone_port_speed = c.param();
            c.cmd &= 0xFF00;
        }
        self.tone_port_no_change(ch, ctx);
    }

    fn tone_port_no_change(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        if c.wanted_period <= 0 {
            return;
        }

        let speed = c.tone_port_speed as u16;
        if c.tone_port_direction > 0 {
            c.period = c.period.wrapping_sub(speed);
            if c.period as i16 <= c.wanted_period {
                c.period = c.wanted_period as u16;
                c.wanted_period = 0;
            }
        } else {
            c.period = c.period.wrapping_add(speed);
            if c.period as i16 >= c.wanted_period {
                c.period = c.wanted_period as u16;
                c.wanted_period = 0;
            }
        }

        if c.gliss_funk & 0x0F == 0 {
            ctx.paula.set_period(ch, c.period);
        } else {
            // glissando: round to the nearest semitone of the finetune row
            let row = finetune_row(c.fine_tune);
            let i = row_index_or_35(row, c.period as i16 as i32);
            ctx.paula.set_period(ch, row[i] as u16);
        }
    }

    fn vibrato(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        let param = c.param();
        if param > 0 {
            if param & 0x0F > 0 {
                c.vibrato_cmd = (c.vibrato_cmd & 0xF0) | (param & 0x0F);
            }
            if param & 0xF0 > 0 {
                c.vibrato_cmd = (param & 0xF0) | (c.vibrato_cmd & 0x0F);
            }
        }
        self.vibrato_no_change(ch, ctx);
    }

    fn vibrato_no_change(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        let temp = ((c.vibrato_pos >> 2) & 0x1F) as u16;

        let data: u16 = match c.wave_control & 0x03 {
            0 => VIBRATO_TABLE[temp as usize] as u16,
            1 => {
                if c.vibrato_pos < 128 {
                    temp << 3
                } else {
                    255 - (temp << 3)
                }
            }
            _ => 255,
        };
        let data = (data * (c.vibrato_cmd & 0x0F) as u16) >> 7;

        let period = if c.vibrato_pos < 128 {
            c.period.wrapping_add(data)
        } else {
            c.period.wrapping_sub(data)
        };
        ctx.paula.set_period(ch, period);

        c.vibrato_pos = c.vibrato_pos.wrapping_add((c.vibrato_cmd >> 2) & 0x3C);
    }

    fn tremolo(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        let param = c.param();
        if param > 0 {
            if param & 0x0F > 0 {
                c.tremolo_cmd = (c.tremolo_cmd & 0xF0) | (param & 0x0F);
            }
            if param & 0xF0 > 0 {
                c.tremolo_cmd = (param & 0xF0) | (c.tremolo_cmd & 0x0F);
            }
        }

        let temp = ((c.tremolo_pos >> 2) & 0x1F) as i16;
        let data: i16 = match (c.wave_control >> 4) & 0x03 {
            0 => VIBRATO_TABLE[temp as usize] as i16,
            // the ramp direction follows the vibrato position
            1 => {
                if c.vibrato_pos < 128 {
                    temp << 3
                } else {
                    255 - (temp << 3)
                }
            }
            _ => 255,
        };
        let data = (data * (c.tremolo_cmd & 0x0F) as i16) >> 6;

        let volume = if c.tremolo_pos < 128 {
            (c.volume as i16 + data).min(64)
        } else {
            (c.volume as i16 - data).max(0)
        };
        ctx.paula.set_volume(ch, volume as u16);

        c.tremolo_pos = c.tremolo_pos.wrapping_add((c.tremolo_cmd >> 2) & 0x3C);
    }

    fn sample_offset(&mut self, ch: usize) {
        let c = &mut self.channels[ch];
        if c.param() > 0 {
            c.sample_offset = c.param();
        }

        let offset = (c.sample_offset as u16) << 7;
        if (offset as i16) < (c.length as i16) {
            c.length -= offset;
            c.start += (offset as usize) << 1;
        } else {
            c.length = 1;
        }
    }

    fn position_jump(&mut self, ch: usize) {
        if self.mode == PlayMode::Song {
            self.order = self.channels[ch].param().wrapping_sub(1);
        }
        self.pbreak_pos = 0;
        self.pos_jump = true;
    }

    fn pattern_break(&mut self, ch: usize) {
        let param = self.channels[ch].param();
        let row = (param >> 4) * 10 + (param & 0x0F);
        self.pbreak_pos = if row > 63 { 0 } else { row };
        self.pos_jump = true;
    }

    fn volume_change(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        c.volume = c.param().min(64) as i8;
        ctx.paula.set_volume(ch, c.volume as u16);
    }

    fn set_speed_command(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let param = self.channels[ch].param();
        if param == 0 {
            self.stop_requested = true;
        } else if param < 32 {
            self.tick = 0;
            self.speed = param;
        } else {
            ctx.cia.latch_bpm(param);
        }
    }

    fn volume_slide(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &mut self.channels[ch];
        let param = c.param();
        if param >> 4 == 0 {
            c.volume = (c.volume - (param & 0x0F) as i8).max(0);
        } else {
            c.volume = (c.volume + (param >> 4) as i8).min(64);
        }
        ctx.paula.set_volume(ch, c.volume as u16);
    }

    fn jump_loop(&mut self, ch: usize) {
        if self.tick != 0 {
            return;
        }

        let c = &mut self.channels[ch];
        let count = c.param() & 0x0F;
        if count == 0 {
            c.loop_row = self.row;
            return;
        }

        if c.loop_count == 0 {
            c.loop_count = count;
        } else {
            c.loop_count -= 1;
            if c.loop_count == 0 {
                return;
            }
        }

        self.pbreak_pos = c.loop_row;
        self.pbreak_flag = true;
        self.row_visits
            .clear_range(self.order, self.pbreak_pos, self.row);
    }

    fn retrigger_note(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &self.channels[ch];
        let every = c.param() & 0x0F;
        if every == 0 {
            return;
        }
        // the note itself already started on tick 0
        if self.tick == 0 && c.has_note() {
            return;
        }
        if self.tick % every == 0 {
            self.do_retrigger(ch, ctx);
        }
    }

    fn do_retrigger(&mut self, ch: usize, ctx: &mut TickContext<'_>) {
        let c = &self.channels[ch];
        ctx.paula.stop_dma(ch);
        ctx.paula.set_data(ch, c.start);
        ctx.paula.set_length(ch, c.length);
        ctx.paula.set_period(ch, c.period);
        ctx.paula.start_dma_looped(ch, c.loop_start, c.replen);
    }

    /// EFx: step through the loop and invert one byte each time the
    /// accumulator overflows.
    fn update_funk(&mut self, ch: usize, module: &mut Module) {
        let c = &mut self.channels[ch];
        let speed = c.gliss_funk >> 4;
        if speed == 0 {
            return;
        }

        c.funk_offset = c.funk_offset.wrapping_add(FUNK_TABLE[speed as usize]);
        if c.funk_offset < 128 {
            return;
        }
        c.funk_offset = 0;

        c.wave_start += 1;
        if c.wave_start >= c.loop_start + c.replen as usize * 2 {
            c.wave_start = c.loop_start;
        }

        if c.wave_start < RESERVED_SAMPLE_OFFSET {
            if let Some(byte) = module.sample_data_mut().get_mut(c.wave_start) {
                *byte = !*byte;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cia::CiaTimer;
    use crate::paula::{AmigaModel, FilterBank, Paula};

    struct Rig {
        paula: Paula,
        cia: CiaTimer,
        module: Module,
        filters: FilterBank,
        replayer: Replayer,
    }

    impl Rig {
        fn with_cells(cells: &[(usize, usize, Note)]) -> Self {
            let mut module = Module::new();
            let data: Vec<i8> = (0..1024).map(|i| (i % 64) as i8 - 32).collect();
            module
                .set_sample(0, &data, 256, 512, 40, 0)
                .expect("valid sample");
            for &(row, ch, note) in cells {
                module.set_note(0, row, ch, note).expect("cell in range");
            }
            let mut rig = Rig {
                paula: Paula::new(44_100),
                cia: CiaTimer::default(),
                module,
                filters: FilterBank::new(44_100.0, AmigaModel::A500),
                replayer: Replayer::new(),
            };
            rig.replayer
                .start(PlayMode::Song, 0, 0, &rig.module, &mut rig.cia);
            rig
        }

        fn tick(&mut self) {
            let mut ctx = TickContext {
                paula: &mut self.paula,
                cia: &mut self.cia,
                module: &mut self.module,
                filters: &mut self.filters,
            };
            self.replayer.tick(&mut ctx);
        }

        fn ticks(&mut self, n: usize) {
            for _ in 0..n {
                self.tick();
            }
        }
    }

    #[test]
    fn test_effect_decoding() {
        assert_eq!(Effect::from_command(0x0C40), Some(Effect::SetVolume));
        assert_eq!(Effect::from_command(0x0000), Some(Effect::Arpeggio));
        assert_eq!(ExtendedEffect::from_param(0xD3), Some(ExtendedEffect::NoteDelay));
        assert_eq!(ExtendedEffect::from_param(0x01), Some(ExtendedEffect::Filter));
    }

    #[test]
    fn test_loop_registers_from_sample_header() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1))]);
        rig.tick();
        let c = rig.replayer.channel(0);
        assert_eq!(c.length, 128 + 256, "length is repeat + replen in words");
        assert_eq!(c.loop_start, 256);
        assert_eq!(c.replen, 256);
        let v = rig.paula.voice(0);
        assert_eq!(v.pending_data_offset(), 256);
        assert_eq!(v.pending_length(), 512);
    }

    #[test]
    fn test_set_volume_clamps() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xC, 0x50))]);
        rig.tick();
        assert_eq!(rig.replayer.channel(0).volume, 64);
        assert_eq!(rig.paula.voice(0).volume(), 64);
    }

    #[test]
    fn test_volume_slide_down_stops_at_zero() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xA, 0x0F))]);
        rig.ticks(6);
        assert_eq!(rig.replayer.channel(0).volume, 0, "5 ticks of -15 from 40");
    }

    #[test]
    fn test_porta_up_clamps_at_113() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(120, 1).with_effect(0x1, 0x20))]);
        rig.ticks(2);
        assert_eq!(rig.replayer.channel(0).period, 113);
        assert_eq!(rig.paula.voice(0).period(), 113);
    }

    #[test]
    fn test_porta_down_clamps_at_856() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(808, 1).with_effect(0x2, 0x40))]);
        rig.ticks(3);
        assert_eq!(rig.replayer.channel(0).period, 856);
    }

    #[test]
    fn test_fine_porta_uses_low_nibble() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0x13))]);
        rig.tick();
        assert_eq!(rig.replayer.channel(0).period, 425);
        rig.ticks(5);
        assert_eq!(rig.replayer.channel(0).period, 425, "fine slides only run on tick 0");
    }

    #[test]
    fn test_arpeggio_cycles_semitones() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0x0, 0x37))]);
        rig.tick();
        assert_eq!(rig.paula.voice(0).period(), 428);
        rig.tick();
        assert_eq!(rig.paula.voice(0).period(), 360, "+3 semitones");
        rig.tick();
        assert_eq!(rig.paula.voice(0).period(), 285, "+7 semitones");
        rig.tick();
        assert_eq!(rig.paula.voice(0).period(), 428);
    }

    #[test]
    fn test_tone_portamento_reaches_target() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::new(428, 1)),
            (1, 0, Note::new(404, 0).with_effect(0x3, 0x08)),
        ]);
        rig.ticks(6);
        rig.tick();
        assert_eq!(rig.replayer.channel(0).period, 428, "3xx does not retrigger");
        rig.ticks(3);
        assert_eq!(rig.replayer.channel(0).period, 404);
        assert_eq!(rig.replayer.channel(0).wanted_period, 0);
    }

    #[test]
    fn test_vibrato_moves_period_around_base() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0x4, 0x8F))]);
        rig.tick();
        let mut seen = Vec::new();
        for _ in 0..5 {
            rig.tick();
            seen.push(rig.paula.voice(0).period());
        }
        assert!(seen.iter().any(|&p| p > 428), "vibrato must bend the period");
        assert_eq!(rig.replayer.channel(0).period, 428, "base period is kept");
    }

    #[test]
    fn test_tremolo_follows_sine() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0x7, 0x48))]);
        rig.tick();
        let mut seen = Vec::new();
        for _ in 0..4 {
            rig.tick();
            seen.push(rig.paula.voice(0).volume());
        }
        assert_eq!(seen, vec![40, 52, 62, 64], "depth 8 over the sine, clamped at 64");
        assert_eq!(rig.replayer.channel(0).volume, 40, "base volume is kept");
        assert_eq!(rig.replayer.channel(0).tremolo_pos, 64);
    }

    #[test]
    fn test_tremolo_ramp_follows_vibrato_position() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::effect(0xE, 0x71)),
            (1, 0, Note::new(428, 1).with_effect(0x7, 0x48)),
        ]);
        rig.ticks(6);
        assert_eq!(rig.replayer.channel(0).wave_control, 0x10, "E71 selects the ramp");

        rig.tick();
        // the ramp picks its direction from the vibrato position
        rig.replayer.channels[0].vibrato_pos = 200;
        rig.tick();
        assert_eq!(rig.paula.voice(0).volume(), 64, "40 + 31 on a falling ramp, clamped");

        rig.replayer.channels[0].vibrato_pos = 0;
        rig.tick();
        assert_eq!(rig.paula.voice(0).volume(), 44, "rising ramp at position 16");
    }

    #[test]
    fn test_tremolo_square_wave() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::effect(0xE, 0x72)),
            (1, 0, Note::new(428, 1).with_effect(0x7, 0x44)),
        ]);
        rig.ticks(8);
        assert_eq!(rig.paula.voice(0).volume(), 55, "square is full depth from the start");
    }

    #[test]
    fn test_vibrato_waveform_select() {
        let mut ramp = Rig::with_cells(&[
            (0, 0, Note::effect(0xE, 0x41)),
            (1, 0, Note::new(428, 1).with_effect(0x4, 0x8F)),
        ]);
        ramp.ticks(9);
        assert_eq!(ramp.paula.voice(0).period(), 435, "ramp at position 32");

        let mut square = Rig::with_cells(&[
            (0, 0, Note::effect(0xE, 0x42)),
            (1, 0, Note::new(428, 1).with_effect(0x4, 0x8F)),
        ]);
        square.ticks(8);
        assert_eq!(square.paula.voice(0).period(), 457, "square at position 0");

        let mut sine = Rig::with_cells(&[(1, 0, Note::new(428, 1).with_effect(0x4, 0x8F))]);
        sine.ticks(9);
        assert_eq!(sine.paula.voice(0).period(), 449, "sine at position 32");
    }

    #[test]
    fn test_tone_porta_with_volume_slide() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::new(428, 1)),
            (1, 0, Note::new(404, 0).with_effect(0x3, 0x02)),
            (2, 0, Note::effect(0x5, 0x02)),
        ]);
        rig.ticks(12);
        assert_eq!(rig.replayer.channel(0).period, 418);

        rig.ticks(6);
        let c = rig.replayer.channel(0);
        assert_eq!(c.period, 408, "5xy keeps the 3xx speed");
        assert_eq!(c.wanted_period, 404);
        assert_eq!(c.volume, 30, "five ticks of -2");
        assert_eq!(rig.paula.voice(0).period(), 408);
    }

    #[test]
    fn test_vibrato_with_volume_slide() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::new(428, 1).with_effect(0x4, 0x8F)),
            (1, 0, Note::effect(0x6, 0x20)),
        ]);
        rig.ticks(6);
        assert_eq!(rig.replayer.channel(0).vibrato_pos, 160);

        rig.ticks(2);
        assert_eq!(rig.paula.voice(0).period(), 407, "6xy keeps the 4xy depth");
        assert_eq!(rig.replayer.channel(0).volume, 42);

        rig.ticks(4);
        let c = rig.replayer.channel(0);
        assert_eq!(c.volume, 50);
        assert_eq!(c.vibrato_pos, 64, "position wraps past 255");
        assert_eq!(c.period, 428);
    }

    #[test]
    fn test_glissando_rounds_to_semitone() {
        let cells = [
            (0, 0, Note::new(428, 1)),
            (1, 0, Note::effect(0xE, 0x31)),
            (2, 0, Note::new(404, 0).with_effect(0x3, 0x05)),
        ];
        let mut rig = Rig::with_cells(&cells);
        rig.ticks(14);
        assert_eq!(rig.replayer.channel(0).gliss_funk & 0x0F, 1);
        assert_eq!(rig.replayer.channel(0).period, 423, "the slide itself stays smooth");
        assert_eq!(rig.paula.voice(0).period(), 404, "Paula only sees whole semitones");

        let mut smooth = Rig::with_cells(&[cells[0], cells[2]]);
        smooth.ticks(14);
        assert_eq!(smooth.paula.voice(0).period(), 423);
    }

    #[test]
    fn test_fine_tune_command_with_note() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0x51))]);
        rig.tick();
        assert_eq!(rig.replayer.channel(0).fine_tune, 1);
        assert_eq!(rig.paula.voice(0).period(), 425, "C-2 at finetune +1");

        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0x58))]);
        rig.tick();
        assert_eq!(rig.paula.voice(0).period(), 453, "C-2 at finetune -8");
    }

    #[test]
    fn test_fine_tune_command_without_note() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::new(428, 1)),
            (1, 0, Note::effect(0xE, 0x53)),
        ]);
        rig.ticks(7);
        let c = rig.replayer.channel(0);
        assert_eq!(c.fine_tune, 3);
        assert_eq!(c.period, 428, "the playing note is not retuned");
    }

    #[test]
    fn test_sample_offset_moves_start() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0x9, 0x01))]);
        rig.tick();
        let v = rig.paula.voice(0);
        assert_eq!(v.data_offset(), 256);
        assert_eq!(v.length(), (384 - 128) * 2);
        // with a note the offset is applied again after the trigger
        let c = rig.replayer.channel(0);
        assert_eq!(c.start, 512);
        assert_eq!(c.length, 384 - 256);
    }

    #[test]
    fn test_sample_offset_past_end_plays_one_word() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0x9, 0x10))]);
        rig.tick();
        assert_eq!(rig.replayer.channel(0).length, 1);
    }

    #[test]
    fn test_note_cut() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0xC2))]);
        rig.ticks(2);
        assert_eq!(rig.paula.voice(0).volume(), 40);
        rig.tick();
        assert_eq!(rig.paula.voice(0).volume(), 0);
    }

    #[test]
    fn test_note_delay_starts_late() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0xD3))]);
        rig.tick();
        assert!(!rig.paula.voice(0).is_active(), "delayed note must not start on tick 0");
        rig.ticks(3);
        assert!(rig.paula.voice(0).is_active());
        assert_eq!(rig.paula.voice(0).period(), 428);
    }

    #[test]
    fn test_retrigger_restarts_sample() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0x92))]);
        rig.tick();
        rig.paula.stop_dma(0);
        rig.tick();
        assert!(!rig.paula.voice(0).is_active());
        rig.tick();
        assert!(rig.paula.voice(0).is_active(), "E92 retriggers on tick 2");
        assert_eq!(rig.paula.voice(0).position(), 0);
    }

    #[test]
    fn test_led_command() {
        let mut rig = Rig::with_cells(&[
            (0, 0, Note::effect(0xE, 0x00)),
            (1, 0, Note::effect(0xE, 0x01)),
        ]);
        rig.tick();
        assert!(rig.filters.led_enabled());
        rig.ticks(6);
        assert!(!rig.filters.led_enabled());
    }

    #[test]
    fn test_invert_loop_flips_bytes() {
        let mut rig = Rig::with_cells(&[(0, 0, Note::new(428, 1).with_effect(0xE, 0xFF))]);
        let before = rig.module.sample_data()[257];
        rig.tick();
        assert_eq!(rig.module.sample_data()[257], !before, "speed 15 inverts every tick");
    }
}
