//! ProTracker 2.3D replay routine
//!
//! One call to [`Replayer::tick`] is one CIA interrupt. The routine counts
//! ticks up to the current speed, reads a new row on the first tick, runs the
//! continuous effects on the others and advances rows/orders, including
//! pattern delay, pattern break, position jump and pattern loop.
//!
//! Channels are always processed in order 0..=3; when two channels set
//! conflicting break/jump targets in one row the later channel wins.

pub mod channel;
pub mod effects;
pub mod tables;

pub use channel::ChannelState;
pub use effects::{Effect, ExtendedEffect};

use crate::cia::CiaTimer;
use crate::module::{Module, Note, MOD_CHANNELS, MOD_ORDERS, MOD_ROWS, RESERVED_SAMPLE_OFFSET};
use crate::paula::{DmaBits, FilterBank, Paula, PAULA_VOICES};
use tracing::{debug, trace, warn};

/// Everything a tick may touch outside the replayer itself
pub struct TickContext<'a> {
    /// Voice registers
    pub paula: &'a mut Paula,
    /// Tempo timer (Fxx with xx >= 32 latches here)
    pub cia: &'a mut CiaTimer,
    /// Pattern data and sample memory (EFx writes to samples)
    pub module: &'a mut Module,
    /// Output filters (E0x switches the LED)
    pub filters: &'a mut FilterBank,
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not playing
    #[default]
    Stopped,
    /// Ticks advance the song
    Playing,
}

/// What the replayer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Follow the order list
    Song,
    /// Loop one pattern
    Pattern(u8),
}

/// Snapshot of the replayer position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Order list position
    pub order: u8,
    /// Pattern being played
    pub pattern: u8,
    /// Row of the next new-row tick
    pub row: u8,
    /// Tick counter within the row
    pub tick: u8,
    /// Ticks per row
    pub speed: u8,
    /// Tempo currently driving the CIA
    pub bpm: u8,
}

/// Which rows have been played, for end-of-song detection in offline renders
#[derive(Debug, Clone)]
pub struct RowVisits {
    enabled: bool,
    visited: Vec<bool>,
}

impl RowVisits {
    fn new() -> Self {
        RowVisits {
            enabled: false,
            visited: vec![false; MOD_ORDERS * MOD_ROWS],
        }
    }

    /// Tracking switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.clear();
    }

    fn clear(&mut self) {
        self.visited.fill(false);
    }

    /// Mark a row; returns true if it had been played before.
    fn visit(&mut self, order: u8, row: u8) -> bool {
        if !self.enabled {
            return false;
        }
        let idx = (order as usize & 0x7F) * MOD_ROWS + (row as usize).min(MOD_ROWS - 1);
        std::mem::replace(&mut self.visited[idx], true)
    }

    /// Forget rows `from..=to` of `order` (pattern loop jumped back over them)
    pub fn clear_range(&mut self, order: u8, from: u8, to: u8) {
        if !self.enabled {
            return;
        }
        let base = (order as usize & 0x7F) * MOD_ROWS;
        let to = (to as usize).min(MOD_ROWS - 1);
        for row in from as usize..=to {
            self.visited[base + row] = false;
        }
    }

    /// Whether a row has been played
    pub fn is_visited(&self, order: u8, row: u8) -> bool {
        let idx = (order as usize & 0x7F) * MOD_ROWS + (row as usize).min(MOD_ROWS - 1);
        self.visited[idx]
    }
}

/// The replay routine's state
#[derive(Debug, Clone)]
pub struct Replayer {
    channels: [ChannelState; PAULA_VOICES],
    state: PlaybackState,
    mode: PlayMode,
    order: u8,
    pattern: u8,
    row: u8,
    tick: u8,
    speed: u8,
    patt_del_time: u8,
    patt_del_time2: u8,
    pbreak_pos: u8,
    pbreak_flag: bool,
    pos_jump: bool,
    low_mask: u8,
    dmacon_temp: DmaBits,
    stop_requested: bool,
    row_visits: RowVisits,
    song_end: bool,
}

impl Replayer {
    /// Stopped replayer
    pub fn new() -> Self {
        Replayer {
            channels: std::array::from_fn(|ch| ChannelState::new(ch, RESERVED_SAMPLE_OFFSET)),
            state: PlaybackState::Stopped,
            mode: PlayMode::Song,
            order: 0,
            pattern: 0,
            row: 0,
            tick: 0,
            speed: 6,
            patt_del_time: 0,
            patt_del_time2: 0,
            pbreak_pos: 0,
            pbreak_flag: false,
            pos_jump: false,
            low_mask: 0xFF,
            dmacon_temp: DmaBits::empty(),
            stop_requested: false,
            row_visits: RowVisits::new(),
            song_end: false,
        }
    }

    /// Start playing at `order`/`row`. Speed and tempo come from the module.
    pub fn start(&mut self, mode: PlayMode, order: u8, row: u8, module: &Module, cia: &mut CiaTimer) {
        for (ch, c) in self.channels.iter_mut().enumerate() {
            *c = ChannelState::new(ch, RESERVED_SAMPLE_OFFSET);
        }

        self.mode = mode;
        self.order = order & 0x7F;
        if self.order >= module.song_length() {
            self.order = 0;
        }
        self.pattern = match mode {
            PlayMode::Song => module.order(self.order as usize),
            PlayMode::Pattern(p) => p,
        };
        self.row = row.min(MOD_ROWS as u8 - 1);
        self.speed = module.initial_speed.clamp(1, 31);
        self.tick = self.speed - 1;
        cia.set_bpm(module.initial_bpm);

        self.patt_del_time = 0;
        self.patt_del_time2 = 0;
        self.pbreak_pos = 0;
        self.pbreak_flag = false;
        self.pos_jump = false;
        self.low_mask = 0xFF;
        self.dmacon_temp = DmaBits::empty();
        self.stop_requested = false;
        self.song_end = false;
        self.row_visits.clear();
        self.state = PlaybackState::Playing;

        debug!(
            ?mode,
            order = self.order,
            pattern = self.pattern,
            row = self.row,
            speed = self.speed,
            bpm = cia.bpm(),
            "replayer started"
        );
    }

    /// Stop ticking. Voices are left to the caller.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Playing {
            debug!(order = self.order, row = self.row, "replayer stopped");
        }
        self.state = PlaybackState::Stopped;
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// True while playing
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Set ticks per row (1..=31) and restart the tick counter
    pub fn set_speed(&mut self, speed: u8) {
        if (1..=31).contains(&speed) {
            self.speed = speed;
            self.tick = 0;
        }
    }

    /// Request a tempo change; like Fxx it takes effect on the next interrupt.
    pub fn set_tempo(&mut self, bpm: u8, cia: &mut CiaTimer) {
        cia.latch_bpm(bpm);
    }

    /// Ticks per row
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Position snapshot
    pub fn position(&self, cia: &CiaTimer) -> PlaybackPosition {
        PlaybackPosition {
            order: self.order,
            pattern: self.pattern,
            row: self.row,
            tick: self.tick,
            speed: self.speed,
            bpm: cia.bpm(),
        }
    }

    /// Channel state (read-only)
    pub fn channel(&self, ch: usize) -> &ChannelState {
        &self.channels[ch & 3]
    }

    /// Enable row tracking for end-of-song detection (clears the table)
    pub fn set_row_tracking(&mut self, enabled: bool) {
        self.row_visits.set_enabled(enabled);
        self.song_end = false;
    }

    /// Row-visit table
    pub fn row_visits(&self) -> &RowVisits {
        &self.row_visits
    }

    /// A new row that had already been played was reached
    pub fn song_end_reached(&self) -> bool {
        self.song_end
    }

    /// Run one CIA interrupt
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) {
        if ctx.cia.reload() {
            trace!(bpm = ctx.cia.bpm(), "tempo reloaded");
        }

        if self.state != PlaybackState::Playing {
            return;
        }

        self.tick = self.tick.wrapping_add(1);
        if self.tick >= self.speed {
            self.tick = 0;

            if self.patt_del_time2 == 0 {
                self.get_new_note(ctx);
            } else {
                self.no_new_all_channels(ctx);
            }

            self.row += 1;
            if self.patt_del_time > 0 {
                self.patt_del_time2 = self.patt_del_time;
                self.patt_del_time = 0;
            }
            if self.patt_del_time2 > 0 {
                self.patt_del_time2 -= 1;
                if self.patt_del_time2 > 0 {
                    self.row -= 1;
                }
            }
            if self.pbreak_flag {
                self.row = self.pbreak_pos;
                self.pbreak_pos = 0;
                self.pbreak_flag = false;
            }
            if self.row as usize >= MOD_ROWS {
                self.next_position(ctx.module);
            }
        } else {
            self.no_new_all_channels(ctx);
        }

        if self.pos_jump {
            self.next_position(ctx.module);
        }

        if self.stop_requested {
            self.stop_requested = false;
            ctx.paula.stop_all_dma();
            self.stop();
        }
    }

    fn no_new_all_channels(&mut self, ctx: &mut TickContext<'_>) {
        for ch in 0..MOD_CHANNELS {
            self.check_efx(ch, ctx);
        }
    }

    fn get_new_note(&mut self, ctx: &mut TickContext<'_>) {
        if self.row_visits.visit(self.order, self.row) {
            self.song_end = true;
        }

        let notes: [Note; MOD_CHANNELS] = ctx
            .module
            .pattern(self.pattern as usize)
            .map(|p| p.row(self.row as usize))
            .unwrap_or_default();

        self.dmacon_temp = DmaBits::empty();
        for (ch, note) in notes.iter().enumerate() {
            self.play_voice(ch, *note, ctx);
        }

        ctx.paula.set_dmacon((DmaBits::SET | self.dmacon_temp).bits());

        // these only take effect after the current DMA block
        for c in self.channels.iter() {
            ctx.paula.set_data(c.index, c.loop_start);
            ctx.paula.set_length(c.index, c.replen);
        }
    }

    fn next_position(&mut self, module: &Module) {
        self.row = self.pbreak_pos;
        self.pbreak_pos = 0;
        self.pos_jump = false;

        if let PlayMode::Song = self.mode {
            self.order = self.order.wrapping_add(1) & 0x7F;
            if self.order >= module.song_length() {
                self.order = 0;
            }
            self.pattern = module.order(self.order as usize);
            if module.pattern(self.pattern as usize).is_none() {
                warn!(
                    order = self.order,
                    pattern = self.pattern,
                    "order points at a missing pattern, playing it empty"
                );
            }
        }
        trace!(order = self.order, pattern = self.pattern, row = self.row, "next position");
    }
}

impl Default for Replayer {
    fn default() -> Self {
        Self::new()
    }
}
