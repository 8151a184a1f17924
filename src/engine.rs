//! Audio engine: module, Paula, mixer, replayer and clock behind one lock
//!
//! [`EngineState`] is the whole audio subsystem as one value. The real-time
//! callback, the offline renderers and any UI code reach it only through
//! [`AudioEngine::lock_audio`], so a tick never observes a half-applied
//! change from another thread.

use crate::cia::{BpmTable, CiaTimer, TickSync};
use crate::config::EngineConfig;
use crate::mixer::Mixer;
use crate::module::Module;
use crate::paula::{AmigaModel, Paula, ScopeTap, PAULA_PAL_CLK};
use crate::replayer::{PlayMode, PlaybackPosition, Replayer, TickContext};
use crate::Result;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, info};

/// Internal rate of high-quality pattern renders (period 123)
pub const PAT2SMP_HI_RATE: u32 = 28_836;
/// Internal rate of low-quality pattern renders (period 160)
pub const PAT2SMP_LO_RATE: u32 = 22_168;

/// Pattern-to-sample quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// 28836 Hz, plays back at period 123
    High,
    /// 22168 Hz, plays back at period 160
    Low,
}

impl Quality {
    /// Render rate in Hz
    pub fn output_rate(self) -> u32 {
        match self {
            Quality::High => PAT2SMP_HI_RATE,
            Quality::Low => PAT2SMP_LO_RATE,
        }
    }

    /// Period that plays the rendered sample back at its original pitch
    pub fn period(self) -> u16 {
        match self {
            Quality::High => 123,
            Quality::Low => 160,
        }
    }
}

/// Which post-mix pipeline `output_audio` runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Filtered, dithered interleaved stereo at the configured rate
    #[default]
    Normal,
    /// Unfiltered mono at the quality's internal rate
    PatternToSample(Quality),
}

impl RenderMode {
    /// Interleaved channels written per frame
    pub fn channels(self) -> usize {
        match self {
            RenderMode::Normal => 2,
            RenderMode::PatternToSample(_) => 1,
        }
    }
}

/// The complete audio subsystem
#[derive(Debug)]
pub struct EngineState {
    module: Module,
    paula: Paula,
    mixer: Mixer,
    replayer: Replayer,
    cia: CiaTimer,
    tick_sync: TickSync,
    config: EngineConfig,
    bpm_table: BpmTable,
    bpm_table_hi: BpmTable,
    bpm_table_lo: BpmTable,
    mode: RenderMode,
}

impl EngineState {
    /// Build an engine with an empty module
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut paula = Paula::new(config.output_rate);
        paula.set_stereo_separation(config.stereo_separation);

        let mut mixer = Mixer::new(config.output_rate, config.amiga_model);
        mixer.filters_mut().set_led_enabled(config.led_filter);
        mixer.set_dither(config.dither);

        Ok(EngineState {
            module: Module::new(),
            paula,
            mixer,
            replayer: Replayer::new(),
            cia: CiaTimer::default(),
            tick_sync: TickSync::new(),
            bpm_table: BpmTable::new(config.output_rate),
            bpm_table_hi: BpmTable::new(PAT2SMP_HI_RATE),
            bpm_table_lo: BpmTable::new(PAT2SMP_LO_RATE),
            config,
            mode: RenderMode::Normal,
        })
    }

    /// Build an engine around `module`
    pub fn with_module(module: Module, config: EngineConfig) -> Result<Self> {
        let mut state = EngineState::new(config)?;
        state.load_module(module)?;
        Ok(state)
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Re-derive rate-dependent tables, filter coefficients and pans.
    pub fn apply_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;

        if config.output_rate != self.config.output_rate {
            self.bpm_table = BpmTable::new(config.output_rate);
            self.mixer
                .filters_mut()
                .set_sample_rate(config.output_rate as f64);
            if self.mode == RenderMode::Normal {
                self.paula.set_output_rate(config.output_rate);
            }
        }
        if config.amiga_model != self.mixer.filters().model() {
            self.mixer.filters_mut().set_model(config.amiga_model);
        }
        self.mixer.filters_mut().set_led_enabled(config.led_filter);
        self.mixer.set_dither(config.dither);
        self.paula.set_stereo_separation(config.stereo_separation);

        debug!(
            output_rate = config.output_rate,
            model = ?config.amiga_model,
            stereo_separation = config.stereo_separation,
            "engine reconfigured"
        );
        self.config = config;
        Ok(())
    }

    /// Replace the module. Playback stops and all voices are silenced.
    pub fn load_module(&mut self, module: Module) -> Result<()> {
        module.validate()?;
        self.mod_stop();
        info!(
            title = %module.title,
            patterns = module.pattern_count(),
            song_length = module.song_length(),
            "module loaded"
        );
        self.module = module;
        Ok(())
    }

    /// Loaded module
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Start playback at `order`/`row`
    pub fn mod_play(&mut self, mode: PlayMode, order: u8, row: u8) {
        self.mixer.turn_off_voices(&mut self.paula);
        self.replayer
            .start(mode, order, row, &self.module, &mut self.cia);
        self.tick_sync.reset();
    }

    /// Stop playback and silence every voice
    pub fn mod_stop(&mut self) {
        self.replayer.stop();
        self.mixer.turn_off_voices(&mut self.paula);
    }

    /// Set the tempo; applied on the next tick like an Fxx command.
    pub fn mod_set_tempo(&mut self, bpm: u8) {
        debug!(bpm, "tempo requested");
        self.replayer.set_tempo(bpm, &mut self.cia);
    }

    /// Set ticks per row (1..=31)
    pub fn mod_set_speed(&mut self, speed: u8) {
        debug!(speed, "speed requested");
        self.replayer.set_speed(speed);
    }

    /// Switch the LED filter
    pub fn set_led_filter(&mut self, enabled: bool) {
        debug!(enabled, "LED filter");
        self.mixer.filters_mut().set_led_enabled(enabled);
        self.config.led_filter = enabled;
    }

    /// LED filter state (may have been changed by E0x)
    pub fn led_filter(&self) -> bool {
        self.mixer.filters().led_enabled()
    }

    /// Switch the emulated output stage; filter history is cleared.
    pub fn set_amiga_model(&mut self, model: AmigaModel) {
        debug!(?model, "Amiga model");
        self.mixer.filters_mut().set_model(model);
        self.config.amiga_model = model;
    }

    /// Stereo separation in percent
    pub fn set_stereo_separation(&mut self, percent: u8) {
        self.paula.set_stereo_separation(percent);
        self.config.stereo_separation = self.paula.stereo_separation();
    }

    /// Mute or unmute one voice
    pub fn set_voice_muted(&mut self, ch: usize, muted: bool) {
        self.paula.set_muted(ch, muted);
    }

    /// Stop all voices and reset BLEP, filter and dither state
    pub fn turn_off_voices(&mut self) {
        self.mixer.turn_off_voices(&mut self.paula);
    }

    /// Select the post-mix pipeline; Paula is re-clocked to match.
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        let rate = match mode {
            RenderMode::Normal => self.config.output_rate,
            RenderMode::PatternToSample(quality) => quality.output_rate(),
        };
        self.paula.set_output_rate(rate);
        self.mode = mode;
    }

    /// Active pipeline
    pub fn render_mode(&self) -> RenderMode {
        self.mode
    }

    /// Track visited rows so [`song_end_reached`](Self::song_end_reached) works
    pub fn set_row_tracking(&mut self, enabled: bool) {
        self.replayer.set_row_tracking(enabled);
    }

    /// The song looped back to a row it already played
    pub fn song_end_reached(&self) -> bool {
        self.replayer.song_end_reached()
    }

    /// True while the replayer advances
    pub fn is_playing(&self) -> bool {
        self.replayer.is_playing()
    }

    /// Position snapshot
    pub fn playback_position(&self) -> PlaybackPosition {
        self.replayer.position(&self.cia)
    }

    /// Replayer (read-only)
    pub fn replayer(&self) -> &Replayer {
        &self.replayer
    }

    /// Voice registers (read-only)
    pub fn paula(&self) -> &Paula {
        &self.paula
    }

    /// Voice register write access
    pub fn paula_mut(&mut self) -> &mut Paula {
        &mut self.paula
    }

    /// Mixer (read-only)
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Tick counter
    pub fn tick_sync(&self) -> &TickSync {
        &self.tick_sync
    }

    /// Seconds of audio produced since the last `mod_play`
    pub fn elapsed_seconds(&self) -> f64 {
        self.tick_sync
            .elapsed_seconds(self.paula.output_rate().round() as u32)
    }

    /// Fill `out` with audio. Normal mode writes interleaved stereo frames,
    /// pattern-to-sample mode writes mono. The request is split wherever a
    /// replayer tick falls.
    pub fn output_audio(&mut self, out: &mut [i16]) {
        let channels = self.mode.channels();
        let frames = out.len() / channels;
        let multi_step = match self.mode {
            RenderMode::Normal => self.paula.needs_multi_step(),
            RenderMode::PatternToSample(_) => true,
        };

        let mut done = 0;
        while done < frames {
            if self.tick_sync.tick_due() {
                self.run_tick();
            }

            let n = self.tick_sync.chunk(frames - done);
            self.mixer
                .mix_channels(&mut self.paula, self.module.sample_data(), n, multi_step);

            let dst = &mut out[done * channels..(done + n) * channels];
            match self.mode {
                RenderMode::Normal => self.mixer.output_stereo(dst, n),
                RenderMode::PatternToSample(_) => self.mixer.output_raw_mono(dst, n),
            }

            self.tick_sync.consume(n);
            done += n;
        }
    }

    fn run_tick(&mut self) {
        let mut ctx = TickContext {
            paula: &mut self.paula,
            cia: &mut self.cia,
            module: &mut self.module,
            filters: self.mixer.filters_mut(),
        };
        self.replayer.tick(&mut ctx);

        let table = match self.mode {
            RenderMode::Normal => &self.bpm_table,
            RenderMode::PatternToSample(Quality::High) => &self.bpm_table_hi,
            RenderMode::PatternToSample(Quality::Low) => &self.bpm_table_lo,
        };
        self.tick_sync.reload(table.samples_per_tick(self.cia.bpm()));
    }
}

/// Shared handle to an [`EngineState`]
#[derive(Debug, Clone)]
pub struct AudioEngine {
    state: Arc<Mutex<EngineState>>,
    scope: Arc<ScopeTap>,
}

impl AudioEngine {
    /// Engine with an empty module
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(AudioEngine::from_state(EngineState::new(config)?))
    }

    /// Wrap an existing state
    pub fn from_state(state: EngineState) -> Self {
        info!(
            output_rate = state.config.output_rate,
            model = ?state.config.amiga_model,
            pal_clock = PAULA_PAL_CLK,
            "audio engine created"
        );
        let scope = state.paula.scope();
        AudioEngine {
            state: Arc::new(Mutex::new(state)),
            scope,
        }
    }

    /// Take the audio lock. The audio thread blocks until the guard drops.
    pub fn lock_audio(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }

    /// The shared state, for consumers that keep their own handle
    pub fn shared(&self) -> Arc<Mutex<EngineState>> {
        Arc::clone(&self.state)
    }

    /// Per-voice scope readings; never takes the audio lock
    pub fn scope(&self) -> Arc<ScopeTap> {
        Arc::clone(&self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Note;

    fn square_module() -> Module {
        let mut module = Module::new();
        let data: Vec<i8> = (0..2048).map(|i| if i % 32 < 16 { 100 } else { -100 }).collect();
        module
            .set_sample(0, &data, 0, 0, 64, 0)
            .expect("valid sample");
        module
            .set_note(0, 0, 0, Note::new(428, 1))
            .expect("cell in range");
        module
    }

    fn peak(buf: &[i16]) -> i32 {
        buf.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0)
    }

    #[test]
    fn test_silent_until_played() {
        let mut state =
            EngineState::with_module(square_module(), EngineConfig::default()).expect("engine");
        let mut buf = vec![0i16; 882 * 2];
        state.output_audio(&mut buf);
        assert!(peak(&buf) <= 1, "stopped engine must only output dither");

        state.mod_play(PlayMode::Song, 0, 0);
        state.output_audio(&mut buf);
        assert!(peak(&buf) > 1000, "note on row 0 must sound within the first tick");
    }

    #[test]
    fn test_request_split_at_ticks() {
        let mut state =
            EngineState::with_module(square_module(), EngineConfig::default()).expect("engine");
        state.mod_play(PlayMode::Song, 0, 0);
        let mut buf = vec![0i16; 1000 * 2];
        state.output_audio(&mut buf);
        assert_eq!(state.tick_sync().tick_count(), 2, "882 + 118 frames span two ticks");
        assert_eq!(state.tick_sync().samples_left(), 882 - 118);
    }

    #[test]
    fn test_stop_silences_voices() {
        let mut state =
            EngineState::with_module(square_module(), EngineConfig::default()).expect("engine");
        state.mod_play(PlayMode::Song, 0, 0);
        let mut buf = vec![0i16; 512];
        state.output_audio(&mut buf);
        state.mod_stop();
        assert!(!state.is_playing());
        assert!(!state.paula().voice(0).is_active());
    }

    #[test]
    fn test_apply_config_rejects_invalid() {
        let mut state = EngineState::new(EngineConfig::default()).expect("engine");
        let bad = EngineConfig::default().with_output_rate(1);
        assert!(state.apply_config(bad).is_err());
        assert_eq!(state.config().output_rate, 44_100);

        let good = EngineConfig::default()
            .with_output_rate(48_000)
            .with_amiga_model(AmigaModel::A1200);
        state.apply_config(good).expect("valid config");
        assert_eq!(state.paula().output_rate(), 48_000.0);
        assert_eq!(state.mixer().filters().model(), AmigaModel::A1200);
    }

    #[test]
    fn test_lock_audio_shares_state() {
        let engine = AudioEngine::new(EngineConfig::default()).expect("engine");
        let other = engine.clone();
        engine.lock_audio().mod_set_speed(3);
        assert_eq!(other.lock_audio().replayer().speed(), 3);
    }

    #[test]
    fn test_tempo_change_is_deferred() {
        let mut state =
            EngineState::with_module(square_module(), EngineConfig::default()).expect("engine");
        state.mod_play(PlayMode::Song, 0, 0);
        state.mod_set_tempo(150);
        assert_eq!(state.playback_position().bpm, 125);
        let mut buf = vec![0i16; 2];
        state.output_audio(&mut buf);
        assert_eq!(state.playback_position().bpm, 150);
    }

    #[test]
    fn test_tempo_command_lengthens_next_tick_only() {
        let mut module = square_module();
        module
            .set_note(0, 0, 1, Note::effect(0xF, 0x96))
            .expect("cell in range");
        let mut state = EngineState::with_module(module, EngineConfig::default()).expect("engine");
        state.mod_play(PlayMode::Song, 0, 0);

        let mut frame = vec![0i16; 2];
        state.output_audio(&mut frame);
        assert_eq!(
            state.tick_sync().samples_left(),
            881,
            "the F96 tick still runs at 125 BPM"
        );

        let mut rest = vec![0i16; 882 * 2];
        state.output_audio(&mut rest);
        assert_eq!(state.tick_sync().tick_count(), 2);
        assert_eq!(
            state.tick_sync().samples_left(),
            734,
            "the following tick runs at 150 BPM"
        );
        assert_eq!(state.tick_sync().sample_count(), 883);
    }
}
