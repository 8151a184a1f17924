#![cfg(feature = "export-wav")]

use std::sync::atomic::AtomicBool;

use pt2_paula::{render_to_vec, render_to_wav, ExportConfig, Module, Note, StopReason};

fn two_order_song() -> Module {
    let mut module = Module::new();
    let data: Vec<i8> = (0..128).map(|i| if i < 64 { 90 } else { -90 }).collect();
    module
        .set_sample(0, &data, 0, 128, 64, 0)
        .expect("valid sample");
    module.add_pattern().expect("room for pattern");
    module.set_order(1, 1).expect("pattern exists");
    module.set_song_length(2).expect("valid length");
    module
        .set_note(0, 0, 0, Note::new(428, 1))
        .expect("cell in range");
    module
        .set_note(1, 0, 1, Note::new(214, 1))
        .expect("cell in range");
    module
}

#[test]
fn wav_render_stops_at_song_end() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("song.wav");
    let abort = AtomicBool::new(false);

    let summary =
        render_to_wav(&two_order_song(), &path, &ExportConfig::default(), &abort).expect("render");
    assert_eq!(summary.stop_reason, StopReason::SongEnd);

    // two patterns of 64 rows at speed 6, 882 frames per tick
    let song_frames = 2 * 64 * 6 * 882;
    assert!(summary.frames >= song_frames);
    assert!(summary.frames < song_frames + 2048);
    assert_eq!(summary.ticks, 2 * 64 * 6 + 1, "the repeated row 0 tick ends the song");

    let reader = hound::WavReader::open(&path).expect("readable WAV");
    assert_eq!(reader.duration() as u64, summary.frames);
    assert!(
        (summary.seconds - summary.frames as f64 / 44_100.0).abs() < 1e-9,
        "seconds derived from frames"
    );
}

#[test]
fn wav_matches_in_memory_render() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("song.wav");
    let abort = AtomicBool::new(false);
    let config = ExportConfig::default().max_seconds(1.0);

    let (samples, memory) = render_to_vec(&two_order_song(), &config, &abort).expect("render");
    let file = render_to_wav(&two_order_song(), &path, &config, &abort).expect("render");
    assert_eq!(memory, file);

    let mut reader = hound::WavReader::open(&path).expect("readable WAV");
    let from_file: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .expect("valid samples");
    assert_eq!(from_file, samples);
}

#[test]
fn stop_command_ends_render_early() {
    let mut module = two_order_song();
    module
        .set_note(0, 4, 2, Note::effect(0xF, 0x00))
        .expect("cell in range");

    let abort = AtomicBool::new(false);
    let (_, summary) =
        render_to_vec(&module, &ExportConfig::default(), &abort).expect("render");
    assert_eq!(summary.stop_reason, StopReason::Stopped);
    assert!(summary.frames < 6 * 6 * 882, "F00 on row 4 ends playback");
}

#[test]
fn pattern_loop_does_not_end_song_early() {
    let mut module = Module::new();
    module
        .set_note(0, 0, 0, Note::effect(0xE, 0x60))
        .expect("cell in range");
    module
        .set_note(0, 1, 0, Note::effect(0xE, 0x62))
        .expect("cell in range");

    let abort = AtomicBool::new(false);
    let (_, summary) =
        render_to_vec(&module, &ExportConfig::default(), &abort).expect("render");
    assert_eq!(summary.stop_reason, StopReason::SongEnd);
    // rows 0 and 1 play three times before the pattern runs to its end
    assert_eq!(
        summary.ticks,
        (64 + 4) * 6 + 1,
        "looped rows must not count as a repeat"
    );
}
