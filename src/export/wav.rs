//! WAV file export

use super::{render_song, ExportConfig, RenderSummary};
use crate::module::Module;
use crate::{Pt2Error, Result};
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Render `module` from order 0 to a 16-bit stereo WAV file.
///
/// Stops at the end of the song, on `F00`, after `config.max_seconds` or
/// when `abort` is raised (checked once per chunk). The file is finalized in
/// every case, so an aborted render still leaves a playable WAV.
pub fn render_to_wav<P: AsRef<Path>>(
    module: &Module,
    output_path: P,
    config: &ExportConfig,
    abort: &AtomicBool,
) -> Result<RenderSummary> {
    config.validate()?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: config.output_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(output_path.as_ref(), spec).map_err(|e| {
        Pt2Error::AudioFileError(format!(
            "Failed to create WAV file {}: {}",
            output_path.as_ref().display(),
            e
        ))
    })?;

    let summary = render_song(module, config, abort, |chunk| {
        for &sample in chunk {
            writer
                .write_sample(sample)
                .map_err(|e| Pt2Error::AudioFileError(format!("Failed to write sample: {}", e)))?;
        }
        Ok(())
    })?;

    writer
        .finalize()
        .map_err(|e| Pt2Error::AudioFileError(format!("Failed to finalize WAV file: {}", e)))?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::StopReason;
    use crate::module::Note;

    #[test]
    fn test_wav_header_and_length() {
        let mut module = Module::new();
        let data: Vec<i8> = (0..128).map(|i| if i < 64 { 80 } else { -80 }).collect();
        module
            .set_sample(0, &data, 0, 128, 64, 0)
            .expect("valid sample");
        module
            .set_note(0, 0, 0, Note::new(214, 1))
            .expect("cell in range");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        let abort = AtomicBool::new(false);
        let config = ExportConfig::default().max_seconds(0.2);

        let summary = render_to_wav(&module, &path, &config, &abort).expect("render");
        assert_eq!(summary.stop_reason, StopReason::TimeLimit);

        let reader = hound::WavReader::open(&path).expect("readable WAV");
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration() as u64, summary.frames);
    }

    #[test]
    fn test_unwritable_path() {
        let abort = AtomicBool::new(false);
        let result = render_to_wav(
            &Module::new(),
            "/nonexistent-dir/out.wav",
            &ExportConfig::default(),
            &abort,
        );
        assert!(matches!(result, Err(Pt2Error::AudioFileError(_))));
    }
}
