//! WAV output via hound

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

use super::AudioBuffer;

fn create_writer(path: &Path, spec: WavSpec) -> Result<WavWriter<std::io::BufWriter<std::fs::File>>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))
}

/// Write 16-bit PCM
pub fn write_wav_i16(path: &Path, audio: &AudioBuffer<i16>) -> Result<()> {
    let spec = WavSpec {
        channels: audio.channels(),
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = create_writer(path, spec)?;
    for &sample in audio.samples() {
        writer.write_sample(sample)?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize WAV file {}", path.display()))
}

/// Write f32 samples as 16-bit PCM, clipping to full scale
pub fn write_wav_f32_as_i16(path: &Path, audio: &AudioBuffer<f32>) -> Result<()> {
    let quantized: Vec<i16> = audio
        .samples()
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect();
    write_wav_i16(
        path,
        &AudioBuffer::new(quantized, audio.sample_rate(), audio.channels()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_i16_readable_by_hound() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.wav");
        let audio = AudioBuffer::new(vec![0i16, 100, -100, 32767], 22050, 2);
        write_wav_i16(&path, &audio).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22050);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 100, -100, 32767]);
    }

    #[test]
    fn test_write_f32_clips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav_f32_as_i16(&path, &AudioBuffer::mono(vec![2.0, -2.0, 0.0], 8000)).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX, 0]);
    }
}
