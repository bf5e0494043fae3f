//! Audio Test Fixture Generator

use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f32,
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 5.0,
            sample_rate: 16000,
            channels: 1,
            frequency: 220.0,
            amplitude: 0.3,
        }
    }
}

/// Generate a 16-bit sine WAV file
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_frames = (config.duration_seconds * config.sample_rate as f64) as usize;
    for i in 0..total_frames {
        let t = i as f32 / config.sample_rate as f32;
        let value = config.amplitude * (2.0 * std::f32::consts::PI * config.frequency * t).sin();
        let sample = (value * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Frame count, sample rate and channel count of a WAV file
pub fn read_wav_frames(path: &Path) -> (u32, u32, u16) {
    let reader = hound::WavReader::open(path).expect("readable wav");
    let spec = reader.spec();
    (reader.duration(), spec.sample_rate, spec.channels)
}
