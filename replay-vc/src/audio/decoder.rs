//! Audio file decoding
//!
//! Uses symphonia for format-agnostic decoding (WAV, MP3, FLAC, OGG, ...).

use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioBuffer, Resampler};

/// Decode an audio file to interleaved f32 samples at its native rate
pub fn decode_audio_file(file_path: &Path) -> Result<AudioBuffer<f32>> {
    tracing::debug!(path = %file_path.display(), "Decoding audio file");

    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate unknown")?;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(path = %file_path.display(), error = %e, "Skipping corrupt packet");
                continue;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to decode packet in {}: {}",
                    file_path.display(),
                    e
                ))
            }
        };

        if channels == 0 {
            channels = decoded.spec().channels.count() as u16;
        }
        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
        });
        if buf.capacity() < decoded.capacity() * decoded.spec().channels.count() {
            *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        }
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    let buffer = AudioBuffer::new(samples, sample_rate, channels.max(1));
    tracing::debug!(
        path = %file_path.display(),
        sample_rate,
        channels = buffer.channels(),
        duration_seconds = format!("{:.2}", buffer.duration_seconds()),
        "Audio decoding complete"
    );
    Ok(buffer)
}

/// Decode to mono at `target_rate`, resampling when needed
pub fn decode_mono(file_path: &Path, target_rate: u32) -> Result<AudioBuffer<f32>> {
    let mono = decode_audio_file(file_path)?.into_mono();
    if mono.sample_rate() == target_rate || mono.is_empty() {
        return Ok(AudioBuffer::mono(mono.into_samples(), target_rate));
    }
    let resampled = Resampler::resample(mono, target_rate)
        .with_context(|| format!("Failed to resample {}", file_path.display()))?;
    Ok(resampled)
}
