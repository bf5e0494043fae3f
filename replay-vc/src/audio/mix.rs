//! Track assembly: overlaying stems and cutting preview samples

use anyhow::Result;

use super::{AudioBuffer, Resampler};

/// Length of a sample-mode preview in seconds
pub const SAMPLE_SECONDS: f64 = 30.0;

/// Rate sample-mode previews are rendered at
pub const SAMPLE_RATE: u32 = 44100;

/// Overlay `overlay` onto `base`
///
/// The overlay is resampled to the base rate and mixed into every base
/// channel (mono overlays are duplicated, multi-channel overlays are
/// matched channel-by-channel when counts agree). The base length governs
/// the result: overlay samples past its end are dropped. Sums are clipped
/// to [-1, 1].
pub fn overlay(base: AudioBuffer<f32>, overlay: AudioBuffer<f32>) -> Result<AudioBuffer<f32>> {
    let sample_rate = base.sample_rate();
    let channels = base.channels() as usize;
    let overlay = Resampler::resample(overlay, sample_rate)?;
    let overlay = if overlay.channels() as usize == channels {
        overlay
    } else {
        overlay.into_mono()
    };
    let overlay_channels = overlay.channels() as usize;
    let overlay_frames = overlay.frames();
    let overlay_samples = overlay.into_samples();

    let mut mixed = base.into_samples();
    for (frame_idx, frame) in mixed.chunks_exact_mut(channels).enumerate() {
        if frame_idx >= overlay_frames {
            break;
        }
        for (ch, sample) in frame.iter_mut().enumerate() {
            let source_ch = if overlay_channels == 1 { 0 } else { ch };
            let add = overlay_samples[frame_idx * overlay_channels + source_ch];
            *sample = (*sample + add).clamp(-1.0, 1.0);
        }
    }

    Ok(AudioBuffer::new(mixed, sample_rate, channels as u16))
}

/// Cut a preview of [`SAMPLE_SECONDS`] starting at `start_seconds`,
/// rendered at [`SAMPLE_RATE`]
pub fn sample_excerpt(audio: AudioBuffer<f32>, start_seconds: f64) -> Result<AudioBuffer<f32>> {
    let audio = Resampler::resample(audio, SAMPLE_RATE)?;
    let start = (start_seconds.max(0.0) * SAMPLE_RATE as f64) as usize;
    let len = (SAMPLE_SECONDS * SAMPLE_RATE as f64) as usize;
    Ok(audio.slice_frames(start, len))
}
