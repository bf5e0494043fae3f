//! Pitch shifting of whole tracks without tempo change
//!
//! Backed by signalsmith-stretch when built with the `pitch-shift`
//! feature. Without it, any non-zero shift is reported as unavailable.

use anyhow::Result;

use super::AudioBuffer;

/// Shift `audio` by `semitones`, keeping its length
#[cfg(feature = "pitch-shift")]
pub fn shift_semitones(audio: AudioBuffer<f32>, semitones: i32) -> Result<AudioBuffer<f32>> {
    use signalsmith_stretch::Stretch;

    if semitones == 0 || audio.is_empty() {
        return Ok(audio);
    }

    let channels = audio.channels();
    let sample_rate = audio.sample_rate();
    let frames = audio.frames();

    let mut stretcher = Stretch::preset_default(channels as u32, sample_rate);
    stretcher.set_transpose_factor_semitones(semitones as f32, None);

    // Feed trailing silence so the latency tail is flushed into the output
    let latency = stretcher.input_latency() + stretcher.output_latency();
    let mut input = audio.into_samples();
    input.resize((frames + latency) * channels as usize, 0.0);
    let mut output = vec![0.0f32; input.len()];
    stretcher.process(&input, &mut output);

    let aligned = output.split_off(latency * channels as usize);
    tracing::debug!(semitones, frames, latency, "Pitch shifted track");
    Ok(AudioBuffer::new(aligned, sample_rate, channels))
}

/// Shift `audio` by `semitones`, keeping its length
#[cfg(not(feature = "pitch-shift"))]
pub fn shift_semitones(audio: AudioBuffer<f32>, semitones: i32) -> Result<AudioBuffer<f32>> {
    if semitones == 0 {
        return Ok(audio);
    }
    anyhow::bail!(
        "Instrumental pitch shifting is unavailable: built without the pitch-shift feature"
    )
}

/// Whether non-zero shifts are supported by this build
pub fn is_available() -> bool {
    cfg!(feature = "pitch-shift")
}
