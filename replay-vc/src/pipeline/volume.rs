//! Volume envelope matching between input and converted audio

/// Floor for the output envelope
const MIN_RMS: f32 = 1e-6;

/// Centered RMS envelope, one value per half second
///
/// Frames are `sr/2*2` samples long with a hop of `sr/2`; the signal is
/// zero-padded by half a frame at both ends.
pub fn rms_envelope(signal: &[f32], sample_rate: u32) -> Vec<f32> {
    let hop = (sample_rate as usize / 2).max(1);
    let frame_len = hop * 2;
    let half = frame_len / 2;
    let frames = 1 + signal.len() / hop;

    (0..frames)
        .map(|f| {
            // Frame covers padded[f*hop .. f*hop + frame_len] = signal[f*hop - half ..]
            let start = (f * hop).saturating_sub(half);
            let end = (f * hop + frame_len - half).min(signal.len());
            let energy: f64 = signal[start.min(end)..end]
                .iter()
                .map(|&x| (x as f64) * (x as f64))
                .sum();
            (energy / frame_len as f64).sqrt() as f32
        })
        .collect()
}

/// Linear interpolation to `len` points with half-pixel centers
pub fn interpolate_linear(values: &[f32], len: usize) -> Vec<f32> {
    if values.is_empty() {
        return vec![0.0; len];
    }
    let scale = values.len() as f64 / len.max(1) as f64;
    let last = values.len() - 1;
    (0..len)
        .map(|i| {
            let src = ((i as f64 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (src.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let lambda = (src - i0 as f64) as f32;
            values[i0] * (1.0 - lambda) + values[i1] * lambda
        })
        .collect()
}

/// Scale `output` so its loudness follows `input`'s envelope
///
/// `rate` is the share of the output's own envelope that is kept: 1.0
/// returns `output` unchanged, 0.0 imposes the input envelope fully. A
/// silent output is returned unchanged.
pub fn match_envelope(
    input: &[f32],
    input_rate: u32,
    mut output: Vec<f32>,
    output_rate: u32,
    rate: f32,
) -> Vec<f32> {
    if rate == 1.0 || output.is_empty() || output.iter().all(|&x| x == 0.0) {
        return output;
    }

    let rms_in = interpolate_linear(&rms_envelope(input, input_rate), output.len());
    let rms_out = interpolate_linear(&rms_envelope(&output, output_rate), output.len());
    for ((sample, r_in), r_out) in output.iter_mut().zip(rms_in).zip(rms_out) {
        *sample *= r_in.powf(1.0 - rate) * r_out.max(MIN_RMS).powf(rate - 1.0);
    }
    output
}
