//! Peak normalization

/// Headroom for the final 16-bit conversion
const OUTPUT_PEAK: f32 = 0.99;

/// Peak target for model input
const INPUT_PEAK: f32 = 0.95;

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, &x| m.max(x.abs()))
}

/// Convert to 16-bit PCM, scaling down only when the peak exceeds 0.99
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    let over = peak(samples) / OUTPUT_PEAK;
    let mut scale = 32768.0f32;
    if over > 1.0 {
        scale /= over;
    }
    samples.iter().map(|&x| (x * scale) as i16).collect()
}

/// Scale audio down so its peak is at most 0.95; quieter audio is untouched
pub fn limit_input_peak(samples: &mut [f32]) {
    let over = peak(samples) / INPUT_PEAK;
    if over > 1.0 {
        for x in samples.iter_mut() {
            *x /= over;
        }
    }
}
