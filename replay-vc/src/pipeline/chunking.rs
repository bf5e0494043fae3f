//! Chunk boundary search and chunk planning
//!
//! Long inputs are split near quiet points so the model never sees more
//! than about `t_center` samples plus overlap at once. Each chunk carries
//! `t_pad` samples of context on both sides, which are cut from the
//! model output again before concatenation.

use std::ops::Range;

use super::Timing;

/// Index into a signal of length `n` after reflection about its end samples
fn reflect_index(index: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut i = index.rem_euclid(period);
    if i >= n as isize {
        i = period - i;
    }
    i as usize
}

/// Pad both ends by mirroring about the edge samples (edge not repeated)
pub fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let pad = pad as isize;
    (-pad..n as isize + pad)
        .map(|i| signal[reflect_index(i, n)])
        .collect()
}

/// Chunk boundaries (in samples of the unpadded signal, window aligned)
///
/// Empty unless the signal is longer than `t_max`. Each boundary is the
/// position of smallest absolute windowed sum within `t_query` of a
/// multiple of `t_center`.
pub fn find_boundaries(audio: &[f32], timing: &Timing) -> Vec<usize> {
    let window = timing.window;
    let padded = reflect_pad(audio, window / 2);
    if padded.len() <= timing.t_max {
        return Vec::new();
    }

    let n = audio.len();
    let mut sums = vec![0.0f32; n];
    for offset in 0..window {
        for (sum, &value) in sums.iter_mut().zip(&padded[offset..offset + n]) {
            *sum += value;
        }
    }

    (timing.t_center..n)
        .step_by(timing.t_center)
        .map(|t| {
            let start = t.saturating_sub(timing.t_query);
            let end = (t + timing.t_query).min(n);
            let quietest = sums[start..end]
                .iter()
                .enumerate()
                .fold((0usize, f32::INFINITY), |best, (i, v)| {
                    if v.abs() < best.1 {
                        (i, v.abs())
                    } else {
                        best
                    }
                })
                .0;
            (start + quietest) / window * window
        })
        .collect()
}

/// One model invocation: padded-audio span and pitch-frame span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub audio: Range<usize>,
    pub pitch: Range<usize>,
}

/// Spans over the `t_pad`-padded signal for the given boundaries
///
/// Every span but the last ends `t_pad2 + window` past its boundary; the
/// last consumes the remainder of the signal.
pub fn plan_chunks(
    padded_len: usize,
    pitch_len: usize,
    boundaries: &[usize],
    timing: &Timing,
) -> Vec<ChunkSpan> {
    let window = timing.window;
    let t_pad2 = timing.t_pad2();
    let mut spans = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0usize;

    for &t in boundaries {
        let audio_end = (t + t_pad2 + window).min(padded_len);
        let pitch_start = (start / window).min(pitch_len);
        let pitch_end = ((t + t_pad2) / window).clamp(pitch_start, pitch_len);
        spans.push(ChunkSpan {
            audio: start.min(audio_end)..audio_end,
            pitch: pitch_start..pitch_end,
        });
        start = t;
    }

    let pitch_start = (start / window).min(pitch_len);
    spans.push(ChunkSpan {
        audio: start.min(padded_len)..padded_len,
        pitch: pitch_start..pitch_len,
    });
    spans
}

/// Drop `pad` samples from both ends; shorter outputs become empty
pub fn trim_padding(output: &[f32], pad: usize) -> &[f32] {
    if output.len() <= 2 * pad {
        &[]
    } else {
        &output[pad..output.len() - pad]
    }
}
