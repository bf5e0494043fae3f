//! Sample-rate conversion using rubato

use anyhow::{anyhow, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

use super::AudioBuffer;

/// Audio resampler using rubato
pub struct Resampler;

impl Resampler {
    /// Resample a buffer to `output_rate`
    ///
    /// Septic polynomial interpolation over the whole buffer in one pass.
    /// The interpolator's delay is trimmed from the front and the tail is
    /// flushed, so the output holds exactly
    /// `round(frames * output_rate / input_rate)` frames. A buffer already at
    /// `output_rate` is returned unchanged.
    pub fn resample(input: AudioBuffer<f32>, output_rate: u32) -> Result<AudioBuffer<f32>> {
        let input_rate = input.sample_rate();
        let channels = input.channels();
        if input_rate == output_rate || input.is_empty() {
            return Ok(AudioBuffer::new(input.into_samples(), output_rate, channels));
        }
        if input_rate == 0 || output_rate == 0 {
            return Err(anyhow!(
                "Cannot resample between {}Hz and {}Hz",
                input_rate,
                output_rate
            ));
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        let input_frames = input.frames();
        let ratio = output_rate as f64 / input_rate as f64;
        let expected_frames = (input_frames as f64 * ratio).round() as usize;

        let planar_input = Self::deinterleave(input.samples(), channels);

        let mut resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| anyhow!("Failed to create resampler: {}", e))?;

        let delay = resampler.output_delay();
        let mut planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| anyhow!("Resampling failed: {}", e))?;

        let produced = planar_output.first().map(Vec::len).unwrap_or(0);
        if produced < delay + expected_frames {
            let tail = resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| anyhow!("Resampler flush failed: {}", e))?;
            for (channel, rest) in planar_output.iter_mut().zip(tail) {
                channel.extend(rest);
            }
        }

        for channel in planar_output.iter_mut() {
            channel.drain(..delay.min(channel.len()));
            channel.resize(expected_frames, 0.0);
        }

        Ok(AudioBuffer::new(
            Self::interleave(planar_output),
            output_rate,
            channels,
        ))
    }

    /// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
        planar
    }

    /// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let num_channels = planar.len();
        let num_frames = planar.first().map(Vec::len).unwrap_or(0);
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);
        for frame in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame]);
            }
        }
        interleaved
    }
}
