//! Pitch (f0) extraction
//!
//! Estimators are pluggable per [`PitchMethod`]. The built-in
//! [`AutocorrelationEstimator`] serves `pm` and stands in for any method
//! whose estimator is not registered.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::{AudioFrameCache, PitchCacheKey, PitchCurve};
use crate::capabilities::ModelError;
use crate::models::PitchMethod;

pub const F0_MIN: f32 = 50.0;
pub const F0_MAX: f32 = 1100.0;

fn mel(f: f32) -> f32 {
    1127.0 * (1.0 + f / 700.0).ln()
}

/// Map Hz to the coarse 1..=255 mel scale used for pitch embedding
///
/// Unvoiced frames (0 Hz) map to 1.
pub fn quantize_coarse(fine: &[f32]) -> Vec<i64> {
    let mel_min = mel(F0_MIN);
    let mel_max = mel(F0_MAX);
    fine.iter()
        .map(|&f| {
            let mut m = mel(f);
            if m > 0.0 {
                m = (m - mel_min) * 254.0 / (mel_max - mel_min) + 1.0;
            }
            m.clamp(1.0, 255.0).round_ties_even() as i64
        })
        .collect()
}

/// Frequency multiplier for a shift in semitones
pub fn semitone_ratio(semitones: i32) -> f32 {
    2f32.powf(semitones as f32 / 12.0)
}

/// 3-tap median filter with zero padding at the ends
pub fn median3(values: &[f32]) -> Vec<f32> {
    let at = |i: isize| -> f32 {
        if i < 0 || i as usize >= values.len() {
            0.0
        } else {
            values[i as usize]
        }
    };
    (0..values.len() as isize)
        .map(|i| {
            let mut w = [at(i - 1), at(i), at(i + 1)];
            w.sort_by(|a, b| a.total_cmp(b));
            w[1]
        })
        .collect()
}

/// Center `values` in a zero-filled curve of `p_len` frames
///
/// Longer curves are returned unchanged.
pub fn center_pad(values: Vec<f32>, p_len: usize) -> Vec<f32> {
    if values.len() >= p_len {
        return values;
    }
    let front = (p_len - values.len() + 1) / 2;
    let mut padded = vec![0.0; front];
    padded.extend(values);
    padded.resize(p_len, 0.0);
    padded
}

/// A pitch estimation algorithm
pub trait PitchEstimator: Send + Sync {
    fn method(&self) -> PitchMethod;

    /// Per-frame f0 in Hz (0 for unvoiced) at one frame per `hop` samples
    ///
    /// `p_len` is the frame count the caller expects; estimators that
    /// cannot cover the edges may return fewer frames.
    fn estimate(
        &self,
        audio: &[f32],
        sample_rate: u32,
        hop: usize,
        p_len: usize,
    ) -> Result<Vec<f32>, ModelError>;
}

/// Normalized time-domain autocorrelation pitch tracker
///
/// Frames whose analysis window does not fit inside the signal are
/// omitted, so the curve is shorter than `p_len` by about one window.
#[derive(Debug, Clone, Copy)]
pub struct AutocorrelationEstimator {
    pub voicing_threshold: f32,
    pub f0_min: f32,
    pub f0_max: f32,
}

impl Default for AutocorrelationEstimator {
    fn default() -> Self {
        Self {
            voicing_threshold: 0.6,
            f0_min: F0_MIN,
            f0_max: F0_MAX,
        }
    }
}

impl AutocorrelationEstimator {
    fn frame_pitch(&self, frame: &[f32], min_lag: usize, max_lag: usize, sample_rate: u32) -> f32 {
        let mean = frame.iter().sum::<f32>() / frame.len() as f32;
        let x: Vec<f32> = frame.iter().map(|v| v - mean).collect();
        if x.iter().map(|v| v * v).sum::<f32>() < 1e-8 {
            return 0.0;
        }

        let correlation = |lag: usize| -> f32 {
            let (head, tail) = (&x[..x.len() - lag], &x[lag..]);
            let mut cross = 0.0f32;
            let mut e1 = 0.0f32;
            let mut e2 = 0.0f32;
            for (a, b) in head.iter().zip(tail) {
                cross += a * b;
                e1 += a * a;
                e2 += b * b;
            }
            let norm = (e1 * e2).sqrt();
            if norm > 0.0 {
                cross / norm
            } else {
                0.0
            }
        };

        let r: Vec<f32> = (min_lag - 1..=max_lag + 1).map(correlation).collect();
        let peaks: Vec<(usize, f32)> = (1..r.len() - 1)
            .filter(|&i| r[i] > r[i - 1] && r[i] >= r[i + 1])
            .map(|i| (i, r[i]))
            .collect();
        let Some(best) = peaks.iter().map(|p| p.1).reduce(f32::max) else {
            return 0.0;
        };
        if best < self.voicing_threshold {
            return 0.0;
        }

        // Shortest period close to the best one avoids octave-down errors
        let Some(&(i, _)) = peaks.iter().find(|p| p.1 >= 0.9 * best) else {
            return 0.0;
        };
        let (y0, y1, y2) = (r[i - 1], r[i], r[i + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        let offset = if denom.abs() > f32::EPSILON {
            (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let lag = (min_lag - 1 + i) as f32 + offset;
        let f0 = sample_rate as f32 / lag;
        if (self.f0_min..=self.f0_max).contains(&f0) {
            f0
        } else {
            0.0
        }
    }
}

impl PitchEstimator for AutocorrelationEstimator {
    fn method(&self) -> PitchMethod {
        PitchMethod::Pm
    }

    fn estimate(
        &self,
        audio: &[f32],
        sample_rate: u32,
        hop: usize,
        _p_len: usize,
    ) -> Result<Vec<f32>, ModelError> {
        let hop = hop.max(1);
        let min_lag = ((sample_rate as f32 / self.f0_max).floor() as usize).max(2);
        let max_lag = (sample_rate as f32 / self.f0_min).ceil() as usize;
        let window = 2 * (max_lag + 1);
        if audio.len() < window {
            return Ok(Vec::new());
        }

        let frames = (audio.len() - window) / hop + 1;
        Ok((0..frames)
            .map(|i| {
                let start = i * hop;
                self.frame_pitch(&audio[start..start + window], min_lag, max_lag, sample_rate)
            })
            .collect())
    }
}

/// Parameters of one pitch extraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchParams {
    pub method: PitchMethod,
    pub pitch_shift: i32,
    pub filter_radius: u32,
    pub hop_length: u32,
}

impl PitchParams {
    fn cache_key(&self) -> PitchCacheKey {
        PitchCacheKey {
            method: self.method,
            filter_radius: self.filter_radius,
            hop_length: self.hop_length,
            pitch_shift: self.pitch_shift,
        }
    }
}

/// Estimator registry plus the on-disk curve cache
pub struct PitchExtractor {
    estimators: HashMap<PitchMethod, Arc<dyn PitchEstimator>>,
    fallback: Arc<dyn PitchEstimator>,
    cache: AudioFrameCache,
}

impl Default for PitchExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchExtractor {
    pub fn new() -> Self {
        let builtin: Arc<dyn PitchEstimator> = Arc::new(AutocorrelationEstimator::default());
        let mut estimators = HashMap::new();
        estimators.insert(PitchMethod::Pm, Arc::clone(&builtin));
        Self {
            estimators,
            fallback: builtin,
            cache: AudioFrameCache::new(),
        }
    }

    /// Register (or replace) the estimator for its method
    pub fn register(&mut self, estimator: Arc<dyn PitchEstimator>) {
        self.estimators.insert(estimator.method(), estimator);
    }

    pub fn has_estimator(&self, method: PitchMethod) -> bool {
        self.estimators.contains_key(&method)
    }

    pub fn cache(&self) -> &AudioFrameCache {
        &self.cache
    }

    fn estimator_for(&self, method: PitchMethod) -> Option<Arc<dyn PitchEstimator>> {
        self.estimators.get(&method).map(Arc::clone)
    }

    /// Shifted pitch curve of `audio` (16 kHz), cached beside `source`
    ///
    /// Without a source path the curve is computed every time. Curves from
    /// the fallback estimator are never cached.
    pub fn extract(
        &self,
        audio: &[f32],
        sample_rate: u32,
        window: usize,
        p_len: usize,
        params: &PitchParams,
        source: Option<&Path>,
    ) -> Result<PitchCurve, ModelError> {
        let registered = self.estimator_for(params.method);
        let estimator = match &registered {
            Some(estimator) => Arc::clone(estimator),
            None => {
                tracing::warn!(
                    method = %params.method,
                    fallback = %self.fallback.method(),
                    "No estimator registered for pitch method, using fallback"
                );
                Arc::clone(&self.fallback)
            }
        };
        let compute =
            || self.compute(estimator.as_ref(), audio, sample_rate, window, p_len, params);
        match source {
            Some(path) if registered.is_some() => {
                self.cache.get_or_compute(path, &params.cache_key(), compute)
            }
            _ => compute(),
        }
    }

    fn compute(
        &self,
        estimator: &dyn PitchEstimator,
        audio: &[f32],
        sample_rate: u32,
        window: usize,
        p_len: usize,
        params: &PitchParams,
    ) -> Result<PitchCurve, ModelError> {
        let hop = match params.method {
            PitchMethod::MangioCrepe | PitchMethod::MangioCrepeTiny => {
                params.hop_length.max(1) as usize
            }
            _ => window,
        };
        let mut f0 = estimator.estimate(audio, sample_rate, hop, p_len)?;

        if hop != window {
            f0 = resample_frames(&f0, p_len);
        } else if estimator.method() == PitchMethod::Pm {
            f0 = center_pad(f0, p_len);
        } else if params.method == PitchMethod::Harvest && params.filter_radius > 2 {
            f0 = median3(&f0);
        }

        let ratio = semitone_ratio(params.pitch_shift);
        for v in &mut f0 {
            *v *= ratio;
        }
        tracing::debug!(method = %params.method, frames = f0.len(), p_len, "Pitch curve computed");
        Ok(PitchCurve::new(f0))
    }
}

/// Linearly stretch a curve onto `p_len` frames
///
/// Output frame `i` samples the input at `i * len / p_len`. A position
/// between a voiced and an unvoiced frame is unvoiced.
pub fn resample_frames(values: &[f32], p_len: usize) -> Vec<f32> {
    let n = values.len();
    if n == 0 {
        return vec![0.0; p_len];
    }
    (0..p_len)
        .map(|i| {
            let x = (i * n) as f64 / p_len as f64;
            let j = (x.floor() as usize).min(n - 1);
            let frac = (x - j as f64) as f32;
            if frac == 0.0 || j + 1 >= n {
                return values[j];
            }
            let (a, b) = (values[j], values[j + 1]);
            if a <= 0.0 || b <= 0.0 {
                0.0
            } else {
                a + (b - a) * frac
            }
        })
        .collect()
}
