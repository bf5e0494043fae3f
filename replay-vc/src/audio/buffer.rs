//! Owned audio buffers passed between pipeline stages
//!
//! Stages take a buffer by value and return a new one, so no two stages
//! ever hold the same samples.

/// Interleaved samples at a known rate and channel count
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer<T = f32> {
    samples: Vec<T>,
    sample_rate: u32,
    channels: u16,
}

impl<T> AudioBuffer<T> {
    pub fn new(samples: Vec<T>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn mono(samples: Vec<T>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<T> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Consume the buffer, producing a new one with the same format
    pub fn map_samples<U>(self, f: impl FnOnce(Vec<T>) -> Vec<U>) -> AudioBuffer<U> {
        AudioBuffer {
            samples: f(self.samples),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

impl AudioBuffer<f32> {
    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Average channels into a mono buffer
    pub fn into_mono(self) -> AudioBuffer<f32> {
        if self.channels == 1 {
            return self;
        }
        let channels = self.channels as usize;
        let mono = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        AudioBuffer::mono(mono, self.sample_rate)
    }

    /// Frames `[start, start + len)`, clamped to the buffer
    pub fn slice_frames(self, start: usize, len: usize) -> AudioBuffer<f32> {
        let channels = self.channels as usize;
        let total = self.frames();
        let start = start.min(total);
        let end = start.saturating_add(len).min(total);
        let samples = self.samples[start * channels..end * channels].to_vec();
        AudioBuffer::new(samples, self.sample_rate, self.channels)
    }
}
