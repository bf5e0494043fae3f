//! Zero-phase Butterworth high-pass filter
//!
//! The 5th-order design is a cascade of one first-order and two
//! second-order sections, each obtained by the bilinear transform with
//! frequency prewarping at the cutoff. Filtering runs forward then
//! backward over an odd-extended signal with steady-state initial
//! conditions, so the result has no phase shift and no start-up transient.

use std::f64::consts::PI;

/// Rumble filter applied to the 16 kHz input before conversion
pub const HIGH_PASS_ORDER: usize = 5;
pub const HIGH_PASS_CUTOFF_HZ: f64 = 48.0;

/// Transposed direct form II section with `a0 = 1`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Section {
    b: [f64; 3],
    a: [f64; 3],
}

impl Section {
    fn first_order_high_pass(k: f64) -> Self {
        let norm = 1.0 / (1.0 + k);
        Section {
            b: [norm, -norm, 0.0],
            a: [1.0, (k - 1.0) * norm, 0.0],
        }
    }

    fn second_order_high_pass(w0: f64, q: f64) -> Self {
        let cos = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Section {
            b: [
                (1.0 + cos) / 2.0 / a0,
                -(1.0 + cos) / a0,
                (1.0 + cos) / 2.0 / a0,
            ],
            a: [1.0, -2.0 * cos / a0, (1.0 - alpha) / a0],
        }
    }

    fn dc_gain(&self) -> f64 {
        let den = self.a.iter().sum::<f64>();
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            self.b.iter().sum::<f64>() / den
        }
    }

    /// Filter state after an infinitely long constant input of 1
    fn steady_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * y;
        let z1 = self.b[1] - self.a[1] * y + z2;
        [z1, z2]
    }

    fn run(&self, data: &mut [f64], mut state: [f64; 2]) {
        for x in data.iter_mut() {
            let input = *x;
            let y = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[1] * y + state[1];
            state[1] = self.b[2] * input - self.a[2] * y;
            *x = y;
        }
    }
}

/// Butterworth high-pass as cascaded sections
#[derive(Debug, Clone, PartialEq)]
pub struct HighPassFilter {
    sections: Vec<Section>,
}

impl HighPassFilter {
    /// Design an `order`-pole Butterworth high-pass at `cutoff_hz`
    pub fn butterworth(order: usize, cutoff_hz: f64, sample_rate: u32) -> Self {
        let order = order.max(1);
        let nyquist = sample_rate as f64 / 2.0;
        let cutoff = cutoff_hz.clamp(1e-3, nyquist * 0.999);
        let w0 = 2.0 * PI * cutoff / sample_rate as f64;

        let mut sections = Vec::with_capacity(order.div_ceil(2));
        if order % 2 == 1 {
            sections.push(Section::first_order_high_pass((w0 / 2.0).tan()));
        }
        // Conjugate pole pairs at angle psi from the negative real axis
        for k in 0..order / 2 {
            let psi = if order % 2 == 1 {
                PI * (k + 1) as f64 / order as f64
            } else {
                PI * (2 * k + 1) as f64 / (2 * order) as f64
            };
            let q = 1.0 / (2.0 * psi.cos());
            sections.push(Section::second_order_high_pass(w0, q));
        }
        Self { sections }
    }

    /// The 48 Hz rumble filter used on 16 kHz analysis audio
    pub fn rumble(sample_rate: u32) -> Self {
        Self::butterworth(HIGH_PASS_ORDER, HIGH_PASS_CUTOFF_HZ, sample_rate)
    }

    /// Number of extension samples on each side for forward-backward runs
    fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    fn run_cascade(&self, data: &mut [f64]) {
        let Some(&first) = data.first() else {
            return;
        };
        let mut scale = first;
        for section in &self.sections {
            let zi = section.steady_state();
            section.run(data, [zi[0] * scale, zi[1] * scale]);
            scale *= section.dc_gain();
        }
    }

    /// Forward-backward filtering; output length equals input length
    pub fn filtfilt(&self, input: &[f32]) -> Vec<f32> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = self.pad_len().min(n - 1);

        // Odd extension: 2*x[0] - x[pad..0], x, 2*x[n-1] - x[n-2..n-1-pad]
        let first = input[0] as f64;
        let last = input[n - 1] as f64;
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - input[i] as f64));
        ext.extend(input.iter().map(|&x| x as f64));
        ext.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i] as f64));

        self.run_cascade(&mut ext);
        ext.reverse();
        self.run_cascade(&mut ext);
        ext.reverse();

        ext[pad..pad + n].iter().map(|&x| x as f32).collect()
    }
}
