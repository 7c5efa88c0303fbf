// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Butterworth low-pass filter design and causal IIR filtering.
//!
//! The filter is the digital Butterworth response obtained by the bilinear
//! transform with pre-warping at the cutoff. It is realised as a cascade of
//! second-order sections (plus one first-order section for odd orders), which
//! has the same transfer function as the expanded `b`/`a` polynomial form but
//! stays numerically well behaved at higher orders.

use std::f64::consts::PI;

use num_complex::Complex;
use thiserror::Error;

/// Highest order accepted by [`ButterworthLowPass::design`].
pub const MAX_ORDER: usize = 16;

/// Filter configuration errors, raised at design time.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("cutoff {cutoff_hz} Hz must lie strictly between 0 and Nyquist ({nyquist_hz} Hz)")]
    InvalidCutoff { cutoff_hz: f64, nyquist_hz: f64 },

    #[error("sample rate must be positive and finite, got {0} Hz")]
    InvalidSampleRate(f64),

    #[error("filter order must be between 1 and {MAX_ORDER}, got {0}")]
    InvalidOrder(usize),

    #[error("spectrogram needs 0 <= overlap < segment length, got segment {nfft} with overlap {overlap}")]
    InvalidSegmenting { nfft: usize, overlap: usize },
}

/// One biquad section, coefficients normalised so that `a0 == 1`.
///
/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Section {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Section {
    /// Second-order low-pass section with quality factor `q` at normalised angle `omega`.
    fn second_order(omega: f64, q: f64) -> Self {
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_omega) / 2.0 / a0,
            b1: (1.0 - cos_omega) / a0,
            b2: (1.0 - cos_omega) / 2.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// First-order low-pass section at normalised angle `omega`.
    fn first_order(omega: f64) -> Self {
        let k = (omega / 2.0).tan();
        Self {
            b0: k / (1.0 + k),
            b1: k / (1.0 + k),
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    /// Gain at DC, which is 1 for every low-pass section.
    #[must_use]
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Digital Butterworth low-pass filter.
#[derive(Clone, Debug, PartialEq)]
pub struct ButterworthLowPass {
    sections: Vec<Section>,
    order: usize,
}

impl ButterworthLowPass {
    /// Design an `order`-pole low-pass with the -3 dB point at `cutoff_hz`.
    pub fn design(cutoff_hz: f64, sample_rate_hz: f64, order: usize) -> Result<Self, FilterError> {
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(FilterError::InvalidSampleRate(sample_rate_hz));
        }
        if order == 0 || order > MAX_ORDER {
            return Err(FilterError::InvalidOrder(order));
        }

        let nyquist_hz = sample_rate_hz / 2.0;
        let normal_cutoff = cutoff_hz / nyquist_hz;
        // NaN fails both comparisons.
        if !(normal_cutoff > 0.0 && normal_cutoff < 1.0) {
            return Err(FilterError::InvalidCutoff { cutoff_hz, nyquist_hz });
        }

        let omega = PI * normal_cutoff;
        let mut sections = Vec::with_capacity(order.div_ceil(2));

        for k in 0..order / 2 {
            // Pole pair angle from the negative real axis; odd orders keep a real pole at 0.
            let theta = PI * (order - 1 - 2 * k) as f64 / (2 * order) as f64;
            let q = 1.0 / (2.0 * theta.cos());
            sections.push(Section::second_order(omega, q));
        }
        if order % 2 == 1 {
            sections.push(Section::first_order(omega));
        }

        Ok(Self { sections, order })
    }

    /// Filter order.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Cascade sections, in application order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Filter `input` causally, starting from rest.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "output precision matches the input samples")]
    pub fn apply(&self, input: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let mut signal: Vec<Complex<f64>> = input
            .iter()
            .map(|s| Complex::new(f64::from(s.re), f64::from(s.im)))
            .collect();

        for section in &self.sections {
            // Transposed direct form II.
            let mut z1 = Complex::new(0.0, 0.0);
            let mut z2 = Complex::new(0.0, 0.0);
            for sample in &mut signal {
                let x = *sample;
                let y = x * section.b0 + z1;
                z1 = x * section.b1 - y * section.a1 + z2;
                z2 = x * section.b2 - y * section.a2;
                *sample = y;
            }
        }

        signal
            .into_iter()
            .map(|s| Complex::new(s.re as f32, s.im as f32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 2.048e6;

    #[allow(clippy::cast_possible_truncation, reason = "test signal")]
    fn tone(freq_hz: f64, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * freq_hz * n as f64 / FS;
                Complex::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }

    fn rms_tail(signal: &[Complex<f32>]) -> f32 {
        let tail = &signal[signal.len() / 2..];
        (tail.iter().map(num_complex::Complex::norm_sqr).sum::<f32>() / tail.len() as f32).sqrt()
    }

    #[test]
    fn test_fifth_order_section_layout() {
        let filter = ButterworthLowPass::design(0.1 * FS, FS, 5).unwrap();
        assert_eq!(filter.order(), 5);
        assert_eq!(filter.sections().len(), 3);
        assert_eq!(filter.sections()[2].b2, 0.0);
        for section in filter.sections() {
            assert!((section.dc_gain() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_passband_and_stopband() {
        let filter = ButterworthLowPass::design(0.1 * FS, FS, 5).unwrap();

        let passed = filter.apply(&tone(0.01 * FS, 8192));
        assert!((rms_tail(&passed) - 1.0).abs() < 0.01);

        let stopped = filter.apply(&tone(0.4 * FS, 8192));
        assert!(rms_tail(&stopped) < 1e-3);
    }

    #[test]
    fn test_cutoff_is_half_power_point() {
        for order in [2, 3, 4, 5] {
            let filter = ButterworthLowPass::design(0.1 * FS, FS, order).unwrap();
            let at_cutoff = filter.apply(&tone(0.1 * FS, 16384));
            let gain = rms_tail(&at_cutoff);
            assert!(
                (gain - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01,
                "order {order}: gain {gain}"
            );
        }
    }

    fn poly_mul(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; lhs.len() + rhs.len() - 1];
        for (i, a) in lhs.iter().enumerate() {
            for (j, b) in rhs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        out
    }

    #[test]
    fn test_fifth_order_matches_reference_polynomials() {
        // butter(5, 0.2) in the usual (b, a) polynomial form.
        let b_ref = [
            1.282_581_079_0e-3,
            6.412_905_394_8e-3,
            1.282_581_079_0e-2,
            1.282_581_079_0e-2,
            6.412_905_394_8e-3,
            1.282_581_079_0e-3,
        ];
        let a_ref = [
            1.0,
            -2.975_422_109_7,
            3.806_018_119_3,
            -2.545_252_868_3,
            0.881_130_075_44,
            -0.125_430_622_16,
        ];

        let filter = ButterworthLowPass::design(0.1 * FS, FS, 5).unwrap();
        let (mut b, mut a) = (vec![1.0], vec![1.0]);
        for section in filter.sections() {
            let (sb, sa) = if section.b2 == 0.0 && section.a2 == 0.0 {
                (vec![section.b0, section.b1], vec![1.0, section.a1])
            } else {
                (
                    vec![section.b0, section.b1, section.b2],
                    vec![1.0, section.a1, section.a2],
                )
            };
            b = poly_mul(&b, &sb);
            a = poly_mul(&a, &sa);
        }

        assert_eq!(b.len(), 6);
        assert_eq!(a.len(), 6);
        for (got, want) in b.iter().zip(b_ref) {
            assert!((got - want).abs() < 1e-9, "b: {got} vs {want}");
        }
        for (got, want) in a.iter().zip(a_ref) {
            assert!((got - want).abs() < 1e-8, "a: {got} vs {want}");
        }
    }

    #[test]
    fn test_zero_input_stays_zero() {
        let filter = ButterworthLowPass::design(0.1 * FS, FS, 5).unwrap();
        let out = filter.apply(&vec![Complex::new(0.0, 0.0); 1024]);
        assert!(out.iter().all(|s| s.re == 0.0 && s.im == 0.0));
    }

    #[test]
    fn test_rejects_degenerate_cutoff() {
        for cutoff in [0.0, -1.0, FS / 2.0, FS, f64::NAN] {
            let err = ButterworthLowPass::design(cutoff, FS, 5).unwrap_err();
            assert!(matches!(err, FilterError::InvalidCutoff { .. }), "cutoff {cutoff}");
        }
    }

    #[test]
    fn test_rejects_bad_order_and_rate() {
        assert_eq!(
            ButterworthLowPass::design(1e5, FS, 0).unwrap_err(),
            FilterError::InvalidOrder(0)
        );
        assert!(matches!(
            ButterworthLowPass::design(1e5, 0.0, 5),
            Err(FilterError::InvalidSampleRate(_))
        ));
    }
}
