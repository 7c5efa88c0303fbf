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


//! FFT-based spectra: centred power spectrum, bin axis, and spectrogram.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::FilterError;

/// Floor applied before taking logarithms so empty bins stay finite.
const POWER_FLOOR: f32 = 1e-20;

/// Reusable FFT plans keyed by length.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
    cached: Option<(usize, Arc<dyn Fft<f32>>)>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("planned_len", &self.cached.as_ref().map(|(len, _)| *len))
            .finish_non_exhaustive()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            cached: None,
        }
    }

    fn plan(&mut self, len: usize) -> Arc<dyn Fft<f32>> {
        match &self.cached {
            Some((cached_len, fft)) if *cached_len == len => Arc::clone(fft),
            _ => {
                let fft = self.planner.plan_fft_forward(len);
                self.cached = Some((len, Arc::clone(&fft)));
                fft
            }
        }
    }

    /// Forward FFT, shifted so the zero-frequency bin sits in the middle.
    pub fn centered_fft(&mut self, batch: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let mut buffer = batch.to_vec();
        if buffer.is_empty() {
            return buffer;
        }
        self.plan(buffer.len()).process(&mut buffer);
        let half = buffer.len() / 2;
        buffer.rotate_right(half);
        buffer
    }

    /// Squared magnitude of the centred FFT, one value per bin.
    pub fn power_spectrum(&mut self, batch: &[Complex<f32>]) -> Vec<f32> {
        self.centered_fft(batch)
            .iter()
            .map(Complex::norm_sqr)
            .collect()
    }
}

/// Power spectrum of one batch (plans a fresh FFT; use [`SpectrumAnalyzer`] in loops).
#[must_use]
pub fn power_spectrum(batch: &[Complex<f32>]) -> Vec<f32> {
    SpectrumAnalyzer::new().power_spectrum(batch)
}

/// Zero-centred frequency of each bin of an `n`-point centred FFT, in Hz.
#[must_use]
pub fn fft_frequencies(n: usize, sample_rate_hz: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let resolution = sample_rate_hz / n as f64;
    let first = -((n / 2) as f64);
    (0..n).map(|k| (first + k as f64) * resolution).collect()
}

/// Maximum power in a spectrum; zero when empty.
#[must_use]
pub fn peak_power(spectrum: &[f32]) -> f64 {
    spectrum
        .iter()
        .copied()
        .fold(None, |max: Option<f32>, v| Some(max.map_or(v, |m| m.max(v))))
        .map_or(0.0, f64::from)
}

/// Power spectrum reduced to a display-sized trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumTrace {
    /// Bin centre offsets from the tuned frequency, in Hz
    pub frequencies_hz: Vec<f64>,
    /// Max-hold power per display bin
    pub power: Vec<f32>,
}

/// Max-hold decimation of `values` to at most `max_points` entries.
#[must_use]
pub fn decimate_max(values: &[f32], max_points: usize) -> Vec<f32> {
    if max_points == 0 || values.len() <= max_points {
        return values.to_vec();
    }
    let chunk = values.len().div_ceil(max_points);
    values
        .chunks(chunk)
        .map(|c| c.iter().copied().fold(f32::NEG_INFINITY, f32::max))
        .collect()
}

/// Decimate a centred power spectrum together with its frequency axis.
#[must_use]
pub fn spectrum_trace(power: &[f32], sample_rate_hz: f64, max_points: usize) -> SpectrumTrace {
    let frequencies = fft_frequencies(power.len(), sample_rate_hz);
    if max_points == 0 || power.len() <= max_points {
        return SpectrumTrace {
            frequencies_hz: frequencies,
            power: power.to_vec(),
        };
    }
    let chunk = power.len().div_ceil(max_points);
    SpectrumTrace {
        frequencies_hz: frequencies
            .chunks(chunk)
            .map(|c| c.iter().sum::<f64>() / c.len() as f64)
            .collect(),
        power: decimate_max(power, max_points),
    }
}

/// Short-time power spectral density of one batch.
///
/// Rows are time segments in order; each row holds `nfft` zero-centred bins in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub nfft: usize,
    pub rows: usize,
    pub sample_rate_hz: f64,
    pub values_db: Vec<f32>,
}

impl Spectrogram {
    /// One time segment, or `None` past the last row.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        self.values_db.get(index * self.nfft..(index + 1) * self.nfft)
    }

    /// Smallest and largest dB value, if any.
    #[must_use]
    pub fn range_db(&self) -> Option<(f32, f32)> {
        let mut iter = self.values_db.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

/// Symmetric Hann window.
#[must_use]
pub fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    #[allow(clippy::cast_possible_truncation, reason = "window weights are in [0, 1]")]
    let window = (0..len)
        .map(|n| (0.5 - 0.5 * (2.0 * PI * n as f64 / denom).cos()) as f32)
        .collect();
    window
}

/// Check segment length and overlap for [`spectrogram`].
pub fn validate_segmenting(nfft: usize, overlap: usize) -> Result<(), FilterError> {
    if nfft == 0 || overlap >= nfft {
        return Err(FilterError::InvalidSegmenting { nfft, overlap });
    }
    Ok(())
}

impl SpectrumAnalyzer {
    /// Hann-windowed spectrogram with `nfft`-sample segments overlapping by `overlap`.
    ///
    /// A batch shorter than one segment is zero-padded to a single row.
    pub fn spectrogram(
        &mut self,
        batch: &[Complex<f32>],
        sample_rate_hz: f64,
        nfft: usize,
        overlap: usize,
    ) -> Result<Spectrogram, FilterError> {
        validate_segmenting(nfft, overlap)?;

        let window = hann_window(nfft);
        let window_energy: f64 = window.iter().map(|w| f64::from(*w * *w)).sum();
        #[allow(clippy::cast_possible_truncation, reason = "scale factor fits f32")]
        let scale = (1.0 / (sample_rate_hz * window_energy)) as f32;
        let hop = nfft - overlap;
        let rows = if batch.len() < nfft {
            1
        } else {
            (batch.len() - overlap) / hop
        };

        let mut values_db = Vec::with_capacity(rows * nfft);
        let mut segment = vec![Complex::new(0.0, 0.0); nfft];

        for row in 0..rows {
            let start = row * hop;
            for (i, slot) in segment.iter_mut().enumerate() {
                let sample = batch.get(start + i).copied().unwrap_or_default();
                *slot = sample * window[i];
            }
            let spectrum = self.centered_fft(&segment);
            values_db.extend(
                spectrum
                    .iter()
                    .map(|x| 10.0 * (x.norm_sqr() * scale).max(POWER_FLOOR).log10()),
            );
        }

        Ok(Spectrogram {
            nfft,
            rows,
            sample_rate_hz,
            values_db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_batch_has_zero_spectrum() {
        let power = power_spectrum(&vec![Complex::new(0.0, 0.0); 1024]);
        assert_eq!(power.len(), 1024);
        assert!(power.iter().all(|p| *p == 0.0));
        assert_eq!(peak_power(&power), 0.0);
    }

    #[test]
    fn test_dc_lands_in_center_bin() {
        let power = power_spectrum(&vec![Complex::new(1.0, 0.0); 8]);
        assert!((power[4] - 64.0).abs() < 1e-3);
        let others: f32 = power.iter().enumerate().filter(|(i, _)| *i != 4).map(|(_, p)| p).sum();
        assert!(others < 1e-6);
    }

    #[test]
    fn test_fft_frequencies_are_zero_centered() {
        assert_eq!(fft_frequencies(4, 4.0), vec![-2.0, -1.0, 0.0, 1.0]);
        assert_eq!(fft_frequencies(5, 5.0), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert!(fft_frequencies(0, 1.0).is_empty());
    }

    #[test]
    fn test_positive_tone_lands_above_center() {
        let n = 64;
        let fs = 64.0;
        #[allow(clippy::cast_possible_truncation, reason = "test signal")]
        let tone: Vec<Complex<f32>> = (0..n)
            .map(|k| {
                let phase = 2.0 * PI * 8.0 * f64::from(k) / fs;
                Complex::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect();
        let power = power_spectrum(&tone);
        let freqs = fft_frequencies(power.len(), fs);
        let peak_bin = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((freqs[peak_bin] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_decimate_keeps_maxima() {
        let values = [1.0, 5.0, 2.0, 2.0, 9.0, 0.0, 3.0];
        assert_eq!(decimate_max(&values, 3), vec![5.0, 9.0, 3.0]);
        assert_eq!(decimate_max(&values, 10), values.to_vec());
    }

    #[test]
    fn test_spectrum_trace_axis_matches_power() {
        let power = vec![1.0_f32; 4096];
        let trace = spectrum_trace(&power, 2.048e6, 512);
        assert_eq!(trace.power.len(), 512);
        assert_eq!(trace.frequencies_hz.len(), 512);
        assert!(trace.frequencies_hz.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_spectrogram_shape() {
        let batch = vec![Complex::new(0.5, -0.5); 4096];
        let mut analyzer = SpectrumAnalyzer::new();
        let spec = analyzer.spectrogram(&batch, 2.048e6, 1024, 512).unwrap();
        assert_eq!(spec.nfft, 1024);
        assert_eq!(spec.rows, 7);
        assert_eq!(spec.values_db.len(), 7 * 1024);
        assert_eq!(spec.row(6).map(<[f32]>::len), Some(1024));
        assert!(spec.row(7).is_none());
        assert!(spec.values_db.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_spectrogram_rejects_bad_overlap() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert!(analyzer.spectrogram(&[], 1.0, 256, 256).is_err());
        assert!(analyzer.spectrogram(&[], 1.0, 0, 0).is_err());
    }

    #[test]
    fn test_short_batch_gives_single_row() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spec = analyzer
            .spectrogram(&[Complex::new(1.0, 0.0); 100], 1.0, 256, 128)
            .unwrap();
        assert_eq!(spec.rows, 1);
    }
}
