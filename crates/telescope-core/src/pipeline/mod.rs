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


//! Per-step signal pipeline.
//!
//! amplify → Butterworth low-pass → centred FFT → power spectrum, with an
//! optional spectrogram of the filtered batch. Everything here is pure; the
//! only state a [`Pipeline`] keeps is the designed filter and cached FFT plans.

mod filter;
mod spectrum;

pub use filter::{ButterworthLowPass, FilterError, Section, MAX_ORDER};
pub use spectrum::{
    decimate_max, fft_frequencies, hann_window, peak_power, power_spectrum, spectrum_trace,
    validate_segmenting, Spectrogram, SpectrumAnalyzer, SpectrumTrace,
};

use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Multiply every sample by `factor`.
#[must_use]
pub fn amplify(batch: &[Complex<f32>], factor: f32) -> Vec<Complex<f32>> {
    batch.iter().map(|s| *s * factor).collect()
}

/// Design a Butterworth low-pass and run `batch` through it.
pub fn low_pass_filter(
    batch: &[Complex<f32>],
    cutoff_hz: f64,
    sample_rate_hz: f64,
    order: usize,
) -> Result<Vec<Complex<f32>>, FilterError> {
    Ok(ButterworthLowPass::design(cutoff_hz, sample_rate_hz, order)?.apply(batch))
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scalar gain applied before filtering
    pub amplification: f32,
    /// Low-pass cutoff as a fraction of the sample rate
    pub cutoff_ratio: f64,
    /// Butterworth order
    pub filter_order: usize,
    /// Spectrogram segment length
    pub spectrogram_nfft: usize,
    /// Spectrogram segment overlap
    pub spectrogram_overlap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            amplification: 15.0,
            cutoff_ratio: 0.1,
            filter_order: 5,
            spectrogram_nfft: 1024,
            spectrogram_overlap: 512,
        }
    }
}

/// Result of running one batch through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedBatch {
    /// Centred power spectrum, one value per FFT bin
    pub power: Vec<f32>,
    /// Maximum of `power`
    pub peak_power: f64,
    /// Spectrogram of the filtered batch, when requested
    pub spectrogram: Option<Spectrogram>,
}

/// Validated pipeline for one sample rate.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    sample_rate_hz: f64,
    filter: ButterworthLowPass,
    analyzer: SpectrumAnalyzer,
}

impl Pipeline {
    /// Design the filter and check spectrogram framing up front.
    pub fn new(config: PipelineConfig, sample_rate_hz: f64) -> Result<Self, FilterError> {
        let filter = ButterworthLowPass::design(
            config.cutoff_ratio * sample_rate_hz,
            sample_rate_hz,
            config.filter_order,
        )?;
        validate_segmenting(config.spectrogram_nfft, config.spectrogram_overlap)?;

        Ok(Self {
            config,
            sample_rate_hz,
            filter,
            analyzer: SpectrumAnalyzer::new(),
        })
    }

    #[must_use]
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Run one batch through amplify, filter, and FFT.
    pub fn process(&mut self, batch: &[Complex<f32>], with_spectrogram: bool) -> ProcessedBatch {
        let amplified = amplify(batch, self.config.amplification);
        let filtered = self.filter.apply(&amplified);
        let power = self.analyzer.power_spectrum(&filtered);
        let peak_power = peak_power(&power);

        let spectrogram = if with_spectrogram {
            match self.analyzer.spectrogram(
                &filtered,
                self.sample_rate_hz,
                self.config.spectrogram_nfft,
                self.config.spectrogram_overlap,
            ) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    // Framing was validated in `new`.
                    log::warn!("Spectrogram skipped: {e}");
                    None
                }
            }
        } else {
            None
        };

        ProcessedBatch {
            power,
            peak_power,
            spectrogram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|i| {
                let x = i as f32 / len as f32;
                Complex::new(x - 0.5, 0.25 - x)
            })
            .collect()
    }

    #[test]
    fn test_amplify_then_inverse_recovers_batch() {
        let batch = ramp(512);
        for k in [15.0_f32, 10.0, -3.5, 0.001] {
            let restored = amplify(&amplify(&batch, k), 1.0 / k);
            for (a, b) in batch.iter().zip(&restored) {
                assert!((*a - *b).norm() < 1e-5, "k = {k}");
            }
        }
    }

    #[test]
    fn test_pipeline_on_zero_batch() {
        let mut pipeline = Pipeline::new(PipelineConfig::default(), 2.048e6).unwrap();
        let out = pipeline.process(&vec![Complex::new(0.0, 0.0); 4096], false);
        assert_eq!(out.power.len(), 4096);
        assert!(out.power.iter().all(|p| *p == 0.0));
        assert_eq!(out.peak_power, 0.0);
        assert!(out.spectrogram.is_none());
    }

    #[test]
    fn test_pipeline_spectrogram_on_request() {
        let mut pipeline = Pipeline::new(PipelineConfig::default(), 2.048e6).unwrap();
        let out = pipeline.process(&ramp(4096), true);
        let spec = out.spectrogram.unwrap();
        assert_eq!(spec.nfft, 1024);
        assert!(out.peak_power > 0.0);
    }

    #[test]
    fn test_pipeline_rejects_cutoff_at_nyquist() {
        let config = PipelineConfig {
            cutoff_ratio: 0.5,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config, 2.048e6),
            Err(FilterError::InvalidCutoff { .. })
        ));

        let config = PipelineConfig {
            cutoff_ratio: 0.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config, 2.048e6),
            Err(FilterError::InvalidCutoff { .. })
        ));
    }

    #[test]
    fn test_low_pass_filter_helper_matches_designed_filter() {
        let batch = ramp(256);
        let direct = low_pass_filter(&batch, 204_800.0, 2.048e6, 5).unwrap();
        let designed = ButterworthLowPass::design(204_800.0, 2.048e6, 5).unwrap().apply(&batch);
        assert_eq!(direct, designed);
    }
}
