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


//! Synthetic sample source for demo runs without hardware.
//!
//! Produces 8-bit quantised noise like an RTL-SDR would, plus a weak tone at
//! the neutral hydrogen line whenever that line falls inside the tuned band.

use std::f64::consts::TAU;

use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{iq_from_u8, DeviceConfig, DeviceError, SampleSource};

/// Rest frequency of the 21 cm neutral hydrogen line.
pub const HYDROGEN_LINE_HZ: f64 = 1_420_405_751.768;

const TONE_AMPLITUDE: f64 = 0.25;
const NOISE_AMPLITUDE: f64 = 0.1;
const DEFAULT_SEED: u64 = 0x21C3;

/// Hardware-free [`SampleSource`].
#[derive(Debug)]
pub struct SyntheticSource {
    config: DeviceConfig,
    rng: StdRng,
    phase: f64,
    open: bool,
}

impl SyntheticSource {
    /// Open a synthetic source with the default seed.
    pub fn open(config: &DeviceConfig) -> Result<Self, DeviceError> {
        Self::with_seed(config, DEFAULT_SEED)
    }

    /// Open a synthetic source whose noise comes from `seed`.
    pub fn with_seed(config: &DeviceConfig, seed: u64) -> Result<Self, DeviceError> {
        let mut source = Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed),
            phase: 0.0,
            open: true,
        };
        source.configure(config)?;
        log::info!("Synthetic source ready (seed {seed:#x})");
        Ok(source)
    }

    /// Offset of the hydrogen line from the tuned center, if it is in band.
    fn tone_offset(&self) -> Option<f64> {
        let offset = HYDROGEN_LINE_HZ - self.config.center_frequency;
        (offset.abs() < self.config.sample_rate / 2.0).then_some(offset)
    }

    fn quantise(value: f64) -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "clamped to u8 range")]
        let byte = (value * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8;
        byte
    }
}

impl SampleSource for SyntheticSource {
    fn configure(&mut self, config: &DeviceConfig) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::Closed);
        }
        if config.sample_rate <= 0.0 {
            return Err(DeviceError::Configure(format!(
                "sample rate must be positive, got {}",
                config.sample_rate
            )));
        }
        self.config = config.clone();
        Ok(())
    }

    fn set_center_frequency(&mut self, frequency_hz: f64) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::Closed);
        }
        if frequency_hz <= 0.0 {
            return Err(DeviceError::Retune {
                frequency_hz,
                reason: "frequency must be positive".to_string(),
            });
        }
        self.config.center_frequency = frequency_hz;
        Ok(())
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex<f32>>, DeviceError> {
        if !self.open {
            return Err(DeviceError::Closed);
        }

        let step = self
            .tone_offset()
            .map(|offset| TAU * offset / self.config.sample_rate);
        let mut raw = Vec::with_capacity(count * 2);

        for _ in 0..count {
            let mut i = self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE);
            let mut q = self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE);
            if let Some(step) = step {
                i += TONE_AMPLITUDE * self.phase.cos();
                q += TONE_AMPLITUDE * self.phase.sin();
                self.phase = (self.phase + step) % TAU;
            }
            raw.push(Self::quantise(i));
            raw.push(Self::quantise(q));
        }

        Ok(iq_from_u8(&raw))
    }

    fn close(&mut self) {
        if self.open {
            log::info!("Synthetic source closed");
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_returns_requested_count_in_range() {
        let mut source = SyntheticSource::open(&DeviceConfig::default()).unwrap();
        let samples = source.read_samples(4096).unwrap();
        assert_eq!(samples.len(), 4096);
        assert!(samples.iter().all(|s| s.re.abs() <= 1.0 && s.im.abs() <= 1.0));
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let config = DeviceConfig::default();
        let mut a = SyntheticSource::with_seed(&config, 7).unwrap();
        let mut b = SyntheticSource::with_seed(&config, 7).unwrap();
        assert_eq!(a.read_samples(256).unwrap(), b.read_samples(256).unwrap());
    }

    #[test]
    fn test_tone_only_in_band() {
        let mut source = SyntheticSource::open(&DeviceConfig::default()).unwrap();
        assert!(source.tone_offset().is_some());
        source.set_center_frequency(1400e6).unwrap();
        assert!(source.tone_offset().is_none());
    }

    #[test]
    fn test_closed_source_rejects_reads() {
        let mut source = SyntheticSource::open(&DeviceConfig::default()).unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(matches!(source.read_samples(16), Err(DeviceError::Closed)));
        assert!(matches!(source.set_center_frequency(1.4e9), Err(DeviceError::Closed)));
    }
}
