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


//! Device layer: the SDR receiver behind the sweep.
//!
//! A [`SampleSource`] is tuned once per sweep step and asked for one batch of
//! complex baseband samples. The RTL-SDR implementation needs the `hardware`
//! feature; [`SyntheticSource`] works anywhere.

#[cfg(feature = "hardware")]
mod rtl_sdr;
mod synthetic;

#[cfg(feature = "hardware")]
pub use rtl_sdr::RtlSdrSource;
pub use synthetic::{SyntheticSource, HYDROGEN_LINE_HZ};

use num_complex::Complex;
use thiserror::Error;

/// Errors raised by a sample source.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("failed to configure device: {0}")]
    Configure(String),

    #[error("failed to tune to {frequency_hz} Hz: {reason}")]
    Retune { frequency_hz: f64, reason: String },

    #[error("sample read failed: {0}")]
    Read(String),

    #[error("device is closed")]
    Closed,
}

/// Information about an attached RTL-SDR device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device index (0-based)
    pub index: u32,
    /// Device name (manufacturer + product)
    pub name: String,
    /// Device serial number
    pub serial: String,
}

/// Gain mode for the tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Automatic gain control
    Auto,
    /// Manual gain in tenths of dB (496 = 49.6 dB)
    Manual(i32),
}

impl GainMode {
    /// Manual gain from a value in dB, rounded to the nearest tenth.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "tuner gains are a few hundred tenths at most")]
    pub fn manual_db(db: f64) -> Self {
        Self::Manual((db * 10.0).round() as i32)
    }
}

/// Receiver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Device index to open
    pub device_index: u32,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Initial center frequency in Hz
    pub center_frequency: f64,
    /// Tuner gain
    pub gain: GainMode,
    /// Frequency correction in PPM
    pub ppm_correction: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            sample_rate: 2.048e6,
            center_frequency: 1420e6,
            gain: GainMode::Manual(496),
            ppm_correction: 0,
        }
    }
}

/// A tunable receiver that hands out blocks of complex baseband samples.
///
/// Implementations own the underlying hardware handle. `close` releases it and
/// must be safe to call more than once; every other call on a closed source
/// fails with [`DeviceError::Closed`].
pub trait SampleSource: Send {
    /// Apply sample rate, center frequency, and gain.
    fn configure(&mut self, config: &DeviceConfig) -> Result<(), DeviceError>;

    /// Retune the receiver.
    fn set_center_frequency(&mut self, frequency_hz: f64) -> Result<(), DeviceError>;

    /// Block until `count` samples have been read.
    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex<f32>>, DeviceError>;

    /// Release the hardware handle.
    fn close(&mut self);

    /// Whether the handle is still held.
    fn is_open(&self) -> bool;
}

impl std::fmt::Debug for dyn SampleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSource")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Convert interleaved unsigned 8-bit I/Q into complex samples in [-1.0, 1.0].
///
/// RTL-SDR dongles deliver I, Q, I, Q, ... centred on 127.5. A trailing odd
/// byte is ignored.
#[must_use]
pub fn iq_from_u8(buf: &[u8]) -> Vec<Complex<f32>> {
    buf.chunks_exact(2)
        .map(|pair| {
            Complex::new(
                (f32::from(pair[0]) - 127.5) / 127.5,
                (f32::from(pair[1]) - 127.5) / 127.5,
            )
        })
        .collect()
}

/// Enumerate attached RTL-SDR devices.
#[cfg(feature = "hardware")]
#[must_use]
pub fn list_devices() -> Vec<DeviceInfo> {
    let count = ::rtlsdr::get_device_count();
    let mut devices = Vec::new();

    for i in 0..count {
        let name = ::rtlsdr::get_device_name(i);
        if let Ok(usb_strings) = ::rtlsdr::get_device_usb_strings(i) {
            #[allow(clippy::cast_sign_loss, reason = "device indices are non-negative")]
            devices.push(DeviceInfo {
                index: i as u32,
                name,
                serial: usb_strings.serial,
            });
        }
    }

    devices
}

/// Enumerate attached RTL-SDR devices (always empty without the `hardware` feature).
#[cfg(not(feature = "hardware"))]
#[must_use]
pub fn list_devices() -> Vec<DeviceInfo> {
    log::warn!("RTL-SDR hardware support not compiled (enable 'hardware' feature)");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iq_from_u8_scaling() {
        let samples = iq_from_u8(&[0, 255, 127, 128, 9]);
        assert_eq!(samples.len(), 2);
        assert!((samples[0].re + 1.0).abs() < 1e-6);
        assert!((samples[0].im - 1.0).abs() < 1e-6);
        assert!(samples[1].re.abs() < 0.01);
        assert!(samples[1].im.abs() < 0.01);
    }

    #[test]
    fn test_manual_gain_from_db() {
        assert_eq!(GainMode::manual_db(49.6), GainMode::Manual(496));
        assert_eq!(GainMode::manual_db(0.0), GainMode::Manual(0));
    }

    #[test]
    fn test_default_config_matches_hydrogen_setup() {
        let config = DeviceConfig::default();
        assert_eq!(config.sample_rate, 2.048e6);
        assert_eq!(config.center_frequency, 1420e6);
        assert_eq!(config.gain, GainMode::Manual(496));
    }
}
