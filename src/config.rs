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


//! Application configuration management.
//!
//! Settings persist as TOML through `confy` and are created with defaults on
//! first run. Command-line flags override them for a single session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use telescope_core::{DeviceConfig, GainMode, SweepConfig};

const APP_NAME: &str = "telescope-desktop";
const CONFIG_NAME: &str = "config";

/// Current configuration schema version
const CONFIG_VERSION: u32 = 1;

/// Receiver settings stored on disk
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReceiverSettings {
    /// RTL-SDR device index
    pub device_index: u32,

    /// Manual tuner gain in tenths of a dB; `None` selects automatic gain
    pub gain_tenths_db: Option<i32>,

    /// Frequency correction in PPM
    pub ppm_correction: i32,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            gain_tenths_db: Some(496),
            ppm_correction: 0,
        }
    }
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    #[serde(default)]
    pub receiver: ReceiverSettings,

    /// Sweep plan, processing chain, and log path
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Use the synthetic receiver instead of hardware
    #[serde(default)]
    pub demo: bool,

    /// Compute spectrograms from the first sweep on
    #[serde(default)]
    pub spectrogram_enabled: bool,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            receiver: ReceiverSettings::default(),
            sweep: SweepConfig::default(),
            demo: false,
            spectrogram_enabled: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, writing defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        let config: AppConfig = confy::load(APP_NAME, CONFIG_NAME)?;
        if config.config_version != CONFIG_VERSION {
            log::warn!(
                "Config schema version {} differs from {}; missing fields use defaults",
                config.config_version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Device settings for the sweep's sample rate and first frequency
    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            device_index: self.receiver.device_index,
            sample_rate: self.sweep.sample_rate_hz,
            center_frequency: self.sweep.plan.start_hz,
            gain: self.receiver.gain_tenths_db.map_or(GainMode::Auto, GainMode::Manual),
            ppm_correction: self.receiver.ppm_correction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = AppConfig::default();
        confy::store_path(&path, &config).unwrap();
        let loaded: AppConfig = confy::load_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "demo = true\n\n[sweep.plan]\npoints = 25\n").unwrap();

        let loaded: AppConfig = confy::load_path(&path).unwrap();
        assert!(loaded.demo);
        assert_eq!(loaded.sweep.plan.points, 25);
        assert_eq!(loaded.sweep.plan.start_hz, 1400e6);
        assert_eq!(loaded.receiver, ReceiverSettings::default());
    }

    #[test]
    fn test_device_config_follows_sweep() {
        let mut config = AppConfig::default();
        config.receiver.gain_tenths_db = None;
        let device = config.device_config();
        assert_eq!(device.gain, GainMode::Auto);
        assert_eq!(device.center_frequency, config.sweep.plan.start_hz);
        assert_eq!(device.sample_rate, config.sweep.sample_rate_hz);
    }
}
