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


//! Sweep layer: frequency plan, controller, and the events it reports.
//!
//! A sweep retunes the device to each planned frequency in increasing order,
//! reads one batch, runs the [`Pipeline`](crate::Pipeline), optionally logs the
//! peak power, and emits a [`SweepEvent::Step`] for the display. Only one
//! sweep runs at a time; see [`SweepController`].

mod controller;
mod state;

pub use controller::{DeviceOpener, SweepController};
pub use state::{ControlFlags, SweepStatus};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceError;
use crate::pipeline::{FilterError, PipelineConfig, Spectrogram, SpectrumTrace};
use crate::recording::{RecordError, DEFAULT_LOG_FILE};

/// Errors that end a sweep or prevent one from starting.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("filter configuration error: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("invalid sweep plan: {0}")]
    InvalidPlan(String),

    #[error("sweep worker failed: {0}")]
    Worker(String),
}

/// Linearly spaced frequency list, endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepPlan {
    /// First frequency in Hz
    pub start_hz: f64,
    /// Last frequency in Hz
    pub stop_hz: f64,
    /// Number of frequencies
    pub points: usize,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            start_hz: 1400e6,
            stop_hz: 1430e6,
            points: 100,
        }
    }
}

impl SweepPlan {
    /// The planned frequencies, in increasing order.
    #[must_use]
    pub fn frequencies(&self) -> Vec<f64> {
        match self.points {
            0 => Vec::new(),
            1 => vec![self.start_hz],
            n => {
                let step = (self.stop_hz - self.start_hz) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        if i == n - 1 {
                            self.stop_hz
                        } else {
                            self.start_hz + step * i as f64
                        }
                    })
                    .collect()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.points == 0 {
            return Err(SweepError::InvalidPlan("at least one point is required".to_string()));
        }
        if !(self.start_hz.is_finite() && self.stop_hz.is_finite()) || self.start_hz <= 0.0 {
            return Err(SweepError::InvalidPlan(format!(
                "frequencies must be positive and finite, got {} to {} Hz",
                self.start_hz, self.stop_hz
            )));
        }
        if self.stop_hz < self.start_hz {
            return Err(SweepError::InvalidPlan(format!(
                "stop {} Hz is below start {} Hz",
                self.stop_hz, self.start_hz
            )));
        }
        Ok(())
    }
}

/// Everything a sweep needs besides the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Frequencies to visit
    pub plan: SweepPlan,
    /// Per-step processing
    pub pipeline: PipelineConfig,
    /// Device sample rate in Hz
    pub sample_rate_hz: f64,
    /// Samples read per step
    pub batch_size: usize,
    /// Pause after each step, in milliseconds
    pub step_pause_ms: u64,
    /// CSV log path
    pub log_path: PathBuf,
    /// Maximum points in the spectrum trace sent to the display
    pub display_points: usize,
    /// Capacity of the event channel
    pub event_buffer: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            plan: SweepPlan::default(),
            pipeline: PipelineConfig::default(),
            sample_rate_hz: 2.048e6,
            batch_size: 256 * 1024,
            step_pause_ms: 100,
            log_path: PathBuf::from(DEFAULT_LOG_FILE),
            display_points: 2048,
            event_buffer: 64,
        }
    }
}

impl SweepConfig {
    #[must_use]
    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.step_pause_ms)
    }

    /// Check the plan, batch size, and filter before any sweep starts.
    pub fn validate(&self) -> Result<(), SweepError> {
        self.plan.validate()?;
        if self.batch_size == 0 {
            return Err(SweepError::InvalidPlan("batch size must be non-zero".to_string()));
        }
        crate::pipeline::Pipeline::new(self.pipeline.clone(), self.sample_rate_hz)?;
        Ok(())
    }
}

/// Antenna pointing, in whole degrees. Fixed for the duration of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pointing {
    pub azimuth: u32,
    pub elevation: u32,
}

impl Pointing {
    /// Highest angle the pointing controls allow.
    pub const MAX_DEGREES: u32 = 180;

    /// Build a pointing, clamping both angles to 0..=180.
    #[must_use]
    pub fn new(azimuth: u32, elevation: u32) -> Self {
        Self {
            azimuth: azimuth.min(Self::MAX_DEGREES),
            elevation: elevation.min(Self::MAX_DEGREES),
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new sweep thread was spawned
    Started,
    /// A sweep was already active; nothing changed
    AlreadyRunning,
}

/// Why a sweep ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepEnd {
    /// Every planned frequency was processed
    Completed,
    /// A stop request was observed
    Stopped,
}

/// Totals for one finished sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub steps_completed: usize,
    pub rows_written: usize,
    pub end: SweepEnd,
}

/// Per-step data handed to the display.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Zero-based step index
    pub index: usize,
    /// Planned step count
    pub total: usize,
    /// Tuned center frequency in Hz
    pub frequency_hz: f64,
    /// Peak of the full-resolution power spectrum
    pub peak_power: f64,
    /// Display-sized power spectrum
    pub trace: SpectrumTrace,
    /// Spectrogram of the filtered batch, when enabled
    pub spectrogram: Option<Spectrogram>,
    /// Whether a log row was written for this step
    pub recorded: bool,
}

/// Messages from the sweep thread to the UI.
#[derive(Debug, Clone)]
pub enum SweepEvent {
    Started {
        pointing: Pointing,
        recording: bool,
        total_steps: usize,
    },
    Step(Box<StepReport>),
    Finished(SweepSummary),
    Failed(String),
}

impl SweepEvent {
    /// True for the last event of a sweep.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_matches_hydrogen_band() {
        let freqs = SweepPlan::default().frequencies();
        assert_eq!(freqs.len(), 100);
        assert_eq!(freqs[0], 1400e6);
        assert_eq!(freqs[99], 1430e6);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
        let step = 30e6 / 99.0;
        assert!((freqs[1] - freqs[0] - step).abs() < 1e-3);
    }

    #[test]
    fn test_plan_edge_cases() {
        let single = SweepPlan {
            start_hz: 1420e6,
            stop_hz: 1430e6,
            points: 1,
        };
        assert_eq!(single.frequencies(), vec![1420e6]);

        let empty = SweepPlan {
            points: 0,
            ..SweepPlan::default()
        };
        assert!(empty.frequencies().is_empty());
        assert!(empty.validate().is_err());

        let reversed = SweepPlan {
            start_hz: 1430e6,
            stop_hz: 1400e6,
            points: 10,
        };
        assert!(reversed.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_cutoff() {
        let mut config = SweepConfig::default();
        assert!(config.validate().is_ok());

        config.pipeline.cutoff_ratio = 0.0;
        assert!(matches!(config.validate(), Err(SweepError::Filter(_))));

        config.pipeline.cutoff_ratio = 0.5;
        assert!(matches!(config.validate(), Err(SweepError::Filter(_))));
    }

    #[test]
    fn test_pointing_is_clamped() {
        let p = Pointing::new(200, 45);
        assert_eq!(p.azimuth, 180);
        assert_eq!(p.elevation, 45);
    }
}
