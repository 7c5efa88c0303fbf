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


//! Radio telescope sweep library.
//!
//! This crate holds everything needed to sweep an SDR receiver across a band and
//! log what it sees, without any GUI dependency:
//!
//! - **Device layer**: the [`SampleSource`] trait plus an RTL-SDR implementation
//!   (`hardware` feature) and a synthetic source for demo runs
//! - **Pipeline layer**: amplify → Butterworth low-pass → FFT → power spectrum,
//!   and an optional spectrogram of the filtered batch
//! - **Sweep layer**: a [`SweepController`] that runs one sweep at a time on a
//!   background thread and reports each step over a channel
//! - **Recording layer**: CSV rows of pointing, frequency, and peak power
//!
//! # Quick Start
//!
//! ```no_run
//! use telescope_core::{
//!     DeviceConfig, Pointing, SweepConfig, SweepController, SweepEvent, SyntheticSource,
//! };
//!
//! let config = SweepConfig::default();
//! let device = DeviceConfig::default();
//! let (controller, mut events) = SweepController::new(config, move || {
//!     Ok(Box::new(SyntheticSource::open(&device)?))
//! })
//! .expect("valid sweep configuration");
//!
//! controller.start(Pointing::new(90, 45)).expect("device available");
//! while let Some(event) = events.blocking_recv() {
//!     if let SweepEvent::Step(step) = &event {
//!         println!("{:.2} MHz: peak {:.3e}", step.frequency_hz / 1e6, step.peak_power);
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! ```

pub mod device;
pub mod pipeline;
pub mod recording;
pub mod sweep;

pub use device::{list_devices, DeviceConfig, DeviceError, DeviceInfo, GainMode, SampleSource, SyntheticSource};
#[cfg(feature = "hardware")]
pub use device::RtlSdrSource;
pub use pipeline::{FilterError, Pipeline, PipelineConfig, ProcessedBatch, Spectrogram};
pub use recording::{LogRecord, RecordError, ScanRecorder};
pub use sweep::{
    ControlFlags, Pointing, StartOutcome, StepReport, SweepConfig, SweepController, SweepEnd,
    SweepError, SweepEvent, SweepPlan, SweepStatus, SweepSummary,
};
