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


//! Sweep controller and the per-sweep worker thread.
//!
//! The controller owns the device slot between sweeps. A sweep thread locks
//! the slot for its whole run, so the UI side can only ask it to stop. Results
//! travel back over a bounded channel and are dropped, not queued, when the
//! display falls behind; the worker never blocks on the UI.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{
    ControlFlags, Pointing, StartOutcome, StepReport, SweepConfig, SweepEnd, SweepError,
    SweepEvent, SweepStatus, SweepSummary,
};
use crate::device::{DeviceError, SampleSource};
use crate::pipeline::{spectrum_trace, Pipeline};
use crate::recording::{LogRecord, ScanRecorder};

/// Opens (or reopens) the sample source.
pub type DeviceOpener = Box<dyn Fn() -> Result<Box<dyn SampleSource>, DeviceError> + Send + Sync>;

type DeviceSlot = Arc<Mutex<Option<Box<dyn SampleSource>>>>;
type Worker = JoinHandle<Result<SweepSummary, SweepError>>;

/// Runs at most one sweep at a time on a background thread.
pub struct SweepController {
    config: SweepConfig,
    flags: Arc<ControlFlags>,
    device: DeviceSlot,
    opener: DeviceOpener,
    log_path: Mutex<PathBuf>,
    events: mpsc::Sender<SweepEvent>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for SweepController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepController")
            .field("config", &self.config)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl SweepController {
    /// Validate `config`, open the device, and return the controller with its
    /// event receiver.
    ///
    /// Fails with [`SweepError::Filter`] for a bad cutoff and with
    /// [`SweepError::Device`] when the receiver cannot be opened.
    pub fn new<F>(config: SweepConfig, opener: F) -> Result<(Self, mpsc::Receiver<SweepEvent>), SweepError>
    where
        F: Fn() -> Result<Box<dyn SampleSource>, DeviceError> + Send + Sync + 'static,
    {
        config.validate()?;
        let source = opener()?;
        let (events, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let log_path = Mutex::new(config.log_path.clone());

        Ok((
            Self {
                config,
                flags: Arc::new(ControlFlags::new()),
                device: Arc::new(Mutex::new(Some(source))),
                opener: Box::new(opener),
                log_path,
                events,
                worker: Mutex::new(None),
            },
            event_rx,
        ))
    }

    #[must_use]
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    #[must_use]
    pub fn status(&self) -> SweepStatus {
        self.flags.status()
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.flags.is_active()
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.flags.recording()
    }

    #[must_use]
    pub fn is_spectrogram_enabled(&self) -> bool {
        self.flags.spectrogram()
    }

    /// Flip recording. Only a sweep started while recording is on opens the log.
    pub fn toggle_recording(&self) -> bool {
        let enabled = self.flags.toggle_recording();
        info!("Recording {}", if enabled { "ON" } else { "OFF" });
        enabled
    }

    pub fn set_recording(&self, enabled: bool) {
        self.flags.set_recording(enabled);
    }

    /// Flip spectrogram computation for subsequent steps.
    pub fn toggle_spectrogram(&self) -> bool {
        let enabled = self.flags.toggle_spectrogram();
        info!("Spectrogram {}", if enabled { "ON" } else { "OFF" });
        enabled
    }

    pub fn set_spectrogram(&self, enabled: bool) {
        self.flags.set_spectrogram(enabled);
    }

    /// Log file used by the next sweep.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_path.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_log_path(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        info!("Scan log path set to {}", path.display());
        *self.log_path.lock().unwrap_or_else(PoisonError::into_inner) = path;
    }

    /// Whether a device handle is currently held (by the controller or a sweep).
    #[must_use]
    pub fn device_available(&self) -> bool {
        match self.device.try_lock() {
            Ok(slot) => slot.is_some(),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(slot)) => slot.into_inner().is_some(),
        }
    }

    /// Start a sweep at `pointing`.
    ///
    /// Returns [`StartOutcome::AlreadyRunning`] without side effects when a
    /// sweep is active. Reopens the device if a previous sweep closed it.
    pub fn start(&self, pointing: Pointing) -> Result<StartOutcome, SweepError> {
        if !self.flags.try_begin() {
            debug!("Start ignored: a sweep is already active");
            return Ok(StartOutcome::AlreadyRunning);
        }

        match self.spawn_sweep(pointing) {
            Ok(()) => Ok(StartOutcome::Started),
            Err(e) => {
                error!("Failed to start sweep: {e}");
                self.flags.finish();
                Err(e)
            }
        }
    }

    /// Ask the running sweep to stop at its next step. Returns false if idle.
    pub fn stop(&self) -> bool {
        let requested = self.flags.request_stop();
        if requested {
            info!("Stop requested");
        }
        requested
    }

    /// Wait for the current sweep thread, if any, and return its result.
    pub fn join(&self) -> Option<Result<SweepSummary, SweepError>> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(
            handle
                .join()
                .unwrap_or_else(|_| Err(SweepError::Worker("sweep thread panicked".to_string()))),
        )
    }

    /// Stop any sweep, wait for it, and release the device.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(Err(e)) = self.join() {
            warn!("Sweep ended with error during shutdown: {e}");
        }

        let mut slot = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut source) = slot.take() {
            source.close();
            info!("Device released");
        }
    }

    fn ensure_device(&self) -> Result<(), SweepError> {
        let mut slot = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            info!("Reopening device...");
            *slot = Some((self.opener)()?);
        }
        Ok(())
    }

    fn spawn_sweep(&self, pointing: Pointing) -> Result<(), SweepError> {
        self.ensure_device()?;

        let pipeline = Pipeline::new(self.config.pipeline.clone(), self.config.sample_rate_hz)?;
        let recorder = if self.flags.recording() {
            Some(ScanRecorder::open_append(self.log_path())?)
        } else {
            None
        };

        let mut steps = StepLoop {
            config: self.config.clone(),
            pointing,
            pipeline,
            recorder,
            flags: Arc::clone(&self.flags),
            events: self.events.clone(),
        };
        let device = Arc::clone(&self.device);
        let active = ActiveSweep(Arc::clone(&self.flags));
        // Slot for the end-of-sweep event, held even if step events fill the channel.
        let terminal = match self.events.clone().try_reserve_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("Event channel is full; the end-of-sweep event may be dropped");
                None
            }
        };

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = worker.take() {
            // Already past `finish`, so this returns immediately.
            if let Ok(Err(e)) = previous.join() {
                debug!("Previous sweep had ended with: {e}");
            }
        }

        let handle = std::thread::Builder::new()
            .name("sweep".to_string())
            .spawn(move || {
                let result = {
                    let mut slot = device.lock().unwrap_or_else(PoisonError::into_inner);
                    let result = match slot.as_deref_mut() {
                        Some(source) => steps.run(source),
                        None => Err(DeviceError::Closed.into()),
                    };
                    if let Err(SweepError::Device(e)) = &result {
                        warn!("Closing device after failure: {e}");
                        if let Some(mut source) = slot.take() {
                            source.close();
                        }
                    }
                    result
                };

                let events = steps.events.clone();
                // Closes the log file before the controller reports Idle.
                drop(steps);
                drop(active);

                let event = match &result {
                    Ok(summary) => {
                        info!(
                            "Sweep {:?}: {} steps, {} rows logged",
                            summary.end, summary.steps_completed, summary.rows_written
                        );
                        SweepEvent::Finished(*summary)
                    }
                    Err(e) => {
                        error!("Sweep aborted: {e}");
                        SweepEvent::Failed(e.to_string())
                    }
                };
                match terminal {
                    Some(permit) => {
                        permit.send(event);
                    }
                    None => {
                        if events.try_send(event).is_err() {
                            warn!("End-of-sweep event dropped");
                        }
                    }
                }
                result
            })
            .map_err(|e| SweepError::Worker(format!("failed to spawn sweep thread: {e}")))?;

        *worker = Some(handle);
        Ok(())
    }
}

impl Drop for SweepController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Returns the flags to Idle when the sweep thread exits, including by panic.
struct ActiveSweep(Arc<ControlFlags>);

impl Drop for ActiveSweep {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// State owned by one sweep execution.
struct StepLoop {
    config: SweepConfig,
    pointing: Pointing,
    pipeline: Pipeline,
    recorder: Option<ScanRecorder>,
    flags: Arc<ControlFlags>,
    events: mpsc::Sender<SweepEvent>,
}

impl StepLoop {
    fn run(&mut self, source: &mut dyn SampleSource) -> Result<SweepSummary, SweepError> {
        let frequencies = self.config.plan.frequencies();
        let total = frequencies.len();
        let pause = self.config.step_pause();
        let mut steps_completed = 0;
        let mut rows_written = 0;

        info!(
            "Sweep starting: {} steps from {:.2} to {:.2} MHz, az {} el {}",
            total,
            self.config.plan.start_hz / 1e6,
            self.config.plan.stop_hz / 1e6,
            self.pointing.azimuth,
            self.pointing.elevation,
        );
        if let Some(recorder) = &self.recorder {
            info!("Logging steps to {}", recorder.path().display());
        }
        self.emit(SweepEvent::Started {
            pointing: self.pointing,
            recording: self.recorder.is_some(),
            total_steps: total,
        });

        for (index, &frequency_hz) in frequencies.iter().enumerate() {
            if self.flags.stop_requested() {
                info!("Stop observed after {steps_completed} of {total} steps");
                return Ok(SweepSummary {
                    steps_completed,
                    rows_written,
                    end: SweepEnd::Stopped,
                });
            }

            source.set_center_frequency(frequency_hz)?;
            let batch = source.read_samples(self.config.batch_size)?;
            let processed = self.pipeline.process(&batch, self.flags.spectrogram());

            let recorded = match self.recorder.as_mut() {
                Some(recorder) if self.flags.recording() => {
                    recorder.write(&LogRecord {
                        azimuth: self.pointing.azimuth,
                        elevation: self.pointing.elevation,
                        frequency_hz,
                        peak_power: processed.peak_power,
                    })?;
                    rows_written += 1;
                    true
                }
                _ => false,
            };
            steps_completed += 1;

            debug!(
                "Step {}/{}: {:.2} MHz, peak {:.3e}",
                index + 1,
                total,
                frequency_hz / 1e6,
                processed.peak_power
            );

            let trace = spectrum_trace(
                &processed.power,
                self.pipeline.sample_rate_hz(),
                self.config.display_points,
            );
            self.emit(SweepEvent::Step(Box::new(StepReport {
                index,
                total,
                frequency_hz,
                peak_power: processed.peak_power,
                trace,
                spectrogram: processed.spectrogram,
                recorded,
            })));

            if !pause.is_zero() && index + 1 < total {
                std::thread::sleep(pause);
            }
        }

        Ok(SweepSummary {
            steps_completed,
            rows_written,
            end: SweepEnd::Completed,
        })
    }

    fn emit(&self, event: SweepEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => debug!("Display is behind, dropping sweep event"),
        }
    }
}
