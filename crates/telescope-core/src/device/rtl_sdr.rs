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


//! RTL-SDR hardware source.
//!
//! The `rtlsdr` device handle is not `Send`, so it lives on a dedicated worker
//! thread for its whole life. [`RtlSdrSource`] forwards configure/tune/read
//! requests to that thread and waits for each reply, which keeps the blocking
//! semantics the sweep expects.

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};
use num_complex::Complex;

use super::{iq_from_u8, DeviceConfig, DeviceError, GainMode, SampleSource};

/// USB transfers must be multiples of 512 bytes; 256 KiB is the usual streaming size.
const READ_CHUNK_BYTES: usize = 256 * 1024;

const INIT_TIMEOUT: Duration = Duration::from_secs(5);

type Reply<T> = mpsc::Sender<Result<T, DeviceError>>;

enum Command {
    Configure(DeviceConfig, Reply<()>),
    Tune(f64, Reply<()>),
    Read(usize, Reply<Vec<Complex<f32>>>),
    Close,
}

/// Handle to an RTL-SDR dongle running on its own worker thread.
pub struct RtlSdrSource {
    commands: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    device_index: u32,
}

impl std::fmt::Debug for RtlSdrSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtlSdrSource")
            .field("device_index", &self.device_index)
            .field("open", &self.commands.is_some())
            .finish_non_exhaustive()
    }
}

impl RtlSdrSource {
    /// Open the dongle at `config.device_index` and apply `config`.
    pub fn open(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let device_index = config.device_index;
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), DeviceError>>();

        info!("Opening RTL-SDR device {device_index}...");

        let worker = std::thread::Builder::new()
            .name(format!("rtlsdr-{device_index}"))
            .spawn(move || {
                #[allow(clippy::cast_possible_wrap, reason = "rtlsdr expects i32 device indices")]
                let mut device = match ::rtlsdr::open(device_index as i32) {
                    Ok(dev) => dev,
                    Err(e) => {
                        let _ = init_tx.send(Err(DeviceError::Unavailable(format!(
                            "failed to open RTL-SDR device {device_index}: {e}"
                        ))));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                worker_loop(&mut device, &cmd_rx);
                drop(device);
                info!("RTL-SDR device {device_index} closed, USB interface released");
            })
            .map_err(|e| DeviceError::Unavailable(format!("failed to spawn device thread: {e}")))?;

        match init_rx.recv_timeout(INIT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(DeviceError::Unavailable(
                    "RTL-SDR initialization timed out".to_string(),
                ));
            }
        }

        let mut source = Self {
            commands: Some(cmd_tx),
            worker: Some(worker),
            device_index,
        };
        if let Err(e) = source.configure(config) {
            source.close();
            return Err(e);
        }
        Ok(source)
    }

    fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, DeviceError> {
        let commands = self.commands.as_ref().ok_or(DeviceError::Closed)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        commands
            .send(build(reply_tx))
            .map_err(|e| DeviceError::Read(format!("device thread exited: {e}")))?;
        reply_rx
            .recv()
            .map_err(|e| DeviceError::Read(format!("device thread exited: {e}")))?
    }
}

impl SampleSource for RtlSdrSource {
    fn configure(&mut self, config: &DeviceConfig) -> Result<(), DeviceError> {
        let config = config.clone();
        self.request(|reply| Command::Configure(config, reply))
    }

    fn set_center_frequency(&mut self, frequency_hz: f64) -> Result<(), DeviceError> {
        self.request(|reply| Command::Tune(frequency_hz, reply))
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex<f32>>, DeviceError> {
        self.request(|reply| Command::Read(count, reply))
    }

    fn close(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("RTL-SDR worker thread panicked");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.commands.is_some()
    }
}

impl Drop for RtlSdrSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(device: &mut ::rtlsdr::RTLSDRDevice, commands: &mpsc::Receiver<Command>) {
    while let Ok(command) = commands.recv() {
        match command {
            Command::Configure(config, reply) => {
                let _ = reply.send(apply_config(device, &config));
            }
            Command::Tune(frequency_hz, reply) => {
                let _ = reply.send(tune(device, frequency_hz));
            }
            Command::Read(count, reply) => {
                let _ = reply.send(read(device, count));
            }
            Command::Close => break,
        }
    }
}

fn apply_config(device: &mut ::rtlsdr::RTLSDRDevice, config: &DeviceConfig) -> Result<(), DeviceError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "RTL-SDR rates are a few MHz")]
    let sample_rate = config.sample_rate.round() as u32;
    device
        .set_sample_rate(sample_rate)
        .map_err(|e| DeviceError::Configure(format!("sample rate {sample_rate} Hz: {e}")))?;

    match config.gain {
        GainMode::Auto => device
            .set_tuner_gain_mode(false)
            .map_err(|e| DeviceError::Configure(format!("gain mode: {e}")))?,
        GainMode::Manual(tenths_db) => {
            device
                .set_tuner_gain_mode(true)
                .map_err(|e| DeviceError::Configure(format!("gain mode: {e}")))?;
            device
                .set_tuner_gain(tenths_db)
                .map_err(|e| DeviceError::Configure(format!("gain {tenths_db}: {e}")))?;
        }
    }

    if config.ppm_correction != 0 {
        device
            .set_freq_correction(config.ppm_correction)
            .map_err(|e| DeviceError::Configure(format!("PPM correction: {e}")))?;
    }

    tune(device, config.center_frequency)?;

    info!("RTL-SDR configured:");
    info!("  Center frequency: {:.3} MHz", config.center_frequency / 1e6);
    info!("  Sample rate: {:.3} MHz", config.sample_rate / 1e6);
    info!("  Gain: {:?}", config.gain);
    info!("  PPM correction: {}", config.ppm_correction);
    Ok(())
}

fn tune(device: &mut ::rtlsdr::RTLSDRDevice, frequency_hz: f64) -> Result<(), DeviceError> {
    let retune_error = |reason: String| DeviceError::Retune { frequency_hz, reason };

    if !(0.0..=f64::from(u32::MAX)).contains(&frequency_hz) {
        return Err(retune_error("frequency out of tuner range".to_string()));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "range checked above")]
    let hz = frequency_hz.round() as u32;
    device.set_center_freq(hz).map_err(|e| retune_error(e.to_string()))?;
    // Drop samples buffered at the previous frequency.
    device.reset_buffer().map_err(|e| retune_error(e.to_string()))?;
    debug!("Tuned to {:.3} MHz", frequency_hz / 1e6);
    Ok(())
}

fn read(device: &mut ::rtlsdr::RTLSDRDevice, count: usize) -> Result<Vec<Complex<f32>>, DeviceError> {
    let wanted_bytes = count * 2;
    let mut samples = Vec::with_capacity(count);

    while samples.len() < count {
        let remaining = wanted_bytes - samples.len() * 2;
        let chunk = remaining.min(READ_CHUNK_BYTES).next_multiple_of(512);
        let buf = device.read_sync(chunk).map_err(|e| {
            warn!("RTL-SDR read failed after {} samples", samples.len());
            DeviceError::Read(e.to_string())
        })?;
        if buf.is_empty() {
            return Err(DeviceError::Read("device returned no data".to_string()));
        }
        samples.extend(iq_from_u8(&buf));
    }

    samples.truncate(count);
    Ok(samples)
}
