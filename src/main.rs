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


mod app;
mod config;
mod ui;

use std::path::PathBuf;

use clap::Parser;
use eframe::egui;
use telescope_core::{list_devices, DeviceConfig, DeviceError, SampleSource, SweepController, SyntheticSource};

use app::TelescopeApp;
use config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "telescope-desktop")]
#[command(about = "Hydrogen-line sweep controller for an RTL-SDR radio telescope")]
struct Cli {
    /// Use the synthetic receiver instead of RTL-SDR hardware
    #[arg(long)]
    demo: bool,

    /// CSV file that recorded sweeps append to
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// RTL-SDR device index
    #[arg(long)]
    device_index: Option<u32>,

    /// List attached RTL-SDR devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if cli.list_devices {
        let devices = list_devices();
        if devices.is_empty() {
            println!("No RTL-SDR devices found");
        }
        for device in devices {
            println!("{}: {} (serial {})", device.index, device.name, device.serial);
        }
        return Ok(());
    }

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load configuration, using defaults: {e}");
        AppConfig::default()
    });
    if let Ok(path) = AppConfig::config_path() {
        log::debug!("Configuration file: {}", path.display());
    }

    config.demo |= cli.demo;
    if let Some(index) = cli.device_index {
        config.receiver.device_index = index;
    }
    if let Some(path) = cli.log_file {
        config.sweep.log_path = path;
    }

    log::info!("Starting Telescope Controller...");
    let device = config.device_config();
    let demo = config.demo;
    let (controller, events) = SweepController::new(config.sweep.clone(), move || open_source(&device, demo))
        .inspect_err(|e| log::error!("Startup failed: {e}"))?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 800.0])
            .with_title("Telescope Controller"),
        ..Default::default()
    };

    eframe::run_native(
        "Telescope Controller",
        options,
        Box::new(move |_cc| Ok(Box::new(TelescopeApp::new(controller, events, config)))),
    )?;

    Ok(())
}

fn open_source(device: &DeviceConfig, demo: bool) -> Result<Box<dyn SampleSource>, DeviceError> {
    if demo {
        log::info!("Using synthetic receiver");
        return Ok(Box::new(SyntheticSource::open(device)?));
    }
    open_hardware(device)
}

#[cfg(feature = "hardware")]
fn open_hardware(device: &DeviceConfig) -> Result<Box<dyn SampleSource>, DeviceError> {
    Ok(Box::new(telescope_core::RtlSdrSource::open(device)?))
}

#[cfg(not(feature = "hardware"))]
fn open_hardware(_device: &DeviceConfig) -> Result<Box<dyn SampleSource>, DeviceError> {
    Err(DeviceError::Unavailable(
        "RTL-SDR support not compiled (enable the 'hardware' feature or pass --demo)".to_string(),
    ))
}
