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


//! Main window: pointing controls, sweep buttons, and live displays.

use std::time::Duration;

use eframe::egui;
use egui::{Color32, RichText};
use telescope_core::pipeline::SpectrumTrace;
use telescope_core::{Pointing, Spectrogram, StartOutcome, SweepController, SweepEnd, SweepEvent};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::ui::{spectrum_plot, SpectrogramView};

const LIGHT_BLUE: Color32 = Color32::from_rgb(173, 216, 230);
const LIGHT_GREEN: Color32 = Color32::from_rgb(144, 238, 144);
const LIGHT_GRAY: Color32 = Color32::from_rgb(211, 211, 211);
const STOP_RED: Color32 = Color32::from_rgb(220, 50, 50);

/// What the window shows about the current or last sweep.
#[derive(Debug, Default)]
pub struct DisplayState {
    pub frequency_hz: Option<f64>,
    pub trace: Option<SpectrumTrace>,
    pub progress: Option<(usize, usize)>,
    pub rows_logged: usize,
    pub status: String,
}

impl DisplayState {
    /// Fold one event into the display, returning a spectrogram to upload.
    pub fn apply(&mut self, event: SweepEvent) -> Option<Spectrogram> {
        match event {
            SweepEvent::Started {
                pointing,
                recording,
                total_steps,
            } => {
                self.progress = Some((0, total_steps));
                self.rows_logged = 0;
                self.status = format!(
                    "Scanning at az {} el {}{}",
                    pointing.azimuth,
                    pointing.elevation,
                    if recording { ", recording" } else { "" }
                );
                None
            }
            SweepEvent::Step(report) => {
                let report = *report;
                self.frequency_hz = Some(report.frequency_hz);
                self.progress = Some((report.index + 1, report.total));
                if report.recorded {
                    self.rows_logged += 1;
                }
                self.trace = Some(report.trace);
                report.spectrogram
            }
            SweepEvent::Finished(summary) => {
                self.progress = None;
                self.status = match summary.end {
                    SweepEnd::Completed => format!(
                        "Sweep complete: {} steps, {} rows logged",
                        summary.steps_completed, summary.rows_written
                    ),
                    SweepEnd::Stopped => format!(
                        "Sweep stopped after {} steps, {} rows logged",
                        summary.steps_completed, summary.rows_written
                    ),
                };
                None
            }
            SweepEvent::Failed(reason) => {
                self.progress = None;
                self.status = format!("Sweep failed: {reason}");
                None
            }
        }
    }

    /// Step counter for a running sweep.
    #[must_use]
    pub fn progress_label(&self) -> Option<String> {
        let (done, total) = self.progress?;
        Some(if self.rows_logged > 0 {
            format!("Step {done}/{total}, {} logged", self.rows_logged)
        } else {
            format!("Step {done}/{total}")
        })
    }

    #[must_use]
    pub fn frequency_label(&self) -> String {
        match self.frequency_hz {
            Some(hz) => format!("Frequency: {:.2} MHz", hz / 1e6),
            None => "Frequency: - MHz".to_string(),
        }
    }
}

pub struct TelescopeApp {
    controller: SweepController,
    events: mpsc::Receiver<SweepEvent>,
    config: AppConfig,
    azimuth: u32,
    elevation: u32,
    display: DisplayState,
    spectrogram: SpectrogramView,
}

impl std::fmt::Debug for TelescopeApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelescopeApp")
            .field("controller", &self.controller)
            .field("azimuth", &self.azimuth)
            .field("elevation", &self.elevation)
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}

impl TelescopeApp {
    pub fn new(
        controller: SweepController,
        events: mpsc::Receiver<SweepEvent>,
        config: AppConfig,
    ) -> Self {
        controller.set_spectrogram(config.spectrogram_enabled);
        let status = if config.demo {
            "Idle (synthetic receiver)".to_string()
        } else {
            "Idle".to_string()
        };

        Self {
            controller,
            events,
            config,
            azimuth: 0,
            elevation: 0,
            display: DisplayState {
                status,
                ..DisplayState::default()
            },
            spectrogram: SpectrogramView::default(),
        }
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.events.try_recv() {
            if let Some(spectrogram) = self.display.apply(event) {
                self.spectrogram.update(ctx, &spectrogram);
            }
        }
    }

    fn start_sweep(&mut self) {
        let pointing = Pointing::new(self.azimuth, self.elevation);
        match self.controller.start(pointing) {
            Ok(StartOutcome::Started) => {}
            Ok(StartOutcome::AlreadyRunning) => log::debug!("Start pressed while scanning"),
            Err(e) => self.display.status = format!("Cannot start sweep: {e}"),
        }
    }

    fn pick_log_file(&mut self) {
        let current = self.controller.log_path();
        let mut dialog = rfd::FileDialog::new()
            .add_filter("CSV Files", &["csv"])
            .add_filter("All Files", &["*"]);
        if let Some(name) = current.file_name() {
            dialog = dialog.set_file_name(name.to_string_lossy());
        }
        if let Some(dir) = current.parent().filter(|p| p.is_dir()) {
            dialog = dialog.set_directory(dir);
        }

        if let Some(path) = dialog.save_file() {
            self.controller.set_log_path(&path);
            self.config.sweep.log_path = path;
            if let Err(e) = self.config.save() {
                log::warn!("Failed to save configuration: {e}");
            }
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        let scanning = self.controller.is_scanning();

        ui.label(RichText::new(self.display.frequency_label()).size(18.0).strong());
        ui.add_space(4.0);

        ui.add_enabled(
            !scanning,
            egui::Slider::new(&mut self.azimuth, 0..=Pointing::MAX_DEGREES).text("Azimuth"),
        );
        ui.add_enabled(
            !scanning,
            egui::Slider::new(&mut self.elevation, 0..=Pointing::MAX_DEGREES).text("Elevation"),
        );
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            if ui.add(colored_button("Start Scanning", LIGHT_BLUE)).clicked() {
                self.start_sweep();
            }
            if ui.add(colored_button("Stop Scanning", STOP_RED)).clicked() {
                self.controller.stop();
            }

            let (label, fill) = if self.controller.is_recording() {
                ("Recording: ON", LIGHT_GREEN)
            } else {
                ("Recording: OFF", LIGHT_GRAY)
            };
            if ui.add(colored_button(label, fill)).clicked() {
                self.controller.toggle_recording();
            }

            let (label, fill) = if self.controller.is_spectrogram_enabled() {
                ("Spectrogram: ON", LIGHT_BLUE)
            } else {
                ("Spectrogram: OFF", LIGHT_GRAY)
            };
            if ui.add(colored_button(label, fill)).clicked() && !self.controller.toggle_spectrogram() {
                self.spectrogram.clear();
            }
        });

        ui.horizontal(|ui| {
            ui.label("Log file:");
            ui.monospace(self.controller.log_path().display().to_string());
            if ui.button("Browse...").clicked() {
                self.pick_log_file();
            }
        });
    }

    fn draw_status(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(&self.display.status);
            let right = self.display.progress_label().unwrap_or_else(|| {
                let plan = &self.controller.config().plan;
                format!(
                    "{:.2}-{:.2} MHz, {} points",
                    plan.start_hz / 1e6,
                    plan.stop_hz / 1e6,
                    plan.points
                )
            });
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(right);
            });
        });
    }

    fn draw_displays(&self, ui: &mut egui::Ui) {
        let show_spectrogram = self.controller.is_spectrogram_enabled();
        let available = ui.available_height();
        let plot_height = if show_spectrogram { available * 0.5 } else { available };

        match (&self.display.trace, self.display.frequency_hz) {
            (Some(trace), Some(center_hz)) => spectrum_plot::show(ui, trace, center_hz, plot_height),
            _ => {
                ui.allocate_ui(egui::vec2(ui.available_width(), plot_height), |ui| {
                    ui.centered_and_justified(|ui| {
                        ui.label(RichText::new("No spectrum yet").color(Color32::GRAY));
                    });
                });
            }
        }

        if show_spectrogram {
            ui.separator();
            let height = ui.available_height().max(100.0);
            self.spectrogram.show(ui, height);
        }
    }
}

fn colored_button(label: &str, fill: Color32) -> egui::Button<'_> {
    egui::Button::new(RichText::new(label).color(Color32::BLACK)).fill(fill)
}

impl eframe::App for TelescopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        if ctx.input(|i| i.viewport().close_requested()) {
            log::info!("Window closing, shutting down sweep");
            self.controller.shutdown();
        }

        let refresh = if self.controller.is_scanning() { 50 } else { 250 };
        ctx.request_repaint_after(Duration::from_millis(refresh));

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(6.0);
            self.draw_controls(ui);
            ui.add_space(6.0);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.draw_status(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_displays(ui);
        });
    }
}

#[cfg(test)]
mod tests {
    use telescope_core::{StepReport, SweepSummary};

    use super::*;

    fn step(index: usize, frequency_hz: f64, spectrogram: Option<Spectrogram>) -> SweepEvent {
        recorded_step(index, frequency_hz, spectrogram, false)
    }

    fn recorded_step(
        index: usize,
        frequency_hz: f64,
        spectrogram: Option<Spectrogram>,
        recorded: bool,
    ) -> SweepEvent {
        SweepEvent::Step(Box::new(StepReport {
            index,
            total: 3,
            frequency_hz,
            peak_power: 1.0,
            trace: SpectrumTrace::default(),
            spectrogram,
            recorded,
        }))
    }

    #[test]
    fn test_frequency_label() {
        let mut display = DisplayState::default();
        assert_eq!(display.frequency_label(), "Frequency: - MHz");
        display.frequency_hz = Some(1_420_405_751.768);
        assert_eq!(display.frequency_label(), "Frequency: 1420.41 MHz");
    }

    #[test]
    fn test_step_updates_frequency_and_progress() {
        let mut display = DisplayState::default();
        display.apply(SweepEvent::Started {
            pointing: Pointing::new(90, 45),
            recording: true,
            total_steps: 3,
        });
        assert_eq!(display.progress, Some((0, 3)));
        assert!(display.status.contains("recording"));

        assert!(display.apply(step(1, 1415e6, None)).is_none());
        assert_eq!(display.frequency_hz, Some(1415e6));
        assert_eq!(display.progress, Some((2, 3)));
        assert_eq!(display.progress_label().as_deref(), Some("Step 2/3"));
    }

    #[test]
    fn test_recorded_steps_are_counted() {
        let mut display = DisplayState::default();
        display.apply(SweepEvent::Started {
            pointing: Pointing::default(),
            recording: true,
            total_steps: 3,
        });
        display.apply(recorded_step(0, 1400e6, None, true));
        display.apply(recorded_step(1, 1415e6, None, false));
        display.apply(recorded_step(2, 1430e6, None, true));
        assert_eq!(display.rows_logged, 2);
        assert_eq!(display.progress_label().as_deref(), Some("Step 3/3, 2 logged"));
    }

    #[test]
    fn test_step_hands_back_spectrogram() {
        let spectrogram = Spectrogram {
            nfft: 2,
            rows: 1,
            sample_rate_hz: 2.048e6,
            values_db: vec![-10.0, -20.0],
        };
        let mut display = DisplayState::default();
        let returned = display.apply(step(0, 1400e6, Some(spectrogram.clone())));
        assert_eq!(returned, Some(spectrogram));
    }

    #[test]
    fn test_terminal_events_clear_progress() {
        let mut display = DisplayState {
            progress: Some((2, 3)),
            ..DisplayState::default()
        };
        display.apply(SweepEvent::Finished(SweepSummary {
            steps_completed: 2,
            rows_written: 0,
            end: SweepEnd::Stopped,
        }));
        assert!(display.progress.is_none());
        assert!(display.status.starts_with("Sweep stopped"));

        display.apply(SweepEvent::Failed("read failed".to_string()));
        assert_eq!(display.status, "Sweep failed: read failed");
    }
}
