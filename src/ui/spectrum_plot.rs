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


//! Power spectrum plot for the most recent sweep step.

use egui_plot::{Line, Plot, PlotPoints};
use telescope_core::pipeline::SpectrumTrace;

/// Floor applied before converting power to dB
const MIN_POWER: f64 = 1e-20;

/// Convert a linear power value to dB.
#[must_use]
pub fn power_to_db(power: f32) -> f64 {
    10.0 * f64::from(power).max(MIN_POWER).log10()
}

/// Plot points as `[offset kHz, power dB]`.
#[must_use]
pub fn trace_points(trace: &SpectrumTrace) -> Vec<[f64; 2]> {
    trace
        .frequencies_hz
        .iter()
        .zip(&trace.power)
        .map(|(&hz, &power)| [hz / 1e3, power_to_db(power)])
        .collect()
}

/// Draw the spectrum for a step tuned to `center_hz`.
pub fn show(ui: &mut egui::Ui, trace: &SpectrumTrace, center_hz: f64, height: f32) {
    let points: PlotPoints = trace_points(trace).into_iter().collect();

    Plot::new("spectrum_plot")
        .height(height)
        .x_axis_label(format!("Offset from {:.3} MHz (kHz)", center_hz / 1e6))
        .y_axis_label("Power (dB)")
        .allow_drag(false)
        .allow_zoom(false)
        .allow_scroll(false)
        .show(ui, |plot_ui| {
            plot_ui.line(Line::new("Power", points).color(egui::Color32::from_rgb(100, 200, 255)));
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_to_db() {
        assert!((power_to_db(1.0)).abs() < 1e-9);
        assert!((power_to_db(100.0) - 20.0).abs() < 1e-9);
        assert!((power_to_db(0.0) + 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_trace_points_use_khz_offsets() {
        let trace = SpectrumTrace {
            frequencies_hz: vec![-1000.0, 0.0, 1000.0],
            power: vec![1.0, 10.0, 1.0],
        };
        let points = trace_points(&trace);
        assert_eq!(points.len(), 3);
        assert!((points[0][0] + 1.0).abs() < 1e-12);
        assert!((points[1][1] - 10.0).abs() < 1e-9);
    }
}
