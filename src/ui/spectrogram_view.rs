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


//! Spectrogram display.
//!
//! Each step's spectrogram is rendered into a single texture: time segments
//! run top to bottom and frequency bins left to right.

use egui::{Color32, ColorImage, TextureHandle, TextureOptions};
use telescope_core::Spectrogram;

/// Holds the texture for the latest spectrogram.
#[derive(Default)]
pub struct SpectrogramView {
    texture: Option<TextureHandle>,
    range_db: Option<(f32, f32)>,
}

impl std::fmt::Debug for SpectrogramView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrogramView")
            .field("has_texture", &self.texture.is_some())
            .field("range_db", &self.range_db)
            .finish()
    }
}

impl SpectrogramView {
    /// Replace the texture with `spectrogram`.
    pub fn update(&mut self, ctx: &egui::Context, spectrogram: &Spectrogram) {
        let Some(image) = spectrogram_image(spectrogram) else {
            return;
        };
        self.range_db = spectrogram.range_db();

        if let Some(tex) = &mut self.texture {
            tex.set(image, TextureOptions::NEAREST);
        } else {
            self.texture = Some(ctx.load_texture("spectrogram", image, TextureOptions::NEAREST));
        }
    }

    /// Forget the current image.
    pub fn clear(&mut self) {
        self.texture = None;
        self.range_db = None;
    }

    pub fn show(&self, ui: &mut egui::Ui, height: f32) {
        let (rect, _response) = ui.allocate_exact_size(
            egui::vec2(ui.available_width(), height),
            egui::Sense::hover(),
        );

        if let Some(texture) = &self.texture {
            ui.painter().image(
                texture.id(),
                rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                Color32::WHITE,
            );
            if let Some((lo, hi)) = self.range_db {
                ui.label(
                    egui::RichText::new(format!("{lo:.1} dB to {hi:.1} dB"))
                        .color(Color32::LIGHT_GRAY)
                        .small(),
                );
            }
        } else {
            ui.painter().rect_filled(rect, 0.0, Color32::from_gray(20));
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Spectrogram off",
                egui::FontId::proportional(14.0),
                Color32::GRAY,
            );
        }
    }
}

/// Colour image of a spectrogram, or `None` when it has no rows.
#[must_use]
pub fn spectrogram_image(spectrogram: &Spectrogram) -> Option<ColorImage> {
    let (min_db, max_db) = spectrogram.range_db()?;
    let width = spectrogram.nfft;
    let height = spectrogram.rows;
    if width == 0 || height == 0 {
        return None;
    }

    let pixels = spectrogram
        .values_db
        .iter()
        .map(|&db| db_to_color(db, min_db, max_db))
        .collect();

    Some(ColorImage {
        size: [width, height],
        source_size: egui::vec2(width as f32, height as f32),
        pixels,
    })
}

/// Map a dB value onto a blue (weak) to red (strong) gradient.
fn db_to_color(db: f32, min_db: f32, max_db: f32) -> Color32 {
    let span = max_db - min_db;
    let normalized = if span > 0.0 {
        ((db - min_db) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let stops: [(f32, (u8, u8, u8)); 5] = [
        (0.0, (0, 0, 128)),
        (0.25, (0, 128, 255)),
        (0.5, (0, 255, 0)),
        (0.75, (255, 255, 0)),
        (1.0, (255, 0, 0)),
    ];

    for pair in stops.windows(2) {
        let (t1, (r1, g1, b1)) = pair[0];
        let (t2, (r2, g2, b2)) = pair[1];

        if normalized <= t2 {
            let t = (normalized - t1) / (t2 - t1);
            let lerp = |a: u8, b: u8| {
                let value = f32::from(a) + t * (f32::from(b) - f32::from(a));
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "value stays within 0..=255")]
                let channel = value.round() as u8;
                channel
            };
            return Color32::from_rgb(lerp(r1, r2), lerp(g1, g2), lerp(b1, b2));
        }
    }

    Color32::from_rgb(255, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_color() {
        assert_eq!(db_to_color(-100.0, -100.0, 0.0), Color32::from_rgb(0, 0, 128));
        assert_eq!(db_to_color(0.0, -100.0, 0.0), Color32::from_rgb(255, 0, 0));

        let mid = db_to_color(-50.0, -100.0, 0.0);
        assert!(mid.g() > 128);
    }

    #[test]
    fn test_flat_spectrogram_maps_to_floor() {
        assert_eq!(db_to_color(-3.0, -3.0, -3.0), Color32::from_rgb(0, 0, 128));
    }

    #[test]
    fn test_image_matches_spectrogram_shape() {
        let spectrogram = Spectrogram {
            nfft: 4,
            rows: 2,
            sample_rate_hz: 2.048e6,
            values_db: vec![-80.0, -60.0, -40.0, -20.0, -20.0, -40.0, -60.0, -80.0],
        };
        let image = spectrogram_image(&spectrogram).unwrap();
        assert_eq!(image.size, [4, 2]);
        assert_eq!(image.pixels[0], Color32::from_rgb(0, 0, 128));
        assert_eq!(image.pixels[3], Color32::from_rgb(255, 0, 0));
    }

    #[test]
    fn test_empty_spectrogram_has_no_image() {
        let spectrogram = Spectrogram {
            nfft: 4,
            rows: 0,
            sample_rate_hz: 2.048e6,
            values_db: Vec::new(),
        };
        assert!(spectrogram_image(&spectrogram).is_none());
    }
}
