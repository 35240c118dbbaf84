use eframe::egui::{Color32, RichText, Ui};
use egui_plot::{Legend, Line, LineStyle, Plot};

use crate::color::generate_palette;
use crate::state::ViewerState;

// ---------------------------------------------------------------------------
// Spectrum panel
// ---------------------------------------------------------------------------

/// Pairs `(wavelength, value)` into plot points, dropping non-finite values.
fn points(wavelength: &[f64], values: &[f64]) -> Vec<[f64; 2]> {
    wavelength
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite())
        .map(|(&x, &y)| [x, y])
        .collect()
}

/// Render the spectrum and fit of the selected spaxel.
pub fn spectral_plot(ui: &mut Ui, state: &ViewerState) {
    let Some(sp) = &state.spaxel else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Choose Plot on click or Follow mouse, then point at the map");
        });
        return;
    };

    ui.label(RichText::new(format!("Spaxel ({}, {})", sp.x, sp.y)).strong());

    let palette = generate_palette(sp.components.len());
    let wl = &sp.wavelength;

    Plot::new("spectral_plot")
        .legend(Legend::default())
        .x_axis_label("Wavelength (Å)")
        .y_axis_label(format!("Flux density (10^{} erg/s/cm²/Å)", sp.norm_exponent))
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(points(wl, &sp.observed))
                    .name("Observed")
                    .color(Color32::LIGHT_BLUE)
                    .width(1.5),
            );
            plot_ui.line(
                Line::new(points(wl, &sp.stellar))
                    .name("Stellar")
                    .color(Color32::from_rgb(255, 165, 0))
                    .width(1.0),
            );
            plot_ui.line(
                Line::new(points(wl, &sp.continuum))
                    .name("Stellar + continuum")
                    .color(Color32::GREEN)
                    .width(1.0),
            );
            plot_ui.line(
                Line::new(points(wl, &sp.model))
                    .name("Model")
                    .color(Color32::RED)
                    .width(1.5),
            );

            for ((curve, color), name) in sp
                .components
                .iter()
                .zip(&palette)
                .zip(&state.fit.component_names)
            {
                plot_ui.line(
                    Line::new(points(wl, curve))
                        .name(name)
                        .color(*color)
                        .style(LineStyle::dashed_loose())
                        .width(1.0),
                );
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_skip_non_finite() {
        let pts = points(&[1.0, 2.0, 3.0], &[0.5, f64::NAN, 1.5]);
        assert_eq!(pts, vec![[1.0, 0.5], [3.0, 1.5]]);
    }
}
