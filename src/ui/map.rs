use std::path::Path;

use anyhow::{Context, Result};
use eframe::egui::{self, Align2, Color32, FontId, Sense, TextureHandle, TextureOptions, Ui, Vec2};
use egui_plot::{Plot, PlotImage, PlotPoint};

use crate::color::{ColorLimits, Colormap, colorize};
use crate::data::selector::DisplayImage;
use crate::interaction::PointerEvent;
use crate::state::ViewerState;

const COLORBAR_WIDTH: f32 = 18.0;
const COLORBAR_LABEL_WIDTH: f32 = 64.0;
const COLORBAR_STEPS: usize = 64;

// ---------------------------------------------------------------------------
// Image panel – parameter map with colorbar
// ---------------------------------------------------------------------------

/// Parameter map plus colorbar. Owns the uploaded texture.
#[derive(Default)]
pub struct ImagePanel {
    texture: Option<TextureHandle>,
    limits: Option<ColorLimits>,
    revision: u64,
}

impl ImagePanel {
    /// Re-upload the texture if a new map was plotted since the last frame.
    fn sync(&mut self, ctx: &egui::Context, state: &ViewerState) {
        if self.revision == state.display_revision && (self.texture.is_some() || state.display.is_none()) {
            return;
        }
        self.revision = state.display_revision;
        match &state.display {
            Some(display) => {
                let limits = ColorLimits::for_image(&display.image, display.colormap);
                let img = colorize(&display.image, display.colormap, limits);
                self.texture = Some(ctx.load_texture("parameter_map", img, TextureOptions::NEAREST));
                self.limits = limits;
            }
            None => {
                self.texture = None;
                self.limits = None;
            }
        }
    }

    /// Render the panel and feed pointer events to the session.
    pub fn show(&mut self, ui: &mut Ui, state: &mut ViewerState) {
        self.sync(ui.ctx(), state);

        let (Some(texture), Some(display)) = (&self.texture, &state.display) else {
            ui.centered_and_justified(|ui: &mut Ui| {
                ui.heading("Pick a parameter and a component, then press Image plot");
            });
            return;
        };

        let (height, width) = display.image.data.dim();
        let title = format!(
            "{} – component {}",
            display.parameter,
            state
                .fit
                .component_names
                .get(display.component)
                .map(String::as_str)
                .unwrap_or("?")
        );
        let colormap = display.colormap;
        let unit = display.parameter.unit_label();
        let limits = self.limits;
        let texture_id = texture.id();

        let mut events = Vec::new();
        ui.label(egui::RichText::new(title).strong());
        let row = ui.horizontal(|ui: &mut Ui| {
            let plot_width = (ui.available_width() - COLORBAR_WIDTH - COLORBAR_LABEL_WIDTH).max(50.0);
            let plot_height = ui.available_height();

            let response = Plot::new("parameter_map")
                .width(plot_width)
                .height(plot_height)
                .data_aspect(1.0)
                .x_axis_label("x (spaxel)")
                .y_axis_label("y (spaxel)")
                .allow_boxed_zoom(true)
                .allow_drag(true)
                .allow_scroll(true)
                .allow_zoom(true)
                .show(ui, |plot_ui| {
                    plot_ui.image(PlotImage::new(
                        texture_id,
                        PlotPoint::new((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0),
                        [width as f32, height as f32],
                    ));
                    plot_ui.pointer_coordinate().map(|p| [p.x, p.y])
                });

            let position = response.inner;
            let over_frame = response.response.hovered();
            if response.response.clicked() {
                events.push(PointerEvent::click(position));
            }
            state.update_hover(if over_frame { position } else { None });

            // The colorbar is outside the axes: clicks on it carry no coordinates.
            let bar = colorbar(ui, colormap, limits, unit, plot_height);
            if bar.clicked() {
                events.push(PointerEvent::click(None));
            }
            (position, over_frame)
        });

        let (position, over_frame) = row.inner;
        let over_panel = ui.rect_contains_pointer(row.response.rect);
        if pointer_moved(ui) {
            if let Some(target) = motion_position(over_panel, over_frame, position) {
                events.push(PointerEvent::motion(target));
            }
        }

        for event in events {
            state.handle_pointer(event);
        }
    }
}

fn pointer_moved(ui: &Ui) -> bool {
    ui.input(|i| i.pointer.delta() != Vec2::ZERO)
}

/// Position carried by a pointer move. Over the plot frame it is the map
/// coordinate; over the axes, labels or colorbar it is `None`. Moves that
/// leave the panel produce no event.
fn motion_position(
    over_panel: bool,
    over_frame: bool,
    position: Option<[f64; 2]>,
) -> Option<Option<[f64; 2]>> {
    if over_frame {
        Some(position)
    } else if over_panel {
        Some(None)
    } else {
        None
    }
}

/// Vertical colour scale with min / mid / max labels.
fn colorbar(
    ui: &mut Ui,
    colormap: Colormap,
    limits: Option<ColorLimits>,
    unit: &str,
    height: f32,
) -> egui::Response {
    let (rect, response) = ui.allocate_exact_size(
        Vec2::new(COLORBAR_WIDTH + COLORBAR_LABEL_WIDTH, height),
        Sense::click(),
    );
    let painter = ui.painter_at(rect);
    let bar = egui::Rect::from_min_size(
        rect.min + Vec2::new(0.0, 12.0),
        Vec2::new(COLORBAR_WIDTH, (height - 24.0).max(10.0)),
    );

    let step = bar.height() / COLORBAR_STEPS as f32;
    for i in 0..COLORBAR_STEPS {
        let t = (i as f64 + 0.5) / COLORBAR_STEPS as f64;
        let top = bar.bottom() - (i + 1) as f32 * step;
        let strip = egui::Rect::from_min_size(
            egui::pos2(bar.left(), top),
            Vec2::new(COLORBAR_WIDTH, step + 0.5),
        );
        painter.rect_filled(strip, 0.0, colormap.eval(t));
    }

    let text_color = ui.visuals().text_color();
    let font = FontId::proportional(11.0);
    if let Some(lim) = limits {
        let mid = (lim.vmin + lim.vmax) / 2.0;
        for (value, y) in [(lim.vmax, bar.top()), (mid, bar.center().y), (lim.vmin, bar.bottom())] {
            painter.text(
                egui::pos2(bar.right() + 4.0, y),
                Align2::LEFT_CENTER,
                format_tick(value),
                font.clone(),
                text_color,
            );
        }
    }
    painter.text(
        egui::pos2(bar.left(), rect.top()),
        Align2::LEFT_TOP,
        unit,
        font,
        Color32::GRAY,
    );
    response
}

fn format_tick(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e4 || v.abs() < 1e-2) {
        format!("{v:.2e}")
    } else {
        format!("{v:.2}")
    }
}

/// Write the colourised map as a PNG.
pub fn export_png(display: &DisplayImage, path: &Path) -> Result<()> {
    let limits = ColorLimits::for_image(&display.image, display.colormap);
    let img = colorize(&display.image, display.colormap, limits);
    let [w, h] = img.size;
    let bytes: Vec<u8> = img
        .pixels
        .iter()
        .flat_map(|c| c.to_srgba_unmultiplied())
        .collect();
    let buffer = image::RgbaImage::from_raw(w as u32, h as u32, bytes)
        .context("building image buffer")?;
    buffer
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Saved {w}x{h} map to {}", path.display());
    Ok(())
}
