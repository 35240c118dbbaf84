use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::data::loader::{check_compatible, load_fit};
use crate::data::model::Parameter;
use crate::interaction::Mode;
use crate::state::ViewerState;
use crate::ui::map::export_png;

// ---------------------------------------------------------------------------
// Left side panel – selection, actions and fit readout
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut ViewerState) {
    ui.heading("Parameter map");
    ui.separator();

    ui.horizontal(|ui: &mut Ui| {
        if ui.button("Image plot").clicked() {
            state.plot_image();
        }
        ui.checkbox(&mut state.selection.apply_status_mask, "Mask failed fits");
    });

    ui.horizontal(|ui: &mut Ui| {
        let mode = state.controller.mode();
        if ui
            .selectable_label(mode == Mode::Follow, "Follow mouse")
            .clicked()
        {
            state.enter_follow();
        }
        if ui
            .selectable_label(mode == Mode::SingleShot, "Plot on click")
            .clicked()
        {
            state.enter_single_shot();
        }
    });
    ui.separator();

    ui.columns(2, |cols: &mut [Ui]| {
        cols[0].strong("Parameter");
        for &p in Parameter::available(state.fit.function) {
            let selected = state.selection.parameter == Some(p);
            if cols[0].selectable_label(selected, p.to_string()).clicked() {
                state.selection.parameter = Some(p);
            }
        }

        cols[1].strong("Component");
        ScrollArea::vertical()
            .id_salt("component_list")
            .max_height(120.0)
            .show(&mut cols[1], |ui: &mut Ui| {
                for (i, name) in state.fit.component_names.iter().enumerate() {
                    let selected = state.selection.component == Some(i);
                    if ui.selectable_label(selected, format!("{i}: {name}")).clicked() {
                        state.selection.component = Some(i);
                    }
                }
            });
    });
    ui.separator();

    ui.strong("Fit summary");
    ScrollArea::both()
        .id_salt("readout")
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            ui.label(RichText::new(&state.readout).monospace());
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut ViewerState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open fit…").clicked() {
                open_fit_dialog(state);
                ui.close_menu();
            }
            let has_map = state.display.is_some();
            if ui.add_enabled(has_map, egui::Button::new("Save map as PNG…")).clicked() {
                save_map_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        let mut cube_info = format!(
            "{} ({}x{})",
            file_name(&state.cube_path),
            state.cube.width(),
            state.cube.height()
        );
        if let Some((lo, hi)) = state.cube.wavelength_range() {
            cube_info.push_str(&format!(", {lo:.0}–{hi:.0} Å"));
        }
        ui.label(cube_info);
        ui.separator();
        ui.label(format!(
            "{}: {}, {} component(s)",
            file_name(&state.fit_path),
            state.fit.function.name(),
            state.fit.components()
        ));

        if let Some((x, y, value)) = state.hover {
            ui.separator();
            match value {
                Some(v) => ui.monospace(format!("({x}, {y})  {v:.4}")),
                None => ui.monospace(format!("({x}, {y})  masked")),
            };
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_fit_dialog(state: &mut ViewerState) {
    let file = rfd::FileDialog::new()
        .set_title("Open fit result")
        .add_filter("Supported files", &["parquet", "pq", "json"])
        .add_filter("Parquet", &["parquet", "pq"])
        .add_filter("JSON", &["json"])
        .pick_file();

    let Some(path) = file else {
        return;
    };
    let loaded = load_fit(&path).and_then(|fit| {
        check_compatible(&state.cube, &fit)?;
        Ok(fit)
    });
    match loaded {
        Ok(fit) => {
            log::info!("Loaded fit {}", path.display());
            state.set_fit(fit, path);
        }
        Err(e) => {
            log::error!("Failed to load fit: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}

pub fn save_map_dialog(state: &mut ViewerState) {
    let Some(display) = &state.display else {
        return;
    };
    let file = rfd::FileDialog::new()
        .set_title("Save parameter map")
        .add_filter("PNG", &["png"])
        .set_file_name(format!("{}_{}.png", display.parameter, display.component))
        .save_file();

    if let Some(path) = file {
        if let Err(e) = export_png(display, &path) {
            log::error!("Failed to save map: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}
