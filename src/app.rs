use eframe::egui;

use crate::state::ViewerState;
use crate::ui::map::ImagePanel;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct CubeViewApp {
    pub state: ViewerState,
    image_panel: ImagePanel,
}

impl CubeViewApp {
    pub fn new(state: ViewerState) -> Self {
        Self {
            state,
            image_panel: ImagePanel::default(),
        }
    }
}

impl eframe::App for CubeViewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: selection, actions, readout ----
        egui::SidePanel::left("control_panel")
            .default_width(280.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: parameter map | spectrum ----
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |cols| {
                self.image_panel.show(&mut cols[0], &mut self.state);
                plot::spectral_plot(&mut cols[1], &self.state);
            });
        });
    }
}
