use std::path::PathBuf;

use crate::data::model::{DataCube, FitResult, Parameter};
use crate::data::selector::{DisplayImage, Selection, extract_image};
use crate::data::spaxel::{SpaxelPlot, SpaxelSource};
use crate::error::ViewerError;
use crate::interaction::{InteractionController, PointerEvent, resolve_index};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI session, independent of rendering.
pub struct ViewerState {
    pub cube: DataCube,
    pub fit: FitResult,
    pub cube_path: PathBuf,
    pub fit_path: PathBuf,

    /// Current choice in the parameter / component lists.
    pub selection: Selection,

    /// Parameter map shown in the image panel.
    pub display: Option<DisplayImage>,

    /// Bumped whenever `display` is replaced, so the texture is re-uploaded.
    pub display_revision: u64,

    /// Click-once / follow-pointer subscriptions.
    pub controller: InteractionController,

    /// Content of the spectrum panel.
    pub spaxel: Option<SpaxelPlot>,

    /// Scrollable text readout (fit summary or interaction error).
    pub readout: String,

    /// Status / error message shown in the top bar.
    pub status_message: Option<String>,

    /// Spaxel under the pointer and its displayed value.
    pub hover: Option<(usize, usize, Option<f64>)>,
}

impl ViewerState {
    pub fn new(
        cube: DataCube,
        fit: FitResult,
        cube_path: PathBuf,
        fit_path: PathBuf,
        apply_status_mask: bool,
    ) -> Self {
        Self {
            cube,
            fit,
            cube_path,
            fit_path,
            selection: Selection {
                apply_status_mask,
                ..Selection::default()
            },
            display: None,
            display_revision: 0,
            controller: InteractionController::new(),
            spaxel: None,
            readout: String::new(),
            status_message: None,
            hover: None,
        }
    }

    /// Swap in a new fit for the same cube. Selection indices that the new
    /// fit does not have are cleared.
    pub fn set_fit(&mut self, fit: FitResult, fit_path: PathBuf) {
        if self
            .selection
            .parameter
            .is_some_and(|p| !Parameter::available(fit.function).contains(&p))
        {
            self.selection.parameter = None;
        }
        if self.selection.component.is_some_and(|c| c >= fit.components()) {
            self.selection.component = None;
        }
        self.fit = fit;
        self.fit_path = fit_path;
        self.display = None;
        self.display_revision += 1;
        self.spaxel = None;
        self.readout.clear();
        self.status_message = None;
    }

    /// Rebuild the parameter map from the current selection. On failure
    /// the previous map stays on screen.
    pub fn plot_image(&mut self) {
        match extract_image(&self.fit, &self.selection) {
            Ok(display) => {
                log::info!(
                    "Plotting {} of component {} ({})",
                    display.parameter,
                    display.component,
                    display.colormap
                );
                self.display = Some(display);
                self.display_revision += 1;
                self.status_message = None;
            }
            Err(e) => {
                log::warn!("Cannot plot image: {e}");
                self.status_message = Some(e.to_string());
            }
        }
    }

    pub fn enter_follow(&mut self) {
        self.controller.enter_follow();
        log::info!("Spectrum follows the pointer");
    }

    pub fn enter_single_shot(&mut self) {
        self.controller.enter_single_shot();
        log::info!("Spectrum updates on click");
    }

    /// Feed a pointer event through the active subscription. Errors go to
    /// the readout and leave the spectrum panel untouched.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        let Some(result) = self.controller.dispatch(&event, &self.fit) else {
            return;
        };
        match result {
            Ok(plot) => {
                log::debug!("Showing spaxel ({}, {})", plot.x, plot.y);
                self.readout = plot.summary.clone();
                self.spaxel = Some(plot);
            }
            Err(e) => {
                match &e {
                    ViewerError::IndexError { x, y } => log::warn!("No spaxel at ({x}, {y})"),
                    ViewerError::NullSpectrum { x, y } => {
                        log::warn!("Spaxel ({x}, {y}) has no spectrum")
                    }
                    other => log::warn!("Pointer event {event:?}: {other}"),
                }
                self.readout = e.to_string();
            }
        }
    }

    /// Update the hover readout for a pointer position over the map.
    pub fn update_hover(&mut self, position: Option<[f64; 2]>) {
        let (width, height) = self.fit.dimensions();
        self.hover = resolve_index(position)
            .ok()
            .filter(|&(x, y)| x < width && y < height)
            .map(|(x, y)| {
                let value = self.display.as_ref().and_then(|d| d.image.get(x, y));
                (x, y, value)
            });
    }
}
