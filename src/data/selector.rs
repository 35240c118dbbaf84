use ndarray::{Array2, Axis, Zip};

use crate::color::Colormap;
use crate::error::ViewerError;

use super::model::{FitResult, Parameter, SPEED_OF_LIGHT_KMS};

/// Scale applied to fluxes so the map reads in units of 1e-17.
const FLUX_SCALE: f64 = 1e17;

// ---------------------------------------------------------------------------
// Selection – what the user picked in the two lists
// ---------------------------------------------------------------------------

/// Current choice in the parameter and component lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub parameter: Option<Parameter>,
    pub component: Option<usize>,
    /// Also hide spaxels whose fit status is not 0.
    pub apply_status_mask: bool,
}

// ---------------------------------------------------------------------------
// MaskedImage
// ---------------------------------------------------------------------------

/// A 2D image shaped `[y, x]` with a boolean exclusion mask of the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedImage {
    pub data: Array2<f64>,
    /// `true` marks an excluded pixel.
    pub mask: Array2<bool>,
}

impl MaskedImage {
    /// Value at `(x, y)`, or `None` when masked or outside the image.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        match self.mask.get((y, x)) {
            Some(false) => self.data.get((y, x)).copied(),
            _ => None,
        }
    }

    /// Unmasked values in row-major order.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, masked)| !**masked)
            .map(|(&v, _)| v)
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&m| !m).count()
    }

    /// Median of the unmasked values; the mean of the two central values
    /// for an even count.
    pub fn median(&self) -> Option<f64> {
        let mut values: Vec<f64> = self.valid_values().collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            Some((values[mid - 1] + values[mid]) / 2.0)
        } else {
            Some(values[mid])
        }
    }

    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.valid_values().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Largest absolute unmasked value.
    pub fn abs_max(&self) -> Option<f64> {
        self.valid_values().map(f64::abs).reduce(f64::max)
    }

    /// Mask every pixel whose value is not finite.
    fn mask_non_finite(&mut self) {
        Zip::from(&mut self.mask)
            .and(&self.data)
            .for_each(|m, &v| *m |= !v.is_finite());
    }
}

// ---------------------------------------------------------------------------
// DisplayImage – extraction result
// ---------------------------------------------------------------------------

/// A parameter map ready for the image panel.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayImage {
    pub image: MaskedImage,
    pub colormap: Colormap,
    pub parameter: Parameter,
    pub component: usize,
}

/// Colormap used for each parameter.
pub fn colormap_for(parameter: Parameter) -> Colormap {
    match parameter {
        Parameter::Flux | Parameter::Sigma => Colormap::Viridis,
        Parameter::Velocity | Parameter::H3 | Parameter::H4 => Colormap::SpectralR,
    }
}

/// Pixels with a NaN in any plane of the model-value stack.
fn nan_mask(fit: &FitResult) -> Array2<bool> {
    fit.model_values
        .map_axis(Axis(0), |lane| lane.iter().any(|v| v.is_nan()))
}

/// Build the map of one fitted parameter for one component.
///
/// The mask always covers spaxels with a NaN anywhere in their solution,
/// and additionally failed fits when `apply_status_mask` is set. Pixels
/// where a unit conversion divides by zero are masked too.
pub fn extract_image(fit: &FitResult, selection: &Selection) -> Result<DisplayImage, ViewerError> {
    let (Some(parameter), Some(component)) = (selection.parameter, selection.component) else {
        return Err(ViewerError::SelectionMissing);
    };
    if parameter.index() >= fit.parameters() {
        return Err(ViewerError::InvalidSelection(format!(
            "{parameter} is not fitted by the {} function",
            fit.function.name()
        )));
    }
    if component >= fit.components() {
        return Err(ViewerError::InvalidSelection(format!(
            "component {component} does not exist ({} fitted)",
            fit.components()
        )));
    }

    let k = fit.plane_index(component, parameter.index());

    let mut mask = nan_mask(fit);
    if selection.apply_status_mask {
        Zip::from(&mut mask)
            .and(&fit.fit_status)
            .for_each(|m, &status| *m |= status != 0);
    }

    let mut image = MaskedImage {
        data: fit.plane(k).to_owned(),
        mask,
    };

    match parameter {
        Parameter::Flux => {
            image.data.mapv_inplace(|v| v * FLUX_SCALE);
        }
        Parameter::Velocity => {
            let reference = image.median().ok_or(ViewerError::DivisionUndefined)?;
            image
                .data
                .mapv_inplace(|wl| (wl - reference) / wl * SPEED_OF_LIGHT_KMS);
            image.mask_non_finite();
        }
        Parameter::Sigma => {
            let centre = fit.plane(k - 1);
            Zip::from(&mut image.data)
                .and(&centre)
                .for_each(|sigma, &wl| *sigma = *sigma / wl * SPEED_OF_LIGHT_KMS);
            image.mask_non_finite();
        }
        Parameter::H3 | Parameter::H4 => {}
    }

    log::debug!(
        "Extracted {parameter} map for component {component}: {} of {} pixels valid",
        image.valid_count(),
        image.data.len()
    );

    Ok(DisplayImage {
        image,
        colormap: colormap_for(parameter),
        parameter,
        component,
    })
}
