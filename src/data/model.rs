use std::fmt;

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

/// Speed of light in km/s, as used for the velocity conversions.
pub const SPEED_OF_LIGHT_KMS: f64 = 2.998e5;

/// Status code given to spaxels that are absent from a fit file.
pub const STATUS_NOT_FITTED: i32 = -1;

// ---------------------------------------------------------------------------
// FitFunction – line profile used by the fit
// ---------------------------------------------------------------------------

/// Emission-line profile the fit was run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitFunction {
    /// Amplitude, centre wavelength, sigma.
    Gaussian,
    /// Gaussian plus the h3 and h4 Gauss-Hermite moments.
    GaussHermite,
}

impl FitFunction {
    /// Parse the function name stored in a fit file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Some(FitFunction::Gaussian),
            "gauss_hermite" => Some(FitFunction::GaussHermite),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FitFunction::Gaussian => "gaussian",
            FitFunction::GaussHermite => "gauss_hermite",
        }
    }

    /// Number of fitted parameters per component.
    pub fn parameters(self) -> usize {
        self.parameter_names().len()
    }

    /// Short parameter names, in solution order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            FitFunction::Gaussian => &["A", "wl", "s"],
            FitFunction::GaussHermite => &["A", "wl", "s", "h3", "h4"],
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter – what the map shows
// ---------------------------------------------------------------------------

/// Fitted quantity selectable for the parameter map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Flux,
    Velocity,
    Sigma,
    H3,
    H4,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::Flux,
        Parameter::Velocity,
        Parameter::Sigma,
        Parameter::H3,
        Parameter::H4,
    ];

    /// Position of the parameter inside one component's solution block.
    pub fn index(self) -> usize {
        match self {
            Parameter::Flux => 0,
            Parameter::Velocity => 1,
            Parameter::Sigma => 2,
            Parameter::H3 => 3,
            Parameter::H4 => 4,
        }
    }

    /// Parameters provided by a given fit function, in list order.
    pub fn available(function: FitFunction) -> &'static [Parameter] {
        &Self::ALL[..function.parameters()]
    }

    /// Axis / colorbar label including units.
    pub fn unit_label(self) -> &'static str {
        match self {
            Parameter::Flux => "Flux (10^-17 erg/s/cm²)",
            Parameter::Velocity => "Velocity (km/s)",
            Parameter::Sigma => "Sigma (km/s)",
            Parameter::H3 => "h3",
            Parameter::H4 => "h4",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parameter::Flux => "Flux",
            Parameter::Velocity => "Velocity",
            Parameter::Sigma => "Sigma",
            Parameter::H3 => "h3",
            Parameter::H4 => "h4",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// DataCube – the observed cube
// ---------------------------------------------------------------------------

/// Observed data cube, shaped `[wavelength, y, x]`.
#[derive(Debug, Clone)]
pub struct DataCube {
    pub wavelength: Vec<f64>,
    pub data: Array3<f64>,
}

impl DataCube {
    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Covered wavelength range, first and last sample.
    pub fn wavelength_range(&self) -> Option<(f64, f64)> {
        Some((*self.wavelength.first()?, *self.wavelength.last()?))
    }
}

// ---------------------------------------------------------------------------
// FitResult – everything a fit file provides
// ---------------------------------------------------------------------------

/// Result of a spectral fit over the whole cube. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub function: FitFunction,
    /// One name per fitted component.
    pub component_names: Vec<String>,
    /// Wavelength axis of the fit window.
    pub wavelength: Vec<f64>,
    /// Per-spaxel status code, 0 meaning success. Shaped `[y, x]`.
    pub fit_status: Array2<i32>,
    /// Fitted parameters, shaped `[component * parameters, y, x]`.
    pub model_values: Array3<f64>,
    /// Reduced chi² per spaxel, when the fit file carries it.
    pub reduced_chi2: Option<Array2<f64>>,
    /// Observed spectra inside the fit window, shaped `[wavelength, y, x]`.
    pub fitspec: Array3<f64>,
    /// Fitted continuum, same shape as `fitspec`.
    pub fitcont: Array3<f64>,
    /// Stellar (synthetic) spectrum, same shape as `fitspec`.
    pub stellar: Array3<f64>,
}

impl FitResult {
    /// Number of fitted components.
    pub fn components(&self) -> usize {
        self.component_names.len()
    }

    /// Number of parameters per component.
    pub fn parameters(&self) -> usize {
        self.function.parameters()
    }

    pub fn width(&self) -> usize {
        self.fit_status.ncols()
    }

    pub fn height(&self) -> usize {
        self.fit_status.nrows()
    }

    /// Flat plane index of `parameter` for `component`.
    pub fn plane_index(&self, component: usize, parameter: usize) -> usize {
        component * self.parameters() + parameter
    }

    /// One plane of the model-value stack.
    pub fn plane(&self, k: usize) -> ArrayView2<'_, f64> {
        self.model_values.index_axis(Axis(0), k)
    }

    /// Fitted parameters of a single spaxel, all components concatenated.
    pub fn solution(&self, x: usize, y: usize) -> Vec<f64> {
        self.model_values.slice(s![.., y, x]).to_vec()
    }
}
