use std::fmt::Write as _;

use ndarray::s;

use crate::error::ViewerError;

use super::model::FitResult;
use super::profile;

// ---------------------------------------------------------------------------
// SpaxelPlot – what the spectrum panel draws
// ---------------------------------------------------------------------------

/// Spectrum and fit curves of a single spaxel, already normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaxelPlot {
    pub x: usize,
    pub y: usize,
    pub wavelength: Vec<f64>,
    /// Curves are divided by `10^norm_exponent`.
    pub norm_exponent: i32,
    pub observed: Vec<f64>,
    pub stellar: Vec<f64>,
    /// Stellar spectrum plus fitted continuum.
    pub continuum: Vec<f64>,
    /// Continuum plus every emission component.
    pub model: Vec<f64>,
    /// Continuum plus each single component; empty for one-component fits.
    pub components: Vec<Vec<f64>>,
    /// Fixed-width table of the fitted parameters.
    pub summary: String,
}

/// Anything that can produce the spectrum/fit view of a spaxel.
pub trait SpaxelSource {
    /// Spatial size as `(width, height)`.
    fn dimensions(&self) -> (usize, usize);

    /// Build the plot for spaxel `(x, y)`. Fails with
    /// [`ViewerError::IndexError`] outside the grid.
    fn render_spaxel(&self, x: usize, y: usize) -> Result<SpaxelPlot, ViewerError>;
}

impl SpaxelSource for FitResult {
    fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    fn render_spaxel(&self, x: usize, y: usize) -> Result<SpaxelPlot, ViewerError> {
        if x >= self.width() || y >= self.height() {
            return Err(ViewerError::IndexError {
                x: x as i64,
                y: y as i64,
            });
        }

        let observed = self.fitspec.slice(s![.., y, x]).to_vec();
        let finite: Vec<f64> = observed.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.iter().all(|&v| v == 0.0) {
            return Err(ViewerError::NullSpectrum { x, y });
        }

        let norm_exponent = match median(finite) {
            m if m > 0.0 => m.log10().trunc() as i32,
            _ => 0,
        };
        let norm = 10f64.powi(norm_exponent);

        let solution = self.solution(x, y);
        let params: Vec<f64> = solution
            .iter()
            .map(|&p| if p.is_finite() { p } else { 0.0 })
            .collect();

        let stellar = self.stellar.slice(s![.., y, x]).to_vec();
        let continuum: Vec<f64> = self
            .fitcont
            .slice(s![.., y, x])
            .iter()
            .zip(&stellar)
            .map(|(c, st)| c + st)
            .collect();

        let with_lines = |lines: Vec<f64>| -> Vec<f64> {
            lines
                .iter()
                .zip(&continuum)
                .map(|(l, c)| (l + c) / norm)
                .collect()
        };

        let model = with_lines(profile::evaluate(self.function, &self.wavelength, &params));
        let components = if self.components() > 1 {
            params
                .chunks_exact(self.parameters())
                .map(|p| with_lines(profile::evaluate(self.function, &self.wavelength, p)))
                .collect()
        } else {
            Vec::new()
        };

        let scale = |v: &[f64]| -> Vec<f64> { v.iter().map(|x| x / norm).collect() };

        Ok(SpaxelPlot {
            x,
            y,
            wavelength: self.wavelength.clone(),
            norm_exponent,
            observed: scale(&observed),
            stellar: scale(&stellar),
            continuum: scale(&continuum),
            model,
            components,
            summary: self.summary(x, y, &solution),
        })
    }
}

impl FitResult {
    /// Parameter table for one spaxel.
    fn summary(&self, x: usize, y: usize, solution: &[f64]) -> String {
        let mut out = format!("Spaxel ({x}, {y})\n");

        let _ = write!(out, "{:12}", "Name");
        for name in self.function.parameter_names() {
            let _ = write!(out, "{name:12}");
        }
        out.push('\n');

        for (name, p) in self
            .component_names
            .iter()
            .zip(solution.chunks_exact(self.parameters()))
        {
            let _ = write!(out, "{name:<12}{:>12.2e}", p[0]);
            for v in &p[1..] {
                let _ = write!(out, "{v:>12.2}");
            }
            out.push('\n');
        }

        let _ = writeln!(out, "Fit status: {}", self.fit_status[[y, x]]);
        if let Some(chi2) = &self.reduced_chi2 {
            let _ = writeln!(out, "Reduced chi2: {:.3}", chi2[[y, x]]);
        }
        out
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::selector::tests::sample_fit;
    use approx::assert_relative_eq;

    #[test]
    fn test_out_of_range() {
        let fit = sample_fit();
        assert_eq!(
            fit.render_spaxel(3, 0),
            Err(ViewerError::IndexError { x: 3, y: 0 })
        );
        assert!(fit.render_spaxel(0, 2).is_err());
        assert_eq!(fit.dimensions(), (3, 2));
    }

    #[test]
    fn test_normalisation_and_curves() {
        let fit = sample_fit();
        let plot = fit.render_spaxel(2, 1).unwrap();
        // Median 2e-16 -> log10 = -15.7 -> truncated to -15.
        assert_eq!(plot.norm_exponent, -15);
        assert_eq!(plot.wavelength.len(), 4);
        assert_relative_eq!(plot.observed[0], 0.2, max_relative = 1e-12);
        assert_relative_eq!(plot.continuum[0], 0.1, max_relative = 1e-12);
        assert_eq!(plot.components.len(), 2);
        for i in 0..4 {
            let lines = plot.components[0][i] + plot.components[1][i] - plot.continuum[i];
            assert_relative_eq!(plot.model[i], lines, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_null_spectrum() {
        let mut fit = sample_fit();
        fit.fitspec.slice_mut(s![.., 0, 0]).fill(0.0);
        assert_eq!(
            fit.render_spaxel(0, 0),
            Err(ViewerError::NullSpectrum { x: 0, y: 0 })
        );
        fit.fitspec.slice_mut(s![.., 0, 0]).fill(f64::NAN);
        assert!(fit.render_spaxel(0, 0).is_err());
    }

    #[test]
    fn test_nan_parameters_are_zeroed_in_model() {
        let fit = sample_fit();
        // Spaxel (1, 0) has a NaN h4 in the second component.
        let plot = fit.render_spaxel(1, 0).unwrap();
        assert!(plot.model.iter().all(|v| v.is_finite()));
        assert!(plot.summary.contains("NaN"));
    }

    #[test]
    fn test_summary_table() {
        let fit = sample_fit();
        let plot = fit.render_spaxel(0, 0).unwrap();
        let lines: Vec<&str> = plot.summary.lines().collect();
        assert_eq!(lines[0], "Spaxel (0, 0)");
        assert_eq!(
            lines[1],
            format!("{:12}{:12}{:12}{:12}{:12}{:12}", "Name", "A", "wl", "s", "h3", "h4")
        );
        assert!(lines[2].starts_with("narrow      "));
        assert!(lines[2].contains("1.00e-17"));
        assert!(lines[2].contains("6560.00"));
        assert!(lines[3].starts_with("broad       "));
        assert_eq!(lines[4], "Fit status: 0");
        assert_eq!(lines[5], "Reduced chi2: 1.100");
    }

    #[test]
    fn test_single_component_has_no_dashed_curves() {
        let mut fit = sample_fit();
        fit.component_names.truncate(1);
        fit.model_values = fit.model_values.slice(s![..5, .., ..]).to_owned();
        let plot = fit.render_spaxel(0, 0).unwrap();
        assert!(plot.components.is_empty());
    }
}
