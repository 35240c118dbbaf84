use std::f64::consts::SQRT_2;

use super::model::FitFunction;

/// Gaussian with parameters `[amplitude, centre, sigma]`.
pub fn gaussian(wl: f64, p: &[f64]) -> f64 {
    let (a, centre, sigma) = (p[0], p[1], p[2]);
    if sigma == 0.0 {
        return 0.0;
    }
    let w = (wl - centre) / sigma;
    a * (-w * w / 2.0).exp()
}

/// Gauss-Hermite series with parameters `[amplitude, centre, sigma, h3, h4]`.
pub fn gauss_hermite(wl: f64, p: &[f64]) -> f64 {
    let (a, centre, sigma, h3, h4) = (p[0], p[1], p[2], p[3], p[4]);
    if sigma == 0.0 {
        return 0.0;
    }
    let w = (wl - centre) / sigma;
    let w2 = w * w;
    let hermite3 = (2.0 * SQRT_2 * w2 * w - 3.0 * SQRT_2 * w) / 6f64.sqrt();
    let hermite4 = (4.0 * w2 * w2 - 12.0 * w2 + 3.0) / 24f64.sqrt();
    a * (-w2 / 2.0).exp() * (1.0 + h3 * hermite3 + h4 * hermite4)
}

/// Evaluate the sum of all components in `params` over `wavelength`.
///
/// `params` holds whole components back to back; a trailing partial
/// component is ignored.
pub fn evaluate(function: FitFunction, wavelength: &[f64], params: &[f64]) -> Vec<f64> {
    let profile: fn(f64, &[f64]) -> f64 = match function {
        FitFunction::Gaussian => gaussian,
        FitFunction::GaussHermite => gauss_hermite,
    };
    let npars = function.parameters();
    wavelength
        .iter()
        .map(|&wl| params.chunks_exact(npars).map(|p| profile(wl, p)).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_peak_and_width() {
        let p = [2.0, 6563.0, 3.0];
        assert_relative_eq!(gaussian(6563.0, &p), 2.0);
        assert_relative_eq!(gaussian(6566.0, &p), 2.0 * (-0.5f64).exp());
        assert_eq!(gaussian(6563.0, &[2.0, 6563.0, 0.0]), 0.0);
    }

    #[test]
    fn test_gauss_hermite_reduces_to_gaussian() {
        let g = [1.5, 5007.0, 2.0];
        let gh = [1.5, 5007.0, 2.0, 0.0, 0.0];
        for wl in [5000.0, 5005.5, 5007.0, 5010.0] {
            assert_relative_eq!(gauss_hermite(wl, &gh), gaussian(wl, &g), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_h3_is_antisymmetric() {
        let p = [1.0, 0.0, 1.0, 0.1, 0.0];
        let base = [1.0, 0.0, 1.0];
        let left = gauss_hermite(-1.0, &p) - gaussian(-1.0, &base);
        let right = gauss_hermite(1.0, &p) - gaussian(1.0, &base);
        assert_relative_eq!(left, -right, epsilon = 1e-12);
    }

    #[test]
    fn test_evaluate_sums_components() {
        let wl = [6560.0, 6563.0, 6566.0];
        let params = [1.0, 6563.0, 2.0, 0.5, 6566.0, 1.0];
        let total = evaluate(FitFunction::Gaussian, &wl, &params);
        for (i, &w) in wl.iter().enumerate() {
            let expected = gaussian(w, &params[..3]) + gaussian(w, &params[3..]);
            assert_relative_eq!(total[i], expected);
        }
    }
}
