use std::fmt;

use eframe::egui::{Color32, ColorImage};
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};

use crate::data::selector::MaskedImage;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            to_color32(rgb)
        })
        .collect()
}

fn to_color32(rgb: Srgb) -> Color32 {
    Color32::from_rgb(
        (rgb.red.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
    )
}

// ---------------------------------------------------------------------------
// Colormaps
// ---------------------------------------------------------------------------

const VIRIDIS_STOPS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [72, 40, 120],
    [62, 73, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [110, 206, 88],
    [253, 231, 37],
];

// ColorBrewer "Spectral", listed low to high for the reversed map.
const SPECTRAL_R_STOPS: [[u8; 3]; 11] = [
    [94, 79, 162],
    [50, 136, 189],
    [102, 194, 165],
    [171, 221, 164],
    [230, 245, 152],
    [255, 255, 191],
    [254, 224, 139],
    [253, 174, 97],
    [244, 109, 67],
    [213, 62, 79],
    [158, 1, 66],
];

/// Colormaps used by the parameter map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Sequential, for flux and dispersion.
    Viridis,
    /// Diverging, for velocities and higher moments.
    SpectralR,
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colormap::Viridis => write!(f, "viridis"),
            Colormap::SpectralR => write!(f, "Spectral_r"),
        }
    }
}

impl Colormap {
    pub fn is_diverging(self) -> bool {
        matches!(self, Colormap::SpectralR)
    }

    fn stops(self) -> &'static [[u8; 3]] {
        match self {
            Colormap::Viridis => &VIRIDIS_STOPS,
            Colormap::SpectralR => &SPECTRAL_R_STOPS,
        }
    }

    /// Colour at normalised position `t` in `[0, 1]`, interpolated in linear sRGB.
    pub fn eval(self, t: f64) -> Color32 {
        let stops = self.stops();
        let scaled = t.clamp(0.0, 1.0) as f32 * (stops.len() - 1) as f32;
        let i = (scaled.floor() as usize).min(stops.len() - 2);
        let frac = scaled - i as f32;

        let lo = linear(stops[i]);
        let hi = linear(stops[i + 1]);
        let rgb: Srgb = Srgb::from_linear(lo.mix(hi, frac));
        to_color32(rgb)
    }
}

fn linear(c: [u8; 3]) -> LinSrgb {
    Srgb::new(c[0], c[1], c[2]).into_format::<f32>().into_linear()
}

// ---------------------------------------------------------------------------
// Colour limits
// ---------------------------------------------------------------------------

/// Data values mapped to the two ends of the colormap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorLimits {
    pub vmin: f64,
    pub vmax: f64,
}

impl ColorLimits {
    /// Symmetric limits for diverging maps, data-driven otherwise.
    /// `None` when every pixel is masked.
    pub fn for_image(image: &MaskedImage, colormap: Colormap) -> Option<Self> {
        if colormap.is_diverging() {
            let peak = image.abs_max()?;
            Some(ColorLimits {
                vmin: -peak,
                vmax: peak,
            })
        } else {
            let (vmin, vmax) = image.min_max()?;
            Some(ColorLimits { vmin, vmax })
        }
    }

    /// Position of `value` between the limits, in `[0, 1]`.
    pub fn normalize(&self, value: f64) -> f64 {
        let range = self.vmax - self.vmin;
        if range.abs() < f64::EPSILON {
            0.5
        } else {
            ((value - self.vmin) / range).clamp(0.0, 1.0)
        }
    }
}

/// Colourise a masked image for upload as a texture.
///
/// Texture row 0 is the top of the screen, so rows are flipped to keep
/// `y = 0` at the bottom of the plot. Masked pixels are transparent.
pub fn colorize(image: &MaskedImage, colormap: Colormap, limits: Option<ColorLimits>) -> ColorImage {
    let (height, width) = image.data.dim();
    let mut out = ColorImage::new([width, height], Color32::TRANSPARENT);
    let Some(lim) = limits else {
        return out;
    };
    for row in 0..height {
        let y = height - 1 - row;
        for x in 0..width {
            if let Some(v) = image.get(x, y) {
                out.pixels[row * width + x] = colormap.eval(lim.normalize(v));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_palette_size() {
        assert!(generate_palette(0).is_empty());
        let p = generate_palette(4);
        assert_eq!(p.len(), 4);
        assert_ne!(p[0], p[1]);
    }

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(Colormap::Viridis.eval(0.0), Color32::from_rgb(68, 1, 84));
        assert_eq!(Colormap::Viridis.eval(1.0), Color32::from_rgb(253, 231, 37));
        assert_eq!(Colormap::SpectralR.eval(-3.0), Colormap::SpectralR.eval(0.0));
        assert_eq!(Colormap::SpectralR.to_string(), "Spectral_r");
        assert!(Colormap::SpectralR.is_diverging());
        assert!(!Colormap::Viridis.is_diverging());
    }

    #[test]
    fn test_diverging_limits_are_symmetric() {
        let image = MaskedImage {
            data: array![[-3.0, 1.0], [2.0, 50.0]],
            mask: array![[false, false], [false, true]],
        };
        let lim = ColorLimits::for_image(&image, Colormap::SpectralR).unwrap();
        assert_eq!(lim, ColorLimits { vmin: -3.0, vmax: 3.0 });

        let lim = ColorLimits::for_image(&image, Colormap::Viridis).unwrap();
        assert_eq!(lim, ColorLimits { vmin: -3.0, vmax: 2.0 });
    }

    #[test]
    fn test_colorize_flips_rows_and_hides_masked() {
        let image = MaskedImage {
            data: array![[0.0, 1.0], [2.0, 3.0]],
            mask: array![[false, true], [false, false]],
        };
        let lim = ColorLimits::for_image(&image, Colormap::Viridis);
        let img = colorize(&image, Colormap::Viridis, lim);
        assert_eq!(img.size, [2, 2]);
        // Bottom texture row holds y = 0.
        assert_eq!(img.pixels[2], Colormap::Viridis.eval(0.0));
        assert_eq!(img.pixels[3], Color32::TRANSPARENT);
        assert_eq!(img.pixels[1], Colormap::Viridis.eval(1.0));
    }

    #[test]
    fn test_all_masked_has_no_limits() {
        let image = MaskedImage {
            data: array![[1.0]],
            mask: array![[true]],
        };
        assert!(ColorLimits::for_image(&image, Colormap::Viridis).is_none());
        let img = colorize(&image, Colormap::Viridis, None);
        assert_eq!(img.pixels, vec![Color32::TRANSPARENT]);
    }
}
