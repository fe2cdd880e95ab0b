//! Deterministic color space utilities for perceptual distance metrics.
//!
//! Provides fixed-parameter conversions between sRGB and CIELAB using the
//! CIE 1931 2° standard observer and D65 illuminant. The functions in this
//! module avoid platform color management differences by relying solely on
//! analytic transforms, so palette construction and quantization are
//! reproducible bit for bit across runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Truecolor;

const D65_WHITE_POINT: [f32; 3] = [0.95047, 1.0, 1.08883];
const EPSILON: f32 = 0.008856_452; // 216/24389
const KAPPA: f32 = 903.296_3; // 24389/27
const K1: f32 = 0.045; // Graphic arts weighting for ΔE94
const K2: f32 = 0.015;

/// A CIELAB coordinate triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl Lab {
    pub fn from_truecolor(color: Truecolor) -> Self {
        srgb_to_lab(color.to_unit_rgb())
    }

    pub fn chroma(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }
}

/// Convert an sRGB triplet in [0, 1] to linear-light RGB.
fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

/// Convert an sRGB color to XYZ using the D65 illuminant and CIE 1931 2° observer.
fn srgb_to_xyz(rgb: [f32; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    [x, y, z]
}

fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.powf(1.0 / 3.0)
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

/// Convert an sRGB color in [0, 1] to CIELAB coordinates (L*, a*, b*).
pub fn srgb_to_lab(rgb: [f32; 3]) -> Lab {
    let xyz = srgb_to_xyz(rgb);
    let xr = xyz[0] / D65_WHITE_POINT[0];
    let yr = xyz[1] / D65_WHITE_POINT[1];
    let zr = xyz[2] / D65_WHITE_POINT[2];

    let fx = lab_f(xr);
    let fy = lab_f(yr);
    let fz = lab_f(zr);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Compute the CIE ΔE94 color difference between two Lab colors.
///
/// Weighting factors kL, kC, and kH are fixed to 1.0. Application-specific
/// modifiers K1 and K2 follow the graphic arts standard (0.045, 0.015).
/// The chroma weighting uses `lab_a`, so the metric is not symmetric.
pub fn delta_e94(lab_a: &Lab, lab_b: &Lab) -> f32 {
    let delta_l = lab_a.l - lab_b.l;
    let c1 = lab_a.chroma();
    let c2 = lab_b.chroma();
    let delta_c = c1 - c2;

    let delta_a = lab_a.a - lab_b.a;
    let delta_b = lab_a.b - lab_b.b;
    let delta_h_sq = (delta_a * delta_a) + (delta_b * delta_b) - (delta_c * delta_c);
    let delta_h = delta_h_sq.max(0.0).sqrt();

    let s_l = 1.0;
    let s_c = 1.0 + K1 * c1;
    let s_h = 1.0 + K2 * c1;

    let term_l = delta_l / s_l;
    let term_c = delta_c / s_c;
    let term_h = delta_h / s_h;

    (term_l * term_l + term_c * term_c + term_h * term_h).sqrt()
}

/// CIE76: Euclidean distance in Lab.
pub fn delta_e76(lab_a: &Lab, lab_b: &Lab) -> f32 {
    let dl = lab_a.l - lab_b.l;
    let da = lab_a.a - lab_b.a;
    let db = lab_a.b - lab_b.b;
    (dl * dl + da * da + db * db).sqrt()
}

/// Perceptual conversion and distance used by palette building and quantization.
///
/// Implementations must be pure: the same inputs always give the same output,
/// and `distance` is nonnegative and zero for identical colors.
pub trait ColorScience {
    fn to_perceptual(&self, color: Truecolor) -> Lab {
        Lab::from_truecolor(color)
    }

    fn distance(&self, a: &Lab, b: &Lab) -> f32;
}

/// Built-in color difference formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// CIE ΔE94, graphic arts weights.
    #[default]
    Cie94,
    /// CIE ΔE76 (Euclidean Lab).
    Cie76,
}

impl ColorScience for DistanceMetric {
    fn distance(&self, a: &Lab, b: &Lab) -> f32 {
        match self {
            DistanceMetric::Cie94 => delta_e94(a, b),
            DistanceMetric::Cie76 => delta_e76(a, b),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cie94" | "delta_e94" => Ok(DistanceMetric::Cie94),
            "cie76" | "delta_e76" => Ok(DistanceMetric::Cie76),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}

/// Fixed color against which every observed color is keyed before palette sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReferenceColor {
    #[default]
    White,
    Black,
    Custom(Truecolor),
}

impl ReferenceColor {
    pub fn truecolor(&self) -> Truecolor {
        match self {
            ReferenceColor::White => Truecolor::WHITE,
            ReferenceColor::Black => Truecolor::BLACK,
            ReferenceColor::Custom(color) => color.opaque(),
        }
    }
}

impl fmt::Display for ReferenceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceColor::White => write!(f, "white"),
            ReferenceColor::Black => write!(f, "black"),
            ReferenceColor::Custom(color) => write!(f, "{}", color),
        }
    }
}

impl FromStr for ReferenceColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(ReferenceColor::White),
            "black" => Ok(ReferenceColor::Black),
            other => other.parse::<Truecolor>().map(ReferenceColor::Custom),
        }
    }
}

impl TryFrom<String> for ReferenceColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceColor> for String {
    fn from(value: ReferenceColor) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strict tolerance for identical-color comparisons.
    const DELTA_E94_TOLERANCE: f32 = 1.0e-3;

    fn approx_equal(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "{} !≈ {}", a, b);
    }

    #[test]
    fn srgb_to_lab_reference_white() {
        let lab = Lab::from_truecolor(Truecolor::WHITE);
        approx_equal(lab.l, 100.0, 1e-3);
        approx_equal(lab.a, 0.0, 1e-3);
        approx_equal(lab.b, 0.0, 1e-3);
    }

    #[test]
    fn delta_e94_zero_for_identical_colors() {
        let lab = Lab::from_truecolor(Truecolor::rgb(51, 102, 153));
        approx_equal(delta_e94(&lab, &lab), 0.0, DELTA_E94_TOLERANCE);
    }

    #[test]
    fn delta_e94_matches_reference_pair() {
        // Pure red vs. pure green difference using the fixed ΔE94 parameters.
        let red = Lab::from_truecolor(Truecolor::rgb(255, 0, 0));
        let green = Lab::from_truecolor(Truecolor::rgb(0, 255, 0));
        approx_equal(delta_e94(&red, &green), 73.430, 1e-3);
    }

    #[test]
    fn delta_e76_is_symmetric() {
        let a = Lab::from_truecolor(Truecolor::rgb(200, 30, 90));
        let b = Lab::from_truecolor(Truecolor::rgb(10, 180, 60));
        assert_eq!(delta_e76(&a, &b), delta_e76(&b, &a));
        assert!(delta_e76(&a, &b) > 0.0);
    }

    #[test]
    fn alpha_does_not_change_perception() {
        let metric = DistanceMetric::default();
        let a = metric.to_perceptual(Truecolor::rgba(90, 90, 90, 10));
        let b = metric.to_perceptual(Truecolor::rgb(90, 90, 90));
        assert_eq!(a, b);
    }

    #[test]
    fn reference_color_parsing() {
        assert_eq!("White".parse::<ReferenceColor>().unwrap(), ReferenceColor::White);
        assert_eq!("black".parse::<ReferenceColor>().unwrap(), ReferenceColor::Black);
        assert_eq!(
            "#336699".parse::<ReferenceColor>().unwrap(),
            ReferenceColor::Custom(Truecolor::rgb(0x33, 0x66, 0x99))
        );
        assert_eq!(ReferenceColor::Black.truecolor(), Truecolor::BLACK);
    }
}
