//! Color samples and perceptual color science.

pub mod lab;
pub mod truecolor;

pub use lab::{delta_e76, delta_e94, srgb_to_lab, ColorScience, DistanceMetric, Lab, ReferenceColor};
pub use truecolor::Truecolor;
