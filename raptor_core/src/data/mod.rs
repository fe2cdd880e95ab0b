//! Synthetic pose data for demos, benchmarks and tests.

pub mod synthetic;

pub use synthetic::{render_cube, rotation_grid, SyntheticPoseConfig, FACE_COLORS};
