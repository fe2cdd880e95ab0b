//! Synthetic pose corpus for demos, benchmarks and tests.
//!
//! Renders an axis-aligned cube with six distinctly colored faces under a
//! given rotation. Projection is orthographic along +z; each face is flat
//! shaded by the cosine between its normal and the view direction, then
//! optionally jittered with seeded per-channel noise.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::color::Truecolor;
use crate::corpus::InMemoryCorpus;
use crate::grid_hash::Rotation;
use crate::raster::{RasterImage, TrainingImage};

/// Base colors of the -x, +x, -y, +y, -z, +z faces.
pub const FACE_COLORS: [[u8; 3]; 6] = [
    [230, 40, 40],
    [40, 200, 60],
    [50, 70, 230],
    [235, 220, 50],
    [40, 210, 220],
    [215, 50, 210],
];

const HALF_EXTENT: f64 = 1.8;

/// Configuration for synthetic corpus generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticPoseConfig {
    pub width: u32,
    pub height: u32,
    /// One training image is rendered per rotation, in this order.
    pub rotations: Vec<Rotation>,
    /// Maximum per-channel jitter added to each pixel.
    pub noise: u8,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SyntheticPoseConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            rotations: rotation_grid(&[0.0, 30.0, 60.0], &[0.0, 40.0, 80.0], &[0.0]),
            noise: 0,
            seed: 42,
        }
    }
}

impl SyntheticPoseConfig {
    /// Render every configured rotation into an in-memory corpus.
    pub fn generate(&self) -> InMemoryCorpus {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let images = self
            .rotations
            .iter()
            .enumerate()
            .map(|(idx, &rotation)| {
                let raster = render_with(self.width, self.height, rotation, self.noise, &mut rng);
                TrainingImage::new(format!("synthetic/pose_{idx:04}.png"), raster, rotation)
            })
            .collect();
        InMemoryCorpus::new(format!("synthetic (seed {})", self.seed), images)
    }

    /// Render a single pose with this config's size and noise level.
    pub fn render(&self, rotation: Rotation, seed: u64) -> RasterImage {
        let mut rng = StdRng::seed_from_u64(seed);
        render_with(self.width, self.height, rotation, self.noise, &mut rng)
    }
}

/// Cartesian product of per-axis angles, in degrees, `rx` outermost.
pub fn rotation_grid(rx: &[f64], ry: &[f64], rz: &[f64]) -> Vec<Rotation> {
    let mut rotations = Vec::with_capacity(rx.len() * ry.len() * rz.len());
    for &x in rx {
        for &y in ry {
            for &z in rz {
                rotations.push(Rotation::new(x, y, z));
            }
        }
    }
    rotations
}

/// Noise-free rendering of the cube under `rotation`.
pub fn render_cube(width: u32, height: u32, rotation: Rotation) -> RasterImage {
    let mut rng = StdRng::seed_from_u64(0);
    render_with(width, height, rotation, 0, &mut rng)
}

fn render_with(
    width: u32,
    height: u32,
    rotation: Rotation,
    noise: u8,
    rng: &mut StdRng,
) -> RasterImage {
    let matrix = rotation_matrix(rotation);
    let mut raster = RasterImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let u = ((x as f64 + 0.5) / width as f64 * 2.0 - 1.0) * HALF_EXTENT;
            let v = -((y as f64 + 0.5) / height as f64 * 2.0 - 1.0) * HALF_EXTENT;

            // Ray in object space: R^T applied to world origin and direction.
            let origin = transpose_mul(&matrix, [u, v, -10.0]);
            let direction = transpose_mul(&matrix, [0.0, 0.0, 1.0]);
            let Some((face, shade)) = intersect_unit_cube(origin, direction) else {
                continue;
            };

            let intensity = 0.35 + 0.65 * shade;
            let base = FACE_COLORS[face];
            let mut rgb = [0u8; 3];
            for (channel, value) in rgb.iter_mut().enumerate() {
                let mut level = base[channel] as f64 * intensity;
                if noise > 0 {
                    level += rng.gen_range(-(noise as i32)..=noise as i32) as f64;
                }
                *value = level.round().clamp(0.0, 255.0) as u8;
            }
            raster.set(x, y, Truecolor::rgb(rgb[0], rgb[1], rgb[2]));
        }
    }

    raster
}

/// Object-to-world rotation `Rz * Ry * Rx`, angles in degrees.
fn rotation_matrix(rotation: Rotation) -> [[f64; 3]; 3] {
    let (sx, cx) = rotation.rx.to_radians().sin_cos();
    let (sy, cy) = rotation.ry.to_radians().sin_cos();
    let (sz, cz) = rotation.rz.to_radians().sin_cos();

    let rx = [[1.0, 0.0, 0.0], [0.0, cx, -sx], [0.0, sx, cx]];
    let ry = [[cy, 0.0, sy], [0.0, 1.0, 0.0], [-sy, 0.0, cy]];
    let rz = [[cz, -sz, 0.0], [sz, cz, 0.0], [0.0, 0.0, 1.0]];
    mat_mul(&rz, &mat_mul(&ry, &rx))
}

fn mat_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn transpose_mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2],
        m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2],
        m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2],
    ]
}

/// Slab test against `[-1, 1]^3`. Returns the entered face index and the
/// cosine between that face's normal and the ray.
fn intersect_unit_cube(origin: [f64; 3], direction: [f64; 3]) -> Option<(usize, f64)> {
    let mut t_near = f64::NEG_INFINITY;
    let mut t_far = f64::INFINITY;
    let mut entry_axis = None;

    for axis in 0..3 {
        if direction[axis].abs() < 1e-12 {
            if origin[axis].abs() > 1.0 {
                return None;
            }
            continue;
        }
        let t1 = (-1.0 - origin[axis]) / direction[axis];
        let t2 = (1.0 - origin[axis]) / direction[axis];
        let (lo, hi) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if lo > t_near {
            t_near = lo;
            entry_axis = Some(axis);
        }
        t_far = t_far.min(hi);
    }

    if t_near > t_far || t_far < 0.0 {
        return None;
    }
    let axis = entry_axis?;
    // The ray enters through the face whose normal opposes it.
    let face = axis * 2 + usize::from(direction[axis] < 0.0);
    Some((face, direction[axis].abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::corpus::TrainingCorpus;
    use crate::pipeline::train;
    use crate::raster::PixelSource;

    #[test]
    fn test_front_view_shows_one_face() {
        let image = render_cube(16, 16, Rotation::new(0.0, 0.0, 0.0));
        assert!(image.pixel(0, 0).is_background());
        let center = image.pixel(8, 8);
        // Facing the camera: the -z face at full intensity.
        assert_eq!(center, Truecolor::rgb(40, 210, 220));
        let colors: std::collections::HashSet<_> = image.foreground().map(|(_, _, c)| c).collect();
        assert_eq!(colors.len(), 1);
    }

    #[test]
    fn test_oblique_view_shows_several_faces() {
        let image = render_cube(32, 32, Rotation::new(30.0, 40.0, 0.0));
        let colors: std::collections::HashSet<_> = image.foreground().map(|(_, _, c)| c).collect();
        assert!(colors.len() >= 2);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = SyntheticPoseConfig {
            noise: 6,
            ..Default::default()
        };
        let a = config.generate();
        let b = config.generate();
        assert_eq!(a.len(), 9);
        for (left, right) in a.images().iter().zip(b.images()) {
            assert_eq!(left.raster, right.raster);
            assert_eq!(left.rotation, right.rotation);
        }
    }

    #[test]
    fn test_rotation_grid_order() {
        let grid = rotation_grid(&[0.0, 10.0], &[5.0], &[1.0, 2.0]);
        assert_eq!(
            grid,
            vec![
                Rotation::new(0.0, 5.0, 1.0),
                Rotation::new(0.0, 5.0, 2.0),
                Rotation::new(10.0, 5.0, 1.0),
                Rotation::new(10.0, 5.0, 2.0),
            ]
        );
    }

    #[test]
    fn test_index_recovers_training_pose() {
        let config = SyntheticPoseConfig::default();
        let corpus = config.generate();
        let result = train(&corpus, &TrainingConfig::default()).unwrap();

        let target = config.rotations[4];
        let query = render_cube(config.width, config.height, target);
        let ranking = result.identify_rotation(&query).unwrap();
        let best = ranking.best().unwrap();
        assert_eq!(best.rotation, target);
        assert_eq!(best.votes, query.foreground_count() as u64);
    }
}
