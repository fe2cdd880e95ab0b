//! Checkpoint trait and error handling for deterministic index persistence.
//!
//! [`Checkpointable`] enforces a versioned serialization contract: every
//! snapshot carries a version header so that incompatible files are rejected
//! during load. [`GridHash`] is stored with all of its maps sorted, so saving
//! the same index twice produces identical bytes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::color::{DistanceMetric, Truecolor};
use crate::config::QueryConfig;
use crate::grid_hash::{ActivationKey, GridHash, Rotation, RotationId, RotationRegistry};
use crate::palette::Palette;
use crate::quantize::QuantizationMap;

/// Version written into every grid hash checkpoint.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Errors that can occur while saving or loading checkpoints.
#[derive(Debug)]
pub enum CheckpointError {
    /// Underlying I/O failure while reading or writing checkpoint files.
    Io(std::io::Error),
    /// Serialization or deserialization error from the binary codec.
    Serialization(bincode::Error),
    /// The checkpoint file was well formed but produced an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },
    /// The checkpoint file did not match the expected structure.
    InvalidFormat(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "I/O error while accessing checkpoint: {err}"),
            CheckpointError::Serialization(err) => {
                write!(f, "Failed to (de)serialize checkpoint payload: {err}")
            }
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "Checkpoint version mismatch: expected {expected}, found {found}",
            ),
            CheckpointError::InvalidFormat(msg) => {
                write!(f, "Checkpoint file has invalid structure: {msg}")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Serialization(err)
    }
}

/// Deterministic binary codec options shared by all checkpoint implementations.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

/// Components that support deterministic persistence implement this trait.
pub trait Checkpointable: Sized {
    /// Save the current state to `path` using the deterministic codec.
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError>;

    /// Load a state from `path`.
    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError>;

    /// Utility for writing a serializable snapshot with the shared codec.
    fn write_snapshot<P, T>(snapshot: &T, path: P) -> Result<(), CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::Serialize,
    {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        codec().serialize_into(&mut writer, snapshot)?;
        writer.flush()?;
        Ok(())
    }

    /// Utility for reading a serializable snapshot with the shared codec.
    fn read_snapshot<P, T>(path: P) -> Result<T, CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::de::DeserializeOwned,
    {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Ok(codec().deserialize_from(&mut reader)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GridHashCheckpoint {
    version: u32,
    metric: DistanceMetric,
    query: QueryConfig,
    palette: Vec<Truecolor>,
    mapping: Vec<(Truecolor, Truecolor)>,
    grid: Vec<(ActivationKey, Vec<RotationId>)>,
    rotations: Vec<Rotation>,
}

impl GridHashCheckpoint {
    fn capture(grid: &GridHash) -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            metric: grid.metric(),
            query: *grid.query_config(),
            palette: grid.palette().colors(),
            mapping: grid.mapping().sorted_pairs(),
            grid: grid.sorted_entries(),
            rotations: grid.registry().rotations().to_vec(),
        }
    }

    fn restore(self) -> Result<GridHash, CheckpointError> {
        if self.version != INDEX_FORMAT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: INDEX_FORMAT_VERSION,
                found: self.version,
            });
        }

        let palette_colors: HashSet<Truecolor> = self.palette.iter().copied().collect();
        if let Some((from, to)) = self
            .mapping
            .iter()
            .find(|(_, to)| !palette_colors.contains(to))
        {
            return Err(CheckpointError::InvalidFormat(format!(
                "color {from} maps to {to}, which is not a palette entry"
            )));
        }

        let registry = RotationRegistry::from_rotations(self.rotations)
            .map_err(CheckpointError::InvalidFormat)?;

        let mut grid = HashMap::with_capacity(self.grid.len());
        for (key, ids) in self.grid {
            if !palette_colors.contains(&key.color) {
                return Err(CheckpointError::InvalidFormat(format!(
                    "grid key ({}, {}) holds non-palette color {}",
                    key.x, key.y, key.color
                )));
            }
            if ids.is_empty() {
                return Err(CheckpointError::InvalidFormat(format!(
                    "grid key ({}, {}, {}) has no activations",
                    key.x, key.y, key.color
                )));
            }
            if let Some(bad) = ids.iter().find(|id| id.index() >= registry.len()) {
                return Err(CheckpointError::InvalidFormat(format!(
                    "rotation id {} out of range ({} rotations)",
                    bad.0,
                    registry.len()
                )));
            }
            if grid.insert(key, ids).is_some() {
                return Err(CheckpointError::InvalidFormat(format!(
                    "duplicate grid key ({}, {}, {})",
                    key.x, key.y, key.color
                )));
            }
        }

        Ok(GridHash::from_parts(
            Palette::from_colors(&self.palette, &self.metric),
            QuantizationMap::from_pairs(self.mapping),
            self.metric,
            grid,
            registry,
            self.query,
        ))
    }
}

impl Checkpointable for GridHash {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = GridHashCheckpoint::capture(self);
        Self::write_snapshot(&snapshot, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let snapshot: GridHashCheckpoint = Self::read_snapshot(path)?;
        let grid = snapshot.restore()?;
        tracing::debug!(
            "Loaded grid hash checkpoint: {} keys, {} rotations",
            grid.stats().keys,
            grid.registry().len()
        );
        Ok(grid)
    }
}
