//! Error types for index construction and rotation queries
//!
//! Every fallible operation in the crate returns [`RaptorResult`]. Corpus-level
//! failures (bad configuration, unreadable files, missing pose metadata) abort
//! the whole build; per-pixel conditions at query time are governed by
//! [`UnmatchedColorPolicy`](crate::grid_hash::UnmatchedColorPolicy) instead.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result type alias for index operations
pub type RaptorResult<T> = Result<T, RaptorError>;

/// Error type for palette, quantization, grid and pipeline operations
#[derive(Debug, Clone, PartialEq)]
pub enum RaptorError {
    /// Invalid configuration parameter
    InvalidConfiguration {
        parameter: String,
        value: String,
        reason: String,
    },

    /// The training corpus contained no images
    EmptyCorpus { root: String },

    /// Palette has no entries; quantization cannot proceed
    EmptyPalette,

    /// An image could not be read or decoded
    Decode { path: PathBuf, reason: String },

    /// A training image lacks a usable rotation component
    MissingRotation {
        path: PathBuf,
        key: String,
        reason: String,
    },

    /// A rotation tuple had a non-finite component
    InvalidRotation { rx: f64, ry: f64, rz: f64 },

    /// Attempt to index a background sample
    BackgroundActivation { x: u32, y: u32 },

    /// Query pixel color never observed during training, under the reject policy
    UnmatchedColor { x: u32, y: u32, color: u32 },

    /// Corpus discovery failed (directory walk)
    Discovery { path: PathBuf, reason: String },

    /// Build was cancelled between images
    Cancelled { completed: usize, total: usize },
}

impl fmt::Display for RaptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaptorError::InvalidConfiguration {
                parameter,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid configuration for parameter '{}' with value '{}': {}",
                    parameter, value, reason
                )
            }
            RaptorError::EmptyCorpus { root } => {
                write!(f, "Training corpus '{}' contains no images", root)
            }
            RaptorError::EmptyPalette => {
                write!(
                    f,
                    "Palette is empty: the training corpus produced no foreground colors"
                )
            }
            RaptorError::Decode { path, reason } => {
                write!(f, "Failed to decode image {}: {}", path.display(), reason)
            }
            RaptorError::MissingRotation { path, key, reason } => {
                write!(
                    f,
                    "Image {} has no usable rotation component '{}': {}",
                    path.display(),
                    key,
                    reason
                )
            }
            RaptorError::InvalidRotation { rx, ry, rz } => {
                write!(
                    f,
                    "Rotation ({}, {}, {}) has a non-finite component",
                    rx, ry, rz
                )
            }
            RaptorError::BackgroundActivation { x, y } => {
                write!(
                    f,
                    "Pixel ({}, {}) is background and cannot be registered as an activation",
                    x, y
                )
            }
            RaptorError::UnmatchedColor { x, y, color } => {
                write!(
                    f,
                    "Query pixel ({}, {}) has color #{:08x} which was never seen in training",
                    x, y, color
                )
            }
            RaptorError::Discovery { path, reason } => {
                write!(f, "Failed to scan {}: {}", path.display(), reason)
            }
            RaptorError::Cancelled { completed, total } => {
                write!(
                    f,
                    "Training cancelled after {} of {} images",
                    completed, total
                )
            }
        }
    }
}

impl std::error::Error for RaptorError {}

// Convenience constructors for common error patterns
impl RaptorError {
    /// Create an invalid configuration error
    pub fn invalid_config(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        RaptorError::InvalidConfiguration {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an empty corpus error
    pub fn empty_corpus(root: impl Into<String>) -> Self {
        RaptorError::EmptyCorpus { root: root.into() }
    }

    /// Create a decode error naming the offending file
    pub fn decode(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        RaptorError::Decode {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Create a missing rotation metadata error
    pub fn missing_rotation(
        path: impl AsRef<Path>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        RaptorError::MissingRotation {
            path: path.as_ref().to_path_buf(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        RaptorError::Discovery {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
