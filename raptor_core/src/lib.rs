//! # Raptor Core
//!
//! Rotation identification by geometric hashing of quantized pixel colors.
//!
//! A corpus of rendered training images, each tagged with the rotation
//! `(rx, ry, rz)` it was rendered at, is reduced to a perceptual palette and a
//! grid hash from `(x, y, quantized color)` to the rotations that produced that
//! activation. A query image then votes for rotations pixel by pixel.
//!
//! ## Quick Start
//!
//! ```rust
//! use raptor_core::data::{render_cube, SyntheticPoseConfig};
//! use raptor_core::{train, TrainingConfig};
//!
//! let synthetic = SyntheticPoseConfig::default();
//! let corpus = synthetic.generate();
//! let result = train(&corpus, &TrainingConfig::default()).unwrap();
//!
//! let pose = synthetic.rotations[2];
//! let query = render_cube(synthetic.width, synthetic.height, pose);
//! let ranking = result.identify_rotation(&query).unwrap();
//! assert_eq!(ranking.best().unwrap().rotation, pose);
//! ```
//!
//! ## Core Modules
//!
//! - [`color`] - Truecolor packing, CIE L*a*b* conversion and ΔE metrics
//! - [`palette`] - Reference-sorted palette sampling
//! - [`quantize`] - Nearest-palette color mapping
//! - [`grid_hash`] - Activation grid, rotation registry and voting queries
//! - [`pipeline`] - Two-pass index build over a corpus
//! - [`corpus`] / [`raster`] - Image discovery, decoding and rotation metadata
//! - [`config`] - Index configuration via TOML
//! - [`checkpoint`] - Versioned binary persistence
//! - [`logging`] - JSON line-delimited run records

pub mod checkpoint;
pub mod color;
pub mod config;
pub mod corpus;
pub mod data;
pub mod error;
pub mod grid_hash;
pub mod logging;
pub mod palette;
pub mod pipeline;
pub mod quantize;
pub mod raster;

pub use checkpoint::{CheckpointError, Checkpointable, INDEX_FORMAT_VERSION};
pub use color::{
    delta_e76, delta_e94, srgb_to_lab, ColorScience, DistanceMetric, Lab, ReferenceColor,
    Truecolor,
};
pub use config::{ConfigError, QueryConfig, RaptorConfig, TrainingConfig};
pub use corpus::{discover_images, DirectoryCorpus, InMemoryCorpus, TrainingCorpus};
pub use error::{RaptorError, RaptorResult};
pub use grid_hash::{
    ActivationKey, GridHash, GridStats, RankingOrder, Rotation, RotationCandidate, RotationId,
    RotationRanking, RotationRegistry, UnmatchedColorPolicy,
};
pub use palette::{Palette, PaletteBuilder, PerceptualColor, UniqueColors, DEFAULT_PALETTE_SIZE};
pub use pipeline::{
    train, train_with, CancelFlag, DecodeFailurePolicy, TrainingResult, TrainingStats,
};
pub use quantize::QuantizationMap;
pub use raster::{
    DecodedImage, ImageDecoder, PixelSource, PngDecoder, RasterImage, TrainingImage,
    ROTATION_KEYS,
};
