//! Geometric hash from (x, y, quantized color) to the rotations that produced it.
//!
//! Training appends one rotation id per foreground pixel to the list stored at
//! that pixel's activation key. Querying walks the foreground pixels of an
//! image, looks up each key and counts one vote per stored id, so repeated
//! training observations weigh proportionally more.

use std::collections::HashMap;
use std::mem::size_of;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::color::{ColorScience, DistanceMetric, Truecolor};
use crate::config::QueryConfig;
use crate::error::{RaptorError, RaptorResult};
use crate::palette::{Palette, PerceptualColor};
use crate::quantize::QuantizationMap;
use crate::raster::PixelSource;

/// A rotation tuple attached to a training image (units are corpus-defined).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Rotation {
    pub fn new(rx: f64, ry: f64, rz: f64) -> Self {
        Self { rx, ry, rz }
    }

    pub fn is_finite(&self) -> bool {
        self.rx.is_finite() && self.ry.is_finite() && self.rz.is_finite()
    }

    fn key(&self) -> RotationKey {
        RotationKey([
            canonical_bits(self.rx),
            canonical_bits(self.ry),
            canonical_bits(self.rz),
        ])
    }
}

/// Bit pattern with `-0.0` folded onto `0.0`.
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RotationKey([u64; 3]);

/// Dense rotation identifier, assigned in first-seen order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RotationId(pub u32);

impl RotationId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Append-only rotation registry.
///
/// The forward map and the inverse list are updated together on every new
/// rotation, so `rotation(id)` always reflects all registered rotations.
#[derive(Debug, Clone, Default)]
pub struct RotationRegistry {
    ids: HashMap<RotationKey, RotationId>,
    rotations: Vec<Rotation>,
}

impl RotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or assign the id for `rotation`.
    pub fn id_for(&mut self, rotation: Rotation) -> RaptorResult<RotationId> {
        if !rotation.is_finite() {
            return Err(RaptorError::InvalidRotation {
                rx: rotation.rx,
                ry: rotation.ry,
                rz: rotation.rz,
            });
        }
        let next = RotationId(self.rotations.len() as u32);
        let id = *self.ids.entry(rotation.key()).or_insert(next);
        if id == next {
            self.rotations.push(rotation);
        }
        Ok(id)
    }

    pub fn get(&self, rotation: &Rotation) -> Option<RotationId> {
        self.ids.get(&rotation.key()).copied()
    }

    pub fn rotation(&self, id: RotationId) -> Option<Rotation> {
        self.rotations.get(id.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }

    /// Rotations in id order.
    pub fn rotations(&self) -> &[Rotation] {
        &self.rotations
    }

    pub fn iter(&self) -> impl Iterator<Item = (RotationId, Rotation)> + '_ {
        self.rotations
            .iter()
            .enumerate()
            .map(|(idx, &rotation)| (RotationId(idx as u32), rotation))
    }

    /// Rebuild from an id-ordered rotation list; duplicates are rejected.
    pub(crate) fn from_rotations(rotations: Vec<Rotation>) -> Result<Self, String> {
        let mut registry = Self::new();
        for (idx, rotation) in rotations.into_iter().enumerate() {
            let id = registry.id_for(rotation).map_err(|err| err.to_string())?;
            if id.index() != idx {
                return Err(format!(
                    "rotation {} duplicates rotation {}",
                    idx,
                    id.index()
                ));
            }
        }
        Ok(registry)
    }
}

/// Key of one grid cell: pixel position plus quantized color.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActivationKey {
    pub x: u32,
    pub y: u32,
    pub color: Truecolor,
}

impl ActivationKey {
    pub fn new(x: u32, y: u32, color: Truecolor) -> Self {
        Self { x, y, color }
    }
}

/// What to do with a query pixel whose color training never saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedColorPolicy {
    /// Ignore the pixel and count it in `RotationRanking::unmatched_pixels`.
    #[default]
    Skip,
    /// Quantize against the retained palette instead.
    NearestPalette,
    /// Fail the query with `RaptorError::UnmatchedColor`.
    Reject,
}

/// Sort direction of a ranking. Ties are always ordered by ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingOrder {
    /// Most votes first.
    #[default]
    Descending,
    /// Fewest votes first; best match last.
    Ascending,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationCandidate {
    pub rotation: Rotation,
    pub id: RotationId,
    pub votes: u64,
}

/// Every registered rotation with its vote count, plus per-query pixel statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationRanking {
    pub candidates: Vec<RotationCandidate>,
    pub order: RankingOrder,
    /// Non-background pixels in the query.
    pub foreground_pixels: u64,
    /// Pixels whose activation key exists in the grid.
    pub hit_pixels: u64,
    /// Pixels with a color absent from the quantization map that were skipped.
    pub unmatched_pixels: u64,
    /// Pixels with an unseen color resolved through the palette.
    pub remapped_pixels: u64,
}

impl RotationRanking {
    /// Candidate with the most votes (lowest id on ties), regardless of order.
    pub fn best(&self) -> Option<&RotationCandidate> {
        self.candidates
            .iter()
            .max_by(|a, b| a.votes.cmp(&b.votes).then(b.id.cmp(&a.id)))
    }

    pub fn votes_for(&self, id: RotationId) -> Option<u64> {
        self.candidates
            .iter()
            .find(|candidate| candidate.id == id)
            .map(|candidate| candidate.votes)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Size summary of a grid hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridStats {
    pub keys: usize,
    pub activations: usize,
    pub rotations: usize,
    pub palette_size: usize,
    pub mapped_colors: usize,
    /// Rough heap footprint in bytes.
    pub approx_bytes: usize,
}

/// The grid hash index together with the color model needed to query it.
#[derive(Debug, Clone)]
pub struct GridHash {
    palette: Palette,
    mapping: QuantizationMap,
    metric: DistanceMetric,
    grid: HashMap<ActivationKey, Vec<RotationId>>,
    registry: RotationRegistry,
    query: QueryConfig,
}

impl GridHash {
    pub fn new(
        palette: Palette,
        mapping: QuantizationMap,
        metric: DistanceMetric,
        query: QueryConfig,
    ) -> Self {
        Self {
            palette,
            mapping,
            metric,
            grid: HashMap::new(),
            registry: RotationRegistry::new(),
            query,
        }
    }

    pub(crate) fn from_parts(
        palette: Palette,
        mapping: QuantizationMap,
        metric: DistanceMetric,
        grid: HashMap<ActivationKey, Vec<RotationId>>,
        registry: RotationRegistry,
        query: QueryConfig,
    ) -> Self {
        Self {
            palette,
            mapping,
            metric,
            grid,
            registry,
            query,
        }
    }

    /// Record that `(x, y, quantized)` was observed under `rotation`.
    ///
    /// Never deduplicates: each call appends one more vote for the rotation.
    pub fn register_activation(
        &mut self,
        x: u32,
        y: u32,
        quantized: Truecolor,
        rotation: Rotation,
    ) -> RaptorResult<RotationId> {
        if quantized.is_background() {
            return Err(RaptorError::BackgroundActivation { x, y });
        }
        let id = self.registry.id_for(rotation)?;
        self.grid
            .entry(ActivationKey::new(x, y, quantized))
            .or_default()
            .push(id);
        Ok(id)
    }

    /// Rank every registered rotation by votes from `image`, using the stored query config.
    pub fn identify_rotation<P: PixelSource + ?Sized>(
        &self,
        image: &P,
    ) -> RaptorResult<RotationRanking> {
        self.identify_rotation_with(image, &self.query)
    }

    /// Rank with an explicit query config.
    ///
    /// An empty grid yields an empty ranking. With no foreground pixels every
    /// count is zero and candidates stay in id order.
    pub fn identify_rotation_with<P: PixelSource + ?Sized>(
        &self,
        image: &P,
        query: &QueryConfig,
    ) -> RaptorResult<RotationRanking> {
        let mut votes = vec![0u64; self.registry.len()];
        let mut ranking = RotationRanking {
            order: query.ranking_order,
            ..RotationRanking::default()
        };

        for x in 0..image.width() {
            for y in 0..image.height() {
                let color = image.pixel(x, y);
                if color.is_background() {
                    continue;
                }
                ranking.foreground_pixels += 1;

                let quantized = match self.mapping.get(color) {
                    Some(quantized) => quantized,
                    None => match query.unmatched_policy {
                        UnmatchedColorPolicy::Skip => {
                            ranking.unmatched_pixels += 1;
                            continue;
                        }
                        UnmatchedColorPolicy::NearestPalette => {
                            let lab = self.metric.to_perceptual(color.opaque());
                            match self.palette.nearest(&lab, &self.metric) {
                                Some(quantized) => {
                                    ranking.remapped_pixels += 1;
                                    quantized
                                }
                                None => {
                                    ranking.unmatched_pixels += 1;
                                    continue;
                                }
                            }
                        }
                        UnmatchedColorPolicy::Reject => {
                            return Err(RaptorError::UnmatchedColor {
                                x,
                                y,
                                color: color.0,
                            });
                        }
                    },
                };

                if let Some(ids) = self.grid.get(&ActivationKey::new(x, y, quantized)) {
                    ranking.hit_pixels += 1;
                    for id in ids {
                        votes[id.index()] += 1;
                    }
                }
            }
        }

        ranking.candidates = self
            .registry
            .iter()
            .map(|(id, rotation)| RotationCandidate {
                rotation,
                id,
                votes: votes[id.index()],
            })
            .collect();
        // Stable sorts: equal counts stay in id order.
        match query.ranking_order {
            RankingOrder::Descending => ranking.candidates.sort_by(|a, b| b.votes.cmp(&a.votes)),
            RankingOrder::Ascending => ranking.candidates.sort_by_key(|c| c.votes),
        }

        if ranking.unmatched_pixels > 0 {
            tracing::debug!(
                "{} of {} query pixels had colors never seen in training",
                ranking.unmatched_pixels,
                ranking.foreground_pixels
            );
        }

        Ok(ranking)
    }

    /// Rank several query images in parallel. Results keep input order.
    pub fn identify_batch<P: PixelSource + Sync>(
        &self,
        images: &[P],
    ) -> Vec<RaptorResult<RotationRanking>> {
        images
            .par_iter()
            .map(|image| self.identify_rotation(image))
            .collect()
    }

    pub fn rotation_by_id(&self, id: RotationId) -> Option<Rotation> {
        self.registry.rotation(id)
    }

    /// Rotation ids stored at `key`, in insertion order.
    pub fn activations(&self, key: &ActivationKey) -> &[RotationId] {
        self.grid.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &ActivationKey> + '_ {
        self.grid.keys()
    }

    /// Grid entries sorted by key, for deterministic serialization.
    pub fn sorted_entries(&self) -> Vec<(ActivationKey, Vec<RotationId>)> {
        let mut entries: Vec<_> = self
            .grid
            .iter()
            .map(|(key, ids)| (*key, ids.clone()))
            .collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }

    pub fn registry(&self) -> &RotationRegistry {
        &self.registry
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn mapping(&self) -> &QuantizationMap {
        &self.mapping
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    pub fn set_query_config(&mut self, query: QueryConfig) {
        self.query = query;
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn stats(&self) -> GridStats {
        let keys = self.grid.len();
        let activations: usize = self.grid.values().map(Vec::len).sum();
        let rotations = self.registry.len();
        let approx_bytes = keys * (size_of::<ActivationKey>() + size_of::<Vec<RotationId>>())
            + activations * size_of::<RotationId>()
            + rotations
                * (size_of::<Rotation>() + size_of::<RotationKey>() + size_of::<RotationId>())
            + self.mapping.len() * 2 * size_of::<Truecolor>()
            + self.palette.len() * size_of::<PerceptualColor>();

        GridStats {
            keys,
            activations,
            rotations,
            palette_size: self.palette.len(),
            mapped_colors: self.mapping.len(),
            approx_bytes,
        }
    }
}
