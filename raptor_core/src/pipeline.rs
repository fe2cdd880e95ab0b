//! Two-pass index build over a training corpus.
//!
//! Pass 1 collects the corpus-wide set of foreground colors. The palette and
//! quantization map are then built from that set, after which the raw set is
//! dropped. Pass 2 quantizes every foreground pixel and registers it in the
//! grid hash under the image's rotation.
//!
//! [`train`] is a pure build: it returns an immutable [`TrainingResult`] or an
//! error, and a failed or cancelled build leaves nothing behind.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{QueryConfig, TrainingConfig};
use crate::corpus::TrainingCorpus;
use crate::error::{RaptorError, RaptorResult};
use crate::grid_hash::{GridHash, RotationRanking};
use crate::palette::{PaletteBuilder, UniqueColors};
use crate::quantize::QuantizationMap;
use crate::raster::{PixelSource, TrainingImage};

/// Handling of training images that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Abort the build, naming the file.
    #[default]
    Fail,
    /// Log, count and exclude the image from both passes.
    Skip,
}

/// Cooperative cancellation, checked between images.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters gathered during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub images: usize,
    pub skipped_images: usize,
    /// Foreground pixels seen in pass 1.
    pub pixels_processed: u64,
    pub unique_colors: usize,
    pub palette_size: usize,
    pub grid_keys: usize,
    pub activations: usize,
    pub rotations: usize,
    pub elapsed_ms: u128,
}

/// Immutable outcome of a successful build.
#[derive(Debug, Clone)]
pub struct TrainingResult {
    config: TrainingConfig,
    grid: GridHash,
    image_files: Vec<PathBuf>,
    skipped_files: Vec<PathBuf>,
    stats: TrainingStats,
}

impl TrainingResult {
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridHash {
        &self.grid
    }

    /// Take the query structure, e.g. to change its query config or checkpoint it.
    pub fn into_grid(self) -> GridHash {
        self.grid
    }

    /// Training images that were indexed, in corpus order.
    pub fn image_files(&self) -> &[PathBuf] {
        &self.image_files
    }

    pub fn skipped_files(&self) -> &[PathBuf] {
        &self.skipped_files
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn identify_rotation<P: PixelSource + ?Sized>(
        &self,
        image: &P,
    ) -> RaptorResult<RotationRanking> {
        self.grid.identify_rotation(image)
    }
}

/// Build an index with default query settings and no cancellation.
pub fn train<C: TrainingCorpus + ?Sized>(
    corpus: &C,
    config: &TrainingConfig,
) -> RaptorResult<TrainingResult> {
    train_with(corpus, config, QueryConfig::default(), &CancelFlag::new())
}

/// Build an index.
///
/// # Errors
///
/// - `InvalidConfiguration` for a bad config (checked before any I/O)
/// - `EmptyCorpus` when the corpus has no images (or all were skipped)
/// - `EmptyPalette` when no image contains a foreground pixel
/// - `Decode` / `MissingRotation` naming the offending file
/// - `Cancelled` if `cancel` fires between images
pub fn train_with<C: TrainingCorpus + ?Sized>(
    corpus: &C,
    config: &TrainingConfig,
    query: QueryConfig,
    cancel: &CancelFlag,
) -> RaptorResult<TrainingResult> {
    let start_time = Instant::now();
    config.validate()?;
    let builder = PaletteBuilder::new(config.palette_size, config.reference_color)?;

    let total = corpus.len();
    if total == 0 {
        return Err(RaptorError::empty_corpus(corpus.describe()));
    }

    tracing::info!("Collecting color info from {} images", total);
    let (colors, pixels_processed, mut skipped) = collect_colors(corpus, config, cancel)?;
    if skipped.len() == total {
        return Err(RaptorError::empty_corpus(corpus.describe()));
    }
    tracing::info!(
        "Total pixels processed: {}, unique colors: {}",
        pixels_processed,
        colors.len()
    );

    let metric = config.metric;
    let unique_colors = colors.len();
    let (palette, mapping) = {
        let samples = colors.to_perceptual(&metric);
        drop(colors);
        tracing::info!(
            "Generating {} index colors keyed by distance from {}",
            config.palette_size,
            config.reference_color
        );
        let palette = builder.build(&samples, &metric);
        let mapping = QuantizationMap::build(&palette, &samples, &metric, config.parallel)?;
        (palette, mapping)
    };
    let palette_size = palette.len();

    tracing::info!("Collecting per-pixel pose information");
    let mut grid = GridHash::new(palette, mapping, metric, query);
    let mut image_files = Vec::with_capacity(total - skipped.len());
    for index in 0..total {
        if skipped.contains(&index) {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(RaptorError::Cancelled {
                completed: index,
                total,
            });
        }

        // An image that decoded in pass 1 may still fail here if the file
        // changed underneath the build; the same policy applies.
        let Some(image) = load_or_skip(corpus, index, config.decode_failure)? else {
            skipped.insert(index);
            continue;
        };
        index_image(&mut grid, &image)?;
        tracing::debug!(
            "Analyzed pixels from image {}/{} ({})",
            index + 1,
            total,
            image.path.display()
        );
        image_files.push(image.path);
    }

    if image_files.is_empty() {
        return Err(RaptorError::empty_corpus(corpus.describe()));
    }

    let grid_stats = grid.stats();
    let stats = TrainingStats {
        images: image_files.len(),
        skipped_images: skipped.len(),
        pixels_processed,
        unique_colors,
        palette_size,
        grid_keys: grid_stats.keys,
        activations: grid_stats.activations,
        rotations: grid_stats.rotations,
        elapsed_ms: start_time.elapsed().as_millis(),
    };
    tracing::info!(
        "Done: {} grid keys, {} activations, {} rotations in {} ms",
        stats.grid_keys,
        stats.activations,
        stats.rotations,
        stats.elapsed_ms
    );

    let mut skipped_files: Vec<PathBuf> = skipped.iter().map(|&i| corpus.source(i)).collect();
    skipped_files.sort();

    Ok(TrainingResult {
        config: config.clone(),
        grid,
        image_files,
        skipped_files,
        stats,
    })
}

/// Pass 1. Per-image sets are merged in corpus order so discovery order,
/// and with it palette tie-breaking, does not depend on scheduling.
///
/// The first fatal error stops the scan; on the rayon path no new images are
/// started once one has failed, though which failing file is reported then
/// depends on scheduling.
fn collect_colors<C: TrainingCorpus + ?Sized>(
    corpus: &C,
    config: &TrainingConfig,
    cancel: &CancelFlag,
) -> RaptorResult<(UniqueColors, u64, HashSet<usize>)> {
    let total = corpus.len();
    let completed = AtomicUsize::new(0);

    // `None` marks an image skipped under `DecodeFailurePolicy::Skip`.
    let scan = |index: usize| -> RaptorResult<Option<(UniqueColors, u64)>> {
        if cancel.is_cancelled() {
            return Err(RaptorError::Cancelled {
                completed: completed.load(Ordering::Relaxed),
                total,
            });
        }
        let image = match load_or_skip(corpus, index, config.decode_failure)? {
            Some(image) => image,
            None => return Ok(None),
        };
        let mut colors = UniqueColors::new();
        let mut pixels = 0u64;
        for (_, _, color) in image.raster.foreground() {
            colors.insert(color);
            pixels += 1;
        }
        completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Collected color info from image {}/{} ({})",
            index + 1,
            total,
            image.path.display()
        );
        Ok(Some((colors, pixels)))
    };

    let scans: Vec<Option<(UniqueColors, u64)>> = if config.parallel {
        (0..total).into_par_iter().map(scan).collect::<RaptorResult<_>>()?
    } else {
        (0..total).map(scan).collect::<RaptorResult<_>>()?
    };

    let mut merged = UniqueColors::new();
    let mut pixels_processed = 0u64;
    let mut skipped = HashSet::new();
    for (index, scan) in scans.into_iter().enumerate() {
        match scan {
            Some((colors, pixels)) => {
                merged.merge(colors);
                pixels_processed += pixels;
            }
            None => {
                skipped.insert(index);
            }
        }
    }

    Ok((merged, pixels_processed, skipped))
}

/// Load image `index`, turning a decode failure into `None` under the skip policy.
fn load_or_skip<C: TrainingCorpus + ?Sized>(
    corpus: &C,
    index: usize,
    policy: DecodeFailurePolicy,
) -> RaptorResult<Option<TrainingImage>> {
    match corpus.load(index) {
        Ok(image) => Ok(Some(image)),
        Err(RaptorError::Decode { path, reason }) if policy == DecodeFailurePolicy::Skip => {
            tracing::warn!("Skipping unreadable image {}: {}", path.display(), reason);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Pass 2 for one image.
fn index_image(grid: &mut GridHash, image: &TrainingImage) -> RaptorResult<()> {
    for (x, y, color) in image.raster.foreground() {
        let quantized = grid.mapping().get(color).ok_or_else(|| {
            RaptorError::decode(
                &image.path,
                format!(
                    "color {} at ({}, {}) was not present when the palette was built",
                    color.opaque(),
                    x,
                    y
                ),
            )
        })?;
        grid.register_activation(x, y, quantized, image.rotation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{DistanceMetric, Truecolor};
    use crate::corpus::InMemoryCorpus;
    use crate::grid_hash::{ActivationKey, Rotation, RotationId};
    use crate::raster::RasterImage;
    use std::path::Path;

    const C1: Truecolor = Truecolor::rgb(220, 30, 30);
    const C2: Truecolor = Truecolor::rgb(30, 30, 220);

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            palette_size: 2,
            ..TrainingConfig::default()
        }
    }

    fn two_color_image() -> RasterImage {
        let mut raster = RasterImage::new(2, 2);
        raster.set(0, 0, C1);
        raster.set(1, 1, C2);
        raster
    }

    /// Corpus whose odd-indexed images fail to decode.
    struct FlakyCorpus {
        inner: InMemoryCorpus,
    }

    impl TrainingCorpus for FlakyCorpus {
        fn len(&self) -> usize {
            self.inner.len()
        }

        fn source(&self, index: usize) -> PathBuf {
            self.inner.source(index)
        }

        fn load(&self, index: usize) -> RaptorResult<TrainingImage> {
            if index % 2 == 1 {
                Err(RaptorError::decode(self.source(index), "corrupt chunk"))
            } else {
                self.inner.load(index)
            }
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    fn flaky_corpus() -> FlakyCorpus {
        let images = (0..4)
            .map(|i| {
                TrainingImage::new(
                    format!("img_{i}.png"),
                    two_color_image(),
                    Rotation::new(i as f64, 0.0, 0.0),
                )
            })
            .collect();
        FlakyCorpus {
            inner: InMemoryCorpus::new("flaky", images),
        }
    }

    /// Corpus that runs `hook(index, nth_load)` before every load, counting
    /// loads across both passes.
    struct HookedCorpus<F> {
        inner: InMemoryCorpus,
        loads: AtomicUsize,
        hook: F,
    }

    impl<F> HookedCorpus<F>
    where
        F: Fn(usize, usize) -> RaptorResult<()> + Sync,
    {
        fn new(images: usize, hook: F) -> Self {
            let images = (0..images)
                .map(|i| {
                    TrainingImage::new(
                        format!("img_{i}.png"),
                        two_color_image(),
                        Rotation::new(i as f64, 0.0, 0.0),
                    )
                })
                .collect();
            Self {
                inner: InMemoryCorpus::new("hooked", images),
                loads: AtomicUsize::new(0),
                hook,
            }
        }
    }

    impl<F> TrainingCorpus for HookedCorpus<F>
    where
        F: Fn(usize, usize) -> RaptorResult<()> + Sync,
    {
        fn len(&self) -> usize {
            self.inner.len()
        }

        fn source(&self, index: usize) -> PathBuf {
            self.inner.source(index)
        }

        fn load(&self, index: usize) -> RaptorResult<TrainingImage> {
            let nth = self.loads.fetch_add(1, Ordering::SeqCst);
            (self.hook)(index, nth)?;
            self.inner.load(index)
        }

        fn describe(&self) -> String {
            "hooked".to_string()
        }
    }

    fn sequential() -> TrainingConfig {
        TrainingConfig {
            parallel: false,
            ..small_config()
        }
    }

    #[test]
    fn two_by_two_scenario() {
        let corpus = InMemoryCorpus::new(
            "scenario",
            vec![TrainingImage::new(
                "scenario.png",
                two_color_image(),
                Rotation::new(10.0, 0.0, 0.0),
            )],
        );
        let result = train(&corpus, &small_config()).unwrap();
        let grid = result.grid();

        let q1 = grid.mapping().get(C1).unwrap();
        let q2 = grid.mapping().get(C2).unwrap();
        assert_eq!(grid.stats().keys, 2);
        assert_eq!(grid.activations(&ActivationKey::new(0, 0, q1)), &[RotationId(0)]);
        assert_eq!(grid.activations(&ActivationKey::new(1, 1, q2)), &[RotationId(0)]);
        assert_eq!(
            grid.registry().get(&Rotation::new(10.0, 0.0, 0.0)),
            Some(RotationId(0))
        );
        assert_eq!(grid.registry().len(), 1);

        let ranking = result.identify_rotation(&two_color_image()).unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking.candidates[0].id, RotationId(0));
        assert_eq!(ranking.candidates[0].votes, 2);
    }

    #[test]
    fn stats_reflect_both_passes() {
        let corpus = InMemoryCorpus::new(
            "stats",
            vec![
                TrainingImage::new("a", two_color_image(), Rotation::new(0.0, 0.0, 0.0)),
                TrainingImage::new("b", two_color_image(), Rotation::new(0.0, 0.0, 90.0)),
            ],
        );
        let result = train(&corpus, &small_config()).unwrap();
        let stats = result.stats();
        assert_eq!(stats.images, 2);
        assert_eq!(stats.pixels_processed, 4);
        assert_eq!(stats.unique_colors, 2);
        assert_eq!(stats.palette_size, 2);
        assert_eq!(stats.grid_keys, 2);
        assert_eq!(stats.activations, 4);
        assert_eq!(stats.rotations, 2);
        assert_eq!(result.image_files(), &[PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn rejects_palette_size_one_before_io() {
        let config = TrainingConfig {
            palette_size: 1,
            ..TrainingConfig::default()
        };
        let err = train(&flaky_corpus(), &config).unwrap_err();
        assert!(matches!(err, RaptorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let err = train(&InMemoryCorpus::new("nothing", Vec::new()), &small_config()).unwrap_err();
        assert_eq!(err, RaptorError::empty_corpus("nothing"));
    }

    #[test]
    fn all_background_corpus_has_empty_palette() {
        let corpus = InMemoryCorpus::new(
            "blank",
            vec![TrainingImage::new(
                "blank.png",
                RasterImage::new(4, 4),
                Rotation::new(0.0, 0.0, 0.0),
            )],
        );
        assert_eq!(train(&corpus, &small_config()).unwrap_err(), RaptorError::EmptyPalette);
    }

    #[test]
    fn decode_failure_names_file_by_default() {
        for parallel in [false, true] {
            let config = TrainingConfig {
                parallel,
                ..small_config()
            };
            match train(&flaky_corpus(), &config).unwrap_err() {
                RaptorError::Decode { path, .. } if parallel => assert!(
                    path == Path::new("img_1.png") || path == Path::new("img_3.png"),
                    "unexpected path {}",
                    path.display()
                ),
                RaptorError::Decode { path, .. } => assert_eq!(path, Path::new("img_1.png")),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn parallel_decode_failure_stops_early() {
        const IMAGES: usize = 10_000;
        let corpus = HookedCorpus::new(IMAGES, |index, _| {
            Err(RaptorError::decode(format!("img_{index}.png"), "corrupt chunk"))
        });
        let config = TrainingConfig {
            parallel: true,
            ..small_config()
        };
        assert!(matches!(
            train(&corpus, &config),
            Err(RaptorError::Decode { .. })
        ));
        assert!(corpus.loads.load(Ordering::SeqCst) < IMAGES);
    }

    #[test]
    fn second_pass_decode_failure_follows_policy() {
        // Four pass-1 loads, then pass 2 loads index 0 (nth 4) and index 1 (nth 5).
        let fail_second_look_at_one = |index: usize, nth: usize| {
            if index == 1 && nth >= 4 {
                Err(RaptorError::decode("img_1.png", "file changed during build"))
            } else {
                Ok(())
            }
        };

        let corpus = HookedCorpus::new(4, fail_second_look_at_one);
        assert!(matches!(
            train(&corpus, &sequential()),
            Err(RaptorError::Decode { .. })
        ));

        let corpus = HookedCorpus::new(4, fail_second_look_at_one);
        let skipping = TrainingConfig {
            decode_failure: DecodeFailurePolicy::Skip,
            ..sequential()
        };
        let result = train(&corpus, &skipping).unwrap();
        assert_eq!(result.stats().images, 3);
        assert_eq!(result.stats().skipped_images, 1);
        assert_eq!(result.skipped_files(), &[PathBuf::from("img_1.png")]);
        assert_eq!(result.grid().registry().len(), 3);
    }

    #[test]
    fn decode_failure_can_be_skipped() {
        let config = TrainingConfig {
            decode_failure: DecodeFailurePolicy::Skip,
            ..small_config()
        };
        let result = train(&flaky_corpus(), &config).unwrap();
        assert_eq!(result.stats().images, 2);
        assert_eq!(result.stats().skipped_images, 2);
        assert_eq!(
            result.skipped_files(),
            &[PathBuf::from("img_1.png"), PathBuf::from("img_3.png")]
        );
        assert_eq!(result.grid().registry().len(), 2);
    }

    #[test]
    fn cancelled_build_returns_no_result() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = train_with(
            &flaky_corpus(),
            &small_config(),
            QueryConfig::default(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, RaptorError::Cancelled { total: 4, .. }));
    }

    #[test]
    fn cancel_during_second_pass_returns_no_result() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        // The fifth load is the first image of pass 2.
        let corpus = HookedCorpus::new(4, move |_, nth| {
            if nth == 4 {
                trigger.cancel();
            }
            Ok(())
        });

        let err = train_with(&corpus, &sequential(), QueryConfig::default(), &cancel).unwrap_err();
        assert_eq!(
            err,
            RaptorError::Cancelled {
                completed: 1,
                total: 4
            }
        );
        assert_eq!(corpus.loads.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn parallel_and_sequential_builds_agree() {
        let mut images = Vec::new();
        for i in 0..6u8 {
            let mut raster = RasterImage::new(4, 4);
            for x in 0..4u8 {
                raster.set(x as u32, (i % 4) as u32, Truecolor::rgb(40 * x, 30 * i, 90));
            }
            images.push(TrainingImage::new(
                format!("{i}.png"),
                raster,
                Rotation::new(0.0, 15.0 * i as f64, 0.0),
            ));
        }
        let corpus = InMemoryCorpus::new("mixed", images);
        let sequential = TrainingConfig {
            palette_size: 5,
            metric: DistanceMetric::Cie76,
            parallel: false,
            ..TrainingConfig::default()
        };
        let parallel = TrainingConfig {
            parallel: true,
            ..sequential.clone()
        };

        let a = train(&corpus, &sequential).unwrap();
        let b = train(&corpus, &parallel).unwrap();
        assert_eq!(a.grid().palette(), b.grid().palette());
        assert_eq!(a.grid().mapping(), b.grid().mapping());
        assert_eq!(a.grid().sorted_entries(), b.grid().sorted_entries());
    }
}
