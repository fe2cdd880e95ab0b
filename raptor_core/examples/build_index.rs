//! Build an index from a directory of PNG renders and optionally query it.
//!
//! Usage:
//!
//! ```text
//! cargo run --example build_index -- <corpus_dir> <index.bin> [config.toml] [query.png ...]
//! ```
//!
//! Every training PNG must carry `rx`, `ry` and `rz` text chunks.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use raptor_core::logging::{log_query, log_training_run};
use raptor_core::{
    train_with, CancelFlag, Checkpointable, DirectoryCorpus, GridHash, ImageDecoder, PngDecoder,
    RaptorConfig,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: build_index <corpus_dir> <index.bin> [config.toml] [query.png ...]");
    }
    let corpus_dir = PathBuf::from(&args[0]);
    let index_path = PathBuf::from(&args[1]);

    let mut rest = args[2..].iter().peekable();
    let config = match rest.peek() {
        Some(arg) if arg.ends_with(".toml") => {
            let path = rest.next().map(String::as_str).unwrap_or_default();
            RaptorConfig::load_from_file(path).with_context(|| format!("loading {path}"))?
        }
        _ => RaptorConfig::default(),
    };
    let queries: Vec<PathBuf> = rest.map(PathBuf::from).collect();

    let corpus = DirectoryCorpus::discover(&corpus_dir, &config.training.extensions)?;
    let result = train_with(&corpus, &config.training, config.query, &CancelFlag::new())?;
    let log_dir = Path::new("logs");
    log_training_run(log_dir, &corpus_dir.display().to_string(), &result)?;

    let stats = result.stats();
    println!(
        "Indexed {} images ({} skipped): {} keys, {} rotations",
        stats.images, stats.skipped_images, stats.grid_keys, stats.rotations
    );

    let grid = result.into_grid();
    grid.save_checkpoint(&index_path)
        .with_context(|| format!("writing {}", index_path.display()))?;
    println!("Saved index to {}", index_path.display());

    if queries.is_empty() {
        return Ok(());
    }

    let grid = GridHash::load_checkpoint(&index_path)?;
    for query in &queries {
        let image = PngDecoder.decode(query)?;
        let ranking = grid.identify_rotation(&image.raster)?;
        log_query(log_dir, &query.display().to_string(), &ranking)?;
        match ranking.best() {
            Some(best) => println!(
                "{}: ({}, {}, {}) with {} of {} pixels",
                query.display(),
                best.rotation.rx,
                best.rotation.ry,
                best.rotation.rz,
                best.votes,
                ranking.foreground_pixels
            ),
            None => println!("{}: index holds no rotations", query.display()),
        }
    }

    Ok(())
}
