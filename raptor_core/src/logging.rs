//! JSON line-delimited run records.
//!
//! `tracing` carries progress messages; these files keep one machine-readable
//! record per build or query under a caller-chosen directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::grid_hash::RotationRanking;
use crate::pipeline::{TrainingResult, TrainingStats};

pub const TRAINING_LOG_FILE: &str = "training.jsonl";
pub const QUERY_LOG_FILE: &str = "queries.jsonl";

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

#[derive(Debug, Serialize)]
pub struct TrainingLogEntry {
    pub corpus: String,
    pub palette_size: usize,
    pub reference_color: String,
    pub metric: String,
    pub stats: TrainingStats,
    pub skipped_files: Vec<String>,
    pub timestamp_ms: u128,
}

pub fn log_training_run<P: AsRef<Path>>(
    log_dir: P,
    corpus: &str,
    result: &TrainingResult,
) -> io::Result<()> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)?;
    let config = result.config();
    let entry = TrainingLogEntry {
        corpus: corpus.to_string(),
        palette_size: config.palette_size,
        reference_color: config.reference_color.to_string(),
        metric: format!("{:?}", config.metric),
        stats: result.stats().clone(),
        skipped_files: result
            .skipped_files()
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        timestamp_ms: timestamp_ms(),
    };
    append_json_line(log_dir.join(TRAINING_LOG_FILE), &entry)
}

#[derive(Debug, Serialize)]
pub struct QueryLogEntry {
    pub query: String,
    pub best: Option<[f64; 3]>,
    pub best_votes: u64,
    pub foreground_pixels: u64,
    pub hit_pixels: u64,
    pub unmatched_pixels: u64,
    pub timestamp_ms: u128,
}

pub fn log_query<P: AsRef<Path>>(
    log_dir: P,
    query: &str,
    ranking: &RotationRanking,
) -> io::Result<()> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)?;
    let best = ranking.best();
    let entry = QueryLogEntry {
        query: query.to_string(),
        best: best.map(|c| [c.rotation.rx, c.rotation.ry, c.rotation.rz]),
        best_votes: best.map(|c| c.votes).unwrap_or(0),
        foreground_pixels: ranking.foreground_pixels,
        hit_pixels: ranking.hit_pixels,
        unmatched_pixels: ranking.unmatched_pixels,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line(log_dir.join(QUERY_LOG_FILE), &entry)
}
