//! Training corpora: recursive file discovery and in-memory image sets.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RaptorError, RaptorResult};
use crate::raster::{ImageDecoder, PngDecoder, TrainingImage};

/// An indexable, deterministically ordered collection of training images.
///
/// `load` may be called more than once per index (the pipeline makes two
/// passes) and must return the same image each time.
pub trait TrainingCorpus: Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path or label identifying image `index`.
    fn source(&self, index: usize) -> PathBuf;

    fn load(&self, index: usize) -> RaptorResult<TrainingImage>;

    /// Human-readable corpus name for error messages.
    fn describe(&self) -> String;
}

/// Recursively collect files under `root` whose extension matches one of
/// `extensions` (case-insensitive). The result is sorted and deduplicated.
///
/// Symlinked directories are not followed.
pub fn discover_images(root: &Path, extensions: &[String]) -> RaptorResult<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|err| RaptorError::discovery(&dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| RaptorError::discovery(&dir, err))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|err| RaptorError::discovery(&path, err))?;

            if file_type.is_dir() {
                pending.push(path);
            } else if (file_type.is_file() || (file_type.is_symlink() && path.is_file()))
                && has_extension(&path, &wanted)
            {
                found.push(path);
            }
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

fn has_extension(path: &Path, wanted: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| wanted.iter().any(|w| w.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Image files on disk, decoded on demand.
pub struct DirectoryCorpus<D: ImageDecoder = PngDecoder> {
    root: PathBuf,
    paths: Vec<PathBuf>,
    decoder: D,
}

impl DirectoryCorpus<PngDecoder> {
    /// Discover images under `root` and decode them as PNG.
    pub fn discover(root: impl AsRef<Path>, extensions: &[String]) -> RaptorResult<Self> {
        let root = root.as_ref();
        let paths = discover_images(root, extensions)?;
        tracing::info!(
            "Discovered {} unique image files under {}",
            paths.len(),
            root.display()
        );
        Ok(Self::with_decoder(root, paths, PngDecoder))
    }
}

impl<D: ImageDecoder> DirectoryCorpus<D> {
    /// Use an explicit path list and decoder. Paths are sorted and deduplicated.
    pub fn with_decoder(root: impl Into<PathBuf>, mut paths: Vec<PathBuf>, decoder: D) -> Self {
        paths.sort();
        paths.dedup();
        Self {
            root: root.into(),
            paths,
            decoder,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl<D: ImageDecoder> TrainingCorpus for DirectoryCorpus<D> {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn source(&self, index: usize) -> PathBuf {
        self.paths[index].clone()
    }

    fn load(&self, index: usize) -> RaptorResult<TrainingImage> {
        TrainingImage::load(&self.decoder, &self.paths[index])
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Pre-decoded images held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    name: String,
    images: Vec<TrainingImage>,
}

impl InMemoryCorpus {
    pub fn new(name: impl Into<String>, images: Vec<TrainingImage>) -> Self {
        Self {
            name: name.into(),
            images,
        }
    }

    pub fn push(&mut self, image: TrainingImage) {
        self.images.push(image);
    }

    pub fn images(&self) -> &[TrainingImage] {
        &self.images
    }
}

impl TrainingCorpus for InMemoryCorpus {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn source(&self, index: usize) -> PathBuf {
        self.images[index].path.clone()
    }

    fn load(&self, index: usize) -> RaptorResult<TrainingImage> {
        Ok(self.images[index].clone())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
