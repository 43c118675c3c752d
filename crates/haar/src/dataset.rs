//! Directory-backed training and test sets.
//!
//! A dataset root holds a `positive/` and a `negative/` directory. Every
//! regular file in them that the `image` crate can decode becomes one window.

use crate::image::Window;
use anyhow::{Context, Result};
use haar_core::IntegralImage;
use image::ImageReader;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const POSITIVE_DIR: &str = "positive";
pub const NEGATIVE_DIR: &str = "negative";

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetOptions {
    /// Side of the square training window.
    pub resolution: u16,
    /// Also add the left-right mirror of every window.
    pub mirror: bool,
    /// Zero-mean, unit-variance windows.
    pub normalize: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            resolution: 32,
            mirror: false,
            normalize: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub positives: Vec<IntegralImage>,
    pub negatives: Vec<IntegralImage>,
}

impl Dataset {
    /// Load `root/positive` and `root/negative`.
    ///
    /// Files are read in path order. Files that fail to decode are logged and
    /// skipped; a missing class directory is an error.
    pub fn load(root: &Path, opts: &DatasetOptions) -> Result<Self> {
        if opts.resolution == 0 {
            anyhow::bail!("resolution must be >= 1");
        }
        let positives = load_class(&root.join(POSITIVE_DIR), opts)?;
        let negatives = load_class(&root.join(NEGATIVE_DIR), opts)?;
        info!(
            root = %root.display(),
            positives = positives.len(),
            negatives = negatives.len(),
            "loaded dataset"
        );
        Ok(Self {
            positives,
            negatives,
        })
    }

    pub fn len(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty() && self.negatives.is_empty()
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_class(dir: &Path, opts: &DatasetOptions) -> Result<Vec<IntegralImage>> {
    let mut out = Vec::new();
    for path in list_files(dir)? {
        let img = match ImageReader::open(&path)
            .and_then(|r| r.with_guessed_format())
            .map_err(anyhow::Error::from)
            .and_then(|r| r.decode().map_err(anyhow::Error::from))
        {
            Ok(img) => img,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable image");
                continue;
            }
        };

        let window = Window::from_image(&img, opts.resolution as u32, opts.normalize);
        if opts.mirror {
            let flipped = window.mirrored().integral()?;
            out.push(window.integral()?);
            out.push(flipped);
        } else {
            out.push(window.integral()?);
        }
        debug!(path = %path.display(), "loaded sample");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_png(path: &Path, v: u8) {
        let img = GrayImage::from_fn(6, 6, |x, _| Luma([if x < 3 { v } else { 0 }]));
        img.save(path).unwrap();
    }

    #[test]
    fn loads_both_classes_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(POSITIVE_DIR)).unwrap();
        fs::create_dir(dir.path().join(NEGATIVE_DIR)).unwrap();
        write_png(&dir.path().join("positive/a.png"), 200);
        write_png(&dir.path().join("positive/b.png"), 150);
        write_png(&dir.path().join("negative/a.png"), 10);
        fs::write(dir.path().join("negative/broken.png"), b"not an image").unwrap();

        let opts = DatasetOptions {
            resolution: 6,
            ..DatasetOptions::default()
        };
        let ds = Dataset::load(dir.path(), &opts).unwrap();
        assert_eq!(ds.positives.len(), 2);
        assert_eq!(ds.negatives.len(), 1);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.positives[0].width(), 6);

        let mirrored = Dataset::load(
            dir.path(),
            &DatasetOptions {
                mirror: true,
                ..opts
            },
        )
        .unwrap();
        assert_eq!(mirrored.positives.len(), 4);
        assert_eq!(mirrored.negatives.len(), 2);
    }

    #[test]
    fn missing_class_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(POSITIVE_DIR)).unwrap();
        assert!(Dataset::load(dir.path(), &DatasetOptions::default()).is_err());
    }
}
