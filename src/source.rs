// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Input source handling for the `predict` command.
//!
//! A source is a single image, a directory of images, or a simple `dir/*.ext` glob.

use std::path::{Path, PathBuf};

use crate::error::{PoseError, Result};

/// File extensions treated as images.
pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"];

/// Represents the image sources the CLI accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Path to an image file.
    Image(PathBuf),
    /// Directory containing images.
    Directory(PathBuf),
    /// Glob pattern for images.
    Glob(String),
}

impl Source {
    /// Expand the source into sorted image paths.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ImageError`] if a directory does not exist or a single image
    /// path has a non-image extension, and [`PoseError::Io`] if a directory cannot be read.
    pub fn image_paths(&self) -> Result<Vec<PathBuf>> {
        match self {
            Self::Image(path) => {
                if is_image_file(path) {
                    Ok(vec![path.clone()])
                } else {
                    Err(PoseError::ImageError(format!(
                        "Unsupported image format: {}",
                        path.display()
                    )))
                }
            }
            Self::Directory(dir) => collect_images(dir, None),
            Self::Glob(pattern) => collect_glob(pattern),
        }
    }
}

/// Convert from a string path to Source.
impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if s.contains('*') {
            return Self::Glob(s.to_string());
        }

        let path = PathBuf::from(s);
        if path.is_dir() {
            return Self::Directory(path);
        }

        Self::Image(path)
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::from(path.to_string_lossy().as_ref())
    }
}

/// Check whether a path has an image extension.
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn collect_images(dir: &Path, ext_filter: Option<&str>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PoseError::ImageError(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            ext_filter.map_or_else(
                || is_image_file(path),
                |ext| {
                    path.extension()
                        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
                },
            )
        })
        .collect();

    paths.sort();
    Ok(paths)
}

/// Expand `dir/*.ext` or `dir/*`. Only a single `*` in the file name is supported.
fn collect_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let Some(star_pos) = pattern.find('*') else {
        return collect_images(Path::new(pattern), None);
    };

    let dir_part = &pattern[..star_pos];
    let dir = if dir_part.is_empty() {
        Path::new(".")
    } else {
        Path::new(dir_part.trim_end_matches('/').trim_end_matches('\\'))
    };
    let ext_filter = pattern[star_pos..].strip_prefix("*.");

    collect_images(dir, ext_filter)
}
