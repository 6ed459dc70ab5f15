// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pipeline configuration and model file locations.
//!
//! This module defines the [`PipelineConfig`] struct, which controls how detections are
//! filtered before pose estimation and which default scope each model call runs under,
//! and [`ModelPaths`], which locates the four model files inside a models directory.

use std::path::{Path, PathBuf};

use crate::detection::{DEFAULT_CLASS_THRESHOLD, FilterMode, PERSON_CLASS_ID};
use crate::error::{PoseError, Result};

/// Default scope passed to the detector when its config does not name one.
pub const DEFAULT_DET_SCOPE: &str = "mmdet";

/// Default scope passed to the pose estimator when its config does not name one.
pub const DEFAULT_POSE_SCOPE: &str = "mmpose";

/// Default directory the model files are resolved against.
pub const DEFAULT_MODELS_DIR: &str = "models";

/// Configuration for the detect-then-estimate pipeline.
///
/// # Example
///
/// ```rust
/// use wholebody_pose::{FilterMode, PipelineConfig};
///
/// let config = PipelineConfig::new()
///     .with_class_threshold(0.6)
///     .with_filter_mode(FilterMode::Exhaustive);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Detector class id whose boxes are forwarded to the pose estimator.
    pub target_class: usize,
    /// Boxes must score strictly above this value to be kept.
    pub class_threshold: f32,
    /// Whether the filter stops at the first score below the threshold.
    pub filter_mode: FilterMode,
    /// Scope handed to every detector call.
    pub det_scope: String,
    /// Scope handed to every pose estimator call.
    pub pose_scope: String,
    /// Number of intra-op threads for ONNX Runtime (`0` lets the runtime decide).
    pub num_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_class: PERSON_CLASS_ID,
            class_threshold: DEFAULT_CLASS_THRESHOLD,
            filter_mode: FilterMode::EarlyExit,
            det_scope: DEFAULT_DET_SCOPE.to_string(),
            pose_scope: DEFAULT_POSE_SCOPE.to_string(),
            num_threads: 0,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the detector class forwarded to the pose estimator.
    #[must_use]
    pub const fn with_target_class(mut self, class_id: usize) -> Self {
        self.target_class = class_id;
        self
    }

    /// Set the detection confidence threshold.
    #[must_use]
    pub const fn with_class_threshold(mut self, threshold: f32) -> Self {
        self.class_threshold = threshold;
        self
    }

    /// Set how the detection filter walks the batch.
    #[must_use]
    pub const fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    /// Set the scope used for detector calls.
    #[must_use]
    pub fn with_det_scope(mut self, scope: impl Into<String>) -> Self {
        self.det_scope = scope.into();
        self
    }

    /// Set the scope used for pose estimator calls.
    #[must_use]
    pub fn with_pose_scope(mut self, scope: impl Into<String>) -> Self {
        self.pose_scope = scope.into();
        self
    }

    /// Set the number of threads for inference.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Check that the configuration values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if the threshold is outside `[0, 1]` or a
    /// scope is empty.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.class_threshold) {
            return Err(PoseError::ConfigError(format!(
                "class threshold must be within [0, 1], got {}",
                self.class_threshold
            )));
        }
        if self.det_scope.is_empty() || self.pose_scope.is_empty() {
            return Err(PoseError::ConfigError(
                "default scopes must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The four files that select the pretrained detector and pose estimator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// Pose model config file.
    pub pose_config: PathBuf,
    /// Pose model checkpoint file.
    pub pose_checkpoint: PathBuf,
    /// Detector config file.
    pub det_config: PathBuf,
    /// Detector checkpoint file.
    pub det_checkpoint: PathBuf,
}

impl ModelPaths {
    /// Build model paths from four file locations as given.
    pub fn new(
        pose_config: impl Into<PathBuf>,
        pose_checkpoint: impl Into<PathBuf>,
        det_config: impl Into<PathBuf>,
        det_checkpoint: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pose_config: pose_config.into(),
            pose_checkpoint: pose_checkpoint.into(),
            det_config: det_config.into(),
            det_checkpoint: det_checkpoint.into(),
        }
    }

    /// Resolve every relative path against `models_dir`. Absolute paths are kept.
    #[must_use]
    pub fn resolve(&self, models_dir: &Path) -> Self {
        let join = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                models_dir.join(p)
            }
        };
        Self {
            pose_config: join(&self.pose_config),
            pose_checkpoint: join(&self.pose_checkpoint),
            det_config: join(&self.det_config),
            det_checkpoint: join(&self.det_checkpoint),
        }
    }

    /// Check that all four files exist.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ModelLoadError`] naming the first missing file.
    pub fn ensure_exist(&self) -> Result<()> {
        for path in [
            &self.pose_config,
            &self.pose_checkpoint,
            &self.det_config,
            &self.det_checkpoint,
        ] {
            if !path.exists() {
                return Err(PoseError::ModelLoadError(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
