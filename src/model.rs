// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime backends for the detector and the pose estimator.
//!
//! [`OnnxDetector`] and [`OnnxPoseEstimator`] each pair an ONNX checkpoint with its
//! [`ModelConfig`] and implement the pipeline traits. The scope passed on every call
//! picks the output decoder.

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array3, Array4, ArrayView2, s};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{DynValue, TensorRef};

use crate::config::{ModelPaths, PipelineConfig};
use crate::detection::Detections;
use crate::error::{PoseError, Result};
use crate::metadata::ModelConfig;
use crate::pipeline::{Detector, PoseEstimator, PosePipeline};
use crate::postprocessing::{
    DEFAULT_IOU_THRESHOLD, DetectorLayout, check_pose_scope, decode_dets_labels,
    decode_simcc_batch, decode_yolo,
};
use crate::preprocessing::{CropTransform, Normalization, crop_to_tensor, letterbox};
use crate::results::PoseResult;

/// Output tensor copied out of the session.
#[derive(Debug, Clone)]
struct RawOutput {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// An ONNX Runtime session with its input name and output names.
struct OnnxSession {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
}

impl OnnxSession {
    fn load(path: &Path, num_threads: usize) -> Result<Self> {
        if !path.exists() {
            return Err(PoseError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| {
                PoseError::ModelLoadError(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                PoseError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(num_threads)
            .map_err(|e| {
                PoseError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })?
            .commit_from_file(path)
            .map_err(|e| PoseError::ModelLoadError(format!("Failed to load model: {e}")))?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "input".to_string(), |i| i.name.clone());
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        Ok(Self {
            session,
            input_name,
            output_names,
        })
    }

    /// Run the model and copy out the requested outputs.
    ///
    /// Each wanted name falls back to the output at the same position when the model
    /// names its outputs differently.
    fn run(&mut self, input: &Array4<f32>, wanted: &[&str]) -> Result<Vec<RawOutput>> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            PoseError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| PoseError::InferenceError(format!("Inference failed: {e}")))?;

        wanted
            .iter()
            .enumerate()
            .map(|(position, &name)| {
                let resolved = if self.output_names.iter().any(|n| n == name) {
                    name
                } else {
                    self.output_names
                        .get(position)
                        .map(String::as_str)
                        .ok_or_else(|| {
                            PoseError::InferenceError(format!("Output '{name}' not found"))
                        })?
                };
                let value = outputs.get(resolved).ok_or_else(|| {
                    PoseError::InferenceError(format!("Output '{resolved}' not found"))
                })?;
                extract_output(value)
            })
            .collect()
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn extract_output(value: &DynValue) -> Result<RawOutput> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        return Ok(RawOutput {
            shape: shape.iter().map(|&d| d as usize).collect(),
            data: data.to_vec(),
        });
    }
    // Label outputs are integer tensors.
    let (shape, data) = value
        .try_extract_tensor::<i64>()
        .map_err(|e| PoseError::InferenceError(format!("Failed to extract output: {e}")))?;
    Ok(RawOutput {
        shape: shape.iter().map(|&d| d as usize).collect(),
        data: data.iter().map(|&v| v as f32).collect(),
    })
}

/// Object detector backed by an ONNX export.
///
/// # Example
///
/// ```no_run
/// use wholebody_pose::{Detector, OnnxDetector};
///
/// let mut detector = OnnxDetector::load("models/det.yaml", "models/det.onnx", 0)?;
/// let image = image::open("person.jpg")?;
/// let detections = detector.detect(&image, "mmdet")?;
/// println!("{} detections", detections.len());
/// # Ok::<(), wholebody_pose::PoseError>(())
/// ```
pub struct OnnxDetector {
    session: OnnxSession,
    config: ModelConfig,
}

impl OnnxDetector {
    /// Load a detector from its config file and ONNX checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or cannot be parsed.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        config_path: P,
        checkpoint_path: Q,
        num_threads: usize,
    ) -> Result<Self> {
        let config = ModelConfig::from_file(config_path)?;
        let session = OnnxSession::load(checkpoint_path.as_ref(), num_threads)?;
        Ok(Self { session, config })
    }

    /// The parsed model config.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl Detector for OnnxDetector {
    fn detect(&mut self, image: &DynamicImage, scope: &str) -> Result<Detections> {
        let layout = DetectorLayout::from_scope(scope)?;
        let norm = Normalization::from_config(&self.config);
        let preprocess = letterbox(image, self.config.input_size, &norm)?;
        let threshold = self.config.score_threshold;

        match layout {
            DetectorLayout::DetsLabels => {
                let outputs = self.session.run(&preprocess.tensor, &["dets", "labels"])?;
                let (dets, labels) = (&outputs[0], &outputs[1]);
                let num = dets.shape.get(1).copied().unwrap_or(0);
                let dets_view = ArrayView2::from_shape((num, 5), dets.data.as_slice()).map_err(|e| {
                    PoseError::PostProcessingError(format!(
                        "dets output {:?} is not [1, N, 5]: {e}",
                        dets.shape
                    ))
                })?;
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let labels: Vec<usize> = labels.data.iter().map(|&l| l.max(0.0) as usize).collect();
                decode_dets_labels(dets_view, &labels, &preprocess, threshold)
            }
            DetectorLayout::Yolo => {
                let outputs = self.session.run(&preprocess.tensor, &["output0"])?;
                decode_yolo(
                    &outputs[0].data,
                    &outputs[0].shape,
                    &preprocess,
                    threshold,
                    DEFAULT_IOU_THRESHOLD,
                )
            }
        }
    }
}

impl std::fmt::Debug for OnnxDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxDetector")
            .field("input_size", &self.config.input_size)
            .field("num_classes", &self.config.names.len())
            .field("outputs", &self.session.output_names)
            .finish()
    }
}

/// Top-down SimCC pose estimator backed by an ONNX export.
pub struct OnnxPoseEstimator {
    session: OnnxSession,
    config: ModelConfig,
}

impl OnnxPoseEstimator {
    /// Load a pose model from its config file and ONNX checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or cannot be parsed.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        config_path: P,
        checkpoint_path: Q,
        num_threads: usize,
    ) -> Result<Self> {
        let config = ModelConfig::from_file(config_path)?;
        let session = OnnxSession::load(checkpoint_path.as_ref(), num_threads)?;
        Ok(Self { session, config })
    }

    /// The parsed model config.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate(
        &mut self,
        image: &DynamicImage,
        boxes: ArrayView2<'_, f32>,
        scope: &str,
    ) -> Result<Vec<PoseResult>> {
        check_pose_scope(scope)?;
        let norm = Normalization::from_config(&self.config);
        let rgb = image.to_rgb8();
        let mut results = Vec::with_capacity(boxes.nrows());

        for (i, row) in boxes.rows().into_iter().enumerate() {
            let transform = CropTransform::from_bbox(
                [row[0], row[1], row[2], row[3]],
                self.config.bbox_padding,
                self.config.input_size,
            );
            let tensor = crop_to_tensor(&rgb, &transform, &norm)?;
            let outputs = self.session.run(&tensor, &["simcc_x", "simcc_y"])?;
            let simcc_x = to_array3(&outputs[0])?;
            let simcc_y = to_array3(&outputs[1])?;

            results.extend(decode_simcc_batch(
                simcc_x.view(),
                simcc_y.view(),
                self.config.simcc_split_ratio,
                &[transform],
                boxes.slice(s![i..=i, ..]),
            )?);
        }

        Ok(results)
    }
}

impl std::fmt::Debug for OnnxPoseEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPoseEstimator")
            .field("input_size", &self.config.input_size)
            .field("num_keypoints", &self.config.num_keypoints)
            .field("outputs", &self.session.output_names)
            .finish()
    }
}

fn to_array3(output: &RawOutput) -> Result<Array3<f32>> {
    let &[b, k, n] = output.shape.as_slice() else {
        return Err(PoseError::PostProcessingError(format!(
            "SimCC output must be rank 3, got {:?}",
            output.shape
        )));
    };
    Array3::from_shape_vec((b, k, n), output.data.clone())
        .map_err(|e| PoseError::PostProcessingError(format!("Invalid SimCC output: {e}")))
}

impl PosePipeline<OnnxDetector, OnnxPoseEstimator> {
    /// Build a pipeline from the four model files.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ModelLoadError`] if a file is missing or a model fails to
    /// load, and [`PoseError::ConfigError`] for an invalid configuration.
    pub fn from_model_paths(paths: &ModelPaths, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let (detector, estimator) = load_backends(paths, config.num_threads)?;
        Self::with_config(detector, estimator, config)
    }
}

/// Load both ONNX backends from resolved model paths.
///
/// # Errors
///
/// Returns [`PoseError::ModelLoadError`] if any of the four files is missing, or the
/// underlying load error.
pub fn load_backends(
    paths: &ModelPaths,
    num_threads: usize,
) -> Result<(OnnxDetector, OnnxPoseEstimator)> {
    paths.ensure_exist()?;
    let detector = OnnxDetector::load(&paths.det_config, &paths.det_checkpoint, num_threads)?;
    let estimator =
        OnnxPoseEstimator::load(&paths.pose_config, &paths.pose_checkpoint, num_threads)?;
    Ok((detector, estimator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = OnnxSession::load(Path::new("nonexistent.onnx"), 0);
        assert!(matches!(result, Err(PoseError::ModelLoadError(_))));
    }

    #[test]
    fn test_load_backends_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ModelPaths::new("pose.yaml", "pose.onnx", "det.yaml", "det.onnx")
            .resolve(dir.path());
        let err = load_backends(&paths, 0).unwrap_err();
        assert!(err.to_string().contains("pose.yaml"));
    }

    #[test]
    fn test_detector_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("det.yaml");
        std::fs::write(&config, "default_scope: mmdet\n").unwrap();
        let result = OnnxDetector::load(&config, dir.path().join("det.onnx"), 0);
        assert!(matches!(result, Err(PoseError::ModelLoadError(_))));
    }

    #[test]
    fn test_to_array3_rejects_bad_rank() {
        let raw = RawOutput {
            shape: vec![2, 3],
            data: vec![0.0; 6],
        };
        assert!(to_array3(&raw).is_err());
        let raw = RawOutput {
            shape: vec![1, 2, 3],
            data: vec![0.0; 6],
        };
        assert_eq!(to_array3(&raw).unwrap().shape(), &[1, 2, 3]);
    }
}
