// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detect-then-estimate pose pipeline.
//!
//! [`PosePipeline`] runs a [`Detector`] over the image, keeps the boxes of the target
//! class, and hands them to a top-down [`PoseEstimator`]. Both raw outputs are kept for
//! the accessors until the next prediction.

use std::time::Instant;

use image::DynamicImage;
use ndarray::{Array1, Array2, ArrayView2};

use crate::config::PipelineConfig;
use crate::detection::{Detections, FilterMode, filter_boxes_with_mode};
use crate::error::{PoseError, Result};
use crate::results::{PoseResult, Speed, object_bbox, object_keypoints};
use crate::utils::format_count;
use crate::{verbose, warn};

/// Object detector run over the whole image.
pub trait Detector {
    /// Detect objects in `image`.
    ///
    /// `scope` names the model registry the backend resolves its output layout from.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or does not support `scope`.
    fn detect(&mut self, image: &DynamicImage, scope: &str) -> Result<Detections>;
}

/// Top-down pose estimator run once per box.
pub trait PoseEstimator {
    /// Estimate one [`PoseResult`] per row of `boxes` (xyxy).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or does not support `scope`.
    fn estimate(
        &mut self,
        image: &DynamicImage,
        boxes: ArrayView2<'_, f32>,
        scope: &str,
    ) -> Result<Vec<PoseResult>>;
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&mut self, image: &DynamicImage, scope: &str) -> Result<Detections> {
        (**self).detect(image, scope)
    }
}

impl<T: PoseEstimator + ?Sized> PoseEstimator for Box<T> {
    fn estimate(
        &mut self,
        image: &DynamicImage,
        boxes: ArrayView2<'_, f32>,
        scope: &str,
    ) -> Result<Vec<PoseResult>> {
        (**self).estimate(image, boxes, scope)
    }
}

/// Detector + pose estimator pair with the last results cached.
///
/// # Example
///
/// ```no_run
/// use wholebody_pose::{ModelPaths, PipelineConfig, PosePipeline};
///
/// fn main() -> wholebody_pose::Result<()> {
///     let paths = ModelPaths::new("pose.yaml", "pose.onnx", "det.yaml", "det.onnx")
///         .resolve(std::path::Path::new("models"));
///     let mut pipeline = PosePipeline::from_model_paths(&paths, PipelineConfig::default())?;
///
///     let image = image::open("person.jpg")?;
///     let (detections, poses) = pipeline.predict(&image)?;
///     println!("{} detections, {} poses", detections.len(), poses.len());
///
///     let keypoints = pipeline.get_keypoints(0)?;
///     println!("{} keypoints", keypoints.nrows());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct PosePipeline<D, P> {
    detector: D,
    estimator: P,
    config: PipelineConfig,
    detections: Option<Detections>,
    pose_results: Option<Vec<PoseResult>>,
    speed: Speed,
}

impl<D: Detector, P: PoseEstimator> PosePipeline<D, P> {
    /// Create a pipeline with the default configuration.
    pub fn new(detector: D, estimator: P) -> Self {
        Self {
            detector,
            estimator,
            config: PipelineConfig::default(),
            detections: None,
            pose_results: None,
            speed: Speed::default(),
        }
    }

    /// Create a pipeline with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if the configuration is invalid.
    pub fn with_config(detector: D, estimator: P, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(detector, estimator)
        })
    }

    /// Run the detector on `image` under the configured detector scope.
    ///
    /// # Errors
    ///
    /// Propagates detector failures.
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Detections> {
        self.detector.detect(image, &self.config.det_scope)
    }

    /// Run the pose estimator on `image` for every row of `boxes`.
    ///
    /// An empty box set yields an empty result list without calling the estimator.
    ///
    /// # Errors
    ///
    /// Propagates estimator failures and returns [`PoseError::ShapeMismatch`] if the
    /// estimator does not return one result per box.
    pub fn estimate(
        &mut self,
        image: &DynamicImage,
        boxes: ArrayView2<'_, f32>,
    ) -> Result<Vec<PoseResult>> {
        if boxes.nrows() == 0 {
            return Ok(Vec::new());
        }
        let results = self
            .estimator
            .estimate(image, boxes, &self.config.pose_scope)?;
        if results.len() != boxes.nrows() {
            return Err(PoseError::ShapeMismatch(format!(
                "pose estimator returned {} results for {} boxes",
                results.len(),
                boxes.nrows()
            )));
        }
        Ok(results)
    }

    /// Keep the target-class boxes of `detections` using the configured threshold and mode.
    #[must_use]
    pub fn filter(&self, detections: &Detections) -> Array2<f32> {
        if self.config.filter_mode == FilterMode::EarlyExit && !detections.is_sorted_by_score() {
            warn!(
                "Detections are not sorted by score; early-exit filtering may drop boxes. \
                 Use FilterMode::Exhaustive for unsorted detectors."
            );
        }
        filter_boxes_with_mode(
            detections,
            self.config.target_class,
            self.config.class_threshold,
            self.config.filter_mode,
        )
    }

    /// Detect, filter and estimate on `image`, caching both raw outputs.
    ///
    /// # Errors
    ///
    /// Propagates detector and estimator failures. Cached results from a previous run
    /// are cleared before the new run starts.
    #[doc(alias = "run")]
    #[allow(clippy::cast_precision_loss)]
    pub fn predict(&mut self, image: &DynamicImage) -> Result<(&Detections, &[PoseResult])> {
        self.detections = None;
        self.pose_results = None;

        let start_detect = Instant::now();
        let detections = self.detect(image)?;
        let detect_time = start_detect.elapsed().as_secs_f64() * 1000.0;

        let start_filter = Instant::now();
        let boxes = self.filter(&detections);
        let filter_time = start_filter.elapsed().as_secs_f64() * 1000.0;

        let start_estimate = Instant::now();
        let pose_results = self.estimate(image, boxes.view())?;
        let estimate_time = start_estimate.elapsed().as_secs_f64() * 1000.0;

        self.speed = Speed::new(detect_time, filter_time, estimate_time);

        verbose!(
            "{} detections, {} ({:.1}ms detect, {:.1}ms filter, {:.1}ms estimate)",
            detections.len(),
            format_count(pose_results.len(), "person"),
            detect_time,
            filter_time,
            estimate_time
        );

        let detections = self.detections.insert(detections);
        let pose_results = self.pose_results.insert(pose_results);
        Ok((detections, pose_results.as_slice()))
    }

    /// Box of the object at `obj_idx` from the last prediction.
    ///
    /// Returns an empty array if the last prediction found nobody.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::NotPredicted`] before the first prediction and
    /// [`PoseError::IndexOutOfBounds`] for an index past the last pose result.
    pub fn get_bboxes(&self, obj_idx: usize) -> Result<Array1<f32>> {
        object_bbox(self.stored_results()?, obj_idx)
    }

    /// Keypoints of the object at `obj_idx` from the last prediction.
    ///
    /// Returns an empty array if the last prediction found nobody.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::NotPredicted`] before the first prediction and
    /// [`PoseError::IndexOutOfBounds`] for an index past the last pose result.
    pub fn get_keypoints(&self, obj_idx: usize) -> Result<Array2<f32>> {
        object_keypoints(self.stored_results()?, obj_idx)
    }

    fn stored_results(&self) -> Result<&[PoseResult]> {
        self.pose_results.as_deref().ok_or(PoseError::NotPredicted)
    }
}

impl<D, P> PosePipeline<D, P> {
    /// Detections from the last prediction.
    #[must_use]
    pub const fn detections(&self) -> Option<&Detections> {
        self.detections.as_ref()
    }

    /// Pose results from the last prediction.
    #[must_use]
    pub fn pose_results(&self) -> Option<&[PoseResult]> {
        self.pose_results.as_deref()
    }

    /// Timings of the last prediction.
    #[must_use]
    pub const fn speed(&self) -> &Speed {
        &self.speed
    }

    /// Pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The detector backend.
    #[must_use]
    pub const fn detector(&self) -> &D {
        &self.detector
    }

    /// The pose estimator backend.
    #[must_use]
    pub const fn estimator(&self) -> &P {
        &self.estimator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    struct FixedDetector {
        detections: Detections,
        scopes: Vec<String>,
    }

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &DynamicImage, scope: &str) -> Result<Detections> {
            self.scopes.push(scope.to_string());
            Ok(self.detections.clone())
        }
    }

    #[derive(Default)]
    struct BoxEchoEstimator {
        calls: usize,
    }

    impl PoseEstimator for BoxEchoEstimator {
        fn estimate(
            &mut self,
            _image: &DynamicImage,
            boxes: ArrayView2<'_, f32>,
            _scope: &str,
        ) -> Result<Vec<PoseResult>> {
            self.calls += 1;
            boxes
                .rows()
                .into_iter()
                .map(|row| {
                    let keypoints = Array2::from_elem((4, 2), row[0]);
                    PoseResult::single([row[0], row[1], row[2], row[3]], keypoints, None)
                })
                .collect()
        }
    }

    fn pipeline(rows: &[([f32; 4], usize, f32)]) -> PosePipeline<FixedDetector, BoxEchoEstimator> {
        PosePipeline::new(
            FixedDetector {
                detections: Detections::from_rows(rows),
                scopes: Vec::new(),
            },
            BoxEchoEstimator::default(),
        )
    }

    #[test]
    fn test_predict_filters_and_estimates() {
        let mut pipe = pipeline(&[
            ([10.0, 10.0, 20.0, 20.0], 0, 0.9),
            ([0.0, 0.0, 5.0, 5.0], 1, 0.8),
            ([30.0, 30.0, 40.0, 40.0], 0, 0.7),
        ]);
        let image = DynamicImage::new_rgb8(64, 64);

        let (detections, poses) = pipe.predict(&image).unwrap();
        assert_eq!(detections.len(), 3);
        assert_eq!(poses.len(), 2);

        let bbox = pipe.get_bboxes(1).unwrap();
        assert!((bbox[0] - 30.0).abs() < f32::EPSILON);
        assert_eq!(pipe.detector().scopes, vec!["mmdet".to_string()]);
        assert!(pipe.speed().detect.is_some());
    }

    #[test]
    fn test_empty_boxes_skip_estimator() {
        let mut pipe = pipeline(&[([0.0, 0.0, 5.0, 5.0], 1, 0.9)]);
        let image = DynamicImage::new_rgb8(8, 8);

        let (_, poses) = pipe.predict(&image).unwrap();
        assert!(poses.is_empty());
        assert_eq!(pipe.estimator().calls, 0);
        assert_eq!(pipe.get_bboxes(0).unwrap().len(), 0);
        assert_eq!(pipe.get_keypoints(0).unwrap().nrows(), 0);
    }

    #[test]
    fn test_accessors_before_predict() {
        let pipe = pipeline(&[]);
        assert!(matches!(pipe.get_bboxes(0), Err(PoseError::NotPredicted)));
        assert!(matches!(pipe.get_keypoints(0), Err(PoseError::NotPredicted)));
        assert!(pipe.detections().is_none());
    }

    #[test]
    fn test_accessor_out_of_bounds() {
        let mut pipe = pipeline(&[([0.0, 0.0, 5.0, 5.0], 0, 0.9)]);
        pipe.predict(&DynamicImage::new_rgb8(8, 8)).unwrap();
        assert!(matches!(
            pipe.get_keypoints(1),
            Err(PoseError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_accessor_reads_first_instance_of_selected_result() {
        struct MultiInstanceEstimator;

        impl PoseEstimator for MultiInstanceEstimator {
            fn estimate(
                &mut self,
                _image: &DynamicImage,
                boxes: ArrayView2<'_, f32>,
                _scope: &str,
            ) -> Result<Vec<PoseResult>> {
                (0..boxes.nrows())
                    .map(|i| {
                        #[allow(clippy::cast_precision_loss)]
                        let base = i as f32 * 100.0;
                        let bboxes = Array2::from_shape_fn((2, 4), |(inst, _)| {
                            base + inst as f32
                        });
                        let keypoints = Array3::from_elem((2, 3, 2), base);
                        PoseResult::new(bboxes, keypoints, None)
                    })
                    .collect()
            }
        }

        let mut pipe = PosePipeline::new(
            FixedDetector {
                detections: Detections::from_rows(&[
                    ([0.0; 4], 0, 0.9),
                    ([1.0; 4], 0, 0.8),
                ]),
                scopes: Vec::new(),
            },
            MultiInstanceEstimator,
        );
        pipe.predict(&DynamicImage::new_rgb8(8, 8)).unwrap();

        // obj_idx selects the pose result; instance 1 inside it is never read.
        let bbox = pipe.get_bboxes(1).unwrap();
        assert!((bbox[0] - 100.0).abs() < f32::EPSILON);
        let bbox = pipe.get_bboxes(0).unwrap();
        assert!(bbox[0].abs() < f32::EPSILON);
    }

    #[test]
    fn test_custom_scopes_reach_backend() {
        let mut pipe = PosePipeline::with_config(
            FixedDetector {
                detections: Detections::empty(),
                scopes: Vec::new(),
            },
            BoxEchoEstimator::default(),
            PipelineConfig::new().with_det_scope("rtmdet"),
        )
        .unwrap();
        pipe.predict(&DynamicImage::new_rgb8(4, 4)).unwrap();
        assert_eq!(pipe.detector().scopes, vec!["rtmdet".to_string()]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PosePipeline::with_config(
            FixedDetector {
                detections: Detections::empty(),
                scopes: Vec::new(),
            },
            BoxEchoEstimator::default(),
            PipelineConfig::new().with_class_threshold(-0.1),
        );
        assert!(matches!(result, Err(PoseError::ConfigError(_))));
    }
}
