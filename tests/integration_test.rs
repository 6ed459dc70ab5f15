// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the whole-body pose pipeline using in-memory backends.

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array1, Array2, ArrayView2};
use wholebody_pose::annotate::{EDGE_COLOR, HAND_COLOR};
use wholebody_pose::wholebody::region_slice;
use wholebody_pose::{
    BodyRegion, Detections, Detector, FilterMode, NUM_WHOLEBODY_KEYPOINTS, PipelineConfig,
    PoseError, PoseEstimator, PosePipeline, PoseResult, Result, WholeBodyEstimator,
    filter_boxes, filter_boxes_with_mode, render_pose,
};

/// Detector returning a fixed batch and recording the scopes it was called with.
struct ScriptedDetector {
    rows: Vec<([f32; 4], usize, f32)>,
    scopes: Vec<String>,
}

impl ScriptedDetector {
    fn new(rows: &[([f32; 4], usize, f32)]) -> Self {
        Self {
            rows: rows.to_vec(),
            scopes: Vec::new(),
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _image: &DynamicImage, scope: &str) -> Result<Detections> {
        self.scopes.push(scope.to_string());
        Ok(Detections::from_rows(&self.rows))
    }
}

/// Estimator that places keypoint `i` at `(x1 + i, y1 + i)` of each box.
#[derive(Default)]
struct DiagonalEstimator {
    calls: usize,
    scopes: Vec<String>,
}

impl PoseEstimator for DiagonalEstimator {
    fn estimate(
        &mut self,
        _image: &DynamicImage,
        boxes: ArrayView2<'_, f32>,
        scope: &str,
    ) -> Result<Vec<PoseResult>> {
        self.calls += 1;
        self.scopes.push(scope.to_string());
        boxes
            .rows()
            .into_iter()
            .map(|b| {
                let keypoints = Array2::from_shape_fn((NUM_WHOLEBODY_KEYPOINTS, 2), |(i, j)| {
                    b[j] + i as f32
                });
                let scores = Array1::from_elem(NUM_WHOLEBODY_KEYPOINTS, 0.9);
                PoseResult::single([b[0], b[1], b[2], b[3]], keypoints, Some(scores))
            })
            .collect()
    }
}

fn blank() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(64, 64))
}

#[test]
fn test_filter_keeps_target_class_only() {
    let detections = Detections::from_rows(&[
        ([0.0, 0.0, 10.0, 10.0], 0, 0.9),
        ([0.0, 0.0, 5.0, 5.0], 1, 0.8),
    ]);
    let boxes = filter_boxes(&detections, 0, 0.5);
    assert_eq!(boxes.nrows(), 1);
    assert_eq!(boxes.row(0).to_vec(), vec![0.0, 0.0, 10.0, 10.0]);
}

#[test]
fn test_early_exit_drops_detections_after_low_score() {
    let unsorted = Detections::from_rows(&[
        ([0.0, 0.0, 1.0, 1.0], 0, 0.3),
        ([0.0, 0.0, 2.0, 2.0], 0, 0.9),
    ]);
    assert!(!unsorted.is_sorted_by_score());
    assert_eq!(filter_boxes_with_mode(&unsorted, 0, 0.5, FilterMode::EarlyExit).nrows(), 0);
    assert_eq!(filter_boxes_with_mode(&unsorted, 0, 0.5, FilterMode::Exhaustive).nrows(), 1);
}

#[test]
fn test_pipeline_runs_end_to_end() {
    let detector = ScriptedDetector::new(&[
        ([10.0, 20.0, 30.0, 60.0], 0, 0.95),
        ([5.0, 5.0, 9.0, 9.0], 2, 0.9),
        ([40.0, 10.0, 60.0, 50.0], 0, 0.7),
        ([1.0, 1.0, 2.0, 2.0], 0, 0.2),
    ]);
    let mut pipeline = PosePipeline::new(detector, DiagonalEstimator::default());

    let (detections, poses) = pipeline.predict(&blank()).unwrap();
    assert_eq!(detections.len(), 4);
    assert_eq!(poses.len(), 2);

    assert_eq!(pipeline.get_bboxes(1).unwrap().to_vec(), vec![40.0, 10.0, 60.0, 50.0]);
    let keypoints = pipeline.get_keypoints(0).unwrap();
    assert_eq!(keypoints.dim(), (NUM_WHOLEBODY_KEYPOINTS, 2));
    assert!((keypoints[[5, 0]] - 15.0).abs() < f32::EPSILON);
    assert!((keypoints[[5, 1]] - 25.0).abs() < f32::EPSILON);

    assert!(pipeline.speed().detect.is_some());
    assert_eq!(pipeline.estimator().calls, 1);
    assert_eq!(pipeline.detector().scopes, vec!["mmdet"]);
    assert_eq!(pipeline.estimator().scopes, vec!["mmpose"]);
}

#[test]
fn test_empty_results_return_empty_arrays() {
    let detector = ScriptedDetector::new(&[([0.0, 0.0, 5.0, 5.0], 1, 0.99)]);
    let mut pipeline = PosePipeline::new(detector, DiagonalEstimator::default());

    let (_, poses) = pipeline.predict(&blank()).unwrap();
    assert!(poses.is_empty());
    assert_eq!(pipeline.get_bboxes(0).unwrap().len(), 0);
    assert_eq!(pipeline.get_keypoints(0).unwrap().len(), 0);
    assert_eq!(pipeline.estimator().calls, 0);
}

#[test]
fn test_accessors_before_predict() {
    let pipeline = PosePipeline::new(ScriptedDetector::new(&[]), DiagonalEstimator::default());
    assert!(matches!(pipeline.get_bboxes(0), Err(PoseError::NotPredicted)));
    assert!(matches!(pipeline.get_keypoints(0), Err(PoseError::NotPredicted)));

    let estimator = WholeBodyEstimator::new(pipeline);
    assert!(matches!(estimator.get_hand_keypoints(0), Err(PoseError::NotPredicted)));
}

#[test]
fn test_out_of_range_index_fails() {
    let detector = ScriptedDetector::new(&[([0.0, 0.0, 10.0, 10.0], 0, 0.9)]);
    let mut pipeline = PosePipeline::new(detector, DiagonalEstimator::default());
    pipeline.predict(&blank()).unwrap();

    assert!(matches!(
        pipeline.get_bboxes(3),
        Err(PoseError::IndexOutOfBounds { index: 3, len: 1 })
    ));
    assert!(pipeline.get_keypoints(1).is_err());
}

#[test]
fn test_custom_config_and_scopes() {
    let detector = ScriptedDetector::new(&[
        ([0.0, 0.0, 10.0, 10.0], 0, 0.9),
        ([0.0, 0.0, 20.0, 20.0], 2, 0.6),
    ]);
    let config = PipelineConfig::new()
        .with_target_class(2)
        .with_class_threshold(0.5)
        .with_det_scope("ultralytics");
    let mut pipeline =
        PosePipeline::with_config(detector, DiagonalEstimator::default(), config).unwrap();

    let (_, poses) = pipeline.predict(&blank()).unwrap();
    assert_eq!(poses.len(), 1);
    assert_eq!(pipeline.get_bboxes(0).unwrap().to_vec(), vec![0.0, 0.0, 20.0, 20.0]);
    assert_eq!(pipeline.detector().scopes, vec!["ultralytics"]);
}

#[test]
fn test_wholebody_region_sizes() {
    let detector = ScriptedDetector::new(&[([0.0, 0.0, 10.0, 10.0], 0, 0.9)]);
    let mut model = WholeBodyEstimator::new(PosePipeline::new(detector, DiagonalEstimator::default()));
    model.predict(&blank()).unwrap();

    assert_eq!(model.get_body_keypoints(0).unwrap().nrows(), 17);
    assert_eq!(model.get_foot_keypoints(0).unwrap().nrows(), 6);
    assert_eq!(model.get_face_keypoints(0).unwrap().nrows(), 68);

    let hands = model.get_hand_keypoints(0).unwrap();
    assert_eq!(hands.nrows(), 42);
    assert!((hands[[0, 0]] - 91.0).abs() < f32::EPSILON);
    assert!((hands[[41, 0]] - 132.0).abs() < f32::EPSILON);

    let total: usize = BodyRegion::ALL.iter().map(BodyRegion::num_keypoints).sum();
    assert_eq!(total, NUM_WHOLEBODY_KEYPOINTS);
}

#[test]
fn test_short_keypoints_fail_instead_of_truncating() {
    let keypoints = Array2::<f32>::zeros((50, 2));
    assert!(matches!(
        region_slice(keypoints.view(), BodyRegion::Hand),
        Err(PoseError::KeypointCount { len: 50, .. })
    ));
    assert!(render_pose(&blank(), keypoints.view()).is_err());
}

#[test]
fn test_render_pose_colors_and_leaves_input_untouched() {
    let image = blank();
    let mut keypoints = Array2::from_elem((NUM_WHOLEBODY_KEYPOINTS, 2), f32::NAN);
    // Nose to left eye is a skeleton edge.
    keypoints[[0, 0]] = 10.0;
    keypoints[[0, 1]] = 10.0;
    keypoints[[1, 0]] = 40.0;
    keypoints[[1, 1]] = 10.0;
    keypoints[[100, 0]] = 30.0;
    keypoints[[100, 1]] = 50.0;

    let rendered = render_pose(&image, keypoints.view()).unwrap().to_rgb8();
    assert_eq!(*rendered.get_pixel(25, 10), EDGE_COLOR);
    assert_eq!(*rendered.get_pixel(30, 50), HAND_COLOR);
    assert_eq!(*rendered.get_pixel(5, 40), Rgb([0, 0, 0]));
    assert_eq!(*image.to_rgb8().get_pixel(25, 10), Rgb([0, 0, 0]));
}

#[test]
fn test_boxed_backends() {
    let detector: Box<dyn Detector> =
        Box::new(ScriptedDetector::new(&[([0.0, 0.0, 8.0, 8.0], 0, 0.8)]));
    let estimator: Box<dyn PoseEstimator> = Box::new(DiagonalEstimator::default());
    let mut pipeline = PosePipeline::new(detector, estimator);

    let (_, poses) = pipeline.predict(&blank()).unwrap();
    assert_eq!(poses.len(), 1);
    assert_eq!(pipeline.get_keypoints(0).unwrap().nrows(), NUM_WHOLEBODY_KEYPOINTS);
}
