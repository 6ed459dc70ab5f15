// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose estimation output.
//!
//! A top-down pose estimator returns one [`PoseResult`] per input box. Each result wraps
//! an instance container (boxes, keypoints, keypoint scores) that holds a single
//! instance for top-down models; accessors always read instance `0` of the selected
//! result.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis, s};

use crate::error::{PoseError, Result};

/// Timing information for one pipeline run (in milliseconds).
#[derive(Debug, Clone, Default)]
pub struct Speed {
    /// Time spent in the detector.
    pub detect: Option<f64>,
    /// Time spent filtering detections.
    pub filter: Option<f64>,
    /// Time spent in the pose estimator.
    pub estimate: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    #[must_use]
    pub const fn new(detect: f64, filter: f64, estimate: f64) -> Self {
        Self {
            detect: Some(detect),
            filter: Some(filter),
            estimate: Some(estimate),
        }
    }

    /// Get total pipeline time.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.detect.unwrap_or(0.0) + self.filter.unwrap_or(0.0) + self.estimate.unwrap_or(0.0)
    }
}

/// Pose estimator output for one detected object.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseResult {
    /// Instance boxes with shape (I, 4) in xyxy format.
    pub bboxes: Array2<f32>,
    /// Instance keypoints with shape (I, K, 2), or (I, K, 3) when confidence is inlined.
    pub keypoints: Array3<f32>,
    /// Per-keypoint scores with shape (I, K), if the model produces them.
    pub keypoint_scores: Option<Array2<f32>>,
}

impl PoseResult {
    /// Create a pose result from instance arrays.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ShapeMismatch`] if the arrays disagree on the instance or
    /// keypoint count, boxes are not 4 wide, or keypoints are not 2 or 3 wide.
    pub fn new(
        bboxes: Array2<f32>,
        keypoints: Array3<f32>,
        keypoint_scores: Option<Array2<f32>>,
    ) -> Result<Self> {
        let (instances, num_kpts, dim) = keypoints.dim();
        if bboxes.ncols() != 4 {
            return Err(PoseError::ShapeMismatch(format!(
                "bboxes must have 4 columns, got {}",
                bboxes.ncols()
            )));
        }
        if bboxes.nrows() != instances {
            return Err(PoseError::ShapeMismatch(format!(
                "{} bboxes but {instances} keypoint instances",
                bboxes.nrows()
            )));
        }
        if dim != 2 && dim != 3 {
            return Err(PoseError::ShapeMismatch(format!(
                "keypoints must be (x, y) or (x, y, conf), got {dim} values"
            )));
        }
        if let Some(ref scores) = keypoint_scores {
            if scores.dim() != (instances, num_kpts) {
                return Err(PoseError::ShapeMismatch(format!(
                    "keypoint scores {:?} do not match keypoints ({instances}, {num_kpts})",
                    scores.dim()
                )));
            }
        }
        Ok(Self {
            bboxes,
            keypoints,
            keypoint_scores,
        })
    }

    /// Create a single-instance result, the shape a top-down estimator produces.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ShapeMismatch`] under the same rules as [`PoseResult::new`].
    pub fn single(
        bbox: [f32; 4],
        keypoints: Array2<f32>,
        keypoint_scores: Option<Array1<f32>>,
    ) -> Result<Self> {
        Self::new(
            Array2::from_shape_fn((1, 4), |(_, j)| bbox[j]),
            keypoints.insert_axis(Axis(0)),
            keypoint_scores.map(|scores| scores.insert_axis(Axis(0))),
        )
    }

    /// Number of instances in this result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keypoints.shape()[0]
    }

    /// Check if the result holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keypoints per instance.
    #[must_use]
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.shape()[1]
    }

    /// Keypoint xy coordinates of every instance, shape (I, K, 2).
    #[must_use]
    pub fn xy(&self) -> ArrayView3<'_, f32> {
        self.keypoints.slice(s![.., .., 0..2])
    }

    /// Box of one instance.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::IndexOutOfBounds`] if `instance` does not exist.
    pub fn bbox(&self, instance: usize) -> Result<ArrayView1<'_, f32>> {
        check_index(instance, self.bboxes.nrows())?;
        Ok(self.bboxes.row(instance))
    }

    /// Keypoints of one instance, shape (K, 2) or (K, 3).
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::IndexOutOfBounds`] if `instance` does not exist.
    pub fn instance_keypoints(&self, instance: usize) -> Result<ArrayView2<'_, f32>> {
        check_index(instance, self.len())?;
        Ok(self.keypoints.index_axis(Axis(0), instance))
    }

    /// Keypoint confidences of one instance, from the score array or an inlined third column.
    #[must_use]
    pub fn instance_scores(&self, instance: usize) -> Option<ArrayView1<'_, f32>> {
        if instance >= self.len() {
            return None;
        }
        if let Some(ref scores) = self.keypoint_scores {
            return Some(scores.row(instance));
        }
        if self.keypoints.shape()[2] == 3 {
            return Some(self.keypoints.slice(s![instance, .., 2]));
        }
        None
    }
}

/// Box of the object at `obj_idx`, read from instance `0` of its pose result.
///
/// Returns an empty array when `results` is empty.
///
/// # Errors
///
/// Returns [`PoseError::IndexOutOfBounds`] if `obj_idx` is past the end of a non-empty list.
pub fn object_bbox(results: &[PoseResult], obj_idx: usize) -> Result<Array1<f32>> {
    if results.is_empty() {
        return Ok(Array1::zeros(0));
    }
    check_index(obj_idx, results.len())?;
    Ok(results[obj_idx].bbox(0)?.to_owned())
}

/// Keypoints of the object at `obj_idx`, read from instance `0` of its pose result.
///
/// Returns an empty `(0, 2)` array when `results` is empty.
///
/// # Errors
///
/// Returns [`PoseError::IndexOutOfBounds`] if `obj_idx` is past the end of a non-empty list.
pub fn object_keypoints(results: &[PoseResult], obj_idx: usize) -> Result<Array2<f32>> {
    if results.is_empty() {
        return Ok(Array2::zeros((0, 2)));
    }
    check_index(obj_idx, results.len())?;
    Ok(results[obj_idx].instance_keypoints(0)?.to_owned())
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(PoseError::IndexOutOfBounds { index, len });
    }
    Ok(())
}
