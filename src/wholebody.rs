// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Whole-body keypoint layout.
//!
//! The 133-point whole-body layout (indices `0..=132`) is split into four contiguous
//! regions: body (17), foot (6), face (68) and hand (42). This module owns the single
//! definition of those boundaries and of the skeleton edge list; the slicer here and the
//! renderer in [`crate::annotate`] both read from it.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use image::DynamicImage;
use ndarray::{Array2, ArrayView2, s};

use crate::detection::Detections;
use crate::error::{PoseError, Result};
use crate::pipeline::{Detector, PoseEstimator, PosePipeline};
use crate::results::PoseResult;

/// First body keypoint.
pub const BODY_IDX_START: usize = 0;
/// Last body keypoint (inclusive).
pub const BODY_IDX_END: usize = 16;
/// First foot keypoint.
pub const FOOT_IDX_START: usize = 17;
/// Last foot keypoint (inclusive).
pub const FOOT_IDX_END: usize = 22;
/// First face keypoint.
pub const FACE_IDX_START: usize = 23;
/// Last face keypoint (inclusive).
pub const FACE_IDX_END: usize = 90;
/// First hand keypoint.
pub const HAND_IDX_START: usize = 91;
/// Last hand keypoint (inclusive).
pub const HAND_IDX_END: usize = 132;

/// Keypoints a whole-body array must hold for slicing and drawing.
pub const NUM_WHOLEBODY_KEYPOINTS: usize = HAND_IDX_END + 1;

/// Skeleton edges as pairs of keypoint indices.
///
/// Body limbs plus each ankle to its three foot points.
pub const WHOLEBODY_CONNECTIONS: [[usize; 2]; 22] = [
    [0, 1],
    [0, 2],
    [1, 3],
    [2, 4],
    [5, 6],
    [5, 7],
    [6, 8],
    [7, 9],
    [8, 10],
    [5, 11],
    [6, 12],
    [11, 12],
    [11, 13],
    [12, 14],
    [13, 15],
    [14, 16],
    [15, 17],
    [15, 18],
    [15, 19],
    [16, 20],
    [16, 21],
    [16, 22],
];

/// Anatomical keypoint group of the whole-body layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRegion {
    /// COCO body keypoints (nose through ankles).
    Body,
    /// Big toe, small toe and heel of each foot.
    Foot,
    /// 68 facial landmarks.
    Face,
    /// 21 landmarks per hand, left then right.
    Hand,
}

impl BodyRegion {
    /// All regions in layout order.
    pub const ALL: [Self; 4] = [Self::Body, Self::Foot, Self::Face, Self::Hand];

    /// Inclusive `(start, end)` keypoint indices of this region.
    #[must_use]
    pub const fn bounds(&self) -> (usize, usize) {
        match self {
            Self::Body => (BODY_IDX_START, BODY_IDX_END),
            Self::Foot => (FOOT_IDX_START, FOOT_IDX_END),
            Self::Face => (FACE_IDX_START, FACE_IDX_END),
            Self::Hand => (HAND_IDX_START, HAND_IDX_END),
        }
    }

    /// Keypoint indices of this region.
    #[must_use]
    pub const fn indices(&self) -> RangeInclusive<usize> {
        let (start, end) = self.bounds();
        start..=end
    }

    /// Number of keypoints in this region.
    #[must_use]
    pub const fn num_keypoints(&self) -> usize {
        let (start, end) = self.bounds();
        end - start + 1
    }

    /// Region that owns keypoint `index`, if any.
    #[must_use]
    pub fn of_index(index: usize) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|region| region.indices().contains(&index))
    }

    /// Returns the lowercase region name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Foot => "foot",
            Self::Face => "face",
            Self::Hand => "hand",
        }
    }
}

impl fmt::Display for BodyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BodyRegion {
    type Err = RegionParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "body" => Ok(Self::Body),
            "foot" | "feet" => Ok(Self::Foot),
            "face" => Ok(Self::Face),
            "hand" | "hands" => Ok(Self::Hand),
            _ => Err(RegionParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid region string.
#[derive(Debug, Clone)]
pub struct RegionParseError(String);

impl fmt::Display for RegionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid region '{}', expected one of: body, foot, face, hand",
            self.0
        )
    }
}

impl std::error::Error for RegionParseError {}

/// Fail unless `keypoints` covers the whole-body layout.
///
/// # Errors
///
/// Returns [`PoseError::KeypointCount`] for fewer than [`NUM_WHOLEBODY_KEYPOINTS`] rows.
pub fn ensure_wholebody(keypoints: ArrayView2<'_, f32>) -> Result<()> {
    if keypoints.nrows() < NUM_WHOLEBODY_KEYPOINTS {
        return Err(PoseError::KeypointCount {
            len: keypoints.nrows(),
            required: NUM_WHOLEBODY_KEYPOINTS,
        });
    }
    Ok(())
}

/// View the rows of `keypoints` that belong to `region`.
///
/// # Errors
///
/// Returns [`PoseError::KeypointCount`] if `keypoints` is shorter than the whole-body
/// layout, even when the requested region would fit.
pub fn region_slice(keypoints: ArrayView2<'_, f32>, region: BodyRegion) -> Result<ArrayView2<'_, f32>> {
    ensure_wholebody(keypoints.view())?;
    let (start, end) = region.bounds();
    Ok(keypoints.slice_move(s![start..=end, ..]))
}

/// Region keypoints of the object at `obj_idx`, read from instance `0` of its result.
///
/// Returns an empty `(0, 2)` array when `results` is empty.
///
/// # Errors
///
/// Returns [`PoseError::IndexOutOfBounds`] for a bad `obj_idx` and
/// [`PoseError::KeypointCount`] for a short keypoint array.
pub fn region_keypoints(
    results: &[PoseResult],
    obj_idx: usize,
    region: BodyRegion,
) -> Result<Array2<f32>> {
    if results.is_empty() {
        return Ok(Array2::zeros((0, 2)));
    }
    let result = results.get(obj_idx).ok_or(PoseError::IndexOutOfBounds {
        index: obj_idx,
        len: results.len(),
    })?;
    let keypoints = result.instance_keypoints(0)?;
    Ok(region_slice(keypoints, region)?.to_owned())
}

/// Body keypoints (indices 0..=16) of the object at `obj_idx`.
///
/// # Errors
///
/// See [`region_keypoints`].
pub fn body_keypoints(results: &[PoseResult], obj_idx: usize) -> Result<Array2<f32>> {
    region_keypoints(results, obj_idx, BodyRegion::Body)
}

/// Foot keypoints (indices 17..=22) of the object at `obj_idx`.
///
/// # Errors
///
/// See [`region_keypoints`].
pub fn foot_keypoints(results: &[PoseResult], obj_idx: usize) -> Result<Array2<f32>> {
    region_keypoints(results, obj_idx, BodyRegion::Foot)
}

/// Face keypoints (indices 23..=90) of the object at `obj_idx`.
///
/// # Errors
///
/// See [`region_keypoints`].
pub fn face_keypoints(results: &[PoseResult], obj_idx: usize) -> Result<Array2<f32>> {
    region_keypoints(results, obj_idx, BodyRegion::Face)
}

/// Hand keypoints (indices 91..=132) of the object at `obj_idx`.
///
/// # Errors
///
/// See [`region_keypoints`].
pub fn hand_keypoints(results: &[PoseResult], obj_idx: usize) -> Result<Array2<f32>> {
    region_keypoints(results, obj_idx, BodyRegion::Hand)
}

/// A [`PosePipeline`] with per-region keypoint accessors.
///
/// # Example
///
/// ```no_run
/// use wholebody_pose::{ModelPaths, OnnxDetector, OnnxPoseEstimator, PipelineConfig};
/// use wholebody_pose::{PosePipeline, WholeBodyEstimator};
///
/// fn main() -> wholebody_pose::Result<()> {
///     let paths = ModelPaths::new("pose.yaml", "pose.onnx", "det.yaml", "det.onnx")
///         .resolve(std::path::Path::new("models"));
///     let pipeline = PosePipeline::from_model_paths(&paths, PipelineConfig::default())?;
///     let mut estimator = WholeBodyEstimator::new(pipeline);
///
///     let image = image::open("person.jpg")?;
///     estimator.predict(&image)?;
///     let hands = estimator.get_hand_keypoints(0)?;
///     println!("{} hand keypoints", hands.nrows());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct WholeBodyEstimator<D, P> {
    pipeline: PosePipeline<D, P>,
}

impl<D: Detector, P: PoseEstimator> WholeBodyEstimator<D, P> {
    /// Wrap a pipeline.
    pub const fn new(pipeline: PosePipeline<D, P>) -> Self {
        Self { pipeline }
    }

    /// Run detect, filter and estimate on `image`.
    ///
    /// # Errors
    ///
    /// Propagates detector and estimator failures.
    pub fn predict(&mut self, image: &DynamicImage) -> Result<(&Detections, &[PoseResult])> {
        self.pipeline.predict(image)
    }

    /// The wrapped pipeline.
    pub const fn pipeline(&self) -> &PosePipeline<D, P> {
        &self.pipeline
    }

    /// The wrapped pipeline, mutably.
    pub fn pipeline_mut(&mut self) -> &mut PosePipeline<D, P> {
        &mut self.pipeline
    }

    /// Unwrap the pipeline.
    pub fn into_inner(self) -> PosePipeline<D, P> {
        self.pipeline
    }

    /// Keypoints of `region` for the object at `obj_idx` from the last prediction.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::NotPredicted`] before the first prediction, otherwise see
    /// [`region_keypoints`].
    pub fn get_region_keypoints(&self, obj_idx: usize, region: BodyRegion) -> Result<Array2<f32>> {
        let results = self.pipeline.pose_results().ok_or(PoseError::NotPredicted)?;
        region_keypoints(results, obj_idx, region)
    }

    /// Body keypoints of the object at `obj_idx`.
    ///
    /// # Errors
    ///
    /// See [`WholeBodyEstimator::get_region_keypoints`].
    pub fn get_body_keypoints(&self, obj_idx: usize) -> Result<Array2<f32>> {
        self.get_region_keypoints(obj_idx, BodyRegion::Body)
    }

    /// Foot keypoints of the object at `obj_idx`.
    ///
    /// # Errors
    ///
    /// See [`WholeBodyEstimator::get_region_keypoints`].
    pub fn get_foot_keypoints(&self, obj_idx: usize) -> Result<Array2<f32>> {
        self.get_region_keypoints(obj_idx, BodyRegion::Foot)
    }

    /// Face keypoints of the object at `obj_idx`.
    ///
    /// # Errors
    ///
    /// See [`WholeBodyEstimator::get_region_keypoints`].
    pub fn get_face_keypoints(&self, obj_idx: usize) -> Result<Array2<f32>> {
        self.get_region_keypoints(obj_idx, BodyRegion::Face)
    }

    /// Hand keypoints of the object at `obj_idx`.
    ///
    /// # Errors
    ///
    /// See [`WholeBodyEstimator::get_region_keypoints`].
    pub fn get_hand_keypoints(&self, obj_idx: usize) -> Result<Array2<f32>> {
        self.get_region_keypoints(obj_idx, BodyRegion::Hand)
    }
}
