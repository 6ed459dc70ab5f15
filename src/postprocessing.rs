// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing of raw model outputs.
//!
//! Detector outputs come in two layouts, picked by the detector scope:
//! - `mmdet`: end-to-end `dets` `[1, N, 5]` (xyxy + score) and `labels` `[1, N]`.
//! - `ultralytics`: raw YOLO `[1, 4 + C, P]` predictions that still need NMS.
//!
//! Both are mapped back through the letterbox and returned sorted by descending score,
//! the order the detection filter expects. Pose outputs are SimCC vectors decoded by
//! argmax per axis.

#![allow(clippy::cast_precision_loss)]

use ndarray::{Array1, Array2, ArrayView2, ArrayView3, s};

use crate::detection::Detections;
use crate::error::{PoseError, Result};
use crate::preprocessing::{CropTransform, PreprocessResult, clip_coords, scale_coords};
use crate::results::PoseResult;
use crate::utils::{argmax, nms_per_class, sort_by_score_desc};

/// Scope of end-to-end detectors exported with `dets` and `labels` outputs.
pub const MMDET_SCOPE: &str = "mmdet";

/// Scope of raw YOLO detectors that need NMS.
pub const ULTRALYTICS_SCOPE: &str = "ultralytics";

/// Scope of SimCC pose estimators.
pub const MMPOSE_SCOPE: &str = "mmpose";

/// Default `IoU` threshold for NMS on raw YOLO output.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Output layout a detector scope resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorLayout {
    /// `dets` + `labels` outputs.
    DetsLabels,
    /// Single YOLO prediction tensor.
    Yolo,
}

impl DetectorLayout {
    /// Resolve a detector scope.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] for an unknown scope.
    pub fn from_scope(scope: &str) -> Result<Self> {
        match scope {
            MMDET_SCOPE => Ok(Self::DetsLabels),
            ULTRALYTICS_SCOPE => Ok(Self::Yolo),
            other => Err(PoseError::ConfigError(format!(
                "Unsupported detector scope '{other}'. Expected '{MMDET_SCOPE}' or '{ULTRALYTICS_SCOPE}'"
            ))),
        }
    }
}

/// Check that a pose scope is one the SimCC decoder understands.
///
/// # Errors
///
/// Returns [`PoseError::ConfigError`] for an unknown scope.
pub fn check_pose_scope(scope: &str) -> Result<()> {
    if scope == MMPOSE_SCOPE {
        Ok(())
    } else {
        Err(PoseError::ConfigError(format!(
            "Unsupported pose scope '{scope}'. Expected '{MMPOSE_SCOPE}'"
        )))
    }
}

/// Decode end-to-end detector output.
///
/// `dets` is `(N, 5)` with xyxy + score in letterboxed input space; `labels` holds one
/// class per row. Rows scoring below `score_threshold` are dropped.
///
/// # Errors
///
/// Returns [`PoseError::PostProcessingError`] if `dets` is not 5 wide or the label
/// count differs from the row count.
pub fn decode_dets_labels(
    dets: ArrayView2<'_, f32>,
    labels: &[usize],
    preprocess: &PreprocessResult,
    score_threshold: f32,
) -> Result<Detections> {
    if dets.ncols() != 5 {
        return Err(PoseError::PostProcessingError(format!(
            "dets must be (N, 5), got {:?}",
            dets.shape()
        )));
    }
    if labels.len() != dets.nrows() {
        return Err(PoseError::PostProcessingError(format!(
            "{} dets but {} labels",
            dets.nrows(),
            labels.len()
        )));
    }

    let rows: Vec<([f32; 4], usize, f32)> = dets
        .rows()
        .into_iter()
        .zip(labels)
        .filter(|(row, _)| row[4] >= score_threshold)
        .map(|(row, &label)| {
            let scaled = scale_coords(
                &[row[0], row[1], row[2], row[3]],
                preprocess.scale,
                preprocess.padding,
            );
            (clip_coords(&scaled, preprocess.orig_shape), label, row[4])
        })
        .collect();

    let order = sort_by_score_desc(rows.len(), |i| rows[i].2);
    let sorted: Vec<_> = order.into_iter().map(|i| rows[i]).collect();
    Ok(Detections::from_rows(&sorted))
}

/// Decode raw YOLO output of shape `[1, 4 + C, P]` or `[1, P, 4 + C]`.
///
/// # Errors
///
/// Returns [`PoseError::PostProcessingError`] if the shape is not rank 3 with at least
/// five features.
pub fn decode_yolo(
    output: &[f32],
    output_shape: &[usize],
    preprocess: &PreprocessResult,
    score_threshold: f32,
    iou_threshold: f32,
) -> Result<Detections> {
    let &[_, a, b] = output_shape else {
        return Err(PoseError::PostProcessingError(format!(
            "YOLO output must be rank 3, got {output_shape:?}"
        )));
    };
    // Feature count is the smaller axis (84 vs 8400 for COCO).
    let (num_features, num_preds, transposed) = if a < b { (a, b, false) } else { (b, a, true) };
    if num_features < 5 {
        return Err(PoseError::PostProcessingError(format!(
            "YOLO output needs at least 5 features, got {output_shape:?}"
        )));
    }

    let preds = if transposed {
        Array2::from_shape_vec((num_preds, num_features), output.to_vec())
    } else {
        Array2::from_shape_vec((num_features, num_preds), output.to_vec()).map(|arr| arr.reversed_axes())
    }
    .map_err(|e| PoseError::PostProcessingError(format!("Invalid YOLO output: {e}")))?;

    let mut candidates = Vec::new();
    for row in preds.rows() {
        let Some((class, score)) = argmax(row.slice(s![4..])) else {
            continue;
        };
        if score < score_threshold {
            continue;
        }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let scaled = scale_coords(
            &[cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            preprocess.scale,
            preprocess.padding,
        );
        candidates.push((clip_coords(&scaled, preprocess.orig_shape), score, class));
    }

    let rows: Vec<([f32; 4], usize, f32)> = nms_per_class(&candidates, iou_threshold)
        .into_iter()
        .map(|i| {
            let (bbox, score, class) = candidates[i];
            (bbox, class, score)
        })
        .collect();
    Ok(Detections::from_rows(&rows))
}

/// Decode SimCC vectors for one crop.
///
/// `simcc_x` is `(K, W * r)` and `simcc_y` is `(K, H * r)` where `r` is the split ratio.
/// Returns keypoints `(K, 2)` in model input space and per-keypoint scores (mean of the
/// two axis maxima).
///
/// # Errors
///
/// Returns [`PoseError::PostProcessingError`] if the two inputs disagree on `K`, a vector
/// is empty, or the split ratio is not positive.
pub fn decode_simcc(
    simcc_x: ArrayView2<'_, f32>,
    simcc_y: ArrayView2<'_, f32>,
    split_ratio: f32,
) -> Result<(Array2<f32>, Array1<f32>)> {
    if simcc_x.nrows() != simcc_y.nrows() {
        return Err(PoseError::PostProcessingError(format!(
            "simcc_x has {} keypoints but simcc_y has {}",
            simcc_x.nrows(),
            simcc_y.nrows()
        )));
    }
    if split_ratio <= 0.0 {
        return Err(PoseError::PostProcessingError(format!(
            "split ratio must be positive, got {split_ratio}"
        )));
    }

    let num_kpts = simcc_x.nrows();
    let mut keypoints = Array2::zeros((num_kpts, 2));
    let mut scores = Array1::zeros(num_kpts);

    for (k, (row_x, row_y)) in simcc_x.rows().into_iter().zip(simcc_y.rows()).enumerate() {
        let ((x_bin, x_val), (y_bin, y_val)) = argmax(row_x)
            .zip(argmax(row_y))
            .ok_or_else(|| PoseError::PostProcessingError("empty SimCC vector".to_string()))?;
        keypoints[[k, 0]] = x_bin as f32 / split_ratio;
        keypoints[[k, 1]] = y_bin as f32 / split_ratio;
        scores[k] = 0.5 * (x_val + y_val);
    }

    Ok((keypoints, scores))
}

/// Decode a batch of SimCC outputs into one [`PoseResult`] per crop.
///
/// `simcc_x` is `(B, K, Wx)` and `simcc_y` is `(B, K, Wy)`; `transforms[b]` maps crop `b`
/// back into the image and `boxes[b]` is the detector box it came from.
///
/// # Errors
///
/// Returns [`PoseError::PostProcessingError`] if the batch sizes disagree.
pub fn decode_simcc_batch(
    simcc_x: ArrayView3<'_, f32>,
    simcc_y: ArrayView3<'_, f32>,
    split_ratio: f32,
    transforms: &[CropTransform],
    boxes: ArrayView2<'_, f32>,
) -> Result<Vec<PoseResult>> {
    let batch = transforms.len();
    if simcc_x.shape()[0] != batch || simcc_y.shape()[0] != batch || boxes.nrows() != batch {
        return Err(PoseError::PostProcessingError(format!(
            "batch mismatch: {} crops, simcc_x {:?}, simcc_y {:?}, {} boxes",
            batch,
            simcc_x.shape(),
            simcc_y.shape(),
            boxes.nrows()
        )));
    }

    transforms
        .iter()
        .enumerate()
        .map(|(b, transform)| {
            let (mut keypoints, scores) = decode_simcc(
                simcc_x.index_axis(ndarray::Axis(0), b),
                simcc_y.index_axis(ndarray::Axis(0), b),
                split_ratio,
            )?;
            for mut kpt in keypoints.rows_mut() {
                let (x, y) = transform.to_image(kpt[0], kpt[1]);
                kpt[0] = x;
                kpt[1] = y;
            }
            let bbox = boxes.row(b);
            PoseResult::single([bbox[0], bbox[1], bbox[2], bbox[3]], keypoints, Some(scores))
        })
        .collect()
}
