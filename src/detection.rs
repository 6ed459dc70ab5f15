// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detector output and the class filter applied before pose estimation.
//!
//! The detector hands back a [`Detections`] batch ordered by descending score. The
//! filter keeps the boxes of one class whose score is strictly above a threshold and
//! stops as soon as a score falls below it, so an unsorted batch loses every
//! qualifying box after the first low score unless [`FilterMode::Exhaustive`] is used.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{PoseError, Result};

/// Detector class id for "person".
pub const PERSON_CLASS_ID: usize = 0;

/// Default confidence a detection must exceed to reach the pose estimator.
pub const DEFAULT_CLASS_THRESHOLD: f32 = 0.50;

/// How [`filter_boxes_with_mode`] walks a detection batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Stop at the first score below the threshold. Assumes descending scores.
    #[default]
    EarlyExit,
    /// Visit every detection regardless of order.
    Exhaustive,
}

/// A batch of detections from one image.
///
/// Boxes are stored in xyxy format with shape `(N, 4)`; labels and scores are parallel
/// arrays of length `N`.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    boxes: Array2<f32>,
    labels: Array1<usize>,
    scores: Array1<f32>,
}

impl Detections {
    /// Create a detection batch from parallel arrays.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ShapeMismatch`] if boxes are not `(N, 4)` or the three
    /// arrays disagree on `N`.
    pub fn new(boxes: Array2<f32>, labels: Array1<usize>, scores: Array1<f32>) -> Result<Self> {
        if boxes.ncols() != 4 {
            return Err(PoseError::ShapeMismatch(format!(
                "boxes must have 4 columns, got {}",
                boxes.ncols()
            )));
        }
        if boxes.nrows() != labels.len() || boxes.nrows() != scores.len() {
            return Err(PoseError::ShapeMismatch(format!(
                "{} boxes, {} labels, {} scores",
                boxes.nrows(),
                labels.len(),
                scores.len()
            )));
        }
        Ok(Self {
            boxes,
            labels,
            scores,
        })
    }

    /// An empty batch.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            boxes: Array2::zeros((0, 4)),
            labels: Array1::zeros(0),
            scores: Array1::zeros(0),
        }
    }

    /// Build a batch from `(box, label, score)` rows.
    #[must_use]
    pub fn from_rows(rows: &[([f32; 4], usize, f32)]) -> Self {
        Self {
            boxes: Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i].0[j]),
            labels: rows.iter().map(|r| r.1).collect(),
            scores: rows.iter().map(|r| r.2).collect(),
        }
    }

    /// Number of detections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if the batch holds no detections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Boxes in xyxy format, shape `(N, 4)`.
    #[must_use]
    pub fn boxes(&self) -> ArrayView2<'_, f32> {
        self.boxes.view()
    }

    /// Class labels.
    #[must_use]
    pub fn labels(&self) -> ArrayView1<'_, usize> {
        self.labels.view()
    }

    /// Confidence scores.
    #[must_use]
    pub fn scores(&self) -> ArrayView1<'_, f32> {
        self.scores.view()
    }

    /// Whether scores are in non-increasing order.
    #[must_use]
    pub fn is_sorted_by_score(&self) -> bool {
        self.scores
            .iter()
            .zip(self.scores.iter().skip(1))
            .all(|(prev, next)| !(prev < next))
    }
}

/// Keep boxes of `target_class` scoring above `threshold`, stopping at the first lower score.
///
/// Returns a `(0, 4)` array when nothing qualifies.
#[must_use]
pub fn filter_boxes(detections: &Detections, target_class: usize, threshold: f32) -> Array2<f32> {
    filter_boxes_with_mode(detections, target_class, threshold, FilterMode::EarlyExit)
}

/// Keep boxes of `target_class` scoring above `threshold`.
///
/// A score equal to the threshold neither qualifies nor stops an early-exit walk.
#[must_use]
pub fn filter_boxes_with_mode(
    detections: &Detections,
    target_class: usize,
    threshold: f32,
    mode: FilterMode,
) -> Array2<f32> {
    let mut kept: Vec<usize> = Vec::new();

    for (i, (&label, &score)) in detections
        .labels
        .iter()
        .zip(detections.scores.iter())
        .enumerate()
    {
        if label == target_class && score > threshold {
            kept.push(i);
        }
        if mode == FilterMode::EarlyExit && score < threshold {
            break;
        }
    }

    Array2::from_shape_fn((kept.len(), 4), |(row, col)| {
        detections.boxes[[kept[row], col]]
    })
}
