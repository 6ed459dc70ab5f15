// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Whole-Body Pose Estimation
//!
//! Top-down whole-body pose estimation in Rust. A person detector finds boxes, a pose
//! model turns each box into 133 keypoints (17 body, 6 foot, 68 face and 42 hand), and
//! the results can be sliced per body region or drawn back onto the image.
//!
//! ## Features
//!
//! - **Two-stage pipeline** - Any [`Detector`] paired with any [`PoseEstimator`]
//! - **ONNX Runtime** - RTMDet/YOLO detectors and RTMPose/RTMW SimCC pose models
//! - **Region accessors** - Body, foot, face and hand keypoints by object index
//! - **Rendering** - Region-colored keypoints and skeleton over the source image
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use wholebody_pose::{ModelPaths, PipelineConfig, PosePipeline, WholeBodyEstimator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let paths = ModelPaths::new(
//!         "rtmw-l_384x288.yaml",
//!         "rtmw-l_384x288.onnx",
//!         "rtmdet-m_640x640.yaml",
//!         "rtmdet-m_640x640.onnx",
//!     )
//!     .resolve(std::path::Path::new("models"));
//!
//!     let pipeline = PosePipeline::from_model_paths(&paths, PipelineConfig::new())?;
//!     let mut model = WholeBodyEstimator::new(pipeline);
//!
//!     let image = image::open("person.jpg")?;
//!     let (_, poses) = model.predict(&image)?;
//!     for i in 0..poses.len() {
//!         let hands = model.get_hand_keypoints(i)?;
//!         println!("person {i}: {} hand keypoints", hands.nrows());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Backends
//!
//! The pipeline only needs the two traits, so other runtimes or test doubles plug in
//! directly:
//!
//! ```rust
//! use image::DynamicImage;
//! use ndarray::ArrayView2;
//! use wholebody_pose::{Detections, Detector, PoseEstimator, PosePipeline, PoseResult, Result};
//!
//! struct NoOneHere;
//!
//! impl Detector for NoOneHere {
//!     fn detect(&mut self, _: &DynamicImage, _: &str) -> Result<Detections> {
//!         Ok(Detections::empty())
//!     }
//! }
//!
//! impl PoseEstimator for NoOneHere {
//!     fn estimate(&mut self, _: &DynamicImage, _: ArrayView2<'_, f32>, _: &str) -> Result<Vec<PoseResult>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! let mut pipeline = PosePipeline::new(NoOneHere, NoOneHere);
//! let (_, poses) = pipeline.predict(&DynamicImage::new_rgb8(64, 64)).unwrap();
//! assert!(poses.is_empty());
//! assert_eq!(pipeline.get_bboxes(0).unwrap().len(), 0);
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Models are resolved against ./models by default
//! wholebody-pose predict --source image.jpg
//!
//! # Directory input, save annotated images to runs/pose/predict
//! wholebody-pose predict --source images/ --save
//!
//! # Print the hand keypoints of every person
//! wholebody-pose predict -s image.jpg --region hand
//! ```
//!
//! **CLI Options:**
//!
//! | Option | Short | Description | Default |
//! |--------|-------|-------------|---------|
//! | `--source` | `-s` | Input image, directory or glob | required |
//! | `--models-dir` | | Directory for relative model paths | `models` |
//! | `--conf` | | Person detection threshold | `0.5` |
//! | `--class-id` | | Detector class sent to the pose model | `0` |
//! | `--exhaustive` | | Visit every detection when filtering | `false` |
//! | `--region` | | Print one region's keypoints | |
//! | `--save` | | Save annotated images | `false` |
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | [`PosePipeline`] and the [`Detector`]/[`PoseEstimator`] traits |
//! | [`wholebody`] | 133-keypoint layout and [`WholeBodyEstimator`] region accessors |
//! | [`detection`] | [`Detections`] and target-class box filtering |
//! | [`results`] | [`PoseResult`] and [`Speed`] |
//! | [`annotate`] | Keypoint and skeleton rendering |
//! | [`config`] | [`PipelineConfig`] and [`ModelPaths`] |
//! | [`metadata`] | Model config files ([`ModelConfig`]) |
//! | [`preprocessing`] | Letterbox and affine crop to tensors |
//! | [`postprocessing`] | Detector and SimCC output decoding |
//! | [`model`] | ONNX Runtime backends |
//! | [`source`] | Input source handling |
//! | [`error`] | Error types ([`PoseError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `onnx` | ONNX Runtime backends and the CLI (default) |
//!
//! ## License
//!
//! This project is licensed under [AGPL-3.0](https://ultralytics.com/license).

// Modules
pub mod annotate;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod metadata;
#[cfg(feature = "onnx")]
pub mod model;
pub mod pipeline;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod source;
pub mod utils;
pub mod wholebody;

// Re-export main types for convenience
pub use config::{ModelPaths, PipelineConfig};
pub use detection::{Detections, FilterMode, filter_boxes, filter_boxes_with_mode};
pub use error::{PoseError, Result};
pub use pipeline::{Detector, PoseEstimator, PosePipeline};
pub use results::{PoseResult, Speed};
pub use source::Source;
pub use wholebody::{
    BodyRegion, NUM_WHOLEBODY_KEYPOINTS, WHOLEBODY_CONNECTIONS, WholeBodyEstimator,
    body_keypoints, face_keypoints, foot_keypoints, hand_keypoints, region_keypoints,
};

#[cfg(feature = "onnx")]
pub use model::{OnnxDetector, OnnxPoseEstimator};

// Re-export metadata and rendering for advanced use
pub use annotate::{annotate_results, render_pose};
pub use metadata::ModelConfig;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
