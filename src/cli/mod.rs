// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface for running whole-body pose estimation.
//!
//! This module contains argument parsing, console logging, and the `predict` command.

// Modules
/// CLI arguments.
pub mod args;

/// Console logging macros and the global verbosity flag.
pub mod logging;

/// Prediction logic.
#[cfg(feature = "onnx")]
pub mod predict;
