// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the pose pipeline.

use std::fmt;

/// Result type alias for pose pipeline operations.
pub type Result<T> = std::result::Result<T, PoseError>;

/// Main error type for the pose pipeline.
#[derive(Debug)]
pub enum PoseError {
    /// Error loading a detector or pose model.
    ModelLoadError(String),
    /// Error during model inference.
    InferenceError(String),
    /// Error processing images.
    ImageError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
    /// Post-processing error.
    PostProcessingError(String),
    /// Parallel arrays that must share a length do not.
    ShapeMismatch(String),
    /// An object index past the end of the stored pose results.
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Number of available entries.
        len: usize,
    },
    /// A keypoint array too short for the whole-body layout.
    KeypointCount {
        /// Number of keypoints supplied.
        len: usize,
        /// Number of keypoints the layout needs.
        required: usize,
    },
    /// Accessors were called before any prediction ran.
    NotPredicted,
}

impl fmt::Display for PoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::PostProcessingError(msg) => write!(f, "Post-processing error: {msg}"),
            Self::ShapeMismatch(msg) => write!(f, "Shape mismatch: {msg}"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "Index out of bounds: index {index} but only {len} pose results")
            }
            Self::KeypointCount { len, required } => write!(
                f,
                "Keypoint count error: got {len} keypoints, whole-body layout needs {required}"
            ),
            Self::NotPredicted => write!(f, "No prediction has been run yet"),
        }
    }
}

impl std::error::Error for PoseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PoseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for PoseError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoseError::ModelLoadError("test".to_string());
        assert_eq!(err.to_string(), "Model load error: test");

        let err = PoseError::IndexOutOfBounds { index: 3, len: 1 };
        assert_eq!(
            err.to_string(),
            "Index out of bounds: index 3 but only 1 pose results"
        );

        let err = PoseError::KeypointCount {
            len: 50,
            required: 133,
        };
        assert!(err.to_string().contains("got 50 keypoints"));
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error;

        let err = PoseError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(PoseError::NotPredicted.source().is_none());
    }
}
