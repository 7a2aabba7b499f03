//! Error types for the head pose and gaze estimation library.

use thiserror::Error;

/// What kind of index was out of range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Index into the faces detected by the last frame update
    Face,
    /// Index into a face's landmark set
    Landmark,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Face => write!(f, "face"),
            Self::Landmark => write!(f, "landmark"),
        }
    }
}

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// A detection or landmark model could not be loaded at construction time
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),

    /// A face or landmark index beyond the results of the last update
    #[error("{kind} index {index} out of range (have {len})")]
    IndexOutOfRange {
        /// Which collection was indexed
        kind: IndexKind,
        /// The requested index
        index: usize,
        /// Number of available entries
        len: usize,
    },

    /// The PnP solver did not produce a usable pose for a face
    #[error("Pose solve failed: {0}")]
    PoseSolveFailed(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `ONNX` Runtime inference failed
    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// `OpenCV` operation failed
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),
}

impl Error {
    /// Whether this error only affects a single face and processing of others can continue
    #[must_use]
    pub fn is_per_face(&self) -> bool {
        matches!(self, Self::PoseSolveFailed(_) | Self::InvalidInput(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
