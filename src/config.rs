//! Configuration management for the head pose and gaze estimator

use crate::{
    constants::{
        DEFAULT_FAST_EYE_WIDTH, DEFAULT_FOCAL_LENGTH, DEFAULT_GRADIENT_THRESHOLD, DEFAULT_PNP_EPSILON,
        DEFAULT_PNP_MAX_ITERATIONS, DEFAULT_WEIGHT_BLUR_SIGMA, EYE_ROI_ENLARGE_FACTOR,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Estimator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    pub models: ModelConfig,

    /// Face detection configuration
    pub face_detection: FaceDetectionConfig,

    /// Camera intrinsics
    pub camera: CameraConfig,

    /// Eye region and pupil search configuration
    pub eyes: EyeConfig,

    /// PnP solver configuration
    pub solver: SolverConfig,
}

/// Model file paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to face detection ONNX model
    pub face_detector: PathBuf,

    /// Path to 68-point facial landmark ONNX model
    pub face_landmarks: PathBuf,
}

/// Face detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Confidence threshold for face detection (0.0-1.0)
    pub confidence_threshold: f32,

    /// IOU threshold for non-maximum suppression (0.0-1.0)
    pub iou_threshold: f32,

    /// Maximum number of faces to keep per frame
    pub max_faces: usize,

    /// Face box expansion before landmark regression, as a fraction of the box size
    pub bbox_expansion: f32,
}

/// Where the optical center of the camera comes from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OpticalCenter {
    /// Image center of the first processed frame, fixed afterwards
    FromFirstFrame,
    /// Explicit principal point in pixels
    Fixed {
        /// Horizontal coordinate
        x: f64,
        /// Vertical coordinate
        y: f64,
    },
}

/// Camera intrinsics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Focal length in pixels
    pub focal_length: f64,

    /// Optical center source
    pub optical_center: OpticalCenter,
}

/// Eye region and pupil finder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Eye ROI enlargement in percent of the left eye width
    pub roi_enlarge_percent: f64,

    /// Width eye patches are rescaled to before the pupil search
    pub fast_eye_width: u32,

    /// Gradient magnitude threshold, in standard deviations
    pub gradient_threshold: f64,

    /// Blur applied to the eye patch for darkness weighting
    pub weight_blur_sigma: f32,
}

/// Which PnP solver poses are computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    /// Pure-Rust Levenberg-Marquardt solver
    Iterative,
    /// `cv::solvePnP`, needs the `opencv` feature
    #[serde(rename = "opencv")]
    OpenCv,
}

impl Default for SolverBackend {
    fn default() -> Self {
        if cfg!(feature = "opencv") {
            Self::OpenCv
        } else {
            Self::Iterative
        }
    }
}

/// PnP solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Solver implementation
    pub backend: SolverBackend,

    /// Iteration cap before the solve is reported as not converged
    pub max_iterations: usize,

    /// Relative parameter step below which the solve has converged
    pub epsilon: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("assets/face_detector.onnx"),
            face_landmarks: PathBuf::from("assets/face_landmarks.onnx"),
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            iou_threshold: 0.5,
            max_faces: 10,
            bbox_expansion: 0.1,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            focal_length: DEFAULT_FOCAL_LENGTH,
            optical_center: OpticalCenter::FromFirstFrame,
        }
    }
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            roi_enlarge_percent: EYE_ROI_ENLARGE_FACTOR,
            fast_eye_width: DEFAULT_FAST_EYE_WIDTH,
            gradient_threshold: DEFAULT_GRADIENT_THRESHOLD,
            weight_blur_sigma: DEFAULT_WEIGHT_BLUR_SIGMA,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::default(),
            max_iterations: DEFAULT_PNP_MAX_ITERATIONS,
            epsilon: DEFAULT_PNP_EPSILON,
        }
    }
}

impl CameraConfig {
    /// Validate the intrinsics
    ///
    /// # Errors
    ///
    /// Returns an error if the focal length is not positive or the optical center is not finite
    pub fn validate(&self) -> Result<()> {
        if !self.focal_length.is_finite() || self.focal_length <= 0.0 {
            return Err(Error::ConfigError(format!(
                "Focal length must be positive, got {}",
                self.focal_length
            )));
        }
        if let OpticalCenter::Fixed { x, y } = self.optical_center {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::ConfigError("Optical center must be finite".to_string()));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values. Model files are checked when they are loaded.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.face_detection.confidence_threshold) {
            return Err(Error::ConfigError(
                "Confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.face_detection.iou_threshold) {
            return Err(Error::ConfigError("IOU threshold must be between 0.0 and 1.0".to_string()));
        }
        if self.face_detection.max_faces == 0 {
            return Err(Error::ConfigError("Maximum faces must be greater than 0".to_string()));
        }

        self.camera.validate()?;

        if !self.eyes.roi_enlarge_percent.is_finite() || self.eyes.roi_enlarge_percent < 0.0 {
            return Err(Error::ConfigError(
                "Eye ROI enlarge percentage must be non-negative".to_string(),
            ));
        }
        if self.eyes.fast_eye_width == 0 {
            return Err(Error::ConfigError("Fast eye width must be greater than 0".to_string()));
        }
        if !(self.eyes.weight_blur_sigma > 0.0) {
            return Err(Error::ConfigError("Weight blur sigma must be positive".to_string()));
        }

        if self.solver.backend == SolverBackend::OpenCv && !cfg!(feature = "opencv") {
            return Err(Error::ConfigError(
                "Solver backend 'opencv' requires the opencv feature".to_string(),
            ));
        }
        if self.solver.max_iterations == 0 {
            return Err(Error::ConfigError(
                "Solver iteration cap must be greater than 0".to_string(),
            ));
        }
        if !(self.solver.epsilon > 0.0) {
            return Err(Error::ConfigError("Solver epsilon must be positive".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Head Pose and Gaze Estimation Configuration

# Model paths
models:
  face_detector: "assets/face_detector.onnx"
  face_landmarks: "assets/face_landmarks.onnx"

# Face detection parameters
face_detection:
  confidence_threshold: 0.6
  iou_threshold: 0.5
  max_faces: 10
  bbox_expansion: 0.1

# Camera intrinsics
camera:
  focal_length: 455.0
  optical_center:
    mode: from_first_frame
  # optical_center:
  #   mode: fixed
  #   x: 320.0
  #   y: 240.0

# Eye regions and pupil search
eyes:
  roi_enlarge_percent: 25.0
  fast_eye_width: 50
  gradient_threshold: 50.0
  weight_blur_sigma: 1.0

# PnP solver
solver:
  # iterative (pure Rust) or opencv; defaults to opencv when built with it
  # backend: iterative
  max_iterations: 100
  epsilon: 1.0e-10
"#;
