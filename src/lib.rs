//! Head pose and pupil-relative gaze estimation from 68-point facial landmarks.
//!
//! The estimation pipeline consists of:
//! 1. Face detection to locate faces in the frame
//! 2. Facial landmark prediction to find 68 key points per face
//! 3. Pupil localisation inside each eye, normalised to the eye box
//! 4. Head pose estimation using a `PnP` (Perspective-n-Point) solve against a
//!    canonical 3D head model, returned as a 4x4 transform
//!
//! Detection and landmark prediction are collaborators behind the
//! [`FaceDetector`] and [`LandmarkPredictor`] traits. With the `onnx` feature
//! they are provided by ONNX Runtime models; with the `opencv` feature an
//! `OpenCV` cascade detector and `solvePnP` solver are available as well.
//!
//! # Examples
//!
//! ```no_run
//! use head_pose_gaze::{Config, FacialFeature, HeadPoseEstimation};
//!
//! # #[cfg(feature = "onnx")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("config.yaml")?;
//! let mut estimator = HeadPoseEstimation::from_config(&config)?;
//!
//! let frame = image::open("face.jpg")?.to_rgb8();
//! let faces = estimator.update(&frame);
//!
//! for (i, pose) in estimator.poses().into_iter().enumerate() {
//!     match pose {
//!         Ok(pose) => {
//!             let t = pose.translation();
//!             println!("Face {i}: head at ({:.3}, {:.3}, {:.3}) m", t.x, t.y, t.z);
//!         }
//!         Err(e) => println!("Face {i}: {e}"),
//!     }
//! }
//!
//! if faces > 0 {
//!     let nose = estimator.coords_of(0, FacialFeature::Nose)?;
//!     println!("Nose tip at ({:.1}, {:.1})", nose.x, nose.y);
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "onnx"))]
//! # fn main() {}
//! ```

/// Pinhole camera intrinsics
pub mod camera;

/// Configuration management
pub mod config;

/// Constants used throughout the library
pub mod constants;

/// Face detector and landmark predictor traits
pub mod detection;

/// Error types and result handling
pub mod error;

/// Per-frame estimator over detected faces
pub mod estimator;

/// Gradient-based eye center finder
pub mod eye_center;

/// Eye regions of interest
pub mod eye_roi;

/// Integer rectangles and point conversions
pub mod geometry;

/// Landmark sets, named features and the canonical head model
pub mod landmarks;

/// Head pose estimation module using `PnP` algorithm
pub mod pose_estimation;

/// Eye masks and pupil normalisation
pub mod pupil;

/// Utility functions for numeric conversions
pub mod utils;

/// SCRFD face detection on ONNX Runtime
#[cfg(feature = "onnx")]
pub mod face_detection;

/// Facial landmark regression on ONNX Runtime
#[cfg(feature = "onnx")]
pub mod mark_detection;

/// `OpenCV` solver and detector
#[cfg(feature = "opencv")]
pub mod opencv_backend;

pub use camera::CameraIntrinsics;
pub use config::{Config, OpticalCenter};
pub use detection::{FaceDetector, FaceRegion, LandmarkPredictor};
pub use error::{Error, Result};
pub use estimator::{FaceObservation, HeadPoseEstimation};
pub use landmarks::{FacialFeature, LandmarkSet};
pub use pose_estimation::{GazeRay, HeadPose, IterativePnpSolver, PnpSolution, PnpSolver};
pub use pupil::{EyeCenterFinder, PupilPositions};
