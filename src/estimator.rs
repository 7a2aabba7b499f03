//! Per-frame head pose and gaze estimation over detected faces.

use crate::{
    camera::{CameraIntrinsics, CameraModel},
    config::{Config, SolverBackend, SolverConfig},
    detection::{FaceDetector, FaceRegion, LandmarkPredictor},
    error::IndexKind,
    eye_center::GradientEyeCenterFinder,
    eye_roi::EyeRegions,
    landmarks::{FacialFeature, LandmarkSet},
    pose_estimation::{solve_head_pose, HeadPose, IterativePnpSolver, PnpSolver},
    pupil::{EyeCenterFinder, PupilLocator, PupilPositions},
    Error, Result,
};
use image::{imageops, RgbImage};
use nalgebra::Point2;

/// Everything known about one face of the last processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    /// Detector output
    pub region: FaceRegion,
    /// Predicted landmarks
    pub landmarks: LandmarkSet,
    /// Pupil positions relative to the eye boxes, `None` if they could not be located
    pub pupils: Option<PupilPositions>,
}

/// Head pose and gaze estimator.
///
/// Holds the faces of the most recent frame; every [`update`](Self::update)
/// replaces them entirely. Faces are addressed by their position in the
/// detector's output.
pub struct HeadPoseEstimation {
    detector: Box<dyn FaceDetector>,
    predictor: Box<dyn LandmarkPredictor>,
    pupil_locator: PupilLocator,
    solver: Box<dyn PnpSolver>,
    camera: CameraModel,
    faces: Vec<FaceObservation>,
}

impl HeadPoseEstimation {
    /// Create an estimator around a face detector and a landmark predictor.
    ///
    /// Pupils are located with [`GradientEyeCenterFinder`], tuned from `config`.
    /// Poses are solved with the backend named by `config.solver.backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(
        detector: Box<dyn FaceDetector>,
        predictor: Box<dyn LandmarkPredictor>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let finder = GradientEyeCenterFinder::new(
            config.eyes.fast_eye_width,
            config.eyes.gradient_threshold,
            config.eyes.weight_blur_sigma,
        )?;
        let solver = pnp_solver(&config.solver)?;
        let camera = CameraModel::from_config(&config.camera)?;

        log::info!(
            "Head pose estimator ready (focal length {}, eye ROI enlargement {}%, {:?} PnP solver)",
            config.camera.focal_length,
            config.eyes.roi_enlarge_percent,
            config.solver.backend
        );

        Ok(Self {
            detector,
            predictor,
            pupil_locator: PupilLocator::new(Box::new(finder), config.eyes.roi_enlarge_percent),
            solver,
            camera,
            faces: Vec::new(),
        })
    }

    /// Load the ONNX face detector and landmark model named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadFailed` if a model cannot be loaded, or an error if the
    /// configuration is invalid
    #[cfg(feature = "onnx")]
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::{face_detection::ScrfdFaceDetector, mark_detection::OnnxLandmarkPredictor};

        config.validate()?;
        let detector = ScrfdFaceDetector::new(&config.models.face_detector, &config.face_detection)?;
        let predictor =
            OnnxLandmarkPredictor::new(&config.models.face_landmarks, config.face_detection.bbox_expansion)?;
        Self::new(Box::new(detector), Box::new(predictor), config)
    }

    /// Replace the pupil finder
    #[must_use]
    pub fn with_eye_center_finder(mut self, finder: Box<dyn EyeCenterFinder>) -> Self {
        self.pupil_locator = PupilLocator::new(finder, self.pupil_locator.enlarge_percent());
        self
    }

    /// Replace the `PnP` solver
    #[must_use]
    pub fn with_pnp_solver(mut self, solver: Box<dyn PnpSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Process one frame and return the number of faces found.
    ///
    /// Detection failures yield zero faces and a face whose landmarks cannot be
    /// predicted is dropped; neither is an error.
    pub fn update(&mut self, image: &RgbImage) -> usize {
        let (width, height) = image.dimensions();
        if let Err(e) = self.camera.observe_frame(width, height) {
            log::warn!("Cannot derive camera intrinsics from a {width}x{height} frame: {e}");
        }

        let regions = match self.detector.detect(image) {
            Ok(regions) => regions,
            Err(e) => {
                log::warn!("Face detection failed: {e}");
                Vec::new()
            }
        };

        let gray = imageops::grayscale(image);
        let mut faces = Vec::with_capacity(regions.len());
        for (index, region) in regions.into_iter().enumerate() {
            let landmarks = match self
                .predictor
                .predict(image, &region)
                .and_then(LandmarkSet::new)
            {
                Ok(landmarks) => landmarks,
                Err(e) if e.is_per_face() => {
                    log::warn!("Dropping face {index}: {e}");
                    continue;
                }
                Err(e) => {
                    log::error!("Landmark prediction failed for face {index}: {e}");
                    continue;
                }
            };
            let pupils = match self.pupil_locator.pupils_relative_pose(&gray, &landmarks) {
                Ok(pupils) => Some(pupils),
                Err(e) => {
                    log::warn!("No pupil positions for face {index}: {e}");
                    None
                }
            };
            faces.push(FaceObservation {
                region,
                landmarks,
                pupils,
            });
        }

        log::debug!("Frame {width}x{height}: {} face(s)", faces.len());
        self.faces = faces;
        self.faces.len()
    }

    /// Faces of the last processed frame
    #[must_use]
    pub fn faces(&self) -> &[FaceObservation] {
        &self.faces
    }

    /// Number of faces in the last processed frame
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Camera intrinsics, once resolved
    #[must_use]
    pub fn camera(&self) -> Option<&CameraIntrinsics> {
        self.camera.intrinsics()
    }

    /// Observation of one face.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `face_idx` is not below the face count
    pub fn face(&self, face_idx: usize) -> Result<&FaceObservation> {
        self.faces.get(face_idx).ok_or(Error::IndexOutOfRange {
            kind: IndexKind::Face,
            index: face_idx,
            len: self.faces.len(),
        })
    }

    /// Solve the head pose of one face. Poses are never cached.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for a bad index and `PoseSolveFailed` if the solve fails
    pub fn pose(&self, face_idx: usize) -> Result<HeadPose> {
        let face = self.face(face_idx)?;
        let camera = self
            .camera
            .intrinsics()
            .ok_or_else(|| Error::PoseSolveFailed("Camera optical center not resolved".to_string()))?;
        solve_head_pose(&face.landmarks, camera, self.solver.as_ref())
    }

    /// Poses of all faces in index order, each solved independently
    #[must_use]
    pub fn poses(&self) -> Vec<Result<HeadPose>> {
        (0..self.faces.len())
            .map(|i| {
                let pose = self.pose(i);
                if let Err(e) = &pose {
                    log::warn!("Face {i}: {e}");
                }
                pose
            })
            .collect()
    }

    /// Image coordinates of a named landmark of one face.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if the face or landmark does not exist
    pub fn coords_of(&self, face_idx: usize, feature: FacialFeature) -> Result<Point2<f64>> {
        self.face(face_idx)?.landmarks.point(feature.index())
    }

    /// Pupil positions of one face relative to its eye boxes.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for a bad index
    pub fn pupils(&self, face_idx: usize) -> Result<Option<PupilPositions>> {
        Ok(self.face(face_idx)?.pupils)
    }

    /// Eye regions of one face, for overlays.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for a bad index
    pub fn eye_regions(&self, face_idx: usize) -> Result<EyeRegions> {
        self.pupil_locator.eye_regions(&self.face(face_idx)?.landmarks)
    }
}

/// Build the configured `PnP` solver
fn pnp_solver(config: &SolverConfig) -> Result<Box<dyn PnpSolver>> {
    match config.backend {
        SolverBackend::Iterative => Ok(Box::new(IterativePnpSolver::new(
            config.max_iterations,
            config.epsilon,
        )?)),
        #[cfg(feature = "opencv")]
        SolverBackend::OpenCv => Ok(Box::new(crate::opencv_backend::OpenCvPnpSolver)),
        #[cfg(not(feature = "opencv"))]
        SolverBackend::OpenCv => Err(Error::ConfigError(
            "Solver backend 'opencv' requires the opencv feature".to_string(),
        )),
    }
}
