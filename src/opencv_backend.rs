//! `OpenCV` collaborators: `solvePnP` and a Haar cascade face detector.

use crate::{
    camera::CameraIntrinsics,
    detection::{FaceDetector, FaceRegion},
    geometry::Rect,
    pose_estimation::{check_correspondences, PnpSolution, PnpSolver},
    utils::image_conversion::{
        gray_image_to_mat, mat_to_vector3, matrix3_to_mat, points2_to_mat, points3_to_mat, vector3_to_mat,
    },
    Error, Result,
};
use image::{imageops, RgbImage};
use nalgebra::{Point2, Point3};
use opencv::{
    calib3d,
    core::{Mat, Rect as CvRect, Size, Vector, CV_64F},
    objdetect::{self, CascadeClassifier},
    prelude::*,
};
use std::path::Path;

/// `PnP` through `cv::solvePnP` (iterative, seeded with the extrinsic guess, no distortion)
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvPnpSolver;

impl PnpSolver for OpenCvPnpSolver {
    fn solve(
        &self,
        model_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        guess: &PnpSolution,
    ) -> Result<PnpSolution> {
        check_correspondences(model_points, image_points)?;

        let object = points3_to_mat(model_points)?;
        let image = points2_to_mat(image_points)?;
        let camera_matrix = matrix3_to_mat(&camera.matrix())?;
        let dist_coeffs = Mat::zeros(4, 1, CV_64F)?.to_mat()?;
        let mut rvec = vector3_to_mat(&guess.rotation)?;
        let mut tvec = vector3_to_mat(&guess.translation)?;

        let solved = calib3d::solve_pnp(
            &object,
            &image,
            &camera_matrix,
            &dist_coeffs,
            &mut rvec,
            &mut tvec,
            true,
            calib3d::SOLVEPNP_ITERATIVE,
        )?;
        if !solved {
            return Err(Error::PoseSolveFailed("solvePnP did not converge".to_string()));
        }

        let solution = PnpSolution {
            rotation: mat_to_vector3(&rvec)?,
            translation: mat_to_vector3(&tvec)?,
        };
        let finite = solution.rotation.iter().chain(solution.translation.iter()).all(|v| v.is_finite());
        if !finite || solution.translation.z <= 0.0 {
            return Err(Error::PoseSolveFailed(format!(
                "solvePnP returned an unusable pose {:?}",
                solution.translation.as_slice()
            )));
        }
        Ok(solution)
    }
}

/// Viola-Jones face detector
pub struct CascadeFaceDetector {
    classifier: CascadeClassifier,
    min_face_size: i32,
}

impl CascadeFaceDetector {
    /// Load a Haar cascade, e.g. `haarcascade_frontalface_default.xml`.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadFailed` if the cascade cannot be loaded
    pub fn new(cascade_path: &Path, min_face_size: i32) -> Result<Self> {
        log::info!("Loading face cascade: {}", cascade_path.display());
        let path = cascade_path.to_string_lossy();
        let classifier = CascadeClassifier::new(&path)
            .map_err(|e| Error::ModelLoadFailed(format!("{}: {e}", cascade_path.display())))?;
        if classifier.empty()? {
            return Err(Error::ModelLoadFailed(format!(
                "Empty cascade: {}",
                cascade_path.display()
            )));
        }
        Ok(Self {
            classifier,
            min_face_size,
        })
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>> {
        let gray = gray_image_to_mat(&imageops::grayscale(image))?;
        let mut faces = Vector::<CvRect>::new();
        self.classifier.detect_multi_scale(
            &gray,
            &mut faces,
            1.1,
            3,
            objdetect::CASCADE_SCALE_IMAGE,
            Size::new(self.min_face_size, self.min_face_size),
            Size::new(0, 0),
        )?;

        // Largest faces first, the cascade reports no confidence
        let mut regions: Vec<FaceRegion> = faces
            .iter()
            .map(|r| FaceRegion {
                bbox: Rect::new(r.x, r.y, r.width, r.height),
                score: 1.0,
            })
            .collect();
        regions.sort_by_key(|f| std::cmp::Reverse(i64::from(f.bbox.width) * i64::from(f.bbox.height)));
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        landmarks::model_points,
        pose_estimation::{IterativePnpSolver, PnpSolver},
    };
    use nalgebra::Vector3;

    #[test]
    fn test_matches_iterative_solver() {
        let camera = CameraIntrinsics::new(600.0, Point2::new(320.0, 240.0)).unwrap();
        let truth = PnpSolution {
            rotation: Vector3::new(1.15, 1.25, -1.2),
            translation: Vector3::new(-30.0, 20.0, 900.0),
        };
        let model = model_points();
        let image: Vec<_> = model
            .iter()
            .map(|p| camera.project(&truth.transform(p)).unwrap())
            .collect();

        let guess = PnpSolution::initial_guess();
        let cv = OpenCvPnpSolver.solve(&model, &image, &camera, &guess).unwrap();
        let lm = IterativePnpSolver::default().solve(&model, &image, &camera, &guess).unwrap();
        assert!((cv.translation - lm.translation).norm() < 0.1);
        assert!((cv.rotation_matrix() - lm.rotation_matrix()).norm() < 1e-3);
    }

    #[test]
    fn test_missing_cascade() {
        assert!(matches!(
            CascadeFaceDetector::new(Path::new("/nonexistent/cascade.xml"), 30),
            Err(Error::ModelLoadFailed(_))
        ));
    }
}
