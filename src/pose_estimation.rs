//! Head pose estimation from facial landmarks using a `PnP` (Perspective-n-Point) solve.

use crate::{
    camera::CameraIntrinsics,
    constants::{
        DEFAULT_PNP_EPSILON, DEFAULT_PNP_MAX_ITERATIONS, EPSILON, INITIAL_ROTATION_GUESS, INITIAL_TRANSLATION_GUESS,
        MILLIMETERS_PER_METER, MIN_PNP_CORRESPONDENCES,
    },
    geometry::{to_homogeneous, truncate},
    landmarks::{image_points, model_points, LandmarkSet},
    Error, Result,
};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{
    storage::Owned, DVector, Dyn, Matrix3, Matrix4, OMatrix, Point2, Point3, Rotation3, Vector3, Vector4, Vector6, U6,
};

/// Rigid transform from the model frame to the camera frame, as produced by a `PnP` solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PnpSolution {
    /// Rotation vector (axis scaled by angle, radians)
    pub rotation: Vector3<f64>,
    /// Translation in model units (millimeters for the head model)
    pub translation: Vector3<f64>,
}

impl PnpSolution {
    /// Head roughly 1m in front of the camera, facing it
    #[must_use]
    pub fn initial_guess() -> Self {
        Self {
            rotation: Vector3::from(INITIAL_ROTATION_GUESS),
            translation: Vector3::from(INITIAL_TRANSLATION_GUESS),
        }
    }

    /// Rotation matrix through the Rodrigues (exponential map) expansion
    #[must_use]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        Rotation3::new(self.rotation).into_inner()
    }

    /// Map a model point into the camera frame
    #[must_use]
    pub fn transform(&self, point: &Point3<f64>) -> Point3<f64> {
        Rotation3::new(self.rotation) * point + self.translation
    }
}

/// Solves for the pose of a rigid model from paired 3D model points and 2D image points
pub trait PnpSolver {
    /// Find the model-to-camera transform, iterating from `guess`.
    ///
    /// `model_points[i]` must correspond to `image_points[i]`.
    ///
    /// # Errors
    ///
    /// Returns `PoseSolveFailed` if the correspondences are insufficient or degenerate,
    /// or if the solver does not converge
    fn solve(
        &self,
        model_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        guess: &PnpSolution,
    ) -> Result<PnpSolution>;
}

/// Check the generic `PnP` preconditions shared by all solvers
///
/// # Errors
///
/// Returns `PoseSolveFailed` describing the violated precondition
pub fn check_correspondences(model_points: &[Point3<f64>], image_points: &[Point2<f64>]) -> Result<()> {
    if model_points.len() != image_points.len() {
        return Err(Error::PoseSolveFailed(format!(
            "{} model points but {} image points",
            model_points.len(),
            image_points.len()
        )));
    }
    if model_points.len() < MIN_PNP_CORRESPONDENCES {
        return Err(Error::PoseSolveFailed(format!(
            "Need at least {} correspondences, got {}",
            MIN_PNP_CORRESPONDENCES,
            model_points.len()
        )));
    }
    let finite = model_points.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
        && image_points.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
    if !finite {
        return Err(Error::PoseSolveFailed("Non-finite correspondence".to_string()));
    }

    // Image points must span two dimensions: the smaller eigenvalue of their
    // scatter matrix vanishes when they are collinear or coincident
    #[allow(clippy::cast_precision_loss)]
    let n = image_points.len() as f64;
    let mean = image_points.iter().fold(Vector3::zeros(), |acc: Vector3<f64>, p| {
        acc + Vector3::new(p.x, p.y, 0.0)
    }) / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in image_points {
        let (dx, dy) = (p.x - mean.x, p.y - mean.y);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let trace = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    let discriminant = (trace * trace / 4.0 - det).max(0.0).sqrt();
    let largest = trace / 2.0 + discriminant;
    let smallest = trace / 2.0 - discriminant;
    if largest <= EPSILON || smallest <= largest * 1e-9 {
        return Err(Error::PoseSolveFailed(
            "Degenerate image points (collinear or coincident)".to_string(),
        ));
    }
    Ok(())
}

/// Reprojection error of a rigid model as a least-squares problem over the
/// stacked rotation vector and translation
struct ReprojectionProblem<'a> {
    model_points: &'a [Point3<f64>],
    image_points: &'a [Point2<f64>],
    camera: &'a CameraIntrinsics,
    params: Vector6<f64>,
}

impl ReprojectionProblem<'_> {
    /// Stacked (u, v) reprojection residuals, `None` if a point reaches the camera plane
    fn residuals_at(&self, params: &Vector6<f64>) -> Option<DVector<f64>> {
        let pose = to_solution(params);
        let mut out = DVector::zeros(2 * self.model_points.len());
        for (i, (model, observed)) in self.model_points.iter().zip(self.image_points).enumerate() {
            let projected = self.camera.project(&pose.transform(model))?;
            out[2 * i] = projected.x - observed.x;
            out[2 * i + 1] = projected.y - observed.y;
        }
        out.iter().all(|v| v.is_finite()).then_some(out)
    }
}

impl LeastSquaresProblem<f64, Dyn, U6> for ReprojectionProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U6>;
    type ParameterStorage = Owned<f64, U6>;

    fn set_params(&mut self, params: &Vector6<f64>) {
        self.params = *params;
    }

    fn params(&self) -> Vector6<f64> {
        self.params
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.params)
    }

    /// Central-difference Jacobian of the residuals
    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U6>> {
        let mut jac = OMatrix::<f64, Dyn, U6>::zeros(2 * self.model_points.len());
        for k in 0..6 {
            let h = 1e-6 * self.params[k].abs().max(1.0);
            let mut forward = self.params;
            let mut backward = self.params;
            forward[k] += h;
            backward[k] -= h;
            let r_plus = self.residuals_at(&forward)?;
            let r_minus = self.residuals_at(&backward)?;
            jac.set_column(k, &((r_plus - r_minus) / (2.0 * h)));
        }
        Some(jac)
    }
}

fn to_solution(params: &Vector6<f64>) -> PnpSolution {
    PnpSolution {
        rotation: params.fixed_rows::<3>(0).into_owned(),
        translation: params.fixed_rows::<3>(3).into_owned(),
    }
}

/// Levenberg-Marquardt minimisation of the reprojection error, starting from the
/// extrinsic guess
#[derive(Debug, Clone)]
pub struct IterativePnpSolver {
    max_iterations: usize,
    epsilon: f64,
}

impl Default for IterativePnpSolver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_PNP_MAX_ITERATIONS,
            epsilon: DEFAULT_PNP_EPSILON,
        }
    }
}

impl IterativePnpSolver {
    /// Create a solver with an iteration cap and a relative convergence threshold.
    ///
    /// The cap bounds the residual evaluations to `max_iterations * 7`, one
    /// round per parameter plus one.
    ///
    /// # Errors
    ///
    /// Returns an error if the cap is zero or epsilon is not positive
    pub fn new(max_iterations: usize, epsilon: f64) -> Result<Self> {
        if max_iterations == 0 {
            return Err(Error::InvalidInput("Iteration cap must be greater than 0".to_string()));
        }
        if !(epsilon > 0.0) {
            return Err(Error::InvalidInput(format!("Epsilon must be positive, got {epsilon}")));
        }
        Ok(Self {
            max_iterations,
            epsilon,
        })
    }
}

impl PnpSolver for IterativePnpSolver {
    fn solve(
        &self,
        model_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        guess: &PnpSolution,
    ) -> Result<PnpSolution> {
        check_correspondences(model_points, image_points)?;

        let problem = ReprojectionProblem {
            model_points,
            image_points,
            camera,
            params: Vector6::new(
                guess.rotation.x,
                guess.rotation.y,
                guess.rotation.z,
                guess.translation.x,
                guess.translation.y,
                guess.translation.z,
            ),
        };
        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.epsilon)
            .with_xtol(self.epsilon)
            .with_patience(self.max_iterations)
            .minimize(problem);

        match report.termination {
            reason if reason.was_successful() => {
                log::debug!(
                    "PnP converged after {} evaluations ({reason:?}), objective {:.3e}",
                    report.number_of_evaluations,
                    report.objective_function
                );
            }
            // Tolerances already at machine precision: the guess sits at a minimum
            TerminationReason::NoImprovementPossible(what) => {
                log::debug!("PnP stalled on {what}, objective {:.3e}", report.objective_function);
            }
            reason => {
                return Err(Error::PoseSolveFailed(format!(
                    "No convergence after {} evaluations: {reason:?}",
                    report.number_of_evaluations
                )));
            }
        }

        let solution = to_solution(&problem.params);
        let finite = problem.params.iter().all(|v| v.is_finite());
        if !finite || solution.translation.z <= 0.0 {
            return Err(Error::PoseSolveFailed("Solution places the head behind the camera".to_string()));
        }
        Ok(solution)
    }
}

/// Head position and orientation in the camera frame.
///
/// A 4x4 homogeneous transform from the head frame (meters; x forward, y left,
/// z up) to the camera frame (x right, y down, z along the optical axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    matrix: Matrix4<f64>,
}

/// Where the head is pointing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeRay {
    /// Head origin (sellion) in the camera frame, meters
    pub origin: Point3<f64>,
    /// Unit facing direction in the camera frame
    pub direction: Vector3<f64>,
    /// Intersection with the camera plane z = 0, `None` if the ray is parallel to it
    pub screen_point: Option<Point3<f64>>,
}

impl HeadPose {
    /// Assemble the pose from a solver result in millimeters
    #[must_use]
    pub fn from_solution(solution: &PnpSolution) -> Self {
        let rotation = solution.rotation_matrix();
        let translation = solution.translation / MILLIMETERS_PER_METER;
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        Self { matrix }
    }

    /// The 4x4 homogeneous matrix
    #[must_use]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// Rotation block
    #[must_use]
    pub fn rotation(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Translation in meters
    #[must_use]
    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Map a head-frame point (meters) into the camera frame
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        truncate(&(self.matrix * to_homogeneous(point)))
    }

    /// Project a head-frame point (meters) to pixels, e.g. to draw the head axes
    #[must_use]
    pub fn project(&self, point: &Point3<f64>, camera: &CameraIntrinsics) -> Option<Point2<f64>> {
        camera.project(&self.transform_point(point))
    }

    /// Facing direction of the head and where it meets the camera plane
    #[must_use]
    pub fn gaze(&self) -> GazeRay {
        let origin = Point3::from(self.translation());
        let forward = self.matrix * Vector4::new(1.0, 0.0, 0.0, 0.0);
        let direction = Vector3::new(forward.x, forward.y, forward.z).normalize();
        let screen_point = (direction.z.abs() > EPSILON).then(|| {
            let t = -origin.z / direction.z;
            origin + direction * t
        });
        GazeRay {
            origin,
            direction,
            screen_point,
        }
    }
}

/// Solve the head pose of one face.
///
/// # Errors
///
/// Returns `PoseSolveFailed` if the solver fails
pub fn solve_head_pose(
    landmarks: &LandmarkSet,
    camera: &CameraIntrinsics,
    solver: &dyn PnpSolver,
) -> Result<HeadPose> {
    let model = model_points();
    let detected = image_points(landmarks);
    let solution = solver.solve(&model, &detected, camera, &PnpSolution::initial_guess())?;
    log::debug!(
        "Head pose rvec = {:?}, tvec = {:?} mm",
        solution.rotation.as_slice(),
        solution.translation.as_slice()
    );
    Ok(HeadPose::from_solution(&solution))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::new(500.0, Point2::new(320.0, 240.0)).unwrap()
    }

    fn synthetic_problem(truth: &PnpSolution) -> (Vec<Point3<f64>>, Vec<Point2<f64>>) {
        let model = model_points();
        let image = model
            .iter()
            .map(|p| camera().project(&truth.transform(p)).unwrap())
            .collect();
        (model, image)
    }

    #[test]
    fn test_recovers_exact_pose() {
        let truth = PnpSolution {
            rotation: Vector3::new(1.1, 1.3, -1.15),
            translation: Vector3::new(40.0, -25.0, 750.0),
        };
        let (model, image) = synthetic_problem(&truth);
        let solved = IterativePnpSolver::default()
            .solve(&model, &image, &camera(), &PnpSolution::initial_guess())
            .unwrap();
        let trace = (solved.rotation_matrix().transpose() * truth.rotation_matrix()).trace();
        let angle = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos();
        assert!(angle.to_degrees() < 0.01, "rotation error {angle}");
        assert!((solved.translation - truth.translation).norm() < 0.01);
    }

    #[test]
    fn test_too_few_points() {
        let model = model_points();
        let image = vec![Point2::new(1.0, 2.0); 3];
        let err = IterativePnpSolver::default()
            .solve(&model[..3], &image, &camera(), &PnpSolution::initial_guess())
            .unwrap_err();
        assert!(matches!(err, Error::PoseSolveFailed(_)));
    }

    #[test]
    fn test_mismatched_lengths() {
        let model = model_points();
        let image = vec![Point2::new(1.0, 2.0); 5];
        assert!(check_correspondences(&model, &image).is_err());
    }

    #[test]
    fn test_collinear_image_points() {
        let model = model_points();
        #[allow(clippy::cast_precision_loss)]
        let image: Vec<_> = (0..8).map(|i| Point2::new(10.0 * i as f64, 5.0 * i as f64)).collect();
        assert!(matches!(
            check_correspondences(&model, &image),
            Err(Error::PoseSolveFailed(_))
        ));
        let same = vec![Point2::new(100.0, 100.0); 8];
        assert!(check_correspondences(&model, &same).is_err());
    }

    #[test]
    fn test_invalid_solver_parameters() {
        assert!(IterativePnpSolver::new(0, 1e-10).is_err());
        assert!(IterativePnpSolver::new(10, 0.0).is_err());
        assert!(IterativePnpSolver::new(10, 1e-8).is_ok());
    }

    #[test]
    fn test_pose_matrix_layout() {
        let solution = PnpSolution {
            rotation: Vector3::zeros(),
            translation: Vector3::new(100.0, -200.0, 1500.0),
        };
        let pose = HeadPose::from_solution(&solution);
        let m = pose.matrix();
        assert_eq!(pose.rotation(), Matrix3::identity());
        assert!((m[(0, 3)] - 0.1).abs() < 1e-12);
        assert!((m[(1, 3)] + 0.2).abs() < 1e-12);
        assert!((m[(2, 3)] - 1.5).abs() < 1e-12);
        assert_eq!([m[(3, 0)], m[(3, 1)], m[(3, 2)], m[(3, 3)]], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rodrigues_expansion() {
        let solution = PnpSolution {
            rotation: Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            translation: Vector3::zeros(),
        };
        let r = solution.rotation_matrix();
        let expected = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!((r - expected).norm() < 1e-12);
    }

    #[test]
    fn test_initial_guess_faces_camera() {
        // The guess maps the head's forward axis roughly onto -z (towards the camera)
        let r = PnpSolution::initial_guess().rotation_matrix();
        let forward = r * Vector3::x();
        assert!(forward.z < -0.9);
    }

    #[test]
    fn test_gaze_of_frontal_head() {
        let solution = PnpSolution {
            rotation: Vector3::from(INITIAL_ROTATION_GUESS).normalize() * (2.0 * std::f64::consts::FRAC_PI_3),
            translation: Vector3::new(50.0, 0.0, 800.0),
        };
        let gaze = HeadPose::from_solution(&solution).gaze();
        assert!((gaze.origin - Point3::new(0.05, 0.0, 0.8)).norm() < 1e-12);
        assert!((gaze.direction - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-9);
        let screen = gaze.screen_point.unwrap();
        assert!(screen.z.abs() < 1e-9);
        assert!((screen.x - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_transform_and_project() {
        let solution = PnpSolution {
            rotation: Vector3::zeros(),
            translation: Vector3::new(0.0, 0.0, 1000.0),
        };
        let pose = HeadPose::from_solution(&solution);
        let p = pose.transform_point(&Point3::new(0.1, 0.0, 0.0));
        assert!((p - Point3::new(0.1, 0.0, 1.0)).norm() < 1e-12);
        let pixel = pose.project(&Point3::new(0.1, 0.0, 0.0), &camera()).unwrap();
        assert!((pixel - Point2::new(370.0, 240.0)).norm() < 1e-9);
    }
}
