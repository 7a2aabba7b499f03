//! Error handling tests for all modules

use head_pose_gaze::{
    camera::{CameraIntrinsics, CameraModel},
    config::{CameraConfig, EXAMPLE_CONFIG},
    error::IndexKind,
    eye_center::GradientEyeCenterFinder,
    geometry::Rect,
    pose_estimation::{IterativePnpSolver, PnpSolution, PnpSolver},
    pupil::normalize_pupil,
    utils::safe_cast::*,
    Config, Error, FacialFeature, LandmarkSet, OpticalCenter,
};
use nalgebra::{Point2, Point3};

#[test]
fn test_landmark_set_validation() {
    let result = LandmarkSet::new(vec![Point2::origin(); 67]);
    match result {
        Err(Error::InvalidInput(msg)) => assert!(msg.contains("68")),
        other => panic!("Expected InvalidInput, got {other:?}"),
    }

    let mut points = vec![Point2::origin(); 68];
    points[12] = Point2::new(f64::NAN, 0.0);
    assert!(LandmarkSet::new(points).is_err());

    let landmarks = LandmarkSet::new(vec![Point2::origin(); 68]).unwrap();
    assert!(matches!(
        landmarks.point(68),
        Err(Error::IndexOutOfRange {
            kind: IndexKind::Landmark,
            index: 68,
            len: 68
        })
    ));
    assert!(landmarks.point(FacialFeature::MouthCenterBottom.index()).is_ok());
}

#[test]
fn test_error_messages() {
    let err = Error::IndexOutOfRange {
        kind: IndexKind::Landmark,
        index: 70,
        len: 68,
    };
    assert_eq!(err.to_string(), "landmark index 70 out of range (have 68)");
    assert_eq!(
        Error::PoseSolveFailed("degenerate".to_string()).to_string(),
        "Pose solve failed: degenerate"
    );
    assert!(Error::PoseSolveFailed(String::new()).is_per_face());
    assert!(!Error::ModelLoadFailed(String::new()).is_per_face());
}

#[test]
fn test_solver_input_errors() {
    let camera = CameraIntrinsics::new(500.0, Point2::new(320.0, 240.0)).unwrap();
    let solver = IterativePnpSolver::default();
    let guess = PnpSolution::initial_guess();

    let model = vec![Point3::new(0.0, 0.0, 0.0); 3];
    let image = vec![Point2::new(0.0, 0.0); 3];
    assert!(matches!(
        solver.solve(&model, &image, &camera, &guess),
        Err(Error::PoseSolveFailed(_))
    ));

    let model = vec![Point3::new(1.0, 2.0, 3.0); 6];
    let mut image: Vec<_> = (0..6).map(|i| Point2::new(f64::from(i * 7 % 5), f64::from(i))).collect();
    image[2].y = f64::INFINITY;
    assert!(matches!(
        solver.solve(&model, &image, &camera, &guess),
        Err(Error::PoseSolveFailed(_))
    ));
}

#[test]
fn test_config_file_errors() {
    assert!(matches!(
        Config::from_file("/nonexistent/config.yaml"),
        Err(Error::Io(_))
    ));
    assert!(matches!(
        Config::from_yaml("camera:\n  optical_center:\n    mode: sideways\n"),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn test_config_file_roundtrip() {
    let path = std::env::temp_dir().join(format!("head_pose_gaze_config_{}.yaml", std::process::id()));
    let mut config = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
    config.camera.optical_center = OpticalCenter::Fixed { x: 311.0, y: 222.0 };
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.camera.optical_center, OpticalCenter::Fixed { x: 311.0, y: 222.0 });
    assert!((loaded.camera.focal_length - config.camera.focal_length).abs() < f64::EPSILON);
}

#[test]
fn test_camera_errors() {
    let config = CameraConfig {
        focal_length: f64::NAN,
        optical_center: OpticalCenter::FromFirstFrame,
    };
    assert!(matches!(CameraModel::from_config(&config), Err(Error::ConfigError(_))));
    assert!(CameraIntrinsics::new(500.0, Point2::new(f64::INFINITY, 0.0)).is_err());
}

#[test]
fn test_pupil_errors() {
    assert!(normalize_pupil(&Point2::new(1.0, 1.0), &Rect::new(0, 0, 10, 0)).is_err());
    assert!(GradientEyeCenterFinder::new(0, 50.0, 1.0).is_err());
}

#[test]
fn test_safe_cast_errors() {
    assert!(usize_to_i32(usize::MAX).is_err());
    assert!(u32_to_i32(u32::MAX).is_err());
    assert!(i32_to_u32(-1).is_err());
    assert!(f64_to_i32(f64::NAN).is_err());
    assert_eq!(floor_to_i32(-0.5).unwrap(), -1);
    assert_eq!(ceil_to_i32(0.1).unwrap(), 1);
}
