//! Tests for ONNX model loading

#![cfg(feature = "onnx")]

use head_pose_gaze::{
    config::FaceDetectionConfig, face_detection::ScrfdFaceDetector, mark_detection::OnnxLandmarkPredictor, Config,
    Error, HeadPoseEstimation, Result,
};
use std::path::{Path, PathBuf};

fn missing_model(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("head_pose_gaze_missing_{}_{name}.onnx", std::process::id()))
}

/// A file that exists but is not an ONNX graph
fn corrupt_model(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("head_pose_gaze_corrupt_{}_{name}.onnx", std::process::id()));
    std::fs::write(&path, b"not an onnx model").unwrap();
    path
}

#[test]
fn test_estimator_with_missing_models_fails_to_load() {
    let mut config = Config::default();
    config.models.face_detector = missing_model("detector");
    config.models.face_landmarks = missing_model("landmarks");

    match HeadPoseEstimation::from_config(&config) {
        Err(Error::ModelLoadFailed(msg)) => assert!(msg.contains("head_pose_gaze_missing"), "{msg}"),
        Err(other) => panic!("Expected ModelLoadFailed, got {other:?}"),
        Ok(_) => panic!("Expected ModelLoadFailed, got an estimator"),
    }
}

#[test]
fn test_missing_face_detector_model() {
    let result = ScrfdFaceDetector::new(&missing_model("scrfd"), &FaceDetectionConfig::default());
    assert!(matches!(result, Err(Error::ModelLoadFailed(_))));
}

#[test]
fn test_missing_landmark_model() {
    let result = OnnxLandmarkPredictor::new(&missing_model("marks"), 0.1);
    assert!(matches!(result, Err(Error::ModelLoadFailed(_))));
}

#[test]
fn test_corrupt_landmark_model() {
    let path = corrupt_model("marks");
    let result = OnnxLandmarkPredictor::new(&path, 0.1);
    std::fs::remove_file(&path).ok();
    assert!(matches!(result, Err(Error::ModelLoadFailed(_))));
}

#[test]
#[ignore = "Requires ONNX models"]
fn test_load_bundled_models() -> Result<()> {
    let config = Config::default();
    assert!(Path::new(&config.models.face_detector).exists(), "Face detector model not found");
    assert!(Path::new(&config.models.face_landmarks).exists(), "Landmark model not found");

    let mut estimator = HeadPoseEstimation::from_config(&config)?;
    let frame = image::RgbImage::from_pixel(640, 480, image::Rgb([128, 128, 128]));
    assert_eq!(estimator.update(&frame), 0);
    Ok(())
}
