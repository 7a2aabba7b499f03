//! 68-point facial landmark sets, named facial features and the canonical 3D head model.
//!
//! Landmark indices follow the iBUG 300-W annotation:
//! jaw 0-16, eyebrows 17-26, nose 27-35, eyes 36-47, mouth 48-67.

use crate::{
    constants::{EYE_CONTOUR_POINTS, NUM_FACIAL_LANDMARKS},
    error::IndexKind,
    geometry::midpoint,
    Error, Result,
};
use nalgebra::{Point2, Point3};

/// Named landmark positions used by the pose solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacialFeature {
    /// Jaw line start, next to the subject's right ear
    RightSide,
    /// Chin
    Menton,
    /// Jaw line end, next to the subject's left ear
    LeftSide,
    /// Inner end of the subject's right eyebrow
    EyebrowRight,
    /// Inner end of the subject's left eyebrow
    EyebrowLeft,
    /// Nose bridge, between the eyes
    Sellion,
    /// Nose tip
    Nose,
    /// Outer corner of the subject's right eye
    RightEye,
    /// Outer corner of the subject's left eye
    LeftEye,
    /// Corner of the mouth on the subject's right
    MouthRight,
    /// Top of the outer upper lip
    MouthUp,
    /// Corner of the mouth on the subject's left
    MouthLeft,
    /// Bottom of the outer lower lip
    MouthDown,
    /// Inner upper lip, center
    MouthCenterTop,
    /// Inner lower lip, center
    MouthCenterBottom,
}

impl FacialFeature {
    /// Every named feature
    pub const ALL: [Self; 15] = [
        Self::RightSide,
        Self::Menton,
        Self::LeftSide,
        Self::EyebrowRight,
        Self::EyebrowLeft,
        Self::Sellion,
        Self::Nose,
        Self::RightEye,
        Self::LeftEye,
        Self::MouthRight,
        Self::MouthUp,
        Self::MouthLeft,
        Self::MouthDown,
        Self::MouthCenterTop,
        Self::MouthCenterBottom,
    ];

    /// Position of this feature in a 68-point landmark set
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::RightSide => 0,
            Self::Menton => 8,
            Self::LeftSide => 16,
            Self::EyebrowRight => 21,
            Self::EyebrowLeft => 22,
            Self::Sellion => 27,
            Self::Nose => 30,
            Self::RightEye => 36,
            Self::LeftEye => 45,
            Self::MouthRight => 48,
            Self::MouthUp => 51,
            Self::MouthLeft => 54,
            Self::MouthDown => 57,
            Self::MouthCenterTop => 62,
            Self::MouthCenterBottom => 66,
        }
    }
}

/// One of the two eyes, named by the side of the image it appears on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    /// Contour points 36-41
    Left,
    /// Contour points 42-47
    Right,
}

impl Eye {
    /// Landmark indices of the eye contour, clockwise from the outer corner
    #[must_use]
    pub const fn contour_indices(self) -> [usize; EYE_CONTOUR_POINTS] {
        match self {
            Self::Left => [36, 37, 38, 39, 40, 41],
            Self::Right => [42, 43, 44, 45, 46, 47],
        }
    }
}

/// Ordered set of exactly 68 landmark points detected on one face
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point2<f64>>,
}

impl LandmarkSet {
    /// Wrap predicted landmark points.
    ///
    /// # Errors
    ///
    /// Returns an error if there are not exactly 68 points or a point is not finite
    pub fn new(points: Vec<Point2<f64>>) -> Result<Self> {
        if points.len() != NUM_FACIAL_LANDMARKS {
            return Err(Error::InvalidInput(format!(
                "Expected {} landmarks, got {}",
                NUM_FACIAL_LANDMARKS,
                points.len()
            )));
        }
        if let Some(i) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidInput(format!("Landmark {i} is not finite")));
        }
        Ok(Self { points })
    }

    /// Landmark at a raw position.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index >= 68`
    pub fn point(&self, index: usize) -> Result<Point2<f64>> {
        self.points.get(index).copied().ok_or(Error::IndexOutOfRange {
            kind: IndexKind::Landmark,
            index,
            len: self.points.len(),
        })
    }

    /// Landmark of a named feature
    #[must_use]
    pub fn feature(&self, feature: FacialFeature) -> Point2<f64> {
        // Construction guarantees 68 points and every feature index is below 68
        self.points[feature.index()]
    }

    /// The six contour points of one eye in image coordinates
    #[must_use]
    pub fn eye_contour(&self, eye: Eye) -> [Point2<f64>; EYE_CONTOUR_POINTS] {
        eye.contour_indices().map(|i| self.points[i])
    }

    /// All points in annotation order
    #[must_use]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }
}

/// Points of the canonical head model, in millimeters.
///
/// Head frame: origin at the sellion, x forward, y towards the subject's left, z up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelPoint {
    /// Deepest point of the nose bridge, the model origin
    Sellion,
    /// Outer corner of the right eye
    RightEye,
    /// Outer corner of the left eye
    LeftEye,
    /// In front of the right ear, matched to the jaw line start
    RightEar,
    /// In front of the left ear, matched to the jaw line end
    LeftEar,
    /// Bottom of the chin
    Menton,
    /// Nose tip
    Nose,
    /// Mouth center, between the lips
    Stommion,
}

impl ModelPoint {
    /// Position on an average adult head
    #[must_use]
    pub fn position(self) -> Point3<f64> {
        match self {
            Self::Sellion => Point3::new(0.0, 0.0, 0.0),
            Self::RightEye => Point3::new(-20.0, -65.5, -5.0),
            Self::LeftEye => Point3::new(-20.0, 65.5, -5.0),
            Self::RightEar => Point3::new(-100.0, -77.5, -6.0),
            Self::LeftEar => Point3::new(-100.0, 77.5, -6.0),
            Self::Nose => Point3::new(21.0, 0.0, -48.0),
            Self::Stommion => Point3::new(10.0, 0.0, -75.0),
            Self::Menton => Point3::new(0.0, 0.0, -133.0),
        }
    }

    /// Where this model point appears in a detected landmark set
    #[must_use]
    pub fn image_point(self, landmarks: &LandmarkSet) -> Point2<f64> {
        match self {
            Self::Sellion => landmarks.feature(FacialFeature::Sellion),
            Self::RightEye => landmarks.feature(FacialFeature::RightEye),
            Self::LeftEye => landmarks.feature(FacialFeature::LeftEye),
            Self::RightEar => landmarks.feature(FacialFeature::RightSide),
            Self::LeftEar => landmarks.feature(FacialFeature::LeftSide),
            Self::Menton => landmarks.feature(FacialFeature::Menton),
            Self::Nose => landmarks.feature(FacialFeature::Nose),
            Self::Stommion => midpoint(
                &landmarks.feature(FacialFeature::MouthCenterTop),
                &landmarks.feature(FacialFeature::MouthCenterBottom),
            ),
        }
    }
}

/// Model points handed to the PnP solver. Model and image point lists are both
/// built from this table, so their pairing cannot drift.
pub const PNP_CORRESPONDENCES: [ModelPoint; 8] = [
    ModelPoint::Sellion,
    ModelPoint::RightEye,
    ModelPoint::LeftEye,
    ModelPoint::RightEar,
    ModelPoint::LeftEar,
    ModelPoint::Menton,
    ModelPoint::Nose,
    ModelPoint::Stommion,
];

/// Canonical 3D points in correspondence order
#[must_use]
pub fn model_points() -> Vec<Point3<f64>> {
    PNP_CORRESPONDENCES.iter().map(|p| p.position()).collect()
}

/// Detected 2D points in correspondence order
#[must_use]
pub fn image_points(landmarks: &LandmarkSet) -> Vec<Point2<f64>> {
    PNP_CORRESPONDENCES.iter().map(|p| p.image_point(landmarks)).collect()
}
