//! Pinhole camera intrinsics.

use crate::{
    config::{CameraConfig, OpticalCenter},
    constants::CAMERA_CENTER_FACTOR,
    Error, Result,
};
use nalgebra::{Matrix3, Point2, Point3};

/// Focal length and optical center of an undistorted pinhole camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    focal_length: f64,
    center: Point2<f64>,
}

impl CameraIntrinsics {
    /// Create intrinsics from a focal length (pixels) and an optical center.
    ///
    /// # Errors
    ///
    /// Returns an error if the focal length is not positive or a value is not finite
    pub fn new(focal_length: f64, center: Point2<f64>) -> Result<Self> {
        if !focal_length.is_finite() || focal_length <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "Focal length must be positive, got {focal_length}"
            )));
        }
        if !center.x.is_finite() || !center.y.is_finite() {
            return Err(Error::InvalidInput("Optical center must be finite".to_string()));
        }
        Ok(Self { focal_length, center })
    }

    /// Intrinsics with the optical center at the middle of a `width` x `height` frame
    ///
    /// # Errors
    ///
    /// Returns an error if the focal length is invalid
    pub fn centered(focal_length: f64, width: u32, height: u32) -> Result<Self> {
        // Integer halving: the center of a 641 pixel wide frame is 320
        let center = Point2::new(
            f64::from(width / CAMERA_CENTER_FACTOR),
            f64::from(height / CAMERA_CENTER_FACTOR),
        );
        Self::new(focal_length, center)
    }

    /// Focal length in pixels
    #[must_use]
    pub fn focal_length(&self) -> f64 {
        self.focal_length
    }

    /// Optical center in pixels
    #[must_use]
    pub fn center(&self) -> Point2<f64> {
        self.center
    }

    /// Projection matrix `[[f, 0, cx], [0, f, cy], [0, 0, 1]]`
    #[must_use]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal_length, 0.0, self.center.x,
            0.0, self.focal_length, self.center.y,
            0.0, 0.0, 1.0,
        )
    }

    /// Project a point given in the camera frame onto the image plane.
    ///
    /// Returns `None` for points on the camera plane (z = 0).
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        if point.z == 0.0 {
            return None;
        }
        Some(Point2::new(
            self.focal_length * point.x / point.z + self.center.x,
            self.focal_length * point.y / point.z + self.center.y,
        ))
    }
}

/// Camera intrinsics that may still be waiting for the first frame
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    focal_length: f64,
    intrinsics: Option<CameraIntrinsics>,
}

impl CameraModel {
    /// Build the camera from configuration. A fixed optical center resolves immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn from_config(config: &CameraConfig) -> Result<Self> {
        config.validate()?;
        let intrinsics = match config.optical_center {
            OpticalCenter::Fixed { x, y } => Some(CameraIntrinsics::new(config.focal_length, Point2::new(x, y))?),
            OpticalCenter::FromFirstFrame => None,
        };
        Ok(Self {
            focal_length: config.focal_length,
            intrinsics,
        })
    }

    /// Resolve the optical center from a frame size unless it is already known.
    /// Later frames never move it.
    ///
    /// # Errors
    ///
    /// Returns an error if the intrinsics cannot be built
    pub fn observe_frame(&mut self, width: u32, height: u32) -> Result<&CameraIntrinsics> {
        if self.intrinsics.is_none() {
            let intrinsics = CameraIntrinsics::centered(self.focal_length, width, height)?;
            log::info!(
                "Setting the optical center to ({}, {})",
                intrinsics.center().x,
                intrinsics.center().y
            );
            self.intrinsics = Some(intrinsics);
        }
        self.intrinsics
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("Camera intrinsics unresolved".to_string()))
    }

    /// Resolved intrinsics, `None` before the first frame when deriving the center
    #[must_use]
    pub fn intrinsics(&self) -> Option<&CameraIntrinsics> {
        self.intrinsics.as_ref()
    }
}
