//! Geometric helpers: integer pixel rectangles and conversions between 2D, 3D and
//! homogeneous point representations.

use crate::{
    utils::safe_cast::{ceil_to_i32, floor_to_i32},
    Result,
};
use nalgebra::{Point2, Point3, Vector2, Vector4};

/// Axis-aligned rectangle in integer pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// Create a rectangle from its top-left corner and size
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest integer rectangle spanning two (unordered) corners.
    ///
    /// # Errors
    ///
    /// Returns an error if a coordinate is not finite or overflows i32
    pub fn from_corners(a: Point2<f64>, b: Point2<f64>) -> Result<Self> {
        let x0 = floor_to_i32(a.x.min(b.x))?;
        let y0 = floor_to_i32(a.y.min(b.y))?;
        let x1 = ceil_to_i32(a.x.max(b.x))?;
        let y1 = ceil_to_i32(a.y.max(b.y))?;
        Ok(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Grow the rectangle by `margin` pixels on all four sides.
    ///
    /// Fractional margins are snapped outward so the result always contains
    /// the original rectangle grown by the exact margin.
    ///
    /// # Errors
    ///
    /// Returns an error if the margin is not finite or the result overflows i32
    pub fn enlarged(&self, margin: f64) -> Result<Self> {
        let x0 = floor_to_i32(f64::from(self.x) - margin)?;
        let y0 = floor_to_i32(f64::from(self.y) - margin)?;
        let x1 = ceil_to_i32(f64::from(self.x) + f64::from(self.width) + margin)?;
        let y1 = ceil_to_i32(f64::from(self.y) + f64::from(self.height) + margin)?;
        Ok(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Top-left corner in image coordinates
    #[must_use]
    pub fn top_left(&self) -> Point2<f64> {
        Point2::new(f64::from(self.x), f64::from(self.y))
    }

    /// Bottom-right corner in image coordinates
    #[must_use]
    pub fn bottom_right(&self) -> Point2<f64> {
        Point2::new(f64::from(self.x + self.width), f64::from(self.y + self.height))
    }

    /// Width and height as a vector
    #[must_use]
    pub fn size(&self) -> Vector2<f64> {
        Vector2::new(f64::from(self.width), f64::from(self.height))
    }

    /// Whether the rectangle covers no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Convert an image point into this rectangle's local frame
    #[must_use]
    pub fn to_local(&self, point: &Point2<f64>) -> Point2<f64> {
        Point2::from(point - self.top_left())
    }

    /// Convert a point in this rectangle's local frame back to image coordinates
    #[must_use]
    pub fn to_image(&self, local: &Point2<f64>) -> Point2<f64> {
        self.top_left() + local.coords
    }

    /// Whether a local-frame point lies inside `[0, width] x [0, height]`
    #[must_use]
    pub fn contains_local(&self, local: &Point2<f64>) -> bool {
        (0.0..=f64::from(self.width)).contains(&local.x) && (0.0..=f64::from(self.height)).contains(&local.y)
    }
}

/// Midpoint of two image points
#[must_use]
pub fn midpoint(a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    nalgebra::center(a, b)
}

/// Homogeneous coordinates of a 3D point
#[must_use]
pub fn to_homogeneous(point: &Point3<f64>) -> Vector4<f64> {
    point.to_homogeneous()
}

/// Drop the homogeneous coordinate without normalizing (for affine poses, where w is 1)
#[must_use]
pub fn truncate(coords: &Vector4<f64>) -> Point3<f64> {
    Point3::new(coords[0], coords[1], coords[2])
}

/// Nearest integer pixel of a point
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Rounded pixel coordinates are small
pub fn to_pixel(point: &Point2<f64>) -> (i32, i32) {
    (point.x.round() as i32, point.y.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_normalizes_order() {
        let rect = Rect::from_corners(Point2::new(40.0, 30.0), Point2::new(10.0, 20.0)).unwrap();
        assert_eq!(rect, Rect::new(10, 20, 30, 10));
    }

    #[test]
    fn test_from_corners_snaps_outward() {
        let rect = Rect::from_corners(Point2::new(10.4, 20.6), Point2::new(39.2, 29.5)).unwrap();
        assert_eq!(rect, Rect::new(10, 20, 30, 10));
    }

    #[test]
    fn test_enlarged_by_integral_margin() {
        let rect = Rect::new(10, 20, 30, 10).enlarged(5.0).unwrap();
        assert_eq!(rect, Rect::new(5, 15, 40, 20));
    }

    #[test]
    fn test_enlarged_by_zero_is_identity() {
        let rect = Rect::new(-3, 7, 12, 4);
        assert_eq!(rect.enlarged(0.0).unwrap(), rect);
    }

    #[test]
    fn test_enlarged_fractional_margin_contains_exact_growth() {
        let rect = Rect::new(10, 10, 20, 8).enlarged(0.3).unwrap();
        assert!(f64::from(rect.x) <= 9.7);
        assert!(f64::from(rect.x + rect.width) >= 30.3);
        assert!(f64::from(rect.y + rect.height) >= 18.3);
    }

    #[test]
    fn test_enlarged_rejects_nan() {
        assert!(Rect::new(0, 0, 1, 1).enlarged(f64::NAN).is_err());
    }

    #[test]
    fn test_local_round_trip() {
        let rect = Rect::new(100, 50, 20, 10);
        let point = Point2::new(105.5, 58.0);
        let local = rect.to_local(&point);
        assert_eq!(local, Point2::new(5.5, 8.0));
        assert!(rect.contains_local(&local));
        assert_eq!(rect.to_image(&local), point);
    }

    #[test]
    fn test_homogeneous_conversions() {
        let p = Point3::new(1.0, -2.0, 3.0);
        let h = to_homogeneous(&p);
        assert_eq!(h, Vector4::new(1.0, -2.0, 3.0, 1.0));
        assert_eq!(truncate(&h), p);
    }

    #[test]
    fn test_midpoint() {
        let m = midpoint(&Point2::new(0.0, 10.0), &Point2::new(4.0, 20.0));
        assert_eq!(m, Point2::new(2.0, 15.0));
    }
}
