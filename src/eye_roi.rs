//! Eye regions of interest derived from the eyelid landmarks.

use crate::{
    constants::EYE_CONTOUR_POINTS,
    geometry::Rect,
    landmarks::{Eye, LandmarkSet},
    Error, Result,
};
use nalgebra::Point2;

/// An enlarged eye box and the eye contour in the box's local frame
#[derive(Debug, Clone, PartialEq)]
pub struct EyeRegion {
    /// Enlarged region of interest in image coordinates
    pub roi: Rect,
    /// Contour points relative to the top-left corner of `roi`
    pub contour: [Point2<f64>; EYE_CONTOUR_POINTS],
}

/// Regions of both eyes of one face
#[derive(Debug, Clone, PartialEq)]
pub struct EyeRegions {
    /// Eye on the left of the image (points 36-41)
    pub left: EyeRegion,
    /// Eye on the right of the image (points 42-47)
    pub right: EyeRegion,
}

/// Tight box around an eye: corners for x, upper lid for the top, lower lid for the bottom
fn tight_eye_box(contour: &[Point2<f64>; EYE_CONTOUR_POINTS]) -> Result<Rect> {
    let top = contour[1].y.min(contour[2].y);
    let bottom = contour[4].y.max(contour[5].y);
    Rect::from_corners(Point2::new(contour[0].x, top), Point2::new(contour[3].x, bottom))
}

fn eye_region(contour: &[Point2<f64>; EYE_CONTOUR_POINTS], tight: Rect, margin: f64) -> Result<EyeRegion> {
    let roi = tight.enlarged(margin)?;
    Ok(EyeRegion {
        roi,
        contour: contour.map(|p| roi.to_local(&p)),
    })
}

/// Compute both eye regions of a face.
///
/// The margin is `enlarge_percent` of the left eye's width and is applied to
/// both eyes, the right eye included.
///
/// # Errors
///
/// Returns an error if `enlarge_percent` is negative or not finite, or if a
/// box coordinate overflows
pub fn eye_regions(landmarks: &LandmarkSet, enlarge_percent: f64) -> Result<EyeRegions> {
    if !enlarge_percent.is_finite() || enlarge_percent < 0.0 {
        return Err(Error::InvalidInput(format!(
            "Eye ROI enlarge factor must be a non-negative percentage, got {enlarge_percent}"
        )));
    }

    let left_contour = landmarks.eye_contour(Eye::Left);
    let right_contour = landmarks.eye_contour(Eye::Right);

    let left_tight = tight_eye_box(&left_contour)?;
    let right_tight = tight_eye_box(&right_contour)?;

    // Both margins come from the left eye width
    let margin = enlarge_percent / 100.0 * f64::from(left_tight.width);

    Ok(EyeRegions {
        left: eye_region(&left_contour, left_tight, margin)?,
        right: eye_region(&right_contour, right_tight, margin)?,
    })
}
