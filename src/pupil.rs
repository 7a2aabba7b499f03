//! Pupil localisation: eye masks, the eye-center finder seam and normalisation of
//! pupil positions into eye-relative coordinates.

use crate::{
    constants::MASK_FOREGROUND,
    eye_roi::{eye_regions, EyeRegion, EyeRegions},
    geometry::{to_pixel, Rect},
    landmarks::LandmarkSet,
    utils::safe_cast::i32_to_u32,
    Error, Result,
};
use image::{GrayImage, Luma};
use imageproc::{drawing::draw_polygon_mut, point::Point};
use nalgebra::{Point2, Vector2};

/// Locates the eye center (pupil) inside an eye region
pub trait EyeCenterFinder {
    /// Find the pupil of the eye covered by `roi`.
    ///
    /// `mask` has the size of `roi`; non-zero pixels are candidate centers.
    /// The result is in ROI-local pixel coordinates and may fall outside the
    /// mask or the ROI.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be searched
    fn find(&self, image: &GrayImage, roi: &Rect, mask: &GrayImage) -> Result<Point2<f64>>;
}

/// Pupil positions of both eyes relative to their eye boxes.
///
/// `(0, 0)` is the box center and `±1` its edges. Values are not clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilPositions {
    /// Eye on the left of the image
    pub left: Point2<f64>,
    /// Eye on the right of the image
    pub right: Point2<f64>,
}

/// Rasterise the eye contour into a mask the size of the eye ROI.
///
/// Pixels inside the contour polygon are 255, everything else 0.
///
/// # Errors
///
/// Returns an error if the ROI has a negative size
pub fn eye_mask(region: &EyeRegion) -> Result<GrayImage> {
    let width = i32_to_u32(region.roi.width)?;
    let height = i32_to_u32(region.roi.height)?;
    let mut mask = GrayImage::new(width, height);

    let mut polygon: Vec<Point<i32>> = Vec::with_capacity(region.contour.len());
    for p in &region.contour {
        let (x, y) = to_pixel(p);
        let vertex = Point::new(x, y);
        if polygon.last() != Some(&vertex) {
            polygon.push(vertex);
        }
    }
    // The polygon is closed implicitly
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    if polygon.len() < 2 {
        log::debug!("Degenerate eye contour, leaving mask empty");
        return Ok(mask);
    }

    draw_polygon_mut(&mut mask, &polygon, Luma([MASK_FOREGROUND]));
    Ok(mask)
}

/// Express an ROI-local pupil position relative to the ROI center, in half-extents.
///
/// The offset is taken from the exact center, the divisors are the whole-pixel
/// half extents (`width / 2`, `height / 2` in integer arithmetic). For odd sizes
/// the edges therefore land slightly beyond ±1.
///
/// # Errors
///
/// Returns an error if the ROI is narrower or shorter than 2 pixels
pub fn normalize_pupil(pupil: &Point2<f64>, roi: &Rect) -> Result<Point2<f64>> {
    if roi.width < 2 || roi.height < 2 {
        return Err(Error::InvalidInput(format!("Eye region {roi:?} too small to normalise in")));
    }
    let offset: Vector2<f64> = pupil.coords - roi.size() * 0.5;
    let half_width = f64::from(roi.width / 2);
    let half_height = f64::from(roi.height / 2);
    Ok(Point2::new(offset.x / half_width, offset.y / half_height))
}

fn locate(image: &GrayImage, region: &EyeRegion, finder: &dyn EyeCenterFinder) -> Result<Point2<f64>> {
    let mask = eye_mask(region)?;
    let pupil = finder.find(image, &region.roi, &mask)?;
    normalize_pupil(&pupil, &region.roi)
}

/// Finds both pupils of a face and normalises them to their eye boxes
pub struct PupilLocator {
    finder: Box<dyn EyeCenterFinder>,
    enlarge_percent: f64,
}

impl PupilLocator {
    /// Create a locator around an eye-center finder
    #[must_use]
    pub fn new(finder: Box<dyn EyeCenterFinder>, enlarge_percent: f64) -> Self {
        Self {
            finder,
            enlarge_percent,
        }
    }

    /// Eye ROI enlargement in percent of the left eye width
    #[must_use]
    pub fn enlarge_percent(&self) -> f64 {
        self.enlarge_percent
    }

    /// Eye regions of a face with this locator's enlargement
    ///
    /// # Errors
    ///
    /// Returns an error if the regions cannot be derived
    pub fn eye_regions(&self, landmarks: &LandmarkSet) -> Result<EyeRegions> {
        eye_regions(landmarks, self.enlarge_percent)
    }

    /// Pupil positions of both eyes relative to their eye boxes
    ///
    /// # Errors
    ///
    /// Returns an error if an eye region is empty or the finder fails
    pub fn pupils_relative_pose(&self, image: &GrayImage, landmarks: &LandmarkSet) -> Result<PupilPositions> {
        let regions = self.eye_regions(landmarks)?;
        Ok(PupilPositions {
            left: locate(image, &regions.left, self.finder.as_ref())?,
            right: locate(image, &regions.right, self.finder.as_ref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_region() -> EyeRegion {
        EyeRegion {
            roi: Rect::new(0, 0, 14, 14),
            contour: [
                Point2::new(2.0, 2.0),
                Point2::new(6.0, 2.0),
                Point2::new(10.0, 2.0),
                Point2::new(10.0, 10.0),
                Point2::new(6.0, 10.0),
                Point2::new(2.0, 10.0),
            ],
        }
    }

    #[test]
    fn test_mask_matches_roi_size() {
        let mask = eye_mask(&square_region()).unwrap();
        assert_eq!(mask.dimensions(), (14, 14));
    }

    #[test]
    fn test_mask_fills_interior_only() {
        let mask = eye_mask(&square_region()).unwrap();
        for (x, y, pixel) in mask.enumerate_pixels() {
            let inside = (3..=9).contains(&x) && (3..=9).contains(&y);
            let outside = !(2..=10).contains(&x) || !(2..=10).contains(&y);
            if inside {
                assert_eq!(pixel[0], 255, "({x}, {y}) should be inside");
            }
            if outside {
                assert_eq!(pixel[0], 0, "({x}, {y}) should be outside");
            }
        }
    }

    #[test]
    fn test_mask_of_collapsed_contour_is_empty() {
        let region = EyeRegion {
            roi: Rect::new(0, 0, 8, 8),
            contour: [Point2::new(4.0, 4.0); 6],
        };
        let mask = eye_mask(&region).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_normalize_center_is_origin() {
        let roi = Rect::new(50, 60, 40, 20);
        let rel = normalize_pupil(&Point2::new(20.0, 10.0), &roi).unwrap();
        assert_eq!(rel, Point2::new(0.0, 0.0));
    }

    #[test]
    fn test_normalize_edges() {
        let roi = Rect::new(0, 0, 40, 20);
        let right = normalize_pupil(&Point2::new(40.0, 10.0), &roi).unwrap();
        assert!((right.x - 1.0).abs() < 1e-12);
        assert!(right.y.abs() < 1e-12);

        let top_left = normalize_pupil(&Point2::new(0.0, 0.0), &roi).unwrap();
        assert_eq!(top_left, Point2::new(-1.0, -1.0));
    }

    #[test]
    fn test_normalize_does_not_clamp() {
        let roi = Rect::new(0, 0, 40, 20);
        let rel = normalize_pupil(&Point2::new(60.0, -10.0), &roi).unwrap();
        assert_eq!(rel, Point2::new(2.0, -2.0));
    }

    #[test]
    fn test_normalize_odd_size_uses_whole_pixel_half_extent() {
        // Width 9: center 4.5, divisor 4
        let roi = Rect::new(0, 0, 9, 20);
        let right = normalize_pupil(&Point2::new(9.0, 10.0), &roi).unwrap();
        assert_eq!(right, Point2::new(1.125, 0.0));
        let center = normalize_pupil(&Point2::new(4.5, 10.0), &roi).unwrap();
        assert_eq!(center, Point2::new(0.0, 0.0));
    }

    #[test]
    fn test_normalize_empty_roi() {
        assert!(normalize_pupil(&Point2::origin(), &Rect::new(0, 0, 0, 10)).is_err());
        assert!(normalize_pupil(&Point2::origin(), &Rect::new(0, 0, 1, 10)).is_err());
    }

    struct FixedFinder(Point2<f64>);

    impl EyeCenterFinder for FixedFinder {
        fn find(&self, _image: &GrayImage, _roi: &Rect, _mask: &GrayImage) -> Result<Point2<f64>> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_locator_normalizes_both_eyes() {
        let mut points = vec![Point2::new(100.0, 100.0); 68];
        for (i, x) in [10.0, 14.0, 18.0, 22.0, 18.0, 14.0].into_iter().enumerate() {
            let y = if (1..=2).contains(&i) { 8.0 } else if i >= 4 { 12.0 } else { 10.0 };
            points[36 + i] = Point2::new(x, y);
            points[42 + i] = Point2::new(x + 30.0, y);
        }
        let landmarks = LandmarkSet::new(points).unwrap();
        let locator = PupilLocator::new(Box::new(FixedFinder(Point2::new(0.0, 0.0))), 0.0);
        let image = GrayImage::new(64, 32);

        let pupils = locator.pupils_relative_pose(&image, &landmarks).unwrap();
        assert_eq!(pupils.left, Point2::new(-1.0, -1.0));
        assert_eq!(pupils.right, Point2::new(-1.0, -1.0));
    }
}
