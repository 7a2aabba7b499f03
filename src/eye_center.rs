//! Gradient-based eye center localisation.
//!
//! The pupil is the dark disc most image gradients point away from: for every
//! candidate center `c` the score is the sum over gradient pixels `x` of
//! `max(0, d(c, x) · g(x))²`, where `d` is the unit displacement and `g` the
//! unit gradient, weighted by the darkness of `c`. The eye patch is first
//! rescaled to a fixed working width to bound the quadratic search.

use crate::{
    constants::{DEFAULT_FAST_EYE_WIDTH, DEFAULT_GRADIENT_THRESHOLD, DEFAULT_WEIGHT_BLUR_SIGMA},
    geometry::Rect,
    pupil::EyeCenterFinder,
    utils::safe_cast::{i32_to_u32, u32_to_i32},
    Error, Result,
};
use image::{imageops, GrayImage};
use imageproc::{
    filter::gaussian_blur_f32,
    gradients::{horizontal_sobel, vertical_sobel},
};
use nalgebra::Point2;

/// Pupil finder using the means of image gradients
#[derive(Debug, Clone)]
pub struct GradientEyeCenterFinder {
    fast_width: u32,
    gradient_threshold: f64,
    blur_sigma: f32,
}

impl Default for GradientEyeCenterFinder {
    fn default() -> Self {
        Self {
            fast_width: DEFAULT_FAST_EYE_WIDTH,
            gradient_threshold: DEFAULT_GRADIENT_THRESHOLD,
            blur_sigma: DEFAULT_WEIGHT_BLUR_SIGMA,
        }
    }
}

/// Unit Sobel gradient at one pixel of the working patch
struct Gradient {
    x: f64,
    y: f64,
    gx: f64,
    gy: f64,
}

impl GradientEyeCenterFinder {
    /// Create a finder with explicit tuning.
    ///
    /// # Errors
    ///
    /// Returns an error if the working width is zero or the blur sigma is not positive
    pub fn new(fast_width: u32, gradient_threshold: f64, blur_sigma: f32) -> Result<Self> {
        if fast_width == 0 {
            return Err(Error::InvalidInput("Fast eye width must be greater than 0".to_string()));
        }
        if !(blur_sigma > 0.0) {
            return Err(Error::InvalidInput(format!(
                "Weight blur sigma must be positive, got {blur_sigma}"
            )));
        }
        if !gradient_threshold.is_finite() {
            return Err(Error::InvalidInput("Gradient threshold must be finite".to_string()));
        }
        Ok(Self {
            fast_width,
            gradient_threshold,
            blur_sigma,
        })
    }

    /// Copy the ROI out of the frame, replicating border pixels where the ROI leaves the image
    fn crop(image: &GrayImage, roi: &Rect) -> Result<GrayImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput("Empty frame".to_string()));
        }
        let max_x = u32_to_i32(width)? - 1;
        let max_y = u32_to_i32(height)? - 1;

        let mut patch = GrayImage::new(i32_to_u32(roi.width)?, i32_to_u32(roi.height)?);
        for (x, y, pixel) in patch.enumerate_pixels_mut() {
            let sx = (roi.x + u32_to_i32(x)?).clamp(0, max_x);
            let sy = (roi.y + u32_to_i32(y)?).clamp(0, max_y);
            *pixel = *image.get_pixel(i32_to_u32(sx)?, i32_to_u32(sy)?);
        }
        Ok(patch)
    }

    /// Normalized gradients whose magnitude clears the dynamic threshold
    #[allow(clippy::cast_precision_loss)] // Patch sizes are small
    fn strong_gradients(&self, eye: &GrayImage) -> Vec<Gradient> {
        let width = eye.width() as usize;
        let grad_x: Vec<f64> = horizontal_sobel(eye).pixels().map(|p| f64::from(p[0])).collect();
        let grad_y: Vec<f64> = vertical_sobel(eye).pixels().map(|p| f64::from(p[0])).collect();

        let magnitudes: Vec<f64> = grad_x.iter().zip(&grad_y).map(|(gx, gy)| gx.hypot(*gy)).collect();
        let n = magnitudes.len() as f64;
        let mean = magnitudes.iter().sum::<f64>() / n;
        let variance = magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n;
        let threshold = self.gradient_threshold * variance.sqrt() / n.sqrt() + mean;

        magnitudes
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m > threshold && m > 0.0)
            .map(|(i, &m)| Gradient {
                x: (i % width) as f64,
                y: (i / width) as f64,
                gx: grad_x[i] / m,
                gy: grad_y[i] / m,
            })
            .collect()
    }
}

impl EyeCenterFinder for GradientEyeCenterFinder {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn find(&self, image: &GrayImage, roi: &Rect, mask: &GrayImage) -> Result<Point2<f64>> {
        if roi.is_empty() {
            return Err(Error::InvalidInput(format!("Empty eye region {roi:?}")));
        }
        if mask.dimensions() != (i32_to_u32(roi.width)?, i32_to_u32(roi.height)?) {
            return Err(Error::InvalidInput(format!(
                "Mask size {:?} does not match eye region {roi:?}",
                mask.dimensions()
            )));
        }

        let patch = Self::crop(image, roi)?;
        let scale = f64::from(self.fast_width) / f64::from(roi.width);
        let fast_height = ((f64::from(roi.height) * scale).round() as u32).max(1);
        let eye = imageops::resize(&patch, self.fast_width, fast_height, imageops::FilterType::Triangle);
        let eye_mask = imageops::resize(mask, self.fast_width, fast_height, imageops::FilterType::Nearest);

        let gradients = self.strong_gradients(&eye);
        if gradients.is_empty() {
            log::debug!("No usable gradients in eye region {roi:?}, using its center");
            return Ok(Point2::from(roi.size() * 0.5));
        }

        let weight = gaussian_blur_f32(&eye, self.blur_sigma);
        let masked_candidates = eye_mask.pixels().any(|p| p[0] > 0);

        let mut best: Option<(f64, u32, u32)> = None;
        for (cx, cy, darkness) in weight.enumerate_pixels() {
            if masked_candidates && eye_mask.get_pixel(cx, cy)[0] == 0 {
                continue;
            }
            let (fx, fy) = (f64::from(cx), f64::from(cy));
            let mut sum = 0.0;
            for g in &gradients {
                let (dx, dy) = (g.x - fx, g.y - fy);
                let norm = dx.hypot(dy);
                if norm == 0.0 {
                    continue;
                }
                let dot = (dx * g.gx + dy * g.gy) / norm;
                if dot > 0.0 {
                    sum += dot * dot;
                }
            }
            let score = sum * (255.0 - f64::from(darkness[0]));
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, cx, cy));
            }
        }

        let (_, cx, cy) = best.ok_or_else(|| Error::InvalidInput("Eye region has no candidate pixels".to_string()))?;
        let scale_y = f64::from(fast_height) / f64::from(roi.height);
        Ok(Point2::new(
            (f64::from(cx) + 0.5) / scale - 0.5,
            (f64::from(cy) + 0.5) / scale_y - 0.5,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Bright frame with a dark disc centered at ROI-local (30, 15) of ROI (20, 15, 60, 30)
    fn eye_frame() -> (GrayImage, Rect) {
        let roi = Rect::new(20, 15, 60, 30);
        let image = GrayImage::from_fn(100, 60, |x, y| {
            let dx = f64::from(x) - 50.0;
            let dy = f64::from(y) - 30.0;
            if dx.hypot(dy) <= 7.0 {
                Luma([30])
            } else {
                Luma([220])
            }
        });
        (image, roi)
    }

    #[test]
    fn test_finds_dark_disc() {
        let (image, roi) = eye_frame();
        let mask = GrayImage::from_pixel(60, 30, Luma([255]));
        let center = GradientEyeCenterFinder::default().find(&image, &roi, &mask).unwrap();
        assert!((center.x - 30.0).abs() <= 3.0, "x = {}", center.x);
        assert!((center.y - 15.0).abs() <= 3.0, "y = {}", center.y);
    }

    #[test]
    fn test_mask_restricts_candidates() {
        let (image, roi) = eye_frame();
        let mask = GrayImage::from_fn(60, 30, |x, _| if x >= 40 { Luma([255]) } else { Luma([0]) });
        let center = GradientEyeCenterFinder::default().find(&image, &roi, &mask).unwrap();
        assert!(center.x >= 38.0, "x = {}", center.x);
    }

    #[test]
    fn test_flat_patch_returns_roi_center() {
        let image = GrayImage::from_pixel(80, 40, Luma([128]));
        let roi = Rect::new(10, 10, 40, 20);
        let mask = GrayImage::from_pixel(40, 20, Luma([255]));
        let center = GradientEyeCenterFinder::default().find(&image, &roi, &mask).unwrap();
        assert_eq!(center, Point2::new(20.0, 10.0));
    }

    #[test]
    fn test_roi_outside_frame_is_clamped() {
        let (image, _) = eye_frame();
        let roi = Rect::new(-10, -10, 30, 20);
        let mask = GrayImage::from_pixel(30, 20, Luma([255]));
        assert!(GradientEyeCenterFinder::default().find(&image, &roi, &mask).is_ok());
    }

    #[test]
    fn test_rejects_mismatched_mask() {
        let (image, roi) = eye_frame();
        let mask = GrayImage::from_pixel(10, 10, Luma([255]));
        assert!(GradientEyeCenterFinder::default().find(&image, &roi, &mask).is_err());
    }

    #[test]
    fn test_rejects_empty_roi() {
        let (image, _) = eye_frame();
        let mask = GrayImage::new(0, 5);
        assert!(GradientEyeCenterFinder::default()
            .find(&image, &Rect::new(0, 0, 0, 5), &mask)
            .is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(GradientEyeCenterFinder::new(0, 50.0, 1.0).is_err());
        assert!(GradientEyeCenterFinder::new(50, 50.0, 0.0).is_err());
        assert!(GradientEyeCenterFinder::new(50, f64::NAN, 1.0).is_err());
        assert!(GradientEyeCenterFinder::new(50, 50.0, 1.0).is_ok());
    }
}
