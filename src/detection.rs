//! Face detection and landmark prediction seams, plus the box post-processing
//! shared by detector implementations.

use crate::{geometry::Rect, Result};
use image::RgbImage;
use nalgebra::Point2;

/// A detected face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    /// Face bounding box in image pixels
    pub bbox: Rect,
    /// Detection confidence
    pub score: f32,
}

/// Finds faces in a frame
pub trait FaceDetector {
    /// Detect all faces in `image`, most confident first.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>>;
}

/// Predicts the 68 facial landmarks of one detected face
pub trait LandmarkPredictor {
    /// Landmarks of `face` in image pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails
    fn predict(&self, image: &RgbImage, face: &FaceRegion) -> Result<Vec<Point2<f64>>>;
}

/// Expand a face box by `shift` of its size on each side, make it square and keep it
/// inside a `max_width` x `max_height` frame
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // Box sizes are small
pub fn refine_box(bbox: &Rect, max_width: i32, max_height: i32, shift: f32) -> Rect {
    let x_shift = ((bbox.width as f32 * shift) as i32).clamp(0, max_width);
    let y_shift = ((bbox.height as f32 * shift) as i32).clamp(0, max_height);

    let x = (bbox.x - x_shift).max(0);
    let y = (bbox.y - y_shift).max(0);
    let width = (bbox.width + 2 * x_shift).min(max_width - x);
    let height = (bbox.height + 2 * y_shift).min(max_height - y);

    let side = width.max(height).min(max_width).min(max_height);
    let x = if x + side > max_width { max_width - side } else { x };
    let y = if y + side > max_height { max_height - side } else { y };
    Rect::new(x, y, side, side)
}

/// Intersection over union of two boxes
#[must_use]
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x + a.width).min(b.x + b.width);
    let y1 = (a.y + a.height).min(b.y + b.height);
    let inter = i64::from((x1 - x0).max(0)) * i64::from((y1 - y0).max(0));
    let area_a = i64::from(a.width.max(0)) * i64::from(a.height.max(0));
    let area_b = i64::from(b.width.max(0)) * i64::from(b.height.max(0));
    let union = area_a + area_b - inter;
    if union <= 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = inter as f32 / union as f32;
    ratio
}

/// Greedy non-maximum suppression: keep the most confident faces, dropping any
/// that overlap an already kept face by more than `iou_threshold`
#[must_use]
pub fn non_max_suppression(mut faces: Vec<FaceRegion>, iou_threshold: f32, max_faces: usize) -> Vec<FaceRegion> {
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<FaceRegion> = Vec::new();
    for face in faces {
        if kept.len() >= max_faces {
            break;
        }
        if kept.iter().all(|k| iou(&k.bbox, &face.bbox) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: i32, y: i32, size: i32, score: f32) -> FaceRegion {
        FaceRegion {
            bbox: Rect::new(x, y, size, size),
            score,
        }
    }

    #[test]
    fn test_refine_box_expands_to_square() {
        let refined = refine_box(&Rect::new(10, 10, 50, 40), 200, 200, 0.1);
        assert_eq!(refined.width, refined.height);
        assert!(refined.width > 50);
    }

    #[test]
    fn test_refine_box_stays_inside_frame() {
        for bbox in [Rect::new(190, 190, 20, 20), Rect::new(0, 0, 10, 10), Rect::new(150, 0, 60, 120)] {
            let refined = refine_box(&bbox, 200, 200, 0.5);
            assert!(refined.x >= 0 && refined.y >= 0);
            assert!(refined.x + refined.width <= 200);
            assert!(refined.y + refined.height <= 200);
            assert_eq!(refined.width, refined.height);
        }
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0, 0, 10, 10);
        assert!((iou(&a, &a) - 1.0).abs() < f32::EPSILON);
        assert_eq!(iou(&a, &Rect::new(20, 20, 10, 10)), 0.0);
        let half = iou(&a, &Rect::new(5, 0, 10, 10));
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let faces = vec![face(0, 0, 100, 0.7), face(5, 5, 100, 0.9), face(300, 300, 80, 0.8)];
        let kept = non_max_suppression(faces, 0.5, 10);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < f32::EPSILON);
        assert!((kept[1].score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nms_respects_max_faces() {
        let faces = (0..5).map(|i| face(i * 200, 0, 100, 0.5)).collect();
        assert_eq!(non_max_suppression(faces, 0.5, 3).len(), 3);
    }
}
