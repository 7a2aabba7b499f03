//! SCRFD face detector running on ONNX Runtime.

use crate::{
    config::FaceDetectionConfig,
    detection::{non_max_suppression, FaceDetector, FaceRegion},
    geometry::Rect,
    Error, Result,
};
use image::{imageops, RgbImage};
use nalgebra::Point2;
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, LoggingLevel, Session, SessionBuilder, Value};
use std::{collections::HashMap, path::Path, sync::Arc};

/// Input size used when the model does not fix one
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Open an ONNX model, reporting any failure as `ModelLoadFailed`
pub(crate) fn load_session(model_path: &Path, name: &str) -> Result<Session> {
    log::info!("Loading {name} model: {}", model_path.display());
    let load = || -> std::result::Result<Session, ort::OrtError> {
        let environment = Arc::new(
            Environment::builder()
                .with_name(name)
                .with_log_level(LoggingLevel::Warning)
                .build()?,
        );
        SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)
    };
    load().map_err(|e| Error::ModelLoadFailed(format!("{}: {e}", model_path.display())))
}

/// Flatten an output tensor
pub(crate) fn output_values(outputs: &[Value<'_>], index: usize) -> Result<Vec<f32>> {
    let value = outputs
        .get(index)
        .ok_or_else(|| Error::InvalidInput(format!("Model produced no output {index}")))?;
    let tensor = value.try_extract::<f32>()?;
    let values = tensor.view().iter().copied().collect();
    Ok(values)
}

/// SCRFD detector: anchor-free distance regression over several feature strides
pub struct ScrfdFaceDetector {
    session: Session,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_faces: usize,
    strides: Vec<u32>,
    num_anchors: usize,
    center_cache: HashMap<(u32, u32, u32), Vec<Point2<f32>>>,
}

impl ScrfdFaceDetector {
    /// Load a SCRFD model.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadFailed` if the model cannot be loaded or has an unknown output layout
    pub fn new(model_path: &Path, config: &FaceDetectionConfig) -> Result<Self> {
        let session = load_session(model_path, "face_detector")?;

        let dimension = |i: usize| {
            session
                .inputs
                .first()
                .and_then(|input| input.dimensions.get(i).copied().flatten())
                .and_then(|d| u32::try_from(d).ok())
                .filter(|&d| d > 0)
                .unwrap_or(DEFAULT_INPUT_SIZE)
        };
        let (input_height, input_width) = (dimension(2), dimension(3));

        // Score, box and (optional) keypoint heads per stride
        let (strides, num_anchors) = match session.outputs.len() {
            6 | 9 => (vec![8, 16, 32], 2),
            10 | 15 => (vec![8, 16, 32, 64, 128], 1),
            n => {
                return Err(Error::ModelLoadFailed(format!(
                    "Unsupported SCRFD layout with {n} outputs"
                )))
            }
        };

        log::info!("Face detector input {input_width}x{input_height}, strides {strides:?}");

        Ok(Self {
            session,
            input_width,
            input_height,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_faces: config.max_faces,
            strides,
            num_anchors,
            center_cache: HashMap::new(),
        })
    }

    /// Letterbox the frame into the model input (top-left aligned) and normalise to NCHW.
    /// Returns the tensor and the frame-to-input scale.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, f32) {
        let (width, height) = image.dimensions();
        let ratio_image = f64::from(height) / f64::from(width);
        let ratio_model = f64::from(self.input_height) / f64::from(self.input_width);
        let (new_width, new_height) = if ratio_image > ratio_model {
            (((f64::from(self.input_height) / ratio_image) as u32).max(1), self.input_height)
        } else {
            (self.input_width, ((f64::from(self.input_width) * ratio_image) as u32).max(1))
        };
        let scale = (f64::from(new_height) / f64::from(height)) as f32;

        let resized = imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle);
        let mut canvas = RgbImage::new(self.input_width, self.input_height);
        imageops::replace(&mut canvas, &resized, 0, 0);

        let shape = (1, 3, self.input_height as usize, self.input_width as usize);
        let tensor = Array4::from_shape_fn(shape, |(_, c, y, x)| {
            (f32::from(canvas.get_pixel(x as u32, y as u32)[c]) - 127.5) / 128.0
        });
        (tensor, scale)
    }

    /// Centers of the anchors of one stride, row-major with `num_anchors` copies per cell
    #[allow(clippy::cast_precision_loss)]
    fn anchor_centers(rows: u32, cols: u32, stride: u32, num_anchors: usize) -> Vec<Point2<f32>> {
        let mut centers = Vec::with_capacity(rows as usize * cols as usize * num_anchors);
        for y in 0..rows {
            for x in 0..cols {
                let center = Point2::new((x * stride) as f32, (y * stride) as f32);
                centers.extend(std::iter::repeat(center).take(num_anchors));
            }
        }
        centers
    }

    /// Boxes of all anchors scoring at least `threshold`, in frame pixels
    #[allow(clippy::cast_precision_loss)]
    fn decode(
        centers: &[Point2<f32>],
        scores: &[f32],
        distances: &[f32],
        stride: u32,
        threshold: f32,
        scale: f32,
    ) -> Vec<FaceRegion> {
        let stride = stride as f32;
        scores
            .iter()
            .zip(centers)
            .enumerate()
            .filter(|&(i, (&score, _))| score >= threshold && 4 * i + 3 < distances.len())
            .filter_map(|(i, (&score, center))| {
                let d = &distances[4 * i..4 * i + 4];
                let top_left = Point2::new(center.x - d[0] * stride, center.y - d[1] * stride) / scale;
                let bottom_right = Point2::new(center.x + d[2] * stride, center.y + d[3] * stride) / scale;
                let bbox = Rect::from_corners(top_left.cast::<f64>(), bottom_right.cast::<f64>()).ok()?;
                Some(FaceRegion { bbox, score })
            })
            .collect()
    }
}

impl FaceDetector for ScrfdFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (tensor, scale) = self.preprocess(image);
        let input = CowArray::from(tensor.into_dyn());
        let outputs = self.session.run(vec![Value::from_array(self.session.allocator(), &input)?])?;

        let heads = self.strides.len();
        let mut candidates = Vec::new();
        for (idx, &stride) in self.strides.iter().enumerate() {
            let scores = output_values(&outputs, idx)?;
            let distances = output_values(&outputs, idx + heads)?;

            let key = (self.input_height / stride, self.input_width / stride, stride);
            let num_anchors = self.num_anchors;
            let centers = self
                .center_cache
                .entry(key)
                .or_insert_with(|| Self::anchor_centers(key.0, key.1, stride, num_anchors));

            candidates.extend(Self::decode(
                centers,
                &scores,
                &distances,
                stride,
                self.confidence_threshold,
                scale,
            ));
        }

        let faces = non_max_suppression(candidates, self.iou_threshold, self.max_faces);
        log::debug!("Detected {} face(s)", faces.len());
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_centers_layout() {
        let centers = ScrfdFaceDetector::anchor_centers(2, 3, 8, 2);
        assert_eq!(centers.len(), 12);
        assert_eq!(centers[0], Point2::new(0.0, 0.0));
        assert_eq!(centers[1], Point2::new(0.0, 0.0));
        assert_eq!(centers[2], Point2::new(8.0, 0.0));
        assert_eq!(centers[6], Point2::new(0.0, 8.0));
    }

    #[test]
    fn test_decode_distances() {
        let centers = vec![Point2::new(100.0, 100.0), Point2::new(200.0, 200.0)];
        let scores = [0.9, 0.1];
        let distances = [1.0, 1.0, 2.0, 2.0, 1.5, 1.5, 2.5, 2.5];
        let faces = ScrfdFaceDetector::decode(&centers, &scores, &distances, 10, 0.5, 1.0);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bbox, Rect::new(90, 90, 30, 30));
    }

    #[test]
    fn test_decode_rescales_to_frame() {
        let centers = vec![Point2::new(100.0, 100.0)];
        let faces = ScrfdFaceDetector::decode(&centers, &[0.8], &[1.0, 1.0, 1.0, 1.0], 10, 0.5, 0.5);
        assert_eq!(faces[0].bbox, Rect::new(180, 180, 40, 40));
    }
}
