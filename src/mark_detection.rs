use crate::{
    constants::NUM_FACIAL_LANDMARKS,
    detection::{refine_box, FaceRegion, LandmarkPredictor},
    face_detection::{load_session, output_values},
    geometry::Rect,
    utils::safe_cast::{i32_to_u32, u32_to_i32},
    Error, Result,
};
use image::{imageops, RgbImage};
use nalgebra::Point2;
use ndarray::{Array4, CowArray};
use ort::{Session, Value};
use std::path::Path;

/// Default landmark detector input size
const DEFAULT_LANDMARK_INPUT_SIZE: u32 = 128;

/// 68-point facial landmark regressor using `ONNX` Runtime
pub struct OnnxLandmarkPredictor {
    session: Session,
    input_size: u32,
    box_expansion: f32,
}

impl OnnxLandmarkPredictor {
    /// Load a landmark model. Face boxes are grown by `box_expansion` of their size
    /// and squared before regression.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadFailed` if the model cannot be loaded
    pub fn new(model_path: &Path, box_expansion: f32) -> Result<Self> {
        let session = load_session(model_path, "face_landmarks")?;
        if session.outputs.is_empty() {
            return Err(Error::ModelLoadFailed("Landmark model has no outputs".to_string()));
        }
        Ok(Self {
            session,
            input_size: DEFAULT_LANDMARK_INPUT_SIZE,
            box_expansion,
        })
    }

    /// Square face crop the model sees, inside the frame
    fn crop_box(&self, image: &RgbImage, face: &FaceRegion) -> Result<Rect> {
        let width = u32_to_i32(image.width())?;
        let height = u32_to_i32(image.height())?;
        let crop = refine_box(&face.bbox, width, height, self.box_expansion);
        if crop.is_empty() {
            return Err(Error::InvalidInput(format!("Face box {:?} is outside the frame", face.bbox)));
        }
        Ok(crop)
    }

    /// Resized crop in NHWC layout, scaled to [0, 1]
    #[allow(clippy::cast_possible_truncation)]
    fn preprocess(&self, image: &RgbImage, crop: &Rect) -> Result<Array4<f32>> {
        let patch = imageops::crop_imm(
            image,
            i32_to_u32(crop.x)?,
            i32_to_u32(crop.y)?,
            i32_to_u32(crop.width)?,
            i32_to_u32(crop.height)?,
        )
        .to_image();
        let resized = imageops::resize(&patch, self.input_size, self.input_size, imageops::FilterType::Triangle);
        let size = self.input_size as usize;
        Ok(Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
            f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0
        }))
    }

    /// Map model output (pixels of the `input_size` square) back to frame pixels
    fn postprocess(marks: &[f32], input_size: u32, crop: &Rect) -> Result<Vec<Point2<f64>>> {
        if marks.len() < NUM_FACIAL_LANDMARKS * 2 {
            return Err(Error::InvalidInput(format!(
                "Landmark model produced {} values, expected {}",
                marks.len(),
                NUM_FACIAL_LANDMARKS * 2
            )));
        }
        let scale = crop.size() / f64::from(input_size);
        Ok(marks
            .chunks_exact(2)
            .take(NUM_FACIAL_LANDMARKS)
            .map(|m| {
                Point2::new(
                    f64::from(m[0]) * scale.x + f64::from(crop.x),
                    f64::from(m[1]) * scale.y + f64::from(crop.y),
                )
            })
            .collect())
    }
}

impl LandmarkPredictor for OnnxLandmarkPredictor {
    fn predict(&self, image: &RgbImage, face: &FaceRegion) -> Result<Vec<Point2<f64>>> {
        let crop = self.crop_box(image, face)?;
        let input = CowArray::from(self.preprocess(image, &crop)?.into_dyn());
        let outputs = self.session.run(vec![Value::from_array(self.session.allocator(), &input)?])?;
        let marks = output_values(&outputs, 0)?;
        Self::postprocess(&marks, self.input_size, &crop)
    }
}
