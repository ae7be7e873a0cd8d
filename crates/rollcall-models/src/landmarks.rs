//! 68-point facial landmark regression via ONNX Runtime.
//!
//! Crops a margin-expanded square around the detected face from the
//! grayscale frame, resizes it to the model input, and maps the regressed
//! normalized coordinates back into frame space.

use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use rollcall_core::capabilities::{LandmarkPredictor, ModelError};
use rollcall_core::types::{BoundingBox, LandmarkSet, LANDMARK_COUNT};

// --- Named constants ---
const INPUT_SIZE: u32 = 112;
/// Fraction of the box side added on every edge before cropping; landmark
/// models are trained on crops looser than detector boxes.
const CROP_MARGIN: f32 = 0.25;
const OUTPUT_LEN: usize = LANDMARK_COUNT * 2;

/// Square crop window in frame coordinates.
#[derive(Debug, Clone, Copy)]
struct CropWindow {
    x: u32,
    y: u32,
    side: u32,
}

impl CropWindow {
    /// Margin-expanded square around the face box, clamped to the frame.
    /// Returns `None` when the intersection with the frame is empty.
    fn around(face: &BoundingBox, frame_w: u32, frame_h: u32) -> Option<Self> {
        let margin = face.width.max(face.height) * CROP_MARGIN;
        let side = face.width.max(face.height) + 2.0 * margin;
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;

        let x0 = (cx - side / 2.0).floor().max(0.0) as u32;
        let y0 = (cy - side / 2.0).floor().max(0.0) as u32;
        if x0 >= frame_w || y0 >= frame_h {
            return None;
        }
        let side = (side.ceil() as u32)
            .min(frame_w - x0)
            .min(frame_h - y0);
        if side == 0 {
            return None;
        }
        Some(Self { x: x0, y: y0, side })
    }
}

/// ONNX 68-point landmark regressor.
pub struct LandmarkRegressor {
    session: Session,
}

impl LandmarkRegressor {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }
        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(2)?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| ModelError::InferenceFailed(format!("loading landmark model: {e}")))?;

        tracing::info!(path = %model_path.display(), "landmark regressor loaded");
        Ok(Self { session })
    }

    /// Pack a grayscale crop into a normalized (1, 1, H, W) tensor.
    fn preprocess(crop: &GrayImage) -> Array4<f32> {
        let mut tensor =
            Array4::<f32>::zeros((1, 1, INPUT_SIZE as usize, INPUT_SIZE as usize));
        for (x, y, pixel) in crop.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32 / 255.0;
        }
        tensor
    }
}

impl LandmarkPredictor for LandmarkRegressor {
    fn predict(
        &mut self,
        gray: &GrayImage,
        face: &BoundingBox,
    ) -> Result<Option<LandmarkSet>, ModelError> {
        let Some(window) = CropWindow::around(face, gray.width(), gray.height()) else {
            tracing::debug!("face window lies outside the frame");
            return Ok(None);
        };

        let crop = imageops::crop_imm(gray, window.x, window.y, window.side, window.side)
            .to_image();
        let resized = imageops::resize(&crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let input = Self::preprocess(&resized);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())
                .map_err(|e| ModelError::InferenceFailed(format!("landmark input: {e}")))?])
            .map_err(|e| ModelError::InferenceFailed(format!("landmark inference: {e}")))?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("landmark output: {e}")))?;

        if raw.len() != OUTPUT_LEN {
            return Err(ModelError::InferenceFailed(format!(
                "expected {OUTPUT_LEN} landmark coordinates, got {}",
                raw.len()
            )));
        }

        let points = decode_landmarks(raw, window);
        Ok(LandmarkSet::from_slice(&points))
    }
}

/// Map normalized (x, y) pairs from crop space back to frame space.
fn decode_landmarks(raw: &[f32], window: CropWindow) -> Vec<(f32, f32)> {
    raw.chunks_exact(2)
        .map(|pair| {
            (
                window.x as f32 + pair[0] * window.side as f32,
                window.y as f32 + pair[1] * window.side as f32,
            )
        })
        .collect()
}
