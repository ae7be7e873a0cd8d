//! Model capability seams.
//!
//! Detection, landmark regression and embedding extraction are delegated to
//! external models behind these traits. The pipeline depends only on the
//! contracts below; any capable implementation substitutes (the shipped ones
//! live in `rollcall-models`, tests use hand-rolled fakes).

use image::{GrayImage, RgbImage};
use thiserror::Error;

use crate::types::{BoundingBox, Embedding, LandmarkSet};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Locates faces in a full-color frame.
///
/// Returns bounding boxes sorted by confidence, each with five-point
/// detector landmarks when the model provides them. An empty vector means
/// no face — it is not an error.
pub trait FaceLocator {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, ModelError>;
}

/// Regresses the 68-point landmark set for one detected face.
///
/// Operates on the grayscale frame, constrained to the face region.
/// `Ok(None)` means the model produced no landmark set for this face.
pub trait LandmarkPredictor {
    fn predict(
        &mut self,
        gray: &GrayImage,
        face: &BoundingBox,
    ) -> Result<Option<LandmarkSet>, ModelError>;
}

/// Extracts the identity embedding for one detected face.
///
/// `jitters` selects the accuracy/cost trade-off: 0 encodes the face once,
/// N > 0 averages over N perturbed alignments. `Ok(None)` means the face
/// could not be encoded (e.g., the detector supplied no landmarks).
pub trait FaceEncoder {
    fn encode(
        &mut self,
        frame: &RgbImage,
        face: &BoundingBox,
        jitters: u32,
    ) -> Result<Option<Embedding>, ModelError>;
}
