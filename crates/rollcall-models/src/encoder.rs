//! ArcFace face encoder via ONNX Runtime.
//!
//! Produces 512-dimensional identity embeddings from aligned 112×112 color
//! crops (w600k_r50). The jittered mode re-aligns the face several times
//! with small random landmark perturbations and averages the embeddings —
//! slower, but measurably more stable, which is why the pipeline reserves
//! it for the final match step.

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

use crate::alignment;
use rollcall_core::capabilities::{FaceEncoder, ModelError};
use rollcall_core::types::{BoundingBox, Embedding, EMBEDDING_DIM};

// --- Named constants ---
const INPUT_SIZE: usize = alignment::ALIGNED_SIZE as usize;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5; // symmetric normalization, unlike the detector
const MODEL_VERSION: &str = "w600k_r50";
/// Maximum per-axis landmark displacement for one jitter pass, in pixels.
const JITTER_MAX_SHIFT: f32 = 2.0;

/// ArcFace-based face encoder.
pub struct ArcFaceEncoder {
    session: Session,
    rng: StdRng,
}

impl ArcFaceEncoder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }
        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(2)?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| ModelError::InferenceFailed(format!("loading ArcFace: {e}")))?;

        tracing::info!(path = %model_path.display(), "ArcFace encoder loaded");
        Ok(Self {
            session,
            rng: StdRng::from_entropy(),
        })
    }

    /// Pack an aligned RGB crop into a normalized NCHW tensor.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
            }
        }
        tensor
    }

    /// One forward pass over an aligned crop, L2-normalized.
    fn embed_aligned(&mut self, aligned: &RgbImage) -> Result<Vec<f32>, ModelError> {
        let input = Self::preprocess(aligned);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())
                .map_err(|e| ModelError::InferenceFailed(format!("ArcFace input: {e}")))?])
            .map_err(|e| ModelError::InferenceFailed(format!("ArcFace inference: {e}")))?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("ArcFace output: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(ModelError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }
        Ok(l2_normalize(raw.to_vec()))
    }

    /// Displace each landmark by up to [`JITTER_MAX_SHIFT`] on each axis.
    fn jitter(&mut self, landmarks: &[(f32, f32); 5]) -> [(f32, f32); 5] {
        let mut out = *landmarks;
        for point in &mut out {
            point.0 += self.rng.gen_range(-JITTER_MAX_SHIFT..=JITTER_MAX_SHIFT);
            point.1 += self.rng.gen_range(-JITTER_MAX_SHIFT..=JITTER_MAX_SHIFT);
        }
        out
    }
}

impl FaceEncoder for ArcFaceEncoder {
    fn encode(
        &mut self,
        frame: &RgbImage,
        face: &BoundingBox,
        jitters: u32,
    ) -> Result<Option<Embedding>, ModelError> {
        // Alignment needs the detector's five landmarks.
        let Some(landmarks) = face.landmarks else {
            tracing::debug!("face has no detector landmarks; cannot align");
            return Ok(None);
        };

        let passes = jitters.max(1);
        let mut sum = vec![0.0f32; EMBEDDING_DIM];
        for pass in 0..passes {
            // First pass uses the landmarks as detected.
            let pass_landmarks = if pass == 0 {
                landmarks
            } else {
                self.jitter(&landmarks)
            };
            let aligned = alignment::align_face(frame, &pass_landmarks);
            let values = self.embed_aligned(&aligned)?;
            for (acc, v) in sum.iter_mut().zip(values.iter()) {
                *acc += v;
            }
        }

        let inv = 1.0 / passes as f32;
        let averaged: Vec<f32> = sum.into_iter().map(|v| v * inv).collect();

        Ok(Some(Embedding {
            values: l2_normalize(averaged),
            model_version: Some(MODEL_VERSION.to_string()),
        }))
    }
}

/// Scale a vector to unit L2 norm; zero vectors pass through unchanged.
fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.into_iter().map(|v| v / norm).collect()
    } else {
        values
    }
}
