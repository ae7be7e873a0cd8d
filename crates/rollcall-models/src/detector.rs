//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD anchor-free detector (det_10g) over the full-color frame:
//! letterbox to 640×640, per-stride score/bbox/keypoint decode, NMS, then
//! coordinate de-mapping back to frame space.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use rollcall_core::capabilities::{FaceLocator, ModelError};
use rollcall_core::types::BoundingBox;

// --- Named constants ---
const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const CONFIDENCE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: u32 = 2;
/// 3 strides × (scores, bboxes, keypoints).
const EXPECTED_OUTPUTS: usize = 9;

/// Letterbox geometry for mapping detections back to the source frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    /// Fit `src` inside the square model input, centered.
    fn fit(src_width: u32, src_height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / src_width as f32)
            .min(INPUT_SIZE as f32 / src_height as f32);
        let fitted_w = (src_width as f32 * scale).round();
        let fitted_h = (src_height as f32 * scale).round();
        Self {
            scale,
            pad_x: (INPUT_SIZE as f32 - fitted_w) / 2.0,
            pad_y: (INPUT_SIZE as f32 - fitted_h) / 2.0,
        }
    }

    /// Map a point from letterboxed model space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// SCRFD-based face detector over color frames.
pub struct ScrfdDetector {
    session: Session,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(2)?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| ModelError::InferenceFailed(format!("loading SCRFD: {e}")))?;

        let num_outputs = session.outputs().len();
        if num_outputs != EXPECTED_OUTPUTS {
            return Err(ModelError::InferenceFailed(format!(
                "SCRFD model must expose {EXPECTED_OUTPUTS} outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        tracing::info!(path = %model_path.display(), "SCRFD detector loaded");
        Ok(Self { session })
    }

    /// Letterbox the frame and pack it into a normalized NCHW tensor.
    ///
    /// The tensor is zero-initialized; since normalization maps the pixel
    /// mean to 0.0, the padding border is implicitly mean-valued.
    fn preprocess(frame: &RgbImage) -> (Array4<f32>, Letterbox) {
        let letterbox = Letterbox::fit(frame.width(), frame.height());
        let fitted_w = (frame.width() as f32 * letterbox.scale).round() as u32;
        let fitted_h = (frame.height() as f32 * letterbox.scale).round() as u32;
        let resized = imageops::resize(frame, fitted_w.max(1), fitted_h.max(1), FilterType::Triangle);

        let x0 = letterbox.pad_x.floor() as usize;
        let y0 = letterbox.pad_y.floor() as usize;

        let mut tensor =
            Array4::<f32>::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
        for (px, py, pixel) in resized.enumerate_pixels() {
            let tx = x0 + px as usize;
            let ty = y0 + py as usize;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
            }
        }

        (tensor, letterbox)
    }
}

impl FaceLocator for ScrfdDetector {
    /// Detect faces, returning boxes sorted by descending confidence.
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, ModelError> {
        let (input, letterbox) = Self::preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())
                .map_err(|e| ModelError::InferenceFailed(format!("SCRFD input: {e}")))?])
            .map_err(|e| ModelError::InferenceFailed(format!("SCRFD inference: {e}")))?;

        let mut detections = Vec::new();
        for (stride_pos, &stride) in STRIDES.iter().enumerate() {
            // Positional output layout: [0-2] scores, [3-5] bboxes, [6-8] kps.
            let (_, scores) = outputs[stride_pos].try_extract_tensor::<f32>().map_err(|e| {
                ModelError::InferenceFailed(format!("SCRFD scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) =
                outputs[3 + stride_pos].try_extract_tensor::<f32>().map_err(|e| {
                    ModelError::InferenceFailed(format!("SCRFD bboxes stride {stride}: {e}"))
                })?;
            let (_, kps) = outputs[6 + stride_pos].try_extract_tensor::<f32>().map_err(|e| {
                ModelError::InferenceFailed(format!("SCRFD keypoints stride {stride}: {e}"))
            })?;

            detections.extend(decode_stride(scores, bboxes, kps, stride, &letterbox));
        }

        let mut faces = nms(detections, NMS_IOU_THRESHOLD);
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(faces)
    }
}

/// Decode one stride level into frame-space detections.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: u32,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid = (INPUT_SIZE / stride) as usize;
    let anchors = grid * grid * ANCHORS_PER_CELL as usize;
    let mut out = Vec::new();

    for idx in 0..anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= CONFIDENCE_THRESHOLD {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL as usize;
        let anchor_x = ((cell % grid) * stride as usize) as f32;
        let anchor_y = ((cell / grid) * stride as usize) as f32;

        // Box offsets are [left, top, right, bottom] distances in stride units.
        let b = idx * 4;
        if b + 3 >= bboxes.len() {
            continue;
        }
        let (x1, y1) = letterbox.unmap(
            anchor_x - bboxes[b] * stride as f32,
            anchor_y - bboxes[b + 1] * stride as f32,
        );
        let (x2, y2) = letterbox.unmap(
            anchor_x + bboxes[b + 2] * stride as f32,
            anchor_y + bboxes[b + 3] * stride as f32,
        );

        let k = idx * 10;
        let landmarks = if k + 9 < kps.len() {
            let mut points = [(0.0f32, 0.0f32); 5];
            for (i, point) in points.iter_mut().enumerate() {
                *point = letterbox.unmap(
                    anchor_x + kps[k + i * 2] * stride as f32,
                    anchor_y + kps[k + i * 2 + 1] * stride as f32,
                );
            }
            Some(points)
        } else {
            None
        };

        out.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    out
}

/// Non-maximum suppression over IoU.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x + a.width).min(b.x + b.width) - a.x.max(b.x);
    let iy = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
    let inter = ix.max(0.0) * iy.max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
