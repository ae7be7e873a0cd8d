use serde::{Deserialize, Serialize};

/// Number of points in the canonical 68-point facial markup.
pub const LANDMARK_COUNT: usize = 68;

/// Dimensionality of face embeddings (ArcFace w600k_r50).
pub const EMBEDDING_DIM: usize = 512;

/// Semantic index ranges into the 68-point markup.
pub const LEFT_EYE: std::ops::Range<usize> = 42..48;
pub const RIGHT_EYE: std::ops::Range<usize> = 36..42;
pub const NOSE_TIP: usize = 30;
pub const CHIN: usize = 8;

/// Bounding box for a detected face, with optional detector landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point detector landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    /// Used for alignment before embedding extraction.
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// One full set of 68 facial landmarks for a single detected face.
///
/// Produced once per request and discarded with it. Indices follow the
/// canonical 68-point markup: the eye contours live at [`LEFT_EYE`] and
/// [`RIGHT_EYE`], six points each, ordered outer corner, two upper-lid
/// points, inner corner, two lower-lid points.
#[derive(Debug, Clone)]
pub struct LandmarkSet {
    points: [(f32, f32); LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [(f32, f32); LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a slice; returns `None` unless exactly 68 points are given.
    pub fn from_slice(points: &[(f32, f32)]) -> Option<Self> {
        let points: [(f32, f32); LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Six-point left eye contour (indices 42–47).
    pub fn left_eye(&self) -> &[(f32, f32)] {
        &self.points[LEFT_EYE]
    }

    /// Six-point right eye contour (indices 36–41).
    pub fn right_eye(&self) -> &[(f32, f32)] {
        &self.points[RIGHT_EYE]
    }

    pub fn nose_tip(&self) -> (f32, f32) {
        self.points[NOSE_TIP]
    }

    pub fn chin(&self) -> (f32, f32) {
        self.points[CHIN]
    }
}

/// Face embedding vector (512-dimensional, L2-normalized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute Euclidean distance to another embedding.
    ///
    /// Smaller = more similar. Dimensions beyond the shorter vector are
    /// ignored; callers are expected to compare embeddings from one model.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A reference identity in the gallery: label plus one embedding.
///
/// An identity with several reference images contributes several entries,
/// all carrying the same label.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// Terminal rejection reasons, one per pipeline gate.
///
/// Closed set: every rejection is request-scoped and reported to the caller
/// with its own message. Internal failures are NOT rejections — they
/// propagate as errors and surface as an opaque server error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyImage,
    InvalidFormat,
    NoFaceDetected,
    MultipleFacesDetected,
    FaceTooSmall,
    LivenessUnavailable,
    LivenessFailed,
    EncodingFailed,
    UnknownFace,
}

impl Rejection {
    /// The client-facing message for this rejection.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::EmptyImage => "Empty image file",
            Rejection::InvalidFormat => "Invalid image format",
            Rejection::NoFaceDetected => "No face detected",
            Rejection::MultipleFacesDetected => "Multiple faces detected. Show only your face.",
            Rejection::FaceTooSmall => "Face too small in frame. Come closer to the camera.",
            Rejection::LivenessUnavailable => "No face or liveness detection failed",
            Rejection::LivenessFailed => "Please blink to verify liveness",
            Rejection::EncodingFailed => "Face encoding failed",
            Rejection::UnknownFace => "Unknown face",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of one verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Identity verified and attendance recorded.
    Accepted { name: String },
    /// Request rejected at one of the pipeline gates.
    Rejected(Rejection),
}
