//! rollcall-core — Camera-based attendance verification pipeline.
//!
//! One uploaded frame flows through preprocessing, face localization, a
//! blink-based liveness gate, embedding extraction and gallery matching,
//! ending in an idempotent attendance record. Detection, landmarking and
//! embedding models sit behind the capability traits in [`capabilities`];
//! ONNX-backed implementations live in the `rollcall-models` crate.

pub mod capabilities;
pub mod gallery;
pub mod geometry;
pub mod ledger;
pub mod liveness;
pub mod matcher;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use capabilities::{FaceEncoder, FaceLocator, LandmarkPredictor, ModelError};
pub use gallery::Gallery;
pub use ledger::AttendanceLedger;
pub use pipeline::{PipelineSettings, VerificationPipeline};
pub use types::{BoundingBox, Embedding, GalleryEntry, LandmarkSet, Rejection, VerificationResult};
