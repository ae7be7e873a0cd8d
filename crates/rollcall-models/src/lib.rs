//! rollcall-models — ONNX-backed implementations of the model capability
//! traits, plus the model-file manifest and integrity checks.
//!
//! Three models: SCRFD detection (det_10g), 68-point landmark regression,
//! and ArcFace embedding (w600k_r50). Any other implementation of the
//! `rollcall-core` capability traits substitutes for these.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod landmarks;

pub use detector::ScrfdDetector;
pub use encoder::ArcFaceEncoder;
pub use landmarks::LandmarkRegressor;

/// Model file descriptor: filename, source URL, optional pinned checksum.
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    /// SHA-256 hex digest from the upstream Git LFS pointer, when published.
    pub sha256: Option<&'static str>,
    pub size_display: &'static str,
}

pub const MODELS: &[ModelFile] = &[
    ModelFile {
        name: "det_10g.onnx",
        url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/det_10g.onnx",
        sha256: Some("5838f7fe053675b1c7a08b633df49e7af5495cee0493c7dcf6697200b85b5b91"),
        size_display: "16 MB",
    },
    ModelFile {
        name: "landmarks_68.onnx",
        url: "https://huggingface.co/public-data/face-landmarks/resolve/main/landmarks_68.onnx",
        // Upstream publishes no LFS pointer for this export; presence-only check.
        sha256: None,
        size_display: "5 MB",
    },
    ModelFile {
        name: "w600k_r50.onnx",
        url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/w600k_r50.onnx",
        sha256: Some("4c06341c33c2ca1f86781dab0e829f88ad5b64be9fba56e56bc9ebdefc619e43"),
        size_display: "166 MB",
    },
];

/// Default model directory: `$ROLLCALL_MODEL_DIR` overrides at the config
/// layer; this is the packaged location.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}

pub fn detector_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join("det_10g.onnx")
}

pub fn landmark_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join("landmarks_68.onnx")
}

pub fn encoder_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join("w600k_r50.onnx")
}

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path}) — download from {url}")]
    MissingModel {
        name: &'static str,
        path: PathBuf,
        url: &'static str,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: &'static str,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Compute the SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let read_err = |source| ModelIntegrityError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that every manifest model exists under `model_dir`, checking the
/// SHA-256 digest where one is pinned.
pub fn verify_models_dir(model_dir: &Path) -> Result<(), ModelIntegrityError> {
    for model in MODELS {
        let path = model_dir.join(model.name);
        if !path.exists() {
            return Err(ModelIntegrityError::MissingModel {
                name: model.name,
                path,
                url: model.url,
            });
        }

        match model.sha256 {
            Some(expected) => {
                let digest = sha256_file_hex(&path)?;
                if digest != expected {
                    return Err(ModelIntegrityError::ChecksumMismatch {
                        name: model.name,
                        path,
                        expected: expected.to_string(),
                        got: digest,
                    });
                }
                tracing::debug!(name = model.name, "model checksum verified");
            }
            None => tracing::debug!(name = model.name, "model present (no pinned checksum)"),
        }
    }
    Ok(())
}
