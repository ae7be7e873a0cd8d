use std::path::PathBuf;

use rollcall_core::pipeline::PipelineSettings;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory with one subdirectory of reference images per identity.
    pub gallery_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the attendance CSV ledger.
    pub ledger_path: PathBuf,
    /// Averaged eye-aspect-ratio threshold for the blink liveness gate.
    pub ear_threshold: f32,
    /// Maximum embedding distance accepted as a match.
    pub match_threshold: f32,
    /// Minimum face bounding-box side in pixels.
    pub min_face_px: f32,
    /// Jitter passes for the final, high-accuracy encoding.
    pub encoder_jitters: u32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_models::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let gallery_dir = std::env::var("ROLLCALL_GALLERY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery"));

        let ledger_path = std::env::var("ROLLCALL_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.csv"));

        Self {
            gallery_dir,
            model_dir,
            ledger_path,
            ear_threshold: env_f32("ROLLCALL_EAR_THRESHOLD", 0.23),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", 0.5),
            min_face_px: env_f32("ROLLCALL_MIN_FACE_PX", 60.0),
            encoder_jitters: env_u32("ROLLCALL_ENCODER_JITTERS", 2),
        }
    }

    /// Pipeline thresholds derived from this configuration.
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            ear_threshold: self.ear_threshold,
            match_threshold: self.match_threshold,
            min_face_px: self.min_face_px,
            encoder_jitters: self.encoder_jitters,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
