//! Single-frame blink liveness gate.
//!
//! The pipeline works on one snapshot, so liveness is judged by whether the
//! frame was captured *during* an eyelid closure: the client instructs the
//! subject to blink while submitting, and a frame whose averaged eye aspect
//! ratio falls below the threshold is taken as a blink caught mid-motion.
//! Frames showing steadily open eyes (a propped-up photo, a screen replay of
//! a still) read as `NotLive`.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Static photographs and still-image replays with open eyes.
//! - **Does not block:** A photograph of someone mid-blink, or video replay
//!   of a blink. Single-frame EAR is a deliberately weak heuristic.

use crate::geometry::{self, GeometryError};
use crate::types::LandmarkSet;

/// Default averaged-EAR threshold below which a frame counts as a blink.
pub const DEFAULT_EAR_THRESHOLD: f32 = 0.23;

/// Verdict of the blink gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    Live,
    NotLive,
}

/// Result of evaluating one landmark set, with the measured signal for logs.
#[derive(Debug, Clone)]
pub struct BlinkCheck {
    pub verdict: LivenessVerdict,
    /// Mean of the left and right eye aspect ratios.
    pub averaged_ear: f32,
}

/// Evaluate the blink gate over one landmark set.
///
/// Computes the EAR of each six-point eye contour, averages the two, and
/// classifies `Live` when the average is strictly below `threshold`.
/// Degenerate eye geometry propagates as [`GeometryError`]; the caller
/// treats that as "liveness could not be evaluated", not as a verdict.
pub fn evaluate_blink(
    landmarks: &LandmarkSet,
    threshold: f32,
) -> Result<BlinkCheck, GeometryError> {
    let left = geometry::eye_aspect_ratio(landmarks.left_eye())?;
    let right = geometry::eye_aspect_ratio(landmarks.right_eye())?;
    let averaged_ear = (left + right) / 2.0;

    let verdict = if averaged_ear < threshold {
        LivenessVerdict::Live
    } else {
        LivenessVerdict::NotLive
    };

    tracing::debug!(
        left_ear = left,
        right_ear = right,
        averaged_ear,
        threshold,
        ?verdict,
        "blink gate evaluated"
    );

    Ok(BlinkCheck {
        verdict,
        averaged_ear,
    })
}
