//! Identity matching: nearest gallery embedding under a distance threshold.

use thiserror::Error;

use crate::types::{Embedding, GalleryEntry};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("gallery is empty — no enrolled identities")]
    NoGallery,
}

/// Verdict of comparing a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchVerdict {
    /// The nearest entry was strictly below the acceptance threshold.
    Matched { label: String, distance: f32 },
    /// No entry was close enough; carries the nearest distance for logging.
    Unmatched { nearest: f32 },
}

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn find_match(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchVerdict, MatchError>;
}

/// Euclidean nearest-neighbor matcher.
///
/// Scans every gallery entry with no early exit and selects the minimum
/// distance. On an exact tie the earliest entry wins, making the result
/// deterministic under a fixed gallery order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find_match(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchVerdict, MatchError> {
        if gallery.is_empty() {
            return Err(MatchError::NoGallery);
        }

        let mut best_distance = f32::INFINITY;
        let mut best_idx = 0usize;

        for (i, entry) in gallery.iter().enumerate() {
            let d = probe.distance(&entry.embedding);
            if d < best_distance {
                best_distance = d;
                best_idx = i;
            }
        }

        if best_distance < threshold {
            Ok(MatchVerdict::Matched {
                label: gallery[best_idx].label.clone(),
                distance: best_distance,
            })
        } else {
            Ok(MatchVerdict::Unmatched {
                nearest: best_distance,
            })
        }
    }
}
