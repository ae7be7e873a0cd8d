//! Gallery of known identities, built once at startup.
//!
//! The gallery directory holds one subdirectory per identity label, each
//! containing one or more reference images. Every readable image
//! contributes the embedding of its first detected face; images with no
//! detectable face are skipped, since low-quality reference shots are
//! expected. The built gallery is immutable for the life of the process.

use std::path::Path;

use thiserror::Error;

use crate::capabilities::{FaceEncoder, FaceLocator, ModelError};
use crate::types::GalleryEntry;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read gallery directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Immutable set of (label, embedding) reference entries.
#[derive(Debug, Clone)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    identity_count: usize,
}

impl Gallery {
    /// Build the gallery by running detection and encoding over every
    /// reference image under `dir`.
    ///
    /// Identity subdirectories and the images inside them are visited in
    /// name order, so entry order (and therefore match tie-breaking) is
    /// deterministic. Inference failures abort the build; unreadable or
    /// faceless images merely reduce coverage.
    pub fn build(
        dir: &Path,
        locator: &mut dyn FaceLocator,
        encoder: &mut dyn FaceEncoder,
    ) -> Result<Self, GalleryError> {
        let mut entries = Vec::new();
        let mut identity_count = 0usize;

        for person_dir in sorted_entries(dir)? {
            if !person_dir.is_dir() {
                continue;
            }
            let Some(label) = person_dir.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %person_dir.display(), "skipping non-UTF-8 identity directory");
                continue;
            };
            let label = label.to_string();
            identity_count += 1;
            let before = entries.len();

            for image_path in sorted_entries(&person_dir)? {
                let image = match image::open(&image_path) {
                    Ok(img) => img.to_rgb8(),
                    Err(err) => {
                        tracing::debug!(
                            path = %image_path.display(),
                            error = %err,
                            "skipping unreadable reference image"
                        );
                        continue;
                    }
                };

                let faces = locator.locate(&image)?;
                let Some(face) = faces.first() else {
                    tracing::debug!(
                        path = %image_path.display(),
                        "skipping reference image with no detectable face"
                    );
                    continue;
                };

                match encoder.encode(&image, face, 0)? {
                    Some(embedding) => entries.push(GalleryEntry {
                        label: label.clone(),
                        embedding,
                    }),
                    None => tracing::debug!(
                        path = %image_path.display(),
                        "skipping reference image that failed to encode"
                    ),
                }
            }

            tracing::info!(
                label,
                entries = entries.len() - before,
                "gallery identity enrolled"
            );
        }

        tracing::info!(
            identities = identity_count,
            entries = entries.len(),
            "gallery build complete"
        );

        Ok(Self {
            entries,
            identity_count,
        })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of identity subdirectories seen at build time (including those
    /// whose images all failed to contribute an entry).
    pub fn identity_count(&self) -> usize {
        self.identity_count
    }

    /// Build directly from entries. Intended for tests and tools.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        let mut labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        let identity_count = labels.len();
        Self {
            entries,
            identity_count,
        }
    }
}

/// Directory entries sorted by path for a stable build order.
fn sorted_entries(dir: &Path) -> Result<Vec<std::path::PathBuf>, GalleryError> {
    let read = std::fs::read_dir(dir).map_err(|source| GalleryError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let mut paths: Vec<_> = read
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();
    Ok(paths)
}
