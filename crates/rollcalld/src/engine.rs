use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::capabilities::ModelError;
use rollcall_core::gallery::GalleryError;
use rollcall_core::pipeline::PipelineError;
use rollcall_core::{AttendanceLedger, Gallery, VerificationPipeline, VerificationResult};
use rollcall_models::{ArcFaceEncoder, LandmarkRegressor, ScrfdDetector};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("gallery build error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Gallery counts captured at build time, for status reporting.
#[derive(Debug, Clone, Copy)]
pub struct GallerySummary {
    pub identities: usize,
    pub entries: usize,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Verify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<VerificationResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one frame through the verification pipeline.
    pub async fn verify(&self, image: Vec<u8>) -> Result<VerificationResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    #[cfg(test)]
    fn from_sender(tx: mpsc::Sender<EngineRequest>) -> Self {
        Self { tx }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads all three ONNX models and builds the gallery synchronously
/// (fail-fast at startup), then enters the request loop. All inference is
/// blocking and stays on this thread; handlers communicate over channels.
pub fn spawn_engine(
    config: &Config,
    ledger: Arc<AttendanceLedger>,
) -> Result<(EngineHandle, GallerySummary), EngineError> {
    let mut locator = ScrfdDetector::load(&rollcall_models::detector_model_path(&config.model_dir))?;
    let landmarker =
        LandmarkRegressor::load(&rollcall_models::landmark_model_path(&config.model_dir))?;
    let mut encoder = ArcFaceEncoder::load(&rollcall_models::encoder_model_path(&config.model_dir))?;

    let gallery = Gallery::build(&config.gallery_dir, &mut locator, &mut encoder)?;
    if gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "gallery is empty — every verification will fail until reference images are added"
        );
    }
    let summary = GallerySummary {
        identities: gallery.identity_count(),
        entries: gallery.len(),
    };

    let mut pipeline = VerificationPipeline::new(
        Box::new(locator),
        Box::new(landmarker),
        Box::new(encoder),
        Arc::new(gallery),
        ledger,
        config.settings(),
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify { image, reply } => {
                        let now = chrono::Local::now().naive_local();
                        let result = pipeline.verify(&image, now).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok((EngineHandle { tx }, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_channel_reports_engine_gone() {
        let (tx, rx) = mpsc::channel::<EngineRequest>(1);
        drop(rx);
        let handle = EngineHandle::from_sender(tx);
        let err = handle.verify(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }
}
