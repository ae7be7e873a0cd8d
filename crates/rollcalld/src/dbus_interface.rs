use std::sync::Arc;

use zbus::interface;

use rollcall_core::VerificationResult;

use crate::engine::{EngineHandle, GallerySummary};

const STATUS_ACCEPTED: u16 = 200;
const STATUS_REJECTED: u16 = 400;
const STATUS_INTERNAL: u16 = 500;

/// Shared state accessible by D-Bus method handlers. Read-only after
/// startup, so no lock is needed.
pub struct AppState {
    pub engine: EngineHandle,
    pub gallery: GallerySummary,
    pub ear_threshold: f32,
    pub match_threshold: f32,
    pub ledger_path: String,
}

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.freedesktop.Rollcall1
/// Object path: /org/freedesktop/Rollcall1
pub struct RollcallService {
    pub state: Arc<AppState>,
}

/// Map a pipeline verdict to the wire response: status code plus body.
///
/// Accepted frames answer with the identity label; every rejection answers
/// 400 with its own message. Internal failures never reach this function —
/// they are masked by the handler.
fn verdict_response(result: &VerificationResult) -> (u16, String) {
    match result {
        VerificationResult::Accepted { name } => (STATUS_ACCEPTED, name.clone()),
        VerificationResult::Rejected(rejection) => {
            (STATUS_REJECTED, rejection.message().to_string())
        }
    }
}

#[interface(name = "org.freedesktop.Rollcall1")]
impl RollcallService {
    /// Verify one uploaded frame and, on success, mark attendance.
    ///
    /// Returns (status, body): 200 with the identity label, 400 with a
    /// rejection message, or 500 with a generic message. Internal failure
    /// details go to the daemon log only.
    async fn verify_frame(&self, image: Vec<u8>) -> (u16, String) {
        let request_id = uuid::Uuid::new_v4();
        tracing::info!(%request_id, bytes = image.len(), "verify frame requested");

        match self.state.engine.verify(image).await {
            Ok(result) => {
                let (status, body) = verdict_response(&result);
                tracing::info!(%request_id, status, body, "verify frame complete");
                (status, body)
            }
            Err(err) => {
                tracing::error!(%request_id, error = %err, "verify frame failed internally");
                (STATUS_INTERNAL, "Internal server error".to_string())
            }
        }
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery_identities": self.state.gallery.identities,
            "gallery_entries": self.state.gallery.entries,
            "ear_threshold": self.state.ear_threshold,
            "match_threshold": self.state.match_threshold,
            "ledger": self.state.ledger_path,
        })
        .to_string())
    }
}
