use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use rollcall_core::AttendanceLedger;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::{AppState, RollcallService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        gallery = %config.gallery_dir.display(),
        models = %config.model_dir.display(),
        ledger = %config.ledger_path.display(),
        "rollcalld starting"
    );

    rollcall_models::verify_models_dir(&config.model_dir)
        .context("model integrity check failed")?;

    let ledger = Arc::new(
        AttendanceLedger::open(&config.ledger_path).context("opening attendance ledger")?,
    );

    let (engine, gallery) =
        engine::spawn_engine(&config, Arc::clone(&ledger)).context("starting engine")?;
    tracing::info!(
        identities = gallery.identities,
        entries = gallery.entries,
        "gallery ready"
    );

    let service = RollcallService {
        state: Arc::new(AppState {
            engine,
            gallery,
            ear_threshold: config.ear_threshold,
            match_threshold: config.match_threshold,
            ledger_path: config.ledger_path.display().to_string(),
        }),
    };

    let _conn = zbus::connection::Builder::session()?
        .name("org.freedesktop.Rollcall1")?
        .serve_at("/org/freedesktop/Rollcall1", service)?
        .build()
        .await
        .context("registering D-Bus service")?;

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
