use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[zbus::proxy(
    interface = "org.freedesktop.Rollcall1",
    default_service = "org.freedesktop.Rollcall1",
    default_path = "/org/freedesktop/Rollcall1"
)]
trait Rollcall {
    async fn verify_frame(&self, image: Vec<u8>) -> zbus::Result<(u16, String)>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an image file for verification
    Verify {
        /// Path to the frame to verify (any common raster format)
        image: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus — is rollcalld running?")?;
    let proxy = RollcallProxy::new(&connection).await?;

    match cli.command {
        Commands::Verify { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let (status, body) = proxy.verify_frame(bytes).await?;
            match status {
                200 => println!("accepted: {body}"),
                400 => {
                    println!("rejected: {body}");
                    std::process::exit(1);
                }
                _ => {
                    eprintln!("error: {body}");
                    std::process::exit(2);
                }
            }
        }
        Commands::Status => {
            let status = proxy.status().await?;
            println!("{status}");
        }
    }

    Ok(())
}
