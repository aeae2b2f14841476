//! Tubely CLI: probe and ingest local video files.
//!
//! `ingest` reads the same environment as the service (see `.env`): storage
//! backend, staging directory, ffmpeg/ffprobe paths and limits.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tubely_cli::{init_tracing, shutdown_signal, ProbeSummary};
use tubely_core::{AppError, Config, ErrorMetadata, Video};
use tubely_db::MemoryVideoRepository;
use tubely_processing::{FfprobeService, UploadedAsset, VideoIngestService};
use tubely_storage::create_storage;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tubely", about = "Tubely video ingestion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the orientation and geometry of a local video
    Probe {
        /// Path to the video file
        file: PathBuf,
        /// ffprobe binary
        #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
        ffprobe: String,
        /// Seconds before ffprobe is killed
        #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value = "600")]
        timeout_secs: u64,
    },
    /// Remux, classify and publish a local video, then print the committed record
    Ingest {
        /// Path to the video file
        file: PathBuf,
        /// Declared content type of the upload
        #[arg(long, default_value = "video/mp4")]
        content_type: String,
        /// Title for the transient video record
        #[arg(long)]
        title: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Probe {
            file,
            ffprobe,
            timeout_secs,
        } => {
            let prober = FfprobeService::new(ffprobe, Duration::from_secs(timeout_secs))?;
            let streams = prober
                .probe(&file)
                .await
                .with_context(|| format!("Failed to probe {}", file.display()))?;
            print_json(&ProbeSummary::from_streams(&file, &streams)?)?;
        }
        Commands::Ingest {
            file,
            content_type,
            title,
        } => {
            let config = Config::from_env().context("Invalid configuration")?;
            let storage = create_storage(&config)
                .await
                .context("Failed to initialize storage")?;
            let videos = MemoryVideoRepository::new();

            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            });
            let video = Video::new(Uuid::new_v4(), title);
            videos.insert(video.clone()).await;

            let service = VideoIngestService::from_config(&config, storage, Arc::new(videos))?;
            let upload = UploadedAsset::from_file(&file, content_type)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;

            let token = CancellationToken::new();
            let canceller = token.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                canceller.cancel();
            });

            match service
                .upload_video_until_cancelled(video.id, video.user_id, upload, token)
                .await
            {
                Ok(committed) => print_json(&committed)?,
                Err(e) => {
                    let stage = e.stage();
                    let app: AppError = e.into();
                    tracing::error!(
                        stage = %stage,
                        code = app.error_code(),
                        error = %app,
                        diagnostics = app.diagnostics().unwrap_or(""),
                        "Ingestion failed"
                    );
                    anyhow::bail!("{} ({})", app.client_message(), app.error_code());
                }
            }
        }
    }

    Ok(())
}
