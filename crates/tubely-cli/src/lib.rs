use serde::Serialize;
use std::path::Path;
use tubely_core::Orientation;
use tubely_processing::{classify_streams, ProbeError, StreamInfo};

/// What `tubely probe` prints.
#[derive(Debug, Serialize)]
pub struct ProbeSummary {
    pub path: String,
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,
    pub codec: Option<String>,
    pub video_streams: usize,
}

impl ProbeSummary {
    pub fn from_streams(path: &Path, streams: &[StreamInfo]) -> Result<Self, ProbeError> {
        let orientation = classify_streams(streams)?;
        let first = &streams[0];
        Ok(Self {
            path: path.display().to_string(),
            orientation,
            width: first.width,
            height: first.height,
            codec: first.codec_name.clone(),
            video_streams: streams.len(),
        })
    }
}

/// Resolves once Ctrl+C or SIGTERM is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
