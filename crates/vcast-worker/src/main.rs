//! Export worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcast_media::{check_ffmpeg, CaptionRasterizer, RenderPool};
use vcast_storage::storage_from_env;
use vcast_store::JobStore;
use vcast_worker::{metrics, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vcast=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vcast-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = check_ffmpeg() {
        error!("FFmpeg is not available: {}", e);
        std::process::exit(1);
    }

    if let Some(port) = config.metrics_port {
        match metrics::install_exporter(port) {
            Ok(()) => info!("Serving worker metrics on port {}", port),
            Err(e) => error!("Failed to start metrics exporter: {}", e),
        }
    }

    let store = match JobStore::from_env() {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open job store: {}", e);
            std::process::exit(1);
        }
    };

    let storage = match storage_from_env().await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to configure artifact storage: {}", e);
            std::process::exit(1);
        }
    };
    info!("Artifact storage backend: {}", storage.backend());

    let pool = match RenderPool::start(config.render_threads, Arc::new(CaptionRasterizer::new())) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            error!("Failed to start render pool: {}", e);
            std::process::exit(1);
        }
    };

    let executor = match JobExecutor::new(config, store, storage, pool) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to create job executor: {}", e);
            std::process::exit(1);
        }
    };

    // Finish the in-flight job on ctrl-c, then stop
    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.send_replace(true);
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
