use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use filecity::config::Cli;
use filecity::favourites::FavouritesStore;
use filecity::lsof::LsofSnapshotCache;
use filecity::sandbox::PathSandbox;
use filecity::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(cli.log_file.as_deref());

    let config = cli.into_config().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    if config.reload {
        info!("auto-reload requested; the compiled server must be restarted to pick up changes");
    }

    let sandbox = Arc::new(PathSandbox::new(&config.root_dir)?);
    let lsof = match config.lsof.clone() {
        Some(settings) => LsofSnapshotCache::new(Arc::clone(&sandbox), settings),
        None => LsofSnapshotCache::disabled(Arc::clone(&sandbox)),
    };
    let state = Arc::new(AppState {
        sandbox,
        favourites: FavouritesStore::new(&config.favourites_file),
        lsof,
        static_dir: config.static_dir.clone(),
    });

    info!(
        "filecity starting: root={}, process monitoring={}",
        config.root_dir.display(),
        if config.lsof_enabled() { "yes" } else { "no" }
    );

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    if let Err(e) = server::serve(state, listener, shutdown_signal()).await {
        error!("server error: {}", e);
        return Err(e.into());
    }

    info!("filecity stopped");
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_file {
        Some(log_file) => {
            let log_dir = log_file.parent().unwrap_or_else(|| Path::new("."));
            let log_name = log_file
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("filecity.log"));
            let file_appender = tracing_appender::rolling::never(log_dir, log_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down...");
}
