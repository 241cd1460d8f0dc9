pub mod handlers;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::favourites::FavouritesStore;
use crate::lsof::LsofSnapshotCache;
use crate::sandbox::PathSandbox;

/// Everything a request handler needs. Built once at startup.
pub struct AppState {
    pub sandbox: Arc<PathSandbox>,
    pub favourites: FavouritesStore,
    pub lsof: LsofSnapshotCache,
    pub static_dir: PathBuf,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let index = ServeFile::new(state.static_dir.join("index.html"));
    let assets = ServeDir::new(&state.static_dir);

    Router::new()
        .route_service("/", index)
        .nest_service("/static", assets)
        .nest("/api", api_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/capabilities", get(handlers::capabilities))
        .route("/browse", get(handlers::browse))
        .route("/file-hex", get(handlers::file_hex))
        .route("/file-preview", get(handlers::file_preview))
        .route(
            "/favourites",
            get(handlers::list_favourites).post(handlers::set_favourite),
        )
        .route("/open-files", get(handlers::open_files))
        .route("/file-info", get(handlers::file_info))
}

/// Serve until `shutdown` resolves, then stop the lsof poller.
pub async fn serve<F>(
    state: Arc<AppState>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.lsof.start();
    info!("listening on {}", listener.local_addr()?);

    let result = axum::serve(listener, create_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown)
        .await;

    let poller = Arc::clone(&state);
    let _ = tokio::task::spawn_blocking(move || poller.lsof.stop()).await;
    result
}
