//! HTTP routes

mod download;
mod error;
mod health;
mod pages;


use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use download::DownloadStarted;
pub use error::ApiError;
pub use health::HealthResponse;
pub use pages::render_index;

pub fn router(state: AppState) -> Router {
    let static_dir = state.config.paths.static_dir.clone();
    let enable_cors = state.config.server.enable_cors;

    let mut app = Router::new()
        .route("/", get(pages::index))
        .route("/download", post(download::submit))
        .route("/videos", get(download::list_videos))
        .route("/health", get(health::health))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state);

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(TraceLayer::new_for_http())
}
