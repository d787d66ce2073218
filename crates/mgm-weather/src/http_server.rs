//! HTTP API
//!
//! `GET /api/weather` serves the latest snapshot, `GET /` a short
//! description of the service.

use crate::service::WeatherService;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

/// Message shown to clients when the fetch fails.
pub const FETCH_FAILED_MESSAGE: &str = "Hava durumu verileri alınamadı.";

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
}

/// JSON body of a failed weather request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

/// GET / - Service description
async fn index(State(state): State<AppState>) -> Html<String> {
    let minutes = state.service.ttl().as_secs().div_ceil(60);
    Html(format!(
        "<h1>Karaman Hava Durumu API - Çalışıyor 🚀</h1>\
         <p>Veri almak için: <a href=\"/api/weather\">/api/weather</a></p>\
         <p>Veriler {} dakikada bir güncellenir.</p>",
        minutes
    ))
}

/// GET /api/weather - Latest weather snapshot
async fn get_weather(State(state): State<AppState>) -> Response {
    match state.service.current().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            log::error!("Weather request failed: {}", e);
            let body = ErrorResponse {
                error: FETCH_FAILED_MESSAGE.to_string(),
                detail: e.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// GET /health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Create the HTTP router
pub fn create_router(service: Arc<WeatherService>) -> Router {
    let state = AppState { service };

    // Browser clients on other origins call the API directly
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/api/weather", get(get_weather))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server until `shutdown` fires
pub async fn run_http_server(
    service: Arc<WeatherService>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}
