//! Axum HTTP handlers for the weather gateway.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, info};
use weather_core::WeatherError;

use crate::AppState;

// ------------------------------------------------------------------ //
//  GET /weather/cache-stats                                           //
// ------------------------------------------------------------------ //

/// Current cache contents keyed by city, oldest insertion first.
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.service.cache().snapshot();
    info!(entries = snapshot.len(), "GET /weather/cache-stats");
    Json(snapshot)
}

/// Any method other than GET on the stats route. Also bound to HEAD
/// explicitly, since axum otherwise answers HEAD with the GET handler.
pub async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

// ------------------------------------------------------------------ //
//  GET /weather/:city                                                 //
// ------------------------------------------------------------------ //

pub async fn get_weather(
    State(state): State<Arc<AppState>>,
    Path(city): Path<String>,
) -> impl IntoResponse {
    match state.service.get_weather(&city).await {
        Ok(record) => (StatusCode::OK, Json(serde_json::json!(record))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(city = %city, error = %e, "weather lookup failed");
            }
            (status, Json(serde_json::json!({"error": e.to_string()})))
        }
    }
}

fn status_for(err: &WeatherError) -> StatusCode {
    match err {
        WeatherError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        WeatherError::Fetch { source, .. } if source.status() == Some(404) => StatusCode::NOT_FOUND,
        WeatherError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        WeatherError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ------------------------------------------------------------------ //
//  GET /health                                                        //
// ------------------------------------------------------------------ //

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
