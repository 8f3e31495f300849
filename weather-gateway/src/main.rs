//! Weather gateway — HTTP front end for cached OpenWeather lookups.
//!
//! Registers one weather service for the configured API key, optionally
//! polls a fixed city list in the background, and serves the cache over HTTP.
//!
//! # Environment variables
//! | Var                              | Default                |
//! |----------------------------------|------------------------|
//! | `WEATHER_API_KEY`                | required               |
//! | `WEATHER_HTTP_ADDR`              | `0.0.0.0:8080`         |
//! | `WEATHER_POLLING_ENABLED`        | `false`                |
//! | `WEATHER_POLLING_PERIOD_MINUTES` | `10`                   |
//! | `WEATHER_CITIES`                 | built-in list          |
//! | `WEATHER_CACHE_CAPACITY`         | `10`                   |
//! | `WEATHER_CACHE_TTL_MS`           | `600000`               |
//! | `WEATHER_UNITS`                  | `metric`               |
//! | `WEATHER_LANG`                   | `en`                   |

mod handlers;
mod settings;

use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use weather_core::{InstanceRegistry, OpenWeatherClient, WeatherService};

use crate::settings::Settings;

// ------------------------------------------------------------------ //
//  Shared application state                                           //
// ------------------------------------------------------------------ //

/// Shared state injected into every Axum handler via `State`.
pub struct AppState {
    /// Service registered for the configured API key.
    pub service: Arc<WeatherService>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/weather/cache-stats",
            get(handlers::cache_stats)
                .head(handlers::method_not_allowed)
                .fallback(handlers::method_not_allowed),
        )
        .route("/weather/:city", get(handlers::get_weather))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ------------------------------------------------------------------ //
//  Entry point                                                        //
// ------------------------------------------------------------------ //

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weather_gateway=info".parse()?)
                .add_directive("weather_core=info".parse()?),
        )
        .json()
        .init();

    let settings = Settings::load()?;
    let cities = settings.city_list();

    let registry = InstanceRegistry::new(
        OpenWeatherClient::factory(&settings.units, &settings.lang),
        settings.cache_config()?,
    );
    let service = registry.init(
        &settings.api_key,
        settings.polling_enabled,
        settings.polling_period_minutes,
        &cities,
    )?;
    info!(
        instance = %service.id(),
        credential = %service.fingerprint(),
        polling = service.is_polling(),
        cities = cities.len(),
        "weather service ready"
    );

    // Without polling, fetch each city once so the cache starts warm.
    if !settings.polling_enabled {
        tokio::spawn(warm_cache(service.clone(), cities));
    }

    let app = router(Arc::new(AppState { service }));

    let listener = tokio::net::TcpListener::bind(&settings.http_addr).await?;
    info!(addr = %settings.http_addr, "weather gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    info!("weather gateway stopped");

    Ok(())
}

async fn warm_cache(service: Arc<WeatherService>, cities: Vec<String>) {
    let mut warmed = 0usize;
    for city in &cities {
        match service.get_weather(city).await {
            Ok(record) => {
                warmed += 1;
                info!(
                    city = %record.name,
                    temp = record.temperature.temp,
                    conditions = %record.weather.description,
                    "cache warmed"
                );
            }
            Err(e) => warn!(city = %city, error = %e, "cache warm-up failed"),
        }
    }
    info!(warmed, total = cities.len(), "cache warm-up complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
