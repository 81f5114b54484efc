//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::config::SERVICE_NAME;
use crate::AppState;

/// Which satellites are configured
#[derive(Debug, Serialize)]
pub struct SatelliteFlags {
    pub crm_mirror: bool,
    pub email: bool,
    pub webhook: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("onboard-sync")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Short git hash at build time
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub satellites: SatelliteFlags,
    pub events: EventBusStats,
}

/// Event bus occupancy
#[derive(Debug, Serialize)]
pub struct EventBusStats {
    pub subscribers: usize,
    pub capacity: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        satellites: SatelliteFlags {
            crm_mirror: state.config.crm.enabled,
            email: state.config.email.enabled,
            webhook: state.config.webhook.enabled,
        },
        events: EventBusStats {
            subscribers: state.event_bus.subscriber_count(),
            capacity: state.event_bus.capacity(),
        },
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
