// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::charging_service::ChargingService;
use crate::infrastructure::awattar::AwattarClient;
use crate::infrastructure::config::load_config;
use crate::infrastructure::devices::HttpDeviceFactory;
use crate::infrastructure::http_client::build_client;
use crate::infrastructure::policy_store::TomlPolicyStore;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    apply_suggestion, calculation, charge_to_suggestion, charging_info, health_check,
    inverter_realtime, inverter_statistics, inverter_time_frame, prices, save_settings,
    set_charging_speed, set_pause_charging, wallbox_realtime,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_config()?;

    // Create adapters (infrastructure layer)
    let client = build_client(Duration::from_secs(config.endpoints.request_timeout_secs))?;
    let store = Arc::new(TomlPolicyStore::new(config.store.settings_dir.clone()));
    let devices = Arc::new(HttpDeviceFactory::new(
        client.clone(),
        config.endpoints.clone(),
    ));
    let price_provider = Arc::new(AwattarClient::new(
        client,
        config.endpoints.awattar.clone(),
        config.prices.vat_factor,
        Duration::from_secs(config.prices.cache_ttl_secs),
    ));

    // Create services (application layer)
    let charging_service =
        ChargingService::new(store, devices, price_provider, config.policy.clone());

    let state = Arc::new(AppState { charging_service });

    // Build router (presentation layer)
    // JSON bodies are compressed in the response builders, so no CompressionLayer
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route(
            "/users/:user/charging",
            get(charging_info).post(set_charging_speed),
        )
        .route("/users/:user/charging/to-suggestion", post(charge_to_suggestion))
        .route("/users/:user/suggestion/apply", get(apply_suggestion))
        .route("/users/:user/calculation", get(calculation))
        .route("/users/:user/inverter/realtime", get(inverter_realtime))
        .route("/users/:user/inverter/timeframe", get(inverter_time_frame))
        .route("/users/:user/inverter/statistics", get(inverter_statistics))
        .route("/users/:user/wallbox/realtime", get(wallbox_realtime))
        .route("/users/:user/settings", put(save_settings))
        .route("/users/:user/pause", post(set_pause_charging))
        .route("/prices", get(prices))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind_addr.parse()?;
    tracing::info!(%addr, "starting solar-charge-advisor");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
