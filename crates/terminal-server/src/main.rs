//! terminal-server
//!
//! Axum backend for card-present payments: mints connection tokens, creates
//! intents and exposes the recovery operations the operator console uses.

mod config;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terminal_core::{IntentGateway, PaymentProcessor};
use terminal_payments::{StripeProcessor, mask_secret};

use crate::config::ServerConfig;
use crate::handlers::{
    cancel_all_payment_intents, cancel_latest_payment_intent, cancel_reader_action,
    connection_token, create_payment_intent, get_location_id, get_recent_payments, health_check,
    verify_location,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    let processor: Arc<dyn PaymentProcessor> = Arc::new(StripeProcessor::new(&config.secret_key));
    let gateway = IntentGateway::new(processor, config.location_id.clone())
        .with_default_currency(config.default_currency.clone());

    // A missing location is reported, not fatal; readers will fail discovery
    match gateway.verify_location().await {
        Ok(location) => tracing::info!(
            "✓ Terminal location {} ({})",
            location.id,
            location.display_name.as_deref().unwrap_or("unnamed")
        ),
        Err(e) => {
            tracing::warn!("⚠ Could not verify terminal location: {}", e);
            tracing::warn!("  Check STRIPE_TERMINAL_LOCATION_ID in .env");
        }
    }

    let state = AppState {
        gateway: Arc::new(gateway),
        masked_key: mask_secret(&config.secret_key).into(),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 terminal-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                        - Health check");
    tracing::info!("  POST /create-payment-intent         - Create intent");
    tracing::info!("  POST /connection-token              - Mint reader token");
    tracing::info!("  GET  /get-location-id               - Configured location");
    tracing::info!("  GET  /verify-location               - Location lookup");
    tracing::info!("  GET  /get-recent-payments           - Last 10 intents");
    tracing::info!("  POST /cancel-latest-payment-intent  - Cancel newest intent");
    tracing::info!("  POST /cancel-all-payment-intents    - Cancel last 10 intents");
    tracing::info!("  POST /readers/cancel-action         - Cancel reader action");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Payments
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/connection-token", post(connection_token))
        // Location
        .route("/get-location-id", get(get_location_id))
        .route("/verify-location", get(verify_location))
        // Recovery
        .route("/get-recent-payments", get(get_recent_payments))
        .route("/cancel-latest-payment-intent", post(cancel_latest_payment_intent))
        .route("/cancel-all-payment-intents", post(cancel_all_payment_intents))
        // Readers
        .route("/readers/cancel-action", post(cancel_reader_action))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
