// SPDX-License-Identifier: MIT

//! GlucoLink API Server
//!
//! Links Strava with CGM data providers: new activities arrive via webhook,
//! get enriched with a glucose summary, and the summary is written back to
//! the activity description.

use glucolink::{
    config::Config,
    db::Store,
    services::{ActivityProcessor, CryptoService, QueueOptions, StravaService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting GlucoLink API");

    // Keyed store (in-memory backend)
    let store = Store::new();

    // Credential encryption service
    let crypto =
        CryptoService::new(&config.encryption_key).expect("Failed to initialize crypto service");

    // Strava service (token refresh + API calls)
    let strava = StravaService::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        store.clone(),
    );

    // Enrichment pipeline: processor + single-consumer job queue.
    // Queue state is in-memory only; a restart drops queued work.
    let processor = ActivityProcessor::new(
        strava.clone(),
        store.clone(),
        crypto.clone(),
        config.app_base_url.clone(),
    );
    let queue = processor.into_queue(QueueOptions::default());
    tracing::info!("Enrichment queue started");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        queue,
        strava,
        crypto,
    });

    // Build router
    let app = glucolink::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("glucolink=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
