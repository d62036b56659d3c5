// SPDX-License-Identifier: MIT

use glucolink::config::Config;
use glucolink::db::Store;
use glucolink::routes::create_router;
use glucolink::services::{ActivityProcessor, CryptoService, QueueOptions, StravaService};
use glucolink::AppState;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

/// Create a test app with in-memory state (no network dependencies).
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let store = Store::new();
    let crypto = CryptoService::new(&config.encryption_key).expect("test key is 32 bytes");

    let strava = StravaService::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        store.clone(),
    );

    let processor = ActivityProcessor::new(
        strava.clone(),
        store.clone(),
        crypto.clone(),
        config.app_base_url.clone(),
    );
    let queue = processor.into_queue(QueueOptions::default());

    let state = Arc::new(AppState {
        config,
        store,
        queue,
        strava,
        crypto,
    });

    (create_router(state.clone()), state)
}

/// Compute the webhook signature the way Strava does: HMAC-SHA256 hex over
/// the raw body, keyed by the client secret.
#[allow(dead_code)]
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("any key size works");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
