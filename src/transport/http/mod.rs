pub mod errors;

use {
    crate::{
        AppState,
        adapters::daraja::{callback, initiate},
    },
    axum::{
        Json, Router,
        extract::{DefaultBodyLimit, State},
        http::StatusCode,
        routing::{get, post},
    },
    std::time::Duration,
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

/// Callback payloads and initiation forms are a few KB at most.
const BODY_LIMIT: usize = 64 * 1024;

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/stats", get(stats))
        .route("/stk-push-callback", post(callback::stk_push_callback))
        .route("/b2c-callback", post(callback::b2c_callback))
        .route("/stk-push", post(initiate::stk_push))
        .route("/b2c-payment", post(initiate::b2c_payment))
        .route("/transactions/{id}", get(initiate::transaction))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(BODY_LIMIT))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.correlator.stats();
    Json(serde_json::json!({
        "pending": stats.pending,
        "terminal": stats.terminal,
        "orphans": stats.orphans,
        "applied": stats.applied,
        "duplicates": stats.duplicates,
        "orphaned": stats.orphaned,
        "expired": stats.expired,
        "orphans_dropped": stats.orphans_dropped,
    }))
}
