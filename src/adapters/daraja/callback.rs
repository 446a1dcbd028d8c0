use {
    crate::{
        AppState,
        domain::callback::CallbackPayload,
        transport::http::errors::ApiError,
    },
    axum::{Json, body::Bytes, extract::State},
};

#[tracing::instrument(
    name = "stk_callback",
    skip_all,
    fields(correlation_id = tracing::field::Empty)
)]
pub async fn stk_push_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payload = CallbackPayload::parse_stk(&body)?;
    accept(&state, payload)
}

#[tracing::instrument(
    name = "b2c_callback",
    skip_all,
    fields(correlation_id = tracing::field::Empty)
)]
pub async fn b2c_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payload = CallbackPayload::parse_b2c(&body)?;
    accept(&state, payload)
}

/// Hand the payload to the correlator and acknowledge it. Duplicates and
/// orphans are acknowledged too; refusing them only triggers redelivery.
fn accept(state: &AppState, payload: CallbackPayload) -> Result<Json<serde_json::Value>, ApiError> {
    let correlation_id = payload.correlation_id()?;
    tracing::Span::current().record("correlation_id", tracing::field::display(&correlation_id));

    let kind = payload.kind();
    let result_code = payload.result_code();
    let resolution = state.correlator.resolve(&correlation_id, payload);
    tracing::info!(
        kind = %kind,
        result_code,
        resolution = resolution.as_str(),
        "callback received"
    );

    Ok(Json(serde_json::json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted",
    })))
}
