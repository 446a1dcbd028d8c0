use {
    crate::{
        AppState,
        domain::{
            error::InitiationError, id::CorrelationId, money::Amount, request::B2cCommand,
            transaction::TransactionKind,
        },
        services::{
            gateway::{DisbursementParams, PaymentGateway, StkPushParams},
            initiator::Acknowledgement,
        },
        transport::http::errors::ApiError,
    },
    axum::{
        Json,
        body::Bytes,
        extract::{Path, State},
        http::StatusCode,
    },
    serde::Deserialize,
    serde_json::json,
    std::sync::Arc,
};

#[derive(Debug, Deserialize)]
struct StkPushForm {
    amount: u64,
    phone_number: String,
    account_reference: String,
    #[serde(default = "default_description")]
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
struct B2cForm {
    amount: u64,
    phone_number: String,
    #[serde(default = "default_command")]
    command_id: B2cCommand,
    #[serde(default = "default_description")]
    remarks: String,
    #[serde(default)]
    occasion: String,
}

fn default_description() -> String {
    "Payment".to_string()
}

fn default_command() -> B2cCommand {
    B2cCommand::BusinessPayment
}

#[tracing::instrument(name = "stk_push", skip_all)]
pub async fn stk_push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let gateway = gateway(&state, TransactionKind::PushToPay)?;
    let form: StkPushForm = parse(&body)?;

    let ack = gateway
        .stk_push(StkPushParams {
            amount: amount(form.amount)?,
            phone_number: form.phone_number,
            account_reference: form.account_reference,
            transaction_desc: form.transaction_desc,
        })
        .await?;
    Ok(accepted(ack))
}

#[tracing::instrument(name = "b2c_payment", skip_all)]
pub async fn b2c_payment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let gateway = gateway(&state, TransactionKind::Disbursement)?;
    let form: B2cForm = parse(&body)?;

    let ack = gateway
        .disburse(DisbursementParams {
            amount: amount(form.amount)?,
            phone_number: form.phone_number,
            command: form.command_id,
            remarks: form.remarks,
            occasion: form.occasion,
        })
        .await?;
    Ok(accepted(ack))
}

/// Current state of a transaction this process initiated, while it is still
/// retained by the correlator.
pub async fn transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = CorrelationId::new(id)?;
    let handle = state
        .correlator
        .subscribe(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no transaction {id}")))?;

    // Read the outcome first: a terminal state is only published with it.
    let outcome = handle.outcome();
    Ok(Json(json!({
        "correlation_id": handle.correlation_id(),
        "kind": handle.kind().to_string(),
        "state": handle.state().as_str(),
        "outcome": outcome,
    })))
}

fn gateway(state: &AppState, kind: TransactionKind) -> Result<Arc<PaymentGateway>, ApiError> {
    state
        .gateway
        .clone()
        .ok_or(ApiError::Initiation(InitiationError::NotConfigured(kind)))
}

fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Invalid(e.to_string()))
}

fn amount(shillings: u64) -> Result<Amount, ApiError> {
    Amount::new(shillings).map_err(|e| ApiError::Invalid(e.to_string()))
}

fn accepted(ack: Acknowledgement) -> (StatusCode, Json<serde_json::Value>) {
    tracing::info!(
        kind = %ack.kind,
        correlation_id = %ack.correlation_id,
        "transaction initiated"
    );
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "kind": ack.kind.to_string(),
            "correlation_id": ack.correlation_id,
            "secondary_id": ack.secondary_id,
            "state": ack.handle.state().as_str(),
            "response_description": ack.response_description,
            "customer_message": ack.customer_message,
        })),
    )
}
