use {
    super::money::Amount,
    super::transaction::TransactionKind,
    base64::{Engine, engine::general_purpose::STANDARD},
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
};

/// Daraja timestamps are East Africa Time (UTC+3, no DST), `YYYYMMDDHHmmss`.
pub fn daraja_timestamp(at: DateTime<Utc>) -> String {
    (at.naive_utc() + Duration::hours(3))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// `base64(shortcode + passkey + timestamp)`.
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{short_code}{passkey}{timestamp}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StkTransactionType {
    CustomerPayBillOnline,
    CustomerBuyGoodsOnline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum B2cCommand {
    BusinessPayment,
    SalaryPayment,
    PromotionPayment,
}

/// STK push parameters. The password and timestamp are derived when the
/// body is built.
#[derive(Debug, Clone)]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub passkey: String,
    pub transaction_type: StkTransactionType,
    pub amount: Amount,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

impl StkPushRequest {
    pub fn body(&self, now: DateTime<Utc>) -> StkPushRequestBody {
        let timestamp = daraja_timestamp(now);
        StkPushRequestBody {
            business_short_code: self.business_short_code.clone(),
            password: stk_password(&self.business_short_code, &self.passkey, &timestamp),
            timestamp,
            transaction_type: self.transaction_type,
            amount: self.amount,
            party_a: self.party_a.clone(),
            party_b: self.party_b.clone(),
            phone_number: self.phone_number.clone(),
            callback_url: self.callback_url.clone(),
            account_reference: self.account_reference.clone(),
            transaction_desc: self.transaction_desc.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequestBody {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: StkTransactionType,
    pub amount: Amount,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// B2C parameters. `security_credential` is the initiator password already
/// encrypted with the environment's certificate (see `CertificateEncryptor`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct B2cRequest {
    pub initiator_name: String,
    pub security_credential: String,
    #[serde(rename = "CommandID")]
    pub command_id: B2cCommand,
    pub amount: Amount,
    pub party_a: String,
    pub party_b: String,
    pub remarks: String,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: String,
    #[serde(rename = "ResultURL")]
    pub result_url: String,
    // Daraja's spelling.
    #[serde(rename = "Occassion")]
    pub occasion: String,
}

#[derive(Debug, Clone)]
pub enum TransactionRequest {
    PushToPay(StkPushRequest),
    Disbursement(B2cRequest),
}

impl TransactionRequest {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::PushToPay(_) => TransactionKind::PushToPay,
            Self::Disbursement(_) => TransactionKind::Disbursement,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::PushToPay(_) => "/mpesa/stkpush/v1/processrequest",
            Self::Disbursement(_) => "/mpesa/b2c/v1/paymentrequest",
        }
    }

    pub fn body(&self, now: DateTime<Utc>) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::PushToPay(req) => serde_json::to_value(req.body(now)),
            Self::Disbursement(req) => serde_json::to_value(req),
        }
    }
}

// ── Immediate responses ─────────────────────────────────────────────────────

/// Both initiation endpoints share this shape; absent fields default to empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitiationResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(rename = "ConversationID", default)]
    pub conversation_id: String,
    #[serde(rename = "OriginatorConversationID", default)]
    pub originator_conversation_id: String,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
    #[serde(rename = "requestId", default)]
    pub request_id: String,
    #[serde(rename = "errorCode", default)]
    pub error_code: String,
    #[serde(rename = "errorMessage", default)]
    pub error_message: String,
}

impl InitiationResponse {
    /// `(primary, secondary)` correlation ids for `kind`.
    pub fn correlation_ids(&self, kind: TransactionKind) -> (&str, &str) {
        match kind {
            TransactionKind::PushToPay => (&self.checkout_request_id, &self.merchant_request_id),
            TransactionKind::Disbursement => {
                (&self.conversation_id, &self.originator_conversation_id)
            }
        }
    }
}
