use {
    super::error::CallbackError,
    super::id::CorrelationId,
    super::transaction::{CallbackResult, TransactionKind, TransactionOutcome},
    serde::{Deserialize, Deserializer, Serialize},
};

/// Heterogeneous `Value` field of a callback metadata item. The same name can
/// arrive as a number in one callback and a string in another.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(serde_json::Number),
    #[default]
    Null,
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            Self::Text(s) => s.parse().ok(),
            Self::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.parse().ok(),
            Self::Null => None,
        }
    }
}

impl<'de> Deserialize<'de> for MetadataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Number(n) => Self::Number(n),
            // Never seen in practice; keep the raw JSON rather than reject a
            // financial result over it.
            other => Self::Text(other.to_string()),
        })
    }
}

/// `{Name, Value}` on STK callbacks, `{Key, Value}` on B2C results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name", alias = "Key")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: MetadataValue,
}

// ── Push-to-pay (STK) callback ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "int_or_string")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<StkCallbackMetadata>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StkCallbackMetadata {
    #[serde(rename = "Item", default, deserialize_with = "one_or_many")]
    pub item: Vec<MetadataItem>,
}

// ── Disbursement (B2C) result ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct B2cResultEnvelope {
    #[serde(rename = "Result")]
    pub result: B2cResult,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct B2cResult {
    #[serde(rename = "ResultType", default, deserialize_with = "int_or_string")]
    pub result_type: i64,
    #[serde(rename = "ResultCode", deserialize_with = "int_or_string")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "OriginatorConversationID", default)]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: String,
    #[serde(rename = "ResultParameters", default)]
    pub result_parameters: Option<B2cResultParameters>,
    #[serde(rename = "ReferenceData", default)]
    pub reference_data: Option<B2cReferenceData>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct B2cResultParameters {
    #[serde(rename = "ResultParameter", default, deserialize_with = "one_or_many")]
    pub result_parameter: Vec<MetadataItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct B2cReferenceData {
    #[serde(rename = "ReferenceItem", default, deserialize_with = "one_or_many")]
    pub reference_item: Vec<MetadataItem>,
}

// ── Parsed payload ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackPayload {
    PushToPay(StkCallback),
    Disbursement(B2cResult),
}

impl CallbackPayload {
    pub fn parse_stk(body: &[u8]) -> Result<Self, CallbackError> {
        let envelope: StkCallbackEnvelope =
            serde_json::from_slice(body).map_err(|e| CallbackError::Malformed(e.to_string()))?;
        Ok(Self::PushToPay(envelope.body.stk_callback))
    }

    pub fn parse_b2c(body: &[u8]) -> Result<Self, CallbackError> {
        let envelope: B2cResultEnvelope =
            serde_json::from_slice(body).map_err(|e| CallbackError::Malformed(e.to_string()))?;
        Ok(Self::Disbursement(envelope.result))
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::PushToPay(_) => TransactionKind::PushToPay,
            Self::Disbursement(_) => TransactionKind::Disbursement,
        }
    }

    pub fn correlation_id(&self) -> Result<CorrelationId, CallbackError> {
        match self {
            Self::PushToPay(cb) => CorrelationId::new(cb.checkout_request_id.as_str()),
            Self::Disbursement(res) => CorrelationId::new(res.conversation_id.as_str()),
        }
    }

    pub fn result_code(&self) -> i64 {
        match self {
            Self::PushToPay(cb) => cb.result_code,
            Self::Disbursement(res) => res.result_code,
        }
    }

    pub fn result_desc(&self) -> &str {
        match self {
            Self::PushToPay(cb) => &cb.result_desc,
            Self::Disbursement(res) => &res.result_desc,
        }
    }

    /// Metadata items in wire order. For B2C the `TransactionID` is prepended
    /// so both kinds expose the receipt the same way.
    pub fn metadata(&self) -> Vec<MetadataItem> {
        match self {
            Self::PushToPay(cb) => cb
                .callback_metadata
                .as_ref()
                .map(|m| m.item.clone())
                .unwrap_or_default(),
            Self::Disbursement(res) => {
                let mut items = Vec::new();
                if !res.transaction_id.is_empty() {
                    items.push(MetadataItem {
                        name: "TransactionID".into(),
                        value: MetadataValue::Text(res.transaction_id.clone()),
                    });
                }
                if let Some(params) = &res.result_parameters {
                    items.extend(params.result_parameter.iter().cloned());
                }
                items
            }
        }
    }

    /// `ResultCode == 0` is the only success code on both APIs.
    pub fn outcome(&self) -> TransactionOutcome {
        let result_code = self.result_code();
        if result_code == 0 {
            TransactionOutcome::Success(CallbackResult {
                result_code,
                description: self.result_desc().to_string(),
                metadata: self.metadata(),
            })
        } else {
            TransactionOutcome::Failure {
                result_code,
                description: self.result_desc().to_string(),
            }
        }
    }
}

// ── Lenient field decoders ──────────────────────────────────────────────────

/// Daraja is inconsistent about quoting integers (`"ResultCode": "0"` shows
/// up on some B2C results, `expires_in` is always a string).
pub(crate) fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected integer, got {s:?}"))),
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<Raw<T>>::deserialize(deserializer)? {
        Some(Raw::Many(items)) => items,
        Some(Raw::One(item)) => vec![item],
        None => Vec::new(),
    })
}
