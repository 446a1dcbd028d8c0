#![allow(dead_code)]

use mpesa_sync::domain::callback::CallbackPayload;
use mpesa_sync::domain::error::CorrelationError;
use mpesa_sync::domain::id::CorrelationId;
use mpesa_sync::domain::provider::CallbackSink;
use mpesa_sync::services::correlator::{Correlator, CorrelatorConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Keeps every anomaly the correlator reports, in order.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(CorrelationError, Option<i64>)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(CorrelationError, Option<i64>)> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&CorrelationError) -> bool) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(anomaly, _)| matches(anomaly))
            .count()
    }
}

impl CallbackSink for RecordingSink {
    fn record(&self, anomaly: &CorrelationError, payload: Option<&CallbackPayload>) {
        self.records
            .lock()
            .unwrap()
            .push((anomaly.clone(), payload.map(|p| p.result_code())));
    }
}

pub fn config(deadline: Duration) -> CorrelatorConfig {
    CorrelatorConfig {
        callback_deadline: deadline,
        orphan_retention: Duration::from_secs(600),
        resolved_retention: Duration::from_secs(300),
    }
}

pub fn correlator(deadline: Duration) -> (Arc<Correlator>, Arc<RecordingSink>) {
    correlator_with(config(deadline))
}

pub fn correlator_with(config: CorrelatorConfig) -> (Arc<Correlator>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let correlator = Arc::new(Correlator::new(config, sink.clone()));
    (correlator, sink)
}

pub fn id(raw: &str) -> CorrelationId {
    CorrelationId::new(raw).unwrap()
}

pub fn stk_callback_json(checkout_request_id: &str, result_code: i64) -> String {
    let metadata = if result_code == 0 {
        r#","CallbackMetadata":{"Item":[
            {"Name":"Amount","Value":1.0},
            {"Name":"MpesaReceiptNumber","Value":"NLJ7RT61SV"},
            {"Name":"TransactionDate","Value":20191219102115},
            {"Name":"PhoneNumber","Value":254708374149}
        ]}"#
    } else {
        ""
    };
    format!(
        r#"{{"Body":{{"stkCallback":{{
            "MerchantRequestID":"29115-34620561-1",
            "CheckoutRequestID":"{checkout_request_id}",
            "ResultCode":{result_code},
            "ResultDesc":"result {result_code}"{metadata}
        }}}}}}"#
    )
}

pub fn b2c_result_json(conversation_id: &str, result_code: i64) -> String {
    format!(
        r#"{{"Result":{{
            "ResultType":0,
            "ResultCode":{result_code},
            "ResultDesc":"result {result_code}",
            "OriginatorConversationID":"10571-7910404-1",
            "ConversationID":"{conversation_id}",
            "TransactionID":"NLJ41HAY6Q",
            "ResultParameters":{{"ResultParameter":[
                {{"Key":"TransactionAmount","Value":10}},
                {{"Key":"TransactionReceipt","Value":"NLJ41HAY6Q"}}
            ]}},
            "ReferenceData":{{"ReferenceItem":{{"Key":"QueueTimeoutURL","Value":"https://example.com/timeout"}}}}
        }}}}"#
    )
}

pub fn stk_callback(checkout_request_id: &str, result_code: i64) -> CallbackPayload {
    CallbackPayload::parse_stk(stk_callback_json(checkout_request_id, result_code).as_bytes())
        .unwrap()
}

pub fn b2c_result(conversation_id: &str, result_code: i64) -> CallbackPayload {
    CallbackPayload::parse_b2c(b2c_result_json(conversation_id, result_code).as_bytes()).unwrap()
}
