mod common;

use base64::{Engine, engine::general_purpose::STANDARD};
use common::*;
use mpesa_sync::adapters::daraja::client::ReqwestTransport;
use mpesa_sync::adapters::daraja::security::CertificateEncryptor;
use mpesa_sync::adapters::daraja::token::TokenProvider;
use mpesa_sync::domain::error::{AuthError, InitiationError};
use mpesa_sync::domain::money::Amount;
use mpesa_sync::domain::provider::{SecretEncryptor, Transport};
use mpesa_sync::domain::request::{
    B2cCommand, B2cRequest, StkPushRequest, StkTransactionType, TransactionRequest,
};
use mpesa_sync::domain::transaction::{TransactionKind, TransactionOutcome, TransactionState};
use mpesa_sync::services::correlator::{Correlator, Resolution};
use mpesa_sync::services::initiator::Initiator;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STK_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const B2C_PATH: &str = "/mpesa/b2c/v1/paymentrequest";

fn initiator(server: &MockServer, correlator: Arc<Correlator>) -> Initiator {
    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    let tokens = TokenProvider::new(transport.clone(), "key", "secret", server.uri());
    Initiator::new(tokens, transport, correlator)
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .and(query_param("grant_type", "client_credentials"))
        // base64("key:secret")
        .and(header("authorization", "Basic a2V5OnNlY3JldA=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok_sandbox",
            "expires_in": "3599",
        })))
        .mount(server)
        .await;
}

async fn mount_stk_ack(server: &MockServer, checkout_request_id: &str) {
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .and(header("authorization", "Bearer tok_sandbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": checkout_request_id,
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing",
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn stk_request() -> TransactionRequest {
    TransactionRequest::PushToPay(StkPushRequest {
        business_short_code: "174379".into(),
        passkey: "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919".into(),
        transaction_type: StkTransactionType::CustomerPayBillOnline,
        amount: Amount::new(1).unwrap(),
        party_a: "254708374149".into(),
        party_b: "174379".into(),
        phone_number: "254708374149".into(),
        callback_url: "https://example.com/stk-push-callback".into(),
        account_reference: "INV-001".into(),
        transaction_desc: "Invoice".into(),
    })
}

// ── STK push: accepted, then completed by its callback ─────────────────────

#[tokio::test]
async fn stk_push_completes_when_callback_arrives() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_stk_ack(&server, "ws_CO_1").await;

    let (correlator, _) = correlator(Duration::from_secs(30));
    let initiator = initiator(&server, correlator.clone());

    let mut ack = initiator.initiate(stk_request()).await.unwrap();
    assert_eq!(ack.kind, TransactionKind::PushToPay);
    assert_eq!(ack.correlation_id.as_str(), "ws_CO_1");
    assert_eq!(ack.secondary_id, "29115-34620561-1");
    assert_eq!(ack.handle.state(), TransactionState::AwaitingCallback);

    assert_eq!(
        correlator.resolve(&id("ws_CO_1"), stk_callback("ws_CO_1", 0)),
        Resolution::Applied
    );

    let outcome = ack.handle.wait().await;
    assert!(outcome.is_success());
    assert_eq!(ack.handle.state(), TransactionState::Completed);

    let requests = server.received_requests().await.unwrap();
    let stk = requests
        .iter()
        .find(|r| r.url.path() == STK_PATH)
        .expect("stk request sent");
    let body: serde_json::Value = serde_json::from_slice(&stk.body).unwrap();
    assert_eq!(body["BusinessShortCode"], "174379");
    assert_eq!(body["Amount"], "1");
    assert_eq!(body["CallBackURL"], "https://example.com/stk-push-callback");

    let timestamp = body["Timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 14);
    let password = String::from_utf8(
        STANDARD
            .decode(body["Password"].as_str().unwrap())
            .unwrap(),
    )
    .unwrap();
    assert!(password.starts_with("174379bfb279f9aa"));
    assert!(password.ends_with(timestamp));
}

// ── STK push: accepted, never called back ──────────────────────────────────

#[tokio::test]
async fn stk_push_times_out_without_callback() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_stk_ack(&server, "ws_CO_2").await;

    let (correlator, sink) = correlator(Duration::from_millis(200));
    let initiator = initiator(&server, correlator.clone());

    let mut ack = initiator.initiate(stk_request()).await.unwrap();
    assert_eq!(ack.handle.state(), TransactionState::AwaitingCallback);

    let outcome = ack.handle.wait().await;
    assert_eq!(outcome, TransactionOutcome::TimedOut);
    assert_eq!(
        correlator.state(&id("ws_CO_2")),
        Some(TransactionState::TimedOut)
    );
    assert_eq!(sink.records().len(), 1);
}

// ── callback faster than the acknowledgement ───────────────────────────────

#[tokio::test]
async fn callback_received_before_acknowledgement_is_claimed() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_stk_ack(&server, "ws_CO_3").await;

    let (correlator, _) = correlator(Duration::from_secs(30));
    assert_eq!(
        correlator.resolve(&id("ws_CO_3"), stk_callback("ws_CO_3", 1032)),
        Resolution::Orphaned
    );

    let initiator = initiator(&server, correlator.clone());
    let mut ack = initiator.initiate(stk_request()).await.unwrap();

    assert_eq!(ack.handle.state(), TransactionState::Failed);
    assert_eq!(ack.handle.wait().await.result_code(), Some(1032));
}

// ── failures before anything is registered ─────────────────────────────────

#[tokio::test]
async fn rejected_token_stops_before_initiation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(400).set_body_string(""))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (correlator, _) = correlator(Duration::from_secs(30));
    let err = initiator(&server, correlator.clone())
        .initiate(stk_request())
        .await
        .err();

    assert!(matches!(
        err,
        Some(InitiationError::Auth(AuthError::Rejected { status: 400, .. }))
    ));
    assert_eq!(correlator.stats().pending, 0);
}

#[tokio::test]
async fn token_without_access_token_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": "3599"})))
        .mount(&server)
        .await;

    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    let tokens = TokenProvider::new(transport, "key", "secret", server.uri());

    assert!(matches!(
        tokens.fetch_token().await,
        Err(AuthError::Malformed(_))
    ));
}

#[tokio::test]
async fn token_expiry_is_parsed_from_string() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    let tokens = TokenProvider::new(transport, "key", "secret", format!("{}/", server.uri()));

    let credential = tokens.fetch_token().await.unwrap();
    assert_eq!(credential.access_token(), "tok_sandbox");
    assert_eq!(credential.expires_in(), Duration::from_secs(3599));
}

#[tokio::test]
async fn rejected_initiation_surfaces_remote_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "requestId": "11728-2929992-1",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber",
        })))
        .mount(&server)
        .await;

    let (correlator, _) = correlator(Duration::from_secs(30));
    let err = initiator(&server, correlator.clone())
        .initiate(stk_request())
        .await
        .err();

    match err {
        Some(InitiationError::Rejected {
            status,
            code,
            message,
        }) => {
            assert_eq!(status, 400);
            assert_eq!(code, "400.002.02");
            assert_eq!(message, "Bad Request - Invalid PhoneNumber");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let stats = correlator.stats();
    assert_eq!(stats.pending + stats.terminal, 0);
}

#[tokio::test]
async fn acknowledgement_without_id_is_protocol_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
        })))
        .mount(&server)
        .await;

    let (correlator, _) = correlator(Duration::from_secs(30));
    let err = initiator(&server, correlator)
        .initiate(stk_request())
        .await
        .err();
    assert!(matches!(err, Some(InitiationError::Protocol(_))));
}

// ── B2C with an encrypted initiator credential ─────────────────────────────

#[tokio::test]
async fn disbursement_completes_with_encrypted_credential() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(B2C_PATH))
        .and(header("authorization", "Bearer tok_sandbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ConversationID": "AG_20191219_00005797af5d7d75f652",
            "OriginatorConversationID": "16740-34861180-1",
            "ResponseCode": "0",
            "ResponseDescription": "Accept the service request successfully.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let encryptor = CertificateEncryptor::from_public_key(RsaPublicKey::from(&private));

    let (correlator, _) = correlator(Duration::from_secs(30));
    let initiator = initiator(&server, correlator.clone());

    let request = TransactionRequest::Disbursement(B2cRequest {
        initiator_name: "testapi".into(),
        security_credential: encryptor.encrypt("Safaricom999!*!").unwrap(),
        command_id: B2cCommand::BusinessPayment,
        amount: Amount::new(10).unwrap(),
        party_a: "600981".into(),
        party_b: "254708374149".into(),
        remarks: "Refund".into(),
        queue_timeout_url: "https://example.com/b2c-timeout".into(),
        result_url: "https://example.com/b2c-callback".into(),
        occasion: String::new(),
    });

    let mut ack = initiator.initiate(request).await.unwrap();
    assert_eq!(ack.kind, TransactionKind::Disbursement);
    assert_eq!(ack.correlation_id.as_str(), "AG_20191219_00005797af5d7d75f652");
    assert_eq!(ack.secondary_id, "16740-34861180-1");

    let requests = server.received_requests().await.unwrap();
    let b2c = requests
        .iter()
        .find(|r| r.url.path() == B2C_PATH)
        .expect("b2c request sent");
    let body: serde_json::Value = serde_json::from_slice(&b2c.body).unwrap();
    assert_eq!(body["CommandID"], "BusinessPayment");
    let ciphertext = STANDARD
        .decode(body["SecurityCredential"].as_str().unwrap())
        .unwrap();
    assert_eq!(
        private.decrypt(Pkcs1v15Encrypt, &ciphertext).unwrap(),
        b"Safaricom999!*!"
    );

    correlator.resolve(
        &ack.correlation_id,
        b2c_result("AG_20191219_00005797af5d7d75f652", 0),
    );
    let TransactionOutcome::Success(result) = ack.handle.wait().await else {
        panic!("expected success");
    };
    assert_eq!(
        result.metadata_value("TransactionReceipt").and_then(|v| v.as_str()),
        Some("NLJ41HAY6Q")
    );
}
