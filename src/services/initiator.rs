use {
    super::correlator::{Correlator, PendingHandle},
    crate::adapters::daraja::{client::ReqwestTransport, token::TokenProvider},
    crate::config::DarajaConfig,
    crate::domain::{
        error::{InitiationError, TransportError},
        id::CorrelationId,
        provider::{Authorization, Method, OutboundRequest, RawResponse, Transport},
        request::{InitiationResponse, TransactionRequest},
        transaction::TransactionKind,
    },
    chrono::Utc,
    std::sync::Arc,
};

/// The remote accepted the request for asynchronous processing. Nothing has
/// been paid yet; await `handle` for the result.
pub struct Acknowledgement {
    pub kind: TransactionKind,
    /// `CheckoutRequestID` or `ConversationID`; what callbacks are keyed on.
    pub correlation_id: CorrelationId,
    /// `MerchantRequestID` or `OriginatorConversationID`.
    pub secondary_id: String,
    pub response_description: String,
    /// Only set for STK push.
    pub customer_message: String,
    pub handle: PendingHandle,
}

pub struct Initiator {
    tokens: TokenProvider,
    transport: Arc<dyn Transport>,
    correlator: Arc<Correlator>,
}

impl Initiator {
    pub fn new(
        tokens: TokenProvider,
        transport: Arc<dyn Transport>,
        correlator: Arc<Correlator>,
    ) -> Self {
        Self {
            tokens,
            transport,
            correlator,
        }
    }

    /// Production wiring: reqwest transport shared by token and initiation
    /// calls.
    pub fn from_config(
        config: &DarajaConfig,
        correlator: Arc<Correlator>,
    ) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.http_timeout)?);
        let tokens = TokenProvider::new(
            transport.clone(),
            config.consumer_key.as_str(),
            config.consumer_secret.as_str(),
            config.base_url.as_str(),
        );
        Ok(Self::new(tokens, transport, correlator))
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Send one initiation request and register its correlation id before
    /// returning. Never retries: a retried payment request can charge twice.
    #[tracing::instrument(
        name = "initiate",
        skip_all,
        fields(kind = %request.kind(), correlation_id = tracing::field::Empty)
    )]
    pub async fn initiate(
        &self,
        request: TransactionRequest,
    ) -> Result<Acknowledgement, InitiationError> {
        let kind = request.kind();
        let body = request.body(Utc::now())?;
        let credential = self.tokens.fetch_token().await?;

        let response = self
            .transport
            .send(OutboundRequest {
                method: Method::Post,
                url: format!("{}{}", self.tokens.base_url(), request.path()),
                auth: Authorization::Bearer(credential.access_token().to_string()),
                body: Some(body),
            })
            .await?;

        let parsed = parse_acknowledgement(&response)?;
        let (primary, secondary) = parsed.correlation_ids(kind);
        let correlation_id = CorrelationId::new(primary).map_err(|_| {
            InitiationError::Protocol(format!("{kind} acknowledgement without a correlation id"))
        })?;
        let secondary_id = secondary.to_string();

        tracing::Span::current()
            .record("correlation_id", tracing::field::display(&correlation_id));

        let handle = match self.correlator.register(correlation_id.clone(), kind) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "accepted transaction could not be registered");
                PendingHandle::registration_failed(correlation_id.clone(), kind, e.to_string())
            }
        };

        tracing::info!(
            secondary_id = %secondary_id,
            state = %handle.state(),
            "transaction accepted"
        );

        Ok(Acknowledgement {
            kind,
            correlation_id,
            secondary_id,
            response_description: parsed.response_description,
            customer_message: parsed.customer_message,
            handle,
        })
    }
}

fn parse_acknowledgement(response: &RawResponse) -> Result<InitiationResponse, InitiationError> {
    let parsed: InitiationResponse = match serde_json::from_slice(&response.body) {
        Ok(parsed) => parsed,
        Err(e) if response.is_success() => {
            return Err(InitiationError::Protocol(format!("malformed acknowledgement: {e}")));
        }
        Err(_) => {
            return Err(InitiationError::Rejected {
                status: response.status,
                code: String::new(),
                message: String::from_utf8_lossy(&response.body).trim().to_string(),
            });
        }
    };

    if !response.is_success() || !parsed.error_code.is_empty() {
        return Err(InitiationError::Rejected {
            status: response.status,
            code: parsed.error_code,
            message: parsed.error_message,
        });
    }

    if parsed.response_code != "0" {
        return Err(InitiationError::Rejected {
            status: response.status,
            code: parsed.response_code,
            message: parsed.response_description,
        });
    }

    Ok(parsed)
}
