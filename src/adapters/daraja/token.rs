use {
    crate::domain::{
        callback::int_or_string,
        error::AuthError,
        provider::{Authorization, Method, OutboundRequest, Transport},
    },
    chrono::{DateTime, Utc},
    serde::Deserialize,
    std::{fmt, sync::Arc, time::Duration},
};

/// Short-lived bearer token. Not cached; fetch one per request.
#[derive(Clone)]
pub struct Credential {
    access_token: String,
    expires_in: Duration,
    issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at
            + chrono::Duration::from_std(self.expires_in).unwrap_or(chrono::Duration::zero())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default, deserialize_with = "int_or_string")]
    expires_in: i64,
    #[serde(rename = "requestId", default)]
    request_id: String,
    #[serde(rename = "errorCode", default)]
    error_code: String,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

pub struct TokenProvider {
    transport: Arc<dyn Transport>,
    consumer_key: String,
    consumer_secret: String,
    base_url: String,
}

impl TokenProvider {
    pub fn new(
        transport: Arc<dyn Transport>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One client-credentials exchange. No retries.
    pub async fn fetch_token(&self) -> Result<Credential, AuthError> {
        let request = OutboundRequest {
            method: Method::Get,
            url: format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.base_url
            ),
            auth: Authorization::Basic {
                username: self.consumer_key.clone(),
                password: self.consumer_secret.clone(),
            },
            body: None,
        };

        let response = self.transport.send(request).await?;

        let parsed: AccessTokenResponse = match serde_json::from_slice(&response.body) {
            Ok(parsed) => parsed,
            Err(e) if response.is_success() => return Err(AuthError::Malformed(e.to_string())),
            // Bad credentials come back as a 400 with an empty body.
            Err(_) => {
                return Err(AuthError::Rejected {
                    status: response.status,
                    code: String::new(),
                    message: String::from_utf8_lossy(&response.body).trim().to_string(),
                });
            }
        };

        if !response.is_success() || !parsed.error_code.is_empty() {
            return Err(AuthError::Rejected {
                status: response.status,
                code: parsed.error_code,
                message: parsed.error_message,
            });
        }

        if parsed.access_token.is_empty() {
            return Err(AuthError::Malformed("missing access_token".into()));
        }

        tracing::debug!(
            request_id = %parsed.request_id,
            expires_in = parsed.expires_in,
            "access token issued"
        );

        Ok(Credential {
            access_token: parsed.access_token,
            expires_in: Duration::from_secs(parsed.expires_in.max(0) as u64),
            issued_at: Utc::now(),
        })
    }
}
