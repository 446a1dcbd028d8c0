use {
    crate::{domain::error::ConfigError, services::correlator::CorrelatorConfig},
    std::{env, net::SocketAddr, path::PathBuf, time::Duration},
};

/// Credentials and endpoint for outbound Daraja calls.
#[derive(Clone)]
pub struct DarajaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// e.g. `https://sandbox.safaricom.co.ke`
    pub base_url: String,
    pub http_timeout: Duration,
    /// Present when `MPESA_SHORT_CODE` is set.
    pub stk: Option<StkSettings>,
    /// Present when `MPESA_INITIATOR_NAME` is set.
    pub b2c: Option<B2cSettings>,
}

/// Merchant side of an STK push.
#[derive(Clone)]
pub struct StkSettings {
    pub short_code: String,
    pub passkey: String,
    pub callback_url: String,
}

/// Paying organisation for B2C.
#[derive(Clone)]
pub struct B2cSettings {
    pub short_code: String,
    pub initiator_name: String,
    pub initiator_password: String,
    /// Safaricom certificate used to encrypt `initiator_password`.
    pub certificate_path: PathBuf,
    pub result_url: String,
    pub queue_timeout_url: String,
}

impl DarajaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let stk = match optional(&lookup, "MPESA_SHORT_CODE") {
            Some(short_code) => {
                let trigger = "MPESA_SHORT_CODE";
                Some(StkSettings {
                    short_code,
                    passkey: section(&lookup, "MPESA_PASSKEY", trigger)?,
                    callback_url: section(&lookup, "MPESA_STK_CALLBACK_URL", trigger)?,
                })
            }
            None => None,
        };

        let b2c = match optional(&lookup, "MPESA_INITIATOR_NAME") {
            Some(initiator_name) => {
                let trigger = "MPESA_INITIATOR_NAME";
                Some(B2cSettings {
                    short_code: section(&lookup, "MPESA_B2C_SHORT_CODE", trigger)?,
                    initiator_name,
                    initiator_password: section(&lookup, "MPESA_INITIATOR_PASSWORD", trigger)?,
                    certificate_path: section(&lookup, "MPESA_CERTIFICATE_PATH", trigger)?.into(),
                    result_url: section(&lookup, "MPESA_B2C_RESULT_URL", trigger)?,
                    queue_timeout_url: section(&lookup, "MPESA_B2C_TIMEOUT_URL", trigger)?,
                })
            }
            None => None,
        };

        Ok(Self {
            consumer_key: required(&lookup, "MPESA_CONSUMER_KEY")?,
            consumer_secret: required(&lookup, "MPESA_CONSUMER_SECRET")?,
            base_url: required(&lookup, "MPESA_BASE_URL")?,
            http_timeout: seconds(&lookup, "MPESA_HTTP_TIMEOUT_SECS", Some(10))?,
            stk,
            b2c,
        })
    }
}

/// Settings for the callback server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub correlator: CorrelatorConfig,
    /// Enables the Postgres audit sink.
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = optional(&lookup, "MPESA_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen_addr = listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "MPESA_LISTEN_ADDR",
                reason: e.to_string(),
            })?;

        Ok(Self {
            listen_addr,
            request_timeout: seconds(&lookup, "MPESA_REQUEST_TIMEOUT_SECS", Some(10))?,
            sweep_interval: seconds(&lookup, "MPESA_SWEEP_INTERVAL_SECS", Some(1))?,
            correlator: CorrelatorConfig {
                callback_deadline: seconds(&lookup, "MPESA_CALLBACK_TIMEOUT_SECS", None)?,
                orphan_retention: seconds(&lookup, "MPESA_ORPHAN_RETENTION_SECS", Some(600))?,
                resolved_retention: seconds(&lookup, "MPESA_RESOLVED_RETENTION_SECS", Some(300))?,
            },
            database_url: optional(&lookup, "DATABASE_URL"),
        })
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

/// Required once `trigger` has switched its section on.
fn section(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    trigger: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or_else(|| ConfigError::Invalid {
        key,
        reason: format!("required when {trigger} is set"),
    })
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Option<u64>,
) -> Result<Duration, ConfigError> {
    let secs = match (optional(lookup, key), default) {
        (Some(raw), _) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?,
        (None, Some(default)) => default,
        (None, None) => return Err(ConfigError::Missing(key)),
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn callback_deadline_has_no_default() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MPESA_CALLBACK_TIMEOUT_SECS")));
    }

    #[test]
    fn server_defaults_apply() {
        let config =
            ServerConfig::from_lookup(lookup(&[("MPESA_CALLBACK_TIMEOUT_SECS", "90")])).unwrap();
        assert_eq!(config.correlator.callback_deadline, Duration::from_secs(90));
        assert_eq!(config.correlator.orphan_retention, Duration::from_secs(600));
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn zero_and_garbage_durations_are_invalid() {
        let err = ServerConfig::from_lookup(lookup(&[("MPESA_CALLBACK_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = ServerConfig::from_lookup(lookup(&[("MPESA_CALLBACK_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn daraja_requires_credentials() {
        let err = DarajaConfig::from_lookup(lookup(&[
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_BASE_URL", "https://sandbox.safaricom.co.ke"),
        ]))
        .err();
        assert!(matches!(err, Some(ConfigError::Missing("MPESA_CONSUMER_SECRET"))));
    }

    const CREDENTIALS: [(&str, &str); 3] = [
        ("MPESA_CONSUMER_KEY", "key"),
        ("MPESA_CONSUMER_SECRET", "secret"),
        ("MPESA_BASE_URL", "https://sandbox.safaricom.co.ke"),
    ];

    #[test]
    fn merchant_sections_are_optional() {
        let config = DarajaConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();
        assert!(config.stk.is_none());
        assert!(config.b2c.is_none());
    }

    #[test]
    fn b2c_section_reads_certificate_path() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("MPESA_INITIATOR_NAME", "testapi"),
            ("MPESA_INITIATOR_PASSWORD", "Safaricom999!*!"),
            ("MPESA_B2C_SHORT_CODE", "600981"),
            ("MPESA_CERTIFICATE_PATH", "./certificates/sandbox.cer"),
            ("MPESA_B2C_RESULT_URL", "https://example.com/b2c-callback"),
            ("MPESA_B2C_TIMEOUT_URL", "https://example.com/b2c-timeout"),
        ]);

        let b2c = DarajaConfig::from_lookup(lookup(&pairs)).unwrap().b2c.unwrap();
        assert_eq!(b2c.certificate_path, PathBuf::from("./certificates/sandbox.cer"));
        assert_eq!(b2c.short_code, "600981");
    }

    #[test]
    fn partial_stk_section_is_invalid() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("MPESA_SHORT_CODE", "174379"));

        let err = DarajaConfig::from_lookup(lookup(&pairs)).err();
        assert!(matches!(
            err,
            Some(ConfigError::Invalid { key: "MPESA_PASSKEY", .. })
        ));
    }
}
