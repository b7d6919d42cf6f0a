//! Carrier client configuration.
//!
//! Loaded once at process start and immutable afterwards. The secret key is
//! held in a [`Zeroizing`] buffer and redacted from `Debug` output.

use std::str::FromStr;

use url::Url;
use zeroize::Zeroizing;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// How the signature travels with a request. The signature value is the
/// same either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureTransport {
    /// As the `sign` form field.
    #[default]
    Body,
    /// As the `X-Sign` request header; the body carries no `sign` field.
    Header,
}

impl FromStr for SignatureTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" => Ok(Self::Body),
            "header" => Ok(Self::Header),
            _ => Err(ConfigError::InvalidValue {
                var: "CARRIER_SIGNATURE_TRANSPORT",
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for the carrier open API.
#[derive(Clone)]
pub struct CarrierConfig {
    /// Base URL of the carrier API, e.g. `https://open-api.carrier.example`.
    pub base_url: Url,
    /// Merchant id issued by the carrier.
    pub mch_id: String,
    /// Shared signing secret.
    pub secret_key: Zeroizing<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Where the signature is sent.
    pub signature_transport: SignatureTransport,
}

impl std::fmt::Debug for CarrierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierConfig")
            .field("base_url", &self.base_url)
            .field("mch_id", &self.mch_id)
            .field("secret_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("signature_transport", &self.signature_transport)
            .finish()
    }
}

impl CarrierConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CARRIER_BASE_URL` (required)
    /// - `CARRIER_MCH_ID` (required)
    /// - `CARRIER_SECRET_KEY` (required)
    /// - `CARRIER_TIMEOUT_SECS` (default: 15)
    /// - `CARRIER_SIGNATURE_TRANSPORT` (`body` or `header`, default: `body`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(var))
        };

        let raw_url = required("CARRIER_BASE_URL")?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("CARRIER_BASE_URL".to_string(), e.to_string()))?;
        let mch_id = required("CARRIER_MCH_ID")?;
        let secret_key = Zeroizing::new(required("CARRIER_SECRET_KEY")?);

        let timeout_secs = match lookup("CARRIER_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "CARRIER_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };
        let signature_transport = match lookup("CARRIER_SIGNATURE_TRANSPORT") {
            Some(raw) => raw.parse()?,
            None => SignatureTransport::Body,
        };

        Ok(Self {
            base_url,
            mch_id,
            secret_key,
            timeout_secs,
            signature_transport,
        })
    }

    /// Configuration pointing at a local mock server (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base_url` cannot be parsed.
    pub fn local_mock(base_url: &str, mch_id: &str, secret_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: Url::parse(base_url)
                .map_err(|e| ConfigError::InvalidUrl(base_url.to_string(), e.to_string()))?,
            mch_id: mch_id.to_string(),
            secret_key: Zeroizing::new(secret_key.to_string()),
            timeout_secs: 5,
            signature_transport: SignatureTransport::Body,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent or blank.
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    /// A URL variable does not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    /// A variable has a value outside its domain.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}
