//! # Signature Context
//!
//! Per-request credentials. A [`SignatureContext`] is built for one outbound
//! call, stamps the merchant id, nonce, and optional timestamp onto the
//! parameters, and is dropped afterwards. The secret is zeroized on drop and
//! never appears in `Debug` output or logs.

use url::form_urlencoded;
use zeroize::Zeroizing;

use crate::canonical::{join, sign_canonical, signable_fields};
use crate::error::SigningError;
use crate::params::{CarrierParams, ParamValue};

/// Name of the signature field in the form body.
pub const SIGNATURE_FIELD: &str = "sign";

/// Merchant id, shared secret, nonce, and timestamp for one request.
pub struct SignatureContext {
    mch_id: String,
    secret: Zeroizing<String>,
    nonce: String,
    timestamp: Option<i64>,
}

impl std::fmt::Debug for SignatureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureContext")
            .field("mch_id", &self.mch_id)
            .field("secret", &"[REDACTED]")
            .field("nonce", &self.nonce)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl SignatureContext {
    /// Context with a fresh random nonce and no timestamp.
    pub fn new(mch_id: impl Into<String>, secret: &str) -> Self {
        Self {
            mch_id: mch_id.into(),
            secret: Zeroizing::new(secret.to_string()),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: None,
        }
    }

    /// Stamp the current Unix time (seconds).
    pub fn with_current_timestamp(self) -> Self {
        self.with_timestamp(chrono::Utc::now().timestamp())
    }

    /// Stamp a fixed Unix time (seconds).
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Use a fixed nonce. Intended for reproducing a signature.
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    /// Merchant id.
    pub fn mch_id(&self) -> &str {
        &self.mch_id
    }

    /// Nonce sent with this request.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Timestamp sent with this request, if any.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Add the credential fields to `params` and sign the result.
    pub fn sign(&self, mut params: CarrierParams) -> Result<SignedRequest, SigningError> {
        params.insert("mchId", self.mch_id.as_str());
        params.insert("nonceStr", self.nonce.as_str());
        if let Some(ts) = self.timestamp {
            params.insert("timestamp", ts);
        }

        let fields = signable_fields(&params)?;
        let signature = sign_canonical(&join(&fields), &self.secret)?;

        let mut items = Vec::new();
        for (name, value) in params.iter() {
            if let ParamValue::Items(list) = value {
                let text = serde_json::to_string(list).map_err(|source| {
                    SigningError::Serialization {
                        name: name.to_string(),
                        source,
                    }
                })?;
                items.push((name.to_string(), text));
            }
        }

        Ok(SignedRequest {
            fields,
            signature,
            items,
        })
    }
}

/// A signed parameter set, ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    fields: Vec<(String, String)>,
    signature: String,
    items: Vec<(String, String)>,
}

impl SignedRequest {
    /// The signature value.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The signed fields, in the order they were signed.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Item-list fields as JSON text.
    pub fn items(&self) -> &[(String, String)] {
        &self.items
    }

    /// URL-form-encode the payload: signed fields, then the `sign` field
    /// (when `include_signature`), then item lists.
    pub fn to_form_body(&self, include_signature: bool) -> String {
        let mut body = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.fields {
            body.append_pair(k, v);
        }
        if include_signature {
            body.append_pair(SIGNATURE_FIELD, &self.signature);
        }
        for (k, v) in &self.items {
            body.append_pair(k, v);
        }
        body.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::sign;

    fn ctx() -> SignatureContext {
        SignatureContext::new("AAA0001", "a7c2f1e9b3d4")
            .with_nonce("yyv6YJP436wdVgmuY4Xd3NfEYI0OeYgUhGfkm4PmCdzaoTN1ze")
    }

    #[test]
    fn context_signature_matches_plain_sign() {
        let params = CarrierParams::new()
            .with("weight", 1000u32)
            .with("codEnabled", false)
            .with("srcName", "Somchai");
        let signed = ctx().sign(params).unwrap();
        assert_eq!(
            signed.signature(),
            "66EC6F770908FFE6EB99B5A2CED8D54AA64D95577A7802235F351BCDD9178930"
        );
    }

    #[test]
    fn timestamp_is_signed_when_present() {
        let params = CarrierParams::new().with("weight", 10i64);
        let without = ctx().sign(params.clone()).unwrap();
        let with = ctx().with_timestamp(1_700_000_000).sign(params).unwrap();
        assert_ne!(without.signature(), with.signature());
        assert!(with
            .fields()
            .iter()
            .any(|(k, v)| k == "timestamp" && v == "1700000000"));
    }

    #[test]
    fn form_body_appends_items_after_signature() {
        let params = CarrierParams::new().with("srcName", "A B&C").with(
            "subItemTypes",
            ParamValue::Items(vec![serde_json::json!({"itemName": "Shirt", "number": 2})]),
        );
        let signed = ctx().sign(params.clone()).unwrap();
        let body = signed.to_form_body(true);

        let sign_at = body.find("sign=").unwrap();
        let items_at = body.find("subItemTypes=").unwrap();
        assert!(sign_at < items_at);
        assert!(body.contains("srcName=A+B%26C"));

        let mut plain = params;
        plain.insert("mchId", "AAA0001");
        plain.insert("nonceStr", "yyv6YJP436wdVgmuY4Xd3NfEYI0OeYgUhGfkm4PmCdzaoTN1ze");
        assert_eq!(signed.signature(), sign(&plain, "a7c2f1e9b3d4").unwrap());
    }

    #[test]
    fn header_mode_body_omits_sign_field() {
        let signed = ctx().sign(CarrierParams::new().with("a", 1i64)).unwrap();
        assert!(!signed.to_form_body(false).contains("sign="));
    }

    #[test]
    fn debug_redacts_secret() {
        let out = format!("{:?}", ctx());
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("a7c2f1e9b3d4"));
    }

    #[test]
    fn fresh_contexts_use_distinct_nonces() {
        let a = SignatureContext::new("M", "s");
        let b = SignatureContext::new("M", "s");
        assert_ne!(a.nonce(), b.nonce());
    }
}
