//! # Canonical String and Signature
//!
//! The carrier recomputes the signature server-side, so every byte of the
//! canonical string matters. Values are not URL-encoded at this stage.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::SigningError;
use crate::params::{CarrierParams, ParamValue};

/// Field that carries the signature and is therefore never signed.
pub(crate) const SIGN_FIELD: &str = "sign";

/// Whether `s` is empty under the provider's definition.
///
/// Stricter than `str::trim().is_empty()`: only space, the ASCII whitespace
/// controls (tab, LF, VT, FF, CR) and the four separator controls
/// (U+001C..U+001F) count. Unicode spaces such as U+00A0 are content.
pub fn is_provider_blank(s: &str) -> bool {
    s.chars()
        .all(|c| matches!(c, ' ' | '\t' | '\n' | '\u{0B}' | '\u{0C}' | '\r' | '\u{1C}'..='\u{1F}'))
}

/// Render a value for signing. `None` means the field is left out.
fn render(name: &str, value: &ParamValue) -> Result<Option<String>, SigningError> {
    let rendered = match value {
        ParamValue::Null | ParamValue::Items(_) => return Ok(None),
        ParamValue::Str(s) => s.clone(),
        ParamValue::Int(n) => n.to_string(),
        ParamValue::Bool(b) => flag(*b).to_string(),
        ParamValue::Json(v) => match v {
            Value::Null => return Ok(None),
            Value::String(s) => s.clone(),
            Value::Bool(b) => flag(*b).to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(v).map_err(|source| SigningError::Serialization {
                    name: name.to_string(),
                    source,
                })?
            }
        },
    };
    if is_provider_blank(&rendered) {
        return Ok(None);
    }
    Ok(Some(rendered))
}

fn flag(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

/// The `(name, value)` pairs that take part in the signature, in byte order.
pub(crate) fn signable_fields(params: &CarrierParams) -> Result<Vec<(String, String)>, SigningError> {
    let mut out = Vec::with_capacity(params.len());
    for (name, value) in params.iter() {
        if name.is_empty() || name.contains('=') || name.contains('&') {
            return Err(SigningError::InvalidFieldName {
                name: name.to_string(),
            });
        }
        if name == SIGN_FIELD {
            continue;
        }
        if let Some(rendered) = render(name, value)? {
            out.push((name.to_string(), rendered));
        }
    }
    Ok(out)
}

/// Build the `k=v&k=v` string the signature is computed over, without the
/// trailing secret.
pub fn canonical_string(params: &CarrierParams) -> Result<String, SigningError> {
    let fields = signable_fields(params)?;
    Ok(join(&fields))
}

pub(crate) fn join(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the upper-case hex SHA-256 signature of `params` under `secret`.
pub fn sign(params: &CarrierParams, secret: &str) -> Result<String, SigningError> {
    let canonical = canonical_string(params)?;
    sign_canonical(&canonical, secret)
}

pub(crate) fn sign_canonical(canonical: &str, secret: &str) -> Result<String, SigningError> {
    if secret.is_empty() {
        return Err(SigningError::EmptySecret);
    }
    tracing::debug!(canonical = %canonical, "computing carrier signature");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(b"&key=");
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02X}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "a7c2f1e9b3d4";

    fn reference_params() -> CarrierParams {
        CarrierParams::new()
            .with("mchId", "AAA0001")
            .with(
                "nonceStr",
                "yyv6YJP436wdVgmuY4Xd3NfEYI0OeYgUhGfkm4PmCdzaoTN1ze",
            )
            .with("weight", 1000u32)
            .with("codEnabled", false)
            .with("srcName", "Somchai")
            .with("remark", "  ")
            .with("sign", "STALE")
            .with(
                "subItemTypes",
                ParamValue::Items(vec![serde_json::json!({"itemName": "Shirt", "number": 1})]),
            )
    }

    #[test]
    fn reference_vector_canonical_string() {
        assert_eq!(
            canonical_string(&reference_params()).unwrap(),
            "codEnabled=0&mchId=AAA0001\
             &nonceStr=yyv6YJP436wdVgmuY4Xd3NfEYI0OeYgUhGfkm4PmCdzaoTN1ze\
             &srcName=Somchai&weight=1000"
        );
    }

    #[test]
    fn reference_vector_signature() {
        assert_eq!(
            sign(&reference_params(), SECRET).unwrap(),
            "66EC6F770908FFE6EB99B5A2CED8D54AA64D95577A7802235F351BCDD9178930"
        );
    }

    #[test]
    fn single_field_signature() {
        let params = CarrierParams::new().with("a", 1i64);
        assert_eq!(
            sign(&params, "k").unwrap(),
            "E2FDCC0CEC7B4510933817B55B2055036909CBF894E0DC75528DA750A5ADCCC9"
        );
    }

    #[test]
    fn blank_strings_are_dropped_and_zero_is_kept() {
        let params = CarrierParams::new()
            .with("empty", "")
            .with("spaces", "  ")
            .with("tabs", "\t\n")
            .with("separators", "\u{1C}\u{1F}\r")
            .with("zero", 0i64)
            .with("null", ParamValue::Null);
        assert_eq!(canonical_string(&params).unwrap(), "zero=0");
    }

    #[test]
    fn non_breaking_space_is_content() {
        assert!(!is_provider_blank("\u{A0}"));
        assert!(is_provider_blank(""));
        assert!(is_provider_blank(" \u{0B}\u{0C}"));
    }

    #[test]
    fn composite_values_render_as_json() {
        let params = CarrierParams::new()
            .with("meta", serde_json::json!({"a": 1}))
            .with("flag", serde_json::json!(true));
        assert_eq!(canonical_string(&params).unwrap(), "flag=1&meta={\"a\":1}");
    }

    #[test]
    fn empty_secret_rejected() {
        let params = CarrierParams::new().with("a", "1");
        assert!(matches!(sign(&params, ""), Err(SigningError::EmptySecret)));
    }

    #[test]
    fn ambiguous_field_name_rejected() {
        let params = CarrierParams::new().with("a=b", "1");
        assert!(matches!(
            canonical_string(&params),
            Err(SigningError::InvalidFieldName { .. })
        ));
    }

    proptest! {
        #[test]
        fn signature_is_deterministic_and_order_independent(
            fields in proptest::collection::vec(("[a-zA-Z]{1,8}", "[ -~]{0,12}"), 0..12),
            secret in "[a-z0-9]{1,16}",
        ) {
            let forward: CarrierParams = fields.iter().cloned().collect();
            let mut reversed = CarrierParams::new();
            // Collapse duplicates the way `insert` does, then insert in reverse.
            let mut seen = std::collections::BTreeMap::new();
            for (k, v) in &fields {
                seen.insert(k.clone(), v.clone());
            }
            for (k, v) in seen.iter().rev() {
                reversed.insert(k.clone(), v.clone());
            }

            let a = sign(&forward, &secret).unwrap();
            let b = sign(&forward, &secret).unwrap();
            let c = sign(&reversed, &secret).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, &c);
            prop_assert_eq!(a.len(), 64);
            prop_assert!(a.chars().all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase()));
        }

        #[test]
        fn item_lists_never_affect_signature(
            name in "[a-z]{1,8}",
            count in 0usize..5,
        ) {
            let base = CarrierParams::new().with("mchId", "M1").with("weight", 10i64);
            let items = vec![serde_json::json!({"itemName": name}); count];
            let with_items = base.clone().with("subItemTypes", ParamValue::Items(items));
            prop_assert_eq!(sign(&base, "s").unwrap(), sign(&with_items, "s").unwrap());
        }
    }
}
