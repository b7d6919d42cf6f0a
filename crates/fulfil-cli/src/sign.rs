//! # Sign Subcommand
//!
//! Reproduces the signature the carrier expects for a set of request
//! fields. Useful when reconciling a rejected call against the carrier's
//! own signature checker.
//!
//! ```bash
//! fulfil sign --secret "$CARRIER_SECRET_KEY" mchId=AA0001 nonceStr=abc outTradeNo=FO1
//! ```

use anyhow::{bail, Context, Result};
use clap::Args;
use fulfil_signing::{canonical_string, sign, CarrierParams, ParamValue};

/// Arguments for the sign subcommand.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// Shared signing secret.
    #[arg(long)]
    pub secret: String,

    /// Sub-item list as a JSON array, sent as `subItemTypes`. Never signed.
    #[arg(long)]
    pub items: Option<String>,

    /// Request fields as `key=value`.
    #[arg(required = true, value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}

/// Result of signing a field set.
#[derive(Debug, PartialEq, Eq)]
pub struct SignOutput {
    /// The string that was hashed, with the secret elided.
    pub canonical: String,
    /// Upper-case hex signature.
    pub signature: String,
}

/// Parse `key=value` pairs into carrier parameters.
pub fn parse_fields(fields: &[String]) -> Result<CarrierParams> {
    let mut params = CarrierParams::new();
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            bail!("field {field:?} is not in key=value form");
        };
        if key.is_empty() {
            bail!("field {field:?} has an empty key");
        }
        params.insert(key, value);
    }
    Ok(params)
}

/// Canonicalise and sign `args`.
pub fn compute(args: &SignArgs) -> Result<SignOutput> {
    let mut params = parse_fields(&args.fields)?;
    if let Some(raw) = &args.items {
        let items: Vec<serde_json::Value> =
            serde_json::from_str(raw).context("--items must be a JSON array")?;
        params.insert("subItemTypes", ParamValue::Items(items));
    }
    let canonical = canonical_string(&params)?;
    let signature = sign(&params, &args.secret)?;
    Ok(SignOutput {
        canonical: format!("{canonical}&key=***"),
        signature,
    })
}

/// Execute the sign subcommand.
pub fn run_sign(args: &SignArgs) -> Result<u8> {
    let out = compute(args)?;
    println!("canonical: {}", out.canonical);
    println!("sign:      {}", out.signature);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(fields: &[&str]) -> SignArgs {
        SignArgs {
            secret: "secret".into(),
            items: None,
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn canonical_is_sorted_and_secret_elided() {
        let out = compute(&args(&["b=2", "a=1"])).unwrap();
        assert_eq!(out.canonical, "a=1&b=2&key=***");
        assert!(!out.canonical.contains("secret"));
        assert_eq!(out.signature.len(), 64);
    }

    #[test]
    fn matches_library_signature() {
        let out = compute(&args(&["mchId=AA0001", "nonceStr=n1"])).unwrap();
        let params = CarrierParams::new()
            .with("mchId", "AA0001")
            .with("nonceStr", "n1");
        assert_eq!(out.signature, sign(&params, "secret").unwrap());
    }

    #[test]
    fn items_do_not_change_signature() {
        let plain = compute(&args(&["a=1"])).unwrap();
        let mut with_items = args(&["a=1"]);
        with_items.items = Some(r#"[{"itemName":"Shirt"}]"#.into());
        assert_eq!(compute(&with_items).unwrap(), plain);
    }

    #[test]
    fn value_may_contain_equals() {
        let params = parse_fields(&["remark=a=b".to_string()]).unwrap();
        assert_eq!(params.get("remark"), Some(&ParamValue::Str("a=b".into())));
    }

    #[test]
    fn malformed_field_rejected() {
        assert!(parse_fields(&["novalue".to_string()]).is_err());
        assert!(parse_fields(&["=x".to_string()]).is_err());
    }

    #[test]
    fn empty_secret_rejected() {
        let mut a = args(&["a=1"]);
        a.secret.clear();
        assert!(compute(&a).is_err());
    }
}
