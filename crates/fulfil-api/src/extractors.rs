//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and a helper
//! to extract + validate JSON bodies in handlers.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Deposit {
        amount: i64,
    }

    impl Validate for Deposit {
        fn validate(&self) -> Result<(), String> {
            if self.amount > 0 {
                Ok(())
            } else {
                Err("amount must be positive".into())
            }
        }
    }

    #[test]
    fn validated_json_rejects_business_rule_violation() {
        let err = extract_validated_json(Ok(Json(Deposit { amount: 0 }))).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("positive")));
    }

    #[test]
    fn validated_json_passes_valid_body() {
        let ok = extract_validated_json(Ok(Json(Deposit { amount: 500 }))).unwrap();
        assert_eq!(ok.amount, 500);
    }
}
