//! Signing errors.

use thiserror::Error;

/// Errors raised while building a signature.
#[derive(Error, Debug)]
pub enum SigningError {
    /// The shared secret is empty; a signature over it would be forgeable.
    #[error("signing secret must not be empty")]
    EmptySecret,

    /// A field name cannot appear in a `k=v&k=v` string unambiguously.
    #[error("invalid parameter name {name:?}: must be non-empty and contain no '=' or '&'")]
    InvalidFieldName {
        /// The rejected name.
        name: String,
    },

    /// A composite value could not be rendered as JSON text.
    #[error("failed to serialize parameter {name}: {source}")]
    Serialization {
        /// The parameter being rendered.
        name: String,
        /// Underlying serializer error.
        source: serde_json::Error,
    },
}
