#![deny(missing_docs)]

//! # fulfil-signing: Carrier Request Signatures
//!
//! The carrier validates every request by recomputing a signature over the
//! request's scalar fields. This crate is the single implementation of that
//! scheme in the workspace:
//!
//! 1. drop the `sign` field, item lists, nulls, and provider-blank strings;
//! 2. render the remaining values as strings (`0`/`1` for flags, JSON text
//!    for composites);
//! 3. sort by field name in byte order and join as `k=v&k=v`;
//! 4. append `&key=<secret>`, hash with SHA-256, upper-case hex.
//!
//! [`SignatureContext`] wraps the per-request credentials and produces a
//! [`SignedRequest`] ready for form encoding. Item lists are appended to the
//! form body after signing and never influence the signature.

pub mod canonical;
pub mod context;
pub mod error;
pub mod params;

pub use canonical::{canonical_string, is_provider_blank, sign};
pub use context::{SignatureContext, SignedRequest, SIGNATURE_FIELD};
pub use error::SigningError;
pub use params::{CarrierParams, ParamValue};
