//! # Middleware Modules
//!
//! Tower middleware layers for the API service. Authentication lives in
//! [`crate::auth`].

pub mod tracing_layer;
