//! # Authentication
//!
//! The gateway has a single credential: a shared API key sent in the
//! `x-pbc-api-key` header.

pub mod api_key;

pub use api_key::{ApiKeyGate, API_KEY_HEADER};
