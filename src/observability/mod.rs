//! # Observability Module
//!
//! Structured logging through `tracing`. Request spans come from the
//! `tower-http` trace layer installed on the router.

pub mod logging;

pub use logging::init_logging;
