//! # Core Module
//!
//! Error taxonomy, configuration, wire models and the circuit breaker shared
//! by the rest of the gateway.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod types;
