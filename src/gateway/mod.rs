//! # Gateway Module
//!
//! HTTP surface of the cache gateway: router, handlers and server lifecycle.

pub mod handlers;
pub mod server;

pub use server::{create_router, GatewayServer, ServerState};
