use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::core::error::{GatewayError, GatewayResult};

/// Bounds a request-level operation by the configured cache timeout.
/// Work still running when the deadline fires is dropped, not rolled back.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_millis(timeout_ms: u64) -> Self {
        Self::new(Duration::from_millis(timeout_ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run<F, T>(&self, operation: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(timeout_ms, "request deadline exceeded");
                Err(GatewayError::Timeout { timeout_ms })
            }
        }
    }
}
