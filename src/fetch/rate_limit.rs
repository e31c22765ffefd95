//! Per-host politeness limiting for page fetches

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::trace;

/// Rate limiter keyed by host name, shared across concurrent fetches
#[derive(Clone)]
pub struct HostRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl HostRateLimiter {
    /// Create a limiter allowing `requests_per_second` per host.
    ///
    /// Fractional rates are rounded up; the minimum is one request per second.
    pub fn new(requests_per_second: f64) -> Self {
        let rps = NonZeroU32::new(requests_per_second.ceil().max(0.0) as u32)
            .unwrap_or(nonzero!(1u32));
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(rps))),
        }
    }

    /// Wait until a request to `host` is allowed
    pub async fn wait(&self, host: &str) {
        trace!("Rate limiting: waiting for {}", host);
        self.limiter.until_key_ready(&host.to_string()).await;
    }
}
