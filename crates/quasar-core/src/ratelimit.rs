//! A reusable `(calls, seconds)` rate limiter and concurrency cap for concrete
//! Historical provider implementations, matching the source's
//! `aiolimiter.AsyncLimiter` + `aiohttp.TCPConnector(limit=CONCURRENCY)` pairing.
//!
//! This is a building block for providers (out of scope for the core runtime itself);
//! it lives here so every provider implementation shares one idiomatic rate-limiting
//! strategy instead of hand-rolling one per provider.

use governor::{Quota, RateLimiter as GovernorLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Semaphore;

type DefaultLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Bounds a provider's outbound call rate to `calls` per `period_seconds`, and its
/// concurrent in-flight requests to `concurrency`.
pub struct Limiter {
    rate: Option<DefaultLimiter>,
    concurrency: Arc<Semaphore>,
}

impl Limiter {
    pub fn new(rate_limit: Option<(u32, u32)>, concurrency: usize) -> Self {
        let rate = rate_limit.map(|(calls, period_seconds)| {
            let calls = NonZeroU32::new(calls.max(1)).unwrap();
            let quota = Quota::with_period(std::time::Duration::from_secs(period_seconds.max(1) as u64))
                .unwrap()
                .allow_burst(calls);
            GovernorLimiter::direct(quota)
        });
        Self {
            rate,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Acquires both the concurrency slot and the rate-limiter's next permit,
    /// suspending as needed. The returned guard releases the concurrency slot on drop.
    pub async fn acquire(&self) -> tokio::sync::SemaphorePermit<'_> {
        let permit = self
            .concurrency
            .acquire()
            .await
            .expect("semaphore is never closed");
        if let Some(rate) = &self.rate {
            rate.until_ready().await;
        }
        permit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbounded_rate_never_waits() {
        let limiter = Limiter::new(None, 2);
        let _a = limiter.acquire().await;
    }
}
