//! The Provider Contract: a tagged sum type over Historical (pull) and Live (push)
//! variants sharing a common capability trait, unified by `ProviderHandle::stream`.
//!
//! Grounded on `wascc-host`'s `CapabilityProvider` trait object pattern (a boxed
//! `dyn Trait` returned from a dynamically loaded constructor) generalized to two
//! concrete sub-traits instead of one, per the source's `HistoricalDataProvider`/
//! `LiveDataProvider` split.

use crate::bar::{Bar, Interval, ProviderType, Req, SymbolInfo};
use crate::error::ProviderError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Capability shared by every provider, historical or live.
#[async_trait]
pub trait ProviderDyn: Send + Sync {
    /// Unique provider id, e.g. `"EODHD"`. Must equal the `class_name` it was loaded as.
    fn name(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    /// Optional symbol discovery. Default: unsupported (501 at the HTTP boundary).
    async fn get_available_symbols(&self) -> Result<Vec<SymbolInfo>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    /// Closes sockets/sessions; invoked during unload.
    async fn close(&self);
}

/// Pull-driven: request-response bars for explicit `[start, end]` ranges.
#[async_trait]
pub trait HistoricalProvider: ProviderDyn {
    /// Rate limit as `(calls, per_seconds)`; `None` means unbounded.
    fn rate_limit(&self) -> Option<(u32, u32)> {
        None
    }

    /// Maximum concurrent in-flight requests.
    fn concurrency(&self) -> usize {
        5
    }

    /// Inclusive `[start, end]` bars, oldest to newest. `UnsupportedInterval` on a bad grid.
    fn get_history(&self, req: &Req) -> BoxStream<'_, Result<Bar, ProviderError>>;

    /// Batched variant; the default loops over `get_history` per request in order.
    fn get_history_many<'a>(
        &'a self,
        reqs: &'a [Req],
    ) -> BoxStream<'a, Result<Bar, ProviderError>> {
        use futures::StreamExt;
        futures::stream::iter(reqs)
            .flat_map(move |r| self.get_history(r))
            .boxed()
    }
}

/// Session-driven: a bounded live listen window ending in one bar per symbol.
#[async_trait]
pub trait LiveProvider: ProviderDyn {
    /// Seconds to keep listening past the bar-close grid instant.
    fn close_buffer_seconds(&self) -> u64;

    /// Opens the websocket session. Implementations return a boxed transport so the
    /// live collector can drive it generically.
    async fn connect(&self) -> Result<Box<dyn LiveSession>, ProviderError>;
}

/// A single live-collector session: subscribe, receive, unsubscribe, close.
#[async_trait]
pub trait LiveSession: Send {
    async fn subscribe(&mut self, interval: Interval, symbols: &[String]) -> Result<(), ProviderError>;
    async fn unsubscribe(&mut self, symbols: &[String]) -> Result<(), ProviderError>;

    /// Returns the next raw message, or `None` when the connection has closed.
    async fn recv(&mut self) -> Option<String>;

    /// Parses one message into zero or more bars. Non-price messages return `Ok(vec![])`.
    fn parse_message(&self, message: &str) -> Result<Vec<Bar>, ProviderError>;
}

/// The unified handle the scheduler's collectors hold, dispatching on the active variant.
pub enum ProviderHandle {
    Historical(std::sync::Arc<dyn HistoricalProvider>),
    Live(std::sync::Arc<dyn LiveProvider>),
}

impl ProviderHandle {
    pub fn name(&self) -> &str {
        match self {
            ProviderHandle::Historical(p) => p.name(),
            ProviderHandle::Live(p) => p.name(),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderHandle::Historical(p) => p.provider_type(),
            ProviderHandle::Live(p) => p.provider_type(),
        }
    }

    pub async fn close(&self) {
        match self {
            ProviderHandle::Historical(p) => p.close().await,
            ProviderHandle::Live(p) => p.close().await,
        }
    }

    pub async fn get_available_symbols(&self) -> Result<Vec<SymbolInfo>, ProviderError> {
        match self {
            ProviderHandle::Historical(p) => p.get_available_symbols().await,
            ProviderHandle::Live(p) => p.get_available_symbols().await,
        }
    }
}
