//! Historical Collector (§4.F): per-symbol watermark lookup, gap request generation,
//! batched insert.

use futures::StreamExt;
use quasar_core::bar::{Bar, Interval};
use quasar_core::error::ProviderError;
use quasar_core::provider::HistoricalProvider;
use quasar_db::bars::BATCH_SIZE;
use quasar_db::DbPool;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HistoricalJobError {
    #[error(transparent)]
    Db(#[from] quasar_db::DbError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Runs one historical-collector firing: builds gap requests, pulls bars, and
/// batch-inserts them. Returns the number of bars inserted.
pub async fn run_historical_job(
    db: &DbPool,
    provider: Arc<dyn HistoricalProvider>,
    interval: Interval,
    symbols: &[String],
    lookback_days: i64,
) -> Result<u64, HistoricalJobError> {
    let reqs = quasar_db::bars::build_reqs_historical(
        db,
        provider.name(),
        interval,
        symbols,
        lookback_days,
    )
    .await?;

    if reqs.is_empty() {
        tracing::warn!(provider = provider.name(), "no valid requests to make");
        return Ok(0);
    }

    let mut stream = provider.get_history_many(&reqs);
    let mut buf: Vec<Bar> = Vec::with_capacity(BATCH_SIZE);
    let mut total = 0u64;

    while let Some(bar) = stream.next().await {
        buf.push(bar?);
        if buf.len() >= BATCH_SIZE {
            total += quasar_db::bars::insert_bars(db, provider.provider_type(), &buf).await?;
            buf.clear();
        }
    }
    if !buf.is_empty() {
        total += quasar_db::bars::insert_bars(db, provider.provider_type(), &buf).await?;
    }
    Ok(total)
}
