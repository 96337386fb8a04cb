//! Historical watermark lookups, gap computation, and bulk bar insertion.
//!
//! Grounded on `datahub/core.py`'s `_build_reqs_historical`/`_insert_bars`: the gap
//! formula and the `historical_data`/`live_data` table split are normative.

use crate::pool::{DbError, DbPool};
use chrono::{Duration, NaiveDate, Utc};
use quasar_core::bar::{Bar, Interval, ProviderType, Req};
use std::collections::HashMap;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 8000;
pub const BATCH_SIZE: usize = 500;

/// Builds the gap-aware request list for one `(provider, interval, symbols)` firing.
/// A symbol whose `start` falls after yesterday (already caught up) emits no `Req`.
pub async fn build_reqs_historical(
    db: &DbPool,
    provider: &str,
    interval: Interval,
    symbols: &[String],
    lookback_days: i64,
) -> Result<Vec<Req>, DbError> {
    let client = db.get().await?;
    let rows = client
        .query(
            "SELECT sym, last_updated::date AS d \
             FROM historical_symbol_state \
             WHERE provider = $1 AND sym = ANY($2::text[])",
            &[&provider, &symbols],
        )
        .await?;

    let last_updated: HashMap<String, NaiveDate> = rows
        .into_iter()
        .map(|r| (r.get::<_, String>("sym"), r.get::<_, NaiveDate>("d")))
        .collect();

    let today = Utc::now().date_naive();
    let yesterday = today - Duration::days(1);
    let default_start = yesterday - Duration::days(lookback_days);

    let mut reqs = Vec::new();
    for sym in symbols {
        let watermark = last_updated.get(sym).copied().unwrap_or(default_start);
        let start = watermark + Duration::days(1);
        if start > yesterday {
            continue;
        }
        reqs.push(Req {
            sym: sym.clone(),
            start,
            end: yesterday,
            interval,
        });
    }
    Ok(reqs)
}

/// Bulk-inserts `bars` via `COPY`, targeting `historical_data` or `live_data`
/// according to `provider_type`.
pub async fn insert_bars(
    db: &DbPool,
    provider_type: ProviderType,
    bars: &[Bar],
) -> Result<u64, DbError> {
    if bars.is_empty() {
        return Ok(0);
    }
    let table = match provider_type {
        ProviderType::Historical => "historical_data",
        ProviderType::Realtime => "live_data",
        ProviderType::Index => "historical_data",
    };

    let mut client = db.get().await?;
    let txn = client.transaction().await?;
    let copy_stmt = format!(
        "COPY {table} (ts, sym, provider, interval, o, h, l, c, v) FROM STDIN BINARY"
    );
    let sink = txn.copy_in(&copy_stmt).await?;
    let writer = BinaryCopyInWriter::new(
        sink,
        &[
            Type::TIMESTAMPTZ,
            Type::TEXT,
            Type::TEXT,
            Type::TEXT,
            Type::FLOAT8,
            Type::FLOAT8,
            Type::FLOAT8,
            Type::FLOAT8,
            Type::FLOAT8,
        ],
    );
    tokio::pin!(writer);
    for bar in bars {
        writer
            .as_mut()
            .write(&[
                &bar.ts,
                &bar.sym,
                &bar.provider,
                &bar.interval.as_str(),
                &bar.o,
                &bar.h,
                &bar.l,
                &bar.c,
                &bar.v,
            ])
            .await?;
    }
    let rows = writer.finish().await?;
    txn.commit().await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quasar_core::bar::Interval;

    #[test]
    fn gap_math_matches_scenario_3() {
        // lookback_days=365, no watermark, today=2024-06-15 -> start=2023-06-15.
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let yesterday = today - Duration::days(1);
        let default_start = yesterday - Duration::days(365);
        let start = default_start + Duration::days(1);
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
        assert!(start <= yesterday);
        let _ = Interval::OneDay;
    }

    #[test]
    fn caught_up_watermark_skips() {
        let yesterday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let watermark = yesterday;
        let start = watermark + Duration::days(1);
        assert!(start > yesterday);
    }
}
