//! The subscriptions view the scheduler reconciles against, grouped at the database
//! layer exactly as `datahub/core.py`'s `get_subscriptions` query does.

use crate::pool::{DbError, DbPool};
use quasar_core::bar::Interval;
use std::str::FromStr;

/// One reconciliation row: all symbols sharing a `(provider, interval, cron)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedSubscription {
    pub provider: String,
    pub interval: Interval,
    pub cron: String,
    pub symbols: Vec<String>,
}

pub async fn fetch_subscriptions(db: &DbPool) -> Result<Vec<AggregatedSubscription>, DbError> {
    let client = db.get().await?;
    let rows = client
        .query(
            "SELECT provider, interval, cron, array_agg(sym) AS syms \
             FROM provider_subscription \
             GROUP BY provider, interval, cron",
            &[],
        )
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| {
            let interval_raw: String = r.get("interval");
            let interval = Interval::from_str(&interval_raw).ok()?;
            Some(AggregatedSubscription {
                provider: r.get("provider"),
                interval,
                cron: r.get("cron"),
                symbols: r.get("syms"),
            })
        })
        .collect())
}
