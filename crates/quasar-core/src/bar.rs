//! The Bar data model and the supported interval grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported bar intervals. `FromStr`/`Display` round-trip the wire representation used
/// in subscription rows and request tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Interval {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::ThirtyMinutes => "30min",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
            Interval::OneMonth => "1M",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported interval {0:?}")]
pub struct UnsupportedInterval(pub String);

impl FromStr for Interval {
    type Err = UnsupportedInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "1min" => Interval::OneMinute,
            "5min" => Interval::FiveMinutes,
            "15min" => Interval::FifteenMinutes,
            "30min" => Interval::ThirtyMinutes,
            "1h" => Interval::OneHour,
            "4h" => Interval::FourHours,
            "1d" => Interval::OneDay,
            "1w" => Interval::OneWeek,
            "1M" => Interval::OneMonth,
            other => return Err(UnsupportedInterval(other.to_string())),
        })
    }
}

/// An OHLCV record. `ts` is the bar-close instant. Within a `(provider, interval)`
/// stream, bars are idempotent under `(ts, sym)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub sym: String,
    pub provider: String,
    pub interval: Interval,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

/// A historical-provider data request: inclusive `[start, end]`, oldest-to-newest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Req {
    pub sym: String,
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
    pub interval: Interval,
}

/// Tags a provider registration's runtime behavior. `Index` carries no scheduling
/// offset of its own (`δ = 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderType {
    Historical,
    Realtime,
    Index,
}

/// Symbol metadata returned by `get_available_symbols`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
}
