//! Pooled Postgres/TimescaleDB access for the Quasar ingestion runtime, grounded on
//! `wasmcloud-provider-sqldb-postgres`'s use of `deadpool-postgres` + `tokio-postgres`.

pub mod assets;
pub mod bars;
pub mod identity;
pub mod pool;
pub mod registry;
pub mod subscriptions;

pub use pool::{DbError, DbPool};
