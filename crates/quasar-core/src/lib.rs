//! Core data model, secrets envelope, and provider contract shared by every Quasar
//! ingestion service. See `quasar-loader` for dynamic loading, `quasar-cron` for the
//! offset-cron trigger, `quasar-scheduler` for reconciliation and collection, and
//! `quasar-db`/`quasar-registry` for persistence and the HTTP control plane.

pub mod asset;
pub mod bar;
pub mod error;
pub mod provider;
pub mod ratelimit;
pub mod registration;
pub mod secrets;

pub const SYMBOL_HASH_CHUNK: usize = 8192;
