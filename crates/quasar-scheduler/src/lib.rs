//! Subscription reconciliation, historical backfill, and live bar collection.
//!
//! `reconcile::Scheduler` owns the provider cache and the live job table; `historical`
//! and `live` implement the two collector kinds it dispatches into; `job` carries the
//! shared `JobKey` and the error-swallowing job wrapper every firing runs under.

pub mod historical;
pub mod job;
pub mod live;
pub mod reconcile;

pub use job::JobKey;
pub use reconcile::{DbRegistrationLookup, Scheduler};
