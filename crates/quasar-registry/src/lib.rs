//! HTTP control plane for provider registrations, preferences, credentials, and asset
//! mappings — the Registry half of the Registry/Collector split described in §4.I.
//! Built on `axum`, matching the teacher's own HTTP stack choice in
//! `provider-http-server`.

pub mod config;
pub mod error;
pub mod mappings;
pub mod router;
pub mod seed;
pub mod state;
pub mod upload;

pub use router::build_router;
pub use state::AppState;
