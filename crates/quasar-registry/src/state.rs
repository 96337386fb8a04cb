//! Shared handler state: the DB pool, the process master secret, the dynamic-code
//! allow-list root, and an HTTP client for the Inter-Service Protocol calls to the
//! Collector (§4.I).

use quasar_core::secrets::MasterSecret;
use quasar_db::DbPool;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub master: &'static MasterSecret,
    pub allowlist_root: PathBuf,
    pub collector_base_url: String,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        master: &'static MasterSecret,
        allowlist_root: PathBuf,
        collector_base_url: String,
    ) -> Self {
        Self {
            db,
            master,
            allowlist_root,
            collector_base_url,
            http: reqwest::Client::new(),
        }
    }
}
