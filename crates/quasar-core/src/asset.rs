//! Registry-owned asset identity tables: `Asset`, `AssetIdentity`, `AssetMapping`.

use serde::{Deserialize, Serialize};

/// A provider-local symbol row. Unique per provider on `(class_name, class_type, symbol)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub class_name: String,
    pub class_type: String,
    pub symbol: String,
    pub external_id: Option<String>,
    pub isin: Option<String>,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub asset_class: Option<String>,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
    pub country: Option<String>,
}

/// A common cross-provider identity (e.g. FIGI), seeded from manifest YAML at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIdentity {
    pub common_symbol: String,
    pub figi: Option<String>,
    pub name: Option<String>,
}

/// Maps a provider-local symbol to a common identity. Unique on
/// `(common_symbol, class_name, class_type, class_symbol)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMapping {
    pub common_symbol: String,
    pub class_name: String,
    pub class_type: String,
    pub class_symbol: String,
    pub is_active: bool,
}

/// Per-provider outcome of an asset-upsert batch, returned by `update-assets`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetUpsertStats {
    pub added: u64,
    pub updated: u64,
    pub failed: u64,
}
