//! Asset upsert using the `xmax` sentinel to distinguish insert from update, and the
//! asset-mapping CRUD table.

use crate::pool::{DbError, DbPool};
use quasar_core::asset::{Asset, AssetMapping, AssetUpsertStats};

/// Upserts one asset row, returning whether it was newly inserted (`xmax = 0`) or
/// updated (`xmax != 0`).
pub async fn upsert_asset(db: &DbPool, asset: &Asset) -> Result<bool, DbError> {
    let client = db.get().await?;
    let row = client
        .query_one(
            "INSERT INTO assets \
                (class_name, class_type, symbol, external_id, isin, name, exchange, \
                 asset_class, base_currency, quote_currency, country) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (class_name, class_type, symbol) DO UPDATE SET \
                external_id = EXCLUDED.external_id, \
                isin = EXCLUDED.isin, \
                name = EXCLUDED.name, \
                exchange = EXCLUDED.exchange, \
                asset_class = EXCLUDED.asset_class, \
                base_currency = EXCLUDED.base_currency, \
                quote_currency = EXCLUDED.quote_currency, \
                country = EXCLUDED.country \
             RETURNING (xmax = 0) AS inserted",
            &[
                &asset.class_name,
                &asset.class_type,
                &asset.symbol,
                &asset.external_id,
                &asset.isin,
                &asset.name,
                &asset.exchange,
                &asset.asset_class,
                &asset.base_currency,
                &asset.quote_currency,
                &asset.country,
            ],
        )
        .await?;
    Ok(row.get::<_, bool>("inserted"))
}

/// Upserts a batch of assets for one provider, accumulating per-item outcomes rather
/// than failing the whole batch on one bad row — the partial-success error category.
pub async fn upsert_assets(db: &DbPool, assets: &[Asset]) -> AssetUpsertStats {
    let mut stats = AssetUpsertStats::default();
    for asset in assets {
        match upsert_asset(db, asset).await {
            Ok(true) => stats.added += 1,
            Ok(false) => stats.updated += 1,
            Err(e) => {
                tracing::warn!(symbol = %asset.symbol, error = %e, "asset upsert failed");
                stats.failed += 1;
            }
        }
    }
    stats
}

pub async fn create_mapping(db: &DbPool, m: &AssetMapping) -> Result<(), DbError> {
    let client = db.get().await?;
    client
        .execute(
            "INSERT INTO asset_mapping \
                (common_symbol, class_name, class_type, class_symbol, is_active) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &m.common_symbol,
                &m.class_name,
                &m.class_type,
                &m.class_symbol,
                &m.is_active,
            ],
        )
        .await?;
    Ok(())
}

pub async fn get_mappings(
    db: &DbPool,
    common_symbol: &str,
) -> Result<Vec<AssetMapping>, DbError> {
    let client = db.get().await?;
    let rows = client
        .query(
            "SELECT common_symbol, class_name, class_type, class_symbol, is_active \
             FROM asset_mapping WHERE common_symbol = $1",
            &[&common_symbol],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| AssetMapping {
            common_symbol: r.get("common_symbol"),
            class_name: r.get("class_name"),
            class_type: r.get("class_type"),
            class_symbol: r.get("class_symbol"),
            is_active: r.get("is_active"),
        })
        .collect())
}

pub async fn update_mapping_active(
    db: &DbPool,
    m: &AssetMapping,
) -> Result<bool, DbError> {
    let client = db.get().await?;
    let n = client
        .execute(
            "UPDATE asset_mapping SET is_active = $5 \
             WHERE common_symbol = $1 AND class_name = $2 AND class_type = $3 \
               AND class_symbol = $4",
            &[
                &m.common_symbol,
                &m.class_name,
                &m.class_type,
                &m.class_symbol,
                &m.is_active,
            ],
        )
        .await?;
    Ok(n > 0)
}

pub async fn delete_mapping(
    db: &DbPool,
    common_symbol: &str,
    class_name: &str,
    class_type: &str,
    class_symbol: &str,
) -> Result<bool, DbError> {
    let client = db.get().await?;
    let n = client
        .execute(
            "DELETE FROM asset_mapping \
             WHERE common_symbol = $1 AND class_name = $2 AND class_type = $3 \
               AND class_symbol = $4",
            &[&common_symbol, &class_name, &class_type, &class_symbol],
        )
        .await?;
    Ok(n > 0)
}
