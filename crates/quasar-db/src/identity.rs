//! The common cross-provider identity table (`asset_identity`), seeded once from
//! manifest YAML at registry startup.

use crate::pool::{DbError, DbPool};
use quasar_core::asset::AssetIdentity;

pub async fn count_identities(db: &DbPool) -> Result<i64, DbError> {
    let client = db.get().await?;
    let row = client
        .query_one("SELECT count(*) AS n FROM asset_identity", &[])
        .await?;
    Ok(row.get("n"))
}

pub async fn insert_identity(db: &DbPool, identity: &AssetIdentity) -> Result<(), DbError> {
    let client = db.get().await?;
    client
        .execute(
            "INSERT INTO asset_identity (common_symbol, figi, name) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (common_symbol) DO NOTHING",
            &[&identity.common_symbol, &identity.figi, &identity.name],
        )
        .await?;
    Ok(())
}
