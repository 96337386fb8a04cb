//! `code_registry` CRUD: lookups for the loader, upserts/deletes for the registry API.

use crate::pool::{DbError, DbPool};
use quasar_core::registration::{ClassSubtype, ClassType, ProviderRegistration};
use std::str::FromStr;

pub async fn lookup(
    db: &DbPool,
    class_name: &str,
    class_type: ClassType,
) -> Result<Option<ProviderRegistration>, DbError> {
    let client = db.get().await?;
    let row = client
        .query_opt(
            "SELECT class_name, class_type, class_subtype, file_path, file_hash, \
                    nonce, ciphertext, preferences, uploaded_at \
             FROM code_registry WHERE class_name = $1 AND class_type = $2",
            &[&class_name, &class_type.as_str()],
        )
        .await?;

    Ok(match row {
        None => None,
        Some(r) => {
            let hash_vec: Vec<u8> = r.get("file_hash");
            let nonce_vec: Vec<u8> = r.get("nonce");
            Some(ProviderRegistration {
                class_name: r.get("class_name"),
                class_type,
                class_subtype: ClassSubtype::from_str(r.get("class_subtype"))
                    .unwrap_or(ClassSubtype::Historical),
                file_path: r.get("file_path"),
                file_hash: hash_vec.try_into().unwrap_or([0u8; 32]),
                nonce: nonce_vec.try_into().unwrap_or([0u8; 12]),
                ciphertext: r.get("ciphertext"),
                preferences: r.get("preferences"),
                uploaded_at: r.get("uploaded_at"),
            })
        }
    })
}

pub async fn upsert(db: &DbPool, reg: &ProviderRegistration) -> Result<(), DbError> {
    let client = db.get().await?;
    client
        .execute(
            "INSERT INTO code_registry \
                (class_name, class_type, class_subtype, file_path, file_hash, nonce, \
                 ciphertext, preferences, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now()) \
             ON CONFLICT (class_name, class_type) DO UPDATE SET \
                class_subtype = EXCLUDED.class_subtype, \
                file_path = EXCLUDED.file_path, \
                file_hash = EXCLUDED.file_hash, \
                nonce = EXCLUDED.nonce, \
                ciphertext = EXCLUDED.ciphertext, \
                preferences = EXCLUDED.preferences",
            &[
                &reg.class_name,
                &reg.class_type.as_str(),
                &reg.class_subtype.as_str(),
                &reg.file_path,
                &reg.file_hash.to_vec(),
                &reg.nonce.to_vec(),
                &reg.ciphertext,
                &reg.preferences,
            ],
        )
        .await?;
    Ok(())
}

/// Deletes the registration row. Returns `true` if a row was removed.
pub async fn delete(
    db: &DbPool,
    class_name: &str,
    class_type: ClassType,
) -> Result<bool, DbError> {
    let client = db.get().await?;
    let n = client
        .execute(
            "DELETE FROM code_registry WHERE class_name = $1 AND class_type = $2",
            &[&class_name, &class_type.as_str()],
        )
        .await?;
    Ok(n > 0)
}

pub async fn update_preferences(
    db: &DbPool,
    class_name: &str,
    class_type: ClassType,
    preferences: &serde_json::Value,
) -> Result<bool, DbError> {
    let client = db.get().await?;
    let n = client
        .execute(
            "UPDATE code_registry SET preferences = $3 \
             WHERE class_name = $1 AND class_type = $2",
            &[&class_name, &class_type.as_str(), preferences],
        )
        .await?;
    Ok(n > 0)
}

pub async fn update_secrets(
    db: &DbPool,
    class_name: &str,
    class_type: ClassType,
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<bool, DbError> {
    let client = db.get().await?;
    let n = client
        .execute(
            "UPDATE code_registry SET nonce = $3, ciphertext = $4 \
             WHERE class_name = $1 AND class_type = $2",
            &[
                &class_name,
                &class_type.as_str(),
                &nonce.to_vec(),
                &ciphertext,
            ],
        )
        .await?;
    Ok(n > 0)
}

/// Left-joins registrations with their asset counts, backing `GET /internal/classes/summary`.
#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub class_name: String,
    pub class_type: String,
    pub class_subtype: String,
    pub asset_count: i64,
}

pub async fn classes_summary(db: &DbPool) -> Result<Vec<ClassSummary>, DbError> {
    let client = db.get().await?;
    let rows = client
        .query(
            "SELECT r.class_name, r.class_type, r.class_subtype, \
                    count(a.symbol) AS asset_count \
             FROM code_registry r \
             LEFT JOIN assets a \
               ON a.class_name = r.class_name AND a.class_type = r.class_type \
             GROUP BY r.class_name, r.class_type, r.class_subtype",
            &[],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| ClassSummary {
            class_name: r.get("class_name"),
            class_type: r.get("class_type"),
            class_subtype: r.get("class_subtype"),
            asset_count: r.get("asset_count"),
        })
        .collect())
}
