//! Identity seeding: on startup, if `asset_identity` is empty, load YAML manifests
//! from a known subdirectory and insert each record. Never fatal — a missing
//! directory or a bad manifest is logged and skipped.

use quasar_core::asset::AssetIdentity;
use quasar_db::DbPool;
use std::path::Path;

pub async fn seed_identities(db: &DbPool, manifest_dir: &Path) {
    match quasar_db::identity::count_identities(db).await {
        Ok(n) if n > 0 => {
            tracing::debug!(count = n, "asset identities already seeded, skipping");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not check asset identity count, skipping seeding");
            return;
        }
        _ => {}
    }

    let mut entries = match tokio::fs::read_dir(manifest_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %manifest_dir.display(), error = %e, "identity manifest directory unavailable, skipping seeding");
            return;
        }
    };

    let mut seeded = 0u64;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error reading identity manifest directory");
                break;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml")
            && path.extension().and_then(|e| e.to_str()) != Some("yml")
        {
            continue;
        }

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read identity manifest");
                continue;
            }
        };
        let identities: Vec<AssetIdentity> = match serde_yaml::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "invalid identity manifest YAML");
                continue;
            }
        };
        for identity in identities {
            if let Err(e) = quasar_db::identity::insert_identity(db, &identity).await {
                tracing::warn!(common_symbol = %identity.common_symbol, error = %e, "failed to seed identity");
                continue;
            }
            seeded += 1;
        }
    }
    tracing::info!(seeded, "asset identity seeding complete");
}
