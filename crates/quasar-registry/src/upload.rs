//! Code upload/delete and the asset-refresh endpoints of the Registry Control Plane
//! (§4.H), plus the Inter-Service Protocol calls to the Collector (§4.I).

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use quasar_core::asset::AssetUpsertStats;
use quasar_core::registration::{ClassSubtype, ClassType, ProviderRegistration};
use quasar_core::secrets;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;

use crate::error::ApiError;
use crate::state::AppState;

/// The one extension the allow-list accepts for dynamically loaded provider code.
const ALLOWED_EXTENSION: &str = "so";

pub async fn upload(
    State(state): State<AppState>,
    Path(class_type): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let class_type = ClassType::from_str(&class_type)?;

    let mut class_name: Option<String> = None;
    let mut class_subtype: Option<ClassSubtype> = None;
    let mut secrets_json: Option<serde_json::Value> = None;
    let mut tmp_path: Option<std::path::PathBuf> = None;
    let mut hasher = Sha256::new();
    let mut byte_count: u64 = 0;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("class_name") => {
                class_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            Some("class_subtype") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                class_subtype = Some(
                    ClassSubtype::from_str(&raw)
                        .map_err(|_| ApiError::BadRequest(format!("unknown class_subtype {raw:?}")))?,
                );
            }
            Some("secrets") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                secrets_json = Some(
                    serde_json::from_str(&raw)
                        .map_err(|_| ApiError::BadRequest("secrets field is not valid JSON".into()))?,
                );
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let ext = std::path::Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string();
                if ext != ALLOWED_EXTENSION {
                    return Err(ApiError::UnsupportedMediaType(format!(
                        "expected .{ALLOWED_EXTENSION}, got {name:?}"
                    )));
                }
                let unique = format!("{}-{}.{ALLOWED_EXTENSION}", class_type.as_str(), uuid::Uuid::new_v4());
                let dest = state.allowlist_root.join(&unique);
                let mut out = tokio::fs::File::create(&dest).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?
                {
                    hasher.update(&chunk);
                    byte_count += chunk.len() as u64;
                    out.write_all(&chunk).await?;
                }
                out.flush().await?;
                tmp_path = Some(dest);
            }
            _ => {}
        }
    }

    let class_name = class_name.ok_or_else(|| ApiError::BadRequest("missing class_name field".into()))?;
    let class_subtype =
        class_subtype.ok_or_else(|| ApiError::BadRequest("missing class_subtype field".into()))?;
    let dest = tmp_path.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    if byte_count == 0 {
        tokio::fs::remove_file(&dest).await.ok();
        return Err(ApiError::BadRequest("empty upload".into()));
    }

    let file_hash: [u8; 32] = hasher.finalize().into();
    let secrets_json = secrets_json.unwrap_or_else(|| serde_json::json!({}));
    let plaintext =
        serde_json::to_vec(&secrets_json).map_err(|_| ApiError::BadRequest("secrets serialization failed".into()))?;
    let envelope = secrets::encrypt(state.master, &file_hash, &plaintext);

    if let Err(e) = validate_with_collector(&state, &class_name, class_subtype).await {
        tokio::fs::remove_file(&dest).await.ok();
        return Err(e);
    }

    let reg = ProviderRegistration {
        class_name: class_name.clone(),
        class_type,
        class_subtype,
        file_path: dest.display().to_string(),
        file_hash,
        nonce: envelope.nonce,
        ciphertext: envelope.ciphertext,
        preferences: serde_json::json!({}),
        uploaded_at: chrono::Utc::now(),
    };
    quasar_db::registry::upsert(&state.db, &reg).await?;

    Ok(Json(serde_json::json!({
        "class_name": class_name,
        "class_type": class_type.as_str(),
        "class_subtype": class_subtype.as_str(),
        "bytes": byte_count,
    })))
}

async fn validate_with_collector(
    state: &AppState,
    class_name: &str,
    class_subtype: ClassSubtype,
) -> Result<(), ApiError> {
    let url = format!("{}/internal/providers/{class_name}/validate", state.collector_base_url);
    let resp = state
        .http
        .post(&url)
        .json(&serde_json::json!({"class_name": class_name, "class_subtype": class_subtype.as_str()}))
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if status.is_success() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(_) => Err(ApiError::CollectorRejected(status, body)),
        Err(_) => Err(ApiError::BadUpstream(body)),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((class_type, class_name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let class_type = ClassType::from_str(&class_type)?;
    let reg = quasar_db::registry::lookup(&state.db, &class_name, class_type)
        .await?
        .ok_or(ApiError::NotFound)?;

    let removed = quasar_db::registry::delete(&state.db, &class_name, class_type).await?;
    if !removed {
        return Err(ApiError::NotFound);
    }

    match tokio::fs::remove_file(&reg.file_path).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            tracing::warn!(class_name, error = %e, "row deleted but file removal failed");
            Ok(StatusCode::from_u16(207).expect("207 is a valid status code"))
        }
    }
}

#[derive(Deserialize)]
struct SymbolInfoResponse {
    symbols: Vec<SymbolInfoEntry>,
}

#[derive(Deserialize)]
struct SymbolInfoEntry {
    symbol: String,
    name: Option<String>,
    exchange: Option<String>,
}

pub async fn update_assets(
    State(state): State<AppState>,
    Path((class_type, class_name)): Path<(String, String)>,
) -> Result<Json<AssetUpsertStats>, ApiError> {
    let class_type = ClassType::from_str(&class_type)?;
    quasar_db::registry::lookup(&state.db, &class_name, class_type)
        .await?
        .ok_or(ApiError::NotFound)?;
    let stats = refresh_assets_for(&state, &class_name, class_type).await?;
    Ok(Json(stats))
}

async fn refresh_assets_for(
    state: &AppState,
    class_name: &str,
    class_type: ClassType,
) -> Result<AssetUpsertStats, ApiError> {
    let url = format!("{}/internal/providers/{class_name}/available-symbols", state.collector_base_url);
    let resp = state.http.get(&url).send().await?;
    match resp.status() {
        StatusCode::NOT_FOUND => return Err(ApiError::NotFound),
        StatusCode::NOT_IMPLEMENTED => {
            return Ok(AssetUpsertStats::default());
        }
        status if !status.is_success() => {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::BadUpstream(body));
        }
        _ => {}
    }
    let body = resp.text().await.unwrap_or_default();
    let parsed: SymbolInfoResponse =
        serde_json::from_str(&body).map_err(|_| ApiError::BadUpstream(body))?;

    let assets: Vec<quasar_core::asset::Asset> = parsed
        .symbols
        .into_iter()
        .map(|s| quasar_core::asset::Asset {
            class_name: class_name.to_string(),
            class_type: class_type.as_str().to_string(),
            symbol: s.symbol,
            external_id: None,
            isin: None,
            name: s.name,
            exchange: s.exchange,
            asset_class: None,
            base_currency: None,
            quote_currency: None,
            country: None,
        })
        .collect();

    Ok(quasar_db::assets::upsert_assets(&state.db, &assets).await)
}

pub async fn update_all_assets(
    State(state): State<AppState>,
) -> Result<Json<std::collections::HashMap<String, AssetUpsertStats>>, ApiError> {
    let classes = quasar_db::registry::classes_summary(&state.db).await?;
    let mut out = std::collections::HashMap::new();
    for c in classes {
        let Ok(class_type) = ClassType::from_str(&c.class_type) else {
            continue;
        };
        match refresh_assets_for(&state, &c.class_name, class_type).await {
            Ok(stats) => {
                out.insert(c.class_name, stats);
            }
            Err(e) => {
                tracing::warn!(class_name = %c.class_name, error = %e, "asset refresh failed");
            }
        }
    }
    Ok(Json(out))
}

pub async fn classes_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let rows = quasar_db::registry::classes_summary(&state.db).await?;
    Ok(Json(
        rows.into_iter()
            .map(|r| {
                serde_json::json!({
                    "class_name": r.class_name,
                    "class_type": r.class_type,
                    "class_subtype": r.class_subtype,
                    "asset_count": r.asset_count,
                })
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as HttpStatusCode;
    use axum::routing::post as route_post;
    use axum::{Json as AxumJson, Router};
    use quasar_core::secrets::MasterSecret;
    use quasar_db::DbPool;
    use std::sync::Arc;

    fn test_master() -> &'static MasterSecret {
        let path = std::env::temp_dir().join(format!("quasar-test-master-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"test-master-secret").unwrap();
        Box::leak(Box::new(MasterSecret::load(path).unwrap()))
    }

    // `AppState.db` is never touched by `validate_with_collector`, so an uninitialized
    // `DbPool` (no real Postgres connection) is safe to use here.
    fn test_state(collector_base_url: String) -> AppState {
        AppState {
            db: Arc::new(DbPool::new()),
            master: test_master(),
            allowlist_root: std::env::temp_dir(),
            collector_base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Starts a one-shot mock Collector that always answers
    /// `/internal/providers/{class_name}/validate` with `status`/`body`, and returns
    /// its base URL.
    async fn spawn_mock_collector(status: HttpStatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/internal/providers/{class_name}/validate",
            route_post(move || {
                let body = body.clone();
                async move { (status, AxumJson(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn validate_with_collector_forwards_5xx_status() {
        let base_url = spawn_mock_collector(
            HttpStatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": "provider class failed to import"}),
        )
        .await;
        let state = test_state(base_url);

        let err = validate_with_collector(&state, "acme_historical", ClassSubtype::Historical)
            .await
            .unwrap_err();

        match err {
            ApiError::CollectorRejected(status, body) => {
                assert_eq!(status, HttpStatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.contains("failed to import"));
            }
            other => panic!("expected CollectorRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_with_collector_ok_on_success() {
        let base_url = spawn_mock_collector(HttpStatusCode::OK, serde_json::json!({})).await;
        let state = test_state(base_url);

        let result =
            validate_with_collector(&state, "acme_historical", ClassSubtype::Historical).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn upload_removes_temp_file_when_collector_rejects() {
        let base_url = spawn_mock_collector(
            HttpStatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": "boom"}),
        )
        .await;
        let state = test_state(base_url.clone());

        let dest = state.allowlist_root.join(format!("provider-{}.so", uuid::Uuid::new_v4()));
        tokio::fs::write(&dest, b"fake shared object bytes").await.unwrap();
        assert!(dest.exists());

        if let Err(e) = validate_with_collector(&state, "acme_historical", ClassSubtype::Historical).await {
            tokio::fs::remove_file(&dest).await.ok();
            match e {
                ApiError::CollectorRejected(status, _) => {
                    assert_eq!(status, HttpStatusCode::INTERNAL_SERVER_ERROR)
                }
                other => panic!("expected CollectorRejected, got {other:?}"),
            }
        } else {
            panic!("expected validate_with_collector to reject");
        }

        assert!(!dest.exists(), "temp file must be removed when validation is rejected");
    }
}
