//! CONFIGURABLE schema, preference patch, and credential-key endpoints (§4.H).

use axum::extract::{Query, State};
use axum::Json;
use quasar_core::registration::ClassType;
use quasar_core::secrets::{DerivedContext, Envelope};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ClassQuery {
    pub class_name: String,
    pub class_type: String,
}

pub async fn schema(
    State(state): State<AppState>,
    Query(q): Query<ClassQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let class_type = ClassType::from_str(&q.class_type)?;
    let reg = quasar_db::registry::lookup(&state.db, &q.class_name, class_type)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(quasar_core::registration::schema_json(reg.class_subtype)))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Query(q): Query<ClassQuery>,
    Json(patch): Json<BTreeMap<String, serde_json::Value>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let class_type = ClassType::from_str(&q.class_type)?;
    let reg = quasar_db::registry::lookup(&state.db, &q.class_name, class_type)
        .await?
        .ok_or(ApiError::NotFound)?;

    quasar_core::registration::validate_patch(reg.class_subtype, &patch)
        .map_err(ApiError::ValidationMany)?;

    let mut preferences = reg.preferences.clone();
    if !preferences.is_object() {
        preferences = serde_json::json!({});
    }
    let root = preferences.as_object_mut().expect("just coerced to object");
    for (path, value) in &patch {
        let Some((category, field)) = path.split_once('.') else {
            continue;
        };
        let category_obj = root
            .entry(category.to_string())
            .or_insert_with(|| serde_json::json!({}));
        if !category_obj.is_object() {
            *category_obj = serde_json::json!({});
        }
        category_obj
            .as_object_mut()
            .expect("just coerced to object")
            .insert(field.to_string(), value.clone());
    }

    quasar_db::registry::update_preferences(&state.db, &q.class_name, class_type, &preferences).await?;
    Ok(Json(preferences))
}

pub async fn secret_keys(
    State(state): State<AppState>,
    Query(q): Query<ClassQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let class_type = ClassType::from_str(&q.class_type)?;
    let reg = quasar_db::registry::lookup(&state.db, &q.class_name, class_type)
        .await?
        .ok_or(ApiError::NotFound)?;

    if reg.ciphertext.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let ctx = DerivedContext::new(
        state.master,
        reg.file_hash,
        Envelope {
            nonce: reg.nonce,
            ciphertext: reg.ciphertext,
        },
    );
    Ok(Json(ctx.key_names()?))
}

#[derive(Deserialize)]
pub struct SecretsPatch {
    pub secrets: BTreeMap<String, String>,
}

pub async fn update_secrets(
    State(state): State<AppState>,
    Query(q): Query<ClassQuery>,
    Json(body): Json<SecretsPatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.secrets.is_empty() {
        return Err(ApiError::Validation(quasar_core::error::ValidationError::EmptySecrets));
    }
    let class_type = ClassType::from_str(&q.class_type)?;
    let reg = quasar_db::registry::lookup(&state.db, &q.class_name, class_type)
        .await?
        .ok_or(ApiError::NotFound)?;

    let plaintext = serde_json::to_vec(&body.secrets)
        .map_err(|_| ApiError::BadRequest("secrets serialization failed".into()))?;
    let envelope = quasar_core::secrets::encrypt(state.master, &reg.file_hash, &plaintext);

    quasar_db::registry::update_secrets(
        &state.db,
        &q.class_name,
        class_type,
        &envelope.nonce,
        &envelope.ciphertext,
    )
    .await?;

    let unload_url = format!(
        "{}/internal/providers/{}/unload",
        state.collector_base_url, q.class_name
    );
    if let Err(e) = state.http.post(&unload_url).send().await {
        tracing::warn!(class_name = %q.class_name, error = %e, "best-effort collector unload failed");
    }

    Ok(Json(serde_json::json!({"updated": true})))
}
