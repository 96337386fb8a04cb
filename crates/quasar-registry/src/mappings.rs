//! Asset-mapping CRUD (§4.H): a straightforward surface over `asset_mapping`, resolved
//! per `SPEC_FULL.md` §4.H from the original's empty stub handlers into the minimal
//! composite-key contract spec.md §3/§4.H describes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use quasar_core::asset::AssetMapping;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Json(mapping): Json<AssetMapping>,
) -> Result<StatusCode, ApiError> {
    quasar_db::assets::create_mapping(&state.db, &mapping).await?;
    Ok(StatusCode::CREATED)
}

pub async fn list(
    State(state): State<AppState>,
    Path(common_symbol): Path<String>,
) -> Result<Json<Vec<AssetMapping>>, ApiError> {
    Ok(Json(
        quasar_db::assets::get_mappings(&state.db, &common_symbol).await?,
    ))
}

pub async fn update_active(
    State(state): State<AppState>,
    Json(mapping): Json<AssetMapping>,
) -> Result<StatusCode, ApiError> {
    let updated = quasar_db::assets::update_mapping_active(&state.db, &mapping).await?;
    if updated {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(serde::Deserialize)]
pub struct MappingKey {
    pub common_symbol: String,
    pub class_name: String,
    pub class_type: String,
    pub class_symbol: String,
}

pub async fn delete(
    State(state): State<AppState>,
    Path(key): Path<MappingKey>,
) -> Result<StatusCode, ApiError> {
    let deleted = quasar_db::assets::delete_mapping(
        &state.db,
        &key.common_symbol,
        &key.class_name,
        &key.class_type,
        &key.class_symbol,
    )
    .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
