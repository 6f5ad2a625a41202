use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::{ApiError, AppState};
use crate::store::StoreKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

async fn list(state: AppState, which: StoreKind) -> Result<Json<FilesResponse>, ApiError> {
    let files = state.blocking(move |vault| vault.list(which)).await?;
    Ok(Json(FilesResponse { files }))
}

pub async fn encrypted_handler(
    State(state): State<AppState>,
) -> Result<Json<FilesResponse>, ApiError> {
    list(state, StoreKind::Encrypted).await
}

pub async fn decrypted_handler(
    State(state): State<AppState>,
) -> Result<Json<FilesResponse>, ApiError> {
    list(state, StoreKind::Decrypted).await
}
