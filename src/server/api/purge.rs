use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::server::{ApiError, AppState};

#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    pub deleted: usize,
}

/// Delete all recovered plaintext.
pub async fn handler(State(state): State<AppState>) -> Result<Json<PurgeResponse>, ApiError> {
    let deleted = state.blocking(|vault| vault.purge_decrypted()).await?;
    tracing::info!("Deleted {} decrypted file(s)", deleted);
    Ok(Json(PurgeResponse { deleted }))
}
