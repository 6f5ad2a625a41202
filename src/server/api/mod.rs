use axum::routing::{delete, get, post};
use axum::Router;

use super::AppState;

pub mod decrypt_all;
pub mod download;
pub mod files;
pub mod purge;
pub mod upload;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload::handler))
        .route("/upload-multiple", post(upload::multiple_handler))
        .route("/download/:filename", get(download::handler))
        .route("/delete", delete(purge::handler))
        .route("/decrypt-all", post(decrypt_all::handler))
        .route("/fetch-decrypted", get(files::decrypted_handler))
        .route("/fetch-encrypted", get(files::encrypted_handler))
        .with_state(state)
}
