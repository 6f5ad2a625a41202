use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::server::{ApiError, AppState};

/// Decrypt a stored file into the decrypted directory and stream it back.
pub async fn handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let name = filename.clone();
    let decrypted = state
        .blocking(move |vault| vault.open_decrypted(&name))
        .await?;

    tracing::info!(file = %filename, size = decrypted.size, "file decrypted");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        decrypted.name.replace('"', "_")
    );
    let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(
        decrypted.file,
    )));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, decrypted.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
