use std::io;

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::server::{ApiError, AppState};
use crate::store::{StagedFile, StoredFile};
use crate::Error;

/// Chunks buffered between the request body and the encrypting thread.
const CHUNK_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct FileUploadResult {
    pub file_name: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
}

impl FileUploadResult {
    fn stored(file_name: String, stored: StoredFile) -> Self {
        Self {
            file_name,
            name: Some(stored.name),
            size: Some(stored.size),
            success: true,
            error: None,
        }
    }

    fn failed(file_name: String, error: String) -> Self {
        Self {
            file_name,
            name: None,
            size: None,
            success: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadMultipleResponse {
    pub files: Vec<FileUploadResult>,
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
}

/// Forward the chunks of `field` to `tx` until the field ends or the
/// receiving side stops reading.
async fn forward_chunks(
    mut field: Field<'_>,
    tx: mpsc::Sender<io::Result<Bytes>>,
) -> Result<(), MultipartError> {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(Ok(chunk)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                let _ = tx
                    .send(Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))
                    .await;
                return Err(e);
            }
        }
    }
}

/// Encrypt one multipart field into a staged envelope while it is still
/// arriving.
async fn stage_field(
    state: &AppState,
    field: Field<'_>,
    file_name: String,
) -> Result<StagedFile, ApiError> {
    let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let reader = SyncIoBridge::new(StreamReader::new(ReceiverStream::new(rx)));

    let (staged, forwarded) = tokio::join!(
        state.blocking(move |vault| vault.stage_encrypted(&file_name, reader)),
        forward_chunks(field, tx),
    );

    forwarded?;
    staged
}

/// Encrypt and store a single file sent as multipart field `file`.
///
/// The envelope is published only after the whole request has been read,
/// so a request carrying more than one `file` part stores nothing.
pub async fn handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut staged = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        if staged.is_some() {
            return Err(ApiError::BadRequest(
                "Only one file may be sent to /upload; use /upload-multiple".into(),
            ));
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;

        tracing::info!(file = %file_name, "encrypting upload");
        staged = Some(stage_field(&state, field, file_name).await?);
    }

    let staged: StagedFile =
        staged.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    let stored = state.blocking(move |vault| vault.commit(staged)).await?;

    tracing::info!(name = %stored.name, size = stored.size, "file uploaded and encrypted");
    Ok((StatusCode::OK, Json(stored)))
}

/// Encrypt and store every file sent as multipart field `files`.
///
/// Files are processed independently; a part without a filename, a rejected
/// name or a failed write is reported in that file's result. A missing key
/// or a broken request body fails the whole request.
pub async fn multiple_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut results = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            tracing::warn!("upload part without filename skipped");
            results.push(FileUploadResult::failed(
                String::new(),
                "files field has no filename".into(),
            ));
            continue;
        };

        let outcome = match stage_field(&state, field, file_name.clone()).await {
            Ok(staged) => state.blocking(move |vault| vault.commit(staged)).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(stored) => FileUploadResult::stored(file_name, stored),
            Err(ApiError::Vault(e @ Error::Configuration(_))) => return Err(e.into()),
            Err(e @ ApiError::Multipart(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "upload failed");
                FileUploadResult::failed(file_name, e.to_string())
            }
        };
        results.push(result);
    }

    if results.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".into()));
    }

    let successful_files = results.iter().filter(|r| r.success).count();
    tracing::info!(
        "Uploaded {} of {} file(s)",
        successful_files,
        results.len()
    );

    let response = UploadMultipleResponse {
        total_files: results.len(),
        failed_files: results.len() - successful_files,
        successful_files,
        files: results,
    };

    Ok((StatusCode::OK, Json(response)))
}
