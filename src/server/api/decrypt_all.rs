use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::server::{ApiError, AppState};
use crate::store::BatchReport;

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptAllResponse {
    pub decrypted: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub succeeded_count: usize,
    pub failed_count: usize,
}

impl From<BatchReport> for DecryptAllResponse {
    fn from(report: BatchReport) -> Self {
        let succeeded_count = report.succeeded();
        let failed_count = report.failed_count();
        Self {
            decrypted: report.decrypted,
            failed: report
                .failed
                .into_iter()
                .map(|f| FailedFile {
                    name: f.name,
                    error: f.error.to_string(),
                })
                .collect(),
            succeeded_count,
            failed_count,
        }
    }
}

pub async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.blocking(|vault| vault.decrypt_all()).await?;

    for failure in &report.failed {
        tracing::warn!(file = %failure.name, error = %failure.error, "decryption failed");
    }
    tracing::info!(
        "Decrypted {} file(s), {} failed",
        report.succeeded(),
        report.failed_count()
    );

    Ok((StatusCode::OK, Json(DecryptAllResponse::from(report))))
}
