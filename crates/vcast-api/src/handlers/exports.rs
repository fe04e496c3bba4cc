//! Export submission and status handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use vcast_models::{ExportJob, ExportKind, JobId, JobStatus, Manifest, NewExportJob, StyleTemplate};
use vcast_storage::upload_key;
use vcast_store::StoreError;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

/// `POST /api/exports` body. Exactly one of `audio_url` and `audio_upload`
/// must be given.
#[derive(Debug, Deserialize)]
pub struct SubmitExportRequest {
    pub kind: ExportKind,
    pub user_id: String,
    /// Reference to existing audio: URL, `r2://` key or worker-local path
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Audio bytes sent with the submission
    #[serde(default)]
    pub audio_upload: Option<AudioUpload>,
    pub manifest: Manifest,
    /// Built-in template id
    #[serde(default)]
    pub template_id: Option<String>,
    /// Inline style, used when no template id is given
    #[serde(default)]
    pub style: Option<StyleTemplate>,
}

/// Inline audio, base64 encoded.
#[derive(Debug, Deserialize)]
pub struct AudioUpload {
    /// Original file name; only its extension is kept
    #[serde(default)]
    pub filename: Option<String>,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitExportResponse {
    pub job_id: String,
    pub estimated_duration_secs: u64,
    pub status_url: String,
}

/// Job status as seen by clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportStatusResponse {
    pub job_id: String,
    pub kind: ExportKind,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ExportJob> for ExportStatusResponse {
    fn from(job: ExportJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            output_url: job.output_url,
            output_size: job.output_size,
            error: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportListResponse {
    pub exports: Vec<ExportStatusResponse>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListExportsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// POST /api/exports
///
/// Validates and enqueues an export. Rejected requests leave no job behind.
///
/// Uploaded audio is written to storage only after the rest of the request
/// validates, and is submitted as an `r2://` reference.
///
/// Returns:
/// - 202: Job accepted
/// - 400: Malformed body, unknown template, bad audio, or invalid manifest
/// - 502: Uploaded audio could not be stored
pub async fn submit_export(
    State(state): State<AppState>,
    payload: Result<Json<SubmitExportRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, HeaderMap, Json<SubmitExportResponse>)> {
    let Json(request) = payload.map_err(|e| {
        metrics::record_export_rejected("malformed");
        ApiError::bad_request(e.body_text())
    })?;

    let style = resolve_style(request.template_id.as_deref(), request.style).inspect_err(|_| {
        metrics::record_export_rejected("style");
    })?;

    let (audio_ref, upload) = match (request.audio_url, request.audio_upload) {
        (Some(url), None) => (url, None),
        (None, Some(upload)) => {
            let decoded = decode_upload(upload, state.config.max_upload_bytes).inspect_err(|_| {
                metrics::record_export_rejected("upload");
            })?;
            ("upload".to_string(), Some(decoded))
        }
        _ => {
            metrics::record_export_rejected("malformed");
            return Err(ApiError::bad_request(
                "give exactly one of audio_url or audio_upload",
            ));
        }
    };

    let mut job = NewExportJob::new(
        request.kind,
        request.user_id,
        audio_ref,
        request.manifest,
        style,
    );
    if let Some(upload) = upload {
        // Validate first so a rejected request stores nothing.
        job.validate(state.store.config().max_duration_ms)
            .map_err(|e| {
                metrics::record_export_rejected("validation");
                ApiError::from(StoreError::from(e))
            })?;
        job.audio_ref = store_upload(&state, &job.user_id, upload).await?;
    }
    let kind = job.kind;
    let estimated_duration_secs = kind.estimate_processing_secs(job.manifest.total_duration_ms());

    let job_id = state.store.submit(job).await.inspect_err(|e| {
        if e.is_client_error() {
            metrics::record_export_rejected("validation");
        }
    })?;
    metrics::record_export_submitted(kind.as_str());
    info!(job_id = %job_id, kind = %kind, "Accepted export");

    let status_url = format!("/api/exports/{}", job_id);
    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&status_url) {
        headers.insert(header::LOCATION, location);
    }

    Ok((
        StatusCode::ACCEPTED,
        headers,
        Json(SubmitExportResponse {
            job_id: job_id.to_string(),
            estimated_duration_secs,
            status_url,
        }),
    ))
}

/// GET /api/exports/:job_id
pub async fn get_export(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ExportStatusResponse>> {
    let job = state
        .store
        .get(&JobId::from_string(job_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("export {}", job_id)))?;
    Ok(Json(job.into()))
}

/// GET /api/users/:user_id/exports
///
/// Newest first; `limit` defaults to 20 and is capped at 100.
pub async fn list_user_exports(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListExportsQuery>,
) -> ApiResult<Json<ExportListResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let exports: Vec<ExportStatusResponse> = state
        .store
        .list_by_user(&user_id, limit)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ExportListResponse {
        count: exports.len(),
        exports,
    }))
}

#[derive(Debug)]
struct DecodedUpload {
    extension: String,
    bytes: Vec<u8>,
}

fn decode_upload(upload: AudioUpload, max_bytes: usize) -> ApiResult<DecodedUpload> {
    let bytes = STANDARD
        .decode(upload.data.trim())
        .map_err(|e| ApiError::bad_request(format!("audio_upload.data is not base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("audio_upload is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::bad_request(format!(
            "audio_upload is {} bytes, over the {} byte limit",
            bytes.len(),
            max_bytes
        )));
    }

    let extension = upload
        .filename
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "audio".to_string());

    Ok(DecodedUpload { extension, bytes })
}

fn audio_content_type(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// Write the bytes to storage and return the `r2://` reference workers stage.
async fn store_upload(state: &AppState, user_id: &str, upload: DecodedUpload) -> ApiResult<String> {
    let upload_id = Uuid::new_v4().to_string();
    let key = upload_key(user_id, &upload_id, &upload.extension);
    let tmp = std::env::temp_dir().join(format!("vcast-upload-{}", upload_id));

    tokio::fs::write(&tmp, &upload.bytes)
        .await
        .map_err(|e| ApiError::internal(format!("failed to buffer upload: {}", e)))?;
    let stored = state
        .storage
        .store(&tmp, &key, audio_content_type(&upload.extension))
        .await;
    if let Err(e) = tokio::fs::remove_file(&tmp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove upload buffer {}: {}", tmp.display(), e);
        }
    }

    let stored = stored?;
    info!(key = %stored.key, size = stored.size, "Stored uploaded audio");
    Ok(format!("r2://{}", stored.key))
}

/// A template id picks a built-in; otherwise the inline style, otherwise the
/// default template.
fn resolve_style(template_id: Option<&str>, inline: Option<StyleTemplate>) -> ApiResult<StyleTemplate> {
    match (template_id, inline) {
        (Some(_), Some(_)) => Err(ApiError::bad_request(
            "give either template_id or style, not both",
        )),
        (Some(id), None) => StyleTemplate::builtin(id).map_err(|e| ApiError::bad_request(e.to_string())),
        (None, Some(style)) => Ok(style),
        (None, None) => Ok(StyleTemplate::default()),
    }
}
