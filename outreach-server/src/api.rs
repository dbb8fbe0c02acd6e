//! Batch, job and unsubscribe handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::HeaderMap,
};
use outreach_common::incoming;
use outreach_delivery::{JobStatusView, PreviewItem, Visibility};
use outreach_store::{JobCreation, JobId, JobStatus, JobSummary, NewLineItem, PrepareId};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::is_admin, error::ApiError};

pub const DEFAULT_TONE: &str = "conservative";
const KNOWN_TONES: [&str; 2] = ["conservative", "assertive"];
pub const DEFAULT_SUBJECT: &str = "Funding options tailored for your business";
const PREVIEW_LIMIT: usize = 10;

/// Lower-case the requested tone, falling back to the default for unknown ones
fn resolve_tone(requested: Option<&str>) -> String {
    let tone = requested
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TONE.to_string());

    if KNOWN_TONES.contains(&tone.as_str()) {
        tone
    } else {
        incoming!(level = WARN, tone = %tone, "Unknown tone, defaulting to {DEFAULT_TONE}");
        DEFAULT_TONE.to_string()
    }
}

const fn default_dry_run() -> bool {
    true
}

fn parse_prepare_id(raw: &str) -> Result<PrepareId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("prepare_id not found".to_string()))
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("Job not found".to_string()))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
pub struct PrepareRecipient {
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub body_html: String,
}

#[derive(Debug, Deserialize)]
pub struct PrepareRequest {
    #[serde(default)]
    pub tone: Option<String>,
    pub recipients: Vec<PrepareRecipient>,
}

#[derive(Debug, Serialize)]
pub struct PrepareResponse {
    pub prepare_id: PrepareId,
    pub count: usize,
    pub tone: String,
    pub preview: Vec<PreviewItem>,
}

fn line_items(recipients: Vec<PrepareRecipient>) -> Result<Vec<NewLineItem>, ApiError> {
    recipients
        .into_iter()
        .enumerate()
        .map(|(index, recipient)| {
            if recipient.body_html.trim().is_empty() {
                return Err(ApiError::validation(format!(
                    "recipients[{index}].body_html must not be blank"
                )));
            }

            let subject = recipient
                .subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

            Ok(NewLineItem {
                recipient_email: recipient.email,
                rendered_subject: subject,
                rendered_body: recipient.body_html,
            })
        })
        .collect()
}

pub async fn prepare(
    State(state): State<AppState>,
    payload: Result<Json<PrepareRequest>, JsonRejection>,
) -> Result<Json<PrepareResponse>, ApiError> {
    let request = json_body(payload)?;
    let tone = resolve_tone(request.tone.as_deref());
    let items = line_items(request.recipients)?;
    let count = items.len();

    let prepare_id = state.queue.prepare(&tone, items)?;
    let preview = state.queries.preview(prepare_id, PREVIEW_LIMIT)?;

    Ok(Json(PrepareResponse {
        prepare_id,
        count,
        tone,
        preview,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub prepare_id: String,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub job_id: JobId,
    pub prepare_id: PrepareId,
    pub status: JobStatus,
    pub queued: bool,
    pub created: bool,
    pub dry_run: bool,
}

impl SendResponse {
    fn new(prepare_id: PrepareId, dry_run: bool, creation: JobCreation) -> Self {
        Self {
            job_id: creation.job_id,
            prepare_id,
            status: creation.status,
            queued: creation.status == JobStatus::Queued,
            created: creation.created,
            dry_run,
        }
    }
}

pub async fn send(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let request = json_body(payload)?;
    let prepare_id = parse_prepare_id(&request.prepare_id)?;

    let creation = state.queue.submit(prepare_id, request.dry_run)?;
    Ok(Json(SendResponse::new(prepare_id, request.dry_run, creation)))
}

/// A single address or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    fn into_vec(self) -> Vec<String> {
        let all = match self {
            Self::One(email) => vec![email],
            Self::Many(emails) => emails,
        };
        all.into_iter().filter(|e| !e.trim().is_empty()).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectSendRequest {
    pub to_email: Recipients,
    #[serde(default)]
    pub subject: Option<String>,
    pub body_html: String,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyPayload {
    /// The whole request as JSON, for clients that cannot send a body
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DirectSendResponse {
    #[serde(flatten)]
    pub job: SendResponse,
    pub count: usize,
}

/// Prepare and submit in one call.
///
/// The request is read from the JSON body, or from a `payload` query
/// parameter holding the same JSON when the body is empty.
pub async fn direct_send(
    State(state): State<AppState>,
    Query(legacy): Query<LegacyPayload>,
    body: Bytes,
) -> Result<Json<DirectSendResponse>, ApiError> {
    let raw: &[u8] = if body.is_empty() {
        legacy
            .payload
            .as_deref()
            .map(str::as_bytes)
            .ok_or_else(|| ApiError::validation("Missing request body"))?
    } else {
        &body
    };

    let request: DirectSendRequest = serde_json::from_slice(raw)
        .map_err(|e| ApiError::validation(format!("Invalid JSON payload: {e}")))?;

    if request.body_html.trim().is_empty() {
        return Err(ApiError::validation("body_html must not be blank"));
    }

    let recipients = request.to_email.into_vec();
    if recipients.is_empty() {
        return Err(ApiError::validation("to_email must name at least one recipient"));
    }

    let tone = resolve_tone(request.tone.as_deref());
    let subject = request
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    let items: Vec<_> = recipients
        .into_iter()
        .map(|email| NewLineItem {
            recipient_email: email,
            rendered_subject: subject.clone(),
            rendered_body: request.body_html.clone(),
        })
        .collect();
    let count = items.len();

    let prepare_id = state.queue.prepare(&tone, items)?;
    let creation = state.queue.submit(prepare_id, request.dry_run)?;

    Ok(Json(DirectSendResponse {
        job: SendResponse::new(prepare_id, request.dry_run, creation),
        count,
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JobStatusView>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let visibility = if is_admin(&state, &headers) {
        Visibility::Unmasked
    } else {
        Visibility::Masked
    };

    Ok(Json(state.queries.job_status(job_id, visibility)?))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(state.queries.list_jobs())
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let status = state.queue.cancel(job_id)?;
    Ok(Json(CancelResponse { job_id, status }))
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub email: String,
    pub suppressed: bool,
    /// False when the address was already on the list
    pub newly_added: bool,
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    query: Result<Query<UnsubscribeQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    let email = outreach_common::normalize_email(&query.email)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let newly_added = state.suppression.add(&email).await?;

    Ok(Json(UnsubscribeResponse {
        email,
        suppressed: true,
        newly_added,
    }))
}
