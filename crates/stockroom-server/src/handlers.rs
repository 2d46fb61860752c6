//! HTTP handlers for the assignment and audit endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dto::{AuditEventDto, events_etag, if_none_match_matches};
use crate::error::ApiError;
use crate::server::AppState;
use stockroom_core::{
    Assignment, AuditAction, AuditEvent, FieldChange, ResourceKind, ResourceRef, now_utc,
};

/// Actor identity for audit attribution, until the auth gateway in front of
/// this service injects one.
const ACTOR_HEADER: &str = "x-actor-id";

fn actor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": "Stockroom Server",
        "status": "ok",
        // Read caches embed this in their keys; it moves on every mutation
        "cacheVersion": state.stamp.current(),
    }))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn readyz() -> impl IntoResponse {
    Json(json!({"status": "ready"}))
}

// ==================== Assignments ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub user_id: String,
    pub resource_kind: String,
    pub resource_id: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignResponse {
    assignment_id: String,
}

pub async fn assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AssignRequest>,
) -> Result<Response, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("userId must not be empty"));
    }
    if req.resource_id.trim().is_empty() {
        return Err(ApiError::bad_request("resourceId must not be empty"));
    }
    let kind: ResourceKind = req
        .resource_kind
        .parse()
        .map_err(|e: stockroom_core::CoreError| ApiError::bad_request(e.to_string()))?;
    let resource = ResourceRef::new(kind, req.resource_id.clone());
    let actor = actor_id(&headers).unwrap_or_else(|| req.user_id.clone());

    let assignment = state
        .engine
        .assign(&resource, &req.user_id, &actor, req.comment)
        .await?;

    let location = format!("{}/assignments/{}", state.base_url, assignment.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(AssignResponse {
            assignment_id: assignment.id,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseParams {
    pub assignment_id: String,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReleaseParams>,
) -> Result<Response, ApiError> {
    if params.assignment_id.trim().is_empty() {
        return Err(ApiError::bad_request("assignmentId must not be empty"));
    }
    let actor = actor_id(&headers).unwrap_or_else(|| "system".to_string());

    state
        .engine
        .release(&params.assignment_id, &actor, params.comment)
        .await?;

    Ok((StatusCode::OK, Json(json!({"status": "released"}))).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentDto {
    id: String,
    resource_kind: String,
    resource_id: String,
    user_id: String,
    assigned_at_utc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unassigned_at_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

impl From<Assignment> for AssignmentDto {
    fn from(a: Assignment) -> Self {
        Self {
            id: a.id,
            resource_kind: a.resource.kind.to_string(),
            resource_id: a.resource.id,
            user_id: a.holder_id,
            assigned_at_utc: a.assigned_at.to_string(),
            unassigned_at_utc: a.unassigned_at.map(|t| t.to_string()),
            comment: a.comment,
        }
    }
}

pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.engine.assignment(&id).await? {
        Some(assignment) => Ok(Json(AssignmentDto::from(assignment)).into_response()),
        None => Err(ApiError::not_found(format!("assignment not found: {id}"))),
    }
}

// ==================== Audit ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditCreateRequest {
    pub external_id: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
    pub actor_id: String,
    pub resource_kind: String,
    pub resource_id: String,
    #[serde(default)]
    pub changes: Vec<ChangeDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeDto {
    pub field: String,
    #[serde(default)]
    pub old: Option<String>,
    #[serde(default)]
    pub new: Option<String>,
}

pub async fn audit_create(
    State(state): State<AppState>,
    Json(req): Json<AuditCreateRequest>,
) -> Result<Response, ApiError> {
    if req.external_id.trim().is_empty() {
        return Err(ApiError::bad_request("externalId must not be empty"));
    }
    if req.actor_id.trim().is_empty() {
        return Err(ApiError::bad_request("actorId must not be empty"));
    }
    let action: AuditAction = req
        .action
        .parse()
        .map_err(|e: stockroom_core::CoreError| ApiError::bad_request(e.to_string()))?;
    let kind: ResourceKind = req
        .resource_kind
        .parse()
        .map_err(|e: stockroom_core::CoreError| ApiError::bad_request(e.to_string()))?;
    if req.resource_id.trim().is_empty() {
        return Err(ApiError::bad_request("resourceId must not be empty"));
    }

    let mut builder = AuditEvent::builder(action, ResourceRef::new(kind, req.resource_id.clone()))
        .external_id(req.external_id.clone())
        .actor(req.actor_id.clone())
        .changes(
            req.changes
                .into_iter()
                .map(|c| FieldChange::new(c.field, c.old, c.new))
                .collect(),
        );
    if let Some(description) = req.description {
        builder = builder.description(description);
    }

    let stored = state.audit.record(builder.build()).await?;
    let actor_name = holder_name(&state, &stored.actor_id).await;
    let dto = AuditEventDto::from_event(&stored, actor_name.as_deref());

    let location = format!("{}/audit/events/{}", state.base_url, stored.external_id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(dto)).into_response())
}

pub async fn audit_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.audit.get(&id).await? {
        Some(event) => {
            let actor_name = holder_name(&state, &event.actor_id).await;
            Ok(Json(AuditEventDto::from_event(&event, actor_name.as_deref())).into_response())
        }
        None => Err(ApiError::not_found(format!("audit event not found: {id}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub take: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    items: Vec<AuditEventDto>,
    next_since: String,
}

/// Catch-up feed: events after `since`, newest first, with a weak ETag so an
/// unchanged feed costs a `304` instead of a page.
pub async fn audit_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EventsParams>,
) -> Result<Response, ApiError> {
    let client = headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous");
    state
        .limiter
        .check(client)
        .map_err(|retry_after| ApiError::too_many_requests(retry_after.as_secs().max(1)))?;

    // Missing or unparsable cursors fall back to the configured lookback
    let since = params
        .since
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| now_utc().minus_seconds(state.events.default_lookback.as_secs() as i64));

    let events = state.audit.events_since(since, params.take).await?;

    let etag = events_etag(
        events.first().map(|e| wire_id(e)),
        events.len(),
    );
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match_matches(if_none_match, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    // The cursor only ever advances: newest returned timestamp, or the
    // effective `since` when the page is empty
    let next_since = events
        .first()
        .map(|e| e.occurred_at)
        .unwrap_or(since)
        .to_string();

    let mut items = Vec::with_capacity(events.len());
    for event in &events {
        let actor_name = holder_name(&state, &event.actor_id).await;
        items.push(AuditEventDto::from_event(event, actor_name.as_deref()));
    }

    Ok((
        StatusCode::OK,
        [(header::ETAG, etag)],
        Json(EventsPage { items, next_since }),
    )
        .into_response())
}

fn wire_id(event: &AuditEvent) -> &str {
    if event.external_id.is_empty() {
        &event.id
    } else {
        &event.external_id
    }
}

/// Directory lookup for display names; failures degrade to the bare id.
pub(crate) async fn holder_name(state: &AppState, actor_id: &str) -> Option<String> {
    state
        .storage
        .get_holder(actor_id)
        .await
        .ok()
        .flatten()
        .map(|h| h.display_name)
}
