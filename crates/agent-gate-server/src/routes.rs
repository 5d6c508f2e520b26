// crates/agent-gate-server/src/routes.rs
// ============================================================================
// Module: Route Handlers
// Description: Token minting, email read/write, and calendar handlers.
// Purpose: Translate admitted requests into policy-checked provider calls.
// Dependencies: agent-gate-core, axum, serde_json
// ============================================================================

//! ## Overview
//! Handlers run after admission (except token minting and liveness, which
//! carry their own checks). Each one clamps inputs, applies the relevant
//! policy gates, consumes quota where a side-effect follows, invokes the
//! provider, and audits the outcome. Provider failures are contained to a
//! uniform upstream error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use agent_gate_core::AuthHandlingMode;
use agent_gate_core::CalendarEvent;
use agent_gate_core::ContextMode;
use agent_gate_core::EmailItem;
use agent_gate_core::EmailWarning;
use agent_gate_core::Sensitivity;
use agent_gate_core::clamp_calendar_range;
use agent_gate_core::clamp_email_days;
use agent_gate_core::classify_sensitivity;
use agent_gate_core::recipient_allowed;
use agent_gate_core::resolve_read_calendars;
use agent_gate_core::strip_quoted_context;
use agent_gate_core::write_calendar_allowed;
use axum::Extension;
use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::audit::AuditEntry;
use crate::provider::CalendarCreateCall;
use crate::provider::CalendarUpdateCall;
use crate::provider::EmailReplyCall;
use crate::provider::EmailSendCall;
use crate::server::ApiError;
use crate::server::AppState;
use crate::server::Principal;
use crate::server::read_json_body;
use crate::token;

// ============================================================================
// SECTION: Liveness & Fallback
// ============================================================================

/// Liveness probe.
pub async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}

/// Deny-by-default fallback for unknown routes.
pub async fn deny_by_default() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "deny-by-default"}))).into_response()
}

// ============================================================================
// SECTION: Token Minting
// ============================================================================

/// Mints a bearer token. API-key callers only.
pub async fn mint_token(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/auth/token";
    if state.auth.check_api_key(request.headers()) != Some(true) {
        state.audit.record(
            &AuditEntry::new("auth_deny", "unknown")
                .with("path", PATH)
                .with("reason", "api_key_required"),
        );
        return Err(ApiError::Unauthorized);
    }
    let body = read_json_body(&state, request).await?;
    let sub = body
        .get("sub")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingFields)?;
    let ttl = state.config.auth.token_ttl_seconds;
    let minted = token::issue(
        sub,
        ttl,
        &state.config.auth.token_signing_key,
        OffsetDateTime::now_utc().unix_timestamp(),
    );
    state.audit.record(&AuditEntry::new("token_issued", "api-key").with("sub", sub));
    Ok(Json(json!({"token": minted, "ttlSeconds": ttl})))
}

// ============================================================================
// SECTION: Email Read
// ============================================================================

/// Lists unread email within the clamped window.
pub async fn email_unread(
    State(state): State<Arc<AppState>>,
    Extension(Principal(principal)): Extension<Principal>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/email/unread";
    let policy = &state.config.email;
    let days = clamp_email_days(params.get("days").map(String::as_str), policy.max_recent_days);
    let context_mode = params
        .get("contextMode")
        .and_then(|value| ContextMode::parse(value))
        .unwrap_or(policy.thread_context_mode);

    let raw = state
        .provider
        .unread_messages(&state.config.gmail_account, days)
        .await
        .map_err(|err| state.upstream(&principal, PATH, &err.code()))?;

    let mut items = Vec::new();
    let mut warnings = Vec::new();
    let mut blocked = 0_usize;
    for value in &raw {
        let Some(mut item) = normalize_email(value) else {
            continue;
        };
        if context_mode == ContextMode::LatestOnly {
            item.snippet = strip_quoted_context(&item.snippet);
            item.body = strip_quoted_context(&item.body);
        }
        item.sensitivity = classify_sensitivity(&item.subject, &item.snippet, &item.body);
        if item.sensitivity == Sensitivity::AuthSensitive {
            match policy.auth_handling_mode {
                AuthHandlingMode::Block => {
                    blocked += 1;
                    continue;
                }
                AuthHandlingMode::Warn => {
                    warnings.push(EmailWarning::for_item(&item));
                }
            }
        }
        items.push(item);
    }

    let flagged = blocked + warnings.len();
    state.audit.record(
        &AuditEntry::new("email_unread", &principal)
            .with("days", days)
            .with("contextMode", serde_json::to_value(context_mode).unwrap_or(Value::Null))
            .with(
                "authHandlingMode",
                serde_json::to_value(policy.auth_handling_mode).unwrap_or(Value::Null),
            )
            .with("blockedCount", flagged)
            .with("count", items.len()),
    );

    let mut response = json!({
        "days": days,
        "contextMode": context_mode,
        "count": items.len(),
        "items": items,
    });
    if policy.auth_handling_mode == AuthHandlingMode::Warn {
        response["warnings"] = serde_json::to_value(&warnings).unwrap_or(Value::Null);
    }
    Ok(Json(response))
}

/// Normalizes one provider message into an [`EmailItem`].
fn normalize_email(value: &Value) -> Option<EmailItem> {
    let object = value.as_object()?;
    let id = object.get("id")?.as_str()?.to_string();
    let field = |name: &str| -> String {
        object.get(name).and_then(Value::as_str).unwrap_or_default().to_string()
    };
    Some(EmailItem {
        id,
        thread_id: field("threadId"),
        from: field("from"),
        to: field("to"),
        subject: field("subject"),
        snippet: field("snippet"),
        body: field("body"),
        internal_date: object.get("internalDate").and_then(Value::as_i64),
        sensitivity: Sensitivity::Normal,
    })
}

// ============================================================================
// SECTION: Calendar Read
// ============================================================================

/// Lists events across the resolved calendars within the clamped range.
pub async fn calendar_events(
    State(state): State<Arc<AppState>>,
    Extension(Principal(principal)): Extension<Principal>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/calendar/events";
    let policy = &state.config.calendar_read;
    let range = clamp_calendar_range(
        OffsetDateTime::now_utc(),
        policy.max_past_days,
        policy.max_future_days,
        policy.default_this_week,
        params.get("start").map(String::as_str),
        params.get("end").map(String::as_str),
    );
    let calendars =
        resolve_read_calendars(params.get("calendars").map(String::as_str), &state.config.calendars);
    let start = rfc3339(range.start);
    let end = rfc3339(range.end);

    let mut fetches = Vec::with_capacity(calendars.len());
    for calendar_id in &calendars {
        let provider = Arc::clone(&state.provider);
        let calendar_id = calendar_id.clone();
        let start = start.clone();
        let end = end.clone();
        fetches.push(tokio::spawn(async move {
            provider.calendar_events(&calendar_id, &start, &end).await
        }));
    }
    let mut raw = Vec::new();
    for fetch in fetches {
        let events = fetch
            .await
            .map_err(|_| state.upstream(&principal, PATH, "provider_task_failed"))?
            .map_err(|err| state.upstream(&principal, PATH, &err.code()))?;
        raw.extend(events);
    }

    let gates = state.event_gates();
    let items: Vec<CalendarEvent> =
        raw.iter().filter_map(|event| CalendarEvent::project(event, gates)).collect();

    state.audit.record(
        &AuditEntry::new("calendar_events", &principal)
            .with("start", start.clone())
            .with("end", end.clone())
            .with("calendars", serde_json::to_value(&calendars).unwrap_or(Value::Null))
            .with("count", items.len())
            .with("allowAttendees", gates.attendees)
            .with("allowLocation", gates.location)
            .with("allowMeetingUrls", gates.meeting_urls),
    );

    Ok(Json(json!({
        "start": start,
        "end": end,
        "calendars": calendars,
        "count": items.len(),
        "items": items,
    })))
}

fn rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

// ============================================================================
// SECTION: Calendar Write
// ============================================================================

/// Calendar event creation body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventBody {
    calendar_id: Option<String>,
    summary: Option<String>,
    start: Option<String>,
    end: Option<String>,
    description: Option<String>,
    location: Option<String>,
    attendees: Option<Vec<Value>>,
}

/// Creates a calendar event.
pub async fn calendar_create(
    State(state): State<Arc<AppState>>,
    Extension(Principal(principal)): Extension<Principal>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/calendar/events";
    let policy = &state.config.calendar_write;
    if !policy.enabled {
        return Err(state.deny(&principal, PATH, ApiError::CalendarWriteDisabled));
    }
    let body = read_json_body(&state, request).await?;
    let body: CreateEventBody =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;
    let calendar_id = required(body.calendar_id)?;
    let summary = required(body.summary)?;
    let start = required(body.start)?;
    let end = required(body.end)?;
    if !write_calendar_allowed(&calendar_id, &policy.allowed_calendar_ids, &state.config.calendars)
    {
        return Err(state.deny(&principal, PATH, ApiError::CalendarNotAllowed));
    }
    let attendees = if policy.allow_attendees { body.attendees } else { None };

    state.consume_quota(&state.calendar_quota, &principal, PATH).await?;

    let call = CalendarCreateCall {
        calendar_id: calendar_id.clone(),
        summary,
        start,
        end,
        description: body.description,
        location: body.location,
        attendees,
        send_updates: policy.send_updates.as_str().to_string(),
    };
    let id = state
        .provider
        .create_event(call)
        .await
        .map_err(|err| state.upstream(&principal, PATH, &err.code()))?;

    state.audit.record(
        &AuditEntry::new("calendar_create", &principal)
            .with("calendarId", calendar_id)
            .with("id", id.clone()),
    );
    Ok(Json(json!({"id": id})))
}

/// Calendar event update body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEventBody {
    calendar_id: Option<String>,
    summary: Option<String>,
    start: Option<String>,
    end: Option<String>,
    description: Option<String>,
    location: Option<String>,
    add_attendees: Option<Vec<Value>>,
}

/// Updates a calendar event.
pub async fn calendar_update(
    State(state): State<Arc<AppState>>,
    Extension(Principal(principal)): Extension<Principal>,
    Path(event_id): Path<String>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/calendar/events/{id}";
    let policy = &state.config.calendar_write;
    if !policy.enabled {
        return Err(state.deny(&principal, PATH, ApiError::CalendarWriteDisabled));
    }
    let body = read_json_body(&state, request).await?;
    let body: UpdateEventBody =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;
    let calendar_id = required(body.calendar_id)?;
    if !write_calendar_allowed(&calendar_id, &policy.allowed_calendar_ids, &state.config.calendars)
    {
        return Err(state.deny(&principal, PATH, ApiError::CalendarNotAllowed));
    }
    let add_attendees = if policy.allow_attendees { body.add_attendees } else { None };

    state.consume_quota(&state.calendar_quota, &principal, PATH).await?;

    let call = CalendarUpdateCall {
        calendar_id: calendar_id.clone(),
        event_id: event_id.clone(),
        summary: body.summary,
        start: body.start,
        end: body.end,
        description: body.description,
        location: body.location,
        add_attendees,
        send_updates: policy.send_updates.as_str().to_string(),
    };
    let id = state
        .provider
        .update_event(call)
        .await
        .map_err(|err| state.upstream(&principal, PATH, &err.code()))?;

    state.audit.record(
        &AuditEntry::new("calendar_update", &principal)
            .with("calendarId", calendar_id)
            .with("eventId", event_id)
            .with("id", id.clone()),
    );
    Ok(Json(json!({"id": id})))
}

// ============================================================================
// SECTION: Outbound Email
// ============================================================================

/// In-thread reply body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody {
    thread_id: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

/// Sends an in-thread reply.
pub async fn email_reply(
    State(state): State<Arc<AppState>>,
    Extension(Principal(principal)): Extension<Principal>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/email/reply";
    let body = read_json_body(&state, request).await?;
    let body: ReplyBody = serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;
    let thread_id = required(body.thread_id)?;
    let to = required(body.to)?;
    let subject = required(body.subject)?;
    let text = required(body.body)?;

    let policy = &state.config.outbound;
    if !policy.allow_reply_to_anyone
        && !recipient_allowed(
            &to,
            policy.allow_all_recipients,
            &policy.recipient_allowlist,
            &policy.domain_allowlist,
        )
    {
        return Err(state.deny(&principal, PATH, ApiError::RecipientNotAllowed));
    }

    state.consume_quota(&state.send_quota, &principal, PATH).await?;

    let call = EmailReplyCall {
        account: state.config.gmail_account.clone(),
        thread_id: thread_id.clone(),
        to: to.clone(),
        subject,
        body: text,
    };
    let id = state
        .provider
        .reply_email(call)
        .await
        .map_err(|err| state.upstream(&principal, PATH, &err.code()))?;

    state.audit.record(
        &AuditEntry::new("email_reply", &principal)
            .with("to", to)
            .with("threadId", thread_id)
            .with("id", id.clone()),
    );
    Ok(Json(json!({"id": id})))
}

/// New outbound message body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

/// Sends a new message. Blocked outright under reply-only posture.
pub async fn email_send(
    State(state): State<Arc<AppState>>,
    Extension(Principal(principal)): Extension<Principal>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    const PATH: &str = "/v1/email/send";
    let policy = &state.config.outbound;
    if policy.reply_only_default {
        return Err(state.deny(&principal, PATH, ApiError::ReplyOnlyMode));
    }
    let body = read_json_body(&state, request).await?;
    let body: SendBody = serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;
    let to = required(body.to)?;
    let subject = required(body.subject)?;
    let text = required(body.body)?;

    if !recipient_allowed(
        &to,
        policy.allow_all_recipients,
        &policy.recipient_allowlist,
        &policy.domain_allowlist,
    ) {
        return Err(state.deny(&principal, PATH, ApiError::RecipientNotAllowed));
    }

    state.consume_quota(&state.send_quota, &principal, PATH).await?;

    let call = EmailSendCall {
        account: state.config.gmail_account.clone(),
        to: to.clone(),
        subject,
        body: text,
    };
    let id = state
        .provider
        .send_email(call)
        .await
        .map_err(|err| state.upstream(&principal, PATH, &err.code()))?;

    state
        .audit
        .record(&AuditEntry::new("email_send", &principal).with("to", to).with("id", id.clone()));
    Ok(Json(json!({"id": id})))
}

/// Requires a non-empty body field.
fn required(field: Option<String>) -> Result<String, ApiError> {
    field.map(|value| value.trim().to_string()).filter(|value| !value.is_empty()).ok_or(ApiError::MissingFields)
}
