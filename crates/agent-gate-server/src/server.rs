// crates/agent-gate-server/src/server.rs
// ============================================================================
// Module: Gate Server
// Description: HTTP surface, shared state, and the admission pipeline.
// Purpose: Compose policy components behind deny-by-default routing.
// Dependencies: agent-gate-config, agent-gate-core, axum, tokio
// ============================================================================

//! ## Overview
//! The server wires the policy components together: one admission
//! middleware (authenticate → rate limit → bind principal) wraps every
//! `/v1/*` route except token minting, handlers translate policy outcomes
//! into a stable error envelope, and unknown routes fall back to
//! deny-by-default. All inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_gate_config::DataPaths;
use agent_gate_config::GateConfig;
use agent_gate_core::EventGates;
use agent_gate_core::SendUpdatesMode;
use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_stream::StreamExt;

use crate::audit::AuditEntry;
use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::auth::Authenticator;
use crate::provider::CommandProvider;
use crate::provider::Provider;
use crate::quota::QuotaCounter;
use crate::quota::QuotaDecision;
use crate::quota::QuotaReason;
use crate::ratelimit::MinuteRateLimiter;
use crate::replay::ReplayStore;
use crate::routes;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable API error envelope. Every variant maps to one status and one
/// error token; nothing else ever reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// Authentication failed.
    Unauthorized,
    /// Per-principal minute budget exhausted.
    RateLimited,
    /// Body was not valid JSON.
    InvalidJson,
    /// Required body fields missing or empty.
    MissingFields,
    /// Declared or actual body size exceeds the payload limit.
    PayloadTooLarge,
    /// New-send route is disabled by reply-only posture.
    ReplyOnlyMode,
    /// Recipient failed the allowlist.
    RecipientNotAllowed,
    /// Calendar write surface is disabled.
    CalendarWriteDisabled,
    /// Calendar id is not writable.
    CalendarNotAllowed,
    /// Quota window exhausted.
    Quota(QuotaReason),
    /// Upstream or internal failure; details stay in the audit log.
    Upstream,
}

impl ApiError {
    /// HTTP status for the error.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited | Self::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidJson | Self::MissingFields => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ReplyOnlyMode
            | Self::RecipientNotAllowed
            | Self::CalendarWriteDisabled
            | Self::CalendarNotAllowed => StatusCode::FORBIDDEN,
            Self::Upstream => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable wire token for the error.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::InvalidJson => "invalid_json",
            Self::MissingFields => "missing_fields",
            Self::PayloadTooLarge => "payload_too_large",
            Self::ReplyOnlyMode => "reply_only_mode",
            Self::RecipientNotAllowed => "recipient_not_allowed",
            Self::CalendarWriteDisabled => "calendar_write_disabled",
            Self::CalendarNotAllowed => "calendar_not_allowed",
            Self::Quota(reason) => reason.as_str(),
            Self::Upstream => "upstream_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({"error": self.token()}))).into_response()
    }
}

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Data directory bootstrap failures.
    #[error("init error: {0}")]
    Init(String),
    /// Bind or serve failures.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Principal bound into request extensions by the admission middleware.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

/// Shared state behind every handler.
pub struct AppState {
    /// Immutable policy configuration.
    pub config: GateConfig,
    /// Caller authenticator.
    pub auth: Authenticator,
    /// Per-principal minute limiter.
    pub rate: MinuteRateLimiter,
    /// Outbound send quota.
    pub send_quota: Arc<QuotaCounter>,
    /// Calendar mutation quota.
    pub calendar_quota: Arc<QuotaCounter>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Upstream provider adapter.
    pub provider: Arc<dyn Provider>,
}

impl AppState {
    /// Builds state with injected provider and audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when persistent stores cannot be opened.
    pub fn new(
        config: GateConfig,
        paths: &DataPaths,
        provider: Arc<dyn Provider>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Arc<Self>, ServerError> {
        let replay = Arc::new(
            ReplayStore::open(&paths.replay_dir).map_err(|err| ServerError::Init(err.to_string()))?,
        );
        let auth = Authenticator::new(
            config.auth.api_key.clone(),
            config.auth.token_signing_key.clone(),
            config.auth.previous_token_signing_key.clone(),
            replay,
        );
        let rate = MinuteRateLimiter::new(config.server.requests_per_minute);
        let send_quota = Arc::new(QuotaCounter::new(
            paths.send_counters.clone(),
            config.outbound.max_emails_per_hour,
            config.outbound.max_emails_per_day,
        ));
        let calendar_quota = Arc::new(QuotaCounter::new(
            paths.calendar_counters.clone(),
            config.calendar_write.max_events_per_hour,
            config.calendar_write.max_events_per_day,
        ));
        emit_permissive_warnings(&config);
        Ok(Arc::new(Self {
            config,
            auth,
            rate,
            send_quota,
            calendar_quota,
            audit,
            provider,
        }))
    }

    /// Builds state for production serving: directory bootstrap, file
    /// audit sink, and the configured provider command.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when bootstrap fails.
    pub fn from_config(config: GateConfig, paths: &DataPaths) -> Result<Arc<Self>, ServerError> {
        ensure_layout(paths)?;
        let audit = Arc::new(
            FileAuditSink::new(&paths.audit_log)
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?,
        );
        let provider = Arc::new(CommandProvider::new(
            config.provider.command.clone(),
            Duration::from_millis(config.provider.timeout_ms),
        ));
        Self::new(config, paths, provider, audit)
    }

    /// Field-exposure gates from the calendar read policy.
    #[must_use]
    pub const fn event_gates(&self) -> EventGates {
        EventGates {
            attendees: self.config.calendar_read.allow_attendee_emails,
            location: self.config.calendar_read.allow_location,
            meeting_urls: self.config.calendar_read.allow_meeting_urls,
        }
    }

    /// Audits a policy denial and returns the error for the response.
    #[must_use]
    pub fn deny(&self, principal: &str, path: &'static str, error: ApiError) -> ApiError {
        self.audit.record(
            &AuditEntry::new("policy_deny", principal)
                .with("path", path)
                .with("reason", error.token()),
        );
        error
    }

    /// Audits an upstream failure and returns the contained error.
    #[must_use]
    pub fn upstream(&self, principal: &str, path: &'static str, code: &str) -> ApiError {
        self.audit.record(
            &AuditEntry::new("request_error", principal).with("path", path).with("code", code),
        );
        ApiError::Upstream
    }

    /// Consumes one unit from a quota counter on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the denial for exhausted windows, or a contained upstream
    /// error when the counter state is unusable.
    pub async fn consume_quota(
        &self,
        counter: &Arc<QuotaCounter>,
        principal: &str,
        path: &'static str,
    ) -> Result<(), ApiError> {
        let counter = Arc::clone(counter);
        let outcome =
            tokio::task::spawn_blocking(move || counter.consume(OffsetDateTime::now_utc()))
                .await
                .map_err(|_| self.upstream(principal, path, "quota_task_failed"))?;
        match outcome {
            Ok(QuotaDecision::Ok) => Ok(()),
            Ok(QuotaDecision::Denied(reason)) => {
                Err(self.deny(principal, path, ApiError::Quota(reason)))
            }
            Err(err) => Err(self.upstream(principal, path, err.code())),
        }
    }
}

/// Creates the data directory tree with restrictive permissions.
fn ensure_layout(paths: &DataPaths) -> Result<(), ServerError> {
    let dirs = [
        paths.config.parent(),
        paths.audit_log.parent(),
        Some(paths.replay_dir.as_path()),
        paths.send_counters.parent(),
        paths.calendar_counters.parent(),
    ];
    for dir in dirs.into_iter().flatten() {
        create_private_dir(dir).map_err(|err| {
            ServerError::Init(format!("create {} failed: {err}", dir.display()))
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(0o700);
    builder.create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// Warns when the configuration weakens the default security posture.
fn emit_permissive_warnings(config: &GateConfig) {
    if config.outbound.allow_all_recipients {
        tracing::warn!("outbound.allowAllRecipients is enabled; recipient checks are off");
    }
    if config.calendar_write.enabled && config.calendar_write.send_updates == SendUpdatesMode::All {
        tracing::warn!("calendarWrite.sendUpdates=all will notify every attendee on mutations");
    }
}

// ============================================================================
// SECTION: Admission Middleware
// ============================================================================

/// Admission pipeline: authenticate, rate limit, bind principal.
pub async fn admission(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let now = OffsetDateTime::now_utc();
    let principal = match state.auth.authenticate(request.headers(), now.unix_timestamp()) {
        Ok(principal) => principal,
        Err(err) => {
            state.audit.record(
                &AuditEntry::new("auth_deny", "unknown")
                    .with("path", path)
                    .with("reason", err.to_string()),
            );
            return ApiError::Unauthorized.into_response();
        }
    };
    if !state.rate.check_and_increment(&principal, now) {
        state.audit.record(
            &AuditEntry::new("policy_deny", &principal)
                .with("path", path)
                .with("reason", ApiError::RateLimited.token()),
        );
        return ApiError::RateLimited.into_response();
    }
    request.extensions_mut().insert(Principal(principal));
    next.run(request).await
}

// ============================================================================
// SECTION: Body Reading
// ============================================================================

/// Reads and parses a JSON request body under the payload limit.
///
/// Rejects early on a declared content length over the limit, then
/// streams chunks and aborts as soon as the accumulated size would exceed
/// it. Malformed JSON is a client fault, never a 500.
///
/// # Errors
///
/// Returns [`ApiError::PayloadTooLarge`] or [`ApiError::InvalidJson`].
pub async fn read_json_body(state: &AppState, request: Request) -> Result<Value, ApiError> {
    let limit = state.config.server.max_payload_bytes;
    let (parts, body) = request.into_parts();
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if let Some(declared) = declared
        && declared > limit
    {
        return Err(ApiError::PayloadTooLarge);
    }

    let mut stream = body.into_data_stream();
    let mut buffer: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| ApiError::InvalidJson)?;
        if buffer.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }
    serde_json::from_slice(&buffer).map_err(|_| ApiError::InvalidJson)
}

// ============================================================================
// SECTION: Router & Serve
// ============================================================================

/// Builds the full route table around the admission middleware.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let admitted = Router::new()
        .route("/v1/email/unread", get(routes::email_unread))
        .route(
            "/v1/calendar/events",
            get(routes::calendar_events).post(routes::calendar_create),
        )
        .route("/v1/calendar/events/{id}", patch(routes::calendar_update))
        .route("/v1/email/reply", post(routes::email_reply))
        .route("/v1/email/send", post(routes::email_send))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), admission));
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/v1/auth/token", post(routes::mint_token))
        .merge(admitted)
        .fallback(routes::deny_by_default)
        .with_state(state)
}

/// Binds the configured address and serves until shutdown.
///
/// # Errors
///
/// Returns [`ServerError`] when the listener cannot bind or serving fails.
pub async fn serve(config: GateConfig, paths: &DataPaths) -> Result<(), ServerError> {
    let state = AppState::from_config(config, paths)?;
    let addr = format!("{}:{}", state.config.server.bind_host(), state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))?;
    tracing::info!(%addr, "agent-gate listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|err| ServerError::Transport(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::ApiError;
    use crate::quota::QuotaReason;

    #[test]
    fn error_envelope_is_stable() {
        let table = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED, "unauthorized"),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            (ApiError::InvalidJson, StatusCode::BAD_REQUEST, "invalid_json"),
            (ApiError::MissingFields, StatusCode::BAD_REQUEST, "missing_fields"),
            (ApiError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            (ApiError::ReplyOnlyMode, StatusCode::FORBIDDEN, "reply_only_mode"),
            (ApiError::RecipientNotAllowed, StatusCode::FORBIDDEN, "recipient_not_allowed"),
            (ApiError::CalendarWriteDisabled, StatusCode::FORBIDDEN, "calendar_write_disabled"),
            (ApiError::CalendarNotAllowed, StatusCode::FORBIDDEN, "calendar_not_allowed"),
            (
                ApiError::Quota(QuotaReason::HourLimitExceeded),
                StatusCode::TOO_MANY_REQUESTS,
                "hour_limit_exceeded",
            ),
            (
                ApiError::Quota(QuotaReason::DayLimitExceeded),
                StatusCode::TOO_MANY_REQUESTS,
                "day_limit_exceeded",
            ),
            (ApiError::Upstream, StatusCode::BAD_GATEWAY, "upstream_failure"),
        ];
        for (error, status, token) in table {
            assert_eq!(error.status(), status);
            assert_eq!(error.token(), token);
        }
    }
}
