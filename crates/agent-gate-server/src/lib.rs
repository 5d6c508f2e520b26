// crates/agent-gate-server/src/lib.rs
// ============================================================================
// Module: Agent Gate Server
// Description: Admission pipeline, policy enforcement, and HTTP surface.
// Purpose: Mediate an agent's Gmail/Calendar access behind local policy.
// Dependencies: agent-gate-core, agent-gate-config, axum, tokio
// ============================================================================

//! ## Overview
//! agent-gate-server composes the security-policy engine: constant-time
//! caller authentication with one-time bearer tokens, a persistent replay
//! store, per-principal rate limiting, file-locked send and calendar
//! quotas, policy clamps and content filtering from `agent-gate-core`, a
//! defensive subprocess provider adapter, and an append-only audit trail —
//! all behind deny-by-default HTTP routing. The agent holds no provider
//! credentials; everything it can do passes through this crate's checks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod provider;
pub mod quota;
pub mod ratelimit;
pub mod replay;
pub mod routes;
pub mod server;
pub mod token;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEntry;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AuthError;
pub use auth::Authenticator;
pub use provider::CommandProvider;
pub use provider::Provider;
pub use provider::ProviderError;
pub use quota::QuotaCounter;
pub use quota::QuotaDecision;
pub use quota::QuotaError;
pub use quota::QuotaReason;
pub use ratelimit::MinuteRateLimiter;
pub use replay::ReplayStore;
pub use server::ApiError;
pub use server::AppState;
pub use server::Principal;
pub use server::ServerError;
pub use server::build_router;
pub use server::serve;
pub use token::AUDIENCE;
pub use token::Claims;
pub use token::TokenError;
