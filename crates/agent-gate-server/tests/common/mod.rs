// crates/agent-gate-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Harness
// Description: Shared fixtures for agent-gate-server integration tests.
// Purpose: Spawn real HTTP servers with stubbed providers and audit sinks.
// Dependencies: agent-gate-server, reqwest, tempfile
// ============================================================================

//! Shared integration-test harness.

#![allow(dead_code, reason = "each test binary uses a subset of the harness")]

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use agent_gate_config::DataPaths;
use agent_gate_config::GateConfig;
use agent_gate_server::AppState;
use agent_gate_server::AuditEntry;
use agent_gate_server::AuditSink;
use agent_gate_server::Provider;
use agent_gate_server::ProviderError;
use agent_gate_server::build_router;
use agent_gate_server::provider::CalendarCreateCall;
use agent_gate_server::provider::CalendarUpdateCall;
use agent_gate_server::provider::EmailReplyCall;
use agent_gate_server::provider::EmailSendCall;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

/// API key used across the test configs.
pub const API_KEY: &str = "k123";

// ============================================================================
// SECTION: Recording Audit Sink
// ============================================================================

/// Audit sink that records entries for assertions.
#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    /// Returns a snapshot of the recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit lock").clone()
    }

    /// Returns the recorded action labels in order.
    pub fn actions(&self) -> Vec<&'static str> {
        self.entries().iter().map(|entry| entry.action).collect()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, entry: &AuditEntry) {
        self.entries.lock().expect("audit lock").push(entry.clone());
    }
}

// ============================================================================
// SECTION: Stub Provider
// ============================================================================

/// Provider stub with canned responses and failure injection.
#[derive(Default)]
pub struct StubProvider {
    messages: Mutex<Vec<Value>>,
    events: Mutex<Vec<Value>>,
    fail: AtomicBool,
    sequence: AtomicU64,
    /// Recorded read calls: (calendar id, start, end).
    pub read_calls: Mutex<Vec<(String, String, String)>>,
    /// Recorded write calls: (kind, payload).
    pub write_calls: Mutex<Vec<(String, Value)>>,
}

impl StubProvider {
    /// Sets the unread messages returned by the stub.
    pub fn set_messages(&self, messages: Vec<Value>) {
        *self.messages.lock().expect("messages lock") = messages;
    }

    /// Sets the events returned for every calendar.
    pub fn set_events(&self, events: Vec<Value>) {
        *self.events.lock().expect("events lock") = events;
    }

    /// Makes every subsequent provider call fail.
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Exit(Some(1)));
        }
        Ok(())
    }

    fn next_id(&self, kind: &str) -> String {
        format!("{kind}-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record_write(&self, kind: &str, payload: Value) {
        self.write_calls.lock().expect("write lock").push((kind.to_string(), payload));
    }
}

#[async_trait]
impl Provider for StubProvider {
    async fn unread_messages(
        &self,
        _account: &str,
        _days: u32,
    ) -> Result<Vec<Value>, ProviderError> {
        self.check()?;
        Ok(self.messages.lock().expect("messages lock").clone())
    }

    async fn calendar_events(
        &self,
        calendar_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        self.check()?;
        self.read_calls.lock().expect("read lock").push((
            calendar_id.to_string(),
            start.to_string(),
            end.to_string(),
        ));
        Ok(self.events.lock().expect("events lock").clone())
    }

    async fn create_event(&self, call: CalendarCreateCall) -> Result<String, ProviderError> {
        self.check()?;
        self.record_write("create", serde_json::to_value(&call).expect("payload"));
        Ok(self.next_id("event"))
    }

    async fn update_event(&self, call: CalendarUpdateCall) -> Result<String, ProviderError> {
        self.check()?;
        self.record_write("update", serde_json::to_value(&call).expect("payload"));
        Ok(self.next_id("event"))
    }

    async fn reply_email(&self, call: EmailReplyCall) -> Result<String, ProviderError> {
        self.check()?;
        self.record_write("reply", serde_json::to_value(&call).expect("payload"));
        Ok(self.next_id("msg"))
    }

    async fn send_email(&self, call: EmailSendCall) -> Result<String, ProviderError> {
        self.check()?;
        self.record_write("send", serde_json::to_value(&call).expect("payload"));
        Ok(self.next_id("msg"))
    }
}

// ============================================================================
// SECTION: Server Fixture
// ============================================================================

/// A running agent-gate server over stubbed collaborators.
pub struct TestServer {
    /// Base URL, `http://127.0.0.1:<port>`.
    pub base: String,
    /// Recorded audit entries.
    pub audit: Arc<RecordingAudit>,
    /// Stubbed provider.
    pub provider: Arc<StubProvider>,
    _dir: Option<TempDir>,
}

impl TestServer {
    /// Returns the full URL for a route path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

/// Baseline test configuration: strict posture, generous rate limit.
pub fn base_config() -> GateConfig {
    serde_json::from_value(json!({
        "server": {"maxPayloadBytes": 16384, "requestsPerMinute": 1000},
        "auth": {"apiKey": API_KEY, "tokenSigningKey": "signing-secret", "tokenTtlSeconds": 600},
        "gmailAccount": "user@example.com",
        "calendars": ["primary"],
    }))
    .expect("base config")
}

/// Test data layout rooted at `root`.
pub fn data_paths(root: &Path) -> DataPaths {
    DataPaths {
        config: root.join("config/wrapper-config.json"),
        audit_log: root.join("logs/audit.jsonl"),
        replay_dir: root.join("logs/token-replay"),
        send_counters: root.join("logs/send-counters.json"),
        calendar_counters: root.join("logs/calendar-counters.json"),
    }
}

/// Spawns a server on an ephemeral port with its own data directory.
pub async fn spawn_server(config: GateConfig) -> TestServer {
    let dir = TempDir::new().expect("tempdir");
    let mut server = spawn_server_at(config, dir.path()).await;
    server._dir = Some(dir);
    server
}

/// Spawns a server over an existing data directory (for restart tests).
pub async fn spawn_server_at(config: GateConfig, root: &Path) -> TestServer {
    let paths = data_paths(root);
    let audit = Arc::new(RecordingAudit::default());
    let provider = Arc::new(StubProvider::default());
    let state = AppState::new(
        config,
        &paths,
        Arc::clone(&provider) as Arc<dyn Provider>,
        Arc::clone(&audit) as Arc<dyn AuditSink>,
    )
    .expect("app state");
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    TestServer {
        base: format!("http://{addr}"),
        audit,
        provider,
        _dir: None,
    }
}

/// Mints a bearer token through the HTTP surface.
pub async fn mint_token(server: &TestServer, sub: &str) -> String {
    let response = reqwest::Client::new()
        .post(server.url("/v1/auth/token"))
        .header("x-api-key", API_KEY)
        .json(&json!({"sub": sub}))
        .send()
        .await
        .expect("mint request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("mint body");
    body["token"].as_str().expect("token").to_string()
}
