// SPDX-License-Identifier: Apache-2.0

//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gate_core::{ColumnInfo, ConnectionKind, EngineError, EngineResult, Row, StatementOutput, Value};
use parking_lot::Mutex;
use sqlgate::engine::{ExecutionPlan, SqlBackend};
use sqlgate::services::{ApiRequest, AuthAdmin, ManagementApi, SdkCall};
use sqlgate::Gateway;

const MIGRATIONS_RELATION: &str = "supabase_migrations.schema_migrations";

/// Backend that records every round trip instead of talking to a server.
///
/// Inserts into the migration history are remembered and served back to
/// listing queries, so recorder round trips can be checked end to end.
pub struct SpyBackend {
    kind: ConnectionKind,
    plans: Mutex<Vec<ExecutionPlan>>,
    canned: Mutex<Vec<(String, StatementOutput)>>,
    migrations: Mutex<Vec<(String, String, Vec<String>)>>,
    fail_at: Mutex<Option<usize>>,
    fail_recording: AtomicBool,
    delay: Mutex<Option<Duration>>,
    history_delay: Mutex<Option<Duration>>,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SpyBackend {
    pub fn new(kind: ConnectionKind) -> Self {
        Self {
            kind,
            plans: Mutex::new(Vec::new()),
            canned: Mutex::new(Vec::new()),
            migrations: Mutex::new(Vec::new()),
            fail_at: Mutex::new(None),
            fail_recording: AtomicBool::new(false),
            delay: Mutex::new(None),
            history_delay: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn direct() -> Arc<Self> {
        Arc::new(Self::new(ConnectionKind::Direct))
    }

    pub fn pooled() -> Arc<Self> {
        Arc::new(Self::new(ConnectionKind::PooledTransaction))
    }

    /// Fails the statement at `index` of the next caller plan.
    pub fn fail_at(&self, index: usize) {
        *self.fail_at.lock() = Some(index);
    }

    pub fn fail_recording(&self) {
        self.fail_recording.store(true, Ordering::SeqCst);
    }

    pub fn stall_for(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Slows down migration history writes and reads only.
    pub fn stall_history_for(&self, delay: Duration) {
        *self.history_delay.lock() = Some(delay);
    }

    /// Serves `output` for query statements containing `pattern`.
    pub fn respond(&self, pattern: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns = columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.to_string(),
                data_type: "text".to_string(),
            })
            .collect();
        let rows = rows.into_iter().map(|values| Row { values }).collect();
        self.canned
            .lock()
            .push((pattern.to_string(), StatementOutput::row_set(0, columns, rows, 0.0)));
    }

    pub fn plans(&self) -> Vec<ExecutionPlan> {
        self.plans.lock().clone()
    }

    /// Plans that carried caller SQL, i.e. everything except history writes
    /// and reads.
    pub fn caller_plans(&self) -> Vec<ExecutionPlan> {
        self.plans()
            .into_iter()
            .filter(|plan| !plan.statements.iter().any(|s| s.sql.contains("supabase_migrations")))
            .collect()
    }

    pub fn round_trips(&self) -> usize {
        self.plans.lock().len()
    }

    /// Recorded history rows: (version, name, statements).
    pub fn recorded_migrations(&self) -> Vec<(String, String, Vec<String>)> {
        self.migrations.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn canned_for(&self, sql: &str) -> Option<StatementOutput> {
        self.canned
            .lock()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
    }

    fn list_migrations(&self) -> StatementOutput {
        let columns = ["version", "name", "statements", "statement_count"]
            .iter()
            .map(|name| ColumnInfo {
                name: name.to_string(),
                data_type: "text".to_string(),
            })
            .collect();
        let rows = self
            .migrations
            .lock()
            .iter()
            .map(|(version, name, statements)| Row {
                values: vec![
                    Value::Text(version.clone()),
                    Value::Text(name.clone()),
                    Value::Array(statements.iter().cloned().map(Value::Text).collect()),
                    Value::Int(statements.len() as i64),
                ],
            })
            .collect();
        StatementOutput::row_set(0, columns, rows, 0.0)
    }

    fn remember_migration(&self, params: &[Value]) {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or_default().to_string();
        let statements = match params.get(2) {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        };
        self.migrations
            .lock()
            .push((text(params.first()), text(params.get(1)), statements));
    }
}

#[async_trait]
impl SqlBackend for SpyBackend {
    fn backend_id(&self) -> &'static str {
        "spy"
    }

    fn connection_kind(&self) -> ConnectionKind {
        self.kind
    }

    async fn run(&self, plan: &ExecutionPlan) -> EngineResult<Vec<StatementOutput>> {
        let _guard = InFlight::enter(&self.in_flight);
        self.plans.lock().push(plan.clone());

        let touches_history = plan.statements.iter().any(|s| s.sql.contains("supabase_migrations"));
        let delay = *self.delay.lock();
        let history_delay = if touches_history { *self.history_delay.lock() } else { None };
        for delay in [delay, history_delay].into_iter().flatten() {
            tokio::time::sleep(delay).await;
        }

        if touches_history && self.fail_recording.load(Ordering::SeqCst) {
            return Err(EngineError::BackendExecution {
                statement_index: Some(0),
                message: "permission denied for schema supabase_migrations".to_string(),
                code: Some("42501".to_string()),
                tier: plan.tier,
            });
        }
        if !touches_history {
            if let Some(index) = self.fail_at.lock().take() {
                return Err(EngineError::BackendExecution {
                    statement_index: Some(index),
                    message: "relation \"missing\" does not exist".to_string(),
                    code: Some("42P01".to_string()),
                    tier: plan.tier,
                });
            }
        }

        let mut outputs = Vec::with_capacity(plan.statements.len());
        for (index, statement) in plan.statements.iter().enumerate() {
            let mut output = if statement.sql.starts_with("INSERT INTO supabase_migrations") {
                self.remember_migration(&statement.params);
                StatementOutput::affected(index, 1, 0.1)
            } else if statement.sql.contains(MIGRATIONS_RELATION) && statement.returns_rows {
                self.list_migrations()
            } else if !statement.returns_rows {
                StatementOutput::affected(index, 1, 0.1)
            } else if let Some(canned) = self.canned_for(&statement.sql) {
                canned
            } else if statement.sql.trim_start().starts_with("SELECT 1") {
                StatementOutput::row_set(
                    index,
                    vec![ColumnInfo {
                        name: "?column?".to_string(),
                        data_type: "INT4".to_string(),
                    }],
                    vec![Row {
                        values: vec![Value::Int(1)],
                    }],
                    0.1,
                )
            } else {
                StatementOutput::row_set(index, Vec::new(), Vec::new(), 0.1)
            };
            output.statement_index = index;
            outputs.push(output);
        }
        Ok(outputs)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Management API double that echoes what it was sent.
#[derive(Default)]
pub struct RecordingApi {
    pub calls: Mutex<Vec<ApiRequest>>,
    fail_next: AtomicBool,
}

impl RecordingApi {
    /// The next request reaches the double but comes back as a failure.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ManagementApi for RecordingApi {
    async fn send(&self, request: &ApiRequest) -> EngineResult<serde_json::Value> {
        self.calls.lock().push(request.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::connection_failed("management API unreachable"));
        }
        Ok(serde_json::json!({ "method": request.method, "path": request.path }))
    }
}

/// Auth-admin double that echoes the method name.
#[derive(Default)]
pub struct RecordingAuthAdmin {
    pub calls: Mutex<Vec<SdkCall>>,
}

#[async_trait]
impl AuthAdmin for RecordingAuthAdmin {
    async fn call(&self, call: &SdkCall) -> EngineResult<serde_json::Value> {
        self.calls.lock().push(call.clone());
        Ok(serde_json::json!({ "method": call.method }))
    }
}

pub fn gateway_with(backend: Arc<SpyBackend>) -> Gateway {
    Gateway::with_backend(backend, Duration::from_secs(300))
}
