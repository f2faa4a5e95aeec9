// SPDX-License-Identifier: Apache-2.0

//! Query Engine
//!
//! Takes raw SQL from the caller through the whole gate:
//! 1. classify (fresh, never cached)
//! 2. reject explicit transaction control
//! 3. claim the database domain (a risky batch relocks it right away)
//! 4. park DESTRUCTIVE batches for confirmation
//! 5. plan the transaction and run it on one connection
//! 6. record the migration
//!
//! The request timeout and caller cancellation bound step 5 only. Once the
//! backend has committed, the outcome is reported as a success whatever
//! happens to the recording.

use std::sync::Arc;
use std::time::Duration;

use gate_core::{
    ConnectionKind, EngineError, EngineResult, RiskTier, SafetyDomain, SafetyMode, StatementCategory,
    StatementOutput, TransactionMode, Value,
};
use gate_sql::{classify, SqlCommand, StatementBatch, StatementParser};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::engine::traits::{ExecutionPlan, PlannedStatement, SqlBackend};
use crate::migrations::{MigrationQuery, MigrationRecord, MigrationRecorder};
use crate::safety::{ConfirmationGate, PendingConfirmation, PendingPayload, SafetyManager};

/// Per-statement assessment reported back with results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementReport {
    pub index: usize,
    pub command: SqlCommand,
    pub category: StatementCategory,
    pub tier: Option<RiskTier>,
}

/// Result of a batch that ran.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// Aggregate tier the batch was gated at
    pub tier: RiskTier,
    pub statements: Vec<StatementReport>,
    pub results: Vec<StatementOutput>,
    pub transaction: TransactionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationRecord>,
    /// Non-fatal problems, e.g. a migration that could not be recorded
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EngineError>,
    /// Whether the database domain was relocked by this batch
    pub mode_reset: bool,
}

/// Gated SQL execution against one backend.
pub struct QueryEngine {
    backend: Arc<dyn SqlBackend>,
    parser: Arc<dyn StatementParser>,
    safety: Arc<SafetyManager>,
    confirmations: Arc<ConfirmationGate>,
    recorder: MigrationRecorder,
    request_timeout: Option<Duration>,
}

impl QueryEngine {
    pub fn new(
        backend: Arc<dyn SqlBackend>,
        parser: Arc<dyn StatementParser>,
        safety: Arc<SafetyManager>,
        confirmations: Arc<ConfirmationGate>,
    ) -> Self {
        Self {
            recorder: MigrationRecorder::new(Arc::clone(&backend)),
            backend,
            parser,
            safety,
            confirmations,
            request_timeout: None,
        }
    }

    /// Upper bound for one request, connection checkout included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    /// Classifies without executing.
    pub fn classify(&self, sql: &str) -> EngineResult<StatementBatch> {
        classify(self.parser.as_ref(), sql)
    }

    /// Runs caller SQL through the gate.
    #[instrument(skip(self, sql, migration_name), fields(sql_len = sql.len()))]
    pub async fn execute(&self, sql: &str, migration_name: Option<&str>) -> EngineResult<ExecutionOutcome> {
        self.run_gated(sql, migration_name, None, None).await
    }

    /// Like [`execute`](Self::execute), but gives up as soon as `cancel`
    /// fires while the batch is running. The in-flight transaction is rolled
    /// back and its connection returned to the pool.
    pub async fn execute_cancellable(
        &self,
        sql: &str,
        migration_name: Option<&str>,
        cancel: CancellationToken,
    ) -> EngineResult<ExecutionOutcome> {
        self.run_gated(sql, migration_name, None, Some(&cancel)).await
    }

    /// Runs a parked SQL batch whose token was accepted.
    ///
    /// The stored text is classified again and must still match what was
    /// parked; the domain must still be unrestricted.
    #[instrument(skip(self, entry), fields(token = %entry.token))]
    pub async fn execute_confirmed(&self, entry: &PendingConfirmation) -> EngineResult<ExecutionOutcome> {
        self.run_confirmed(entry, None).await
    }

    pub async fn execute_confirmed_cancellable(
        &self,
        entry: &PendingConfirmation,
        cancel: CancellationToken,
    ) -> EngineResult<ExecutionOutcome> {
        self.run_confirmed(entry, Some(&cancel)).await
    }

    async fn run_confirmed(
        &self,
        entry: &PendingConfirmation,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<ExecutionOutcome> {
        match &entry.payload {
            PendingPayload::Sql { sql, migration_name } => {
                self.run_gated(sql, migration_name.as_deref(), Some(entry), cancel)
                    .await
            }
            _ => Err(EngineError::internal("Only SQL confirmations run on the query engine")),
        }
    }

    /// Migration history, newest first.
    pub async fn list_migrations(&self, query: &MigrationQuery) -> EngineResult<Vec<MigrationRecord>> {
        self.with_timeout(self.recorder.list(query)).await
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = EngineResult<T>>) -> EngineResult<T> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                warn!(timeout_ms = limit.as_millis() as u64, "Request timed out");
                EngineError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                }
            })?,
            None => fut.await,
        }
    }

    /// Runs the caller plan under the request timeout, racing `cancel`.
    async fn run_bounded(
        &self,
        plan: &ExecutionPlan,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<StatementOutput>> {
        let run = self.with_timeout(self.backend.run(plan));
        match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Execution cancelled by caller");
                    Err(EngineError::Cancelled)
                }
                result = run => result,
            },
            None => run.await,
        }
    }

    /// Records a committed DESTRUCTIVE batch. Has its own time limit; running
    /// out of it only degrades the outcome.
    async fn record(&self, batch: &StatementBatch, migration_name: Option<&str>) -> EngineResult<MigrationRecord> {
        let record = self.recorder.record(batch, migration_name);
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, record).await.unwrap_or_else(|_| {
                warn!(timeout_ms = limit.as_millis() as u64, "Migration recording timed out");
                Err(EngineError::recording_degraded(format!(
                    "Changes were committed but the migration was not recorded within {} ms",
                    limit.as_millis()
                )))
            }),
            None => record.await,
        }
    }

    async fn run_gated(
        &self,
        sql: &str,
        migration_name: Option<&str>,
        confirmed: Option<&PendingConfirmation>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<ExecutionOutcome> {
        let batch = self.classify(sql)?;
        if let Some(tcl) = batch.transaction_control() {
            return Err(EngineError::TransactionControlRejected {
                statement_index: tcl.index,
                command: tcl.command.verb().to_string(),
            });
        }

        let tier = batch.aggregate_tier();
        debug!(statements = batch.len(), %tier, "Batch classified");

        let fingerprint = batch.fingerprint();
        if let Some(entry) = confirmed {
            if entry.fingerprint != fingerprint || entry.domain != SafetyDomain::Database {
                warn!(token = %entry.token, "Confirmed batch no longer matches what was parked");
                return Err(EngineError::confirmation_not_found(entry.token.clone()));
            }
        }

        let claim = self
            .safety
            .claim(SafetyDomain::Database, tier, confirmed.is_some())
            .map_err(|e| match e {
                EngineError::OperationBlocked { domain, message, .. } => EngineError::OperationBlocked {
                    domain,
                    statement_index: batch.first_at(RiskTier::Blocked).map(|s| s.index),
                    message,
                },
                other => other,
            })?;

        if claim.needs_confirmation() {
            let entry = self.confirmations.request(
                SafetyDomain::Database,
                tier,
                fingerprint,
                batch.summary(),
                PendingPayload::Sql {
                    sql: sql.to_string(),
                    migration_name: migration_name.map(str::to_string),
                },
            );
            return Err(entry.to_error());
        }

        let plan = self.plan(&batch, claim.clearance().mode);
        // An error here drops the claim, which hands the unlock back.
        let results = self.run_bounded(&plan, cancel).await?;
        let mode_reset = claim.settle();

        let mut warnings = Vec::new();
        let migration = if tier == RiskTier::Destructive {
            match self.record(&batch, migration_name).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warnings.push(e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            statements = batch.len(),
            %tier,
            transaction = ?plan.transaction,
            mode_reset,
            "Batch executed"
        );

        Ok(ExecutionOutcome {
            tier,
            statements: reports(&batch),
            results,
            transaction: plan.transaction,
            migration,
            warnings,
            mode_reset,
        })
    }

    /// Chooses how the batch is wrapped.
    ///
    /// Restricted SAFE batches run READ ONLY so the server refuses writes
    /// that slipped past classification. Pooled backends are always wrapped.
    fn plan(&self, batch: &StatementBatch, mode: SafetyMode) -> ExecutionPlan {
        let tier = batch.aggregate_tier();
        let pooled = self.backend.connection_kind() == ConnectionKind::PooledTransaction;
        let transaction = if tier == RiskTier::Safe && mode == SafetyMode::Restricted {
            TransactionMode::ReadOnly
        } else if pooled || batch.len() > 1 || tier > RiskTier::Safe {
            TransactionMode::ReadWrite
        } else {
            TransactionMode::Autocommit
        };

        let statements = batch
            .statements()
            .iter()
            .map(|s| {
                if s.tier == Some(RiskTier::Safe) {
                    PlannedStatement::query(s.text.clone())
                } else {
                    PlannedStatement::command(s.text.clone())
                }
            })
            .collect();

        ExecutionPlan {
            statements,
            transaction,
            tier,
        }
    }

    /// Runs a fixed read-only query with bound parameters.
    ///
    /// The text goes through the classifier like caller SQL and must come out
    /// SAFE.
    pub(crate) async fn run_catalog_queries(
        &self,
        queries: Vec<(&'static str, Vec<Value>)>,
    ) -> EngineResult<Vec<StatementOutput>> {
        for (sql, _) in &queries {
            let batch = self.classify(sql)?;
            let tier = batch.aggregate_tier();
            if tier != RiskTier::Safe {
                return Err(EngineError::internal(format!("Catalog query classified as {tier}")));
            }
            self.safety.check(SafetyDomain::Database, tier)?;
        }

        let plan = ExecutionPlan {
            statements: queries
                .into_iter()
                .map(|(sql, params)| PlannedStatement::query(sql).with_params(params))
                .collect(),
            transaction: TransactionMode::ReadOnly,
            tier: RiskTier::Safe,
        };
        self.with_timeout(self.backend.run(&plan)).await
    }
}

fn reports(batch: &StatementBatch) -> Vec<StatementReport> {
    batch
        .statements()
        .iter()
        .map(|s| StatementReport {
            index: s.index,
            command: s.command,
            category: s.category,
            tier: s.tier,
        })
        .collect()
}
