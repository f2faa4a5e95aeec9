// SPDX-License-Identifier: Apache-2.0

//! Migration history relation.
//!
//! Records are appended after a DESTRUCTIVE batch committed. The write is an
//! audit trail, not part of the batch's transaction: a failure here never
//! undoes the schema change, the caller gets a `RecordingDegraded` warning.

use std::sync::Arc;

use gate_core::{EngineError, EngineResult, RiskTier, TransactionMode, Value};
use gate_sql::StatementBatch;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::engine::traits::{ExecutionPlan, PlannedStatement, SqlBackend};
use crate::migrations::naming::{compare_versions, migration_name, VersionClock};

pub const MIGRATIONS_SCHEMA: &str = "supabase_migrations";
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

const MAX_LIST_LIMIT: u32 = 100;
const DEFAULT_LIST_LIMIT: u32 = 50;

// SQLSTATEs for a history relation that was never created
const UNDEFINED_TABLE: &str = "42P01";
const INVALID_SCHEMA: &str = "3F000";

const CREATE_SCHEMA_SQL: &str = "CREATE SCHEMA IF NOT EXISTS supabase_migrations";
const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS supabase_migrations.schema_migrations (
    version text PRIMARY KEY,
    name text,
    statements text[]
)";
const INSERT_SQL: &str =
    "INSERT INTO supabase_migrations.schema_migrations (version, name, statements) VALUES ($1, $2, $3)";
const LIST_SQL: &str = "SELECT version, name, statements,
       coalesce(array_length(statements, 1), 0)::bigint AS statement_count
FROM supabase_migrations.schema_migrations
WHERE ($1::text IS NULL OR name ILIKE '%' || $1::text || '%')
ORDER BY (version ~ '^[0-9]+$') DESC,
         CASE WHEN version ~ '^[0-9]+$' THEN version::numeric END DESC NULLS LAST,
         version DESC
LIMIT $2 OFFSET $3";

/// One entry of the migration history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    /// Verbatim statement texts; omitted from listings unless asked for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statements: Option<Vec<String>>,
    pub statement_count: usize,
}

/// Filter and paging for [`MigrationRecorder::list`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub name_pattern: Option<String>,
    pub include_full_queries: bool,
}

impl MigrationQuery {
    fn validated_limit(&self) -> EngineResult<u32> {
        match self.limit {
            None => Ok(DEFAULT_LIST_LIMIT),
            Some(limit) if (1..=MAX_LIST_LIMIT).contains(&limit) => Ok(limit),
            Some(limit) => Err(EngineError::validation(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}, got {limit}"
            ))),
        }
    }
}

/// Appends to and reads the migration history relation.
pub struct MigrationRecorder {
    backend: Arc<dyn SqlBackend>,
    clock: VersionClock,
    initialized: OnceCell<()>,
}

impl MigrationRecorder {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self {
            backend,
            clock: VersionClock::new(),
            initialized: OnceCell::new(),
        }
    }

    async fn ensure_initialized(&self) -> EngineResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                let plan = ExecutionPlan {
                    statements: vec![
                        PlannedStatement::command(CREATE_SCHEMA_SQL),
                        PlannedStatement::command(CREATE_TABLE_SQL),
                    ],
                    transaction: TransactionMode::ReadWrite,
                    tier: RiskTier::Write,
                };
                self.backend.run(&plan).await.map(|_| ())
            })
            .await
            .map(|_| ())
    }

    /// Appends one record for a committed batch.
    ///
    /// Every failure comes back as `RecordingDegraded`.
    #[instrument(skip(self, batch, requested_name), fields(statements = batch.len()))]
    pub async fn record(&self, batch: &StatementBatch, requested_name: Option<&str>) -> EngineResult<MigrationRecord> {
        let record = MigrationRecord {
            version: self.clock.next(),
            name: migration_name(batch, requested_name),
            statement_count: batch.len(),
            statements: Some(batch.statement_texts()),
        };

        let result = async {
            self.ensure_initialized().await?;
            let statements = record
                .statements
                .iter()
                .flatten()
                .map(|text| Value::Text(text.clone()))
                .collect();
            let plan = ExecutionPlan {
                statements: vec![PlannedStatement::command(INSERT_SQL).with_params(vec![
                    Value::Text(record.version.clone()),
                    Value::Text(record.name.clone()),
                    Value::Array(statements),
                ])],
                transaction: TransactionMode::ReadWrite,
                tier: RiskTier::Write,
            };
            self.backend.run(&plan).await
        }
        .await;

        match result {
            Ok(_) => {
                info!(version = %record.version, name = %record.name, "Migration recorded");
                Ok(record)
            }
            Err(e) => {
                warn!(error = %e, name = %record.name, "Failed to record migration");
                Err(EngineError::recording_degraded(format!(
                    "Changes were committed but migration '{}' was not recorded: {e}",
                    record.name
                )))
            }
        }
    }

    /// Records in version-descending order, numeric versions first.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &MigrationQuery) -> EngineResult<Vec<MigrationRecord>> {
        let limit = query.validated_limit()?;
        let pattern = query
            .name_pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Value::Text(p.to_string()))
            .unwrap_or(Value::Null);

        let plan = ExecutionPlan {
            statements: vec![PlannedStatement::query(LIST_SQL).with_params(vec![
                pattern,
                Value::Int(i64::from(limit)),
                Value::Int(i64::from(query.offset.unwrap_or(0))),
            ])],
            transaction: TransactionMode::ReadOnly,
            tier: RiskTier::Safe,
        };

        let outputs = match self.backend.run(&plan).await {
            Ok(outputs) => outputs,
            Err(EngineError::BackendExecution { code: Some(code), .. })
                if code == UNDEFINED_TABLE || code == INVALID_SCHEMA =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut records: Vec<MigrationRecord> = outputs
            .first()
            .map(|output| {
                (0..output.rows.len())
                    .map(|row| {
                        let statements = match output.value(row, "statements") {
                            Some(Value::Array(items)) => items
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect(),
                            _ => Vec::new(),
                        };
                        let statement_count = output
                            .value(row, "statement_count")
                            .and_then(Value::as_i64)
                            .map(|n| n.max(0) as usize)
                            .unwrap_or(statements.len());
                        MigrationRecord {
                            version: text_at(output, row, "version"),
                            name: text_at(output, row, "name"),
                            statements: query.include_full_queries.then_some(statements),
                            statement_count,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        records.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(records)
    }
}

fn text_at(output: &gate_core::StatementOutput, row: usize, column: &str) -> String {
    output
        .value(row, column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
