// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Backend
//!
//! Implements [`SqlBackend`] for PostgreSQL using SQLx.
//!
//! ## Transaction Handling
//!
//! Every call to `run()` checks out one connection for its whole duration.
//! Wrapped plans open a transaction on it, run the statements in order and
//! commit only if all of them succeeded. Dropping the `run()` future drops
//! the SQLx `Transaction`, which queues a `ROLLBACK` before the connection
//! goes back to the pool, so a cancelled request never leaves a transaction
//! open.
//!
//! ## Transaction-mode poolers
//!
//! Behind a transaction pooler each transaction may land on a different
//! server session. Plans against such a backend are always wrapped by the
//! engine, the statement timeout is applied with `SET LOCAL`, and the
//! prepared-statement cache is disabled.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use gate_core::{ConnectionKind, EngineResult, StatementOutput, TransactionMode};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::{Connection, Executor};
use tracing::{debug, info, warn};

use crate::config::ConnectionDescriptor;
use crate::engine::drivers::postgres_utils::{
    bind_param, column_info, connect_options, convert_row, local_statement_timeout, map_acquire_error,
    map_statement_error, pool_options,
};
use crate::engine::traits::{ExecutionPlan, PlannedStatement, SqlBackend};

/// PostgreSQL backend over a SQLx pool
pub struct PostgresBackend {
    pool: PgPool,
    kind: ConnectionKind,
    acquire_timeout: Duration,
    statement_timeout: Option<Duration>,
}

impl PostgresBackend {
    /// Builds the pool without opening a connection.
    pub fn connect_lazy(descriptor: &ConnectionDescriptor) -> EngineResult<Self> {
        descriptor.validate()?;
        let options = connect_options(descriptor)?;
        let pool = pool_options(descriptor).connect_lazy_with(options);

        info!(
            kind = %descriptor.kind,
            url = %descriptor.redacted_url(),
            max_connections = descriptor.max_connections,
            "PostgreSQL pool configured"
        );

        Ok(Self {
            pool,
            kind: descriptor.kind,
            acquire_timeout: descriptor.acquire_timeout(),
            statement_timeout: descriptor.statement_timeout(),
        })
    }

    /// Builds the pool and verifies the server is reachable.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> EngineResult<Self> {
        let backend = Self::connect_lazy(descriptor)?;
        backend.ping().await?;
        Ok(backend)
    }

    pub async fn ping(&self) -> EngineResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_acquire_error(e, self.acquire_timeout))?;
        conn.ping()
            .await
            .map_err(|e| gate_core::EngineError::connection_failed(e.to_string()))
    }

    async fn run_wrapped(&self, conn: &mut PgConnection, plan: &ExecutionPlan) -> EngineResult<Vec<StatementOutput>> {
        let mut tx = conn.begin().await.map_err(|e| map_statement_error(e, None, plan.tier))?;

        if plan.transaction == TransactionMode::ReadOnly {
            (&mut *tx)
                .execute(sqlx::raw_sql("SET TRANSACTION READ ONLY"))
                .await
                .map_err(|e| map_statement_error(e, None, plan.tier))?;
        }
        if self.kind == ConnectionKind::PooledTransaction {
            if let Some(timeout) = self.statement_timeout {
                let set_timeout = local_statement_timeout(timeout);
                (&mut *tx)
                    .execute(sqlx::raw_sql(&set_timeout))
                    .await
                    .map_err(|e| map_statement_error(e, None, plan.tier))?;
            }
        }

        match run_statements(&mut tx, plan).await {
            Ok(outputs) => {
                tx.commit().await.map_err(|e| map_statement_error(e, None, plan.tier))?;
                Ok(outputs)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed; connection will be discarded");
                }
                Err(e)
            }
        }
    }
}

async fn run_statements(conn: &mut PgConnection, plan: &ExecutionPlan) -> EngineResult<Vec<StatementOutput>> {
    let mut outputs = Vec::with_capacity(plan.statements.len());
    for (index, statement) in plan.statements.iter().enumerate() {
        let output = run_statement(conn, index, statement)
            .await
            .map_err(|e| map_statement_error(e, Some(index), plan.tier))?;
        outputs.push(output);
    }
    Ok(outputs)
}

async fn run_statement(
    conn: &mut PgConnection,
    index: usize,
    statement: &PlannedStatement,
) -> Result<StatementOutput, sqlx::Error> {
    let start = Instant::now();

    if statement.params.is_empty() {
        if statement.returns_rows {
            let rows = (&mut *conn).fetch_all(sqlx::raw_sql(&statement.sql)).await?;
            let columns = rows.first().map(column_info).unwrap_or_default();
            let rows = rows.iter().map(convert_row).collect();
            Ok(StatementOutput::row_set(index, columns, rows, elapsed_ms(start)))
        } else {
            let result = (&mut *conn).execute(sqlx::raw_sql(&statement.sql)).await?;
            Ok(StatementOutput::affected(index, result.rows_affected(), elapsed_ms(start)))
        }
    } else {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = bind_param(query, param);
        }
        if statement.returns_rows {
            let rows = query.fetch_all(&mut *conn).await?;
            let columns = rows.first().map(column_info).unwrap_or_default();
            let rows = rows.iter().map(convert_row).collect();
            Ok(StatementOutput::row_set(index, columns, rows, elapsed_ms(start)))
        } else {
            let result = query.execute(&mut *conn).await?;
            Ok(StatementOutput::affected(index, result.rows_affected(), elapsed_ms(start)))
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_micros() as f64 / 1000.0
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    fn backend_id(&self) -> &'static str {
        "postgres"
    }

    fn connection_kind(&self) -> ConnectionKind {
        self.kind
    }

    async fn run(&self, plan: &ExecutionPlan) -> EngineResult<Vec<StatementOutput>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_acquire_error(e, self.acquire_timeout))?;

        debug!(
            statements = plan.statements.len(),
            transaction = ?plan.transaction,
            tier = %plan.tier,
            "Running execution plan"
        );

        if plan.transaction.is_wrapped() {
            self.run_wrapped(&mut conn, plan).await
        } else {
            run_statements(&mut conn, plan).await
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}
