// SPDX-License-Identifier: Apache-2.0

//! SqlBackend trait definition
//!
//! The seam between the gateway and a database. The engine decides what runs
//! and how it is wrapped; a backend only carries it out on one connection and
//! reports per-statement outcomes.

use async_trait::async_trait;
use gate_core::{ConnectionKind, EngineResult, RiskTier, StatementOutput, TransactionMode, Value};

/// One statement of an execution plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub sql: String,
    /// Positional parameters; empty for caller-supplied SQL, which always runs
    /// over the simple query protocol
    pub params: Vec<Value>,
    /// Whether the statement yields a row set rather than an affected count
    pub returns_rows: bool,
}

impl PlannedStatement {
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returns_rows: true,
        }
    }

    pub fn command(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returns_rows: false,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Everything a backend needs for one round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub statements: Vec<PlannedStatement>,
    pub transaction: TransactionMode,
    /// Tier in effect, reported back on failure
    pub tier: RiskTier,
}

/// Core trait that database backends implement
///
/// Contract:
/// - all statements of a plan run on one connection, checked out for the
///   duration of the call and returned before it completes, also on error;
/// - a wrapped plan commits only if every statement succeeded and otherwise
///   rolls back, reporting the failing statement's index;
/// - dropping the returned future mid-flight must leave no open transaction.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Returns the unique identifier for this backend (e.g., "postgres")
    fn backend_id(&self) -> &'static str;

    /// How the backend reaches the server
    fn connection_kind(&self) -> ConnectionKind;

    /// Runs a plan and returns one output per statement, in order
    async fn run(&self, plan: &ExecutionPlan) -> EngineResult<Vec<StatementOutput>>;

    /// Releases pooled connections
    async fn close(&self);
}
