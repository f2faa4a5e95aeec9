// SPDX-License-Identifier: Apache-2.0

//! Shared types for classification, gating and execution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Impact of a statement, ordered from least to most dangerous.
///
/// The ordering is load-bearing: the tier of a batch is the maximum of its
/// members, and gates compare tiers with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Read-only: queries and introspection
    Safe,
    /// Data modification without structural change
    Write,
    /// Structural or permission change, or data-loss-capable operation
    Destructive,
    /// Never permitted, whatever the mode
    Blocked,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Write => "write",
            RiskTier::Destructive => "destructive",
            RiskTier::Blocked => "blocked",
        }
    }

    /// Whether running at this tier requires the domain to be unlocked.
    pub fn requires_unrestricted(&self) -> bool {
        matches!(self, RiskTier::Write | RiskTier::Destructive)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement category, derived from the grammar node of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementCategory {
    Query,
    DataModify,
    SchemaChange,
    PermissionChange,
    TransactionControl,
    /// Statements the grammar accepts but that fit none of the above
    /// (SET, CALL, VACUUM, ...)
    Other,
}

impl fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementCategory::Query => "query",
            StatementCategory::DataModify => "data_modify",
            StatementCategory::SchemaChange => "schema_change",
            StatementCategory::PermissionChange => "permission_change",
            StatementCategory::TransactionControl => "transaction_control",
            StatementCategory::Other => "other",
        };
        f.write_str(s)
    }
}

/// Per-domain safety mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    #[default]
    Restricted,
    Unrestricted,
}

impl SafetyMode {
    pub fn from_unsafe_flag(enable_unsafe: bool) -> Self {
        if enable_unsafe {
            SafetyMode::Unrestricted
        } else {
            SafetyMode::Restricted
        }
    }
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyMode::Restricted => f.write_str("restricted"),
            SafetyMode::Unrestricted => f.write_str("unrestricted"),
        }
    }
}

/// Operational domain with its own, independent safety mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyDomain {
    /// SQL execution against the database
    Database,
    /// Remote management API requests
    Api,
    /// Auth-admin SDK calls
    Sdk,
}

impl SafetyDomain {
    pub const ALL: [SafetyDomain; 3] = [SafetyDomain::Database, SafetyDomain::Api, SafetyDomain::Sdk];
}

impl fmt::Display for SafetyDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyDomain::Database => f.write_str("database"),
            SafetyDomain::Api => f.write_str("api"),
            SafetyDomain::Sdk => f.write_str("sdk"),
        }
    }
}

/// How the backend is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// A real backend session: session state survives across statements
    #[default]
    Direct,
    /// A transaction-mode pooler; nothing survives a transaction boundary
    PooledTransaction,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Direct => f.write_str("direct"),
            ConnectionKind::PooledTransaction => f.write_str("pooled_transaction"),
        }
    }
}

/// Transaction wrapping chosen by the engine for one round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    Autocommit,
    ReadWrite,
    ReadOnly,
}

impl TransactionMode {
    pub fn is_wrapped(&self) -> bool {
        !matches!(self, TransactionMode::Autocommit)
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON rendering used when rows are handed back to a caller as records.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::{engine::general_purpose::STANDARD, Engine};

        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Json(v) => v.clone(),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// A single row of data (indexed by column order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

/// Outcome of one statement of a batch.
///
/// SAFE statements produce a row set; everything else produces an affected
/// row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementOutput {
    /// Position of the statement inside its batch
    pub statement_index: usize,
    /// Column information (empty for non-query statements)
    pub columns: Vec<ColumnInfo>,
    /// Result rows (empty for non-query statements)
    pub rows: Vec<Row>,
    /// Number of affected rows (for non-query statements)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
}

impl StatementOutput {
    pub fn row_set(statement_index: usize, columns: Vec<ColumnInfo>, rows: Vec<Row>, time_ms: f64) -> Self {
        Self {
            statement_index,
            columns,
            rows,
            affected_rows: None,
            execution_time_ms: time_ms,
        }
    }

    pub fn affected(statement_index: usize, affected: u64, time_ms: f64) -> Self {
        Self {
            statement_index,
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: Some(affected),
            execution_time_ms: time_ms,
        }
    }

    pub fn is_row_set(&self) -> bool {
        self.affected_rows.is_none()
    }

    /// Rows keyed by column name.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.values.iter())
                    .map(|(col, value)| (col.name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }

    /// Value at `(row, column name)`, if present.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.values.get(idx)
    }
}
