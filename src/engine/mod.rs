// SPDX-License-Identifier: Apache-2.0

// Execution Engine
// Gated execution of SQL batches against a backend

pub mod drivers;
pub mod executor;
pub mod introspection;
pub mod traits;

pub use drivers::PostgresBackend;
pub use executor::{ExecutionOutcome, QueryEngine, StatementReport};
pub use introspection::{ForeignKey, SchemaInfo, TableColumn, TableInfo, TableSchema};
pub use traits::{ExecutionPlan, PlannedStatement, SqlBackend};
