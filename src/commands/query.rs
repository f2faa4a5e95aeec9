// SPDX-License-Identifier: Apache-2.0

//! SQL execution, confirmation and migration history tools.

use gate_core::{EngineError, EngineResult};
use serde::Deserialize;
use tracing::{field, instrument, Span};

use super::{parse_args, to_data, ToolResponse, CONFIRM_DESTRUCTIVE_OPERATION, EXECUTE_POSTGRESQL, RETRIEVE_MIGRATIONS};
use crate::migrations::MigrationQuery;
use crate::{ConfirmedOutcome, Gateway};

#[derive(Debug, Deserialize)]
pub struct ExecuteArgs {
    pub query: String,
    #[serde(default)]
    pub migration_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmArgs {
    pub confirmation_id: String,
    #[serde(default)]
    pub user_confirmation: bool,
}

/// Executes a SQL batch through the safety gate.
#[instrument(skip(gateway, args), fields(query_len = field::Empty))]
pub async fn execute_postgresql(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let args: ExecuteArgs = parse_args(EXECUTE_POSTGRESQL, args)?;
    Span::current().record("query_len", args.query.len());

    let outcome = gateway
        .engine()
        .execute(&args.query, args.migration_name.as_deref())
        .await?;
    let warnings = outcome.warnings.clone();
    Ok(ToolResponse::ok(to_data(&outcome)?).with_warnings(warnings))
}

/// Runs a parked operation. The caller must state that a human agreed.
#[instrument(skip(gateway, args))]
pub async fn confirm_destructive_operation(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let args: ConfirmArgs = parse_args(CONFIRM_DESTRUCTIVE_OPERATION, args)?;
    if !args.user_confirmation {
        return Err(EngineError::validation(
            "user_confirmation must be true to run a destructive operation",
        ));
    }

    let outcome = gateway.confirm(&args.confirmation_id).await?;
    let warnings = match &outcome {
        ConfirmedOutcome::Database(execution) => execution.warnings.clone(),
        _ => Vec::new(),
    };
    Ok(ToolResponse::ok(to_data(&outcome)?).with_warnings(warnings))
}

/// Lists recorded migrations, newest first.
#[instrument(skip(gateway, args))]
pub async fn retrieve_migrations(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let query: MigrationQuery = parse_args(RETRIEVE_MIGRATIONS, args)?;
    let records = gateway.engine().list_migrations(&query).await?;
    Ok(ToolResponse::ok(serde_json::json!({
        "migrations": to_data(&records)?,
        "count": records.len(),
    })))
}
