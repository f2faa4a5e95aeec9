// SPDX-License-Identifier: Apache-2.0

//! Read-only introspection tools.

use gate_core::EngineResult;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{parse_args, to_data, ToolResponse, GET_TABLES, GET_TABLE_SCHEMA};
use crate::Gateway;

#[derive(Debug, Deserialize)]
pub struct TablesArgs {
    pub schema_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TableSchemaArgs {
    pub schema_name: String,
    pub table: String,
}

#[instrument(skip(gateway))]
pub async fn get_schemas(gateway: &Gateway) -> EngineResult<ToolResponse> {
    let schemas = gateway.engine().list_schemas().await?;
    Ok(ToolResponse::ok(json!({ "schemas": to_data(&schemas)? })))
}

#[instrument(skip(gateway, args))]
pub async fn get_tables(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let args: TablesArgs = parse_args(GET_TABLES, args)?;
    let tables = gateway.engine().list_tables(&args.schema_name).await?;
    Ok(ToolResponse::ok(json!({
        "schema": args.schema_name,
        "tables": to_data(&tables)?,
    })))
}

#[instrument(skip(gateway, args))]
pub async fn get_table_schema(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let args: TableSchemaArgs = parse_args(GET_TABLE_SCHEMA, args)?;
    let schema = gateway
        .engine()
        .describe_table(&args.schema_name, &args.table)
        .await?;
    Ok(ToolResponse::ok(to_data(&schema)?))
}
