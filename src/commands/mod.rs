// SPDX-License-Identifier: Apache-2.0

//! Tool surface
//!
//! Every operation a calling agent can invoke, addressed by name with JSON
//! arguments. Results and failures are both structured so the caller can
//! branch on them.

pub mod query;
pub mod safety;
pub mod schema;
pub mod services;

use gate_core::{EngineError, EngineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::Gateway;

pub const EXECUTE_POSTGRESQL: &str = "execute_postgresql";
pub const LIVE_DANGEROUSLY: &str = "live_dangerously";
pub const GET_SAFETY_MODES: &str = "get_safety_modes";
pub const CONFIRM_DESTRUCTIVE_OPERATION: &str = "confirm_destructive_operation";
pub const RETRIEVE_MIGRATIONS: &str = "retrieve_migrations";
pub const GET_SCHEMAS: &str = "get_schemas";
pub const GET_TABLES: &str = "get_tables";
pub const GET_TABLE_SCHEMA: &str = "get_table_schema";
pub const SEND_MANAGEMENT_API_REQUEST: &str = "send_management_api_request";
pub const CALL_AUTH_ADMIN_METHOD: &str = "call_auth_admin_method";

pub const TOOL_NAMES: &[&str] = &[
    EXECUTE_POSTGRESQL,
    LIVE_DANGEROUSLY,
    GET_SAFETY_MODES,
    CONFIRM_DESTRUCTIVE_OPERATION,
    RETRIEVE_MIGRATIONS,
    GET_SCHEMAS,
    GET_TABLES,
    GET_TABLE_SCHEMA,
    SEND_MANAGEMENT_API_REQUEST,
    CALL_AUTH_ADMIN_METHOD,
];

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Response wrapper for every tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EngineError>,
}

impl ToolResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<EngineError>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn failed(error: EngineError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            warnings: Vec::new(),
        }
    }

    /// Kind of the failure, if the call failed.
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(EngineError::kind)
    }
}

impl From<EngineResult<ToolResponse>> for ToolResponse {
    fn from(result: EngineResult<ToolResponse>) -> Self {
        result.unwrap_or_else(ToolResponse::failed)
    }
}

/// Deserializes tool arguments; a missing argument object counts as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, arguments: &serde_json::Value) -> EngineResult<T> {
    let arguments = if arguments.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments)
        .map_err(|e| EngineError::validation(format!("Invalid arguments for {tool}: {e}")))
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> EngineResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| EngineError::internal(format!("Failed to serialize result: {e}")))
}

/// Routes a call to its tool.
#[instrument(skip(gateway, call), fields(tool = %call.tool))]
pub async fn dispatch(gateway: &Gateway, call: ToolCall) -> ToolResponse {
    let args = &call.arguments;
    let response: ToolResponse = match call.tool.as_str() {
        EXECUTE_POSTGRESQL => query::execute_postgresql(gateway, args).await.into(),
        CONFIRM_DESTRUCTIVE_OPERATION => query::confirm_destructive_operation(gateway, args).await.into(),
        RETRIEVE_MIGRATIONS => query::retrieve_migrations(gateway, args).await.into(),
        LIVE_DANGEROUSLY => safety::live_dangerously(gateway, args).into(),
        GET_SAFETY_MODES => safety::get_safety_modes(gateway).into(),
        GET_SCHEMAS => schema::get_schemas(gateway).await.into(),
        GET_TABLES => schema::get_tables(gateway, args).await.into(),
        GET_TABLE_SCHEMA => schema::get_table_schema(gateway, args).await.into(),
        SEND_MANAGEMENT_API_REQUEST => services::send_management_api_request(gateway, args).await.into(),
        CALL_AUTH_ADMIN_METHOD => services::call_auth_admin_method(gateway, args).await.into(),
        other => ToolResponse::failed(EngineError::validation(format!(
            "Unknown tool '{other}'; expected one of: {}",
            TOOL_NAMES.join(", ")
        ))),
    };

    if let Some(error) = &response.error {
        warn!(kind = error.kind(), error = %error, "Tool call failed");
    }
    response
}
