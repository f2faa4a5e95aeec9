// SPDX-License-Identifier: Apache-2.0

//! Remote management API and auth-admin tools.

use gate_core::EngineResult;
use tracing::instrument;

use super::{parse_args, ToolResponse, CALL_AUTH_ADMIN_METHOD, SEND_MANAGEMENT_API_REQUEST};
use crate::services::{ApiRequest, SdkCall};
use crate::Gateway;

#[instrument(skip(gateway, args))]
pub async fn send_management_api_request(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let request: ApiRequest = parse_args(SEND_MANAGEMENT_API_REQUEST, args)?;
    let response = gateway.remote().send_management_api_request(request).await?;
    Ok(ToolResponse::ok(response))
}

#[instrument(skip(gateway, args))]
pub async fn call_auth_admin_method(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let call: SdkCall = parse_args(CALL_AUTH_ADMIN_METHOD, args)?;
    let response = gateway.remote().call_auth_admin_method(call).await?;
    Ok(ToolResponse::ok(response))
}
