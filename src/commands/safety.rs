// SPDX-License-Identifier: Apache-2.0

//! Safety mode tools.

use gate_core::{EngineResult, SafetyDomain, SafetyMode};
use serde::Deserialize;
use serde_json::json;

use super::{parse_args, ToolResponse, LIVE_DANGEROUSLY};
use crate::Gateway;

#[derive(Debug, Deserialize)]
pub struct LiveDangerouslyArgs {
    pub service: SafetyDomain,
    #[serde(default)]
    pub enable_unsafe_mode: bool,
}

/// Toggles one domain between restricted and unrestricted.
pub fn live_dangerously(gateway: &Gateway, args: &serde_json::Value) -> EngineResult<ToolResponse> {
    let args: LiveDangerouslyArgs = parse_args(LIVE_DANGEROUSLY, args)?;
    let mode = gateway
        .safety()
        .set_mode(args.service, SafetyMode::from_unsafe_flag(args.enable_unsafe_mode));

    let note = match mode {
        SafetyMode::Unrestricted => {
            "Unrestricted until the next successful write or destructive operation, then restricted again"
        }
        SafetyMode::Restricted => "Only read-only operations are allowed",
    };
    Ok(ToolResponse::ok(json!({
        "service": args.service,
        "mode": mode,
        "note": note,
    })))
}

/// Current mode of every domain.
pub fn get_safety_modes(gateway: &Gateway) -> EngineResult<ToolResponse> {
    let modes: serde_json::Map<String, serde_json::Value> = gateway
        .safety()
        .modes()
        .into_iter()
        .map(|(domain, mode)| (domain.to_string(), json!(mode)))
        .collect();
    Ok(ToolResponse::ok(json!({
        "modes": modes,
        "pending_confirmations": gateway.confirmations().pending_count(),
    })))
}
