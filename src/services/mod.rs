// SPDX-License-Identifier: Apache-2.0

//! Remote management API and auth-admin SDK
//!
//! The clients themselves are external collaborators behind [`ManagementApi`]
//! and [`AuthAdmin`]. This module only gates calls to them: classify, check
//! the domain mode (relocking it for a risky call), park DESTRUCTIVE calls for
//! confirmation, forward. A call that fails hands the unlock back.

use std::sync::Arc;

use async_trait::async_trait;
use gate_core::{EngineError, EngineResult, RiskTier, SafetyDomain};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::safety::{
    classify_request, classify_sdk_method, Claim, ConfirmationGate, PendingConfirmation, PendingPayload,
    SafetyManager,
};

/// A request for the remote management API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A named auth-admin SDK method with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkCall {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Forwards requests to the remote control plane.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> EngineResult<serde_json::Value>;
}

/// Invokes methods on the user-management service.
#[async_trait]
pub trait AuthAdmin: Send + Sync {
    async fn call(&self, call: &SdkCall) -> EngineResult<serde_json::Value>;
}

fn fingerprint_of<T: Serialize>(value: &T) -> EngineResult<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| EngineError::internal(e.to_string()))?;
    Ok(Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect())
}

/// Gated access to the remote collaborators.
pub struct RemoteOperations {
    safety: Arc<SafetyManager>,
    confirmations: Arc<ConfirmationGate>,
    management_api: Option<Arc<dyn ManagementApi>>,
    auth_admin: Option<Arc<dyn AuthAdmin>>,
}

impl RemoteOperations {
    pub fn new(safety: Arc<SafetyManager>, confirmations: Arc<ConfirmationGate>) -> Self {
        Self {
            safety,
            confirmations,
            management_api: None,
            auth_admin: None,
        }
    }

    pub fn with_management_api(mut self, client: Arc<dyn ManagementApi>) -> Self {
        self.management_api = Some(client);
        self
    }

    pub fn with_auth_admin(mut self, client: Arc<dyn AuthAdmin>) -> Self {
        self.auth_admin = Some(client);
        self
    }

    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send_management_api_request(&self, request: ApiRequest) -> EngineResult<serde_json::Value> {
        self.run_api(request, None).await
    }

    #[instrument(skip(self, call), fields(method = %call.method))]
    pub async fn call_auth_admin_method(&self, call: SdkCall) -> EngineResult<serde_json::Value> {
        self.run_sdk(call, None).await
    }

    /// Runs a parked API request or SDK call after its token was accepted.
    pub async fn run_confirmed(&self, entry: PendingConfirmation) -> EngineResult<serde_json::Value> {
        match entry.payload.clone() {
            PendingPayload::ManagementApi(request) => self.run_api(request, Some(&entry)).await,
            PendingPayload::AuthAdmin(call) => self.run_sdk(call, Some(&entry)).await,
            PendingPayload::Sql { .. } => Err(EngineError::internal("SQL confirmations are run by the query engine")),
        }
    }

    async fn run_api(&self, request: ApiRequest, confirmed: Option<&PendingConfirmation>) -> EngineResult<serde_json::Value> {
        let client = self
            .management_api
            .clone()
            .ok_or_else(|| EngineError::not_supported("No management API client is configured"))?;
        let tier = classify_request(&request.method, &request.path)?;
        let summary = format!("{} {}", request.method.to_ascii_uppercase(), request.path);
        let fingerprint = fingerprint_of(&request)?;

        let claim = self.clear(SafetyDomain::Api, tier, &fingerprint, &summary, confirmed, || {
            PendingPayload::ManagementApi(request.clone())
        })?;

        let response = client.send(&request).await?;
        let mode_reset = claim.settle();
        info!(%tier, %summary, mode_reset, "Management API request completed");
        Ok(response)
    }

    async fn run_sdk(&self, call: SdkCall, confirmed: Option<&PendingConfirmation>) -> EngineResult<serde_json::Value> {
        let client = self
            .auth_admin
            .clone()
            .ok_or_else(|| EngineError::not_supported("No auth admin client is configured"))?;
        let tier = classify_sdk_method(&call.method)?;
        let summary = format!("auth.admin.{}", call.method);
        let fingerprint = fingerprint_of(&call)?;

        let claim = self.clear(SafetyDomain::Sdk, tier, &fingerprint, &summary, confirmed, || {
            PendingPayload::AuthAdmin(call.clone())
        })?;

        let response = client.call(&call).await?;
        let mode_reset = claim.settle();
        info!(%tier, %summary, mode_reset, "Auth admin call completed");
        Ok(response)
    }

    /// Mode gate plus confirmation. `Ok` means the call may go out now.
    fn clear(
        &self,
        domain: SafetyDomain,
        tier: RiskTier,
        fingerprint: &str,
        summary: &str,
        confirmed: Option<&PendingConfirmation>,
        payload: impl FnOnce() -> PendingPayload,
    ) -> EngineResult<Claim<'_>> {
        if let Some(entry) = confirmed {
            if entry.fingerprint != fingerprint || entry.domain != domain {
                return Err(EngineError::confirmation_not_found(entry.token.clone()));
            }
        }

        let claim = self.safety.claim(domain, tier, confirmed.is_some())?;
        if claim.needs_confirmation() {
            let entry = self.confirmations.request(domain, tier, fingerprint, summary, payload());
            return Err(entry.to_error());
        }
        Ok(claim)
    }
}
