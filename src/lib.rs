// SPDX-License-Identifier: Apache-2.0

//! Safety-gated SQL execution for automated callers.
//!
//! [`Gateway`] owns the shared state (safety modes, pending confirmations)
//! and the engines that consult it. Callers reach it through the tool
//! surface in [`commands`].

pub mod commands;
pub mod config;
pub mod engine;
pub mod migrations;
pub mod observability;
pub mod safety;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use gate_core::{EngineResult, SafetyDomain};
use gate_sql::PostgresParser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use gate_core::{EngineError, RiskTier, SafetyMode};

use crate::config::GatewayConfig;
use crate::engine::{ExecutionOutcome, PostgresBackend, QueryEngine, SqlBackend};
use crate::safety::{ConfirmationGate, SafetyManager};
use crate::services::{AuthAdmin, ManagementApi, RemoteOperations};

/// What a confirmed operation produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum ConfirmedOutcome {
    Database(ExecutionOutcome),
    Api { response: serde_json::Value },
    Sdk { response: serde_json::Value },
}

/// Explicitly owned gateway state. Independent instances share nothing.
pub struct Gateway {
    safety: Arc<SafetyManager>,
    confirmations: Arc<ConfirmationGate>,
    engine: QueryEngine,
    remote: RemoteOperations,
}

impl Gateway {
    /// Builds a gateway over a PostgreSQL pool. No connection is opened
    /// until the first request.
    pub fn from_config(config: &GatewayConfig) -> EngineResult<Self> {
        let backend = PostgresBackend::connect_lazy(&config.connection)?;
        Ok(Self::with_backend(Arc::new(backend), config.confirmation_ttl())
            .with_request_timeout(config.request_timeout()))
    }

    pub fn with_backend(backend: Arc<dyn SqlBackend>, confirmation_ttl: Duration) -> Self {
        let safety = Arc::new(SafetyManager::new());
        let confirmations = Arc::new(ConfirmationGate::new(confirmation_ttl));
        let engine = QueryEngine::new(
            backend,
            Arc::new(PostgresParser::new()),
            Arc::clone(&safety),
            Arc::clone(&confirmations),
        );
        let remote = RemoteOperations::new(Arc::clone(&safety), Arc::clone(&confirmations));

        info!("Gateway initialized");
        Self {
            safety,
            confirmations,
            engine,
            remote,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.engine = self.engine.with_request_timeout(timeout);
        self
    }

    pub fn with_management_api(mut self, client: Arc<dyn ManagementApi>) -> Self {
        self.remote = self.remote.with_management_api(client);
        self
    }

    pub fn with_auth_admin(mut self, client: Arc<dyn AuthAdmin>) -> Self {
        self.remote = self.remote.with_auth_admin(client);
        self
    }

    pub fn safety(&self) -> &SafetyManager {
        &self.safety
    }

    pub fn confirmations(&self) -> &ConfirmationGate {
        &self.confirmations
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn remote(&self) -> &RemoteOperations {
        &self.remote
    }

    /// Consumes a confirmation token and runs the parked operation.
    pub async fn confirm(&self, token: &str) -> EngineResult<ConfirmedOutcome> {
        self.confirm_with(token, None).await
    }

    /// Like [`confirm`](Self::confirm); a parked SQL batch stops as soon as
    /// `cancel` fires while it runs.
    pub async fn confirm_cancellable(&self, token: &str, cancel: CancellationToken) -> EngineResult<ConfirmedOutcome> {
        self.confirm_with(token, Some(cancel)).await
    }

    async fn confirm_with(&self, token: &str, cancel: Option<CancellationToken>) -> EngineResult<ConfirmedOutcome> {
        let entry = self.confirmations.confirm(token)?;
        match entry.domain {
            SafetyDomain::Database => match cancel {
                Some(cancel) => self.engine.execute_confirmed_cancellable(&entry, cancel).await,
                None => self.engine.execute_confirmed(&entry).await,
            }
            .map(ConfirmedOutcome::Database),
            SafetyDomain::Api => self
                .remote
                .run_confirmed(entry)
                .await
                .map(|response| ConfirmedOutcome::Api { response }),
            SafetyDomain::Sdk => self
                .remote
                .run_confirmed(entry)
                .await
                .map(|response| ConfirmedOutcome::Sdk { response }),
        }
    }

    /// Closes pooled connections.
    pub async fn shutdown(&self) {
        self.engine.backend().close().await;
    }
}
