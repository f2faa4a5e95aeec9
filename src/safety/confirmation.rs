// SPDX-License-Identifier: Apache-2.0

//! Two-step confirmation registry
//!
//! A DESTRUCTIVE operation that passed the mode gate is parked here under an
//! opaque token instead of running. A second call presenting the token takes
//! the entry out (single use) and runs it. Entries expire after a bounded
//! window and live in memory only.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gate_core::{EngineError, EngineResult, RiskTier, SafetyDomain};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::{ApiRequest, SdkCall};

pub const DEFAULT_CONFIRMATION_TTL: Duration = Duration::from_secs(300);

/// The operation waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingPayload {
    /// Raw SQL text; re-classified when confirmed
    Sql {
        sql: String,
        migration_name: Option<String>,
    },
    ManagementApi(ApiRequest),
    AuthAdmin(SdkCall),
}

/// One parked operation.
#[derive(Debug, Clone, Serialize)]
pub struct PendingConfirmation {
    pub token: String,
    pub domain: SafetyDomain,
    pub tier: RiskTier,
    /// Fingerprint of the operation as assessed when it was parked
    pub fingerprint: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payload: PendingPayload,
    #[serde(skip)]
    deadline: Instant,
}

impl PendingConfirmation {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The error a caller receives while the operation waits.
    pub fn to_error(&self) -> EngineError {
        EngineError::ConfirmationRequired {
            token: self.token.clone(),
            domain: self.domain,
            tier: self.tier,
            summary: self.summary.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Registry of pending confirmations.
#[derive(Debug)]
pub struct ConfirmationGate {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRMATION_TTL)
    }
}

impl ConfirmationGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Parks an operation and returns its entry. Nothing is executed.
    pub fn request(
        &self,
        domain: SafetyDomain,
        tier: RiskTier,
        fingerprint: impl Into<String>,
        summary: impl Into<String>,
        payload: PendingPayload,
    ) -> PendingConfirmation {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = PendingConfirmation {
            token: format!("conf_{}", Uuid::new_v4().simple()),
            domain,
            tier,
            fingerprint: fingerprint.into(),
            summary: summary.into(),
            created_at: now,
            expires_at,
            payload,
            deadline: Instant::now() + self.ttl,
        };

        let mut pending = self.pending.lock();
        prune_expired(&mut pending);
        pending.insert(entry.token.clone(), entry.clone());
        info!(token = %entry.token, %domain, %tier, "Operation awaiting confirmation");
        entry
    }

    /// Takes the entry for `token` out of the registry.
    ///
    /// Unknown, expired and already-used tokens all fail the same way.
    pub fn confirm(&self, token: &str) -> EngineResult<PendingConfirmation> {
        let mut pending = self.pending.lock();
        let entry = pending.remove(token);
        prune_expired(&mut pending);
        drop(pending);

        match entry {
            Some(entry) if !entry.is_expired() => {
                debug!(token, domain = %entry.domain, "Confirmation accepted");
                Ok(entry)
            }
            Some(_) => {
                debug!(token, "Confirmation token expired");
                Err(EngineError::confirmation_not_found(token))
            }
            None => Err(EngineError::confirmation_not_found(token)),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending.lock();
        prune_expired(&mut pending);
        pending.len()
    }
}

fn prune_expired(pending: &mut HashMap<String, PendingConfirmation>) {
    pending.retain(|_, entry| !entry.is_expired());
}
