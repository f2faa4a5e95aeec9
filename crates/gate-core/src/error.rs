// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the SQL gateway
//!
//! Every failure a caller can observe is one of these variants. They
//! serialize with a `kind` discriminator so an automated caller can branch on
//! the failure without parsing messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RiskTier, SafetyDomain, SafetyMode};

/// Unified error type for all gateway operations
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("Query syntax error: {message}")]
    SyntaxError {
        message: String,
        statement_index: Option<usize>,
    },

    #[error("A {required_tier} operation requires unrestricted mode in the {domain} domain (current mode: {mode})")]
    ModeViolation {
        domain: SafetyDomain,
        required_tier: RiskTier,
        mode: SafetyMode,
    },

    #[error("Operation blocked in the {domain} domain: {message}")]
    OperationBlocked {
        domain: SafetyDomain,
        statement_index: Option<usize>,
        message: String,
    },

    #[error("Statement {statement_index} is explicit transaction control ({command}); transactions are managed by the gateway")]
    TransactionControlRejected {
        statement_index: usize,
        command: String,
    },

    #[error("Confirmation required for a {tier} operation: {summary} (token {token}, expires {expires_at})")]
    ConfirmationRequired {
        token: String,
        domain: SafetyDomain,
        tier: RiskTier,
        summary: String,
        expires_at: DateTime<Utc>,
    },

    #[error("No pending confirmation for token {token}; it may have expired or already been used")]
    ConfirmationNotFound { token: String },

    #[error("Statement execution failed: {message}")]
    BackendExecution {
        statement_index: Option<usize>,
        message: String,
        code: Option<String>,
        tier: RiskTier,
    },

    #[error("No connection available within {timeout_ms}ms")]
    PoolExhausted { timeout_ms: u64 },

    #[error("Migration history not recorded: {message}")]
    RecordingDegraded { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError {
            message: msg.into(),
            statement_index: None,
        }
    }

    pub fn syntax_error_at(index: usize, msg: impl Into<String>) -> Self {
        Self::SyntaxError {
            message: msg.into(),
            statement_index: Some(index),
        }
    }

    pub fn mode_violation(domain: SafetyDomain, required_tier: RiskTier, mode: SafetyMode) -> Self {
        Self::ModeViolation {
            domain,
            required_tier,
            mode,
        }
    }

    pub fn blocked(domain: SafetyDomain, msg: impl Into<String>) -> Self {
        Self::OperationBlocked {
            domain,
            statement_index: None,
            message: msg.into(),
        }
    }

    pub fn confirmation_not_found(token: impl Into<String>) -> Self {
        Self::ConfirmationNotFound { token: token.into() }
    }

    pub fn backend(statement_index: Option<usize>, tier: RiskTier, msg: impl Into<String>) -> Self {
        Self::BackendExecution {
            statement_index,
            message: msg.into(),
            code: None,
            tier,
        }
    }

    pub fn recording_degraded(msg: impl Into<String>) -> Self {
        Self::RecordingDegraded { message: msg.into() }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Stable discriminator, identical to the serialized `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyntaxError { .. } => "syntax_error",
            Self::ModeViolation { .. } => "mode_violation",
            Self::OperationBlocked { .. } => "operation_blocked",
            Self::TransactionControlRejected { .. } => "transaction_control_rejected",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::ConfirmationNotFound { .. } => "confirmation_not_found",
            Self::BackendExecution { .. } => "backend_execution",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::RecordingDegraded { .. } => "recording_degraded",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::ValidationError { .. } => "validation_error",
            Self::NotSupported { .. } => "not_supported",
            Self::ConfigError { .. } => "config_error",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether the same request may succeed if simply retried later.
    ///
    /// Serialization failures (40001) and deadlocks (40P01) are retryable
    /// backend errors; everything gated or malformed is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PoolExhausted { .. } | Self::Timeout { .. } | Self::ConnectionFailed { .. } => true,
            Self::BackendExecution { code: Some(code), .. } => code.starts_with("40"),
            _ => false,
        }
    }

    /// Statement the error refers to, when there is one.
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::SyntaxError { statement_index, .. }
            | Self::OperationBlocked { statement_index, .. }
            | Self::BackendExecution { statement_index, .. } => *statement_index,
            Self::TransactionControlRejected { statement_index, .. } => Some(*statement_index),
            _ => None,
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
