// SPDX-License-Identifier: Apache-2.0

//! Safety layer
//!
//! Per-domain safety modes, the two-step confirmation registry, and the risk
//! rules for requests that do not go through the SQL classifier.

pub mod api_rules;
pub mod confirmation;
pub mod manager;

pub use api_rules::{classify_request, classify_sdk_method};
pub use confirmation::{ConfirmationGate, PendingConfirmation, PendingPayload};
pub use manager::{Claim, Clearance, SafetyManager};
