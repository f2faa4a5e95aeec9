// SPDX-License-Identifier: Apache-2.0

//! Safety mode state machine
//!
//! Each domain starts RESTRICTED. A caller unlocks a domain explicitly; the
//! first WRITE or DESTRUCTIVE operation that is let through locks it again.
//! Granting and relocking happen under one lock acquisition, so concurrent
//! requests can never share an unlock.

use gate_core::{EngineError, EngineResult, RiskTier, SafetyDomain, SafetyMode};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of a gate check that let the operation through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Clearance {
    pub domain: SafetyDomain,
    pub tier: RiskTier,
    /// Mode observed at check time
    pub mode: SafetyMode,
    /// DESTRUCTIVE operations pause for a second, confirming call
    pub needs_confirmation: bool,
}

impl Clearance {
    fn allowed(domain: SafetyDomain, tier: RiskTier, mode: SafetyMode) -> Self {
        Self {
            domain,
            tier,
            mode,
            needs_confirmation: false,
        }
    }

    fn needs_confirmation(domain: SafetyDomain, tier: RiskTier, mode: SafetyMode) -> Self {
        Self {
            domain,
            tier,
            mode,
            needs_confirmation: true,
        }
    }
}

#[derive(Debug, Default)]
struct ModeSlot {
    mode: SafetyMode,
    /// Bumped on every transition; a claim only gives its unlock back when
    /// nothing changed the mode in between
    epoch: u64,
}

/// A clearance held for the duration of one operation.
///
/// When the operation consumed the domain's unlock, dropping the claim
/// without [`settle`](Claim::settle) hands the unlock back, so a batch that
/// failed or was abandoned before it committed costs nothing.
#[must_use = "dropping a claim gives the unlock back"]
#[derive(Debug)]
pub struct Claim<'a> {
    manager: &'a SafetyManager,
    clearance: Clearance,
    /// Epoch written when this claim relocked the domain
    consumed: Option<u64>,
    settled: bool,
}

impl Claim<'_> {
    pub fn clearance(&self) -> &Clearance {
        &self.clearance
    }

    pub fn needs_confirmation(&self) -> bool {
        self.clearance.needs_confirmation
    }

    /// Marks the operation as done. Returns whether it relocked the domain.
    pub fn settle(mut self) -> bool {
        self.settled = true;
        self.consumed.is_some()
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let (Some(epoch), false) = (self.consumed, self.settled) {
            self.manager.give_back(self.clearance.domain, epoch);
        }
    }
}

/// Owns the safety mode of every domain, one lock per domain.
#[derive(Debug, Default)]
pub struct SafetyManager {
    database: Mutex<ModeSlot>,
    api: Mutex<ModeSlot>,
    sdk: Mutex<ModeSlot>,
}

impl SafetyManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, domain: SafetyDomain) -> &Mutex<ModeSlot> {
        match domain {
            SafetyDomain::Database => &self.database,
            SafetyDomain::Api => &self.api,
            SafetyDomain::Sdk => &self.sdk,
        }
    }

    pub fn mode(&self, domain: SafetyDomain) -> SafetyMode {
        self.slot(domain).lock().mode
    }

    /// Sets the mode of one domain. Idempotent; never fails.
    pub fn set_mode(&self, domain: SafetyDomain, mode: SafetyMode) -> SafetyMode {
        let mut slot = self.slot(domain).lock();
        if slot.mode != mode {
            info!(%domain, from = %slot.mode, to = %mode, "Safety mode changed");
        }
        slot.mode = mode;
        slot.epoch += 1;
        mode
    }

    /// Snapshot of every domain's mode.
    pub fn modes(&self) -> Vec<(SafetyDomain, SafetyMode)> {
        SafetyDomain::ALL.iter().map(|d| (*d, self.mode(*d))).collect()
    }

    /// Gate check without side effects.
    pub fn check(&self, domain: SafetyDomain, tier: RiskTier) -> EngineResult<Clearance> {
        assess(domain, tier, self.mode(domain))
    }

    /// Gate check that consumes the unlock when it lets a risky operation
    /// run now: a WRITE, or a DESTRUCTIVE operation that was `confirmed`.
    /// An unconfirmed DESTRUCTIVE operation only learns that it needs
    /// confirmation and leaves the mode alone.
    pub fn claim(&self, domain: SafetyDomain, tier: RiskTier, confirmed: bool) -> EngineResult<Claim<'_>> {
        let mut slot = self.slot(domain).lock();
        let mut clearance = assess(domain, tier, slot.mode)?;
        if confirmed {
            clearance.needs_confirmation = false;
        }

        let consumed = if tier.requires_unrestricted() && !clearance.needs_confirmation {
            slot.mode = SafetyMode::Restricted;
            slot.epoch += 1;
            info!(%domain, %tier, "Safety mode reset to restricted for risky operation");
            Some(slot.epoch)
        } else {
            None
        };

        Ok(Claim {
            manager: self,
            clearance,
            consumed,
            settled: false,
        })
    }

    fn give_back(&self, domain: SafetyDomain, epoch: u64) {
        let mut slot = self.slot(domain).lock();
        if slot.epoch == epoch {
            slot.mode = SafetyMode::Unrestricted;
            slot.epoch += 1;
            info!(%domain, "Operation did not complete; domain unlocked again");
        } else {
            debug!(%domain, "Mode changed while the operation ran; leaving it as is");
        }
    }
}

fn assess(domain: SafetyDomain, tier: RiskTier, mode: SafetyMode) -> EngineResult<Clearance> {
    match (tier, mode) {
        (RiskTier::Blocked, _) => {
            warn!(%domain, "Blocked operation rejected");
            Err(EngineError::blocked(
                domain,
                "this operation is never permitted, whatever the safety mode",
            ))
        }
        (RiskTier::Safe, _) => Ok(Clearance::allowed(domain, tier, mode)),
        (RiskTier::Write | RiskTier::Destructive, SafetyMode::Restricted) => {
            debug!(%domain, %tier, "Operation rejected in restricted mode");
            Err(EngineError::mode_violation(domain, tier, mode))
        }
        (RiskTier::Write, SafetyMode::Unrestricted) => Ok(Clearance::allowed(domain, tier, mode)),
        (RiskTier::Destructive, SafetyMode::Unrestricted) => Ok(Clearance::needs_confirmation(domain, tier, mode)),
    }
}
