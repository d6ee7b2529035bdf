//! The actor's two scalar resources: vitality and currency.
//!
//! Both are mutated only through explicit deltas, and every delta lands in an
//! append-only audit log -- including the compensating deltas produced by
//! undo, so the log records what actually happened rather than a cleaned-up
//! history. Vitality clamps at zero (the adversary's activation edge);
//! balance is protected by an affordability guard and never goes negative
//! through this API.

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Vitality a freshly rested actor starts with.
pub const INITIAL_VITALITY: i64 = 50;
/// Hard ceiling on vitality, whatever gets eaten.
pub const MAX_VITALITY: i64 = 100;
/// Starting currency balance.
pub const INITIAL_BALANCE: i64 = 100;

// ---------------------------------------------------------------------------
// LedgerDelta
// ---------------------------------------------------------------------------

/// One audited mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    /// Which resource moved, and in which direction.
    pub kind: DeltaKind,
    /// Magnitude actually applied (after clamping), always non-negative.
    pub amount: i64,
}

/// Direction and resource of a [`LedgerDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaKind {
    /// Currency in.
    Credit,
    /// Currency out.
    Debit,
    /// Vitality lost.
    VitalityDrain,
    /// Vitality regained.
    VitalityGain,
}

// ---------------------------------------------------------------------------
// ResourceLedger
// ---------------------------------------------------------------------------

/// The depletable vitality counter and currency balance attached to the
/// player actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLedger {
    vitality: i64,
    balance: i64,
    full_vitality: i64,
    audit: Vec<LedgerDelta>,
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLedger {
    /// A ledger at the standard starting values.
    pub fn new() -> Self {
        Self::with_values(INITIAL_VITALITY, INITIAL_BALANCE)
    }

    /// A ledger with explicit starting values. `vitality` is also the value
    /// that [`restore_vitality`](Self::restore_vitality) refills to.
    pub fn with_values(vitality: i64, balance: i64) -> Self {
        Self {
            vitality,
            balance,
            full_vitality: vitality,
            audit: Vec::new(),
        }
    }

    /// Current vitality.
    pub fn vitality(&self) -> i64 {
        self.vitality
    }

    /// Current balance.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Whether vitality has hit zero -- the adversary's activation edge.
    pub fn is_depleted(&self) -> bool {
        self.vitality == 0
    }

    /// The append-only audit trail, oldest first.
    pub fn audit(&self) -> &[LedgerDelta] {
        &self.audit
    }

    /// Whether a debit of `amount` would succeed.
    pub fn can_afford(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Remove currency. Guarded: fails without mutation when the balance
    /// cannot cover the amount. A zero debit is a no-op and is not audited.
    pub fn debit(&mut self, amount: i64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.audit.push(LedgerDelta {
            kind: DeltaKind::Debit,
            amount,
        });
        Ok(())
    }

    /// Add currency. A zero credit is a no-op and is not audited.
    pub fn credit(&mut self, amount: i64) {
        if amount == 0 {
            return;
        }
        self.balance += amount;
        self.audit.push(LedgerDelta {
            kind: DeltaKind::Credit,
            amount,
        });
    }

    /// Drain vitality, clamping at zero. Returns the new value.
    pub fn drain_vitality(&mut self, amount: i64) -> i64 {
        if amount == 0 {
            return self.vitality;
        }
        let applied = amount.min(self.vitality);
        self.vitality -= applied;
        self.audit.push(LedgerDelta {
            kind: DeltaKind::VitalityDrain,
            amount: applied,
        });
        self.vitality
    }

    /// Regain vitality, clamping at [`MAX_VITALITY`]. Returns the new value.
    pub fn gain_vitality(&mut self, amount: i64) -> i64 {
        if amount == 0 {
            return self.vitality;
        }
        let applied = amount.min(MAX_VITALITY - self.vitality);
        self.vitality += applied;
        self.audit.push(LedgerDelta {
            kind: DeltaKind::VitalityGain,
            amount: applied,
        });
        self.vitality
    }

    /// Refill vitality to its full value (the actor slept).
    pub fn restore_vitality(&mut self) {
        let deficit = self.full_vitality - self.vitality;
        if deficit > 0 {
            self.vitality = self.full_vitality;
            self.audit.push(LedgerDelta {
                kind: DeltaKind::VitalityGain,
                amount: deficit,
            });
        }
    }

    /// Force vitality back to an exact prior value, auditing the difference
    /// as a compensating delta. Used by undo, which must restore clamped
    /// drains precisely.
    pub fn rewind_vitality(&mut self, prev: i64) {
        let diff = prev - self.vitality;
        if diff > 0 {
            self.audit.push(LedgerDelta {
                kind: DeltaKind::VitalityGain,
                amount: diff,
            });
        } else if diff < 0 {
            self.audit.push(LedgerDelta {
                kind: DeltaKind::VitalityDrain,
                amount: -diff,
            });
        }
        self.vitality = prev;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
