//! Outbound settlement rails.
//!
//! All value leaving engine escrow moves through a [`SettlementRail`] as a
//! batch of legs. A batch settles atomically: the rail either applies every
//! leg or fails the whole batch without observable side effects. The engine
//! commits ledger state before driving the rail and compensates with a
//! rollback if the batch fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terralend_types::{AssetAmount, LendError, PartyId};

/// What a transfer leg settles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    /// Principal paid out to the borrower at funding.
    Principal,
    /// Repayment proceeds paid to the lender.
    Payout,
    /// Collateral stake returned to the borrower.
    StakeReturn,
    /// Excess repayment value refunded to the borrower.
    Refund,
    /// Liquidation incentive paid to the caller.
    LiquidationBonus,
    /// Forfeited collateral remainder paid to the lender.
    LenderShare,
}

/// One outbound transfer from engine escrow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub to: PartyId,
    pub amount: AssetAmount,
    pub kind: LegKind,
}

/// Proof of a settled batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailReceipt {
    pub settlement_id: String,
    pub rail: String,
    pub settled_at: DateTime<Utc>,
}

/// Pluggable outbound value rail.
///
/// Implementations map legs to external money movement while preserving
/// batch atomicity. A failure must be total: no leg of a failed batch may
/// have moved value.
pub trait SettlementRail: Send + Sync {
    fn rail(&self) -> &'static str;

    fn settle(&self, legs: &[TransferLeg]) -> Result<RailReceipt, LendError>;
}

/// In-memory rail used for tests, local demos, and embedding.
///
/// Records every settled leg and supports failure injection to exercise
/// the engine's rollback path.
#[derive(Default)]
pub struct InMemoryRail {
    settled: Mutex<Vec<TransferLeg>>,
    failing: AtomicBool,
}

impl InMemoryRail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent batch fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every leg settled so far, in settlement order.
    pub fn settled(&self) -> Vec<TransferLeg> {
        self.settled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Total amount paid to a party across all settled legs.
    pub fn paid_to(&self, party: &PartyId) -> AssetAmount {
        let total = self
            .settled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|leg| &leg.to == party)
            .map(|leg| leg.amount.raw())
            .sum();
        AssetAmount::new(total)
    }
}

impl SettlementRail for InMemoryRail {
    fn rail(&self) -> &'static str {
        "in-memory"
    }

    fn settle(&self, legs: &[TransferLeg]) -> Result<RailReceipt, LendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LendError::TransferFailed {
                rail: self.rail().to_string(),
                reason: "injected failure".to_string(),
            });
        }

        self.settled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(legs);

        Ok(RailReceipt {
            settlement_id: uuid::Uuid::new_v4().to_string(),
            rail: self.rail().to_string(),
            settled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(to: &str, amount: u128, kind: LegKind) -> TransferLeg {
        TransferLeg {
            to: PartyId::new(to),
            amount: AssetAmount::new(amount),
            kind,
        }
    }

    #[test]
    fn settles_batches_and_tallies_per_party() {
        let rail = InMemoryRail::new();
        rail.settle(&[
            leg("lender", 105, LegKind::Payout),
            leg("borrower", 200, LegKind::StakeReturn),
            leg("borrower", 5, LegKind::Refund),
        ])
        .unwrap();

        assert_eq!(rail.settled().len(), 3);
        assert_eq!(rail.paid_to(&PartyId::new("borrower")), AssetAmount::new(205));
        assert_eq!(rail.paid_to(&PartyId::new("lender")), AssetAmount::new(105));
    }

    #[test]
    fn injected_failure_settles_nothing() {
        let rail = InMemoryRail::new();
        rail.set_failing(true);

        let err = rail
            .settle(&[leg("borrower", 10, LegKind::Principal)])
            .unwrap_err();
        assert!(matches!(err, LendError::TransferFailed { .. }));
        assert!(rail.settled().is_empty());

        rail.set_failing(false);
        assert!(rail.settle(&[leg("borrower", 10, LegKind::Principal)]).is_ok());
    }
}
