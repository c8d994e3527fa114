//! Append-only event journal entries.
//!
//! The journal is the only channel external observers use to reconstruct
//! ledger history; no row-level change feed is exposed. Events are part of
//! ledger state, so an operation that rolls back leaves no event behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LoanId, PartyId, RequestId};
use crate::money::{AssetAmount, Price};

/// One journal entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: String,
    pub recorded_at: DateTime<Utc>,
    pub kind: LedgerEventKind,
}

impl LedgerEvent {
    pub fn new(kind: LedgerEventKind, recorded_at: DateTime<Utc>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            recorded_at,
            kind,
        }
    }
}

/// What happened, with the affected ids and monetary fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    RequestCreated {
        request_id: RequestId,
        borrower: PartyId,
        amount: AssetAmount,
        stake: AssetAmount,
        duration_days: u32,
        rate_pct: u8,
    },
    LoanFunded {
        loan_id: LoanId,
        request_id: RequestId,
        borrower: PartyId,
        lender: PartyId,
        amount: AssetAmount,
        stake: AssetAmount,
        initial_price: Price,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    LoanRepaid {
        loan_id: LoanId,
        borrower: PartyId,
        lender: PartyId,
        amount_due: AssetAmount,
        stake_returned: AssetAmount,
        refund: AssetAmount,
    },
    LoanLiquidated {
        loan_id: LoanId,
        caller: PartyId,
        lender: PartyId,
        bonus: AssetAmount,
        lender_share: AssetAmount,
    },
    OwnershipTransferred {
        previous_owner: PartyId,
        new_owner: PartyId,
    },
    PauseSet {
        paused: bool,
    },
    PenaltyRateUpdated {
        penalty_bp: u16,
    },
    LiquidationBonusUpdated {
        liquidation_bonus_bp: u16,
    },
    StalenessBoundUpdated {
        bound_secs: u64,
    },
    PriceFeedUpdated {
        configured: bool,
    },
    FixedPriceUpdated {
        price: Price,
    },
    IndexSourceUpdated {
        provider: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_unique_ids() {
        let kind = LedgerEventKind::PauseSet { paused: true };
        let a = LedgerEvent::new(kind.clone(), Utc::now());
        let b = LedgerEvent::new(kind, Utc::now());
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn kinds_roundtrip_through_serde() {
        let event = LedgerEvent::new(
            LedgerEventKind::LoanLiquidated {
                loan_id: LoanId(4),
                caller: PartyId::new("keeper"),
                lender: PartyId::new("lender"),
                bonus: AssetAmount::new(33),
                lender_share: AssetAmount::new(633),
            },
            Utc::now(),
        );

        let encoded = serde_json::to_string(&event).unwrap();
        assert_eq!(
            serde_json::from_str::<LedgerEvent>(&encoded).unwrap(),
            event
        );
    }
}
