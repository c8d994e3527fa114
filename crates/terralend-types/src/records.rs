//! Ledger records and boundary readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Commitment, LoanId, PartyId, RequestId};
use crate::money::{AssetAmount, Price};

/// Borrower-supplied terms of a new loan request.
///
/// The commitments and the property-unit count are recorded opaquely; the
/// engine never verifies them against the referenced off-chain assets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTerms {
    /// Principal in smallest collateral-asset units.
    pub amount: AssetAmount,
    /// Requested duration in whole days.
    pub duration_days: u32,
    /// Annual interest rate as an integer percent.
    pub rate_pct: u8,
    /// Commitment to the encrypted request metadata.
    pub metadata_commitment: Commitment,
    /// Off-chain encrypted metadata reference.
    pub metadata_ref: String,
    /// Commitment to the compliance/appraisal evidence.
    pub property_commitment: Commitment,
    /// Off-chain encrypted evidence reference.
    pub property_ref: String,
    /// Number of property units pledged.
    pub property_units: u32,
}

/// A borrower's proposal awaiting funding, collateralized at exactly twice
/// its face value.
///
/// Immutable once created except for `is_active`, which is cleared exactly
/// once when the request is funded. Requests are never deleted; a funded
/// request remains queryable as history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub request_id: RequestId,
    pub borrower: PartyId,
    pub amount: AssetAmount,
    pub duration_days: u32,
    pub rate_pct: u8,
    pub is_active: bool,
    /// Escrowed collateral, equal to `2 * amount` at creation.
    pub stake: AssetAmount,
    pub metadata_commitment: Commitment,
    pub metadata_ref: String,
    pub property_commitment: Commitment,
    pub property_ref: String,
    pub property_units: u32,
    pub created_at: DateTime<Utc>,
}

/// A funded loan accruing time-based interest until repaid or liquidated.
///
/// The lender is fixed at funding and never changes. Repayment and
/// liquidation share the single terminal `is_repaid` flag; once set it
/// never reverts, which is what makes the two settlements mutually
/// exclusive. The event journal records which of the two happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLoan {
    pub loan_id: LoanId,
    /// The request this loan was funded from.
    pub request_id: RequestId,
    pub borrower: PartyId,
    pub lender: PartyId,
    pub amount: AssetAmount,
    pub stake: AssetAmount,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub rate_pct: u8,
    /// Reference price captured at funding time, 18-decimal fixed point.
    pub initial_price: Price,
    pub property_units: u32,
    pub is_repaid: bool,
}

impl ActiveLoan {
    /// Whether the loan is past its end date at `now` (strictly after).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.ends_at
    }
}

/// One round of an external 8-decimal price feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRound {
    pub round_id: u64,
    /// Price answer with 8 decimals; non-positive answers are invalid.
    pub answer: i128,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub answered_in_round: u64,
}

/// Latest reading of the real-estate index source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReading {
    pub value: i128,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_is_strictly_after_the_end_date() {
        let ends_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let loan = ActiveLoan {
            loan_id: LoanId(0),
            request_id: RequestId(0),
            borrower: PartyId::new("borrower"),
            lender: PartyId::new("lender"),
            amount: AssetAmount::new(10),
            stake: AssetAmount::new(20),
            starts_at: ends_at - chrono::Duration::days(30),
            ends_at,
            rate_pct: 5,
            initial_price: Price::new(crate::money::SCALE),
            property_units: 1,
            is_repaid: false,
        };

        assert!(!loan.is_expired_at(ends_at));
        assert!(loan.is_expired_at(ends_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn records_roundtrip_through_serde() {
        let request = LoanRequest {
            request_id: RequestId(3),
            borrower: PartyId::new("borrower"),
            amount: AssetAmount::new(1_000),
            duration_days: 90,
            rate_pct: 4,
            is_active: true,
            stake: AssetAmount::new(2_000),
            metadata_commitment: Commitment::new([1; 32]),
            metadata_ref: "enc://meta".into(),
            property_commitment: Commitment::new([2; 32]),
            property_ref: "enc://deed".into(),
            property_units: 2,
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap(),
        };

        let encoded = serde_json::to_string(&request).unwrap();
        assert_eq!(
            serde_json::from_str::<LoanRequest>(&encoded).unwrap(),
            request
        );
    }
}
