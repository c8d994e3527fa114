use thiserror::Error;

use crate::ids::{LoanId, PartyId, RequestId};
use crate::money::AssetAmount;

/// Error taxonomy shared by every Terralend operation.
///
/// Validation errors are rejected before any state change; state-conflict
/// errors leave the ledger untouched; oracle and transfer errors abort the
/// whole enclosing operation. Nothing is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LendError {
    // -- validation ------------------------------------------------------
    #[error("loan amount must be greater than zero")]
    InvalidAmount,

    #[error("loan duration must be greater than zero days")]
    InvalidDuration,

    #[error("interest rate {0}% is outside the allowed 1..=7% range")]
    InvalidRate(u8),

    #[error("posted stake {supplied} does not equal twice the loan amount (expected {required})")]
    CollateralMismatch {
        supplied: AssetAmount,
        required: AssetAmount,
    },

    #[error("new owner identity must not be empty")]
    InvalidOwner,

    #[error("{0} basis points exceed the 5000 bp cap")]
    BasisPointsTooHigh(u16),

    // -- state conflict --------------------------------------------------
    #[error("request {0} does not exist or is no longer active")]
    RequestNotActive(RequestId),

    #[error("funding amount {supplied} does not equal the requested principal {required}")]
    AmountMismatch {
        supplied: AssetAmount,
        required: AssetAmount,
    },

    #[error("loan {0} does not exist")]
    UnknownLoan(LoanId),

    #[error("loan {0} is already settled")]
    AlreadyRepaid(LoanId),

    #[error("loan {0} has not passed its end date")]
    NotExpired(LoanId),

    #[error("caller {caller} is not the borrower of loan {loan}")]
    NotBorrower { caller: PartyId, loan: LoanId },

    #[error("reentrant call rejected")]
    Reentrant,

    #[error("engine is paused")]
    Paused,

    #[error("caller {0} is not the owner")]
    NotOwner(PartyId),

    // -- oracle ----------------------------------------------------------
    #[error("price source returned a non-positive answer: {0}")]
    InvalidPrice(i128),

    #[error("price reading is {age_secs}s old, exceeding the {bound_secs}s staleness bound")]
    StalePrice { age_secs: i64, bound_secs: i64 },

    #[error("real-estate index returned a non-positive value: {0}")]
    InvalidIndexValue(i128),

    #[error("no real-estate index source configured")]
    NoIndexSource,

    // -- payment ---------------------------------------------------------
    #[error("supplied value {supplied} is below the amount due {due}")]
    InsufficientPayment {
        supplied: AssetAmount,
        due: AssetAmount,
    },

    #[error("settlement rail '{rail}' failed: {reason}")]
    TransferFailed { rail: String, reason: String },

    // -- infrastructure --------------------------------------------------
    #[error("fixed-point arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),
}
