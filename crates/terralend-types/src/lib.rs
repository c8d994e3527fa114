//! Shared types for the Terralend lending engine.
//!
//! Everything that crosses a component boundary lives here: identifiers,
//! the fixed-point money model, ledger records, the event journal entries,
//! and the single error taxonomy all engine operations report through.

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod ids;
pub mod money;
pub mod records;

pub use error::LendError;
pub use events::{LedgerEvent, LedgerEventKind};
pub use ids::{Commitment, LoanId, PartyId, RequestId};
pub use money::{AssetAmount, Price, UsdValue, BP_DENOMINATOR, FEED_SCALE_FACTOR, SCALE};
pub use records::{ActiveLoan, FeedRound, IndexReading, LoanRequest, RequestTerms};
