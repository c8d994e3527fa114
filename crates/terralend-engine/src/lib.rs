//! Terralend loan lifecycle engine.
//!
//! Borrowers post requests collateralized at exactly twice face value,
//! lenders fund them into active loans, interest accrues against an
//! external price feed, and loans resolve by repayment or expiry
//! liquidation. The engine is an embeddable library: hosts wire in a
//! [`Clock`], a [`SettlementRail`], and optionally a [`PriceSource`], then
//! drive one state-changing operation at a time.

#![deny(unsafe_code)]

pub mod clock;
pub mod engine;
pub mod oracle;
pub mod rails;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    EngineConfig, LendingEngine, LiquidationOutcome, RepaymentOutcome, MAX_FEE_BP,
    MAX_INTEREST_RATE_PCT,
};
pub use oracle::{PriceOracle, PriceSource, RealEstateIndexSource};
pub use rails::{InMemoryRail, LegKind, RailReceipt, SettlementRail, TransferLeg};
pub use store::{LedgerSnapshot, LedgerStore};
