//! The loan lifecycle engine.
//!
//! One state-changing operation runs at a time against the shared ledger;
//! the entered flag rejects reentrant calls arriving from inside an
//! in-flight settlement. Every settlement path follows the same ordering
//! discipline: validate, commit ledger state and the event, then drive the
//! settlement rail, compensating with a snapshot restore if the rail batch
//! fails. By the time any external code runs, the ledger already reflects
//! the terminal state, so a reentrant attempt sees `is_active`/`is_repaid`
//! and is rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use terralend_types::{
    ActiveLoan, AssetAmount, IndexReading, LedgerEventKind, LendError, LoanId, PartyId, Price,
    RequestId, RequestTerms, SCALE,
};

use crate::clock::{Clock, SystemClock};
use crate::oracle::{PriceOracle, PriceSource, RealEstateIndexSource};
use crate::rails::{LegKind, RailReceipt, SettlementRail, TransferLeg};
use crate::store::LedgerStore;

/// Hard cap on the proposed interest rate, in integer percent.
pub const MAX_INTEREST_RATE_PCT: u8 = 7;

/// Hard cap on the penalty and liquidation-bonus parameters, in basis
/// points (50%).
pub const MAX_FEE_BP: u16 = 5_000;

const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;

/// Operator-tunable engine parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub owner: PartyId,
    /// Overdue-repayment penalty in basis points of the due value.
    pub penalty_bp: u16,
    /// Liquidation incentive in basis points of the forfeited stake.
    pub liquidation_bonus_bp: u16,
    /// Price served while no feed is configured. Must be positive.
    pub fixed_price: Price,
    /// Maximum tolerated feed-reading age in seconds.
    pub staleness_bound_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            owner: PartyId::new("operator"),
            penalty_bp: 1_000,
            liquidation_bonus_bp: 500,
            fixed_price: Price::new(2_000 * SCALE),
            staleness_bound_secs: PriceOracle::DEFAULT_STALENESS_SECS,
        }
    }
}

/// Result of a successful repayment settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentOutcome {
    pub amount_due: AssetAmount,
    pub refund: AssetAmount,
    pub receipt: RailReceipt,
}

/// Result of a successful liquidation settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    pub bonus: AssetAmount,
    pub lender_share: AssetAmount,
    pub receipt: RailReceipt,
}

struct GuardState {
    owner: PartyId,
    paused: bool,
    penalty_bp: u16,
    liquidation_bonus_bp: u16,
}

/// Clears the entered flag on every exit path, success or failure.
struct ReentryGuard<'a> {
    entered: &'a AtomicBool,
}

impl<'a> ReentryGuard<'a> {
    fn enter(entered: &'a AtomicBool) -> Result<Self, LendError> {
        entered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| LendError::Reentrant)?;
        Ok(Self { entered })
    }
}

impl Drop for ReentryGuard<'_> {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::SeqCst);
    }
}

/// The lending engine: lifecycle state machine, guard, and administration.
pub struct LendingEngine {
    store: LedgerStore,
    oracle: PriceOracle,
    index_source: RwLock<Option<Arc<dyn RealEstateIndexSource>>>,
    rail: Arc<dyn SettlementRail>,
    clock: Arc<dyn Clock>,
    guard: RwLock<GuardState>,
    entered: AtomicBool,
}

impl LendingEngine {
    pub fn new(config: EngineConfig, rail: Arc<dyn SettlementRail>) -> Result<Self, LendError> {
        Self::with_clock(config, rail, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        rail: Arc<dyn SettlementRail>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LendError> {
        if config.owner.is_empty() {
            return Err(LendError::InvalidOwner);
        }
        if config.penalty_bp > MAX_FEE_BP {
            return Err(LendError::BasisPointsTooHigh(config.penalty_bp));
        }
        if config.liquidation_bonus_bp > MAX_FEE_BP {
            return Err(LendError::BasisPointsTooHigh(config.liquidation_bonus_bp));
        }
        if config.fixed_price.is_zero() {
            return Err(LendError::InvalidPrice(0));
        }

        Ok(Self {
            store: LedgerStore::new(),
            oracle: PriceOracle::new(config.fixed_price, config.staleness_bound_secs),
            index_source: RwLock::new(None),
            rail,
            clock,
            guard: RwLock::new(GuardState {
                owner: config.owner,
                paused: false,
                penalty_bp: config.penalty_bp,
                liquidation_bonus_bp: config.liquidation_bonus_bp,
            }),
            entered: AtomicBool::new(false),
        })
    }

    /// Read-only access to the ledger store and its query layer.
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    // -- lifecycle -------------------------------------------------------

    /// Post a new over-collateralized loan request.
    ///
    /// The supplied stake must equal exactly twice the principal; more is
    /// rejected the same as less.
    pub fn create_request(
        &self,
        borrower: &PartyId,
        terms: &RequestTerms,
        supplied_stake: AssetAmount,
    ) -> Result<RequestId, LendError> {
        self.ensure_not_paused()?;
        if terms.amount.is_zero() {
            return Err(LendError::InvalidAmount);
        }
        if terms.duration_days == 0 {
            return Err(LendError::InvalidDuration);
        }
        if terms.rate_pct == 0 || terms.rate_pct > MAX_INTEREST_RATE_PCT {
            return Err(LendError::InvalidRate(terms.rate_pct));
        }
        let required = terms.amount.required_stake()?;
        if supplied_stake != required {
            return Err(LendError::CollateralMismatch {
                supplied: supplied_stake,
                required,
            });
        }

        let now = self.clock.now();
        let request_id = self.store.append_request(borrower, terms, supplied_stake, now)?;
        info!(
            request_id = %request_id,
            borrower = %borrower,
            amount = %terms.amount,
            stake = %supplied_stake,
            duration_days = terms.duration_days,
            rate_pct = terms.rate_pct,
            "loan request created"
        );
        Ok(request_id)
    }

    /// Fund an active request into a loan.
    ///
    /// Captures the oracle price at funding time, stamps the term window,
    /// appends both party indexes, then pays the principal out to the
    /// borrower. A failed payout rolls the funding back entirely.
    pub fn fund_request(
        &self,
        lender: &PartyId,
        request_id: RequestId,
        supplied_amount: AssetAmount,
    ) -> Result<LoanId, LendError> {
        let _entry = ReentryGuard::enter(&self.entered)?;
        self.ensure_not_paused()?;

        let now = self.clock.now();
        let price = self.oracle.current_price(now)?;
        let (loan, snapshot) = self
            .store
            .fund(request_id, lender, supplied_amount, now, price)?;

        let legs = [TransferLeg {
            to: loan.borrower.clone(),
            amount: loan.amount,
            kind: LegKind::Principal,
        }];
        if let Err(error) = self.rail.settle(&legs) {
            warn!(
                loan_id = %loan.loan_id,
                request_id = %request_id,
                error = %error,
                "principal payout failed, rolling back funding"
            );
            self.store.restore(snapshot)?;
            return Err(error);
        }

        info!(
            loan_id = %loan.loan_id,
            request_id = %request_id,
            lender = %lender,
            borrower = %loan.borrower,
            initial_price = %price,
            ends_at = %loan.ends_at,
            "request funded"
        );
        Ok(loan.loan_id)
    }

    /// Amount currently owed on a loan, in collateral-asset units.
    ///
    /// Principal and accrued interest are valued at the price captured at
    /// funding, then converted back at the current price, so the cost of
    /// repayment moves inversely with the collateral price. The overdue
    /// penalty is applied at settlement, not here.
    pub fn amount_due(&self, loan_id: LoanId) -> Result<AssetAmount, LendError> {
        let now = self.clock.now();
        let loan = self.loan_or_err(loan_id)?;
        if loan.is_repaid {
            return Err(LendError::AlreadyRepaid(loan_id));
        }
        let price = self.oracle.current_price(now)?;
        self.base_due(&loan, now, price)
    }

    /// Settle a loan by repayment.
    pub fn repay(
        &self,
        caller: &PartyId,
        loan_id: LoanId,
        supplied_value: AssetAmount,
    ) -> Result<RepaymentOutcome, LendError> {
        let _entry = ReentryGuard::enter(&self.entered)?;
        self.ensure_not_paused()?;
        if supplied_value.is_zero() {
            return Err(LendError::InvalidAmount);
        }

        let now = self.clock.now();
        let loan = self.loan_or_err(loan_id)?;
        if &loan.borrower != caller {
            return Err(LendError::NotBorrower {
                caller: caller.clone(),
                loan: loan_id,
            });
        }
        if loan.is_repaid {
            return Err(LendError::AlreadyRepaid(loan_id));
        }

        let price = self.oracle.current_price(now)?;
        let mut due = self.base_due(&loan, now, price)?;
        if loan.is_expired_at(now) {
            let penalty_bp = self.guard_read()?.penalty_bp;
            due = Self::apply_overdue_penalty(due, price, penalty_bp)?;
            debug!(loan_id = %loan_id, due = %due, penalty_bp, "overdue penalty applied");
        }
        if supplied_value < due {
            return Err(LendError::InsufficientPayment {
                supplied: supplied_value,
                due,
            });
        }
        let refund = supplied_value.checked_sub(due)?;

        let (settled, snapshot) = self.store.settle_repaid(loan_id, due, refund, now)?;

        let mut legs = vec![
            TransferLeg {
                to: settled.lender.clone(),
                amount: due,
                kind: LegKind::Payout,
            },
            TransferLeg {
                to: settled.borrower.clone(),
                amount: settled.stake,
                kind: LegKind::StakeReturn,
            },
        ];
        if !refund.is_zero() {
            legs.push(TransferLeg {
                to: settled.borrower.clone(),
                amount: refund,
                kind: LegKind::Refund,
            });
        }

        match self.rail.settle(&legs) {
            Ok(receipt) => {
                info!(
                    loan_id = %loan_id,
                    borrower = %caller,
                    due = %due,
                    refund = %refund,
                    "loan repaid"
                );
                Ok(RepaymentOutcome {
                    amount_due: due,
                    refund,
                    receipt,
                })
            }
            Err(error) => {
                warn!(loan_id = %loan_id, error = %error, "repayment settlement failed, rolling back");
                self.store.restore(snapshot)?;
                Err(error)
            }
        }
    }

    /// Liquidate an expired, unpaid loan.
    ///
    /// Permissionless and intentionally not pause-gated, so positions can
    /// always be exited. The caller earns the configured bonus share of the
    /// stake; the remainder goes to the lender. Truncation of the bonus
    /// leaves the rounding dust with the lender.
    pub fn liquidate(
        &self,
        caller: &PartyId,
        loan_id: LoanId,
    ) -> Result<LiquidationOutcome, LendError> {
        let _entry = ReentryGuard::enter(&self.entered)?;

        let now = self.clock.now();
        let loan = self.loan_or_err(loan_id)?;
        if loan.is_repaid {
            return Err(LendError::AlreadyRepaid(loan_id));
        }
        if !loan.is_expired_at(now) {
            return Err(LendError::NotExpired(loan_id));
        }

        let bonus_bp = self.guard_read()?.liquidation_bonus_bp;
        let bonus = loan.stake.share_bp(bonus_bp)?;
        let lender_share = loan.stake.checked_sub(bonus)?;

        let (settled, snapshot) =
            self.store
                .settle_liquidated(loan_id, caller, bonus, lender_share, now)?;

        let legs = [
            TransferLeg {
                to: caller.clone(),
                amount: bonus,
                kind: LegKind::LiquidationBonus,
            },
            TransferLeg {
                to: settled.lender.clone(),
                amount: lender_share,
                kind: LegKind::LenderShare,
            },
        ];
        match self.rail.settle(&legs) {
            Ok(receipt) => {
                info!(
                    loan_id = %loan_id,
                    caller = %caller,
                    bonus = %bonus,
                    lender_share = %lender_share,
                    "loan liquidated"
                );
                Ok(LiquidationOutcome {
                    bonus,
                    lender_share,
                    receipt,
                })
            }
            Err(error) => {
                warn!(loan_id = %loan_id, error = %error, "liquidation settlement failed, rolling back");
                self.store.restore(snapshot)?;
                Err(error)
            }
        }
    }

    // -- administration --------------------------------------------------

    pub fn owner(&self) -> Result<PartyId, LendError> {
        Ok(self.guard_read()?.owner.clone())
    }

    pub fn is_paused(&self) -> Result<bool, LendError> {
        Ok(self.guard_read()?.paused)
    }

    pub fn transfer_ownership(
        &self,
        caller: &PartyId,
        new_owner: PartyId,
    ) -> Result<(), LendError> {
        if new_owner.is_empty() {
            return Err(LendError::InvalidOwner);
        }
        let mut guard = self.require_owner_mut(caller)?;
        let previous_owner = std::mem::replace(&mut guard.owner, new_owner.clone());
        drop(guard);

        info!(previous_owner = %previous_owner, new_owner = %new_owner, "ownership transferred");
        self.record_admin(LedgerEventKind::OwnershipTransferred {
            previous_owner,
            new_owner,
        })
    }

    pub fn pause(&self, caller: &PartyId) -> Result<(), LendError> {
        self.set_paused(caller, true)
    }

    pub fn unpause(&self, caller: &PartyId) -> Result<(), LendError> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &PartyId, paused: bool) -> Result<(), LendError> {
        let mut guard = self.require_owner_mut(caller)?;
        guard.paused = paused;
        drop(guard);

        info!(paused, "pause flag updated");
        self.record_admin(LedgerEventKind::PauseSet { paused })
    }

    pub fn set_penalty_bp(&self, caller: &PartyId, penalty_bp: u16) -> Result<(), LendError> {
        if penalty_bp > MAX_FEE_BP {
            return Err(LendError::BasisPointsTooHigh(penalty_bp));
        }
        let mut guard = self.require_owner_mut(caller)?;
        guard.penalty_bp = penalty_bp;
        drop(guard);

        info!(penalty_bp, "penalty rate updated");
        self.record_admin(LedgerEventKind::PenaltyRateUpdated { penalty_bp })
    }

    pub fn set_liquidation_bonus_bp(
        &self,
        caller: &PartyId,
        liquidation_bonus_bp: u16,
    ) -> Result<(), LendError> {
        if liquidation_bonus_bp > MAX_FEE_BP {
            return Err(LendError::BasisPointsTooHigh(liquidation_bonus_bp));
        }
        let mut guard = self.require_owner_mut(caller)?;
        guard.liquidation_bonus_bp = liquidation_bonus_bp;
        drop(guard);

        info!(liquidation_bonus_bp, "liquidation bonus updated");
        self.record_admin(LedgerEventKind::LiquidationBonusUpdated {
            liquidation_bonus_bp,
        })
    }

    pub fn set_staleness_bound(&self, caller: &PartyId, bound_secs: u64) -> Result<(), LendError> {
        self.require_owner(caller)?;
        self.oracle.set_staleness_bound(bound_secs)?;

        info!(bound_secs, "staleness bound updated");
        self.record_admin(LedgerEventKind::StalenessBoundUpdated { bound_secs })
    }

    pub fn set_price_feed(
        &self,
        caller: &PartyId,
        source: Arc<dyn PriceSource>,
    ) -> Result<(), LendError> {
        self.require_owner(caller)?;
        self.oracle.set_source(source)?;

        info!("price feed configured");
        self.record_admin(LedgerEventKind::PriceFeedUpdated { configured: true })
    }

    pub fn clear_price_feed(&self, caller: &PartyId) -> Result<(), LendError> {
        self.require_owner(caller)?;
        self.oracle.clear_source()?;

        info!("price feed cleared, serving fixed price");
        self.record_admin(LedgerEventKind::PriceFeedUpdated { configured: false })
    }

    pub fn set_fixed_price(&self, caller: &PartyId, price: Price) -> Result<(), LendError> {
        self.require_owner(caller)?;
        self.oracle.set_fixed_price(price)?;

        info!(price = %price, "fixed price updated");
        self.record_admin(LedgerEventKind::FixedPriceUpdated { price })
    }

    pub fn set_index_source(
        &self,
        caller: &PartyId,
        source: Arc<dyn RealEstateIndexSource>,
    ) -> Result<(), LendError> {
        self.require_owner(caller)?;
        let provider = source.provider().to_string();
        *self
            .index_source
            .write()
            .map_err(|_| LendError::StoreUnavailable("index source lock poisoned".into()))? =
            Some(source);

        info!(provider = %provider, "real-estate index source updated");
        self.record_admin(LedgerEventKind::IndexSourceUpdated { provider })
    }

    /// Latest reading of the configured real-estate index.
    pub fn real_estate_index(&self) -> Result<IndexReading, LendError> {
        let source = self
            .index_source
            .read()
            .map_err(|_| LendError::StoreUnavailable("index source lock poisoned".into()))?
            .clone()
            .ok_or(LendError::NoIndexSource)?;

        let reading = source.latest()?;
        if reading.value <= 0 {
            return Err(LendError::InvalidIndexValue(reading.value));
        }
        Ok(reading)
    }

    // -- internals -------------------------------------------------------

    fn base_due(
        &self,
        loan: &ActiveLoan,
        now: DateTime<Utc>,
        current_price: Price,
    ) -> Result<AssetAmount, LendError> {
        let elapsed_secs = (now - loan.starts_at).num_seconds().max(0) as u128;
        let principal_value = loan.amount.value_at(loan.initial_price)?;
        let interest_value = principal_value.mul_ratio(
            loan.rate_pct as u128 * elapsed_secs,
            SECONDS_PER_YEAR * 100,
        )?;
        principal_value
            .checked_add(interest_value)?
            .into_asset_at(current_price)
    }

    /// Add `penalty_bp` of the due *value* at the current price, so the
    /// penalty stays price-consistent rather than a share of raw units.
    fn apply_overdue_penalty(
        due: AssetAmount,
        price: Price,
        penalty_bp: u16,
    ) -> Result<AssetAmount, LendError> {
        let due_value = due.value_at(price)?;
        let penalty = due_value.share_bp(penalty_bp)?;
        due_value.checked_add(penalty)?.into_asset_at(price)
    }

    fn loan_or_err(&self, loan_id: LoanId) -> Result<ActiveLoan, LendError> {
        self.store.loan(loan_id)?.ok_or(LendError::UnknownLoan(loan_id))
    }

    fn ensure_not_paused(&self) -> Result<(), LendError> {
        if self.guard_read()?.paused {
            return Err(LendError::Paused);
        }
        Ok(())
    }

    fn require_owner(&self, caller: &PartyId) -> Result<(), LendError> {
        if &self.guard_read()?.owner != caller {
            return Err(LendError::NotOwner(caller.clone()));
        }
        Ok(())
    }

    fn require_owner_mut(
        &self,
        caller: &PartyId,
    ) -> Result<RwLockWriteGuard<'_, GuardState>, LendError> {
        let guard = self.guard_write()?;
        if &guard.owner != caller {
            return Err(LendError::NotOwner(caller.clone()));
        }
        Ok(guard)
    }

    fn record_admin(&self, kind: LedgerEventKind) -> Result<(), LendError> {
        self.store.record_admin_event(kind, self.clock.now())
    }

    fn guard_read(&self) -> Result<RwLockReadGuard<'_, GuardState>, LendError> {
        self.guard
            .read()
            .map_err(|_| LendError::StoreUnavailable("guard lock poisoned".into()))
    }

    fn guard_write(&self) -> Result<RwLockWriteGuard<'_, GuardState>, LendError> {
        self.guard
            .write()
            .map_err(|_| LendError::StoreUnavailable("guard lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rails::InMemoryRail;

    #[test]
    fn construction_validates_config() {
        let rail = Arc::new(InMemoryRail::new());

        let config = EngineConfig {
            owner: PartyId::new(""),
            ..EngineConfig::default()
        };
        assert_eq!(
            LendingEngine::new(config, rail.clone()).err(),
            Some(LendError::InvalidOwner)
        );

        let config = EngineConfig {
            penalty_bp: MAX_FEE_BP + 1,
            ..EngineConfig::default()
        };
        assert_eq!(
            LendingEngine::new(config, rail.clone()).err(),
            Some(LendError::BasisPointsTooHigh(MAX_FEE_BP + 1))
        );

        let config = EngineConfig {
            fixed_price: Price::new(0),
            ..EngineConfig::default()
        };
        assert_eq!(
            LendingEngine::new(config, rail).err(),
            Some(LendError::InvalidPrice(0))
        );
    }

    #[test]
    fn admin_operations_are_owner_gated() {
        let engine =
            LendingEngine::new(EngineConfig::default(), Arc::new(InMemoryRail::new())).unwrap();
        let stranger = PartyId::new("stranger");

        assert_eq!(
            engine.pause(&stranger).unwrap_err(),
            LendError::NotOwner(stranger.clone())
        );
        assert_eq!(
            engine.set_penalty_bp(&stranger, 100).unwrap_err(),
            LendError::NotOwner(stranger)
        );
        assert!(!engine.is_paused().unwrap());
    }

    #[test]
    fn ownership_transfer_requires_a_non_empty_target() {
        let engine =
            LendingEngine::new(EngineConfig::default(), Arc::new(InMemoryRail::new())).unwrap();
        let owner = PartyId::new("operator");

        assert_eq!(
            engine
                .transfer_ownership(&owner, PartyId::new(""))
                .unwrap_err(),
            LendError::InvalidOwner
        );

        engine
            .transfer_ownership(&owner, PartyId::new("successor"))
            .unwrap();
        assert_eq!(engine.owner().unwrap(), PartyId::new("successor"));
        assert_eq!(
            engine.pause(&owner).unwrap_err(),
            LendError::NotOwner(owner)
        );
    }

    #[test]
    fn fee_parameters_are_capped() {
        let engine =
            LendingEngine::new(EngineConfig::default(), Arc::new(InMemoryRail::new())).unwrap();
        let owner = PartyId::new("operator");

        assert_eq!(
            engine.set_penalty_bp(&owner, MAX_FEE_BP + 1).unwrap_err(),
            LendError::BasisPointsTooHigh(MAX_FEE_BP + 1)
        );
        assert!(engine.set_penalty_bp(&owner, MAX_FEE_BP).is_ok());
        assert!(engine.set_liquidation_bonus_bp(&owner, 0).is_ok());
    }

    #[test]
    fn index_reads_require_a_configured_source() {
        let engine =
            LendingEngine::new(EngineConfig::default(), Arc::new(InMemoryRail::new())).unwrap();
        assert_eq!(
            engine.real_estate_index().unwrap_err(),
            LendError::NoIndexSource
        );
    }
}
