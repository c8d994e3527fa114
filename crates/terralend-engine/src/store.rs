//! The ledger store.
//!
//! Owns every persistent entity: the request and loan arenas (sequential
//! ids starting at 0, never reused, never deleted), the per-party loan
//! index lists, and the event journal. State-transition checks for funding
//! and settlement run under the same write acquisition as the mutation
//! itself, so a transition can never be observed half-applied.
//!
//! Settlement paths take a snapshot before mutating; the engine restores
//! it when an outbound transfer batch fails, which rolls back the record
//! mutation, the index appends, and the event in one step.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use terralend_types::{
    ActiveLoan, AssetAmount, LedgerEvent, LedgerEventKind, LendError, LoanId, LoanRequest, PartyId,
    Price, RequestId, RequestTerms,
};

#[derive(Clone, Default, Debug)]
struct LedgerState {
    requests: Vec<LoanRequest>,
    loans: Vec<ActiveLoan>,
    borrower_loans: HashMap<PartyId, Vec<LoanId>>,
    lender_loans: HashMap<PartyId, Vec<LoanId>>,
    events: Vec<LedgerEvent>,
}

impl LedgerState {
    fn record(&mut self, kind: LedgerEventKind, now: DateTime<Utc>) {
        self.events.push(LedgerEvent::new(kind, now));
    }
}

/// Opaque pre-mutation copy of ledger state, used to compensate a failed
/// settlement.
#[derive(Debug)]
pub struct LedgerSnapshot(LedgerState);

/// In-memory ledger store used by the lifecycle engine.
#[derive(Default)]
pub struct LedgerStore {
    inner: RwLock<LedgerState>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- mutations (engine-internal) -------------------------------------

    pub(crate) fn append_request(
        &self,
        borrower: &PartyId,
        terms: &RequestTerms,
        stake: AssetAmount,
        now: DateTime<Utc>,
    ) -> Result<RequestId, LendError> {
        let mut state = self.write()?;
        let request_id = RequestId(state.requests.len() as u64);

        state.requests.push(LoanRequest {
            request_id,
            borrower: borrower.clone(),
            amount: terms.amount,
            duration_days: terms.duration_days,
            rate_pct: terms.rate_pct,
            is_active: true,
            stake,
            metadata_commitment: terms.metadata_commitment,
            metadata_ref: terms.metadata_ref.clone(),
            property_commitment: terms.property_commitment,
            property_ref: terms.property_ref.clone(),
            property_units: terms.property_units,
            created_at: now,
        });
        state.record(
            LedgerEventKind::RequestCreated {
                request_id,
                borrower: borrower.clone(),
                amount: terms.amount,
                stake,
                duration_days: terms.duration_days,
                rate_pct: terms.rate_pct,
            },
            now,
        );

        Ok(request_id)
    }

    /// Consume an active request into a new loan.
    ///
    /// Validates and mutates under one write acquisition: the request is
    /// deactivated exactly once, the loan id is allocated, and both party
    /// indexes are appended. Returns the new loan and the pre-mutation
    /// snapshot for rollback.
    pub(crate) fn fund(
        &self,
        request_id: RequestId,
        lender: &PartyId,
        supplied: AssetAmount,
        now: DateTime<Utc>,
        price: Price,
    ) -> Result<(ActiveLoan, LedgerSnapshot), LendError> {
        let mut state = self.write()?;

        let request = state
            .requests
            .get(request_id.0 as usize)
            .filter(|request| request.is_active)
            .ok_or(LendError::RequestNotActive(request_id))?;
        if supplied != request.amount {
            return Err(LendError::AmountMismatch {
                supplied,
                required: request.amount,
            });
        }

        let snapshot = LedgerSnapshot(state.clone());

        let loan_id = LoanId(state.loans.len() as u64);
        let request = &mut state.requests[request_id.0 as usize];
        request.is_active = false;

        let loan = ActiveLoan {
            loan_id,
            request_id,
            borrower: request.borrower.clone(),
            lender: lender.clone(),
            amount: request.amount,
            stake: request.stake,
            starts_at: now,
            ends_at: now + Duration::days(request.duration_days as i64),
            rate_pct: request.rate_pct,
            initial_price: price,
            property_units: request.property_units,
            is_repaid: false,
        };

        state.loans.push(loan.clone());
        state
            .borrower_loans
            .entry(loan.borrower.clone())
            .or_default()
            .push(loan_id);
        state
            .lender_loans
            .entry(lender.clone())
            .or_default()
            .push(loan_id);
        state.record(
            LedgerEventKind::LoanFunded {
                loan_id,
                request_id,
                borrower: loan.borrower.clone(),
                lender: lender.clone(),
                amount: loan.amount,
                stake: loan.stake,
                initial_price: price,
                starts_at: loan.starts_at,
                ends_at: loan.ends_at,
            },
            now,
        );

        Ok((loan, snapshot))
    }

    /// Mark a loan repaid and journal the settlement amounts.
    pub(crate) fn settle_repaid(
        &self,
        loan_id: LoanId,
        due: AssetAmount,
        refund: AssetAmount,
        now: DateTime<Utc>,
    ) -> Result<(ActiveLoan, LedgerSnapshot), LendError> {
        let mut state = self.write()?;

        let loan = state
            .loans
            .get(loan_id.0 as usize)
            .ok_or(LendError::UnknownLoan(loan_id))?;
        if loan.is_repaid {
            return Err(LendError::AlreadyRepaid(loan_id));
        }

        let snapshot = LedgerSnapshot(state.clone());

        let loan = &mut state.loans[loan_id.0 as usize];
        loan.is_repaid = true;
        let settled = loan.clone();

        state.record(
            LedgerEventKind::LoanRepaid {
                loan_id,
                borrower: settled.borrower.clone(),
                lender: settled.lender.clone(),
                amount_due: due,
                stake_returned: settled.stake,
                refund,
            },
            now,
        );

        Ok((settled, snapshot))
    }

    /// Mark a loan liquidated and journal the collateral split.
    pub(crate) fn settle_liquidated(
        &self,
        loan_id: LoanId,
        caller: &PartyId,
        bonus: AssetAmount,
        lender_share: AssetAmount,
        now: DateTime<Utc>,
    ) -> Result<(ActiveLoan, LedgerSnapshot), LendError> {
        let mut state = self.write()?;

        let loan = state
            .loans
            .get(loan_id.0 as usize)
            .ok_or(LendError::UnknownLoan(loan_id))?;
        if loan.is_repaid {
            return Err(LendError::AlreadyRepaid(loan_id));
        }

        let snapshot = LedgerSnapshot(state.clone());

        let loan = &mut state.loans[loan_id.0 as usize];
        loan.is_repaid = true;
        let settled = loan.clone();

        state.record(
            LedgerEventKind::LoanLiquidated {
                loan_id,
                caller: caller.clone(),
                lender: settled.lender.clone(),
                bonus,
                lender_share,
            },
            now,
        );

        Ok((settled, snapshot))
    }

    /// Restore the pre-mutation state captured by a settlement path.
    pub(crate) fn restore(&self, snapshot: LedgerSnapshot) -> Result<(), LendError> {
        *self.write()? = snapshot.0;
        Ok(())
    }

    pub(crate) fn record_admin_event(
        &self,
        kind: LedgerEventKind,
        now: DateTime<Utc>,
    ) -> Result<(), LendError> {
        let mut state = self.write()?;
        state.record(kind, now);
        Ok(())
    }

    // -- queries ---------------------------------------------------------

    pub fn request(&self, request_id: RequestId) -> Result<Option<LoanRequest>, LendError> {
        Ok(self.read()?.requests.get(request_id.0 as usize).cloned())
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<Option<ActiveLoan>, LendError> {
        Ok(self.read()?.loans.get(loan_id.0 as usize).cloned())
    }

    /// All still-active requests, scanned over the full id range.
    pub fn pending_requests(&self) -> Result<Vec<(RequestId, LoanRequest)>, LendError> {
        Ok(self
            .read()?
            .requests
            .iter()
            .filter(|request| request.is_active)
            .map(|request| (request.request_id, request.clone()))
            .collect())
    }

    /// All not-yet-settled loans, scanned over the full id range.
    pub fn open_loans(&self) -> Result<Vec<(LoanId, ActiveLoan)>, LendError> {
        Ok(self
            .read()?
            .loans
            .iter()
            .filter(|loan| !loan.is_repaid)
            .map(|loan| (loan.loan_id, loan.clone()))
            .collect())
    }

    /// A borrower's full request history, funded requests included.
    pub fn requests_by_borrower(
        &self,
        borrower: &PartyId,
    ) -> Result<Vec<(RequestId, LoanRequest)>, LendError> {
        Ok(self
            .read()?
            .requests
            .iter()
            .filter(|request| &request.borrower == borrower)
            .map(|request| (request.request_id, request.clone()))
            .collect())
    }

    /// Historical loan ids for a borrower; settled loans stay listed.
    pub fn borrower_loan_ids(&self, borrower: &PartyId) -> Result<Vec<LoanId>, LendError> {
        Ok(self
            .read()?
            .borrower_loans
            .get(borrower)
            .cloned()
            .unwrap_or_default())
    }

    /// Historical loan ids for a lender; settled loans stay listed.
    pub fn lender_loan_ids(&self, lender: &PartyId) -> Result<Vec<LoanId>, LendError> {
        Ok(self
            .read()?
            .lender_loans
            .get(lender)
            .cloned()
            .unwrap_or_default())
    }

    /// Snapshot of the event journal.
    pub fn events(&self) -> Result<Vec<LedgerEvent>, LendError> {
        Ok(self.read()?.events.clone())
    }

    pub fn request_count(&self) -> Result<u64, LendError> {
        Ok(self.read()?.requests.len() as u64)
    }

    pub fn loan_count(&self) -> Result<u64, LendError> {
        Ok(self.read()?.loans.len() as u64)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LendError> {
        self.inner
            .read()
            .map_err(|_| LendError::StoreUnavailable("ledger read lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LendError> {
        self.inner
            .write()
            .map_err(|_| LendError::StoreUnavailable("ledger write lock poisoned".into()))
    }
}
