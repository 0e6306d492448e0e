//! Treasury reserve ledger.
//!
//! Holds fee/stream revenue per token and backs the liquidation engine's
//! bad-debt coverage and the insurance claims path. The per-token
//! invariant `total = allocated + available` holds at all times;
//! `available` only decreases through bad-debt coverage, insurance
//! claims, or a quorum-approved emergency withdrawal.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use ledgerd_core::error::StateConflictKind;
use ledgerd_core::math::MathError;
use ledgerd_core::{Bank, Caller, EventLog, LedgerError, LedgerEvent, LedgerResult, Role};

/// Per-token reserve balances and cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reserve {
    /// Everything the treasury holds of this token.
    pub total: U256,
    /// Earmarked for revenue splitting / streams.
    pub allocated: U256,
    /// Free to cover bad debt, claims, and approved withdrawals.
    pub available: U256,
    /// Lifetime deposits.
    pub total_deposited: U256,
    /// Lifetime bad debt covered.
    pub bad_debt_covered: U256,
    /// Lifetime insurance paid out.
    pub insurance_claimed: U256,
}

/// A pending two-phase emergency withdrawal.
#[derive(Debug, Clone)]
pub struct EmergencyWithdrawal {
    pub id: u64,
    pub token: Address,
    pub to: Address,
    pub amount: U256,
    /// Guardians that approved, de-duplicated.
    pub approvals: Vec<Address>,
    pub executed: bool,
}

/// Fee/stream accounting feeding bad-debt coverage and revenue splits.
pub struct TreasuryLedger {
    reserves: DashMap<Address, Reserve>,
    bank: Arc<Bank>,
    /// Bank account holding treasury funds.
    account: Address,
    /// Approvals required before an emergency withdrawal moves funds.
    guardian_quorum: usize,
    proposals: Mutex<HashMap<u64, EmergencyWithdrawal>>,
    next_proposal_id: Mutex<u64>,
    events: Arc<EventLog>,
}

impl std::fmt::Debug for TreasuryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreasuryLedger")
            .field("account", &self.account)
            .field("reserve_count", &self.reserves.len())
            .field("guardian_quorum", &self.guardian_quorum)
            .finish()
    }
}

impl TreasuryLedger {
    pub fn new(
        bank: Arc<Bank>,
        account: Address,
        guardian_quorum: usize,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            reserves: DashMap::new(),
            bank,
            account,
            guardian_quorum,
            proposals: Mutex::new(HashMap::new()),
            next_proposal_id: Mutex::new(0),
            events,
        }
    }

    /// Bank account holding the treasury funds.
    pub fn account(&self) -> Address {
        self.account
    }

    /// Reserve snapshot for a token.
    pub fn reserve(&self, token: &Address) -> Reserve {
        self.reserves.get(token).map(|r| *r).unwrap_or_default()
    }

    /// Pull `amount` of `token` from `from` into the treasury.
    pub fn deposit(&self, token: Address, from: Address, amount: U256) -> LedgerResult<()> {
        self.bank.transfer(token, from, self.account, amount)?;
        let mut reserve = self.reserves.entry(token).or_default();
        reserve.total = reserve.total.checked_add(amount).ok_or(MathError::Overflow)?;
        reserve.available = reserve
            .available
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        reserve.total_deposited = reserve
            .total_deposited
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        drop(reserve);
        info!(token = %token, from = %from, amount = %amount, "Treasury deposit");
        Ok(())
    }

    /// Deposit several tokens from the same source. Fails on the first
    /// bad leg; prior legs stay applied (each is its own transaction).
    pub fn batch_deposit(
        &self,
        from: Address,
        deposits: &[(Address, U256)],
    ) -> LedgerResult<()> {
        for (token, amount) in deposits {
            self.deposit(*token, from, *amount)?;
        }
        Ok(())
    }

    /// Earmark available funds for revenue streams.
    pub fn allocate(&self, caller: &Caller, token: Address, amount: U256) -> LedgerResult<()> {
        caller.require(Role::TreasuryEngine)?;
        let mut reserve = self
            .reserves
            .get_mut(&token)
            .ok_or(LedgerError::InsufficientBalance {
                token,
                holder: self.account,
            })?;
        if reserve.available < amount {
            return Err(LedgerError::InsufficientBalance {
                token,
                holder: self.account,
            });
        }
        reserve.available -= amount;
        reserve.allocated += amount;
        Ok(())
    }

    /// Return earmarked funds to the available pool.
    pub fn release(&self, caller: &Caller, token: Address, amount: U256) -> LedgerResult<()> {
        caller.require(Role::TreasuryEngine)?;
        let mut reserve = self
            .reserves
            .get_mut(&token)
            .ok_or(LedgerError::InsufficientBalance {
                token,
                holder: self.account,
            })?;
        if reserve.allocated < amount {
            return Err(LedgerError::InsufficientBalance {
                token,
                holder: self.account,
            });
        }
        reserve.allocated -= amount;
        reserve.available += amount;
        Ok(())
    }

    /// Cover a liquidation shortfall from available reserves, paying `to`
    /// (the creditor account). Covers as much of `shortfall` as the
    /// reserve allows and returns the covered amount. Engine-only.
    pub fn cover_bad_debt(
        &self,
        caller: &Caller,
        token: Address,
        to: Address,
        shortfall: U256,
    ) -> LedgerResult<U256> {
        caller.require(Role::TreasuryEngine)?;

        let mut reserve = self.reserves.entry(token).or_default();
        let covered = shortfall.min(reserve.available);
        if covered.is_zero() {
            warn!(token = %token, shortfall = %shortfall, "No reserves available for bad debt");
            return Ok(U256::ZERO);
        }

        self.bank.transfer(token, self.account, to, covered)?;
        reserve.available -= covered;
        reserve.total -= covered;
        reserve.bad_debt_covered = reserve
            .bad_debt_covered
            .checked_add(covered)
            .ok_or(MathError::Overflow)?;
        drop(reserve);

        info!(token = %token, covered = %covered, shortfall = %shortfall, "Bad debt covered");
        self.events.emit(LedgerEvent::BadDebtCovered {
            token,
            amount: covered,
        });
        Ok(covered)
    }

    /// Pay out an approved insurance claim. Restricted to the claims
    /// path; never reachable by end users directly.
    pub fn process_insurance_claim(
        &self,
        caller: &Caller,
        token: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        caller.require(Role::ClaimsProcessor)?;

        let mut reserve = self
            .reserves
            .get_mut(&token)
            .ok_or(LedgerError::InsufficientBalance {
                token,
                holder: self.account,
            })?;
        if reserve.available < amount {
            return Err(LedgerError::InsufficientBalance {
                token,
                holder: self.account,
            });
        }

        self.bank.transfer(token, self.account, to, amount)?;
        reserve.available -= amount;
        reserve.total -= amount;
        reserve.insurance_claimed = reserve
            .insurance_claimed
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        drop(reserve);

        info!(token = %token, to = %to, amount = %amount, "Insurance claim processed");
        Ok(())
    }

    /// Phase one of an emergency withdrawal: record the proposal.
    pub fn propose_emergency_withdrawal(
        &self,
        caller: &Caller,
        token: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<u64> {
        caller.require(Role::Guardian)?;

        let mut next_id = self.next_proposal_id.lock();
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        self.proposals.lock().insert(
            id,
            EmergencyWithdrawal {
                id,
                token,
                to,
                amount,
                approvals: Vec::new(),
                executed: false,
            },
        );
        info!(id, token = %token, to = %to, amount = %amount, "Emergency withdrawal proposed");
        Ok(id)
    }

    /// Phase two: a guardian approves. Double approval by the same
    /// guardian is rejected.
    pub fn approve_emergency_withdrawal(&self, caller: &Caller, id: u64) -> LedgerResult<usize> {
        caller.require(Role::Guardian)?;

        let mut proposals = self.proposals.lock();
        let proposal = proposals
            .get_mut(&id)
            .ok_or(LedgerError::StateConflict(StateConflictKind::UnknownProposal))?;
        if proposal.executed {
            return Err(LedgerError::StateConflict(StateConflictKind::AlreadyExecuted));
        }
        if proposal.approvals.contains(&caller.id) {
            return Err(LedgerError::StateConflict(StateConflictKind::AlreadyApproved));
        }
        proposal.approvals.push(caller.id);
        let count = proposal.approvals.len();
        info!(id, approvals = count, "Emergency withdrawal approved");
        Ok(count)
    }

    /// Phase three: execute once approvals meet the quorum. Succeeds
    /// exactly once.
    pub fn execute_emergency_withdrawal(&self, caller: &Caller, id: u64) -> LedgerResult<()> {
        caller.require(Role::Guardian)?;

        let mut proposals = self.proposals.lock();
        let proposal = proposals
            .get_mut(&id)
            .ok_or(LedgerError::StateConflict(StateConflictKind::UnknownProposal))?;
        if proposal.executed {
            return Err(LedgerError::StateConflict(StateConflictKind::AlreadyExecuted));
        }
        if proposal.approvals.len() < self.guardian_quorum {
            return Err(LedgerError::StateConflict(
                StateConflictKind::InsufficientApprovals,
            ));
        }

        let mut reserve = self
            .reserves
            .get_mut(&proposal.token)
            .ok_or(LedgerError::InsufficientBalance {
                token: proposal.token,
                holder: self.account,
            })?;
        if reserve.available < proposal.amount {
            return Err(LedgerError::InsufficientBalance {
                token: proposal.token,
                holder: self.account,
            });
        }

        self.bank
            .transfer(proposal.token, self.account, proposal.to, proposal.amount)?;
        reserve.available -= proposal.amount;
        reserve.total -= proposal.amount;
        drop(reserve);
        proposal.executed = true;

        info!(id, token = %proposal.token, amount = %proposal.amount, "Emergency withdrawal executed");
        self.events.emit(LedgerEvent::EmergencyWithdrawalExecuted {
            token: proposal.token,
            to: proposal.to,
            amount: proposal.amount,
        });
        Ok(())
    }

    /// Pending proposal snapshot.
    pub fn proposal(&self, id: u64) -> Option<EmergencyWithdrawal> {
        self.proposals.lock().get(&id).cloned()
    }
}
