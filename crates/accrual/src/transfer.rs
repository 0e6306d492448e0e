//! Transfer strategies for delivering settled rewards.
//!
//! The reward ledger decides *how much* is owed; a strategy decides *how*
//! it reaches the recipient. Two concrete strategies exist: a pull
//! strategy paying straight out of a funding balance, and a staking
//! strategy that compounds the payout into a staking position instead.
//!
//! Only the single settlement identity configured at construction may
//! move reward funds. The emergency withdrawal escape hatch is gated on a
//! separate admin identity and is never reachable from the reward path.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use ledgerd_core::{Bank, Caller, LedgerError, LedgerResult, Role};

/// Pluggable policy for delivering a settled reward amount.
pub trait TransferStrategy: Send + Sync + std::fmt::Debug {
    /// Move `amount` of `reward` to `to`. Restricted to the authorized
    /// settlement caller.
    fn perform_transfer(
        &self,
        caller: &Caller,
        to: Address,
        reward: Address,
        amount: U256,
    ) -> LedgerResult<()>;

    /// Recover misrouted funds. Restricted to the emergency admin.
    fn emergency_withdrawal(
        &self,
        caller: &Caller,
        token: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()>;
}

fn require_settlement(caller: &Caller, authorized: Address) -> LedgerResult<()> {
    if caller.id != authorized {
        return Err(LedgerError::Unauthorized {
            caller: caller.id,
            required: Role::RewardSettlement,
        });
    }
    Ok(())
}

fn require_emergency_admin(caller: &Caller, admin: Address) -> LedgerResult<()> {
    if caller.id != admin {
        return Err(LedgerError::Unauthorized {
            caller: caller.id,
            required: Role::EmergencyAdmin,
        });
    }
    Ok(())
}

/// Pays rewards directly from a preconfigured funding balance.
#[derive(Debug)]
pub struct PullTransferStrategy {
    bank: Arc<Bank>,
    /// Account funding reward payouts.
    funding_source: Address,
    /// The one identity allowed to settle transfers.
    authorized_caller: Address,
    /// Identity allowed to recover misrouted funds.
    emergency_admin: Address,
}

impl PullTransferStrategy {
    pub fn new(
        bank: Arc<Bank>,
        funding_source: Address,
        authorized_caller: Address,
        emergency_admin: Address,
    ) -> Self {
        Self {
            bank,
            funding_source,
            authorized_caller,
            emergency_admin,
        }
    }
}

impl TransferStrategy for PullTransferStrategy {
    fn perform_transfer(
        &self,
        caller: &Caller,
        to: Address,
        reward: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        require_settlement(caller, self.authorized_caller)?;
        self.bank.transfer(reward, self.funding_source, to, amount)?;
        debug!(to = %to, reward = %reward, amount = %amount, "Pull transfer settled");
        Ok(())
    }

    fn emergency_withdrawal(
        &self,
        caller: &Caller,
        token: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        require_emergency_admin(caller, self.emergency_admin)?;
        self.bank.transfer(token, self.funding_source, to, amount)?;
        info!(token = %token, to = %to, amount = %amount, "Emergency withdrawal from pull strategy");
        Ok(())
    }
}

/// Deposits rewards into a staking position on behalf of the recipient
/// (auto-compounding) instead of paying out directly.
#[derive(Debug)]
pub struct StakedTransferStrategy {
    bank: Arc<Bank>,
    /// Token this strategy stakes; transfers of any other reward are a
    /// configuration error.
    stake_token: Address,
    funding_source: Address,
    /// Account holding all staked funds.
    staking_vault: Address,
    /// Per-user staked balance.
    staked: DashMap<Address, U256>,
    authorized_caller: Address,
    emergency_admin: Address,
}

impl StakedTransferStrategy {
    pub fn new(
        bank: Arc<Bank>,
        stake_token: Address,
        funding_source: Address,
        staking_vault: Address,
        authorized_caller: Address,
        emergency_admin: Address,
    ) -> Self {
        Self {
            bank,
            stake_token,
            funding_source,
            staking_vault,
            staked: DashMap::new(),
            authorized_caller,
            emergency_admin,
        }
    }

    /// Staked balance credited to `user`.
    pub fn staked_balance(&self, user: &Address) -> U256 {
        self.staked.get(user).map(|v| *v).unwrap_or(U256::ZERO)
    }

    /// Unwind a staking position back to `to`. Restricted to the same
    /// settlement caller as `perform_transfer`.
    pub fn withdraw_staked(&self, caller: &Caller, to: Address, amount: U256) -> LedgerResult<()> {
        require_settlement(caller, self.authorized_caller)?;

        let current = self.staked_balance(&to);
        if current < amount {
            return Err(LedgerError::InsufficientBalance {
                token: self.stake_token,
                holder: to,
            });
        }
        self.bank
            .transfer(self.stake_token, self.staking_vault, to, amount)?;
        self.staked.insert(to, current - amount);
        debug!(to = %to, amount = %amount, "Staked rewards withdrawn");
        Ok(())
    }
}

impl TransferStrategy for StakedTransferStrategy {
    fn perform_transfer(
        &self,
        caller: &Caller,
        to: Address,
        reward: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        require_settlement(caller, self.authorized_caller)?;
        if reward != self.stake_token {
            return Err(LedgerError::config(format!(
                "staking strategy holds {}, cannot stake {reward}",
                self.stake_token
            )));
        }

        self.bank
            .transfer(reward, self.funding_source, self.staking_vault, amount)?;
        let current = self.staked_balance(&to);
        self.staked.insert(to, current + amount);
        debug!(to = %to, amount = %amount, "Reward staked on behalf of recipient");
        Ok(())
    }

    fn emergency_withdrawal(
        &self,
        caller: &Caller,
        token: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        require_emergency_admin(caller, self.emergency_admin)?;
        self.bank.transfer(token, self.staking_vault, to, amount)?;
        info!(token = %token, to = %to, amount = %amount, "Emergency withdrawal from staking vault");
        Ok(())
    }
}
