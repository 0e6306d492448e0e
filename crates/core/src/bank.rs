//! In-memory token balance book.
//!
//! The execution substrate this engine was distilled from provides atomic
//! balance movement for free; off-chain we replicate it here. All fund
//! movement (reward payout, auction settlement, treasury coverage, flash
//! liquidation) goes through one [`Bank`], and multi-leg operations use
//! [`Bank::execute_atomic`] so a failing leg leaves every balance
//! untouched.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{LedgerError, LedgerResult};

/// One balance movement: `amount` of `token` from `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOp {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

impl TransferOp {
    pub fn new(token: Address, from: Address, to: Address, amount: U256) -> Self {
        Self {
            token,
            from,
            to,
            amount,
        }
    }
}

/// Token balance book keyed by (token, holder).
pub struct Bank {
    balances: DashMap<(Address, Address), U256>,
    // Serializes writers so batches never interleave. Reads stay
    // lock-free (execute_atomic reads while holding the lock); a
    // consistent cross-account view relies on the binary's single-writer
    // command loop.
    commit_lock: Mutex<()>,
}

impl std::fmt::Debug for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bank")
            .field("entry_count", &self.balances.len())
            .finish()
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

impl Bank {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            commit_lock: Mutex::new(()),
        }
    }

    /// Balance of `holder` in `token`.
    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .map(|b| *b)
            .unwrap_or(U256::ZERO)
    }

    /// Mint `amount` of `token` to `holder` (external deposit).
    pub fn credit(&self, token: Address, holder: Address, amount: U256) -> LedgerResult<()> {
        let _guard = self.commit_lock.lock();
        self.credit_locked(token, holder, amount)
    }

    /// Burn `amount` of `token` from `holder` (external withdrawal).
    pub fn debit(&self, token: Address, holder: Address, amount: U256) -> LedgerResult<()> {
        let _guard = self.commit_lock.lock();
        self.debit_locked(token, holder, amount)
    }

    /// Move `amount` of `token` between holders.
    pub fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        self.execute_atomic(&[TransferOp::new(token, from, to, amount)])
    }

    /// Apply a batch of transfers atomically: every debit is validated
    /// against the projected balances before anything is written, so the
    /// batch either fully applies or the bank is unchanged.
    pub fn execute_atomic(&self, ops: &[TransferOp]) -> LedgerResult<()> {
        let _guard = self.commit_lock.lock();

        // Dry run against projected balances.
        let mut projected: HashMap<(Address, Address), U256> = HashMap::new();
        for op in ops {
            let from_key = (op.token, op.from);
            let from_balance = *projected
                .entry(from_key)
                .or_insert_with(|| self.balance_of(op.token, op.from));
            if from_balance < op.amount {
                return Err(LedgerError::InsufficientBalance {
                    token: op.token,
                    holder: op.from,
                });
            }
            projected.insert(from_key, from_balance - op.amount);

            let to_key = (op.token, op.to);
            let to_balance = *projected
                .entry(to_key)
                .or_insert_with(|| self.balance_of(op.token, op.to));
            let new_to = to_balance
                .checked_add(op.amount)
                .ok_or(crate::math::MathError::Overflow)?;
            projected.insert(to_key, new_to);
        }

        // Commit.
        for (key, balance) in projected {
            self.balances.insert(key, balance);
        }
        Ok(())
    }

    fn credit_locked(&self, token: Address, holder: Address, amount: U256) -> LedgerResult<()> {
        let current = self.balance_of(token, holder);
        let updated = current
            .checked_add(amount)
            .ok_or(crate::math::MathError::Overflow)?;
        self.balances.insert((token, holder), updated);
        Ok(())
    }

    fn debit_locked(&self, token: Address, holder: Address, amount: U256) -> LedgerResult<()> {
        let current = self.balance_of(token, holder);
        if current < amount {
            return Err(LedgerError::InsufficientBalance { token, holder });
        }
        self.balances.insert((token, holder), current - amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    #[test]
    fn test_credit_debit_transfer() {
        let bank = Bank::new();
        let token = addr(1);
        bank.credit(token, addr(2), U256::from(100u64)).unwrap();
        bank.transfer(token, addr(2), addr(3), U256::from(40u64)).unwrap();
        assert_eq!(bank.balance_of(token, addr(2)), U256::from(60u64));
        assert_eq!(bank.balance_of(token, addr(3)), U256::from(40u64));

        assert!(matches!(
            bank.debit(token, addr(3), U256::from(41u64)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_atomic_batch_rolls_back() {
        let bank = Bank::new();
        let token = addr(1);
        bank.credit(token, addr(2), U256::from(100u64)).unwrap();

        // Second leg overdraws: neither leg may apply.
        let ops = [
            TransferOp::new(token, addr(2), addr(3), U256::from(50u64)),
            TransferOp::new(token, addr(4), addr(3), U256::from(1u64)),
        ];
        assert!(bank.execute_atomic(&ops).is_err());
        assert_eq!(bank.balance_of(token, addr(2)), U256::from(100u64));
        assert_eq!(bank.balance_of(token, addr(3)), U256::ZERO);
    }

    #[test]
    fn test_atomic_batch_chains_legs() {
        // A later leg may spend funds received in an earlier leg.
        let bank = Bank::new();
        let token = addr(1);
        bank.credit(token, addr(2), U256::from(10u64)).unwrap();

        let ops = [
            TransferOp::new(token, addr(2), addr(3), U256::from(10u64)),
            TransferOp::new(token, addr(3), addr(4), U256::from(10u64)),
        ];
        bank.execute_atomic(&ops).unwrap();
        assert_eq!(bank.balance_of(token, addr(4)), U256::from(10u64));
    }
}
