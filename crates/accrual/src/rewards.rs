//! Index-based reward accrual ledger.
//!
//! One global, monotonically non-decreasing index per (asset, reward)
//! pair accumulates time-weighted emission per unit of asset supply; each
//! user carries a checkpoint of the index at their last interaction.
//! Accrual for a user is the index delta since their checkpoint scaled by
//! the balance they held over that interval, which makes every
//! balance-affecting event O(1) regardless of holder count or elapsed
//! time.
//!
//! The ledger must be notified of every balance-affecting event (mint,
//! burn, transfer in/out) for both parties *before* the balance change is
//! applied, using the pre-change balance, otherwise the elapsed interval
//! is priced against the wrong supply.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use ledgerd_core::error::StateConflictKind;
use ledgerd_core::math::{self, MathError};
use ledgerd_core::{Caller, EventLog, LedgerError, LedgerEvent, LedgerResult, Role};

use crate::transfer::TransferStrategy;

/// Global distribution state for one (asset, reward) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardData {
    /// Cumulative reward per asset unit, scaled by the asset's own unit.
    /// Only ever increases.
    pub index: U256,
    /// Reward tokens emitted per second, in the reward's smallest unit.
    pub emission_per_second: U256,
    /// Timestamp of the last index settlement. Never advanced past
    /// `distribution_end`.
    pub last_update_timestamp: u64,
    /// Emission stops at this timestamp.
    pub distribution_end: u64,
}

impl RewardData {
    /// Index value if settled at `now` against `total_supply`, without
    /// mutating anything.
    fn pending_index(
        &self,
        total_supply: U256,
        asset_unit: U256,
        now: u64,
    ) -> Result<U256, MathError> {
        let effective_now = now.min(self.distribution_end);
        if effective_now <= self.last_update_timestamp
            || total_supply.is_zero()
            || self.emission_per_second.is_zero()
        {
            return Ok(self.index);
        }

        let dt = U256::from(effective_now - self.last_update_timestamp);
        let emitted = self
            .emission_per_second
            .checked_mul(dt)
            .ok_or(MathError::Overflow)?;
        // Truncate: rounding the delta up would mint reward out of thin
        // air on every settlement.
        let delta = math::mul_div_floor(emitted, asset_unit, total_supply)?;
        self.index.checked_add(delta).ok_or(MathError::Overflow)
    }
}

/// Per-user checkpoint for one (asset, reward) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserData {
    /// Value of the global index at the user's last interaction.
    pub index: U256,
    /// Earned but unclaimed amount.
    pub accrued: U256,
    /// Cumulative claimed amount (audit counter).
    pub claimed: U256,
}

#[derive(Debug, Default)]
struct RewardEntry {
    data: RewardData,
    users: HashMap<Address, UserData>,
}

impl Default for RewardData {
    fn default() -> Self {
        Self {
            index: U256::ZERO,
            emission_per_second: U256::ZERO,
            last_update_timestamp: 0,
            distribution_end: 0,
        }
    }
}

/// Per-asset distribution state: configured rewards plus the decimal
/// scale used to normalize balances against the index.
#[derive(Debug, Default)]
struct AssetData {
    decimals: u8,
    rewards: HashMap<Address, RewardEntry>,
}

/// The reward accrual ledger.
///
/// Owns all `RewardData`/`UserData`; transfer strategies never touch
/// ledger state and are only invoked after an amount has been settled.
pub struct RewardIndexLedger {
    assets: DashMap<Address, AssetData>,
    strategies: DashMap<Address, Arc<dyn TransferStrategy>>,
    /// Identity this ledger presents to transfer strategies.
    settlement: Caller,
    events: Arc<EventLog>,
}

impl std::fmt::Debug for RewardIndexLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardIndexLedger")
            .field("asset_count", &self.assets.len())
            .field("strategy_count", &self.strategies.len())
            .finish()
    }
}

impl RewardIndexLedger {
    /// Create a ledger that settles transfers as `settlement_id`.
    pub fn new(settlement_id: Address, events: Arc<EventLog>) -> Self {
        Self {
            assets: DashMap::new(),
            strategies: DashMap::new(),
            settlement: Caller::new(settlement_id, [Role::RewardSettlement]),
            events,
        }
    }

    /// Identity strategies must authorize for settlement.
    pub fn settlement_id(&self) -> Address {
        self.settlement.id
    }

    /// Associate a transfer strategy with a reward token.
    pub fn set_transfer_strategy(
        &self,
        caller: &Caller,
        reward: Address,
        strategy: Arc<dyn TransferStrategy>,
    ) -> LedgerResult<()> {
        caller.require(Role::EmissionManager)?;
        self.strategies.insert(reward, strategy);
        Ok(())
    }

    /// Configure (or reconfigure) emission of `reward` on `asset`.
    ///
    /// Reconfiguration settles the old schedule first so the index never
    /// retroactively changes rate. Rejects schedules already ended and
    /// emission rates whose full-window product overflows the index
    /// arithmetic.
    #[allow(clippy::too_many_arguments)]
    pub fn configure_asset(
        &self,
        caller: &Caller,
        asset: Address,
        reward: Address,
        emission_per_second: U256,
        distribution_end: u64,
        total_supply: U256,
        decimals: u8,
        now: u64,
    ) -> LedgerResult<()> {
        caller.require(Role::EmissionManager)?;

        if distribution_end <= now {
            return Err(LedgerError::config("distribution end is in the past"));
        }
        if decimals > 38 {
            return Err(LedgerError::config("unsupported asset decimals"));
        }

        let asset_unit = math::pow10(decimals);
        let window = U256::from(distribution_end - now);
        let projected = emission_per_second
            .checked_mul(window)
            .and_then(|e| e.checked_mul(asset_unit));
        if projected.is_none() {
            return Err(LedgerError::config(
                "emission rate overflows index arithmetic within the distribution window",
            ));
        }

        let mut entry = self.assets.entry(asset).or_insert_with(|| AssetData {
            decimals,
            rewards: HashMap::new(),
        });
        if entry.decimals != decimals {
            return Err(LedgerError::config("asset decimals mismatch"));
        }

        match entry.rewards.get_mut(&reward) {
            Some(existing) => {
                // Settle the outgoing schedule before switching rates.
                existing.data.index =
                    existing
                        .data
                        .pending_index(total_supply, asset_unit, now)?;
                existing.data.emission_per_second = emission_per_second;
                existing.data.distribution_end = distribution_end;
                existing.data.last_update_timestamp =
                    now.max(existing.data.last_update_timestamp);
            }
            None => {
                entry.rewards.insert(
                    reward,
                    RewardEntry {
                        data: RewardData {
                            index: U256::ZERO,
                            emission_per_second,
                            last_update_timestamp: now,
                            distribution_end,
                        },
                        users: HashMap::new(),
                    },
                );
            }
        }
        drop(entry);

        info!(
            asset = %asset,
            reward = %reward,
            emission_per_second = %emission_per_second,
            distribution_end,
            "Reward distribution configured"
        );
        self.events.emit(LedgerEvent::RewardConfigured {
            asset,
            reward,
            emission_per_second,
            distribution_end,
        });
        Ok(())
    }

    /// Settle the global index for one (asset, reward) pair. Idempotent:
    /// a second call at the same timestamp is a no-op.
    pub fn update_asset_state(
        &self,
        asset: Address,
        reward: Address,
        total_supply: U256,
        now: u64,
    ) -> LedgerResult<U256> {
        let mut entry = self.asset_entry(&asset)?;
        let asset_unit = math::pow10(entry.decimals);
        let reward_entry = Self::reward_entry(&mut entry, &reward)?;
        Self::settle_index(&mut reward_entry.data, total_supply, asset_unit, now)
    }

    /// Settle a user's accrual for one (asset, reward) pair using their
    /// pre-change balance. Returns the newly accrued amount.
    #[allow(clippy::too_many_arguments)]
    pub fn update_user_state(
        &self,
        user: Address,
        asset: Address,
        reward: Address,
        user_balance: U256,
        total_supply: U256,
        now: u64,
    ) -> LedgerResult<U256> {
        let mut entry = self.asset_entry(&asset)?;
        let asset_unit = math::pow10(entry.decimals);
        let reward_entry = Self::reward_entry(&mut entry, &reward)?;
        let delta = Self::settle_user(reward_entry, user, user_balance, total_supply, asset_unit, now)?;
        drop(entry);

        if !delta.is_zero() {
            debug!(user = %user, asset = %asset, reward = %reward, amount = %delta, "Rewards accrued");
            self.events.emit(LedgerEvent::RewardsAccrued {
                user,
                asset,
                reward,
                amount: delta,
            });
        }
        Ok(delta)
    }

    /// Consume a balance-change notification from a token contract:
    /// settles the user's accrual for every reward configured on `asset`
    /// against the pre-change balance. Must run before the change is
    /// considered final.
    pub fn handle_balance_change(
        &self,
        user: Address,
        asset: Address,
        old_balance: U256,
        new_balance: U256,
        total_supply: U256,
        now: u64,
    ) -> LedgerResult<()> {
        let mut entry = self.asset_entry(&asset)?;
        let asset_unit = math::pow10(entry.decimals);

        let mut accrued_events = Vec::new();
        for (reward, reward_entry) in entry.rewards.iter_mut() {
            let delta =
                Self::settle_user(reward_entry, user, old_balance, total_supply, asset_unit, now)?;
            if !delta.is_zero() {
                accrued_events.push((*reward, delta));
            }
        }
        drop(entry);

        debug!(
            user = %user,
            asset = %asset,
            old_balance = %old_balance,
            new_balance = %new_balance,
            "Balance change settled"
        );
        for (reward, amount) in accrued_events {
            self.events.emit(LedgerEvent::RewardsAccrued {
                user,
                asset,
                reward,
                amount,
            });
        }
        Ok(())
    }

    /// Accrued-if-settled-now amount, without mutating any state.
    pub fn pending_rewards(
        &self,
        user: Address,
        asset: Address,
        reward: Address,
        user_balance: U256,
        total_supply: U256,
        now: u64,
    ) -> LedgerResult<U256> {
        let entry = self.asset_entry(&asset)?;
        let asset_unit = math::pow10(entry.decimals);
        let reward_entry = entry
            .rewards
            .get(&reward)
            .ok_or(LedgerError::StateConflict(
                StateConflictKind::DistributionNotConfigured,
            ))?;

        let index = reward_entry
            .data
            .pending_index(total_supply, asset_unit, now)?;
        let user_data = reward_entry.users.get(&user).copied().unwrap_or_default();
        let delta = math::mul_div_floor(user_balance, index - user_data.index, asset_unit)?;
        user_data
            .accrued
            .checked_add(delta)
            .ok_or_else(|| MathError::Overflow.into())
    }

    /// Claim settled rewards: zeroes `accrued` and delivers the amount to
    /// `to` through the reward's transfer strategy. Claiming with nothing
    /// accrued is a no-op returning 0, not an error.
    pub fn claim(
        &self,
        caller: &Caller,
        user: Address,
        asset: Address,
        reward: Address,
        to: Address,
    ) -> LedgerResult<U256> {
        caller.require_role_or_self(Role::ClaimsProcessor, user)?;

        let mut entry = self.asset_entry(&asset)?;
        let reward_entry = Self::reward_entry(&mut entry, &reward)?;
        let user_data = reward_entry.users.entry(user).or_default();

        let amount = user_data.accrued;
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }

        let strategy = self
            .strategies
            .get(&reward)
            .ok_or_else(|| LedgerError::config(format!("no transfer strategy for reward {reward}")))?
            .clone();

        // Deliver first; only a successful transfer may zero the accrual.
        strategy.perform_transfer(&self.settlement, to, reward, amount)?;
        user_data.accrued = U256::ZERO;
        user_data.claimed = user_data
            .claimed
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        drop(entry);

        info!(user = %user, to = %to, reward = %reward, amount = %amount, "Rewards claimed");
        self.events.emit(LedgerEvent::RewardsClaimed {
            user,
            to,
            reward,
            amount,
        });
        Ok(amount)
    }

    /// Global distribution state, if configured.
    pub fn reward_data(&self, asset: &Address, reward: &Address) -> Option<RewardData> {
        self.assets
            .get(asset)
            .and_then(|a| a.rewards.get(reward).map(|r| r.data))
    }

    /// A user's checkpoint, if they ever interacted.
    pub fn user_data(&self, asset: &Address, reward: &Address, user: &Address) -> Option<UserData> {
        self.assets
            .get(asset)
            .and_then(|a| a.rewards.get(reward).and_then(|r| r.users.get(user).copied()))
    }

    fn asset_entry(
        &self,
        asset: &Address,
    ) -> LedgerResult<dashmap::mapref::one::RefMut<'_, Address, AssetData>> {
        self.assets
            .get_mut(asset)
            .ok_or(LedgerError::StateConflict(
                StateConflictKind::DistributionNotConfigured,
            ))
    }

    fn reward_entry<'a>(
        entry: &'a mut AssetData,
        reward: &Address,
    ) -> LedgerResult<&'a mut RewardEntry> {
        entry.rewards.get_mut(reward).ok_or(LedgerError::StateConflict(
            StateConflictKind::DistributionNotConfigured,
        ))
    }

    fn settle_index(
        data: &mut RewardData,
        total_supply: U256,
        asset_unit: U256,
        now: u64,
    ) -> LedgerResult<U256> {
        let new_index = data.pending_index(total_supply, asset_unit, now)?;
        data.index = new_index;
        data.last_update_timestamp = now
            .min(data.distribution_end)
            .max(data.last_update_timestamp);
        Ok(new_index)
    }

    fn settle_user(
        reward_entry: &mut RewardEntry,
        user: Address,
        user_balance: U256,
        total_supply: U256,
        asset_unit: U256,
        now: u64,
    ) -> LedgerResult<U256> {
        let global_index = Self::settle_index(&mut reward_entry.data, total_supply, asset_unit, now)?;
        let user_data = reward_entry.users.entry(user).or_default();

        let delta = math::mul_div_floor(user_balance, global_index - user_data.index, asset_unit)?;
        user_data.accrued = user_data
            .accrued
            .checked_add(delta)
            .ok_or(MathError::Overflow)?;
        user_data.index = global_index;
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::PullTransferStrategy;
    use ledgerd_core::Bank;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    fn manager() -> Caller {
        Caller::new(addr(0xAD), [Role::EmissionManager])
    }

    fn ledger() -> RewardIndexLedger {
        RewardIndexLedger::new(addr(0x5E), Arc::new(EventLog::new()))
    }

    const ASSET: u8 = 1;
    const REWARD: u8 = 2;

    /// Worked example: supply 1000, emission 10/s, user holds 100 from
    /// t=0; at t=100 accrued is exactly 100.
    #[test]
    fn test_example_accrual_exact() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(10u64),
                1_000_000,
                U256::from(1000u64),
                0,
                0,
            )
            .unwrap();

        let accrued = ledger
            .update_user_state(
                addr(9),
                addr(ASSET),
                addr(REWARD),
                U256::from(100u64),
                U256::from(1000u64),
                100,
            )
            .unwrap();
        assert_eq!(accrued, U256::from(100u64));
    }

    #[test]
    fn test_update_is_idempotent_without_balance_change() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(10u64),
                1_000_000,
                U256::from(1000u64),
                0,
                0,
            )
            .unwrap();

        let first = ledger
            .update_user_state(addr(9), addr(ASSET), addr(REWARD), U256::from(100u64), U256::from(1000u64), 100)
            .unwrap();
        assert!(!first.is_zero());

        let second = ledger
            .update_user_state(addr(9), addr(ASSET), addr(REWARD), U256::from(100u64), U256::from(1000u64), 100)
            .unwrap();
        assert_eq!(second, U256::ZERO);
    }

    #[test]
    fn test_index_monotonic_and_capped_at_distribution_end() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(5u64),
                200,
                U256::from(100u64),
                0,
                0,
            )
            .unwrap();

        let mut last_index = U256::ZERO;
        for now in [20u64, 100, 160, 200, 500, 1_000] {
            let index = ledger
                .update_asset_state(addr(ASSET), addr(REWARD), U256::from(100u64), now)
                .unwrap();
            assert!(index >= last_index, "index regressed at t={now}");
            last_index = index;
        }

        // Emission stops at distribution_end: 5 * 200 / 100 per unit
        assert_eq!(last_index, U256::from(10u64));
        let data = ledger.reward_data(&addr(ASSET), &addr(REWARD)).unwrap();
        assert_eq!(data.last_update_timestamp, 200);
    }

    #[test]
    fn test_frequent_settlement_never_overcredits() {
        // Settling at awkward timestamps must not push the index past
        // exact emission; each truncation can only lose dust, never gain.
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(5u64),
                200,
                U256::from(100u64),
                0,
                0,
            )
            .unwrap();

        let mut index = U256::ZERO;
        for now in [10u64, 50, 150, 200] {
            index = ledger
                .update_asset_state(addr(ASSET), addr(REWARD), U256::from(100u64), now)
                .unwrap();
        }

        // Exact emission over the window is 5 * 200 / 100 = 10 per unit;
        // the partial settlements at t=10 and t=200 each truncate 0.5.
        assert!(index <= U256::from(10u64));
        assert_eq!(index, U256::from(9u64));
    }

    #[test]
    fn test_zero_supply_is_noop_for_index() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(10u64),
                1_000,
                U256::ZERO,
                0,
                0,
            )
            .unwrap();

        let index = ledger
            .update_asset_state(addr(ASSET), addr(REWARD), U256::ZERO, 500)
            .unwrap();
        assert_eq!(index, U256::ZERO);
    }

    #[test]
    fn test_configure_rejects_past_end_and_overflowing_emission() {
        let ledger = ledger();
        assert!(matches!(
            ledger.configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(1u64),
                50,
                U256::ZERO,
                0,
                100,
            ),
            Err(LedgerError::Configuration(_))
        ));

        assert!(matches!(
            ledger.configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::MAX,
                1_000,
                U256::from(1u64),
                18,
                0,
            ),
            Err(LedgerError::Configuration(_))
        ));

        // And plain users cannot configure at all
        assert!(matches!(
            ledger.configure_asset(
                &Caller::user(addr(7)),
                addr(ASSET),
                addr(REWARD),
                U256::from(1u64),
                1_000,
                U256::ZERO,
                0,
                0,
            ),
            Err(LedgerError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_accrual_uses_pre_change_balance() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(11u64),
                1_000_000,
                U256::from(1000u64),
                0,
                0,
            )
            .unwrap();

        // User holds 100 over [0, 100), then doubles their balance.
        ledger
            .handle_balance_change(
                addr(9),
                addr(ASSET),
                U256::from(100u64),
                U256::from(200u64),
                U256::from(1000u64),
                100,
            )
            .unwrap();
        // Over [100, 200) they hold 200 of a supply of 1100.
        ledger
            .handle_balance_change(
                addr(9),
                addr(ASSET),
                U256::from(200u64),
                U256::from(200u64),
                U256::from(1100u64),
                200,
            )
            .unwrap();

        let user = ledger
            .user_data(&addr(ASSET), &addr(REWARD), &addr(9))
            .unwrap();
        // First interval: index = floor(11*100/1000) = 1, settled against
        // the pre-change balance of 100.
        // Second: index delta = 11*100/1100 = exactly 1, * 200 balance.
        assert_eq!(user.accrued, U256::from(300u64));
    }

    #[test]
    fn test_emission_conservation_across_users() {
        // Two users splitting the supply never accrue more than total
        // emission, within rounding tolerance.
        let ledger = ledger();
        let supply = U256::from(1_000u64);
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(7u64),
                10_000,
                supply,
                0,
                0,
            )
            .unwrap();

        let balances = [(addr(9), U256::from(400u64)), (addr(10), U256::from(600u64))];
        for now in [13u64, 400, 401, 999, 5_000, 10_000] {
            for (user, balance) in balances {
                ledger
                    .update_user_state(user, addr(ASSET), addr(REWARD), balance, supply, now)
                    .unwrap();
            }
        }

        let total_accrued: U256 = balances
            .iter()
            .map(|(user, _)| {
                ledger
                    .user_data(&addr(ASSET), &addr(REWARD), user)
                    .unwrap()
                    .accrued
            })
            .fold(U256::ZERO, |acc, x| acc + x);

        let emitted = U256::from(7u64) * U256::from(10_000u64);
        // Truncation only loses: accrual never exceeds what was emitted.
        assert!(total_accrued <= emitted);
        // Each of the 6 settlements can truncate at most one index unit,
        // i.e. `supply` reward units.
        let max_dust = supply * U256::from(6u64);
        assert!(total_accrued + max_dust >= emitted);
    }

    #[test]
    fn test_claim_zeroes_accrued_and_pays_out() {
        let bank = Arc::new(Bank::new());
        let funding = addr(0xF0);
        bank.credit(addr(REWARD), funding, U256::from(10_000u64)).unwrap();

        let ledger = ledger();
        let strategy = Arc::new(PullTransferStrategy::new(
            bank.clone(),
            funding,
            ledger.settlement_id(),
            addr(0xEA),
        ));
        ledger
            .set_transfer_strategy(&manager(), addr(REWARD), strategy)
            .unwrap();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(10u64),
                1_000_000,
                U256::from(1000u64),
                0,
                0,
            )
            .unwrap();
        ledger
            .update_user_state(addr(9), addr(ASSET), addr(REWARD), U256::from(100u64), U256::from(1000u64), 100)
            .unwrap();

        let user = Caller::user(addr(9));
        let claimed = ledger
            .claim(&user, addr(9), addr(ASSET), addr(REWARD), addr(9))
            .unwrap();
        assert_eq!(claimed, U256::from(100u64));
        assert_eq!(bank.balance_of(addr(REWARD), addr(9)), U256::from(100u64));

        let data = ledger.user_data(&addr(ASSET), &addr(REWARD), &addr(9)).unwrap();
        assert_eq!(data.accrued, U256::ZERO);
        assert_eq!(data.claimed, U256::from(100u64));

        // Claiming again is a no-op, not an error
        let again = ledger
            .claim(&user, addr(9), addr(ASSET), addr(REWARD), addr(9))
            .unwrap();
        assert_eq!(again, U256::ZERO);
    }

    #[test]
    fn test_claim_requires_self_or_claims_processor() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(10u64),
                1_000,
                U256::from(1000u64),
                0,
                0,
            )
            .unwrap();

        let stranger = Caller::user(addr(66));
        assert!(matches!(
            ledger.claim(&stranger, addr(9), addr(ASSET), addr(REWARD), addr(66)),
            Err(LedgerError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_pending_rewards_does_not_mutate() {
        let ledger = ledger();
        ledger
            .configure_asset(
                &manager(),
                addr(ASSET),
                addr(REWARD),
                U256::from(10u64),
                1_000_000,
                U256::from(1000u64),
                0,
                0,
            )
            .unwrap();

        let pending = ledger
            .pending_rewards(addr(9), addr(ASSET), addr(REWARD), U256::from(100u64), U256::from(1000u64), 100)
            .unwrap();
        assert_eq!(pending, U256::from(100u64));

        // Global state untouched
        let data = ledger.reward_data(&addr(ASSET), &addr(REWARD)).unwrap();
        assert_eq!(data.index, U256::ZERO);
        assert_eq!(data.last_update_timestamp, 0);
        assert!(ledger.user_data(&addr(ASSET), &addr(REWARD), &addr(9)).is_none());
    }
}
