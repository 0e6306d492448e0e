//! Position data structures for tracking collateralized debt positions.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use ledgerd_core::math::{self, WAD};
use ledgerd_core::{LedgerResult, PriceStore};

/// Lifecycle of a tracked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PositionState {
    /// Health factor above the warning threshold.
    #[default]
    Healthy,
    /// Health factor breached the warning threshold; no obligations yet.
    Warned,
    /// An open margin call with a grace deadline.
    MarginCalled,
    /// Margin call cured by added collateral; no penalty applied.
    Resolved,
    /// Forced liquidation seized part of the collateral.
    PartiallyLiquidated,
    /// Position fully closed by liquidation.
    FullyLiquidated,
}

/// One collateral leg of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralEntry {
    /// Token address
    pub asset: Address,
    /// Raw balance (token decimals)
    pub amount: U256,
    /// Token decimals
    pub decimals: u8,
    /// Liquidation threshold (in basis points, e.g., 8000 = 80%)
    pub liquidation_threshold_bps: u16,
    /// Whether this collateral counts toward the health factor
    pub enabled: bool,
}

impl CollateralEntry {
    /// WAD value of this leg at the given oracle price.
    pub fn value_wad(&self, price: U256) -> LedgerResult<U256> {
        Ok(math::mul_div(self.amount, price, math::pow10(self.decimals))?)
    }

    /// WAD value scaled by the liquidation threshold.
    pub fn risk_adjusted_value_wad(&self, price: U256) -> LedgerResult<U256> {
        Ok(math::bps_fraction(
            self.value_wad(price)?,
            self.liquidation_threshold_bps,
        )?)
    }
}

/// One debt leg of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtEntry {
    /// Token address
    pub asset: Address,
    /// Raw debt amount (token decimals)
    pub amount: U256,
    /// Token decimals
    pub decimals: u8,
}

impl DebtEntry {
    /// WAD value of this leg at the given oracle price.
    pub fn value_wad(&self, price: U256) -> LedgerResult<U256> {
        Ok(math::mul_div(self.amount, price, math::pow10(self.decimals))?)
    }
}

/// A collateralized debt position tracked by the liquidation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Position owner
    pub user: Address,
    /// Collateral legs
    pub collaterals: SmallVec<[CollateralEntry; 4]>,
    /// Debt legs
    pub debts: SmallVec<[DebtEntry; 4]>,
    /// Lifecycle state
    pub state: PositionState,
}

impl Position {
    /// Create an empty position.
    pub fn new(user: Address) -> Self {
        Self {
            user,
            collaterals: SmallVec::new(),
            debts: SmallVec::new(),
            state: PositionState::Healthy,
        }
    }

    /// Add (or top up) a collateral leg.
    pub fn add_collateral(
        &mut self,
        asset: Address,
        amount: U256,
        decimals: u8,
        liquidation_threshold_bps: u16,
    ) {
        if let Some(entry) = self.collaterals.iter_mut().find(|c| c.asset == asset) {
            entry.amount += amount;
        } else {
            self.collaterals.push(CollateralEntry {
                asset,
                amount,
                decimals,
                liquidation_threshold_bps,
                enabled: true,
            });
        }
    }

    /// Add (or increase) a debt leg.
    pub fn add_debt(&mut self, asset: Address, amount: U256, decimals: u8) {
        if let Some(entry) = self.debts.iter_mut().find(|d| d.asset == asset) {
            entry.amount += amount;
        } else {
            self.debts.push(DebtEntry {
                asset,
                amount,
                decimals,
            });
        }
    }

    pub fn collateral(&self, asset: &Address) -> Option<&CollateralEntry> {
        self.collaterals.iter().find(|c| &c.asset == asset)
    }

    pub fn collateral_mut(&mut self, asset: &Address) -> Option<&mut CollateralEntry> {
        self.collaterals.iter_mut().find(|c| &c.asset == asset)
    }

    pub fn debt(&self, asset: &Address) -> Option<&DebtEntry> {
        self.debts.iter().find(|d| &d.asset == asset)
    }

    pub fn debt_mut(&mut self, asset: &Address) -> Option<&mut DebtEntry> {
        self.debts.iter_mut().find(|d| &d.asset == asset)
    }

    /// Total collateral value in WAD at current oracle prices.
    pub fn total_collateral_wad(&self, prices: &PriceStore, now: u64) -> LedgerResult<U256> {
        let mut total = U256::ZERO;
        for entry in self.collaterals.iter().filter(|c| c.enabled) {
            let price = prices.get_price(entry.asset, now)?;
            total += entry.value_wad(price)?;
        }
        Ok(total)
    }

    /// Risk-adjusted collateral value (value × liquidation threshold).
    pub fn risk_adjusted_collateral_wad(&self, prices: &PriceStore, now: u64) -> LedgerResult<U256> {
        let mut total = U256::ZERO;
        for entry in self.collaterals.iter().filter(|c| c.enabled) {
            let price = prices.get_price(entry.asset, now)?;
            total += entry.risk_adjusted_value_wad(price)?;
        }
        Ok(total)
    }

    /// Total debt value in WAD at current oracle prices.
    pub fn total_debt_wad(&self, prices: &PriceStore, now: u64) -> LedgerResult<U256> {
        let mut total = U256::ZERO;
        for entry in &self.debts {
            let price = prices.get_price(entry.asset, now)?;
            total += entry.value_wad(price)?;
        }
        Ok(total)
    }

    /// Health factor in WAD: risk-adjusted collateral / debt.
    /// Returns U256::MAX when there is no debt.
    pub fn health_factor_wad(&self, prices: &PriceStore, now: u64) -> LedgerResult<U256> {
        let debt = self.total_debt_wad(prices, now)?;
        if debt.is_zero() {
            return Ok(U256::MAX);
        }
        let adjusted = self.risk_adjusted_collateral_wad(prices, now)?;
        Ok(math::wad_div(adjusted, debt)?)
    }

    /// Check if the position is liquidatable (HF < 1.0).
    pub fn is_liquidatable(&self, prices: &PriceStore, now: u64) -> LedgerResult<bool> {
        Ok(self.health_factor_wad(prices, now)? < WAD)
    }

    /// Largest enabled collateral leg by current value.
    pub fn largest_collateral(
        &self,
        prices: &PriceStore,
        now: u64,
    ) -> LedgerResult<Option<&CollateralEntry>> {
        let mut best: Option<(&CollateralEntry, U256)> = None;
        for entry in self.collaterals.iter().filter(|c| c.enabled) {
            let price = prices.get_price(entry.asset, now)?;
            let value = entry.value_wad(price)?;
            if best.map(|(_, v)| value > v).unwrap_or(true) {
                best = Some((entry, value));
            }
        }
        Ok(best.map(|(e, _)| e))
    }

    /// Largest debt leg by current value.
    pub fn largest_debt(&self, prices: &PriceStore, now: u64) -> LedgerResult<Option<&DebtEntry>> {
        let mut best: Option<(&DebtEntry, U256)> = None;
        for entry in &self.debts {
            let price = prices.get_price(entry.asset, now)?;
            let value = entry.value_wad(price)?;
            if best.map(|(_, v)| value > v).unwrap_or(true) {
                best = Some((entry, value));
            }
        }
        Ok(best.map(|(e, _)| e))
    }

    /// A position with no remaining debt is closed.
    pub fn is_debt_free(&self) -> bool {
        self.debts.iter().all(|d| d.amount.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    fn prices() -> Arc<PriceStore> {
        let store = Arc::new(PriceStore::new(3_600));
        // Collateral at $1, debt at $1, both whole-unit tokens
        store.set_price(addr(1), WAD, 0);
        store.set_price(addr(2), WAD, 0);
        store
    }

    /// Worked example: collateral 150, debt 100, threshold 80% -> HF 1.2;
    /// debt rising to 130 drops HF to ~0.923.
    #[test]
    fn test_health_factor_example() {
        let prices = prices();
        let mut position = Position::new(addr(9));
        position.add_collateral(addr(1), U256::from(150u64), 0, 8_000);
        position.add_debt(addr(2), U256::from(100u64), 0);

        let hf = position.health_factor_wad(&prices, 0).unwrap();
        assert_eq!(hf, U256::from(1_200_000_000_000_000_000u128));
        assert!(!position.is_liquidatable(&prices, 0).unwrap());

        position.debt_mut(&addr(2)).unwrap().amount = U256::from(130u64);
        let hf = position.health_factor_wad(&prices, 0).unwrap();
        // 120/130 = 0.923076923... (half-up at the 18th digit)
        assert_eq!(hf, U256::from(923_076_923_076_923_077u128));
        assert!(position.is_liquidatable(&prices, 0).unwrap());
    }

    #[test]
    fn test_no_debt_means_max_health() {
        let prices = prices();
        let mut position = Position::new(addr(9));
        position.add_collateral(addr(1), U256::from(10u64), 0, 8_000);
        assert_eq!(position.health_factor_wad(&prices, 0).unwrap(), U256::MAX);
    }

    #[test]
    fn test_disabled_collateral_excluded() {
        let prices = prices();
        let mut position = Position::new(addr(9));
        position.add_collateral(addr(1), U256::from(150u64), 0, 8_000);
        position.add_debt(addr(2), U256::from(100u64), 0);
        position.collateral_mut(&addr(1)).unwrap().enabled = false;

        assert_eq!(
            position.risk_adjusted_collateral_wad(&prices, 0).unwrap(),
            U256::ZERO
        );
        assert!(position.is_liquidatable(&prices, 0).unwrap());
    }

    #[test]
    fn test_stale_price_propagates() {
        let store = PriceStore::new(10);
        store.set_price(addr(1), WAD, 0);
        let mut position = Position::new(addr(9));
        position.add_collateral(addr(1), U256::from(1u64), 0, 8_000);
        position.add_debt(addr(1), U256::from(1u64), 0);
        assert!(position.health_factor_wad(&store, 1_000).is_err());
    }

    #[test]
    fn test_largest_legs() {
        let prices = prices();
        let mut position = Position::new(addr(9));
        position.add_collateral(addr(1), U256::from(50u64), 0, 8_000);
        position.add_collateral(addr(2), U256::from(70u64), 0, 8_000);
        let largest = position.largest_collateral(&prices, 0).unwrap().unwrap();
        assert_eq!(largest.asset, addr(2));
    }
}
