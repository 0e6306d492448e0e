//! Dutch auction pricing for instant liquidation.
//!
//! The collateral is offered at a discount that widens from
//! `start_discount_bps` toward `end_discount_bps` over the auction
//! duration, then stays at the end discount. Fill computation is pure;
//! fund movement belongs to the engine.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use ledgerd_core::math::{self, WAD};
use ledgerd_core::{DecayMode, LedgerResult};

/// A live Dutch auction over one collateral/debt pair of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    /// Position owner being liquidated
    pub user: Address,
    pub collateral_asset: Address,
    pub debt_asset: Address,
    /// Collateral still on offer (collateral token units)
    pub collateral_amount: U256,
    /// Debt still to be repaid (debt token units)
    pub debt_amount: U256,
    pub collateral_decimals: u8,
    pub debt_decimals: u8,
    /// Undiscounted collateral price (WAD) frozen at auction start
    pub start_price: U256,
    /// Debt asset price (WAD) frozen at auction start
    pub debt_price: U256,
    pub start_time: u64,
    pub duration_secs: u64,
    pub start_discount_bps: u16,
    pub end_discount_bps: u16,
    pub decay_mode: DecayMode,
    pub active: bool,
}

/// Result of one auction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionFill {
    /// Debt token units the bidder pays
    pub payment: U256,
    /// Collateral token units delivered to the bidder
    pub collateral_seized: U256,
    /// Whether this fill closed the auction
    pub full: bool,
}

impl Auction {
    /// Discount in effect at `now`. Decays from the start discount to
    /// the end discount over the duration and is clamped there after.
    pub fn current_discount_bps(&self, now: u64) -> u16 {
        let elapsed = now.saturating_sub(self.start_time).min(self.duration_secs);
        if elapsed >= self.duration_secs {
            // max() guards inverted bounds: the discount never narrows.
            return self.end_discount_bps.max(self.start_discount_bps);
        }

        // Progress through the window in WAD, shaped by the decay curve.
        let progress = U256::from(elapsed) * WAD / U256::from(self.duration_secs);
        let shaped = match self.decay_mode {
            DecayMode::Linear => progress,
            // Quadratic ramp: slow early, steep near expiry. Same
            // endpoints as linear.
            DecayMode::Exponential => (progress * progress) / WAD,
        };

        let span = U256::from(self.end_discount_bps.saturating_sub(self.start_discount_bps));
        let widened = (span * shaped / WAD).to::<u64>() as u16;
        self.start_discount_bps + widened
    }

    /// Discounted collateral price (WAD per whole unit) at `now`.
    pub fn current_price(&self, now: u64) -> LedgerResult<U256> {
        Ok(math::apply_bps_discount(
            self.start_price,
            self.current_discount_bps(now),
        )?)
    }

    /// Compute the fill for a bid of up to `max_payment` debt units at
    /// `now`. Pure: does not mutate the auction.
    pub fn compute_fill(&self, max_payment: U256, now: u64) -> LedgerResult<AuctionFill> {
        let price = self.current_price(now)?;
        let collateral_unit = math::pow10(self.collateral_decimals);
        let debt_unit = math::pow10(self.debt_decimals);

        let mut payment = max_payment.min(self.debt_amount);
        let payment_value = math::mul_div(payment, self.debt_price, debt_unit)?;
        let mut collateral_out = math::mul_div(payment_value, collateral_unit, price)?;

        if collateral_out >= self.collateral_amount {
            // Bid exhausts the collateral on offer: charge only what the
            // remaining collateral is worth at the current price.
            collateral_out = self.collateral_amount;
            let capped_value = math::mul_div(collateral_out, price, collateral_unit)?;
            payment = math::mul_div(capped_value, debt_unit, self.debt_price)?.min(payment);
        }

        let full = collateral_out == self.collateral_amount || payment == self.debt_amount;
        Ok(AuctionFill {
            payment,
            collateral_seized: collateral_out,
            full,
        })
    }

    /// Apply a fill, reducing remaining amounts and deactivating on a
    /// full fill.
    pub fn apply_fill(&mut self, fill: &AuctionFill) {
        self.debt_amount = self.debt_amount.saturating_sub(fill.payment);
        self.collateral_amount = self.collateral_amount.saturating_sub(fill.collateral_seized);
        if fill.full || self.collateral_amount.is_zero() || self.debt_amount.is_zero() {
            self.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    fn auction(decay_mode: DecayMode) -> Auction {
        Auction {
            user: addr(9),
            collateral_asset: addr(1),
            debt_asset: addr(2),
            collateral_amount: U256::from(1_000u64),
            debt_amount: U256::from(800u64),
            collateral_decimals: 0,
            debt_decimals: 0,
            start_price: U256::from(100u64) * WAD,
            debt_price: WAD,
            start_time: 1_000,
            duration_secs: 600,
            start_discount_bps: 100,  // 1%
            end_discount_bps: 1_500,  // 15%
            decay_mode,
            active: true,
        }
    }

    #[test]
    fn test_price_endpoints_exact() {
        let a = auction(DecayMode::Linear);
        // t=0: startPrice * (1 - startDiscount)
        assert_eq!(a.current_price(1_000).unwrap(), U256::from(99u64) * WAD);
        // t=duration: startPrice * (1 - endDiscount)
        assert_eq!(a.current_price(1_600).unwrap(), U256::from(85u64) * WAD);
        // Never decays past the end discount
        assert_eq!(a.current_price(10_000).unwrap(), U256::from(85u64) * WAD);
    }

    #[test]
    fn test_linear_decay_midpoint() {
        let a = auction(DecayMode::Linear);
        // Halfway: discount = 100 + 1400/2 = 800 bps
        assert_eq!(a.current_discount_bps(1_300), 800);
    }

    #[test]
    fn test_exponential_decay_lags_linear() {
        let linear = auction(DecayMode::Linear);
        let expo = auction(DecayMode::Exponential);

        // Same endpoints
        assert_eq!(
            linear.current_discount_bps(1_000),
            expo.current_discount_bps(1_000)
        );
        assert_eq!(
            linear.current_discount_bps(1_600),
            expo.current_discount_bps(1_600)
        );

        // Quadratic progress trails linear mid-window: at half time,
        // shaped progress is 1/4
        assert_eq!(expo.current_discount_bps(1_300), 100 + 1_400 / 4);
        assert!(expo.current_discount_bps(1_450) < linear.current_discount_bps(1_450));
    }

    #[test]
    fn test_inverted_discounts_hold_at_start() {
        // Engine config validation rejects this shape; a hand-built
        // auction must still not panic or narrow the discount.
        let mut a = auction(DecayMode::Linear);
        a.start_discount_bps = 1_500;
        a.end_discount_bps = 100;

        assert_eq!(a.current_discount_bps(1_000), 1_500);
        assert_eq!(a.current_discount_bps(1_300), 1_500);
        assert_eq!(a.current_discount_bps(10_000), 1_500);
    }

    #[test]
    fn test_partial_fill() {
        let mut a = auction(DecayMode::Linear);
        // At start, price is 99 per unit; a 99-debt-unit payment buys
        // exactly 1 collateral unit
        let fill = a.compute_fill(U256::from(99u64), 1_000).unwrap();
        assert_eq!(fill.collateral_seized, U256::from(1u64));
        assert!(!fill.full);

        a.apply_fill(&fill);
        assert!(a.active);
        assert_eq!(a.debt_amount, U256::from(701u64));
        assert_eq!(a.collateral_amount, U256::from(999u64));
    }

    #[test]
    fn test_full_fill_capped_at_collateral() {
        let mut a = auction(DecayMode::Linear);
        a.collateral_amount = U256::from(5u64);

        // Bid far more than the remaining collateral is worth
        let fill = a.compute_fill(U256::from(800u64), 1_000).unwrap();
        assert_eq!(fill.collateral_seized, U256::from(5u64));
        // 5 units at price 99 = 495 debt units
        assert_eq!(fill.payment, U256::from(495u64));
        assert!(fill.full);

        a.apply_fill(&fill);
        assert!(!a.active);
    }

    #[test]
    fn test_fill_payment_capped_at_remaining_debt() {
        let a = auction(DecayMode::Linear);
        let fill = a.compute_fill(U256::from(10_000u64), 1_000).unwrap();
        assert_eq!(fill.payment, U256::from(800u64));
        assert!(fill.full);
    }
}
