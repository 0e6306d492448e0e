//! Flash liquidation support: swap routing and profit estimation.
//!
//! A flash liquidation borrows the debt asset from a pool account, repays
//! the position, receives discounted collateral, swaps it back to the
//! debt asset, and repays the loan plus a fee. The engine assembles all
//! of those legs into one atomic bank batch; this module provides the
//! swap leg and the profit preview that gates execution.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use ledgerd_core::math::{self};
use ledgerd_core::{LedgerError, LedgerResult, PriceStore, TransferOp};

/// Converts one token into another against some liquidity source.
///
/// Implementations quote and build bank transfer legs; they never move
/// funds themselves, so a swap can participate in an atomic batch.
pub trait SwapRouter: Send + Sync + std::fmt::Debug {
    /// Output amount for swapping `amount_in` of `token_in` into
    /// `token_out` at `now`.
    fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        now: u64,
    ) -> LedgerResult<U256>;

    /// Transfer legs that perform the swap between `trader` and the
    /// router's liquidity account, plus the output amount.
    fn build_swap_ops(
        &self,
        trader: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        now: u64,
    ) -> LedgerResult<(U256, Vec<TransferOp>)>;
}

/// Router that fills swaps at oracle price minus a fixed fee, backed by
/// a single liquidity account in the bank.
pub struct OraclePricedRouter {
    prices: Arc<PriceStore>,
    /// Bank account providing swap liquidity.
    liquidity_account: Address,
    /// Fee retained by the router (bps of the input value).
    swap_fee_bps: u16,
    /// Token decimals, registered up front.
    decimals: DashMap<Address, u8>,
}

impl std::fmt::Debug for OraclePricedRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OraclePricedRouter")
            .field("liquidity_account", &self.liquidity_account)
            .field("swap_fee_bps", &self.swap_fee_bps)
            .field("token_count", &self.decimals.len())
            .finish()
    }
}

impl OraclePricedRouter {
    pub fn new(prices: Arc<PriceStore>, liquidity_account: Address, swap_fee_bps: u16) -> Self {
        Self {
            prices,
            liquidity_account,
            swap_fee_bps,
            decimals: DashMap::new(),
        }
    }

    /// Register a token's decimals so amounts can be valued.
    pub fn register_token(&self, token: Address, decimals: u8) {
        self.decimals.insert(token, decimals);
    }

    fn unit(&self, token: Address) -> LedgerResult<U256> {
        let decimals = self
            .decimals
            .get(&token)
            .map(|d| *d)
            .ok_or(LedgerError::OraclePriceUnavailable {
                asset: token,
                reason: "token not registered with router".to_string(),
            })?;
        Ok(math::pow10(decimals))
    }
}

impl SwapRouter for OraclePricedRouter {
    fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        now: u64,
    ) -> LedgerResult<U256> {
        let price_in = self.prices.get_price(token_in, now)?;
        let price_out = self.prices.get_price(token_out, now)?;
        let unit_in = self.unit(token_in)?;
        let unit_out = self.unit(token_out)?;

        let value_in = math::mul_div(amount_in, price_in, unit_in)?;
        let value_after_fee = math::apply_bps_discount(value_in, self.swap_fee_bps)?;
        let amount_out = math::mul_div(value_after_fee, unit_out, price_out)?;

        debug!(
            token_in = %token_in,
            token_out = %token_out,
            amount_in = %amount_in,
            amount_out = %amount_out,
            "Swap quoted"
        );
        Ok(amount_out)
    }

    fn build_swap_ops(
        &self,
        trader: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        now: u64,
    ) -> LedgerResult<(U256, Vec<TransferOp>)> {
        let amount_out = self.quote(token_in, token_out, amount_in, now)?;
        let ops = vec![
            TransferOp::new(token_in, trader, self.liquidity_account, amount_in),
            TransferOp::new(token_out, self.liquidity_account, trader, amount_out),
        ];
        Ok((amount_out, ops))
    }
}

/// USD preview of a flash liquidation, computed before any funds move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitEstimate {
    /// USD value of the collateral the liquidator would receive.
    pub collateral_value_usd: f64,
    /// USD value of the debt that must be repaid.
    pub debt_repaid_usd: f64,
    /// Flash loan fee in USD.
    pub flash_fee_usd: f64,
    /// Swap proceeds in USD after router fees.
    pub swap_proceeds_usd: f64,
    /// Proceeds minus debt and fees.
    pub net_profit_usd: f64,
}

impl ProfitEstimate {
    /// Whether the preview clears the given profit floor.
    pub fn clears(&self, min_profit_usd: f64) -> bool {
        self.net_profit_usd >= min_profit_usd
    }

    /// Reject with [`LedgerError::NotProfitable`] below the floor.
    pub fn require(&self, min_profit_usd: f64) -> LedgerResult<()> {
        if self.clears(min_profit_usd) {
            Ok(())
        } else {
            Err(LedgerError::NotProfitable {
                expected: self.net_profit_usd,
                minimum: min_profit_usd,
            })
        }
    }
}

/// Build a profit estimate from WAD values of the moving parts.
///
/// `collateral_value_wad` is the discounted value handed to the
/// liquidator, `debt_value_wad` the repayment, `flash_fee_wad` the loan
/// fee, `swap_proceeds_wad` what the swap returns.
pub fn estimate_profit(
    collateral_value_wad: U256,
    debt_value_wad: U256,
    flash_fee_wad: U256,
    swap_proceeds_wad: U256,
) -> ProfitEstimate {
    let collateral_value_usd = math::wad_to_f64(collateral_value_wad);
    let debt_repaid_usd = math::wad_to_f64(debt_value_wad);
    let flash_fee_usd = math::wad_to_f64(flash_fee_wad);
    let swap_proceeds_usd = math::wad_to_f64(swap_proceeds_wad);
    ProfitEstimate {
        collateral_value_usd,
        debt_repaid_usd,
        flash_fee_usd,
        swap_proceeds_usd,
        net_profit_usd: swap_proceeds_usd - debt_repaid_usd - flash_fee_usd,
    }
}
