//! Margin call bookkeeping for graceful liquidation.
//!
//! A margin call gives the position owner a bounded grace window to cure
//! an under-collateralized position by adding collateral before forced
//! partial liquidation. One active margin call per user.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// An open (or settled) margin call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginCall {
    /// Position owner
    pub user: Address,
    /// When the call was issued
    pub start_time: u64,
    /// Grace deadline; unresolved calls become force-liquidatable after
    pub end_time: u64,
    /// Health factor (WAD) at issuance
    pub initial_health_factor: U256,
    /// Additional collateral value (WAD) that would restore health
    pub required_collateral: U256,
    /// Cured by the owner within the grace window
    pub resolved: bool,
    /// Settled by forced liquidation
    pub liquidated: bool,
}

impl MarginCall {
    pub fn new(
        user: Address,
        now: u64,
        grace_period_secs: u64,
        initial_health_factor: U256,
        required_collateral: U256,
    ) -> Self {
        Self {
            user,
            start_time: now,
            end_time: now + grace_period_secs,
            initial_health_factor,
            required_collateral,
            resolved: false,
            liquidated: false,
        }
    }

    /// Still open: neither cured nor liquidated.
    pub fn is_open(&self) -> bool {
        !self.resolved && !self.liquidated
    }

    /// Grace window has elapsed.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.end_time
    }

    /// Open and past the deadline: eligible for forced liquidation.
    pub fn is_enforceable(&self, now: u64) -> bool {
        self.is_open() && self.is_expired(now)
    }
}
