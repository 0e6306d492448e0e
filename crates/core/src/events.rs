//! Typed observability events.
//!
//! Events are emitted for observers (logs, the JSON command-loop output);
//! nothing inside the engine consumes them. Components push into a shared
//! [`EventLog`], which also mirrors every event to `tracing`.

use alloy::primitives::{Address, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// How an auction fill was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Collateral delivered in kind to the bidder.
    PhysicalDelivery,
    /// Fill closed the position by writing the remaining debt down
    /// against treasury coverage instead of collateral.
    CashSettled,
}

/// Terminal liquidation outcome for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationOutcome {
    Partial,
    Full,
}

/// Everything the engine reports to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    RewardConfigured {
        asset: Address,
        reward: Address,
        emission_per_second: U256,
        distribution_end: u64,
    },
    RewardsAccrued {
        user: Address,
        asset: Address,
        reward: Address,
        amount: U256,
    },
    RewardsClaimed {
        user: Address,
        to: Address,
        reward: Address,
        amount: U256,
    },
    MarginCallIssued {
        user: Address,
        deadline: u64,
        health_factor_wad: U256,
    },
    MarginCallResolved {
        user: Address,
    },
    AuctionStarted {
        user: Address,
        collateral_asset: Address,
        debt_asset: Address,
        start_price: U256,
    },
    AuctionExecuted {
        user: Address,
        bidder: Address,
        payment: U256,
        collateral_seized: U256,
        settlement: Settlement,
    },
    PositionLiquidated {
        user: Address,
        outcome: LiquidationOutcome,
    },
    BadDebtReported {
        user: Address,
        token: Address,
        shortfall: U256,
    },
    BadDebtCovered {
        token: Address,
        amount: U256,
    },
    EmergencyWithdrawalExecuted {
        token: Address,
        to: Address,
        amount: U256,
    },
}

/// Shared append-only event log.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<LedgerEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event and mirror it to tracing.
    pub fn emit(&self, event: LedgerEvent) {
        info!(event = ?event, "ledger event");
        self.entries.lock().push(event);
    }

    /// Snapshot of all recorded events.
    pub fn snapshot(&self) -> Vec<LedgerEvent> {
        self.entries.lock().clone()
    }

    /// Drain recorded events (used by the command loop to flush output).
    pub fn drain(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_drain() {
        let log = EventLog::new();
        log.emit(LedgerEvent::MarginCallResolved {
            user: Address::ZERO,
        });
        assert_eq!(log.len(), 1);
        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(log.is_empty());
    }
}
