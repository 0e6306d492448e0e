//! Accrual-side components of the ledgerd engine.
//!
//! This crate owns everything that accounts for funds owed:
//! - The index-based reward accrual ledger (O(1) per balance event)
//! - Transfer strategies that deliver settled reward amounts (pull or
//!   auto-compounding stake)
//! - The treasury reserve ledger backing bad-debt coverage, insurance
//!   claims, and quorum-gated emergency withdrawals

pub mod rewards;
pub mod transfer;
pub mod treasury;

pub use rewards::{RewardData, RewardIndexLedger, UserData};
pub use transfer::{PullTransferStrategy, StakedTransferStrategy, TransferStrategy};
pub use treasury::{EmergencyWithdrawal, Reserve, TreasuryLedger};
