//! Shared substrate for the ledgerd engine.
//!
//! This crate provides the pieces every other component builds on:
//! - Overflow-checked WAD/RAY fixed-point arithmetic with uniform rounding
//! - The engine-wide error taxonomy
//! - Capability-based access control (caller identity + granted roles)
//! - A price store that rejects stale or zero oracle data
//! - An in-memory token bank with atomic multi-leg transfers
//! - Typed observability events
//! - Profile-based engine configuration
//!
//! All state lives in explicitly constructed structs handed to component
//! constructors; there are no process-wide singletons.

pub mod access;
pub mod bank;
pub mod config;
pub mod error;
pub mod events;
pub mod math;
pub mod oracle;

pub use access::{Caller, Role};
pub use bank::{Bank, TransferOp};
pub use config::{
    AuctionConfig, DecayMode, EngineConfig, FlashConfig, LiquidationConfig, OracleConfig,
    TreasuryConfig,
};
pub use error::{LedgerError, LedgerResult, StateConflictKind};
pub use events::{EventLog, LedgerEvent, LiquidationOutcome, Settlement};
pub use math::MathError;
pub use oracle::{PricePoint, PriceStore};
