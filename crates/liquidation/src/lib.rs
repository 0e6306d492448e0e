//! Liquidation side of the ledgerd engine.
//!
//! Tracks collateralized positions, runs the graceful margin-call flow,
//! Dutch auctions, and atomic flash liquidations, and reports shortfalls
//! to the treasury for bad-debt coverage.

pub mod auction;
pub mod engine;
pub mod flash;
pub mod margin_call;
pub mod position;

pub use auction::{Auction, AuctionFill};
pub use engine::LiquidationEngine;
pub use flash::{OraclePricedRouter, ProfitEstimate, SwapRouter};
pub use margin_call::MarginCall;
pub use position::{CollateralEntry, DebtEntry, Position, PositionState};
