//! Error taxonomy shared by every engine component.
//!
//! All errors are synchronous rejections of the whole operation; nothing
//! is retried internally. Retry policy belongs to the caller.

use alloy::primitives::Address;
use thiserror::Error;

use crate::access::Role;
use crate::math::MathError;

/// Reason an operation conflicts with current ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateConflictKind {
    /// A margin call or auction is already open for this position.
    PositionAlreadyInLiquidation,
    /// No active margin call to resolve or execute.
    NoActiveMarginCall,
    /// The margin call grace window has not elapsed yet.
    GracePeriodActive,
    /// No active auction for this position.
    NoActiveAuction,
    /// The referenced auction is no longer active.
    AuctionClosed,
    /// Referenced asset/reward pair was never configured.
    DistributionNotConfigured,
    /// Emergency withdrawal proposal does not exist.
    UnknownProposal,
    /// Guardian approvals below the configured quorum.
    InsufficientApprovals,
    /// Proposal was already executed.
    AlreadyExecuted,
    /// Guardian already approved this proposal.
    AlreadyApproved,
    /// Position is healthy; nothing to liquidate.
    PositionHealthy,
    /// Health factor still below threshold; cannot resolve.
    PositionUnhealthy,
}

impl std::fmt::Display for StateConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PositionAlreadyInLiquidation => "position already in liquidation",
            Self::NoActiveMarginCall => "no active margin call",
            Self::GracePeriodActive => "grace period still active",
            Self::NoActiveAuction => "no active auction",
            Self::AuctionClosed => "auction closed",
            Self::DistributionNotConfigured => "distribution not configured",
            Self::UnknownProposal => "unknown proposal",
            Self::InsufficientApprovals => "insufficient guardian approvals",
            Self::AlreadyExecuted => "proposal already executed",
            Self::AlreadyApproved => "guardian already approved",
            Self::PositionHealthy => "position is healthy",
            Self::PositionUnhealthy => "position is still unhealthy",
        };
        f.write_str(s)
    }
}

/// Engine-wide error type.
///
/// `PartialEq` only: `NotProfitable` carries f64 amounts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Bad emission/duration/threshold parameters, rejected at call time.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A fixed-point operation would overflow.
    #[error("arithmetic: {0}")]
    Arithmetic(#[from] MathError),

    /// Caller lacks the required role.
    #[error("unauthorized: caller {caller} lacks role {required:?}")]
    Unauthorized { caller: Address, required: Role },

    /// Operation conflicts with current state.
    #[error("state conflict: {0}")]
    StateConflict(StateConflictKind),

    /// Flash liquidation preview came in below the minimum profit.
    #[error("not profitable: expected {expected} < minimum {minimum}")]
    NotProfitable { expected: f64, minimum: f64 },

    /// Oracle price missing, zero, or stale.
    #[error("oracle price unavailable for {asset}: {reason}")]
    OraclePriceUnavailable { asset: Address, reason: String },

    /// A bank account holds less than the requested amount.
    #[error("insufficient balance: {holder} holds too little {token}")]
    InsufficientBalance { token: Address, holder: Address },
}

impl LedgerError {
    /// Shorthand for configuration rejections.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Convenience alias used across the engine crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_profitable_compares_and_displays() {
        let a = LedgerError::NotProfitable {
            expected: 0.5,
            minimum: 1.0,
        };
        let b = LedgerError::NotProfitable {
            expected: 0.5,
            minimum: 1.0,
        };
        assert_eq!(a, b);
        assert_ne!(
            a,
            LedgerError::NotProfitable {
                expected: 0.9,
                minimum: 1.0,
            }
        );
        assert_eq!(a.to_string(), "not profitable: expected 0.5 < minimum 1");
    }
}
