//! Capability-based access control.
//!
//! Callers present an identity plus a set of granted roles; each
//! state-changing operation names the role it requires and checks it up
//! front. This keeps authorization decoupled from any signature or
//! session scheme.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Roles recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Configure reward distributions (emission rate, distribution end).
    EmissionManager,
    /// Settle reward transfers through a transfer strategy.
    RewardSettlement,
    /// Settle claims on behalf of users.
    ClaimsProcessor,
    /// Operate the liquidation engine (margin calls, auctions).
    LiquidationOperator,
    /// Report bad debt and draw treasury coverage.
    TreasuryEngine,
    /// Approve treasury emergency withdrawals.
    Guardian,
    /// Recover misrouted funds from transfer strategies.
    EmergencyAdmin,
}

/// An authenticated caller: identity plus granted roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Caller identity.
    pub id: Address,
    /// Roles granted to this identity.
    pub roles: Vec<Role>,
}

impl Caller {
    /// Create a caller with the given roles.
    pub fn new(id: Address, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    /// A caller with no roles (an ordinary user).
    pub fn user(id: Address) -> Self {
        Self {
            id,
            roles: Vec::new(),
        }
    }

    /// Check whether the caller holds a role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Require a role, rejecting with `Unauthorized` otherwise.
    pub fn require(&self, role: Role) -> LedgerResult<()> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: self.id,
                required: role,
            })
        }
    }

    /// Require either a role or a specific identity (e.g. "the user
    /// themself or a claims processor").
    pub fn require_role_or_self(&self, role: Role, subject: Address) -> LedgerResult<()> {
        if self.id == subject || self.has_role(role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: self.id,
                required: role,
            })
        }
    }
}
