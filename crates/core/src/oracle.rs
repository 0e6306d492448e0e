//! Price store with staleness rejection.
//!
//! Prices are pushed in by an external oracle collaborator; the engine
//! only reads them. A missing, zero, or stale price rejects the read with
//! [`LedgerError::OraclePriceUnavailable`]; the engine never proceeds
//! with a default price.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

/// A single observed price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    /// Price in WAD (18 decimals), quote per whole unit of the asset.
    pub price: U256,
    /// Unix timestamp of the observation.
    pub updated_at: u64,
}

impl PricePoint {
    /// Check if the observation is older than `max_age_secs`.
    pub fn is_stale(&self, max_age_secs: u64, now: u64) -> bool {
        now.saturating_sub(self.updated_at) > max_age_secs
    }

    /// Age in seconds at `now`.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.updated_at)
    }
}

/// Thread-safe per-asset price store.
pub struct PriceStore {
    prices: DashMap<Address, PricePoint>,
    max_age_secs: u64,
}

impl std::fmt::Debug for PriceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceStore")
            .field("asset_count", &self.prices.len())
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl PriceStore {
    /// Create a store that rejects prices older than `max_age_secs`.
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            prices: DashMap::new(),
            max_age_secs,
        }
    }

    /// Record a price observation for an asset.
    pub fn set_price(&self, asset: Address, price: U256, now: u64) {
        debug!(asset = %asset, price = %price, "Price updated");
        self.prices.insert(
            asset,
            PricePoint {
                price,
                updated_at: now,
            },
        );
    }

    /// Get a usable price for an asset, rejecting missing/zero/stale data.
    pub fn get_price(&self, asset: Address, now: u64) -> LedgerResult<U256> {
        let point = self.prices.get(&asset).ok_or_else(|| {
            LedgerError::OraclePriceUnavailable {
                asset,
                reason: "no price recorded".to_string(),
            }
        })?;

        if point.price.is_zero() {
            return Err(LedgerError::OraclePriceUnavailable {
                asset,
                reason: "zero price".to_string(),
            });
        }

        if point.is_stale(self.max_age_secs, now) {
            return Err(LedgerError::OraclePriceUnavailable {
                asset,
                reason: format!("stale by {}s", point.age_secs(now)),
            });
        }

        Ok(point.price)
    }

    /// Raw observation, regardless of staleness.
    pub fn get_point(&self, asset: &Address) -> Option<PricePoint> {
        self.prices.get(asset).map(|p| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    fn asset() -> Address {
        Address::from([0xAAu8; 20])
    }

    #[test]
    fn test_fresh_price_roundtrip() {
        let store = PriceStore::new(60);
        store.set_price(asset(), U256::from(2000u64) * WAD, 1_000);
        assert_eq!(
            store.get_price(asset(), 1_030).unwrap(),
            U256::from(2000u64) * WAD
        );
    }

    #[test]
    fn test_stale_price_rejected() {
        let store = PriceStore::new(60);
        store.set_price(asset(), WAD, 1_000);
        assert!(matches!(
            store.get_price(asset(), 1_061),
            Err(LedgerError::OraclePriceUnavailable { .. })
        ));
        // Exactly at the boundary is still fresh
        assert!(store.get_price(asset(), 1_060).is_ok());
    }

    #[test]
    fn test_zero_and_missing_rejected() {
        let store = PriceStore::new(60);
        assert!(store.get_price(asset(), 0).is_err());
        store.set_price(asset(), U256::ZERO, 0);
        assert!(store.get_price(asset(), 0).is_err());
    }
}
