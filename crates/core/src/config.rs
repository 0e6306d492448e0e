//! Engine configuration with profile support.
//!
//! Parameters are authored by an administrative collaborator; the engine
//! validates them at load time but does not invent them. Unlike a global
//! singleton, the loaded config is passed explicitly into each component
//! constructor.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Price decay curve for Dutch auctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    /// Discount widens linearly with elapsed time.
    #[default]
    Linear,
    /// Discount widens with the square of elapsed progress: slow at
    /// first, steep near expiry. Endpoints match the linear curve.
    Exponential,
}

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Oracle staleness bound
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Health-factor thresholds and graceful-liquidation parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Dutch auction parameters
    #[serde(default)]
    pub auction: AuctionConfig,

    /// Flash liquidation parameters
    #[serde(default)]
    pub flash: FlashConfig,

    /// Treasury guardian quorum
    #[serde(default)]
    pub treasury: TreasuryConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Oracle read policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Maximum price age before reads are rejected (seconds)
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

fn default_max_price_age() -> u64 {
    300
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_price_age_secs: default_max_price_age(),
        }
    }
}

/// Health-factor thresholds and graceful-mode parameters.
///
/// Thresholds are WAD-scaled health factors expressed in basis points of
/// 1.0 (e.g. 11000 = HF 1.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// HF below this emits a warning (bps of 1.0)
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_bps: u16,

    /// HF below this opens a margin call (bps of 1.0)
    #[serde(default = "default_margin_call_threshold")]
    pub margin_call_threshold_bps: u16,

    /// Grace window before forced partial liquidation (seconds)
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Bonus collateral granted to the liquidator (bps)
    #[serde(default = "default_liquidation_bonus")]
    pub liquidation_bonus_bps: u16,

    /// Largest fraction of collateral seizable in one partial
    /// liquidation (bps)
    #[serde(default = "default_max_partial")]
    pub max_partial_liquidation_bps: u16,
}

fn default_warning_threshold() -> u16 {
    11_000
}
fn default_margin_call_threshold() -> u16 {
    10_000
}
fn default_grace_period() -> u64 {
    3_600
}
fn default_liquidation_bonus() -> u16 {
    500
}
fn default_max_partial() -> u16 {
    5_000
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            warning_threshold_bps: default_warning_threshold(),
            margin_call_threshold_bps: default_margin_call_threshold(),
            grace_period_secs: default_grace_period(),
            liquidation_bonus_bps: default_liquidation_bonus(),
            max_partial_liquidation_bps: default_max_partial(),
        }
    }
}

/// Dutch auction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Auction duration (seconds)
    #[serde(default = "default_auction_duration")]
    pub duration_secs: u64,

    /// Discount at auction start (bps)
    #[serde(default = "default_start_discount")]
    pub start_discount_bps: u16,

    /// Discount at auction end; price never decays past this (bps)
    #[serde(default = "default_end_discount")]
    pub end_discount_bps: u16,

    /// Price decay curve
    #[serde(default)]
    pub decay_mode: DecayMode,
}

fn default_auction_duration() -> u64 {
    1_800
}
fn default_start_discount() -> u16 {
    100
}
fn default_end_discount() -> u16 {
    1_500
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_auction_duration(),
            start_discount_bps: default_start_discount(),
            end_discount_bps: default_end_discount(),
            decay_mode: DecayMode::default(),
        }
    }
}

/// Flash liquidation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Fee charged on the flash-borrowed amount (bps)
    #[serde(default = "default_flash_fee")]
    pub flash_fee_bps: u16,

    /// Minimum net profit in USD before execution proceeds
    #[serde(default = "default_min_profit")]
    pub min_profit_usd: f64,

    /// Collateral discount granted to flash liquidators (bps)
    #[serde(default = "default_flash_discount")]
    pub collateral_discount_bps: u16,
}

fn default_flash_fee() -> u16 {
    9
}
fn default_min_profit() -> f64 {
    1.0
}
fn default_flash_discount() -> u16 {
    500
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            flash_fee_bps: default_flash_fee(),
            min_profit_usd: default_min_profit(),
            collateral_discount_bps: default_flash_discount(),
        }
    }
}

/// Treasury guardian quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryConfig {
    /// Minimum guardian approvals before an emergency withdrawal executes
    #[serde(default = "default_quorum")]
    pub guardian_quorum: usize,
}

fn default_quorum() -> usize {
    3
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            guardian_quorum: default_quorum(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::config(format!("cannot read {path}: {e}")))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| LedgerError::config(format!("bad TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Testing profile: short windows, no profit floor.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            oracle: OracleConfig {
                max_price_age_secs: 3_600,
            },
            liquidation: LiquidationConfig {
                grace_period_secs: 60,
                ..Default::default()
            },
            auction: AuctionConfig {
                duration_secs: 100,
                ..Default::default()
            },
            flash: FlashConfig {
                min_profit_usd: 0.0,
                ..Default::default()
            },
            treasury: TreasuryConfig { guardian_quorum: 1 },
        }
    }

    /// Production profile: conservative defaults.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            oracle: OracleConfig::default(),
            liquidation: LiquidationConfig::default(),
            auction: AuctionConfig::default(),
            flash: FlashConfig::default(),
            treasury: TreasuryConfig { guardian_quorum: 3 },
        }
    }

    /// Select a profile from LEDGERD_PROFILE: testing, production, or a
    /// TOML file path.
    pub fn from_env() -> LedgerResult<Self> {
        let profile = std::env::var("LEDGERD_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Ok(Self::testing()),
            "production" | "prod" => Ok(Self::production()),
            "default" => Ok(Self::default()),
            path => Self::from_file(path),
        }
    }

    /// Reject inconsistent parameter combinations.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.liquidation.warning_threshold_bps < self.liquidation.margin_call_threshold_bps {
            return Err(LedgerError::config(
                "warning threshold must be at or above the margin-call threshold",
            ));
        }
        if self.liquidation.max_partial_liquidation_bps > 10_000 {
            return Err(LedgerError::config(
                "max partial liquidation cannot exceed 100%",
            ));
        }
        if self.auction.end_discount_bps < self.auction.start_discount_bps {
            return Err(LedgerError::config(
                "end discount must be at or past the start discount",
            ));
        }
        if self.auction.end_discount_bps >= 10_000 {
            return Err(LedgerError::config("end discount must stay below 100%"));
        }
        if self.auction.duration_secs == 0 {
            return Err(LedgerError::config("auction duration cannot be zero"));
        }
        if self.treasury.guardian_quorum == 0 {
            return Err(LedgerError::config("guardian quorum cannot be zero"));
        }
        Ok(())
    }

    /// Log the loaded configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            warning_bps = self.liquidation.warning_threshold_bps,
            margin_call_bps = self.liquidation.margin_call_threshold_bps,
            grace_secs = self.liquidation.grace_period_secs,
            bonus_bps = self.liquidation.liquidation_bonus_bps,
            "Liquidation thresholds"
        );
        tracing::info!(
            duration_secs = self.auction.duration_secs,
            start_discount_bps = self.auction.start_discount_bps,
            end_discount_bps = self.auction.end_discount_bps,
            decay = ?self.auction.decay_mode,
            "Auction parameters"
        );
        tracing::info!(
            flash_fee_bps = self.flash.flash_fee_bps,
            min_profit_usd = self.flash.min_profit_usd,
            "Flash liquidation parameters"
        );
        tracing::info!(
            guardian_quorum = self.treasury.guardian_quorum,
            max_price_age_secs = self.oracle.max_price_age_secs,
            "Treasury/oracle parameters"
        );
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            oracle: OracleConfig::default(),
            liquidation: LiquidationConfig::default(),
            auction: AuctionConfig::default(),
            flash: FlashConfig::default(),
            treasury: TreasuryConfig {
                guardian_quorum: default_quorum(),
            },
        }
    }
}
