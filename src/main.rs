//! ledgerd
//!
//! Reward-accrual and liquidation accounting daemon. State lives in
//! process; commands arrive as newline-delimited JSON on stdin and every
//! response (plus any emitted ledger events) leaves as JSON on stdout.
//! Role-bearing addresses are fixed at startup from the environment.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledgerd_accrual::{PullTransferStrategy, RewardIndexLedger, StakedTransferStrategy, TreasuryLedger};
use ledgerd_core::{Bank, Caller, EngineConfig, EventLog, LedgerResult, PriceStore, Role};
use ledgerd_liquidation::{LiquidationEngine, OraclePricedRouter};

/// Environment variable names.
mod env {
    pub const ADMIN: &str = "LEDGERD_ADMIN";
    pub const OPERATOR: &str = "LEDGERD_OPERATOR";
    pub const GUARDIANS: &str = "LEDGERD_GUARDIANS";
    pub const CUSTODY: &str = "LEDGERD_CUSTODY";
    pub const FLASH_POOL: &str = "LEDGERD_FLASH_POOL";
    pub const ROUTER_ACCOUNT: &str = "LEDGERD_ROUTER_ACCOUNT";
    pub const TREASURY_ACCOUNT: &str = "LEDGERD_TREASURY_ACCOUNT";
    pub const SWAP_FEE_BPS: &str = "LEDGERD_SWAP_FEE_BPS";
}

fn env_address(name: &str, default: Address) -> Result<Address> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<Address>()
            .with_context(|| format!("{name} is not a valid address: {raw}")),
        Err(_) => Ok(default),
    }
}

fn env_addresses(name: &str) -> Result<Vec<Address>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse::<Address>()
                    .with_context(|| format!("{name} holds an invalid address: {s}"))
            })
            .collect(),
        Err(_) => Ok(Vec::new()),
    }
}

/// Wall clock unless the command pins a timestamp.
fn resolve_now(at: Option<u64>) -> u64 {
    at.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Command {
    // Substrate
    SetPrice { asset: Address, price: U256, at: Option<u64> },
    Credit { token: Address, holder: Address, amount: U256 },
    BalanceOf { token: Address, holder: Address },

    // Reward accrual
    ConfigureReward {
        caller: Address,
        asset: Address,
        reward: Address,
        emission_per_second: U256,
        distribution_end: u64,
        total_supply: U256,
        decimals: u8,
        at: Option<u64>,
    },
    SetPullStrategy { caller: Address, reward: Address, funding_source: Address },
    SetStakedStrategy {
        caller: Address,
        reward: Address,
        funding_source: Address,
        staking_vault: Address,
    },
    BalanceChange {
        user: Address,
        asset: Address,
        old_balance: U256,
        new_balance: U256,
        total_supply: U256,
        at: Option<u64>,
    },
    PendingRewards {
        user: Address,
        asset: Address,
        reward: Address,
        balance: U256,
        total_supply: U256,
        at: Option<u64>,
    },
    ClaimRewards { caller: Address, user: Address, asset: Address, reward: Address, to: Address },

    // Positions and liquidation
    DepositCollateral {
        user: Address,
        asset: Address,
        amount: U256,
        decimals: u8,
        liquidation_threshold_bps: u16,
    },
    RecordDebt { user: Address, asset: Address, amount: U256, decimals: u8 },
    RegisterRouterToken { token: Address, decimals: u8 },
    CheckPosition { user: Address, at: Option<u64> },
    HealthFactor { user: Address, at: Option<u64> },
    ResolveMarginCall { user: Address, at: Option<u64> },
    PartialLiquidation { caller: Address, user: Address, at: Option<u64> },
    StartAuction { caller: Address, user: Address, at: Option<u64> },
    ExecuteAuction { bidder: Address, user: Address, max_payment: U256, at: Option<u64> },
    CloseAuction { caller: Address, user: Address, at: Option<u64> },
    FlashProfit { user: Address, at: Option<u64> },
    FlashLiquidate { caller: Address, user: Address, at: Option<u64> },
    SetMinProfit { liquidator: Address, min_profit_usd: f64 },

    // Treasury
    TreasuryDeposit { token: Address, from: Address, amount: U256 },
    TreasuryReserve { token: Address },
    ProposeWithdrawal { caller: Address, token: Address, to: Address, amount: U256 },
    ApproveWithdrawal { caller: Address, id: u64 },
    ExecuteWithdrawal { caller: Address, id: u64 },

    Shutdown,
}

/// All engine components, wired once at startup.
struct App {
    bank: Arc<Bank>,
    prices: Arc<PriceStore>,
    events: Arc<EventLog>,
    rewards: RewardIndexLedger,
    treasury: Arc<TreasuryLedger>,
    engine: LiquidationEngine,
    router: Arc<OraclePricedRouter>,
    admin: Address,
    operator: Address,
    guardians: Vec<Address>,
}

impl App {
    /// Map a bare address to its granted roles. Unknown addresses are
    /// plain users.
    fn resolve_caller(&self, id: Address) -> Caller {
        let mut roles = Vec::new();
        if id == self.admin {
            roles.extend([
                Role::EmissionManager,
                Role::ClaimsProcessor,
                Role::TreasuryEngine,
                Role::EmergencyAdmin,
            ]);
        }
        if id == self.operator {
            roles.push(Role::LiquidationOperator);
        }
        if self.guardians.contains(&id) {
            roles.push(Role::Guardian);
        }
        Caller::new(id, roles)
    }

    fn handle(&self, command: Command) -> LedgerResult<Value> {
        match command {
            Command::SetPrice { asset, price, at } => {
                self.prices.set_price(asset, price, resolve_now(at));
                Ok(json!({ "asset": asset, "price": price }))
            }
            Command::Credit { token, holder, amount } => {
                self.bank.credit(token, holder, amount)?;
                Ok(json!({ "balance": self.bank.balance_of(token, holder) }))
            }
            Command::BalanceOf { token, holder } => {
                Ok(json!({ "balance": self.bank.balance_of(token, holder) }))
            }

            Command::ConfigureReward {
                caller,
                asset,
                reward,
                emission_per_second,
                distribution_end,
                total_supply,
                decimals,
                at,
            } => {
                self.rewards.configure_asset(
                    &self.resolve_caller(caller),
                    asset,
                    reward,
                    emission_per_second,
                    distribution_end,
                    total_supply,
                    decimals,
                    resolve_now(at),
                )?;
                Ok(json!({ "configured": true }))
            }
            Command::SetPullStrategy { caller, reward, funding_source } => {
                let strategy = Arc::new(PullTransferStrategy::new(
                    self.bank.clone(),
                    funding_source,
                    self.rewards.settlement_id(),
                    self.admin,
                ));
                self.rewards
                    .set_transfer_strategy(&self.resolve_caller(caller), reward, strategy)?;
                Ok(json!({ "strategy": "pull" }))
            }
            Command::SetStakedStrategy { caller, reward, funding_source, staking_vault } => {
                let strategy = Arc::new(StakedTransferStrategy::new(
                    self.bank.clone(),
                    reward,
                    funding_source,
                    staking_vault,
                    self.rewards.settlement_id(),
                    self.admin,
                ));
                self.rewards
                    .set_transfer_strategy(&self.resolve_caller(caller), reward, strategy)?;
                Ok(json!({ "strategy": "staked" }))
            }
            Command::BalanceChange { user, asset, old_balance, new_balance, total_supply, at } => {
                self.rewards.handle_balance_change(
                    user,
                    asset,
                    old_balance,
                    new_balance,
                    total_supply,
                    resolve_now(at),
                )?;
                Ok(json!({ "settled": true }))
            }
            Command::PendingRewards { user, asset, reward, balance, total_supply, at } => {
                let pending = self.rewards.pending_rewards(
                    user,
                    asset,
                    reward,
                    balance,
                    total_supply,
                    resolve_now(at),
                )?;
                Ok(json!({ "pending": pending }))
            }
            Command::ClaimRewards { caller, user, asset, reward, to } => {
                let amount =
                    self.rewards
                        .claim(&self.resolve_caller(caller), user, asset, reward, to)?;
                Ok(json!({ "claimed": amount }))
            }

            Command::DepositCollateral { user, asset, amount, decimals, liquidation_threshold_bps } => {
                self.engine
                    .deposit_collateral(user, asset, amount, decimals, liquidation_threshold_bps)?;
                Ok(json!({ "deposited": amount }))
            }
            Command::RecordDebt { user, asset, amount, decimals } => {
                self.engine.record_debt(user, asset, amount, decimals)?;
                Ok(json!({ "recorded": amount }))
            }
            Command::RegisterRouterToken { token, decimals } => {
                self.router.register_token(token, decimals);
                Ok(json!({ "registered": token }))
            }
            Command::CheckPosition { user, at } => {
                let state = self.engine.check_position(user, resolve_now(at))?;
                Ok(json!({ "state": format!("{state:?}") }))
            }
            Command::HealthFactor { user, at } => {
                let hf = self.engine.health_factor(&user, resolve_now(at))?;
                Ok(json!({ "health_factor_wad": hf }))
            }
            Command::ResolveMarginCall { user, at } => {
                self.engine.resolve_margin_call(user, resolve_now(at))?;
                Ok(json!({ "resolved": true }))
            }
            Command::PartialLiquidation { caller, user, at } => {
                let fill = self.engine.execute_partial_liquidation(
                    &self.resolve_caller(caller),
                    user,
                    resolve_now(at),
                )?;
                Ok(json!({
                    "payment": fill.payment,
                    "collateral_seized": fill.collateral_seized,
                    "full": fill.full,
                }))
            }
            Command::StartAuction { caller, user, at } => {
                let auction =
                    self.engine
                        .start_auction(&self.resolve_caller(caller), user, resolve_now(at))?;
                Ok(json!({
                    "collateral_asset": auction.collateral_asset,
                    "debt_asset": auction.debt_asset,
                    "start_price": auction.start_price,
                    "duration_secs": auction.duration_secs,
                }))
            }
            Command::ExecuteAuction { bidder, user, max_payment, at } => {
                let fill = self
                    .engine
                    .execute_auction(bidder, user, max_payment, resolve_now(at))?;
                Ok(json!({
                    "payment": fill.payment,
                    "collateral_seized": fill.collateral_seized,
                    "full": fill.full,
                }))
            }
            Command::CloseAuction { caller, user, at } => {
                self.engine
                    .close_expired_auction(&self.resolve_caller(caller), user, resolve_now(at))?;
                Ok(json!({ "closed": true }))
            }
            Command::FlashProfit { user, at } => {
                let estimate = self.engine.calculate_profit(user, resolve_now(at))?;
                Ok(json!({
                    "collateral_value_usd": estimate.collateral_value_usd,
                    "debt_repaid_usd": estimate.debt_repaid_usd,
                    "flash_fee_usd": estimate.flash_fee_usd,
                    "net_profit_usd": estimate.net_profit_usd,
                }))
            }
            Command::FlashLiquidate { caller, user, at } => {
                let estimate = self.engine.flash_liquidate(
                    &self.resolve_caller(caller),
                    user,
                    resolve_now(at),
                )?;
                Ok(json!({ "net_profit_usd": estimate.net_profit_usd }))
            }
            Command::SetMinProfit { liquidator, min_profit_usd } => {
                self.engine.set_min_profit_override(liquidator, min_profit_usd);
                Ok(json!({ "min_profit_usd": min_profit_usd }))
            }

            Command::TreasuryDeposit { token, from, amount } => {
                self.treasury.deposit(token, from, amount)?;
                Ok(json!({ "deposited": amount }))
            }
            Command::TreasuryReserve { token } => {
                let r = self.treasury.reserve(&token);
                Ok(json!({
                    "total": r.total,
                    "allocated": r.allocated,
                    "available": r.available,
                    "bad_debt_covered": r.bad_debt_covered,
                }))
            }
            Command::ProposeWithdrawal { caller, token, to, amount } => {
                let id = self.treasury.propose_emergency_withdrawal(
                    &self.resolve_caller(caller),
                    token,
                    to,
                    amount,
                )?;
                Ok(json!({ "id": id }))
            }
            Command::ApproveWithdrawal { caller, id } => {
                let approvals = self
                    .treasury
                    .approve_emergency_withdrawal(&self.resolve_caller(caller), id)?;
                Ok(json!({ "approvals": approvals }))
            }
            Command::ExecuteWithdrawal { caller, id } => {
                self.treasury
                    .execute_emergency_withdrawal(&self.resolve_caller(caller), id)?;
                Ok(json!({ "executed": true }))
            }

            Command::Shutdown => Ok(json!({ "shutdown": true })),
        }
    }
}

fn build_app(config: EngineConfig) -> Result<App> {
    let admin = env_address(env::ADMIN, Address::repeat_byte(0xA0))?;
    let operator = env_address(env::OPERATOR, Address::repeat_byte(0xB0))?;
    let guardians = env_addresses(env::GUARDIANS)?;
    let custody = env_address(env::CUSTODY, Address::repeat_byte(0xC0))?;
    let flash_pool = env_address(env::FLASH_POOL, Address::repeat_byte(0xD0))?;
    let router_account = env_address(env::ROUTER_ACCOUNT, Address::repeat_byte(0xE0))?;
    let treasury_account = env_address(env::TREASURY_ACCOUNT, Address::repeat_byte(0xF0))?;
    let swap_fee_bps: u16 = std::env::var(env::SWAP_FEE_BPS)
        .ok()
        .map(|v| v.parse())
        .transpose()
        .context("invalid swap fee")?
        .unwrap_or(30);

    let bank = Arc::new(Bank::new());
    let prices = Arc::new(PriceStore::new(config.oracle.max_price_age_secs));
    let events = Arc::new(EventLog::new());

    let rewards = RewardIndexLedger::new(custody, events.clone());
    let treasury = Arc::new(TreasuryLedger::new(
        bank.clone(),
        treasury_account,
        config.treasury.guardian_quorum,
        events.clone(),
    ));
    let router = Arc::new(OraclePricedRouter::new(
        prices.clone(),
        router_account,
        swap_fee_bps,
    ));
    let engine = LiquidationEngine::new(
        config,
        prices.clone(),
        bank.clone(),
        treasury.clone(),
        router.clone(),
        events.clone(),
        custody,
        flash_pool,
    );

    info!(
        admin = %admin,
        operator = %operator,
        guardian_count = guardians.len(),
        custody = %custody,
        "Engine components wired"
    );
    Ok(App {
        bank,
        prices,
        events,
        rewards,
        treasury,
        engine,
        router,
        admin,
        operator,
        guardians,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("ledgerd=info,ledgerd_core=info,ledgerd_accrual=info,ledgerd_liquidation=info")
        }))
        .init();

    let config = EngineConfig::from_env()?;
    config.validate()?;
    config.log_config();

    let app = build_app(config)?;
    info!("ledgerd ready; reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                error!(error = %e, "Unparseable command");
                println!("{}", json!({ "ok": false, "error": format!("bad command: {e}") }));
                continue;
            }
        };
        let shutdown = matches!(command, Command::Shutdown);

        match app.handle(command) {
            Ok(result) => println!("{}", json!({ "ok": true, "result": result })),
            Err(e) => println!("{}", json!({ "ok": false, "error": e.to_string() })),
        }
        // Flush events raised by the command.
        for event in app.events.drain() {
            println!("{}", json!({ "event": event }));
        }

        if shutdown {
            break;
        }
    }

    info!("ledgerd shutting down");
    Ok(())
}
