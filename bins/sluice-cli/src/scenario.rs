//! JSON scenario runner.
//!
//! A scenario drives a [`FeeDistributor`] against the in-memory ledger and
//! asset under a manual clock. Accounts are named by label (hashed with
//! [`AccountId::derive`]) or given as `0x` hex. The labels `distributor`,
//! `ledger` and `asset` name the collaborators themselves.
//!
//! A failing step is recorded in the report and the run continues.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use sluice_core::asset::MemoryAsset;
use sluice_core::clock::ManualClock;
use sluice_core::constants::MAX_LOCK_TIME;
use sluice_core::ledger::MemoryLedger;
use sluice_core::store::{DistributorStore, Globals, WeekRecord};
use sluice_core::traits::{AssetTransfer, Clock, DecayLedger};
use sluice_core::types::{AccountId, DistributorEvent};
use sluice_distributor::{DistributorParams, FeeDistributor};
use sluice_node::Keeper;

pub const DISTRIBUTOR: &str = "distributor";
pub const LEDGER: &str = "ledger";
pub const ASSET: &str = "asset";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub start_time: u64,
    /// Ledger's maximum lock duration (defaults to four years).
    #[serde(default)]
    pub max_lock_time: Option<u64>,
    /// Overrides the configured distributor parameters.
    #[serde(default)]
    pub params: Option<DistributorParams>,
    /// Initial funding-asset balances by account.
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Advance { seconds: u64 },
    SetTime { ts: u64 },
    Mint { to: String, amount: u64 },
    /// Untracked transfer straight to the distributor.
    Fund { amount: u64 },
    Approve { owner: String, spender: String, amount: u64 },
    Lock { account: String, amount: u64, unlock_time: u64 },
    IncreaseAmount { account: String, amount: u64 },
    ExtendLock { account: String, unlock_time: u64 },
    Deposit {
        from: String,
        #[serde(default)]
        amount: Option<u64>,
    },
    CheckpointToken,
    CheckpointTotalSupply,
    Claim {
        caller: String,
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        relock: bool,
    },
    ClaimMany {
        caller: String,
        accounts: Vec<String>,
        #[serde(default)]
        relock: bool,
    },
    /// Claim repeatedly until the account is caught up.
    ClaimFully {
        caller: String,
        account: String,
        #[serde(default)]
        relock: bool,
    },
    ToggleRelock { account: String, delegate: String },
    /// Catch up supply, then tokens.
    Tick,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Advance { .. } => "advance",
            Step::SetTime { .. } => "set_time",
            Step::Mint { .. } => "mint",
            Step::Fund { .. } => "fund",
            Step::Approve { .. } => "approve",
            Step::Lock { .. } => "lock",
            Step::IncreaseAmount { .. } => "increase_amount",
            Step::ExtendLock { .. } => "extend_lock",
            Step::Deposit { .. } => "deposit",
            Step::CheckpointToken => "checkpoint_token",
            Step::CheckpointTotalSupply => "checkpoint_total_supply",
            Step::Claim { .. } => "claim",
            Step::ClaimMany { .. } => "claim_many",
            Step::ClaimFully { .. } => "claim_fully",
            Step::ToggleRelock { .. } => "toggle_relock",
            Step::Tick => "tick",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    /// Clock after the step.
    pub now: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub steps: Vec<StepReport>,
    pub globals: Globals,
    pub weeks: Vec<WeekRecord>,
    /// Final funding-asset balances of every named account.
    pub balances: BTreeMap<String, u64>,
    pub events: Vec<DistributorEvent>,
}

impl Report {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Parse a scenario document.
pub fn parse(text: &str) -> Result<Scenario> {
    serde_json::from_str(text).context("invalid scenario")
}

fn resolve(name: &str) -> Result<AccountId> {
    if name.starts_with("0x") {
        name.parse().with_context(|| format!("invalid account {name}"))
    } else {
        Ok(AccountId::derive(name))
    }
}

/// A distributor wired to in-memory collaborators.
pub struct Simulation<S: DistributorStore> {
    clock: Arc<ManualClock>,
    asset: Arc<MemoryAsset>,
    ledger: Arc<MemoryLedger>,
    keeper: Keeper<S>,
    names: BTreeMap<String, AccountId>,
}

impl<S: DistributorStore> Simulation<S> {
    /// `distributor` is the identity the distributor holds funds under; the
    /// scenario label `"distributor"` refers to it.
    pub fn new(scenario: &Scenario, distributor: AccountId, store: S, params: DistributorParams) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(scenario.start_time));
        let asset = Arc::new(MemoryAsset::new(AccountId::derive(ASSET)));
        let ledger = Arc::new(
            MemoryLedger::new(AccountId::derive(LEDGER), asset.id(), clock.clone())
                .with_max_time(scenario.max_lock_time.unwrap_or(MAX_LOCK_TIME))
                .with_asset(asset.clone()),
        );
        let distributor = FeeDistributor::new(
            distributor,
            store,
            ledger.clone(),
            asset.clone(),
            clock.clone(),
        )
        .with_params(params);

        let mut sim = Self {
            clock,
            asset,
            ledger,
            keeper: Keeper::new(Arc::new(distributor)),
            names: BTreeMap::new(),
        };
        for (name, amount) in &scenario.balances {
            let who = sim.name(name)?;
            sim.asset.mint(&who, *amount)?;
        }
        Ok(sim)
    }

    fn name(&mut self, name: &str) -> Result<AccountId> {
        let id = if name == DISTRIBUTOR {
            self.keeper.distributor().account()
        } else {
            resolve(name)?
        };
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    fn step(&mut self, step: &Step) -> Result<Value> {
        let dist = self.keeper.distributor().clone();
        let value = match step {
            Step::Advance { seconds } => json!({ "now": self.clock.advance(*seconds) }),
            Step::SetTime { ts } => {
                self.clock.set(*ts);
                json!({ "now": self.clock.now() })
            }
            Step::Mint { to, amount } => {
                let to = self.name(to)?;
                self.asset.mint(&to, *amount)?;
                json!({ "balance": self.asset.balance_of(&to)? })
            }
            Step::Fund { amount } => {
                self.asset.mint(&dist.account(), *amount)?;
                json!({ "balance": self.asset.balance_of(&dist.account())? })
            }
            Step::Approve { owner, spender, amount } => {
                let (owner, spender) = (self.name(owner)?, self.name(spender)?);
                json!({ "ok": self.asset.approve(&owner, &spender, *amount)? })
            }
            Step::Lock { account, amount, unlock_time } => {
                let who = self.name(account)?;
                self.asset.approve(&who, &self.ledger.account(), u64::MAX)?;
                serde_json::to_value(self.ledger.create_lock(&who, *amount, *unlock_time)?)?
            }
            Step::IncreaseAmount { account, amount } => {
                let who = self.name(account)?;
                self.asset.approve(&who, &self.ledger.account(), u64::MAX)?;
                serde_json::to_value(self.ledger.increase_amount(&who, *amount)?)?
            }
            Step::ExtendLock { account, unlock_time } => {
                let who = self.name(account)?;
                serde_json::to_value(self.ledger.increase_unlock_time(&who, *unlock_time)?)?
            }
            Step::Deposit { from, amount } => {
                let from = self.name(from)?;
                json!({ "ok": dist.deposit(&from, *amount)? })
            }
            Step::CheckpointToken => {
                let cp = dist.checkpoint_token()?;
                json!({ "attributed": cp.attributed, "time": cp.time, "caught_up": cp.caught_up })
            }
            Step::CheckpointTotalSupply => {
                let cp = dist.checkpoint_total_supply()?;
                json!({ "weeks": cp.weeks, "time_cursor": cp.time_cursor, "caught_up": cp.caught_up })
            }
            Step::Claim { caller, account, relock } => {
                let caller = self.name(caller)?;
                let account = account.as_deref().map(|a| self.name(a)).transpose()?;
                serde_json::to_value(dist.claim_with_receipt(&caller, account.as_ref(), *relock)?)?
            }
            Step::ClaimMany { caller, accounts, relock } => {
                let caller = self.name(caller)?;
                let accounts = accounts.iter().map(|a| self.name(a)).collect::<Result<Vec<_>>>()?;
                json!({ "total": dist.claim_many(&caller, &accounts, *relock)? })
            }
            Step::ClaimFully { caller, account, relock } => {
                let (caller, account) = (self.name(caller)?, self.name(account)?);
                serde_json::to_value(self.keeper.claim_fully(&caller, &account, *relock)?)?
            }
            Step::ToggleRelock { account, delegate } => {
                let (account, delegate) = (self.name(account)?, self.name(delegate)?);
                dist.set_relock_authorization(&account, &delegate)?;
                json!({ "allowed": dist.relock_allowed(&account, &delegate)? })
            }
            Step::Tick => {
                let (supply, tokens) = self.keeper.tick()?;
                json!({ "supply": supply, "tokens": tokens })
            }
        };
        Ok(value)
    }

    /// Run every step and collect the final state.
    pub fn run(mut self, scenario: &Scenario) -> Result<Report> {
        let mut steps = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let outcome = self.step(step);
            let now = self.clock.now();
            let op = step.name();
            steps.push(match outcome {
                Ok(result) => StepReport { index, op, now, result: Some(result), error: None },
                Err(e) => {
                    warn!(index, op, error = %e, "scenario step failed");
                    StepReport { index, op, now, result: None, error: Some(format!("{e:#}")) }
                }
            });
        }

        let dist = self.keeper.distributor();
        let mut balances = BTreeMap::new();
        for (name, id) in &self.names {
            balances.insert(name.clone(), self.asset.balance_of(id)?);
        }
        let report = Report {
            steps,
            globals: dist.globals()?,
            weeks: dist.week_table(0, u64::MAX)?,
            balances,
            events: dist.events(),
        };
        info!(steps = report.steps.len(), failed = report.failed_steps(), "scenario finished");
        Ok(report)
    }
}
