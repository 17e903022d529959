//! Main ledger orchestration layer
//!
//! Every mutating operation follows the same shape: open a transaction, load
//! the entities it needs, validate every precondition, apply the state
//! transition in memory, write the entities back wholesale and commit. Host
//! transfers happen only after validation has passed; notification events are
//! emitted by the commit.
//!
//! # Example
//!
//! ```no_run
//! use autosplit_core::{CallContext, Config, Ledger, LocalHost, NewTeam};
//!
//! fn main() -> autosplit_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!     let mut host = LocalHost::new();
//!     let ctx = CallContext::new("AU1owner", 1_700_000_000_000);
//!
//!     let team_id = ledger.create_team(&ctx, &mut host, NewTeam::named("Studio"))?;
//!     println!("created team {}", team_id);
//!     Ok(())
//! }
//! ```

use crate::{
    host::{CallContext, Host},
    metrics::Metrics,
    split,
    storage::{KvStore, RocksStore, Storage, PAYMENT_COUNTER, TEAM_COUNTER},
    types::{Address, BasisPoints, Payment, Team, TeamMember},
    Config, Error, Result,
};
use std::fmt;

/// Arguments of [`Ledger::create_team`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTeam {
    /// Display name (required)
    pub name: String,
    /// Description
    pub description: String,
    /// Currency symbol; empty means the native currency
    pub currency: String,
    /// Avatar
    pub avatar: String,
    /// Tags
    pub tags: Vec<String>,
    /// Payment link slug; empty means `team-<id>`
    pub slug: String,
}

impl NewTeam {
    /// Team with only a name set
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Main ledger interface
pub struct Ledger<S = RocksStore> {
    pub(crate) storage: Storage<S>,
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
}

impl Ledger<RocksStore> {
    /// Open ledger on RocksDB under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let store = RocksStore::open(&config)?;
        Self::with_store(store, config)
    }
}

impl<S: KvStore> Ledger<S> {
    /// Build a ledger over any key-value backend
    pub fn with_store(store: S, config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Storage::new(store, config.namespace.clone());
        let metrics = Metrics::new()?;

        Ok(Self {
            storage,
            config,
            metrics,
        })
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Persistence layer
    pub fn storage(&self) -> &Storage<S> {
        &self.storage
    }

    /// One-time contract construction: records the deployer as owner
    pub fn initialize(&self, ctx: &CallContext, host: &mut dyn Host) -> Result<()> {
        let mut tx = self.storage.transaction();

        if let Some(owner) = tx.contract_owner()? {
            return Err(Error::Conflict(format!(
                "contract already initialized by {}",
                owner
            )));
        }

        tx.set_contract_owner(&ctx.caller);
        tx.emit(format!("init:{}", ctx.caller));
        tx.commit(host)?;

        tracing::info!(owner = %ctx.caller, "Contract initialized");
        Ok(())
    }

    /// Create a team owned by the caller
    pub fn create_team(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        params: NewTeam,
    ) -> Result<u64> {
        if params.name.is_empty() {
            return Err(Error::Validation("team name required".to_string()));
        }

        let mut tx = self.storage.transaction();
        let team_id = tx.increment(TEAM_COUNTER)?;

        let currency = if params.currency.is_empty() {
            self.config.native_currency.clone()
        } else {
            params.currency
        };
        let pay_link_slug = if params.slug.is_empty() {
            format!("team-{}", team_id)
        } else {
            params.slug
        };

        let team = Team {
            id: team_id,
            owner: ctx.caller.clone(),
            name: params.name,
            description: params.description,
            currency,
            avatar: params.avatar,
            tags: params.tags,
            is_active: true,
            created_at: ctx.timestamp,
            pay_link_slug,
            total_received: 0,
            members: Vec::new(),
        };

        tx.save_team(&team);
        tx.track_owner_team(&team.owner, team_id)?;
        tx.emit(format!("team.created:{}", team_id));
        tx.commit(host)?;

        self.metrics.teams_created.inc();
        tracing::info!(team_id, owner = %team.owner, slug = %team.pay_link_slug, "Team created");

        Ok(team_id)
    }

    /// Add a member with a share of future payments
    pub fn add_member(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        team_id: u64,
        wallet: Address,
        role: impl Into<String>,
        percentage: BasisPoints,
    ) -> Result<()> {
        let mut tx = self.storage.transaction();
        let mut team = tx.load_team(team_id)?;
        require_owner(&team, ctx)?;

        if wallet.is_empty() {
            return Err(Error::Validation("member wallet required".to_string()));
        }
        if percentage.is_zero() {
            return Err(Error::Validation(
                "share must be greater than zero".to_string(),
            ));
        }
        if team.member_index(&wallet).is_some() {
            return Err(Error::Conflict(format!(
                "{} is already a member of team {}",
                wallet, team_id
            )));
        }

        let total = team.total_share() + u32::from(percentage.get());
        if total > u32::from(BasisPoints::FULL.get()) {
            return Err(Error::InvariantViolation(format!(
                "total split would be {} basis points, above 10000",
                total
            )));
        }

        team.members
            .push(TeamMember::new(wallet.clone(), role, percentage));
        tx.save_team(&team);
        tx.track_member_team(&wallet, team_id)?;
        tx.emit(format!("member.added:{}:{}", team_id, wallet));
        tx.commit(host)?;

        self.metrics.members_added.inc();
        tracing::info!(team_id, wallet = %wallet, %percentage, total_share = total, "Member added");

        Ok(())
    }

    /// Pause or resume payments to a team
    pub fn set_team_status(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        team_id: u64,
        is_active: bool,
    ) -> Result<()> {
        let mut tx = self.storage.transaction();
        let mut team = tx.load_team(team_id)?;
        require_owner(&team, ctx)?;

        team.is_active = is_active;
        tx.save_team(&team);
        tx.emit(format!(
            "team.status:{}:{}",
            team_id,
            if is_active { "active" } else { "paused" }
        ));
        tx.commit(host)?;

        tracing::info!(team_id, is_active, "Team status changed");
        Ok(())
    }

    /// Split the coins attached to the call across the team's members
    ///
    /// Members receive floored proportional shares in list order; the
    /// truncation remainder goes to the team owner.
    pub fn pay_team(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        team_id: u64,
        reference: impl Into<String>,
        memo: Option<String>,
    ) -> Result<u64> {
        let mut tx = self.storage.transaction();
        let mut team = tx.load_team(team_id)?;

        if !team.is_active {
            return Err(Error::Validation(format!("team {} is paused", team_id)));
        }
        if team.members.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "team {} has no members configured",
                team_id
            )));
        }
        if !team.is_fully_allocated() {
            return Err(Error::InvariantViolation(format!(
                "member percentages total {} basis points, must be exactly 10000",
                team.total_share()
            )));
        }

        let amount = ctx.transferred;
        if amount == 0 {
            return Err(Error::Validation(
                "payment must attach native currency".to_string(),
            ));
        }
        let total_received = team.total_received.checked_add(amount).ok_or_else(|| {
            Error::InvariantViolation(format!("team {} received total overflows", team_id))
        })?;

        let plan = split::plan_split(amount, &team.members);

        for payout in &plan.payouts {
            host.transfer(&payout.wallet, payout.amount)?;
            tracing::debug!(team_id, wallet = %payout.wallet, amount = payout.amount, "Member paid");
        }
        if plan.remainder > 0 {
            host.transfer(&team.owner, plan.remainder)?;
            tracing::debug!(team_id, owner = %team.owner, remainder = plan.remainder, "Remainder paid to owner");
        }

        split::record_payouts(&mut team.members, &plan, ctx.timestamp);
        team.total_received = total_received;
        tx.save_team(&team);

        let payment = Payment {
            id: tx.increment(PAYMENT_COUNTER)?,
            team_id,
            payer: ctx.caller.clone(),
            amount,
            timestamp: ctx.timestamp,
            reference: reference.into(),
            memo: memo.unwrap_or_default(),
        };
        tx.save_payment(&payment)?;
        tx.emit(format!("payment:{}", serde_json::to_string(&payment)?));
        tx.commit(host)?;

        self.metrics
            .record_payment(amount, plan.payouts.len(), plan.remainder);
        tracing::info!(
            team_id,
            payment_id = payment.id,
            amount,
            recipients = plan.payouts.len(),
            remainder = plan.remainder,
            "Payment split"
        );

        Ok(payment.id)
    }
}

impl<S> fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("namespace", &self.storage.namespace())
            .field("data_dir", &self.config.data_dir)
            .finish()
    }
}

/// Fail unless the caller owns the team
pub(crate) fn require_owner(team: &Team, ctx: &CallContext) -> Result<()> {
    if !team.is_owner(&ctx.caller) {
        return Err(Error::Authorization(format!(
            "only the owner of team {} may do this",
            team.id
        )));
    }
    Ok(())
}
