//! Read-side projections
//!
//! Queries never write. They open a transaction purely for reads and drop it.

use crate::{
    host::CallContext,
    ledger::Ledger,
    storage::KvStore,
    types::{string_u64, Address, Allocation, Payment, Proposal, ProposalVote, Team},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Proposal as returned to readers, with the team name attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalView {
    /// Proposal id
    #[serde(with = "string_u64")]
    pub id: u64,

    /// Team id
    #[serde(with = "string_u64")]
    pub team_id: u64,

    /// Team name at read time
    pub team_name: String,

    /// Creator
    pub creator: Address,

    /// Rationale
    pub reason: String,

    /// End of voting
    #[serde(with = "string_u64")]
    pub end_time: u64,

    /// Finalized
    pub executed: bool,

    /// Weight in favour
    pub yes_votes: u32,

    /// Weight against
    pub no_votes: u32,

    /// Creation timestamp
    #[serde(with = "string_u64")]
    pub created_at: u64,

    /// Proposed membership
    pub allocations: Vec<Allocation>,

    /// Votes cast
    pub votes: Vec<ProposalVote>,
}

impl ProposalView {
    /// Attach a team name to a proposal
    pub fn new(proposal: Proposal, team_name: impl Into<String>) -> Self {
        Self {
            id: proposal.id,
            team_id: proposal.team_id,
            team_name: team_name.into(),
            creator: proposal.creator,
            reason: proposal.reason,
            end_time: proposal.end_time,
            executed: proposal.executed,
            yes_votes: proposal.yes_votes,
            no_votes: proposal.no_votes,
            created_at: proposal.created_at,
            allocations: proposal.allocations,
            votes: proposal.votes,
        }
    }
}

/// Contract-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Deployer recorded at initialization
    pub owner: Address,
}

/// Serialize a projection to its JSON text form
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

impl<S: KvStore> Ledger<S> {
    /// Team by id
    pub fn get_team(&self, team_id: u64) -> Result<Team> {
        self.storage.transaction().load_team(team_id)
    }

    /// Teams created by `owner`, defaulting to the caller
    pub fn get_owner_teams(&self, ctx: &CallContext, owner: Option<&Address>) -> Result<Vec<Team>> {
        let owner = resolve_wallet(ctx, owner);
        let tx = self.storage.transaction();
        tx.owner_team_ids(owner)?
            .into_iter()
            .map(|team_id| tx.load_team(team_id))
            .collect()
    }

    /// Teams `member` was ever added to, defaulting to the caller
    pub fn get_member_teams(
        &self,
        ctx: &CallContext,
        member: Option<&Address>,
    ) -> Result<Vec<Team>> {
        let member = resolve_wallet(ctx, member);
        let tx = self.storage.transaction();
        tx.member_team_ids(member)?
            .into_iter()
            .map(|team_id| tx.load_team(team_id))
            .collect()
    }

    /// Most recent payments of a team, newest first
    ///
    /// `limit` defaults to the configured page size; a limit of zero returns
    /// nothing.
    pub fn get_payments_for_team(&self, team_id: u64, limit: Option<u32>) -> Result<Vec<Payment>> {
        let tx = self.storage.transaction();
        if !tx.team_exists(team_id)? {
            return Err(Error::NotFound(format!("team {}", team_id)));
        }

        let limit = limit.unwrap_or(self.config.queries.default_payment_limit) as usize;
        tx.team_payment_ids(team_id)?
            .into_iter()
            .rev()
            .take(limit)
            .map(|payment_id| tx.load_payment(payment_id))
            .collect()
    }

    /// Every proposal of a team, oldest first
    pub fn get_proposals_for_team(&self, team_id: u64) -> Result<Vec<ProposalView>> {
        let tx = self.storage.transaction();
        let team = tx.load_team(team_id)?;

        tx.team_proposal_ids(team_id)?
            .into_iter()
            .map(|proposal_id| {
                let proposal = tx.load_proposal(proposal_id)?;
                Ok(ProposalView::new(proposal, team.name.as_str()))
            })
            .collect()
    }

    /// Contract owner record
    pub fn get_config(&self) -> Result<ContractConfig> {
        let owner = self
            .storage
            .transaction()
            .contract_owner()?
            .ok_or_else(|| Error::NotFound("contract not initialized".to_string()))?;
        Ok(ContractConfig { owner })
    }
}

fn resolve_wallet<'a>(ctx: &'a CallContext, wallet: Option<&'a Address>) -> &'a Address {
    match wallet {
        Some(wallet) if !wallet.is_empty() => wallet,
        _ => &ctx.caller,
    }
}
