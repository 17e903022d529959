//! Binary entry points
//!
//! [`Contract::call`] is the surface a host invokes: a function name plus the
//! canonical argument bytes. Arguments are decoded in declaration order,
//! the matching ledger operation runs, and the result is encoded back
//! (ids as canonical u64, reads as UTF-8 JSON, void as empty bytes).

use crate::{
    codec::{ArgsReader, ArgsWriter},
    host::{CallContext, Host},
    ledger::{Ledger, NewTeam},
    query::to_json,
    storage::KvStore,
    types::{Allocation, BasisPoints},
    Error, Result,
};
use std::fmt;

/// Callable entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// `constructor`
    Constructor,
    /// `createTeam`
    CreateTeam,
    /// `addMember`
    AddMember,
    /// `setTeamStatus`
    SetTeamStatus,
    /// `payTeam`
    PayTeam,
    /// `createSplitProposal`
    CreateSplitProposal,
    /// `voteOnProposal`
    VoteOnProposal,
    /// `executeProposal`
    ExecuteProposal,
    /// `sweepTeamProposals`
    SweepTeamProposals,
    /// `getTeam`
    GetTeam,
    /// `getOwnerTeams`
    GetOwnerTeams,
    /// `getMemberTeams`
    GetMemberTeams,
    /// `getPaymentsForTeam`
    GetPaymentsForTeam,
    /// `getProposalsForTeam`
    GetProposalsForTeam,
    /// `getConfig`
    GetConfig,
}

impl EntryPoint {
    /// Every entry point
    pub const ALL: [EntryPoint; 15] = [
        EntryPoint::Constructor,
        EntryPoint::CreateTeam,
        EntryPoint::AddMember,
        EntryPoint::SetTeamStatus,
        EntryPoint::PayTeam,
        EntryPoint::CreateSplitProposal,
        EntryPoint::VoteOnProposal,
        EntryPoint::ExecuteProposal,
        EntryPoint::SweepTeamProposals,
        EntryPoint::GetTeam,
        EntryPoint::GetOwnerTeams,
        EntryPoint::GetMemberTeams,
        EntryPoint::GetPaymentsForTeam,
        EntryPoint::GetProposalsForTeam,
        EntryPoint::GetConfig,
    ];

    /// Exported function name
    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::Constructor => "constructor",
            EntryPoint::CreateTeam => "createTeam",
            EntryPoint::AddMember => "addMember",
            EntryPoint::SetTeamStatus => "setTeamStatus",
            EntryPoint::PayTeam => "payTeam",
            EntryPoint::CreateSplitProposal => "createSplitProposal",
            EntryPoint::VoteOnProposal => "voteOnProposal",
            EntryPoint::ExecuteProposal => "executeProposal",
            EntryPoint::SweepTeamProposals => "sweepTeamProposals",
            EntryPoint::GetTeam => "getTeam",
            EntryPoint::GetOwnerTeams => "getOwnerTeams",
            EntryPoint::GetMemberTeams => "getMemberTeams",
            EntryPoint::GetPaymentsForTeam => "getPaymentsForTeam",
            EntryPoint::GetProposalsForTeam => "getProposalsForTeam",
            EntryPoint::GetConfig => "getConfig",
        }
    }

    /// Look up an entry point by exported name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ep| ep.name() == name)
    }

    /// True for entry points that only read
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            EntryPoint::GetTeam
                | EntryPoint::GetOwnerTeams
                | EntryPoint::GetMemberTeams
                | EntryPoint::GetPaymentsForTeam
                | EntryPoint::GetProposalsForTeam
                | EntryPoint::GetConfig
        )
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deployed contract: a ledger behind the binary calling convention
#[derive(Debug)]
pub struct Contract<S> {
    ledger: Ledger<S>,
}

impl<S: KvStore> Contract<S> {
    /// Wrap a ledger
    pub fn new(ledger: Ledger<S>) -> Self {
        Self { ledger }
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    /// Run the constructor
    pub fn deploy(&self, ctx: &CallContext, host: &mut dyn Host) -> Result<()> {
        self.ledger.initialize(ctx, host)
    }

    /// Invoke `function` with canonical argument bytes
    pub fn call(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        function: &str,
        args: &[u8],
    ) -> Result<Vec<u8>> {
        let entry = EntryPoint::from_name(function)
            .ok_or_else(|| Error::Validation(format!("unknown entry point {}", function)))?;

        tracing::debug!(%entry, caller = %ctx.caller, args = args.len(), "Dispatching call");

        let result = self.dispatch(entry, ctx, host, &mut ArgsReader::new(args));
        if let Err(e) = &result {
            if e.is_rejection() {
                tracing::debug!(%entry, error = %e, "Call rejected");
            } else {
                tracing::error!(%entry, error = %e, "Call failed");
            }
        }
        result
    }

    fn dispatch(
        &self,
        entry: EntryPoint,
        ctx: &CallContext,
        host: &mut dyn Host,
        args: &mut ArgsReader<'_>,
    ) -> Result<Vec<u8>> {
        let ledger = &self.ledger;

        match entry {
            EntryPoint::Constructor => {
                ledger.initialize(ctx, host)?;
                Ok(Vec::new())
            }
            EntryPoint::CreateTeam => {
                let name = required(args.string(), "team name")?;
                let description = required(args.string(), "team description")?;
                let currency = required(args.string(), "currency")?;
                let avatar = required(args.string(), "avatar")?;
                // Tags are optional. An empty slug's zero prefix also reads as an
                // empty tag array, so retry without tags when no slug follows.
                let before_tags = args.clone();
                let tags = args.string_array().unwrap_or_default();
                let (tags, slug) = match args.string() {
                    Ok(slug) => (tags, slug),
                    Err(_) => {
                        *args = before_tags;
                        (Vec::new(), required(args.string(), "slug")?)
                    }
                };

                let params = NewTeam {
                    name,
                    description,
                    currency,
                    avatar,
                    tags,
                    slug,
                };
                encode_id(ledger.create_team(ctx, host, params)?)
            }
            EntryPoint::AddMember => {
                let team_id = required(args.u64(), "team id")?;
                let wallet = required(args.address(), "member wallet")?;
                let role = required(args.string(), "role")?;
                let percentage = BasisPoints::new(required(args.u16(), "share")?)?;

                ledger.add_member(ctx, host, team_id, wallet, role, percentage)?;
                Ok(Vec::new())
            }
            EntryPoint::SetTeamStatus => {
                let team_id = required(args.u64(), "team id")?;
                let is_active = required(args.bool(), "status")?;

                ledger.set_team_status(ctx, host, team_id, is_active)?;
                Ok(Vec::new())
            }
            EntryPoint::PayTeam => {
                let team_id = required(args.u64(), "team id")?;
                let reference = required(args.string(), "reference")?;
                let memo = args.string().ok();

                encode_id(ledger.pay_team(ctx, host, team_id, reference, memo)?)
            }
            EntryPoint::CreateSplitProposal => {
                let team_id = required(args.u64(), "team id")?;
                let reason = required(args.string(), "reason")?;
                let count = required(args.u32(), "allocation size")?;

                // Each triple needs at least 12 bytes; never trust count for capacity
                let capacity = (count as usize).min(args.remaining() / 12);
                let mut allocations = Vec::with_capacity(capacity);
                for _ in 0..count {
                    let member = required(args.address(), "member")?;
                    let role = required(args.string(), "role")?;
                    let percentage = BasisPoints::new(required(args.u16(), "percentage")?)?;
                    allocations.push(Allocation::new(member, role, percentage));
                }

                encode_id(ledger.create_split_proposal(ctx, host, team_id, reason, allocations)?)
            }
            EntryPoint::VoteOnProposal => {
                let proposal_id = required(args.u64(), "proposal id")?;
                let support = required(args.bool(), "vote")?;

                ledger.vote_on_proposal(ctx, host, proposal_id, support)?;
                Ok(Vec::new())
            }
            EntryPoint::ExecuteProposal => {
                let proposal_id = required(args.u64(), "proposal id")?;

                ledger.execute_proposal(ctx, host, proposal_id)?;
                Ok(Vec::new())
            }
            EntryPoint::SweepTeamProposals => {
                let team_id = required(args.u64(), "team id")?;

                ledger.sweep_team_proposals(ctx, host, team_id)?;
                Ok(Vec::new())
            }
            EntryPoint::GetTeam => {
                let team_id = required(args.u64(), "team id")?;
                encode_json(&ledger.get_team(team_id)?)
            }
            EntryPoint::GetOwnerTeams => {
                let owner = args.address().ok();
                encode_json(&ledger.get_owner_teams(ctx, owner.as_ref())?)
            }
            EntryPoint::GetMemberTeams => {
                let member = args.address().ok();
                encode_json(&ledger.get_member_teams(ctx, member.as_ref())?)
            }
            EntryPoint::GetPaymentsForTeam => {
                let team_id = required(args.u64(), "team id")?;
                let limit = args.u32().ok();
                encode_json(&ledger.get_payments_for_team(team_id, limit)?)
            }
            EntryPoint::GetProposalsForTeam => {
                let team_id = required(args.u64(), "team id")?;
                encode_json(&ledger.get_proposals_for_team(team_id)?)
            }
            EntryPoint::GetConfig => encode_json(&ledger.get_config()?),
        }
    }
}

/// Turn a decode failure of a required argument into a validation error
fn required<T>(value: Result<T>, what: &str) -> Result<T> {
    value.map_err(|e| match e {
        Error::Codec(detail) => Error::Validation(format!("missing {}: {}", what, detail)),
        other => other,
    })
}

fn encode_id(id: u64) -> Result<Vec<u8>> {
    let mut writer = ArgsWriter::new();
    writer.u64(id);
    Ok(writer.into_bytes())
}

fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(to_json(value)?.into_bytes())
}
