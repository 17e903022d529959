//! Split proposals: creation, weighted voting and finalization
//!
//! A proposal carries a complete replacement membership. Members vote with
//! their current percentage as weight until `end_time`; afterwards the
//! proposal is finalized either explicitly ([`Ledger::execute_proposal`]) or
//! in bulk ([`Ledger::sweep_team_proposals`]). Both paths share the same
//! finalization step.

use crate::{
    host::{CallContext, Host},
    ledger::{require_owner, Ledger},
    split,
    storage::{KvStore, Transaction, PROPOSAL_COUNTER},
    types::{Address, Allocation, BasisPoints, Proposal, ProposalOutcome, Team},
    Error, Result,
};
use std::collections::HashSet;

/// Proposal closed by a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalized {
    /// Proposal id
    pub proposal_id: u64,
    /// Whether the membership was replaced
    pub outcome: ProposalOutcome,
}

impl<S: KvStore> Ledger<S> {
    /// Propose replacing the team's membership with `allocations`
    pub fn create_split_proposal(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        team_id: u64,
        reason: impl Into<String>,
        allocations: Vec<Allocation>,
    ) -> Result<u64> {
        if allocations.is_empty() {
            return Err(Error::Validation(
                "proposal needs at least one allocation".to_string(),
            ));
        }

        let mut tx = self.storage.transaction();
        let team = tx.load_team(team_id)?;
        require_owner(&team, ctx)?;
        check_allocations(&allocations)?;

        let id = tx.increment(PROPOSAL_COUNTER)?;
        let proposal = Proposal {
            id,
            team_id,
            creator: ctx.caller.clone(),
            reason: reason.into(),
            end_time: ctx
                .timestamp
                .saturating_add(self.config.governance.voting_window_ms),
            executed: false,
            yes_votes: 0,
            no_votes: 0,
            created_at: ctx.timestamp,
            allocations,
            votes: Vec::new(),
        };

        tx.save_proposal(&proposal)?;
        tx.emit(format!("proposal.created:{}", id));
        tx.commit(host)?;

        self.metrics.proposals_created.inc();
        tracing::info!(
            proposal_id = id,
            team_id,
            allocations = proposal.allocations.len(),
            end_time = proposal.end_time,
            "Split proposal created"
        );

        Ok(id)
    }

    /// Cast the caller's weighted vote
    pub fn vote_on_proposal(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        proposal_id: u64,
        support: bool,
    ) -> Result<()> {
        let mut tx = self.storage.transaction();
        let mut proposal = tx.load_proposal(proposal_id)?;

        if proposal.executed {
            return Err(Error::Conflict(format!(
                "proposal {} already executed",
                proposal_id
            )));
        }
        if !proposal.is_voting_open(ctx.timestamp) {
            return Err(Error::Validation(format!(
                "voting on proposal {} closed at {}",
                proposal_id, proposal.end_time
            )));
        }

        let team = tx.load_team(proposal.team_id)?;
        let weight = team
            .member(&ctx.caller)
            .map(|member| member.percentage)
            .ok_or_else(|| {
                Error::Authorization(format!(
                    "{} is not a member of team {}",
                    ctx.caller, team.id
                ))
            })?;

        if proposal.has_voted(&ctx.caller) {
            return Err(Error::Conflict(format!(
                "{} already voted on proposal {}",
                ctx.caller, proposal_id
            )));
        }

        proposal.record_vote(ctx.caller.clone(), support, weight);
        tx.save_proposal(&proposal)?;
        tx.emit(format!("proposal.vote:{}:{}", proposal_id, ctx.caller));
        tx.commit(host)?;

        self.metrics.votes_total.inc();
        tracing::info!(
            proposal_id,
            voter = %ctx.caller,
            support,
            %weight,
            yes = proposal.yes_votes,
            no = proposal.no_votes,
            "Vote recorded"
        );

        Ok(())
    }

    /// Apply an accepted proposal once voting has closed
    ///
    /// A tied or losing proposal fails with [`Error::ProposalRejected`] and
    /// stays unexecuted; a later sweep will close it.
    pub fn execute_proposal(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        proposal_id: u64,
    ) -> Result<()> {
        let mut tx = self.storage.transaction();
        let mut proposal = tx.load_proposal(proposal_id)?;

        if proposal.executed {
            return Err(Error::Conflict(format!(
                "proposal {} already executed",
                proposal_id
            )));
        }
        if !proposal.is_finalizable(ctx.timestamp) {
            return Err(Error::Validation(format!(
                "voting on proposal {} is open until {}",
                proposal_id, proposal.end_time
            )));
        }
        if proposal.outcome() == ProposalOutcome::Rejected {
            return Err(Error::ProposalRejected {
                proposal_id,
                yes_votes: proposal.yes_votes,
                no_votes: proposal.no_votes,
            });
        }

        let mut team = tx.load_team(proposal.team_id)?;
        finalize_proposal(&mut tx, &mut team, &mut proposal)?;

        tx.save_team(&team);
        tx.save_proposal(&proposal)?;
        tx.emit(format!("proposal.executed:{}", proposal_id));
        tx.commit(host)?;

        self.metrics.record_finalized(true);
        tracing::info!(
            proposal_id,
            team_id = team.id,
            members = team.members.len(),
            "Proposal executed"
        );

        Ok(())
    }

    /// Finalize every closed, unexecuted proposal of a team
    ///
    /// Proposals are processed oldest first. Accepted ones replace the
    /// membership in turn, so a later proposal sees the result of an earlier
    /// one. Rejected ones are closed without effect.
    pub fn sweep_team_proposals(
        &self,
        ctx: &CallContext,
        host: &mut dyn Host,
        team_id: u64,
    ) -> Result<Vec<Finalized>> {
        let mut tx = self.storage.transaction();
        let mut team = tx.load_team(team_id)?;

        let mut finalized = Vec::new();
        for proposal_id in tx.team_proposal_ids(team_id)? {
            let mut proposal = tx.load_proposal(proposal_id)?;
            if !proposal.is_finalizable(ctx.timestamp) {
                continue;
            }

            let outcome = finalize_proposal(&mut tx, &mut team, &mut proposal)?;
            tx.save_proposal(&proposal)?;
            tx.emit(format!("proposal.swept:{}", proposal_id));

            tracing::debug!(proposal_id, team_id, ?outcome, "Proposal swept");
            finalized.push(Finalized {
                proposal_id,
                outcome,
            });
        }

        if finalized
            .iter()
            .any(|f| f.outcome == ProposalOutcome::Accepted)
        {
            tx.save_team(&team);
        }
        tx.commit(host)?;

        for f in &finalized {
            self.metrics
                .record_finalized(f.outcome == ProposalOutcome::Accepted);
        }
        tracing::info!(team_id, swept = finalized.len(), "Team proposals swept");

        Ok(finalized)
    }
}

/// Close a proposal, replacing the team's membership when it was accepted
///
/// The caller persists both entities.
fn finalize_proposal<S: KvStore>(
    tx: &mut Transaction<'_, S>,
    team: &mut Team,
    proposal: &mut Proposal,
) -> Result<ProposalOutcome> {
    let outcome = proposal.outcome();

    if outcome == ProposalOutcome::Accepted {
        let rebuild = split::rebuild_members(&team.members, &proposal.allocations);
        for wallet in &rebuild.removed {
            tracing::warn!(
                team_id = team.id,
                proposal_id = proposal.id,
                wallet = %wallet,
                "Member dropped by accepted proposal"
            );
        }
        team.members = rebuild.members;

        // Former members keep their member-teams entry
        for allocation in &proposal.allocations {
            tx.track_member_team(&allocation.member, team.id)?;
        }
    }

    proposal.executed = true;
    Ok(outcome)
}

/// Reject malformed allocation sets before anything is stored
fn check_allocations(allocations: &[Allocation]) -> Result<()> {
    let mut seen: HashSet<&Address> = HashSet::with_capacity(allocations.len());

    for allocation in allocations {
        if allocation.member.is_empty() {
            return Err(Error::Validation("allocation wallet required".to_string()));
        }
        if allocation.percentage.is_zero() {
            return Err(Error::Validation(format!(
                "allocation for {} must be greater than zero",
                allocation.member
            )));
        }
        if !seen.insert(&allocation.member) {
            return Err(Error::Conflict(format!(
                "{} allocated more than once",
                allocation.member
            )));
        }
    }

    let total = split::share_total(allocations.iter().map(|a| a.percentage));
    if total != u32::from(BasisPoints::FULL.get()) {
        return Err(Error::InvariantViolation(format!(
            "allocations total {} basis points, must be exactly 10000",
            total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_VOTING_WINDOW_MS;
    use crate::host::LocalHost;
    use crate::ledger::NewTeam;
    use crate::storage::MemoryStore;
    use crate::Config;

    const OWNER: &str = "AU1owner";
    const START: u64 = 1_000;
    const AFTER_VOTING: u64 = START + DEFAULT_VOTING_WINDOW_MS;

    fn bp(value: u16) -> BasisPoints {
        BasisPoints::new(value).unwrap()
    }

    fn alloc(wallet: &str, share: u16) -> Allocation {
        Allocation::new(Address::new(wallet), "dev", bp(share))
    }

    fn at(caller: &str, timestamp: u64) -> CallContext {
        CallContext::new(caller, timestamp)
    }

    /// Team owned by OWNER with a=6000, b=4000
    fn setup() -> (Ledger<MemoryStore>, LocalHost, u64) {
        let ledger = Ledger::with_store(MemoryStore::new(), Config::default()).unwrap();
        let mut host = LocalHost::new();
        let owner = at(OWNER, START);

        let team_id = ledger
            .create_team(&owner, &mut host, NewTeam::named("Crew"))
            .unwrap();
        ledger
            .add_member(&owner, &mut host, team_id, Address::new("AU1a"), "dev", bp(6000))
            .unwrap();
        ledger
            .add_member(&owner, &mut host, team_id, Address::new("AU1b"), "dev", bp(4000))
            .unwrap();

        (ledger, host, team_id)
    }

    fn propose(
        ledger: &Ledger<MemoryStore>,
        host: &mut LocalHost,
        team_id: u64,
        allocations: Vec<Allocation>,
    ) -> u64 {
        ledger
            .create_split_proposal(&at(OWNER, START), host, team_id, "rebalance", allocations)
            .unwrap()
    }

    #[test]
    fn test_create_proposal() {
        let (ledger, mut host, team_id) = setup();
        let id = propose(&ledger, &mut host, team_id, vec![alloc("AU1a", 10_000)]);
        assert_eq!(id, 1);

        let views = ledger.get_proposals_for_team(team_id).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].end_time, AFTER_VOTING);
        assert_eq!(views[0].creator, Address::new(OWNER));
        assert!(!views[0].executed);
        assert_eq!(ledger.metrics().proposals_created.get(), 1);
    }

    #[test]
    fn test_create_proposal_rejects_bad_allocations() {
        let (ledger, mut host, team_id) = setup();
        let owner = at(OWNER, START);

        let mut attempt = |allocations: Vec<Allocation>| {
            ledger
                .create_split_proposal(&owner, &mut host, team_id, "x", allocations)
                .unwrap_err()
        };

        assert!(matches!(attempt(vec![]), Error::Validation(_)));
        assert!(matches!(
            attempt(vec![alloc("AU1a", 9000)]),
            Error::InvariantViolation(_)
        ));
        assert!(matches!(
            attempt(vec![alloc("AU1a", 5000), alloc("AU1a", 5000)]),
            Error::Conflict(_)
        ));
        assert!(matches!(
            attempt(vec![alloc("AU1a", 10_000), alloc("AU1b", 0)]),
            Error::Validation(_)
        ));
        assert!(matches!(
            attempt(vec![alloc("", 10_000)]),
            Error::Validation(_)
        ));

        let stranger = at("AU1a", START);
        assert!(matches!(
            ledger.create_split_proposal(&stranger, &mut host, team_id, "x", vec![alloc("AU1a", 10_000)]),
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            ledger.create_split_proposal(&owner, &mut host, 77, "x", vec![alloc("AU1a", 10_000)]),
            Err(Error::NotFound(_))
        ));

        assert!(ledger.get_proposals_for_team(team_id).unwrap().is_empty());
    }

    #[test]
    fn test_accepted_proposal_replaces_members() {
        let (ledger, mut host, team_id) = setup();
        let id = propose(
            &ledger,
            &mut host,
            team_id,
            vec![alloc("AU1a", 5000), alloc("AU1c", 5000)],
        );

        ledger
            .vote_on_proposal(&at("AU1a", START + 1), &mut host, id, true)
            .unwrap();
        ledger
            .vote_on_proposal(&at("AU1b", START + 2), &mut host, id, false)
            .unwrap();

        ledger
            .execute_proposal(&at("AU1anyone", AFTER_VOTING), &mut host, id)
            .unwrap();

        let team = ledger.get_team(team_id).unwrap();
        let wallets: Vec<&str> = team.members.iter().map(|m| m.wallet.as_str()).collect();
        assert_eq!(wallets, vec!["AU1a", "AU1c"]);
        assert!(team.is_fully_allocated());

        let views = ledger.get_proposals_for_team(team_id).unwrap();
        assert!(views[0].executed);
        assert_eq!(views[0].yes_votes, 6000);
        assert_eq!(views[0].no_votes, 4000);

        let member_teams = ledger
            .get_member_teams(&at("AU1c", 0), None)
            .unwrap();
        assert_eq!(member_teams.len(), 1);
        assert_eq!(ledger.metrics().proposals_executed.get(), 1);
    }

    #[test]
    fn test_tie_is_rejected() {
        let (ledger, mut host, team_id) = setup();
        let id = propose(&ledger, &mut host, team_id, vec![alloc("AU1a", 10_000)]);
        let err = ledger
            .execute_proposal(&at(OWNER, AFTER_VOTING), &mut host, id)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ProposalRejected {
                proposal_id: 1,
                yes_votes: 0,
                no_votes: 0
            }
        ));

        let views = ledger.get_proposals_for_team(team_id).unwrap();
        assert!(!views[0].executed);
        assert_eq!(ledger.get_team(team_id).unwrap().members.len(), 2);
    }

    #[test]
    fn test_minority_yes_is_rejected() {
        let (ledger, mut host, team_id) = setup();
        let id = propose(&ledger, &mut host, team_id, vec![alloc("AU1b", 10_000)]);

        ledger
            .vote_on_proposal(&at("AU1b", START), &mut host, id, true)
            .unwrap();
        ledger
            .vote_on_proposal(&at("AU1a", START), &mut host, id, false)
            .unwrap();

        let err = ledger
            .execute_proposal(&at(OWNER, AFTER_VOTING), &mut host, id)
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(matches!(err, Error::ProposalRejected { yes_votes: 4000, no_votes: 6000, .. }));
    }

    #[test]
    fn test_vote_rules() {
        let (ledger, mut host, team_id) = setup();
        let id = propose(&ledger, &mut host, team_id, vec![alloc("AU1a", 10_000)]);

        assert!(matches!(
            ledger.vote_on_proposal(&at("AU1outsider", START), &mut host, id, true),
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            ledger.vote_on_proposal(&at("AU1a", START), &mut host, 9, true),
            Err(Error::NotFound(_))
        ));

        ledger
            .vote_on_proposal(&at("AU1a", START), &mut host, id, true)
            .unwrap();
        assert!(matches!(
            ledger.vote_on_proposal(&at("AU1a", START + 5), &mut host, id, false),
            Err(Error::Conflict(_))
        ));

        // Voting closes exactly at end_time
        assert!(matches!(
            ledger.vote_on_proposal(&at("AU1b", AFTER_VOTING), &mut host, id, true),
            Err(Error::Validation(_))
        ));
        assert!(ledger
            .vote_on_proposal(&at("AU1b", AFTER_VOTING - 1), &mut host, id, true)
            .is_ok());

        let views = ledger.get_proposals_for_team(team_id).unwrap();
        assert_eq!(views[0].votes.len(), 2);
        assert_eq!(views[0].yes_votes, 10_000);
        assert_eq!(
            host.events().last().unwrap(),
            &format!("autosplit:proposal.vote:{}:AU1b", id)
        );
    }

    #[test]
    fn test_execute_timing_and_repeat() {
        let (ledger, mut host, team_id) = setup();
        let id = propose(&ledger, &mut host, team_id, vec![alloc("AU1a", 10_000)]);
        ledger
            .vote_on_proposal(&at("AU1a", START), &mut host, id, true)
            .unwrap();

        assert!(matches!(
            ledger.execute_proposal(&at(OWNER, AFTER_VOTING - 1), &mut host, id),
            Err(Error::Validation(_))
        ));

        ledger
            .execute_proposal(&at(OWNER, AFTER_VOTING), &mut host, id)
            .unwrap();
        assert!(matches!(
            ledger.execute_proposal(&at(OWNER, AFTER_VOTING + 1), &mut host, id),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            ledger.vote_on_proposal(&at("AU1b", START), &mut host, id, true),
            Err(Error::Conflict(_))
        ));

        // Already executed proposals are not swept again
        let swept = ledger
            .sweep_team_proposals(&at(OWNER, AFTER_VOTING + 2), &mut host, team_id)
            .unwrap();
        assert!(swept.is_empty());

        let team = ledger.get_team(team_id).unwrap();
        assert_eq!(team.members.len(), 1);
        assert_eq!(team.members[0].percentage, BasisPoints::FULL);
    }

    #[test]
    fn test_sweep_closes_rejected_and_applies_accepted() {
        let (ledger, mut host, team_id) = setup();
        let rejected = propose(&ledger, &mut host, team_id, vec![alloc("AU1b", 10_000)]);
        let accepted = propose(
            &ledger,
            &mut host,
            team_id,
            vec![alloc("AU1a", 7000), alloc("AU1b", 3000)],
        );

        ledger
            .vote_on_proposal(&at("AU1a", START), &mut host, rejected, false)
            .unwrap();
        ledger
            .vote_on_proposal(&at("AU1a", START), &mut host, accepted, true)
            .unwrap();

        // Nothing to sweep while voting is open
        let swept = ledger
            .sweep_team_proposals(&at(OWNER, START + 10), &mut host, team_id)
            .unwrap();
        assert!(swept.is_empty());

        let swept = ledger
            .sweep_team_proposals(&at("AU1anyone", AFTER_VOTING), &mut host, team_id)
            .unwrap();
        assert_eq!(
            swept,
            vec![
                Finalized {
                    proposal_id: rejected,
                    outcome: ProposalOutcome::Rejected
                },
                Finalized {
                    proposal_id: accepted,
                    outcome: ProposalOutcome::Accepted
                },
            ]
        );

        let views = ledger.get_proposals_for_team(team_id).unwrap();
        assert!(views.iter().all(|v| v.executed));

        let team = ledger.get_team(team_id).unwrap();
        assert_eq!(team.members[0].percentage.get(), 7000);
        assert_eq!(team.members[1].percentage.get(), 3000);
        assert_eq!(ledger.metrics().proposals_rejected.get(), 1);
        assert_eq!(ledger.metrics().proposals_executed.get(), 1);

        assert!(matches!(
            ledger.sweep_team_proposals(&at(OWNER, AFTER_VOTING), &mut host, 404),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_earnings_survive_rebuild() {
        let (ledger, mut host, team_id) = setup();
        let payment = at("AU1payer", START).with_coins(1000);
        host.receive(&payment);
        ledger
            .pay_team(&payment, &mut host, team_id, "ref", None)
            .unwrap();

        let id = propose(
            &ledger,
            &mut host,
            team_id,
            vec![alloc("AU1c", 2000), alloc("AU1a", 8000)],
        );
        ledger
            .vote_on_proposal(&at("AU1a", START), &mut host, id, true)
            .unwrap();
        ledger
            .execute_proposal(&at(OWNER, AFTER_VOTING), &mut host, id)
            .unwrap();

        let team = ledger.get_team(team_id).unwrap();
        assert_eq!(team.members[0].wallet, Address::new("AU1c"));
        assert_eq!(team.members[0].total_earned, 0);
        assert_eq!(team.members[1].wallet, Address::new("AU1a"));
        assert_eq!(team.members[1].total_earned, 600);
        assert_eq!(team.members[1].percentage.get(), 8000);

        // Dropped member still finds the team through the member index
        let b_teams = ledger
            .get_member_teams(&at("AU1b", 0), None)
            .unwrap();
        assert_eq!(b_teams.len(), 1);
    }
}
