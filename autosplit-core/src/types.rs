//! Core types for the split ledger
//!
//! All types are designed for:
//! - Deterministic canonical encoding (see [`crate::codec`])
//! - A stable JSON projection for external reads (camelCase field names,
//!   u64 quantities rendered as strings)
//! - Exact integer share arithmetic (basis points, no floating point)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallet identity as supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identity
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Share of a payment in basis points, 0..=10000 where 10000 is 100%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct BasisPoints(u16);

impl BasisPoints {
    /// 0%
    pub const ZERO: BasisPoints = BasisPoints(0);

    /// 100%
    pub const FULL: BasisPoints = BasisPoints(10_000);

    /// Create from a raw value, rejecting anything above 100%
    pub fn new(value: u16) -> Result<Self> {
        if value > Self::FULL.0 {
            return Err(Error::Validation(format!(
                "percentage {} exceeds {} basis points",
                value,
                Self::FULL.0
            )));
        }
        Ok(Self(value))
    }

    /// Raw value
    pub fn get(self) -> u16 {
        self.0
    }

    /// True for 0%
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u16> for BasisPoints {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u16 {
    fn from(value: BasisPoints) -> Self {
        value.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}

/// Serialize u64 quantities as JSON strings so clients never lose precision.
pub(crate) mod string_u64 {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Member of a team and their share of every payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    /// Payout wallet, unique within the team
    pub wallet: Address,

    /// Free-form role label
    pub role: String,

    /// Share of each payment
    pub percentage: BasisPoints,

    /// Cumulative native currency paid to this member
    #[serde(with = "string_u64")]
    pub total_earned: u64,

    /// Timestamp of the last non-zero payout (0 if never paid)
    #[serde(with = "string_u64")]
    pub last_paid_at: u64,
}

impl TeamMember {
    /// Create a member with no payout history
    pub fn new(wallet: Address, role: impl Into<String>, percentage: BasisPoints) -> Self {
        Self {
            wallet,
            role: role.into(),
            percentage,
            total_earned: 0,
            last_paid_at: 0,
        }
    }
}

/// Team receiving payments on behalf of its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Team id (monotonic)
    #[serde(with = "string_u64")]
    pub id: u64,

    /// Creator; the only caller allowed to manage the team
    pub owner: Address,

    /// Display name (never empty)
    pub name: String,

    /// Description
    pub description: String,

    /// Currency symbol shown to payers
    pub currency: String,

    /// Avatar URL or data
    pub avatar: String,

    /// Tags
    pub tags: Vec<String>,

    /// Whether the team accepts payments
    pub is_active: bool,

    /// Creation timestamp
    #[serde(with = "string_u64")]
    pub created_at: u64,

    /// Public payment link slug
    pub pay_link_slug: String,

    /// Cumulative native currency received
    #[serde(with = "string_u64")]
    pub total_received: u64,

    /// Members in payout order
    pub members: Vec<TeamMember>,
}

impl Team {
    /// Sum of member percentages
    pub fn total_share(&self) -> u32 {
        crate::split::share_total(self.members.iter().map(|m| m.percentage))
    }

    /// True when the members' shares add up to exactly 100%
    pub fn is_fully_allocated(&self) -> bool {
        self.total_share() == u32::from(BasisPoints::FULL.get())
    }

    /// Position of a wallet in the member list
    pub fn member_index(&self, wallet: &Address) -> Option<usize> {
        self.members.iter().position(|m| &m.wallet == wallet)
    }

    /// Member entry for a wallet
    pub fn member(&self, wallet: &Address) -> Option<&TeamMember> {
        self.members.iter().find(|m| &m.wallet == wallet)
    }

    /// Check owner
    pub fn is_owner(&self, caller: &Address) -> bool {
        &self.owner == caller
    }
}

/// Immutable record of one split payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Payment id (monotonic)
    #[serde(with = "string_u64")]
    pub id: u64,

    /// Team that was paid
    #[serde(with = "string_u64")]
    pub team_id: u64,

    /// Caller that attached the funds
    pub payer: Address,

    /// Native currency attached to the call
    #[serde(with = "string_u64")]
    pub amount: u64,

    /// Host timestamp of the payment
    #[serde(with = "string_u64")]
    pub timestamp: u64,

    /// Payer-supplied reference
    pub reference: String,

    /// Payer-supplied memo
    pub memo: String,
}

/// Proposed replacement membership entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// Wallet receiving the share
    pub member: Address,

    /// Role label
    pub role: String,

    /// Proposed share
    pub percentage: BasisPoints,
}

impl Allocation {
    /// Create new allocation
    pub fn new(member: Address, role: impl Into<String>, percentage: BasisPoints) -> Self {
        Self {
            member,
            role: role.into(),
            percentage,
        }
    }
}

/// Vote cast on a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalVote {
    /// Member that voted
    pub voter: Address,

    /// In favour or against
    pub support: bool,

    /// Voter's percentage when the vote was cast
    pub weight: BasisPoints,
}

/// Outcome of a closed proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalOutcome {
    /// Strict majority of cast weight in favour
    Accepted,
    /// Tie or majority against
    Rejected,
}

/// Governance proposal replacing a team's split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Proposal id (monotonic)
    #[serde(with = "string_u64")]
    pub id: u64,

    /// Team whose membership would change
    #[serde(with = "string_u64")]
    pub team_id: u64,

    /// Team owner that created the proposal
    pub creator: Address,

    /// Rationale
    pub reason: String,

    /// Voting closes at this timestamp
    #[serde(with = "string_u64")]
    pub end_time: u64,

    /// Set exactly once, never cleared
    pub executed: bool,

    /// Weight in favour
    pub yes_votes: u32,

    /// Weight against
    pub no_votes: u32,

    /// Creation timestamp
    #[serde(with = "string_u64")]
    pub created_at: u64,

    /// Replacement membership, totalling exactly 100%
    pub allocations: Vec<Allocation>,

    /// Votes in casting order
    pub votes: Vec<ProposalVote>,
}

impl Proposal {
    /// Voting is open strictly before `end_time`
    pub fn is_voting_open(&self, now: u64) -> bool {
        !self.executed && now < self.end_time
    }

    /// True once voting has closed and the proposal awaits finalization
    pub fn is_finalizable(&self, now: u64) -> bool {
        !self.executed && now >= self.end_time
    }

    /// Check if a wallet already voted
    pub fn has_voted(&self, voter: &Address) -> bool {
        self.votes.iter().any(|v| &v.voter == voter)
    }

    /// Append a vote and add its weight to the matching tally
    pub fn record_vote(&mut self, voter: Address, support: bool, weight: BasisPoints) {
        let weight_value = u32::from(weight.get());
        if support {
            self.yes_votes = self.yes_votes.saturating_add(weight_value);
        } else {
            self.no_votes = self.no_votes.saturating_add(weight_value);
        }
        self.votes.push(ProposalVote {
            voter,
            support,
            weight,
        });
    }

    /// Strict majority of cast weight; a tie is a rejection
    pub fn outcome(&self) -> ProposalOutcome {
        if self.yes_votes > self.no_votes {
            ProposalOutcome::Accepted
        } else {
            ProposalOutcome::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(value: u16) -> BasisPoints {
        BasisPoints::new(value).unwrap()
    }

    fn sample_team() -> Team {
        Team {
            id: 3,
            owner: Address::new("AU1owner"),
            name: "Band \"The Quotes\"".to_string(),
            description: "line one\nline two".to_string(),
            currency: "MASSA".to_string(),
            avatar: String::new(),
            tags: vec!["music".to_string(), "tab\there".to_string()],
            is_active: true,
            created_at: 1_700_000_000_000,
            pay_link_slug: "team-3".to_string(),
            total_received: 18_446_744_073_709_551_615,
            members: vec![TeamMember::new(Address::new("AU1alice"), "lead", bp(6000))],
        }
    }

    #[test]
    fn test_basis_points_bounds() {
        assert!(BasisPoints::new(0).is_ok());
        assert!(BasisPoints::new(10_000).is_ok());
        assert!(matches!(BasisPoints::new(10_001), Err(Error::Validation(_))));
        assert!(BasisPoints::ZERO.is_zero());
        assert_eq!(BasisPoints::FULL.get(), 10_000);
    }

    #[test]
    fn test_team_json_projection() {
        let json: serde_json::Value = serde_json::to_value(sample_team()).unwrap();

        assert_eq!(json["id"], "3");
        assert_eq!(json["owner"], "AU1owner");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["createdAt"], "1700000000000");
        assert_eq!(json["payLinkSlug"], "team-3");
        assert_eq!(json["totalReceived"], "18446744073709551615");
        assert_eq!(json["members"][0]["wallet"], "AU1alice");
        assert_eq!(json["members"][0]["percentage"], 6000);
        assert_eq!(json["members"][0]["totalEarned"], "0");
        assert_eq!(json["members"][0]["lastPaidAt"], "0");
    }

    #[test]
    fn test_json_field_order_and_escaping() {
        let text = serde_json::to_string(&sample_team()).unwrap();

        assert!(text.starts_with("{\"id\":\"3\",\"owner\":\"AU1owner\",\"name\":"));
        assert!(text.contains(r#""name":"Band \"The Quotes\"""#));
        assert!(text.contains(r#""description":"line one\nline two""#));
        assert!(text.contains(r#""tags":["music","tab\there"]"#));
        assert!(text.ends_with("\"totalEarned\":\"0\",\"lastPaidAt\":\"0\"}]}"));
    }

    #[test]
    fn test_json_rejects_out_of_range_percentage() {
        let raw = r#"{"member":"AU1x","role":"r","percentage":10001}"#;
        assert!(serde_json::from_str::<Allocation>(raw).is_err());

        let raw = r#"{"member":"AU1x","role":"r","percentage":2500}"#;
        let allocation: Allocation = serde_json::from_str(raw).unwrap();
        assert_eq!(allocation.percentage, bp(2500));
    }

    #[test]
    fn test_team_share_helpers() {
        let mut team = sample_team();
        assert_eq!(team.total_share(), 6000);
        assert!(!team.is_fully_allocated());

        team.members
            .push(TeamMember::new(Address::new("AU1bob"), "bass", bp(4000)));
        assert!(team.is_fully_allocated());
        assert_eq!(team.member_index(&Address::new("AU1bob")), Some(1));
        assert!(team.member(&Address::new("AU1carol")).is_none());
        assert!(team.is_owner(&Address::new("AU1owner")));
    }

    #[test]
    fn test_proposal_outcome_requires_strict_majority() {
        let mut proposal = Proposal {
            id: 1,
            team_id: 1,
            creator: Address::new("AU1owner"),
            reason: String::new(),
            end_time: 100,
            executed: false,
            yes_votes: 0,
            no_votes: 0,
            created_at: 0,
            allocations: vec![],
            votes: vec![],
        };
        assert_eq!(proposal.outcome(), ProposalOutcome::Rejected);

        proposal.record_vote(Address::new("AU1a"), true, bp(5000));
        proposal.record_vote(Address::new("AU1b"), false, bp(5000));
        assert_eq!(proposal.outcome(), ProposalOutcome::Rejected);

        proposal.record_vote(Address::new("AU1c"), true, bp(1));
        assert_eq!(proposal.outcome(), ProposalOutcome::Accepted);
        assert!(proposal.has_voted(&Address::new("AU1b")));
        assert_eq!(proposal.votes.len(), 3);
    }

    #[test]
    fn test_voting_window_boundaries() {
        let proposal = Proposal {
            id: 1,
            team_id: 1,
            creator: Address::new("AU1owner"),
            reason: String::new(),
            end_time: 100,
            executed: false,
            yes_votes: 0,
            no_votes: 0,
            created_at: 0,
            allocations: vec![],
            votes: vec![],
        };
        assert!(proposal.is_voting_open(99));
        assert!(!proposal.is_voting_open(100));
        assert!(!proposal.is_finalizable(99));
        assert!(proposal.is_finalizable(100));
    }
}
