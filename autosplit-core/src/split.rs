//! Proportional split arithmetic
//!
//! Each member receives `floor(amount * percentage / 10000)`. Whatever the
//! floors leave behind (always fewer units than there are members) goes to the
//! team owner, so a payment is always disbursed in full.

use crate::types::{Address, Allocation, BasisPoints, TeamMember};

/// Sum of shares, wide enough that no member list can overflow it
pub fn share_total(shares: impl IntoIterator<Item = BasisPoints>) -> u32 {
    shares.into_iter().map(|bp| u32::from(bp.get())).sum()
}

/// `floor(amount * percentage / 10000)` with a 128-bit intermediate
pub fn member_share(amount: u64, percentage: BasisPoints) -> u64 {
    let product = u128::from(amount) * u128::from(percentage.get());
    // percentage <= 10000, so the quotient never exceeds amount
    (product / u128::from(BasisPoints::FULL.get())) as u64
}

/// One non-zero transfer to a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    /// Position in the team's member list
    pub index: usize,
    /// Recipient
    pub wallet: Address,
    /// Amount transferred
    pub amount: u64,
}

/// Disbursement of one payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    /// Member transfers, in member order, zero shares omitted
    pub payouts: Vec<Payout>,
    /// Truncation dust routed to the owner
    pub remainder: u64,
}

impl SplitPlan {
    /// Total sent to members
    pub fn distributed(&self) -> u64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

/// Compute member transfers and the owner's remainder for `amount`
pub fn plan_split(amount: u64, members: &[TeamMember]) -> SplitPlan {
    let payouts: Vec<Payout> = members
        .iter()
        .enumerate()
        .filter_map(|(index, member)| {
            let share = member_share(amount, member.percentage);
            (share > 0).then(|| Payout {
                index,
                wallet: member.wallet.clone(),
                amount: share,
            })
        })
        .collect();

    let mut plan = SplitPlan {
        payouts,
        remainder: 0,
    };
    plan.remainder = amount.saturating_sub(plan.distributed());
    plan
}

/// Credit a plan's payouts to the members' history
pub fn record_payouts(members: &mut [TeamMember], plan: &SplitPlan, now: u64) {
    for payout in &plan.payouts {
        if let Some(member) = members.get_mut(payout.index) {
            member.total_earned = member.total_earned.saturating_add(payout.amount);
            member.last_paid_at = now;
        }
    }
}

/// Membership produced by an accepted proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebuild {
    /// New member list, in allocation order
    pub members: Vec<TeamMember>,
    /// Former members absent from the allocations
    pub removed: Vec<Address>,
}

/// Replace `current` with the allocation set
///
/// Existing wallets keep their earnings history and take the allocation's role
/// and percentage; new wallets start with no history; wallets not allocated
/// are dropped.
pub fn rebuild_members(current: &[TeamMember], allocations: &[Allocation]) -> Rebuild {
    let members = allocations
        .iter()
        .map(|allocation| {
            match current.iter().find(|m| m.wallet == allocation.member) {
                Some(existing) => TeamMember {
                    role: allocation.role.clone(),
                    percentage: allocation.percentage,
                    ..existing.clone()
                },
                None => TeamMember::new(
                    allocation.member.clone(),
                    allocation.role.clone(),
                    allocation.percentage,
                ),
            }
        })
        .collect();

    let removed = current
        .iter()
        .filter(|m| !allocations.iter().any(|a| a.member == m.wallet))
        .map(|m| m.wallet.clone())
        .collect();

    Rebuild { members, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(wallet: &str, bp: u16) -> TeamMember {
        TeamMember::new(Address::new(wallet), "role", BasisPoints::new(bp).unwrap())
    }

    #[test]
    fn test_even_split_has_no_remainder() {
        let members = vec![member("AU1a", 6000), member("AU1b", 4000)];
        let plan = plan_split(1000, &members);

        assert_eq!(plan.payouts.len(), 2);
        assert_eq!(plan.payouts[0].amount, 600);
        assert_eq!(plan.payouts[1].amount, 400);
        assert_eq!(plan.remainder, 0);
        assert_eq!(plan.distributed(), 1000);
    }

    #[test]
    fn test_truncation_dust_goes_to_remainder() {
        let members = vec![
            member("AU1a", 3333),
            member("AU1b", 3333),
            member("AU1c", 3334),
        ];
        let plan = plan_split(100, &members);

        let amounts: Vec<u64> = plan.payouts.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![33, 33, 33]);
        assert_eq!(plan.remainder, 1);
    }

    #[test]
    fn test_zero_shares_are_skipped() {
        let members = vec![member("AU1a", 9999), member("AU1b", 1)];
        let plan = plan_split(10, &members);

        assert_eq!(plan.payouts.len(), 1);
        assert_eq!(plan.payouts[0].wallet, Address::new("AU1a"));
        assert_eq!(plan.payouts[0].amount, 9);
        assert_eq!(plan.remainder, 1);
    }

    #[test]
    fn test_large_amount_does_not_overflow() {
        let members = vec![member("AU1a", 10_000)];
        let plan = plan_split(u64::MAX, &members);
        assert_eq!(plan.payouts[0].amount, u64::MAX);
        assert_eq!(plan.remainder, 0);
    }

    #[test]
    fn test_record_payouts_updates_history() {
        let mut members = vec![member("AU1a", 9999), member("AU1b", 1)];
        let plan = plan_split(10, &members);
        record_payouts(&mut members, &plan, 42);

        assert_eq!(members[0].total_earned, 9);
        assert_eq!(members[0].last_paid_at, 42);
        assert_eq!(members[1].total_earned, 0);
        assert_eq!(members[1].last_paid_at, 0);
    }

    #[test]
    fn test_rebuild_preserves_history_and_drops_absent() {
        let mut alice = member("AU1a", 5000);
        alice.total_earned = 700;
        alice.last_paid_at = 9;
        let current = vec![alice, member("AU1b", 5000)];

        let allocations = vec![
            Allocation::new(Address::new("AU1c"), "new", BasisPoints::new(2500).unwrap()),
            Allocation::new(Address::new("AU1a"), "lead", BasisPoints::new(7500).unwrap()),
        ];
        let rebuild = rebuild_members(&current, &allocations);

        assert_eq!(rebuild.members.len(), 2);
        assert_eq!(rebuild.members[0].wallet, Address::new("AU1c"));
        assert_eq!(rebuild.members[0].total_earned, 0);
        assert_eq!(rebuild.members[1].role, "lead");
        assert_eq!(rebuild.members[1].percentage.get(), 7500);
        assert_eq!(rebuild.members[1].total_earned, 700);
        assert_eq!(rebuild.members[1].last_paid_at, 9);
        assert_eq!(rebuild.removed, vec![Address::new("AU1b")]);
    }

    #[test]
    fn test_share_total_is_wide() {
        let shares = vec![BasisPoints::FULL; 10];
        assert_eq!(share_total(shares), 100_000);
    }
}
