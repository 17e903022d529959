//! Metrics collection for observability
//!
//! Prometheus collectors are registered in a private [`Registry`] so several
//! ledgers can live in one process (tests open many).
//!
//! # Metrics
//!
//! - `autosplit_teams_created_total` - Teams created
//! - `autosplit_members_added_total` - Members added by owners
//! - `autosplit_payments_total` - Payments split
//! - `autosplit_received_units_total` - Native currency received
//! - `autosplit_owner_dust_units_total` - Truncation remainder routed to owners
//! - `autosplit_payment_recipients` - Histogram of member transfers per payment
//! - `autosplit_proposals_created_total` - Split proposals created
//! - `autosplit_votes_total` - Votes cast
//! - `autosplit_proposals_executed_total` - Proposals that rebuilt a membership
//! - `autosplit_proposals_rejected_total` - Proposals finalized as rejected

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Teams created
    pub teams_created: IntCounter,

    /// Members added
    pub members_added: IntCounter,

    /// Payments split
    pub payments_total: IntCounter,

    /// Native currency received
    pub received_units: IntCounter,

    /// Remainder routed to owners
    pub owner_dust_units: IntCounter,

    /// Member transfers per payment
    pub payment_recipients: Histogram,

    /// Proposals created
    pub proposals_created: IntCounter,

    /// Votes cast
    pub votes_total: IntCounter,

    /// Proposals applied
    pub proposals_executed: IntCounter,

    /// Proposals closed without effect
    pub proposals_rejected: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let teams_created = counter("autosplit_teams_created_total", "Teams created")?;
        let members_added = counter("autosplit_members_added_total", "Members added by owners")?;
        let payments_total = counter("autosplit_payments_total", "Payments split")?;
        let received_units = counter(
            "autosplit_received_units_total",
            "Native currency received by teams",
        )?;
        let owner_dust_units = counter(
            "autosplit_owner_dust_units_total",
            "Truncation remainder routed to team owners",
        )?;
        let proposals_created =
            counter("autosplit_proposals_created_total", "Split proposals created")?;
        let votes_total = counter("autosplit_votes_total", "Votes cast on proposals")?;
        let proposals_executed = counter(
            "autosplit_proposals_executed_total",
            "Proposals that replaced a team membership",
        )?;
        let proposals_rejected = counter(
            "autosplit_proposals_rejected_total",
            "Proposals finalized as rejected",
        )?;

        let payment_recipients = Histogram::with_opts(
            HistogramOpts::new(
                "autosplit_payment_recipients",
                "Member transfers per payment",
            )
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(payment_recipients.clone()))?;

        Ok(Self {
            teams_created,
            members_added,
            payments_total,
            received_units,
            owner_dust_units,
            payment_recipients,
            proposals_created,
            votes_total,
            proposals_executed,
            proposals_rejected,
            registry,
        })
    }

    /// Record a split payment
    pub fn record_payment(&self, amount: u64, recipients: usize, remainder: u64) {
        self.payments_total.inc();
        self.received_units.inc_by(amount);
        self.owner_dust_units.inc_by(remainder);
        self.payment_recipients.observe(recipients as f64);
    }

    /// Record a finalized proposal
    pub fn record_finalized(&self, accepted: bool) {
        if accepted {
            self.proposals_executed.inc();
        } else {
            self.proposals_rejected.inc();
        }
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("teams_created", &self.teams_created.get())
            .field("payments_total", &self.payments_total.get())
            .field("proposals_created", &self.proposals_created.get())
            .finish()
    }
}
