//! AutoSplit Ledger Core
//!
//! Team revenue-split ledger: teams of wallets holding basis-point shares,
//! payments split proportionally on arrival, and member-weighted proposals
//! that replace a team's split.
//!
//! # Architecture
//!
//! - **Ledger**: teams, members and payment splitting ([`Ledger`])
//! - **Governance**: split proposals, weighted votes, execution and sweeps
//! - **Storage**: namespaced key-value records with id indexes, committed in
//!   atomic batches ([`storage::Transaction`])
//! - **Contract**: binary entry points over the canonical argument codec
//!
//! # Invariants
//!
//! - A team's member percentages never exceed 10000 basis points
//! - Payments are only accepted when the percentages total exactly 10000
//! - Every received unit leaves the contract: member shares plus the owner's
//!   truncation remainder equal the payment
//! - A proposal is executed at most once
//! - A failed call leaves no writes and emits no events

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod governance;
pub mod host;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod split;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use contract::{Contract, EntryPoint};
pub use error::{Error, Result};
pub use governance::Finalized;
pub use host::{CallContext, Host, LocalHost};
pub use ledger::{Ledger, NewTeam};
pub use metrics::Metrics;
pub use query::{ContractConfig, ProposalView};
pub use storage::{KvStore, MemoryStore, RocksStore};
pub use types::{
    Address, Allocation, BasisPoints, Payment, Proposal, ProposalOutcome, ProposalVote, Team,
    TeamMember,
};
