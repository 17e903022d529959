//! Error types for the split ledger
//!
//! Every failed call is rejected as a whole: operations validate before they
//! write, and pending writes are dropped with the transaction on error.

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing required input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced team, proposal, payment or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the required role (team owner or team member)
    #[error("Unauthorized: {0}")]
    Authorization(String),

    /// Operation would break the 100% split or exact allocation invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Duplicate member, duplicate vote, or repeated one-shot transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Proposal did not reach a strict majority of cast weight
    #[error("Proposal {proposal_id} rejected: {yes_votes} yes vs {no_votes} no")]
    ProposalRejected {
        /// Proposal id
        proposal_id: u64,
        /// Weight voted in favour
        yes_votes: u32,
        /// Weight voted against
        no_votes: u32,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Canonical byte encoding could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// JSON projection error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Host refused a native currency transfer
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures caused by the caller's input or role, as opposed to
    /// storage, codec or host failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::Authorization(_)
                | Error::InvariantViolation(_)
                | Error::Conflict(_)
                | Error::ProposalRejected { .. }
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
