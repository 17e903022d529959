//! AutoSplit node: opens the ledger store and reports its state

use anyhow::Context;
use autosplit_core::{
    storage::{PAYMENT_COUNTER, PROPOSAL_COUNTER, TEAM_COUNTER},
    CallContext, Config, Ledger, LocalHost,
};
use prometheus::{Encoder, TextEncoder};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting AutoSplit node");

    // Load configuration
    let config = match std::env::var("AUTOSPLIT_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };

    let ledger = Ledger::open(config).context("opening ledger store")?;
    tracing::info!(
        data_dir = ?ledger.config().data_dir,
        namespace = %ledger.config().namespace,
        "Ledger opened successfully"
    );

    let existing_owner = ledger.storage().transaction().contract_owner()?;
    match (existing_owner, std::env::var("AUTOSPLIT_OWNER")) {
        (Some(owner), _) => tracing::info!(%owner, "Contract already initialized"),
        (None, Ok(owner)) => {
            let now = u64::try_from(chrono::Utc::now().timestamp_millis())
                .context("system clock before epoch")?;
            let mut host = LocalHost::new();
            ledger.initialize(&CallContext::new(owner, now), &mut host)?;
            for event in host.events() {
                tracing::info!(%event, "Event");
            }
        }
        (None, Err(_)) => tracing::warn!("Contract not initialized; set AUTOSPLIT_OWNER"),
    }

    let tx = ledger.storage().transaction();
    tracing::info!(
        teams = tx.counter(TEAM_COUNTER)?,
        payments = tx.counter(PAYMENT_COUNTER)?,
        proposals = tx.counter(PROPOSAL_COUNTER)?,
        "Ledger counters"
    );

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&ledger.metrics().registry().gather(), &mut buffer)?;
    tracing::debug!(metrics = %String::from_utf8_lossy(&buffer), "Metrics snapshot");

    tracing::info!("Shutting down AutoSplit node");
    Ok(())
}
