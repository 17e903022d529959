//! Boundary with the hosting execution environment
//!
//! The host supplies caller identity, time and attached coins for each call
//! ([`CallContext`]), moves native currency out of the contract balance and
//! records notification events ([`Host`]). Passing both explicitly keeps the
//! ledger deterministic under test.

use crate::types::Address;
use crate::{Error, Result};
use std::collections::HashMap;

/// Per-call facts supplied by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Identity of the caller
    pub caller: Address,

    /// Host time in milliseconds
    pub timestamp: u64,

    /// Native currency attached to the call
    pub transferred: u64,
}

impl CallContext {
    /// Context with no attached coins
    pub fn new(caller: impl Into<Address>, timestamp: u64) -> Self {
        Self {
            caller: caller.into(),
            timestamp,
            transferred: 0,
        }
    }

    /// Attach coins to the call
    pub fn with_coins(mut self, amount: u64) -> Self {
        self.transferred = amount;
        self
    }
}

/// Side effects the ledger asks of its host
pub trait Host {
    /// Move `amount` from the contract balance to `to`
    fn transfer(&mut self, to: &Address, amount: u64) -> Result<()>;

    /// Append a notification to the host's event log
    fn emit(&mut self, event: String);
}

/// In-process host keeping balances and events in memory
///
/// Coins attached to a call must be credited with [`LocalHost::receive`]
/// before the call runs, mirroring a chain that credits the contract before
/// executing it.
#[derive(Debug, Default)]
pub struct LocalHost {
    contract_balance: u64,
    balances: HashMap<Address, u64>,
    events: Vec<String>,
}

impl LocalHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit the coins attached to `ctx` to the contract
    pub fn receive(&mut self, ctx: &CallContext) {
        self.contract_balance = self.contract_balance.saturating_add(ctx.transferred);
    }

    /// Contract balance
    pub fn contract_balance(&self) -> u64 {
        self.contract_balance
    }

    /// Balance received by a wallet
    pub fn balance_of(&self, wallet: &Address) -> u64 {
        self.balances.get(wallet).copied().unwrap_or(0)
    }

    /// Emitted events, oldest first
    pub fn events(&self) -> &[String] {
        &self.events
    }
}

impl Host for LocalHost {
    fn transfer(&mut self, to: &Address, amount: u64) -> Result<()> {
        if amount > self.contract_balance {
            return Err(Error::Transfer(format!(
                "contract balance {} cannot cover {} to {}",
                self.contract_balance, amount, to
            )));
        }
        self.contract_balance -= amount;
        let balance = self.balances.entry(to.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    fn emit(&mut self, event: String) {
        tracing::trace!(%event, "Event emitted");
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_moves_contract_balance() {
        let mut host = LocalHost::new();
        let ctx = CallContext::new("AU1payer", 10).with_coins(100);
        host.receive(&ctx);

        host.transfer(&Address::new("AU1a"), 60).unwrap();
        assert_eq!(host.contract_balance(), 40);
        assert_eq!(host.balance_of(&Address::new("AU1a")), 60);
        assert_eq!(host.balance_of(&Address::new("AU1b")), 0);
    }

    #[test]
    fn test_transfer_beyond_balance_fails() {
        let mut host = LocalHost::new();
        let result = host.transfer(&Address::new("AU1a"), 1);
        assert!(matches!(result, Err(Error::Transfer(_))));
        assert_eq!(host.balance_of(&Address::new("AU1a")), 0);
    }
}
