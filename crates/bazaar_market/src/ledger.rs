//! # In-Memory Ledger
//!
//! Reference [`Ledger`] used by tests, benches and single-process hosts.

use std::collections::HashMap;

use crate::fixed_point::Price;
use crate::ports::{ActorId, Ledger};

/// Balances keyed by actor. Unknown actors have a zero balance.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<ActorId, Price>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the balance of `account`, replacing any previous value.
    #[must_use]
    pub fn with_balance(mut self, account: ActorId, balance: Price) -> Self {
        self.balances.insert(account, balance);
        self
    }

    /// Sum of all balances, saturating.
    #[must_use]
    pub fn total(&self) -> Price {
        self.balances
            .values()
            .fold(Price::ZERO, |acc, balance| {
                acc.checked_add(*balance).unwrap_or(Price::from_minor(u64::MAX))
            })
    }
}

impl Ledger for InMemoryLedger {
    fn withdraw(&mut self, account: ActorId, amount: Price) -> bool {
        let Some(balance) = self.balances.get_mut(&account) else {
            return amount.is_zero();
        };
        match balance.checked_sub(amount) {
            Some(rest) => {
                *balance = rest;
                true
            }
            None => false,
        }
    }

    fn deposit(&mut self, account: ActorId, amount: Price) {
        let balance = self.balances.entry(account).or_insert(Price::ZERO);
        *balance = balance
            .checked_add(amount)
            .unwrap_or(Price::from_minor(u64::MAX));
    }

    fn balance(&self, account: ActorId) -> Price {
        self.balances.get(&account).copied().unwrap_or(Price::ZERO)
    }
}
