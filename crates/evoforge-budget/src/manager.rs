use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use evoforge_core::error::{ForgeError, Result};
use evoforge_core::types::{BudgetScope, TokenId};

#[derive(Debug, Clone, Copy)]
struct Account {
    limit: f64,
    spend: f64,
}

impl Account {
    fn new(limit: f64) -> Self {
        Self { limit, spend: 0.0 }
    }

    fn exhausted(&self) -> bool {
        self.spend >= self.limit
    }
}

#[derive(Debug)]
struct Master {
    id: TokenId,
    account: Account,
    released: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    master: Option<Master>,
    children: HashMap<TokenId, Account>,
}

impl Ledger {
    fn master(&self) -> Result<&Master> {
        match &self.master {
            Some(m) if m.released => Err(ForgeError::MasterReleased),
            Some(m) => Ok(m),
            None => Err(ForgeError::MasterNotAcquired),
        }
    }
}

/// Hierarchical spend tracker: one master token per run, many child tokens
/// beneath it.
///
/// Every operation takes one lock for a constant-time read-modify-write and
/// never holds it across an await point.
#[derive(Debug, Default)]
pub struct BudgetManager {
    ledger: Mutex<Ledger>,
}

impl BudgetManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger.lock().map_err(|_| ForgeError::LockPoisoned)
    }

    /// Acquire the run's master token. Only one master may ever be acquired.
    pub fn acquire_master(&self, limit: f64) -> Result<TokenId> {
        let mut ledger = self.lock()?;
        if ledger.master.is_some() {
            return Err(ForgeError::MasterAlreadyAcquired);
        }
        let id = TokenId::new();
        ledger.master = Some(Master {
            id,
            account: Account::new(limit),
            released: false,
        });
        debug!(token = %id, limit, "Master token acquired");
        Ok(id)
    }

    /// Issue a child token under `master` with its own spend ceiling.
    pub fn issue_child(&self, limit: f64, master: TokenId) -> Result<TokenId> {
        let mut ledger = self.lock()?;
        if ledger.master()?.id != master {
            return Err(ForgeError::MasterMismatch(master));
        }
        let id = TokenId::new();
        ledger.children.insert(id, Account::new(limit));
        Ok(id)
    }

    /// Add `amount` to a child and to the master.
    ///
    /// The spend is committed even when it pushes a total past its limit;
    /// the returned error is the stop-signal for the token's lineage. The
    /// child limit is checked before the master limit.
    pub fn record_spend(&self, child: TokenId, amount: f64) -> Result<()> {
        if !(amount.is_finite() && amount >= 0.0) {
            return Err(ForgeError::InvalidSpend(amount));
        }
        let mut ledger = self.lock()?;
        ledger.master()?;
        let account = ledger
            .children
            .get_mut(&child)
            .ok_or(ForgeError::UnknownToken(child))?;
        account.spend += amount;
        let child_account = *account;

        let master = match ledger.master.as_mut() {
            Some(m) => &mut m.account,
            None => return Err(ForgeError::MasterNotAcquired),
        };
        master.spend += amount;
        let master_account = *master;
        drop(ledger);

        if child_account.spend > child_account.limit {
            warn!(token = %child, spend = child_account.spend, limit = child_account.limit, "Child budget exceeded");
            return Err(ForgeError::BudgetExceeded {
                scope: BudgetScope::Child,
                limit: child_account.limit,
                total: child_account.spend,
            });
        }
        if master_account.spend > master_account.limit {
            warn!(spend = master_account.spend, limit = master_account.limit, "Master budget exceeded");
            return Err(ForgeError::BudgetExceeded {
                scope: BudgetScope::Master,
                limit: master_account.limit,
                total: master_account.spend,
            });
        }
        Ok(())
    }

    /// Fail fast if a call billed to `token` may not start.
    pub fn check(&self, token: TokenId) -> Result<()> {
        let ledger = self.lock()?;
        let master = ledger.master()?;
        let child = ledger
            .children
            .get(&token)
            .ok_or(ForgeError::UnknownToken(token))?;
        if child.exhausted() {
            return Err(ForgeError::BudgetExceeded {
                scope: BudgetScope::Child,
                limit: child.limit,
                total: child.spend,
            });
        }
        if master.account.exhausted() {
            return Err(ForgeError::BudgetExceeded {
                scope: BudgetScope::Master,
                limit: master.account.limit,
                total: master.account.spend,
            });
        }
        Ok(())
    }

    /// Whether a child token (or the master above it) has reached its limit.
    pub fn is_exhausted(&self, token: TokenId) -> bool {
        matches!(self.check(token), Err(ForgeError::BudgetExceeded { .. }))
    }

    /// Total spent against a child token.
    pub fn spend(&self, child: TokenId) -> Result<f64> {
        let ledger = self.lock()?;
        ledger
            .children
            .get(&child)
            .map(|a| a.spend)
            .ok_or(ForgeError::UnknownToken(child))
    }

    /// Total spent against the master token, or zero before acquisition.
    pub fn master_spend(&self) -> f64 {
        self.lock()
            .ok()
            .and_then(|l| l.master.as_ref().map(|m| m.account.spend))
            .unwrap_or(0.0)
    }

    /// Budget left on the master token.
    pub fn remaining(&self) -> f64 {
        self.lock()
            .ok()
            .and_then(|l| {
                l.master
                    .as_ref()
                    .map(|m| m.account.limit - m.account.spend)
            })
            .unwrap_or(0.0)
    }

    /// Close the run's accounting and return the billed total.
    ///
    /// After release no child can be issued or charged.
    pub fn release_master(&self, master: TokenId) -> Result<f64> {
        let mut ledger = self.lock()?;
        let m = match ledger.master.as_mut() {
            Some(m) if m.id == master => m,
            Some(_) => return Err(ForgeError::MasterMismatch(master)),
            None => return Err(ForgeError::MasterNotAcquired),
        };
        m.released = true;
        let total = m.account.spend;
        debug!(token = %master, total, "Master token released");
        Ok(total)
    }
}
