//! Epoch ticks: per-account top-up, long-tail collapse, and decay.
//!
//! A tick refreshes every account whose `last_refresh_epoch` is behind
//! the target epoch, in batches selected oldest-first. Each batch is one
//! atomic write; a version conflict (a transfer raced the tick) just
//! re-selects, since refreshed accounts drop out of the stale set.

use tracing::{info, warn};

use ember_core::constants::BPS_PRECISION;
use ember_core::error::StoreError;
use ember_core::traits::{BatchOp, LedgerStore, WriteBatch};
use ember_core::types::{tally, Account, AccountKey, Attribution};

use crate::ledger::Ledger;
use crate::transfer::mul_div_floor;

/// Consecutive conflicting batches tolerated before the tick gives up.
const MAX_CONSECUTIVE_CONFLICTS: usize = 3;

impl<S: LedgerStore> Ledger<S> {
    /// Run the tick for `epoch`: refresh all stale accounts, prune the
    /// holding queue, and record the epoch. Idempotent per epoch.
    pub fn epoch_tick(&self, epoch: u64) -> Result<(), StoreError> {
        let mut conflicts = 0usize;
        let mut refreshed = 0usize;
        loop {
            let stale = self
                .store
                .stale_accounts(epoch, self.config.epoch_batch_size)?;
            if stale.is_empty() {
                break;
            }
            match self.refresh_batch(&stale, epoch) {
                Ok(()) => {
                    conflicts = 0;
                    refreshed += stale.len();
                }
                Err(StoreError::Conflict(key)) => {
                    conflicts += 1;
                    warn!(epoch, account = %key, attempt = conflicts, "tick batch conflicted");
                    if conflicts >= MAX_CONSECUTIVE_CONFLICTS {
                        return Err(StoreError::Conflict(key));
                    }
                }
                Err(err) => return Err(err),
            }
        }
        self.queue.prune(epoch, self.config.horizon_epochs());
        self.store.record_epoch(epoch)?;
        info!(epoch, refreshed, "epoch ticked");
        Ok(())
    }

    /// Refresh one batch of accounts at `epoch` as a single atomic write.
    fn refresh_batch(&self, accounts: &[Account], epoch: u64) -> Result<(), StoreError> {
        let keep_rate = BPS_PRECISION - self.config.decay_rate_bps;
        let mut batch = WriteBatch::new();
        for account in accounts {
            batch.expect_version(account.key.clone(), account.version);

            let mut edges = self.store.attributions(&account.key)?;
            edges.sort_by(|a, b| {
                b.amount
                    .cmp(&a.amount)
                    .then_with(|| a.contributor.cmp(&b.contributor))
            });
            let folded = if edges.len() > self.config.keep_top_edges {
                let tail = edges.split_off(self.config.keep_top_edges);
                for entry in &tail {
                    batch.push(BatchOp::DeleteAttribution {
                        owner: account.key.clone(),
                        contributor: entry.contributor.clone(),
                    });
                }
                tally(&tail)
            } else {
                0
            };

            let mut updated = account.clone();
            updated.own_points = self.config.max_own_points;
            updated.others_points = mul_div_floor(
                updated.others_points.saturating_add(folded),
                keep_rate,
                BPS_PRECISION,
            );
            updated.last_refresh_epoch = epoch;
            batch.push(BatchOp::PutAccount(updated));

            for entry in edges {
                let decayed = mul_div_floor(entry.amount, keep_rate, BPS_PRECISION);
                if decayed > 0 {
                    batch.push(BatchOp::PutAttribution {
                        owner: account.key.clone(),
                        entry: Attribution {
                            contributor: entry.contributor,
                            amount: decayed,
                            epoch,
                        },
                    });
                } else {
                    batch.push(BatchOp::DeleteAttribution {
                        owner: account.key.clone(),
                        contributor: entry.contributor,
                    });
                }
            }
        }
        self.store.apply(batch)
    }

    /// Keys of stale accounts a tick for `epoch` would refresh, for
    /// inspection and scheduling.
    pub fn stale_account_keys(&self, epoch: u64) -> Result<Vec<AccountKey>, StoreError> {
        Ok(self
            .store
            .stale_accounts(epoch, usize::MAX)?
            .into_iter()
            .map(|account| account.key)
            .collect())
    }
}
