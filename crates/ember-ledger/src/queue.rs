//! Holding queue for transfers that cannot be credited directly.
//!
//! Bundles wait here when the receiver opted out of direct credits or
//! blocks the sender. Claiming applies a linear decay for the epochs
//! spent waiting (deliberately steeper than the compounding per-epoch
//! decay of held points), and bundles past the retention horizon are
//! pruned at each epoch tick.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use ember_core::constants::BPS_PRECISION;
use ember_core::error::TransferError;
use ember_core::traits::{BatchOp, LedgerStore, WriteBatch};
use ember_core::types::{AccountKey, Attribution, QueuedBundle};

use crate::ledger::Ledger;
use crate::transfer::{merge_credits, mul_div_floor};

/// In-process queue of unclaimed credit bundles, keyed by receiver.
#[derive(Default)]
pub struct HoldingQueue {
    inner: Arc<DashMap<AccountKey, Vec<QueuedBundle>>>,
}

impl Clone for HoldingQueue {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl HoldingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bundle to `receiver`'s queue.
    pub(crate) fn push(&self, receiver: AccountKey, bundle: QueuedBundle) {
        self.inner.entry(receiver).or_default().push(bundle);
    }

    /// Snapshot of `receiver`'s pending bundles, in arrival order.
    pub fn bundles(&self, receiver: &AccountKey) -> Vec<QueuedBundle> {
        self.inner
            .get(receiver)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Number of pending bundles for `receiver`.
    pub fn len(&self, receiver: &AccountKey) -> usize {
        self.inner.get(receiver).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Drop every bundle older than `horizon` epochs as of `epoch`.
    pub(crate) fn prune(&self, epoch: u64, horizon: u64) {
        for mut entry in self.inner.iter_mut() {
            entry
                .value_mut()
                .retain(|bundle| epoch.saturating_sub(bundle.epoch) <= horizon);
        }
        self.inner.retain(|_, bundles| !bundles.is_empty());
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Pending holding-queue bundles for `receiver`.
    pub fn queued_bundles(&self, receiver: &AccountKey) -> Vec<QueuedBundle> {
        self.queue.bundles(receiver)
    }

    /// Claim the bundle at `index` in `receiver`'s queue, crediting its
    /// entries after decaying them for the epochs spent waiting.
    ///
    /// The decay is a single linear step of `decay_rate * elapsed`, not
    /// a compounded one; a bundle that waited to 100% is removed without
    /// crediting anything. An out-of-range index fails with
    /// [`TransferError::DeductFailed`]. The bundle stays queued if the
    /// credit write conflicts, so the claim can be retried.
    pub fn claim(
        &self,
        receiver: &AccountKey,
        index: usize,
        epoch: u64,
    ) -> Result<(), TransferError> {
        let receiver_account = self
            .store
            .get_account(receiver)?
            .ok_or(TransferError::ReceiverDoesNotExist)?;

        // The entry guard serializes concurrent claims on one receiver.
        let Some(mut guard) = self.queue.inner.get_mut(receiver) else {
            return Err(TransferError::DeductFailed);
        };
        if index >= guard.len() {
            return Err(TransferError::DeductFailed);
        }
        let bundle = guard[index].clone();

        let elapsed = epoch.saturating_sub(bundle.epoch);
        let decay_bps = elapsed
            .saturating_mul(self.config.decay_rate_bps)
            .min(BPS_PRECISION);

        if decay_bps < BPS_PRECISION {
            let keep = BPS_PRECISION - decay_bps;
            let decayed: Vec<Attribution> = bundle
                .entries
                .iter()
                .map(|entry| Attribution {
                    contributor: entry.contributor.clone(),
                    amount: mul_div_floor(entry.amount, keep, BPS_PRECISION),
                    epoch: entry.epoch,
                })
                .filter(|entry| entry.amount > 0)
                .collect();

            let existing = self.store.attributions(receiver)?;
            let puts = merge_credits(
                receiver,
                &existing,
                &decayed,
                epoch,
                self.config.min_transfer,
            );
            if !puts.is_empty() {
                let mut batch = WriteBatch::new();
                batch.expect_version(receiver_account.key.clone(), receiver_account.version);
                for entry in puts {
                    batch.push(BatchOp::PutAttribution {
                        owner: receiver.clone(),
                        entry,
                    });
                }
                self.store.apply(batch)?;
            }
        }

        guard.remove(index);
        let emptied = guard.is_empty();
        drop(guard);
        if emptied {
            self.queue
                .inner
                .remove_if(receiver, |_, bundles| bundles.is_empty());
        }
        debug!(receiver = %receiver, index, epoch, decay_bps, "bundle claimed");
        Ok(())
    }
}
