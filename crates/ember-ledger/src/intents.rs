//! Durable transfer intents and batched processing.
//!
//! Registration only checks that both accounts exist; balances and
//! self-sends are judged when processed. Processing runs intents whose
//! accounts appear only once in the batch in parallel and the rest
//! serially, folding transient parallel failures into the serial pass.
//! Terminal failures and successes are both dequeued; transient ones
//! stay for the next pass.

use std::collections::HashMap;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use ember_core::error::{StoreError, TransferError};
use ember_core::traits::LedgerStore;
use ember_core::types::{AccountKey, Intent};

use crate::ledger::Ledger;

impl<S: LedgerStore + 'static> Ledger<S> {
    /// Queue a transfer to be applied by a later processing pass.
    ///
    /// Both accounts must exist, but nothing else is validated here;
    /// balance and self-send checks happen at processing time. Returns
    /// `None` if the intent could not be stored.
    pub fn register_intent(
        &self,
        sender: AccountKey,
        receiver: AccountKey,
        amount: u64,
        epoch: u64,
    ) -> Option<Intent> {
        for key in [&sender, &receiver] {
            match self.store.get_account(key) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(account = %key, "intent references unknown account");
                    return None;
                }
                Err(err) => {
                    warn!(error = %err, "failed to look up intent account");
                    return None;
                }
            }
        }
        match self.store.push_intent(sender, receiver, amount, epoch) {
            Ok(intent) => Some(intent),
            Err(err) => {
                warn!(error = %err, "failed to register intent");
                None
            }
        }
    }

    /// Queued intents in registration order.
    pub fn pending_intents(&self, offset: usize, limit: usize) -> Result<Vec<Intent>, StoreError> {
        self.store.intents(offset, limit)
    }

    /// Apply up to `intent_batch_max` queued intents at `epoch` and
    /// return the ids that succeeded, ascending. The registration epoch
    /// is discarded; intents apply at the processing epoch.
    pub async fn process_intents(&self, epoch: u64) -> Vec<u64> {
        let pending = match self.store.intents(0, self.config.intent_batch_max) {
            Ok(pending) => pending,
            Err(err) => {
                error!(error = %err, "failed to fetch pending intents");
                return Vec::new();
            }
        };
        if pending.is_empty() {
            return Vec::new();
        }
        debug!(count = pending.len(), epoch, "processing intents");

        // An intent can run in parallel only if no other intent in the
        // batch touches either of its accounts.
        let mut occurrences: HashMap<&AccountKey, usize> = HashMap::new();
        for intent in &pending {
            *occurrences.entry(&intent.sender).or_default() += 1;
            *occurrences.entry(&intent.receiver).or_default() += 1;
        }
        let (parallel, serial): (Vec<&Intent>, Vec<&Intent>) =
            pending.iter().partition(|intent| {
                occurrences[&intent.sender] == 1 && occurrences[&intent.receiver] == 1
            });

        let mut succeeded = Vec::new();
        let mut terminal = Vec::new();

        let mut tasks = JoinSet::new();
        for intent in &parallel {
            let ledger = self.clone();
            let intent = (*intent).clone();
            tasks.spawn_blocking(move || {
                let result = ledger.assign(&intent.sender, &intent.receiver, intent.amount, epoch);
                (intent.id, result)
            });
        }
        // Transient failures were lock contention in the parallel pass;
        // bump them onto the serial pass instead of giving up.
        let by_id: HashMap<u64, &Intent> = pending.iter().map(|i| (i.id, i)).collect();
        let mut bumped: Vec<&Intent> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(()))) => succeeded.push(id),
                Ok((id, Err(err))) if err.is_retryable() => {
                    if let Some(intent) = by_id.get(&id).copied() {
                        bumped.push(intent);
                    }
                }
                Ok((id, Err(_))) => terminal.push(id),
                // A panicked transfer leaves its intent queued.
                Err(err) => warn!(error = %err, "intent task failed to join"),
            }
        }
        bumped.sort_by_key(|intent| intent.id);

        for intent in serial.iter().chain(bumped.iter()) {
            match self.assign(&intent.sender, &intent.receiver, intent.amount, epoch) {
                Ok(()) => succeeded.push(intent.id),
                Err(err) if err.is_retryable() => {
                    debug!(intent = intent.id, error = %err, "intent deferred to next pass");
                }
                Err(_) => terminal.push(intent.id),
            }
        }

        let mut done: Vec<u64> = succeeded.iter().chain(terminal.iter()).copied().collect();
        done.sort_unstable();
        if let Err(err) = self.store.delete_intents(&done) {
            error!(error = %err, "failed to dequeue processed intents");
            return Vec::new();
        }

        succeeded.sort_unstable();
        succeeded
    }
}
