//! In-memory [`LedgerStore`] backed by a single `RwLock`.
//!
//! The whole state sits behind one lock, which is what makes batch
//! application genuinely atomic: preconditions are checked and ops
//! applied without the lock ever being released in between. Version
//! bookkeeping lives here, not in callers — every account touched by a
//! batch gets its version bumped exactly once per apply.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::trace;

use ember_core::error::StoreError;
use ember_core::traits::{BatchOp, LedgerStore, WriteBatch};
use ember_core::types::{Account, AccountKey, Attribution, Intent};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountKey, Account>,
    /// owner -> contributor -> edge
    attributions: HashMap<AccountKey, HashMap<AccountKey, Attribution>>,
    /// blocker -> blockees
    blocks: HashMap<AccountKey, HashSet<AccountKey>>,
    intents: BTreeMap<u64, Intent>,
    next_intent_id: u64,
    epochs: BTreeSet<u64>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts currently stored.
    pub fn account_count(&self) -> usize {
        self.inner.read().accounts.len()
    }
}

impl LedgerStore for MemoryStore {
    fn create_account(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut inner = self.inner.write();
        if inner.accounts.contains_key(&account.key) {
            return Err(StoreError::AlreadyExists(account.key.to_string()));
        }
        account.version = 1;
        account.updated_at = Utc::now();
        inner.accounts.insert(account.key.clone(), account.clone());
        Ok(account)
    }

    fn get_account(&self, key: &AccountKey) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.read().accounts.get(key).cloned())
    }

    fn account_keys(&self) -> Result<Vec<AccountKey>, StoreError> {
        Ok(self.inner.read().accounts.keys().cloned().collect())
    }

    fn stale_accounts(&self, target_epoch: u64, limit: usize) -> Result<Vec<Account>, StoreError> {
        let inner = self.inner.read();
        let mut stale: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.last_refresh_epoch < target_epoch)
            .cloned()
            .collect();
        stale.sort_by(|a, b| {
            a.last_refresh_epoch
                .cmp(&b.last_refresh_epoch)
                .then_with(|| a.key.cmp(&b.key))
        });
        stale.truncate(limit);
        Ok(stale)
    }

    fn attributions(&self, owner: &AccountKey) -> Result<Vec<Attribution>, StoreError> {
        Ok(self
            .inner
            .read()
            .attributions
            .get(owner)
            .map(|edges| edges.values().cloned().collect())
            .unwrap_or_default())
    }

    fn owners_with_attributions(&self) -> Result<Vec<AccountKey>, StoreError> {
        Ok(self
            .inner
            .read()
            .attributions
            .iter()
            .filter(|(_, edges)| !edges.is_empty())
            .map(|(owner, _)| owner.clone())
            .collect())
    }

    fn insert_block(&self, blocker: &AccountKey, blockee: &AccountKey) -> Result<(), StoreError> {
        self.inner
            .write()
            .blocks
            .entry(blocker.clone())
            .or_default()
            .insert(blockee.clone());
        Ok(())
    }

    fn remove_block(&self, blocker: &AccountKey, blockee: &AccountKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(set) = inner.blocks.get_mut(blocker) {
            set.remove(blockee);
            if set.is_empty() {
                inner.blocks.remove(blocker);
            }
        }
        Ok(())
    }

    fn blocked_keys(&self, blocker: &AccountKey) -> Result<Vec<AccountKey>, StoreError> {
        Ok(self
            .inner
            .read()
            .blocks
            .get(blocker)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn push_intent(
        &self,
        sender: AccountKey,
        receiver: AccountKey,
        amount: u64,
        epoch: u64,
    ) -> Result<Intent, StoreError> {
        let mut inner = self.inner.write();
        inner.next_intent_id += 1;
        let intent = Intent {
            id: inner.next_intent_id,
            sender,
            receiver,
            amount,
            epoch,
        };
        inner.intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    fn intents(&self, offset: usize, limit: usize) -> Result<Vec<Intent>, StoreError> {
        Ok(self
            .inner
            .read()
            .intents
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete_intents(&self, ids: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        for id in ids {
            inner.intents.remove(id);
        }
        Ok(())
    }

    fn record_epoch(&self, epoch: u64) -> Result<(), StoreError> {
        self.inner.write().epochs.insert(epoch);
        Ok(())
    }

    fn latest_epoch(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.inner.read().epochs.iter().next_back().copied())
    }

    fn epochs(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self.inner.read().epochs.iter().copied().collect())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        for (key, expected) in batch.preconditions() {
            let current = inner.accounts.get(key).map(|a| a.version).unwrap_or(0);
            if current != *expected {
                trace!(account = %key, expected, current, "version precondition failed");
                return Err(StoreError::Conflict(key.to_string()));
            }
        }

        // Base versions of every account the batch touches, captured
        // before any op lands so multi-op batches bump exactly once.
        let mut bases: HashMap<AccountKey, u64> = HashMap::new();
        for op in batch.ops() {
            let key = match op {
                BatchOp::PutAccount(account) => &account.key,
                BatchOp::PutAttribution { owner, .. } => owner,
                BatchOp::DeleteAttribution { owner, .. } => owner,
            };
            if !bases.contains_key(key) {
                let base = inner.accounts.get(key).map(|a| a.version).unwrap_or(0);
                bases.insert(key.clone(), base);
            }
        }

        for op in batch.ops() {
            match op {
                BatchOp::PutAccount(account) => {
                    inner.accounts.insert(account.key.clone(), account.clone());
                }
                BatchOp::PutAttribution { owner, entry } => {
                    inner
                        .attributions
                        .entry(owner.clone())
                        .or_default()
                        .insert(entry.contributor.clone(), entry.clone());
                }
                BatchOp::DeleteAttribution { owner, contributor } => {
                    if let Some(edges) = inner.attributions.get_mut(owner) {
                        edges.remove(contributor);
                        if edges.is_empty() {
                            inner.attributions.remove(owner);
                        }
                    }
                }
            }
        }

        let now = Utc::now();
        for (key, base) in bases {
            if let Some(account) = inner.accounts.get_mut(&key) {
                account.version = base + 1;
                account.updated_at = now;
            }
        }
        Ok(())
    }
}
