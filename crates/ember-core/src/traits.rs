//! Storage abstraction.
//!
//! The engine talks to persistence through [`LedgerStore`] only. Writes
//! that must be all-or-nothing go through a [`WriteBatch`] carrying
//! optimistic version preconditions: the store checks every precondition
//! and applies every op under one lock, so a batch either lands whole or
//! fails with [`StoreError::Conflict`] and changes nothing.

use crate::error::StoreError;
use crate::types::{Account, AccountKey, Attribution, Intent};

/// A single mutation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or replace an account record.
    PutAccount(Account),
    /// Insert or replace one attribution edge of `owner`, keyed by the
    /// entry's contributor.
    PutAttribution { owner: AccountKey, entry: Attribution },
    /// Delete `owner`'s edge from `contributor`, if present.
    DeleteAttribution {
        owner: AccountKey,
        contributor: AccountKey,
    },
}

/// An atomic group of writes with optimistic-concurrency preconditions.
///
/// Callers read account versions, stage writes derived from those reads,
/// and list the versions they read as preconditions. A concurrent writer
/// bumping any listed account between read and apply fails the whole
/// batch.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    preconditions: Vec<(AccountKey, u64)>,
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to still be at `version` when the batch applies.
    /// Accounts that do not exist are at version 0.
    pub fn expect_version(&mut self, key: AccountKey, version: u64) -> &mut Self {
        self.preconditions.push((key, version));
        self
    }

    /// Stage one mutation.
    pub fn push(&mut self, op: BatchOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn preconditions(&self) -> &[(AccountKey, u64)] {
        &self.preconditions
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Persistence interface of the points engine.
///
/// Implementations must be safe to share across threads; the intent
/// processor runs transfers in parallel against one store.
pub trait LedgerStore: Send + Sync {
    /// Insert a new account. Fails with [`StoreError::AlreadyExists`] if
    /// the key is taken.
    fn create_account(&self, account: Account) -> Result<Account, StoreError>;

    /// Fetch an account by key.
    fn get_account(&self, key: &AccountKey) -> Result<Option<Account>, StoreError>;

    /// All account keys, unordered.
    fn account_keys(&self) -> Result<Vec<AccountKey>, StoreError>;

    /// Accounts whose `last_refresh_epoch` is below `target_epoch`,
    /// oldest first (ties broken by key), at most `limit` of them.
    fn stale_accounts(&self, target_epoch: u64, limit: usize) -> Result<Vec<Account>, StoreError>;

    /// All attribution edges of `owner`, unordered.
    fn attributions(&self, owner: &AccountKey) -> Result<Vec<Attribution>, StoreError>;

    /// Keys of every account holding at least one attribution edge.
    fn owners_with_attributions(&self) -> Result<Vec<AccountKey>, StoreError>;

    /// Record that `blocker` refuses transfers from `blockee`.
    /// Idempotent.
    fn insert_block(&self, blocker: &AccountKey, blockee: &AccountKey) -> Result<(), StoreError>;

    /// Remove a block entry. Idempotent.
    fn remove_block(&self, blocker: &AccountKey, blockee: &AccountKey) -> Result<(), StoreError>;

    /// Keys `blocker` currently blocks, unordered.
    fn blocked_keys(&self, blocker: &AccountKey) -> Result<Vec<AccountKey>, StoreError>;

    /// Durably queue a transfer request; the store assigns the next
    /// sequence id (starting at 1).
    fn push_intent(
        &self,
        sender: AccountKey,
        receiver: AccountKey,
        amount: u64,
        epoch: u64,
    ) -> Result<Intent, StoreError>;

    /// Queued intents in id order, skipping `offset`, at most `limit`.
    fn intents(&self, offset: usize, limit: usize) -> Result<Vec<Intent>, StoreError>;

    /// Delete intents by id. Unknown ids are ignored.
    fn delete_intents(&self, ids: &[u64]) -> Result<(), StoreError>;

    /// Record that `epoch` has been ticked. Idempotent.
    fn record_epoch(&self, epoch: u64) -> Result<(), StoreError>;

    /// Highest recorded epoch, if any.
    fn latest_epoch(&self) -> Result<Option<u64>, StoreError>;

    /// All recorded epochs, ascending.
    fn epochs(&self) -> Result<Vec<u64>, StoreError>;

    /// Atomically check every precondition and apply every op. On a
    /// version mismatch nothing is written and the call fails with
    /// [`StoreError::Conflict`] naming the account that moved.
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_builder_accumulates() {
        let alice = AccountKey::from("alice");
        let bob = AccountKey::from("bob");
        let mut batch = WriteBatch::new();
        batch
            .expect_version(alice.clone(), 3)
            .expect_version(bob.clone(), 1)
            .push(BatchOp::DeleteAttribution {
                owner: bob.clone(),
                contributor: alice.clone(),
            });
        assert_eq!(batch.preconditions().len(), 2);
        assert_eq!(batch.ops().len(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn empty_batch_reports_empty() {
        let mut batch = WriteBatch::new();
        batch.expect_version(AccountKey::from("alice"), 1);
        // preconditions alone do not make a batch worth applying
        assert!(batch.is_empty());
    }

    #[test]
    fn store_is_object_safe() {
        fn _takes_dyn(_store: &dyn LedgerStore) {}
    }
}
