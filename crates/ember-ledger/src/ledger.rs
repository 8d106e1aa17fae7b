//! The [`Ledger`] facade: account lifecycle, balances, block lists, and
//! epoch bookkeeping. Transfer math lives in `transfer`, epoch refresh in
//! `epoch`, the holding queue in `queue`, intent batches in `intents`.

use std::sync::Arc;

use tracing::{debug, info};

use ember_core::config::EngineConfig;
use ember_core::error::{BlockError, StoreError};
use ember_core::traits::LedgerStore;
use ember_core::types::{tally, Account, AccountKey, Attribution, TallySummary};

use crate::queue::HoldingQueue;

/// Handle to a points economy backed by a [`LedgerStore`].
///
/// Cheap to clone; clones share the store and the holding queue. The
/// intent processor relies on this to run transfers from blocking tasks.
pub struct Ledger<S> {
    pub(crate) store: Arc<S>,
    pub(crate) config: EngineConfig,
    pub(crate) queue: HoldingQueue,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Open a ledger over `store`, creating the reserved tax-sink
    /// account if it does not exist yet.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self, StoreError> {
        let reserved = Account::new(config.reserved_key.clone(), 0, true, 0);
        match store.create_account(reserved) {
            Ok(_) => info!(key = %config.reserved_key, "created reserved account"),
            Err(StoreError::AlreadyExists(_)) => {}
            Err(err) => return Err(err),
        }
        Ok(Self {
            store,
            config,
            queue: HoldingQueue::new(),
        })
    }

    /// Engine configuration this ledger runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an account with a full own-points balance, current as of
    /// `epoch`.
    pub fn create_account(
        &self,
        key: AccountKey,
        epoch: u64,
        opts_in: bool,
    ) -> Result<Account, StoreError> {
        let account = Account::new(key, epoch, opts_in, self.config.max_own_points);
        let created = self.store.create_account(account)?;
        debug!(key = %created.key, epoch, opts_in, "account created");
        Ok(created)
    }

    /// Fetch an account by key.
    pub fn account(&self, key: &AccountKey) -> Result<Option<Account>, StoreError> {
        self.store.get_account(key)
    }

    /// Keys of all accounts, or only those holding attribution edges.
    pub fn accounts(&self, only_with_holdings: bool) -> Result<Vec<AccountKey>, StoreError> {
        if only_with_holdings {
            self.store.owners_with_attributions()
        } else {
            self.store.account_keys()
        }
    }

    /// All attribution edges of `owner`.
    pub fn attributions(&self, owner: &AccountKey) -> Result<Vec<Attribution>, StoreError> {
        self.store.attributions(owner)
    }

    /// Balance summary across all three buckets, or `None` if the
    /// account does not exist.
    pub fn tally(&self, key: &AccountKey) -> Result<Option<TallySummary>, StoreError> {
        let Some(account) = self.store.get_account(key)? else {
            return Ok(None);
        };
        let assigned = tally(&self.store.attributions(key)?);
        Ok(Some(TallySummary {
            own_points: account.own_points,
            others_points: account.others_points,
            assigned_points: assigned,
        }))
    }

    /// Record that `blocker` refuses direct credits from `blockee`;
    /// transfers from a blocked sender land in the holding queue instead.
    pub fn block(&self, blocker: &AccountKey, blockee: &AccountKey) -> Result<(), BlockError> {
        if *blockee == self.config.reserved_key {
            return Err(BlockError::ReservedAccount);
        }
        self.require_account(blocker)?;
        self.require_account(blockee)?;
        self.store.insert_block(blocker, blockee)?;
        debug!(blocker = %blocker, blockee = %blockee, "block added");
        Ok(())
    }

    /// Undo a [`block`](Self::block). Idempotent.
    pub fn unblock(&self, blocker: &AccountKey, blockee: &AccountKey) -> Result<(), BlockError> {
        self.require_account(blocker)?;
        self.require_account(blockee)?;
        self.store.remove_block(blocker, blockee)?;
        Ok(())
    }

    /// Keys `blocker` currently blocks.
    pub fn blocked(&self, blocker: &AccountKey) -> Result<Vec<AccountKey>, StoreError> {
        self.store.blocked_keys(blocker)
    }

    /// Latest ticked epoch, or 0 if none has been ticked yet.
    pub fn current_epoch(&self) -> Result<u64, StoreError> {
        Ok(self.store.latest_epoch()?.unwrap_or(0))
    }

    /// All ticked epochs, ascending.
    pub fn epoch_records(&self) -> Result<Vec<u64>, StoreError> {
        self.store.epochs()
    }

    /// Tick the epoch after the latest recorded one and return it.
    pub fn advance_epoch(&self) -> Result<u64, StoreError> {
        let next = self.current_epoch()? + 1;
        self.epoch_tick(next)?;
        Ok(next)
    }

    fn require_account(&self, key: &AccountKey) -> Result<Account, BlockError> {
        self.store
            .get_account(key)?
            .ok_or_else(|| BlockError::AccountDoesNotExist(key.to_string()))
    }
}
