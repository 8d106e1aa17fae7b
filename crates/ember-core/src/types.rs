//! Core ledger records: accounts, attribution edges, queued bundles, intents.
//!
//! All amounts are whole points (`u64`); epochs are `u64`. Proportional
//! math uses `u128` intermediates at the call sites, so `u64` fields can
//! hold the full protocol range without overflow concerns.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity key of an account.
///
/// A thin string newtype so account keys cannot be confused with other
/// strings at API boundaries. Serializes transparently as a string.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct AccountKey(String);

impl AccountKey {
    /// Create a key from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for AccountKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for AccountKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One participant in the points economy.
///
/// `own_points` replenishes to the configured maximum once per epoch;
/// `others_points` is the unattributed bucket produced by collapsing
/// long-tail attribution edges, and decays like any attributed holding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Identity key.
    pub key: AccountKey,
    /// Self-replenishing balance. Never negative.
    pub own_points: u64,
    /// Collapsed remainder of long-tail contributors. Never negative.
    pub others_points: u64,
    /// Whether incoming credits land directly or in the holding queue.
    pub opts_in: bool,
    /// Last epoch this account was topped up / decayed. Guards against
    /// refreshing the same account twice in one epoch.
    pub last_refresh_epoch: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp, maintained by the store.
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, maintained by the store. Bumped
    /// on every write that touches the account or its attribution edges.
    pub version: u64,
}

impl Account {
    /// Create a fresh account record. A new account is considered
    /// current as of its sign-up epoch.
    pub fn new(key: AccountKey, epoch: u64, opts_in: bool, own_points: u64) -> Self {
        let now = Utc::now();
        Self {
            key,
            own_points,
            others_points: 0,
            opts_in,
            last_refresh_epoch: epoch,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Total spendable funds given the sum of this account's attribution
    /// edges. Saturating: the protocol never mints anywhere near `u64::MAX`.
    pub fn total_funds(&self, assigned: u64) -> u64 {
        self.own_points
            .saturating_add(self.others_points)
            .saturating_add(assigned)
    }
}

/// One attribution edge: points credited to an owner, tagged with the
/// contributor who sent them. The owner is implicit in the collection the
/// edge is stored under; owner == contributor never occurs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attribution {
    /// Account the points are attributed to.
    pub contributor: AccountKey,
    /// Amount held. Strictly positive; zero-amount edges are deleted.
    pub amount: u64,
    /// Epoch this edge was last touched.
    pub epoch: u64,
}

/// Sum the amounts of a set of attribution edges.
pub fn tally(entries: &[Attribution]) -> u64 {
    entries.iter().fold(0u64, |acc, e| acc.saturating_add(e.amount))
}

/// A not-yet-claimed credit bundle in a receiver's holding queue.
///
/// Snapshot of what would have been merged into the receiver's ledger
/// had they accepted the transfer directly. Ordered by arrival; one
/// receiver may hold several bundles from the same sender at different
/// epochs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QueuedBundle {
    /// The account that sent the transfer.
    pub sender: AccountKey,
    /// Epoch the bundle was produced; claim-time decay is measured from here.
    pub epoch: u64,
    /// The forwarded amounts, attribution-edge shaped.
    pub entries: Vec<Attribution>,
}

/// A durably queued transfer request awaiting batch application.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Intent {
    /// Store-assigned monotonically increasing sequence id.
    pub id: u64,
    /// Sending account.
    pub sender: AccountKey,
    /// Receiving account.
    pub receiver: AccountKey,
    /// Amount requested.
    pub amount: u64,
    /// Epoch at registration. Processing applies the intent at the
    /// processing epoch; this is kept for the record.
    pub epoch: u64,
}

/// Summary of an account's holdings across all three buckets.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TallySummary {
    /// Self-replenishing balance.
    pub own_points: u64,
    /// Collapsed unattributed bucket.
    pub others_points: u64,
    /// Sum over all attribution edges.
    pub assigned_points: u64,
}

impl TallySummary {
    /// Grand total across all buckets.
    pub fn total(&self) -> u64 {
        self.own_points
            .saturating_add(self.others_points)
            .saturating_add(self.assigned_points)
    }
}
