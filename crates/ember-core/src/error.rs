//! Error types for transfers, storage, and block-list maintenance.

use thiserror::Error;

/// Failure modes of point transfers and assignments.
///
/// Every variant except [`TransferError::Unknown`] is terminal: retrying
/// the same request cannot succeed. `Unknown` covers transient faults
/// (store write conflicts, backend hiccups) and is the only variant the
/// intent processor retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("cannot send points to self")]
    CantSendToSelf,
    #[error("sender does not exist")]
    SenderDoesNotExist,
    #[error("receiver does not exist")]
    ReceiverDoesNotExist,
    #[error("not enough points: have {have}, need {need}")]
    NotEnoughPoints { have: u64, need: u64 },
    #[error("points should be positive")]
    PointsShouldBePositive,
    #[error("failed to deduct points from sender")]
    DeductFailed,
    #[error("transfer failed: {0}")]
    Unknown(String),
}

impl TransferError {
    /// Whether a retry of the identical request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        Self::Unknown(err.to_string())
    }
}

/// Failure modes of the backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A version precondition did not hold; the batch was not applied.
    #[error("write conflict on account {0}")]
    Conflict(String),
    /// Attempted to create a record that already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    /// Backend-level failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure modes of block-list maintenance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("the reserved account cannot be blocked")]
    ReservedAccount,
    #[error("account does not exist: {0}")]
    AccountDoesNotExist(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
