//! Protocol constants. All rates are integer basis points over [`BPS_PRECISION`];
//! there are no fractional points anywhere in the protocol.

/// Fixed-point denominator for all rates (1 bps = 0.01%).
pub const BPS_PRECISION: u64 = 10_000;

/// Default per-epoch decay applied to attributed holdings: 10%.
pub const DEFAULT_DECAY_RATE_BPS: u64 = 1_000;

/// Default protocol tax routed to the reserved account on every assign: 1%.
pub const DEFAULT_TAX_BPS: u64 = 100;

/// Smallest amount that is ever forwarded to a receiver. Proportional
/// shares that floor below this are withdrawn from the sender but not
/// forwarded (one-sided rounding loss).
pub const MIN_POINT_TRANSFER: u64 = 1;

/// Own-balance ceiling every account is topped up to once per epoch.
pub const DEFAULT_MAX_OWN_POINTS: u64 = 1_000;

/// Key of the reserved protocol-tax sink. It can never be a sender and
/// can never be blocked.
pub const RESERVED_ACCOUNT_KEY: &str = "ember";

/// Default number of accounts refreshed per epoch-tick batch.
pub const DEFAULT_EPOCH_BATCH_SIZE: usize = 256;

/// Default number of attribution edges kept per account before the
/// long tail is collapsed into the others bucket.
pub const DEFAULT_KEEP_TOP_EDGES: usize = 32;

/// Default maximum number of intents pulled per processing pass.
pub const DEFAULT_INTENT_BATCH_MAX: usize = 20;

/// Default epoch length in seconds, consumed by the out-of-process
/// scheduler; the engine itself only sees epoch numbers.
pub const DEFAULT_EPOCH_LENGTH_SECS: u64 = 3_600;
