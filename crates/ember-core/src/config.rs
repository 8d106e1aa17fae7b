//! Engine configuration.
//!
//! All knobs default to the protocol constants and can be overridden from
//! a TOML file or environment variables prefixed with `EMBER_`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    BPS_PRECISION, DEFAULT_DECAY_RATE_BPS, DEFAULT_EPOCH_BATCH_SIZE, DEFAULT_EPOCH_LENGTH_SECS,
    DEFAULT_INTENT_BATCH_MAX, DEFAULT_KEEP_TOP_EDGES, DEFAULT_MAX_OWN_POINTS, DEFAULT_TAX_BPS,
    MIN_POINT_TRANSFER, RESERVED_ACCOUNT_KEY,
};
use crate::types::AccountKey;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to load configuration")]
    Load(#[from] config::ConfigError),
}

/// Tunable parameters of the points engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-epoch decay applied to attributed holdings, in basis points.
    pub decay_rate_bps: u64,
    /// Protocol tax routed to the reserved account on assignment, in
    /// basis points.
    pub tax_bps: u64,
    /// Own-balance ceiling accounts are topped up to each epoch.
    pub max_own_points: u64,
    /// Smallest forwarded amount; smaller shares are dropped.
    pub min_transfer: u64,
    /// Key of the protocol-tax sink account.
    pub reserved_key: AccountKey,
    /// Accounts refreshed per epoch-tick batch.
    pub epoch_batch_size: usize,
    /// Attribution edges kept per account before the tail collapses
    /// into the others bucket.
    pub keep_top_edges: usize,
    /// Maximum intents pulled per processing pass.
    pub intent_batch_max: usize,
    /// Epochs a queued bundle survives before pruning. `None` derives
    /// the horizon from the decay rate (the point where decay hits 100%).
    pub queue_horizon_epochs: Option<u64>,
    /// Epoch length hint for schedulers; the engine only sees epoch numbers.
    pub epoch_length_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_rate_bps: DEFAULT_DECAY_RATE_BPS,
            tax_bps: DEFAULT_TAX_BPS,
            max_own_points: DEFAULT_MAX_OWN_POINTS,
            min_transfer: MIN_POINT_TRANSFER,
            reserved_key: AccountKey::from(RESERVED_ACCOUNT_KEY),
            epoch_batch_size: DEFAULT_EPOCH_BATCH_SIZE,
            keep_top_edges: DEFAULT_KEEP_TOP_EDGES,
            intent_batch_max: DEFAULT_INTENT_BATCH_MAX,
            queue_horizon_epochs: None,
            epoch_length_secs: DEFAULT_EPOCH_LENGTH_SECS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, then apply `EMBER_`-prefixed
    /// environment overrides, then validate.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let cfg: Self = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("EMBER"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Queue retention horizon in epochs. Defaults to the number of
    /// epochs after which claim-time decay reaches 100%.
    pub fn horizon_epochs(&self) -> u64 {
        self.queue_horizon_epochs
            .unwrap_or(BPS_PRECISION / self.decay_rate_bps)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decay_rate_bps == 0 || self.decay_rate_bps > BPS_PRECISION {
            return Err(ConfigError::Invalid(format!(
                "decay_rate_bps must be in 1..={BPS_PRECISION}, got {}",
                self.decay_rate_bps
            )));
        }
        if self.tax_bps >= BPS_PRECISION {
            return Err(ConfigError::Invalid(format!(
                "tax_bps must be below {BPS_PRECISION}, got {}",
                self.tax_bps
            )));
        }
        if self.max_own_points == 0 {
            return Err(ConfigError::Invalid("max_own_points must be positive".into()));
        }
        if self.min_transfer == 0 {
            return Err(ConfigError::Invalid("min_transfer must be positive".into()));
        }
        if self.reserved_key.as_str().is_empty() {
            return Err(ConfigError::Invalid("reserved_key must be nonempty".into()));
        }
        if self.epoch_batch_size == 0 {
            return Err(ConfigError::Invalid("epoch_batch_size must be positive".into()));
        }
        if self.intent_batch_max == 0 {
            return Err(ConfigError::Invalid("intent_batch_max must be positive".into()));
        }
        Ok(())
    }
}
