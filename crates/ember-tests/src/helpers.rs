//! Shared test helpers for the integration suites.

use std::sync::{Arc, Once};

use ember_core::config::EngineConfig;
use ember_core::types::{tally, AccountKey};
use ember_ledger::Ledger;
use ember_store::MemoryStore;

static INIT: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process. Honors
/// `RUST_LOG`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Fresh in-memory ledger with default configuration.
pub fn new_ledger() -> Ledger<MemoryStore> {
    new_ledger_with(EngineConfig::default())
}

/// Fresh in-memory ledger with the given configuration.
pub fn new_ledger_with(config: EngineConfig) -> Ledger<MemoryStore> {
    init_tracing();
    Ledger::new(Arc::new(MemoryStore::new()), config).unwrap()
}

pub fn key(name: &str) -> AccountKey {
    AccountKey::from(name)
}

/// Create opted-in accounts for every name, current as of `epoch`.
pub fn create_accounts(ledger: &Ledger<MemoryStore>, names: &[&str], epoch: u64) {
    for name in names {
        ledger.create_account(key(name), epoch, true).unwrap();
    }
}

/// Own-points balance of an account.
pub fn own_points(ledger: &Ledger<MemoryStore>, name: &str) -> u64 {
    ledger.account(&key(name)).unwrap().unwrap().own_points
}

/// Sum of an account's attribution edges.
pub fn assigned(ledger: &Ledger<MemoryStore>, name: &str) -> u64 {
    tally(&ledger.attributions(&key(name)).unwrap())
}

/// Amount and epoch of `owner`'s edge from `contributor`, if present.
pub fn edge(ledger: &Ledger<MemoryStore>, owner: &str, contributor: &str) -> Option<(u64, u64)> {
    ledger
        .attributions(&key(owner))
        .unwrap()
        .into_iter()
        .find(|e| e.contributor.as_str() == contributor)
        .map(|e| (e.amount, e.epoch))
}

/// Grand total an account could spend right now.
pub fn total_funds(ledger: &Ledger<MemoryStore>, name: &str) -> u64 {
    ledger.tally(&key(name)).unwrap().unwrap().total()
}

/// Total points in the whole economy, holding queues included.
pub fn economy_total(ledger: &Ledger<MemoryStore>) -> u64 {
    let mut sum = 0u64;
    for account_key in ledger.accounts(false).unwrap() {
        sum += ledger.tally(&account_key).unwrap().unwrap().total();
        for bundle in ledger.queued_bundles(&account_key) {
            sum += tally(&bundle.entries);
        }
    }
    sum
}
