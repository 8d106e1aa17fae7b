//! Proportional transfer math and the tax-splitting assignment path.
//!
//! A debit spends the three buckets in proportion to their share of the
//! sender's total. The own/others shares round up (the sender prefers
//! spending points that replenish or are already anonymous), per-edge
//! withdrawals round up while the forwarded amounts round down, so
//! rounding losses always fall on the sender, never mint points.

use tracing::{debug, warn};

use ember_core::error::TransferError;
use ember_core::traits::{BatchOp, LedgerStore, WriteBatch};
use ember_core::types::{tally, Account, AccountKey, Attribution, QueuedBundle};

use crate::ledger::Ledger;

/// `value * num / den`, rounded down. Zero when `den` is zero.
pub(crate) fn mul_div_floor(value: u64, num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    ((value as u128 * num as u128) / den as u128) as u64
}

/// `value * num / den`, rounded up. Zero when `den` is zero.
pub(crate) fn mul_div_ceil(value: u64, num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    ((value as u128 * num as u128).div_ceil(den as u128)) as u64
}

/// What a debit did to the sender, plus the amounts to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DebitOutcome {
    /// Deducted from `own_points`.
    pub own_spent: u64,
    /// Deducted from `others_points`.
    pub others_spent: u64,
    /// New state per touched edge: `Some(amount)` rewrites the edge at
    /// the debit epoch, `None` deletes it.
    pub edge_changes: Vec<(AccountKey, Option<u64>)>,
    /// Attribution-tagged amounts the receiver is credited with. The
    /// final entry is always the sender's own contribution.
    pub forwarded: Vec<Attribution>,
}

/// Spend `amount` from `sender`'s buckets proportionally. Pure; the
/// caller turns the outcome into a write batch. Returns `None` when the
/// sender cannot cover `amount`.
pub(crate) fn debit(
    sender: &Account,
    edges: &[Attribution],
    amount: u64,
    epoch: u64,
    min_transfer: u64,
) -> Option<DebitOutcome> {
    let assigned = tally(edges);
    let grand = sender.total_funds(assigned);
    if grand < amount || amount == 0 {
        return None;
    }

    let own_share = mul_div_ceil(amount, sender.own_points, grand);
    // The ceilings of the own and others shares can overshoot `amount`
    // by one between them; clamp so the three shares sum exactly.
    let others_share = mul_div_ceil(amount, sender.others_points, grand).min(amount - own_share);
    let from_assigned = amount - own_share - others_share;

    let mut sorted: Vec<&Attribution> = edges.iter().collect();
    sorted.sort_by(|a, b| a.contributor.cmp(&b.contributor));

    let mut edge_changes = Vec::with_capacity(sorted.len());
    let mut forwarded = Vec::new();
    for edge in sorted {
        let withdraw = mul_div_ceil(edge.amount, from_assigned, assigned);
        let send = mul_div_floor(edge.amount, from_assigned, assigned);

        if withdraw == 0 && send == 0 {
            // Untouched amount, but the edge is still restamped.
            edge_changes.push((edge.contributor.clone(), Some(edge.amount)));
            continue;
        }

        let after = edge.amount.saturating_sub(withdraw);
        edge_changes.push((
            edge.contributor.clone(),
            if after > 0 { Some(after) } else { None },
        ));

        // The sender still loses the withdrawal when the forwarded part
        // rounds below the minimum.
        if send >= min_transfer {
            forwarded.push(Attribution {
                contributor: edge.contributor.clone(),
                amount: send,
                epoch,
            });
        }
    }

    forwarded.push(Attribution {
        contributor: sender.key.clone(),
        amount: own_share + others_share,
        epoch,
    });

    Some(DebitOutcome {
        own_spent: own_share,
        others_spent: others_share,
        edge_changes,
        forwarded,
    })
}

/// Merge forwarded amounts into a receiver's edge set. Entries
/// attributed to the receiver themselves or below the minimum are
/// dropped. Returns the rewritten edges, restamped at `epoch`.
pub(crate) fn merge_credits(
    receiver: &AccountKey,
    existing: &[Attribution],
    incoming: &[Attribution],
    epoch: u64,
    min_transfer: u64,
) -> Vec<Attribution> {
    let mut merged: Vec<Attribution> = Vec::new();
    for entry in incoming {
        if entry.contributor == *receiver || entry.amount < min_transfer {
            continue;
        }
        if let Some(touched) = merged
            .iter_mut()
            .find(|e| e.contributor == entry.contributor)
        {
            touched.amount += entry.amount;
            continue;
        }
        let base = existing
            .iter()
            .find(|e| e.contributor == entry.contributor)
            .map(|e| e.amount)
            .unwrap_or(0);
        merged.push(Attribution {
            contributor: entry.contributor.clone(),
            amount: base + entry.amount,
            epoch,
        });
    }
    merged
}

/// Mutable view of the sender while an assignment stages its legs.
///
/// The tax leg must see the sender exactly as the receiver leg left
/// them, without a store round-trip in between, so both legs debit this
/// draft and the final sender state is written once.
struct SenderDraft {
    account: Account,
    contributors: Vec<AccountKey>,
    edges: Vec<Attribution>,
}

impl SenderDraft {
    fn new(account: Account, edges: Vec<Attribution>) -> Self {
        let contributors = edges.iter().map(|e| e.contributor.clone()).collect();
        Self {
            account,
            contributors,
            edges,
        }
    }

    fn absorb(&mut self, outcome: &DebitOutcome, epoch: u64) {
        self.account.own_points -= outcome.own_spent;
        self.account.others_points -= outcome.others_spent;
        // edge_changes covers every edge, so the survivors are exactly
        // the Some entries, restamped.
        self.edges = outcome
            .edge_changes
            .iter()
            .filter_map(|(contributor, change)| {
                (*change).map(|amount| Attribution {
                    contributor: contributor.clone(),
                    amount,
                    epoch,
                })
            })
            .collect();
    }

    /// Write the final sender state: the account, a put for every
    /// surviving edge, a delete for every edge the debits consumed.
    fn stage(self, batch: &mut WriteBatch) {
        let owner = self.account.key.clone();
        batch.push(BatchOp::PutAccount(self.account));
        for contributor in &self.contributors {
            match self.edges.iter().find(|e| e.contributor == *contributor) {
                Some(entry) => batch.push(BatchOp::PutAttribution {
                    owner: owner.clone(),
                    entry: entry.clone(),
                }),
                None => batch.push(BatchOp::DeleteAttribution {
                    owner: owner.clone(),
                    contributor: contributor.clone(),
                }),
            };
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Assign `amount` from `sender` to `receiver`, splitting off the
    /// protocol tax to the reserved account.
    ///
    /// The receiver's cut rounds up, so small amounts can carry no tax
    /// at all. Both legs land in one atomic write batch, so a write
    /// conflict rolls the whole assignment back and a retry cannot
    /// double-apply. A terminal tax failure still commits the receiver
    /// leg and reports the error.
    pub fn assign(
        &self,
        sender: &AccountKey,
        receiver: &AccountKey,
        amount: u64,
        epoch: u64,
    ) -> Result<(), TransferError> {
        if *sender == self.config.reserved_key {
            return Err(TransferError::SenderDoesNotExist);
        }
        let sender_account = self
            .store
            .get_account(sender)?
            .ok_or(TransferError::SenderDoesNotExist)?;
        let sender_edges = self.store.attributions(sender)?;
        let have = sender_account.total_funds(tally(&sender_edges));
        if have < amount {
            return Err(TransferError::NotEnoughPoints { have, need: amount });
        }

        let bps = ember_core::constants::BPS_PRECISION;
        // A payment addressed to the sink is all tax already; splitting
        // it would race both legs on the same receiver edges.
        let (to_receiver, to_tax) = if *receiver == self.config.reserved_key {
            (amount, 0)
        } else {
            let cut = mul_div_ceil(amount, bps - self.config.tax_bps, bps);
            (cut, amount - cut)
        };

        let mut draft = SenderDraft::new(sender_account, sender_edges);
        let mut batch = WriteBatch::new();
        batch.expect_version(draft.account.key.clone(), draft.account.version);
        let mut held = Vec::new();

        self.stage_leg(&mut batch, &mut draft, receiver, to_receiver, epoch, &mut held)?;
        let tax_result = if to_tax > 0 {
            let reserved = self.config.reserved_key.clone();
            self.stage_leg(&mut batch, &mut draft, &reserved, to_tax, epoch, &mut held)
        } else {
            Ok(())
        };
        match tax_result {
            Ok(()) => {}
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => {
                // Terminal tax failure: the receiver leg still commits.
                warn!(sender = %sender, amount = to_tax, error = %err, "tax leg failed");
                self.commit(batch, draft, held)?;
                return Err(err);
            }
        }
        self.commit(batch, draft, held)?;
        debug!(sender = %sender, receiver = %receiver, amount, epoch, "assignment applied");
        Ok(())
    }

    /// Validate and debit one leg against the draft, staging the
    /// receiver-side writes. Nothing is staged when the leg fails
    /// terminally.
    fn stage_leg(
        &self,
        batch: &mut WriteBatch,
        draft: &mut SenderDraft,
        receiver: &AccountKey,
        amount: u64,
        epoch: u64,
        held: &mut Vec<(AccountKey, QueuedBundle)>,
    ) -> Result<(), TransferError> {
        if draft.account.key == *receiver {
            return Err(TransferError::CantSendToSelf);
        }
        if amount == 0 {
            return Err(TransferError::PointsShouldBePositive);
        }
        let receiver_account = self
            .store
            .get_account(receiver)?
            .ok_or(TransferError::ReceiverDoesNotExist)?;
        let have = draft.account.total_funds(tally(&draft.edges));
        if have < amount {
            return Err(TransferError::NotEnoughPoints { have, need: amount });
        }
        let outcome = debit(&draft.account, &draft.edges, amount, epoch, self.config.min_transfer)
            .ok_or(TransferError::DeductFailed)?;

        let blocked = self.store.blocked_keys(receiver)?;
        if receiver_account.opts_in && !blocked.contains(&draft.account.key) {
            batch.expect_version(receiver_account.key.clone(), receiver_account.version);
            let receiver_edges = self.store.attributions(receiver)?;
            let puts = merge_credits(
                receiver,
                &receiver_edges,
                &outcome.forwarded,
                epoch,
                self.config.min_transfer,
            );
            for entry in puts {
                batch.push(BatchOp::PutAttribution {
                    owner: receiver.clone(),
                    entry,
                });
            }
        } else {
            held.push((
                receiver.clone(),
                QueuedBundle {
                    sender: draft.account.key.clone(),
                    epoch,
                    entries: outcome.forwarded.clone(),
                },
            ));
        }
        draft.absorb(&outcome, epoch);
        Ok(())
    }

    /// Apply the staged batch, then release any bundles to the holding
    /// queue. Bundles only become visible once the debit is durable.
    fn commit(
        &self,
        mut batch: WriteBatch,
        draft: SenderDraft,
        held: Vec<(AccountKey, QueuedBundle)>,
    ) -> Result<(), TransferError> {
        draft.stage(&mut batch);
        self.store.apply(batch)?;
        for (receiver, bundle) in held {
            self.queue.push(receiver, bundle);
        }
        Ok(())
    }
}
