use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::events::{Event, EventStore};
use crate::loan::Loan;
use crate::transaction::Transaction;
use crate::types::{RelationKind, TransactionId, TxIdx};

/// bidirectional diff between stored transaction identities and the
/// transactions that replaced them during one reprocessing pass
///
/// the caller uses it to redirect relations and to know which stored
/// transactions must be reversed and re-saved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    old_to_new: BTreeMap<TransactionId, TxIdx>,
    new_to_old: BTreeMap<TxIdx, TransactionId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, old: TransactionId, new: TxIdx) {
        self.old_to_new.insert(old, new);
        self.new_to_old.insert(new, old);
    }

    /// where did this stored identity end up, if it was replaced
    pub fn redirect(&self, old: TransactionId) -> Option<TxIdx> {
        self.old_to_new.get(&old).copied()
    }

    pub fn original_of(&self, new: TxIdx) -> Option<TransactionId> {
        self.new_to_old.get(&new).copied()
    }

    /// drop a mapping once the old identity turned out to be reusable
    pub fn remove_old(&mut self, old: TransactionId) {
        if let Some(new) = self.old_to_new.remove(&old) {
            self.new_to_old.remove(&new);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.old_to_new.is_empty()
    }

    pub fn len(&self) -> usize {
        self.old_to_new.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransactionId, &TxIdx)> {
        self.old_to_new.iter()
    }
}

/// decides whether a recomputed transaction reuses its prior identity or is
/// reversed and replaced, keeping the changeset minimal
pub struct ReplayReconciler;

impl ReplayReconciler {
    /// reconcile a recomputed transaction against the one it replays
    ///
    /// returns the index of the transaction that represents the ledger event
    /// going forward.
    pub fn reconcile(
        loan: &mut Loan,
        old: Option<TxIdx>,
        proposed: Transaction,
        processed_dates: &[NaiveDate],
        changeset: &mut ChangeSet,
        events: &mut EventStore,
    ) -> TxIdx {
        let old_idx = match old {
            Some(idx) => idx,
            None => {
                // genuinely new transaction, nothing to reconcile against
                events.emit(Event::TransactionRegistered {
                    date: proposed.date,
                    kind: proposed.kind,
                });
                return loan.add_transaction(proposed);
            }
        };

        if Self::identity_reusable(loan, old_idx, &proposed, processed_dates) {
            let old_id = loan.transaction(old_idx).id;
            let old_tx = loan.transaction_mut(old_idx);
            old_tx.mappings = proposed.mappings;
            old_tx.overpayment = proposed.overpayment;
            if let Some(id) = old_id {
                changeset.remove_old(id);
                events.emit(Event::TransactionKept {
                    id,
                    date: proposed.date,
                });
            }
            return old_idx;
        }

        let old_id = loan.transaction(old_idx).id;
        let old_kind = loan.transaction(old_idx).kind;
        let date = proposed.date;
        let new_idx = loan.add_transaction(proposed);

        loan.transaction_mut(old_idx).reversed = true;
        loan.relate(new_idx, RelationKind::Replayed, old_idx);

        // carry the old transaction's other relations onto its replacement
        let carried: Vec<_> = loan
            .relations_from(old_idx)
            .filter(|r| r.kind != RelationKind::Replayed)
            .map(|r| (r.kind, r.to))
            .collect();
        for (kind, to) in carried {
            loan.relate(new_idx, kind, to);
        }

        if let Some(id) = old_id {
            changeset.record(id, new_idx);
            events.emit(Event::TransactionReplaced {
                old_id: id,
                date,
                kind: old_kind,
            });
        }
        new_idx
    }

    fn identity_reusable(
        loan: &Loan,
        old_idx: TxIdx,
        proposed: &Transaction,
        processed_dates: &[NaiveDate],
    ) -> bool {
        let old_tx = loan.transaction(old_idx);

        // another transaction already reprocessed onto this date makes the
        // identity ambiguous
        if processed_dates.contains(&proposed.date) {
            return false;
        }
        if old_tx.kind.reconciliation_exempt() {
            return false;
        }
        // amounts already sit at currency precision, so equality is exact
        old_tx.amount == proposed.amount
            && old_tx.allocation_summary() == proposed.allocation_summary()
    }
}
