use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Currency, Money, Rate};
use crate::installment::Installment;
use crate::transaction::Transaction;
use crate::types::{ChargeId, ComponentType, RelationKind, TransactionId, TxIdx};

/// fee or penalty levied against the loan, amortized across installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: ChargeId,
    pub amount: Money,
    pub component: ComponentType,
    pub due_date: NaiveDate,
    pub submitted_on: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
}

impl Charge {
    /// a charge submitted after its due date applies retroactively
    pub fn is_backdated(&self) -> bool {
        self.due_date < self.submitted_on
    }

    pub fn effective_date(&self) -> NaiveDate {
        if self.is_backdated() {
            self.due_date
        } else {
            self.submitted_on
        }
    }
}

/// interest-rate change taking effect from a given date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRateChange {
    pub applicable_from: NaiveDate,
    pub rate: Rate,
    pub submitted_on: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
}

/// typed edge between two transactions, resolved by arena lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub from: TxIdx,
    pub kind: RelationKind,
    pub to: TxIdx,
}

/// fully-loaded, in-memory loan aggregate
///
/// installments and transactions live in owned arenas; transactions refer to
/// each other through `relations` triples rather than object references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub currency: Currency,
    pub disbursement_date: NaiveDate,
    pub installments: Vec<Installment>,
    pub transactions: Vec<Transaction>,
    pub relations: Vec<Relation>,
    pub charges: Vec<Charge>,
    pub rate_changes: Vec<InterestRateChange>,
    /// amounts received beyond total outstanding, pending redistribution
    pub overpayment_pool: Money,
    pub charged_off_on: Option<NaiveDate>,
}

impl Loan {
    pub fn new(currency: Currency, disbursement_date: NaiveDate) -> Self {
        Loan {
            currency,
            disbursement_date,
            installments: Vec::new(),
            transactions: Vec::new(),
            relations: Vec::new(),
            charges: Vec::new(),
            rate_changes: Vec::new(),
            overpayment_pool: Money::zero(currency),
            charged_off_on: None,
        }
    }

    pub fn add_installment(&mut self, installment: Installment) {
        self.installments.push(installment);
        self.installments.sort_by_key(|i| i.number);
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> TxIdx {
        self.transactions.push(transaction);
        TxIdx(self.transactions.len() - 1)
    }

    pub fn transaction(&self, idx: TxIdx) -> &Transaction {
        &self.transactions[idx.0]
    }

    pub fn transaction_mut(&mut self, idx: TxIdx) -> &mut Transaction {
        &mut self.transactions[idx.0]
    }

    pub fn find_by_id(&self, id: TransactionId) -> Option<TxIdx> {
        self.transactions
            .iter()
            .position(|t| t.id == Some(id))
            .map(TxIdx)
    }

    pub fn relate(&mut self, from: TxIdx, kind: RelationKind, to: TxIdx) {
        self.relations.push(Relation { from, kind, to });
    }

    /// first relation of the given kind leading out of `from`
    pub fn relation_target(&self, from: TxIdx, kind: RelationKind) -> Option<TxIdx> {
        self.relations
            .iter()
            .find(|r| r.from == from && r.kind == kind)
            .map(|r| r.to)
    }

    pub fn relations_from(&self, from: TxIdx) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.from == from)
    }

    pub fn installment_by_number(&self, number: u32) -> Option<&Installment> {
        self.installments.iter().find(|i| i.number == number)
    }

    pub fn installment_by_number_mut(&mut self, number: u32) -> Option<&mut Installment> {
        self.installments.iter_mut().find(|i| i.number == number)
    }

    pub fn next_installment_number(&self) -> u32 {
        self.installments.iter().map(|i| i.number).max().unwrap_or(0) + 1
    }

    /// last due date of the regular (non-synthesized) schedule
    pub fn last_scheduled_due_date(&self) -> Option<NaiveDate> {
        self.installments
            .iter()
            .filter(|i| !i.additional)
            .map(|i| i.due_date)
            .max()
    }

    pub fn total_outstanding(&self) -> Money {
        self.installments
            .iter()
            .fold(Money::zero(self.currency), |acc, i| {
                acc + i.total_outstanding()
            })
    }

    /// drop installments that are regenerated each pass
    pub fn remove_generated_installments(&mut self) {
        self.installments.retain(|i| !i.additional && !i.re_aged);
    }

    /// transactions carrying a recorded overpayment, in chronological order
    pub fn overpaid_transactions(&self) -> Vec<TxIdx> {
        let mut idxs: Vec<TxIdx> = self
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.reversed && t.overpayment.is_positive())
            .map(|(i, _)| TxIdx(i))
            .collect();
        idxs.sort_by(|a, b| {
            self.transactions[a.0].canonical_cmp(&self.transactions[b.0])
        });
        idxs
    }
}
