use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// persisted identity of a transaction
pub type TransactionId = Uuid;

/// persisted identity of a charge
pub type ChargeId = Uuid;

/// index of a transaction in the loan's arena; stable for the life of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxIdx(pub usize);

/// monetary component of an installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Principal,
    Interest,
    Fee,
    Penalty,
}

impl ComponentType {
    pub const ALL: [ComponentType; 4] = [
        ComponentType::Principal,
        ComponentType::Interest,
        ComponentType::Fee,
        ComponentType::Penalty,
    ];
}

/// classification of an installment relative to a transaction date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DueType {
    PastDue,
    Due,
    InAdvance,
}

/// how an in-advance amount selects future installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FutureInstallmentAllocationRule {
    /// all future installments, amount split evenly
    Reamortize,
    /// nearest future installment only
    NextInstallment,
    /// furthest future installment only
    LastInstallment,
}

/// sweep strategy over the allocation rule's (component, due type) pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStyle {
    /// per due-type group, sweep all installments before the next group
    Horizontal,
    /// per (component, due type) pair, exhaust matching installments
    Vertical,
}

/// direction of an allocation pass over installment balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationDirection {
    /// increase paid amounts
    Pay,
    /// decrease paid amounts (refunds)
    Unpay,
}

/// typed edge between two transactions of one loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// the source replaces the reversed target
    Replayed,
    /// the source reverses (part of) the target's allocation
    Chargeback,
    /// loosely coupled follow-up
    Related,
}

/// closed set of transaction types the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Disbursement,
    Repayment,
    DownPayment,
    Refund,
    InterestRefund,
    Chargeback,
    WriteOff,
    ChargeOff,
    ReAge,
    ReAmortize,
    /// end-of-period accrual snapshot; sorts after same-date events
    AccrualActivity,
    /// plain accrual postings are journal-side only and skipped here
    Accrual,
    WaiveCharges,
}

impl TransactionType {
    pub fn is_accrual_activity(&self) -> bool {
        matches!(self, TransactionType::AccrualActivity)
    }

    /// repayment-like types allocate through the standard engine
    pub fn is_repayment_like(&self) -> bool {
        matches!(self, TransactionType::Repayment | TransactionType::DownPayment)
    }

    /// types whose prior identity is never reused on replay
    pub fn reconciliation_exempt(&self) -> bool {
        matches!(self, TransactionType::WaiveCharges)
    }

    /// types the allocation engine distributes directly; everything else
    /// reaching it is a fatal dispatch error
    pub fn is_allocatable(&self) -> bool {
        matches!(
            self,
            TransactionType::Repayment
                | TransactionType::DownPayment
                | TransactionType::Refund
                | TransactionType::InterestRefund
                | TransactionType::Chargeback
        )
    }
}
