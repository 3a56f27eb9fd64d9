use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::decimal::{Currency, Money};
use crate::types::{ComponentType, TransactionId, TransactionType};

/// per-component amounts without an installment attached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentAmounts {
    pub principal: Money,
    pub interest: Money,
    pub fee: Money,
    pub penalty: Money,
}

impl ComponentAmounts {
    pub fn zero(currency: Currency) -> Self {
        ComponentAmounts {
            principal: Money::zero(currency),
            interest: Money::zero(currency),
            fee: Money::zero(currency),
            penalty: Money::zero(currency),
        }
    }

    pub fn get(&self, component: ComponentType) -> Money {
        match component {
            ComponentType::Principal => self.principal,
            ComponentType::Interest => self.interest,
            ComponentType::Fee => self.fee,
            ComponentType::Penalty => self.penalty,
        }
    }

    pub fn get_mut(&mut self, component: ComponentType) -> &mut Money {
        match component {
            ComponentType::Principal => &mut self.principal,
            ComponentType::Interest => &mut self.interest,
            ComponentType::Fee => &mut self.fee,
            ComponentType::Penalty => &mut self.penalty,
        }
    }

    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fee + self.penalty
    }

    pub fn is_zero(&self) -> bool {
        self.total().is_zero()
    }
}

/// principal/interest/fee/penalty portions attributed to one installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentMapping {
    pub installment: u32,
    pub amounts: ComponentAmounts,
}

impl InstallmentMapping {
    pub fn zero(installment: u32, currency: Currency) -> Self {
        InstallmentMapping {
            installment,
            amounts: ComponentAmounts::zero(currency),
        }
    }
}

/// monetary event on the loan ledger
///
/// a transaction with `id == None` has no persisted identity yet ("new");
/// one carrying an id is "existing" and subject to replay reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<TransactionId>,
    pub kind: TransactionType,
    pub amount: Money,
    /// value date of the monetary effect
    pub date: NaiveDate,
    pub submitted_on: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
    pub mappings: Vec<InstallmentMapping>,
    pub reversed: bool,
    /// portion of the amount that exceeded total outstanding
    pub overpayment: Money,
}

impl Transaction {
    pub fn new(kind: TransactionType, amount: Money, date: NaiveDate) -> Self {
        Transaction {
            id: None,
            kind,
            amount,
            date,
            submitted_on: date,
            created_at: None,
            mappings: Vec::new(),
            reversed: false,
            overpayment: Money::zero(amount.currency()),
        }
    }

    pub fn with_id(mut self, id: TransactionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_submission(mut self, submitted_on: NaiveDate) -> Self {
        self.submitted_on = submitted_on;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    /// sum of one component across all installment mappings
    pub fn component_total(&self, component: ComponentType) -> Money {
        self.mappings
            .iter()
            .fold(Money::zero(self.currency()), |acc, m| {
                acc + m.amounts.get(component)
            })
    }

    /// per-component totals across all installment mappings
    pub fn allocation_summary(&self) -> ComponentAmounts {
        let mut summary = ComponentAmounts::zero(self.currency());
        for component in ComponentType::ALL {
            *summary.get_mut(component) = self.component_total(component);
        }
        summary
    }

    pub fn allocated_total(&self) -> Money {
        self.allocation_summary().total()
    }

    /// find-or-insert the mapping record for an installment number
    pub fn mapping_for_mut(&mut self, installment: u32) -> &mut InstallmentMapping {
        let currency = self.currency();
        if let Some(pos) = self
            .mappings
            .iter()
            .position(|m| m.installment == installment)
        {
            return &mut self.mappings[pos];
        }
        self.mappings
            .push(InstallmentMapping::zero(installment, currency));
        self.mappings.sort_by_key(|m| m.installment);
        let pos = self
            .mappings
            .iter()
            .position(|m| m.installment == installment)
            .expect("mapping was just inserted");
        &mut self.mappings[pos]
    }

    /// canonical ordering: value date, then creation timestamp (nulls last),
    /// then persisted identity for stability
    pub fn canonical_cmp(&self, other: &Transaction) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| match (&self.created_at, &other.created_at) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}
