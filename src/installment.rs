use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Currency, Money};
use crate::interest::DueAmounts;
use crate::types::ComponentType;

/// charged/paid/waived/written-off amounts for one component of an installment
///
/// outstanding = charged + adjustment - paid - waived - written-off,
/// clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentBalance {
    pub charged: Money,
    /// signed schedule adjustment applied during a pass (chargeback
    /// re-debits, re-age relief); rebuilt from the ledger every pass
    pub adjustment: Money,
    pub paid: Money,
    pub waived: Money,
    pub written_off: Money,
}

impl ComponentBalance {
    pub fn zero(currency: Currency) -> Self {
        ComponentBalance {
            charged: Money::zero(currency),
            adjustment: Money::zero(currency),
            paid: Money::zero(currency),
            waived: Money::zero(currency),
            written_off: Money::zero(currency),
        }
    }

    pub fn outstanding(&self) -> Money {
        (self.charged + self.adjustment - self.paid - self.waived - self.written_off).clamp_zero()
    }

    /// zero everything a reprocessing pass recomputes
    pub fn reset_derived(&mut self) {
        let currency = self.charged.currency();
        self.adjustment = Money::zero(currency);
        self.paid = Money::zero(currency);
        self.waived = Money::zero(currency);
        self.written_off = Money::zero(currency);
    }
}

/// one scheduled repayment period with its own component sub-balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub number: u32,
    pub from_date: NaiveDate,
    pub due_date: NaiveDate,
    pub down_payment: bool,
    /// synthesized outside the regular schedule (e.g. by a chargeback)
    pub additional: bool,
    pub re_aged: bool,
    pub obligations_met_on: Option<NaiveDate>,
    pub principal: ComponentBalance,
    pub interest: ComponentBalance,
    pub fee: ComponentBalance,
    pub penalty: ComponentBalance,
}

impl Installment {
    pub fn new(number: u32, from_date: NaiveDate, due_date: NaiveDate, currency: Currency) -> Self {
        Installment {
            number,
            from_date,
            due_date,
            down_payment: false,
            additional: false,
            re_aged: false,
            obligations_met_on: None,
            principal: ComponentBalance::zero(currency),
            interest: ComponentBalance::zero(currency),
            fee: ComponentBalance::zero(currency),
            penalty: ComponentBalance::zero(currency),
        }
    }

    pub fn currency(&self) -> Currency {
        self.principal.charged.currency()
    }

    pub fn component(&self, component: ComponentType) -> &ComponentBalance {
        match component {
            ComponentType::Principal => &self.principal,
            ComponentType::Interest => &self.interest,
            ComponentType::Fee => &self.fee,
            ComponentType::Penalty => &self.penalty,
        }
    }

    pub fn component_mut(&mut self, component: ComponentType) -> &mut ComponentBalance {
        match component {
            ComponentType::Principal => &mut self.principal,
            ComponentType::Interest => &mut self.interest,
            ComponentType::Fee => &mut self.fee,
            ComponentType::Penalty => &mut self.penalty,
        }
    }

    pub fn total_outstanding(&self) -> Money {
        ComponentType::ALL
            .iter()
            .fold(Money::zero(self.currency()), |acc, c| {
                acc + self.component(*c).outstanding()
            })
    }

    pub fn total_paid(&self) -> Money {
        ComponentType::ALL
            .iter()
            .fold(Money::zero(self.currency()), |acc, c| {
                acc + self.component(*c).paid
            })
    }

    pub fn is_settled(&self) -> bool {
        self.total_outstanding().is_zero()
    }

    /// zero derived balances ahead of a replay; fee and penalty charges are
    /// rebuilt from charge events, principal/interest from the schedule model
    pub fn reset_derived_balances(&mut self) {
        let currency = self.currency();
        self.principal.reset_derived();
        self.interest.reset_derived();
        self.fee.reset_derived();
        self.penalty.reset_derived();
        self.fee.charged = Money::zero(currency);
        self.penalty.charged = Money::zero(currency);
        self.obligations_met_on = None;
    }

    /// record or clear the obligations-met date after balances moved
    pub fn refresh_obligations_met(&mut self, on: NaiveDate) {
        if self.is_settled() {
            if self.obligations_met_on.is_none() {
                self.obligations_met_on = Some(on);
            }
        } else {
            self.obligations_met_on = None;
        }
    }

    /// refresh cached due principal/interest from the schedule model
    pub fn refresh_due_amounts(&mut self, due: DueAmounts) {
        self.principal.charged = due.principal;
        self.interest.charged = due.interest;
    }
}
