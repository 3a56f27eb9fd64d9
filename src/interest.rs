use chrono::NaiveDate;

use crate::decimal::{Money, Rate};
use crate::installment::Installment;
use crate::loan::Charge;

use crate::config::ProductTerms;
use crate::decimal::Currency;

/// due principal/interest of one repayment period as seen by the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueAmounts {
    pub principal: Money,
    pub interest: Money,
}

/// external source of truth for interest-bearing balance evolution
///
/// the engine only pushes events into the model and reads due amounts back;
/// the amortization math behind it is out of scope.
pub trait InterestScheduleModel {
    fn add_disbursement(&mut self, date: NaiveDate, amount: Money);

    fn change_interest_rate(&mut self, date: NaiveDate, rate: Rate);

    /// register a principal payment against the period due on `period_due_date`
    fn pay_principal(&mut self, period_due_date: NaiveDate, value_date: NaiveDate, amount: Money);

    /// register an interest payment against the period due on `period_due_date`
    fn pay_interest(&mut self, period_due_date: NaiveDate, value_date: NaiveDate, amount: Money);

    /// register an out-of-schedule balance change (e.g. overdue correction)
    fn add_balance_correction(&mut self, date: NaiveDate, amount: Money);

    fn due_amounts(&self, period_due_date: NaiveDate, as_of: NaiveDate) -> DueAmounts;

    /// due date of the period containing `date`, if any
    fn find_repayment_period(&self, date: NaiveDate) -> Option<NaiveDate>;

    fn sum_of_due_interest_on(&self, date: NaiveDate) -> Money;
}

/// builds a fresh model from the installment schedule and product terms
pub trait InterestModelFactory {
    fn generate(
        &self,
        installments: &[Installment],
        terms: &ProductTerms,
    ) -> Box<dyn InterestScheduleModel>;
}

/// recomputes one charge's per-installment due portions
pub trait ChargeAmortizer {
    fn reprocess(
        &self,
        currency: Currency,
        disbursement_date: NaiveDate,
        installments: &mut [Installment],
        charge: &Charge,
    );
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    /// deterministic stand-in for the external interest model: due amounts
    /// are seeded from the installment schedule and never re-amortized,
    /// while every mutation is logged for assertions
    pub struct StubModel {
        currency: Currency,
        periods: BTreeMap<NaiveDate, DueAmounts>,
        pub log: Rc<RefCell<Vec<String>>>,
    }

    impl StubModel {
        pub fn from_installments(
            installments: &[Installment],
            currency: Currency,
            log: Rc<RefCell<Vec<String>>>,
        ) -> Self {
            let periods = installments
                .iter()
                .map(|i| {
                    (
                        i.due_date,
                        DueAmounts {
                            principal: i.principal.charged,
                            interest: i.interest.charged,
                        },
                    )
                })
                .collect();
            StubModel {
                currency,
                periods,
                log,
            }
        }

        fn record(&self, line: String) {
            self.log.borrow_mut().push(line);
        }
    }

    impl InterestScheduleModel for StubModel {
        fn add_disbursement(&mut self, date: NaiveDate, amount: Money) {
            self.record(format!("disburse {date} {amount}"));
        }

        fn change_interest_rate(&mut self, date: NaiveDate, rate: Rate) {
            self.record(format!("rate {date} {rate}"));
        }

        fn pay_principal(&mut self, period_due_date: NaiveDate, value_date: NaiveDate, amount: Money) {
            self.record(format!("pay-principal {period_due_date} {value_date} {amount}"));
        }

        fn pay_interest(&mut self, period_due_date: NaiveDate, value_date: NaiveDate, amount: Money) {
            self.record(format!("pay-interest {period_due_date} {value_date} {amount}"));
        }

        fn add_balance_correction(&mut self, date: NaiveDate, amount: Money) {
            self.record(format!("correction {date} {amount}"));
        }

        fn due_amounts(&self, period_due_date: NaiveDate, _as_of: NaiveDate) -> DueAmounts {
            self.periods
                .get(&period_due_date)
                .copied()
                .unwrap_or(DueAmounts {
                    principal: Money::zero(self.currency),
                    interest: Money::zero(self.currency),
                })
        }

        fn find_repayment_period(&self, date: NaiveDate) -> Option<NaiveDate> {
            self.periods.keys().find(|due| **due >= date).copied()
        }

        fn sum_of_due_interest_on(&self, date: NaiveDate) -> Money {
            match self.find_repayment_period(date) {
                Some(due) => self.periods[&due].interest,
                None => Money::zero(self.currency),
            }
        }
    }

    pub struct StubModelFactory {
        pub log: Rc<RefCell<Vec<String>>>,
    }

    impl StubModelFactory {
        pub fn new() -> Self {
            StubModelFactory {
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl InterestModelFactory for StubModelFactory {
        fn generate(
            &self,
            installments: &[Installment],
            terms: &ProductTerms,
        ) -> Box<dyn InterestScheduleModel> {
            Box::new(StubModel::from_installments(
                installments,
                terms.currency,
                Rc::clone(&self.log),
            ))
        }
    }

    /// amortizes a charge entirely onto the installment covering its due date
    pub struct WholeChargeAmortizer;

    impl ChargeAmortizer for WholeChargeAmortizer {
        fn reprocess(
            &self,
            _currency: Currency,
            _disbursement_date: NaiveDate,
            installments: &mut [Installment],
            charge: &Charge,
        ) {
            let pos = installments
                .iter()
                .position(|i| i.due_date >= charge.due_date)
                .or_else(|| installments.len().checked_sub(1));
            if let Some(pos) = pos {
                let balance = installments[pos].component_mut(charge.component);
                balance.charged += charge.amount;
            }
        }
    }
}
