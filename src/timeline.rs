use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::loan::Loan;
use crate::types::TxIdx;

/// one entry of the merged, causally-ordered ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// index into the loan's rate-change list
    RateChange(usize),
    /// index into the loan's charge list
    Charge(usize),
    Transaction(TxIdx),
}

/// ordering key: effective date, accrual-activity-last on date ties, then
/// submission date, then creation timestamp with nulls last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    effective: NaiveDate,
    accrual_last: bool,
    submitted: NaiveDate,
    created_missing: bool,
    created: Option<DateTime<Utc>>,
}

/// merges transactions, charges and rate changes into one timeline
///
/// events identical on every key level keep their input order (stable sort);
/// the exact tie-break beyond the creation timestamp is implementation-defined.
pub struct EventTimeline;

impl EventTimeline {
    pub fn merge(loan: &Loan) -> Vec<LedgerEvent> {
        let mut entries: Vec<(OrderKey, LedgerEvent)> = Vec::new();

        for (i, rc) in loan.rate_changes.iter().enumerate() {
            entries.push((
                OrderKey {
                    effective: rc.applicable_from,
                    accrual_last: false,
                    submitted: rc.submitted_on,
                    created_missing: rc.created_at.is_none(),
                    created: rc.created_at,
                },
                LedgerEvent::RateChange(i),
            ));
        }

        for (i, charge) in loan.charges.iter().enumerate() {
            entries.push((
                OrderKey {
                    effective: charge.effective_date(),
                    accrual_last: false,
                    submitted: charge.submitted_on,
                    created_missing: charge.created_at.is_none(),
                    created: charge.created_at,
                },
                LedgerEvent::Charge(i),
            ));
        }

        for (i, tx) in loan.transactions.iter().enumerate() {
            if tx.reversed {
                continue;
            }
            entries.push((
                OrderKey {
                    effective: tx.date,
                    // accrual activity reflects end-of-day state
                    accrual_last: tx.kind.is_accrual_activity(),
                    submitted: tx.submitted_on,
                    created_missing: tx.created_at.is_none(),
                    created: tx.created_at,
                },
                LedgerEvent::Transaction(TxIdx(i)),
            ));
        }

        entries.sort_by_key(|(key, _)| *key);
        entries.into_iter().map(|(_, event)| event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Currency, Money, Rate};
    use crate::loan::{Charge, InterestRateChange};
    use crate::transaction::Transaction;
    use crate::types::{ComponentType, TransactionType};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd(d: rust_decimal::Decimal) -> Money {
        Money::new(d, Currency::usd())
    }

    fn tx(kind: TransactionType, on: NaiveDate) -> Transaction {
        Transaction::new(kind, usd(dec!(100)), on)
    }

    fn charge(due: NaiveDate, submitted: NaiveDate) -> Charge {
        Charge {
            id: Uuid::new_v4(),
            amount: usd(dec!(10)),
            component: ComponentType::Fee,
            due_date: due,
            submitted_on: submitted,
            created_at: None,
        }
    }

    #[test]
    fn test_events_sorted_by_effective_date() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        let late = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 3, 1)));
        let early = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 1)));

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(
            timeline,
            vec![
                LedgerEvent::Transaction(early),
                LedgerEvent::Transaction(late)
            ]
        );
    }

    #[test]
    fn test_backdated_charge_uses_due_date() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 15)));
        // submitted on 2024-03-01, due 2024-02-01: effective at due date
        loan.charges.push(charge(date(2024, 2, 1), date(2024, 3, 1)));

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(timeline[0], LedgerEvent::Charge(0));
    }

    #[test]
    fn test_non_backdated_charge_uses_submission_date() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 15)));
        // submitted 2024-02-01, due 2024-03-01: effective at submission
        loan.charges.push(charge(date(2024, 3, 1), date(2024, 2, 1)));

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(timeline[0], LedgerEvent::Charge(0));
    }

    #[test]
    fn test_accrual_activity_sorts_after_same_date_events() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        let accrual = loan.add_transaction(tx(TransactionType::AccrualActivity, date(2024, 2, 1)));
        let repayment = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 1)));
        loan.rate_changes.push(InterestRateChange {
            applicable_from: date(2024, 2, 1),
            rate: Rate::from_percentage(7),
            submitted_on: date(2024, 2, 1),
            created_at: None,
        });

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(timeline.len(), 3);
        assert_eq!(
            timeline.last(),
            Some(&LedgerEvent::Transaction(accrual)),
            "accrual activity must come last on its date"
        );
        assert!(timeline.contains(&LedgerEvent::Transaction(repayment)));
    }

    #[test]
    fn test_submission_date_breaks_date_ties() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        let second = loan.add_transaction(
            tx(TransactionType::Repayment, date(2024, 2, 1)).with_submission(date(2024, 2, 5)),
        );
        let first = loan.add_transaction(
            tx(TransactionType::Repayment, date(2024, 2, 1)).with_submission(date(2024, 2, 3)),
        );

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(
            timeline,
            vec![
                LedgerEvent::Transaction(first),
                LedgerEvent::Transaction(second)
            ]
        );
    }

    #[test]
    fn test_missing_creation_timestamp_sorts_last() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        let without = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 1)));
        let with = loan.add_transaction(
            tx(TransactionType::Repayment, date(2024, 2, 1)).with_created_at(Utc::now()),
        );

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(
            timeline,
            vec![
                LedgerEvent::Transaction(with),
                LedgerEvent::Transaction(without)
            ]
        );
    }

    #[test]
    fn test_full_tie_preserves_input_order() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        let a = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 1)));
        let b = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 1)));

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(
            timeline,
            vec![LedgerEvent::Transaction(a), LedgerEvent::Transaction(b)]
        );
    }

    #[test]
    fn test_reversed_transactions_are_excluded() {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        let mut reversed = tx(TransactionType::Repayment, date(2024, 2, 1));
        reversed.reversed = true;
        loan.add_transaction(reversed);
        let live = loan.add_transaction(tx(TransactionType::Repayment, date(2024, 2, 2)));

        let timeline = EventTimeline::merge(&loan);
        assert_eq!(timeline, vec![LedgerEvent::Transaction(live)]);
    }
}
