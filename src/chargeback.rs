use chrono::NaiveDate;

use crate::decimal::Money;
use crate::errors::{ReprocessError, Result};
use crate::events::{Event, EventStore};
use crate::installment::Installment;
use crate::loan::Loan;
use crate::replay::ChangeSet;
use crate::rules::CreditAllocationRule;
use crate::transaction::ComponentAmounts;
use crate::types::{RelationKind, TransactionType, TxIdx};

/// result of re-crediting a chargeback onto the schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ChargebackOutcome {
    pub credits: ComponentAmounts,
    /// set only when a positive credit landed on the schedule
    pub target_installment: Option<u32>,
    /// amount beyond the adjusted original allocation, queued for the
    /// overpayment cascade
    pub overpayment: Money,
}

/// computes how a credit-reversal transaction re-credits a prior
/// transaction's allocation, accounting for earlier chargebacks against the
/// same original transaction
pub struct ChargebackAllocator;

impl ChargebackAllocator {
    /// allocate a chargeback of `amount` on `date`; `source` is the stored
    /// chargeback transaction carrying the CHARGEBACK relation
    pub fn allocate(
        loan: &mut Loan,
        source: TxIdx,
        amount: Money,
        date: NaiveDate,
        rule: &CreditAllocationRule,
        changeset: &ChangeSet,
        events: &mut EventStore,
    ) -> Result<ChargebackOutcome> {
        let original = Self::resolve_original(loan, source, changeset)
            .ok_or(ReprocessError::OriginalTransactionNotFound { date })?;

        let mut adjusted = loan.transaction(original).allocation_summary();

        // earlier chargebacks against the same original shrink what this one
        // may still re-credit
        for prior in Self::prior_chargebacks(loan, source, original, changeset) {
            let prior_tx = loan.transaction(prior);
            let consumed = if prior_tx.mappings.is_empty() {
                Self::distribute(prior_tx.amount, &adjusted, rule)
            } else {
                prior_tx.allocation_summary()
            };
            for component in rule.order.iter() {
                let slot = adjusted.get_mut(*component);
                *slot = (*slot - consumed.get(*component)).clamp_zero();
            }
        }

        let credits = Self::distribute(amount, &adjusted, rule);
        let overpayment = amount - credits.total();

        // a fully consumed original leaves nothing to re-credit; the whole
        // amount goes to the overpayment cascade and the schedule is untouched
        if !credits.total().is_positive() {
            return Ok(ChargebackOutcome {
                credits,
                target_installment: None,
                overpayment,
            });
        }

        let target_installment = Self::credit_target(loan, date, events);
        let installment = loan
            .installment_by_number_mut(target_installment)
            .expect("credit target installment exists");
        Self::apply_credits(installment, &credits, date);

        events.emit(Event::ChargebackCredited {
            date,
            amount: credits.total(),
            installment: target_installment,
        });

        Ok(ChargebackOutcome {
            credits,
            target_installment: Some(target_installment),
            overpayment,
        })
    }

    /// follow the CHARGEBACK relation backward, redirecting through the
    /// changeset when the related transaction has been replayed
    fn resolve_original(loan: &Loan, from: TxIdx, changeset: &ChangeSet) -> Option<TxIdx> {
        let target = loan.relation_target(from, RelationKind::Chargeback)?;
        let tx = loan.transaction(target);
        if tx.reversed {
            if let Some(id) = tx.id {
                if let Some(redirected) = changeset.redirect(id) {
                    return Some(redirected);
                }
            }
        }
        Some(target)
    }

    /// chargebacks against the same original that precede `source` in the
    /// canonical transaction order
    fn prior_chargebacks(
        loan: &Loan,
        source: TxIdx,
        original: TxIdx,
        changeset: &ChangeSet,
    ) -> Vec<TxIdx> {
        let source_tx = loan.transaction(source);
        let mut priors: Vec<TxIdx> = loan
            .transactions
            .iter()
            .enumerate()
            .filter(|(i, tx)| {
                *i != source.0
                    && !tx.reversed
                    && tx.kind == TransactionType::Chargeback
                    && tx.canonical_cmp(source_tx) == std::cmp::Ordering::Less
            })
            .map(|(i, _)| TxIdx(i))
            .filter(|idx| Self::resolve_original(loan, *idx, changeset) == Some(original))
            .collect();
        priors.sort_by(|a, b| loan.transaction(*a).canonical_cmp(loan.transaction(*b)));
        priors
    }

    /// greedy per-component distribution in credit-rule order: a component
    /// absorbs up to its adjusted original amount, the rest carries on
    fn distribute(
        amount: Money,
        available: &ComponentAmounts,
        rule: &CreditAllocationRule,
    ) -> ComponentAmounts {
        let mut remaining = amount;
        let mut out = ComponentAmounts::zero(amount.currency());
        for component in &rule.order {
            if !remaining.is_positive() {
                break;
            }
            let portion = remaining.min(available.get(*component).clamp_zero());
            *out.get_mut(*component) = portion;
            remaining -= portion;
        }
        out
    }

    /// pick the installment the credit lands on, synthesizing an additional
    /// (N+1) installment when the chargeback falls past the schedule
    fn credit_target(loan: &mut Loan, date: NaiveDate, events: &mut EventStore) -> u32 {
        if let Some(extra) = loan.installments.iter_mut().find(|i| i.additional) {
            if extra.due_date < date {
                extra.due_date = date;
            }
            return extra.number;
        }

        // a chargeback on the schedule's last due date lands on the final
        // installment via the same lookup
        if let Some(inst) = loan.installments.iter().find(|i| i.due_date >= date) {
            return inst.number;
        }

        let number = loan.next_installment_number();
        let from = loan
            .last_scheduled_due_date()
            .unwrap_or(loan.disbursement_date);
        let mut synthesized = Installment::new(number, from, date, loan.currency);
        synthesized.additional = true;
        events.emit(Event::InstallmentSynthesized {
            number,
            due_date: date,
        });
        loan.add_installment(synthesized);
        number
    }

    /// credits re-open debt through the pass-local adjustment so the next
    /// pass starts from the stored charged amounts again
    fn apply_credits(installment: &mut Installment, credits: &ComponentAmounts, date: NaiveDate) {
        for component in crate::types::ComponentType::ALL {
            let credit = credits.get(component);
            if credit.is_positive() {
                installment.component_mut(component).adjustment += credit;
            }
        }
        installment.refresh_obligations_met(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Currency;
    use crate::transaction::Transaction;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd(d: rust_decimal::Decimal) -> Money {
        Money::new(d, Currency::usd())
    }

    fn loan_with_schedule() -> Loan {
        let mut loan = Loan::new(Currency::usd(), date(2024, 1, 1));
        for (number, due) in [(1, date(2024, 2, 1)), (2, date(2024, 3, 1))] {
            let mut inst = Installment::new(number, due - chrono::Days::new(30), due, Currency::usd());
            inst.principal.charged = usd(dec!(500));
            inst.interest.charged = usd(dec!(50));
            loan.add_installment(inst);
        }
        loan
    }

    /// stored repayment with recorded principal/interest portions
    fn original_repayment(loan: &mut Loan, principal: Money, interest: Money) -> TxIdx {
        let mut tx = Transaction::new(
            TransactionType::Repayment,
            principal + interest,
            date(2024, 2, 1),
        )
        .with_id(Uuid::new_v4());
        let mapping = tx.mapping_for_mut(1);
        mapping.amounts.principal = principal;
        mapping.amounts.interest = interest;
        loan.add_transaction(tx)
    }

    fn chargeback_against(loan: &mut Loan, original: TxIdx, amount: Money, on: NaiveDate) -> TxIdx {
        let tx = Transaction::new(TransactionType::Chargeback, amount, on).with_id(Uuid::new_v4());
        let idx = loan.add_transaction(tx);
        loan.relate(idx, RelationKind::Chargeback, original);
        idx
    }

    #[test]
    fn test_single_chargeback_credits_principal_first() {
        let mut loan = loan_with_schedule();
        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));
        let cb = chargeback_against(&mut loan, original, usd(dec!(120)), date(2024, 2, 15));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            cb,
            usd(dec!(120)),
            date(2024, 2, 15),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        )
        .unwrap();

        assert_eq!(outcome.credits.principal, usd(dec!(120)));
        assert!(outcome.credits.interest.is_zero());
        assert!(outcome.overpayment.is_zero());
        // lands on the first due-or-future installment, re-opening debt
        // through the adjustment while the stored charge stays intact
        assert_eq!(outcome.target_installment, Some(2));
        let target = loan.installment_by_number(2).unwrap();
        assert_eq!(target.principal.adjustment, usd(dec!(120)));
        assert_eq!(target.principal.charged, usd(dec!(500)));
        assert_eq!(target.principal.outstanding(), usd(dec!(620)));
    }

    #[test]
    fn test_second_chargeback_respects_prior_consumption() {
        // original $200 repayment (principal 150 / interest 50), first
        // chargeback $80 recorded as principal 60 / interest 20; adjusted
        // allocation is principal 90 / interest 30, so a $50 chargeback is
        // all principal
        let mut loan = loan_with_schedule();
        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));

        let first = chargeback_against(&mut loan, original, usd(dec!(80)), date(2024, 2, 10));
        let mapping = loan.transaction_mut(first).mapping_for_mut(2);
        mapping.amounts.principal = usd(dec!(60));
        mapping.amounts.interest = usd(dec!(20));

        let second = chargeback_against(&mut loan, original, usd(dec!(50)), date(2024, 2, 20));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            second,
            usd(dec!(50)),
            date(2024, 2, 20),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        )
        .unwrap();

        assert_eq!(outcome.credits.principal, usd(dec!(50)));
        assert!(outcome.credits.interest.is_zero());
        assert!(outcome.overpayment.is_zero());
    }

    #[test]
    fn test_chargeback_bound_never_exceeds_original_allocation() {
        let mut loan = loan_with_schedule();
        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));

        let first = chargeback_against(&mut loan, original, usd(dec!(180)), date(2024, 2, 10));
        let mapping = loan.transaction_mut(first).mapping_for_mut(2);
        mapping.amounts.principal = usd(dec!(150));
        mapping.amounts.interest = usd(dec!(30));

        let second = chargeback_against(&mut loan, original, usd(dec!(60)), date(2024, 2, 20));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            second,
            usd(dec!(60)),
            date(2024, 2, 20),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        )
        .unwrap();

        // only $20 of interest remains creditable; the rest is overpayment
        assert!(outcome.credits.principal.is_zero());
        assert_eq!(outcome.credits.interest, usd(dec!(20)));
        assert_eq!(outcome.overpayment, usd(dec!(40)));
    }

    #[test]
    fn test_missing_original_is_fatal() {
        let mut loan = loan_with_schedule();
        let orphan = loan.add_transaction(
            Transaction::new(TransactionType::Chargeback, usd(dec!(10)), date(2024, 2, 15))
                .with_id(Uuid::new_v4()),
        );

        let mut events = EventStore::new();
        let result = ChargebackAllocator::allocate(
            &mut loan,
            orphan,
            usd(dec!(10)),
            date(2024, 2, 15),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        );

        assert!(matches!(
            result,
            Err(ReprocessError::OriginalTransactionNotFound { .. })
        ));
    }

    #[test]
    fn test_redirects_through_changeset_when_original_was_replayed() {
        let mut loan = loan_with_schedule();
        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));
        let original_id = loan.transaction(original).id.unwrap();

        // the original got replaced during this pass
        let mut replacement =
            Transaction::new(TransactionType::Repayment, usd(dec!(200)), date(2024, 2, 1));
        let mapping = replacement.mapping_for_mut(1);
        mapping.amounts.principal = usd(dec!(140));
        mapping.amounts.interest = usd(dec!(60));
        let replacement_idx = loan.add_transaction(replacement);
        loan.transaction_mut(original).reversed = true;

        let mut changeset = ChangeSet::new();
        changeset.record(original_id, replacement_idx);

        let cb = chargeback_against(&mut loan, original, usd(dec!(150)), date(2024, 2, 15));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            cb,
            usd(dec!(150)),
            date(2024, 2, 15),
            &CreditAllocationRule::principal_first(),
            &changeset,
            &mut events,
        )
        .unwrap();

        // credits come from the replacement's allocation (principal 140)
        assert_eq!(outcome.credits.principal, usd(dec!(140)));
        assert_eq!(outcome.credits.interest, usd(dec!(10)));
    }

    #[test]
    fn test_synthesizes_additional_installment_past_schedule_end() {
        let mut loan = loan_with_schedule();
        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));
        let cb = chargeback_against(&mut loan, original, usd(dec!(100)), date(2024, 4, 15));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            cb,
            usd(dec!(100)),
            date(2024, 4, 15),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        )
        .unwrap();

        assert_eq!(outcome.target_installment, Some(3));
        let extra = loan.installment_by_number(3).unwrap();
        assert!(extra.additional);
        assert_eq!(extra.from_date, date(2024, 3, 1));
        assert_eq!(extra.due_date, date(2024, 4, 15));
        assert_eq!(extra.principal.adjustment, usd(dec!(100)));
        assert_eq!(extra.principal.outstanding(), usd(dec!(100)));
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::InstallmentSynthesized { number: 3, .. })));
    }

    #[test]
    fn test_existing_additional_installment_is_reused_and_pushed_forward() {
        let mut loan = loan_with_schedule();
        let mut extra = Installment::new(3, date(2024, 3, 1), date(2024, 4, 1), Currency::usd());
        extra.additional = true;
        loan.add_installment(extra);

        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));
        let cb = chargeback_against(&mut loan, original, usd(dec!(50)), date(2024, 4, 20));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            cb,
            usd(dec!(50)),
            date(2024, 4, 20),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        )
        .unwrap();

        assert_eq!(outcome.target_installment, Some(3));
        let extra = loan.installment_by_number(3).unwrap();
        assert_eq!(extra.due_date, date(2024, 4, 20));
        assert_eq!(loan.installments.len(), 3);
    }

    #[test]
    fn test_fully_consumed_original_leaves_schedule_untouched() {
        // the first chargeback already consumed the whole original
        // allocation, so the second credits nothing and must not synthesize
        // an installment or emit a credit event
        let mut loan = loan_with_schedule();
        let original = original_repayment(&mut loan, usd(dec!(150)), usd(dec!(50)));

        let first = chargeback_against(&mut loan, original, usd(dec!(200)), date(2024, 2, 10));
        let mapping = loan.transaction_mut(first).mapping_for_mut(2);
        mapping.amounts.principal = usd(dec!(150));
        mapping.amounts.interest = usd(dec!(50));

        // dated past the schedule end, where a credit would synthesize
        let second = chargeback_against(&mut loan, original, usd(dec!(75)), date(2024, 4, 15));

        let mut events = EventStore::new();
        let outcome = ChargebackAllocator::allocate(
            &mut loan,
            second,
            usd(dec!(75)),
            date(2024, 4, 15),
            &CreditAllocationRule::principal_first(),
            &ChangeSet::new(),
            &mut events,
        )
        .unwrap();

        assert!(outcome.credits.total().is_zero());
        assert_eq!(outcome.target_installment, None);
        assert_eq!(outcome.overpayment, usd(dec!(75)));
        assert_eq!(loan.installments.len(), 2);
        assert!(events.events().is_empty());
    }
}
