use chrono::{Months, NaiveDate};
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, warn};

use crate::allocation::AllocationEngine;
use crate::chargeback::ChargebackAllocator;
use crate::config::LoanConfig;
use crate::decimal::Money;
use crate::errors::{ReprocessError, Result};
use crate::events::{Event, EventStore};
use crate::installment::Installment;
use crate::interest::{ChargeAmortizer, InterestModelFactory, InterestScheduleModel};
use crate::loan::Loan;
use crate::replay::{ChangeSet, ReplayReconciler};
use crate::rules::AllocationRule;
use crate::timeline::{EventTimeline, LedgerEvent};
use crate::transaction::Transaction;
use crate::types::{AllocationDirection, ComponentType, TransactionType, TxIdx};

/// state of one reprocessing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Resetting,
    /// replaying the timeline event at this index
    Replaying(usize),
    /// redistributing the overpayment pool, interrupted at this event index
    PostProcessingOverpayment(usize),
    RecalculatingTrailingInterest,
    Done,
}

/// result of a completed pass: the replay diff, the rebuilt interest model,
/// and the domain events emitted along the way
pub struct ReprocessOutcome {
    pub changeset: ChangeSet,
    pub model: Box<dyn InterestScheduleModel>,
    pub events: Vec<Event>,
}

/// mutable pass state threaded through every step
struct PassContext {
    phase: Phase,
    as_of: NaiveDate,
    changeset: ChangeSet,
    events: EventStore,
    /// dates already claimed by a reprocessed transaction this pass
    processed_dates: Vec<NaiveDate>,
}

impl PassContext {
    fn new(as_of: NaiveDate) -> Self {
        PassContext {
            phase: Phase::Init,
            as_of,
            changeset: ChangeSet::new(),
            events: EventStore::new(),
            processed_dates: Vec::new(),
        }
    }

    fn advance(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
    }
}

/// drives a full reprocessing pass over one loan
///
/// the pass owns the loan's mutable state for its duration; a failed pass
/// leaves in-memory mutations for the caller to discard.
pub struct Reprocessor<'a> {
    config: &'a LoanConfig,
    model_factory: &'a dyn InterestModelFactory,
    charge_amortizer: &'a dyn ChargeAmortizer,
    engine: AllocationEngine,
}

impl<'a> Reprocessor<'a> {
    pub fn new(
        config: &'a LoanConfig,
        model_factory: &'a dyn InterestModelFactory,
        charge_amortizer: &'a dyn ChargeAmortizer,
    ) -> Self {
        Reprocessor {
            config,
            model_factory,
            charge_amortizer,
            engine: AllocationEngine::new(config.allocation_style),
        }
    }

    /// recompute every installment balance and transaction allocation from
    /// the loan's merged event timeline, as of the given date
    pub fn reprocess(&self, loan: &mut Loan, as_of: NaiveDate) -> Result<ReprocessOutcome> {
        self.config.validate()?;
        self.ensure_currency(loan)?;

        let mut ctx = PassContext::new(as_of);

        ctx.advance(Phase::Resetting);
        loan.remove_generated_installments();
        for installment in &mut loan.installments {
            installment.reset_derived_balances();
        }
        loan.overpayment_pool = Money::zero(loan.currency);
        loan.charged_off_on = None;

        let mut model = self
            .model_factory
            .generate(&loan.installments, &self.config.terms);

        let timeline = EventTimeline::merge(loan);
        ctx.events.emit(Event::PassStarted {
            as_of,
            event_count: timeline.len(),
        });
        info!(events = timeline.len(), %as_of, "reprocessing pass started");

        for (i, event) in timeline.iter().enumerate() {
            ctx.advance(Phase::Replaying(i));
            match *event {
                LedgerEvent::RateChange(index) => {
                    self.apply_rate_change(loan, index, model.as_mut());
                }
                LedgerEvent::Charge(index) => {
                    self.apply_charge(loan, index, model.as_mut(), &mut ctx, i)?;
                }
                LedgerEvent::Transaction(idx) => {
                    self.replay_transaction(loan, idx, model.as_mut(), &mut ctx)?;
                }
            }
        }

        ctx.advance(Phase::PostProcessingOverpayment(timeline.len()));
        self.redistribute_overpayments(loan, model.as_mut(), &mut ctx)?;

        ctx.advance(Phase::RecalculatingTrailingInterest);
        self.correct_trailing_interest(loan, model.as_mut(), &mut ctx);

        ctx.advance(Phase::Done);
        ctx.events.emit(Event::PassCompleted {
            as_of,
            replaced_count: ctx.changeset.len(),
        });
        info!(replaced = ctx.changeset.len(), "reprocessing pass completed");

        Ok(ReprocessOutcome {
            changeset: ctx.changeset,
            model,
            events: ctx.events.take_events(),
        })
    }

    /// date-driven entry point for scheduled recalculation jobs
    pub fn reprocess_as_of_now(
        &self,
        loan: &mut Loan,
        time_provider: &SafeTimeProvider,
    ) -> Result<ReprocessOutcome> {
        self.reprocess(loan, time_provider.now().date_naive())
    }

    fn ensure_currency(&self, loan: &Loan) -> Result<()> {
        let expected = self.config.currency();
        if loan.currency != expected {
            return Err(ReprocessError::CurrencyMismatch {
                expected,
                found: loan.currency,
            });
        }
        for tx in &loan.transactions {
            if tx.currency() != expected {
                return Err(ReprocessError::CurrencyMismatch {
                    expected,
                    found: tx.currency(),
                });
            }
        }
        for charge in &loan.charges {
            if charge.amount.currency() != expected {
                return Err(ReprocessError::CurrencyMismatch {
                    expected,
                    found: charge.amount.currency(),
                });
            }
        }
        Ok(())
    }

    fn apply_rate_change(&self, loan: &mut Loan, index: usize, model: &mut dyn InterestScheduleModel) {
        let change = loan.rate_changes[index].clone();
        model.change_interest_rate(change.applicable_from, change.rate);
        self.refresh_due_caches(loan, model, change.applicable_from);
    }

    fn apply_charge(
        &self,
        loan: &mut Loan,
        index: usize,
        model: &mut dyn InterestScheduleModel,
        ctx: &mut PassContext,
        event_index: usize,
    ) -> Result<()> {
        let charge = loan.charges[index].clone();
        self.charge_amortizer.reprocess(
            loan.currency,
            loan.disbursement_date,
            &mut loan.installments,
            &charge,
        );

        // a charge landing on unmet obligations pulls pending overpayments
        // back into the schedule before the replay continues
        let effective = charge.effective_date();
        let unmet = loan
            .installments
            .iter()
            .any(|i| i.due_date <= effective && !i.is_settled());
        if unmet
            && loan.overpayment_pool.is_positive()
            && !loan.overpaid_transactions().is_empty()
        {
            ctx.advance(Phase::PostProcessingOverpayment(event_index));
            self.redistribute_overpayments(loan, model, ctx)?;
            ctx.advance(Phase::Replaying(event_index));
        }
        Ok(())
    }

    fn replay_transaction(
        &self,
        loan: &mut Loan,
        idx: TxIdx,
        model: &mut dyn InterestScheduleModel,
        ctx: &mut PassContext,
    ) -> Result<()> {
        let old = loan.transaction(idx).clone();
        match old.kind {
            TransactionType::Disbursement => {
                model.add_disbursement(old.date, old.amount);
                self.refresh_due_caches(loan, model, old.date);
            }
            TransactionType::ChargeOff => {
                loan.charged_off_on = Some(old.date);
            }
            TransactionType::Accrual => {
                warn!(kind = ?old.kind, date = %old.date, "unhandled transaction type skipped");
                ctx.events.emit(Event::UnhandledTransactionSkipped {
                    kind: old.kind,
                    date: old.date,
                });
            }
            TransactionType::ReAge => {
                self.re_age(loan, &old, ctx);
            }
            TransactionType::ReAmortize => {
                self.re_amortize(loan, &old);
            }
            TransactionType::Repayment | TransactionType::DownPayment => {
                let mut proposed = Self::proposed_from(&old);
                let rule = self.config.rules.rule_for(old.kind);
                let outcome = self.engine.allocate(
                    old.kind,
                    old.date,
                    old.amount,
                    AllocationDirection::Pay,
                    &mut loan.installments,
                    &rule,
                    self.model_if_recalculating(model),
                )?;
                proposed.mappings = outcome.mappings;
                if outcome.remainder.is_positive() {
                    proposed.overpayment = outcome.remainder;
                    loan.overpayment_pool += outcome.remainder;
                    ctx.events.emit(Event::OverpaymentRecorded {
                        date: old.date,
                        amount: outcome.remainder,
                    });
                }
                self.reconcile(loan, idx, proposed, ctx);
            }
            TransactionType::Refund => {
                let mut proposed = Self::proposed_from(&old);
                let rule = self.config.rules.rule_for(old.kind);
                let outcome = self.engine.allocate(
                    old.kind,
                    old.date,
                    old.amount,
                    AllocationDirection::Unpay,
                    &mut loan.installments,
                    &rule,
                    None,
                )?;
                proposed.mappings = outcome.mappings;
                self.reconcile(loan, idx, proposed, ctx);
            }
            TransactionType::InterestRefund => {
                let mut proposed = Self::proposed_from(&old);
                let base = self.config.rules.rule_for(old.kind);
                let order: Vec<_> = base
                    .order
                    .iter()
                    .copied()
                    .filter(|(component, _)| *component == ComponentType::Interest)
                    .collect();
                let rule = AllocationRule::new(order, base.future_rule);
                let outcome = self.engine.allocate(
                    old.kind,
                    old.date,
                    old.amount,
                    AllocationDirection::Unpay,
                    &mut loan.installments,
                    &rule,
                    None,
                )?;
                proposed.mappings = outcome.mappings;
                self.reconcile(loan, idx, proposed, ctx);
            }
            TransactionType::Chargeback => {
                if let Some(credit_rule) = self.config.rules.credit_rule_for(old.kind) {
                    let credit_rule = credit_rule.clone();
                    let outcome = ChargebackAllocator::allocate(
                        loan,
                        idx,
                        old.amount,
                        old.date,
                        &credit_rule,
                        &ctx.changeset,
                        &mut ctx.events,
                    )?;
                    let mut proposed = Self::proposed_from(&old);
                    if let Some(number) = outcome.target_installment {
                        proposed.mapping_for_mut(number).amounts = outcome.credits;
                    }
                    if outcome.overpayment.is_positive() {
                        proposed.overpayment = outcome.overpayment;
                        loan.overpayment_pool += outcome.overpayment;
                        ctx.events.emit(Event::OverpaymentRecorded {
                            date: old.date,
                            amount: outcome.overpayment,
                        });
                    }
                    self.reconcile(loan, idx, proposed, ctx);
                } else {
                    // no credit rule configured: plain reduction of paid amounts
                    let mut proposed = Self::proposed_from(&old);
                    let rule = self.config.rules.default_rule().clone();
                    let outcome = self.engine.allocate(
                        old.kind,
                        old.date,
                        old.amount,
                        AllocationDirection::Unpay,
                        &mut loan.installments,
                        &rule,
                        None,
                    )?;
                    proposed.mappings = outcome.mappings;
                    self.reconcile(loan, idx, proposed, ctx);
                }
            }
            TransactionType::WriteOff => {
                let mut proposed = Self::proposed_from(&old);
                let mut total = Money::zero(loan.currency);
                for installment in &mut loan.installments {
                    for component in ComponentType::ALL {
                        let outstanding = installment.component(component).outstanding();
                        if outstanding.is_positive() {
                            installment.component_mut(component).written_off += outstanding;
                            *proposed
                                .mapping_for_mut(installment.number)
                                .amounts
                                .get_mut(component) += outstanding;
                            total += outstanding;
                        }
                    }
                    installment.refresh_obligations_met(old.date);
                }
                // the written-off amount follows the balances, not the stored figure
                proposed.amount = total;
                self.reconcile(loan, idx, proposed, ctx);
            }
            TransactionType::AccrualActivity => {
                let mut proposed = Self::proposed_from(&old);
                proposed.amount = model.sum_of_due_interest_on(old.date);
                let period = model.find_repayment_period(old.date).ok_or(
                    ReprocessError::RepaymentPeriodNotFound { date: old.date },
                )?;
                if let Some(number) = loan
                    .installments
                    .iter()
                    .find(|i| i.due_date == period)
                    .map(|i| i.number)
                {
                    proposed.mapping_for_mut(number).amounts.interest = proposed.amount;
                }
                self.reconcile(loan, idx, proposed, ctx);
            }
            TransactionType::WaiveCharges => {
                let mut proposed = Self::proposed_from(&old);
                proposed.mappings = old.mappings.clone();
                for mapping in &old.mappings {
                    if let Some(installment) = loan.installment_by_number_mut(mapping.installment)
                    {
                        for component in ComponentType::ALL {
                            let waived = mapping.amounts.get(component);
                            if waived.is_positive() {
                                installment.component_mut(component).waived += waived;
                            }
                        }
                        installment.refresh_obligations_met(old.date);
                    }
                }
                self.reconcile(loan, idx, proposed, ctx);
            }
        }
        Ok(())
    }

    /// recomputed transaction carrying the old one's ledger coordinates but
    /// no persisted identity
    fn proposed_from(old: &Transaction) -> Transaction {
        let mut tx =
            Transaction::new(old.kind, old.amount, old.date).with_submission(old.submitted_on);
        if let Some(created) = old.created_at {
            tx = tx.with_created_at(created);
        }
        tx
    }

    fn reconcile(&self, loan: &mut Loan, old_idx: TxIdx, proposed: Transaction, ctx: &mut PassContext) {
        let date = proposed.date;
        ReplayReconciler::reconcile(
            loan,
            Some(old_idx),
            proposed,
            &ctx.processed_dates,
            &mut ctx.changeset,
            &mut ctx.events,
        );
        ctx.processed_dates.push(date);
    }

    fn model_if_recalculating<'m>(
        &self,
        model: &'m mut dyn InterestScheduleModel,
    ) -> Option<&'m mut dyn InterestScheduleModel> {
        if self.config.interest_recalculation {
            Some(model)
        } else {
            None
        }
    }

    fn refresh_due_caches(
        &self,
        loan: &mut Loan,
        model: &dyn InterestScheduleModel,
        as_of: NaiveDate,
    ) {
        if !self.config.interest_recalculation {
            return;
        }
        for installment in &mut loan.installments {
            let due = model.due_amounts(installment.due_date, as_of);
            installment.refresh_due_amounts(due);
        }
    }

    /// gather overdue principal into a fresh re-aged installment due one
    /// repayment period after the re-age date; the sources keep their stored
    /// charge and carry the move in the pass-local adjustment
    fn re_age(&self, loan: &mut Loan, tx: &Transaction, ctx: &mut PassContext) {
        let currency = loan.currency;
        let mut gathered = Money::zero(currency);
        for installment in &mut loan.installments {
            if installment.due_date < tx.date {
                let overdue = installment.principal.outstanding();
                if overdue.is_positive() {
                    installment.principal.adjustment -= overdue;
                    installment.refresh_obligations_met(tx.date);
                    gathered += overdue;
                }
            }
        }
        if !gathered.is_positive() {
            return;
        }
        let number = loan.next_installment_number();
        let due_date = tx.date + Months::new(self.config.terms.repayment_every_months);
        let mut installment = Installment::new(number, tx.date, due_date, currency);
        installment.re_aged = true;
        installment.principal.charged = gathered;
        ctx.events.emit(Event::InstallmentSynthesized { number, due_date });
        loan.add_installment(installment);
    }

    /// spread remaining future principal evenly, residue on the last installment
    fn re_amortize(&self, loan: &mut Loan, tx: &Transaction) {
        let future: Vec<usize> = loan
            .installments
            .iter()
            .enumerate()
            .filter(|(_, i)| i.due_date > tx.date)
            .map(|(k, _)| k)
            .collect();
        if future.is_empty() {
            return;
        }
        let total = future.iter().fold(Money::zero(loan.currency), |acc, k| {
            acc + loan.installments[*k].principal.outstanding()
        });
        let shares = total.split_even(future.len());
        for (share, k) in shares.into_iter().zip(&future) {
            let balance = &mut loan.installments[*k].principal;
            balance.charged = balance.paid + balance.waived + balance.written_off + share;
        }
    }

    /// chronological walk over overpaid transactions, each absorbing
    /// min(pool, its recorded overpayment), re-allocated at its own date
    fn redistribute_overpayments(
        &self,
        loan: &mut Loan,
        model: &mut dyn InterestScheduleModel,
        ctx: &mut PassContext,
    ) -> Result<()> {
        for idx in loan.overpaid_transactions() {
            if !loan.overpayment_pool.is_positive() {
                break;
            }
            let (kind, date, recorded) = {
                let tx = loan.transaction(idx);
                (tx.kind, tx.date, tx.overpayment)
            };
            let absorb = loan.overpayment_pool.min(recorded);
            if !absorb.is_positive() {
                continue;
            }
            let rule = self.config.rules.rule_for(kind);
            let outcome = self.engine.allocate(
                kind,
                date,
                absorb,
                AllocationDirection::Pay,
                &mut loan.installments,
                &rule,
                self.model_if_recalculating(&mut *model),
            )?;
            let allocated = outcome.allocated_total();
            if !allocated.is_positive() {
                continue;
            }
            let tx = loan.transaction_mut(idx);
            for mapping in &outcome.mappings {
                let slot = tx.mapping_for_mut(mapping.installment);
                for component in ComponentType::ALL {
                    *slot.amounts.get_mut(component) += mapping.amounts.get(component);
                }
            }
            tx.overpayment = (tx.overpayment - allocated).clamp_zero();
            loan.overpayment_pool -= allocated;
            ctx.events.emit(Event::OverpaymentRedistributed {
                date,
                amount: allocated,
            });
        }
        Ok(())
    }

    /// register balance corrections for installments still overdue at the
    /// target date, so interest-bearing-while-overdue rules apply
    fn correct_trailing_interest(
        &self,
        loan: &mut Loan,
        model: &mut dyn InterestScheduleModel,
        ctx: &mut PassContext,
    ) {
        let as_of = ctx.as_of;
        let mut corrected: Vec<u32> = Vec::new();
        for installment in &loan.installments {
            if installment.due_date < as_of && !installment.is_settled() {
                let overdue = installment.principal.outstanding();
                if overdue.is_positive() {
                    model.add_balance_correction(as_of, overdue);
                    ctx.events.emit(Event::TrailingInterestCorrected {
                        due_date: installment.due_date,
                        amount: overdue,
                    });
                    corrected.push(installment.number);
                }
            }
        }
        if !self.config.interest_recalculation {
            return;
        }
        for number in corrected {
            if let Some(installment) = loan.installment_by_number_mut(number) {
                let due = model.due_amounts(installment.due_date, as_of);
                installment.refresh_due_amounts(due);
            }
        }
    }
}
