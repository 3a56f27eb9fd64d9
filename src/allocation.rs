use chrono::NaiveDate;

use crate::decimal::{Currency, Money};
use crate::errors::{ReprocessError, Result};
use crate::installment::Installment;
use crate::interest::InterestScheduleModel;
use crate::rules::AllocationRule;
use crate::transaction::InstallmentMapping;
use crate::types::{
    AllocationDirection, AllocationStyle, ComponentType, DueType, FutureInstallmentAllocationRule,
    TransactionType,
};

/// result of distributing one amount across installment buckets
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub mappings: Vec<InstallmentMapping>,
    /// unprocessed remainder, e.g. an overpayment; never silently dropped
    pub remainder: Money,
}

impl AllocationOutcome {
    pub fn allocated_total(&self) -> Money {
        let currency = self.remainder.currency();
        self.mappings
            .iter()
            .fold(Money::zero(currency), |acc, m| acc + m.amounts.total())
    }
}

/// distributes a monetary amount across installments' component buckets
/// following an ordered allocation rule
pub struct AllocationEngine {
    style: AllocationStyle,
}

impl AllocationEngine {
    pub fn new(style: AllocationStyle) -> Self {
        AllocationEngine { style }
    }

    /// allocate `amount` of a `kind` transaction with the given rule;
    /// `model` is consulted for recalculation-aware loans so
    /// principal/interest payments land on the correct value date before
    /// installment caches are refreshed
    pub fn allocate(
        &self,
        kind: TransactionType,
        tx_date: NaiveDate,
        amount: Money,
        direction: AllocationDirection,
        installments: &mut [Installment],
        rule: &AllocationRule,
        mut model: Option<&mut dyn InterestScheduleModel>,
    ) -> Result<AllocationOutcome> {
        if !kind.is_allocatable() {
            return Err(ReprocessError::UnsupportedTransactionType { kind });
        }
        let currency = amount.currency();
        let mut remaining = amount;
        let mut mappings: Vec<InstallmentMapping> = Vec::new();

        match self.style {
            AllocationStyle::Vertical => {
                for (component, due) in &rule.order {
                    loop {
                        if !remaining.is_positive() {
                            break;
                        }
                        let candidates = Self::candidates(
                            installments,
                            *due,
                            tx_date,
                            rule.future_rule,
                            direction,
                            &[*component],
                        );
                        if candidates.is_empty() {
                            break;
                        }
                        let allocated = if *due == DueType::InAdvance && candidates.len() > 1 {
                            Self::allocate_even_split(
                                installments,
                                &candidates,
                                &[*component],
                                tx_date,
                                direction,
                                &mut remaining,
                                &mut mappings,
                                &mut model,
                            )
                        } else {
                            let idx = candidates[0];
                            let avail = Self::available(&installments[idx], *component, direction);
                            let portion = remaining.min(avail);
                            Self::apply(
                                installments,
                                idx,
                                *component,
                                portion,
                                tx_date,
                                direction,
                                &mut mappings,
                                &mut model,
                            );
                            remaining -= portion;
                            portion
                        };
                        if !allocated.is_positive() {
                            break;
                        }
                    }
                }
            }
            AllocationStyle::Horizontal => {
                let groups = rule.due_type_groups();
                loop {
                    if !remaining.is_positive() || !Self::any_capacity(installments, direction) {
                        break;
                    }
                    let mut progressed = false;
                    for (due, components) in &groups {
                        if !remaining.is_positive() {
                            break;
                        }
                        let candidates = Self::candidates(
                            installments,
                            *due,
                            tx_date,
                            rule.future_rule,
                            direction,
                            components,
                        );
                        if candidates.is_empty() {
                            continue;
                        }
                        let allocated = if *due == DueType::InAdvance && candidates.len() > 1 {
                            Self::allocate_even_split(
                                installments,
                                &candidates,
                                components,
                                tx_date,
                                direction,
                                &mut remaining,
                                &mut mappings,
                                &mut model,
                            )
                        } else {
                            let mut swept = Money::zero(currency);
                            for idx in candidates {
                                for component in components {
                                    if !remaining.is_positive() {
                                        break;
                                    }
                                    let avail =
                                        Self::available(&installments[idx], *component, direction);
                                    let portion = remaining.min(avail);
                                    if portion.is_positive() {
                                        Self::apply(
                                            installments,
                                            idx,
                                            *component,
                                            portion,
                                            tx_date,
                                            direction,
                                            &mut mappings,
                                            &mut model,
                                        );
                                        remaining -= portion;
                                        swept += portion;
                                    }
                                }
                            }
                            swept
                        };
                        if allocated.is_positive() {
                            progressed = true;
                        }
                    }
                    if !progressed {
                        break;
                    }
                }
            }
        }

        Ok(AllocationOutcome {
            mappings,
            remainder: remaining,
        })
    }

    /// installments eligible for a due type, in schedule order
    fn candidates(
        installments: &[Installment],
        due: DueType,
        tx_date: NaiveDate,
        future_rule: FutureInstallmentAllocationRule,
        direction: AllocationDirection,
        components: &[ComponentType],
    ) -> Vec<usize> {
        let has_capacity = |inst: &Installment| {
            components
                .iter()
                .any(|c| Self::available(inst, *c, direction).is_positive())
        };
        match due {
            DueType::PastDue => installments
                .iter()
                .enumerate()
                .filter(|(_, i)| i.due_date < tx_date && has_capacity(i))
                .map(|(idx, _)| idx)
                .collect(),
            DueType::Due => installments
                .iter()
                .enumerate()
                .filter(|(_, i)| i.due_date == tx_date && has_capacity(i))
                .map(|(idx, _)| idx)
                .collect(),
            DueType::InAdvance => {
                let future: Vec<usize> = installments
                    .iter()
                    .enumerate()
                    .filter(|(_, i)| i.due_date > tx_date && has_capacity(i))
                    .map(|(idx, _)| idx)
                    .collect();
                match future_rule {
                    FutureInstallmentAllocationRule::Reamortize => future,
                    FutureInstallmentAllocationRule::NextInstallment => {
                        future.into_iter().take(1).collect()
                    }
                    FutureInstallmentAllocationRule::LastInstallment => {
                        future.into_iter().last().into_iter().collect()
                    }
                }
            }
        }
    }

    /// split the remaining amount evenly across the selected installments,
    /// residue on the last; caps carry the excess back into `remaining`
    #[allow(clippy::too_many_arguments)]
    fn allocate_even_split(
        installments: &mut [Installment],
        selected: &[usize],
        components: &[ComponentType],
        tx_date: NaiveDate,
        direction: AllocationDirection,
        remaining: &mut Money,
        mappings: &mut Vec<InstallmentMapping>,
        model: &mut Option<&mut dyn InterestScheduleModel>,
    ) -> Money {
        let shares = remaining.split_even(selected.len());
        let mut allocated = Money::zero(remaining.currency());
        for (k, idx) in selected.iter().enumerate() {
            let mut budget = shares[k];
            for component in components {
                if !budget.is_positive() {
                    break;
                }
                let avail = Self::available(&installments[*idx], *component, direction);
                let portion = budget.min(avail);
                if portion.is_positive() {
                    Self::apply(
                        installments,
                        *idx,
                        *component,
                        portion,
                        tx_date,
                        direction,
                        mappings,
                        model,
                    );
                    budget -= portion;
                    allocated += portion;
                }
            }
        }
        *remaining -= allocated;
        allocated
    }

    fn available(
        installment: &Installment,
        component: ComponentType,
        direction: AllocationDirection,
    ) -> Money {
        match direction {
            AllocationDirection::Pay => installment.component(component).outstanding(),
            AllocationDirection::Unpay => installment.component(component).paid,
        }
    }

    fn any_capacity(installments: &[Installment], direction: AllocationDirection) -> bool {
        installments.iter().any(|i| match direction {
            AllocationDirection::Pay => i.total_outstanding().is_positive(),
            AllocationDirection::Unpay => i.total_paid().is_positive(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        installments: &mut [Installment],
        idx: usize,
        component: ComponentType,
        portion: Money,
        tx_date: NaiveDate,
        direction: AllocationDirection,
        mappings: &mut Vec<InstallmentMapping>,
        model: &mut Option<&mut dyn InterestScheduleModel>,
    ) {
        let inst = &mut installments[idx];
        match direction {
            AllocationDirection::Pay => {
                inst.component_mut(component).paid += portion;
                if let Some(m) = model.as_deref_mut() {
                    match component {
                        ComponentType::Principal => {
                            m.pay_principal(inst.due_date, tx_date, portion);
                        }
                        ComponentType::Interest => {
                            m.pay_interest(inst.due_date, tx_date, portion);
                        }
                        ComponentType::Fee | ComponentType::Penalty => {}
                    }
                    if matches!(component, ComponentType::Principal | ComponentType::Interest) {
                        let due = m.due_amounts(inst.due_date, tx_date);
                        inst.refresh_due_amounts(due);
                    }
                }
            }
            AllocationDirection::Unpay => {
                inst.component_mut(component).paid =
                    (inst.component(component).paid - portion).clamp_zero();
            }
        }
        inst.refresh_obligations_met(tx_date);
        Self::record(mappings, inst.number, inst.currency(), component, portion);
    }

    /// unpay portions are recorded positive as well; the transaction type
    /// carries the direction
    fn record(
        mappings: &mut Vec<InstallmentMapping>,
        number: u32,
        currency: Currency,
        component: ComponentType,
        portion: Money,
    ) {
        let mapping = match mappings.iter_mut().find(|m| m.installment == number) {
            Some(m) => m,
            None => {
                mappings.push(InstallmentMapping::zero(number, currency));
                mappings.sort_by_key(|m| m.installment);
                mappings
                    .iter_mut()
                    .find(|m| m.installment == number)
                    .expect("mapping was just inserted")
            }
        };
        *mapping.amounts.get_mut(component) += portion;
    }
}
