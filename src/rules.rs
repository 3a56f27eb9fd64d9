use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{ReprocessError, Result};
use crate::types::{ComponentType, DueType, FutureInstallmentAllocationRule, TransactionType};

/// ordered (component, due type) pairs plus a future-installment policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRule {
    pub order: Vec<(ComponentType, DueType)>,
    pub future_rule: FutureInstallmentAllocationRule,
}

impl AllocationRule {
    pub fn new(
        order: Vec<(ComponentType, DueType)>,
        future_rule: FutureInstallmentAllocationRule,
    ) -> Self {
        AllocationRule { order, future_rule }
    }

    /// penalty, fee, interest, principal — past due, then due, then in advance
    pub fn standard() -> Self {
        let components = [
            ComponentType::Penalty,
            ComponentType::Fee,
            ComponentType::Interest,
            ComponentType::Principal,
        ];
        let mut order = Vec::new();
        for due in [DueType::PastDue, DueType::Due, DueType::InAdvance] {
            for component in components {
                order.push((component, due));
            }
        }
        AllocationRule::new(order, FutureInstallmentAllocationRule::NextInstallment)
    }

    /// group pairs by due type, preserving rule order within and across groups
    pub fn due_type_groups(&self) -> Vec<(DueType, Vec<ComponentType>)> {
        let mut groups: Vec<(DueType, Vec<ComponentType>)> = Vec::new();
        for (component, due) in &self.order {
            match groups.iter_mut().find(|(d, _)| d == due) {
                Some((_, components)) => components.push(*component),
                None => groups.push((*due, vec![*component])),
            }
        }
        groups
    }

    /// fallback for refund-like types with no explicit rule: reversed pair
    /// order, future installments forced to last-installment
    pub fn refund_fallback(&self) -> AllocationRule {
        let mut order = self.order.clone();
        order.reverse();
        AllocationRule::new(order, FutureInstallmentAllocationRule::LastInstallment)
    }
}

/// ordered component list used to re-credit a chargeback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAllocationRule {
    pub order: Vec<ComponentType>,
}

impl CreditAllocationRule {
    pub fn new(order: Vec<ComponentType>) -> Self {
        CreditAllocationRule { order }
    }

    pub fn principal_first() -> Self {
        CreditAllocationRule::new(vec![
            ComponentType::Principal,
            ComponentType::Interest,
            ComponentType::Fee,
            ComponentType::Penalty,
        ])
    }
}

/// per-transaction-type rules with a mandatory default fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRuleSet {
    default_rule: AllocationRule,
    by_type: BTreeMap<TransactionType, AllocationRule>,
    credit_rules: BTreeMap<TransactionType, CreditAllocationRule>,
}

impl AllocationRuleSet {
    pub fn new(default_rule: AllocationRule) -> Self {
        AllocationRuleSet {
            default_rule,
            by_type: BTreeMap::new(),
            credit_rules: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        AllocationRuleSet::new(AllocationRule::standard())
    }

    pub fn with_rule(mut self, kind: TransactionType, rule: AllocationRule) -> Self {
        self.by_type.insert(kind, rule);
        self
    }

    pub fn with_credit_rule(mut self, kind: TransactionType, rule: CreditAllocationRule) -> Self {
        self.credit_rules.insert(kind, rule);
        self
    }

    pub fn default_rule(&self) -> &AllocationRule {
        &self.default_rule
    }

    /// rule for a transaction type; a missing entry is a configuration gap
    /// recovered by the default rule (refund types derive their fallback)
    pub fn rule_for(&self, kind: TransactionType) -> AllocationRule {
        if let Some(rule) = self.by_type.get(&kind) {
            return rule.clone();
        }
        match kind {
            TransactionType::Refund | TransactionType::InterestRefund => {
                self.default_rule.refund_fallback()
            }
            _ => self.default_rule.clone(),
        }
    }

    pub fn credit_rule_for(&self, kind: TransactionType) -> Option<&CreditAllocationRule> {
        self.credit_rules.get(&kind)
    }

    pub fn ensure_valid(&self) -> Result<()> {
        if self.default_rule.order.is_empty() {
            return Err(ReprocessError::InvalidConfiguration {
                message: "default allocation rule has no component order".to_string(),
            });
        }
        for (kind, rule) in &self.by_type {
            if rule.order.is_empty() {
                return Err(ReprocessError::InvalidConfiguration {
                    message: format!("allocation rule for {kind:?} has no component order"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rule_orders_past_due_first() {
        let rule = AllocationRule::standard();
        assert_eq!(rule.order.len(), 12);
        assert_eq!(rule.order[0], (ComponentType::Penalty, DueType::PastDue));
        assert_eq!(rule.order[3], (ComponentType::Principal, DueType::PastDue));
        assert_eq!(rule.order[4], (ComponentType::Penalty, DueType::Due));
    }

    #[test]
    fn test_due_type_groups_preserve_order() {
        let rule = AllocationRule::new(
            vec![
                (ComponentType::Interest, DueType::Due),
                (ComponentType::Principal, DueType::Due),
                (ComponentType::Interest, DueType::InAdvance),
            ],
            FutureInstallmentAllocationRule::Reamortize,
        );
        let groups = rule.due_type_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, DueType::Due);
        assert_eq!(
            groups[0].1,
            vec![ComponentType::Interest, ComponentType::Principal]
        );
        assert_eq!(groups[1].0, DueType::InAdvance);
    }

    #[test]
    fn test_missing_rule_falls_back_to_default() {
        let rules = AllocationRuleSet::standard();
        assert_eq!(
            rules.rule_for(TransactionType::Repayment),
            AllocationRule::standard()
        );
    }

    #[test]
    fn test_refund_fallback_reverses_order_and_forces_last_installment() {
        let rules = AllocationRuleSet::standard();
        let refund = rules.rule_for(TransactionType::Refund);
        let mut expected = AllocationRule::standard().order;
        expected.reverse();
        assert_eq!(refund.order, expected);
        assert_eq!(
            refund.future_rule,
            FutureInstallmentAllocationRule::LastInstallment
        );
    }

    #[test]
    fn test_explicit_rule_wins_over_default() {
        let custom = AllocationRule::new(
            vec![(ComponentType::Principal, DueType::Due)],
            FutureInstallmentAllocationRule::LastInstallment,
        );
        let rules =
            AllocationRuleSet::standard().with_rule(TransactionType::DownPayment, custom.clone());
        assert_eq!(rules.rule_for(TransactionType::DownPayment), custom);
    }

    #[test]
    fn test_empty_default_rule_is_invalid() {
        let rules = AllocationRuleSet::new(AllocationRule::new(
            Vec::new(),
            FutureInstallmentAllocationRule::NextInstallment,
        ));
        assert!(rules.ensure_valid().is_err());
    }
}
