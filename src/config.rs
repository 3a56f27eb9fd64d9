use serde::{Deserialize, Serialize};

use crate::decimal::{Currency, Rate};
use crate::errors::{ReprocessError, Result};
use crate::rules::{AllocationRuleSet, CreditAllocationRule};
use crate::types::{AllocationStyle, TransactionType};

/// product terms handed to the interest model factory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductTerms {
    pub currency: Currency,
    pub annual_rate: Rate,
    pub repayment_every_months: u32,
}

impl ProductTerms {
    pub fn new(currency: Currency, annual_rate: Rate, repayment_every_months: u32) -> Self {
        ProductTerms {
            currency,
            annual_rate,
            repayment_every_months,
        }
    }
}

/// loan-level reprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanConfig {
    pub allocation_style: AllocationStyle,
    pub rules: AllocationRuleSet,
    /// when false, repayments never trigger interest re-amortization and the
    /// schedule's due amounts are taken as stored
    pub interest_recalculation: bool,
    pub terms: ProductTerms,
}

impl LoanConfig {
    /// cumulative-style product: vertical allocation, stored due amounts
    pub fn standard(terms: ProductTerms) -> Self {
        LoanConfig {
            allocation_style: AllocationStyle::Vertical,
            rules: AllocationRuleSet::standard(),
            interest_recalculation: false,
            terms,
        }
    }

    /// progressive-style product: vertical allocation, interest re-amortized
    /// after principal prepayments, chargebacks re-credited principal-first
    pub fn progressive(terms: ProductTerms) -> Self {
        LoanConfig {
            allocation_style: AllocationStyle::Vertical,
            rules: AllocationRuleSet::standard().with_credit_rule(
                TransactionType::Chargeback,
                CreditAllocationRule::principal_first(),
            ),
            interest_recalculation: true,
            terms,
        }
    }

    pub fn with_allocation_style(mut self, style: AllocationStyle) -> Self {
        self.allocation_style = style;
        self
    }

    pub fn currency(&self) -> Currency {
        self.terms.currency
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.ensure_valid()?;
        if self.terms.repayment_every_months == 0 {
            return Err(ReprocessError::InvalidConfiguration {
                message: "repayment period length must be at least one month".to_string(),
            });
        }
        if self.terms.annual_rate.as_decimal().is_sign_negative() {
            return Err(ReprocessError::InvalidConfiguration {
                message: "annual interest rate must not be negative".to_string(),
            });
        }
        Ok(())
    }
}
