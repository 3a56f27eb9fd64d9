pub mod allocation;
pub mod chargeback;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod installment;
pub mod interest;
pub mod loan;
pub mod orchestrator;
pub mod replay;
pub mod rules;
pub mod timeline;
pub mod transaction;
pub mod types;

// re-export key types
pub use allocation::{AllocationEngine, AllocationOutcome};
pub use chargeback::{ChargebackAllocator, ChargebackOutcome};
pub use config::{LoanConfig, ProductTerms};
pub use decimal::{Currency, Money, Rate};
pub use errors::{ReprocessError, Result};
pub use events::{Event, EventStore};
pub use installment::{ComponentBalance, Installment};
pub use interest::{ChargeAmortizer, DueAmounts, InterestModelFactory, InterestScheduleModel};
pub use loan::{Charge, InterestRateChange, Loan, Relation};
pub use orchestrator::{Phase, ReprocessOutcome, Reprocessor};
pub use replay::{ChangeSet, ReplayReconciler};
pub use rules::{AllocationRule, AllocationRuleSet, CreditAllocationRule};
pub use timeline::{EventTimeline, LedgerEvent};
pub use transaction::{ComponentAmounts, InstallmentMapping, Transaction};
pub use types::{
    AllocationDirection, AllocationStyle, ChargeId, ComponentType, DueType,
    FutureInstallmentAllocationRule, RelationKind, TransactionId, TransactionType, TxIdx,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
