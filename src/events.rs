use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{TransactionId, TransactionType};

/// all events that can be emitted during a reprocessing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PassStarted {
        as_of: NaiveDate,
        event_count: usize,
    },
    PassCompleted {
        as_of: NaiveDate,
        replaced_count: usize,
    },

    // replay events
    TransactionKept {
        id: TransactionId,
        date: NaiveDate,
    },
    TransactionReplaced {
        old_id: TransactionId,
        date: NaiveDate,
        kind: TransactionType,
    },
    TransactionRegistered {
        date: NaiveDate,
        kind: TransactionType,
    },
    UnhandledTransactionSkipped {
        kind: TransactionType,
        date: NaiveDate,
    },

    // allocation events
    OverpaymentRecorded {
        date: NaiveDate,
        amount: Money,
    },
    OverpaymentRedistributed {
        date: NaiveDate,
        amount: Money,
    },
    InstallmentSynthesized {
        number: u32,
        due_date: NaiveDate,
    },
    ChargebackCredited {
        date: NaiveDate,
        amount: Money,
        installment: u32,
    },
    TrailingInterestCorrected {
        due_date: NaiveDate,
        amount: Money,
    },
}

/// event store for collecting events during a pass
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
