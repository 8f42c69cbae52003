//! Serializable run reports handed back to operators.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single patient that could not be processed in a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFailure {
    pub patient_id: Uuid,
    pub error: String,
}

/// Outcome of a bulk balance recompute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<PatientFailure>,
}

impl AggregationReport {
    pub fn record_failure(&mut self, patient_id: Uuid, error: impl ToString) {
        self.failed += 1;
        self.details.push(PatientFailure {
            patient_id,
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of one aging and reminder run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingRunReport {
    pub run_date: NaiveDate,
    pub patients_scanned: usize,
    pub skipped_no_balance: usize,
    pub not_overdue: usize,
    pub reminders_sent: usize,
    pub already_reminded: usize,
    pub delivery_failures: usize,
    pub errors: Vec<PatientFailure>,
}

impl AgingRunReport {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            patients_scanned: 0,
            skipped_no_balance: 0,
            not_overdue: 0,
            reminders_sent: 0,
            already_reminded: 0,
            delivery_failures: 0,
            errors: Vec::new(),
        }
    }
}

/// Stored account balance against the balance replayed from its postings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAudit {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub stored: Decimal,
    pub recomputed: Decimal,
    pub matches: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Codes inserted by this run
    pub created: Vec<String>,
    pub existing: usize,
}
