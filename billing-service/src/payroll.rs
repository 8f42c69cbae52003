use accounting_service::{DeductionStatus, EventPosting, PayrollDeduction};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::check_money;

/// Staff medical charge to be recovered through payroll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollDeductionRequest {
    pub staff_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    /// Overrides the configured staff medical receivable account
    pub receivable_account_id: Option<Uuid>,
}

impl PayrollDeductionRequest {
    pub fn new(staff_id: Uuid, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            staff_id,
            amount,
            description: description.into(),
            receivable_account_id: None,
        }
    }

    pub fn with_receivable_account(mut self, account_id: Uuid) -> Self {
        self.receivable_account_id = Some(account_id);
        self
    }

    /// # Errors
    /// `Validation` for a negative or sub-cent amount.
    pub fn into_pending(self) -> BillingResult<PayrollDeduction> {
        check_money("deduction amount", self.amount)?;
        Ok(PayrollDeduction {
            id: Uuid::new_v4(),
            staff_id: self.staff_id,
            amount: self.amount,
            description: self.description,
            status: DeductionStatus::Pending,
            receivable_account_id: self.receivable_account_id,
            created_at: Utc::now(),
            settled_at: None,
        })
    }
}

/// Result of asking for a deduction to be settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled {
        deduction: PayrollDeduction,
        posting: EventPosting,
    },
    /// Already settled earlier; nothing was posted
    AlreadySettled { deduction: PayrollDeduction },
}

/// `pending -> settled` and `pending -> cancelled` are the only moves.
///
/// # Errors
/// `InvalidTransition` for anything else.
pub fn check_transition(deduction: &PayrollDeduction, to: DeductionStatus) -> BillingResult<()> {
    match (deduction.status, to) {
        (DeductionStatus::Pending, DeductionStatus::Settled | DeductionStatus::Cancelled) => Ok(()),
        (from, to) => Err(BillingError::InvalidTransition {
            deduction_id: deduction.id,
            from,
            to,
        }),
    }
}
