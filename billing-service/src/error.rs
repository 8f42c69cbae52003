use accounting_service::{AccountingError, DeductionStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The ledger refused the action; nothing was saved.
    #[error("could not {action}: {source}")]
    Rejected {
        action: &'static str,
        #[source]
        source: AccountingError,
    },

    #[error("Payroll deduction {deduction_id} cannot move from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition {
        deduction_id: Uuid,
        from: DeductionStatus,
        to: DeductionStatus,
    },

    #[error(transparent)]
    Accounting(#[from] AccountingError),
}

impl BillingError {
    pub fn rejected(action: &'static str, source: AccountingError) -> Self {
        Self::Rejected { action, source }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_names_the_action() {
        let err = BillingError::rejected(
            "create bill",
            AccountingError::AccountNotConfigured {
                role: "revenue".to_string(),
                code: "4000".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "could not create bill: GL account not configured for role 'revenue' (code 4000)"
        );
    }

    #[test]
    fn test_transition_message() {
        let err = BillingError::InvalidTransition {
            deduction_id: Uuid::nil(),
            from: DeductionStatus::Settled,
            to: DeductionStatus::Cancelled,
        };
        assert!(err.to_string().ends_with("from settled to cancelled"));
    }
}
