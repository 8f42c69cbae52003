use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AccountingError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A journal line is malformed (negative amount, both sides set, too few lines).
    #[error("Invalid journal entry: {0}")]
    InvalidEntry(String),

    #[error("Unbalanced journal entry: debits {debits} != credits {credits}")]
    UnbalancedEntry { debits: Decimal, credits: Decimal },

    #[error("GL account not configured for role '{role}' (code {code})")]
    AccountNotConfigured { role: String, code: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account {0} is inactive")]
    AccountInactive(String),

    #[error("Cashier {cashier_id} already has open shift {shift_id}")]
    ShiftAlreadyOpen { cashier_id: Uuid, shift_id: Uuid },

    #[error("Shift not found: {0}")]
    ShiftNotFound(Uuid),

    #[error("Shift {0} is not open")]
    ShiftNotOpen(Uuid),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Payroll deduction not found: {0}")]
    DeductionNotFound(Uuid),

    #[error("No bill source registered for kind '{0}'")]
    UnknownBillKind(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AccountingError {
    /// Errors that would leave the ledger inconsistent if the enclosing
    /// business action were allowed to commit.
    pub fn is_ledger_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnbalancedEntry { .. }
                | Self::InvalidEntry(_)
                | Self::AccountNotConfigured { .. }
                | Self::AccountNotFound(_)
                | Self::AccountInactive(_)
                | Self::UnknownBillKind(_)
                | Self::Database(_)
                | Self::Storage(_)
        )
    }
}

pub type AccountingResult<T> = Result<T, AccountingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fatal_classification() {
        let unbalanced = AccountingError::UnbalancedEntry {
            debits: dec!(10),
            credits: dec!(9),
        };
        assert!(unbalanced.is_ledger_fatal());
        assert!(AccountingError::AccountNotConfigured {
            role: "revenue".to_string(),
            code: "4000".to_string(),
        }
        .is_ledger_fatal());
        assert!(!AccountingError::ShiftNotOpen(Uuid::nil()).is_ledger_fatal());
        assert!(!AccountingError::Validation("bad input".to_string()).is_ledger_fatal());
    }

    #[test]
    fn test_messages_are_operator_readable() {
        let err = AccountingError::AccountNotConfigured {
            role: "revenue".to_string(),
            code: "4000".to_string(),
        };
        assert_eq!(err.to_string(), "GL account not configured for role 'revenue' (code 4000)");
    }
}
