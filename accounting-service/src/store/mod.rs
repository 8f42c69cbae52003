//! Persistence seam for the ledger engine.
//!
//! Every business action runs inside one [`UnitOfWork`]: the record write, the
//! journal posting and the balance recompute all commit together or not at
//! all. Dropping a unit of work without calling [`UnitOfWork::commit`] rolls
//! it back.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AccountingResult;
use crate::events::BillSource;
use crate::models::{
    Account, AgingBucket, BillRecord, DeductionStatus, JournalEntry, JournalLine, Patient,
    PatientPaymentMethod, PaymentRecord, PayrollDeduction, ReminderLog, SchemeInvoice, Shift,
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new unit of work (a database transaction).
    async fn begin(&self) -> AccountingResult<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    // -- chart of accounts --------------------------------------------------

    async fn insert_account(&mut self, account: &Account) -> AccountingResult<()>;

    async fn find_account(&mut self, account_id: Uuid) -> AccountingResult<Option<Account>>;

    async fn find_account_by_code(&mut self, code: &str) -> AccountingResult<Option<Account>>;

    /// First active account (by code) whose name matches a case-insensitive
    /// SQL `LIKE` pattern.
    async fn find_account_by_name_pattern(&mut self, pattern: &str) -> AccountingResult<Option<Account>>;

    /// Fetch an account and hold its row lock until the unit of work ends.
    async fn lock_account(&mut self, account_id: Uuid) -> AccountingResult<Option<Account>>;

    async fn adjust_account_balance(&mut self, account_id: Uuid, delta: Decimal) -> AccountingResult<()>;

    async fn list_accounts(&mut self) -> AccountingResult<Vec<Account>>;

    // -- journal ------------------------------------------------------------

    async fn next_entry_number(&mut self) -> AccountingResult<i64>;

    /// Header only; lines are written with [`UnitOfWork::insert_journal_line`].
    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> AccountingResult<()>;

    async fn insert_journal_line(&mut self, line: &JournalLine) -> AccountingResult<()>;

    /// All lines of posted entries against an account, oldest first.
    async fn posted_lines_for_account(&mut self, account_id: Uuid) -> AccountingResult<Vec<JournalLine>>;

    // -- patients and billing records ---------------------------------------

    async fn insert_patient(&mut self, patient: &Patient) -> AccountingResult<()>;

    async fn find_patient(&mut self, patient_id: Uuid) -> AccountingResult<Option<Patient>>;

    /// Fetch a patient and hold its row lock until the unit of work ends.
    async fn lock_patient(&mut self, patient_id: Uuid) -> AccountingResult<Option<Patient>>;

    async fn patient_ids(&mut self) -> AccountingResult<Vec<Uuid>>;

    async fn patients_with_payment_methods(
        &mut self,
        methods: &[PatientPaymentMethod],
    ) -> AccountingResult<Vec<Patient>>;

    /// Overwrite the cached balance; `PatientNotFound` if the patient is gone.
    async fn set_patient_balance(&mut self, patient_id: Uuid, balance: Decimal) -> AccountingResult<()>;

    async fn insert_bill(&mut self, source: &BillSource, bill: &BillRecord) -> AccountingResult<()>;

    async fn bills_for_patient(&mut self, source: &BillSource, patient_id: Uuid) -> AccountingResult<Vec<BillRecord>>;

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> AccountingResult<()>;

    async fn total_payments_for_patient(&mut self, patient_id: Uuid) -> AccountingResult<Decimal>;

    /// Sum of cash payments taken by `cashier_id` with `from <= payment_date <= to`.
    async fn cash_received_between(
        &mut self,
        cashier_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AccountingResult<Decimal>;

    async fn insert_payroll_deduction(&mut self, deduction: &PayrollDeduction) -> AccountingResult<()>;

    async fn lock_payroll_deduction(&mut self, deduction_id: Uuid) -> AccountingResult<Option<PayrollDeduction>>;

    async fn update_payroll_deduction_status(
        &mut self,
        deduction_id: Uuid,
        status: DeductionStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> AccountingResult<()>;

    async fn insert_scheme_invoice(&mut self, invoice: &SchemeInvoice) -> AccountingResult<()>;

    // -- reminders ----------------------------------------------------------

    async fn reminder_exists(&mut self, patient_id: Uuid, bucket: AgingBucket) -> AccountingResult<bool>;

    /// Returns `false` when a row for `(patient_id, bucket)` already exists.
    async fn insert_reminder_log(&mut self, log: &ReminderLog) -> AccountingResult<bool>;

    async fn reminder_logs_for_patient(&mut self, patient_id: Uuid) -> AccountingResult<Vec<ReminderLog>>;

    // -- shifts -------------------------------------------------------------

    /// Serialize shift changes for one cashier until the unit of work ends.
    async fn lock_cashier(&mut self, cashier_id: Uuid) -> AccountingResult<()>;

    async fn open_shift_for_cashier(&mut self, cashier_id: Uuid) -> AccountingResult<Option<Shift>>;

    async fn insert_shift(&mut self, shift: &Shift) -> AccountingResult<()>;

    async fn lock_shift(&mut self, shift_id: Uuid) -> AccountingResult<Option<Shift>>;

    async fn update_shift(&mut self, shift: &Shift) -> AccountingResult<()>;

    // -- unit of work -------------------------------------------------------

    async fn commit(self: Box<Self>) -> AccountingResult<()>;
}
