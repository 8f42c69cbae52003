//! In-process ledger store.
//!
//! Units of work are fully serialized: `begin` takes the store-wide lock and
//! works on a private copy of the state, `commit` swaps the copy in. Dropping
//! a unit of work discards the copy, which is a rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::error::{AccountingError, AccountingResult};
use crate::events::BillSource;
use crate::models::{
    Account, AgingBucket, BillRecord, DeductionStatus, JournalEntry, JournalLine, JournalStatus,
    Patient, PatientPaymentMethod, PaymentRecord, PayrollDeduction, ReminderLog, SchemeInvoice,
    Shift, ShiftStatus,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<Uuid, Account>,
    /// Headers; lines live in `lines`
    entries: Vec<JournalEntry>,
    lines: Vec<JournalLine>,
    entry_seq: i64,
    patients: BTreeMap<Uuid, Patient>,
    /// (source table, bill)
    bills: Vec<(String, BillRecord)>,
    payments: Vec<PaymentRecord>,
    deductions: BTreeMap<Uuid, PayrollDeduction>,
    invoices: Vec<SchemeInvoice>,
    reminders: Vec<ReminderLog>,
    shifts: BTreeMap<Uuid, Shift>,
}

impl MemoryState {
    fn entry_with_lines(&self, header: &JournalEntry) -> JournalEntry {
        let mut entry = header.clone();
        entry.lines = self
            .lines
            .iter()
            .filter(|l| l.journal_entry_id == header.id)
            .cloned()
            .collect();
        entry
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Countdown to a failing journal-line write; 0 disables.
    line_write: AtomicUsize,
    commit: AtomicBool,
}

impl Faults {
    fn trip_line_write(&self) -> bool {
        let previous = self
            .line_write
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        matches!(previous, Ok(1))
    }

    fn trip_commit(&self) -> bool {
        self.commit.swap(false, Ordering::SeqCst)
    }
}

/// Ledger store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th journal-line write from now fail (1 = the next one).
    pub fn fail_journal_line_write(&self, n: usize) {
        self.faults.line_write.store(n, Ordering::SeqCst);
    }

    /// Make the next commit fail after all writes succeeded.
    pub fn fail_next_commit(&self) {
        self.faults.commit.store(true, Ordering::SeqCst);
    }

    /// Committed journal entries with their lines, in posting order.
    pub async fn journal_entries(&self) -> Vec<JournalEntry> {
        let state = self.state.lock().await;
        state.entries.iter().map(|e| state.entry_with_lines(e)).collect()
    }

    pub async fn account_by_code(&self, code: &str) -> Option<Account> {
        let state = self.state.lock().await;
        state.accounts.values().find(|a| a.code == code).cloned()
    }

    pub async fn patient(&self, patient_id: Uuid) -> Option<Patient> {
        self.state.lock().await.patients.get(&patient_id).cloned()
    }

    pub async fn reminder_logs(&self) -> Vec<ReminderLog> {
        self.state.lock().await.reminders.clone()
    }

    pub async fn bill_count(&self) -> usize {
        self.state.lock().await.bills.len()
    }

    pub async fn payroll_deduction(&self, deduction_id: Uuid) -> Option<PayrollDeduction> {
        self.state.lock().await.deductions.get(&deduction_id).cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> AccountingResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

/// Case-insensitive SQL `LIKE` with `%` wildcards (`_` is matched literally).
fn ilike(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let last = parts.len() - 1;
    let mut rest = value.as_str();
    for (index, part) in parts.iter().enumerate() {
        if index == 0 {
            match rest.strip_prefix(part) {
                Some(remaining) => rest = remaining,
                None => return false,
            }
        } else if index == last {
            return rest.ends_with(part);
        } else if let Some(found) = rest.find(part) {
            rest = rest.get(found + part.len()..).unwrap_or_default();
        } else {
            return false;
        }
    }
    true
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_account(&mut self, account: &Account) -> AccountingResult<()> {
        if self.working.accounts.values().any(|a| a.code == account.code) {
            return Err(AccountingError::Validation(format!(
                "account code {} already exists",
                account.code
            )));
        }
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&mut self, account_id: Uuid) -> AccountingResult<Option<Account>> {
        Ok(self.working.accounts.get(&account_id).cloned())
    }

    async fn find_account_by_code(&mut self, code: &str) -> AccountingResult<Option<Account>> {
        Ok(self.working.accounts.values().find(|a| a.code == code).cloned())
    }

    async fn find_account_by_name_pattern(&mut self, pattern: &str) -> AccountingResult<Option<Account>> {
        let mut matches: Vec<&Account> = self
            .working
            .accounts
            .values()
            .filter(|a| a.is_active && ilike(pattern, &a.name))
            .collect();
        matches.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(matches.first().map(|a| (*a).clone()))
    }

    async fn lock_account(&mut self, account_id: Uuid) -> AccountingResult<Option<Account>> {
        // The whole store is already locked by this unit of work.
        Ok(self.working.accounts.get(&account_id).cloned())
    }

    async fn adjust_account_balance(&mut self, account_id: Uuid, delta: Decimal) -> AccountingResult<()> {
        let account = self
            .working
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| AccountingError::AccountNotFound(account_id.to_string()))?;
        account.balance += delta;
        Ok(())
    }

    async fn list_accounts(&mut self) -> AccountingResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.working.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn next_entry_number(&mut self) -> AccountingResult<i64> {
        self.working.entry_seq += 1;
        Ok(self.working.entry_seq)
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> AccountingResult<()> {
        if self.working.entries.iter().any(|e| e.entry_number == entry.entry_number) {
            return Err(AccountingError::Storage(format!(
                "duplicate entry number {}",
                entry.entry_number
            )));
        }
        let mut header = entry.clone();
        header.lines.clear();
        self.working.entries.push(header);
        Ok(())
    }

    async fn insert_journal_line(&mut self, line: &JournalLine) -> AccountingResult<()> {
        if self.faults.trip_line_write() {
            return Err(AccountingError::Storage("journal line write failed".to_string()));
        }
        self.working.lines.push(line.clone());
        Ok(())
    }

    async fn posted_lines_for_account(&mut self, account_id: Uuid) -> AccountingResult<Vec<JournalLine>> {
        let state = &self.working;
        Ok(state
            .lines
            .iter()
            .filter(|l| l.account_id == account_id)
            .filter(|l| {
                state
                    .entries
                    .iter()
                    .any(|e| e.id == l.journal_entry_id && e.status == JournalStatus::Posted)
            })
            .cloned()
            .collect())
    }

    async fn insert_patient(&mut self, patient: &Patient) -> AccountingResult<()> {
        self.working.patients.insert(patient.id, patient.clone());
        Ok(())
    }

    async fn find_patient(&mut self, patient_id: Uuid) -> AccountingResult<Option<Patient>> {
        Ok(self.working.patients.get(&patient_id).cloned())
    }

    // Units of work are already serialized by the store mutex
    async fn lock_patient(&mut self, patient_id: Uuid) -> AccountingResult<Option<Patient>> {
        Ok(self.working.patients.get(&patient_id).cloned())
    }

    async fn patient_ids(&mut self) -> AccountingResult<Vec<Uuid>> {
        Ok(self.working.patients.keys().copied().collect())
    }

    async fn patients_with_payment_methods(
        &mut self,
        methods: &[PatientPaymentMethod],
    ) -> AccountingResult<Vec<Patient>> {
        Ok(self
            .working
            .patients
            .values()
            .filter(|p| methods.contains(&p.payment_method))
            .cloned()
            .collect())
    }

    async fn set_patient_balance(&mut self, patient_id: Uuid, balance: Decimal) -> AccountingResult<()> {
        let patient = self
            .working
            .patients
            .get_mut(&patient_id)
            .ok_or(AccountingError::PatientNotFound(patient_id))?;
        patient.balance = balance;
        Ok(())
    }

    async fn insert_bill(&mut self, source: &BillSource, bill: &BillRecord) -> AccountingResult<()> {
        self.working.bills.push((source.table().to_string(), bill.clone()));
        Ok(())
    }

    async fn bills_for_patient(&mut self, source: &BillSource, patient_id: Uuid) -> AccountingResult<Vec<BillRecord>> {
        Ok(self
            .working
            .bills
            .iter()
            .filter(|(table, b)| table == source.table() && b.patient_id == patient_id)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> AccountingResult<()> {
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn total_payments_for_patient(&mut self, patient_id: Uuid) -> AccountingResult<Decimal> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.patient_id == patient_id)
            .map(|p| p.amount)
            .sum())
    }

    async fn cash_received_between(
        &mut self,
        cashier_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AccountingResult<Decimal> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.received_by == cashier_id && p.payment_method.is_cash())
            .filter(|p| p.payment_date >= from && p.payment_date <= to)
            .map(|p| p.amount)
            .sum())
    }

    async fn insert_payroll_deduction(&mut self, deduction: &PayrollDeduction) -> AccountingResult<()> {
        self.working.deductions.insert(deduction.id, deduction.clone());
        Ok(())
    }

    async fn lock_payroll_deduction(&mut self, deduction_id: Uuid) -> AccountingResult<Option<PayrollDeduction>> {
        Ok(self.working.deductions.get(&deduction_id).cloned())
    }

    async fn update_payroll_deduction_status(
        &mut self,
        deduction_id: Uuid,
        status: DeductionStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> AccountingResult<()> {
        let deduction = self
            .working
            .deductions
            .get_mut(&deduction_id)
            .ok_or(AccountingError::DeductionNotFound(deduction_id))?;
        deduction.status = status;
        deduction.settled_at = settled_at;
        Ok(())
    }

    async fn insert_scheme_invoice(&mut self, invoice: &SchemeInvoice) -> AccountingResult<()> {
        self.working.invoices.push(invoice.clone());
        Ok(())
    }

    async fn reminder_exists(&mut self, patient_id: Uuid, bucket: AgingBucket) -> AccountingResult<bool> {
        Ok(self
            .working
            .reminders
            .iter()
            .any(|r| r.patient_id == patient_id && r.bucket == bucket))
    }

    async fn insert_reminder_log(&mut self, log: &ReminderLog) -> AccountingResult<bool> {
        if self.reminder_exists(log.patient_id, log.bucket).await? {
            return Ok(false);
        }
        self.working.reminders.push(log.clone());
        Ok(true)
    }

    async fn reminder_logs_for_patient(&mut self, patient_id: Uuid) -> AccountingResult<Vec<ReminderLog>> {
        Ok(self
            .working
            .reminders
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn lock_cashier(&mut self, _cashier_id: Uuid) -> AccountingResult<()> {
        Ok(())
    }

    async fn open_shift_for_cashier(&mut self, cashier_id: Uuid) -> AccountingResult<Option<Shift>> {
        Ok(self
            .working
            .shifts
            .values()
            .find(|s| s.cashier_id == cashier_id && s.status == ShiftStatus::Open)
            .cloned())
    }

    async fn insert_shift(&mut self, shift: &Shift) -> AccountingResult<()> {
        self.working.shifts.insert(shift.id, shift.clone());
        Ok(())
    }

    async fn lock_shift(&mut self, shift_id: Uuid) -> AccountingResult<Option<Shift>> {
        Ok(self.working.shifts.get(&shift_id).cloned())
    }

    async fn update_shift(&mut self, shift: &Shift) -> AccountingResult<()> {
        let existing = self
            .working
            .shifts
            .get_mut(&shift.id)
            .ok_or(AccountingError::ShiftNotFound(shift.id))?;
        *existing = shift.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AccountingResult<()> {
        let MemoryUnitOfWork { mut guard, working, faults } = *self;
        if faults.trip_commit() {
            return Err(AccountingError::Storage("commit failed".to_string()));
        }
        *guard = working;
        Ok(())
    }
}
