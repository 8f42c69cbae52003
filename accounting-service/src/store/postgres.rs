// PostgreSQL ledger store
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::config::DatabaseConfig;
use crate::error::{AccountingError, AccountingResult};
use crate::events::BillSource;
use crate::models::{
    Account, AgingBucket, BillRecord, DeductionStatus, JournalEntry, JournalLine, Patient,
    PatientPaymentMethod, PaymentRecord, PayrollDeduction, ReminderLog, SchemeInvoice, Shift,
};

const ACCOUNT_COLUMNS: &str =
    "id, code, name, account_type, parent_account_id, balance, is_active, created_at";
const PATIENT_COLUMNS: &str = "id, name, email, phone, payment_method, balance";
const DEDUCTION_COLUMNS: &str =
    "id, staff_id, amount, description, status, receivable_account_id, created_at, settled_at";
const SHIFT_COLUMNS: &str =
    "id, cashier_id, start_time, end_time, opening_cash, closing_cash, system_cash, status";

/// Ledger store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a pool from the database section of the engine config.
    pub async fn connect(config: &DatabaseConfig) -> AccountingResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| AccountingError::Validation("database.url is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(url)
            .await?;

        info!("Ledger database pool created");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> AccountingResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ledger migrations applied");
        Ok(())
    }

    /// Round-trip a trivial query through the pool.
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Ledger database health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> AccountingResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// One database transaction; rolled back by sqlx when dropped uncommitted
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn account_from_row(row: &PgRow) -> AccountingResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        account_type: row.try_get::<String, _>("account_type")?.parse()?,
        parent_account_id: row.try_get("parent_account_id")?,
        balance: row.try_get("balance")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn line_from_row(row: &PgRow) -> AccountingResult<JournalLine> {
    Ok(JournalLine {
        id: row.try_get("id")?,
        journal_entry_id: row.try_get("journal_entry_id")?,
        account_id: row.try_get("account_id")?,
        debit: row.try_get("debit")?,
        credit: row.try_get("credit")?,
        memo: row.try_get("memo")?,
    })
}

fn patient_from_row(row: &PgRow) -> AccountingResult<Patient> {
    Ok(Patient {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        payment_method: row.try_get::<String, _>("payment_method")?.parse()?,
        balance: row.try_get("balance")?,
    })
}

fn bill_from_row(source: &BillSource, row: &PgRow) -> AccountingResult<BillRecord> {
    Ok(BillRecord {
        id: row.try_get("id")?,
        kind: source.kind().clone(),
        patient_id: row.try_get("patient_id")?,
        gross_amount: row.try_get("gross_amount")?,
        discount_amount: row.try_get("discount_amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn deduction_from_row(row: &PgRow) -> AccountingResult<PayrollDeduction> {
    Ok(PayrollDeduction {
        id: row.try_get("id")?,
        staff_id: row.try_get("staff_id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        receivable_account_id: row.try_get("receivable_account_id")?,
        created_at: row.try_get("created_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

fn reminder_from_row(row: &PgRow) -> AccountingResult<ReminderLog> {
    Ok(ReminderLog {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        bucket: row.try_get::<String, _>("bucket")?.parse()?,
        reminder_type: row.try_get::<String, _>("reminder_type")?.parse()?,
        amount: row.try_get("amount")?,
        sent_at: row.try_get("sent_at")?,
    })
}

fn shift_from_row(row: &PgRow) -> AccountingResult<Shift> {
    Ok(Shift {
        id: row.try_get("id")?,
        cashier_id: row.try_get("cashier_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        opening_cash: row.try_get("opening_cash")?,
        closing_cash: row.try_get("closing_cash")?,
        system_cash: row.try_get("system_cash")?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_account(&mut self, account: &Account) -> AccountingResult<()> {
        let result = sqlx::query(
            "INSERT INTO accounts (id, code, name, account_type, parent_account_id, balance, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(account.id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.parent_account_id)
        .bind(account.balance)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AccountingError::Validation(format!(
                "account code {} already exists",
                account.code
            )));
        }
        Ok(())
    }

    async fn find_account(&mut self, account_id: Uuid) -> AccountingResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_code(&mut self, code: &str) -> AccountingResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE code = $1"))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_name_pattern(&mut self, pattern: &str) -> AccountingResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE is_active AND name ILIKE $1
             ORDER BY code
             LIMIT 1"
        ))
        .bind(pattern)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn lock_account(&mut self, account_id: Uuid) -> AccountingResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn adjust_account_balance(&mut self, account_id: Uuid, delta: Decimal) -> AccountingResult<()> {
        let result = sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
            .bind(account_id)
            .bind(delta)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AccountingError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }

    async fn list_accounts(&mut self) -> AccountingResult<Vec<Account>> {
        let rows = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY code"))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn next_entry_number(&mut self) -> AccountingResult<i64> {
        let row = sqlx::query("SELECT nextval('journal_entry_number_seq') AS seq")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.try_get("seq")?)
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO journal_entries
                (id, entry_number, entry_date, description, reference, status, created_by, posted_by, posted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(&entry.entry_number)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(&entry.reference)
        .bind(entry.status.as_str())
        .bind(entry.created_by)
        .bind(entry.posted_by)
        .bind(entry.posted_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_journal_line(&mut self, line: &JournalLine) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO journal_lines (id, journal_entry_id, account_id, debit, credit, memo)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(line.id)
        .bind(line.journal_entry_id)
        .bind(line.account_id)
        .bind(line.debit)
        .bind(line.credit)
        .bind(&line.memo)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn posted_lines_for_account(&mut self, account_id: Uuid) -> AccountingResult<Vec<JournalLine>> {
        let rows = sqlx::query(
            "SELECT l.id, l.journal_entry_id, l.account_id, l.debit, l.credit, l.memo
             FROM journal_lines l
             JOIN journal_entries e ON e.id = l.journal_entry_id
             WHERE l.account_id = $1 AND e.status = 'posted'
             ORDER BY e.posted_at, l.line_no",
        )
        .bind(account_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(line_from_row).collect()
    }

    async fn insert_patient(&mut self, patient: &Patient) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO patients (id, name, email, phone, payment_method, balance)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(patient.id)
        .bind(&patient.name)
        .bind(&patient.email)
        .bind(&patient.phone)
        .bind(patient.payment_method.as_str())
        .bind(patient.balance)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_patient(&mut self, patient_id: Uuid) -> AccountingResult<Option<Patient>> {
        let row = sqlx::query(&format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1"))
            .bind(patient_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(patient_from_row).transpose()
    }

    async fn lock_patient(&mut self, patient_id: Uuid) -> AccountingResult<Option<Patient>> {
        // NO KEY UPDATE leaves the key-share locks taken by bill foreign keys alone
        let row = sqlx::query(&format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1 FOR NO KEY UPDATE"))
            .bind(patient_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(patient_from_row).transpose()
    }

    async fn patient_ids(&mut self) -> AccountingResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM patients ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(AccountingError::from))
            .collect()
    }

    async fn patients_with_payment_methods(
        &mut self,
        methods: &[PatientPaymentMethod],
    ) -> AccountingResult<Vec<Patient>> {
        let methods: Vec<&str> = methods.iter().map(|m| m.as_str()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE payment_method = ANY($1) ORDER BY id"
        ))
        .bind(&methods)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(patient_from_row).collect()
    }

    async fn set_patient_balance(&mut self, patient_id: Uuid, balance: Decimal) -> AccountingResult<()> {
        let result = sqlx::query("UPDATE patients SET balance = $2 WHERE id = $1")
            .bind(patient_id)
            .bind(balance)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AccountingError::PatientNotFound(patient_id));
        }
        Ok(())
    }

    async fn insert_bill(&mut self, source: &BillSource, bill: &BillRecord) -> AccountingResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, patient_id, gross_amount, discount_amount, created_at)
             VALUES ($1, $2, $3, $4, $5)",
            source.table()
        ))
        .bind(bill.id)
        .bind(bill.patient_id)
        .bind(bill.gross_amount)
        .bind(bill.discount_amount)
        .bind(bill.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn bills_for_patient(&mut self, source: &BillSource, patient_id: Uuid) -> AccountingResult<Vec<BillRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT id, patient_id, gross_amount, discount_amount, created_at
             FROM {} WHERE patient_id = $1
             ORDER BY created_at DESC",
            source.table()
        ))
        .bind(patient_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(|r| bill_from_row(source, r)).collect()
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, patient_id, amount, payment_method, received_by, payment_date, reference)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(payment.id)
        .bind(payment.patient_id)
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(payment.received_by)
        .bind(payment.payment_date)
        .bind(&payment.reference)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn total_payments_for_patient(&mut self, patient_id: Uuid) -> AccountingResult<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM payments WHERE patient_id = $1",
        )
        .bind(patient_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("total")?)
    }

    async fn cash_received_between(
        &mut self,
        cashier_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AccountingResult<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM payments
             WHERE received_by = $1
               AND payment_method = 'cash'
               AND payment_date BETWEEN $2 AND $3",
        )
        .bind(cashier_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("total")?)
    }

    async fn insert_payroll_deduction(&mut self, deduction: &PayrollDeduction) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO payroll_deductions
                (id, staff_id, amount, description, status, receivable_account_id, created_at, settled_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(deduction.id)
        .bind(deduction.staff_id)
        .bind(deduction.amount)
        .bind(&deduction.description)
        .bind(deduction.status.as_str())
        .bind(deduction.receivable_account_id)
        .bind(deduction.created_at)
        .bind(deduction.settled_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_payroll_deduction(&mut self, deduction_id: Uuid) -> AccountingResult<Option<PayrollDeduction>> {
        let row = sqlx::query(&format!(
            "SELECT {DEDUCTION_COLUMNS} FROM payroll_deductions WHERE id = $1 FOR UPDATE"
        ))
        .bind(deduction_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(deduction_from_row).transpose()
    }

    async fn update_payroll_deduction_status(
        &mut self,
        deduction_id: Uuid,
        status: DeductionStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> AccountingResult<()> {
        let result = sqlx::query(
            "UPDATE payroll_deductions SET status = $2, settled_at = $3 WHERE id = $1",
        )
        .bind(deduction_id)
        .bind(status.as_str())
        .bind(settled_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AccountingError::DeductionNotFound(deduction_id));
        }
        Ok(())
    }

    async fn insert_scheme_invoice(&mut self, invoice: &SchemeInvoice) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO scheme_invoices (id, scheme_id, invoice_number, total_amount, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(invoice.id)
        .bind(invoice.scheme_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.total_amount)
        .bind(invoice.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn reminder_exists(&mut self, patient_id: Uuid, bucket: AgingBucket) -> AccountingResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM ar_reminder_logs WHERE patient_id = $1 AND bucket = $2) AS found",
        )
        .bind(patient_id)
        .bind(bucket.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn insert_reminder_log(&mut self, log: &ReminderLog) -> AccountingResult<bool> {
        let result = sqlx::query(
            "INSERT INTO ar_reminder_logs (id, patient_id, bucket, reminder_type, amount, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (patient_id, bucket) DO NOTHING",
        )
        .bind(log.id)
        .bind(log.patient_id)
        .bind(log.bucket.as_str())
        .bind(log.reminder_type.as_str())
        .bind(log.amount)
        .bind(log.sent_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reminder_logs_for_patient(&mut self, patient_id: Uuid) -> AccountingResult<Vec<ReminderLog>> {
        let rows = sqlx::query(
            "SELECT id, patient_id, bucket, reminder_type, amount, sent_at
             FROM ar_reminder_logs WHERE patient_id = $1 ORDER BY sent_at",
        )
        .bind(patient_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(reminder_from_row).collect()
    }

    async fn lock_cashier(&mut self, cashier_id: Uuid) -> AccountingResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(cashier_id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn open_shift_for_cashier(&mut self, cashier_id: Uuid) -> AccountingResult<Option<Shift>> {
        let row = sqlx::query(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts WHERE cashier_id = $1 AND status = 'open'"
        ))
        .bind(cashier_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(shift_from_row).transpose()
    }

    async fn insert_shift(&mut self, shift: &Shift) -> AccountingResult<()> {
        sqlx::query(
            "INSERT INTO shifts
                (id, cashier_id, start_time, end_time, opening_cash, closing_cash, system_cash, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(shift.id)
        .bind(shift.cashier_id)
        .bind(shift.start_time)
        .bind(shift.end_time)
        .bind(shift.opening_cash)
        .bind(shift.closing_cash)
        .bind(shift.system_cash)
        .bind(shift.status.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_shift(&mut self, shift_id: Uuid) -> AccountingResult<Option<Shift>> {
        let row = sqlx::query(&format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = $1 FOR UPDATE"))
            .bind(shift_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(shift_from_row).transpose()
    }

    async fn update_shift(&mut self, shift: &Shift) -> AccountingResult<()> {
        let result = sqlx::query(
            "UPDATE shifts
             SET end_time = $2, closing_cash = $3, system_cash = $4, status = $5
             WHERE id = $1",
        )
        .bind(shift.id)
        .bind(shift.end_time)
        .bind(shift.closing_cash)
        .bind(shift.system_cash)
        .bind(shift.status.as_str())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AccountingError::ShiftNotFound(shift.id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AccountingResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
