//! Event-to-posting rules.
//!
//! Each rule maps a persisted billing record onto a balanced entry through
//! a pure function, resolves the accounts it needs, and hands the result to
//! the [`JournalEngine`] inside the caller's unit of work.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::accounts::{AccountResolver, AccountRole};
use crate::error::{AccountingError, AccountingResult};
use crate::ledger::{EntryHeader, JournalEngine, LineDraft};
use crate::models::{
    Account, BillRecord, DeductionStatus, JournalEntry, PaymentRecord, PayrollDeduction, SchemeInvoice,
};
use crate::store::UnitOfWork;

/// Result of the payroll rule, which degrades instead of failing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PayrollPostingOutcome {
    Posted(JournalEntry),
    Skipped { reason: String },
}

/// Debit receivable, credit revenue for a bill's net amount.
pub fn charge_entry(
    bill: &BillRecord,
    receivable: &Account,
    revenue: &Account,
    actor: Option<Uuid>,
) -> (EntryHeader, Vec<LineDraft>) {
    let amount = bill.net_amount();
    let header = EntryHeader::new(format!("{} bill charge", bill.kind.as_str().to_uppercase()))
        .with_entry_date(bill.created_at)
        .with_reference(format!("bill:{}:{}", bill.kind, bill.id))
        .posted_by(actor);
    let lines = vec![
        LineDraft::debit(receivable.id, amount).with_memo(format!("Patient {}", bill.patient_id)),
        LineDraft::credit(revenue.id, amount),
    ];
    (header, lines)
}

/// Debit cash or bank, credit receivable for the payment amount.
pub fn payment_entry(
    payment: &PaymentRecord,
    settlement: &Account,
    receivable: &Account,
) -> (EntryHeader, Vec<LineDraft>) {
    let header = EntryHeader::new(format!("Payment received ({})", payment.payment_method.as_str()))
        .with_entry_date(payment.payment_date)
        .with_reference(format!("payment:{}", payment.id))
        .posted_by(Some(payment.received_by));
    let lines = vec![
        LineDraft::debit(settlement.id, payment.amount),
        LineDraft::credit(receivable.id, payment.amount).with_memo(format!("Patient {}", payment.patient_id)),
    ];
    (header, lines)
}

/// Debit receivable, credit service revenue for a scheme invoice total.
pub fn scheme_invoice_entry(
    invoice: &SchemeInvoice,
    receivable: &Account,
    service_revenue: &Account,
    actor: Option<Uuid>,
) -> (EntryHeader, Vec<LineDraft>) {
    let header = EntryHeader::new(format!("Scheme invoice {}", invoice.invoice_number))
        .with_entry_date(invoice.created_at)
        .with_reference(format!("scheme-invoice:{}", invoice.id))
        .posted_by(actor);
    let lines = vec![
        LineDraft::debit(receivable.id, invoice.total_amount).with_memo(format!("Scheme {}", invoice.scheme_id)),
        LineDraft::credit(service_revenue.id, invoice.total_amount),
    ];
    (header, lines)
}

/// Debit salary payable, credit staff medical receivable.
pub fn payroll_deduction_entry(
    deduction: &PayrollDeduction,
    salary_payable: &Account,
    staff_receivable: &Account,
    actor: Option<Uuid>,
) -> (EntryHeader, Vec<LineDraft>) {
    let header = EntryHeader::new(format!("Payroll deduction: {}", deduction.description))
        .with_entry_date(deduction.settled_at.unwrap_or(deduction.created_at))
        .with_reference(format!("payroll-deduction:{}", deduction.id))
        .posted_by(actor);
    let lines = vec![
        LineDraft::debit(salary_payable.id, deduction.amount),
        LineDraft::credit(staff_receivable.id, deduction.amount).with_memo(format!("Staff {}", deduction.staff_id)),
    ];
    (header, lines)
}

/// `Ok(false)` for a zero amount that needs no entry.
fn postable(amount: Decimal, what: &str) -> AccountingResult<bool> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AccountingError::InvalidEntry(format!("{what} amount {amount} is negative")));
    }
    Ok(!amount.is_zero())
}

#[derive(Debug, Clone, Default)]
pub struct PostingRules {
    resolver: AccountResolver,
    engine: JournalEngine,
}

impl PostingRules {
    pub fn new(resolver: AccountResolver) -> Self {
        Self {
            resolver,
            engine: JournalEngine::new(),
        }
    }

    pub fn resolver(&self) -> &AccountResolver {
        &self.resolver
    }

    pub fn engine(&self) -> &JournalEngine {
        &self.engine
    }

    /// # Errors
    /// `AccountNotConfigured` is fatal here: the bill must not exist without
    /// its GL trail.
    pub async fn post_charge(
        &self,
        uow: &mut dyn UnitOfWork,
        bill: &BillRecord,
        actor: Option<Uuid>,
    ) -> AccountingResult<Option<JournalEntry>> {
        if !postable(bill.net_amount(), "bill")? {
            debug!(bill_id = %bill.id, kind = %bill.kind, "Zero-amount bill, no journal entry");
            return Ok(None);
        }

        let receivable = self
            .resolver
            .resolve(uow, AccountRole::Receivable, Some(&bill.kind))
            .await?;
        let revenue = self.resolver.resolve(uow, AccountRole::Revenue, Some(&bill.kind)).await?;

        let (header, lines) = charge_entry(bill, &receivable, &revenue, actor);
        self.engine.post(uow, header, lines).await.map(Some)
    }

    /// Cash payments settle into the cash role; every other method settles
    /// into bank, or cash when no bank account is configured.
    ///
    /// The credit always goes to the general receivable. Payments carry no
    /// bill kind, so per kind receivable overrides are never credited here.
    ///
    /// # Errors
    /// `AccountNotConfigured` is fatal.
    pub async fn post_payment(
        &self,
        uow: &mut dyn UnitOfWork,
        payment: &PaymentRecord,
    ) -> AccountingResult<Option<JournalEntry>> {
        if !postable(payment.amount, "payment")? {
            debug!(payment_id = %payment.id, "Zero-amount payment, no journal entry");
            return Ok(None);
        }

        let settlement = if payment.payment_method.is_cash() {
            self.resolver.resolve(uow, AccountRole::Cash, None).await?
        } else {
            match self.resolver.try_resolve(uow, AccountRole::Bank, None).await? {
                Some(bank) => bank,
                None => self.resolver.resolve(uow, AccountRole::Cash, None).await?,
            }
        };
        let receivable = self.resolver.resolve(uow, AccountRole::Receivable, None).await?;

        let (header, lines) = payment_entry(payment, &settlement, &receivable);
        self.engine.post(uow, header, lines).await.map(Some)
    }

    /// Scheme invoices debit the scheme receivable, or the general
    /// receivable when no scheme receivable is configured.
    ///
    /// # Errors
    /// `AccountNotConfigured` is fatal.
    pub async fn post_scheme_invoice(
        &self,
        uow: &mut dyn UnitOfWork,
        invoice: &SchemeInvoice,
        actor: Option<Uuid>,
    ) -> AccountingResult<Option<JournalEntry>> {
        if !postable(invoice.total_amount, "scheme invoice")? {
            debug!(invoice_number = %invoice.invoice_number, "Zero-amount scheme invoice, no journal entry");
            return Ok(None);
        }

        let receivable = match self.resolver.try_resolve(uow, AccountRole::SchemeReceivable, None).await? {
            Some(account) => account,
            None => self.resolver.resolve(uow, AccountRole::Receivable, None).await?,
        };
        let revenue = self.resolver.resolve(uow, AccountRole::ServiceRevenue, None).await?;

        let (header, lines) = scheme_invoice_entry(invoice, &receivable, &revenue, actor);
        self.engine.post(uow, header, lines).await.map(Some)
    }

    /// Post a deduction that has just moved to `settled`.
    ///
    /// An unresolvable account is not an error: the outcome is `Skipped` and
    /// a warning is logged so the gap can be reconciled later.
    ///
    /// # Errors
    /// `InvalidEntry` when the deduction is not settled or its amount is
    /// negative; storage errors.
    pub async fn post_payroll_deduction(
        &self,
        uow: &mut dyn UnitOfWork,
        deduction: &PayrollDeduction,
        actor: Option<Uuid>,
    ) -> AccountingResult<PayrollPostingOutcome> {
        if deduction.status != DeductionStatus::Settled {
            return Err(AccountingError::InvalidEntry(format!(
                "payroll deduction {} is {}, not settled",
                deduction.id,
                deduction.status.as_str()
            )));
        }
        if !postable(deduction.amount, "payroll deduction")? {
            debug!(deduction_id = %deduction.id, "Zero-amount payroll deduction, no journal entry");
            return Ok(PayrollPostingOutcome::Skipped {
                reason: "zero amount".to_string(),
            });
        }

        let Some(salary_payable) = self
            .resolver
            .try_resolve(uow, AccountRole::SalaryPayable, None)
            .await?
        else {
            return Ok(skip(deduction, "salary payable account not resolved"));
        };

        let staff_receivable = match deduction.receivable_account_id {
            Some(account_id) => uow.find_account(account_id).await?.filter(|a| a.is_active),
            None => {
                self.resolver
                    .try_resolve(uow, AccountRole::StaffMedicalReceivable, None)
                    .await?
            }
        };
        let Some(staff_receivable) = staff_receivable else {
            return Ok(skip(deduction, "staff medical receivable account not resolved"));
        };

        let (header, lines) = payroll_deduction_entry(deduction, &salary_payable, &staff_receivable, actor);
        let entry = self.engine.post(uow, header, lines).await?;
        Ok(PayrollPostingOutcome::Posted(entry))
    }
}

fn skip(deduction: &PayrollDeduction, reason: &str) -> PayrollPostingOutcome {
    warn!(
        deduction_id = %deduction.id,
        staff_id = %deduction.staff_id,
        amount = %deduction.amount,
        reason,
        "Payroll deduction settled without a GL posting"
    );
    PayrollPostingOutcome::Skipped {
        reason: reason.to_string(),
    }
}
