use accounting_service::{
    AccountingError, AccountingService, BillRecord, BillingEvent, DeductionStatus, EventPosting, LedgerStore,
    Patient, PaymentRecord, PayrollDeduction, SchemeInvoice, UnitOfWork,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::BillDocument;
use crate::payment::PaymentRequest;
use crate::payroll::{check_transition, PayrollDeductionRequest, SettlementOutcome};
use crate::schemes::SchemeInvoiceRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillReceipt {
    pub bill: BillRecord,
    pub posting: EventPosting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: PaymentRecord,
    pub posting: EventPosting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReceipt {
    pub invoice: SchemeInvoice,
    pub posting: EventPosting,
}

/// Billing service
///
/// Each action is one unit of work: persist the record, let the ledger post
/// it, commit. If the ledger refuses, the record is not saved either.
pub struct BillingService {
    store: Arc<dyn LedgerStore>,
    accounting: AccountingService,
}

impl BillingService {
    pub fn new(store: Arc<dyn LedgerStore>, accounting: AccountingService) -> Self {
        Self { store, accounting }
    }

    pub fn accounting(&self) -> &AccountingService {
        &self.accounting
    }

    /// # Errors
    /// `Validation` when the patient record is malformed; storage errors.
    pub async fn register_patient(&self, patient: &Patient) -> BillingResult<()> {
        if patient.name.trim().is_empty() {
            return Err(BillingError::Validation("patient name is required".to_string()));
        }
        let mut uow = self.store.begin().await?;
        uow.insert_patient(patient).await?;
        uow.commit().await?;
        Ok(())
    }

    /// Create a bill and post its charge.
    ///
    /// # Errors
    /// `Validation` for a malformed bill; `Rejected` when the ledger cannot
    /// post the charge (for example an unconfigured revenue account).
    pub async fn create_bill(&self, bill: &dyn BillDocument, actor: Option<Uuid>) -> BillingResult<BillReceipt> {
        bill.validate()?;
        let record = bill.to_record();
        let source = self.accounting.aggregator().registry().source_for(&record.kind)?.clone();

        let mut uow = self.store.begin().await?;
        require_patient(uow.as_mut(), record.patient_id).await?;
        uow.insert_bill(&source, &record).await?;
        let posting = self
            .accounting
            .notify_billing_event(uow.as_mut(), &BillingEvent::BillCreated(record.clone()), actor)
            .await
            .map_err(|e| BillingError::rejected("create bill", e))?;
        uow.commit().await?;

        info!(
            bill_id = %record.id,
            kind = %record.kind,
            patient_id = %record.patient_id,
            net_amount = %record.net_amount(),
            "Bill created"
        );
        Ok(BillReceipt { bill: record, posting })
    }

    /// # Errors
    /// `Validation` for a bad amount; `Rejected` when the ledger cannot post.
    pub async fn record_payment(&self, request: PaymentRequest) -> BillingResult<PaymentReceipt> {
        let payment = request.into_record()?;

        let mut uow = self.store.begin().await?;
        require_patient(uow.as_mut(), payment.patient_id).await?;
        uow.insert_payment(&payment).await?;
        let posting = self
            .accounting
            .notify_billing_event(uow.as_mut(), &BillingEvent::PaymentReceived(payment.clone()), None)
            .await
            .map_err(|e| BillingError::rejected("record payment", e))?;
        uow.commit().await?;

        info!(
            payment_id = %payment.id,
            patient_id = %payment.patient_id,
            amount = %payment.amount,
            method = payment.payment_method.as_str(),
            "Payment recorded"
        );
        Ok(PaymentReceipt { payment, posting })
    }

    /// Record a pending deduction. Nothing is posted until it settles.
    ///
    /// # Errors
    /// `Validation` for a bad amount; storage errors.
    pub async fn create_payroll_deduction(&self, request: PayrollDeductionRequest) -> BillingResult<PayrollDeduction> {
        let deduction = request.into_pending()?;
        let mut uow = self.store.begin().await?;
        uow.insert_payroll_deduction(&deduction).await?;
        uow.commit().await?;
        Ok(deduction)
    }

    /// Settle a pending deduction and post it. Settling twice is a no-op.
    ///
    /// An unresolvable payroll account does not block settlement: the
    /// posting is skipped and reported in the outcome.
    ///
    /// # Errors
    /// `DeductionNotFound`; `InvalidTransition` for a cancelled deduction;
    /// `Rejected` for a fatal ledger error.
    pub async fn settle_payroll_deduction(
        &self,
        deduction_id: Uuid,
        actor: Option<Uuid>,
    ) -> BillingResult<SettlementOutcome> {
        let mut uow = self.store.begin().await?;
        let mut deduction = lock_deduction(uow.as_mut(), deduction_id).await?;
        if deduction.status == DeductionStatus::Settled {
            return Ok(SettlementOutcome::AlreadySettled { deduction });
        }
        check_transition(&deduction, DeductionStatus::Settled)?;

        let settled_at = Utc::now();
        uow.update_payroll_deduction_status(deduction_id, DeductionStatus::Settled, Some(settled_at))
            .await?;
        deduction.status = DeductionStatus::Settled;
        deduction.settled_at = Some(settled_at);

        let posting = self
            .accounting
            .notify_billing_event(
                uow.as_mut(),
                &BillingEvent::PayrollDeductionSettled(deduction.clone()),
                actor,
            )
            .await
            .map_err(|e| BillingError::rejected("settle payroll deduction", e))?;
        uow.commit().await?;

        if deduction.amount.is_zero() {
            debug!(deduction_id = %deduction_id, "Zero-amount payroll deduction settled");
        } else if let Some(reason) = &posting.skipped_posting {
            warn!(
                deduction_id = %deduction_id,
                reason = %reason,
                "Payroll deduction settled without a journal entry"
            );
        } else {
            info!(deduction_id = %deduction_id, amount = %deduction.amount, "Payroll deduction settled");
        }
        Ok(SettlementOutcome::Settled { deduction, posting })
    }

    /// # Errors
    /// `DeductionNotFound`; `InvalidTransition` unless the deduction is pending.
    pub async fn cancel_payroll_deduction(&self, deduction_id: Uuid) -> BillingResult<PayrollDeduction> {
        let mut uow = self.store.begin().await?;
        let mut deduction = lock_deduction(uow.as_mut(), deduction_id).await?;
        check_transition(&deduction, DeductionStatus::Cancelled)?;

        uow.update_payroll_deduction_status(deduction_id, DeductionStatus::Cancelled, None)
            .await?;
        uow.commit().await?;

        deduction.status = DeductionStatus::Cancelled;
        info!(deduction_id = %deduction_id, "Payroll deduction cancelled");
        Ok(deduction)
    }

    /// # Errors
    /// `Validation` for a malformed invoice; `Rejected` when the ledger
    /// cannot post it.
    pub async fn issue_scheme_invoice(
        &self,
        request: SchemeInvoiceRequest,
        actor: Option<Uuid>,
    ) -> BillingResult<InvoiceReceipt> {
        let invoice = request.into_invoice()?;

        let mut uow = self.store.begin().await?;
        uow.insert_scheme_invoice(&invoice).await?;
        let posting = self
            .accounting
            .notify_billing_event(uow.as_mut(), &BillingEvent::SchemeInvoiceIssued(invoice.clone()), actor)
            .await
            .map_err(|e| BillingError::rejected("issue scheme invoice", e))?;
        uow.commit().await?;

        info!(
            invoice_number = %invoice.invoice_number,
            scheme_id = %invoice.scheme_id,
            total = %invoice.total_amount,
            "Scheme invoice issued"
        );
        Ok(InvoiceReceipt { invoice, posting })
    }
}

async fn require_patient(uow: &mut dyn UnitOfWork, patient_id: Uuid) -> BillingResult<()> {
    match uow.find_patient(patient_id).await? {
        Some(_) => Ok(()),
        None => Err(AccountingError::PatientNotFound(patient_id).into()),
    }
}

async fn lock_deduction(uow: &mut dyn UnitOfWork, deduction_id: Uuid) -> BillingResult<PayrollDeduction> {
    uow.lock_payroll_deduction(deduction_id)
        .await?
        .ok_or_else(|| AccountingError::DeductionNotFound(deduction_id).into())
}
