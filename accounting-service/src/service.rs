use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::accounts::AccountResolver;
use crate::config::AccountingConfig;
use crate::error::AccountingResult;
use crate::events::{BillSourceRegistry, BillingEvent};
use crate::ledger::JournalEngine;
use crate::models::JournalEntry;
use crate::posting::{PayrollPostingOutcome, PostingRules};
use crate::receivables::{BalanceAggregator, PatientBalance};
use crate::store::UnitOfWork;

/// What the engine did for one billing event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPosting {
    pub journal_entry: Option<JournalEntry>,
    pub patient_balance: Option<PatientBalance>,
    /// Set when the payroll rule skipped its posting
    pub skipped_posting: Option<String>,
}

/// Accounting service: the inbound seam billing calls after persisting a
/// record, inside the same unit of work
#[derive(Debug, Clone, Default)]
pub struct AccountingService {
    rules: PostingRules,
    aggregator: BalanceAggregator,
}

impl AccountingService {
    pub fn new(config: &AccountingConfig, registry: BillSourceRegistry) -> Self {
        Self {
            rules: PostingRules::new(AccountResolver::new(config.accounts.clone())),
            aggregator: BalanceAggregator::new(registry),
        }
    }

    pub fn rules(&self) -> &PostingRules {
        &self.rules
    }

    pub fn aggregator(&self) -> &BalanceAggregator {
        &self.aggregator
    }

    pub fn journal(&self) -> &JournalEngine {
        self.rules.engine()
    }

    /// Post the event's journal entry, then recompute the affected patient's
    /// balance. Any error means the caller must drop the unit of work.
    ///
    /// # Errors
    /// Fatal posting errors (`AccountNotConfigured` for charges, payments
    /// and invoices, `UnbalancedEntry`, storage). Payroll account gaps are
    /// reported in [`EventPosting::skipped_posting`] instead.
    pub async fn notify_billing_event(
        &self,
        uow: &mut dyn UnitOfWork,
        event: &BillingEvent,
        actor: Option<Uuid>,
    ) -> AccountingResult<EventPosting> {
        let mut posting = EventPosting::default();

        match event {
            BillingEvent::BillCreated(bill) => {
                // Unregistered kinds would never be aggregated or aged
                self.aggregator.registry().source_for(&bill.kind)?;
                posting.journal_entry = self.rules.post_charge(uow, bill, actor).await?;
            }
            BillingEvent::PaymentReceived(payment) => {
                posting.journal_entry = self.rules.post_payment(uow, payment).await?;
            }
            BillingEvent::PayrollDeductionSettled(deduction) => {
                match self.rules.post_payroll_deduction(uow, deduction, actor).await? {
                    PayrollPostingOutcome::Posted(entry) => posting.journal_entry = Some(entry),
                    PayrollPostingOutcome::Skipped { reason } => posting.skipped_posting = Some(reason),
                }
            }
            BillingEvent::SchemeInvoiceIssued(invoice) => {
                posting.journal_entry = self.rules.post_scheme_invoice(uow, invoice, actor).await?;
            }
        }

        if let Some(patient_id) = event.patient_id() {
            posting.patient_balance = Some(self.aggregator.recompute(uow, patient_id).await?);
        }

        debug!(
            reference = %event.reference(),
            posted = posting.journal_entry.is_some(),
            "Billing event processed"
        );
        Ok(posting)
    }
}
