//! Patient balance aggregation.
//!
//! `Patient.balance` is a cache: Σ net amount over every registered bill
//! source minus Σ payments. It is always rebuilt from source records, never
//! adjusted incrementally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AccountingError, AccountingResult};
use crate::events::BillSourceRegistry;
use crate::models::BillRecord;
use crate::reporting::AggregationReport;
use crate::store::{LedgerStore, UnitOfWork};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientBalance {
    pub patient_id: Uuid,
    pub total_billed: Decimal,
    pub total_paid: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone)]
pub struct BalanceAggregator {
    registry: BillSourceRegistry,
}

impl Default for BalanceAggregator {
    fn default() -> Self {
        Self::new(BillSourceRegistry::standard())
    }
}

impl BalanceAggregator {
    pub fn new(registry: BillSourceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BillSourceRegistry {
        &self.registry
    }

    /// Every bill for the patient across all sources, newest first.
    pub async fn gather_bills(&self, uow: &mut dyn UnitOfWork, patient_id: Uuid) -> AccountingResult<Vec<BillRecord>> {
        let mut bills = Vec::new();
        for source in self.registry.sources() {
            bills.extend(uow.bills_for_patient(source, patient_id).await?);
        }
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(bills)
    }

    /// Bills (newest first) together with the balance they produce.
    pub async fn snapshot(
        &self,
        uow: &mut dyn UnitOfWork,
        patient_id: Uuid,
    ) -> AccountingResult<(Vec<BillRecord>, PatientBalance)> {
        let bills = self.gather_bills(uow, patient_id).await?;
        let total_billed: Decimal = bills.iter().map(BillRecord::net_amount).sum();
        let total_paid = uow.total_payments_for_patient(patient_id).await?;
        let balance = PatientBalance {
            patient_id,
            total_billed,
            total_paid,
            balance: total_billed - total_paid,
        };
        Ok((bills, balance))
    }

    /// Derive the balance without writing it.
    pub async fn compute(&self, uow: &mut dyn UnitOfWork, patient_id: Uuid) -> AccountingResult<PatientBalance> {
        Ok(self.snapshot(uow, patient_id).await?.1)
    }

    /// Derive the balance and write it onto the patient, inside `uow`.
    ///
    /// The patient row is locked before any source is read, so concurrent
    /// recomputes for one patient apply in commit order.
    ///
    /// # Errors
    /// `PatientNotFound` when the patient row does not exist.
    pub async fn recompute(&self, uow: &mut dyn UnitOfWork, patient_id: Uuid) -> AccountingResult<PatientBalance> {
        if uow.lock_patient(patient_id).await?.is_none() {
            return Err(AccountingError::PatientNotFound(patient_id));
        }
        let balance = self.compute(uow, patient_id).await?;
        uow.set_patient_balance(patient_id, balance.balance).await?;
        debug!(
            patient_id = %patient_id,
            balance = %balance.balance,
            "Patient balance recomputed"
        );
        Ok(balance)
    }

    /// Recompute one patient in a unit of work of its own.
    pub async fn recompute_patient(&self, store: &dyn LedgerStore, patient_id: Uuid) -> AccountingResult<PatientBalance> {
        let mut uow = store.begin().await?;
        let balance = self.recompute(uow.as_mut(), patient_id).await?;
        uow.commit().await?;
        Ok(balance)
    }

    /// Backfill every patient. Each patient commits or fails on its own;
    /// failures are collected in the report.
    ///
    /// # Errors
    /// Only when the patient list itself cannot be read.
    pub async fn recompute_all(&self, store: &dyn LedgerStore) -> AccountingResult<AggregationReport> {
        let patient_ids = {
            let mut uow = store.begin().await?;
            uow.patient_ids().await?
        };

        let mut report = AggregationReport::default();
        for patient_id in patient_ids {
            match self.recompute_patient(store, patient_id).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    warn!(patient_id = %patient_id, error = %e, "Balance recompute failed");
                    report.record_failure(patient_id, e);
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Bulk balance recompute finished"
        );
        Ok(report)
    }
}
