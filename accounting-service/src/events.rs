//! Billing events and the bill-source registry.
//!
//! The engine never knows the concrete bill types. Anything that can report
//! `{patient, net amount, created at}` implements [`Billable`], and every bill
//! table the aggregator and aging job should read is listed in a
//! [`BillSourceRegistry`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AccountingError, AccountingResult};
use crate::models::{BillKind, BillRecord, PaymentRecord, PayrollDeduction, SchemeInvoice};

/// Capability shared by every bill variant
pub trait Billable: Send + Sync {
    fn bill_id(&self) -> Uuid;
    fn kind(&self) -> BillKind;
    fn patient_id(&self) -> Uuid;
    fn gross_amount(&self) -> Decimal;
    fn discount_amount(&self) -> Decimal;
    fn created_at(&self) -> DateTime<Utc>;

    fn net_amount(&self) -> Decimal {
        self.gross_amount() - self.discount_amount()
    }

    fn to_record(&self) -> BillRecord {
        BillRecord {
            id: self.bill_id(),
            kind: self.kind(),
            patient_id: self.patient_id(),
            gross_amount: self.gross_amount(),
            discount_amount: self.discount_amount(),
            created_at: self.created_at(),
        }
    }
}

impl Billable for BillRecord {
    fn bill_id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> BillKind {
        self.kind.clone()
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn gross_amount(&self) -> Decimal {
        self.gross_amount
    }

    fn discount_amount(&self) -> Decimal {
        self.discount_amount
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn to_record(&self) -> BillRecord {
        self.clone()
    }
}

/// Event handed to the engine right after its business record is persisted,
/// inside the same unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    BillCreated(BillRecord),
    PaymentReceived(PaymentRecord),
    /// Fired only on the transition into `settled`
    PayrollDeductionSettled(PayrollDeduction),
    SchemeInvoiceIssued(SchemeInvoice),
}

impl BillingEvent {
    /// Patient whose cached balance the event affects, if any.
    pub fn patient_id(&self) -> Option<Uuid> {
        match self {
            Self::BillCreated(bill) => Some(bill.patient_id),
            Self::PaymentReceived(payment) => Some(payment.patient_id),
            Self::PayrollDeductionSettled(_) | Self::SchemeInvoiceIssued(_) => None,
        }
    }

    pub fn reference(&self) -> String {
        match self {
            Self::BillCreated(bill) => format!("bill:{}:{}", bill.kind, bill.id),
            Self::PaymentReceived(payment) => format!("payment:{}", payment.id),
            Self::PayrollDeductionSettled(deduction) => format!("payroll-deduction:{}", deduction.id),
            Self::SchemeInvoiceIssued(invoice) => format!("scheme-invoice:{}", invoice.id),
        }
    }
}

/// A bill table the engine reads. Every source table carries
/// `id, patient_id, gross_amount, discount_amount, created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSource {
    kind: BillKind,
    table: String,
}

impl BillSource {
    /// # Errors
    /// Returns `Validation` when `table` is not a plain SQL identifier.
    pub fn new(kind: BillKind, table: impl Into<String>) -> AccountingResult<Self> {
        let table = table.into();
        if !is_sql_identifier(&table) {
            return Err(AccountingError::Validation(format!(
                "bill source table '{table}' is not a valid identifier"
            )));
        }
        Ok(Self { kind, table })
    }

    pub fn kind(&self) -> &BillKind {
        &self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

/// Bill tables summed by the balance aggregator and walked by the aging job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillSourceRegistry {
    sources: Vec<BillSource>,
}

impl BillSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hospital's standard bill tables.
    pub fn standard() -> Self {
        let standard = [
            (BillKind::OPD, "opd_bills"),
            (BillKind::IPD, "ipd_bills"),
            (BillKind::PHARMACY, "pharmacy_bills"),
            (BillKind::LAB, "lab_bills"),
            (BillKind::RADIOLOGY, "radiology_bills"),
            (BillKind::THEATRE, "theatre_bills"),
            (BillKind::MATERNITY, "maternity_bills"),
            (BillKind::SPECIALIST, "specialist_bills"),
        ];
        Self {
            sources: standard
                .into_iter()
                .map(|(kind, table)| BillSource { kind, table: table.to_string() })
                .collect(),
        }
    }

    /// Registers a source, replacing any existing source of the same kind.
    pub fn register(&mut self, source: BillSource) -> &mut Self {
        self.sources.retain(|s| s.kind != source.kind);
        self.sources.push(source);
        self
    }

    pub fn source_for(&self, kind: &BillKind) -> AccountingResult<&BillSource> {
        self.sources
            .iter()
            .find(|s| &s.kind == kind)
            .ok_or_else(|| AccountingError::UnknownBillKind(kind.to_string()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &BillSource> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
