//! Receivables aging and the reminder job.
//!
//! For each eligible patient the outstanding balance is allocated across
//! their bills newest first (waterfall). The first allocation that lands in
//! an aging bucket decides the single reminder the patient can receive in a
//! run, and the reminder log guarantees a bucket is never reminded twice.

use chrono::{NaiveDate, Utc};
use logger_redacted::PiiRedactor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AgingConfig, NotificationConfig};
use crate::error::AccountingResult;
use crate::models::{AgingBucket, BillKind, BillRecord, Patient, ReminderLog, ReminderType};
use crate::notify::{EmailSender, SmsSender};
use crate::receivables::BalanceAggregator;
use crate::reporting::{AgingRunReport, PatientFailure};
use crate::store::LedgerStore;

/// Share of the outstanding balance attributed to one bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillAllocation {
    pub bill_id: Uuid,
    pub kind: BillKind,
    pub net_amount: Decimal,
    pub allocated: Decimal,
    pub age_days: i64,
    pub bucket: Option<AgingBucket>,
}

/// Waterfall `outstanding` over `bills`, which must be ordered newest first.
/// Stops as soon as nothing remains.
pub fn allocate_outstanding(bills: &[BillRecord], outstanding: Decimal, today: NaiveDate) -> Vec<BillAllocation> {
    let mut remaining = outstanding;
    let mut allocations = Vec::new();

    for bill in bills {
        if remaining <= Decimal::ZERO {
            break;
        }
        let net_amount = bill.net_amount();
        let allocated = net_amount.min(remaining);
        if allocated <= Decimal::ZERO {
            continue;
        }
        let age_days = (today - bill.created_at.date_naive()).num_days();
        allocations.push(BillAllocation {
            bill_id: bill.id,
            kind: bill.kind.clone(),
            net_amount,
            allocated,
            age_days,
            bucket: AgingBucket::from_age_days(age_days),
        });
        remaining -= allocated;
    }

    allocations
}

/// First (newest) allocation that falls into a bucket.
pub fn first_triggered_bucket(allocations: &[BillAllocation]) -> Option<(AgingBucket, Decimal)> {
    allocations
        .iter()
        .find_map(|a| a.bucket.map(|bucket| (bucket, a.allocated)))
}

/// What happened to one patient in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReminderOutcome {
    NothingOutstanding,
    NotOverdue,
    AlreadyReminded { bucket: AgingBucket },
    Sent {
        bucket: AgingBucket,
        reminder_type: ReminderType,
        amount: Decimal,
    },
    DeliveryFailed { bucket: AgingBucket },
}

/// Rendered reminder for both channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
    pub sms: String,
}

impl ReminderMessage {
    pub fn render(hospital_name: &str, patient_name: &str, amount: Decimal, bucket: AgingBucket) -> Self {
        let days = bucket.days();
        let amount = format!("{amount:.2}");
        let text = format!(
            "Dear {patient_name},\n\nOur records show an outstanding balance of {amount} on your account \
             that is more than {days} days overdue. Please settle it at your earliest convenience \
             or contact our billing office.\n\n{hospital_name}"
        );
        let html = format!(
            "<p>Dear {patient_name},</p>\
             <p>Our records show an outstanding balance of <strong>{amount}</strong> on your account \
             that is more than {days} days overdue. Please settle it at your earliest convenience \
             or contact our billing office.</p>\
             <p>{hospital_name}</p>"
        );
        let sms = format!(
            "{hospital_name}: Dear {patient_name}, your balance of {amount} is over {days} days overdue. \
             Please settle it or contact billing."
        );
        Self {
            subject: format!("{hospital_name}: payment reminder ({days} days overdue)"),
            text,
            html,
            sms,
        }
    }
}

/// Periodic job producing at most one reminder per (patient, bucket), ever
pub struct ReminderEngine {
    store: Arc<dyn LedgerStore>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    aggregator: BalanceAggregator,
    aging: AgingConfig,
    hospital_name: String,
    redactor: PiiRedactor,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        aggregator: BalanceAggregator,
    ) -> Self {
        Self {
            store,
            email,
            sms,
            aggregator,
            aging: AgingConfig::default(),
            hospital_name: NotificationConfig::default().hospital_name,
            redactor: PiiRedactor::default(),
        }
    }

    pub fn with_aging_config(mut self, aging: AgingConfig) -> Self {
        self.aging = aging;
        self
    }

    pub fn with_hospital_name(mut self, hospital_name: impl Into<String>) -> Self {
        self.hospital_name = hospital_name.into();
        self
    }

    pub fn with_redactor(mut self, redactor: PiiRedactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Run once for `today`. Patients are processed one at a time, each in
    /// its own units of work, so the job can be interrupted between patients.
    ///
    /// # Errors
    /// Only when the eligible patient list cannot be read.
    pub async fn run(&self, today: NaiveDate) -> AccountingResult<AgingRunReport> {
        let patients = {
            let mut uow = self.store.begin().await?;
            uow.patients_with_payment_methods(&self.aging.eligible_methods).await?
        };

        let mut report = AgingRunReport::new(today);
        for patient in patients {
            report.patients_scanned += 1;
            match self.process_patient(&patient, today).await {
                Ok(ReminderOutcome::NothingOutstanding) => report.skipped_no_balance += 1,
                Ok(ReminderOutcome::NotOverdue) => report.not_overdue += 1,
                Ok(ReminderOutcome::AlreadyReminded { .. }) => report.already_reminded += 1,
                Ok(ReminderOutcome::Sent { .. }) => report.reminders_sent += 1,
                Ok(ReminderOutcome::DeliveryFailed { .. }) => report.delivery_failures += 1,
                Err(e) => {
                    warn!(patient_id = %patient.id, error = %e, "Aging run failed for patient");
                    report.errors.push(PatientFailure {
                        patient_id: patient.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            run_date = %today,
            scanned = report.patients_scanned,
            sent = report.reminders_sent,
            already_reminded = report.already_reminded,
            delivery_failures = report.delivery_failures,
            errors = report.errors.len(),
            "Aging run finished"
        );
        Ok(report)
    }

    /// Evaluate and, when due, remind a single patient.
    ///
    /// # Errors
    /// Storage errors only; delivery failures are an outcome.
    pub async fn process_patient(&self, patient: &Patient, today: NaiveDate) -> AccountingResult<ReminderOutcome> {
        let (bucket, amount) = {
            let mut uow = self.store.begin().await?;
            let (bills, balance) = self.aggregator.snapshot(uow.as_mut(), patient.id).await?;
            if balance.balance <= Decimal::ZERO {
                debug!(patient_id = %patient.id, balance = %balance.balance, "Nothing outstanding");
                return Ok(ReminderOutcome::NothingOutstanding);
            }

            let allocations = allocate_outstanding(&bills, balance.balance, today);
            let Some((bucket, amount)) = first_triggered_bucket(&allocations) else {
                return Ok(ReminderOutcome::NotOverdue);
            };
            if uow.reminder_exists(patient.id, bucket).await? {
                return Ok(ReminderOutcome::AlreadyReminded { bucket });
            }
            (bucket, amount)
        };

        let message = ReminderMessage::render(&self.hospital_name, &patient.name, amount, bucket);
        let email_sent = match non_empty(patient.email.as_deref()) {
            Some(to) => self.deliver_email(patient.id, to, &message).await,
            None => false,
        };
        let sms_sent = match non_empty(patient.phone.as_deref()) {
            Some(to) => self.deliver_sms(patient.id, to, &message).await,
            None => false,
        };

        let Some(reminder_type) = ReminderType::from_channels(email_sent, sms_sent) else {
            warn!(
                patient_id = %patient.id,
                bucket = bucket.as_str(),
                "No reminder channel succeeded; patient stays eligible"
            );
            return Ok(ReminderOutcome::DeliveryFailed { bucket });
        };

        let log = ReminderLog {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            bucket,
            reminder_type,
            amount,
            sent_at: Utc::now(),
        };
        let mut uow = self.store.begin().await?;
        let inserted = uow.insert_reminder_log(&log).await?;
        uow.commit().await?;

        if !inserted {
            // A concurrent run logged the same bucket first
            return Ok(ReminderOutcome::AlreadyReminded { bucket });
        }

        info!(
            patient_id = %patient.id,
            bucket = bucket.as_str(),
            reminder_type = reminder_type.as_str(),
            amount = %amount,
            "Aging reminder sent"
        );
        Ok(ReminderOutcome::Sent {
            bucket,
            reminder_type,
            amount,
        })
    }

    async fn deliver_email(&self, patient_id: Uuid, to: &str, message: &ReminderMessage) -> bool {
        let result = self
            .email
            .send_email(to, &message.subject, &message.text, &message.html)
            .await;
        if !result.success {
            warn!(
                patient_id = %patient_id,
                recipient = %self.redactor.redact(to),
                error = result.error.as_deref().unwrap_or("unknown"),
                "Reminder email not delivered"
            );
        }
        result.success
    }

    async fn deliver_sms(&self, patient_id: Uuid, to: &str, message: &ReminderMessage) -> bool {
        let result = self.sms.send_sms(to, &message.sms).await;
        if !result.success {
            warn!(
                patient_id = %patient_id,
                recipient = %self.redactor.redact(to),
                error = result.error.as_deref().unwrap_or("unknown"),
                "Reminder SMS not delivered"
            );
        }
        result.success
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn bill_aged(net: Decimal, days: i64) -> BillRecord {
        let created = Utc.from_utc_datetime(&today().and_hms_opt(9, 0, 0).unwrap()) - Duration::days(days);
        BillRecord {
            id: Uuid::new_v4(),
            kind: BillKind::OPD,
            patient_id: Uuid::nil(),
            gross_amount: net,
            discount_amount: Decimal::ZERO,
            created_at: created,
        }
    }

    #[test]
    fn test_waterfall_consumes_newest_first() {
        // newest first: 30 @ 10d, 50 @ 45d, 100 @ 95d
        let bills = vec![bill_aged(dec!(30), 10), bill_aged(dec!(50), 45), bill_aged(dec!(100), 95)];
        let allocations = allocate_outstanding(&bills, dec!(120), today());

        let allocated: Vec<Decimal> = allocations.iter().map(|a| a.allocated).collect();
        assert_eq!(allocated, vec![dec!(30), dec!(50), dec!(40)]);
        assert_eq!(allocations[0].bucket, None);
        assert_eq!(allocations[1].bucket, Some(AgingBucket::Days30));
        assert_eq!(allocations[2].bucket, Some(AgingBucket::Days90));

        assert_eq!(
            first_triggered_bucket(&allocations),
            Some((AgingBucket::Days30, dec!(50)))
        );
    }

    #[test]
    fn test_waterfall_stops_when_exhausted() {
        let bills = vec![bill_aged(dec!(70), 35), bill_aged(dec!(500), 120)];
        let allocations = allocate_outstanding(&bills, dec!(70), today());
        assert_eq!(allocations.len(), 1);
        assert_eq!(first_triggered_bucket(&allocations), Some((AgingBucket::Days30, dec!(70))));
    }

    #[test]
    fn test_waterfall_skips_zero_net_bills() {
        let bills = vec![bill_aged(dec!(0), 5), bill_aged(dec!(25), 61)];
        let allocations = allocate_outstanding(&bills, dec!(25), today());
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].bucket, Some(AgingBucket::Days60));
    }

    #[test]
    fn test_nothing_allocated_without_outstanding() {
        let bills = vec![bill_aged(dec!(30), 100)];
        assert!(allocate_outstanding(&bills, dec!(0), today()).is_empty());
        assert!(allocate_outstanding(&bills, dec!(-10), today()).is_empty());
    }

    #[test]
    fn test_message_template() {
        let message = ReminderMessage::render("St. Luke's", "Amina", dec!(50), AgingBucket::Days60);
        assert!(message.subject.contains("60 days"));
        assert!(message.text.contains("Dear Amina"));
        assert!(message.text.contains("50.00"));
        assert!(message.sms.starts_with("St. Luke's:"));
        assert!(message.html.contains("<strong>50.00</strong>"));
    }
}
