#![allow(dead_code)]

use accounting_service::{
    seed_accounts, BillKind, BillRecord, BillSourceRegistry, ChartOfAccounts, DeliveryResult, EmailSender,
    LedgerStore, MemoryLedgerStore, Patient, PatientPaymentMethod, PaymentMethod, PaymentRecord, SmsSender,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub async fn seeded_store() -> MemoryLedgerStore {
    let store = MemoryLedgerStore::new();
    let mut uow = store.begin().await.unwrap();
    seed_accounts(uow.as_mut(), &ChartOfAccounts::standard_hospital())
        .await
        .unwrap();
    uow.commit().await.unwrap();
    store
}

pub fn patient(name: &str, method: PatientPaymentMethod, email: Option<&str>, phone: Option<&str>) -> Patient {
    Patient {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        payment_method: method,
        balance: Decimal::ZERO,
    }
}

pub fn noon(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

pub fn bill(patient_id: Uuid, kind: BillKind, net: Decimal, created_at: DateTime<Utc>) -> BillRecord {
    BillRecord {
        id: Uuid::new_v4(),
        kind,
        patient_id,
        gross_amount: net,
        discount_amount: Decimal::ZERO,
        created_at,
    }
}

pub fn cash_payment(patient_id: Uuid, cashier: Uuid, amount: Decimal, at: DateTime<Utc>) -> PaymentRecord {
    PaymentRecord {
        id: Uuid::new_v4(),
        patient_id,
        amount,
        payment_method: PaymentMethod::Cash,
        received_by: cashier,
        payment_date: at,
        reference: None,
    }
}

/// Persist a patient with bills aged relative to `today` and one payment.
pub async fn insert_patient_with_bills(
    store: &MemoryLedgerStore,
    patient: &Patient,
    today: NaiveDate,
    bills: &[(BillKind, Decimal, i64)],
    paid: Decimal,
) {
    let registry = BillSourceRegistry::standard();
    let mut uow = store.begin().await.unwrap();
    uow.insert_patient(patient).await.unwrap();
    for (kind, net, days_ago) in bills {
        let created = noon(today) - Duration::days(*days_ago);
        let source = registry.source_for(kind).unwrap();
        uow.insert_bill(source, &bill(patient.id, kind.clone(), *net, created))
            .await
            .unwrap();
    }
    if !paid.is_zero() {
        uow.insert_payment(&cash_payment(patient.id, Uuid::new_v4(), paid, noon(today) - Duration::days(1)))
            .await
            .unwrap();
    }
    uow.commit().await.unwrap();
}

/// Email fake that records every message and can be told to fail
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: AtomicBool,
}

impl RecordingEmail {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send_email(&self, to: &str, subject: &str, _text: &str, _html: &str) -> DeliveryResult {
        if self.failing.load(Ordering::SeqCst) {
            return DeliveryResult::failed("smtp unavailable");
        }
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
        DeliveryResult::delivered()
    }
}

#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: AtomicBool,
}

impl RecordingSms {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send_sms(&self, to: &str, message: &str) -> DeliveryResult {
        if self.failing.load(Ordering::SeqCst) {
            return DeliveryResult::failed("gateway timeout");
        }
        self.sent.lock().unwrap().push((to.to_string(), message.to_string()));
        DeliveryResult::delivered()
    }
}
