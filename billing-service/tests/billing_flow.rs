use accounting_service::{
    seed_accounts, AccountMapping, AccountSeed, AccountType, AccountingConfig, AccountingError, AccountingService,
    BillKind, BillSourceRegistry, ChartOfAccounts, DeductionStatus, LedgerStore, MemoryLedgerStore, Patient,
    PatientPaymentMethod, PaymentMethod,
};
use billing_service::{
    BillingError, BillingService, Discount, IpdBill, LineItem, PaymentRequest, PayrollDeductionRequest, PharmacyBill,
    SchemeInvoiceRequest, ServiceBill, SettlementOutcome,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

/// Log lines written while a test runs
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

async fn store_with(chart: &ChartOfAccounts) -> MemoryLedgerStore {
    let store = MemoryLedgerStore::new();
    let mut uow = store.begin().await.unwrap();
    seed_accounts(uow.as_mut(), chart).await.unwrap();
    uow.commit().await.unwrap();
    store
}

fn service(store: &MemoryLedgerStore, config: &AccountingConfig) -> BillingService {
    BillingService::new(
        Arc::new(store.clone()),
        AccountingService::new(config, BillSourceRegistry::standard()),
    )
}

async fn registered(billing: &BillingService) -> Patient {
    let patient = Patient {
        id: Uuid::new_v4(),
        name: "Winnie Akinyi".to_string(),
        email: Some("winnie@example.com".to_string()),
        phone: None,
        payment_method: PatientPaymentMethod::Cash,
        balance: Decimal::ZERO,
    };
    billing.register_patient(&patient).await.unwrap();
    patient
}

#[tokio::test]
async fn bills_and_payments_keep_the_patient_balance_current() {
    let store = store_with(&ChartOfAccounts::standard_hospital()).await;
    let billing = service(&store, &AccountingConfig::default());
    let patient = registered(&billing).await;

    let opd = ServiceBill::new(BillKind::OPD, patient.id)
        .with_item(LineItem::new("Consultation", dec!(1), dec!(1000.00)))
        .with_item(LineItem::new("Dressing", dec!(2), dec!(250.00)).with_discount(Discount::Percent(dec!(10))));
    let receipt = billing.create_bill(&opd, None).await.unwrap();
    assert_eq!(receipt.bill.net_amount(), dec!(1450.00));
    assert_eq!(receipt.posting.patient_balance.unwrap().balance, dec!(1450.00));

    let drugs = PharmacyBill::new(patient.id, None).dispense(LineItem::new("Amoxicillin 500mg", dec!(21), dec!(12.50)));
    billing.create_bill(&drugs, None).await.unwrap();

    let stay = IpdBill::new(patient.id, Uuid::new_v4(), 3, dec!(2000.00));
    billing.create_bill(&stay, None).await.unwrap();

    let paid = billing
        .record_payment(PaymentRequest::new(patient.id, dec!(2000.00), PaymentMethod::Cash, Uuid::new_v4()))
        .await
        .unwrap();
    // 1450 + 262.50 + 6000 - 2000
    assert_eq!(paid.posting.patient_balance.unwrap().balance, dec!(5712.50));
    assert_eq!(store.patient(patient.id).await.unwrap().balance, dec!(5712.50));

    assert_eq!(store.bill_count().await, 3);
    assert_eq!(store.journal_entries().await.len(), 4);
    assert_eq!(store.account_by_code("1200").await.unwrap().balance, dec!(5712.50));
    assert_eq!(store.account_by_code("1000").await.unwrap().balance, dec!(2000.00));
}

#[tokio::test]
async fn unposted_charge_means_no_bill() {
    let mut chart = ChartOfAccounts::new();
    chart.push(AccountSeed::new("1200", "Patient Receivables", AccountType::Asset));
    let store = store_with(&chart).await;
    let billing = service(&store, &AccountingConfig::default());
    let patient = registered(&billing).await;

    let lab = ServiceBill::new(BillKind::LAB, patient.id).with_item(LineItem::new("Malaria RDT", dec!(1), dec!(300)));
    let err = billing.create_bill(&lab, None).await.unwrap_err();

    assert!(matches!(
        err,
        BillingError::Rejected {
            action: "create bill",
            source: AccountingError::AccountNotConfigured { .. },
        }
    ));
    assert!(err.to_string().starts_with("could not create bill"));
    assert_eq!(store.bill_count().await, 0);
    assert!(store.journal_entries().await.is_empty());
    assert_eq!(store.patient(patient.id).await.unwrap().balance, Decimal::ZERO);
}

#[tokio::test]
async fn bill_for_unknown_patient_is_refused() {
    let store = store_with(&ChartOfAccounts::standard_hospital()).await;
    let billing = service(&store, &AccountingConfig::default());

    let bill = ServiceBill::new(BillKind::RADIOLOGY, Uuid::new_v4()).with_item(LineItem::new("CT head", dec!(1), dec!(9000)));
    let err = billing.create_bill(&bill, None).await.unwrap_err();
    assert!(matches!(err, BillingError::Accounting(AccountingError::PatientNotFound(_))));
    assert_eq!(store.bill_count().await, 0);
}

#[tokio::test]
async fn payroll_deduction_settles_once() {
    let store = store_with(&ChartOfAccounts::standard_hospital()).await;
    let billing = service(&store, &AccountingConfig::default());

    let deduction = billing
        .create_payroll_deduction(PayrollDeductionRequest::new(Uuid::new_v4(), dec!(3000), "Staff surgery"))
        .await
        .unwrap();
    assert_eq!(deduction.status, DeductionStatus::Pending);
    assert!(store.journal_entries().await.is_empty());

    let first = billing.settle_payroll_deduction(deduction.id, None).await.unwrap();
    assert!(matches!(
        first,
        SettlementOutcome::Settled { ref posting, .. } if posting.journal_entry.is_some()
    ));

    let second = billing.settle_payroll_deduction(deduction.id, None).await.unwrap();
    assert!(matches!(second, SettlementOutcome::AlreadySettled { .. }));
    assert_eq!(store.journal_entries().await.len(), 1);

    let err = billing.cancel_payroll_deduction(deduction.id).await.unwrap_err();
    assert!(matches!(err, BillingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn payroll_deduction_settles_even_when_accounts_are_missing() {
    let store = store_with(&ChartOfAccounts::new()).await;
    let config = AccountingConfig {
        accounts: AccountMapping {
            pattern_fallback: false,
            ..AccountMapping::default()
        },
        ..AccountingConfig::default()
    };
    let billing = service(&store, &config);

    let deduction = billing
        .create_payroll_deduction(PayrollDeductionRequest::new(Uuid::new_v4(), dec!(750), "Optical"))
        .await
        .unwrap();
    let outcome = billing.settle_payroll_deduction(deduction.id, None).await.unwrap();

    assert!(matches!(
        &outcome,
        SettlementOutcome::Settled { deduction, posting }
            if deduction.status == DeductionStatus::Settled
                && posting.journal_entry.is_none()
                && posting.skipped_posting.is_some()
    ));
    let stored = store.payroll_deduction(deduction.id).await.unwrap();
    assert_eq!(stored.status, DeductionStatus::Settled);
    assert!(stored.settled_at.is_some());
    assert!(store.journal_entries().await.is_empty());
}

#[tokio::test]
async fn cancelled_deduction_cannot_settle() {
    let store = store_with(&ChartOfAccounts::standard_hospital()).await;
    let billing = service(&store, &AccountingConfig::default());

    let deduction = billing
        .create_payroll_deduction(PayrollDeductionRequest::new(Uuid::new_v4(), dec!(100), "Dental"))
        .await
        .unwrap();
    let cancelled = billing.cancel_payroll_deduction(deduction.id).await.unwrap();
    assert_eq!(cancelled.status, DeductionStatus::Cancelled);

    let err = billing.settle_payroll_deduction(deduction.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        BillingError::InvalidTransition {
            from: DeductionStatus::Cancelled,
            to: DeductionStatus::Settled,
            ..
        }
    ));
    assert!(matches!(
        billing.settle_payroll_deduction(Uuid::new_v4(), None).await,
        Err(BillingError::Accounting(AccountingError::DeductionNotFound(_)))
    ));
}

#[tokio::test]
async fn scheme_invoice_posts_to_service_revenue() {
    let store = store_with(&ChartOfAccounts::standard_hospital()).await;
    let billing = service(&store, &AccountingConfig::default());

    let receipt = billing
        .issue_scheme_invoice(
            SchemeInvoiceRequest::new(Uuid::new_v4(), "NHIF-2024-0612")
                .with_item(LineItem::new("Member inpatient days", dec!(14), dec!(2200))),
            None,
        )
        .await
        .unwrap();

    assert_eq!(receipt.invoice.total_amount, dec!(30800));
    assert!(receipt.posting.patient_balance.is_none());
    assert_eq!(store.account_by_code("1210").await.unwrap().balance, dec!(30800));
    assert_eq!(store.account_by_code("4100").await.unwrap().balance, dec!(30800));
}

#[tokio::test]
async fn zero_amount_deduction_settles_without_a_warning() {
    let store = store_with(&ChartOfAccounts::standard_hospital()).await;
    let billing = service(&store, &AccountingConfig::default());
    let deduction = billing
        .create_payroll_deduction(PayrollDeductionRequest::new(Uuid::new_v4(), Decimal::ZERO, "Waived consult"))
        .await
        .unwrap();

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let outcome = {
        let _guard = tracing::subscriber::set_default(subscriber);
        billing.settle_payroll_deduction(deduction.id, None).await.unwrap()
    };

    assert!(matches!(
        &outcome,
        SettlementOutcome::Settled { posting, .. } if posting.journal_entry.is_none()
    ));
    assert!(store.journal_entries().await.is_empty());
    let text = logs.text();
    assert!(text.contains("Zero-amount payroll deduction settled"));
    assert!(!text.contains("WARN"));
}
