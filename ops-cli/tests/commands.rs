use accounting_service::{
    AccountingConfig, BillKind, BillRecord, BillSourceRegistry, JournalEngine, LedgerStore, LineDraft,
    EntryHeader, MemoryLedgerStore, Patient, PatientPaymentMethod,
};
use chrono::{NaiveDate, TimeZone, Utc};
use logger_redacted::PiiRedactor;
use ops_cli::{execute, Command, ShiftCommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

async fn run(store: &MemoryLedgerStore, command: Command) -> ops_cli::CommandOutput {
    execute(command, Arc::new(store.clone()), &AccountingConfig::default(), PiiRedactor::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn seeding_twice_creates_nothing_new() {
    let store = MemoryLedgerStore::new();

    let first = run(&store, Command::SeedAccounts).await;
    assert!(first.success);
    assert!(!first.report["created"].as_array().unwrap().is_empty());

    let second = run(&store, Command::SeedAccounts).await;
    assert!(second.report["created"].as_array().unwrap().is_empty());
    assert!(store.account_by_code("2100").await.is_some());
}

#[tokio::test]
async fn audit_fails_when_a_balance_drifts() {
    let store = MemoryLedgerStore::new();
    run(&store, Command::SeedAccounts).await;

    let cash = store.account_by_code("1000").await.unwrap();
    let revenue = store.account_by_code("4000").await.unwrap();
    let mut uow = store.begin().await.unwrap();
    JournalEngine::new()
        .post(
            uow.as_mut(),
            EntryHeader::new("Walk-in sale"),
            vec![LineDraft::debit(cash.id, dec!(40)), LineDraft::credit(revenue.id, dec!(40))],
        )
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let clean = run(&store, Command::AuditAccounts).await;
    assert!(clean.success);
    assert!(clean.report["mismatched"].as_array().unwrap().is_empty());

    // a balance written outside the journal
    let mut uow = store.begin().await.unwrap();
    uow.adjust_account_balance(cash.id, dec!(5)).await.unwrap();
    uow.commit().await.unwrap();

    let drifted = run(&store, Command::AuditAccounts).await;
    assert!(!drifted.success);
    assert_eq!(drifted.report["mismatched"][0]["code"], "1000");
}

#[tokio::test]
async fn recompute_one_and_all() {
    let store = MemoryLedgerStore::new();
    let patient = Patient {
        id: Uuid::new_v4(),
        name: "Hassan Abdi".to_string(),
        email: None,
        phone: None,
        payment_method: PatientPaymentMethod::Cash,
        balance: Decimal::ZERO,
    };
    let bill = BillRecord {
        id: Uuid::new_v4(),
        kind: BillKind::MATERNITY,
        patient_id: patient.id,
        gross_amount: dec!(12000),
        discount_amount: dec!(2000),
        created_at: Utc::now(),
    };
    let mut uow = store.begin().await.unwrap();
    uow.insert_patient(&patient).await.unwrap();
    uow.insert_bill(BillSourceRegistry::standard().source_for(&bill.kind).unwrap(), &bill)
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let one = run(&store, Command::RecomputeBalances { patient: Some(patient.id) }).await;
    assert_eq!(one.report["balance"], "10000");

    let all = run(&store, Command::RecomputeBalances { patient: None }).await;
    assert!(all.success);
    assert_eq!(all.report["succeeded"], 1);
    assert_eq!(store.patient(patient.id).await.unwrap().balance, dec!(10000));
}

#[tokio::test]
async fn aging_without_transports_reports_delivery_failures() {
    let store = MemoryLedgerStore::new();
    let patient = Patient {
        id: Uuid::new_v4(),
        name: "Naomi Wairimu".to_string(),
        email: Some("naomi@example.com".to_string()),
        phone: None,
        payment_method: PatientPaymentMethod::Scheme,
        balance: Decimal::ZERO,
    };
    let bill = BillRecord {
        id: Uuid::new_v4(),
        kind: BillKind::THEATRE,
        patient_id: patient.id,
        gross_amount: dec!(45000),
        discount_amount: Decimal::ZERO,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    };
    let mut uow = store.begin().await.unwrap();
    uow.insert_patient(&patient).await.unwrap();
    uow.insert_bill(BillSourceRegistry::standard().source_for(&bill.kind).unwrap(), &bill)
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let output = run(
        &store,
        Command::RunAging {
            date: NaiveDate::from_ymd_opt(2024, 6, 30),
        },
    )
    .await;

    assert!(output.success);
    assert_eq!(output.report["patients_scanned"], 1);
    assert_eq!(output.report["delivery_failures"], 1);
    assert!(store.reminder_logs().await.is_empty());
}

#[tokio::test]
async fn shift_start_status_end() {
    let store = MemoryLedgerStore::new();
    let cashier = Uuid::new_v4();

    let idle = run(&store, Command::Shift(ShiftCommand::Status { cashier })).await;
    assert!(idle.report["open_shift"].is_null());

    let started = run(
        &store,
        Command::Shift(ShiftCommand::Start {
            cashier,
            opening_cash: dec!(150),
        }),
    )
    .await;
    let shift_id: Uuid = serde_json::from_value(started.report["id"].clone()).unwrap();

    let status = run(&store, Command::Shift(ShiftCommand::Status { cashier })).await;
    assert_eq!(status.report["expected"], "150");

    let ended = run(
        &store,
        Command::Shift(ShiftCommand::End {
            shift: shift_id,
            closing_cash: dec!(140),
        }),
    )
    .await;
    assert_eq!(ended.report["variance"], "-10");

    let err = execute(
        Command::Shift(ShiftCommand::End {
            shift: shift_id,
            closing_cash: dec!(140),
        }),
        Arc::new(store.clone()),
        &AccountingConfig::default(),
        PiiRedactor::default(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("is not open"));
}

#[tokio::test]
async fn database_commands_are_refused_over_the_store_seam() {
    let store = MemoryLedgerStore::new();
    for command in [Command::Migrate, Command::Health] {
        let result = execute(
            command,
            Arc::new(store.clone()),
            &AccountingConfig::default(),
            PiiRedactor::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
