use accounting_service::{
    email_sender_from_config, seed_accounts, sms_sender_from_config, AccountingConfig, BalanceAggregator,
    BillSourceRegistry, ChartOfAccounts, JournalEngine, LedgerStore, ReminderEngine, ShiftReconciler,
};
use anyhow::Context;
use chrono::Utc;
use logger_redacted::PiiRedactor;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::{Command, ShiftCommand};

/// What a command produced: a JSON report and whether the operator should
/// treat the run as a failure
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub report: Value,
    pub success: bool,
}

impl CommandOutput {
    fn ok(report: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            report: serde_json::to_value(report)?,
            success: true,
        })
    }
}

/// Execute every command except `migrate` and `health`, which need the
/// PostgreSQL store itself rather than the storage seam.
///
/// # Errors
/// Any engine error, with the failing step as context.
pub async fn execute(
    command: Command,
    store: Arc<dyn LedgerStore>,
    config: &AccountingConfig,
    redactor: PiiRedactor,
) -> anyhow::Result<CommandOutput> {
    match command {
        Command::Migrate | Command::Health => {
            anyhow::bail!("migrate and health run against the database directly")
        }

        Command::SeedAccounts => {
            let mut uow = store.begin().await?;
            let report = seed_accounts(uow.as_mut(), &ChartOfAccounts::standard_hospital())
                .await
                .context("seeding the chart of accounts")?;
            uow.commit().await?;
            info!(created = report.created.len(), existing = report.existing, "Chart of accounts seeded");
            CommandOutput::ok(report)
        }

        Command::RecomputeBalances { patient } => {
            let aggregator = BalanceAggregator::new(BillSourceRegistry::standard());
            match patient {
                Some(patient_id) => {
                    let balance = aggregator
                        .recompute_patient(store.as_ref(), patient_id)
                        .await
                        .with_context(|| format!("recomputing patient {patient_id}"))?;
                    CommandOutput::ok(balance)
                }
                None => {
                    let report = aggregator.recompute_all(store.as_ref()).await?;
                    let success = report.is_clean();
                    Ok(CommandOutput {
                        report: serde_json::to_value(report)?,
                        success,
                    })
                }
            }
        }

        Command::RunAging { date } => {
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let engine = ReminderEngine::new(
                store,
                email_sender_from_config(&config.notifications)?,
                sms_sender_from_config(&config.notifications)?,
                BalanceAggregator::new(BillSourceRegistry::standard()),
            )
            .with_aging_config(config.aging.clone())
            .with_hospital_name(config.notifications.hospital_name.clone())
            .with_redactor(redactor);

            let report = engine.run(today).await.context("running the aging job")?;
            let success = report.errors.is_empty();
            Ok(CommandOutput {
                report: serde_json::to_value(report)?,
                success,
            })
        }

        Command::AuditAccounts => {
            let mut uow = store.begin().await?;
            let audits = JournalEngine::new().audit_all(uow.as_mut()).await?;
            drop(uow);

            let mismatched: Vec<_> = audits.iter().filter(|a| !a.matches).collect();
            for audit in &mismatched {
                warn!(
                    code = %audit.code,
                    stored = %audit.stored,
                    recomputed = %audit.recomputed,
                    "Account balance does not match its postings"
                );
            }
            let success = mismatched.is_empty();
            Ok(CommandOutput {
                report: json!({
                    "accounts": audits.len(),
                    "mismatched": mismatched,
                }),
                success,
            })
        }

        Command::Shift(shift) => {
            let reconciler = ShiftReconciler::new(store);
            match shift {
                ShiftCommand::Start { cashier, opening_cash } => {
                    CommandOutput::ok(reconciler.start_shift(cashier, opening_cash).await?)
                }
                ShiftCommand::End { shift, closing_cash } => {
                    CommandOutput::ok(reconciler.end_shift(shift, closing_cash).await?)
                }
                ShiftCommand::Status { cashier } => match reconciler.current_shift(cashier).await? {
                    Some(open) => CommandOutput::ok(reconciler.summary(open.id, None).await?),
                    None => CommandOutput::ok(json!({ "cashier_id": cashier, "open_shift": null })),
                },
            }
        }
    }
}
