use accounting_service::{AccountingConfig, PgLedgerStore};
use anyhow::Context;
use clap::Parser;
use logger_redacted::{init_tracing, LogFormat, LoggerConfig, PiiRedactor};
use ops_cli::{execute, Cli, Command};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    let logger = LoggerConfig::default().verbose(cli.verbose).with_format(format);
    init_tracing(&logger)?;

    let config = AccountingConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let store = PgLedgerStore::connect(&config.database)
        .await
        .context("connecting to the ledger database")?;

    if cli.command.needs_database_directly() {
        return run_database_command(&cli.command, &store).await;
    }

    let output = execute(cli.command, Arc::new(store), &config, PiiRedactor::new(logger.redaction())).await?;
    println!("{}", serde_json::to_string_pretty(&output.report)?);

    if output.success {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Command finished with failures");
        Ok(ExitCode::FAILURE)
    }
}

async fn run_database_command(command: &Command, store: &PgLedgerStore) -> anyhow::Result<ExitCode> {
    if *command == Command::Migrate {
        store.migrate().await?;
        info!("Database is up to date");
        return Ok(ExitCode::SUCCESS);
    }

    let healthy = store.is_healthy().await;
    println!("{}", serde_json::json!({ "database": if healthy { "ok" } else { "unreachable" } }));
    Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
