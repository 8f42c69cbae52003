use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ledger-ops")]
#[command(about = "Operate the hospital ledger engine", version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); `LEDGER__*` variables override it
    #[arg(long, global = true, env = "LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log one JSON object per line
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Apply the embedded database migrations
    Migrate,

    /// Check that the ledger database answers
    Health,

    /// Create any missing accounts of the standard hospital chart
    SeedAccounts,

    /// Recompute cached patient balances from bills and payments
    RecomputeBalances {
        /// Only this patient; every patient when omitted
        #[arg(long)]
        patient: Option<Uuid>,
    },

    /// Run the receivables aging job once
    RunAging {
        /// Run date (YYYY-MM-DD); today in UTC when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Compare stored account balances with their posting history
    AuditAccounts,

    /// Cashier shift operations
    #[command(subcommand)]
    Shift(ShiftCommand),
}

impl Command {
    /// Commands that run against PostgreSQL itself rather than the store seam
    pub fn needs_database_directly(&self) -> bool {
        matches!(self, Self::Migrate | Self::Health)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ShiftCommand {
    /// Open a shift with a counted float
    Start {
        #[arg(long)]
        cashier: Uuid,
        #[arg(long)]
        opening_cash: Decimal,
    },

    /// Close a shift and report the cash variance
    End {
        #[arg(long)]
        shift: Uuid,
        #[arg(long)]
        closing_cash: Decimal,
    },

    /// Show the cashier's open shift with cash expected so far
    Status {
        #[arg(long)]
        cashier: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_shift_start() {
        let cashier = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "ledger-ops",
            "--verbose",
            "shift",
            "start",
            "--cashier",
            &cashier.to_string(),
            "--opening-cash",
            "250.00",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Command::Shift(ShiftCommand::Start {
                cashier,
                opening_cash: dec!(250.00),
            })
        );
    }

    #[test]
    fn test_parse_run_aging_date() {
        let cli = Cli::try_parse_from(["ledger-ops", "run-aging", "--date", "2024-06-30"]).unwrap();
        assert_eq!(
            cli.command,
            Command::RunAging {
                date: NaiveDate::from_ymd_opt(2024, 6, 30),
            }
        );
    }

    #[test]
    fn test_parse_database_commands() {
        let cli = Cli::try_parse_from(["ledger-ops", "health"]).unwrap();
        assert_eq!(cli.command, Command::Health);
        assert!(cli.command.needs_database_directly());

        let cli = Cli::try_parse_from(["ledger-ops", "audit-accounts"]).unwrap();
        assert!(!cli.command.needs_database_directly());
    }

    #[test]
    fn test_rejects_malformed_amount() {
        let result = Cli::try_parse_from([
            "ledger-ops",
            "shift",
            "end",
            "--shift",
            &Uuid::new_v4().to_string(),
            "--closing-cash",
            "lots",
        ]);
        assert!(result.is_err());
    }
}
