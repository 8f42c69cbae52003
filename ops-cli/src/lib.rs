//! Operations CLI for the ledger engine
//!
//! ```bash
//! ledger-ops --config ledger.toml migrate
//! ledger-ops seed-accounts
//! ledger-ops recompute-balances --patient 6f1c...
//! ledger-ops run-aging --date 2024-06-30
//! ledger-ops audit-accounts
//! ledger-ops shift start --cashier 0b7e... --opening-cash 200
//! ledger-ops shift end --shift 91d2... --closing-cash 310
//! ```
//!
//! Every command prints a JSON report on stdout. `audit-accounts`, a bulk
//! recompute with failures and an aging run with per-patient errors exit
//! non-zero.

pub mod cli;
pub mod commands;

pub use cli::*;
pub use commands::*;
