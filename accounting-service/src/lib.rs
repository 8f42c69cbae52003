//! Ledger posting and balance reconciliation for hospital finance
//!
//! Provides:
//! - Chart of Accounts resolution and seeding
//! - Journal Engine (balanced double-entry posting, balance audit)
//! - Event-to-posting rules for bills, payments, payroll deductions and scheme invoices
//! - Patient balance aggregation across registered bill sources
//! - Receivables aging with idempotent reminders
//! - Cashier shift reconciliation
//!
//! Every write goes through a [`store::UnitOfWork`]; the PostgreSQL and
//! in-memory stores both implement [`store::LedgerStore`].

pub mod accounts;
pub mod aging;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod posting;
pub mod receivables;
pub mod reporting;
pub mod service;
pub mod shift;
pub mod store;

pub use crate::config::{
    AccountMapping, AccountingConfig, AgingConfig, DatabaseConfig, NotificationConfig, RolePatterns,
};
pub use accounts::*;
pub use aging::*;
pub use error::*;
pub use events::*;
pub use ledger::*;
pub use models::*;
pub use notify::*;
pub use posting::*;
pub use receivables::*;
pub use reporting::*;
pub use service::*;
pub use shift::*;
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore, UnitOfWork};
