//! Billing for hospital departments
//!
//! Provides:
//! - Concrete bill types (service departments, pharmacy, inpatient stays)
//!   with line items and discounts
//! - Payment intake at the till
//! - Payroll deductions for staff medical costs
//! - Invoices to payment schemes
//!
//! Every action persists its record and hands it to the ledger engine in the
//! same unit of work, so a bill never exists without its journal entry.

pub mod error;
pub mod models;
pub mod payment;
pub mod payroll;
pub mod schemes;
pub mod service;

pub use error::*;
pub use models::*;
pub use payment::*;
pub use payroll::*;
pub use schemes::*;
pub use service::*;
