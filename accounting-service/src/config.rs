//! Engine configuration.
//!
//! Layers, later ones winning: built-in defaults, an optional file
//! (`ledger.toml`, `ledger.yaml`, ...), then `LEDGER__*` environment variables
//! (`LEDGER__ACCOUNTS__CASH=1001`, `LEDGER__AGING__ELIGIBLE_METHODS=cash,scheme`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::AccountingResult;
use crate::models::PatientPaymentMethod;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    pub accounts: AccountMapping,
    pub aging: AgingConfig,
    pub notifications: NotificationConfig,
    pub database: DatabaseConfig,
}

impl AccountingConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// # Errors
    /// Returns `Config` when a source cannot be read or does not match the schema.
    pub fn load(path: Option<&Path>) -> AccountingResult<Self> {
        let mut builder = Config::builder();
        match path {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => builder = builder.add_source(File::with_name("ledger").required(false)),
        }
        let config = builder
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("aging.eligible_methods")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Logical GL role -> account code mapping, resolved when a rule runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMapping {
    pub cash: Option<String>,
    pub bank: Option<String>,
    pub receivable: Option<String>,
    /// Scheme invoices; falls back to `receivable` when unset
    pub scheme_receivable: Option<String>,
    pub revenue: Option<String>,
    pub service_revenue: Option<String>,
    pub salary_payable: Option<String>,
    pub staff_medical_receivable: Option<String>,
    /// Per bill kind revenue account, e.g. `pharmacy = "4020"`
    pub revenue_by_bill_kind: HashMap<String, String>,
    /// Per bill kind receivable account. Payments are not allocated to
    /// bills, so they always credit the general `receivable`; an override
    /// account only accumulates charges and is relieved through `receivable`.
    pub receivable_by_bill_kind: HashMap<String, String>,
    /// Degraded mode: look roles up by account-name pattern when no code resolves
    pub pattern_fallback: bool,
    pub patterns: RolePatterns,
}

impl Default for AccountMapping {
    fn default() -> Self {
        Self {
            cash: Some("1000".to_string()),
            bank: Some("1010".to_string()),
            receivable: Some("1200".to_string()),
            scheme_receivable: Some("1210".to_string()),
            revenue: Some("4000".to_string()),
            service_revenue: Some("4100".to_string()),
            salary_payable: None,
            staff_medical_receivable: None,
            revenue_by_bill_kind: HashMap::new(),
            receivable_by_bill_kind: HashMap::new(),
            pattern_fallback: true,
            patterns: RolePatterns::default(),
        }
    }
}

/// Case-insensitive SQL `LIKE` patterns over account names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolePatterns {
    pub salary_payable: String,
    pub staff_medical_receivable: String,
}

impl Default for RolePatterns {
    fn default() -> Self {
        Self {
            salary_payable: "%Salary%Payable%".to_string(),
            staff_medical_receivable: "%Staff%Medical%Receivable%".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgingConfig {
    /// Payment methods that carry receivable risk
    pub eligible_methods: Vec<PatientPaymentMethod>,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            eligible_methods: vec![
                PatientPaymentMethod::Cash,
                PatientPaymentMethod::Corporate,
                PatientPaymentMethod::Scheme,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub hospital_name: String,
    pub email_webhook_url: Option<String>,
    pub sms_webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            hospital_name: "RustCare Hospital".to_string(),
            email_webhook_url: None,
            sms_webhook_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_standard_codes() {
        let config = AccountingConfig::default();
        assert_eq!(config.accounts.cash.as_deref(), Some("1000"));
        assert_eq!(config.accounts.receivable.as_deref(), Some("1200"));
        assert_eq!(config.accounts.revenue.as_deref(), Some("4000"));
        assert!(config.accounts.salary_payable.is_none());
        assert!(config.accounts.pattern_fallback);
        assert_eq!(config.aging.eligible_methods.len(), 3);
        assert!(!config.aging.eligible_methods.contains(&PatientPaymentMethod::Insurance));
    }

    #[test]
    fn test_load_from_toml_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("ledger-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[accounts]
revenue = "4050"
salary_payable = "2100"
pattern_fallback = false

[accounts.revenue_by_bill_kind]
pharmacy = "4020"

[aging]
eligible_methods = ["corporate"]
"#
        )
        .unwrap();

        let config = AccountingConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.accounts.revenue.as_deref(), Some("4050"));
        assert_eq!(config.accounts.salary_payable.as_deref(), Some("2100"));
        assert_eq!(config.accounts.cash.as_deref(), Some("1000"));
        assert!(!config.accounts.pattern_fallback);
        assert_eq!(config.accounts.revenue_by_bill_kind.get("pharmacy").map(String::as_str), Some("4020"));
        assert_eq!(config.aging.eligible_methods, vec![PatientPaymentMethod::Corporate]);
    }
}
