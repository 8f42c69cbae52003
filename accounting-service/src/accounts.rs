//! GL role resolution and the standard hospital chart of accounts.
//!
//! Posting rules never hard-code account ids. They ask an [`AccountResolver`]
//! for a logical [`AccountRole`], which maps to an account code through
//! configuration. Name-pattern lookup is kept only as a degraded fallback
//! for roles that have no code configured.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::AccountMapping;
use crate::error::{AccountingError, AccountingResult};
use crate::models::{Account, AccountType, BillKind};
use crate::reporting::SeedReport;
use crate::store::UnitOfWork;

/// Logical GL target a posting rule needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Cash,
    Bank,
    Receivable,
    SchemeReceivable,
    Revenue,
    ServiceRevenue,
    SalaryPayable,
    StaffMedicalReceivable,
}

impl AccountRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Bank => "bank",
            Self::Receivable => "receivable",
            Self::SchemeReceivable => "scheme_receivable",
            Self::Revenue => "revenue",
            Self::ServiceRevenue => "service_revenue",
            Self::SalaryPayable => "salary_payable",
            Self::StaffMedicalReceivable => "staff_medical_receivable",
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves roles to active accounts inside a unit of work
#[derive(Debug, Clone, Default)]
pub struct AccountResolver {
    mapping: AccountMapping,
}

impl AccountResolver {
    pub fn new(mapping: AccountMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &AccountMapping {
        &self.mapping
    }

    /// Configured account code for a role. Revenue and receivable honour
    /// per bill kind overrides before the general code.
    pub fn configured_code(&self, role: AccountRole, kind: Option<&BillKind>) -> Option<&str> {
        let m = &self.mapping;
        match role {
            AccountRole::Cash => m.cash.as_deref(),
            AccountRole::Bank => m.bank.as_deref(),
            AccountRole::Receivable => {
                override_for(&m.receivable_by_bill_kind, kind).or(m.receivable.as_deref())
            }
            AccountRole::SchemeReceivable => m.scheme_receivable.as_deref(),
            AccountRole::Revenue => override_for(&m.revenue_by_bill_kind, kind).or(m.revenue.as_deref()),
            AccountRole::ServiceRevenue => m.service_revenue.as_deref(),
            AccountRole::SalaryPayable => m.salary_payable.as_deref(),
            AccountRole::StaffMedicalReceivable => m.staff_medical_receivable.as_deref(),
        }
    }

    fn name_pattern(&self, role: AccountRole) -> Option<&str> {
        match role {
            AccountRole::SalaryPayable => Some(self.mapping.patterns.salary_payable.as_str()),
            AccountRole::StaffMedicalReceivable => {
                Some(self.mapping.patterns.staff_medical_receivable.as_str())
            }
            _ => None,
        }
    }

    /// Resolve a role, returning `None` when no active account matches.
    pub async fn try_resolve(
        &self,
        uow: &mut dyn UnitOfWork,
        role: AccountRole,
        kind: Option<&BillKind>,
    ) -> AccountingResult<Option<Account>> {
        if let Some(code) = self.configured_code(role, kind) {
            return match uow.find_account_by_code(code).await? {
                Some(account) if account.is_active => Ok(Some(account)),
                Some(_) => {
                    debug!(role = %role, code, "Configured account is inactive");
                    Ok(None)
                }
                None => Ok(None),
            };
        }

        if !self.mapping.pattern_fallback {
            return Ok(None);
        }
        let Some(pattern) = self.name_pattern(role) else {
            return Ok(None);
        };
        let found = uow.find_account_by_name_pattern(pattern).await?;
        if let Some(account) = &found {
            warn!(
                role = %role,
                pattern,
                code = %account.code,
                "GL role resolved by name pattern; configure an explicit account code"
            );
        }
        Ok(found)
    }

    /// Resolve a role that the caller cannot post without.
    ///
    /// # Errors
    /// `AccountNotConfigured` when no active account matches.
    pub async fn resolve(
        &self,
        uow: &mut dyn UnitOfWork,
        role: AccountRole,
        kind: Option<&BillKind>,
    ) -> AccountingResult<Account> {
        match self.try_resolve(uow, role, kind).await? {
            Some(account) => Ok(account),
            None => Err(AccountingError::AccountNotConfigured {
                role: role.to_string(),
                code: self
                    .configured_code(role, kind)
                    .unwrap_or("<unmapped>")
                    .to_string(),
            }),
        }
    }
}

fn override_for<'a>(table: &'a HashMap<String, String>, kind: Option<&BillKind>) -> Option<&'a str> {
    kind.and_then(|k| table.get(k.as_str())).map(String::as_str)
}

/// One account in a seedable chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_code: Option<String>,
}

impl AccountSeed {
    pub fn new(code: &str, name: &str, account_type: AccountType) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            parent_code: None,
        }
    }

    pub fn under(mut self, parent_code: &str) -> Self {
        self.parent_code = Some(parent_code.to_string());
        self
    }
}

/// Ordered chart of accounts; parents always precede their children
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    seeds: Vec<AccountSeed>,
}

impl ChartOfAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard_hospital() -> Self {
        use AccountType::{Asset, Equity, Liability, Revenue};

        let seeds = vec![
            AccountSeed::new("1000", "Cash on Hand", Asset),
            AccountSeed::new("1010", "Bank", Asset),
            AccountSeed::new("1200", "Patient Receivables", Asset),
            AccountSeed::new("1210", "Scheme Receivables", Asset).under("1200"),
            AccountSeed::new("1300", "Staff Medical Receivable", Asset),
            AccountSeed::new("2100", "Salary Payable", Liability),
            AccountSeed::new("3000", "Retained Earnings", Equity),
            AccountSeed::new("4000", "Patient Service Revenue", Revenue),
            AccountSeed::new("4010", "OPD Revenue", Revenue).under("4000"),
            AccountSeed::new("4020", "Pharmacy Revenue", Revenue).under("4000"),
            AccountSeed::new("4030", "Inpatient Revenue", Revenue).under("4000"),
            AccountSeed::new("4040", "Laboratory Revenue", Revenue).under("4000"),
            AccountSeed::new("4050", "Radiology Revenue", Revenue).under("4000"),
            AccountSeed::new("4060", "Theatre Revenue", Revenue).under("4000"),
            AccountSeed::new("4070", "Maternity Revenue", Revenue).under("4000"),
            AccountSeed::new("4080", "Specialist Clinic Revenue", Revenue).under("4000"),
            AccountSeed::new("4100", "Scheme Service Revenue", Revenue),
        ];
        Self { seeds }
    }

    pub fn push(&mut self, seed: AccountSeed) -> &mut Self {
        self.seeds.push(seed);
        self
    }

    pub fn seeds(&self) -> &[AccountSeed] {
        &self.seeds
    }
}

/// Insert every account of `chart` whose code does not exist yet.
///
/// # Errors
/// `AccountNotFound` when a seed names a parent code that is neither in the
/// store nor earlier in the chart.
pub async fn seed_accounts(
    uow: &mut dyn UnitOfWork,
    chart: &ChartOfAccounts,
) -> AccountingResult<SeedReport> {
    let mut report = SeedReport::default();

    for seed in chart.seeds() {
        if uow.find_account_by_code(&seed.code).await?.is_some() {
            report.existing += 1;
            continue;
        }

        let mut account = Account::new(seed.code.clone(), seed.name.clone(), seed.account_type);
        if let Some(parent_code) = &seed.parent_code {
            let parent = uow
                .find_account_by_code(parent_code)
                .await?
                .ok_or_else(|| AccountingError::AccountNotFound(parent_code.clone()))?;
            account = account.with_parent(parent.id);
        }

        uow.insert_account(&account).await?;
        report.created.push(seed.code.clone());
    }

    info!(
        created = report.created.len(),
        existing = report.existing,
        "Chart of accounts seeded"
    );
    Ok(report)
}
