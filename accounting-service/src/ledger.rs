//! Journal Engine: the only code path that writes journal entries or moves
//! account balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

use crate::error::{AccountingError, AccountingResult};
use crate::models::{Account, AccountType, JournalEntry, JournalLine, JournalStatus};
use crate::reporting::AccountAudit;
use crate::store::UnitOfWork;

/// Money columns hold whole cents
const MONEY_SCALE: u32 = 2;

/// Header fields supplied by the caller of [`JournalEngine::post`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub reference: Option<String>,
    pub posted_by: Option<Uuid>,
}

impl EntryHeader {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            entry_date: Utc::now(),
            description: description.into(),
            reference: None,
            posted_by: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_entry_date(mut self, entry_date: DateTime<Utc>) -> Self {
        self.entry_date = entry_date;
        self
    }

    pub fn posted_by(mut self, user_id: Option<Uuid>) -> Self {
        self.posted_by = user_id;
        self
    }
}

/// An unposted journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDraft {
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    pub memo: Option<String>,
}

impl LineDraft {
    pub fn debit(account_id: Uuid, amount: Decimal) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Decimal::ZERO,
            memo: None,
        }
    }

    pub fn credit(account_id: Uuid, amount: Decimal) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: amount,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Check line shape and the double-entry invariant. Pure; runs before any
/// storage access.
///
/// # Errors
/// `InvalidEntry` for a malformed line set, `UnbalancedEntry` when
/// `Σdebit != Σcredit`.
pub fn validate_lines(lines: &[LineDraft]) -> AccountingResult<()> {
    if lines.len() < 2 {
        return Err(AccountingError::InvalidEntry(format!(
            "a journal entry needs at least 2 lines, got {}",
            lines.len()
        )));
    }

    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;
    for (index, line) in lines.iter().enumerate() {
        if line.debit.is_sign_negative() || line.credit.is_sign_negative() {
            return Err(AccountingError::InvalidEntry(format!(
                "line {index}: amounts must not be negative"
            )));
        }
        if line.debit.is_zero() == line.credit.is_zero() {
            return Err(AccountingError::InvalidEntry(format!(
                "line {index}: exactly one of debit or credit must be positive"
            )));
        }
        if line.debit.normalize().scale() > MONEY_SCALE || line.credit.normalize().scale() > MONEY_SCALE {
            return Err(AccountingError::InvalidEntry(format!(
                "line {index}: amounts carry more than {MONEY_SCALE} decimal places"
            )));
        }
        debits += line.debit;
        credits += line.credit;
    }

    if debits != credits {
        return Err(AccountingError::UnbalancedEntry { debits, credits });
    }
    Ok(())
}

/// Posts balanced entries and maintains running account balances
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalEngine;

impl JournalEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate, then persist the entry, its lines and the balance deltas
    /// inside `uow`. Nothing is written when validation fails; a storage
    /// failure part-way leaves the caller holding a unit of work that must
    /// be dropped.
    ///
    /// # Errors
    /// See [`validate_lines`]; `AccountNotFound`/`AccountInactive` for a bad
    /// account reference; any storage error.
    pub async fn post(
        &self,
        uow: &mut dyn UnitOfWork,
        header: EntryHeader,
        lines: Vec<LineDraft>,
    ) -> AccountingResult<JournalEntry> {
        validate_lines(&lines)?;

        // Ascending id order so concurrent postings never deadlock
        let mut account_ids: Vec<Uuid> = lines.iter().map(|l| l.account_id).collect();
        account_ids.sort_unstable();
        account_ids.dedup();

        let mut account_types: HashMap<Uuid, AccountType> = HashMap::with_capacity(account_ids.len());
        for account_id in account_ids {
            let account = uow
                .lock_account(account_id)
                .await?
                .ok_or_else(|| AccountingError::AccountNotFound(account_id.to_string()))?;
            if !account.is_active {
                return Err(AccountingError::AccountInactive(account.code));
            }
            account_types.insert(account.id, account.account_type);
        }

        let sequence = uow.next_entry_number().await?;
        let posted_at = Utc::now();
        let mut entry = JournalEntry {
            id: Uuid::new_v4(),
            entry_number: format!("JE-{sequence:08}"),
            entry_date: header.entry_date,
            description: header.description,
            reference: header.reference,
            status: JournalStatus::Posted,
            created_by: header.posted_by,
            posted_by: header.posted_by,
            posted_at: Some(posted_at),
            lines: Vec::with_capacity(lines.len()),
        };
        uow.insert_journal_entry(&entry).await?;

        let mut deltas: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for draft in lines {
            let account_type = account_types
                .get(&draft.account_id)
                .copied()
                .ok_or_else(|| AccountingError::AccountNotFound(draft.account_id.to_string()))?;
            *deltas.entry(draft.account_id).or_default() +=
                account_type.signed_delta(draft.debit, draft.credit);

            let line = JournalLine {
                id: Uuid::new_v4(),
                journal_entry_id: entry.id,
                account_id: draft.account_id,
                debit: draft.debit,
                credit: draft.credit,
                memo: draft.memo,
            };
            uow.insert_journal_line(&line).await?;
            entry.lines.push(line);
        }

        for (account_id, delta) in deltas {
            if !delta.is_zero() {
                uow.adjust_account_balance(account_id, delta).await?;
            }
        }

        info!(
            entry_number = %entry.entry_number,
            reference = entry.reference.as_deref().unwrap_or("-"),
            amount = %entry.total_debits(),
            lines = entry.lines.len(),
            "Journal entry posted"
        );
        Ok(entry)
    }

    /// Replay an account's posting history and compare with its stored balance.
    ///
    /// # Errors
    /// `AccountNotFound` for an unknown code; any storage error.
    pub async fn audit_account(&self, uow: &mut dyn UnitOfWork, code: &str) -> AccountingResult<AccountAudit> {
        let account = uow
            .find_account_by_code(code)
            .await?
            .ok_or_else(|| AccountingError::AccountNotFound(code.to_string()))?;
        self.audit(uow, account).await
    }

    /// Audit every account in the chart, ordered by code.
    ///
    /// # Errors
    /// Any storage error.
    pub async fn audit_all(&self, uow: &mut dyn UnitOfWork) -> AccountingResult<Vec<AccountAudit>> {
        let accounts = uow.list_accounts().await?;
        let mut audits = Vec::with_capacity(accounts.len());
        for account in accounts {
            audits.push(self.audit(uow, account).await?);
        }
        Ok(audits)
    }

    async fn audit(&self, uow: &mut dyn UnitOfWork, account: Account) -> AccountingResult<AccountAudit> {
        let recomputed: Decimal = uow
            .posted_lines_for_account(account.id)
            .await?
            .iter()
            .map(|line| account.account_type.signed_delta(line.debit, line.credit))
            .sum();

        Ok(AccountAudit {
            account_id: account.id,
            matches: recomputed == account.balance,
            code: account.code,
            name: account.name,
            stored: account.balance,
            recomputed,
        })
    }
}
