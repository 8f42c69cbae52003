use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::AccountingError;

/// Chart of Accounts - Account definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub code: String, // e.g., "1000", "1200", "4000"
    pub name: String,
    pub account_type: AccountType,
    pub parent_account_id: Option<Uuid>,
    /// Signed running balance in the account's normal direction
    pub balance: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            account_type,
            parent_account_id: None,
            balance: Decimal::ZERO,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_parent(mut self, parent_account_id: Uuid) -> Self {
        self.parent_account_id = Some(parent_account_id);
        self
    }
}

/// Account type in accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Asset and expense accounts grow with debits; the rest grow with credits.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }

    /// Balance change produced by one posting line against an account of this type.
    pub fn signed_delta(self, debit: Decimal, credit: Decimal) -> Decimal {
        if self.is_debit_normal() {
            debit - credit
        } else {
            credit - debit
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }
}

impl FromStr for AccountType {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(Self::Asset),
            "liability" => Ok(Self::Liability),
            "equity" => Ok(Self::Equity),
            "revenue" => Ok(Self::Revenue),
            "expense" => Ok(Self::Expense),
            other => Err(AccountingError::Storage(format!("unknown account type '{other}'"))),
        }
    }
}

/// Journal entry (double-entry bookkeeping)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub entry_number: String,
    pub entry_date: DateTime<Utc>,
    pub description: String,
    /// Business-event id the entry was posted for, e.g. "bill:opd:<uuid>"
    pub reference: Option<String>,
    pub status: JournalStatus,
    pub created_by: Option<Uuid>,
    pub posted_by: Option<Uuid>,
    pub posted_at: Option<DateTime<Utc>>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }
}

/// One side of a journal entry against a single account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: Uuid,
    pub journal_entry_id: Uuid,
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    pub memo: Option<String>,
}

/// Journal entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Draft,
    Posted,
    Reversed,
}

impl JournalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Reversed => "reversed",
        }
    }
}

impl FromStr for JournalStatus {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "posted" => Ok(Self::Posted),
            "reversed" => Ok(Self::Reversed),
            other => Err(AccountingError::Storage(format!("unknown journal status '{other}'"))),
        }
    }
}

/// Patient fields the engine reads; `balance` is a cached projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub payment_method: PatientPaymentMethod,
    pub balance: Decimal,
}

/// How a patient's care is paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientPaymentMethod {
    Cash,
    Corporate,
    Scheme,
    Insurance,
    Prepaid,
}

impl PatientPaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Corporate => "corporate",
            Self::Scheme => "scheme",
            Self::Insurance => "insurance",
            Self::Prepaid => "prepaid",
        }
    }
}

impl FromStr for PatientPaymentMethod {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "corporate" => Ok(Self::Corporate),
            "scheme" => Ok(Self::Scheme),
            "insurance" => Ok(Self::Insurance),
            "prepaid" => Ok(Self::Prepaid),
            other => Err(AccountingError::Storage(format!("unknown patient payment method '{other}'"))),
        }
    }
}

/// Bill type discriminator. Open-ended so new bill tables can be registered
/// without touching the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillKind(Cow<'static, str>);

impl BillKind {
    pub const OPD: BillKind = BillKind(Cow::Borrowed("opd"));
    pub const IPD: BillKind = BillKind(Cow::Borrowed("ipd"));
    pub const PHARMACY: BillKind = BillKind(Cow::Borrowed("pharmacy"));
    pub const LAB: BillKind = BillKind(Cow::Borrowed("lab"));
    pub const RADIOLOGY: BillKind = BillKind(Cow::Borrowed("radiology"));
    pub const THEATRE: BillKind = BillKind(Cow::Borrowed("theatre"));
    pub const MATERNITY: BillKind = BillKind(Cow::Borrowed("maternity"));
    pub const SPECIALIST: BillKind = BillKind(Cow::Borrowed("specialist"));

    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted bill, reduced to what the ledger needs from any bill type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    pub id: Uuid,
    pub kind: BillKind,
    pub patient_id: Uuid,
    pub gross_amount: Decimal,
    pub discount_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl BillRecord {
    pub fn net_amount(&self) -> Decimal {
        self.gross_amount - self.discount_amount
    }
}

/// Payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Cashier who took the payment
    pub received_by: Uuid,
    pub payment_date: DateTime<Utc>,
    pub reference: Option<String>,
}

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
    Cheque,
}

impl PaymentMethod {
    pub fn is_cash(self) -> bool {
        matches!(self, Self::Cash)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::MobileMoney => "mobile_money",
            Self::BankTransfer => "bank_transfer",
            Self::Cheque => "cheque",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "mobile_money" => Ok(Self::MobileMoney),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cheque" => Ok(Self::Cheque),
            other => Err(AccountingError::Storage(format!("unknown payment method '{other}'"))),
        }
    }
}

/// Staff payroll deduction recovering medical costs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollDeduction {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub status: DeductionStatus,
    /// Explicit staff-medical receivable; wins over role resolution
    pub receivable_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Payroll deduction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionStatus {
    Pending,
    Settled,
    Cancelled,
}

impl DeductionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for DeductionStatus {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "settled" => Ok(Self::Settled),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AccountingError::Storage(format!("unknown deduction status '{other}'"))),
        }
    }
}

/// Invoice raised against a payment scheme (corporate, government, insurer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeInvoice {
    pub id: Uuid,
    pub scheme_id: Uuid,
    pub invoice_number: String,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Aging bucket, keyed by its lower threshold in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "30")]
    Days30,
    #[serde(rename = "60")]
    Days60,
    #[serde(rename = "90")]
    Days90,
}

impl AgingBucket {
    /// Maps an age to its bucket; anything under 30 days is not overdue.
    pub fn from_age_days(age_days: i64) -> Option<Self> {
        match age_days {
            d if d >= 90 => Some(Self::Days90),
            d if d >= 60 => Some(Self::Days60),
            d if d >= 30 => Some(Self::Days30),
            _ => None,
        }
    }

    pub fn days(self) -> u32 {
        match self {
            Self::Days30 => 30,
            Self::Days60 => 60,
            Self::Days90 => 90,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Days30 => "30",
            Self::Days60 => "60",
            Self::Days90 => "90",
        }
    }
}

impl FromStr for AgingBucket {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30" => Ok(Self::Days30),
            "60" => Ok(Self::Days60),
            "90" => Ok(Self::Days90),
            other => Err(AccountingError::Storage(format!("unknown aging bucket '{other}'"))),
        }
    }
}

/// Channel(s) a reminder actually went out on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Email,
    Sms,
    EmailSms,
}

impl ReminderType {
    pub fn from_channels(email: bool, sms: bool) -> Option<Self> {
        match (email, sms) {
            (true, true) => Some(Self::EmailSms),
            (true, false) => Some(Self::Email),
            (false, true) => Some(Self::Sms),
            (false, false) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::EmailSms => "email_sms",
        }
    }
}

impl FromStr for ReminderType {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "email_sms" => Ok(Self::EmailSms),
            other => Err(AccountingError::Storage(format!("unknown reminder type '{other}'"))),
        }
    }
}

/// Idempotency guard: one row per (patient, bucket), ever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderLog {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub bucket: AgingBucket,
    pub reminder_type: ReminderType,
    pub amount: Decimal,
    pub sent_at: DateTime<Utc>,
}

/// Cashier shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub cashier_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub opening_cash: Decimal,
    pub closing_cash: Option<Decimal>,
    pub system_cash: Option<Decimal>,
    pub status: ShiftStatus,
}

/// Shift status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Open,
    Closed,
}

impl ShiftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for ShiftStatus {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(AccountingError::Storage(format!("unknown shift status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_delta_follows_normal_balance() {
        assert_eq!(AccountType::Asset.signed_delta(dec!(100), dec!(0)), dec!(100));
        assert_eq!(AccountType::Expense.signed_delta(dec!(0), dec!(40)), dec!(-40));
        assert_eq!(AccountType::Revenue.signed_delta(dec!(0), dec!(100)), dec!(100));
        assert_eq!(AccountType::Liability.signed_delta(dec!(25), dec!(0)), dec!(-25));
        assert_eq!(AccountType::Equity.signed_delta(dec!(0), dec!(10)), dec!(10));
    }

    #[test]
    fn test_aging_bucket_thresholds() {
        assert_eq!(AgingBucket::from_age_days(10), None);
        assert_eq!(AgingBucket::from_age_days(29), None);
        assert_eq!(AgingBucket::from_age_days(30), Some(AgingBucket::Days30));
        assert_eq!(AgingBucket::from_age_days(59), Some(AgingBucket::Days30));
        assert_eq!(AgingBucket::from_age_days(60), Some(AgingBucket::Days60));
        assert_eq!(AgingBucket::from_age_days(90), Some(AgingBucket::Days90));
        assert_eq!(AgingBucket::from_age_days(400), Some(AgingBucket::Days90));
        assert_eq!(AgingBucket::from_age_days(-3), None);
    }

    #[test]
    fn test_bill_net_amount() {
        let bill = BillRecord {
            id: Uuid::new_v4(),
            kind: BillKind::OPD,
            patient_id: Uuid::new_v4(),
            gross_amount: dec!(150.00),
            discount_amount: dec!(15.50),
            created_at: Utc::now(),
        };
        assert_eq!(bill.net_amount(), dec!(134.50));
    }

    #[test]
    fn test_reminder_type_from_channels() {
        assert_eq!(ReminderType::from_channels(true, true), Some(ReminderType::EmailSms));
        assert_eq!(ReminderType::from_channels(false, true), Some(ReminderType::Sms));
        assert_eq!(ReminderType::from_channels(false, false), None);
    }

    #[test]
    fn test_bill_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&BillKind::PHARMACY).unwrap();
        assert_eq!(json, "\"pharmacy\"");
        let custom: BillKind = serde_json::from_str("\"dental\"").unwrap();
        assert_eq!(custom, BillKind::new("dental"));
    }
}
