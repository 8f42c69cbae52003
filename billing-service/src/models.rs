use accounting_service::{BillKind, Billable};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Money is held to the cent
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(18,2)` money column holds
pub fn max_money() -> Decimal {
    Decimal::new(999_999_999_999_999_999, MONEY_SCALE)
}

pub(crate) fn check_money(what: &str, amount: Decimal) -> BillingResult<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BillingError::Validation(format!("{what} {amount} is negative")));
    }
    if amount > max_money() {
        return Err(BillingError::Validation(format!("{what} {amount} is too large")));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(BillingError::Validation(format!(
            "{what} {amount} has more than {MONEY_SCALE} decimal places"
        )));
    }
    Ok(())
}

/// Discount applied to one line item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Discount {
    Amount(Decimal),
    /// 0 to 100
    Percent(Decimal),
}

/// Billed line: quantity x unit price, less an optional discount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Option<Discount>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            discount: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    /// `None` when quantity x unit price overflows.
    pub fn checked_gross(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }

    /// Saturates at `Decimal::MAX`; `validate` rejects such lines.
    pub fn gross(&self) -> Decimal {
        self.checked_gross().unwrap_or(Decimal::MAX)
    }

    /// A percentage discount is rounded to the cent here and nowhere else.
    pub fn discount_amount(&self) -> Decimal {
        match self.discount {
            None => Decimal::ZERO,
            Some(Discount::Amount(amount)) => amount,
            Some(Discount::Percent(percent)) => self
                .gross()
                .checked_mul(percent)
                .and_then(|d| d.checked_div(Decimal::ONE_HUNDRED))
                .map_or(Decimal::MAX, |d| {
                    d.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
                }),
        }
    }

    pub fn net(&self) -> Decimal {
        self.gross().saturating_sub(self.discount_amount())
    }

    /// # Errors
    /// `Validation` for a non-positive quantity, a negative or sub-cent
    /// price, or a discount outside `0..=gross` / `0..=100%`.
    pub fn validate(&self) -> BillingResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(BillingError::Validation(format!(
                "'{}': quantity must be positive",
                self.description
            )));
        }
        check_money("unit price", self.unit_price)?;
        let gross = self.checked_gross().ok_or_else(|| {
            BillingError::Validation(format!("'{}': line total overflows", self.description))
        })?;
        check_money("line total", gross)?;

        match self.discount {
            Some(Discount::Percent(percent)) if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED => {
                Err(BillingError::Validation(format!(
                    "'{}': discount {percent}% is outside 0-100",
                    self.description
                )))
            }
            Some(Discount::Amount(amount)) => {
                check_money("discount", amount)?;
                if amount > self.gross() {
                    return Err(BillingError::Validation(format!(
                        "'{}': discount {amount} exceeds line total {}",
                        self.description,
                        self.gross()
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn items_gross(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::gross).fold(Decimal::ZERO, Decimal::saturating_add)
}

fn items_discount(items: &[LineItem]) -> Decimal {
    items
        .iter()
        .map(LineItem::discount_amount)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// A concrete bill billing can persist and hand to the ledger
pub trait BillDocument: Billable {
    fn items(&self) -> &[LineItem];

    /// # Errors
    /// `Validation` when a line is malformed.
    fn validate(&self) -> BillingResult<()> {
        self.items().iter().try_for_each(LineItem::validate)?;
        check_money("bill total", self.gross_amount())
    }
}

/// Itemised bill for a service department (OPD, lab, radiology, theatre,
/// maternity, specialist clinics)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBill {
    pub id: Uuid,
    pub kind: BillKind,
    pub patient_id: Uuid,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

impl ServiceBill {
    pub fn new(kind: BillKind, patient_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            patient_id,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }
}

impl Billable for ServiceBill {
    fn bill_id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> BillKind {
        self.kind.clone()
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn gross_amount(&self) -> Decimal {
        items_gross(&self.items)
    }

    fn discount_amount(&self) -> Decimal {
        items_discount(&self.items)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl BillDocument for ServiceBill {
    fn items(&self) -> &[LineItem] {
        &self.items
    }

    fn validate(&self) -> BillingResult<()> {
        if self.kind == BillKind::PHARMACY || self.kind == BillKind::IPD {
            return Err(BillingError::Validation(format!(
                "{} bills have their own bill type",
                self.kind
            )));
        }
        self.items.iter().try_for_each(LineItem::validate)?;
        check_money("bill total", self.gross_amount())
    }
}

/// Drugs dispensed against a prescription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyBill {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub prescription_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

impl PharmacyBill {
    pub fn new(patient_id: Uuid, prescription_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            prescription_id,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn dispense(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }
}

impl Billable for PharmacyBill {
    fn bill_id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> BillKind {
        BillKind::PHARMACY
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn gross_amount(&self) -> Decimal {
        items_gross(&self.items)
    }

    fn discount_amount(&self) -> Decimal {
        items_discount(&self.items)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl BillDocument for PharmacyBill {
    fn items(&self) -> &[LineItem] {
        &self.items
    }
}

/// Inpatient stay: bed days at the ward's daily rate plus itemised extras
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpdBill {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub admission_id: Uuid,
    pub bed_days: u32,
    pub daily_rate: Decimal,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

impl IpdBill {
    pub fn new(patient_id: Uuid, admission_id: Uuid, bed_days: u32, daily_rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            admission_id,
            bed_days,
            daily_rate,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    /// Saturates at `Decimal::MAX`; `validate` rejects such stays.
    pub fn accommodation(&self) -> Decimal {
        Decimal::from(self.bed_days)
            .checked_mul(self.daily_rate)
            .unwrap_or(Decimal::MAX)
    }
}

impl Billable for IpdBill {
    fn bill_id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> BillKind {
        BillKind::IPD
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn gross_amount(&self) -> Decimal {
        self.accommodation().saturating_add(items_gross(&self.items))
    }

    fn discount_amount(&self) -> Decimal {
        items_discount(&self.items)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl BillDocument for IpdBill {
    fn items(&self) -> &[LineItem] {
        &self.items
    }

    fn validate(&self) -> BillingResult<()> {
        check_money("daily rate", self.daily_rate)?;
        self.items.iter().try_for_each(LineItem::validate)?;
        check_money("bill total", self.gross_amount())
    }
}
