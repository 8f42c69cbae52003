use accounting_service::SchemeInvoice;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{check_money, LineItem};

/// Invoice to a corporate, government or insurance scheme for services
/// rendered to its members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeInvoiceRequest {
    pub scheme_id: Uuid,
    pub invoice_number: String,
    pub items: Vec<LineItem>,
}

impl SchemeInvoiceRequest {
    pub fn new(scheme_id: Uuid, invoice_number: impl Into<String>) -> Self {
        Self {
            scheme_id,
            invoice_number: invoice_number.into(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::net).sum()
    }

    /// # Errors
    /// `Validation` for a blank invoice number or a malformed line.
    pub fn into_invoice(self) -> BillingResult<SchemeInvoice> {
        if self.invoice_number.trim().is_empty() {
            return Err(BillingError::Validation("invoice number is required".to_string()));
        }
        for item in &self.items {
            item.validate()?;
        }
        let total_amount = self.total();
        check_money("invoice total", total_amount)?;

        Ok(SchemeInvoice {
            id: Uuid::new_v4(),
            scheme_id: self.scheme_id,
            invoice_number: self.invoice_number,
            total_amount,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Discount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_is_net_of_line_discounts() {
        let invoice = SchemeInvoiceRequest::new(Uuid::new_v4(), "KPLC-2024-06")
            .with_item(LineItem::new("Member consultations", dec!(40), dec!(1500)))
            .with_item(
                LineItem::new("Member lab work", dec!(12), dec!(800)).with_discount(Discount::Percent(dec!(12.5))),
            )
            .into_invoice()
            .unwrap();
        assert_eq!(invoice.total_amount, dec!(68400));
    }

    #[test]
    fn test_blank_invoice_number() {
        let request = SchemeInvoiceRequest::new(Uuid::new_v4(), "  ");
        assert!(request.into_invoice().is_err());
    }
}
