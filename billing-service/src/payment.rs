use accounting_service::{PaymentMethod, PaymentRecord};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BillingResult;
use crate::models::check_money;

/// Money received at a till against a patient's account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub patient_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Cashier who took the money
    pub received_by: Uuid,
    pub reference: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

impl PaymentRequest {
    pub fn new(patient_id: Uuid, amount: Decimal, payment_method: PaymentMethod, received_by: Uuid) -> Self {
        Self {
            patient_id,
            amount,
            payment_method,
            received_by,
            reference: None,
            received_at: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }

    /// # Errors
    /// `Validation` for a negative or sub-cent amount.
    pub fn into_record(self) -> BillingResult<PaymentRecord> {
        check_money("payment amount", self.amount)?;
        Ok(PaymentRecord {
            id: Uuid::new_v4(),
            patient_id: self.patient_id,
            amount: self.amount,
            payment_method: self.payment_method,
            received_by: self.received_by,
            payment_date: self.received_at.unwrap_or_else(Utc::now),
            reference: self.reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_negative_payment_is_rejected() {
        let request = PaymentRequest::new(Uuid::new_v4(), dec!(-5), PaymentMethod::Cash, Uuid::new_v4());
        assert!(matches!(request.into_record(), Err(BillingError::Validation(_))));
    }

    #[test]
    fn test_record_keeps_cashier_and_reference() {
        let cashier = Uuid::new_v4();
        let record = PaymentRequest::new(Uuid::new_v4(), dec!(120.50), PaymentMethod::MobileMoney, cashier)
            .with_reference("MPESA-QX81")
            .into_record()
            .unwrap();
        assert_eq!(record.received_by, cashier);
        assert_eq!(record.reference.as_deref(), Some("MPESA-QX81"));
        assert_eq!(record.amount, dec!(120.50));
    }
}
