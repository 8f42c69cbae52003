//! Cashier shift reconciliation.
//!
//! A read-side check over payments already posted: the cash a cashier should
//! hold is the opening float plus every cash payment they took during the
//! shift window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AccountingError, AccountingResult};
use crate::models::{Shift, ShiftStatus};
use crate::store::LedgerStore;

/// Result of closing a shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftReconciliation {
    pub shift: Shift,
    pub system_cash: Decimal,
    pub expected: Decimal,
    pub actual: Decimal,
    /// `actual - expected`; positive means surplus
    pub variance: Decimal,
}

/// Interim view of a shift (X-report); nothing is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub shift: Shift,
    pub as_of: DateTime<Utc>,
    pub system_cash: Decimal,
    pub expected: Decimal,
    pub counted: Option<Decimal>,
    pub variance: Option<Decimal>,
}

pub struct ShiftReconciler {
    store: Arc<dyn LedgerStore>,
}

impl ShiftReconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `ShiftAlreadyOpen` when the cashier has an open shift.
    pub async fn start_shift(&self, cashier_id: Uuid, opening_cash: Decimal) -> AccountingResult<Shift> {
        self.start_shift_at(cashier_id, opening_cash, Utc::now()).await
    }

    /// Open a shift at an explicit time. Serialized per cashier, so two
    /// concurrent starts cannot both succeed.
    ///
    /// # Errors
    /// `Validation` for a negative float; `ShiftAlreadyOpen`.
    pub async fn start_shift_at(
        &self,
        cashier_id: Uuid,
        opening_cash: Decimal,
        start_time: DateTime<Utc>,
    ) -> AccountingResult<Shift> {
        if opening_cash.is_sign_negative() && !opening_cash.is_zero() {
            return Err(AccountingError::Validation(format!(
                "opening cash {opening_cash} must not be negative"
            )));
        }

        let mut uow = self.store.begin().await?;
        uow.lock_cashier(cashier_id).await?;
        if let Some(open) = uow.open_shift_for_cashier(cashier_id).await? {
            return Err(AccountingError::ShiftAlreadyOpen {
                cashier_id,
                shift_id: open.id,
            });
        }

        let shift = Shift {
            id: Uuid::new_v4(),
            cashier_id,
            start_time,
            end_time: None,
            opening_cash,
            closing_cash: None,
            system_cash: None,
            status: ShiftStatus::Open,
        };
        uow.insert_shift(&shift).await?;
        uow.commit().await?;

        info!(
            shift_id = %shift.id,
            cashier_id = %cashier_id,
            opening_cash = %opening_cash,
            "Shift opened"
        );
        Ok(shift)
    }

    /// # Errors
    /// `ShiftNotFound`, `ShiftNotOpen`.
    pub async fn end_shift(&self, shift_id: Uuid, closing_cash: Decimal) -> AccountingResult<ShiftReconciliation> {
        self.end_shift_at(shift_id, closing_cash, Utc::now()).await
    }

    /// Close a shift, counting cash payments in `[start_time, end_time]`.
    ///
    /// # Errors
    /// `Validation` for negative closing cash; `ShiftNotFound`; `ShiftNotOpen`.
    pub async fn end_shift_at(
        &self,
        shift_id: Uuid,
        closing_cash: Decimal,
        end_time: DateTime<Utc>,
    ) -> AccountingResult<ShiftReconciliation> {
        if closing_cash.is_sign_negative() && !closing_cash.is_zero() {
            return Err(AccountingError::Validation(format!(
                "closing cash {closing_cash} must not be negative"
            )));
        }

        let mut uow = self.store.begin().await?;
        let mut shift = uow
            .lock_shift(shift_id)
            .await?
            .ok_or(AccountingError::ShiftNotFound(shift_id))?;
        if shift.status != ShiftStatus::Open {
            return Err(AccountingError::ShiftNotOpen(shift_id));
        }

        let system_cash = uow
            .cash_received_between(shift.cashier_id, shift.start_time, end_time)
            .await?;
        let expected = shift.opening_cash + system_cash;
        let variance = closing_cash - expected;

        shift.end_time = Some(end_time);
        shift.closing_cash = Some(closing_cash);
        shift.system_cash = Some(system_cash);
        shift.status = ShiftStatus::Closed;
        uow.update_shift(&shift).await?;
        uow.commit().await?;

        if variance.is_zero() {
            info!(shift_id = %shift_id, expected = %expected, "Shift closed, cash balanced");
        } else {
            warn!(
                shift_id = %shift_id,
                cashier_id = %shift.cashier_id,
                expected = %expected,
                actual = %closing_cash,
                variance = %variance,
                "Shift closed with cash variance"
            );
        }

        Ok(ShiftReconciliation {
            shift,
            system_cash,
            expected,
            actual: closing_cash,
            variance,
        })
    }

    /// Expected cash so far, optionally against a counted amount. For a
    /// closed shift the window ends at its recorded end time.
    ///
    /// # Errors
    /// `ShiftNotFound`.
    pub async fn summary(&self, shift_id: Uuid, counted: Option<Decimal>) -> AccountingResult<ShiftSummary> {
        let mut uow = self.store.begin().await?;
        let shift = uow
            .lock_shift(shift_id)
            .await?
            .ok_or(AccountingError::ShiftNotFound(shift_id))?;

        let as_of = shift.end_time.unwrap_or_else(Utc::now);
        let system_cash = uow
            .cash_received_between(shift.cashier_id, shift.start_time, as_of)
            .await?;
        let expected = shift.opening_cash + system_cash;

        Ok(ShiftSummary {
            shift,
            as_of,
            system_cash,
            expected,
            counted,
            variance: counted.map(|c| c - expected),
        })
    }

    /// The cashier's open shift, if any.
    ///
    /// # Errors
    /// Storage errors only; a cashier with no open shift is `Ok(None)`.
    pub async fn current_shift(&self, cashier_id: Uuid) -> AccountingResult<Option<Shift>> {
        let mut uow = self.store.begin().await?;
        uow.open_shift_for_cashier(cashier_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_current_shift_follows_open_and_close() {
        let reconciler = ShiftReconciler::new(Arc::new(MemoryLedgerStore::new()));
        let cashier = Uuid::new_v4();
        assert!(reconciler.current_shift(cashier).await.unwrap().is_none());

        let shift = reconciler.start_shift(cashier, dec!(50)).await.unwrap();
        let open = reconciler.current_shift(cashier).await.unwrap().unwrap();
        assert_eq!(open.id, shift.id);
        assert!(reconciler.current_shift(Uuid::new_v4()).await.unwrap().is_none());

        reconciler.end_shift(shift.id, dec!(50)).await.unwrap();
        assert!(reconciler.current_shift(cashier).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let reconciler = ShiftReconciler::new(Arc::new(MemoryLedgerStore::new()));
        let cashier = Uuid::new_v4();

        let first = reconciler.start_shift(cashier, dec!(100)).await.unwrap();
        let err = reconciler.start_shift(cashier, dec!(100)).await.unwrap_err();
        assert!(matches!(
            err,
            AccountingError::ShiftAlreadyOpen { shift_id, .. } if shift_id == first.id
        ));

        // another cashier is unaffected
        reconciler.start_shift(Uuid::new_v4(), dec!(0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_end_twice_fails_and_cashier_can_reopen() {
        let reconciler = ShiftReconciler::new(Arc::new(MemoryLedgerStore::new()));
        let cashier = Uuid::new_v4();
        let shift = reconciler.start_shift(cashier, dec!(50)).await.unwrap();

        let closed = reconciler.end_shift(shift.id, dec!(50)).await.unwrap();
        assert_eq!(closed.variance, dec!(0));
        assert_eq!(closed.shift.status, ShiftStatus::Closed);

        let err = reconciler.end_shift(shift.id, dec!(50)).await.unwrap_err();
        assert!(matches!(err, AccountingError::ShiftNotOpen(_)));

        assert!(reconciler.current_shift(cashier).await.unwrap().is_none());
        reconciler.start_shift(cashier, dec!(20)).await.unwrap();
        assert!(reconciler.current_shift(cashier).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_shift_and_negative_float() {
        let reconciler = ShiftReconciler::new(Arc::new(MemoryLedgerStore::new()));
        assert!(matches!(
            reconciler.end_shift(Uuid::new_v4(), dec!(1)).await,
            Err(AccountingError::ShiftNotFound(_))
        ));
        assert!(matches!(
            reconciler.start_shift(Uuid::new_v4(), dec!(-1)).await,
            Err(AccountingError::Validation(_))
        ));
    }
}
