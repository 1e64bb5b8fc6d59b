// src/payment.rs
//! Payment bridge. There is no settlement backend: an intent is a pending
//! row in `payment_history`, and the client confirms it explicitly.

use crate::db::{self, Db};
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::models::{PaymentIntent, PaymentRecord, PaymentStatus, Subscription};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug)]
pub enum ConfirmOutcome {
    /// This call moved the payment to completed and credited the days.
    Activated(Subscription),
    AlreadyConfirmed,
    Failed,
}

pub async fn create(
    db: &Db,
    webapp_url: &str,
    user_id: i64,
    amount: f64,
    days: i64,
    now: DateTime<Utc>,
) -> AppResult<PaymentIntent> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::invalid("amount must be a positive number"));
    }
    ledger::validate_days(days)?;

    let payment_id = format!("payment_{}_{}", user_id, Uuid::new_v4().simple());
    let record = PaymentRecord {
        user_id,
        payment_id: payment_id.clone(),
        amount,
        days,
        status: PaymentStatus::Pending,
        created_at: now,
        completed_at: None,
    };
    db::insert_payment(db.pool(), &record).await?;

    tracing::info!(
        "Created payment {} for user {}: {} for {} days",
        payment_id,
        user_id,
        amount,
        days
    );

    Ok(PaymentIntent {
        payment_url: format!(
            "{}/payment?payment_id={}",
            webapp_url.trim_end_matches('/'),
            payment_id
        ),
        payment_id,
        amount,
        days,
        status: PaymentStatus::Pending,
    })
}

/// Resolves a payment. The pending -> completed flip is a conditional
/// update, and activation runs in the same transaction, so concurrent
/// confirms for one payment id credit the days exactly once.
pub async fn confirm(
    db: &Db,
    payment_id: &str,
    user_id: i64,
    now: DateTime<Utc>,
) -> AppResult<ConfirmOutcome> {
    let mut tx = db.pool().begin().await?;

    let claimed = db::claim_pending_payment(&mut *tx, payment_id, user_id, now).await?;
    if claimed == 0 {
        let record = db::find_payment(&mut *tx, payment_id).await?;
        tx.rollback().await?;

        return match record {
            None => Err(AppError::not_found("Payment not found")),
            Some(r) if r.user_id != user_id => Err(AppError::invalid(
                "Payment does not belong to this user",
            )),
            Some(r) => match r.status {
                PaymentStatus::Completed => Ok(ConfirmOutcome::AlreadyConfirmed),
                PaymentStatus::Failed => Ok(ConfirmOutcome::Failed),
                PaymentStatus::Pending => {
                    Err(AppError::Internal("Payment could not be claimed".into()))
                }
            },
        };
    }

    let record = db::find_payment(&mut *tx, payment_id)
        .await?
        .ok_or_else(|| AppError::Internal("Payment vanished while confirming".into()))?;
    let sub = ledger::activate_in(&mut tx, user_id, record.days, payment_id, now).await?;
    tx.commit().await?;

    tracing::info!("Payment {} confirmed for user {}", payment_id, user_id);
    Ok(ConfirmOutcome::Activated(sub))
}
