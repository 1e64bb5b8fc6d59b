// src/ledger.rs
//! Subscription ledger: reads and mutates the single subscription row of a
//! user and derives day counts from it.
//!
//! Expiry is never written back. A row whose stored status is `active` but
//! whose end lies in the past reads as `inactive` here and in the access
//! gate, while the stored field keeps saying `active`.

use crate::db::{self, Db};
use crate::error::{AppError, AppResult};
use crate::models::{Subscription, SubscriptionStatus, SubscriptionView, UserSummary};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

/// Upper bound for a single grant of days.
pub const MAX_GRANT_DAYS: i64 = 3650;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub fn effective_status(sub: &Subscription, now: DateTime<Utc>) -> SubscriptionStatus {
    match (sub.status, sub.end_at) {
        (SubscriptionStatus::Active, Some(end)) if end > now => SubscriptionStatus::Active,
        _ => SubscriptionStatus::Inactive,
    }
}

/// Whole days left, rounded up. Zero unless the row is effectively active.
pub fn days_remaining(sub: &Subscription, now: DateTime<Utc>) -> i64 {
    match (effective_status(sub, now), sub.end_at) {
        (SubscriptionStatus::Active, Some(end)) => ceil_days(end - now),
        _ => 0,
    }
}

fn ceil_days(left: Duration) -> i64 {
    let ms = left.num_milliseconds();
    if ms <= 0 { 0 } else { (ms + DAY_MS - 1) / DAY_MS }
}

pub fn validate_days(days: i64) -> AppResult<()> {
    if days < 1 {
        return Err(AppError::invalid("days must be a positive integer"));
    }
    if days > MAX_GRANT_DAYS {
        return Err(AppError::invalid(format!(
            "days must not exceed {}",
            MAX_GRANT_DAYS
        )));
    }
    Ok(())
}

fn shift(base: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    base.checked_add_signed(Duration::days(days))
        .ok_or_else(|| AppError::invalid("Resulting subscription end is out of range"))
}

pub async fn get_status(db: &Db, user_id: i64, now: DateTime<Utc>) -> AppResult<SubscriptionView> {
    let Some(sub) = db::find_subscription(db.pool(), user_id).await? else {
        return Ok(SubscriptionView {
            status: SubscriptionStatus::Inactive,
            subscription_start: None,
            subscription_end: None,
            days_remaining: 0,
            payment_id: None,
            history: Vec::new(),
        });
    };

    let history = db::list_payments_for_user(db.pool(), user_id).await?;

    Ok(SubscriptionView {
        status: effective_status(&sub, now),
        subscription_start: sub.start_at,
        subscription_end: sub.end_at,
        days_remaining: days_remaining(&sub, now),
        payment_id: sub.payment_id,
        history,
    })
}

#[cfg(test)]
pub async fn activate(
    db: &Db,
    user_id: i64,
    days: i64,
    payment_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    let mut tx = db.pool().begin().await?;
    let sub = activate_in(&mut tx, user_id, days, payment_id, now).await?;
    tx.commit().await?;
    Ok(sub)
}

/// Activation on a caller-owned connection, so the payment bridge can run it
/// inside the same transaction that claims the payment.
pub(crate) async fn activate_in(
    conn: &mut SqliteConnection,
    user_id: i64,
    days: i64,
    payment_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    validate_days(days)?;

    let existing = db::find_subscription(&mut *conn, user_id).await?;
    let current_end = existing
        .as_ref()
        .filter(|sub| effective_status(sub, now) == SubscriptionStatus::Active)
        .and_then(|sub| sub.end_at);

    match current_end {
        Some(end) => {
            let new_end = shift(end, days)?;
            db::extend_subscription(&mut *conn, user_id, new_end, Some(payment_id), now).await?;
            tracing::info!(
                "Extended subscription for user {} to {} (payment {})",
                user_id,
                new_end,
                payment_id
            );
        }
        None => {
            let new_end = shift(now, days)?;
            db::replace_with_active(&mut *conn, user_id, now, new_end, payment_id, now).await?;
            tracing::info!(
                "Activated subscription for user {} until {} (payment {})",
                user_id,
                new_end,
                payment_id
            );
        }
    }

    db::record_completed_payment(&mut *conn, user_id, payment_id, days, now).await?;

    db::find_subscription(&mut *conn, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Subscription vanished after activation".into()))
}

/// Marks the row cancelled and leaves its dates alone. Returns whether a row
/// existed; cancelling a user without one is a no-op.
pub async fn cancel(db: &Db, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    let changed =
        db::update_subscription_status(db.pool(), user_id, SubscriptionStatus::Cancelled, now)
            .await?;
    if changed > 0 {
        tracing::info!("Cancelled subscription for user {}", user_id);
    }
    Ok(changed > 0)
}

pub async fn add_days(
    db: &Db,
    user_id: i64,
    days: i64,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    validate_days(days)?;

    let mut tx = db.pool().begin().await?;
    // Write before reading: a read-first deferred transaction fails with
    // SQLITE_BUSY_SNAPSHOT when another writer commits in between.
    if db::touch_subscription(&mut *tx, user_id, now).await? == 0 {
        return Err(AppError::not_found("Subscription not found"));
    }
    let sub = db::find_subscription(&mut *tx, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Subscription vanished after update".into()))?;

    let base = sub.end_at.map_or(now, |end| end.max(now));
    let new_end = shift(base, days)?;
    db::extend_subscription(&mut *tx, user_id, new_end, None, now).await?;

    let updated = db::find_subscription(&mut *tx, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Subscription vanished after update".into()))?;
    tx.commit().await?;

    tracing::info!("Admin added {} days for user {}, new end {}", days, user_id, new_end);
    Ok(updated)
}

/// Admin escape hatch. Writes status and end verbatim, without checking
/// that they agree with each other.
pub async fn set_subscription(
    db: &Db,
    user_id: i64,
    status: SubscriptionStatus,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    db::upsert_subscription(db.pool(), user_id, status, end, now).await?;
    tracing::info!("Admin set subscription for user {} to {:?}", user_id, status);
    db::find_subscription(db.pool(), user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Subscription vanished after update".into()))
}

/// Subscription holders (newest first) followed by users known only from
/// their messages.
pub async fn list_users(db: &Db, now: DateTime<Utc>) -> AppResult<Vec<UserSummary>> {
    let subscriptions = db::list_subscriptions(db.pool()).await?;
    let message_only = db::list_message_only_users(db.pool()).await?;

    let mut users: Vec<UserSummary> = subscriptions
        .iter()
        .map(|sub| {
            let status = effective_status(sub, now);
            UserSummary {
                user_id: sub.user_id,
                status,
                stored_status: sub.status,
                subscription_start: sub.start_at,
                subscription_end: sub.end_at,
                days_remaining: days_remaining(sub, now),
                has_access: status == SubscriptionStatus::Active,
                created_at: Some(sub.created_at),
            }
        })
        .collect();

    users.extend(message_only.into_iter().map(|user_id| UserSummary {
        user_id,
        status: SubscriptionStatus::Inactive,
        stored_status: SubscriptionStatus::Inactive,
        subscription_start: None,
        subscription_end: None,
        days_remaining: 0,
        has_access: false,
        created_at: None,
    }));

    Ok(users)
}
