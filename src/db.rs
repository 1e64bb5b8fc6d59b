// src/db.rs
use crate::error::{AppError, AppResult};
use crate::models::{
    BookOfMonth, Magazine, Message, MessageDirection, PaymentRecord, PaymentStatus, Subscription,
    SubscriptionStatus,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteExecutor;
use std::path::Path;
use std::time::Duration;

/// Store handle. Built once in `main` and passed to every handler; tests
/// build their own in-memory instance.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn open(path: &str) -> AppResult<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::Internal(format!("{}: {}", path, e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Connected to SQLite database at {}", path);
        Self::migrate(pool).await
    }

    /// Private in-memory database. Pinned to a single connection that never
    /// expires, since every new SQLite memory connection starts empty.
    #[cfg(test)]
    pub async fn in_memory() -> AppResult<Self> {
        let options: SqliteConnectOptions = "sqlite://?mode=memory&cache=private".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> AppResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Subscriptions

const SUBSCRIPTION_COLUMNS: &str =
    "user_id, status, start_at, end_at, payment_id, created_at, updated_at";

pub async fn find_subscription<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(&format!(
        "SELECT {} FROM subscriptions WHERE user_id = ?",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(ex)
    .await
}

pub async fn list_subscriptions<'e>(
    ex: impl SqliteExecutor<'e>,
) -> Result<Vec<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(&format!(
        "SELECT {} FROM subscriptions ORDER BY created_at DESC, id DESC",
        SUBSCRIPTION_COLUMNS
    ))
    .fetch_all(ex)
    .await
}

/// Writes a fresh active period, creating the row if needed. `created_at`
/// survives on an existing row.
pub async fn replace_with_active<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    payment_id: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO subscriptions (user_id, status, start_at, end_at, payment_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             status = excluded.status,
             start_at = excluded.start_at,
             end_at = excluded.end_at,
             payment_id = excluded.payment_id,
             updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(SubscriptionStatus::Active)
    .bind(start)
    .bind(end)
    .bind(payment_id)
    .bind(now)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(())
}

/// Moves `end_at` of an existing row and forces it active. A missing
/// `start_at` is filled with `now`; `payment_id` is only replaced when given.
pub async fn extend_subscription<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    end: DateTime<Utc>,
    payment_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE subscriptions
         SET end_at = ?,
             status = ?,
             start_at = COALESCE(start_at, ?),
             payment_id = COALESCE(?, payment_id),
             updated_at = ?
         WHERE user_id = ?",
    )
    .bind(end)
    .bind(SubscriptionStatus::Active)
    .bind(now)
    .bind(payment_id)
    .bind(now)
    .bind(user_id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// Bumps `updated_at` only. Run first in a transaction to take the write
/// lock before reading the row.
pub async fn touch_subscription<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE subscriptions SET updated_at = ? WHERE user_id = ?")
        .bind(now)
        .bind(user_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn update_subscription_status<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ? WHERE user_id = ?")
            .bind(status)
            .bind(now)
            .bind(user_id)
            .execute(ex)
            .await?;
    Ok(result.rows_affected())
}

/// Admin override: status and end are written exactly as given.
pub async fn upsert_subscription<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    status: SubscriptionStatus,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO subscriptions (user_id, status, end_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             status = excluded.status,
             end_at = excluded.end_at,
             updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(status)
    .bind(end)
    .bind(now)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(())
}

/// Users that have sent messages but never had a subscription row.
pub async fn list_message_only_users<'e>(
    ex: impl SqliteExecutor<'e>,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT user_id FROM messages
         WHERE user_id NOT IN (SELECT user_id FROM subscriptions)
         ORDER BY user_id",
    )
    .fetch_all(ex)
    .await
}

/// Everyone who ever had a subscription row or wrote a message.
pub async fn list_known_user_ids<'e>(
    ex: impl SqliteExecutor<'e>,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT user_id FROM subscriptions
         UNION
         SELECT user_id FROM messages
         ORDER BY user_id",
    )
    .fetch_all(ex)
    .await
}

pub async fn has_active_subscription<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
             SELECT 1 FROM subscriptions
             WHERE user_id = ?
               AND status = ?
               AND end_at IS NOT NULL
               AND julianday(end_at) > julianday(?)
         )",
    )
    .bind(user_id)
    .bind(SubscriptionStatus::Active)
    .bind(now)
    .fetch_one(ex)
    .await
}

// Payments

const PAYMENT_COLUMNS: &str = "user_id, payment_id, amount, days, status, created_at, completed_at";

pub async fn insert_payment<'e>(
    ex: impl SqliteExecutor<'e>,
    record: &PaymentRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO payment_history (user_id, payment_id, amount, days, status, created_at, completed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.user_id)
    .bind(&record.payment_id)
    .bind(record.amount)
    .bind(record.days)
    .bind(record.status)
    .bind(record.created_at)
    .bind(record.completed_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn find_payment<'e>(
    ex: impl SqliteExecutor<'e>,
    payment_id: &str,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(&format!(
        "SELECT {} FROM payment_history WHERE payment_id = ?",
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .fetch_optional(ex)
    .await
}

pub async fn list_payments_for_user<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(&format!(
        "SELECT {} FROM payment_history WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        PAYMENT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(ex)
    .await
}

/// Flips a pending payment to completed. Returns the number of rows changed,
/// which is 1 for exactly one caller per payment id.
pub async fn claim_pending_payment<'e>(
    ex: impl SqliteExecutor<'e>,
    payment_id: &str,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payment_history
         SET status = ?, completed_at = ?
         WHERE payment_id = ? AND user_id = ? AND status = ?",
    )
    .bind(PaymentStatus::Completed)
    .bind(now)
    .bind(payment_id)
    .bind(user_id)
    .bind(PaymentStatus::Pending)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// Ensures a completed history entry exists for `payment_id`. Amount is
/// unknown on this path and stays 0 for rows created here.
pub async fn record_completed_payment<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    payment_id: &str,
    days: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO payment_history (user_id, payment_id, amount, days, status, created_at, completed_at)
         VALUES (?, ?, 0, ?, ?, ?, ?)
         ON CONFLICT(payment_id) DO UPDATE SET
             status = excluded.status,
             completed_at = COALESCE(payment_history.completed_at, excluded.completed_at)",
    )
    .bind(user_id)
    .bind(payment_id)
    .bind(days)
    .bind(PaymentStatus::Completed)
    .bind(now)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(())
}

// Messages

pub async fn insert_message<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
    text: &str,
    direction: MessageDirection,
    now: DateTime<Utc>,
) -> Result<Message, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        "INSERT INTO messages (user_id, text, direction, created_at)
         VALUES (?, ?, ?, ?)
         RETURNING id, user_id, text, direction, created_at",
    )
    .bind(user_id)
    .bind(text)
    .bind(direction)
    .bind(now)
    .fetch_one(ex)
    .await
}

pub async fn list_messages<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: i64,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        "SELECT id, user_id, text, direction, created_at FROM messages
         WHERE user_id = ? ORDER BY id ASC",
    )
    .bind(user_id)
    .fetch_all(ex)
    .await
}

// Editorial content

const BOOK_COLUMNS: &str = "month, year, title, author, description, image_url, updated_at";
const MAGAZINE_COLUMNS: &str =
    "issue_number, title, short_description, full_description, image_url, updated_at";

pub async fn upsert_book<'e>(
    ex: impl SqliteExecutor<'e>,
    book: &BookOfMonth,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO book_of_month (month, year, title, author, description, image_url, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(month, year) DO UPDATE SET
             title = excluded.title,
             author = excluded.author,
             description = excluded.description,
             image_url = excluded.image_url,
             updated_at = excluded.updated_at",
    )
    .bind(book.month)
    .bind(book.year)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.description)
    .bind(&book.image_url)
    .bind(book.updated_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn find_book<'e>(
    ex: impl SqliteExecutor<'e>,
    month: i64,
    year: i64,
) -> Result<Option<BookOfMonth>, sqlx::Error> {
    sqlx::query_as::<_, BookOfMonth>(&format!(
        "SELECT {} FROM book_of_month WHERE month = ? AND year = ?",
        BOOK_COLUMNS
    ))
    .bind(month)
    .bind(year)
    .fetch_optional(ex)
    .await
}

pub async fn latest_book<'e>(
    ex: impl SqliteExecutor<'e>,
) -> Result<Option<BookOfMonth>, sqlx::Error> {
    sqlx::query_as::<_, BookOfMonth>(&format!(
        "SELECT {} FROM book_of_month ORDER BY year DESC, month DESC LIMIT 1",
        BOOK_COLUMNS
    ))
    .fetch_optional(ex)
    .await
}

pub async fn upsert_magazine<'e>(
    ex: impl SqliteExecutor<'e>,
    magazine: &Magazine,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO magazines (issue_number, title, short_description, full_description, image_url, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(issue_number) DO UPDATE SET
             title = excluded.title,
             short_description = excluded.short_description,
             full_description = excluded.full_description,
             image_url = excluded.image_url,
             updated_at = excluded.updated_at",
    )
    .bind(magazine.issue_number)
    .bind(&magazine.title)
    .bind(&magazine.short_description)
    .bind(&magazine.full_description)
    .bind(&magazine.image_url)
    .bind(magazine.updated_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn latest_magazine<'e>(
    ex: impl SqliteExecutor<'e>,
) -> Result<Option<Magazine>, sqlx::Error> {
    sqlx::query_as::<_, Magazine>(&format!(
        "SELECT {} FROM magazines ORDER BY issue_number DESC LIMIT 1",
        MAGAZINE_COLUMNS
    ))
    .fetch_optional(ex)
    .await
}
