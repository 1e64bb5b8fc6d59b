// src/access.rs
use crate::db::{self, Db};
use crate::error::AppResult;
use chrono::{DateTime, Utc};

/// Current entitlement: stored status is `active` and the end lies in the
/// future. Evaluated against the store on every call.
pub async fn has_active_access(db: &Db, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    Ok(db::has_active_subscription(db.pool(), user_id, now).await?)
}
