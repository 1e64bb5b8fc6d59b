// src/sweep.rs
use crate::access;
use crate::db::{self, Db};
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;

/// External channel membership. Granting lets a user (back) into the private
/// channel, revoking removes them.
pub trait ChannelMembership {
    fn grant(&self, user_id: i64) -> impl Future<Output = AppResult<()>>;
    fn revoke(&self, user_id: i64) -> impl Future<Output = AppResult<()>>;
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub granted: u64,
    pub revoked: u64,
    pub failed: u64,
    pub total: u64,
}

/// Reconciles channel membership for every known user with the access gate.
/// Users are handled independently; a failure is counted and the sweep moves on.
pub async fn run<M: ChannelMembership>(
    db: &Db,
    membership: &M,
    now: DateTime<Utc>,
) -> AppResult<SweepReport> {
    let users = db::list_known_user_ids(db.pool()).await?;
    let mut report = SweepReport {
        total: users.len() as u64,
        ..SweepReport::default()
    };

    for user_id in users {
        let has_access = match access::has_active_access(db, user_id, now).await {
            Ok(has_access) => has_access,
            Err(e) => {
                tracing::warn!("Access check failed for user {}: {}", user_id, e);
                report.failed += 1;
                continue;
            }
        };

        let result = if has_access {
            membership.grant(user_id).await
        } else {
            membership.revoke(user_id).await
        };

        match (result, has_access) {
            (Ok(()), true) => report.granted += 1,
            (Ok(()), false) => report.revoked += 1,
            (Err(e), _) => {
                tracing::warn!("Error managing channel access for user {}: {}", user_id, e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Channel sweep done: {} granted, {} revoked, {} failed of {}",
        report.granted,
        report.revoked,
        report.failed,
        report.total
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::ledger;
    use crate::models::{MessageDirection, SubscriptionStatus};
    use chrono::Duration;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMembership {
        failing: Vec<i64>,
        calls: Mutex<Vec<(&'static str, i64)>>,
    }

    impl ChannelMembership for RecordingMembership {
        async fn grant(&self, user_id: i64) -> AppResult<()> {
            self.calls.lock().unwrap().push(("grant", user_id));
            if self.failing.contains(&user_id) {
                return Err(AppError::Internal("Bad Request: user not found".into()));
            }
            Ok(())
        }

        async fn revoke(&self, user_id: i64) -> AppResult<()> {
            self.calls.lock().unwrap().push(("revoke", user_id));
            if self.failing.contains(&user_id) {
                return Err(AppError::Internal("Bad Request: user not found".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_store_sweeps_nobody() {
        let db = Db::in_memory().await.unwrap();
        let membership = RecordingMembership::default();
        let report = run(&db, &membership, Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(membership.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn grants_and_revokes_per_gate() {
        let db = Db::in_memory().await.unwrap();
        let now = Utc::now();
        ledger::activate(&db, 1, 30, "p-1", now).await.unwrap();
        ledger::activate(&db, 2, 1, "p-2", now - Duration::days(5)).await.unwrap();
        ledger::set_subscription(&db, 3, SubscriptionStatus::Cancelled, None, now)
            .await
            .unwrap();
        db::insert_message(db.pool(), 4, "hi", MessageDirection::FromUser, now)
            .await
            .unwrap();

        let membership = RecordingMembership::default();
        let report = run(&db, &membership, now).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                granted: 1,
                revoked: 3,
                failed: 0,
                total: 4
            }
        );
        assert_eq!(
            *membership.calls.lock().unwrap(),
            vec![("grant", 1), ("revoke", 2), ("revoke", 3), ("revoke", 4)]
        );
    }

    #[tokio::test]
    async fn failures_are_counted_not_fatal() {
        let db = Db::in_memory().await.unwrap();
        let now = Utc::now();
        ledger::activate(&db, 1, 30, "p-1", now).await.unwrap();
        ledger::activate(&db, 2, 30, "p-2", now).await.unwrap();
        db::insert_message(db.pool(), 3, "hi", MessageDirection::FromUser, now)
            .await
            .unwrap();

        let membership = RecordingMembership {
            failing: vec![1],
            ..Default::default()
        };
        let report = run(&db, &membership, now).await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.granted, 1);
        assert_eq!(report.revoked, 1);
        assert_eq!(membership.calls.lock().unwrap().len(), 3);
    }
}
