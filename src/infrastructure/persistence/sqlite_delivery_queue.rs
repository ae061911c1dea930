use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use std::sync::Arc;

use super::Database;
use crate::domain::entities::{DeliveryStatus, NotificationChannel, QueueStats, QueuedNotification};
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::{DeliveryQueueRepository, TimeService};
use crate::infrastructure::runtime::TokioTimeService;

const SELECT_COLUMNS: &str = "SELECT id, notification_id, channel, recipient, subject, message,
        priority, scheduled_at, attempt_count, max_attempts, status, last_error,
        created_at, updated_at
     FROM delivery_queue";

/// Durable queue store backed by the `delivery_queue` table.
#[derive(Clone)]
pub struct SqliteDeliveryQueueRepository {
    db: Database,
    clock: Arc<dyn TimeService>,
}

impl SqliteDeliveryQueueRepository {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(TokioTimeService::new()))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn TimeService>) -> Self {
        Self { db, clock }
    }

    async fn fetch(&self, sql: &str, binds: &[String], limit: usize) -> DeliveryResult<Vec<QueuedNotification>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(bind.as_str());
        }
        let rows = query
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn exists(&self, id: &str) -> DeliveryResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM delivery_queue WHERE id = ?")
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count > 0)
    }
}

/// Fixed-width RFC3339 so that string comparison in SQL matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &AnyRow, col: &str) -> DeliveryResult<DateTime<Utc>> {
    let s: String = row.try_get(col)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DeliveryError::Storage(sqlx::Error::Decode(Box::new(e))))
}

fn parse_count(row: &AnyRow, col: &str) -> DeliveryResult<u32> {
    let value: i64 = row.try_get(col)?;
    u32::try_from(value)
        .map_err(|e| DeliveryError::Storage(sqlx::Error::Decode(Box::new(e))))
}

fn decode_error(e: DeliveryError) -> DeliveryError {
    DeliveryError::Storage(sqlx::Error::Decode(Box::new(e)))
}

fn row_to_notification(row: &AnyRow) -> DeliveryResult<QueuedNotification> {
    let channel: String = row.try_get("channel")?;
    let status: String = row.try_get("status")?;
    let priority: i64 = row.try_get("priority")?;

    Ok(QueuedNotification {
        id: row.try_get("id")?,
        notification_id: row.try_get::<Option<String>, _>("notification_id")?,
        channel: channel.parse::<NotificationChannel>().map_err(decode_error)?,
        recipient: row.try_get("recipient")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        priority: priority.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        scheduled_at: parse_ts(row, "scheduled_at")?,
        attempt_count: parse_count(row, "attempt_count")?,
        max_attempts: parse_count(row, "max_attempts")?,
        status: status.parse::<DeliveryStatus>().map_err(decode_error)?,
        last_error: row.try_get::<Option<String>, _>("last_error")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

#[async_trait]
impl DeliveryQueueRepository for SqliteDeliveryQueueRepository {
    async fn create(&self, n: &QueuedNotification) -> DeliveryResult<()> {
        let result = sqlx::query(
            "INSERT INTO delivery_queue (id, notification_id, channel, recipient, subject, message,
                priority, scheduled_at, attempt_count, max_attempts, status, last_error,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&n.id)
        .bind(n.notification_id.as_deref())
        .bind(n.channel.as_str())
        .bind(&n.recipient)
        .bind(&n.subject)
        .bind(&n.message)
        .bind(n.priority as i64)
        .bind(ts(n.scheduled_at))
        .bind(n.attempt_count as i64)
        .bind(n.max_attempts as i64)
        .bind(n.status.as_str())
        .bind(n.last_error.as_deref())
        .bind(ts(n.created_at))
        .bind(ts(n.updated_at))
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                DeliveryError::AlreadyExists(format!("queued notification {}", n.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: &str) -> DeliveryResult<QueuedNotification> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| DeliveryError::NotFound(format!("queued notification {}", id)))?;
        row_to_notification(&row)
    }

    async fn get_pending_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        self.fetch(
            &format!("{} WHERE status = 'pending' LIMIT ?", SELECT_COLUMNS),
            &[],
            limit,
        )
        .await
    }

    async fn get_pending_by_priority(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        self.fetch(
            &format!(
                "{} WHERE status IN ('pending', 'retrying') AND scheduled_at <= ?
                 ORDER BY priority DESC, created_at ASC, id ASC
                 LIMIT ?",
                SELECT_COLUMNS
            ),
            &[ts(now)],
            limit,
        )
        .await
    }

    async fn get_failed_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        self.fetch(
            &format!(
                "{} WHERE status IN ('failed', 'retrying') AND attempt_count < max_attempts
                 ORDER BY status = 'retrying', updated_at ASC
                 LIMIT ?",
                SELECT_COLUMNS
            ),
            &[],
            limit,
        )
        .await
    }

    async fn get_exhausted_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        self.fetch(
            &format!(
                "{} WHERE status IN ('failed', 'retrying') AND attempt_count >= max_attempts
                 LIMIT ?",
                SELECT_COLUMNS
            ),
            &[],
            limit,
        )
        .await
    }

    async fn update(&self, n: &QueuedNotification) -> DeliveryResult<()> {
        let result = sqlx::query(
            "UPDATE delivery_queue
             SET notification_id = ?, channel = ?, recipient = ?, subject = ?, message = ?,
                 priority = ?, scheduled_at = ?, attempt_count = ?, max_attempts = ?,
                 status = ?, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(n.notification_id.as_deref())
        .bind(n.channel.as_str())
        .bind(&n.recipient)
        .bind(&n.subject)
        .bind(&n.message)
        .bind(n.priority as i64)
        .bind(ts(n.scheduled_at))
        .bind(n.attempt_count as i64)
        .bind(n.max_attempts as i64)
        .bind(n.status.as_str())
        .bind(n.last_error.as_deref())
        .bind(ts(self.clock.now()))
        .bind(&n.id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DeliveryError::NotFound(format!("queued notification {}", n.id)));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> DeliveryResult<()> {
        let increment: i64 = if status == DeliveryStatus::Failed { 1 } else { 0 };
        let result = sqlx::query(
            "UPDATE delivery_queue
             SET status = ?, last_error = COALESCE(?, last_error),
                 attempt_count = attempt_count + ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(increment)
        .bind(ts(self.clock.now()))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DeliveryError::NotFound(format!("queued notification {}", id)));
        }
        Ok(())
    }

    async fn claim_for_processing(&self, id: &str) -> DeliveryResult<Option<DeliveryStatus>> {
        // One guarded UPDATE per waiting status: whichever matches names the status
        // the claim replaced, and a row another worker moved or rescheduled matches none.
        let now = ts(self.clock.now());
        for from in [DeliveryStatus::Pending, DeliveryStatus::Retrying] {
            let result = sqlx::query(
                "UPDATE delivery_queue
                 SET status = 'processing', updated_at = ?
                 WHERE id = ? AND status = ? AND scheduled_at <= ?",
            )
            .bind(&now)
            .bind(id)
            .bind(from.as_str())
            .bind(&now)
            .execute(self.db.pool())
            .await?;

            if result.rows_affected() == 1 {
                return Ok(Some(from));
            }
        }
        if !self.exists(id).await? {
            return Err(DeliveryError::NotFound(format!("queued notification {}", id)));
        }
        Ok(None)
    }

    async fn release_claim(
        &self,
        id: &str,
        status: DeliveryStatus,
        scheduled_at: DateTime<Utc>,
    ) -> DeliveryResult<()> {
        let result = sqlx::query(
            "UPDATE delivery_queue SET status = ?, scheduled_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(ts(scheduled_at))
        .bind(ts(self.clock.now()))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DeliveryError::NotFound(format!("queued notification {}", id)));
        }
        Ok(())
    }

    async fn recover_stale_processing(&self, older_than: DateTime<Utc>) -> DeliveryResult<u64> {
        let result = sqlx::query(
            "UPDATE delivery_queue SET status = 'pending', updated_at = ?
             WHERE status = 'processing' AND updated_at < ?",
        )
        .bind(ts(self.clock.now()))
        .bind(ts(older_than))
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &str) -> DeliveryResult<()> {
        let result = sqlx::query("DELETE FROM delivery_queue WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DeliveryError::NotFound(format!("queued notification {}", id)));
        }
        Ok(())
    }

    async fn delete_processed_notifications(
        &self,
        older_than: DateTime<Utc>,
    ) -> DeliveryResult<u64> {
        let result = sqlx::query(
            "DELETE FROM delivery_queue WHERE status = 'delivered' AND updated_at < ?",
        )
        .bind(ts(older_than))
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_pending_count(&self) -> DeliveryResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM delivery_queue WHERE status = 'pending'")
            .fetch_one(self.db.pool())
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn get_queue_stats(&self) -> DeliveryResult<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM delivery_queue GROUP BY status")
            .fetch_all(self.db.pool())
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.by_status.insert(status, count.max(0) as u64);
        }
        stats.pending_count = stats.count(DeliveryStatus::Pending);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime::ManualTimeService;
    use chrono::Duration as ChronoDuration;

    async fn repo() -> (SqliteDeliveryQueueRepository, ManualTimeService) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        let clock = ManualTimeService::default();
        (
            SqliteDeliveryQueueRepository::with_clock(db, Arc::new(clock.clone())),
            clock,
        )
    }

    fn notification(priority: i32, created_at: DateTime<Utc>) -> QueuedNotification {
        QueuedNotification::new(NotificationChannel::Webhook, "https://hooks.example.com/ci", "Build", "failed")
            .with_priority(priority)
            .created_at(created_at)
            .scheduled_at(created_at)
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (repo, clock) = repo().await;
        let n = notification(3, clock.now()).with_notification_id("log-1");
        repo.create(&n).await.unwrap();

        let stored = repo.get_by_id(&n.id).await.unwrap();
        assert_eq!(stored.channel, NotificationChannel::Webhook);
        assert_eq!(stored.priority, 3);
        assert_eq!(stored.notification_id.as_deref(), Some("log-1"));
        assert_eq!(stored.status, DeliveryStatus::Pending);
        assert!(stored.last_error.is_none());

        assert!(matches!(
            repo.create(&n).await,
            Err(DeliveryError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_priority_ordering_and_claim() {
        let (repo, clock) = repo().await;
        let t0 = clock.now();
        let low = notification(0, t0);
        let high = notification(5, t0 + ChronoDuration::seconds(1));
        repo.create(&low).await.unwrap();
        repo.create(&high).await.unwrap();

        let due = repo
            .get_pending_by_priority(t0 + ChronoDuration::seconds(2), 10)
            .await
            .unwrap();
        assert_eq!(due[0].id, high.id);
        assert_eq!(due[1].id, low.id);

        assert_eq!(
            repo.claim_for_processing(&high.id).await.unwrap(),
            Some(DeliveryStatus::Pending)
        );
        assert_eq!(repo.claim_for_processing(&high.id).await.unwrap(), None);
        assert!(matches!(
            repo.claim_for_processing("missing").await,
            Err(DeliveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_status_updates_and_stats() {
        let (repo, clock) = repo().await;
        let n = notification(0, clock.now());
        repo.create(&n).await.unwrap();

        repo.update_status(&n.id, DeliveryStatus::Failed, Some("HTTP 502"))
            .await
            .unwrap();
        let stored = repo.get_by_id(&n.id).await.unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("HTTP 502"));

        assert_eq!(repo.get_failed_notifications(10).await.unwrap().len(), 1);
        let stats = repo.get_queue_stats().await.unwrap();
        assert_eq!(stats.count(DeliveryStatus::Failed), 1);
        assert_eq!(stats.pending_count, 0);
    }

    #[tokio::test]
    async fn test_delete_and_retention() {
        let (repo, clock) = repo().await;
        let n = notification(0, clock.now());
        repo.create(&n).await.unwrap();
        repo.update_status(&n.id, DeliveryStatus::Delivered, None)
            .await
            .unwrap();

        clock.advance(std::time::Duration::from_secs(7200));
        let removed = repo
            .delete_processed_notifications(clock.now() - ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(
            repo.delete(&n.id).await,
            Err(DeliveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_notifications_returns_only_pending_rows() {
        let (repo, clock) = repo().await;
        let mut pending_ids = Vec::new();
        for _ in 0..3 {
            let n = notification(0, clock.now());
            repo.create(&n).await.unwrap();
            pending_ids.push(n.id);
        }
        let failed = notification(0, clock.now());
        let claimed = notification(0, clock.now());
        repo.create(&failed).await.unwrap();
        repo.create(&claimed).await.unwrap();
        repo.update_status(&failed.id, DeliveryStatus::Failed, Some("HTTP 503"))
            .await
            .unwrap();
        repo.claim_for_processing(&claimed.id).await.unwrap();

        let pending = repo.get_pending_notifications(10).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.iter().all(|n| n.status == DeliveryStatus::Pending));
        assert!(pending.iter().all(|n| pending_ids.contains(&n.id)));

        assert_eq!(repo.get_pending_notifications(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_claim_respects_backoff_and_reports_prior_status() {
        let (repo, clock) = repo().await;
        let n = notification(0, clock.now());
        repo.create(&n).await.unwrap();

        let mut rescheduled = repo.get_by_id(&n.id).await.unwrap();
        rescheduled.schedule_retry(std::time::Duration::from_secs(15), clock.now());
        repo.update(&rescheduled).await.unwrap();
        assert_eq!(repo.claim_for_processing(&n.id).await.unwrap(), None);

        clock.advance(std::time::Duration::from_secs(15));
        assert_eq!(
            repo.claim_for_processing(&n.id).await.unwrap(),
            Some(DeliveryStatus::Retrying)
        );
    }

    #[tokio::test]
    async fn test_failed_rows_come_before_waiting_retries() {
        let (repo, clock) = repo().await;
        let waiting = notification(0, clock.now()).with_max_attempts(5);
        let fresh = notification(0, clock.now()).with_max_attempts(5);
        repo.create(&waiting).await.unwrap();
        repo.create(&fresh).await.unwrap();

        repo.update_status(&waiting.id, DeliveryStatus::Failed, Some("HTTP 502"))
            .await
            .unwrap();
        repo.update_status(&waiting.id, DeliveryStatus::Retrying, None)
            .await
            .unwrap();
        clock.advance(std::time::Duration::from_secs(1));
        repo.update_status(&fresh.id, DeliveryStatus::Failed, Some("HTTP 502"))
            .await
            .unwrap();

        let first = repo.get_failed_notifications(1).await.unwrap();
        assert_eq!(first[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_unknown_status_is_a_storage_error() {
        let (repo, clock) = repo().await;
        let n = notification(0, clock.now());
        repo.create(&n).await.unwrap();
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(repo.db.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE delivery_queue SET status = 'queued' WHERE id = ?")
            .bind(&n.id)
            .execute(repo.db.pool())
            .await
            .unwrap();

        assert!(matches!(
            repo.get_by_id(&n.id).await,
            Err(DeliveryError::Storage(_))
        ));
    }
}
