//! SQLite-backed [`JobQueue`].
//!
//! Timestamps are epoch milliseconds. Fetching runs in an immediate
//! transaction so two processes sharing the database never claim the same
//! job. Statements run on the blocking thread pool.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, warn};

use super::{Job, JobOptions, JobQueue, JobRecord, JobState, QueueError};

const QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    state            TEXT NOT NULL,
    data             TEXT NOT NULL,      -- JSON payload
    retry_count      INTEGER NOT NULL DEFAULT 0,
    retry_limit      INTEGER NOT NULL DEFAULT 0,
    retry_delay_secs INTEGER NOT NULL DEFAULT 0,
    expire_in_secs   INTEGER NOT NULL,
    start_after_ms   INTEGER NOT NULL,
    started_at_ms    INTEGER,
    claim_id         TEXT,               -- token of the current claim
    settled_at_ms    INTEGER,
    created_at_ms    INTEGER NOT NULL,
    last_error       TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_fetch ON jobs(name, state, start_after_ms);

CREATE TABLE IF NOT EXISTS schedules (
    name       TEXT PRIMARY KEY,
    last_slot  TEXT NOT NULL,
    claimed_ms INTEGER NOT NULL
);
"#;

/// Job queue stored in a SQLite database.
pub struct SqliteJobQueue {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteJobQueue {
    /// Open (or create) the queue database at `path`.
    pub fn connect(path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| QueueError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// A private in-memory queue.
    pub fn connect_in_memory() -> Result<Self, QueueError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, QueueError> {
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        info!("job queue connected");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Close the connection. Later calls fail with [`QueueError::Closed`].
    pub fn close(&self) -> Result<(), QueueError> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| QueueError::Sqlite(e))?;
            info!("job queue closed");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, QueueError> {
        self.conn
            .lock()
            .map_err(|e| QueueError::Lock(e.to_string()))
    }

    /// Run `f` against the open connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| QueueError::Lock(e.to_string()))?;
            let conn = guard.as_mut().ok_or(QueueError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| QueueError::Task(e.to_string()))?
    }
}

/// Move expired active jobs to `retry` or `failed`, revoking their claims.
fn sweep_expired(conn: &Connection, name: &str, now_ms: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE jobs SET \
         state          = CASE WHEN retry_count < retry_limit THEN 'retry' ELSE 'failed' END, \
         retry_count    = CASE WHEN retry_count < retry_limit THEN retry_count + 1 ELSE retry_count END, \
         start_after_ms = ?1 + retry_delay_secs * 1000, \
         settled_at_ms  = CASE WHEN retry_count < retry_limit THEN NULL ELSE ?1 END, \
         claim_id       = NULL, \
         last_error     = 'job expired before completion' \
         WHERE name = ?2 AND state = 'active' AND started_at_ms + expire_in_secs * 1000 <= ?1",
        params![now_ms, name],
    )
}

fn insert_job(
    conn: &Connection,
    name: &str,
    data: &str,
    options: JobOptions,
    now_ms: i64,
) -> rusqlite::Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO jobs (id, name, state, data, retry_limit, retry_delay_secs, \
         expire_in_secs, start_after_ms, created_at_ms) \
         VALUES (?1, ?2, 'created', ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            name,
            data,
            options.retry_limit,
            to_i64(options.retry_delay_secs),
            to_i64(options.expire_in_secs),
            now_ms,
        ],
    )?;
    Ok(id)
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        let data = serde_json::to_string(&data)?;
        let name = name.to_owned();
        self.blocking(move |conn| {
            let id = insert_job(conn, &name, &data, options, now_ms())?;
            debug!(job_name = %name, job_id = %id, "job enqueued");
            Ok(id)
        })
        .await
    }

    async fn fetch(&self, name: &str, batch_size: usize) -> Result<Vec<Job>, QueueError> {
        let name = name.to_owned();
        self.blocking(move |conn| {
            let now = now_ms();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let swept = sweep_expired(&tx, &name, now)?;
            if swept > 0 {
                warn!(job_name = %name, count = swept, "expired active jobs swept");
            }

            let jobs = {
                let mut stmt = tx.prepare(
                    "SELECT id, name, data, retry_count, retry_limit FROM jobs \
                     WHERE name = ?1 AND state IN ('created', 'retry') AND start_after_ms <= ?2 \
                     ORDER BY created_at_ms, rowid LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    params![name, now, i64::try_from(batch_size).unwrap_or(i64::MAX)],
                    |row| {
                        let data: String = row.get(2)?;
                        Ok(Job {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            data: serde_json::from_str(&data).map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(
                                    2,
                                    Type::Text,
                                    Box::new(e),
                                )
                            })?,
                            retry_count: row.get(3)?,
                            retry_limit: row.get(4)?,
                            claim: uuid::Uuid::new_v4().to_string(),
                        })
                    },
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            for job in &jobs {
                tx.execute(
                    "UPDATE jobs SET state = 'active', started_at_ms = ?1, claim_id = ?2 \
                     WHERE id = ?3",
                    params![now, job.claim, job.id],
                )?;
            }
            tx.commit()?;
            Ok(jobs)
        })
        .await
    }

    async fn start(&self, job: &Job) -> Result<bool, QueueError> {
        let (id, claim) = (job.id.clone(), job.claim.clone());
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE jobs SET started_at_ms = ?1 \
                 WHERE id = ?2 AND claim_id = ?3 AND state = 'active'",
                params![now_ms(), id, claim],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn complete(&self, job: &Job) -> Result<bool, QueueError> {
        let (id, claim) = (job.id.clone(), job.claim.clone());
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE jobs SET state = 'completed', settled_at_ms = ?1, claim_id = NULL \
                 WHERE id = ?2 AND claim_id = ?3 AND state = 'active'",
                params![now_ms(), id, claim],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn fail(
        &self,
        job: &Job,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, QueueError> {
        let (id, claim, error) = (job.id.clone(), job.claim.clone(), error.to_owned());
        self.blocking(move |conn| {
            let now = now_ms();
            let changed = conn.execute(
                "UPDATE jobs SET \
                 state          = CASE WHEN ?4 AND retry_count < retry_limit THEN 'retry' ELSE 'failed' END, \
                 retry_count    = CASE WHEN ?4 AND retry_count < retry_limit THEN retry_count + 1 ELSE retry_count END, \
                 start_after_ms = ?1 + retry_delay_secs * 1000, \
                 settled_at_ms  = CASE WHEN ?4 AND retry_count < retry_limit THEN NULL ELSE ?1 END, \
                 claim_id       = NULL, \
                 last_error     = ?2 \
                 WHERE id = ?3 AND claim_id = ?5 AND state = 'active'",
                params![now, error, id, retryable, claim],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let state: String =
                conn.query_row("SELECT state FROM jobs WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })?;
            Ok(JobState::parse(&state))
        })
        .await
    }

    async fn count_in_flight(
        &self,
        name: &str,
        data_path: &str,
        value: &str,
    ) -> Result<u64, QueueError> {
        let (name, data_path, value) = (name.to_owned(), data_path.to_owned(), value.to_owned());
        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM jobs \
                 WHERE name = ?1 AND state IN ('created', 'retry', 'active') \
                 AND json_extract(data, ?2) = ?3",
                params![name, data_path, value],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn job(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        let job_id = job_id.to_owned();
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, state, data, retry_count, retry_limit, last_error, \
                     start_after_ms FROM jobs WHERE id = ?1",
                    params![job_id],
                    |row| {
                        let state: String = row.get(2)?;
                        let data: String = row.get(3)?;
                        let start_after_ms: i64 = row.get(7)?;
                        Ok(JobRecord {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            state: JobState::parse(&state).ok_or_else(|| {
                                rusqlite::Error::FromSqlConversionFailure(
                                    2,
                                    Type::Text,
                                    format!("unknown job state `{state}`").into(),
                                )
                            })?,
                            data: serde_json::from_str(&data).map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(
                                    3,
                                    Type::Text,
                                    Box::new(e),
                                )
                            })?,
                            retry_count: row.get(4)?,
                            retry_limit: row.get(5)?,
                            last_error: row.get(6)?,
                            start_after: DateTime::<Utc>::from_timestamp_millis(start_after_ms)
                                .unwrap_or_default(),
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn enqueue_for_slot(
        &self,
        schedule: &str,
        slot: &str,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<Option<String>, QueueError> {
        let data = serde_json::to_string(&data)?;
        let (schedule, slot, name) = (schedule.to_owned(), slot.to_owned(), name.to_owned());
        self.blocking(move |conn| {
            let now = now_ms();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let claimed = tx.execute(
                "INSERT INTO schedules (name, last_slot, claimed_ms) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(name) DO UPDATE SET last_slot = excluded.last_slot, \
                 claimed_ms = excluded.claimed_ms WHERE schedules.last_slot <> excluded.last_slot",
                params![schedule, slot, now],
            )?;
            if claimed == 0 {
                return Ok(None);
            }
            let id = insert_job(&tx, &name, &data, options, now)?;
            tx.commit()?;
            debug!(job_name = %name, job_id = %id, slot = %slot, "scheduled job enqueued");
            Ok(Some(id))
        })
        .await
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn queue() -> SqliteJobQueue {
        SqliteJobQueue::connect_in_memory().expect("queue")
    }

    fn retrying(limit: u32) -> JobOptions {
        JobOptions {
            retry_limit: limit,
            retry_delay_secs: 0,
            expire_in_secs: 600,
        }
    }

    fn expiring(limit: u32, expire_in_secs: u64) -> JobOptions {
        JobOptions {
            retry_limit: limit,
            retry_delay_secs: 0,
            expire_in_secs,
        }
    }

    #[tokio::test]
    async fn fetch_claims_and_complete_settles() {
        let q = queue();
        let id = q
            .enqueue("analyze-zone", json!({"gardenId": "g1"}), JobOptions::default())
            .await
            .expect("enqueue");

        let jobs = q.fetch("analyze-zone", 5).await.expect("fetch");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert!(q.fetch("analyze-zone", 5).await.expect("refetch").is_empty());

        assert!(q.complete(&jobs[0]).await.expect("complete"));
        assert!(!q.complete(&jobs[0]).await.expect("second complete"));
        let record = q.job(&id).await.expect("job").expect("present");
        assert_eq!(record.state, JobState::Completed);
    }

    #[tokio::test]
    async fn fail_retries_until_limit_then_fails() {
        let q = queue();
        let id = q
            .enqueue("analyze-zone", json!({}), retrying(1))
            .await
            .expect("enqueue");

        let first = q.fetch("analyze-zone", 1).await.expect("fetch");
        assert_eq!(
            q.fail(&first[0], "boom", true).await.expect("fail"),
            Some(JobState::Retry)
        );

        let again = q.fetch("analyze-zone", 1).await.expect("fetch retry");
        assert_eq!(again[0].retry_count, 1);
        assert_ne!(again[0].claim, first[0].claim);
        assert_eq!(
            q.fail(&again[0], "boom again", true).await.expect("fail"),
            Some(JobState::Failed)
        );

        let record = q.job(&id).await.expect("job").expect("present");
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.last_error.as_deref(), Some("boom again"));
        assert!(q.fetch("analyze-zone", 1).await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn non_retryable_failure_skips_remaining_attempts() {
        let q = queue();
        let id = q
            .enqueue("analyze-zone", json!({}), retrying(3))
            .await
            .expect("enqueue");
        let jobs = q.fetch("analyze-zone", 1).await.expect("fetch");
        assert_eq!(
            q.fail(&jobs[0], "invalid api key", false).await.expect("fail"),
            Some(JobState::Failed)
        );
        let record = q.job(&id).await.expect("job").expect("present");
        assert_eq!(record.retry_count, 0);
        assert!(q.fetch("analyze-zone", 1).await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn retry_delay_defers_refetch() {
        let q = queue();
        let id = q
            .enqueue(
                "analyze-zone",
                json!({}),
                JobOptions {
                    retry_limit: 3,
                    retry_delay_secs: 3600,
                    expire_in_secs: 600,
                },
            )
            .await
            .expect("enqueue");
        let jobs = q.fetch("analyze-zone", 1).await.expect("fetch");
        q.fail(&jobs[0], "transient", true).await.expect("fail");
        assert!(q.fetch("analyze-zone", 1).await.expect("fetch").is_empty());
        let record = q.job(&id).await.expect("job").expect("present");
        assert!(record.start_after > Utc::now());
    }

    #[tokio::test]
    async fn expired_active_job_is_swept_for_retry() {
        let q = queue();
        let id = q
            .enqueue("analyze-zone", json!({}), expiring(2, 0))
            .await
            .expect("enqueue");
        q.fetch("analyze-zone", 1).await.expect("first claim");

        let reclaimed = q.fetch("analyze-zone", 1).await.expect("second claim");
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, id);
        assert_eq!(reclaimed[0].retry_count, 1);
    }

    #[tokio::test]
    async fn stale_claim_cannot_settle_a_reclaimed_job() {
        let q = queue();
        for n in 1..=2 {
            q.enqueue("analyze-zone", json!({"n": n}), expiring(2, 0))
                .await
                .expect("enqueue");
        }
        let stale = q.fetch("analyze-zone", 2).await.expect("first worker");
        let fresh = q.fetch("analyze-zone", 2).await.expect("second worker");
        assert_eq!(fresh.len(), 2);

        let old = &stale[1];
        let current = fresh.iter().find(|j| j.id == old.id).expect("reclaimed");
        assert!(!q.start(old).await.expect("start"));
        assert!(!q.complete(old).await.expect("stale complete"));
        assert_eq!(q.fail(old, "late", true).await.expect("stale fail"), None);

        assert_eq!(
            q.fail(current, "provider down", true).await.expect("fail"),
            Some(JobState::Retry)
        );
        let record = q.job(&old.id).await.expect("job").expect("present");
        assert_eq!(record.state, JobState::Retry);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.last_error.as_deref(), Some("provider down"));
    }

    #[tokio::test]
    async fn start_restarts_the_expiry_clock() {
        let q = queue();
        q.enqueue("analyze-zone", json!({}), expiring(2, 1))
            .await
            .expect("enqueue");
        let jobs = q.fetch("analyze-zone", 1).await.expect("fetch");

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(q.start(&jobs[0]).await.expect("start"));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(q.fetch("analyze-zone", 1).await.expect("refetch").is_empty());
        assert!(q.complete(&jobs[0]).await.expect("complete"));
    }

    #[tokio::test]
    async fn fetch_is_scoped_by_name_and_batch() {
        let q = queue();
        for _ in 0..3 {
            q.enqueue("analyze-garden", json!({}), JobOptions::default())
                .await
                .expect("enqueue");
        }
        q.enqueue("analyze-zone", json!({}), JobOptions::default())
            .await
            .expect("enqueue");
        assert_eq!(q.fetch("analyze-garden", 2).await.expect("fetch").len(), 2);
        assert_eq!(q.fetch("analyze-garden", 2).await.expect("fetch").len(), 1);
    }

    #[tokio::test]
    async fn counts_in_flight_by_payload_field() {
        let q = queue();
        let a = q
            .enqueue("analyze-zone", json!({"gardenId": "g1"}), JobOptions::default())
            .await
            .expect("enqueue");
        q.enqueue("analyze-zone", json!({"gardenId": "g1"}), JobOptions::default())
            .await
            .expect("enqueue");
        q.enqueue("analyze-zone", json!({"gardenId": "g2"}), JobOptions::default())
            .await
            .expect("enqueue");

        assert_eq!(
            q.count_in_flight("analyze-zone", "$.gardenId", "g1").await.expect("count"),
            2
        );
        let jobs = q.fetch("analyze-zone", 1).await.expect("fetch");
        assert_eq!(jobs[0].id, a);
        q.complete(&jobs[0]).await.expect("complete");
        assert_eq!(
            q.count_in_flight("analyze-zone", "$.gardenId", "g1").await.expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn schedule_slot_enqueues_once() {
        let q = queue();
        let first = q
            .enqueue_for_slot("daily", "2025-06-01", "trigger", json!({}), JobOptions::default())
            .await
            .expect("claim");
        assert!(first.is_some());
        let repeat = q
            .enqueue_for_slot("daily", "2025-06-01", "trigger", json!({}), JobOptions::default())
            .await
            .expect("reclaim");
        assert_eq!(repeat, None);
        let next = q
            .enqueue_for_slot("daily", "2025-06-02", "trigger", json!({}), JobOptions::default())
            .await
            .expect("next day");
        assert!(next.is_some());
        assert_eq!(q.fetch("trigger", 10).await.expect("fetch").len(), 2);
    }

    #[tokio::test]
    async fn failed_insert_leaves_schedule_slot_unclaimed() {
        let q = queue();
        q.lock()
            .expect("lock")
            .as_ref()
            .expect("open")
            .execute_batch(
                "CREATE TRIGGER reject_jobs BEFORE INSERT ON jobs \
                 BEGIN SELECT RAISE(ABORT, 'insert rejected'); END;",
            )
            .expect("trigger");
        let err = q
            .enqueue_for_slot("daily", "2025-06-01", "trigger", json!({}), JobOptions::default())
            .await;
        assert!(matches!(err, Err(QueueError::Sqlite(_))), "got {err:?}");

        q.lock()
            .expect("lock")
            .as_ref()
            .expect("open")
            .execute_batch("DROP TRIGGER reject_jobs;")
            .expect("drop trigger");
        let retried = q
            .enqueue_for_slot("daily", "2025-06-01", "trigger", json!({}), JobOptions::default())
            .await
            .expect("second attempt");
        assert!(retried.is_some());
    }

    #[tokio::test]
    async fn closed_queue_rejects_calls() {
        let q = queue();
        q.close().expect("close");
        q.close().expect("close is idempotent");
        assert!(matches!(
            q.fetch("analyze-zone", 1).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn on_disk_queue_survives_reconnect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.db");
        let id = {
            let q = SqliteJobQueue::connect(&path).expect("connect");
            let id = q
                .enqueue("analyze-garden", json!({"gardenId": "g1"}), JobOptions::default())
                .await
                .expect("enqueue");
            q.close().expect("close");
            id
        };
        let q = SqliteJobQueue::connect(&path).expect("reconnect");
        let jobs = q.fetch("analyze-garden", 1).await.expect("fetch");
        assert_eq!(jobs[0].id, id);
    }
}
