use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, RedisError, Script};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::redis::RedisHandle;
use crate::core::time::format_offset;

#[derive(Debug, Error)]
pub(crate) enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("job encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A unit of work delivered by the queue runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Job {
    pub(crate) id: Uuid,
    pub(crate) payload: serde_json::Value,
    #[serde(default)]
    pub(crate) attempts_made: u32,
    pub(crate) enqueued_at: String,
    /// Exact list entry the job was claimed from; needed to remove it again.
    #[serde(skip)]
    pub(crate) raw: String,
}

impl Job {
    pub(crate) fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempts_made: 0,
            enqueued_at: format_offset(OffsetDateTime::now_utc()),
            raw: String::new(),
        }
    }
}

/// Structured failure reported back to the queue runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobFailure {
    pub(crate) message: String,
    pub(crate) retryable: bool,
}

/// Lease granted to a claimed job before it counts as stalled.
pub(crate) const DEFAULT_JOB_LEASE: Duration = Duration::from_secs(600);

/// Failure recorded against a job whose worker never reported back.
pub(crate) const LEASE_EXPIRED: &str = "job lease expired before the worker reported";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureDisposition {
    /// Put back on the wait list; carries the attempt count recorded so far.
    Requeued { attempts_made: u32 },
    /// Moved to the failed list for inspection.
    Parked,
}

#[async_trait]
pub(crate) trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: serde_json::Value) -> Result<Job, QueueError>;

    /// Takes the oldest waiting job, if any, and marks it active.
    async fn claim(&self) -> Result<Option<Job>, QueueError>;

    async fn complete(&self, job: &Job) -> Result<(), QueueError>;

    async fn fail(&self, job: &Job, failure: &JobFailure)
        -> Result<FailureDisposition, QueueError>;

    /// Takes back active jobs whose lease ran out, retrying or parking each one
    /// under the same attempt budget as a reported failure.
    async fn recover_stalled(&self) -> Result<StalledJobs, QueueError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StalledJobs {
    pub(crate) requeued: usize,
    pub(crate) parked: usize,
}

impl StalledJobs {
    pub(crate) fn total(&self) -> usize {
        self.requeued + self.parked
    }

    pub(crate) fn record(&mut self, disposition: FailureDisposition) {
        match disposition {
            FailureDisposition::Requeued { .. } => self.requeued += 1,
            FailureDisposition::Parked => self.parked += 1,
        }
    }
}

pub(crate) fn should_retry(job: &Job, failure: &JobFailure, max_attempts: u32) -> bool {
    failure.retryable && job.attempts_made + 1 < max_attempts
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueKeys {
    wait: String,
    active: String,
    failed: String,
    leases: String,
    completed_count: String,
}

impl QueueKeys {
    fn new(queue_name: &str) -> Self {
        Self {
            wait: format!("{queue_name}:wait"),
            active: format!("{queue_name}:active"),
            failed: format!("{queue_name}:failed"),
            leases: format!("{queue_name}:leases"),
            completed_count: format!("{queue_name}:completed_count"),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailedEntry<'a> {
    job: &'a Job,
    error: &'a str,
    failed_at: String,
}

// KEYS: wait, active, leases. ARGV: lease deadline in unix millis.
const CLAIM_SCRIPT: &str = r#"
local raw = redis.call("LMOVE", KEYS[1], KEYS[2], "RIGHT", "LEFT")
if raw then
    redis.call("ZADD", KEYS[3], ARGV[1], raw)
end
return raw
"#;

// KEYS: active, leases, destination. ARGV: claimed entry, entry to push.
// Pushes only when the claimed entry was still active, so a job recovered
// from a stalled worker is never delivered twice by the late report.
const RELEASE_SCRIPT: &str = r#"
local removed = redis.call("LREM", KEYS[1], 1, ARGV[1])
redis.call("ZREM", KEYS[2], ARGV[1])
if removed > 0 then
    redis.call("LPUSH", KEYS[3], ARGV[2])
end
return removed
"#;

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Redis list queue: producers `LPUSH` onto `<name>:wait`, workers `LMOVE` the
/// oldest entry onto `<name>:active` and remove it once reported. Every claim
/// also holds a lease in the `<name>:leases` sorted set, scored by deadline.
#[derive(Clone)]
pub(crate) struct RedisJobQueue {
    redis: RedisHandle,
    keys: QueueKeys,
    max_attempts: u32,
    lease: Duration,
}

impl RedisJobQueue {
    pub(crate) fn new(redis: RedisHandle, queue_name: &str, max_attempts: u32) -> Self {
        Self { redis, keys: QueueKeys::new(queue_name), max_attempts, lease: DEFAULT_JOB_LEASE }
    }

    pub(crate) fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Removes `raw` from the active list and pushes `entry` onto `destination`.
    /// Returns false when the entry had already left the active list.
    async fn release(
        &self,
        conn: &mut ConnectionManager,
        raw: &str,
        destination: &str,
        entry: &str,
    ) -> Result<bool, QueueError> {
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.keys.active)
            .key(&self.keys.leases)
            .key(destination)
            .arg(raw)
            .arg(entry)
            .invoke_async(conn)
            .await?;
        Ok(removed > 0)
    }

    /// Requeues or parks a job that failed, whether reported or stalled.
    async fn settle_failure(
        &self,
        conn: &mut ConnectionManager,
        job: &Job,
        failure: &JobFailure,
    ) -> Result<(FailureDisposition, bool), QueueError> {
        let mut next = job.clone();
        next.attempts_made += 1;

        if should_retry(job, failure, self.max_attempts) {
            let requeued = serde_json::to_string(&next)?;
            let released = self.release(conn, &job.raw, &self.keys.wait, &requeued).await?;
            let disposition = FailureDisposition::Requeued { attempts_made: next.attempts_made };
            return Ok((disposition, released));
        }

        let entry = FailedEntry {
            job: &next,
            error: &failure.message,
            failed_at: format_offset(OffsetDateTime::now_utc()),
        };
        let entry = serde_json::to_string(&entry)?;
        let released = self.release(conn, &job.raw, &self.keys.failed, &entry).await?;
        Ok((FailureDisposition::Parked, released))
    }

    async fn connection(&self) -> Result<ConnectionManager, QueueError> {
        Ok(self.redis.connection().await?)
    }

    async fn park_undecodable(
        &self,
        conn: &mut ConnectionManager,
        raw: &str,
        error: &serde_json::Error,
    ) -> Result<(), QueueError> {
        let entry = serde_json::json!({
            "raw": raw,
            "error": error.to_string(),
            "failed_at": format_offset(OffsetDateTime::now_utc()),
        });
        self.release(conn, raw, &self.keys.failed, &entry.to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> Result<Job, QueueError> {
        let mut job = Job::new(payload);
        job.raw = serde_json::to_string(&job)?;

        let mut conn = self.connection().await?;
        cmd("LPUSH").arg(&self.keys.wait).arg(&job.raw).query_async::<_, i64>(&mut conn).await?;

        Ok(job)
    }

    async fn claim(&self) -> Result<Option<Job>, QueueError> {
        let mut conn = self.connection().await?;
        let script = Script::new(CLAIM_SCRIPT);

        loop {
            let deadline = unix_millis(OffsetDateTime::now_utc() + self.lease);
            let raw: Option<String> = script
                .key(&self.keys.wait)
                .key(&self.keys.active)
                .key(&self.keys.leases)
                .arg(deadline)
                .invoke_async(&mut conn)
                .await?;
            let Some(raw) = raw else {
                return Ok(None);
            };

            match serde_json::from_str::<Job>(&raw) {
                Ok(mut job) => {
                    job.raw = raw;
                    return Ok(Some(job));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Parking undecodable queue entry");
                    self.park_undecodable(&mut conn, &raw, &err).await?;
                }
            }
        }
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.keys.active)
            .arg(1)
            .arg(&job.raw)
            .ignore()
            .cmd("ZREM")
            .arg(&self.keys.leases)
            .arg(&job.raw)
            .ignore()
            .cmd("INCR")
            .arg(&self.keys.completed_count)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn fail(
        &self,
        job: &Job,
        failure: &JobFailure,
    ) -> Result<FailureDisposition, QueueError> {
        let mut conn = self.connection().await?;
        let (disposition, released) = self.settle_failure(&mut conn, job, failure).await?;
        if !released {
            tracing::debug!(job_id = %job.id, "Job already recovered from an expired lease");
        }
        Ok(disposition)
    }

    async fn recover_stalled(&self) -> Result<StalledJobs, QueueError> {
        let mut conn = self.connection().await?;
        let now = unix_millis(OffsetDateTime::now_utc());
        let expired: Vec<String> = cmd("ZRANGEBYSCORE")
            .arg(&self.keys.leases)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;

        let failure = JobFailure { message: LEASE_EXPIRED.to_string(), retryable: true };
        let mut stalled = StalledJobs::default();
        for raw in expired {
            let mut job = match serde_json::from_str::<Job>(&raw) {
                Ok(job) => job,
                Err(err) => {
                    self.park_undecodable(&mut conn, &raw, &err).await?;
                    continue;
                }
            };
            job.raw = raw;

            let (disposition, released) = self.settle_failure(&mut conn, &job, &failure).await?;
            if released {
                tracing::warn!(job_id = %job.id, ?disposition, "Recovered stalled scoring job");
                stalled.record(disposition);
            }
        }

        Ok(stalled)
    }
}
