use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::config::CodeAttemptScope;
use crate::core::redis::RedisHandle;
use crate::db::models::{Answer, CodeAttempt, Problem, Quiz, StudentAttempt};
use crate::db::types::AnswerStatus;
use crate::repositories::results::ResultUpsert;
use crate::services::job_queue::{
    should_retry, FailureDisposition, Job, JobFailure, JobQueue, QueueError, StalledJobs,
    DEFAULT_JOB_LEASE, LEASE_EXPIRED,
};
use crate::services::scoring_store::{ScoringStore, StoreError};

const TEST_DATABASE_URL_VAR: &str = "QUIZ_SCORING_TEST_DATABASE_URL";
const TEST_REDIS_URL_VAR: &str = "QUIZ_SCORING_TEST_REDIS_URL";

/// Every variable the settings loader reads.
const SETTINGS_VARS: &[&str] = &[
    "QUIZ_SCORING_ENV",
    "ENVIRONMENT",
    "QUIZ_SCORING_STRICT_CONFIG",
    "DATABASE_URL",
    "DATABASE_MAX_CONNECTIONS",
    "POSTGRES_SERVER",
    "POSTGRES_PORT",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
    "POSTGRES_DB",
    "REDIS_HOST",
    "REDIS_PORT",
    "REDIS_DB",
    "REDIS_PASSWORD",
    "SCORING_QUEUE_NAME",
    "SCORING_WORKER_CONCURRENCY",
    "SCORING_BATCH_SIZE",
    "SCORING_POLL_INTERVAL_MS",
    "SCORING_MAX_ATTEMPTS",
    "SCORING_JOB_LEASE_SECS",
    "SCORING_CODE_ATTEMPT_SCOPE",
    "SCORING_ACK_FAILURES",
    "QUIZ_SCORING_LOG_LEVEL",
    "QUIZ_SCORING_LOG_JSON",
    "PROMETHEUS_ENABLED",
    "PROMETHEUS_LISTEN_ADDR",
];

fn shared_lock(cell: &'static OnceLock<Arc<Mutex<()>>>) -> Arc<Mutex<()>> {
    cell.get_or_init(|| Arc::new(Mutex::new(()))).clone()
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    shared_lock(&LOCK).lock_owned().await
}

/// Clears every settings variable, then sets the test baseline on top.
pub(crate) fn set_test_env() {
    for var in SETTINGS_VARS {
        std::env::remove_var(var);
    }
    std::env::set_var("QUIZ_SCORING_ENV", "test");
    std::env::set_var("DATABASE_URL", "postgresql://quizscoring@localhost:5432/quiz_scoring_test");
    std::env::set_var("REDIS_HOST", "127.0.0.1");
    std::env::set_var("REDIS_PORT", "6379");
    std::env::set_var("REDIS_DB", "1");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// Answer list from a pattern: `r` is a right answer, anything else wrong.
pub(crate) fn answers(pattern: &str) -> Vec<Answer> {
    pattern
        .chars()
        .enumerate()
        .map(|(index, mark)| Answer {
            question_id: Some(serde_json::Value::String(format!("question-{index}"))),
            answer_status: Some(if mark == 'r' {
                AnswerStatus::Right
            } else {
                AnswerStatus::Wrong
            }),
        })
        .collect()
}

pub(crate) struct PgContext {
    pub(crate) pool: PgPool,
    _guard: OwnedMutexGuard<()>,
}

/// Fresh, migrated database, or `None` when no test database is configured.
pub(crate) async fn pg_context() -> Option<PgContext> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();

    let url = std::env::var(TEST_DATABASE_URL_VAR).ok().filter(|url| !url.trim().is_empty())?;
    let guard = shared_lock(&LOCK).lock_owned().await;

    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.expect("test db");
    sqlx::query("DROP SCHEMA IF EXISTS public CASCADE").execute(&pool).await.expect("drop");
    sqlx::query("CREATE SCHEMA public").execute(&pool).await.expect("create schema");
    crate::db::run_migrations(&pool).await.expect("migrations");

    Some(PgContext { pool, _guard: guard })
}

/// Connected handle on an emptied database, or `None` when Redis is not configured.
pub(crate) async fn redis_context() -> Option<RedisHandle> {
    let url = std::env::var(TEST_REDIS_URL_VAR).ok().filter(|url| !url.trim().is_empty())?;

    let redis = RedisHandle::new(url);
    let mut conn = redis.connection().await.expect("redis connect");
    redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await.expect("flushdb");

    Some(redis)
}

#[derive(Default)]
struct StoreState {
    quizzes: HashMap<String, Quiz>,
    problems: HashMap<String, Problem>,
    student_attempts: Vec<StudentAttempt>,
    code_attempts: Vec<CodeAttempt>,
    results: BTreeMap<(String, String), ResultUpsert>,
    batch_sizes: Vec<usize>,
    upsert_calls: usize,
    fail_upsert_on: Option<usize>,
    fail_stream_after: Option<usize>,
    unavailable: bool,
    next_id: usize,
}

impl StoreState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-process store with failure injection for scoring tests.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    state: StdMutex<StoreState>,
}

impl InMemoryStore {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store state")
    }

    pub(crate) fn add_quiz(&self, id: &str, marks: Option<f64>, negative_marks: Option<f64>) {
        let quiz = Quiz {
            id: id.to_string(),
            title: format!("Quiz {id}"),
            per_question_marks: marks,
            negative_marks,
        };
        self.state().quizzes.insert(id.to_string(), quiz);
    }

    pub(crate) fn add_problem(
        &self,
        id: &str,
        quiz_id: Option<&str>,
        marks: Option<f64>,
        negative_marks: Option<f64>,
    ) {
        let problem = Problem {
            id: id.to_string(),
            quiz_id: quiz_id.map(str::to_string),
            marks,
            negative_marks,
        };
        self.state().problems.insert(id.to_string(), problem);
    }

    pub(crate) fn add_student_attempt(&self, student_id: &str, quiz_id: &str, pattern: &str) {
        let mut state = self.state();
        let id = state.next_id("attempt");
        state.student_attempts.push(StudentAttempt {
            id,
            student_id: student_id.to_string(),
            quiz_id: quiz_id.to_string(),
            answers: Json(answers(pattern)),
        });
    }

    /// Stores an attempt whose answers go through the same JSON decoding as a row.
    pub(crate) fn add_raw_student_attempt(
        &self,
        student_id: &str,
        quiz_id: &str,
        answers: serde_json::Value,
    ) {
        let answers: Vec<Answer> = serde_json::from_value(answers).expect("answers decode");
        let mut state = self.state();
        let id = state.next_id("attempt");
        state.student_attempts.push(StudentAttempt {
            id,
            student_id: student_id.to_string(),
            quiz_id: quiz_id.to_string(),
            answers: Json(answers),
        });
    }

    pub(crate) fn add_code_attempt(&self, student_id: &str, problem_id: &str, pattern: &str) {
        let mut state = self.state();
        let id = state.next_id("code");
        state.code_attempts.push(CodeAttempt {
            id,
            student_id: student_id.to_string(),
            problem_id: problem_id.to_string(),
            answers: Json(answers(pattern)),
        });
    }

    /// Makes the `n`th upsert call (1-based) fail without writing anything.
    pub(crate) fn fail_upsert_on_batch(&self, n: usize) {
        self.state().fail_upsert_on = Some(n);
    }

    /// Ends the attempt stream with an error after `n` rows.
    pub(crate) fn fail_stream_after(&self, n: usize) {
        self.state().fail_stream_after = Some(n);
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_sizes.clone()
    }

    /// Stored results ordered by (student, quiz).
    pub(crate) fn results(&self) -> Vec<ResultUpsert> {
        self.state().results.values().cloned().collect()
    }

    pub(crate) fn result(&self, student_id: &str, quiz_id: &str) -> Option<ResultUpsert> {
        self.state().results.get(&(student_id.to_string(), quiz_id.to_string())).cloned()
    }
}

#[async_trait]
impl ScoringStore for InMemoryStore {
    async fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.state().unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, StoreError> {
        Ok(self.state().quizzes.get(quiz_id).cloned())
    }

    async fn list_code_attempts(
        &self,
        scope: CodeAttemptScope,
        quiz_id: &str,
    ) -> Result<Vec<CodeAttempt>, StoreError> {
        let state = self.state();
        let attempts = state
            .code_attempts
            .iter()
            .filter(|attempt| match scope {
                CodeAttemptScope::All => true,
                CodeAttemptScope::Quiz => state
                    .problems
                    .get(&attempt.problem_id)
                    .is_some_and(|problem| problem.quiz_id.as_deref() == Some(quiz_id)),
            })
            .cloned()
            .collect();
        Ok(attempts)
    }

    async fn list_problems(&self, problem_ids: &[String]) -> Result<Vec<Problem>, StoreError> {
        let state = self.state();
        Ok(problem_ids.iter().filter_map(|id| state.problems.get(id).cloned()).collect())
    }

    fn stream_student_attempts<'a>(
        &'a self,
        quiz_id: &'a str,
    ) -> BoxStream<'a, Result<StudentAttempt, StoreError>> {
        let state = self.state();
        let mut rows: Vec<Result<StudentAttempt, StoreError>> = state
            .student_attempts
            .iter()
            .filter(|attempt| attempt.quiz_id == quiz_id)
            .cloned()
            .map(Ok)
            .collect();
        if let Some(limit) = state.fail_stream_after {
            rows.truncate(limit);
            rows.push(Err(StoreError::Unavailable("cursor closed".to_string())));
        }
        stream::iter(rows).boxed()
    }

    async fn upsert_results(&self, entries: &[ResultUpsert]) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.upsert_calls += 1;
        if state.fail_upsert_on == Some(state.upsert_calls) {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }

        state.batch_sizes.push(entries.len());
        for entry in entries {
            let key = (entry.student_id.clone(), entry.quiz_id.clone());
            state.results.insert(key, entry.clone());
        }
        Ok(entries.len() as u64)
    }
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<Job>,
    active: Vec<(Job, Instant)>,
    completed: Vec<Job>,
    parked: Vec<(Job, JobFailure)>,
}

impl QueueState {
    /// Mirrors the Redis release script: false when the job was no longer active.
    fn release(&mut self, job: &Job) -> bool {
        let before = self.active.len();
        self.active.retain(|(active, _)| active.id != job.id);
        self.active.len() < before
    }

    fn settle(&mut self, job: &Job, failure: &JobFailure, max_attempts: u32) -> FailureDisposition {
        let released = self.release(job);
        let mut next = job.clone();
        next.attempts_made += 1;
        let attempts_made = next.attempts_made;

        let retry = should_retry(job, failure, max_attempts);
        if released && retry {
            self.waiting.push_back(next);
        } else if released {
            self.parked.push((next, failure.clone()));
        }

        if retry {
            FailureDisposition::Requeued { attempts_made }
        } else {
            FailureDisposition::Parked
        }
    }
}

/// FIFO queue mirroring the retry and lease rules of the Redis queue.
pub(crate) struct InMemoryQueue {
    state: StdMutex<QueueState>,
    max_attempts: u32,
    lease: Duration,
}

impl InMemoryQueue {
    pub(crate) fn new(max_attempts: u32) -> Self {
        Self { state: StdMutex::new(QueueState::default()), max_attempts, lease: DEFAULT_JOB_LEASE }
    }

    /// Ends the lease of every job currently claimed, as if its worker died.
    pub(crate) fn expire_leases(&self) {
        let now = Instant::now();
        for (_, deadline) in &mut self.state().active {
            *deadline = now;
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("queue state")
    }

    pub(crate) fn waiting(&self) -> usize {
        self.state().waiting.len()
    }

    pub(crate) fn active(&self) -> usize {
        self.state().active.len()
    }

    pub(crate) fn completed(&self) -> Vec<Job> {
        self.state().completed.clone()
    }

    pub(crate) fn parked(&self) -> Vec<(Job, JobFailure)> {
        self.state().parked.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> Result<Job, QueueError> {
        let job = Job::new(payload);
        self.state().waiting.push_back(job.clone());
        Ok(job)
    }

    async fn claim(&self) -> Result<Option<Job>, QueueError> {
        let mut state = self.state();
        let Some(job) = state.waiting.pop_front() else {
            return Ok(None);
        };
        state.active.push((job.clone(), Instant::now() + self.lease));
        Ok(Some(job))
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state();
        state.release(job);
        state.completed.push(job.clone());
        Ok(())
    }

    async fn fail(
        &self,
        job: &Job,
        failure: &JobFailure,
    ) -> Result<FailureDisposition, QueueError> {
        Ok(self.state().settle(job, failure, self.max_attempts))
    }

    async fn recover_stalled(&self) -> Result<StalledJobs, QueueError> {
        let mut state = self.state();
        let now = Instant::now();
        let expired: Vec<Job> = state
            .active
            .iter()
            .filter(|(_, deadline)| *deadline <= now)
            .map(|(job, _)| job.clone())
            .collect();

        let failure = JobFailure { message: LEASE_EXPIRED.to_string(), retryable: true };
        let mut stalled = StalledJobs::default();
        for job in expired {
            stalled.record(state.settle(&job, &failure, self.max_attempts));
        }
        Ok(stalled)
    }
}
