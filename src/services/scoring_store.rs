use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::PgPool;
use thiserror::Error;

use crate::core::config::CodeAttemptScope;
use crate::core::time::primitive_now_utc;
use crate::db::models::{CodeAttempt, Problem, Quiz, StudentAttempt};
use crate::repositories;
use crate::repositories::results::ResultUpsert;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything the scoring job reads from and writes to.
#[async_trait]
pub(crate) trait ScoringStore: Send + Sync {
    /// Verifies the store is reachable before a job starts.
    async fn ensure_connected(&self) -> Result<(), StoreError>;

    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, StoreError>;

    async fn list_code_attempts(
        &self,
        scope: CodeAttemptScope,
        quiz_id: &str,
    ) -> Result<Vec<CodeAttempt>, StoreError>;

    async fn list_problems(&self, problem_ids: &[String]) -> Result<Vec<Problem>, StoreError>;

    /// Streams the quiz's attempts one at a time without buffering the set.
    fn stream_student_attempts<'a>(
        &'a self,
        quiz_id: &'a str,
    ) -> BoxStream<'a, Result<StudentAttempt, StoreError>>;

    /// Applies every entry as an independent upsert keyed by (student, quiz).
    async fn upsert_results(&self, entries: &[ResultUpsert]) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub(crate) struct PgScoringStore {
    pool: PgPool,
}

impl PgScoringStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoringStore for PgScoringStore {
    async fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("database pool is closed".to_string()));
        }
        let latency = repositories::health::ping(&self.pool).await?;
        tracing::debug!(latency_ms = latency.as_millis() as u64, "database ping ok");
        Ok(())
    }

    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, StoreError> {
        Ok(repositories::quizzes::find_by_id(&self.pool, quiz_id).await?)
    }

    async fn list_code_attempts(
        &self,
        scope: CodeAttemptScope,
        quiz_id: &str,
    ) -> Result<Vec<CodeAttempt>, StoreError> {
        let attempts = match scope {
            CodeAttemptScope::All => repositories::code_attempts::list_all(&self.pool).await?,
            CodeAttemptScope::Quiz => {
                repositories::code_attempts::list_by_quiz(&self.pool, quiz_id).await?
            }
        };
        Ok(attempts)
    }

    async fn list_problems(&self, problem_ids: &[String]) -> Result<Vec<Problem>, StoreError> {
        Ok(repositories::problems::list_by_ids(&self.pool, problem_ids).await?)
    }

    fn stream_student_attempts<'a>(
        &'a self,
        quiz_id: &'a str,
    ) -> BoxStream<'a, Result<StudentAttempt, StoreError>> {
        repositories::student_attempts::stream_by_quiz(&self.pool, quiz_id)
            .map_err(StoreError::from)
            .boxed()
    }

    async fn upsert_results(&self, entries: &[ResultUpsert]) -> Result<u64, StoreError> {
        Ok(repositories::results::bulk_upsert(&self.pool, entries, primitive_now_utc()).await?)
    }
}
