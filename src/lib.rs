pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use anyhow::Context;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::schemas::job::ScoringJobPayload;
use crate::services::job_queue::{JobQueue, RedisJobQueue};

/// Runs the scoring worker until SIGINT or SIGTERM.
pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "quiz-scoring")?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; workers will retry on claim");
    } else {
        tracing::info!(queue = %settings.worker().queue_name, "Redis connected successfully");
    }

    let state = AppState::new(settings, db_pool.clone(), redis.clone());
    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    db_pool.close().await;
    tracing::info!("Scoring worker stopped");

    result
}

/// Validates `quiz_id` and pushes one scoring job onto the configured queue.
/// Returns the new job id.
pub async fn enqueue_scoring_job(quiz_id: &str) -> anyhow::Result<String> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "enqueue-scoring")?;

    let payload = ScoringJobPayload::new(quiz_id).map_err(anyhow::Error::msg)?;

    let worker = settings.worker();
    let redis = RedisHandle::new(settings.redis().redis_url());
    redis.connect().await.context("Failed to connect to Redis")?;

    let queue = RedisJobQueue::new(redis.clone(), &worker.queue_name, worker.max_attempts);
    let job = queue.enqueue(serde_json::to_value(&payload)?).await?;
    redis.disconnect().await;

    tracing::info!(
        job_id = %job.id,
        quiz_id = %payload.quiz_id,
        queue = %worker.queue_name,
        "Scoring job enqueued"
    );
    Ok(job.id.to_string())
}
