use std::time::Instant;

use crate::schemas::job::ScoringJobPayload;
use crate::services::job_queue::{FailureDisposition, Job, JobFailure, JobQueue, QueueError};
use crate::services::scoring_store::ScoringStore;
use crate::tasks::scoring::{self, ScoringOptions, ScoringSummary};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JobOutcome {
    Completed(ScoringSummary),
    Failed(JobFailure),
}

/// Runs one claimed job to an outcome. Never panics on bad input; every
/// failure is turned into a `JobFailure` for the queue.
pub(crate) async fn process_job<S: ScoringStore + ?Sized>(
    store: &S,
    job: &Job,
    options: ScoringOptions,
) -> JobOutcome {
    let started = Instant::now();
    let attempt = job.attempts_made + 1;

    let payload = match ScoringJobPayload::parse(&job.payload) {
        Ok(payload) => payload,
        Err(message) => {
            tracing::warn!(job_id = %job.id, attempt, error = %message, "Rejecting scoring job");
            metrics::counter!("scoring_jobs_total", "status" => "rejected").increment(1);
            return JobOutcome::Failed(JobFailure { message, retryable: false });
        }
    };
    let quiz_id = payload.quiz_id.as_str();

    tracing::info!(job_id = %job.id, attempt, quiz_id, "Processing scoring job");

    if let Err(err) = store.ensure_connected().await {
        tracing::error!(job_id = %job.id, quiz_id, error = %err, "Store unreachable");
        metrics::counter!("scoring_jobs_total", "status" => "failed").increment(1);
        return JobOutcome::Failed(JobFailure { message: err.to_string(), retryable: true });
    }

    let result = scoring::run_scoring_job(store, quiz_id, options).await;
    let duration = started.elapsed().as_secs_f64();
    metrics::histogram!("scoring_job_duration_seconds").record(duration);

    match result {
        Ok(summary) => {
            metrics::counter!("scoring_jobs_total", "status" => "completed").increment(1);
            tracing::info!(
                job_id = %job.id,
                quiz_id,
                students_scored = summary.students_scored,
                rows_written = summary.rows_written,
                duration_s = duration,
                "Scoring job completed"
            );
            JobOutcome::Completed(summary)
        }
        Err(err) => {
            metrics::counter!("scoring_jobs_total", "status" => "failed").increment(1);
            tracing::error!(
                job_id = %job.id,
                quiz_id,
                retryable = err.is_retryable(),
                error = %err,
                "Scoring job failed"
            );
            let retryable = err.is_retryable();
            JobOutcome::Failed(JobFailure { message: err.to_string(), retryable })
        }
    }
}

/// Reports an outcome back to the queue. With `ack_failures` a failed job is
/// acknowledged like a completed one and never redelivered.
pub(crate) async fn report_outcome(
    queue: &dyn JobQueue,
    job: &Job,
    outcome: &JobOutcome,
    ack_failures: bool,
) -> Result<(), QueueError> {
    let failure = match outcome {
        JobOutcome::Completed(_) => return queue.complete(job).await,
        JobOutcome::Failed(_) if ack_failures => return queue.complete(job).await,
        JobOutcome::Failed(failure) => failure,
    };

    match queue.fail(job, failure).await? {
        FailureDisposition::Requeued { attempts_made } => {
            metrics::counter!("scoring_jobs_retried_total").increment(1);
            tracing::warn!(job_id = %job.id, attempts_made, "Scoring job requeued");
        }
        FailureDisposition::Parked => {
            tracing::warn!(job_id = %job.id, error = %failure.message, "Scoring job parked");
        }
    }
    Ok(())
}
