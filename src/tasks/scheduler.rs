use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::core::config::WorkerSettings;
use crate::core::state::AppState;
use crate::services::job_queue::{JobQueue, RedisJobQueue};
use crate::services::scoring_store::{PgScoringStore, ScoringStore};
use crate::tasks::scoring::ScoringOptions;
use crate::tasks::supervisor;

/// Running scoring workers plus the channel that stops them.
pub(crate) struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signals every worker and waits for in-flight jobs to finish.
    pub(crate) async fn stop(self) {
        if self.shutdown_tx.send(true).is_err() {
            tracing::warn!("Failed to broadcast shutdown signal to scoring workers");
        }

        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Scoring worker join failed");
            }
        }
    }
}

pub(crate) fn start_worker(
    store: Arc<dyn ScoringStore>,
    queue: Arc<dyn JobQueue>,
    settings: &WorkerSettings,
) -> WorkerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let concurrency = settings.concurrency.max(1);

    let mut handles: Vec<JoinHandle<()>> = (0..concurrency)
        .map(|worker| {
            tokio::spawn(scoring_worker(
                worker,
                store.clone(),
                queue.clone(),
                settings.clone(),
                shutdown_rx.clone(),
            ))
        })
        .collect();
    handles.push(tokio::spawn(stall_reaper(queue, settings.poll_interval, shutdown_rx)));

    tracing::info!(
        queue = %settings.queue_name,
        concurrency,
        batch_size = settings.batch_size,
        job_lease_s = settings.job_lease.as_secs(),
        scope = settings.code_attempt_scope.as_str(),
        "Scoring workers started"
    );

    WorkerHandle { shutdown_tx, handles }
}

/// Consumes the scoring queue until a shutdown signal arrives.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let settings = state.settings().worker();
    let store: Arc<dyn ScoringStore> = Arc::new(PgScoringStore::new(state.db().clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::new(state.redis().clone(), &settings.queue_name, settings.max_attempts)
            .with_lease(settings.job_lease),
    );

    let workers = start_worker(store, queue, settings);

    let signal = crate::core::shutdown::shutdown_signal().await;
    tracing::info!(signal, "Shutdown signal received, draining scoring workers");
    workers.stop().await;

    Ok(())
}

async fn scoring_worker(
    worker: usize,
    store: Arc<dyn ScoringStore>,
    queue: Arc<dyn JobQueue>,
    settings: WorkerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let options = ScoringOptions::from(&settings);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.claim().await {
            Ok(Some(job)) => {
                let outcome = supervisor::process_job(store.as_ref(), &job, options).await;
                let ack = settings.ack_failures;
                if let Err(err) =
                    supervisor::report_outcome(queue.as_ref(), &job, &outcome, ack).await
                {
                    tracing::error!(
                        worker,
                        job_id = %job.id,
                        error = %err,
                        "Failed to report scoring job outcome"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(worker, error = %err, "Failed to claim scoring job"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(settings.poll_interval) => {}
        }
    }

    tracing::debug!(worker, "Scoring worker stopped");
}

/// Hands jobs abandoned by crashed workers back to the queue. The first pass
/// runs at start-up so a restart picks up what the previous process left.
async fn stall_reaper(
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.recover_stalled().await {
            Ok(stalled) if stalled.total() > 0 => {
                metrics::counter!("scoring_jobs_stalled_total").increment(stalled.total() as u64);
                tracing::warn!(
                    requeued = stalled.requeued,
                    parked = stalled.parked,
                    "Recovered scoring jobs with expired leases"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "Failed to recover stalled scoring jobs"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(interval) => {}
        }
    }
}
