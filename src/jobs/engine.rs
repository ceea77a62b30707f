use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::Registry;
use crate::documents::JobType;
use crate::library::store::jobs;
use crate::Status;

/// Hours after which terminal jobs are swept.
const CLEANUP_AGE_HOURS: i64 = 24;

/// Cooperative cancellation check. The in-memory set is consulted first and
/// the persisted flag second, so a cancel issued by another process instance
/// is still honored.
pub async fn is_cancelled(registry: &Registry, job_id: &str) -> bool {
    if registry.cancelled_jobs.lock().unwrap().contains(job_id) {
        return true;
    }

    match jobs::is_cancelled(registry.db.pool(), job_id).await {
        Ok(true) => {
            registry
                .cancelled_jobs
                .lock()
                .unwrap()
                .insert(job_id.to_owned());
            true
        }
        _ => false,
    }
}

/// Flags a job for cancellation. Idempotent; returns false when the job was
/// already terminal.
pub async fn cancel_job(registry: &Registry, job_id: &str) -> Result<bool, Status> {
    registry
        .cancelled_jobs
        .lock()
        .unwrap()
        .insert(job_id.to_owned());

    jobs::cancel(registry.db.pool(), job_id).await
}

/// Runs a job body on its own task. The engine imposes no concurrency cap;
/// bodies manage their own parallelism and rate limiting. A body error
/// transitions the job to failed.
pub fn run_job_async<F>(registry: Arc<Registry>, job_id: String, body: F)
where
    F: Future<Output = Result<(), Status>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = body.await {
            error!("job {job_id} failed: {e}");
            if let Err(e) = jobs::fail(registry.db.pool(), &job_id, &e.to_string()).await {
                error!("failed to record job {job_id} failure: {e}");
            }
        }
    });
}

/// Handles jobs stranded by a previous process: resumable types go back to
/// pending and are re-scheduled with force=false so per-item caches suppress
/// the work already done; everything else is failed. This is the only place
/// jobs transition without user action.
#[instrument(level = "info", skip(registry))]
pub async fn resume_orphaned_jobs(registry: Arc<Registry>) -> Result<(usize, usize), Status> {
    let orphaned = jobs::orphaned(registry.db.pool()).await?;
    let mut resumed = 0;
    let mut failed = 0;

    for job in orphaned {
        match JobType::from_str(&job.job_type) {
            Some(job_type) if job_type.is_resumable() => {
                jobs::reset_to_pending(
                    registry.db.pool(),
                    &job.id,
                    "Resuming after restart (cache will skip completed items)...",
                )
                .await?;

                let body_registry = Arc::clone(&registry);
                match job_type {
                    JobType::NewsSync => run_job_async(
                        Arc::clone(&registry),
                        job.id.clone(),
                        super::news_sync::run(body_registry, job.id.clone(), false, 10),
                    ),
                    JobType::StatusSync => run_job_async(
                        Arc::clone(&registry),
                        job.id.clone(),
                        super::status_sync::run(body_registry, job.id.clone(), None, false),
                    ),
                    _ => unreachable!(),
                }
                info!("resumed {} job {}", job.job_type, job.id);
                resumed += 1;
            }
            _ => {
                jobs::fail(
                    registry.db.pool(),
                    &job.id,
                    "Server restarted - job type cannot auto-resume",
                )
                .await?;
                failed += 1;
            }
        }
    }

    if resumed > 0 {
        info!("auto-resumed {resumed} interrupted job(s)");
    }
    if failed > 0 {
        info!("marked {failed} non-resumable job(s) as failed");
    }

    jobs::cleanup_old(registry.db.pool(), CLEANUP_AGE_HOURS).await?;

    Ok((resumed, failed))
}
