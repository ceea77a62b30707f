use chrono::Utc;
use sqlx::SqlitePool;

use crate::documents::{Job, JobStatus, JobType};
use crate::Status;

fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Creates a pending job and returns its short opaque id.
pub async fn create(pool: &SqlitePool, job_type: JobType, message: &str) -> Result<String, Status> {
    let job_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_owned();

    sqlx::query(
        r#"
        INSERT INTO jobs (id, type, status, message, created_at, updated_at)
        VALUES (?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(&job_id)
    .bind(job_type.as_str())
    .bind(message)
    .bind(now())
    .bind(now())
    .execute(pool)
    .await?;

    Ok(job_id)
}

/// First progress update moves the job to running. Terminal jobs are never
/// touched.
pub async fn update_progress(
    pool: &SqlitePool,
    job_id: &str,
    progress: i64,
    total: i64,
    message: &str,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET progress = ?, total = ?, message = ?, status = 'running', updated_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(progress)
    .bind(total)
    .bind(message)
    .bind(now())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn complete(
    pool: &SqlitePool,
    job_id: &str,
    result: &str,
    message: &str,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed', result = ?, message = ?, progress = total,
            updated_at = ?, completed_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(result)
    .bind(message)
    .bind(now())
    .bind(now())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fail(pool: &SqlitePool, job_id: &str, error: &str) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', error = ?, updated_at = ?, completed_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(error)
    .bind(now())
    .bind(now())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks a live job cancelled. Returns false when the job was already
/// terminal (cancel is idempotent).
pub async fn cancel(pool: &SqlitePool, job_id: &str) -> Result<bool, Status> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', cancelled = 1, error = 'Cancelled by user',
            updated_at = ?, completed_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(now())
    .bind(now())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_cancelled(pool: &SqlitePool, job_id: &str) -> Result<bool, Status> {
    let row: Option<(Option<bool>,)> = sqlx::query_as("SELECT cancelled FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(c,)| c.unwrap_or(false)).unwrap_or(false))
}

pub async fn read(pool: &SqlitePool, job_id: &str) -> Result<Job, Status> {
    let job: Option<Job> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    job.ok_or_else(|| Status::not_found(format!("job '{job_id}' was not found")))
}

pub async fn active(pool: &SqlitePool) -> Result<Vec<Job>, Status> {
    Ok(sqlx::query_as(
        "SELECT * FROM jobs WHERE status IN ('pending', 'running') ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>, Status> {
    Ok(
        sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await?,
    )
}

/// Jobs stranded in pending/running by a previous process.
pub async fn orphaned(pool: &SqlitePool) -> Result<Vec<Job>, Status> {
    Ok(sqlx::query_as(
        "SELECT * FROM jobs WHERE status IN ('pending', 'running') ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn reset_to_pending(pool: &SqlitePool, job_id: &str, message: &str) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE jobs SET status = 'pending', message = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(message)
    .bind(now())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort sweeper for terminal jobs older than `hours`.
pub async fn cleanup_old(pool: &SqlitePool, hours: i64) -> Result<u64, Status> {
    let result = sqlx::query(
        r#"
        DELETE FROM jobs
        WHERE status IN ('completed', 'failed')
        AND completed_at < datetime('now', ?)
        "#,
    )
    .bind(format!("-{hours} hours"))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub fn status_of(job: &Job) -> Option<JobStatus> {
    match job.status.as_str() {
        "pending" => Some(JobStatus::Pending),
        "running" => Some(JobStatus::Running),
        "completed" => Some(JobStatus::Completed),
        "failed" => Some(JobStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    #[tokio::test]
    async fn lifecycle_pending_running_completed() {
        let db = Database::in_memory().await.unwrap();

        let id = create(db.pool(), JobType::NewsSync, "starting").await.unwrap();
        let job = read(db.pool(), &id).await.unwrap();
        assert_eq!(job.status, "pending");

        update_progress(db.pool(), &id, 3, 10, "working").await.unwrap();
        let job = read(db.pool(), &id).await.unwrap();
        assert_eq!(job.status, "running");
        assert_eq!(job.progress, 3);
        assert_eq!(job.total, 10);

        complete(db.pool(), &id, "10", "done").await.unwrap();
        let job = read(db.pool(), &id).await.unwrap();
        assert_eq!(job.status, "completed");
        // progress := total on completion.
        assert_eq!(job.progress, job.total);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_sets_terminal_failed() {
        let db = Database::in_memory().await.unwrap();

        let id = create(db.pool(), JobType::NewsSync, "").await.unwrap();
        update_progress(db.pool(), &id, 1, 100, "working").await.unwrap();

        assert!(cancel(db.pool(), &id).await.unwrap());
        let job = read(db.pool(), &id).await.unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.cancelled, Some(true));
        assert_eq!(job.error.as_deref(), Some("Cancelled by user"));

        // Idempotent; second cancel reports no transition.
        assert!(!cancel(db.pool(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn terminal_jobs_are_immutable() {
        let db = Database::in_memory().await.unwrap();

        let id = create(db.pool(), JobType::StoreSync, "").await.unwrap();
        complete(db.pool(), &id, "5", "done").await.unwrap();

        update_progress(db.pool(), &id, 1, 2, "late write").await.unwrap();
        fail(db.pool(), &id, "late failure").await.unwrap();

        let job = read(db.pool(), &id).await.unwrap();
        assert_eq!(job.status, "completed");
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn active_excludes_terminal() {
        let db = Database::in_memory().await.unwrap();

        let running = create(db.pool(), JobType::NewsSync, "").await.unwrap();
        update_progress(db.pool(), &running, 1, 2, "").await.unwrap();
        let done = create(db.pool(), JobType::StoreSync, "").await.unwrap();
        complete(db.pool(), &done, "", "").await.unwrap();

        let jobs = active(db.pool()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, running);
    }
}
