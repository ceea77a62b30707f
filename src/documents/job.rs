use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default, Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub progress: i64,
    pub total: i64,
    pub message: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub cancelled: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    StoreSync,
    IgdbSync,
    MetacriticSync,
    ProtondbSync,
    NewsSync,
    StatusSync,
    UpdateTracking,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::StoreSync => "store_sync",
            JobType::IgdbSync => "igdb_sync",
            JobType::MetacriticSync => "metacritic_sync",
            JobType::ProtondbSync => "protondb_sync",
            JobType::NewsSync => "news_sync",
            JobType::StatusSync => "status_sync",
            JobType::UpdateTracking => "update_tracking",
        }
    }

    pub fn from_str(value: &str) -> Option<JobType> {
        match value {
            "store_sync" => Some(JobType::StoreSync),
            "igdb_sync" => Some(JobType::IgdbSync),
            "metacritic_sync" => Some(JobType::MetacriticSync),
            "protondb_sync" => Some(JobType::ProtondbSync),
            "news_sync" => Some(JobType::NewsSync),
            "status_sync" => Some(JobType::StatusSync),
            "update_tracking" => Some(JobType::UpdateTracking),
            _ => None,
        }
    }

    /// Resumable jobs rely on per-item caches to skip work already done, so
    /// an orphaned run can safely be restarted after a process restart.
    pub fn is_resumable(&self) -> bool {
        matches!(self, JobType::NewsSync | JobType::StatusSync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips() {
        for job_type in [
            JobType::StoreSync,
            JobType::IgdbSync,
            JobType::MetacriticSync,
            JobType::ProtondbSync,
            JobType::NewsSync,
            JobType::StatusSync,
            JobType::UpdateTracking,
        ] {
            assert_eq!(JobType::from_str(job_type.as_str()), Some(job_type));
        }
        assert_eq!(JobType::from_str("bogus"), None);
    }

    #[test]
    fn only_news_and_status_resume() {
        assert!(JobType::NewsSync.is_resumable());
        assert!(JobType::StatusSync.is_resumable());
        assert!(!JobType::StoreSync.is_resumable());
        assert!(!JobType::UpdateTracking.is_resumable());
    }
}
