use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::IgdbApi;
use crate::library::store::{popularity::PopularityCache, settings};
use crate::library::Database;
use crate::pics::PicsManager;
use crate::util::RateLimiter;
use crate::Status;

/// Process-wide singleton state, passed into job constructors rather than
/// living as ambient globals. One registry per process; each field guards
/// itself.
pub struct Registry {
    pub db: Database,

    /// Ids of jobs cancelled by the user. Bodies poll this at every
    /// per-item boundary.
    pub cancelled_jobs: Mutex<HashSet<String>>,

    /// Tier-1 popularity cache.
    pub popularity: PopularityCache,

    /// Caller-side handle of the isolated product-info session.
    pub pics: PicsManager,

    igdb: Mutex<Option<IgdbApi>>,

    /// Steam news API: 200 requests per 5 minutes, at least 500ms apart.
    pub news_limiter: RateLimiter,

    /// ProtonDB: 500ms between calls across the worker pool.
    pub protondb_limiter: RateLimiter,

    /// Store-details endpoints used by status sync and update tracking.
    pub status_limiter: RateLimiter,
}

impl Registry {
    pub fn new(db: Database) -> Registry {
        Registry {
            db,
            cancelled_jobs: Mutex::new(HashSet::new()),
            popularity: PopularityCache::new(),
            pics: PicsManager::new(),
            igdb: Mutex::new(None),
            news_limiter: RateLimiter::new(
                200,
                Duration::from_secs(300),
                Duration::from_millis(500),
            ),
            protondb_limiter: RateLimiter::new(
                120,
                Duration::from_secs(60),
                Duration::from_millis(500),
            ),
            status_limiter: RateLimiter::new(
                120,
                Duration::from_secs(60),
                Duration::from_millis(500),
            ),
        }
    }

    /// IGDB client built from settings on first use. The OAuth token cache
    /// lives inside the connection.
    pub async fn igdb(&self) -> Result<IgdbApi, Status> {
        if let Some(api) = self.igdb.lock().unwrap().as_ref() {
            return Ok(api.clone());
        }

        let creds = settings::igdb_credentials(self.db.pool()).await?;
        let api = IgdbApi::new(&creds.client_id, &creds.secret);
        *self.igdb.lock().unwrap() = Some(api.clone());
        Ok(api)
    }

    /// Drops the cached IGDB client, e.g. after a credentials change.
    pub fn reset_igdb(&self) {
        *self.igdb.lock().unwrap() = None;
    }
}
