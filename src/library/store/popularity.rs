use chrono::{Duration, Utc};
use itertools::Itertools;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

use crate::documents::PopularityEntry;
use crate::Status;

const MEMORY_TTL_SECS: u64 = 15 * 60;
const DATABASE_TTL_HOURS: i64 = 24;

/// Tier-1 in-process cache keyed by library fingerprint. Tier 2 is the
/// `popularity_cache` table. TTLs are the sole staleness control; a library
/// mutation simply produces a different fingerprint.
pub struct PopularityCache {
    memory: Mutex<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    entries: Vec<PopularityEntry>,
    cached_at: Instant,
}

impl PopularityCache {
    pub fn new() -> Self {
        PopularityCache {
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic hash of a canonicalized IGDB id set.
    pub fn fingerprint(igdb_ids: &[i64]) -> String {
        let canonical = igdb_ids.iter().sorted().join(",");
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }

    pub fn get_memory(&self, key: &str) -> Option<Vec<PopularityEntry>> {
        let memory = self.memory.lock().unwrap();
        match memory.get(key) {
            Some(entry) if entry.cached_at.elapsed().as_secs() < MEMORY_TTL_SECS => {
                Some(entry.entries.clone())
            }
            _ => None,
        }
    }

    pub fn put_memory(&self, key: &str, entries: Vec<PopularityEntry>) {
        self.memory.lock().unwrap().insert(
            key.to_owned(),
            MemoryEntry {
                entries,
                cached_at: Instant::now(),
            },
        );
    }
}

/// Fresh tier-2 rows for the given ids, best value first.
pub async fn read_fresh(
    pool: &SqlitePool,
    igdb_ids: &[i64],
) -> Result<Vec<PopularityEntry>, Status> {
    if igdb_ids.is_empty() {
        return Ok(vec![]);
    }

    let cutoff = (Utc::now() - Duration::hours(DATABASE_TTL_HOURS))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    let placeholders = igdb_ids.iter().map(|_| "?").join(",");
    let sql = format!(
        r#"
        SELECT igdb_id, popularity_type, popularity_value
        FROM popularity_cache
        WHERE igdb_id IN ({placeholders}) AND cached_at > ?
        ORDER BY popularity_value DESC
        "#
    );
    let mut query = sqlx::query_as::<_, (i64, i64, f64)>(&sql);
    for id in igdb_ids {
        query = query.bind(id);
    }
    query = query.bind(&cutoff);

    Ok(query
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(igdb_id, popularity_type, value)| PopularityEntry {
            igdb_id,
            popularity_type,
            value,
        })
        .collect_vec())
}

/// Replace-semantics upsert into tier 2.
pub async fn write(pool: &SqlitePool, entries: &[PopularityEntry]) -> Result<(), Status> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    for entry in entries {
        sqlx::query(
            r#"
            REPLACE INTO popularity_cache (igdb_id, popularity_type, popularity_value, cached_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry.igdb_id)
        .bind(entry.popularity_type)
        .bind(entry.value)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// The discover read path: tier 1, then tier 2 (promoting a hit into tier 1),
/// then `fetch` as a last resort, writing its results through both tiers.
pub async fn resolve<F, Fut>(
    cache: &PopularityCache,
    pool: &SqlitePool,
    igdb_ids: &[i64],
    fetch: F,
) -> Result<Vec<PopularityEntry>, Status>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<PopularityEntry>, Status>>,
{
    let key = PopularityCache::fingerprint(igdb_ids);

    if let Some(entries) = cache.get_memory(&key) {
        return Ok(entries);
    }

    let cached = read_fresh(pool, igdb_ids).await?;
    if !cached.is_empty() {
        cache.put_memory(&key, cached.clone());
        return Ok(cached);
    }

    let fetched = fetch().await?;
    write(pool, &fetched).await?;
    cache.put_memory(&key, fetched.clone());
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    fn entry(igdb_id: i64, popularity_type: i64, value: f64) -> PopularityEntry {
        PopularityEntry {
            igdb_id,
            popularity_type,
            value,
        }
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = PopularityCache::fingerprint(&[300, 100, 200]);
        let b = PopularityCache::fingerprint(&[100, 200, 300]);
        assert_eq!(a, b);

        let c = PopularityCache::fingerprint(&[100, 200, 400]);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_of_empty_set_is_valid() {
        let key = PopularityCache::fingerprint(&[]);
        assert_eq!(key.len(), 32);
    }

    #[tokio::test]
    async fn tier2_write_then_read_round_trips() {
        let db = Database::in_memory().await.unwrap();

        write(db.pool(), &[entry(100, 1, 95.0), entry(100, 2, 40.0)])
            .await
            .unwrap();
        let rows = read_fresh(db.pool(), &[100]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 95.0);

        // Replace semantics on the same (igdb_id, type).
        write(db.pool(), &[entry(100, 1, 97.0)]).await.unwrap();
        let rows = read_fresh(db.pool(), &[100]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 97.0);
    }

    #[tokio::test]
    async fn stale_tier2_rows_are_ignored() {
        let db = Database::in_memory().await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO popularity_cache (igdb_id, popularity_type, popularity_value, cached_at)
            VALUES (100, 1, 95.0, datetime('now', '-25 hours'))
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(read_fresh(db.pool(), &[100]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn warm_tier2_promotes_into_tier1_without_fetch() {
        let db = Database::in_memory().await.unwrap();
        let cache = PopularityCache::new();

        write(db.pool(), &[entry(100, 1, 95.0)]).await.unwrap();

        let first = resolve(&cache, db.pool(), &[100], || async {
            panic!("fetch must not run on a tier-2 hit")
        })
        .await
        .unwrap();
        assert_eq!(first.len(), 1);

        // Second identical request is served from tier 1 and returns the same
        // payload byte for byte.
        let key = PopularityCache::fingerprint(&[100]);
        assert!(cache.get_memory(&key).is_some());
        let second = resolve(&cache, db.pool(), &[100], || async {
            panic!("fetch must not run on a tier-1 hit")
        })
        .await
        .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cold_caches_fall_through_to_fetch() {
        let db = Database::in_memory().await.unwrap();
        let cache = PopularityCache::new();

        let result = resolve(&cache, db.pool(), &[42], || async {
            Ok(vec![entry(42, 1, 88.0)])
        })
        .await
        .unwrap();
        assert_eq!(result.len(), 1);

        // Both tiers are populated afterwards.
        assert_eq!(read_fresh(db.pool(), &[42]).await.unwrap().len(), 1);
        let key = PopularityCache::fingerprint(&[42]);
        assert!(cache.get_memory(&key).is_some());
    }
}
