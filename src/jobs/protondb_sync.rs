use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use super::{engine, Registry};
use crate::api::ProtonDbApi;
use crate::library::store::{games, jobs};
use crate::Status;

const WORKERS: usize = 5;

/// ProtonDB compatibility sync. Targets every game with a usable Steam
/// AppID, owned copy or IGDB cross-reference. A small worker pool shares the
/// registry's rate limiter; a 404 records tier 'unknown' so the id is not
/// queried again.
#[instrument(level = "info", skip(registry))]
pub async fn run(registry: Arc<Registry>, job_id: String, force: bool) -> Result<(), Status> {
    let pool = registry.db.pool();

    let eligible = games::list_with_steam_id(pool, force).await?;
    let total = eligible.len() as i64;
    if total == 0 {
        jobs::complete(pool, &job_id, "0", "No games with a Steam AppID to sync").await?;
        return Ok(());
    }

    info!("syncing protondb data for {total} games with {WORKERS} workers");
    jobs::update_progress(pool, &job_id, 0, total, &format!("Starting sync for {total} games"))
        .await?;

    let permits = Arc::new(Semaphore::new(WORKERS));
    let mut matched = 0;
    let mut failed = 0;

    for (index, chunk) in eligible.chunks(WORKERS).enumerate() {
        if engine::is_cancelled(&registry, &job_id).await {
            info!("protondb sync {job_id} cancelled");
            return Ok(());
        }

        let mut handles = vec![];
        for game in chunk {
            let registry = Arc::clone(&registry);
            let permits = Arc::clone(&permits);
            let steam_id = game.effective_steam_id();
            let game_id = game.id;
            let name = game.name.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire().await;
                let steam_id = steam_id?;

                registry.protondb_limiter.wait().await;
                Some((game_id, name, ProtonDbApi::get_summary(&steam_id).await))
            }));
        }

        for handle in join_all(handles).await {
            let (game_id, name, result) = match handle {
                Ok(Some(result)) => result,
                _ => continue,
            };

            match result {
                Ok(summary) => {
                    games::write_protondb(pool, game_id, &summary).await?;
                    matched += 1;
                }
                Err(Status::NotFound(_)) => {
                    games::mark_protondb_unknown(pool, game_id).await?;
                    failed += 1;
                }
                Err(e) => {
                    error!("protondb fetch failed for '{name}': {e}");
                    games::mark_protondb_unknown(pool, game_id).await?;
                    failed += 1;
                }
            }
        }

        let done = ((index + 1) * WORKERS).min(eligible.len()) as i64;
        jobs::update_progress(
            pool,
            &job_id,
            done,
            total,
            &format!("Checked {done}/{total} games - {matched} matched"),
        )
        .await?;
    }

    let result_msg = format!("{matched} games matched, {failed} without data");
    jobs::complete(pool, &job_id, &matched.to_string(), &result_msg).await?;
    info!("protondb sync {job_id} complete: {result_msg}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    #[tokio::test]
    async fn empty_target_set_completes() {
        let registry = Arc::new(Registry::new(Database::in_memory().await.unwrap()));
        let job_id = jobs::create(
            registry.db.pool(),
            crate::documents::JobType::ProtondbSync,
            "",
        )
        .await
        .unwrap();

        run(Arc::clone(&registry), job_id.clone(), false)
            .await
            .unwrap();

        let job = jobs::read(registry.db.pool(), &job_id).await.unwrap();
        assert_eq!(job.status, "completed");
    }
}
