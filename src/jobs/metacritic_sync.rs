use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument};

use super::{engine, Registry};
use crate::api::MetacriticApi;
use crate::library::ratings;
use crate::library::store::{games, jobs};
use crate::Status;

const INTER_CALL_GAP: Duration = Duration::from_secs(1);

/// Metacritic score sync. Games with a user-set slug are refreshed; games
/// with an IGDB slug and no Metacritic match yet are tried with that slug,
/// which usually coincides.
#[instrument(level = "info", skip(registry))]
pub async fn run(registry: Arc<Registry>, job_id: String, force: bool) -> Result<(), Status> {
    let pool = registry.db.pool();

    let all = games::list_all(pool).await?;
    let eligible: Vec<_> = all
        .into_iter()
        .filter_map(|game| {
            let slug = game
                .metacritic_slug
                .clone()
                .or_else(|| game.igdb_slug.clone())?;
            let fresh = !force && game.metacritic_matched_at.is_some();
            match fresh {
                true => None,
                false => Some((game, slug)),
            }
        })
        .collect();

    let total = eligible.len() as i64;
    if total == 0 {
        jobs::complete(pool, &job_id, "0", "No games eligible for Metacritic sync").await?;
        return Ok(());
    }

    info!("syncing metacritic scores for {total} games");
    jobs::update_progress(pool, &job_id, 0, total, &format!("Starting sync for {total} games"))
        .await?;

    let mut synced = 0;
    let mut failed = 0;

    for (index, (game, slug)) in eligible.iter().enumerate() {
        if engine::is_cancelled(&registry, &job_id).await {
            info!("metacritic sync {job_id} cancelled at {}/{total}", index + 1);
            return Ok(());
        }

        jobs::update_progress(
            pool,
            &job_id,
            index as i64,
            total,
            &format!("Processing: {:.50}", game.name),
        )
        .await?;

        match MetacriticApi::get_scores(slug).await {
            Ok(data) => {
                games::write_metacritic(
                    pool,
                    game.id,
                    data.critic_score,
                    data.user_score,
                    Some(&data.url),
                    &data.slug,
                )
                .await?;
                ratings::update_average_rating(pool, game.id).await?;
                synced += 1;
            }
            Err(Status::NotFound(_)) => failed += 1,
            Err(e) => {
                error!("metacritic fetch failed for '{}': {e}", game.name);
                failed += 1;
            }
        }

        sleep(INTER_CALL_GAP).await;
    }

    let result_msg = format!("{synced} games synced, {failed} without scores");
    jobs::complete(pool, &job_id, &synced.to_string(), &result_msg).await?;
    info!("metacritic sync {job_id} complete: {result_msg}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    #[tokio::test]
    async fn nothing_eligible_completes() {
        let registry = Arc::new(Registry::new(Database::in_memory().await.unwrap()));
        let job_id = jobs::create(
            registry.db.pool(),
            crate::documents::JobType::MetacriticSync,
            "",
        )
        .await
        .unwrap();

        run(Arc::clone(&registry), job_id.clone(), false)
            .await
            .unwrap();

        let job = jobs::read(registry.db.pool(), &job_id).await.unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.result.as_deref(), Some("0"));
    }
}
