use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{engine, Registry};
use crate::api::{binding_from, merge_genres};
use crate::library::ratings;
use crate::library::store::{games, jobs};
use crate::Status;

/// IGDB matching job over every row without a binding.
#[instrument(level = "info", skip(registry))]
pub async fn run(registry: Arc<Registry>, job_id: String) -> Result<(), Status> {
    let pool = registry.db.pool();
    let igdb = registry.igdb().await?;

    let unmatched = games::list_unmatched(pool).await?;
    let total = unmatched.len() as i64;
    if total == 0 {
        jobs::complete(pool, &job_id, "0", "Every game already has an IGDB match").await?;
        return Ok(());
    }

    info!("matching {total} games against IGDB");
    jobs::update_progress(pool, &job_id, 0, total, &format!("Matching {total} games"))
        .await?;

    let mut matched = 0;
    let mut missed = 0;

    for (index, game) in unmatched.iter().enumerate() {
        if engine::is_cancelled(&registry, &job_id).await {
            info!("igdb sync {job_id} cancelled at {}/{total}", index + 1);
            return Ok(());
        }

        jobs::update_progress(
            pool,
            &job_id,
            index as i64,
            total,
            &format!("Matching: {:.50}", game.name),
        )
        .await?;

        let release_year = game
            .release_date
            .as_deref()
            .and_then(|date| date.get(..4)?.parse::<i32>().ok());

        match igdb.match_title(&game.name, release_year).await {
            Ok(Some(igdb_game)) => {
                if let Err(e) = apply_binding(&registry, game.id, &igdb_game).await {
                    error!("failed to bind '{}': {e}", game.name);
                    missed += 1;
                    continue;
                }
                matched += 1;
            }
            Ok(None) => missed += 1,
            Err(e) => {
                error!("igdb match failed for '{}': {e}", game.name);
                missed += 1;
            }
        }
    }

    let result_msg = format!("{matched} games matched, {missed} without a match");
    jobs::complete(pool, &job_id, &matched.to_string(), &result_msg).await?;
    info!("igdb sync {job_id} complete: {result_msg}");
    Ok(())
}

/// Binding mode: the user supplies the IGDB id directly.
pub async fn bind_game(registry: &Registry, game_id: i64, igdb_id: i64) -> Result<String, Status> {
    let igdb = registry.igdb().await?;
    let igdb_game = igdb.get(igdb_id).await?;
    apply_binding(registry, game_id, &igdb_game).await?;
    Ok(igdb_game.name)
}

/// Clears all IGDB-derived columns and re-runs the rating aggregate.
pub async fn clear_binding(registry: &Registry, game_id: i64) -> Result<(), Status> {
    games::clear_igdb_binding(registry.db.pool(), game_id).await?;
    ratings::update_average_rating(registry.db.pool(), game_id).await
}

async fn apply_binding(
    registry: &Registry,
    game_id: i64,
    igdb_game: &crate::api::IgdbGame,
) -> Result<(), Status> {
    let pool = registry.db.pool();

    let binding = binding_from(igdb_game);
    let existing = games::read(pool, game_id).await?;
    let merged = merge_genres(&existing.genre_list(), &binding.genres);

    games::write_igdb_binding(pool, game_id, &binding, &merged).await?;
    ratings::update_average_rating(pool, game_id).await
}
