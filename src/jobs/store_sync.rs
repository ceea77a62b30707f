use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{engine, igdb_sync, Registry};
use crate::api::{
    AmazonApi, AmazonTokens, BattlenetApi, EaApi, EpicApi, GogDbApi, HumbleApi, ItchApi, SteamApi,
};
use crate::documents::{RawGame, Storefront};
use crate::library::store::{games, jobs, settings};
use crate::library::{auto_tags, importer};
use crate::Status;

/// Full store sync: fetch the remote catalog, commit it, match new rows
/// against IGDB, recompute auto tags for rows whose playtime moved.
#[instrument(level = "info", skip(registry))]
pub async fn run(registry: Arc<Registry>, job_id: String, store: String) -> Result<(), Status> {
    let pool = registry.db.pool();

    jobs::update_progress(pool, &job_id, 0, 3, &format!("Fetching {store} catalog"))
        .await?;

    let raw_games = match fetch_catalog(&registry, &store).await {
        Ok(raw_games) => raw_games,
        Err(e @ Status::NotConfigured(_)) => {
            // Setup problems surface directly; the engine does not retry.
            jobs::fail(pool, &job_id, &e.to_string()).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if engine::is_cancelled(&registry, &job_id).await {
        return Ok(());
    }

    jobs::update_progress(
        pool,
        &job_id,
        1,
        3,
        &format!("Importing {} games", raw_games.len()),
    )
    .await?;
    let summary = importer::import_batch(pool, &store, raw_games).await?;

    if engine::is_cancelled(&registry, &job_id).await {
        return Ok(());
    }

    jobs::update_progress(
        pool,
        &job_id,
        2,
        3,
        &format!("Matching {} new games against IGDB", summary.unmatched_ids.len()),
    )
    .await?;
    let mut matched = 0;
    match registry.igdb().await {
        Ok(igdb) => {
            for game_id in &summary.unmatched_ids {
                if engine::is_cancelled(&registry, &job_id).await {
                    return Ok(());
                }

                let game = match games::read(pool, *game_id).await {
                    Ok(game) => game,
                    Err(_) => continue,
                };
                let release_year = game
                    .release_date
                    .as_deref()
                    .and_then(|date| date.get(..4)?.parse::<i32>().ok());

                match igdb.match_title(&game.name, release_year).await {
                    Ok(Some(igdb_game)) => {
                        if let Err(e) = igdb_sync::bind_game(&registry, *game_id, igdb_game.id).await
                        {
                            error!("failed to bind '{}': {e}", game.name);
                        } else {
                            matched += 1;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("igdb match failed for '{}': {e}", game.name),
                }
            }
        }
        Err(Status::NotConfigured(_)) => {
            info!("igdb credentials missing, skipping match step")
        }
        Err(e) => error!("igdb unavailable: {e}"),
    }

    for game_id in &summary.playtime_changed_ids {
        auto_tags::update_for_game(pool, *game_id).await?;
    }

    let result_msg = format!(
        "{} created, {} updated, {} failed, {matched} matched",
        summary.created, summary.updated, summary.failed
    );
    jobs::complete(pool, &job_id, &summary.processed.to_string(), &result_msg).await?;
    info!("{store} sync {job_id} complete: {result_msg}");
    Ok(())
}

/// Builds the adapter for a store id from settings and fetches its catalog.
async fn fetch_catalog(registry: &Registry, store: &str) -> Result<Vec<RawGame>, Status> {
    let pool = registry.db.pool();

    match store {
        "steam" => {
            let creds = settings::steam_credentials(pool).await?;
            SteamApi::new(&creds.api_key, &creds.user_id)
                .get_owned_games()
                .await
        }
        "epic" => EpicApi::new().get_owned_games().await,
        "gog" => {
            let db_path = settings::get(pool, settings::GOG_DB_PATH)
                .await?
                .ok_or_else(|| Status::not_configured("GOG database path is not set"))?;
            GogDbApi::new(&db_path).get_owned_games().await
        }
        "itch" => {
            let api_key = settings::get_or(pool, settings::ITCH_API_KEY, "").await?;
            ItchApi::new(&api_key).get_owned_games().await
        }
        "humble" => {
            let cookie = settings::get_or(pool, settings::HUMBLE_SESSION_COOKIE, "").await?;
            HumbleApi::new(&cookie).get_owned_games().await
        }
        "battlenet" => {
            let cookie = settings::get_or(pool, settings::BATTLENET_COOKIE, "").await?;
            BattlenetApi::new(&cookie).get_owned_games().await
        }
        "amazon" => {
            let tokens = settings::get(pool, settings::AMAZON_TOKENS)
                .await?
                .and_then(|raw| serde_json::from_str::<AmazonTokens>(&raw).ok());
            let local_db = default_amazon_db_path();

            let api = AmazonApi::new(tokens, local_db);
            let games = api.get_owned_games().await?;
            Ok(games)
        }
        "ea" => {
            let token = settings::get_or(pool, settings::EA_BEARER_TOKEN, "").await?;
            EaApi::new(&token).get_owned_games().await
        }
        _ => Err(Status::invalid_argument(format!("unknown store '{store}'"))),
    }
}

fn default_amazon_db_path() -> Option<PathBuf> {
    let local_app_data = std::env::var("LOCALAPPDATA").ok()?;
    let path = PathBuf::from(local_app_data)
        .join("Amazon Games")
        .join("Data")
        .join("Games")
        .join("Sql")
        .join("GameInstallInfo.sqlite");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    #[tokio::test]
    async fn unconfigured_store_fails_the_job_without_retry() {
        let registry = Arc::new(Registry::new(Database::in_memory().await.unwrap()));
        let job_id = jobs::create(registry.db.pool(), crate::documents::JobType::StoreSync, "")
            .await
            .unwrap();

        run(Arc::clone(&registry), job_id.clone(), "steam".to_owned())
            .await
            .unwrap();

        let job = jobs::read(registry.db.pool(), &job_id).await.unwrap();
        assert_eq!(job.status, "failed");
        assert!(job.error.unwrap_or_default().contains("Steam"));
    }

    #[tokio::test]
    async fn unknown_store_is_invalid() {
        let registry = Arc::new(Registry::new(Database::in_memory().await.unwrap()));
        match fetch_catalog(&registry, "myspace").await {
            Err(Status::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }
}
