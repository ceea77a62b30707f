use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{engine, Registry};
use crate::api::SteamApi;
use crate::documents::{GameRow, UpdateKind};
use crate::library::store::{games, jobs, settings, updates};
use crate::Status;

/// What a store reported for one title on this pass.
#[derive(Default, Debug, Clone)]
pub struct Observation {
    pub last_modified: Option<String>,
    pub development_status: Option<String>,
}

/// Update-tracking job: detects build changes and Early-Access releases for
/// every game with a store identifier, appending to the update history.
#[instrument(level = "info", skip(registry))]
pub async fn run(registry: Arc<Registry>, job_id: String) -> Result<(), Status> {
    let pool = registry.db.pool();

    let eligible = games::list_with_store_id(pool, &["steam", "epic", "gog"]).await?;
    let total = eligible.len() as i64;
    if total == 0 {
        jobs::complete(pool, &job_id, "0", "No games found for update tracking").await?;
        return Ok(());
    }

    let use_pics = settings::get_flag(pool, settings::USE_STEAM_CLIENT, false).await?;
    info!("tracking updates for {total} games (pics: {use_pics})");
    jobs::update_progress(
        pool,
        &job_id,
        0,
        total,
        &format!("Starting update tracking for {total} games"),
    )
    .await?;

    let mut detected = 0;
    let mut failed = 0;

    for (index, game) in eligible.iter().enumerate() {
        if engine::is_cancelled(&registry, &job_id).await {
            info!("update tracking {job_id} cancelled at {}/{total}", index + 1);
            return Ok(());
        }

        let observation = match observe(Arc::clone(&registry), game, use_pics).await {
            Ok(observation) => observation,
            Err(e) => {
                error!("update check failed for '{}': {e}", game.name);
                failed += 1;
                continue;
            }
        };

        match apply_observation(pool, game, &observation).await {
            Ok(true) => detected += 1,
            Ok(false) => {}
            Err(e) => {
                error!("failed to record update for '{}': {e}", game.name);
                failed += 1;
            }
        }

        if (index + 1) % 10 == 0 || index + 1 == eligible.len() {
            jobs::update_progress(
                pool,
                &job_id,
                (index + 1) as i64,
                total,
                &format!("Checked {}/{total} games - {detected} updates found", index + 1),
            )
            .await?;
        }
    }

    let result_msg = format!("Found {detected} updates in {total} games ({failed} failed)");
    jobs::complete(pool, &job_id, &detected.to_string(), &result_msg).await?;
    info!("update tracking {job_id} complete: {result_msg}");
    Ok(())
}

/// Fetches the current store view of one title. Steam prefers the
/// product-info session when enabled, falling back to the store-details
/// endpoint; Epic tracking is not implemented and reports no data.
async fn observe(
    registry: Arc<Registry>,
    game: &GameRow,
    use_pics: bool,
) -> Result<Observation, Status> {
    let store_id = match &game.store_id {
        Some(store_id) => store_id.clone(),
        None => return Ok(Observation::default()),
    };

    match game.store.as_str() {
        "steam" => {
            if use_pics {
                if let Some(observation) = observe_via_pics(Arc::clone(&registry), &store_id).await
                {
                    return Ok(observation);
                }
            }

            registry.status_limiter.wait().await;
            let details = SteamApi::get_app_details(&store_id).await?;
            Ok(Observation {
                last_modified: details.last_modified.and_then(format_timestamp),
                development_status: Some(details.development_status().to_owned()),
            })
        }
        // Known hole: Epic has no update feed wired up.
        "epic" => Ok(Observation::default()),
        _ => Ok(Observation::default()),
    }
}

/// A change-number bump is equivalent to a last-modified bump; the observed
/// change time is the timestamp written. The session queue blocks, so the
/// exchange runs off the async executor.
async fn observe_via_pics(registry: Arc<Registry>, store_id: &str) -> Option<Observation> {
    let app_id: u32 = store_id.parse().ok()?;

    let products = tokio::task::spawn_blocking(move || {
        registry
            .pics
            .with_client(|client| client.get_product_info(vec![app_id]))
    })
    .await
    .ok()?
    .ok()?;
    let info = products.get(&app_id)?;

    Some(Observation {
        last_modified: format_timestamp(info.last_change),
        development_status: None,
    })
}

/// The transition table. Returns true when an update was detected and
/// recorded.
pub async fn apply_observation(
    pool: &sqlx::SqlitePool,
    game: &GameRow,
    observation: &Observation,
) -> Result<bool, Status> {
    let mut detected = false;
    let depot_id = format!(
        "{}:{}",
        game.store,
        game.store_id.as_deref().unwrap_or_default()
    );

    if let Some(reported) = &observation.last_modified {
        match &game.last_modified {
            // First observation: set the field and seed the history.
            None => {
                games::set_last_modified(pool, game.id, reported).await?;
                updates::append(pool, game.id, &depot_id, UpdateKind::InitialVersion, reported)
                    .await?;
                detected = true;
            }
            Some(previous) if previous != reported => {
                if is_later(previous, reported) {
                    games::set_last_modified(pool, game.id, reported).await?;
                    updates::append(pool, game.id, &depot_id, UpdateKind::VersionUpdate, reported)
                        .await?;
                    detected = true;
                }
            }
            Some(_) => {}
        }
    }

    if let Some(status) = &observation.development_status {
        // Only the Early-Access to Released transition is history-worthy.
        if game.development_status.as_deref() == Some("early_access") && status == "released" {
            games::set_development_status(pool, game.id, Some(status), None).await?;
            let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
            updates::append(pool, game.id, &depot_id, UpdateKind::EaRelease, &now).await?;
            detected = true;
        } else if game.development_status.is_none() {
            games::set_development_status(pool, game.id, Some(status), None).await?;
        }
    }

    Ok(detected)
}

fn is_later(previous: &str, reported: &str) -> bool {
    match (parse_instant(previous), parse_instant(reported)) {
        (Some(previous), Some(reported)) => reported > previous,
        _ => false,
    }
}

fn parse_instant(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

fn format_timestamp(unix: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|date| date.format("%Y-%m-%dT%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::RawGame;
    use crate::library::Database;

    async fn seed(pool: &sqlx::SqlitePool) -> GameRow {
        let id = games::insert_raw(pool, &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();
        games::read(pool, id).await.unwrap()
    }

    #[tokio::test]
    async fn first_observation_seeds_initial_version() {
        let db = Database::in_memory().await.unwrap();
        let game = seed(db.pool()).await;

        let detected = apply_observation(
            db.pool(),
            &game,
            &Observation {
                last_modified: Some("2025-01-01T00:00:00".to_owned()),
                development_status: None,
            },
        )
        .await
        .unwrap();
        assert!(detected);

        let history = updates::list_for_game(db.pool(), game.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].manifest_id.as_deref(), Some("initial_version"));
    }

    #[tokio::test]
    async fn later_timestamp_appends_version_update() {
        let db = Database::in_memory().await.unwrap();
        let game = seed(db.pool()).await;
        games::set_last_modified(db.pool(), game.id, "2025-01-01T00:00:00")
            .await
            .unwrap();
        let game = games::read(db.pool(), game.id).await.unwrap();

        let detected = apply_observation(
            db.pool(),
            &game,
            &Observation {
                last_modified: Some("2025-02-01T00:00:00".to_owned()),
                development_status: None,
            },
        )
        .await
        .unwrap();
        assert!(detected);

        let updated = games::read(db.pool(), game.id).await.unwrap();
        assert_eq!(updated.last_modified.as_deref(), Some("2025-02-01T00:00:00"));
        let history = updates::list_for_game(db.pool(), game.id).await.unwrap();
        assert_eq!(history[0].manifest_id.as_deref(), Some("version_update"));
        assert_eq!(
            history[0].update_timestamp.as_deref(),
            Some("2025-02-01T00:00:00")
        );
    }

    #[tokio::test]
    async fn older_or_equal_timestamp_is_a_no_op() {
        let db = Database::in_memory().await.unwrap();
        let game = seed(db.pool()).await;
        games::set_last_modified(db.pool(), game.id, "2025-02-01T00:00:00")
            .await
            .unwrap();
        let game = games::read(db.pool(), game.id).await.unwrap();

        for reported in ["2025-01-01T00:00:00", "2025-02-01T00:00:00"] {
            let detected = apply_observation(
                db.pool(),
                &game,
                &Observation {
                    last_modified: Some(reported.to_owned()),
                    development_status: None,
                },
            )
            .await
            .unwrap();
            assert!(!detected);
        }

        assert!(updates::list_for_game(db.pool(), game.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ea_release_transition_is_recorded() {
        let db = Database::in_memory().await.unwrap();
        let game = seed(db.pool()).await;
        games::set_development_status(db.pool(), game.id, Some("early_access"), None)
            .await
            .unwrap();
        let game = games::read(db.pool(), game.id).await.unwrap();

        let detected = apply_observation(
            db.pool(),
            &game,
            &Observation {
                last_modified: None,
                development_status: Some("released".to_owned()),
            },
        )
        .await
        .unwrap();
        assert!(detected);

        let updated = games::read(db.pool(), game.id).await.unwrap();
        assert_eq!(updated.development_status.as_deref(), Some("released"));
        let history = updates::list_for_game(db.pool(), game.id).await.unwrap();
        assert_eq!(history[0].manifest_id.as_deref(), Some("ea_release"));
    }

    #[tokio::test]
    async fn released_to_released_is_silent() {
        let db = Database::in_memory().await.unwrap();
        let game = seed(db.pool()).await;
        games::set_development_status(db.pool(), game.id, Some("released"), None)
            .await
            .unwrap();
        let game = games::read(db.pool(), game.id).await.unwrap();

        let detected = apply_observation(
            db.pool(),
            &game,
            &Observation {
                last_modified: None,
                development_status: Some("released".to_owned()),
            },
        )
        .await
        .unwrap();
        assert!(!detected);
        assert!(updates::list_for_game(db.pool(), game.id)
            .await
            .unwrap()
            .is_empty());
    }
}
