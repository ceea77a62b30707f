use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{engine, Registry};
use crate::api::SteamApi;
use crate::documents::GameRow;
use crate::library::store::{games, jobs};
use crate::Status;

const CACHE_DAYS: i64 = 7;

/// Development-status sync across Steam, Epic and GOG rows. Games synced
/// within the last seven days are skipped unless forced.
#[instrument(level = "info", skip(registry))]
pub async fn run(
    registry: Arc<Registry>,
    job_id: String,
    store: Option<String>,
    force: bool,
) -> Result<(), Status> {
    let pool = registry.db.pool();

    let stores: Vec<&str> = match &store {
        Some(store) => vec![store.as_str()],
        None => vec!["steam", "epic", "gog"],
    };
    let mut eligible = games::list_with_store_id(pool, &stores).await?;
    if !force {
        eligible.retain(|game| !synced_recently(game));
    }

    let total = eligible.len() as i64;
    if total == 0 {
        jobs::complete(pool, &job_id, "0", "All games recently synced (cache valid)").await?;
        return Ok(());
    }

    info!("syncing status for {total} games");
    jobs::update_progress(pool, &job_id, 0, total, &format!("Starting sync for {total} games"))
        .await?;

    let mut synced = 0;
    let mut failed = 0;

    for (index, game) in eligible.iter().enumerate() {
        if engine::is_cancelled(&registry, &job_id).await {
            info!("status sync {job_id} cancelled at {}/{total}", index + 1);
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

        registry.status_limiter.wait().await;
        match sync_game(pool, game).await {
            Ok(true) => synced += 1,
            Ok(false) => {}
            Err(e) => {
                error!("status sync failed for '{}': {e}", game.name);
                failed += 1;
            }
        }
    }

    let result_msg = format!("{synced} games synced, {failed} failed");
    jobs::complete(pool, &job_id, &synced.to_string(), &result_msg).await?;
    info!("status sync {job_id} complete: {result_msg}");
    Ok(())
}

/// Detects and writes the status for one game. The sync timestamp is written
/// even when no status could be determined.
pub async fn sync_game(pool: &sqlx::SqlitePool, game: &GameRow) -> Result<bool, Status> {
    let status = match game.store.as_str() {
        "steam" => match &game.store_id {
            Some(store_id) => {
                let details = SteamApi::get_app_details(store_id).await?;
                Some(details.development_status().to_owned())
            }
            None => None,
        },
        "epic" => epic_status_from_metadata(game.extra_data.as_deref()),
        // GOG exposes no status signal.
        _ => None,
    };

    match status {
        Some(status) => {
            games::set_development_status(pool, game.id, Some(&status), None).await?;
            Ok(true)
        }
        None => {
            games::touch_status_synced(pool, game.id).await?;
            Ok(false)
        }
    }
}

/// Epic reports Early Access through custom attributes (several key
/// spellings) or the release info appStatus.
pub fn epic_status_from_metadata(extra_data: Option<&str>) -> Option<String> {
    let data = serde_json::from_str::<serde_json::Value>(extra_data?).ok()?;
    let attrs = data.get("customAttributes")?;

    for key in ["EarlyAccess", "earlyAccess", "isEarlyAccess"] {
        if let Some(value) = attrs.get(key).and_then(|attr| attr.get("value")) {
            let value = value.as_str().unwrap_or_default().to_lowercase();
            if matches!(value.as_str(), "true" | "1" | "yes") {
                return Some("early_access".to_owned());
            }
        }
    }

    if let Some(release_info) = data.get("releaseInfo").and_then(|v| v.as_array()) {
        if let Some(app_status) = release_info
            .first()
            .and_then(|info| info.get("appStatus"))
            .and_then(|v| v.as_str())
        {
            if app_status.to_lowercase().contains("early") {
                return Some("early_access".to_owned());
            }
        }
    }

    Some("released".to_owned())
}

fn synced_recently(game: &GameRow) -> bool {
    match &game.status_last_synced {
        Some(synced) => NaiveDateTime::parse_from_str(synced, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(synced, "%Y-%m-%dT%H:%M:%S"))
            .map(|synced| Utc::now().naive_utc() - synced < ChronoDuration::days(CACHE_DAYS))
            .unwrap_or(false),
        None => false,
    }
}
