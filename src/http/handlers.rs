use itertools::Itertools;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use warp::http::StatusCode;

use super::models;
use crate::documents::{JobType, PopularityType, POPULARITY_TYPES};
use crate::jobs::{
    self, igdb_sync, metacritic_sync, news_sync, protondb_sync, status_sync, store_sync,
    update_tracker, Registry,
};
use crate::library::store::{games, jobs as job_store, labels, news, popularity, settings, updates};
use crate::library::{auto_tags, query, ratings};
use crate::Status;

type HandlerResult = Result<Box<dyn warp::Reply>, Infallible>;

fn ok_json<T: serde::Serialize>(body: &T) -> HandlerResult {
    Ok(Box::new(warp::reply::json(body)))
}

fn error_reply(status: Status) -> HandlerResult {
    let code = match &status {
        Status::NotFound(_) => StatusCode::NOT_FOUND,
        Status::InvalidArgument(_) | Status::NotConfigured(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!("{status}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    // 5xx details stay in the server log.
    let message = match code {
        StatusCode::INTERNAL_SERVER_ERROR => String::from("internal error"),
        _ => status.to_string(),
    };

    Ok(Box::new(warp::reply::with_status(
        warp::reply::json(&models::ApiError {
            success: false,
            error: message,
        }),
        code,
    )))
}

pub async fn get_library(
    query_params: models::LibraryQuery,
    registry: Arc<Registry>,
) -> HandlerResult {
    let pool = registry.db.pool();

    let filters = query::LibraryFilters {
        stores: query_params.stores(),
        genres: query_params.genres(),
        queries: query_params.queries(),
        search: query_params.search.clone(),
    };

    let rows = match query::list_games(pool, &filters).await {
        Ok(rows) => rows,
        Err(e) => return error_reply(e),
    };
    let total_count = rows.len();
    let groups = query::group_by_igdb(rows);

    let exclude = match filters.queries.len() {
        1 => Some(filters.queries[0].as_str()),
        _ => None,
    };
    let counts = match query::filter_counts(pool, &filters.stores, &filters.genres, exclude).await {
        Ok(counts) => counts,
        Err(e) => return error_reply(e),
    };

    let unique_count = groups.len();
    ok_json(&json!({
        "games": groups,
        "total_count": total_count,
        "unique_count": unique_count,
        "query_filter_counts": counts,
    }))
}

pub async fn get_game(game_id: i64, registry: Arc<Registry>) -> HandlerResult {
    let pool = registry.db.pool();

    let game = match games::read(pool, game_id).await {
        Ok(game) => game,
        Err(e) => return error_reply(e),
    };

    let related = match game.igdb_id {
        Some(igdb_id) => match games::list_by_igdb_id(pool, igdb_id).await {
            Ok(related) => related,
            Err(e) => return error_reply(e),
        },
        None => vec![game.clone()],
    };

    let game_labels = labels::labels_for_game(pool, game_id).await.unwrap_or_default();
    let articles = news::list_for_game(pool, game_id).await.unwrap_or_default();
    let history = updates::list_for_game(pool, game_id).await.unwrap_or_default();

    ok_json(&json!({
        "game": game,
        "related_games": related,
        "labels": game_labels
            .into_iter()
            .map(|(label, auto)| json!({"label": label, "auto": auto}))
            .collect_vec(),
        "news": articles,
        "update_history": history,
    }))
}

pub async fn get_hidden(registry: Arc<Registry>) -> HandlerResult {
    let rows: Result<Vec<crate::documents::GameRow>, sqlx::Error> = sqlx::query_as(&format!(
        "SELECT * FROM games WHERE hidden = 1{} ORDER BY name COLLATE NOCASE",
        query::EXCLUDE_DUPLICATES_FILTER
    ))
    .fetch_all(registry.db.pool())
    .await;

    match rows {
        Ok(rows) => ok_json(&json!({ "games": rows })),
        Err(e) => error_reply(Status::from(e)),
    }
}

/// Discover: popularity-ranked slices of the filtered library, served
/// through the two-tier cache.
pub async fn get_discover(
    query_params: models::LibraryQuery,
    registry: Arc<Registry>,
) -> HandlerResult {
    let pool = registry.db.pool();

    let filters = query::LibraryFilters {
        stores: query_params.stores(),
        genres: query_params.genres(),
        queries: query_params.queries(),
        search: None,
    };
    let rows = match query::list_games(pool, &filters).await {
        Ok(rows) => rows,
        Err(e) => return error_reply(e),
    };

    let matched = rows
        .iter()
        .filter(|row| row.igdb_id.unwrap_or(0) > 0)
        .cloned()
        .collect_vec();
    let igdb_ids = matched
        .iter()
        .filter_map(|row| row.igdb_id)
        .unique()
        .collect_vec();

    let entries = match popularity::resolve(&registry.popularity, pool, &igdb_ids, || async {
        let igdb = registry.igdb().await?;
        let types = POPULARITY_TYPES.iter().map(|t| t.igdb_id()).collect_vec();
        igdb.popularity(&igdb_ids, &types).await
    })
    .await
    {
        Ok(entries) => entries,
        Err(Status::NotConfigured(_)) => vec![],
        Err(e) => return error_reply(e),
    };

    let find_local = |igdb_id: i64| matched.iter().find(|row| row.igdb_id == Some(igdb_id));

    let mut sections = serde_json::Map::new();
    for popularity_type in POPULARITY_TYPES {
        let section = entries
            .iter()
            .filter(|entry| {
                PopularityType::from_igdb_id(entry.popularity_type) == Some(popularity_type)
            })
            .filter_map(|entry| {
                find_local(entry.igdb_id).map(|row| {
                    json!({"game": row, "popularity_value": entry.value})
                })
            })
            .take(10)
            .collect_vec();
        sections.insert(
            popularity_type.slug().to_owned(),
            serde_json::Value::Array(section),
        );
    }

    let featured = entries
        .iter()
        .unique_by(|entry| entry.igdb_id)
        .filter_map(|entry| find_local(entry.igdb_id))
        .take(20)
        .collect_vec();
    let popularity_source = match entries.is_empty() {
        true => "rating",
        false => "igdb_popularity",
    };

    ok_json(&json!({
        "popularity_source": popularity_source,
        "featured": featured,
        "sections": sections,
    }))
}

pub async fn post_igdb(
    game_id: i64,
    body: models::UpdateIgdb,
    registry: Arc<Registry>,
) -> HandlerResult {
    match body.igdb_id {
        None => match igdb_sync::clear_binding(&registry, game_id).await {
            Ok(()) => ok_json(&json!({"success": true, "message": "IGDB data cleared"})),
            Err(e) => error_reply(e),
        },
        Some(igdb_id) => match igdb_sync::bind_game(&registry, game_id, igdb_id).await {
            Ok(name) => ok_json(&json!({
                "success": true,
                "message": format!("Synced with IGDB: {name}"),
                "igdb_id": igdb_id,
                "igdb_name": name,
            })),
            Err(e) => error_reply(e),
        },
    }
}

pub async fn post_hidden(
    game_id: i64,
    body: models::UpdateHidden,
    registry: Arc<Registry>,
) -> HandlerResult {
    match games::set_hidden(registry.db.pool(), game_id, body.hidden).await {
        Ok(()) => ok_json(&json!({"success": true, "hidden": body.hidden})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_nsfw(
    game_id: i64,
    body: models::UpdateNsfw,
    registry: Arc<Registry>,
) -> HandlerResult {
    match games::set_nsfw(registry.db.pool(), game_id, body.nsfw).await {
        Ok(()) => ok_json(&json!({"success": true, "nsfw": body.nsfw})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_cover_override(
    game_id: i64,
    body: models::UpdateCoverOverride,
    registry: Arc<Registry>,
) -> HandlerResult {
    let cover = body
        .cover_url_override
        .as_deref()
        .map(str::trim)
        .filter(|cover| !cover.is_empty());
    match games::set_cover_override(registry.db.pool(), game_id, cover).await {
        Ok(()) => ok_json(&json!({"success": true, "cover_url_override": cover})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_metacritic(
    game_id: i64,
    body: models::UpdateMetacritic,
    registry: Arc<Registry>,
) -> HandlerResult {
    let pool = registry.db.pool();

    let slug = match body.metacritic_slug.as_deref().map(str::trim) {
        None | Some("") => {
            return match games::clear_metacritic(pool, game_id).await {
                Ok(()) => {
                    if let Err(e) = ratings::update_average_rating(pool, game_id).await {
                        return error_reply(e);
                    }
                    ok_json(&json!({"success": true, "message": "Metacritic data cleared"}))
                }
                Err(e) => error_reply(e),
            }
        }
        Some(slug) => slug.to_owned(),
    };

    match crate::api::MetacriticApi::get_scores(&slug).await {
        Ok(data) => {
            if let Err(e) = games::write_metacritic(
                pool,
                game_id,
                data.critic_score,
                data.user_score,
                Some(&data.url),
                &data.slug,
            )
            .await
            {
                return error_reply(e);
            }
            if let Err(e) = ratings::update_average_rating(pool, game_id).await {
                return error_reply(e);
            }
            ok_json(&json!({
                "success": true,
                "metacritic_slug": data.slug,
                "critic_score": data.critic_score,
                "user_score": data.user_score,
            }))
        }
        Err(e) => error_reply(e),
    }
}

pub async fn post_protondb(
    game_id: i64,
    body: models::UpdateProtonDb,
    registry: Arc<Registry>,
) -> HandlerResult {
    let pool = registry.db.pool();

    let steam_id = match body.steam_id.as_deref().map(str::trim) {
        None | Some("") => {
            return match games::clear_protondb(pool, game_id).await {
                Ok(()) => ok_json(&json!({"success": true, "message": "ProtonDB data cleared"})),
                Err(e) => error_reply(e),
            }
        }
        Some(steam_id) => steam_id.to_owned(),
    };

    match crate::api::ProtonDbApi::get_summary(&steam_id).await {
        Ok(summary) => {
            if let Err(e) = games::write_protondb(pool, game_id, &summary).await {
                return error_reply(e);
            }
            ok_json(&json!({
                "success": true,
                "tier": summary.tier,
                "total": summary.total,
            }))
        }
        Err(e) => error_reply(e),
    }
}

pub async fn post_priority(
    game_id: i64,
    body: models::UpdatePriority,
    registry: Arc<Registry>,
) -> HandlerResult {
    let priority = body.priority.as_deref().filter(|p| !p.is_empty());
    if let Some(priority) = priority {
        if !matches!(priority, "high" | "medium" | "low") {
            return error_reply(Status::invalid_argument(
                "priority must be high, medium or low",
            ));
        }
    }

    match games::set_priority(registry.db.pool(), game_id, priority).await {
        Ok(()) => ok_json(&json!({"success": true, "priority": priority})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_personal_rating(
    game_id: i64,
    body: models::UpdatePersonalRating,
    registry: Arc<Registry>,
) -> HandlerResult {
    match games::set_personal_rating(registry.db.pool(), game_id, body.rating).await {
        Ok(()) => ok_json(&json!({"success": true, "rating": body.rating})),
        Err(e) => error_reply(e),
    }
}

pub async fn delete_game(game_id: i64, registry: Arc<Registry>) -> HandlerResult {
    match games::delete(registry.db.pool(), game_id).await {
        Ok(name) => ok_json(&json!({
            "success": true,
            "message": format!("Deleted '{name}' from library"),
        })),
        Err(e) => error_reply(e),
    }
}

pub async fn post_bulk_hide(body: models::BulkGameIds, registry: Arc<Registry>) -> HandlerResult {
    if body.game_ids.is_empty() {
        return error_reply(Status::invalid_argument("No games selected"));
    }
    match games::bulk_set_hidden(registry.db.pool(), &body.game_ids, true).await {
        Ok(updated) => ok_json(&json!({"success": true, "updated": updated})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_bulk_nsfw(body: models::BulkGameIds, registry: Arc<Registry>) -> HandlerResult {
    if body.game_ids.is_empty() {
        return error_reply(Status::invalid_argument("No games selected"));
    }
    match games::bulk_set_nsfw(registry.db.pool(), &body.game_ids).await {
        Ok(updated) => ok_json(&json!({"success": true, "updated": updated})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_bulk_delete(body: models::BulkGameIds, registry: Arc<Registry>) -> HandlerResult {
    if body.game_ids.is_empty() {
        return error_reply(Status::invalid_argument("No games selected"));
    }
    match games::bulk_delete(registry.db.pool(), &body.game_ids).await {
        Ok(deleted) => ok_json(&json!({"success": true, "deleted": deleted})),
        Err(e) => error_reply(e),
    }
}

pub async fn post_bulk_add_to_collection(
    body: models::BulkAddToCollection,
    registry: Arc<Registry>,
) -> HandlerResult {
    if body.game_ids.is_empty() {
        return error_reply(Status::invalid_argument("No games selected"));
    }
    match labels::bulk_assign(registry.db.pool(), body.collection_id, &body.game_ids).await {
        Ok(added) => ok_json(&json!({"success": true, "added": added})),
        Err(e) => error_reply(e),
    }
}

pub async fn get_jobs(registry: Arc<Registry>) -> HandlerResult {
    let pool = registry.db.pool();
    let active = match job_store::active(pool).await {
        Ok(active) => active,
        Err(e) => return error_reply(e),
    };
    let recent = job_store::recent(pool, 10).await.unwrap_or_default();

    ok_json(&json!({"active": active, "recent": recent}))
}

pub async fn get_job(job_id: String, registry: Arc<Registry>) -> HandlerResult {
    match job_store::read(registry.db.pool(), &job_id).await {
        Ok(job) => ok_json(&job),
        Err(e) => error_reply(e),
    }
}

pub async fn post_cancel_job(job_id: String, registry: Arc<Registry>) -> HandlerResult {
    match jobs::cancel_job(&registry, &job_id).await {
        Ok(cancelled) => ok_json(&json!({"success": true, "cancelled": cancelled})),
        Err(e) => error_reply(e),
    }
}

pub async fn get_settings(registry: Arc<Registry>) -> HandlerResult {
    let pool = registry.db.pool();
    let mut values = serde_json::Map::new();

    for key in [
        settings::STEAM_API_KEY,
        settings::STEAM_USER_ID,
        settings::IGDB_CLIENT_ID,
        settings::IGDB_CLIENT_SECRET,
        settings::ITCH_API_KEY,
        settings::HUMBLE_SESSION_COOKIE,
        settings::BATTLENET_COOKIE,
        settings::GOG_DB_PATH,
        settings::EA_BEARER_TOKEN,
        settings::USE_STEAM_CLIENT,
    ] {
        let value = settings::get(pool, key).await.unwrap_or_default();
        values.insert(key.to_owned(), json!(value.map(|v| mask_secret(key, &v))));
    }

    ok_json(&serde_json::Value::Object(values))
}

pub async fn post_settings(
    body: models::SettingsUpdate,
    registry: Arc<Registry>,
) -> HandlerResult {
    match settings::set(registry.db.pool(), &body.key, &body.value).await {
        Ok(()) => {
            if body.key.starts_with("igdb_") {
                registry.reset_igdb();
            }
            ok_json(&json!({"success": true}))
        }
        Err(e) => error_reply(e),
    }
}

/// Secrets never leave masked; plain configuration echoes back as-is.
fn mask_secret(key: &str, value: &str) -> String {
    let is_plain = matches!(
        key,
        settings::STEAM_USER_ID | settings::GOG_DB_PATH | settings::USE_STEAM_CLIENT
    );
    if is_plain || value.len() <= 4 {
        return value.to_owned();
    }
    format!("****{}", &value[value.len() - 4..])
}

pub async fn post_sync_store(store: String, registry: Arc<Registry>) -> HandlerResult {
    let job_id = match job_store::create(
        registry.db.pool(),
        JobType::StoreSync,
        &format!("Syncing {store} library"),
    )
    .await
    {
        Ok(job_id) => job_id,
        Err(e) => return error_reply(e),
    };

    info!("POST /sync/{store} -> job {job_id}");
    let body_registry = Arc::clone(&registry);
    jobs::run_job_async(
        registry,
        job_id.clone(),
        store_sync::run(body_registry, job_id.clone(), store),
    );

    ok_json(&models::JobStarted {
        success: true,
        job_id,
    })
}

pub async fn post_sync_enrichment(
    kind: String,
    options: models::SyncOptions,
    registry: Arc<Registry>,
) -> HandlerResult {
    let (job_type, message) = match kind.as_str() {
        "igdb" => (JobType::IgdbSync, "Matching library against IGDB"),
        "metacritic" => (JobType::MetacriticSync, "Syncing Metacritic scores"),
        "protondb" => (JobType::ProtondbSync, "Syncing ProtonDB compatibility"),
        "news" => (JobType::NewsSync, "Syncing Steam news"),
        "status" => (JobType::StatusSync, "Syncing development status"),
        "updates" => (JobType::UpdateTracking, "Tracking game updates"),
        _ => {
            return error_reply(Status::invalid_argument(format!(
                "unknown sync kind '{kind}'"
            )))
        }
    };

    let job_id = match job_store::create(registry.db.pool(), job_type, message).await {
        Ok(job_id) => job_id,
        Err(e) => return error_reply(e),
    };

    info!("POST /sync/{kind} -> job {job_id}");
    let body_registry = Arc::clone(&registry);
    match job_type {
        JobType::IgdbSync => jobs::run_job_async(
            registry,
            job_id.clone(),
            igdb_sync::run(body_registry, job_id.clone()),
        ),
        JobType::MetacriticSync => jobs::run_job_async(
            registry,
            job_id.clone(),
            metacritic_sync::run(body_registry, job_id.clone(), options.force),
        ),
        JobType::ProtondbSync => jobs::run_job_async(
            registry,
            job_id.clone(),
            protondb_sync::run(body_registry, job_id.clone(), options.force),
        ),
        JobType::NewsSync => jobs::run_job_async(
            registry,
            job_id.clone(),
            news_sync::run(body_registry, job_id.clone(), options.force, 10),
        ),
        JobType::StatusSync => jobs::run_job_async(
            registry,
            job_id.clone(),
            status_sync::run(body_registry, job_id.clone(), None, options.force),
        ),
        JobType::UpdateTracking => jobs::run_job_async(
            registry,
            job_id.clone(),
            update_tracker::run(body_registry, job_id.clone()),
        ),
        JobType::StoreSync => unreachable!(),
    }

    ok_json(&models::JobStarted {
        success: true,
        job_id,
    })
}

pub async fn post_update_all_tags(registry: Arc<Registry>) -> HandlerResult {
    match auto_tags::update_all(registry.db.pool()).await {
        Ok(updated) => ok_json(&json!({"success": true, "updated": updated})),
        Err(e) => error_reply(e),
    }
}
