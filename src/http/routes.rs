use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;
use warp::{self, Filter};

use super::{handlers, models};
use crate::jobs::Registry;

/// Returns a Filter with all available routes.
pub fn routes(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    get_library(Arc::clone(&registry))
        .or(get_game(Arc::clone(&registry)))
        .or(get_discover(Arc::clone(&registry)))
        .or(get_hidden(Arc::clone(&registry)))
        .or(post_igdb(Arc::clone(&registry)))
        .or(post_hidden(Arc::clone(&registry)))
        .or(post_nsfw(Arc::clone(&registry)))
        .or(post_cover_override(Arc::clone(&registry)))
        .or(post_metacritic(Arc::clone(&registry)))
        .or(post_protondb(Arc::clone(&registry)))
        .or(post_priority(Arc::clone(&registry)))
        .or(post_personal_rating(Arc::clone(&registry)))
        .or(delete_game(Arc::clone(&registry)))
        .or(post_bulk_hide(Arc::clone(&registry)))
        .or(post_bulk_nsfw(Arc::clone(&registry)))
        .or(post_bulk_delete(Arc::clone(&registry)))
        .or(post_bulk_add_to_collection(Arc::clone(&registry)))
        .or(get_jobs(Arc::clone(&registry)))
        .or(get_job(Arc::clone(&registry)))
        .or(post_cancel_job(Arc::clone(&registry)))
        .or(get_settings(Arc::clone(&registry)))
        .or(post_settings(Arc::clone(&registry)))
        .or(post_update_all_tags(Arc::clone(&registry)))
        .or(post_sync_store(Arc::clone(&registry)))
        .or(post_sync_enrichment(registry))
        .or_else(|e| async {
            warn!("Rejected route: {:?}", e);
            Err(e)
        })
}

/// GET /library
fn get_library(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("library")
        .and(warp::get())
        .and(warp::query::<models::LibraryQuery>())
        .and(with_registry(registry))
        .and_then(handlers::get_library)
}

/// GET /game/{id}
fn get_game(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64)
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(handlers::get_game)
}

/// GET /discover
fn get_discover(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("discover")
        .and(warp::get())
        .and(warp::query::<models::LibraryQuery>())
        .and(with_registry(registry))
        .and_then(handlers::get_discover)
}

/// GET /hidden
fn get_hidden(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("hidden")
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(handlers::get_hidden)
}

/// POST /game/{id}/igdb
fn post_igdb(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "igdb")
        .and(warp::post())
        .and(json_body::<models::UpdateIgdb>())
        .and(with_registry(registry))
        .and_then(handlers::post_igdb)
}

/// POST /game/{id}/hidden
fn post_hidden(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "hidden")
        .and(warp::post())
        .and(json_body::<models::UpdateHidden>())
        .and(with_registry(registry))
        .and_then(handlers::post_hidden)
}

/// POST /game/{id}/nsfw
fn post_nsfw(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "nsfw")
        .and(warp::post())
        .and(json_body::<models::UpdateNsfw>())
        .and(with_registry(registry))
        .and_then(handlers::post_nsfw)
}

/// POST /game/{id}/cover-override
fn post_cover_override(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "cover-override")
        .and(warp::post())
        .and(json_body::<models::UpdateCoverOverride>())
        .and(with_registry(registry))
        .and_then(handlers::post_cover_override)
}

/// POST /game/{id}/metacritic
fn post_metacritic(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "metacritic")
        .and(warp::post())
        .and(json_body::<models::UpdateMetacritic>())
        .and(with_registry(registry))
        .and_then(handlers::post_metacritic)
}

/// POST /game/{id}/protondb
fn post_protondb(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "protondb")
        .and(warp::post())
        .and(json_body::<models::UpdateProtonDb>())
        .and(with_registry(registry))
        .and_then(handlers::post_protondb)
}

/// POST /game/{id}/priority
fn post_priority(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "priority")
        .and(warp::post())
        .and(json_body::<models::UpdatePriority>())
        .and(with_registry(registry))
        .and_then(handlers::post_priority)
}

/// POST /game/{id}/personal-rating
fn post_personal_rating(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64 / "personal-rating")
        .and(warp::post())
        .and(json_body::<models::UpdatePersonalRating>())
        .and(with_registry(registry))
        .and_then(handlers::post_personal_rating)
}

/// DELETE /game/{id}
fn delete_game(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("game" / i64)
        .and(warp::delete())
        .and(with_registry(registry))
        .and_then(handlers::delete_game)
}

/// POST /games/bulk/hide
fn post_bulk_hide(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("games" / "bulk" / "hide")
        .and(warp::post())
        .and(json_body::<models::BulkGameIds>())
        .and(with_registry(registry))
        .and_then(handlers::post_bulk_hide)
}

/// POST /games/bulk/nsfw
fn post_bulk_nsfw(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("games" / "bulk" / "nsfw")
        .and(warp::post())
        .and(json_body::<models::BulkGameIds>())
        .and(with_registry(registry))
        .and_then(handlers::post_bulk_nsfw)
}

/// POST /games/bulk/delete
fn post_bulk_delete(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("games" / "bulk" / "delete")
        .and(warp::post())
        .and(json_body::<models::BulkGameIds>())
        .and(with_registry(registry))
        .and_then(handlers::post_bulk_delete)
}

/// POST /games/bulk/add-to-collection
fn post_bulk_add_to_collection(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("games" / "bulk" / "add-to-collection")
        .and(warp::post())
        .and(json_body::<models::BulkAddToCollection>())
        .and(with_registry(registry))
        .and_then(handlers::post_bulk_add_to_collection)
}

/// GET /jobs
fn get_jobs(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("jobs")
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(handlers::get_jobs)
}

/// GET /jobs/{id}
fn get_job(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("jobs" / String)
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(handlers::get_job)
}

/// POST /jobs/{id}/cancel
fn post_cancel_job(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("jobs" / String / "cancel")
        .and(warp::post())
        .and(with_registry(registry))
        .and_then(handlers::post_cancel_job)
}

/// GET /settings
fn get_settings(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("settings")
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(handlers::get_settings)
}

/// POST /settings
fn post_settings(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("settings")
        .and(warp::post())
        .and(json_body::<models::SettingsUpdate>())
        .and(with_registry(registry))
        .and_then(handlers::post_settings)
}

/// POST /labels/update-auto
fn post_update_all_tags(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("labels" / "update-auto")
        .and(warp::post())
        .and(with_registry(registry))
        .and_then(handlers::post_update_all_tags)
}

/// POST /sync/store/{store}
fn post_sync_store(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("sync" / "store" / String)
        .and(warp::post())
        .and(with_registry(registry))
        .and_then(handlers::post_sync_store)
}

/// POST /sync/{kind}
fn post_sync_enrichment(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("sync" / String)
        .and(warp::post())
        .and(warp::query::<models::SyncOptions>())
        .and(with_registry(registry))
        .and_then(handlers::post_sync_enrichment)
}

fn with_registry(
    registry: Arc<Registry>,
) -> impl Filter<Extract = (Arc<Registry>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&registry))
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(16 * 1024).and(warp::body::json())
}
