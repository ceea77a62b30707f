use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, instrument};

use super::{engine, Registry};
use crate::api::{SteamApi, SteamNewsItem};
use crate::documents::GameRow;
use crate::library::store::{games, jobs, news};
use crate::Status;

const CACHE_HOURS: i64 = 24;
const MAX_ATTEMPTS: u32 = 5;

/// Steam news sync job. Sequential over the library; the shared limiter
/// keeps the batch inside 200 requests per 5 minutes with a 500ms floor
/// between calls.
#[instrument(level = "info", skip(registry))]
pub async fn run(
    registry: Arc<Registry>,
    job_id: String,
    force: bool,
    max_items: usize,
) -> Result<(), Status> {
    let pool = registry.db.pool();

    let mut eligible = games::list_with_store_id(pool, &["steam"]).await?;
    if !force {
        eligible.retain(|game| !checked_recently(game));
    }

    let total = eligible.len() as i64;
    if total == 0 {
        jobs::complete(pool, &job_id, "0", "All games recently synced (cache valid)").await?;
        return Ok(());
    }

    info!("syncing news for {total} steam games");
    jobs::update_progress(pool, &job_id, 0, total, &format!("Starting sync for {total} games"))
        .await?;

    let mut fetched = 0;
    let mut failed = 0;

    for (index, game) in eligible.iter().enumerate() {
        if engine::is_cancelled(&registry, &job_id).await {
            info!("news sync {job_id} cancelled at {}/{total}", index + 1);
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

        let store_id = match &game.store_id {
            Some(store_id) => store_id.clone(),
            None => continue,
        };

        match fetch_with_backoff(&registry, &store_id, max_items).await {
            Ok(articles) => {
                if !articles.is_empty() {
                    store_articles(pool, game.id, &articles).await;
                    fetched += 1;
                }
            }
            Err(e) => {
                error!("news fetch failed for '{}': {e}", game.name);
                failed += 1;
            }
        }

        // Stamped regardless of outcome so failures do not cause retry
        // storms on the next run.
        games::touch_news_checked(pool, game.id).await?;
    }

    let result_msg = format!("{fetched} games synced, {failed} failed");
    jobs::complete(pool, &job_id, &fetched.to_string(), &result_msg).await?;
    info!("news sync {job_id} complete: {result_msg}");
    Ok(())
}

/// Retries 403-rate-limit responses with exponential backoff plus jitter:
/// 2^(n+1) seconds with up to 30% extra, five attempts.
async fn fetch_with_backoff(
    registry: &Registry,
    steam_appid: &str,
    max_items: usize,
) -> Result<Vec<SteamNewsItem>, Status> {
    for attempt in 0..MAX_ATTEMPTS {
        registry.news_limiter.wait().await;

        match SteamApi::get_app_news(steam_appid, max_items).await {
            Err(Status::RateLimited(_)) if attempt + 1 < MAX_ATTEMPTS => {
                let base = 2u64.pow(attempt + 1);
                let jitter = rand::thread_rng().gen_range(0.0..0.3);
                let wait = Duration::from_secs_f64(base as f64 * (1.0 + jitter));
                info!("rate limited for appid {steam_appid}, waiting {wait:?} (attempt {})", attempt + 1);
                sleep(wait).await;
            }
            result => return result,
        }
    }

    Err(Status::rate_limited(format!(
        "Steam news for {steam_appid} after {MAX_ATTEMPTS} attempts"
    )))
}

async fn store_articles(pool: &sqlx::SqlitePool, game_id: i64, articles: &[SteamNewsItem]) {
    for article in articles {
        if article.url.is_empty() {
            continue;
        }

        let published_at = match article.date > 0 {
            true => chrono::DateTime::from_timestamp(article.date, 0)
                .map(|date| date.format("%Y-%m-%dT%H:%M:%S").to_string()),
            false => None,
        };

        if let Err(e) = news::upsert_article(
            pool,
            game_id,
            &article.title,
            Some(&article.contents),
            Some(&article.author),
            &article.url,
            published_at.as_deref(),
        )
        .await
        {
            error!("failed to store article {}: {e}", article.url);
        }
    }
}

fn checked_recently(game: &GameRow) -> bool {
    match &game.news_last_checked {
        Some(checked) => NaiveDateTime::parse_from_str(checked, "%Y-%m-%dT%H:%M:%S")
            .map(|checked| {
                Utc::now().naive_utc() - checked < ChronoDuration::hours(CACHE_HOURS)
            })
            .unwrap_or(false),
        None => false,
    }
}
