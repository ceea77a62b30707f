use chrono::Utc;
use itertools::Itertools;
use sqlx::SqlitePool;

use crate::documents::{GameRow, IgdbBinding, ProtonDbSummary, RawGame};
use crate::Status;

pub async fn read(pool: &SqlitePool, game_id: i64) -> Result<GameRow, Status> {
    let row: Option<GameRow> = sqlx::query_as("SELECT * FROM games WHERE id = ?")
        .bind(game_id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| Status::not_found(format!("game with id={game_id} was not found")))
}

pub async fn find_by_store_id(
    pool: &SqlitePool,
    store: &str,
    store_id: &str,
) -> Result<Option<GameRow>, Status> {
    Ok(
        sqlx::query_as("SELECT * FROM games WHERE store = ? AND store_id = ?")
            .bind(store)
            .bind(store_id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<GameRow>, Status> {
    Ok(sqlx::query_as("SELECT * FROM games ORDER BY name")
        .fetch_all(pool)
        .await?)
}

pub async fn list_by_igdb_id(pool: &SqlitePool, igdb_id: i64) -> Result<Vec<GameRow>, Status> {
    Ok(
        sqlx::query_as("SELECT * FROM games WHERE igdb_id = ? ORDER BY store")
            .bind(igdb_id)
            .fetch_all(pool)
            .await?,
    )
}

/// Inserts a new game with the store-owned fields of `raw`. User-owned fields
/// start at their defaults.
pub async fn insert_raw(pool: &SqlitePool, raw: &RawGame) -> Result<i64, Status> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let result = sqlx::query(
        r#"
        INSERT INTO games
            (name, store, store_id, playtime_hours, cover_image, release_date,
             developers, publishers, extra_data, last_modified,
             review_score, review_desc, total_reviews, added_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&raw.name)
    .bind(&raw.store)
    .bind(&raw.store_id)
    .bind(raw.playtime_hours)
    .bind(&raw.cover_image)
    .bind(&raw.release_date)
    .bind(to_json_list(&raw.developers))
    .bind(to_json_list(&raw.publishers))
    .bind(raw.extra_data.as_ref().map(|v| v.to_string()))
    .bind(&raw.last_modified)
    .bind(raw.review_score)
    .bind(&raw.review_desc)
    .bind(raw.total_reviews)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrites store-owned fields on an existing row. User-owned fields
/// (hidden, nsfw, cover override, priority, personal rating, IGDB binding)
/// are left untouched. `last_modified` is owned by the update tracker and is
/// not written here.
pub async fn update_store_fields(
    pool: &SqlitePool,
    game_id: i64,
    raw: &RawGame,
) -> Result<(), Status> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    sqlx::query(
        r#"
        UPDATE games SET
            name = ?,
            playtime_hours = ?,
            cover_image = ?,
            release_date = ?,
            developers = ?,
            publishers = ?,
            extra_data = ?,
            review_score = COALESCE(?, review_score),
            review_desc = COALESCE(?, review_desc),
            total_reviews = COALESCE(?, total_reviews),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&raw.name)
    .bind(raw.playtime_hours)
    .bind(&raw.cover_image)
    .bind(&raw.release_date)
    .bind(to_json_list(&raw.developers))
    .bind(to_json_list(&raw.publishers))
    .bind(raw.extra_data.as_ref().map(|v| v.to_string()))
    .bind(raw.review_score)
    .bind(&raw.review_desc)
    .bind(raw.total_reviews)
    .bind(&now)
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_last_modified(
    pool: &SqlitePool,
    game_id: i64,
    last_modified: &str,
) -> Result<(), Status> {
    sqlx::query("UPDATE games SET last_modified = ? WHERE id = ?")
        .bind(last_modified)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_hidden(pool: &SqlitePool, game_id: i64, hidden: bool) -> Result<(), Status> {
    sqlx::query("UPDATE games SET hidden = ? WHERE id = ?")
        .bind(hidden)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_nsfw(pool: &SqlitePool, game_id: i64, nsfw: bool) -> Result<(), Status> {
    sqlx::query("UPDATE games SET nsfw = ? WHERE id = ?")
        .bind(nsfw)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_cover_override(
    pool: &SqlitePool,
    game_id: i64,
    cover_url: Option<&str>,
) -> Result<(), Status> {
    sqlx::query("UPDATE games SET cover_url_override = ? WHERE id = ?")
        .bind(cover_url)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_priority(
    pool: &SqlitePool,
    game_id: i64,
    priority: Option<&str>,
) -> Result<(), Status> {
    sqlx::query("UPDATE games SET priority = ? WHERE id = ?")
        .bind(priority)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_personal_rating(
    pool: &SqlitePool,
    game_id: i64,
    rating: i64,
) -> Result<(), Status> {
    if !(0..=10).contains(&rating) {
        return Err(Status::invalid_argument("rating must be between 0 and 10"));
    }
    sqlx::query("UPDATE games SET personal_rating = ? WHERE id = ?")
        .bind(rating)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_development_status(
    pool: &SqlitePool,
    game_id: i64,
    status: Option<&str>,
    version: Option<&str>,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            development_status = ?,
            game_version = ?,
            status_last_synced = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(version)
    .bind(game_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn touch_status_synced(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    sqlx::query("UPDATE games SET status_last_synced = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Always stamped, success or not, to prevent retry storms.
pub async fn touch_news_checked(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    sqlx::query("UPDATE games SET news_last_checked = ? WHERE id = ?")
        .bind(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes a game. Labels, news and update history cascade.
pub async fn delete(pool: &SqlitePool, game_id: i64) -> Result<String, Status> {
    let game = read(pool, game_id).await?;

    sqlx::query("DELETE FROM game_labels WHERE game_id = ?")
        .bind(game_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM game_news WHERE game_id = ?")
        .bind(game_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM game_depot_updates WHERE game_id = ?")
        .bind(game_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM games WHERE id = ?")
        .bind(game_id)
        .execute(pool)
        .await?;

    Ok(game.name)
}

pub async fn bulk_set_hidden(
    pool: &SqlitePool,
    game_ids: &[i64],
    hidden: bool,
) -> Result<u64, Status> {
    if game_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = game_ids.iter().map(|_| "?").join(",");
    let sql = format!("UPDATE games SET hidden = ? WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql).bind(hidden);
    for id in game_ids {
        query = query.bind(id);
    }

    Ok(query.execute(pool).await?.rows_affected())
}

pub async fn bulk_set_nsfw(pool: &SqlitePool, game_ids: &[i64]) -> Result<u64, Status> {
    if game_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = game_ids.iter().map(|_| "?").join(",");
    let sql = format!("UPDATE games SET nsfw = 1 WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for id in game_ids {
        query = query.bind(id);
    }

    Ok(query.execute(pool).await?.rows_affected())
}

pub async fn bulk_delete(pool: &SqlitePool, game_ids: &[i64]) -> Result<u64, Status> {
    if game_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = game_ids.iter().map(|_| "?").join(",");
    for table in ["game_labels", "game_news", "game_depot_updates"] {
        let sql = format!("DELETE FROM {table} WHERE game_id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in game_ids {
            query = query.bind(id);
        }
        query.execute(pool).await?;
    }

    let sql = format!("DELETE FROM games WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for id in game_ids {
        query = query.bind(id);
    }

    Ok(query.execute(pool).await?.rows_affected())
}

/// Writes the IGDB binding plus derived flags. Genres are the caller-merged
/// union; nsfw is only ever raised here, never cleared.
pub async fn write_igdb_binding(
    pool: &SqlitePool,
    game_id: i64,
    binding: &IgdbBinding,
    merged_genres: &[String],
) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            igdb_id = ?,
            igdb_slug = ?,
            igdb_rating = ?,
            igdb_rating_count = ?,
            aggregated_rating = ?,
            aggregated_rating_count = ?,
            total_rating = ?,
            total_rating_count = ?,
            igdb_summary = ?,
            igdb_cover_url = ?,
            igdb_screenshots = ?,
            igdb_matched_at = CURRENT_TIMESTAMP,
            nsfw = CASE WHEN ? THEN 1 ELSE nsfw END,
            genres = ?,
            steam_app_id = COALESCE(?, steam_app_id)
        WHERE id = ?
        "#,
    )
    .bind(binding.igdb_id)
    .bind(&binding.slug)
    .bind(binding.rating)
    .bind(binding.rating_count)
    .bind(binding.aggregated_rating)
    .bind(binding.aggregated_rating_count)
    .bind(binding.total_rating)
    .bind(binding.total_rating_count)
    .bind(&binding.summary)
    .bind(&binding.cover_url)
    .bind(match binding.screenshots.is_empty() {
        true => None,
        false => Some(serde_json::to_string(&binding.screenshots)?),
    })
    .bind(binding.nsfw)
    .bind(serde_json::to_string(merged_genres)?)
    .bind(&binding.steam_app_id)
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn clear_igdb_binding(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            igdb_id = NULL,
            igdb_slug = NULL,
            igdb_rating = NULL,
            igdb_rating_count = NULL,
            aggregated_rating = NULL,
            aggregated_rating_count = NULL,
            total_rating = NULL,
            total_rating_count = NULL,
            igdb_summary = NULL,
            igdb_cover_url = NULL,
            igdb_screenshots = NULL,
            igdb_matched_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn write_metacritic(
    pool: &SqlitePool,
    game_id: i64,
    critic_score: Option<f64>,
    user_score: Option<f64>,
    url: Option<&str>,
    slug: &str,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            metacritic_score = ?,
            metacritic_user_score = ?,
            metacritic_url = ?,
            metacritic_slug = ?,
            metacritic_matched_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(critic_score)
    .bind(user_score)
    .bind(url)
    .bind(slug)
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn clear_metacritic(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            metacritic_score = NULL,
            metacritic_user_score = NULL,
            metacritic_url = NULL,
            metacritic_slug = NULL,
            metacritic_matched_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn write_protondb(
    pool: &SqlitePool,
    game_id: i64,
    summary: &ProtonDbSummary,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            protondb_tier = ?,
            protondb_score = ?,
            protondb_confidence = ?,
            protondb_total = ?,
            protondb_trending_tier = ?,
            protondb_matched_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&summary.tier)
    .bind(summary.score)
    .bind(&summary.confidence)
    .bind(summary.total)
    .bind(&summary.trending_tier)
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// A definitive "queried, no data" marker that stops re-querying. Distinct
/// from NULL, which means never queried.
pub async fn mark_protondb_unknown(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            protondb_tier = 'unknown',
            protondb_matched_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn clear_protondb(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    sqlx::query(
        r#"
        UPDATE games SET
            protondb_tier = NULL,
            protondb_score = NULL,
            protondb_confidence = NULL,
            protondb_total = NULL,
            protondb_trending_tier = NULL,
            protondb_matched_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(game_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_average_rating(
    pool: &SqlitePool,
    game_id: i64,
    average: Option<f64>,
) -> Result<(), Status> {
    sqlx::query("UPDATE games SET average_rating = ? WHERE id = ?")
        .bind(average)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Games eligible for update tracking and status sync.
pub async fn list_with_store_id(
    pool: &SqlitePool,
    stores: &[&str],
) -> Result<Vec<GameRow>, Status> {
    let placeholders = stores.iter().map(|_| "?").join(",");
    let sql = format!(
        "SELECT * FROM games WHERE store IN ({placeholders}) AND store_id IS NOT NULL ORDER BY name"
    );
    let mut query = sqlx::query_as(&sql);
    for store in stores {
        query = query.bind(*store);
    }

    Ok(query.fetch_all(pool).await?)
}

/// Games with a usable Steam AppID: an owned Steam copy or the IGDB
/// cross-reference. Hidden games are skipped.
pub async fn list_with_steam_id(
    pool: &SqlitePool,
    include_matched: bool,
) -> Result<Vec<GameRow>, Status> {
    let filter = match include_matched {
        true => "",
        false => "AND protondb_tier IS NULL",
    };

    Ok(sqlx::query_as(&format!(
        r#"
        SELECT * FROM games
        WHERE (steam_app_id IS NOT NULL OR (store = 'steam' AND store_id IS NOT NULL))
        {filter}
        AND (hidden IS NULL OR hidden = 0)
        ORDER BY name
        "#
    ))
    .fetch_all(pool)
    .await?)
}

pub async fn list_unmatched(pool: &SqlitePool) -> Result<Vec<GameRow>, Status> {
    Ok(
        sqlx::query_as("SELECT * FROM games WHERE igdb_id IS NULL ORDER BY name")
            .fetch_all(pool)
            .await?,
    )
}

fn to_json_list(values: &[String]) -> Option<String> {
    match values.is_empty() {
        true => None,
        false => serde_json::to_string(values).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    fn raw_game(name: &str, store: &str, store_id: &str) -> RawGame {
        RawGame {
            playtime_hours: Some(8.0),
            ..RawGame::new(name, store, store_id)
        }
    }

    #[tokio::test]
    async fn insert_then_read_round_trips() {
        let db = Database::in_memory().await.unwrap();

        let id = insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();
        let game = read(db.pool(), id).await.unwrap();

        assert_eq!(game.name, "Portal 2");
        assert_eq!(game.store, "steam");
        assert_eq!(game.store_id.as_deref(), Some("620"));
        assert_eq!(game.playtime_hours, Some(8.0));
        assert!(game.igdb_id.is_none());
    }

    #[tokio::test]
    async fn update_store_fields_preserves_user_fields() {
        let db = Database::in_memory().await.unwrap();
        let id = insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();

        set_hidden(db.pool(), id, true).await.unwrap();
        set_cover_override(db.pool(), id, Some("https://example.com/cover.png"))
            .await
            .unwrap();
        set_personal_rating(db.pool(), id, 9).await.unwrap();

        let mut raw = raw_game("Portal 2", "steam", "620");
        raw.playtime_hours = Some(12.5);
        update_store_fields(db.pool(), id, &raw).await.unwrap();

        let game = read(db.pool(), id).await.unwrap();
        assert_eq!(game.playtime_hours, Some(12.5));
        assert_eq!(game.hidden, Some(true));
        assert_eq!(
            game.cover_url_override.as_deref(),
            Some("https://example.com/cover.png")
        );
        assert_eq!(game.personal_rating, Some(9));
    }

    #[tokio::test]
    async fn hidden_toggle_leaves_other_columns_alone() {
        let db = Database::in_memory().await.unwrap();
        let id = insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();

        let before = read(db.pool(), id).await.unwrap();
        set_hidden(db.pool(), id, true).await.unwrap();
        set_hidden(db.pool(), id, false).await.unwrap();
        let after = read(db.pool(), id).await.unwrap();

        assert_eq!(before.name, after.name);
        assert_eq!(before.playtime_hours, after.playtime_hours);
        assert_eq!(before.added_at, after.added_at);
        assert_eq!(after.hidden, Some(false));
    }

    #[tokio::test]
    async fn igdb_binding_clear_then_rebind_is_stable() {
        let db = Database::in_memory().await.unwrap();
        let id = insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();

        let binding = IgdbBinding {
            igdb_id: 72,
            slug: Some("portal-2".to_owned()),
            rating: Some(91.5),
            total_rating: Some(93.0),
            total_rating_count: Some(3200),
            summary: Some("Sequel to Portal.".to_owned()),
            cover_url: Some("https://images.igdb.com/t_cover_big/co1rs4.jpg".to_owned()),
            screenshots: vec!["https://images.igdb.com/t_screenshot_big/s1.jpg".to_owned()],
            steam_app_id: Some("620".to_owned()),
            ..Default::default()
        };
        let genres = vec!["Puzzle".to_owned(), "Platform".to_owned()];

        write_igdb_binding(db.pool(), id, &binding, &genres)
            .await
            .unwrap();
        let bound = read(db.pool(), id).await.unwrap();
        assert_eq!(bound.igdb_id, Some(72));
        assert_eq!(bound.screenshot_list().len(), 1);

        clear_igdb_binding(db.pool(), id).await.unwrap();
        let cleared = read(db.pool(), id).await.unwrap();
        assert!(cleared.igdb_id.is_none());
        assert!(cleared.igdb_cover_url.is_none());
        assert!(cleared.igdb_matched_at.is_none());

        write_igdb_binding(db.pool(), id, &binding, &genres)
            .await
            .unwrap();
        let rebound = read(db.pool(), id).await.unwrap();
        assert_eq!(rebound.igdb_id, bound.igdb_id);
        assert_eq!(rebound.igdb_slug, bound.igdb_slug);
        assert_eq!(rebound.total_rating, bound.total_rating);
        assert_eq!(rebound.igdb_cover_url, bound.igdb_cover_url);
    }

    #[tokio::test]
    async fn delete_cascades_dependents() {
        let db = Database::in_memory().await.unwrap();
        let id = insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO game_depot_updates (game_id, manifest_id, update_timestamp) VALUES (?, 'version_update', '2025-02-01T00:00:00')",
        )
        .bind(id)
        .execute(db.pool())
        .await
        .unwrap();

        delete(db.pool(), id).await.unwrap();

        let orphans: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM game_depot_updates WHERE game_id = ?")
                .bind(id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(orphans.0, 0);
        assert!(matches!(
            read(db.pool(), id).await,
            Err(Status::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_store_id_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();
        assert!(insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn steam_id_listing_covers_igdb_cross_reference() {
        let db = Database::in_memory().await.unwrap();
        let steam = insert_raw(db.pool(), &raw_game("Portal 2", "steam", "620"))
            .await
            .unwrap();
        let gog = insert_raw(db.pool(), &raw_game("The Witcher 3", "gog", "1207664663"))
            .await
            .unwrap();
        insert_raw(db.pool(), &raw_game("Unmatched", "epic", "xyz"))
            .await
            .unwrap();

        sqlx::query("UPDATE games SET steam_app_id = '292030' WHERE id = ?")
            .bind(gog)
            .execute(db.pool())
            .await
            .unwrap();

        let eligible = list_with_steam_id(db.pool(), true).await.unwrap();
        let ids: Vec<i64> = eligible.iter().map(|g| g.id).collect();
        assert!(ids.contains(&steam));
        assert!(ids.contains(&gog));
        assert_eq!(ids.len(), 2);

        // A recorded 'unknown' tier stops re-querying.
        mark_protondb_unknown(db.pool(), steam).await.unwrap();
        let unmatched_only = list_with_steam_id(db.pool(), false).await.unwrap();
        assert_eq!(unmatched_only.len(), 1);
        assert_eq!(unmatched_only[0].id, gog);
    }
}
