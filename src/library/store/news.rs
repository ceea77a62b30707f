use sqlx::SqlitePool;

use crate::documents::NewsArticle;
use crate::Status;

/// Idempotent article upsert keyed by url. Re-ingesting the same url updates
/// title/content/author/published_at and refreshes fetched_at in place.
pub async fn upsert_article(
    pool: &SqlitePool,
    game_id: i64,
    title: &str,
    content: Option<&str>,
    author: Option<&str>,
    url: &str,
    published_at: Option<&str>,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        INSERT INTO game_news (game_id, title, content, author, url, published_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET
            title = excluded.title,
            content = excluded.content,
            author = excluded.author,
            published_at = excluded.published_at,
            fetched_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(game_id)
    .bind(title)
    .bind(content)
    .bind(author)
    .bind(url)
    .bind(published_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<NewsArticle>, Status> {
    Ok(sqlx::query_as(
        "SELECT * FROM game_news WHERE game_id = ? ORDER BY published_at DESC",
    )
    .bind(game_id)
    .fetch_all(pool)
    .await?)
}

pub async fn count(pool: &SqlitePool) -> Result<i64, Status> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_news")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::RawGame;
    use crate::library::store::games;
    use crate::library::Database;

    #[tokio::test]
    async fn reingesting_same_url_updates_in_place() {
        let db = Database::in_memory().await.unwrap();
        let game_id = games::insert_raw(db.pool(), &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();

        let url = "https://store.steampowered.com/news/app/620/view/1";
        upsert_article(
            db.pool(),
            game_id,
            "Patch 1",
            Some("old body"),
            Some("valve"),
            url,
            Some("2025-01-01T00:00:00"),
        )
        .await
        .unwrap();
        upsert_article(
            db.pool(),
            game_id,
            "Patch 1 (edited)",
            Some("new body"),
            Some("valve"),
            url,
            Some("2025-01-01T00:00:00"),
        )
        .await
        .unwrap();

        let articles = list_for_game(db.pool(), game_id).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Patch 1 (edited)");
        assert_eq!(articles[0].content.as_deref(), Some("new body"));
    }
}
