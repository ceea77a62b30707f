use sqlx::SqlitePool;
use tracing::info;

use crate::documents::SystemTag;
use crate::library::store::{games, labels};
use crate::Status;

/// Recomputes the auto-applied system tag for one game.
///
/// Only Steam games with known playtime get auto tags; for every other store
/// the user applies labels manually. All `auto=1` assignments pointing at
/// system tags are dropped and exactly one matching bucket row is inserted.
/// User-applied (`auto=0`) rows are never touched, even on the same label.
pub async fn update_for_game(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    let game = match games::read(pool, game_id).await {
        Ok(game) => game,
        Err(Status::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };

    if game.store != "steam" {
        return Ok(());
    }
    let playtime = match game.playtime_hours {
        Some(playtime) => playtime,
        None => return Ok(()),
    };

    sqlx::query(
        r#"
        DELETE FROM game_labels
        WHERE game_id = ? AND auto = 1
        AND label_id IN (SELECT id FROM labels WHERE system = 1 AND type = 'system_tag')
        "#,
    )
    .bind(game_id)
    .execute(pool)
    .await?;

    let tag = SystemTag::bucket_for(playtime);
    let label_id = labels::system_label_id(pool, tag).await?;

    sqlx::query("INSERT OR IGNORE INTO game_labels (label_id, game_id, auto) VALUES (?, ?, 1)")
        .bind(label_id)
        .bind(game_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Bulk pass over every Steam game with playtime data.
pub async fn update_all(pool: &SqlitePool) -> Result<usize, Status> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM games WHERE store = 'steam' AND playtime_hours IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    for (game_id,) in &rows {
        update_for_game(pool, *game_id).await?;
    }

    info!("updated auto labels for {} steam games", rows.len());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::RawGame;
    use crate::library::Database;

    async fn seed(db: &Database, store: &str, playtime: Option<f64>) -> i64 {
        labels::ensure_system_labels(db.pool()).await.unwrap();
        let raw = RawGame {
            playtime_hours: playtime,
            ..RawGame::new("Portal 2", store, "620")
        };
        games::insert_raw(db.pool(), &raw).await.unwrap()
    }

    async fn auto_tags_of(db: &Database, game_id: i64) -> Vec<String> {
        labels::labels_for_game(db.pool(), game_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|(label, auto)| *auto && label.system == Some(true))
            .map(|(label, _)| label.name)
            .collect()
    }

    #[tokio::test]
    async fn steam_game_gets_exactly_one_bucket() {
        let db = Database::in_memory().await.unwrap();
        let game_id = seed(&db, "steam", Some(8.0)).await;

        update_for_game(db.pool(), game_id).await.unwrap();

        assert_eq!(auto_tags_of(&db, game_id).await, vec!["Played"]);
    }

    #[tokio::test]
    async fn playtime_change_moves_the_bucket() {
        let db = Database::in_memory().await.unwrap();
        let game_id = seed(&db, "steam", Some(1.0)).await;

        update_for_game(db.pool(), game_id).await.unwrap();
        assert_eq!(auto_tags_of(&db, game_id).await, vec!["Just Tried"]);

        sqlx::query("UPDATE games SET playtime_hours = 75.0 WHERE id = ?")
            .bind(game_id)
            .execute(db.pool())
            .await
            .unwrap();
        update_for_game(db.pool(), game_id).await.unwrap();

        assert_eq!(auto_tags_of(&db, game_id).await, vec!["Heavily Played"]);
    }

    #[tokio::test]
    async fn non_steam_games_get_no_auto_tags() {
        let db = Database::in_memory().await.unwrap();
        let game_id = seed(&db, "gog", Some(30.0)).await;

        update_for_game(db.pool(), game_id).await.unwrap();

        assert!(auto_tags_of(&db, game_id).await.is_empty());
    }

    #[tokio::test]
    async fn user_applied_rows_survive_recompute() {
        let db = Database::in_memory().await.unwrap();
        let game_id = seed(&db, "steam", Some(8.0)).await;

        // User manually pins "Heavily Played"; the engine must not remove it,
        // even though it points at a system tag.
        let manual = labels::system_label_id(db.pool(), SystemTag::HeavilyPlayed)
            .await
            .unwrap();
        labels::assign(db.pool(), manual, game_id).await.unwrap();

        update_for_game(db.pool(), game_id).await.unwrap();

        let all = labels::labels_for_game(db.pool(), game_id).await.unwrap();
        let manual_kept = all
            .iter()
            .any(|(label, auto)| label.name == "Heavily Played" && !auto);
        let auto_applied = all.iter().any(|(label, auto)| label.name == "Played" && *auto);
        assert!(manual_kept);
        assert!(auto_applied);
    }

    #[tokio::test]
    async fn update_all_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let game_id = seed(&db, "steam", Some(0.0)).await;

        update_all(db.pool()).await.unwrap();
        let first = auto_tags_of(&db, game_id).await;
        update_all(db.pool()).await.unwrap();
        let second = auto_tags_of(&db, game_id).await;

        assert_eq!(first, vec!["Never Launched"]);
        assert_eq!(first, second);
    }
}
