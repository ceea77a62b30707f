use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

use crate::documents::{DepotUpdate, UpdateKind};
use crate::Status;

/// Appends an update-history row. History is append-only; rows are never
/// mutated afterwards.
pub async fn append(
    pool: &SqlitePool,
    game_id: i64,
    depot_id: &str,
    kind: UpdateKind,
    update_timestamp: &str,
) -> Result<(), Status> {
    sqlx::query(
        r#"
        INSERT INTO game_depot_updates
            (game_id, depot_id, manifest_id, update_timestamp, fetched_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(game_id)
    .bind(depot_id)
    .bind(kind.as_str())
    .bind(update_timestamp)
    .bind(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<DepotUpdate>, Status> {
    Ok(sqlx::query_as(
        "SELECT * FROM game_depot_updates WHERE game_id = ? ORDER BY update_timestamp DESC",
    )
    .bind(game_id)
    .fetch_all(pool)
    .await?)
}

/// Ids of games with an update in the last 30 days.
pub async fn recently_updated_ids(pool: &SqlitePool) -> Result<HashSet<i64>, Status> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT game_id FROM game_depot_updates
        WHERE update_timestamp >= datetime('now', '-30 days')
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn last_update_dates(pool: &SqlitePool) -> Result<HashMap<i64, String>, Status> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT game_id, MAX(update_timestamp) FROM game_depot_updates
        GROUP BY game_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::RawGame;
    use crate::library::store::games;
    use crate::library::Database;

    #[tokio::test]
    async fn history_is_ordered_newest_first() {
        let db = Database::in_memory().await.unwrap();
        let game_id = games::insert_raw(db.pool(), &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();

        append(
            db.pool(),
            game_id,
            "steam:620",
            UpdateKind::InitialVersion,
            "2025-01-01T00:00:00",
        )
        .await
        .unwrap();
        append(
            db.pool(),
            game_id,
            "steam:620",
            UpdateKind::VersionUpdate,
            "2025-02-01T00:00:00",
        )
        .await
        .unwrap();

        let history = list_for_game(db.pool(), game_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].manifest_id.as_deref(), Some("version_update"));
        assert_eq!(history[1].manifest_id.as_deref(), Some("initial_version"));
    }

    #[tokio::test]
    async fn last_update_dates_takes_max_per_game() {
        let db = Database::in_memory().await.unwrap();
        let game_id = games::insert_raw(db.pool(), &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();

        for ts in ["2025-01-01T00:00:00", "2025-03-01T00:00:00", "2025-02-01T00:00:00"] {
            append(db.pool(), game_id, "steam:620", UpdateKind::VersionUpdate, ts)
                .await
                .unwrap();
        }

        let dates = last_update_dates(db.pool()).await.unwrap();
        assert_eq!(dates.get(&game_id).map(String::as_str), Some("2025-03-01T00:00:00"));
    }
}
