use sqlx::SqlitePool;

use crate::documents::{Label, SystemTag, SYSTEM_TAGS};
use crate::Status;

/// Creates the closed set of system labels when missing. Safe to call on
/// every startup.
pub async fn ensure_system_labels(pool: &SqlitePool) -> Result<(), Status> {
    for tag in SYSTEM_TAGS {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM labels WHERE name = ? AND system = 1")
                .bind(tag.name())
                .fetch_optional(pool)
                .await?;

        if existing.is_none() {
            sqlx::query(
                "INSERT INTO labels (name, type, icon, color, system) VALUES (?, 'system_tag', ?, ?, 1)",
            )
            .bind(tag.name())
            .bind(tag.icon())
            .bind(tag.color())
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

pub async fn read(pool: &SqlitePool, label_id: i64) -> Result<Label, Status> {
    let label: Option<Label> = sqlx::query_as("SELECT * FROM labels WHERE id = ?")
        .bind(label_id)
        .fetch_optional(pool)
        .await?;

    label.ok_or_else(|| Status::not_found(format!("label with id={label_id} was not found")))
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Label>, Status> {
    Ok(sqlx::query_as("SELECT * FROM labels ORDER BY name")
        .fetch_all(pool)
        .await?)
}

pub async fn system_label_id(pool: &SqlitePool, tag: SystemTag) -> Result<i64, Status> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM labels WHERE name = ? AND system = 1")
        .bind(tag.name())
        .fetch_optional(pool)
        .await?;

    row.map(|(id,)| id)
        .ok_or_else(|| Status::internal(format!("system label '{}' is missing", tag.name())))
}

/// Manually assigns a label. `INSERT OR IGNORE` keeps repeats idempotent.
pub async fn assign(pool: &SqlitePool, label_id: i64, game_id: i64) -> Result<u64, Status> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO game_labels (label_id, game_id, auto) VALUES (?, ?, 0)")
            .bind(label_id)
            .bind(game_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

pub async fn unassign(pool: &SqlitePool, label_id: i64, game_id: i64) -> Result<(), Status> {
    sqlx::query("DELETE FROM game_labels WHERE label_id = ? AND game_id = ?")
        .bind(label_id)
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn bulk_assign(
    pool: &SqlitePool,
    label_id: i64,
    game_ids: &[i64],
) -> Result<u64, Status> {
    // Verify the label exists before touching assignments.
    read(pool, label_id).await?;

    let mut added = 0;
    for game_id in game_ids {
        added += assign(pool, label_id, *game_id).await?;
    }

    sqlx::query("UPDATE labels SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(label_id)
        .execute(pool)
        .await?;

    Ok(added)
}

/// Labels attached to a game, with the auto flag of each assignment.
pub async fn labels_for_game(
    pool: &SqlitePool,
    game_id: i64,
) -> Result<Vec<(Label, bool)>, Status> {
    let rows: Vec<(i64, bool)> =
        sqlx::query_as("SELECT label_id, auto FROM game_labels WHERE game_id = ?")
            .bind(game_id)
            .fetch_all(pool)
            .await?;

    let mut labels = vec![];
    for (label_id, auto) in rows {
        labels.push((read(pool, label_id).await?, auto));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::store::games;
    use crate::library::Database;

    #[tokio::test]
    async fn system_labels_created_once() {
        let db = Database::in_memory().await.unwrap();

        ensure_system_labels(db.pool()).await.unwrap();
        ensure_system_labels(db.pool()).await.unwrap();

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM labels WHERE system = 1 AND type = 'system_tag'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count.0, 5);
    }

    #[tokio::test]
    async fn assign_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        ensure_system_labels(db.pool()).await.unwrap();

        let game_id = games::insert_raw(
            db.pool(),
            &crate::documents::RawGame::new("Portal 2", "steam", "620"),
        )
        .await
        .unwrap();
        let label_id = system_label_id(db.pool(), SystemTag::Played).await.unwrap();

        assert_eq!(assign(db.pool(), label_id, game_id).await.unwrap(), 1);
        assert_eq!(assign(db.pool(), label_id, game_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_assign_requires_existing_label() {
        let db = Database::in_memory().await.unwrap();

        match bulk_assign(db.pool(), 999, &[1, 2]).await {
            Err(Status::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
