use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::{error, info, instrument};

use crate::documents::{RawGame, UpdateKind};
use crate::library::store::{games, updates};
use crate::Status;

/// Result of committing one store batch.
#[derive(Default, Debug)]
pub struct ImportSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,

    /// New rows with no IGDB binding yet; candidates for matching.
    pub unmatched_ids: Vec<i64>,

    /// Rows whose playtime changed; auto tags need recomputing.
    pub playtime_changed_ids: Vec<i64>,
}

/// Commits a batch of `RawGame`s for one store.
///
/// Each record is its own transaction; a failed record is logged and skipped
/// without rolling back the rest of the batch. Cross-store duplicates are
/// intentionally kept as separate rows and coalesced by the query layer.
#[instrument(level = "info", skip(pool, raw_games), fields(count = raw_games.len()))]
pub async fn import_batch(
    pool: &SqlitePool,
    store: &str,
    raw_games: Vec<RawGame>,
) -> Result<ImportSummary, Status> {
    let mut summary = ImportSummary::default();

    for raw in raw_games {
        summary.processed += 1;
        match import_one(pool, &raw, &mut summary).await {
            Ok(()) => {}
            Err(e) => {
                error!("failed to import '{}' from {store}: {e}", raw.name);
                summary.failed += 1;
            }
        }
    }

    info!(
        "{store} import: {} created, {} updated, {} failed",
        summary.created, summary.updated, summary.failed
    );
    Ok(summary)
}

async fn import_one(
    pool: &SqlitePool,
    raw: &RawGame,
    summary: &mut ImportSummary,
) -> Result<(), Status> {
    if raw.name.is_empty() || raw.store_id.is_empty() {
        return Err(Status::parse("record is missing name or store id"));
    }

    match games::find_by_store_id(pool, &raw.store, &raw.store_id).await? {
        None => {
            let game_id = games::insert_raw(pool, raw).await?;
            summary.created += 1;
            summary.unmatched_ids.push(game_id);
            if raw.playtime_hours.is_some() {
                summary.playtime_changed_ids.push(game_id);
            }
        }
        Some(existing) => {
            let playtime_changed = raw.playtime_hours.is_some()
                && raw.playtime_hours != existing.playtime_hours;

            games::update_store_fields(pool, existing.id, raw).await?;
            track_last_modified(pool, existing.id, existing.last_modified.as_deref(), raw).await?;

            summary.updated += 1;
            if playtime_changed {
                summary.playtime_changed_ids.push(existing.id);
            }
            if existing.igdb_id.is_none() {
                summary.unmatched_ids.push(existing.id);
            }
        }
    }

    Ok(())
}

/// Applies the store-reported build time. The initial observation is written
/// silently; a later instant is written and logged to update history;
/// anything else is a no-op.
async fn track_last_modified(
    pool: &SqlitePool,
    game_id: i64,
    previous: Option<&str>,
    raw: &RawGame,
) -> Result<(), Status> {
    let reported = match &raw.last_modified {
        Some(reported) => reported,
        None => return Ok(()),
    };

    match previous {
        None => games::set_last_modified(pool, game_id, reported).await,
        Some(previous) if previous != reported => {
            match (parse_instant(previous), parse_instant(reported)) {
                (Some(old), Some(new)) if new > old => {
                    games::set_last_modified(pool, game_id, reported).await?;
                    updates::append(
                        pool,
                        game_id,
                        &format!("{}:{}", raw.store, raw.store_id),
                        UpdateKind::VersionUpdate,
                        reported,
                    )
                    .await
                }
                _ => Ok(()),
            }
        }
        Some(_) => Ok(()),
    }
}

fn parse_instant(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    fn raw(name: &str, store_id: &str, playtime: Option<f64>) -> RawGame {
        RawGame {
            playtime_hours: playtime,
            ..RawGame::new(name, "steam", store_id)
        }
    }

    #[tokio::test]
    async fn fresh_batch_creates_rows() {
        let db = Database::in_memory().await.unwrap();

        let summary = import_batch(
            db.pool(),
            "steam",
            vec![raw("Portal 2", "620", Some(8.0)), raw("Half-Life", "70", None)],
        )
        .await
        .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.unmatched_ids.len(), 2);
        assert_eq!(summary.playtime_changed_ids.len(), 1);
    }

    #[tokio::test]
    async fn reimport_of_unchanged_catalog_is_idempotent() {
        let db = Database::in_memory().await.unwrap();

        let mut first = raw("Portal 2", "620", Some(8.0));
        first.last_modified = Some("2025-01-01T00:00:00".to_owned());

        import_batch(db.pool(), "steam", vec![first.clone()])
            .await
            .unwrap();
        let summary = import_batch(db.pool(), "steam", vec![first]).await.unwrap();

        assert_eq!(summary.created, 0);
        assert_eq!(summary.updated, 1);
        // No phantom version_update entries on an unchanged remote catalog.
        let game = games::find_by_store_id(db.pool(), "steam", "620")
            .await
            .unwrap()
            .unwrap();
        let history = updates::list_for_game(db.pool(), game.id).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn later_last_modified_appends_version_update() {
        let db = Database::in_memory().await.unwrap();

        let mut initial = raw("Portal 2", "620", Some(8.0));
        initial.last_modified = Some("2025-01-01T00:00:00".to_owned());
        import_batch(db.pool(), "steam", vec![initial.clone()])
            .await
            .unwrap();

        let mut updated = initial.clone();
        updated.last_modified = Some("2025-02-01T00:00:00".to_owned());
        import_batch(db.pool(), "steam", vec![updated]).await.unwrap();

        let game = games::find_by_store_id(db.pool(), "steam", "620")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(game.last_modified.as_deref(), Some("2025-02-01T00:00:00"));

        let history = updates::list_for_game(db.pool(), game.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].manifest_id.as_deref(), Some("version_update"));
        assert_eq!(
            history[0].update_timestamp.as_deref(),
            Some("2025-02-01T00:00:00")
        );
    }

    #[tokio::test]
    async fn older_last_modified_is_a_no_op() {
        let db = Database::in_memory().await.unwrap();

        let mut initial = raw("Portal 2", "620", None);
        initial.last_modified = Some("2025-02-01T00:00:00".to_owned());
        import_batch(db.pool(), "steam", vec![initial.clone()])
            .await
            .unwrap();

        let mut regressed = initial;
        regressed.last_modified = Some("2025-01-01T00:00:00".to_owned());
        import_batch(db.pool(), "steam", vec![regressed]).await.unwrap();

        let game = games::find_by_store_id(db.pool(), "steam", "620")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(game.last_modified.as_deref(), Some("2025-02-01T00:00:00"));
        assert!(updates::list_for_game(db.pool(), game.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn malformed_record_skips_without_aborting_batch() {
        let db = Database::in_memory().await.unwrap();

        let summary = import_batch(
            db.pool(),
            "steam",
            vec![raw("", "999", None), raw("Half-Life", "70", None)],
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
    }

    #[tokio::test]
    async fn playtime_change_is_reported_for_auto_tags() {
        let db = Database::in_memory().await.unwrap();

        import_batch(db.pool(), "steam", vec![raw("Portal 2", "620", Some(1.0))])
            .await
            .unwrap();
        let summary = import_batch(db.pool(), "steam", vec![raw("Portal 2", "620", Some(3.0))])
            .await
            .unwrap();
        assert_eq!(summary.playtime_changed_ids.len(), 1);

        let summary = import_batch(db.pool(), "steam", vec![raw("Portal 2", "620", Some(3.0))])
            .await
            .unwrap();
        assert!(summary.playtime_changed_ids.is_empty());
    }
}
