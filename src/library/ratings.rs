use sqlx::SqlitePool;

use crate::documents::GameRow;
use crate::library::store::games;
use crate::Status;

/// Arithmetic mean of whichever rating sources are present; NULL when none
/// are. Re-run after every IGDB, Metacritic or user-rating mutation.
pub fn calculate_average_rating(game: &GameRow) -> Option<f64> {
    let sources = [
        game.critics_score,
        game.igdb_rating,
        game.aggregated_rating,
        game.total_rating,
        game.metacritic_score,
        game.metacritic_user_score,
    ];

    let present: Vec<f64> = sources.into_iter().flatten().collect();
    match present.is_empty() {
        true => None,
        false => Some(present.iter().sum::<f64>() / present.len() as f64),
    }
}

pub async fn update_average_rating(pool: &SqlitePool, game_id: i64) -> Result<(), Status> {
    let game = games::read(pool, game_id).await?;
    games::set_average_rating(pool, game_id, calculate_average_rating(&game)).await
}

pub async fn recalculate_all(pool: &SqlitePool) -> Result<u64, Status> {
    let mut updated = 0;
    for game in games::list_all(pool).await? {
        let average = calculate_average_rating(&game);
        if average != game.average_rating {
            games::set_average_rating(pool, game.id, average).await?;
            updated += 1;
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::RawGame;
    use crate::library::Database;

    #[test]
    fn mean_of_present_sources() {
        let game = GameRow {
            igdb_rating: Some(90.0),
            total_rating: Some(80.0),
            metacritic_score: Some(70.0),
            ..Default::default()
        };
        assert_eq!(calculate_average_rating(&game), Some(80.0));
    }

    #[test]
    fn no_sources_yields_none() {
        assert_eq!(calculate_average_rating(&GameRow::default()), None);
    }

    #[test]
    fn single_source_is_its_own_mean() {
        let game = GameRow {
            aggregated_rating: Some(85.5),
            ..Default::default()
        };
        assert_eq!(calculate_average_rating(&game), Some(85.5));
    }

    #[tokio::test]
    async fn update_writes_through() {
        let db = Database::in_memory().await.unwrap();
        let id = games::insert_raw(db.pool(), &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();

        sqlx::query("UPDATE games SET igdb_rating = 90.0, total_rating = 70.0 WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        update_average_rating(db.pool(), id).await.unwrap();
        let game = games::read(db.pool(), id).await.unwrap();
        assert_eq!(game.average_rating, Some(80.0));

        // Clearing the sources clears the aggregate.
        sqlx::query("UPDATE games SET igdb_rating = NULL, total_rating = NULL WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
        update_average_rating(db.pool(), id).await.unwrap();
        let game = games::read(db.pool(), id).await.unwrap();
        assert_eq!(game.average_rating, None);
    }
}
