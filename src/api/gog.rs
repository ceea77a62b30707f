use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

/// Reads the locally installed GOG Galaxy database rather than the remote
/// API. The path comes from settings.
pub struct GogDbApi {
    db_path: PathBuf,
}

impl GogDbApi {
    pub fn new(db_path: &str) -> GogDbApi {
        GogDbApi {
            db_path: PathBuf::from(db_path),
        }
    }
}

#[async_trait]
impl Storefront for GogDbApi {
    fn id() -> String {
        String::from("gog")
    }

    #[instrument(name = "gog::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        if !self.db_path.exists() {
            return Err(Status::not_configured(format!(
                "GOG database not found at {}",
                self.db_path.display()
            )));
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path.display()))
                .map_err(sqlx::Error::from)?
                .read_only(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(sqlx::Error::from)?;

        // LimitedDetails carries the user-visible catalog in Galaxy's db.
        let rows: Vec<(i64, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT productId, title, images
            FROM LimitedDetails
            ORDER BY title
            "#,
        )
        .fetch_all(&pool)
        .await?;
        pool.close().await;

        info!("gog games: {}", rows.len());

        Ok(rows
            .into_iter()
            .map(|(product_id, title, images)| {
                let cover_image = images
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
                    .and_then(|parsed| {
                        parsed
                            .get("logo2x")
                            .or_else(|| parsed.get("logo"))
                            .and_then(|v| v.as_str())
                            .map(|url| url.to_owned())
                    });

                RawGame {
                    cover_image,
                    ..RawGame::new(&title, "gog", &product_id.to_string())
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_gog_db(path: &std::path::Path) {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query(
            "CREATE TABLE LimitedDetails (productId INTEGER PRIMARY KEY, title TEXT, images TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO LimitedDetails VALUES (1207664663, 'The Witcher 3', '{"logo2x": "https://images.gog.com/w3.jpg"}')"#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn reads_catalog_from_galaxy_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("galaxy.db");
        seed_gog_db(&db_path).await;

        let api = GogDbApi::new(db_path.to_str().unwrap());
        let games = api.get_owned_games().await.unwrap();

        assert_eq!(games.len(), 1);
        assert_eq!(games[0].name, "The Witcher 3");
        assert_eq!(games[0].store_id, "1207664663");
        assert_eq!(
            games[0].cover_image.as_deref(),
            Some("https://images.gog.com/w3.jpg")
        );
    }

    #[tokio::test]
    async fn missing_database_is_not_configured() {
        let api = GogDbApi::new("/nonexistent/galaxy.db");
        match api.get_owned_games().await {
            Err(Status::NotConfigured(_)) => {}
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }
}
