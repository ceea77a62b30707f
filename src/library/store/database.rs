use directories::ProjectDirs;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::Status;

/// Single-file embedded store. WAL journaling gives concurrent readers with
/// serialized writers; every statement is its own transaction.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the library database at `path` and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, Status> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(sqlx::Error::from)?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// In-memory database for tests. Migrations are applied.
    pub async fn in_memory() -> Result<Self, Status> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(sqlx::Error::from)?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Default location of the database file. `DATABASE_PATH` overrides; a
    /// release build uses the per-user data directory, a debug (source) run
    /// keeps the file in the working directory.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            return PathBuf::from(path);
        }

        if cfg!(debug_assertions) {
            return PathBuf::from("game_library.db");
        }

        match ProjectDirs::from("", "", "ludex") {
            Some(dirs) => dirs.data_dir().join("game_library.db"),
            None => PathBuf::from("game_library.db"),
        }
    }

    /// Creates missing tables, columns and indexes. Every step is a no-op
    /// when the schema is already current; migrations only ever add.
    async fn run_migrations(&self) -> Result<(), Status> {
        self.create_tables().await?;
        self.ensure_game_columns().await?;
        self.create_indexes().await?;
        Ok(())
    }

    async fn create_tables(&self) -> Result<(), Status> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                store TEXT NOT NULL,
                store_id TEXT,
                added_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (store, store_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'collection',
                icon TEXT,
                color TEXT,
                system BOOLEAN DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_labels (
                label_id INTEGER NOT NULL,
                game_id INTEGER NOT NULL,
                auto BOOLEAN DEFAULT 0,
                added_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (label_id, game_id),
                FOREIGN KEY (label_id) REFERENCES labels(id) ON DELETE CASCADE,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                author TEXT,
                url TEXT,
                published_at TIMESTAMP,
                fetched_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_depot_updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                depot_id TEXT,
                manifest_id TEXT,
                update_timestamp TIMESTAMP,
                fetched_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER DEFAULT 0,
                total INTEGER DEFAULT 0,
                message TEXT,
                result TEXT,
                error TEXT,
                cancelled BOOLEAN DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS popularity_cache (
                igdb_id INTEGER NOT NULL,
                popularity_type INTEGER NOT NULL,
                popularity_value REAL NOT NULL,
                cached_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (igdb_id, popularity_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds any `games` column missing from an older database file.
    async fn ensure_game_columns(&self) -> Result<(), Status> {
        let rows = sqlx::query("PRAGMA table_info(games)")
            .fetch_all(&self.pool)
            .await?;
        let existing: Vec<String> = rows
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for (name, definition) in GAME_COLUMNS {
            if !existing.iter().any(|col| col == name) {
                sqlx::query(&format!("ALTER TABLE games ADD COLUMN {name} {definition}"))
                    .execute(&self.pool)
                    .await?;
                info!("added games column: {name}");
            }
        }

        Ok(())
    }

    async fn create_indexes(&self) -> Result<(), Status> {
        for statement in INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

const GAME_COLUMNS: &[(&str, &str)] = &[
    ("playtime_hours", "REAL"),
    ("cover_image", "TEXT"),
    ("cover_url_override", "TEXT"),
    ("release_date", "TIMESTAMP"),
    ("genres", "TEXT"),
    ("developers", "TEXT"),
    ("publishers", "TEXT"),
    ("extra_data", "TEXT"),
    ("last_modified", "TIMESTAMP"),
    ("hidden", "BOOLEAN DEFAULT 0"),
    ("nsfw", "BOOLEAN DEFAULT 0"),
    ("priority", "TEXT"),
    ("personal_rating", "INTEGER"),
    ("news_last_checked", "TIMESTAMP"),
    ("development_status", "TEXT"),
    ("game_version", "TEXT"),
    ("status_last_synced", "TIMESTAMP"),
    ("igdb_id", "INTEGER"),
    ("igdb_slug", "TEXT"),
    ("igdb_rating", "REAL"),
    ("igdb_rating_count", "INTEGER"),
    ("aggregated_rating", "REAL"),
    ("aggregated_rating_count", "INTEGER"),
    ("total_rating", "REAL"),
    ("total_rating_count", "INTEGER"),
    ("igdb_summary", "TEXT"),
    ("igdb_cover_url", "TEXT"),
    ("igdb_screenshots", "TEXT"),
    ("igdb_matched_at", "TIMESTAMP"),
    ("steam_app_id", "TEXT"),
    ("critics_score", "REAL"),
    ("review_score", "REAL"),
    ("review_desc", "TEXT"),
    ("total_reviews", "INTEGER"),
    ("metacritic_score", "REAL"),
    ("metacritic_user_score", "REAL"),
    ("metacritic_slug", "TEXT"),
    ("metacritic_url", "TEXT"),
    ("metacritic_matched_at", "TIMESTAMP"),
    ("average_rating", "REAL"),
    ("protondb_tier", "TEXT"),
    ("protondb_score", "REAL"),
    ("protondb_confidence", "TEXT"),
    ("protondb_total", "INTEGER"),
    ("protondb_trending_tier", "TEXT"),
    ("protondb_matched_at", "TIMESTAMP"),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_games_playtime ON games(playtime_hours)",
    "CREATE INDEX IF NOT EXISTS idx_games_total_rating ON games(total_rating)",
    "CREATE INDEX IF NOT EXISTS idx_games_added_at ON games(added_at)",
    "CREATE INDEX IF NOT EXISTS idx_games_release_date ON games(release_date)",
    "CREATE INDEX IF NOT EXISTS idx_games_last_modified ON games(last_modified)",
    "CREATE INDEX IF NOT EXISTS idx_games_nsfw ON games(nsfw)",
    "CREATE INDEX IF NOT EXISTS idx_games_hidden ON games(hidden)",
    "CREATE INDEX IF NOT EXISTS idx_games_aggregated_rating ON games(aggregated_rating)",
    "CREATE INDEX IF NOT EXISTS idx_games_igdb_rating_count ON games(igdb_rating_count)",
    "CREATE INDEX IF NOT EXISTS idx_games_development_status ON games(development_status)",
    "CREATE INDEX IF NOT EXISTS idx_game_labels_game_id ON game_labels(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_game_labels_label_id ON game_labels(label_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_game_news_url ON game_news(url)",
    "CREATE INDEX IF NOT EXISTS idx_game_news_game_id ON game_news(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_game_depot_updates_game_id ON game_depot_updates(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_game_depot_updates_timestamp ON game_depot_updates(game_id, update_timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_popularity_cache_type_value ON popularity_cache(popularity_type, popularity_value DESC)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_tables() {
        let db = Database::in_memory().await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

        for table in [
            "games",
            "labels",
            "game_labels",
            "game_news",
            "game_depot_updates",
            "jobs",
            "popularity_cache",
            "settings",
        ] {
            assert!(names.contains(&table), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        // Re-running against an up-to-date schema changes nothing.
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        let db = Database::open(&db_path).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn missing_column_is_added() {
        let db = Database::in_memory().await.unwrap();

        let rows = sqlx::query("PRAGMA table_info(games)")
            .fetch_all(db.pool())
            .await
            .unwrap();
        let names: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();
        assert!(names.iter().any(|n| n == "protondb_tier"));
        assert!(names.iter().any(|n| n == "igdb_screenshots"));
        assert!(names.iter().any(|n| n == "average_rating"));
    }
}
