use sqlx::SqlitePool;

use crate::Status;

// Recognized settings keys.
pub const STEAM_API_KEY: &str = "steam_api_key";
pub const STEAM_USER_ID: &str = "steam_user_id";
pub const IGDB_CLIENT_ID: &str = "igdb_client_id";
pub const IGDB_CLIENT_SECRET: &str = "igdb_client_secret";
pub const ITCH_API_KEY: &str = "itch_api_key";
pub const HUMBLE_SESSION_COOKIE: &str = "humble_session_cookie";
pub const BATTLENET_COOKIE: &str = "battlenet_cookie";
pub const GOG_DB_PATH: &str = "gog_db_path";
pub const EA_BEARER_TOKEN: &str = "ea_bearer_token";
pub const AMAZON_TOKENS: &str = "amazon_tokens";
pub const USE_STEAM_CLIENT: &str = "use_steam_client";
pub const SECRET_KEY: &str = "secret_key";

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>, Status> {
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(value,)| value).filter(|v| !v.is_empty()))
}

pub async fn get_or(pool: &SqlitePool, key: &str, default: &str) -> Result<String, Status> {
    Ok(get(pool, key).await?.unwrap_or_else(|| default.to_owned()))
}

/// Atomic single-row upsert.
pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<(), Status> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete(pool: &SqlitePool, key: &str) -> Result<(), Status> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Feature flag read. The environment variable (upper-cased key) overrides
/// the database value.
pub async fn get_flag(pool: &SqlitePool, key: &str, default: bool) -> Result<bool, Status> {
    if let Ok(env_value) = std::env::var(key.to_uppercase()) {
        match env_value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => return Ok(true),
            "false" | "0" | "no" => return Ok(false),
            _ => {}
        }
    }

    match get(pool, key).await? {
        Some(value) => Ok(matches!(
            value.trim().to_lowercase().as_str(),
            "true" | "1" | "yes"
        )),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub struct SteamCredentials {
    pub api_key: String,
    pub user_id: String,
}

pub async fn steam_credentials(pool: &SqlitePool) -> Result<SteamCredentials, Status> {
    let api_key = get(pool, STEAM_API_KEY).await?;
    let user_id = get(pool, STEAM_USER_ID).await?;

    match (api_key, user_id) {
        (Some(api_key), Some(user_id)) => Ok(SteamCredentials { api_key, user_id }),
        _ => Err(Status::not_configured(
            "Steam API key / user id are not set in Settings",
        )),
    }
}

pub struct IgdbCredentials {
    pub client_id: String,
    pub secret: String,
}

pub async fn igdb_credentials(pool: &SqlitePool) -> Result<IgdbCredentials, Status> {
    let client_id = get(pool, IGDB_CLIENT_ID).await?;
    let secret = get(pool, IGDB_CLIENT_SECRET).await?;

    match (client_id, secret) {
        (Some(client_id), Some(secret)) => Ok(IgdbCredentials { client_id, secret }),
        _ => Err(Status::not_configured(
            "IGDB client id / secret are not set in Settings",
        )),
    }
}

/// Cookie-signing key, generated once and persisted.
pub async fn get_or_create_secret_key(pool: &SqlitePool) -> Result<String, Status> {
    if let Some(key) = get(pool, SECRET_KEY).await? {
        return Ok(key);
    }

    let key = uuid::Uuid::new_v4().simple().to_string();
    set(pool, SECRET_KEY, &key).await?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Database;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let db = Database::in_memory().await.unwrap();

        set(db.pool(), STEAM_API_KEY, "XYZ").await.unwrap();
        assert_eq!(
            get(db.pool(), STEAM_API_KEY).await.unwrap(),
            Some("XYZ".to_owned())
        );

        // Upsert replaces in place.
        set(db.pool(), STEAM_API_KEY, "ABC").await.unwrap();
        assert_eq!(
            get(db.pool(), STEAM_API_KEY).await.unwrap(),
            Some("ABC".to_owned())
        );
    }

    #[tokio::test]
    async fn empty_value_reads_as_unset() {
        let db = Database::in_memory().await.unwrap();

        set(db.pool(), ITCH_API_KEY, "").await.unwrap();
        assert_eq!(get(db.pool(), ITCH_API_KEY).await.unwrap(), None);
        assert_eq!(
            get_or(db.pool(), ITCH_API_KEY, "fallback").await.unwrap(),
            "fallback"
        );
    }

    #[tokio::test]
    async fn missing_steam_credentials_surface_not_configured() {
        let db = Database::in_memory().await.unwrap();

        match steam_credentials(db.pool()).await {
            Err(Status::NotConfigured(_)) => {}
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn flag_reads_database_value() {
        let db = Database::in_memory().await.unwrap();

        assert!(!get_flag(db.pool(), USE_STEAM_CLIENT, false).await.unwrap());
        set(db.pool(), USE_STEAM_CLIENT, "true").await.unwrap();
        assert!(get_flag(db.pool(), USE_STEAM_CLIENT, false).await.unwrap());
    }

    #[tokio::test]
    async fn secret_key_is_stable() {
        let db = Database::in_memory().await.unwrap();

        let first = get_or_create_secret_key(db.pool()).await.unwrap();
        let second = get_or_create_secret_key(db.pool()).await.unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
