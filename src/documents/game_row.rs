use serde::{Deserialize, Serialize};

/// A row of the `games` table. The `(store, store_id)` pair identifies the
/// storefront-owned entry; `igdb_id` ties together cross-store copies.
#[derive(Serialize, Deserialize, Default, Debug, Clone, sqlx::FromRow)]
pub struct GameRow {
    pub id: i64,
    pub name: String,
    pub store: String,
    pub store_id: Option<String>,

    pub playtime_hours: Option<f64>,
    pub cover_image: Option<String>,
    pub cover_url_override: Option<String>,
    pub release_date: Option<String>,
    pub genres: Option<String>,
    pub developers: Option<String>,
    pub publishers: Option<String>,
    pub extra_data: Option<String>,

    pub added_at: Option<String>,
    pub updated_at: Option<String>,
    pub last_modified: Option<String>,
    pub hidden: Option<bool>,
    pub nsfw: Option<bool>,
    pub priority: Option<String>,
    pub personal_rating: Option<i64>,

    pub news_last_checked: Option<String>,
    pub development_status: Option<String>,
    pub game_version: Option<String>,
    pub status_last_synced: Option<String>,

    pub igdb_id: Option<i64>,
    pub igdb_slug: Option<String>,
    pub igdb_rating: Option<f64>,
    pub igdb_rating_count: Option<i64>,
    pub aggregated_rating: Option<f64>,
    pub aggregated_rating_count: Option<i64>,
    pub total_rating: Option<f64>,
    pub total_rating_count: Option<i64>,
    pub igdb_summary: Option<String>,
    pub igdb_cover_url: Option<String>,
    pub igdb_screenshots: Option<String>,
    pub igdb_matched_at: Option<String>,
    pub steam_app_id: Option<String>,

    pub critics_score: Option<f64>,
    pub review_score: Option<f64>,
    pub review_desc: Option<String>,
    pub total_reviews: Option<i64>,
    pub metacritic_score: Option<f64>,
    pub metacritic_user_score: Option<f64>,
    pub metacritic_slug: Option<String>,
    pub metacritic_url: Option<String>,
    pub metacritic_matched_at: Option<String>,
    pub average_rating: Option<f64>,

    pub protondb_tier: Option<String>,
    pub protondb_score: Option<f64>,
    pub protondb_confidence: Option<String>,
    pub protondb_total: Option<i64>,
    pub protondb_trending_tier: Option<String>,
    pub protondb_matched_at: Option<String>,
}

impl GameRow {
    /// Genres round-trip as a JSON array in a TEXT column.
    pub fn genre_list(&self) -> Vec<String> {
        parse_json_list(self.genres.as_deref())
    }

    pub fn screenshot_list(&self) -> Vec<String> {
        parse_json_list(self.igdb_screenshots.as_deref())
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(false)
    }

    /// Streaming flag lives inside the opaque store payload.
    pub fn is_streaming(&self) -> bool {
        match &self.extra_data {
            Some(raw) => serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|data| data.get("is_streaming").and_then(|v| v.as_bool()))
                .unwrap_or(false),
            None => false,
        }
    }

    /// The Steam AppID usable for compatibility lookups: an owned Steam copy
    /// or the IGDB cross-reference, whichever is present.
    pub fn effective_steam_id(&self) -> Option<String> {
        match &self.steam_app_id {
            Some(id) => Some(id.clone()),
            None if self.store == "steam" => self.store_id.clone(),
            None => None,
        }
    }
}

fn parse_json_list(value: Option<&str>) -> Vec<String> {
    match value {
        Some(raw) => serde_json::from_str(raw).unwrap_or_default(),
        None => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_list_parses_json_array() {
        let row = GameRow {
            genres: Some(r#"["Action", "Indie"]"#.to_owned()),
            ..Default::default()
        };
        assert_eq!(row.genre_list(), vec!["Action", "Indie"]);
    }

    #[test]
    fn genre_list_tolerates_malformed_json() {
        let row = GameRow {
            genres: Some("not json".to_owned()),
            ..Default::default()
        };
        assert!(row.genre_list().is_empty());
    }

    #[test]
    fn effective_steam_id_prefers_igdb_cross_reference() {
        let row = GameRow {
            store: "gog".to_owned(),
            store_id: Some("1207664663".to_owned()),
            steam_app_id: Some("620".to_owned()),
            ..Default::default()
        };
        assert_eq!(row.effective_steam_id(), Some("620".to_owned()));

        let row = GameRow {
            store: "steam".to_owned(),
            store_id: Some("620".to_owned()),
            ..Default::default()
        };
        assert_eq!(row.effective_steam_id(), Some("620".to_owned()));

        let row = GameRow {
            store: "epic".to_owned(),
            store_id: Some("abc".to_owned()),
            ..Default::default()
        };
        assert_eq!(row.effective_steam_id(), None);
    }

    #[test]
    fn streaming_flag_read_from_extra_data() {
        let row = GameRow {
            extra_data: Some(r#"{"is_streaming": true}"#.to_owned()),
            ..Default::default()
        };
        assert!(row.is_streaming());

        let row = GameRow::default();
        assert!(!row.is_streaming());
    }
}
