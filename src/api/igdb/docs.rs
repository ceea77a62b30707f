use serde::{Deserialize, Serialize};

/// Fields requested on the games endpoint.
pub const GAME_FIELDS: &str = "id, name, slug, summary, rating, rating_count, \
    aggregated_rating, aggregated_rating_count, total_rating, total_rating_count, \
    first_release_date, cover.url, screenshots.url, genres.name, themes.id, themes.name, \
    external_games.category, external_games.uid";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbGame {
    pub id: i64,
    pub name: String,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub rating_count: Option<i64>,

    #[serde(default)]
    pub aggregated_rating: Option<f64>,

    #[serde(default)]
    pub aggregated_rating_count: Option<i64>,

    #[serde(default)]
    pub total_rating: Option<f64>,

    #[serde(default)]
    pub total_rating_count: Option<i64>,

    /// Unix timestamp.
    #[serde(default)]
    pub first_release_date: Option<i64>,

    #[serde(default)]
    pub cover: Option<IgdbImage>,

    #[serde(default)]
    pub screenshots: Vec<IgdbImage>,

    #[serde(default)]
    pub genres: Vec<IgdbGenre>,

    #[serde(default)]
    pub themes: Vec<IgdbTheme>,

    #[serde(default)]
    pub external_games: Vec<IgdbExternalGame>,
}

impl IgdbGame {
    pub fn release_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.first_release_date
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|date| date.year())
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbImage {
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbGenre {
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbTheme {
    #[serde(default)]
    pub id: i64,

    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbExternalGame {
    #[serde(default)]
    pub category: i64,

    #[serde(default)]
    pub uid: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbPopularityPrimitive {
    pub game_id: i64,
    pub popularity_type: i64,
    pub value: f64,
}
