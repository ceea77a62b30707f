use serde::{Deserialize, Serialize};

/// IGDB-derived columns written onto a game row by the matcher/enricher.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct IgdbBinding {
    pub igdb_id: i64,
    pub slug: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub aggregated_rating: Option<f64>,
    pub aggregated_rating_count: Option<i64>,
    pub total_rating: Option<f64>,
    pub total_rating_count: Option<i64>,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    /// First five screenshots, large-CDN urls.
    pub screenshots: Vec<String>,
    pub nsfw: bool,
    pub steam_app_id: Option<String>,
    /// IGDB genres and themes, merged downstream with local genres.
    pub genres: Vec<String>,
}

/// ProtonDB compatibility summary for a Steam AppID.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct ProtonDbSummary {
    pub tier: String,
    pub score: Option<f64>,
    pub confidence: Option<String>,
    pub total: Option<i64>,
    pub trending_tier: Option<String>,
}
