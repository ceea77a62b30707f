use serde::{Deserialize, Serialize};

/// A row of the `game_news` table. `url` is globally unique; re-ingesting the
/// same url updates the row in place.
#[derive(Serialize, Deserialize, Default, Debug, Clone, sqlx::FromRow)]
pub struct NewsArticle {
    pub id: i64,
    pub game_id: i64,
    pub title: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<String>,
    pub fetched_at: Option<String>,
}
