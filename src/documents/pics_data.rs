use serde::{Deserialize, Serialize};

/// Per-app record returned by the Steam product-info session.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct ProductInfo {
    pub app_id: u32,
    pub change_number: u64,

    /// Unix timestamp of the observed change.
    pub last_change: i64,

    /// Steam Deck compatibility category: 1=Verified, 2=Playable,
    /// 3=Unsupported.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_deck_category: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_score: Option<u64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_percentage: Option<u64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<i64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_support: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub languages_with_audio: Vec<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub languages_subtitles_only: Vec<String>,
}
