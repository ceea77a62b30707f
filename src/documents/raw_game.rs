use serde::{Deserialize, Serialize};

/// Normalized shape of a single owned title as reported by a storefront.
///
/// Adapters produce these; committing them to the library is the importer's
/// job. `store_id` is synthesized from the title for storefronts that do not
/// expose a stable identifier.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct RawGame {
    pub name: String,
    pub store: String,
    pub store_id: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playtime_hours: Option<f64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub developers: Vec<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub publishers: Vec<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_score: Option<f64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_desc: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_reviews: Option<i64>,

    /// Opaque store payload preserved verbatim for later re-parsing.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,

    /// Cloud-playable title rather than an owned copy.
    #[serde(default)]
    pub is_streaming: bool,
}

impl RawGame {
    pub fn new(name: &str, store: &str, store_id: &str) -> Self {
        RawGame {
            name: String::from(name),
            store: String::from(store),
            store_id: String::from(store_id),
            ..Default::default()
        }
    }
}
