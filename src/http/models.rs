use serde::{Deserialize, Serialize};

/// Library/discover query string. List-valued params arrive comma-separated.
#[derive(Deserialize, Default, Debug)]
pub struct LibraryQuery {
    #[serde(default)]
    pub stores: Option<String>,

    #[serde(default)]
    pub genres: Option<String>,

    #[serde(default)]
    pub queries: Option<String>,

    #[serde(default)]
    pub search: Option<String>,
}

impl LibraryQuery {
    pub fn stores(&self) -> Vec<String> {
        split_csv(&self.stores)
    }

    pub fn genres(&self) -> Vec<String> {
        split_csv(&self.genres)
    }

    pub fn queries(&self) -> Vec<String> {
        split_csv(&self.queries)
    }
}

fn split_csv(value: &Option<String>) -> Vec<String> {
    match value {
        Some(value) if !value.is_empty() => value.split(',').map(|s| s.trim().to_owned()).collect(),
        _ => vec![],
    }
}

#[derive(Deserialize, Debug)]
pub struct UpdateIgdb {
    pub igdb_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateHidden {
    pub hidden: bool,
}

#[derive(Deserialize, Debug)]
pub struct UpdateNsfw {
    pub nsfw: bool,
}

#[derive(Deserialize, Debug)]
pub struct UpdateCoverOverride {
    pub cover_url_override: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateMetacritic {
    pub metacritic_slug: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateProtonDb {
    pub steam_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdatePriority {
    pub priority: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdatePersonalRating {
    pub rating: i64,
}

#[derive(Deserialize, Debug)]
pub struct BulkGameIds {
    pub game_ids: Vec<i64>,
}

#[derive(Deserialize, Debug)]
pub struct BulkAddToCollection {
    pub game_ids: Vec<i64>,
    pub collection_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct SyncOptions {
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize, Debug)]
pub struct SettingsUpdate {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Debug)]
pub struct JobStarted {
    pub success: bool,
    pub job_id: String,
}

#[derive(Serialize, Debug)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_params_split_and_trim() {
        let query = LibraryQuery {
            stores: Some("steam, gog".to_owned()),
            genres: None,
            queries: Some("".to_owned()),
            search: None,
        };
        assert_eq!(query.stores(), vec!["steam", "gog"]);
        assert!(query.genres().is_empty());
        assert!(query.queries().is_empty());
    }
}
