use serde::{Deserialize, Serialize};

/// IGDB popularity primitive sources.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopularityType {
    IgdbVisits,
    IgdbWantToPlay,
    IgdbPlaying,
    IgdbPlayed,
    SteamPeak24h,
    SteamPositiveReviews,
}

pub const POPULARITY_TYPES: [PopularityType; 6] = [
    PopularityType::IgdbVisits,
    PopularityType::IgdbWantToPlay,
    PopularityType::IgdbPlaying,
    PopularityType::IgdbPlayed,
    PopularityType::SteamPeak24h,
    PopularityType::SteamPositiveReviews,
];

impl PopularityType {
    /// IGDB `popularity_type` id on the popularity_primitives endpoint.
    pub fn igdb_id(&self) -> i64 {
        match self {
            PopularityType::IgdbVisits => 1,
            PopularityType::IgdbWantToPlay => 2,
            PopularityType::IgdbPlaying => 3,
            PopularityType::IgdbPlayed => 4,
            PopularityType::SteamPeak24h => 5,
            PopularityType::SteamPositiveReviews => 6,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            PopularityType::IgdbVisits => "igdb_visits",
            PopularityType::IgdbWantToPlay => "want_to_play",
            PopularityType::IgdbPlaying => "playing",
            PopularityType::IgdbPlayed => "played",
            PopularityType::SteamPeak24h => "steam_peak_24h",
            PopularityType::SteamPositiveReviews => "steam_positive_reviews",
        }
    }

    pub fn from_igdb_id(id: i64) -> Option<PopularityType> {
        match id {
            1 => Some(PopularityType::IgdbVisits),
            2 => Some(PopularityType::IgdbWantToPlay),
            3 => Some(PopularityType::IgdbPlaying),
            4 => Some(PopularityType::IgdbPlayed),
            5 => Some(PopularityType::SteamPeak24h),
            6 => Some(PopularityType::SteamPositiveReviews),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct PopularityEntry {
    pub igdb_id: i64,
    pub popularity_type: i64,
    pub value: f64,
}
