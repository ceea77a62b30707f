use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default, Debug, Clone, sqlx::FromRow)]
pub struct Label {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub label_type: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub system: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Closed set of playtime buckets the auto-tag engine maintains. Lower bound
/// inclusive, upper bound exclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTag {
    NeverLaunched,
    JustTried,
    Played,
    WellPlayed,
    HeavilyPlayed,
}

pub const SYSTEM_TAGS: [SystemTag; 5] = [
    SystemTag::NeverLaunched,
    SystemTag::JustTried,
    SystemTag::Played,
    SystemTag::WellPlayed,
    SystemTag::HeavilyPlayed,
];

impl SystemTag {
    pub fn name(&self) -> &'static str {
        match self {
            SystemTag::NeverLaunched => "Never Launched",
            SystemTag::JustTried => "Just Tried",
            SystemTag::Played => "Played",
            SystemTag::WellPlayed => "Well Played",
            SystemTag::HeavilyPlayed => "Heavily Played",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SystemTag::NeverLaunched => "🎮",
            SystemTag::JustTried => "👀",
            SystemTag::Played => "🎯",
            SystemTag::WellPlayed => "⭐",
            SystemTag::HeavilyPlayed => "🏆",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            SystemTag::NeverLaunched => "#64748b",
            SystemTag::JustTried => "#f59e0b",
            SystemTag::Played => "#3b82f6",
            SystemTag::WellPlayed => "#8b5cf6",
            SystemTag::HeavilyPlayed => "#10b981",
        }
    }

    pub fn bucket_for(playtime_hours: f64) -> SystemTag {
        match playtime_hours {
            h if h <= 0.0 => SystemTag::NeverLaunched,
            h if h < 2.0 => SystemTag::JustTried,
            h if h < 10.0 => SystemTag::Played,
            h if h < 50.0 => SystemTag::WellPlayed,
            _ => SystemTag::HeavilyPlayed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_match_playtime_table() {
        assert_eq!(SystemTag::bucket_for(0.0), SystemTag::NeverLaunched);
        assert_eq!(SystemTag::bucket_for(0.5), SystemTag::JustTried);
        assert_eq!(SystemTag::bucket_for(1.9), SystemTag::JustTried);
        assert_eq!(SystemTag::bucket_for(5.0), SystemTag::Played);
        assert_eq!(SystemTag::bucket_for(25.0), SystemTag::WellPlayed);
        assert_eq!(SystemTag::bucket_for(50.0), SystemTag::HeavilyPlayed);
        assert_eq!(SystemTag::bucket_for(300.0), SystemTag::HeavilyPlayed);
    }

    #[test]
    fn boundary_values_fall_to_higher_bucket() {
        // Upper edges are exclusive: exactly 2h is Played, not Just Tried.
        assert_eq!(SystemTag::bucket_for(2.0), SystemTag::Played);
        assert_eq!(SystemTag::bucket_for(10.0), SystemTag::WellPlayed);
    }
}
