use serde::{Deserialize, Serialize};

/// Append-only update history row. `manifest_id` carries the discriminator
/// tag rather than a real Steam manifest.
#[derive(Serialize, Deserialize, Default, Debug, Clone, sqlx::FromRow)]
pub struct DepotUpdate {
    pub id: i64,
    pub game_id: i64,
    pub depot_id: Option<String>,
    pub manifest_id: Option<String>,
    pub update_timestamp: Option<String>,
    pub fetched_at: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    InitialVersion,
    VersionUpdate,
    EaRelease,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::InitialVersion => "initial_version",
            UpdateKind::VersionUpdate => "version_update",
            UpdateKind::EaRelease => "ea_release",
        }
    }
}
