use serde::{Deserialize, Serialize};

use super::GameRow;

/// Display unit of the query layer: one IGDB id (or one storeless row) plus
/// its storefront copies.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct GameGroup {
    pub primary: GameRow,
    pub stores: Vec<String>,
    pub game_ids: Vec<i64>,
    pub copies: Vec<StoreCopy>,
    pub is_streaming: bool,
    pub has_non_streaming: bool,
    pub only_streaming: bool,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct StoreCopy {
    pub store: String,
    pub game: GameRow,
}
