mod depot_update;
mod game_row;
mod group;
mod igdb_binding;
mod job;
mod label;
mod news;
mod pics_data;
mod popularity;
mod raw_game;
mod storefront;

pub use depot_update::{DepotUpdate, UpdateKind};
pub use game_row::GameRow;
pub use group::{GameGroup, StoreCopy};
pub use igdb_binding::{IgdbBinding, ProtonDbSummary};
pub use job::{Job, JobStatus, JobType};
pub use label::{Label, SystemTag, SYSTEM_TAGS};
pub use news::NewsArticle;
pub use pics_data::ProductInfo;
pub use popularity::{PopularityEntry, PopularityType, POPULARITY_TYPES};
pub use raw_game::RawGame;
pub use storefront::Storefront;
