mod amazon;
mod battlenet;
mod common;
mod ea;
mod epic;
mod gog;
mod humble;
mod igdb;
mod itch;
mod metacritic;
mod protondb;
mod steam;

pub use amazon::{AmazonApi, AmazonTokens};
pub use battlenet::BattlenetApi;
pub use common::TitleNormalizer;
pub use ea::EaApi;
pub use epic::EpicApi;
pub use gog::GogDbApi;
pub use humble::HumbleApi;
pub use igdb::{binding_from, merge_genres, IgdbApi, IgdbConnection, IgdbGame};
pub use itch::ItchApi;
pub use metacritic::{MetacriticApi, MetacriticData};
pub use protondb::ProtonDbApi;
pub use steam::{SteamApi, SteamAppData, SteamNewsItem};

/// User-Agent sent on every outgoing storefront request.
pub const USER_AGENT: &str = "Ludex/1.0 (Game Library Aggregator)";
