mod backend;
mod connection;
mod docs;
mod ranking;
mod service;

pub use connection::IgdbConnection;
pub use docs::IgdbGame;
pub use service::{binding_from, merge_genres, IgdbApi};
