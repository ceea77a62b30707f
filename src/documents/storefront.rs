use async_trait::async_trait;

use super::RawGame;
use crate::Status;

/// One implementation per storefront. Adapters never write to the library;
/// they only report the remote catalog.
#[async_trait]
pub trait Storefront {
    fn id() -> String;

    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status>;
}
