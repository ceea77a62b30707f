use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

const GRAPHQL_ENDPOINT: &str = "https://service-aggregation-layer.juno.ea.com/graphql";

// Persisted query hash for getPreloadedOwnedGames.
const QUERY_HASH: &str = "5de4178ee7e1f084ce9deca856c74a9e03547a67dfafc0cb844d532fb54ae73d";

const PAGE_LIMIT: usize = 200;

/// EA's aggregation layer, queried with a persisted GraphQL hash and a
/// user-supplied bearer token.
pub struct EaApi {
    bearer_token: String,
}

impl EaApi {
    pub fn new(bearer_token: &str) -> EaApi {
        // Tolerate a pasted "Bearer xxx" value.
        let token = bearer_token.trim();
        let token = match token.to_lowercase().starts_with("bearer ") {
            true => token[7..].trim(),
            false => token,
        };
        EaApi {
            bearer_token: String::from(token),
        }
    }
}

#[async_trait]
impl Storefront for EaApi {
    fn id() -> String {
        String::from("ea")
    }

    #[instrument(name = "ea::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        if self.bearer_token.is_empty() {
            return Err(Status::not_configured("EA bearer token is missing"));
        }

        let client = reqwest::Client::builder()
            .user_agent(crate::api::USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        let mut games = vec![];
        let mut next_offset: Option<String> = None;

        loop {
            let mut variables = json!({
                "isMac": false,
                "addFieldsToPreloadGames": true,
                "locale": "en-US",
                "limit": PAGE_LIMIT,
                "type": ["DIGITAL_FULL_GAME", "PACKAGED_FULL_GAME"],
                "entitlementEnabled": true,
                "storefronts": ["EA"],
                "platforms": ["PC"],
            });
            if let Some(offset) = &next_offset {
                variables["next"] = json!(offset);
            }

            let payload = json!({
                "operationName": "getPreloadedOwnedGames",
                "variables": variables,
                "extensions": {
                    "persistedQuery": {"version": 1, "sha256Hash": QUERY_HASH}
                }
            });

            let resp = client
                .post(GRAPHQL_ENDPOINT)
                .header("Authorization", format!("Bearer {}", self.bearer_token))
                .json(&payload)
                .send()
                .await?;

            match resp.status().as_u16() {
                200 => {}
                401 => return Err(Status::auth_expired("EA bearer token expired")),
                code => return Err(Status::network(format!("EA GraphQL returned {code}"))),
            }

            let data = resp.json::<serde_json::Value>().await?;
            if data.get("errors").is_some() {
                return Err(Status::parse(format!("EA GraphQL errors: {}", data["errors"])));
            }

            let preloaded = &data["data"]["me"]["preloadedOwnedGames"];
            let items = preloaded["items"].as_array().cloned().unwrap_or_default();
            let item_count = items.len();

            for item in items {
                if let Some(game) = raw_game(&item) {
                    games.push(game);
                }
            }

            // Cursor-based pagination.
            next_offset = preloaded["next"].as_str().map(|n| n.to_owned());
            if next_offset.is_none() || item_count < PAGE_LIMIT {
                break;
            }
        }

        // Offers repeat across storefront variants.
        let mut seen: HashSet<String> = HashSet::new();
        games.retain(|game| seen.insert(game.store_id.clone()));

        info!("ea games: {}", games.len());
        Ok(games)
    }
}

fn raw_game(item: &serde_json::Value) -> Option<RawGame> {
    let product = &item["product"];
    let base_item = &product["baseItem"];

    let name = product["name"]
        .as_str()
        .or_else(|| base_item["title"].as_str())?;
    let offer_id = item["originOfferId"].as_str().or_else(|| item["id"].as_str())?;
    let game_slug = product["gameSlug"]
        .as_str()
        .or_else(|| base_item["baseGameSlug"].as_str());

    let cover_image = game_slug.map(|slug| {
        format!("https://media.contentapi.ea.com/content/dam/eacom/en-us/common/games/{slug}/packart.jpg")
    });

    let release_date = product["lifecycleStatus"]
        .as_array()
        .and_then(|lifecycle| lifecycle.first())
        .and_then(|status| status["playableStartDate"].as_str())
        .map(|date| date.to_owned());

    Some(RawGame {
        cover_image,
        release_date,
        extra_data: Some(item.clone()),
        ..RawGame::new(name, "ea", offer_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_not_configured() {
        let api = EaApi::new("");
        assert!(matches!(
            api.get_owned_games().await,
            Err(Status::NotConfigured(_))
        ));
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        let api = EaApi::new("Bearer QVQxOmV4YW1wbGU");
        assert_eq!(api.bearer_token, "QVQxOmV4YW1wbGU");
    }

    #[test]
    fn item_payload_parses_into_record() {
        let item = json!({
            "originOfferId": "Origin.OFR.50.0001456",
            "product": {
                "name": "Titanfall 2",
                "gameSlug": "titanfall-2",
                "baseItem": {"title": "Titanfall 2", "gameType": "BASE_GAME"},
                "lifecycleStatus": [{"playableStartDate": "2016-10-28"}]
            }
        });

        let game = raw_game(&item).unwrap();
        assert_eq!(game.name, "Titanfall 2");
        assert_eq!(game.store_id, "Origin.OFR.50.0001456");
        assert_eq!(game.release_date.as_deref(), Some("2016-10-28"));
        assert!(game.cover_image.unwrap().contains("titanfall-2"));
    }

    #[test]
    fn item_without_name_is_skipped() {
        assert!(raw_game(&json!({"originOfferId": "x", "product": {}})).is_none());
    }
}
