use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

pub struct ItchApi {
    api_key: String,
}

impl ItchApi {
    pub fn new(api_key: &str) -> ItchApi {
        ItchApi {
            api_key: String::from(api_key),
        }
    }
}

#[async_trait]
impl Storefront for ItchApi {
    fn id() -> String {
        String::from("itch")
    }

    #[instrument(name = "itch::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        if self.api_key.is_empty() {
            return Err(Status::not_configured("itch.io API key is missing"));
        }

        let client = reqwest::Client::builder()
            .user_agent(crate::api::USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        let mut games = vec![];
        for page in 1.. {
            let uri = format!("{ITCH_API_HOST}/profile/owned-keys?page={page}");
            let resp = client
                .get(&uri)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .send()
                .await?;

            if resp.status().as_u16() == 401 {
                return Err(Status::auth_expired("itch.io API key was rejected"));
            }

            let page_resp = resp.json::<OwnedKeysResponse>().await?;
            if page_resp.owned_keys.is_empty() {
                break;
            }

            games.extend(page_resp.owned_keys.into_iter().map(|key| {
                let extra_data = serde_json::json!({
                    "url": key.game.url,
                    "short_text": key.game.short_text,
                });
                RawGame {
                    cover_image: key.game.cover_url,
                    extra_data: Some(extra_data),
                    ..RawGame::new(&key.game.title, "itch", &key.game.id.to_string())
                }
            }));
        }

        info!("itch games: {}", games.len());
        Ok(games)
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct OwnedKeysResponse {
    #[serde(default)]
    owned_keys: Vec<OwnedKey>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct OwnedKey {
    game: ItchGame,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct ItchGame {
    id: i64,
    title: String,

    #[serde(default)]
    url: Option<String>,

    #[serde(default)]
    cover_url: Option<String>,

    #[serde(default)]
    short_text: Option<String>,
}

const ITCH_API_HOST: &str = "https://api.itch.io";

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let api = ItchApi::new("");
        let result = api.get_owned_games().await;
        assert!(matches!(result, Err(Status::NotConfigured(_))));
    }

    #[test]
    fn owned_key_payload_parses() {
        let payload = r#"{"owned_keys": [{"game": {
            "id": 1234, "title": "Celeste", "url": "https://maddymakesgames.itch.io/celeste",
            "cover_url": "https://img.itch.zone/celeste.png", "short_text": "Climb the mountain."
        }}]}"#;

        let parsed: OwnedKeysResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.owned_keys.len(), 1);
        assert_eq!(parsed.owned_keys[0].game.title, "Celeste");
    }
}
