use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

/// Humble has no public API; the adapter replays the session cookie against
/// the order endpoints the web library itself uses.
pub struct HumbleApi {
    session_cookie: String,
}

impl HumbleApi {
    pub fn new(session_cookie: &str) -> HumbleApi {
        HumbleApi {
            session_cookie: String::from(session_cookie),
        }
    }

    fn client(&self) -> Result<reqwest::Client, Status> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::COOKIE,
            format!("_simpleauth_sess={}", self.session_cookie)
                .parse()
                .map_err(|_| Status::invalid_argument("Humble session cookie is malformed"))?,
        );

        Ok(reqwest::Client::builder()
            .user_agent(crate::api::USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?)
    }
}

#[async_trait]
impl Storefront for HumbleApi {
    fn id() -> String {
        String::from("humble")
    }

    #[instrument(name = "humble::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        if self.session_cookie.is_empty() {
            return Err(Status::not_configured("Humble session cookie is missing"));
        }

        let client = self.client()?;

        let resp = client
            .get(format!("{HUMBLE_HOST}/api/v1/user/order"))
            .send()
            .await?;
        if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 {
            return Err(Status::auth_expired("Humble session cookie was rejected"));
        }
        let order_keys = resp.json::<Vec<OrderKey>>().await?;

        // One request per gamekey; orders paginate implicitly through the
        // key list.
        let mut games: Vec<RawGame> = vec![];
        for chunk in order_keys.chunks(40) {
            let keys = chunk.iter().map(|order| order.gamekey.as_str()).collect_vec();
            let query = keys
                .iter()
                .map(|key| format!("gamekeys={key}"))
                .join("&");

            let orders = client
                .get(format!("{HUMBLE_HOST}/api/v1/orders?all_tpkds=true&{query}"))
                .send()
                .await?
                .json::<HashMap<String, Order>>()
                .await?;

            for (gamekey, order) in orders {
                for product in order.subproducts {
                    // Only entries with game downloads; skip soundtracks and
                    // ebooks bundled alongside.
                    let has_game_download = product
                        .downloads
                        .iter()
                        .any(|download| download.platform != "ebook" && download.platform != "audio");
                    if !has_game_download {
                        continue;
                    }

                    let extra_data = serde_json::json!({
                        "gamekey": gamekey.clone(),
                        "machine_name": product.machine_name.clone(),
                    });
                    games.push(RawGame {
                        cover_image: product.icon,
                        extra_data: Some(extra_data),
                        ..RawGame::new(&product.human_name, "humble", &product.machine_name)
                    });
                }
            }
        }

        info!("humble games: {}", games.len());
        Ok(games)
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct OrderKey {
    gamekey: String,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct Order {
    #[serde(default)]
    subproducts: Vec<Subproduct>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct Subproduct {
    machine_name: String,
    human_name: String,

    #[serde(default)]
    icon: Option<String>,

    #[serde(default)]
    downloads: Vec<Download>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct Download {
    #[serde(default)]
    platform: String,
}

const HUMBLE_HOST: &str = "https://www.humblebundle.com";

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_cookie_is_not_configured() {
        let api = HumbleApi::new("");
        assert!(matches!(
            api.get_owned_games().await,
            Err(Status::NotConfigured(_))
        ));
    }

    #[test]
    fn order_payload_parses() {
        let payload = r#"{
            "subproducts": [
                {
                    "machine_name": "hollowknight",
                    "human_name": "Hollow Knight",
                    "icon": "https://hb.imgix.net/hollowknight.png",
                    "downloads": [{"platform": "windows"}, {"platform": "linux"}]
                },
                {
                    "machine_name": "hollowknight_soundtrack",
                    "human_name": "Hollow Knight OST",
                    "downloads": [{"platform": "audio"}]
                }
            ]
        }"#;

        let order: Order = serde_json::from_str(payload).unwrap();
        assert_eq!(order.subproducts.len(), 2);
        let game_downloads = order.subproducts[0]
            .downloads
            .iter()
            .filter(|d| d.platform != "audio" && d.platform != "ebook")
            .count();
        assert_eq!(game_downloads, 2);
    }
}
