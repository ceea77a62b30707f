use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

/// Battle.net account API, replayed with the browser session cookie. Modern
/// and classic catalogs are fetched separately and merged.
pub struct BattlenetApi {
    session_cookie: String,
}

impl BattlenetApi {
    pub fn new(session_cookie: &str) -> BattlenetApi {
        BattlenetApi {
            session_cookie: String::from(session_cookie),
        }
    }

    fn client(&self) -> Result<reqwest::Client, Status> {
        // The setting either holds a full browser Cookie header or a bare
        // access_token value.
        let cookie = match self.session_cookie.contains(';') || self.session_cookie.contains('=') {
            true => self.session_cookie.clone(),
            false => format!("access_token={}", self.session_cookie),
        };

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::COOKIE,
            cookie
                .parse()
                .map_err(|_| Status::invalid_argument("Battle.net cookie is malformed"))?,
        );

        Ok(reqwest::Client::builder()
            .user_agent(crate::api::USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?)
    }
}

#[async_trait]
impl Storefront for BattlenetApi {
    fn id() -> String {
        String::from("battlenet")
    }

    #[instrument(name = "battlenet::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        if self.session_cookie.is_empty() {
            return Err(Status::not_configured("Battle.net cookie is missing"));
        }

        let client = self.client()?;

        let modern = fetch_accounts(&client, GAMES_SUBS_ENDPOINT, "gameAccounts").await?;
        let classic = fetch_accounts(&client, CLASSIC_GAMES_ENDPOINT, "classicGames").await?;

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut games = vec![];
        for (account, is_classic) in modern
            .into_iter()
            .map(|a| (a, false))
            .chain(classic.into_iter().map(|a| (a, true)))
        {
            let name = match account.display_name() {
                Some(name) => name.to_owned(),
                None => continue,
            };

            // Classic entries may have no title id; synthesize one from the
            // name so the record round-trips.
            let store_id = match &account.title_id {
                Some(title_id) => title_id.to_string(),
                None => name
                    .to_lowercase()
                    .replace([' ', '-'], "_")
                    .replace(':', ""),
            };
            if !seen_ids.insert(store_id.clone()) {
                continue;
            }

            let cover_image = account.icon_filename().map(|icon| {
                format!("{BATTLENET_ICON_CDN}/{icon}")
            });

            let mut extra_data = serde_json::to_value(&account).unwrap_or_default();
            if is_classic {
                extra_data["is_classic"] = serde_json::Value::Bool(true);
            }

            games.push(RawGame {
                cover_image,
                extra_data: Some(extra_data),
                ..RawGame::new(&name, "battlenet", &store_id)
            });
        }

        info!("battlenet games: {}", games.len());
        Ok(games)
    }
}

async fn fetch_accounts(
    client: &reqwest::Client,
    endpoint: &str,
    key: &str,
) -> Result<Vec<GameAccount>, Status> {
    let resp = client.get(endpoint).send().await?;
    match resp.status().as_u16() {
        401 | 403 => return Err(Status::auth_expired("Battle.net cookie was rejected")),
        200 => {}
        code => return Err(Status::network(format!("Battle.net returned {code}"))),
    }

    // The endpoint answers either a bare list or an object keyed by catalog.
    let data = resp.json::<serde_json::Value>().await?;
    let accounts = match &data {
        serde_json::Value::Array(list) => list.clone(),
        serde_json::Value::Object(map) => map
            .get(key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => vec![],
    };

    Ok(accounts
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct GameAccount {
    #[serde(default)]
    #[serde(rename = "titleId")]
    title_id: Option<i64>,

    #[serde(default)]
    #[serde(rename = "localizedGameName")]
    localized_game_name: Option<String>,

    #[serde(default)]
    #[serde(rename = "titleName")]
    title_name: Option<String>,

    #[serde(default)]
    #[serde(rename = "gameAccountName")]
    game_account_name: Option<String>,

    #[serde(default)]
    #[serde(rename = "regionalGameFranchiseIconFilename")]
    regional_icon: Option<String>,

    #[serde(default)]
    #[serde(rename = "gameIconFilename")]
    game_icon: Option<String>,

    #[serde(default)]
    region: Option<String>,
}

impl GameAccount {
    fn display_name(&self) -> Option<&str> {
        self.localized_game_name
            .as_deref()
            .or(self.title_name.as_deref())
            .or(self.game_account_name.as_deref())
    }

    fn icon_filename(&self) -> Option<&str> {
        self.regional_icon.as_deref().or(self.game_icon.as_deref())
    }
}

const GAMES_SUBS_ENDPOINT: &str = "https://account.battle.net/api/games-and-subs";
const CLASSIC_GAMES_ENDPOINT: &str = "https://account.battle.net/api/classic-games";
const BATTLENET_ICON_CDN: &str =
    "https://blzmedia-a.akamaihd.net/account/static/local-common/images/game-icons";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_name_falls_back_through_fields() {
        let account: GameAccount = serde_json::from_str(
            r#"{"titleId": 21298, "titleName": "Overwatch", "gameIconFilename": "ow.png"}"#,
        )
        .unwrap();
        assert_eq!(account.display_name(), Some("Overwatch"));
        assert_eq!(account.icon_filename(), Some("ow.png"));

        let account: GameAccount =
            serde_json::from_str(r#"{"gameAccountName": "WoW1"}"#).unwrap();
        assert_eq!(account.display_name(), Some("WoW1"));
    }

    #[tokio::test]
    async fn missing_cookie_is_not_configured() {
        let api = BattlenetApi::new("");
        assert!(matches!(
            api.get_owned_games().await,
            Err(Status::NotConfigured(_))
        ));
    }
}
