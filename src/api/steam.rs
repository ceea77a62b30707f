use async_trait::async_trait;
use futures::future::join_all;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::util::RateLimiter;
use crate::Status;

/// At most five review fetches in flight, 200ms apart on a limiter shared
/// across the workers.
const REVIEW_WORKERS: usize = 5;

pub struct SteamApi {
    steam_key: String,
    steam_user_id: String,
}

impl SteamApi {
    pub fn new(steam_key: &str, steam_user_id: &str) -> SteamApi {
        SteamApi {
            steam_key: String::from(steam_key),
            steam_user_id: String::from(steam_user_id),
        }
    }

    /// Current store metadata for an app: development status plus the
    /// store-reported last modified time when present. Retries a 429 with
    /// exponential backoff (2s base, x2, three attempts).
    #[instrument(name = "steam::get_app_details", level = "info")]
    pub async fn get_app_details(steam_appid: &str) -> Result<SteamAppData, Status> {
        let uri = format!("{STEAM_STORE_HOST}/api/appdetails?appids={steam_appid}&l=english");

        let mut attempt = 0;
        let resp = loop {
            let resp = client()?.get(&uri).send().await?;
            match resp.status() {
                StatusCode::TOO_MANY_REQUESTS if attempt < 2 => {
                    let delay = Duration::from_secs(2 * 2u64.pow(attempt));
                    attempt += 1;
                    sleep(delay).await;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(Status::rate_limited(format!(
                        "Steam /appdetails for {steam_appid}"
                    )))
                }
                _ => break resp,
            }
        };

        let text = resp.text().await?;
        let mut parsed = serde_json::from_str::<
            std::collections::HashMap<String, SteamAppDetailsResponse>,
        >(&text)
        .map_err(|e| {
            Status::parse(format!(
                "Steam /appdetails?appids={steam_appid} parse error: {e} in response: {text}"
            ))
        })?;

        match parsed.remove(steam_appid) {
            Some(entry) if entry.success => Ok(entry.data),
            _ => Err(Status::not_found(format!(
                "Steam app {steam_appid} has no store details"
            ))),
        }
    }

    /// News items for an app from the Steam news API. No semantic filtering
    /// here; classification is left to callers.
    #[instrument(name = "steam::get_app_news", level = "info")]
    pub async fn get_app_news(steam_appid: &str, count: usize) -> Result<Vec<SteamNewsItem>, Status> {
        let uri = format!(
            "{STEAM_API_HOST}{STEAM_GETNEWSFORAPP_SERVICE}?appid={steam_appid}&count={count}&format=json"
        );

        let resp = client()?.get(&uri).send().await?;
        if resp.status() == StatusCode::FORBIDDEN {
            return Err(Status::rate_limited(format!(
                "Steam news for {steam_appid}"
            )));
        }

        let text = resp.text().await?;
        let resp = serde_json::from_str::<SteamAppNewsResponse>(&text).map_err(|e| {
            Status::parse(format!(
                "Steam /GetNewsForApp/{steam_appid} parse error: {e} in response: {text}"
            ))
        })?;

        Ok(resp.appnews.newsitems)
    }

    async fn get_review_score(
        limiter: &RateLimiter,
        steam_appid: i64,
    ) -> Result<Option<ReviewScore>, Status> {
        limiter.wait().await;

        let uri = format!(
            "{STEAM_STORE_HOST}/appreviews/{steam_appid}?json=1&language=all&purchase_type=all"
        );
        let resp = client()?.get(&uri).send().await?;
        let text = resp.text().await?;
        let resp = serde_json::from_str::<SteamAppReviewsResponse>(&text).map_err(|e| {
            Status::parse(format!(
                "Steam /appreviews/{steam_appid} parse error: {e} in response: {text}"
            ))
        })?;

        let summary = resp.query_summary;
        let total = summary.total_positive + summary.total_negative;
        if total == 0 {
            return Ok(None);
        }

        Ok(Some(ReviewScore {
            review_score: (summary.total_positive as f64 / total as f64 * 1000.0).round() / 10.0,
            review_desc: summary.review_score_desc,
            total_reviews: total as i64,
        }))
    }
}

#[async_trait]
impl Storefront for SteamApi {
    fn id() -> String {
        String::from("steam")
    }

    #[instrument(name = "steam::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        if self.steam_key.is_empty() || self.steam_user_id.is_empty() {
            return Err(Status::not_configured("Steam credentials are missing"));
        }

        let uri = format!(
            "{STEAM_API_HOST}{STEAM_GETOWNEDGAMES_SERVICE}?key={}&steamid={}&include_appinfo=true&include_played_free_games=true&format=json",
            self.steam_key, self.steam_user_id
        );

        let resp = client()?.get(&uri).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            return Err(Status::auth_expired("Steam API key was rejected"));
        }
        let resp = resp.json::<SteamResponse>().await?;
        info!("steam games: {}", resp.response.game_count);

        // Review-score enrichment pass; a failed fetch degrades to the bare
        // record.
        let limiter = Arc::new(RateLimiter::new(
            REVIEW_WORKERS,
            Duration::from_secs(1),
            Duration::from_millis(200),
        ));
        let permits = Arc::new(Semaphore::new(REVIEW_WORKERS));

        let mut handles = vec![];
        for entry in resp.response.games {
            let limiter = Arc::clone(&limiter);
            let permits = Arc::clone(&permits);
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire().await;
                let reviews = match SteamApi::get_review_score(&limiter, entry.appid).await {
                    Ok(reviews) => reviews,
                    Err(e) => {
                        error!("Failed to fetch reviews for appid {}: {e}", entry.appid);
                        None
                    }
                };
                raw_game(entry, reviews)
            }));
        }

        Ok(join_all(handles)
            .await
            .into_iter()
            .filter_map(|handle| handle.ok())
            .collect())
    }
}

fn raw_game(entry: OwnedGame, reviews: Option<ReviewScore>) -> RawGame {
    let cover_image = match entry.img_icon_url.is_empty() {
        true => None,
        false => Some(format!(
            "https://media.steampowered.com/steamcommunity/public/images/apps/{}/{}.jpg",
            entry.appid, entry.img_icon_url
        )),
    };

    RawGame {
        playtime_hours: Some((entry.playtime_forever as f64 / 60.0 * 10.0).round() / 10.0),
        cover_image,
        review_score: reviews.as_ref().map(|r| r.review_score),
        review_desc: reviews.as_ref().map(|r| r.review_desc.clone()),
        total_reviews: reviews.as_ref().map(|r| r.total_reviews),
        extra_data: serde_json::to_value(&entry).ok(),
        ..RawGame::new(&entry.name, "steam", &entry.appid.to_string())
    }
}

fn client() -> Result<reqwest::Client, Status> {
    reqwest::Client::builder()
        .user_agent(crate::api::USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(Status::from)
}

#[derive(Debug, Serialize, Deserialize)]
struct SteamResponse {
    response: GetOwnedGamesResponse,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetOwnedGamesResponse {
    #[serde(default)]
    game_count: usize,

    #[serde(default)]
    games: Vec<OwnedGame>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OwnedGame {
    appid: i64,
    name: String,

    #[serde(default)]
    playtime_forever: i64,

    #[serde(default)]
    img_icon_url: String,
}

#[derive(Debug, Clone)]
struct ReviewScore {
    review_score: f64,
    review_desc: String,
    total_reviews: i64,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct SteamAppDetailsResponse {
    success: bool,

    #[serde(default)]
    data: SteamAppData,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct SteamAppData {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steam_appid: Option<i64>,

    #[serde(default)]
    pub last_modified: Option<i64>,

    #[serde(default)]
    pub categories: Vec<SteamCategory>,
}

impl SteamAppData {
    /// Steam category id 29 marks Early Access.
    pub fn development_status(&self) -> &'static str {
        match self.categories.iter().any(|category| category.id == 29) {
            true => "early_access",
            false => "released",
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct SteamCategory {
    pub id: i64,

    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct SteamAppReviewsResponse {
    #[serde(default)]
    query_summary: SteamAppReviewsQuerySummary,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct SteamAppReviewsQuerySummary {
    #[serde(default)]
    review_score: u64,

    #[serde(default)]
    review_score_desc: String,

    #[serde(default)]
    total_positive: u64,

    #[serde(default)]
    total_negative: u64,

    #[serde(default)]
    total_reviews: u64,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct SteamAppNewsResponse {
    appnews: SteamAppNews,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct SteamAppNews {
    #[serde(default)]
    appid: u64,

    #[serde(default)]
    newsitems: Vec<SteamNewsItem>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct SteamNewsItem {
    #[serde(default)]
    pub gid: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub contents: String,

    #[serde(default)]
    pub feedname: String,

    /// Unix timestamp.
    #[serde(default)]
    pub date: i64,
}

const STEAM_API_HOST: &str = "https://api.steampowered.com";
const STEAM_STORE_HOST: &str = "https://store.steampowered.com";
const STEAM_GETOWNEDGAMES_SERVICE: &str = "/IPlayerService/GetOwnedGames/v0001/";
const STEAM_GETNEWSFORAPP_SERVICE: &str = "/ISteamNews/GetNewsForApp/v0002/";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_access_detected_from_category_29() {
        let data = SteamAppData {
            categories: vec![
                SteamCategory {
                    id: 2,
                    description: "Single-player".to_owned(),
                },
                SteamCategory {
                    id: 29,
                    description: "Early Access".to_owned(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(data.development_status(), "early_access");

        let data = SteamAppData::default();
        assert_eq!(data.development_status(), "released");
    }

    #[test]
    fn playtime_minutes_round_to_one_decimal_of_hours() {
        let entry = OwnedGame {
            appid: 620,
            name: "Portal 2".to_owned(),
            playtime_forever: 481,
            img_icon_url: String::new(),
        };
        let game = raw_game(entry, None);
        assert_eq!(game.playtime_hours, Some(8.0));
        assert!(game.cover_image.is_none());
        assert_eq!(game.store_id, "620");
    }

    #[test]
    fn review_fields_flow_into_record() {
        let entry = OwnedGame {
            appid: 620,
            name: "Portal 2".to_owned(),
            playtime_forever: 0,
            img_icon_url: "abcd".to_owned(),
        };
        let game = raw_game(
            entry,
            Some(ReviewScore {
                review_score: 97.3,
                review_desc: "Overwhelmingly Positive".to_owned(),
                total_reviews: 120000,
            }),
        );
        assert_eq!(game.review_score, Some(97.3));
        assert_eq!(game.review_desc.as_deref(), Some("Overwhelmingly Positive"));
        assert!(game.cover_image.unwrap().contains("/620/abcd.jpg"));
    }
}
