use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

// Client identity of the Amazon Games launcher; the entitlements service
// only answers requests registered under it.
const LOGIN_CLIENT_ID: &str = "device:3733646238643238366332613932346432653737653161663637373636363435234132554d56484f58375550345637";
const AUTH_CLIENT_ID: &str = "3733646238643238366332613932346432653737653161663637373636363435234132554d56484f58375550345637";
const DEVICE_TYPE: &str = "A2UMVHOX7UP4V7";
const LAUNCHER_USER_AGENT: &str = "com.amazon.agslauncher.win/3.0.9495.3";

const AMAZON_SIGNIN_URL: &str = "https://www.amazon.com/ap/signin";
const AMAZON_REGISTER_URL: &str = "https://api.amazon.com/auth/register";
const AMAZON_TOKEN_URL: &str = "https://api.amazon.com/auth/token";
const API_ENTITLEMENTS: &str = "https://gaming.amazon.com/api/distribution/entitlements";

/// Access + refresh token pair, persisted as one JSON settings value.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct AmazonTokens {
    pub access_token: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Amazon merges two sources: the launcher's local SQLite catalog (when
/// present) and the entitlements API, deduplicated by product id.
pub struct AmazonApi {
    tokens: Option<AmazonTokens>,
    local_db_path: Option<PathBuf>,
}

impl AmazonApi {
    pub fn new(tokens: Option<AmazonTokens>, local_db_path: Option<PathBuf>) -> AmazonApi {
        AmazonApi {
            tokens,
            local_db_path,
        }
    }

    /// Builds the browser sign-in URL for the OAuth device flow and the PKCE
    /// verifier that must accompany the returned authorization code.
    pub fn login_url() -> (String, String) {
        let verifier = code_verifier();
        let challenge = code_challenge(&verifier);

        let params = [
            ("openid.ns", "http://specs.openid.net/auth/2.0"),
            (
                "openid.claimed_id",
                "http://specs.openid.net/auth/2.0/identifier_select",
            ),
            (
                "openid.identity",
                "http://specs.openid.net/auth/2.0/identifier_select",
            ),
            ("openid.mode", "checkid_setup"),
            ("openid.oa2.scope", "device_auth_access"),
            ("openid.ns.oa2", "http://www.amazon.com/ap/ext/oauth/2"),
            ("openid.oa2.response_type", "code"),
            ("openid.oa2.code_challenge_method", "S256"),
            ("openid.oa2.code_challenge", &challenge),
            ("openid.oa2.client_id", LOGIN_CLIENT_ID),
            ("openid.return_to", "https://www.amazon.com/ap/maplanding"),
            ("openid.assoc_handle", "amzn_sonic_games_launcher"),
            ("pageId", "amzn_sonic_games_launcher"),
            ("language", "en_US"),
        ];

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        (format!("{AMAZON_SIGNIN_URL}?{query}"), verifier)
    }

    /// Exchanges the authorization code for a token pair via device
    /// registration.
    #[instrument(level = "info", skip(auth_code, verifier))]
    pub async fn register_device(auth_code: &str, verifier: &str) -> Result<AmazonTokens, Status> {
        let payload = serde_json::json!({
            "auth_data": {
                "use_global_authentication": false,
                "authorization_code": auth_code,
                "code_verifier": verifier,
                "code_algorithm": "SHA-256",
                "client_id": AUTH_CLIENT_ID,
                "client_domain": "DeviceLegacy",
            },
            "registration_data": {
                "app_name": "AGSLauncher for Windows",
                "app_version": "1.0.0",
                "device_model": "Windows",
                "device_serial": device_serial(),
                "device_type": DEVICE_TYPE,
                "domain": "Device",
                "os_version": "10.0.19041.0",
            },
            "requested_extensions": ["customer_info", "device_info"],
            "requested_token_type": ["bearer", "mac_dms"],
        });

        let resp = client()?
            .post(AMAZON_REGISTER_URL)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Status::auth_expired(format!(
                "Amazon device registration failed: {}",
                resp.status()
            )));
        }

        let data = resp.json::<serde_json::Value>().await?;
        let bearer = &data["response"]["success"]["tokens"]["bearer"];
        match bearer["access_token"].as_str() {
            Some(access_token) => Ok(AmazonTokens {
                access_token: access_token.to_owned(),
                refresh_token: bearer["refresh_token"].as_str().map(|t| t.to_owned()),
            }),
            None => Err(Status::parse("Amazon registration response had no tokens")),
        }
    }

    /// One automatic refresh; failure downgrades to a setup prompt.
    pub async fn refresh(refresh_token: &str) -> Result<AmazonTokens, Status> {
        let payload = serde_json::json!({
            "source_token": refresh_token,
            "source_token_type": "refresh_token",
            "requested_token_type": "access_token",
            "app_name": "AGSLauncher for Windows",
            "app_version": "1.0.0",
        });

        let resp = client()?
            .post(AMAZON_TOKEN_URL)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Status::not_configured(
                "Amazon refresh token was rejected, sign in again",
            ));
        }

        let data = resp.json::<serde_json::Value>().await?;
        match data["access_token"].as_str() {
            Some(access_token) => Ok(AmazonTokens {
                access_token: access_token.to_owned(),
                refresh_token: Some(refresh_token.to_owned()),
            }),
            None => Err(Status::parse("Amazon token response had no access_token")),
        }
    }

    async fn games_from_local_db(&self) -> Result<Vec<RawGame>, Status> {
        let path = match &self.local_db_path {
            Some(path) if path.exists() => path.clone(),
            _ => return Ok(vec![]),
        };

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .read_only(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(sqlx::Error::from)?;

        let rows = sqlx::query("SELECT Id, ProductTitle FROM DbSet")
            .fetch_all(&pool)
            .await?;
        pool.close().await;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let product_id: Option<String> = row.try_get("Id").ok();
                let title: Option<String> = row.try_get("ProductTitle").ok();
                match (product_id, title) {
                    (Some(product_id), Some(title)) if !title.is_empty() => {
                        let extra_data = serde_json::json!({
                            "source": "local_db",
                            "is_streaming": false,
                        });
                        Some(RawGame {
                            extra_data: Some(extra_data),
                            ..RawGame::new(&title, "amazon", &product_id)
                        })
                    }
                    _ => None,
                }
            })
            .collect())
    }

    async fn games_from_entitlements(&self, access_token: &str) -> Result<Vec<RawGame>, Status> {
        let client = client()?;
        let mut games = vec![];
        let mut next_token: Option<String> = None;

        loop {
            let hardware_hash = uuid::Uuid::new_v4().simple().to_string();
            let mut payload = serde_json::json!({
                "Operation": "GetEntitlements",
                "clientId": "Sonic",
                "syncPoint": 0,
                "maxResults": 500,
                "keyId": "d5dc8b8b-86c8-4fc4-ae93-18c0def5314d",
                "hardwareHash": hardware_hash,
                "productIdFilter": null,
                "disableStateFilter": true,
            });
            if let Some(token) = &next_token {
                payload["nextToken"] = serde_json::Value::String(token.clone());
            }

            let resp = client
                .post(API_ENTITLEMENTS)
                .header(
                    "X-Amz-Target",
                    "com.amazon.animusdistributionservice.entitlement.AnimusEntitlementsService.GetEntitlements",
                )
                .header("x-amzn-token", access_token)
                .header("Content-Encoding", "amz-1.0")
                .json(&payload)
                .send()
                .await?;

            match resp.status().as_u16() {
                200 => {}
                401 | 403 => return Err(Status::auth_expired("Amazon access token was rejected")),
                code => return Err(Status::network(format!("Amazon entitlements returned {code}"))),
            }

            let data = resp.json::<serde_json::Value>().await?;
            let entitlements = data["entitlements"].as_array().cloned().unwrap_or_default();

            for ent in &entitlements {
                let product = &ent["product"];
                let product_line = product["productLine"].as_str().unwrap_or_default();
                if product_line == "Twitch:FuelEntitlement" {
                    continue;
                }

                let name = match product["title"].as_str() {
                    Some(name) if !name.is_empty() => name,
                    _ => continue,
                };
                let product_id = product["id"]
                    .as_str()
                    .or_else(|| product["asin"].as_str())
                    .unwrap_or_default();
                if product_id.is_empty() {
                    continue;
                }

                let is_streaming =
                    product_line.contains("Luna") || ent["channelId"].as_str() == Some("Luna");

                let mut extra_data = ent.clone();
                extra_data["is_streaming"] = serde_json::Value::Bool(is_streaming);

                games.push(RawGame {
                    cover_image: product["iconUrl"].as_str().map(|url| url.to_owned()),
                    developers: product["developer"]
                        .as_str()
                        .map(|d| vec![d.to_owned()])
                        .unwrap_or_default(),
                    publishers: product["publisher"]
                        .as_str()
                        .map(|p| vec![p.to_owned()])
                        .unwrap_or_default(),
                    is_streaming,
                    extra_data: Some(extra_data),
                    ..RawGame::new(name, "amazon", product_id)
                });
            }

            next_token = data["nextToken"].as_str().map(|t| t.to_owned());
            if next_token.is_none() {
                break;
            }
        }

        Ok(games)
    }
}

#[async_trait]
impl Storefront for AmazonApi {
    fn id() -> String {
        String::from("amazon")
    }

    #[instrument(name = "amazon::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        let mut games = match self.games_from_local_db().await {
            Ok(games) => games,
            Err(e) => {
                error!("Failed to read Amazon local catalog: {e}");
                vec![]
            }
        };

        if let Some(tokens) = &self.tokens {
            let remote = match self.games_from_entitlements(&tokens.access_token).await {
                Err(Status::AuthExpired(_)) => match &tokens.refresh_token {
                    Some(refresh_token) => {
                        let refreshed = AmazonApi::refresh(refresh_token).await?;
                        self.games_from_entitlements(&refreshed.access_token).await?
                    }
                    None => {
                        return Err(Status::not_configured(
                            "Amazon access token expired, sign in again",
                        ))
                    }
                },
                other => other?,
            };
            games.extend(remote);
        } else if games.is_empty() {
            return Err(Status::not_configured("Amazon is not signed in"));
        }

        // Local db and entitlements overlap; first occurrence wins.
        let mut seen: HashSet<String> = HashSet::new();
        games.retain(|game| seen.insert(game.store_id.clone()));

        info!("amazon games: {}", games.len());
        Ok(games)
    }
}

fn client() -> Result<reqwest::Client, Status> {
    Ok(reqwest::Client::builder()
        .user_agent(LAUNCHER_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()?)
}

fn code_verifier() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)[..43].to_owned()
}

fn code_challenge(verifier: &str) -> String {
    // SHA-256 of the verifier, base64url without padding.
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn device_serial() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..32].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_verifier_has_expected_shape() {
        let (url, verifier) = AmazonApi::login_url();
        assert_eq!(verifier.len(), 43);
        assert!(url.starts_with(AMAZON_SIGNIN_URL));
        assert!(url.contains("openid.oa2.code_challenge="));
    }

    #[test]
    fn code_challenge_matches_known_vector() {
        // RFC 7636 appendix B.
        let challenge = code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn tokens_round_trip_as_one_json_value() {
        let tokens = AmazonTokens {
            access_token: "Atna|access".to_owned(),
            refresh_token: Some("Atnr|refresh".to_owned()),
        };
        let json = serde_json::to_string(&tokens).unwrap();
        let parsed: AmazonTokens = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.access_token, "Atna|access");
        assert_eq!(parsed.refresh_token.as_deref(), Some("Atnr|refresh"));
    }

    #[tokio::test]
    async fn nothing_configured_is_not_configured() {
        let api = AmazonApi::new(None, None);
        assert!(matches!(
            api.get_owned_games().await,
            Err(Status::NotConfigured(_))
        ));
    }
}
