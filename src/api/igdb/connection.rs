use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::util::RateLimiter;
use crate::Status;

/// Authenticated connection to IGDB. The client-credentials token is cached
/// in memory until shortly before expiry and refreshed on demand.
pub struct IgdbConnection {
    pub client_id: String,
    secret: String,
    token: Mutex<Option<CachedToken>>,
    pub qps: RateLimiter,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl IgdbConnection {
    pub fn new(client_id: &str, secret: &str) -> Self {
        IgdbConnection {
            client_id: client_id.to_owned(),
            secret: secret.to_owned(),
            token: Mutex::new(None),
            qps: RateLimiter::new(4, Duration::from_secs(1), Duration::from_millis(250)),
        }
    }

    pub async fn token(&self) -> Result<String, Status> {
        {
            let token = self.token.lock().unwrap();
            if let Some(cached) = token.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }
        self.refresh_token().await
    }

    /// Fetches a fresh OAuth token from the twitch/igdb token endpoint.
    pub async fn refresh_token(&self) -> Result<String, Status> {
        let uri = format!(
            "{TWITCH_OAUTH_URL}?client_id={}&client_secret={}&grant_type=client_credentials",
            self.client_id, self.secret
        );

        let resp = reqwest::Client::new()
            .post(&uri)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .json::<TwitchOAuthResponse>()
            .await?;

        let access_token = resp.access_token.clone();
        let expires_in = resp.expires_in.max(60) as u64;
        *self.token.lock().unwrap() = Some(CachedToken {
            access_token: resp.access_token,
            // Renew a minute early so in-flight calls never carry a token
            // that expires mid-request.
            expires_at: Instant::now() + Duration::from_secs(expires_in - 60),
        });

        Ok(access_token)
    }
}

pub const TWITCH_OAUTH_URL: &str = "https://id.twitch.tv/oauth2/token";

#[derive(Debug, Serialize, Deserialize)]
struct TwitchOAuthResponse {
    access_token: String,
    expires_in: i64,
}
