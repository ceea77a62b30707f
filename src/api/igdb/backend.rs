use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::error;

use super::IgdbConnection;
use crate::Status;

/// Sends a POST request to an IGDB service endpoint. A 401 refreshes the
/// cached token once and retries the call.
pub async fn post<T: DeserializeOwned>(
    connection: &IgdbConnection,
    endpoint: &str,
    body: &str,
) -> Result<T, Status> {
    let token = connection.token().await?;
    match send(connection, endpoint, body, &token).await {
        Err(Status::AuthExpired(_)) => {
            let token = connection.refresh_token().await?;
            send(connection, endpoint, body, &token).await
        }
        result => result,
    }
}

async fn send<T: DeserializeOwned>(
    connection: &IgdbConnection,
    endpoint: &str,
    body: &str,
    token: &str,
) -> Result<T, Status> {
    connection.qps.wait().await;

    let uri = format!("{IGDB_SERVICE_URL}/{endpoint}/");
    let resp = reqwest::Client::new()
        .post(&uri)
        .header("Client-ID", &connection.client_id)
        .header("Authorization", format!("Bearer {token}"))
        .timeout(Duration::from_secs(10))
        .body(String::from(body))
        .send()
        .await?;

    match resp.status() {
        StatusCode::UNAUTHORIZED => Err(Status::auth_expired("IGDB token was rejected")),
        StatusCode::TOO_MANY_REQUESTS => Err(Status::rate_limited("IGDB")),
        _ => {
            let text = resp.text().await?;
            serde_json::from_str::<T>(&text).map_err(|_| {
                let msg = format!("Received unexpected response: {text}\nuri: {uri}\nquery: {body}");
                error!(msg);
                Status::parse(msg)
            })
        }
    }
}

const IGDB_SERVICE_URL: &str = "https://api.igdb.com/v4";

pub const GAMES_ENDPOINT: &str = "games";
pub const POPULARITY_ENDPOINT: &str = "popularity_primitives";
