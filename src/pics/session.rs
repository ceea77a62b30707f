use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::documents::ProductInfo;

/// Apps per product-info request.
const BATCH_SIZE: usize = 50;

/// Delay between consecutive batches.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(200);

/// A batch that does not answer within this window is skipped, not fatal.
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Login attempts are not retried within this window after a failure.
const LOGIN_COOLDOWN: Duration = Duration::from_secs(10);

const MAX_LOGIN_FAILURES: u32 = 3;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum PicsCommand {
    Connect { force: bool },
    Disconnect,
    GetProductInfo { app_ids: Vec<u32> },
    Status,
    Shutdown,
}

#[derive(Debug)]
pub struct PicsRequest {
    pub id: u64,
    pub command: PicsCommand,
}

#[derive(Debug)]
pub struct PicsResponse {
    pub id: u64,
    pub result: Result<PicsResult, String>,
}

#[derive(Debug, Clone)]
pub enum PicsResult {
    Connected(bool),
    Disconnected,
    Products(HashMap<u32, ProductInfo>),
    Status(SessionStatus),
    ShutdownAck,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionStatus {
    pub logged_in: bool,
    pub login_failures: u32,
}

/// Worker side of the product-info session. Runs on its own thread with its
/// own single-threaded runtime so the protocol event loop never interferes
/// with request handling. Requests arrive on one queue, responses leave on
/// the other, correlated by id.
pub fn run_session(requests: Receiver<PicsRequest>, responses: Sender<PicsResponse>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to build product-info session runtime: {e}");
            return;
        }
    };

    let mut session = Session::default();
    info!("product-info session worker ready");

    loop {
        let request = match requests.recv_timeout(Duration::from_secs(1)) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            // Caller side dropped; nothing left to serve.
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let result = match request.command {
            PicsCommand::Connect { force } => {
                Ok(PicsResult::Connected(runtime.block_on(session.connect(force))))
            }
            PicsCommand::Disconnect => {
                session.logged_in = false;
                Ok(PicsResult::Disconnected)
            }
            PicsCommand::GetProductInfo { app_ids } => Ok(PicsResult::Products(
                runtime.block_on(session.get_product_info(&app_ids)),
            )),
            PicsCommand::Status => Ok(PicsResult::Status(SessionStatus {
                logged_in: session.logged_in,
                login_failures: session.login_failures,
            })),
            PicsCommand::Shutdown => {
                let _ = responses.send(PicsResponse {
                    id: request.id,
                    result: Ok(PicsResult::ShutdownAck),
                });
                break;
            }
        };

        if responses
            .send(PicsResponse {
                id: request.id,
                result,
            })
            .is_err()
        {
            break;
        }
    }

    info!("product-info session worker terminated");
}

#[derive(Default)]
struct Session {
    logged_in: bool,
    login_failures: u32,
    last_login_attempt: Option<Instant>,

    /// Derived state rebuildable from the protocol at any time.
    cache: HashMap<u32, ProductInfo>,
}

impl Session {
    /// Anonymous session establishment. After three consecutive failures the
    /// cooldown is enforced unless the caller forces a retry.
    async fn connect(&mut self, force: bool) -> bool {
        if self.logged_in {
            return true;
        }

        if !force {
            if let Some(last) = self.last_login_attempt {
                if last.elapsed() < LOGIN_COOLDOWN && self.login_failures >= MAX_LOGIN_FAILURES {
                    return false;
                }
            }
        }
        self.last_login_attempt = Some(Instant::now());

        match probe_backend().await {
            Ok(()) => {
                self.logged_in = true;
                self.login_failures = 0;
                info!("product-info session connected (anonymous)");
                true
            }
            Err(e) => {
                self.login_failures += 1;
                warn!(
                    "product-info login failed ({}): {e}",
                    self.login_failures
                );
                false
            }
        }
    }

    /// Batches of at most 50 app ids with an inter-batch delay; a timed-out
    /// batch is skipped and served from the session cache when possible.
    async fn get_product_info(&mut self, app_ids: &[u32]) -> HashMap<u32, ProductInfo> {
        if !self.logged_in && !self.connect(false).await {
            return HashMap::new();
        }

        let mut results = HashMap::new();
        let batches: Vec<&[u32]> = app_ids.chunks(BATCH_SIZE).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            info!("fetching product info for {} apps (batch {})", batch.len(), index + 1);

            match tokio::time::timeout(BATCH_TIMEOUT, fetch_batch(batch)).await {
                Ok(Ok(products)) => {
                    for (app_id, info) in products {
                        self.cache.insert(app_id, info.clone());
                        results.insert(app_id, info);
                    }
                }
                Ok(Err(e)) => {
                    warn!("batch {} failed: {e}", index + 1);
                    self.serve_from_cache(batch, &mut results);
                }
                Err(_) => {
                    warn!("batch {} timed out, skipping", index + 1);
                    self.serve_from_cache(batch, &mut results);
                }
            }

            if index + 1 < batch_count {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }
        }

        info!("fetched product info for {}/{} apps", results.len(), app_ids.len());
        results
    }

    fn serve_from_cache(&self, batch: &[u32], results: &mut HashMap<u32, ProductInfo>) {
        for app_id in batch {
            if let Some(cached) = self.cache.get(app_id) {
                results.insert(*app_id, cached.clone());
            }
        }
    }
}

async fn probe_backend() -> Result<(), crate::Status> {
    let client = reqwest::Client::builder()
        .user_agent(crate::api::USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()?;
    let resp = client.get(format!("{APPINFO_HOST}/v1/info/480")).send().await?;
    match resp.status().is_success() {
        true => Ok(()),
        false => Err(crate::Status::network(format!(
            "appinfo backend returned {}",
            resp.status()
        ))),
    }
}

async fn fetch_batch(batch: &[u32]) -> Result<HashMap<u32, ProductInfo>, crate::Status> {
    let client = reqwest::Client::builder()
        .user_agent(crate::api::USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut products = HashMap::new();
    for app_id in batch {
        let resp = client
            .get(format!("{APPINFO_HOST}/v1/info/{app_id}"))
            .send()
            .await?;
        if !resp.status().is_success() {
            continue;
        }

        let payload = resp.json::<serde_json::Value>().await?;
        if let Some(info) = parse_product_info(*app_id, &payload) {
            products.insert(*app_id, info);
        }
    }

    Ok(products)
}

/// Maps an appinfo document onto the session's product record.
fn parse_product_info(app_id: u32, payload: &serde_json::Value) -> Option<ProductInfo> {
    let data = payload.get("data")?.get(app_id.to_string())?;
    let common = data.get("common")?;

    let change_number = payload["status"]
        .get("change_number")
        .or_else(|| data.get("_change_number"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let last_change = payload["status"]
        .get("last_checked")
        .or_else(|| data.get("_change_number_date"))
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    let associations = common.get("associations").and_then(|v| v.as_object());
    let associated = |kind: &str| -> Option<String> {
        associations?.values().find_map(|assoc| {
            match assoc.get("type").and_then(|t| t.as_str()) == Some(kind) {
                true => assoc.get("name").and_then(|n| n.as_str()).map(String::from),
                false => None,
            }
        })
    };

    let mut languages_with_audio = vec![];
    let mut languages_subtitles_only = vec![];
    if let Some(languages) = common.get("supported_languages").and_then(|v| v.as_object()) {
        for (language, details) in languages {
            if details.get("supported").and_then(|v| v.as_str()) != Some("true") {
                continue;
            }
            match details.get("full_audio").and_then(|v| v.as_str()) == Some("true") {
                true => languages_with_audio.push(language.clone()),
                false => languages_subtitles_only.push(language.clone()),
            }
        }
    }

    Some(ProductInfo {
        app_id,
        change_number,
        last_change,
        steam_deck_category: common
            .get("steam_deck_compatibility")
            .and_then(|deck| deck.get("category"))
            .and_then(|v| v.as_str().map(String::from).or_else(|| v.as_u64().map(|n| n.to_string()))),
        developer: associated("developer"),
        publisher: associated("publisher"),
        review_score: common.get("review_score").and_then(as_u64_lenient),
        review_percentage: common.get("review_percentage").and_then(as_u64_lenient),
        release_date: common
            .get("steam_release_date")
            .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok())),
        controller_support: common
            .get("controller_support")
            .and_then(|v| v.as_str())
            .map(String::from),
        languages_with_audio,
        languages_subtitles_only,
    })
}

// appinfo values arrive either as numbers or numeric strings.
fn as_u64_lenient(value: &serde_json::Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_str()?.parse().ok())
}

const APPINFO_HOST: &str = "https://api.steamcmd.net";

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> serde_json::Value {
        serde_json::json!({
            "status": {"success": true, "change_number": 29913518, "last_checked": 1735689600},
            "data": {
                "620": {
                    "common": {
                        "name": "Portal 2",
                        "review_score": "9",
                        "review_percentage": "97",
                        "steam_release_date": "1303171200",
                        "controller_support": "full",
                        "steam_deck_compatibility": {"category": "1"},
                        "associations": {
                            "0": {"type": "developer", "name": "Valve"},
                            "1": {"type": "publisher", "name": "Valve"}
                        },
                        "supported_languages": {
                            "english": {"supported": "true", "full_audio": "true"},
                            "french": {"supported": "true"},
                            "klingon": {"supported": "false"}
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn product_record_parses_from_appinfo() {
        let info = parse_product_info(620, &sample_payload()).unwrap();

        assert_eq!(info.app_id, 620);
        assert_eq!(info.change_number, 29913518);
        assert_eq!(info.developer.as_deref(), Some("Valve"));
        assert_eq!(info.review_percentage, Some(97));
        assert_eq!(info.release_date, Some(1303171200));
        assert_eq!(info.controller_support.as_deref(), Some("full"));
        assert_eq!(info.steam_deck_category.as_deref(), Some("1"));
        assert_eq!(info.languages_with_audio, vec!["english"]);
        assert_eq!(info.languages_subtitles_only, vec!["french"]);
    }

    #[test]
    fn missing_common_section_yields_none() {
        let payload = serde_json::json!({"status": {}, "data": {"620": {}}});
        assert!(parse_product_info(620, &payload).is_none());
    }
}
