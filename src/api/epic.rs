use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, instrument};

use crate::documents::{RawGame, Storefront};
use crate::Status;

/// Epic delegates authentication and catalog metadata to the external
/// `legendary` CLI; this adapter parses its JSON output.
pub struct EpicApi {
    binary: String,
}

impl EpicApi {
    pub fn new() -> EpicApi {
        EpicApi {
            binary: String::from("legendary"),
        }
    }

    pub fn with_binary(binary: &str) -> EpicApi {
        EpicApi {
            binary: String::from(binary),
        }
    }

    /// Completes the CLI's auth flow with an authorization code obtained in
    /// the browser.
    #[instrument(level = "info", skip(self, code))]
    pub async fn authenticate(&self, code: &str) -> Result<(), Status> {
        let output = Command::new(&self.binary)
            .args(["auth", "--code", code])
            .output()
            .await
            .map_err(|e| Status::new("Failed to run legendary auth", e))?;

        match output.status.success() {
            true => Ok(()),
            false => Err(Status::auth_expired(format!(
                "legendary auth failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ))),
        }
    }
}

#[async_trait]
impl Storefront for EpicApi {
    fn id() -> String {
        String::from("epic")
    }

    #[instrument(name = "epic::get_owned_games", level = "info", skip(self))]
    async fn get_owned_games(&self) -> Result<Vec<RawGame>, Status> {
        let output = Command::new(&self.binary)
            .args(["list", "--json"])
            .output()
            .await
            .map_err(|_| {
                Status::not_configured("legendary CLI is not installed or not on PATH")
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Expired login is recoverable through the auth flow.
            if stderr.contains("re-auth") || stderr.contains("Login failed") {
                return Err(Status::auth_expired("Epic login expired, re-auth required"));
            }
            return Err(Status::internal(format!("legendary list failed: {stderr}")));
        }

        let entries: Vec<LegendaryGame> = serde_json::from_slice(&output.stdout)
            .map_err(|e| Status::parse(format!("legendary output parse error: {e}")))?;
        info!("epic games: {}", entries.len());

        Ok(entries.into_iter().map(raw_game).collect())
    }
}

fn raw_game(entry: LegendaryGame) -> RawGame {
    let cover_image = entry
        .metadata
        .key_images
        .iter()
        .find(|image| image.image_type == "DieselGameBoxTall")
        .or_else(|| {
            entry
                .metadata
                .key_images
                .iter()
                .find(|image| image.image_type == "DieselGameBox")
        })
        .map(|image| image.url.clone());

    let developers = match entry.metadata.developer.is_empty() {
        true => vec![],
        false => vec![entry.metadata.developer.clone()],
    };

    let extra_data = serde_json::json!({
        "app_name": entry.app_name.clone(),
        "namespace": entry.metadata.namespace,
        "product_slug": entry.metadata.product_slug,
        "customAttributes": entry.metadata.custom_attributes,
        "releaseInfo": entry.metadata.release_info,
    });

    RawGame {
        cover_image,
        developers,
        extra_data: Some(extra_data),
        ..RawGame::new(&entry.app_title, "epic", &entry.app_name)
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct LegendaryGame {
    app_name: String,
    app_title: String,

    #[serde(default)]
    metadata: LegendaryMetadata,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct LegendaryMetadata {
    #[serde(default)]
    developer: String,

    #[serde(default)]
    namespace: String,

    #[serde(default)]
    #[serde(rename = "productSlug")]
    product_slug: Option<String>,

    #[serde(default)]
    #[serde(rename = "keyImages")]
    key_images: Vec<LegendaryKeyImage>,

    #[serde(default)]
    #[serde(rename = "customAttributes")]
    custom_attributes: serde_json::Value,

    #[serde(default)]
    #[serde(rename = "releaseInfo")]
    release_info: serde_json::Value,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct LegendaryKeyImage {
    #[serde(default)]
    #[serde(rename = "type")]
    image_type: String,

    #[serde(default)]
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legendary_list_output() {
        let payload = r#"[{
            "app_name": "Sugar",
            "app_title": "Alan Wake",
            "metadata": {
                "developer": "Remedy Entertainment",
                "namespace": "sugar",
                "productSlug": "alan-wake",
                "keyImages": [
                    {"type": "DieselGameBoxTall", "url": "https://cdn.epicgames.com/tall.jpg"},
                    {"type": "DieselGameBox", "url": "https://cdn.epicgames.com/wide.jpg"}
                ],
                "customAttributes": {},
                "releaseInfo": []
            }
        }]"#;

        let entries: Vec<LegendaryGame> = serde_json::from_str(payload).unwrap();
        let game = raw_game(entries.into_iter().next().unwrap());

        assert_eq!(game.name, "Alan Wake");
        assert_eq!(game.store, "epic");
        assert_eq!(game.store_id, "Sugar");
        assert_eq!(
            game.cover_image.as_deref(),
            Some("https://cdn.epicgames.com/tall.jpg")
        );
        assert_eq!(game.developers, vec!["Remedy Entertainment"]);
        let extra = game.extra_data.unwrap();
        assert_eq!(extra["product_slug"], "alan-wake");
    }
}
