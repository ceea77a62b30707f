use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use crate::documents::ProtonDbSummary;
use crate::Status;

/// ProtonDB report summaries by Steam AppID. A 404 is a definitive "no
/// data", recorded upstream as tier 'unknown' so the id is not re-queried.
pub struct ProtonDbApi {}

impl ProtonDbApi {
    #[instrument(name = "protondb::get_summary", level = "info")]
    pub async fn get_summary(steam_appid: &str) -> Result<ProtonDbSummary, Status> {
        let uri = format!("{PROTONDB_HOST}/api/v1/reports/summaries/{steam_appid}.json");

        let client = reqwest::Client::builder()
            .user_agent(crate::api::USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        let resp = client.get(&uri).send().await?;
        if resp.status().as_u16() == 404 {
            return Err(Status::not_found(format!(
                "no ProtonDB reports for appid {steam_appid}"
            )));
        }

        let summary = resp.json::<SummaryResponse>().await?;
        match summary.tier.is_empty() {
            true => Err(Status::not_found(format!(
                "no tier data for appid {steam_appid}"
            ))),
            false => Ok(ProtonDbSummary {
                tier: summary.tier,
                score: summary.score,
                confidence: summary.confidence,
                total: summary.total,
                trending_tier: summary.trending_tier,
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct SummaryResponse {
    #[serde(default)]
    tier: String,

    #[serde(default)]
    score: Option<f64>,

    #[serde(default)]
    confidence: Option<String>,

    #[serde(default)]
    total: Option<i64>,

    #[serde(default)]
    #[serde(rename = "trendingTier")]
    trending_tier: Option<String>,
}

const PROTONDB_HOST: &str = "https://www.protondb.com";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_payload_parses() {
        let payload = r#"{
            "bestReportedTier": "platinum",
            "confidence": "strong",
            "score": 0.87,
            "tier": "gold",
            "total": 423,
            "trendingTier": "platinum"
        }"#;

        let summary: SummaryResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(summary.tier, "gold");
        assert_eq!(summary.score, Some(0.87));
        assert_eq!(summary.trending_tier.as_deref(), Some("platinum"));
    }
}
