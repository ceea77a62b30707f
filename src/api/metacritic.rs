use soup::prelude::*;
use std::time::Duration;
use tracing::instrument;

use crate::Status;

#[derive(Default, Debug, Clone)]
pub struct MetacriticData {
    pub slug: String,
    pub url: String,
    pub critic_score: Option<f64>,
    pub user_score: Option<f64>,
}

/// Metacritic has no API; scores are scraped off the game page by slug.
pub struct MetacriticApi {}

impl MetacriticApi {
    #[instrument(name = "metacritic::get_scores", level = "info")]
    pub async fn get_scores(slug: &str) -> Result<MetacriticData, Status> {
        let url = format!("https://www.metacritic.com/game/{slug}/");

        let client = reqwest::Client::builder()
            .user_agent(crate::api::USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        let resp = client.get(&url).send().await?;
        if resp.status().as_u16() == 404 {
            return Err(Status::not_found(format!("{slug} not found on Metacritic")));
        }
        let text = resp.text().await?;
        let soup = Soup::new(&text);

        let mut scores = soup
            .class(SCORE_TAG)
            .find_all()
            .filter_map(|tag| tag.tag("span").find())
            .filter_map(|span| span.text().trim().parse::<f64>().ok());

        let critic_score = scores.next();
        let user_score = scores.next();
        if critic_score.is_none() && user_score.is_none() {
            return Err(Status::not_found(format!("Missing scores for {slug}")));
        }

        Ok(MetacriticData {
            slug: slug.to_owned(),
            url,
            critic_score,
            user_score,
        })
    }

    /// Best-effort slug guess from a page url.
    pub fn guess_slug(url: &str) -> &str {
        url.trim_end_matches('/').split('/').last().unwrap_or("")
    }
}

const SCORE_TAG: &str = "c-productScoreInfo_scoreNumber";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_guessed_from_url() {
        assert_eq!(
            MetacriticApi::guess_slug("https://www.metacritic.com/game/portal-2/"),
            "portal-2"
        );
        assert_eq!(MetacriticApi::guess_slug("portal-2"), "portal-2");
    }
}
