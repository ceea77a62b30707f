use itertools::Itertools;
use std::sync::Arc;
use tracing::instrument;

use super::backend::{post, GAMES_ENDPOINT, POPULARITY_ENDPOINT};
use super::docs::{IgdbPopularityPrimitive, GAME_FIELDS};
use super::{ranking, IgdbConnection, IgdbGame};
use crate::api::TitleNormalizer;
use crate::documents::{IgdbBinding, PopularityEntry};
use crate::Status;

/// IGDB external-game category id for Steam.
const EXTERNAL_CATEGORY_STEAM: i64 = 1;

/// IGDB theme id for adult content.
const THEME_EROTIC: i64 = 42;

#[derive(Clone)]
pub struct IgdbApi {
    connection: Arc<IgdbConnection>,
}

impl IgdbApi {
    pub fn new(client_id: &str, secret: &str) -> IgdbApi {
        IgdbApi {
            connection: Arc::new(IgdbConnection::new(client_id, secret)),
        }
    }

    /// Returns an IgdbGame by its IGDB `id` (binding mode).
    #[instrument(level = "trace", skip(self))]
    pub async fn get(&self, id: i64) -> Result<IgdbGame, Status> {
        let result: Vec<IgdbGame> = post(
            &self.connection,
            GAMES_ENDPOINT,
            &format!("fields {GAME_FIELDS}; where id={id};"),
        )
        .await?;

        match result.into_iter().next() {
            Some(igdb_game) => Ok(igdb_game),
            None => Err(Status::not_found(format!(
                "IgdbGame with id={id} was not found."
            ))),
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn search(&self, title: &str) -> Result<Vec<IgdbGame>, Status> {
        let title = title.replace('"', "");
        post::<Vec<IgdbGame>>(
            &self.connection,
            GAMES_ENDPOINT,
            &format!("search \"{title}\"; fields {GAME_FIELDS}; where platforms = (6,13,14); limit 20;"),
        )
        .await
    }

    /// Matching mode: prioritized lookup of a store title against IGDB.
    ///
    /// (a) exact normalized name with a close release year, (b) exact
    /// normalized name, (c) fuzzy top candidate above the similarity
    /// threshold. First hit wins; ties break on `total_rating_count`.
    #[instrument(level = "trace", skip(self))]
    pub async fn match_title(
        &self,
        title: &str,
        release_year: Option<i32>,
    ) -> Result<Option<IgdbGame>, Status> {
        let candidates = self.search(title).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let normalized = TitleNormalizer::normalize(title);
        let exact = candidates
            .iter()
            .filter(|game| TitleNormalizer::normalize(&game.name) == normalized)
            .cloned()
            .collect_vec();

        if let Some(year) = release_year {
            let hit = exact
                .iter()
                .filter(|game| {
                    game.release_year()
                        .map(|candidate| (candidate - year).abs() <= 1)
                        .unwrap_or(false)
                })
                .max_by_key(|game| game.total_rating_count.unwrap_or(0))
                .cloned();
            if hit.is_some() {
                return Ok(hit);
            }
        }

        if let Some(hit) = exact
            .into_iter()
            .max_by_key(|game| game.total_rating_count.unwrap_or(0))
        {
            return Ok(Some(hit));
        }

        Ok(ranking::top_above_threshold(title, candidates))
    }

    /// One batched popularity query over all requested ids and types.
    #[instrument(level = "trace", skip(self, igdb_ids), fields(count = igdb_ids.len()))]
    pub async fn popularity(
        &self,
        igdb_ids: &[i64],
        popularity_types: &[i64],
    ) -> Result<Vec<PopularityEntry>, Status> {
        if igdb_ids.is_empty() {
            return Ok(vec![]);
        }

        let ids = igdb_ids.iter().join(",");
        let types = popularity_types.iter().join(",");
        let primitives: Vec<IgdbPopularityPrimitive> = post(
            &self.connection,
            POPULARITY_ENDPOINT,
            &format!(
                "fields game_id, value, popularity_type; where game_id = ({ids}) & popularity_type = ({types}); sort value desc; limit 500;"
            ),
        )
        .await?;

        Ok(primitives
            .into_iter()
            .map(|p| PopularityEntry {
                igdb_id: p.game_id,
                popularity_type: p.popularity_type,
                value: p.value,
            })
            .collect_vec())
    }
}

/// Converts an IGDB game into the columns written onto the local row.
pub fn binding_from(game: &IgdbGame) -> IgdbBinding {
    IgdbBinding {
        igdb_id: game.id,
        slug: game.slug.clone(),
        rating: game.rating,
        rating_count: game.rating_count,
        aggregated_rating: game.aggregated_rating,
        aggregated_rating_count: game.aggregated_rating_count,
        total_rating: game.total_rating,
        total_rating_count: game.total_rating_count,
        summary: game.summary.clone(),
        cover_url: game
            .cover
            .as_ref()
            .map(|cover| rewrite_image_url(&cover.url, "t_cover_big")),
        screenshots: game
            .screenshots
            .iter()
            .take(5)
            .map(|shot| rewrite_image_url(&shot.url, "t_screenshot_big"))
            .collect_vec(),
        nsfw: game.themes.iter().any(|theme| theme.id == THEME_EROTIC),
        steam_app_id: game
            .external_games
            .iter()
            .find(|external| external.category == EXTERNAL_CATEGORY_STEAM)
            .map(|external| external.uid.clone()),
        genres: game
            .genres
            .iter()
            .map(|genre| genre.name.clone())
            .chain(game.themes.iter().map(|theme| theme.name.clone()))
            .filter(|name| !name.is_empty())
            .collect_vec(),
    }
}

/// Union of local and IGDB genres, deduplicated case-insensitively,
/// first-seen order preserved.
pub fn merge_genres(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = vec![];
    let mut merged: Vec<String> = vec![];

    for genre in existing.iter().chain(incoming) {
        let folded = genre.to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
            merged.push(genre.clone());
        }
    }
    merged
}

/// IGDB serves thumbnails; views want the large CDN rendition.
fn rewrite_image_url(url: &str, size: &str) -> String {
    let url = url.replace("t_thumb", size);
    match url.starts_with("http") {
        true => url,
        false => format!("https:{url}"),
    }
}
