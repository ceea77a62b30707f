use itertools::Itertools;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::documents::{GameGroup, GameRow, StoreCopy};
use crate::Status;

/// Amazon Prime/Luna promotional variants are ingested so they round-trip,
/// but filtered out of every default view.
pub const EXCLUDE_DUPLICATES_FILTER: &str = r#"
    AND name NOT LIKE '% - Amazon Prime'
    AND name NOT LIKE '% - Amazon Luna'
"#;

pub const EXCLUDE_HIDDEN_FILTER: &str = r#"
    AND name NOT LIKE '% - Amazon Prime'
    AND name NOT LIKE '% - Amazon Luna'
    AND (hidden IS NULL OR hidden = 0)
"#;

const TAG_EXISTS_JUST_TRIED: &str = r#"EXISTS (
    SELECT 1 FROM game_labels _gl JOIN labels _l ON _l.id = _gl.label_id
    WHERE _gl.game_id = games.id AND _l.system = 1 AND _l.type = 'system_tag'
    AND _l.name = 'Just Tried'
)"#;

const TAG_EXISTS_PLAYED: &str = r#"EXISTS (
    SELECT 1 FROM game_labels _gl JOIN labels _l ON _l.id = _gl.label_id
    WHERE _gl.game_id = games.id AND _l.system = 1 AND _l.type = 'system_tag'
    AND _l.name = 'Played'
)"#;

const TAG_EXISTS_WELL_PLAYED: &str = r#"EXISTS (
    SELECT 1 FROM game_labels _gl JOIN labels _l ON _l.id = _gl.label_id
    WHERE _gl.game_id = games.id AND _l.system = 1 AND _l.type = 'system_tag'
    AND _l.name = 'Well Played'
)"#;

const TAG_EXISTS_HEAVILY_PLAYED: &str = r#"EXISTS (
    SELECT 1 FROM game_labels _gl JOIN labels _l ON _l.id = _gl.label_id
    WHERE _gl.game_id = games.id AND _l.system = 1 AND _l.type = 'system_tag'
    AND _l.name = 'Heavily Played'
)"#;

/// A Steam game with no tag other than Never Launched, or a non-Steam game
/// with no system tag at all. Existence subqueries keep downstream grouping
/// from double-counting.
const UNPLAYED: &str = r#"(
    (games.store = 'steam' AND NOT EXISTS (
    SELECT 1 FROM game_labels _gl JOIN labels _l ON _l.id = _gl.label_id
    WHERE _gl.game_id = games.id AND _l.system = 1 AND _l.type = 'system_tag'
    AND _l.name != 'Never Launched'
))
    OR
    (games.store != 'steam' AND NOT EXISTS (
    SELECT 1 FROM game_labels _gl JOIN labels _l ON _l.id = _gl.label_id
    WHERE _gl.game_id = games.id AND _l.system = 1 AND _l.type = 'system_tag'
))
)"#;

static PREDEFINED_QUERIES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    // Gameplay (tag-based)
    "unplayed" => UNPLAYED,
    "just-tried" => TAG_EXISTS_JUST_TRIED,
    "played" => TAG_EXISTS_PLAYED,
    "well-played" => TAG_EXISTS_WELL_PLAYED,
    "heavily-played" => TAG_EXISTS_HEAVILY_PLAYED,

    // Ratings
    "highly-rated" => "total_rating >= 90",
    "well-rated" => "total_rating >= 75",
    "below-average" => "(total_rating < 75 AND total_rating IS NOT NULL)",
    "unrated" => "total_rating IS NULL",
    "hidden-gems" => "(total_rating >= 75 AND total_rating < 90 AND aggregated_rating IS NULL)",
    "critic-favorites" => "aggregated_rating >= 80",
    "community-favorites" => "(igdb_rating >= 85 AND igdb_rating_count >= 100)",

    // Dates
    "recently-added" => "added_at >= DATE('now', '-30 days')",
    "older-library" => "added_at < DATE('now', '-6 months')",
    "recent-releases" => "release_date >= DATE('now', '-1 year')",
    "recently-updated" => "last_modified >= DATE('now', '-30 days')",
    "classics" => "(release_date <= DATE('now', '-10 years') AND total_rating >= 80)",

    // Content
    "nsfw" => "nsfw = 1",
    "safe" => "(nsfw = 0 OR nsfw IS NULL)",

    // My Rating
    "has-priority" => "games.priority IS NOT NULL",
    "no-priority" => "games.priority IS NULL",
    "personally-rated" => "(games.personal_rating IS NOT NULL AND games.personal_rating > 0)",
    "personally-unrated" => "(games.personal_rating IS NULL OR games.personal_rating = 0)",
};

pub const QUERY_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Gameplay",
        &["unplayed", "just-tried", "played", "well-played", "heavily-played"],
    ),
    (
        "Ratings",
        &[
            "highly-rated",
            "well-rated",
            "below-average",
            "unrated",
            "hidden-gems",
            "critic-favorites",
            "community-favorites",
        ],
    ),
    (
        "Dates",
        &["recently-added", "older-library", "recent-releases", "recently-updated", "classics"],
    ),
    ("Content", &["nsfw", "safe"]),
    (
        "My Rating",
        &["has-priority", "no-priority", "personally-rated", "personally-unrated"],
    ),
];

pub fn filter_sql(filter_id: &str) -> Option<&'static str> {
    PREDEFINED_QUERIES.get(filter_id).copied()
}

pub fn filter_ids() -> Vec<&'static str> {
    QUERY_CATEGORIES
        .iter()
        .flat_map(|(_, ids)| ids.iter().copied())
        .collect_vec()
}

// igdb_rating_count is covered by the igdb_rating replacement; listing it
// separately would prefix it twice.
const PREFIXABLE_COLUMNS: &[&str] = &[
    "playtime_hours",
    "total_rating",
    "added_at",
    "release_date",
    "nsfw",
    "aggregated_rating",
    "igdb_rating",
    "last_modified",
];

/// Rewrites bare column names for queries that join `games` to other tables.
fn apply_prefix(sql: &str, table_prefix: &str) -> String {
    if table_prefix.is_empty() {
        return sql.to_owned();
    }

    let mut sql = sql
        .replace("games.id", &format!("{table_prefix}id"))
        .replace("games.store", &format!("{table_prefix}store"))
        .replace("games.priority", &format!("{table_prefix}priority"))
        .replace("games.personal_rating", &format!("{table_prefix}personal_rating"));
    for column in PREFIXABLE_COLUMNS {
        sql = sql.replace(column, &format!("{table_prefix}{column}"));
    }
    sql
}

fn category_of(filter_id: &str) -> Option<&'static str> {
    QUERY_CATEGORIES
        .iter()
        .find(|(_, ids)| ids.contains(&filter_id))
        .map(|(category, _)| *category)
}

/// Composes predefined filters into one SQL condition: OR within a category,
/// AND across categories. Unknown ids are ignored.
pub fn build_query_filter_sql(query_ids: &[&str], table_prefix: &str) -> String {
    let valid = query_ids
        .iter()
        .filter(|id| PREDEFINED_QUERIES.contains_key(**id))
        .copied()
        .collect_vec();
    if valid.is_empty() {
        return String::new();
    }

    let mut groups: Vec<(&str, Vec<&str>)> = vec![];
    for filter_id in valid {
        let category = match category_of(filter_id) {
            Some(category) => category,
            None => continue,
        };
        match groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, ids)) => ids.push(filter_id),
            None => groups.push((category, vec![filter_id])),
        }
    }

    let conditions = groups
        .into_iter()
        .map(|(_, ids)| {
            let clauses = ids
                .into_iter()
                .map(|id| {
                    let sql = PREDEFINED_QUERIES.get(id).copied().unwrap_or_default();
                    format!("({})", apply_prefix(sql, table_prefix))
                })
                .collect_vec();
            match clauses.len() {
                1 => clauses.into_iter().next().unwrap(),
                _ => format!("({})", clauses.join(" OR ")),
            }
        })
        .collect_vec();

    match conditions.len() {
        1 => conditions.into_iter().next().unwrap(),
        _ => format!("({})", conditions.join(" AND ")),
    }
}

#[derive(Default, Debug, Clone)]
pub struct LibraryFilters {
    pub stores: Vec<String>,
    pub genres: Vec<String>,
    pub queries: Vec<String>,
    pub search: Option<String>,
}

/// Raw row set for the library view. Hidden games and Amazon synthetic
/// variants are excluded before grouping.
pub async fn list_games(pool: &SqlitePool, filters: &LibraryFilters) -> Result<Vec<GameRow>, Status> {
    let mut query = format!("SELECT * FROM games WHERE 1=1{EXCLUDE_HIDDEN_FILTER}");
    let mut params: Vec<String> = vec![];

    if !filters.stores.is_empty() {
        let placeholders = filters.stores.iter().map(|_| "?").join(",");
        query.push_str(&format!(" AND store IN ({placeholders})"));
        params.extend(filters.stores.iter().cloned());
    }

    if !filters.genres.is_empty() {
        // Match the JSON-quoted genre so 'Action' does not hit 'Re-Action'.
        let clauses = filters.genres.iter().map(|_| "LOWER(genres) LIKE ?").join(" OR ");
        query.push_str(&format!(" AND ({clauses})"));
        params.extend(
            filters
                .genres
                .iter()
                .map(|genre| format!("%\"{}\"%", genre.to_lowercase())),
        );
    }

    let query_refs = filters.queries.iter().map(String::as_str).collect_vec();
    let filter_sql = build_query_filter_sql(&query_refs, "");
    if !filter_sql.is_empty() {
        query.push_str(&format!(" AND {filter_sql}"));
    }

    if let Some(search) = &filters.search {
        if !search.is_empty() {
            query.push_str(" AND name LIKE ?");
            params.push(format!("%{search}%"));
        }
    }

    query.push_str(" ORDER BY name COLLATE NOCASE");

    let mut q = sqlx::query_as::<_, GameRow>(&query);
    for param in &params {
        q = q.bind(param);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Coalesces rows sharing a non-null `igdb_id` into one display group; rows
/// without a binding each form their own group.
pub fn group_by_igdb(games: Vec<GameRow>) -> Vec<GameGroup> {
    let mut grouped: Vec<(i64, GameGroup)> = vec![];
    let mut singles: Vec<GameGroup> = vec![];

    for game in games {
        match game.igdb_id {
            Some(igdb_id) => match grouped.iter_mut().find(|(id, _)| *id == igdb_id) {
                Some((_, group)) => push_into_group(group, game),
                None => grouped.push((igdb_id, new_group(game))),
            },
            None => singles.push(new_group(game)),
        }
    }

    let mut result = grouped.into_iter().map(|(_, group)| group).collect_vec();
    result.extend(singles);

    for group in &mut result {
        group.only_streaming = group.is_streaming && !group.has_non_streaming;
    }
    result
}

fn new_group(game: GameRow) -> GameGroup {
    let streaming = game.is_streaming();
    GameGroup {
        stores: vec![game.store.clone()],
        game_ids: vec![game.id],
        copies: vec![StoreCopy {
            store: game.store.clone(),
            game: game.clone(),
        }],
        is_streaming: streaming,
        has_non_streaming: !streaming,
        only_streaming: false,
        primary: game,
    }
}

fn push_into_group(group: &mut GameGroup, game: GameRow) {
    let streaming = game.is_streaming();
    group.stores.push(game.store.clone());
    group.game_ids.push(game.id);
    group.copies.push(StoreCopy {
        store: game.store.clone(),
        game: game.clone(),
    });
    if streaming {
        group.is_streaming = true;
    } else {
        group.has_non_streaming = true;
    }

    // Primary preference: has IGDB cover, then has playtime, then first seen.
    let replace = (game.igdb_cover_url.is_some() && group.primary.igdb_cover_url.is_none())
        || (game.playtime_hours.is_some()
            && group.primary.playtime_hours.is_none()
            && group.primary.igdb_cover_url.is_none());
    if replace {
        group.primary = game;
    }
}

/// Sidebar counts: one pass over the current result set with a
/// `COUNT(CASE ...)` per filter, the active filter excluded from its own
/// count.
pub async fn filter_counts(
    pool: &SqlitePool,
    stores: &[String],
    genres: &[String],
    exclude_query: Option<&str>,
) -> Result<HashMap<String, i64>, Status> {
    let mut where_clause = format!("1=1{EXCLUDE_HIDDEN_FILTER}");
    let mut params: Vec<String> = vec![];

    if !stores.is_empty() {
        let placeholders = stores.iter().map(|_| "?").join(",");
        where_clause.push_str(&format!(" AND store IN ({placeholders})"));
        params.extend(stores.iter().cloned());
    }
    if !genres.is_empty() {
        let clauses = genres.iter().map(|_| "genres LIKE ?").join(" OR ");
        where_clause.push_str(&format!(" AND ({clauses})"));
        params.extend(genres.iter().map(|genre| format!("%\"{genre}\"%")));
    }

    let counted = filter_ids()
        .into_iter()
        .filter(|id| Some(*id) != exclude_query)
        .collect_vec();
    let cases = counted
        .iter()
        .map(|id| {
            let sql = PREDEFINED_QUERIES.get(*id).copied().unwrap_or_default();
            format!("COUNT(CASE WHEN {sql} THEN 1 END)")
        })
        .join(", ");

    let query = format!("SELECT {cases} FROM games WHERE {where_clause}");
    let mut q = sqlx::query(&query);
    for param in &params {
        q = q.bind(param);
    }
    let row = q.fetch_one(pool).await?;

    let mut counts = HashMap::new();
    for (i, id) in counted.iter().enumerate() {
        counts.insert((*id).to_owned(), row.try_get::<i64, _>(i).map_err(sqlx::Error::from)?);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::RawGame;
    use crate::library::store::games;
    use crate::library::Database;

    #[test]
    fn same_category_filters_compose_with_or() {
        let sql = build_query_filter_sql(&["highly-rated", "unrated"], "");
        assert!(sql.contains("OR"));
        assert!(!sql.contains(" AND ("));
    }

    #[test]
    fn cross_category_filters_compose_with_and() {
        let sql = build_query_filter_sql(&["highly-rated", "nsfw"], "");
        assert!(sql.contains("AND"));
        assert!(sql.contains("total_rating >= 90"));
        assert!(sql.contains("nsfw = 1"));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        assert_eq!(build_query_filter_sql(&["no-such-filter"], ""), "");
        let sql = build_query_filter_sql(&["no-such-filter", "safe"], "");
        assert!(sql.contains("nsfw = 0"));
    }

    #[test]
    fn table_prefix_rewrites_bare_columns() {
        let sql = build_query_filter_sql(&["highly-rated"], "g.");
        assert!(sql.contains("g.total_rating >= 90"));

        let sql = build_query_filter_sql(&["has-priority"], "g.");
        assert!(sql.contains("g.priority IS NOT NULL"));
    }

    fn row(id: i64, store: &str, igdb_id: Option<i64>) -> GameRow {
        GameRow {
            id,
            name: "Portal 2".to_owned(),
            store: store.to_owned(),
            igdb_id,
            ..Default::default()
        }
    }

    #[test]
    fn grouping_coalesces_same_igdb_id() {
        let mut steam = row(1, "steam", Some(42));
        steam.playtime_hours = Some(8.0);
        let mut gog = row(2, "gog", Some(42));
        gog.igdb_cover_url = Some("https://images.igdb.com/cover.jpg".to_owned());
        let epic = row(3, "epic", None);

        let groups = group_by_igdb(vec![steam, gog, epic]);
        assert_eq!(groups.len(), 2);

        let merged = &groups[0];
        assert_eq!(merged.game_ids, vec![1, 2]);
        assert_eq!(merged.stores, vec!["steam", "gog"]);
        // Primary is the copy with the IGDB cover.
        assert_eq!(merged.primary.id, 2);

        assert_eq!(groups[1].game_ids, vec![3]);
    }

    #[test]
    fn rows_without_binding_stay_separate() {
        let groups = group_by_igdb(vec![row(1, "steam", None), row(2, "gog", None)]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn streaming_flags_aggregate_across_copies() {
        let mut prime = row(1, "amazon", Some(9));
        prime.extra_data = Some(r#"{"is_streaming": true}"#.to_owned());
        let owned = row(2, "steam", Some(9));

        let groups = group_by_igdb(vec![prime.clone(), owned]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_streaming);
        assert!(groups[0].has_non_streaming);
        assert!(!groups[0].only_streaming);

        let groups = group_by_igdb(vec![prime]);
        assert!(groups[0].only_streaming);
    }

    #[tokio::test]
    async fn hidden_and_synthetic_rows_are_excluded() {
        let db = Database::in_memory().await.unwrap();

        games::insert_raw(db.pool(), &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();
        let hidden = games::insert_raw(db.pool(), &RawGame::new("Secret", "steam", "1"))
            .await
            .unwrap();
        games::set_hidden(db.pool(), hidden, true).await.unwrap();
        games::insert_raw(
            db.pool(),
            &RawGame::new("Tacoma - Amazon Prime", "amazon", "t1"),
        )
        .await
        .unwrap();

        let rows = list_games(db.pool(), &LibraryFilters::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Portal 2");
    }

    #[tokio::test]
    async fn genre_filter_matches_quoted_json() {
        let db = Database::in_memory().await.unwrap();

        let action = games::insert_raw(db.pool(), &RawGame::new("Doom", "steam", "1"))
            .await
            .unwrap();
        sqlx::query(r#"UPDATE games SET genres = '["Action"]' WHERE id = ?"#)
            .bind(action)
            .execute(db.pool())
            .await
            .unwrap();
        let reaction = games::insert_raw(db.pool(), &RawGame::new("Chem Lab", "steam", "2"))
            .await
            .unwrap();
        sqlx::query(r#"UPDATE games SET genres = '["Re-Action"]' WHERE id = ?"#)
            .bind(reaction)
            .execute(db.pool())
            .await
            .unwrap();

        let rows = list_games(
            db.pool(),
            &LibraryFilters {
                genres: vec!["Action".to_owned()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Doom");
    }

    #[tokio::test]
    async fn counts_cover_every_filter_in_one_pass() {
        let db = Database::in_memory().await.unwrap();

        let rated = games::insert_raw(db.pool(), &RawGame::new("Portal 2", "steam", "620"))
            .await
            .unwrap();
        sqlx::query("UPDATE games SET total_rating = 95.0 WHERE id = ?")
            .bind(rated)
            .execute(db.pool())
            .await
            .unwrap();
        games::insert_raw(db.pool(), &RawGame::new("Obscurity", "gog", "1"))
            .await
            .unwrap();

        let counts = filter_counts(db.pool(), &[], &[], None).await.unwrap();
        assert_eq!(counts["highly-rated"], 1);
        assert_eq!(counts["unrated"], 1);
        assert_eq!(counts["safe"], 2);

        // The active filter is excluded from its own count.
        let counts = filter_counts(db.pool(), &[], &[], Some("highly-rated"))
            .await
            .unwrap();
        assert!(!counts.contains_key("highly-rated"));
    }
}
