use itertools::Itertools;

use super::IgdbGame;
use crate::api::TitleNormalizer;

/// Minimum similarity for a fuzzy candidate to count as a match.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Orders search candidates by title similarity, breaking ties with the
/// IGDB vote count.
pub fn sorted_by_relevance(title: &str, candidates: Vec<IgdbGame>) -> Vec<IgdbGame> {
    candidates
        .into_iter()
        .map(|game| {
            let score = TitleNormalizer::similarity(title, &game.name);
            (score, game)
        })
        .sorted_by(|(left_score, left), (right_score, right)| {
            right_score
                .partial_cmp(left_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    right
                        .total_rating_count
                        .unwrap_or(0)
                        .cmp(&left.total_rating_count.unwrap_or(0))
                })
        })
        .map(|(_, game)| game)
        .collect_vec()
}

/// Best fuzzy candidate above the similarity threshold, if any.
pub fn top_above_threshold(title: &str, candidates: Vec<IgdbGame>) -> Option<IgdbGame> {
    sorted_by_relevance(title, candidates)
        .into_iter()
        .find(|game| TitleNormalizer::similarity(title, &game.name) >= SIMILARITY_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: i64, name: &str, votes: i64) -> IgdbGame {
        IgdbGame {
            id,
            name: name.to_owned(),
            total_rating_count: Some(votes),
            ..Default::default()
        }
    }

    #[test]
    fn exact_title_wins_over_popular_near_miss() {
        let ranked = sorted_by_relevance(
            "Portal 2",
            vec![game(1, "Portal", 9000), game(2, "Portal 2", 100)],
        );
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn ties_break_by_vote_count() {
        let ranked = sorted_by_relevance(
            "Doom",
            vec![game(1, "Doom", 50), game(2, "Doom", 5000)],
        );
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn threshold_rejects_weak_candidates() {
        let top = top_above_threshold(
            "Some Obscure Indie Title",
            vec![game(1, "Completely Different Game", 10)],
        );
        assert!(top.is_none());

        let top = top_above_threshold(
            "The Witcher 3: Wild Hunt GOTY Edition",
            vec![game(1, "The Witcher 3: Wild Hunt", 10)],
        );
        assert_eq!(top.map(|g| g.id), Some(1));
    }
}
