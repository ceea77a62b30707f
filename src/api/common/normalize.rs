use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

pub struct TitleNormalizer;

impl TitleNormalizer {
    /// Canonical form of a store title used for IGDB matching: trademark
    /// glyphs, edition/platform suffixes and year tags stripped, case and
    /// diacritics folded, punctuation collapsed.
    pub fn normalize(title: &str) -> String {
        lazy_static! {
            static ref BRACKETED: Regex = Regex::new(r"[(\[][^)\]]*[)\]]").unwrap();
            static ref EDITION: Regex = Regex::new(
                r"(?i)[:\-–]?\s*\b(game of the year|goty|definitive|deluxe|enhanced|complete|remastered|remaster|ultimate|standard|gold|premium|anniversary|legendary|directors cut|director's cut)\b(\s+edition)?\s*$"
            )
            .unwrap();
            static ref EDITION_WORD: Regex = Regex::new(r"(?i)\s+edition\s*$").unwrap();
            static ref PLATFORM: Regex =
                Regex::new(r"(?i)\s+(for|on)\s+(windows|pc|mac|linux|steam)\s*$").unwrap();
            static ref FLUFF_SET: HashSet<char> = "™®©".chars().collect();
            static ref PUNCT: Regex = Regex::new(r"[^a-z0-9 ]").unwrap();
            static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
        }

        let title: String = title.chars().filter(|c| !FLUFF_SET.contains(c)).collect();
        let title = BRACKETED.replace_all(&title, " ");
        let title = EDITION.replace(&title, "");
        let title = EDITION_WORD.replace(&title, "");
        let title = PLATFORM.replace(&title, "");

        let folded: String = title.to_lowercase().chars().map(fold_diacritic).collect();
        let stripped = PUNCT.replace_all(&folded, " ");
        SPACES.replace_all(&stripped, " ").trim().to_string()
    }

    /// Similarity in [0, 1] between two already-raw titles: 1.0 on an exact
    /// normalized match, otherwise the token overlap ratio.
    pub fn similarity(left: &str, right: &str) -> f64 {
        let left = Self::normalize(left);
        let right = Self::normalize(right);
        if left == right {
            return 1.0;
        }
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }

        let left_tokens: HashSet<&str> = left.split_whitespace().collect();
        let right_tokens: HashSet<&str> = right.split_whitespace().collect();
        let common = left_tokens.intersection(&right_tokens).count();

        (2.0 * common as f64) / (left_tokens.len() + right_tokens.len()) as f64
    }
}

fn fold_diacritic(c: char) -> char {
    lazy_static! {
        static ref FOLD: Vec<(&'static str, char)> = vec![
            ("àáâãäå", 'a'),
            ("çć", 'c'),
            ("èéêë", 'e'),
            ("ìíîï", 'i'),
            ("ñ", 'n'),
            ("òóôõöø", 'o'),
            ("ùúûü", 'u'),
            ("ýÿ", 'y'),
            ("šś", 's'),
            ("žź", 'z'),
        ];
    }

    FOLD.iter()
        .find(|(accented, _)| accented.chars().contains(&c))
        .map(|(_, plain)| *plain)
        .unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trademark_and_edition() {
        assert_eq!(
            TitleNormalizer::normalize("The Witcher® 3: Wild Hunt - Game of the Year Edition"),
            "the witcher 3 wild hunt"
        );
        assert_eq!(
            TitleNormalizer::normalize("DOOM Eternal Deluxe Edition"),
            "doom eternal"
        );
    }

    #[test]
    fn strips_bracketed_year_and_platform() {
        assert_eq!(TitleNormalizer::normalize("Prey (2017)"), "prey");
        assert_eq!(
            TitleNormalizer::normalize("Shadow of the Tomb Raider for Windows"),
            "shadow of the tomb raider"
        );
    }

    #[test]
    fn folds_case_and_diacritics() {
        assert_eq!(TitleNormalizer::normalize("Pokémon"), "pokemon");
        assert_eq!(TitleNormalizer::normalize("NieR:Automata™"), "nier automata");
    }

    #[test]
    fn similarity_ranks_exact_match_highest() {
        assert_eq!(TitleNormalizer::similarity("Portal 2", "Portal 2"), 1.0);
        assert_eq!(
            TitleNormalizer::similarity("Portal 2", "Portal 2 (Steam Edition)"),
            1.0
        );

        let close = TitleNormalizer::similarity("Portal 2", "Portal");
        let far = TitleNormalizer::similarity("Portal 2", "Half-Life 2");
        assert!(close > far);
        assert!(close < 1.0);
    }

    #[test]
    fn similarity_of_disjoint_titles_is_zero() {
        assert_eq!(TitleNormalizer::similarity("Portal", "Doom"), 0.0);
    }
}
