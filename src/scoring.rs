//! Word-level similarity scoring.
//!
//! All comparisons go through [`WordScorer`]: exact token-set overlap first,
//! approximate word pairing only when the exact score is zero. Scores are
//! in [0, 100]. Exact evidence is capped below 100 and fuzzy evidence is
//! penalized so it never outranks an exact match.

use crate::normalize::{meaningful_words, Normalizer};
use rustc_hash::FxHashSet;

/// Tunable constants of the scorer.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringWeights {
    /// Ceiling for exact token-set scores.
    pub exact_cap: f64,
    /// Fraction of search words that must be found in the target.
    pub min_search_coverage: f64,
    /// Minimum per-pair similarity (0-100) for a fuzzy pairing to count.
    pub fuzzy_pair_threshold: f64,
    /// Fraction removed from the averaged fuzzy similarity.
    pub fuzzy_penalty: f64,
    /// Whole-filename scores below this also try individual segments.
    pub filename_segment_threshold: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_cap: 95.0,
            min_search_coverage: 0.5,
            fuzzy_pair_threshold: 85.0,
            fuzzy_penalty: 0.2,
            filename_segment_threshold: 80.0,
        }
    }
}

/// Pre-tokenized filename: words of the whole cleaned name plus words of
/// each dash-separated segment long enough to be worth scoring.
#[derive(Clone, Debug, Default)]
pub struct FilenameWords {
    pub whole: Vec<String>,
    pub segments: Vec<Vec<String>>,
}

/// Minimum segment length (in characters) considered on its own.
const MIN_SEGMENT_LEN: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct WordScorer {
    normalizer: Normalizer,
    weights: ScoringWeights,
}

impl WordScorer {
    pub fn new(normalizer: Normalizer, weights: ScoringWeights) -> Self {
        Self { normalizer, weights }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Meaningful words of raw text under this scorer's normalization.
    pub fn words(&self, text: &str) -> Vec<String> {
        self.normalizer.extract_words(text)
    }

    pub fn filename_words(&self, filename: &str) -> FilenameWords {
        FilenameWords {
            whole: self.words(filename),
            segments: self
                .normalizer
                .segments(filename)
                .iter()
                .filter(|seg| seg.chars().count() >= MIN_SEGMENT_LEN)
                .map(|seg| meaningful_words(seg))
                .filter(|words| !words.is_empty())
                .collect(),
        }
    }

    /// Token-set overlap score.
    ///
    /// Zero unless at least `min_search_coverage` of the search words appear
    /// in the target; otherwise the mean of search and target coverage,
    /// scaled to 100 and capped at `exact_cap`.
    pub fn exact_word_score(&self, search: &[String], target: &[String]) -> f64 {
        if search.is_empty() || target.is_empty() {
            return 0.0;
        }
        let search_set: FxHashSet<&str> = search.iter().map(String::as_str).collect();
        let target_set: FxHashSet<&str> = target.iter().map(String::as_str).collect();
        let common = search_set.intersection(&target_set).count();
        if common == 0 {
            return 0.0;
        }

        let search_coverage = common as f64 / search_set.len() as f64;
        if search_coverage < self.weights.min_search_coverage {
            return 0.0;
        }
        let target_coverage = common as f64 / target_set.len() as f64;

        ((search_coverage + target_coverage) / 2.0 * 100.0).min(self.weights.exact_cap)
    }

    /// Approximate word pairing score.
    ///
    /// Each search word pairs with its most similar target word; only pairs
    /// at or above `fuzzy_pair_threshold` count. Enough search words must
    /// pair up, then the mean similarity is reduced by `fuzzy_penalty`.
    pub fn fuzzy_word_score(&self, search: &[String], target: &[String]) -> f64 {
        if search.is_empty() || target.is_empty() {
            return 0.0;
        }

        let matched: Vec<f64> = search
            .iter()
            .filter_map(|s| {
                let best = target
                    .iter()
                    .map(|t| strsim::normalized_levenshtein(s, t) * 100.0)
                    .fold(0.0_f64, f64::max);
                (best >= self.weights.fuzzy_pair_threshold).then_some(best)
            })
            .collect();

        if matched.is_empty()
            || (matched.len() as f64 / search.len() as f64) < self.weights.min_search_coverage
        {
            return 0.0;
        }

        let avg = matched.iter().sum::<f64>() / matched.len() as f64;
        (avg * (1.0 - self.weights.fuzzy_penalty)).clamp(0.0, 100.0)
    }

    /// Exact score, falling back to fuzzy only when exact finds nothing.
    pub fn score_words(&self, search: &[String], target: &[String]) -> f64 {
        let exact = self.exact_word_score(search, target);
        if exact > 0.0 {
            exact
        } else {
            self.fuzzy_word_score(search, target)
        }
    }

    /// Whole-filename score, or the best single segment when the whole name
    /// scores below `filename_segment_threshold`.
    pub fn score_filename(&self, search: &[String], target: &FilenameWords) -> f64 {
        let whole = self.score_words(search, &target.whole);
        if whole >= self.weights.filename_segment_threshold {
            return whole;
        }
        target
            .segments
            .iter()
            .map(|seg| self.score_words(search, seg))
            .fold(whole, f64::max)
    }

    pub fn match_strings(&self, a: &str, b: &str) -> f64 {
        self.score_words(&self.words(a), &self.words(b))
    }

    pub fn match_against_filename(&self, query: &str, filename: &str) -> f64 {
        self.score_filename(&self.words(query), &self.filename_words(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_identical_is_capped() {
        let scorer = WordScorer::default();
        assert_eq!(scorer.match_strings("Endymion Abduction", "endymion - abduction"), 95.0);
    }

    #[test]
    fn test_exact_requires_half_of_search_words() {
        let scorer = WordScorer::default();
        let search = words(&["alpha", "bravo", "charlie"]);
        assert_eq!(scorer.exact_word_score(&search, &words(&["alpha", "zulu"])), 0.0);
        // 2/3 of the search words, 2/2 of the target words
        let score = scorer.exact_word_score(&search, &words(&["alpha", "bravo"]));
        assert!((score - 83.333).abs() < 0.01);
    }

    #[test]
    fn test_fuzzy_catches_typos_with_penalty() {
        let scorer = WordScorer::default();
        let score = scorer.match_strings("Endymiom Abducsion", "Endymion Abduction");
        assert!(score > 0.0);
        assert!(score <= 80.0);
    }

    #[test]
    fn test_fuzzy_ignores_weak_pairs() {
        let scorer = WordScorer::default();
        assert_eq!(scorer.match_strings("completely different", "nothing alike here"), 0.0);
    }

    #[test]
    fn test_single_char_query_scores_zero() {
        let scorer = WordScorer::default();
        assert_eq!(scorer.match_strings("a", "a - a.mp3"), 0.0);
        assert_eq!(scorer.match_against_filename("a", "01-a_-_b-c.mp3"), 0.0);
    }

    #[test]
    fn test_filename_segment_recovery() {
        let scorer = WordScorer::default();
        let whole = scorer.match_strings("the claim", "01-omi_-_the_claim-nrg.mp3");
        let with_segments = scorer.match_against_filename("the claim", "01-omi_-_the_claim-nrg.mp3");
        assert!(whole < with_segments);
        assert_eq!(with_segments, 95.0);
    }

    #[test]
    fn test_filename_whole_match_skips_segments() {
        let scorer = WordScorer::default();
        let score = scorer.match_against_filename("omi the claim", "01-omi_-_the_claim-nrg.mp3");
        assert_eq!(score, 95.0);
    }

    #[test]
    fn test_custom_weights() {
        let scorer = WordScorer::new(
            Normalizer::default(),
            ScoringWeights { exact_cap: 100.0, ..ScoringWeights::default() },
        );
        assert_eq!(scorer.match_strings("Endymion Abduction", "Endymion Abduction"), 100.0);
    }

    proptest! {
        #[test]
        fn prop_match_strings_in_range(a in "\\PC{0,40}", b in "\\PC{0,40}") {
            let scorer = WordScorer::default();
            let score = scorer.match_strings(&a, &b);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn prop_filename_score_in_range(a in "[A-Za-z0-9 ]{0,30}", f in "[A-Za-z0-9_. -]{0,40}") {
            let scorer = WordScorer::default();
            let score = scorer.match_against_filename(&a, &f);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn prop_self_match_is_high(s in "[a-z]{3,12}( [a-z]{3,12}){0,3}") {
            let scorer = WordScorer::default();
            prop_assume!(!scorer.words(&s).is_empty());
            prop_assert!(scorer.match_strings(&s, &s) >= 95.0);
        }
    }
}
