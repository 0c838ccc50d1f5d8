//! Matcher configuration.
//!
//! Every threshold the matcher and the selection policy read lives here.
//! A [`MatchConfig`] is an owned value; batch runs take one snapshot from a
//! [`SharedConfig`] at start and use it unchanged until they finish.

use crate::error::ConfigError;
use crate::normalize::{fold_to_ascii, Normalizer, DEFAULT_IGNORE_SUFFIXES};
use crate::parser::ParserKind;
use crate::scoring::{ScoringWeights, WordScorer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Candidates below this combined score are dropped (0-100).
    pub similarity_threshold: f64,
    /// A variant whose top score reaches this ends the variant loop.
    pub good_enough_score: f64,
    /// Below this best score, retry with artist-only and title-only queries.
    pub field_retry_below: f64,
    pub max_results: usize,
    /// Entries with fewer letters and digits than this after cleaning are skipped.
    pub min_query_chars: usize,
    /// Scores at or above this are re-checked against artist+title words.
    pub suspicious_score: f64,
    /// Minimum fraction of query words found in artist+title for a suspicious score to stand.
    pub suspicious_min_overlap: f64,
    /// Score given to a suspicious candidate that fails the overlap check.
    pub suspicious_cap: f64,
    pub parser: ParserKind,
    pub scoring: ScoringConfig,
    pub prefilter: PrefilterConfig,
    pub selection: SelectionConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 75.0,
            good_enough_score: 85.0,
            field_retry_below: 70.0,
            max_results: 50,
            min_query_chars: 3,
            suspicious_score: 99.0,
            suspicious_min_overlap: 0.4,
            suspicious_cap: 85.0,
            parser: ParserKind::default(),
            scoring: ScoringConfig::default(),
            prefilter: PrefilterConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub exact_cap: f64,
    pub min_search_coverage: f64,
    pub fuzzy_pair_threshold: f64,
    pub fuzzy_penalty: f64,
    pub filename_segment_threshold: f64,
    /// Label suffixes dropped from the end of filenames.
    pub ignore_suffixes: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = ScoringWeights::default();
        Self {
            exact_cap: weights.exact_cap,
            min_search_coverage: weights.min_search_coverage,
            fuzzy_pair_threshold: weights.fuzzy_pair_threshold,
            fuzzy_penalty: weights.fuzzy_penalty,
            filename_segment_threshold: weights.filename_segment_threshold,
            ignore_suffixes: DEFAULT_IGNORE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScoringConfig {
    pub fn weights(&self) -> ScoringWeights {
        ScoringWeights {
            exact_cap: self.exact_cap,
            min_search_coverage: self.min_search_coverage,
            fuzzy_pair_threshold: self.fuzzy_pair_threshold,
            fuzzy_penalty: self.fuzzy_penalty,
            filename_segment_threshold: self.filename_segment_threshold,
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(&self.ignore_suffixes)
    }

    pub fn scorer(&self) -> WordScorer {
        WordScorer::new(self.normalizer(), self.weights())
    }
}

/// Word-filtered candidate retrieval for large catalogs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    /// Catalogs with more records than this are pre-filtered.
    pub catalog_threshold: usize,
    pub candidate_limit: usize,
    /// A pre-filtered set smaller than this is discarded in favor of the full catalog.
    pub min_candidates: usize,
    /// Query words handed to the provider.
    pub max_words: usize,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            catalog_threshold: 10_000,
            candidate_limit: 5_000,
            min_candidates: 50,
            max_words: 3,
        }
    }
}

/// Auto-select policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub auto_select: bool,
    /// Pre-bonus score a candidate needs to be picked.
    pub min_score: f64,
    /// Most preferred first.
    pub format_preferences: Vec<String>,
    pub prefer_higher_bitrate: bool,
    pub high_bitrate_kbps: u32,
    pub good_bitrate_kbps: u32,
    /// Ranked scores within this distance of the top count as tied.
    pub score_tolerance: f64,
    /// Quality advantage needed to switch away from the top ranked candidate.
    pub quality_margin: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            auto_select: false,
            min_score: 80.0,
            format_preferences: ["flac", "wav", "aiff", "mp3", "m4a", "aac", "ogg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            prefer_higher_bitrate: true,
            high_bitrate_kbps: 320,
            good_bitrate_kbps: 256,
            score_tolerance: 5.0,
            quality_margin: 10.0,
        }
    }
}

impl SelectionConfig {
    /// Position of a format in the preference list.
    pub fn format_rank(&self, format: &str) -> Option<usize> {
        let format = format.trim().trim_start_matches('.').to_lowercase();
        self.format_preferences.iter().position(|f| *f == format)
    }
}

fn check_score(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is outside 0-100", value),
        })
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is outside 0-1", value),
        })
    }
}

fn check_positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than 0".to_string(),
        })
    }
}

impl MatchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: MatchConfig = toml::from_str(s)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Lowercase formats and suffixes so lookups need no further folding.
    pub fn normalized(mut self) -> Self {
        self.selection.format_preferences = self
            .selection
            .format_preferences
            .iter()
            .map(|f| f.trim().trim_start_matches('.').to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        self.scoring.ignore_suffixes = self
            .scoring
            .ignore_suffixes
            .iter()
            .map(|s| fold_to_ascii(s.trim()))
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_score("similarity_threshold", self.similarity_threshold)?;
        check_score("good_enough_score", self.good_enough_score)?;
        check_score("field_retry_below", self.field_retry_below)?;
        check_score("suspicious_score", self.suspicious_score)?;
        check_score("suspicious_cap", self.suspicious_cap)?;
        check_fraction("suspicious_min_overlap", self.suspicious_min_overlap)?;
        check_positive("max_results", self.max_results)?;

        check_score("scoring.exact_cap", self.scoring.exact_cap)?;
        check_score("scoring.fuzzy_pair_threshold", self.scoring.fuzzy_pair_threshold)?;
        check_score("scoring.filename_segment_threshold", self.scoring.filename_segment_threshold)?;
        check_fraction("scoring.min_search_coverage", self.scoring.min_search_coverage)?;
        check_fraction("scoring.fuzzy_penalty", self.scoring.fuzzy_penalty)?;

        check_positive("prefilter.candidate_limit", self.prefilter.candidate_limit)?;
        check_positive("prefilter.max_words", self.prefilter.max_words)?;

        check_score("selection.min_score", self.selection.min_score)?;
        check_score("selection.score_tolerance", self.selection.score_tolerance)?;
        check_score("selection.quality_margin", self.selection.quality_margin)?;
        Ok(())
    }
}

/// Configuration shared between a controlling thread and batch runs.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<MatchConfig>>,
}

impl SharedConfig {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Owned copy of the current configuration.
    pub fn snapshot(&self) -> MatchConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a change, rejecting it if the result does not validate.
    pub fn update(&self, f: impl FnOnce(&mut MatchConfig)) -> Result<(), ConfigError> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.clone();
        f(&mut next);
        next.validate()?;
        *guard = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.similarity_threshold, 75.0);
        assert_eq!(config.prefilter.catalog_threshold, 10_000);
        assert_eq!(config.selection.format_rank("FLAC"), Some(0));
        assert_eq!(config.selection.format_rank("opus"), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MatchConfig::from_toml_str(
            r#"
            similarity_threshold = 60
            parser = "basic"

            [selection]
            format_preferences = [".MP3", "flac"]

            [scoring]
            ignore_suffixes = ["Label"]
            "#,
        )
        .unwrap();
        assert_eq!(config.similarity_threshold, 60.0);
        assert_eq!(config.parser, ParserKind::Basic);
        assert_eq!(config.selection.format_preferences, vec!["mp3", "flac"]);
        assert_eq!(config.selection.min_score, 80.0);
        assert_eq!(config.scoring.ignore_suffixes, vec!["label"]);
        assert_eq!(config.max_results, 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = MatchConfig::from_toml_str("similarity_threshold = 140").unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
        assert!(MatchConfig::from_toml_str("[scoring]\nfuzzy_penalty = 2.0").is_err());
        assert!(matches!(
            MatchConfig::from_toml_str("similarity_threshold = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = MatchConfig::load(Path::new("/nonexistent/track-resolver.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.toml");
        std::fs::write(&path, "max_results = 10\n[prefilter]\nmin_candidates = 5\n").unwrap();
        let config = MatchConfig::load(&path).unwrap();
        assert_eq!(config.max_results, 10);
        assert_eq!(config.prefilter.min_candidates, 5);
    }

    #[test]
    fn test_shared_snapshot_is_isolated() {
        let shared = SharedConfig::new(MatchConfig::default());
        let snapshot = shared.snapshot();
        shared.update(|c| c.similarity_threshold = 90.0).unwrap();
        assert_eq!(snapshot.similarity_threshold, 75.0);
        assert_eq!(shared.snapshot().similarity_threshold, 90.0);
        assert!(shared.update(|c| c.similarity_threshold = -1.0).is_err());
        assert_eq!(shared.snapshot().similarity_threshold, 90.0);
    }
}
