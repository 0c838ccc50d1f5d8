//! Entry resolution: candidate retrieval, multi-variant scoring, filtering
//! and re-validation for one playlist entry at a time.

use crate::catalog::CatalogProvider;
use crate::config::MatchConfig;
use crate::models::{
    FieldScores, MatchCandidate, MatchField, MatchResult, ResolveTrace, SharedRecord, StrategyTag,
};
use crate::parser::{parser_for, EntryParser, PlaylistEntry, SearchVariant, VariantKind};
use crate::scoring::{FilenameWords, WordScorer};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

/// A catalog record with every field tokenized. Full-catalog records are
/// prepared once per matcher, pre-filtered subsets once per entry.
#[derive(Clone)]
struct PreparedRecord {
    record: SharedRecord,
    artist: Vec<String>,
    title: Vec<String>,
    artist_title: Vec<String>,
    album: Vec<String>,
    filename: FilenameWords,
}

impl PreparedRecord {
    fn new(record: &SharedRecord, scorer: &WordScorer) -> Self {
        let artist = record.artist.as_deref().map(|a| scorer.words(a)).unwrap_or_default();
        let title = record.title.as_deref().map(|t| scorer.words(t)).unwrap_or_default();
        let mut artist_title = artist.clone();
        for word in &title {
            if !artist_title.contains(word) {
                artist_title.push(word.clone());
            }
        }
        Self {
            record: Arc::clone(record),
            album: record.album.as_deref().map(|a| scorer.words(a)).unwrap_or_default(),
            filename: scorer.filename_words(&record.filename),
            artist,
            title,
            artist_title,
        }
    }

    /// Words a suspicious score is checked against: artist and title, or the
    /// filename when the record carries neither.
    fn identity_words(&self) -> &[String] {
        if self.artist_title.is_empty() {
            &self.filename.whole
        } else {
            &self.artist_title
        }
    }
}

/// Candidates produced by one variant.
struct Attempt {
    kind: VariantKind,
    top: f64,
    candidates: Vec<(usize, MatchCandidate)>,
}

pub struct Matcher {
    catalog: Arc<dyn CatalogProvider>,
    parser: Box<dyn EntryParser>,
    scorer: WordScorer,
    config: MatchConfig,
    total_records: OnceCell<usize>,
    full_catalog: OnceCell<Vec<PreparedRecord>>,
}

impl Matcher {
    /// Build a matcher from a configuration snapshot. The parser and scorer
    /// are chosen by the configuration.
    pub fn new(catalog: Arc<dyn CatalogProvider>, config: MatchConfig) -> Self {
        Self {
            catalog,
            parser: parser_for(config.parser),
            scorer: config.scoring.scorer(),
            config,
            total_records: OnceCell::new(),
            full_catalog: OnceCell::new(),
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn EntryParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn scorer(&self) -> &WordScorer {
        &self.scorer
    }

    pub fn parser(&self) -> &dyn EntryParser {
        self.parser.as_ref()
    }

    /// Resolve a free-text manual query.
    pub fn search(&self, query: &str) -> MatchResult {
        self.resolve_line(query, 0)
    }

    pub fn resolve_line(&self, line: &str, line_number: usize) -> MatchResult {
        self.resolve(self.parser.parse(line, line_number))
    }

    pub fn resolve(&self, entry: PlaylistEntry) -> MatchResult {
        let mut trace = ResolveTrace::default();

        if self.scorer.normalizer().meaningful_char_count(&entry.original) < self.config.min_query_chars {
            debug!("Line {}: too short to match: {:?}", entry.line_number, entry.original);
            trace.too_short = true;
            return MatchResult::empty(entry, trace);
        }

        let query_words = self.scorer.words(&entry.original);
        let prepared = self.retrieve(&query_words, &mut trace);
        if prepared.is_empty() {
            return MatchResult::empty(entry, trace);
        }

        let mut best: Option<Attempt> = None;
        for variant in self.parser.variants(&entry.original) {
            trace.variants_tried += 1;
            let attempt = self.score_variant(&prepared, &variant);
            debug!(
                "Line {}: variant {} {:?} top {:.1}",
                entry.line_number,
                variant.kind.as_str(),
                variant.text,
                attempt.top
            );
            let good_enough = attempt.top >= self.config.good_enough_score;
            if best.as_ref().map_or(true, |b| attempt.top > b.top) {
                best = Some(attempt);
            }
            if good_enough {
                trace.early_stop = true;
                break;
            }
        }

        let best_top = best.as_ref().map_or(0.0, |b| b.top);
        if best_top < self.config.field_retry_below && entry.has_distinct_artist_title() {
            trace.field_retry = true;
            let retries = [
                (entry.credit.clone().unwrap_or_default(), VariantKind::ArtistField),
                (entry.title.clone(), VariantKind::TitleField),
            ];
            for (text, kind) in retries {
                let attempt = self.score_variant(&prepared, &SearchVariant { text, kind });
                if best.as_ref().map_or(true, |b| attempt.top > b.top) {
                    best = Some(attempt);
                }
            }
        }

        let Some(best) = best else {
            return MatchResult::empty(entry, trace);
        };

        let mut candidates: Vec<(usize, MatchCandidate)> = best
            .candidates
            .into_iter()
            .filter(|(_, c)| c.score >= self.config.similarity_threshold)
            .collect();
        candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

        trace.downgraded = self.revalidate(&query_words, &prepared, &mut candidates);
        if trace.downgraded > 0 {
            // A capped score may now sit below the threshold.
            candidates.retain(|(_, c)| c.score >= self.config.similarity_threshold);
            candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        }
        candidates.truncate(self.config.max_results);

        debug!(
            "Line {}: {} candidates via {}",
            entry.line_number,
            candidates.len(),
            best.kind.as_str()
        );

        MatchResult {
            entry,
            candidates: candidates.into_iter().map(|(_, c)| c).collect(),
            variant: Some(best.kind),
            trace,
        }
    }

    /// Cap near-perfect scores whose artist and title share too few words
    /// with the query. Returns the number of candidates capped.
    fn revalidate(
        &self,
        query_words: &[String],
        prepared: &[PreparedRecord],
        candidates: &mut [(usize, MatchCandidate)],
    ) -> usize {
        let mut downgraded = 0;
        for (idx, candidate) in candidates.iter_mut() {
            if candidate.score < self.config.suspicious_score {
                continue;
            }
            let identity: FxHashSet<&str> =
                prepared[*idx].identity_words().iter().map(String::as_str).collect();
            let found = query_words.iter().filter(|w| identity.contains(w.as_str())).count();
            let overlap = if query_words.is_empty() {
                0.0
            } else {
                found as f64 / query_words.len() as f64
            };
            if overlap < self.config.suspicious_min_overlap {
                debug!(
                    "Capping suspicious score {:.1} for {} (overlap {:.2})",
                    candidate.score, candidate.record.path, overlap
                );
                candidate.score = candidate.score.min(self.config.suspicious_cap);
                downgraded += 1;
            }
        }
        downgraded
    }

    fn score_variant(&self, prepared: &[PreparedRecord], variant: &SearchVariant) -> Attempt {
        let words = self.scorer.words(&variant.text);
        if words.is_empty() {
            return Attempt {
                kind: variant.kind,
                top: 0.0,
                candidates: Vec::new(),
            };
        }

        let candidates: Vec<(usize, MatchCandidate)> = prepared
            .par_iter()
            .enumerate()
            .filter_map(|(idx, rec)| {
                let scores = FieldScores {
                    artist: self.scorer.score_words(&words, &rec.artist),
                    title: self.scorer.score_words(&words, &rec.title),
                    artist_title: self.scorer.score_words(&words, &rec.artist_title),
                    album: self.scorer.score_words(&words, &rec.album),
                    filename: self.scorer.score_filename(&words, &rec.filename),
                };
                let (field, score) = scores.best();
                (score > 0.0).then(|| {
                    (
                        idx,
                        MatchCandidate {
                            record: Arc::clone(&rec.record),
                            scores,
                            score: score.clamp(0.0, 100.0),
                            bonus: None,
                            strategy: StrategyTag {
                                variant: variant.kind,
                                field,
                            },
                        },
                    )
                })
            })
            .collect();

        let top = candidates.iter().map(|(_, c)| c.score).fold(0.0, f64::max);
        Attempt {
            kind: variant.kind,
            top,
            candidates,
        }
    }

    fn total_records(&self) -> Result<usize, crate::error::CatalogError> {
        self.total_records
            .get_or_try_init(|| self.catalog.stats().map(|s| s.total_records))
            .copied()
    }

    fn prepare(&self, records: &[SharedRecord]) -> Vec<PreparedRecord> {
        records
            .par_iter()
            .map(|r| PreparedRecord::new(r, &self.scorer))
            .collect()
    }

    /// The whole catalog, read and tokenized on first use.
    fn full_catalog(&self) -> Result<&[PreparedRecord], crate::error::CatalogError> {
        self.full_catalog
            .get_or_try_init(|| self.catalog.all_records().map(|records| self.prepare(&records)))
            .map(Vec::as_slice)
    }

    /// Candidate pool for one entry. Provider failures are logged and yield
    /// an empty pool.
    fn retrieve(&self, query_words: &[String], trace: &mut ResolveTrace) -> Cow<'_, [PreparedRecord]> {
        let prefilter = &self.config.prefilter;
        let total = match self.total_records() {
            Ok(total) => total,
            Err(e) => {
                warn!("Catalog stats failed: {}", e);
                trace.catalog_error = true;
                return Cow::Owned(Vec::new());
            }
        };

        if total > prefilter.catalog_threshold && query_words.len() >= 2 {
            let words = &query_words[..query_words.len().min(prefilter.max_words)];
            match self.catalog.candidate_records(words, words, prefilter.candidate_limit) {
                Ok(subset) if subset.len() >= prefilter.min_candidates => {
                    trace.prefiltered = true;
                    return Cow::Owned(self.prepare(&subset));
                }
                Ok(subset) => {
                    debug!(
                        "Pre-filter returned {} of {} records, using full catalog",
                        subset.len(),
                        total
                    );
                    trace.prefilter_fallback = true;
                }
                Err(e) => {
                    warn!("Candidate retrieval failed: {}", e);
                    trace.catalog_error = true;
                    return Cow::Owned(Vec::new());
                }
            }
        }

        match self.full_catalog() {
            Ok(prepared) => Cow::Borrowed(prepared),
            Err(e) => {
                warn!("Catalog read failed: {}", e);
                trace.catalog_error = true;
                Cow::Owned(Vec::new())
            }
        }
    }
}
