//! Core data models shared by the matcher, ranking and reporting code.

use crate::error::ExportError;
use crate::parser::{PlaylistEntry, VariantKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Catalog Models
// ============================================================================

/// Metadata of one indexed audio file. Owned by the catalog provider and
/// never modified here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRecord {
    /// Unique path, also the record id.
    pub path: String,
    pub filename: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub format: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    /// kbps
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Artist was guessed from the filename rather than read from tags.
    pub artist_from_filename: bool,
    pub title_from_filename: bool,
}

impl CatalogRecord {
    /// Lowercase format, falling back to the filename extension.
    pub fn format_lower(&self) -> Option<String> {
        self.format
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(|f| f.trim().trim_start_matches('.').to_lowercase())
            .or_else(|| {
                Path::new(&self.filename)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase)
            })
    }
}

pub type SharedRecord = Arc<CatalogRecord>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_records: usize,
}

// ============================================================================
// Match Models
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Artist,
    Title,
    /// Artist and title words together.
    ArtistTitle,
    Album,
    Filename,
}

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchField::Artist => "artist",
            MatchField::Title => "title",
            MatchField::ArtistTitle => "artist_title",
            MatchField::Album => "album",
            MatchField::Filename => "filename",
        }
    }
}

/// Per-field similarity of one candidate against one variant (0-100 each).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FieldScores {
    pub artist: f64,
    pub title: f64,
    pub artist_title: f64,
    pub album: f64,
    pub filename: f64,
}

impl FieldScores {
    /// Best field and its score. Ties go to the field listed first.
    pub fn best(&self) -> (MatchField, f64) {
        [
            (MatchField::Artist, self.artist),
            (MatchField::Title, self.title),
            (MatchField::ArtistTitle, self.artist_title),
            (MatchField::Album, self.album),
            (MatchField::Filename, self.filename),
        ]
        .into_iter()
        .fold((MatchField::Artist, self.artist), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
    }
}

/// Which variant and which field produced a candidate's score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StrategyTag {
    pub variant: VariantKind,
    pub field: MatchField,
}

impl StrategyTag {
    pub fn label(&self) -> String {
        format!("{}:{}", self.variant.as_str(), self.field.as_str())
    }
}

/// Why a ranking bonus was awarded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "points")]
pub enum BonusReason {
    ExactArtist(f64),
    CoArtists(f64),
    RemixExact(f64),
    RemixMostly(f64),
    RemixPartial(f64),
    Format(f64),
    Bitrate(f64),
}

impl BonusReason {
    pub fn points(&self) -> f64 {
        match self {
            BonusReason::ExactArtist(p)
            | BonusReason::CoArtists(p)
            | BonusReason::RemixExact(p)
            | BonusReason::RemixMostly(p)
            | BonusReason::RemixPartial(p)
            | BonusReason::Format(p)
            | BonusReason::Bitrate(p) => *p,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RankingBonus {
    pub total: f64,
    pub reasons: Vec<BonusReason>,
}

impl RankingBonus {
    pub fn add(&mut self, reason: BonusReason) {
        self.total += reason.points();
        self.reasons.push(reason);
    }
}

/// Upper bound on score plus bonus.
pub const MAX_RANKED_SCORE: f64 = 150.0;

#[derive(Clone, Debug)]
pub struct MatchCandidate {
    pub record: SharedRecord,
    pub scores: FieldScores,
    /// Combined score in [0, 100], before bonuses.
    pub score: f64,
    pub bonus: Option<RankingBonus>,
    pub strategy: StrategyTag,
}

impl MatchCandidate {
    /// Score plus bonus, capped at [`MAX_RANKED_SCORE`].
    pub fn ranked_score(&self) -> f64 {
        let bonus = self.bonus.as_ref().map_or(0.0, |b| b.total);
        (self.score + bonus).min(MAX_RANKED_SCORE)
    }
}

/// What happened while resolving one entry. Feeds [`BatchStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResolveTrace {
    pub too_short: bool,
    pub prefiltered: bool,
    pub prefilter_fallback: bool,
    pub catalog_error: bool,
    pub variants_tried: usize,
    pub early_stop: bool,
    pub field_retry: bool,
    pub downgraded: usize,
}

#[derive(Clone, Debug)]
pub struct MatchResult {
    pub entry: PlaylistEntry,
    /// Descending by score.
    pub candidates: Vec<MatchCandidate>,
    /// Variant that produced the best-scoring attempt.
    pub variant: Option<VariantKind>,
    pub trace: ResolveTrace,
}

impl MatchResult {
    pub fn empty(entry: PlaylistEntry, trace: ResolveTrace) -> Self {
        Self {
            entry,
            candidates: Vec::new(),
            variant: None,
            trace,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.candidates.is_empty()
    }

    pub fn top(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    pub fn status(&self) -> MatchStatus {
        match self.candidates.len() {
            0 => MatchStatus::Missing,
            1 => MatchStatus::Found,
            _ => MatchStatus::Multiple,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MatchStatus {
    Found,
    Multiple,
    Missing,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Found => "Found",
            MatchStatus::Multiple => "Multiple",
            MatchStatus::Missing => "Missing",
        }
    }
}

// ============================================================================
// Batch Statistics
// ============================================================================

/// Counters for one batch run, logged and optionally written as JSON.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchStats {
    pub total_entries: usize,
    pub processed_entries: usize,
    pub resolved_entries: usize,
    pub unresolved_entries: usize,
    pub multiple_candidates: usize,
    pub too_short_entries: usize,

    // Candidate retrieval
    pub prefiltered_entries: usize,
    pub prefilter_fallbacks: usize,
    pub catalog_errors: usize,

    // Scoring
    pub early_stops: usize,
    pub field_retries: usize,
    pub suspicious_downgrades: usize,

    pub cancelled: bool,
    pub threshold: f64,
    pub elapsed_seconds: f64,
}

impl BatchStats {
    pub fn record(&mut self, result: &MatchResult) {
        self.processed_entries += 1;
        match result.status() {
            MatchStatus::Missing => self.unresolved_entries += 1,
            MatchStatus::Found => self.resolved_entries += 1,
            MatchStatus::Multiple => {
                self.resolved_entries += 1;
                self.multiple_candidates += 1;
            }
        }
        let trace = &result.trace;
        self.too_short_entries += trace.too_short as usize;
        self.prefiltered_entries += trace.prefiltered as usize;
        self.prefilter_fallbacks += trace.prefilter_fallback as usize;
        self.catalog_errors += trace.catalog_error as usize;
        self.early_stops += trace.early_stop as usize;
        self.field_retries += trace.field_retry as usize;
        self.suspicious_downgrades += trace.downgraded;
    }

    /// Resolved entries as a percentage of processed entries
    pub fn match_rate(&self) -> f64 {
        if self.processed_entries == 0 {
            0.0
        } else {
            100.0 * self.resolved_entries as f64 / self.processed_entries as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ExportError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{EntryParser, EnhancedParser};

    fn candidate(score: f64, bonus: f64) -> MatchCandidate {
        let mut ranking = RankingBonus::default();
        ranking.add(BonusReason::Format(bonus));
        MatchCandidate {
            record: Arc::new(CatalogRecord::default()),
            scores: FieldScores::default(),
            score,
            bonus: Some(ranking),
            strategy: StrategyTag {
                variant: VariantKind::Original,
                field: MatchField::Filename,
            },
        }
    }

    #[test]
    fn test_format_lower_falls_back_to_extension() {
        let record = CatalogRecord {
            filename: "Track.FLAC".to_string(),
            ..Default::default()
        };
        assert_eq!(record.format_lower().as_deref(), Some("flac"));

        let record = CatalogRecord {
            filename: "track.mp3".to_string(),
            format: Some(" .WAV".to_string()),
            ..Default::default()
        };
        assert_eq!(record.format_lower().as_deref(), Some("wav"));
    }

    #[test]
    fn test_field_scores_best() {
        let scores = FieldScores {
            artist: 40.0,
            title: 90.0,
            artist_title: 60.0,
            album: 0.0,
            filename: 90.0,
        };
        assert_eq!(scores.best(), (MatchField::Title, 90.0));
        assert_eq!(FieldScores::default().best(), (MatchField::Artist, 0.0));
    }

    #[test]
    fn test_ranked_score_is_capped() {
        assert_eq!(candidate(95.0, 3.0).ranked_score(), 98.0);
        assert_eq!(candidate(100.0, 80.0).ranked_score(), MAX_RANKED_SCORE);
    }

    #[test]
    fn test_batch_stats_record() {
        let entry = EnhancedParser.parse("Artist - Title", 1);
        let mut stats = BatchStats::default();
        let mut multi = MatchResult::empty(entry.clone(), ResolveTrace::default());
        multi.candidates = vec![candidate(90.0, 0.0), candidate(80.0, 0.0)];
        stats.record(&multi);
        stats.record(&MatchResult::empty(
            entry,
            ResolveTrace { prefilter_fallback: true, downgraded: 2, ..Default::default() },
        ));

        assert_eq!(stats.processed_entries, 2);
        assert_eq!(stats.resolved_entries, 1);
        assert_eq!(stats.multiple_candidates, 1);
        assert_eq!(stats.unresolved_entries, 1);
        assert_eq!(stats.prefilter_fallbacks, 1);
        assert_eq!(stats.suspicious_downgrades, 2);
        assert_eq!(stats.match_rate(), 50.0);
    }

    #[test]
    fn test_stats_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let stats = BatchStats { total_entries: 3, ..Default::default() };
        stats.write_to_file(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["total_entries"], 3);
    }
}
