//! Post-hoc ranking bonuses and unattended auto-selection.
//!
//! Bonuses never change which candidates a result contains or their base
//! scores. They only decide which one candidate an unattended batch picks.

use crate::config::SelectionConfig;
use crate::error::ExportError;
use crate::models::{BonusReason, CatalogRecord, MatchCandidate, MatchResult, RankingBonus, SharedRecord};
use crate::normalize::{fold_to_ascii, Normalizer};
use crate::parser::{PlaylistEntry, MIX_KEYWORD};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

pub const EXACT_ARTIST_BONUS: f64 = 5.0;
pub const CO_ARTIST_BONUS: f64 = 8.0;
pub const REMIX_EXACT_BONUS: f64 = 20.0;
pub const REMIX_MOSTLY_BONUS: f64 = 15.0;
pub const REMIX_PARTIAL_BONUS: f64 = 8.0;

/// Fraction of distinguishing remix words needed for the larger partial bonus.
const REMIX_MOSTLY_FRACTION: f64 = 0.7;

const FORMAT_WEIGHT: f64 = 0.7;
const BITRATE_WEIGHT: f64 = 0.3;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Fold and strip punctuation without removing qualifiers.
fn loose(text: &str) -> String {
    NON_ALNUM.replace_all(&fold_to_ascii(text), " ").trim().to_string()
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    !phrase.is_empty() && format!(" {} ", haystack).contains(&format!(" {} ", phrase))
}

fn record_haystack(record: &CatalogRecord) -> String {
    loose(&format!(
        "{} {} {}",
        record.filename,
        record.artist.as_deref().unwrap_or(""),
        record.title.as_deref().unwrap_or("")
    ))
}

fn remix_bonus(remix: &str, haystack: &str) -> Option<BonusReason> {
    let phrase = loose(remix);
    if contains_phrase(haystack, &phrase) {
        return Some(BonusReason::RemixExact(REMIX_EXACT_BONUS));
    }

    let words: Vec<&str> = phrase.split_whitespace().filter(|w| w.len() >= 2).collect();
    let distinguishing: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !MIX_KEYWORD.is_match(w))
        .collect();
    let terms = if distinguishing.is_empty() { words } else { distinguishing };
    if terms.is_empty() {
        return None;
    }

    let found = terms.iter().filter(|w| contains_phrase(haystack, w)).count();
    let fraction = found as f64 / terms.len() as f64;
    if fraction >= REMIX_MOSTLY_FRACTION {
        Some(BonusReason::RemixMostly(REMIX_MOSTLY_BONUS))
    } else if found > 0 {
        Some(BonusReason::RemixPartial(REMIX_PARTIAL_BONUS))
    } else {
        None
    }
}

/// Format bonus by position in the preference list: +3, +2, then +1.
pub fn format_bonus(record: &CatalogRecord, selection: &SelectionConfig) -> f64 {
    match record.format_lower().and_then(|f| selection.format_rank(&f)) {
        Some(0) => 3.0,
        Some(1) => 2.0,
        Some(_) => 1.0,
        None => 0.0,
    }
}

pub fn bitrate_bonus(record: &CatalogRecord, selection: &SelectionConfig) -> f64 {
    if !selection.prefer_higher_bitrate {
        return 0.0;
    }
    match record.bitrate {
        Some(b) if b >= selection.high_bitrate_kbps => 2.0,
        Some(b) if b >= selection.good_bitrate_kbps => 1.0,
        _ => 0.0,
    }
}

/// Additive bonus for one candidate of one entry.
pub fn compute_bonus(
    entry: &PlaylistEntry,
    candidate: &MatchCandidate,
    normalizer: &Normalizer,
    selection: &SelectionConfig,
) -> RankingBonus {
    let record = &candidate.record;
    let mut bonus = RankingBonus::default();

    if let Some(record_artist) = record.artist.as_deref() {
        let record_artist = normalizer.clean(record_artist);
        let exact = [entry.credit.as_deref(), entry.artist.as_deref()]
            .into_iter()
            .flatten()
            .any(|a| {
                let a = normalizer.clean(a);
                !a.is_empty() && a == record_artist
            });
        if exact {
            bonus.add(BonusReason::ExactArtist(EXACT_ARTIST_BONUS));
        }
    }

    let haystack = record_haystack(record);
    let artists = entry.all_artists();
    if artists.len() > 1 {
        let present = artists
            .iter()
            .filter(|a| contains_phrase(&haystack, &loose(a)))
            .count();
        if present >= 2 {
            bonus.add(BonusReason::CoArtists(CO_ARTIST_BONUS));
        }
    }

    if let Some(reason) = entry.remix.as_deref().and_then(|r| remix_bonus(r, &haystack)) {
        bonus.add(reason);
    }

    let format = format_bonus(record, selection);
    if format > 0.0 {
        bonus.add(BonusReason::Format(format));
    }
    let bitrate = bitrate_bonus(record, selection);
    if bitrate > 0.0 {
        bonus.add(BonusReason::Bitrate(bitrate));
    }

    bonus
}

/// Weighted quality in [0, 100]: 70% format preference, 30% bitrate.
pub fn quality_score(record: &CatalogRecord, selection: &SelectionConfig) -> f64 {
    let n = selection.format_preferences.len();
    let format_score = match record.format_lower().and_then(|f| selection.format_rank(&f)) {
        Some(rank) if n > 0 => (n - rank) as f64 / n as f64 * 100.0,
        _ => 0.0,
    };
    let bitrate_score = if selection.prefer_higher_bitrate {
        record.bitrate.map_or(0.0, |b| (b as f64 / 5.0).min(100.0))
    } else {
        0.0
    };
    format_score * FORMAT_WEIGHT + bitrate_score * BITRATE_WEIGHT
}

/// Attach bonuses to every candidate of a result.
pub fn apply_bonuses(result: &mut MatchResult, normalizer: &Normalizer, selection: &SelectionConfig) {
    let entry = &result.entry;
    for candidate in result.candidates.iter_mut() {
        let bonus = compute_bonus(entry, candidate, normalizer, selection);
        candidate.bonus = Some(bonus);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    TopRanked,
    QualityTieBreak,
}

/// The single candidate picked for one entry.
#[derive(Clone, Debug)]
pub struct Selection {
    pub line_number: usize,
    /// Index into the result's candidate list.
    pub index: usize,
    pub record: SharedRecord,
    pub score: f64,
    pub ranked_score: f64,
    pub quality: f64,
    pub reason: SelectionReason,
}

/// Pick at most one candidate.
///
/// Only candidates whose pre-bonus score reaches `min_score` are eligible.
/// The highest ranked score wins, unless another eligible candidate within
/// `score_tolerance` of it has a quality score better by more than
/// `quality_margin`.
pub fn auto_select(result: &MatchResult, selection: &SelectionConfig) -> Option<Selection> {
    let eligible: Vec<(usize, &MatchCandidate)> = result
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.score >= selection.min_score)
        .collect();

    let (top_idx, top) = eligible.iter().copied().fold(None, |best: Option<(usize, &MatchCandidate)>, cur| {
        match best {
            Some(b) if b.1.ranked_score() >= cur.1.ranked_score() => Some(b),
            _ => Some(cur),
        }
    })?;
    let top_ranked = top.ranked_score();
    let top_quality = quality_score(&top.record, selection);

    let challenger = eligible
        .iter()
        .filter(|(idx, c)| *idx != top_idx && top_ranked - c.ranked_score() <= selection.score_tolerance)
        .map(|(idx, c)| (*idx, *c, quality_score(&c.record, selection)))
        .fold(None, |best: Option<(usize, &MatchCandidate, f64)>, cur| match best {
            Some(b) if b.2 >= cur.2 => Some(b),
            _ => Some(cur),
        });

    let (index, pick, quality, reason) = match challenger {
        Some((idx, c, q)) if q - top_quality > selection.quality_margin => {
            debug!(
                "Line {}: preferring {} over {} on quality ({:.1} vs {:.1})",
                result.entry.line_number, c.record.path, top.record.path, q, top_quality
            );
            (idx, c, q, SelectionReason::QualityTieBreak)
        }
        _ => (top_idx, top, top_quality, SelectionReason::TopRanked),
    };

    Some(Selection {
        line_number: result.entry.line_number,
        index,
        record: pick.record.clone(),
        score: pick.score,
        ranked_score: pick.ranked_score(),
        quality,
        reason,
    })
}

/// Apply bonuses and auto-select across a batch. One slot per result.
pub fn rank_and_select(
    results: &mut [MatchResult],
    normalizer: &Normalizer,
    selection: &SelectionConfig,
) -> Vec<Option<Selection>> {
    results
        .iter_mut()
        .map(|result| {
            apply_bonuses(result, normalizer, selection);
            auto_select(result, selection)
        })
        .collect()
}

// ============================================================================
// Selection Summary
// ============================================================================

/// Batch-level view of auto-selection.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SelectionSummary {
    pub total_entries: usize,
    pub entries_with_candidates: usize,
    pub entries_with_selection: usize,
    pub missing_entries: usize,
    pub multiple_candidates: usize,
    pub quality_tie_breaks: usize,
    /// Selected entries as a percentage of all entries
    pub selection_rate: f64,
    pub score_ranges: BTreeMap<String, usize>,
    pub format_distribution: BTreeMap<String, usize>,
    pub bitrate_ranges: BTreeMap<String, usize>,
}

fn score_bucket(score: f64) -> &'static str {
    match score {
        s if s >= 95.0 => "95-100",
        s if s >= 90.0 => "90-94",
        s if s >= 85.0 => "85-89",
        s if s >= 80.0 => "80-84",
        _ => "below 80",
    }
}

fn bitrate_bucket(bitrate: Option<u32>) -> &'static str {
    match bitrate {
        None => "unknown",
        Some(b) if b >= 320 => "320+",
        Some(b) if b >= 256 => "256-319",
        Some(b) if b >= 192 => "192-255",
        Some(b) if b >= 128 => "128-191",
        Some(_) => "below 128",
    }
}

impl SelectionSummary {
    pub fn from_results(results: &[MatchResult], selections: &[Option<Selection>]) -> Self {
        let mut summary = SelectionSummary {
            total_entries: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.candidates.len() {
                0 => summary.missing_entries += 1,
                1 => summary.entries_with_candidates += 1,
                _ => {
                    summary.entries_with_candidates += 1;
                    summary.multiple_candidates += 1;
                }
            }
        }
        for selection in selections.iter().flatten() {
            summary.entries_with_selection += 1;
            if selection.reason == SelectionReason::QualityTieBreak {
                summary.quality_tie_breaks += 1;
            }
            *summary.score_ranges.entry(score_bucket(selection.score).to_string()).or_default() += 1;
            let format = selection.record.format_lower().unwrap_or_else(|| "unknown".to_string());
            *summary.format_distribution.entry(format).or_default() += 1;
            *summary
                .bitrate_ranges
                .entry(bitrate_bucket(selection.record.bitrate).to_string())
                .or_default() += 1;
        }
        summary.selection_rate = if summary.total_entries == 0 {
            0.0
        } else {
            100.0 * summary.entries_with_selection as f64 / summary.total_entries as f64
        };
        summary
    }

    /// Human-readable report.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Auto-selection summary");
        let _ = writeln!(out, "  Entries:              {}", self.total_entries);
        let _ = writeln!(out, "  With candidates:      {}", self.entries_with_candidates);
        let _ = writeln!(out, "  Selected:             {} ({:.1}%)", self.entries_with_selection, self.selection_rate);
        let _ = writeln!(out, "  Missing:              {}", self.missing_entries);
        let _ = writeln!(out, "  Multiple candidates:  {}", self.multiple_candidates);
        let _ = writeln!(out, "  Quality tie-breaks:   {}", self.quality_tie_breaks);
        for (title, map) in [
            ("Score ranges", &self.score_ranges),
            ("Formats", &self.format_distribution),
            ("Bitrates", &self.bitrate_ranges),
        ] {
            if map.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}:", title);
            for (key, count) in map {
                let _ = writeln!(out, "  {:<12} {}", key, count);
            }
        }
        out
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ExportError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldScores, MatchField, ResolveTrace, StrategyTag};
    use crate::parser::{EntryParser, EnhancedParser, VariantKind};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn rec(filename: &str, artist: Option<&str>, format: &str, bitrate: Option<u32>) -> CatalogRecord {
        CatalogRecord {
            path: format!("/music/{}", filename),
            filename: filename.to_string(),
            artist: artist.map(str::to_string),
            format: Some(format.to_string()),
            bitrate,
            ..Default::default()
        }
    }

    fn cand(record: CatalogRecord, score: f64) -> MatchCandidate {
        MatchCandidate {
            record: Arc::new(record),
            scores: FieldScores::default(),
            score,
            bonus: None,
            strategy: StrategyTag { variant: VariantKind::Original, field: MatchField::Filename },
        }
    }

    fn result(line: &str, candidates: Vec<MatchCandidate>) -> MatchResult {
        MatchResult {
            entry: EnhancedParser.parse(line, 1),
            candidates,
            variant: Some(VariantKind::Original),
            trace: ResolveTrace::default(),
        }
    }

    fn bonus_for(line: &str, record: CatalogRecord) -> RankingBonus {
        let entry = EnhancedParser.parse(line, 1);
        compute_bonus(&entry, &cand(record, 90.0), &Normalizer::default(), &SelectionConfig::default())
    }

    #[test]
    fn test_exact_artist_format_and_bitrate() {
        let bonus = bonus_for(
            "Endymion - Abduction",
            rec("endymion-abduction.flac", Some("Endymion"), "flac", Some(1411)),
        );
        assert_eq!(bonus.total, 10.0);
        assert!(bonus.reasons.contains(&BonusReason::ExactArtist(5.0)));
    }

    #[test]
    fn test_co_artist_bonus() {
        let bonus = bonus_for(
            "A Artist, B Artist - Title",
            rec("a_artist_and_b_artist-title.mp3", None, "mp3", None),
        );
        assert_eq!(bonus.reasons, vec![BonusReason::CoArtists(8.0), BonusReason::Format(1.0)]);

        let bonus = bonus_for("A Artist, B Artist - Title", rec("a_artist-title.mp3", None, "mp3", None));
        assert!(!bonus.reasons.iter().any(|r| matches!(r, BonusReason::CoArtists(_))));
    }

    #[test]
    fn test_remix_bonus_levels() {
        let line = "Artist - Title (Foo Remix)";
        let exact = bonus_for(line, rec("artist-title_(foo_remix).ogg", None, "opus", None));
        assert_eq!(exact.reasons, vec![BonusReason::RemixExact(20.0)]);

        let mostly = bonus_for(line, rec("artist-title-foo_edit.opus", None, "opus", None));
        assert_eq!(mostly.reasons, vec![BonusReason::RemixMostly(15.0)]);

        let other = bonus_for(line, rec("artist-title_(bar_remix).opus", None, "opus", None));
        assert!(other.reasons.is_empty());

        let partial = bonus_for(
            "Artist - Title (Foo Bar Remix)",
            rec("artist-title_(foo_dub).opus", None, "opus", None),
        );
        assert_eq!(partial.reasons, vec![BonusReason::RemixPartial(8.0)]);
    }

    #[test]
    fn test_bitrate_bonus_respects_preference() {
        let mut selection = SelectionConfig::default();
        let record = rec("x.mp3", None, "mp3", Some(256));
        assert_eq!(bitrate_bonus(&record, &selection), 1.0);
        selection.prefer_higher_bitrate = false;
        assert_eq!(bitrate_bonus(&record, &selection), 0.0);
    }

    #[test]
    fn test_quality_score_weights() {
        let selection = SelectionConfig::default();
        let flac = rec("a.flac", None, "flac", Some(1411));
        assert!((quality_score(&flac, &selection) - 100.0).abs() < 1e-9);
        let unknown = rec("a.xyz", None, "xyz", None);
        assert_eq!(quality_score(&unknown, &selection), 0.0);
    }

    #[test]
    fn test_auto_select_prefers_quality_within_tolerance() {
        let selection = SelectionConfig::default();
        let mut r = result(
            "Endymion - Abduction",
            vec![
                cand(rec("a.m4a", None, "m4a", Some(320)), 96.0),
                cand(rec("b.flac", None, "flac", Some(1411)), 92.0),
            ],
        );
        apply_bonuses(&mut r, &Normalizer::default(), &selection);
        // 96 + 1 + 2 = 99 vs 92 + 3 + 2 = 97
        let pick = auto_select(&r, &selection).unwrap();
        assert_eq!(pick.record.filename, "b.flac");
        assert_eq!(pick.index, 1);
        assert_eq!(pick.reason, SelectionReason::QualityTieBreak);
    }

    #[test]
    fn test_auto_select_keeps_top_outside_tolerance() {
        let selection = SelectionConfig::default();
        let mut r = result(
            "Endymion - Abduction",
            vec![
                cand(rec("a.mp3", None, "mp3", Some(128)), 95.0),
                cand(rec("b.flac", None, "flac", Some(1411)), 82.0),
            ],
        );
        apply_bonuses(&mut r, &Normalizer::default(), &selection);
        let pick = auto_select(&r, &selection).unwrap();
        assert_eq!(pick.record.filename, "a.mp3");
        assert_eq!(pick.reason, SelectionReason::TopRanked);
    }

    #[test]
    fn test_auto_select_ignores_bonus_for_eligibility() {
        let selection = SelectionConfig::default();
        let mut r = result(
            "Endymion - Abduction",
            vec![cand(rec("a.flac", Some("Endymion"), "flac", Some(1411)), 78.0)],
        );
        apply_bonuses(&mut r, &Normalizer::default(), &selection);
        assert!(r.candidates[0].ranked_score() > 80.0);
        assert!(auto_select(&r, &selection).is_none());
    }

    #[test]
    fn test_selection_summary() {
        let selection = SelectionConfig::default();
        let mut results = vec![
            result("A - B", vec![cand(rec("a.flac", None, "flac", Some(900)), 96.0)]),
            result(
                "C - D",
                vec![
                    cand(rec("c.mp3", None, "mp3", Some(192)), 85.0),
                    cand(rec("d.mp3", None, "mp3", Some(192)), 84.0),
                ],
            ),
            result("E - F", vec![]),
            result("G - H", vec![cand(rec("g.mp3", None, "mp3", None), 76.0)]),
        ];
        let selections = rank_and_select(&mut results, &Normalizer::default(), &selection);
        let summary = SelectionSummary::from_results(&results, &selections);

        assert_eq!(summary.total_entries, 4);
        assert_eq!(summary.entries_with_candidates, 3);
        assert_eq!(summary.entries_with_selection, 2);
        assert_eq!(summary.missing_entries, 1);
        assert_eq!(summary.multiple_candidates, 1);
        assert_eq!(summary.selection_rate, 50.0);
        assert_eq!(summary.format_distribution.get("flac"), Some(&1));
        assert_eq!(summary.bitrate_ranges.get("192-255"), Some(&1));
        assert_eq!(summary.score_ranges.get("95-100"), Some(&1));
        assert!(summary.render_text().contains("Selected:             2 (50.0%)"));
    }

    proptest! {
        #[test]
        fn prop_auto_select_respects_minimum(
            scores in prop::collection::vec(0.0f64..100.0, 0..12),
            bitrates in prop::collection::vec(prop::option::of(64u32..1500), 12),
        ) {
            let selection = SelectionConfig::default();
            let formats = ["flac", "mp3", "wav", "ogg", "xyz"];
            let candidates: Vec<MatchCandidate> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| cand(rec(&format!("{}.{}", i, formats[i % 5]), None, formats[i % 5], bitrates[i]), *s))
                .collect();
            let mut r = result("Artist - Title", candidates);
            apply_bonuses(&mut r, &Normalizer::default(), &selection);
            match auto_select(&r, &selection) {
                Some(pick) => {
                    prop_assert!(pick.score >= selection.min_score);
                    prop_assert!(pick.index < r.candidates.len());
                }
                None => prop_assert!(scores.iter().all(|s| *s < selection.min_score)),
            }
        }
    }
}
