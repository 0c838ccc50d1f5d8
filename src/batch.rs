//! Playlist reading and parallel batch resolution.
//!
//! Entries are resolved on the rayon pool against one configuration
//! snapshot. Progress events flow back over a channel to the calling thread,
//! which owns the user callback. Cancellation is checked between entries.

use crate::catalog::CatalogProvider;
use crate::config::{MatchConfig, SharedConfig};
use crate::matcher::Matcher;
use crate::models::{BatchStats, MatchResult};
use crate::parser::{EntryParser, PlaylistEntry};
use crate::ranking::{rank_and_select, Selection};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

// ============================================================================
// Playlist input
// ============================================================================

/// Non-empty, non-comment lines with their 1-based physical line numbers.
pub fn playlist_lines(text: &str) -> Vec<(usize, String)> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = if idx == 0 { line.trim_start_matches('\u{feff}') } else { line };
            let line = line.trim();
            (!line.is_empty() && !line.starts_with('#')).then(|| (idx + 1, line.to_string()))
        })
        .collect()
}

pub fn parse_playlist(text: &str, parser: &dyn EntryParser) -> Vec<PlaylistEntry> {
    playlist_lines(text)
        .into_iter()
        .map(|(line_number, line)| parser.parse(&line, line_number))
        .collect()
}

pub fn read_playlist(path: &Path, parser: &dyn EntryParser) -> std::io::Result<Vec<PlaylistEntry>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_playlist(&text, parser))
}

// ============================================================================
// Cancellation and progress
// ============================================================================

/// Cooperative cancellation signal shared with a running batch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sent once per finished entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub line_number: usize,
    pub resolved: bool,
}

// ============================================================================
// Batch resolution
// ============================================================================

pub struct BatchOutcome {
    /// In input order. Shorter than the input if the batch was cancelled.
    pub results: Vec<MatchResult>,
    /// One slot per result; all `None` unless auto-select is enabled.
    pub selections: Vec<Option<Selection>>,
    pub stats: BatchStats,
    /// Configuration the batch ran with.
    pub config: MatchConfig,
}

pub struct BatchResolver {
    catalog: Arc<dyn CatalogProvider>,
    config: SharedConfig,
    cancel: CancelFlag,
}

impl BatchResolver {
    pub fn new(catalog: Arc<dyn CatalogProvider>, config: SharedConfig) -> Self {
        Self {
            catalog,
            config,
            cancel: CancelFlag::default(),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Resolve every entry. `on_progress` runs on the calling thread after
    /// each entry completes.
    pub fn run(&self, entries: Vec<PlaylistEntry>, mut on_progress: impl FnMut(&ProgressEvent)) -> BatchOutcome {
        let config = self.config.snapshot();
        let matcher = Matcher::new(Arc::clone(&self.catalog), config.clone());
        let total = entries.len();
        let start = Instant::now();
        info!(
            "Resolving {} entries (threshold {:.0}, parser {:?})",
            total, config.similarity_threshold, config.parser
        );

        let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
        let completed = AtomicUsize::new(0);
        let matcher_ref = &matcher;
        let cancel = &self.cancel;
        let completed_ref = &completed;

        let resolved: Vec<Option<MatchResult>> = std::thread::scope(|s| {
            let worker = s.spawn(move || {
                entries
                    .into_par_iter()
                    .map_with(tx, |tx, entry| {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let result = matcher_ref.resolve(entry);
                        let done = completed_ref.fetch_add(1, Ordering::Relaxed) + 1;
                        // The receiver outlives the workers; a send error only means nobody listens.
                        let _ = tx.send(ProgressEvent {
                            completed: done,
                            total,
                            line_number: result.entry.line_number,
                            resolved: result.is_resolved(),
                        });
                        Some(result)
                    })
                    .collect::<Vec<Option<MatchResult>>>()
            });

            for event in rx.iter() {
                on_progress(&event);
            }

            match worker.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        let cancelled = resolved.iter().any(Option::is_none);
        let mut results: Vec<MatchResult> = resolved.into_iter().flatten().collect();

        let selections = if config.selection.auto_select {
            rank_and_select(&mut results, matcher.scorer().normalizer(), &config.selection)
        } else {
            vec![None; results.len()]
        };

        let mut stats = BatchStats {
            total_entries: total,
            threshold: config.similarity_threshold,
            cancelled,
            ..Default::default()
        };
        for result in &results {
            stats.record(result);
        }
        stats.elapsed_seconds = start.elapsed().as_secs_f64();

        if cancelled {
            info!("Batch cancelled after {} of {} entries", results.len(), total);
        }
        info!(
            "Resolved {}/{} entries ({:.1}%) in {:.1}s",
            stats.resolved_entries,
            stats.processed_entries,
            stats.match_rate(),
            stats.elapsed_seconds
        );

        BatchOutcome {
            results,
            selections,
            stats,
            config,
        }
    }
}
