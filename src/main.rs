use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;
use track_resolver::batch::{read_playlist, BatchResolver};
use track_resolver::catalog::{CatalogProvider, InMemoryCatalog, SqliteCatalog};
use track_resolver::config::{MatchConfig, SharedConfig};
use track_resolver::export::{write_csv_report, write_json_report, write_unresolved_csv, write_unresolved_text};
use track_resolver::matcher::Matcher;
use track_resolver::parser::parser_for;
use track_resolver::progress::{create_progress_bar, create_spinner, format_duration, log_progress, set_log_only};
use track_resolver::ranking::{apply_bonuses, SelectionSummary};
use track_resolver::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "track-resolver")]
#[command(about = "Resolve playlist entries to files in an audio catalog")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Similarity threshold (0-100), overrides the config file
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Hide progress bars and emit periodic log lines instead
    #[arg(long, global = true)]
    log_only: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve every line of a playlist file
    Resolve {
        /// Catalog: a JSON export (.json) or an indexer SQLite database
        catalog: PathBuf,

        playlist: PathBuf,

        /// Write a CSV report (one row per candidate)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a JSON report
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write unresolved entries (.txt/.m3u as a playlist, .csv as a table)
        #[arg(long)]
        unresolved: Option<PathBuf>,

        /// Write the auto-selection summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Write batch statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Pick one candidate per entry
        #[arg(long)]
        auto_select: bool,

        /// Minimum score for auto-selection (0-100)
        #[arg(long)]
        min_score: Option<f64>,

        #[arg(long, default_value = "0")]
        workers: usize,

        /// Log progress every N entries in log-only mode
        #[arg(long, default_value = "100")]
        log_interval: u64,
    },

    /// Run one manual query against the catalog
    Query {
        catalog: PathBuf,

        text: String,

        /// Number of candidates to print
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, threshold: Option<f64>) -> Result<MatchConfig> {
    let mut config = match path {
        Some(path) => MatchConfig::load(path).with_context(|| format!("Failed to load config {:?}", path))?,
        None => MatchConfig::default(),
    };
    if let Some(threshold) = threshold {
        config.similarity_threshold = threshold;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_catalog(path: &Path) -> Result<Arc<dyn CatalogProvider>> {
    if !path.exists() {
        bail!("Catalog not found: {:?}", path);
    }
    let spinner = create_spinner("Opening catalog");
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));
    let catalog: Arc<dyn CatalogProvider> = if is_json {
        let catalog = InMemoryCatalog::from_json_file(path).context("Failed to load catalog export")?;
        info!("Loaded {} catalog records from {:?}", catalog.len(), path);
        Arc::new(catalog)
    } else {
        Arc::new(SqliteCatalog::open(path).context("Failed to open catalog database")?)
    };
    spinner.finish_and_clear();

    let stats = catalog.stats().context("Failed to read catalog stats")?;
    info!("Catalog has {} records", stats.total_records);
    Ok(catalog)
}

/// The selection summary only exists when auto-select runs.
fn check_summary_output(summary: Option<&Path>, auto_select: bool) -> Result<()> {
    if let Some(path) = summary {
        if !auto_select {
            bail!(
                "--summary {:?} requires auto-select (pass --auto-select or enable selection.auto_select)",
                path
            );
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_resolve(
    mut config: MatchConfig,
    catalog_path: &Path,
    playlist: &Path,
    csv: Option<PathBuf>,
    json: Option<PathBuf>,
    unresolved: Option<PathBuf>,
    summary: Option<PathBuf>,
    stats_path: Option<PathBuf>,
    auto_select: bool,
    min_score: Option<f64>,
    log_interval: u64,
) -> Result<()> {
    config.selection.auto_select |= auto_select;
    if let Some(min_score) = min_score {
        config.selection.min_score = min_score;
    }
    config.validate().context("Invalid configuration")?;
    check_summary_output(summary.as_deref(), config.selection.auto_select)?;

    let sources = [catalog_path, playlist];
    let outputs: [(&Option<PathBuf>, &[&str]); 5] = [
        (&csv, &["csv"]),
        (&json, &["json"]),
        (&unresolved, &["txt", "m3u", "csv"]),
        (&summary, &["json"]),
        (&stats_path, &["json"]),
    ];
    for (path, extensions) in outputs {
        if let Some(path) = path {
            validate_output_path(path, extensions, &sources)?;
        }
    }

    let start = Instant::now();
    let parser = parser_for(config.parser);
    let entries = read_playlist(playlist, parser.as_ref())
        .with_context(|| format!("Failed to read playlist {:?}", playlist))?;
    info!("Read {} entries from {:?}", entries.len(), playlist);

    let catalog = open_catalog(catalog_path)?;
    let resolver = BatchResolver::new(catalog, SharedConfig::new(config));

    let total = entries.len() as u64;
    let pb = create_progress_bar(total, "Resolving");
    let outcome = resolver.run(entries, |event| {
        pb.set_position(event.completed as u64);
        log_progress("resolve", event.completed as u64, total, log_interval);
    });
    pb.finish_and_clear();
    outcome.stats.log_phase("resolve");

    if let Some(path) = &csv {
        write_csv_report(path, &outcome.results, &outcome.selections).context("Failed to write CSV report")?;
    }
    if let Some(path) = &json {
        write_json_report(path, &outcome.results, &outcome.selections).context("Failed to write JSON report")?;
    }
    if let Some(path) = &unresolved {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
        let written = if is_csv {
            write_unresolved_csv(path, &outcome.results)
        } else {
            write_unresolved_text(path, &outcome.results)
        };
        written.context("Failed to write unresolved entries")?;
    }
    if let Some(path) = &stats_path {
        outcome.stats.write_to_file(path).context("Failed to write stats")?;
    }

    let stats = &outcome.stats;
    println!("\n{:=<60}", "");
    println!("Resolution complete!");
    println!("  Entries:     {}", stats.processed_entries);
    println!("  Resolved:    {} ({:.1}%)", stats.resolved_entries, stats.match_rate());
    println!("  Multiple:    {}", stats.multiple_candidates);
    println!("  Unresolved:  {}", stats.unresolved_entries);
    if stats.cancelled {
        println!("  Cancelled after {} of {} entries", stats.processed_entries, stats.total_entries);
    }
    println!("  Elapsed:     {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if outcome.config.selection.auto_select {
        let selection_summary = SelectionSummary::from_results(&outcome.results, &outcome.selections);
        print!("{}", selection_summary.render_text());
        if let Some(path) = &summary {
            selection_summary
                .write_to_file(path)
                .context("Failed to write selection summary")?;
        }
    }

    Ok(())
}

fn run_query(config: MatchConfig, catalog_path: &Path, text: &str, limit: usize) -> Result<()> {
    let catalog = open_catalog(catalog_path)?;
    let selection = config.selection.clone();
    let matcher = Matcher::new(catalog, config);
    let mut result = matcher.search(text);
    apply_bonuses(&mut result, matcher.scorer().normalizer(), &selection);

    if !result.is_resolved() {
        println!("No match for {:?}", text);
        return Ok(());
    }

    println!(
        "{} candidates for {:?} (variant: {})",
        result.candidates.len(),
        text,
        result.variant.map_or("-", |v| v.as_str())
    );
    for (rank, c) in result.candidates.iter().take(limit).enumerate() {
        println!(
            "{:>3}. {:>5.1} (+{:>4.1}) {:<22} {}",
            rank + 1,
            c.score,
            c.bonus.as_ref().map_or(0.0, |b| b.total),
            c.strategy.label(),
            c.record.path
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);
    init_tracing();

    let config = load_config(args.config.as_deref(), args.threshold)?;

    match args.command {
        Command::Resolve {
            catalog,
            playlist,
            csv,
            json,
            unresolved,
            summary,
            stats,
            auto_select,
            min_score,
            workers,
            log_interval,
        } => {
            if workers > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build_global()
                    .context("Failed to set thread pool size")?;
            }
            run_resolve(
                config,
                &catalog,
                &playlist,
                csv,
                json,
                unresolved,
                summary,
                stats,
                auto_select,
                min_score,
                log_interval,
            )
        }
        Command::Query { catalog, text, limit } => run_query(config, &catalog, &text, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_requires_auto_select() {
        let path = Path::new("summary.json");
        assert!(check_summary_output(Some(path), false).is_err());
        assert!(check_summary_output(Some(path), true).is_ok());
        assert!(check_summary_output(None, false).is_ok());
    }
}
