//! Show how one query is cleaned, parsed and scored against one file
//!
//! Usage: explain-match "<query>" <filename> [--artist A] [--title T] [--album B]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use track_resolver::catalog::InMemoryCatalog;
use track_resolver::config::MatchConfig;
use track_resolver::matcher::Matcher;
use track_resolver::models::CatalogRecord;
use track_resolver::ranking::apply_bonuses;

#[derive(Parser)]
#[command(name = "explain-match")]
#[command(about = "Explain the score of a playlist query against one catalog file")]
struct Args {
    query: String,

    filename: String,

    #[arg(long)]
    artist: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    album: Option<String>,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn show_words(label: &str, words: &[String]) {
    println!("  {:<16} {:?}", label, words);
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => MatchConfig::load(path).with_context(|| format!("Failed to load config {:?}", path))?,
        None => MatchConfig::default(),
    };

    let scorer = config.scoring.scorer();
    let normalizer = scorer.normalizer();

    println!("Query: {:?}", args.query);
    println!("  {:<16} {:?}", "cleaned", normalizer.clean(&args.query));
    show_words("words", &scorer.words(&args.query));
    println!(
        "  {:<16} {}",
        "meaningful chars",
        normalizer.meaningful_char_count(&args.query)
    );

    println!("\nFile: {:?}", args.filename);
    let file_words = scorer.filename_words(&args.filename);
    println!("  {:<16} {:?}", "cleaned", normalizer.clean(&args.filename));
    show_words("words", &file_words.whole);
    for (i, segment) in file_words.segments.iter().enumerate() {
        show_words(&format!("segment {}", i + 1), segment);
    }

    let record = CatalogRecord {
        path: args.filename.clone(),
        filename: args.filename.clone(),
        artist: args.artist.clone(),
        title: args.title.clone(),
        album: args.album.clone(),
        ..Default::default()
    };
    let artist_words = record.artist.as_deref().map(|a| scorer.words(a)).unwrap_or_default();
    let title_words = record.title.as_deref().map(|t| scorer.words(t)).unwrap_or_default();
    let album_words = record.album.as_deref().map(|a| scorer.words(a)).unwrap_or_default();

    let matcher = Matcher::new(
        Arc::new(InMemoryCatalog::new(vec![record])),
        MatchConfig {
            similarity_threshold: 0.0,
            ..config.clone()
        },
    );
    let parser = matcher.parser();
    let entry = parser.parse(&args.query, 1);
    println!("\nParsed ({:?} parser):", parser.kind());
    println!("  {:<16} {:?}", "artist", entry.artist);
    println!("  {:<16} {:?}", "co-artists", entry.co_artists);
    println!("  {:<16} {:?}", "title", entry.title);
    println!("  {:<16} {:?}", "remix", entry.remix);

    println!("\nVariants:");
    println!(
        "  {:<22} {:>7} {:>7} {:>7} {:>9}  text",
        "kind", "exact", "fuzzy", "best", "filename"
    );
    for variant in parser.variants(&args.query) {
        let words = scorer.words(&variant.text);
        let tagged: Vec<String> = artist_words.iter().chain(&title_words).cloned().collect();
        let target = if tagged.is_empty() { &file_words.whole } else { &tagged };
        println!(
            "  {:<22} {:>7.1} {:>7.1} {:>7.1} {:>9.1}  {:?}",
            variant.kind.as_str(),
            scorer.exact_word_score(&words, target),
            scorer.fuzzy_word_score(&words, target),
            scorer.score_words(&words, target),
            scorer.score_filename(&words, &file_words),
            variant.text
        );
    }
    if !album_words.is_empty() {
        println!(
            "  {:<22} {:>7.1}",
            "album",
            scorer.score_words(&scorer.words(&args.query), &album_words)
        );
    }

    let mut result = matcher.resolve(entry);
    apply_bonuses(&mut result, normalizer, &config.selection);
    println!("\nResult:");
    match result.top() {
        Some(c) => {
            println!("  {:<16} {:.1}", "score", c.score);
            println!("  {:<16} {:.1}", "ranked score", c.ranked_score());
            println!("  {:<16} {}", "strategy", c.strategy.label());
            println!(
                "  {:<16} artist {:.1}, title {:.1}, artist+title {:.1}, album {:.1}, filename {:.1}",
                "fields", c.scores.artist, c.scores.title, c.scores.artist_title, c.scores.album, c.scores.filename
            );
            if let Some(bonus) = &c.bonus {
                for reason in &bonus.reasons {
                    println!("  {:<16} {:?}", "bonus", reason);
                }
            }
            let verdict = if c.score >= config.similarity_threshold { "match" } else { "below threshold" };
            println!(
                "  {:<16} {} (threshold {:.0})",
                "verdict", verdict, config.similarity_threshold
            );
        }
        None if result.trace.too_short => println!("  query too short to match"),
        None => println!("  no overlap"),
    }
    println!("  {:<16} {:?}", "trace", result.trace);

    Ok(())
}
