//! Playlist line parsing and search variant generation.
//!
//! A playlist line is free text: "Artist - Title", "A, B - Title - X Remix",
//! "Artist: Title (Extended Mix)" or just a title. Parsing never fails; a
//! line without a recognizable separator becomes a title-only entry.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Artist/title separators, tried in order. The first one present wins,
/// so " - " takes precedence over a comma inside the artist credit.
pub const ENTRY_SEPARATORS: &[&str] =
    &[" - ", " – ", " — ", " : ", ": ", "_-_", ", ", " | ", " / "];

/// Upper bound on variants per line.
pub const MAX_VARIANTS: usize = 8;

/// Variants shorter than this are dropped (the original line excepted).
pub const MIN_VARIANT_LEN: usize = 3;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Words marking a remix/version qualifier.
pub static MIX_KEYWORD: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\b(?:remix(?:ed)?|mix|edit|rework|refix|remaster(?:ed)?|version|extended|radio|club|dub|vip|instrumental|vocal|mashup|bootleg)\b").unwrap()
);

/// Trailing parenthetical or bracketed qualifier: "Title (X Remix)".
pub static TRAILING_PARENTHETICAL: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^(.*?)\s*[\(\[]([^\(\)\[\]]+)[\)\]]\s*$").unwrap()
);

/// Featured artists at the end of a title: "Title feat. Guest", "Title (ft. Guest)".
pub static TITLE_FEATURING: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)^(.*?)\s*[\(\[]?\s*\b(?:feat\.?|ft\.?|featuring)\s+([^\)\]]+?)[\)\]]?\s*$").unwrap()
);

/// Co-artist separators inside an artist credit.
pub static CO_ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\s*,\s*|\s+(?:&|and|vs\.?|x|feat\.?|ft\.?|featuring)\s+").unwrap()
);

/// Any parenthetical or bracketed group.
pub static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]").unwrap());

/// Leading article.
pub static LEADING_THE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^the\s+").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

// ============================================================================
// MODELS
// ============================================================================

/// One wanted track, parsed from one playlist line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// 1-based physical line number in the source file.
    pub line_number: usize,
    pub original: String,
    /// Artist credit exactly as written, before co-artist splitting.
    pub credit: Option<String>,
    /// Primary artist.
    pub artist: Option<String>,
    pub co_artists: Vec<String>,
    pub title: String,
    /// Remix or version qualifier peeled off the title.
    pub remix: Option<String>,
}

impl PlaylistEntry {
    /// Title-only entry for lines without an artist/title separator.
    pub fn title_only(line: &str, line_number: usize) -> Self {
        Self {
            line_number,
            original: line.to_string(),
            credit: None,
            artist: None,
            co_artists: Vec::new(),
            title: collapse(line),
            remix: None,
        }
    }

    /// Primary artist followed by every co-artist.
    pub fn all_artists(&self) -> Vec<&str> {
        self.artist
            .iter()
            .map(String::as_str)
            .chain(self.co_artists.iter().map(String::as_str))
            .collect()
    }

    /// True when the entry has both an artist and a title that differ.
    pub fn has_distinct_artist_title(&self) -> bool {
        match &self.credit {
            Some(credit) => {
                !credit.is_empty()
                    && !self.title.is_empty()
                    && !credit.eq_ignore_ascii_case(&self.title)
            }
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Original,
    Cleaned,
    ParenthesesRemoved,
    TitleOnly,
    TheStripped,
    ArtistField,
    TitleField,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Original => "original",
            VariantKind::Cleaned => "cleaned",
            VariantKind::ParenthesesRemoved => "parentheses_removed",
            VariantKind::TitleOnly => "title_only",
            VariantKind::TheStripped => "the_stripped",
            VariantKind::ArtistField => "artist_field",
            VariantKind::TitleField => "title_field",
        }
    }
}

/// One alternative framing of a line, driving one search attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchVariant {
    pub text: String,
    pub kind: VariantKind,
}

// ============================================================================
// PARSERS
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Basic,
    #[default]
    Enhanced,
}

/// Turns a playlist line into a structured entry and its search variants.
pub trait EntryParser: Send + Sync {
    fn parse(&self, line: &str, line_number: usize) -> PlaylistEntry;

    fn variants(&self, line: &str) -> Vec<SearchVariant> {
        generate_variants(line)
    }

    fn kind(&self) -> ParserKind;
}

pub fn parser_for(kind: ParserKind) -> Box<dyn EntryParser> {
    match kind {
        ParserKind::Basic => Box::new(BasicParser),
        ParserKind::Enhanced => Box::new(EnhancedParser),
    }
}

/// Split at the first separator (in list order) that leaves both sides non-empty.
pub fn split_artist_title(line: &str) -> Option<(&str, &str)> {
    ENTRY_SEPARATORS.iter().find_map(|sep| {
        let (artist, title) = line.split_once(sep)?;
        let (artist, title) = (artist.trim(), title.trim());
        (!artist.is_empty() && !title.is_empty()).then_some((artist, title))
    })
}

/// Separator split only: one artist, no qualifier handling.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicParser;

impl EntryParser for BasicParser {
    fn parse(&self, line: &str, line_number: usize) -> PlaylistEntry {
        match split_artist_title(line) {
            Some((artist, title)) => PlaylistEntry {
                line_number,
                original: line.to_string(),
                credit: Some(collapse(artist)),
                artist: Some(collapse(artist)),
                co_artists: Vec::new(),
                title: collapse(title),
                remix: None,
            },
            None => PlaylistEntry::title_only(line, line_number),
        }
    }

    fn kind(&self) -> ParserKind {
        ParserKind::Basic
    }
}

/// Separator split plus co-artist splitting, featured-artist extraction and
/// remix qualifier peeling.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnhancedParser;

impl EnhancedParser {
    /// Peel a trailing " - X Remix" segment or "(X Remix)" parenthetical.
    fn peel_remix(title: &str) -> (String, Option<String>) {
        if let Some((head, tail)) = title.rsplit_once(" - ") {
            if !head.trim().is_empty() && MIX_KEYWORD.is_match(tail) {
                return (collapse(head), Some(collapse(tail)));
            }
        }
        if let Some(caps) = TRAILING_PARENTHETICAL.captures(title) {
            let head = caps.get(1).map_or("", |m| m.as_str());
            let inner = caps.get(2).map_or("", |m| m.as_str());
            if !head.trim().is_empty() && MIX_KEYWORD.is_match(inner) {
                return (collapse(head), Some(collapse(inner)));
            }
        }
        (collapse(title), None)
    }

    fn peel_featuring(title: &str) -> (String, Vec<String>) {
        match TITLE_FEATURING.captures(title) {
            Some(caps) => {
                let head = caps.get(1).map_or("", |m| m.as_str());
                if head.trim().is_empty() {
                    return (collapse(title), Vec::new());
                }
                let guests = caps.get(2).map_or("", |m| m.as_str());
                (collapse(head), split_co_artists(guests))
            }
            None => (collapse(title), Vec::new()),
        }
    }
}

/// Split an artist credit into individual names.
pub fn split_co_artists(credit: &str) -> Vec<String> {
    CO_ARTIST_SEPARATOR
        .split(credit)
        .map(collapse)
        .filter(|name| !name.is_empty())
        .collect()
}

impl EntryParser for EnhancedParser {
    fn parse(&self, line: &str, line_number: usize) -> PlaylistEntry {
        let Some((credit, rest)) = split_artist_title(line) else {
            return PlaylistEntry::title_only(line, line_number);
        };

        let mut artists = split_co_artists(credit);
        let (title, remix) = Self::peel_remix(rest);
        let (title, guests) = Self::peel_featuring(&title);
        for guest in guests {
            if !artists.iter().any(|a| a.eq_ignore_ascii_case(&guest)) {
                artists.push(guest);
            }
        }

        let mut artists = artists.into_iter();
        PlaylistEntry {
            line_number,
            original: line.to_string(),
            credit: Some(collapse(credit)),
            artist: artists.next(),
            co_artists: artists.collect(),
            title,
            remix,
        }
    }

    fn kind(&self) -> ParserKind {
        ParserKind::Enhanced
    }
}

// ============================================================================
// VARIANTS
// ============================================================================

// Only a third segment counts as a qualifier; "Artist - Title Remix" keeps its title.
fn strip_remix_segment(s: &str) -> &str {
    match s.rsplit_once(" - ") {
        Some((head, tail)) if split_artist_title(head).is_some() && MIX_KEYWORD.is_match(tail) => head,
        _ => s,
    }
}

/// Ordered, deduplicated search variants of a line.
///
/// Order: the line itself, parentheticals and remix text stripped,
/// parentheses removed only, the title part, then "The"-stripped forms of
/// each. The line itself is always first; every other variant must be at
/// least [`MIN_VARIANT_LEN`] characters. At most [`MAX_VARIANTS`] are returned.
pub fn generate_variants(line: &str) -> Vec<SearchVariant> {
    let mut variants = vec![SearchVariant {
        text: line.to_string(),
        kind: VariantKind::Original,
    }];
    let mut seen: FxHashSet<String> = FxHashSet::default();
    seen.insert(collapse(line).to_lowercase());

    let mut push = |variants: &mut Vec<SearchVariant>, text: String, kind: VariantKind| {
        let text = collapse(&text);
        if variants.len() < MAX_VARIANTS
            && text.chars().count() >= MIN_VARIANT_LEN
            && seen.insert(text.to_lowercase())
        {
            variants.push(SearchVariant { text, kind });
        }
    };

    let cleaned = PARENTHETICAL.replace_all(strip_remix_segment(line), "").into_owned();
    push(&mut variants, cleaned, VariantKind::Cleaned);

    let unparenthesized = line.replace(['(', ')', '[', ']'], " ");
    push(&mut variants, unparenthesized, VariantKind::ParenthesesRemoved);

    if let Some((_, title)) = split_artist_title(line) {
        push(&mut variants, title.to_string(), VariantKind::TitleOnly);
    }

    let base: Vec<String> = variants.iter().map(|v| v.text.clone()).collect();
    for text in base {
        if LEADING_THE.is_match(&text) {
            push(&mut variants, LEADING_THE.replace(&text, "").into_owned(), VariantKind::TheStripped);
        }
    }

    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_simple_entry() {
        let entry = EnhancedParser.parse("Endymion - Abduction", 3);
        assert_eq!(entry.line_number, 3);
        assert_eq!(entry.artist.as_deref(), Some("Endymion"));
        assert_eq!(entry.title, "Abduction");
        assert!(entry.has_distinct_artist_title());
    }

    #[test]
    fn test_parse_compound_entry() {
        let entry = EnhancedParser.parse("ArtistA, ArtistB - Title - X Remix", 1);
        assert_eq!(entry.credit.as_deref(), Some("ArtistA, ArtistB"));
        assert_eq!(entry.artist.as_deref(), Some("ArtistA"));
        assert_eq!(entry.co_artists, vec!["ArtistB"]);
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.remix.as_deref(), Some("X Remix"));
        assert_eq!(entry.all_artists(), vec!["ArtistA", "ArtistB"]);
    }

    #[test]
    fn test_parse_parenthetical_remix_and_featuring() {
        let entry = EnhancedParser.parse("Artist: Title (Y Extended Mix)", 1);
        assert_eq!(entry.artist.as_deref(), Some("Artist"));
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.remix.as_deref(), Some("Y Extended Mix"));

        let entry = EnhancedParser.parse("Headliner & Partner - Song feat. Guest", 1);
        assert_eq!(entry.all_artists(), vec!["Headliner", "Partner", "Guest"]);
        assert_eq!(entry.title, "Song");
    }

    #[test]
    fn test_non_mix_parenthetical_stays_in_title() {
        let entry = EnhancedParser.parse("Artist - Title (Live)", 1);
        assert_eq!(entry.title, "Title (Live)");
        assert_eq!(entry.remix, None);
    }

    #[test]
    fn test_parse_title_only() {
        let entry = EnhancedParser.parse("Just A Title", 7);
        assert_eq!(entry.artist, None);
        assert_eq!(entry.title, "Just A Title");
        assert!(!entry.has_distinct_artist_title());

        // A dangling separator is not a split
        let entry = BasicParser.parse("Artist - ", 1);
        assert_eq!(entry.artist, None);
    }

    #[test]
    fn test_basic_parser_keeps_grammar_flat() {
        let entry = BasicParser.parse("ArtistA, ArtistB - Title - X Remix", 1);
        assert_eq!(entry.artist.as_deref(), Some("ArtistA, ArtistB"));
        assert!(entry.co_artists.is_empty());
        assert_eq!(entry.title, "Title - X Remix");
        assert_eq!(entry.remix, None);
    }

    #[test]
    fn test_parser_for_kind() {
        assert_eq!(parser_for(ParserKind::Basic).kind(), ParserKind::Basic);
        assert_eq!(parser_for(ParserKind::default()).kind(), ParserKind::Enhanced);
    }

    #[test]
    fn test_generate_variants_order() {
        let variants = generate_variants("The Prodigy - Breathe (Original Mix)");
        let texts: Vec<&str> = variants.iter().map(|v| v.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "The Prodigy - Breathe (Original Mix)",
                "The Prodigy - Breathe",
                "The Prodigy - Breathe Original Mix",
                "Breathe (Original Mix)",
                "Prodigy - Breathe (Original Mix)",
                "Prodigy - Breathe",
                "Prodigy - Breathe Original Mix",
            ]
        );
        assert_eq!(variants[0].kind, VariantKind::Original);
        assert_eq!(variants[3].kind, VariantKind::TitleOnly);
        assert_eq!(variants[4].kind, VariantKind::TheStripped);
    }

    #[test]
    fn test_generate_variants_strips_remix_segment() {
        let variants = generate_variants("A, B - Title - X Remix");
        assert_eq!(variants[1].text, "A, B - Title");
        assert_eq!(variants[1].kind, VariantKind::Cleaned);
    }

    #[test]
    fn test_short_line_keeps_original_only() {
        let variants = generate_variants("a");
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].text, "a");
    }

    proptest! {
        #[test]
        fn prop_variants_bounded_unique_and_include_line(line in "[A-Za-z ()\\[\\]&,:|/-]{0,60}") {
            let variants = generate_variants(&line);
            prop_assert!(variants.len() <= MAX_VARIANTS);
            prop_assert!(variants.iter().any(|v| v.text == line));
            let mut keys = FxHashSet::default();
            for v in &variants {
                prop_assert!(keys.insert(collapse(&v.text).to_lowercase()));
            }
        }
    }
}
