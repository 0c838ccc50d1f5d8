//! Text normalization for filenames, tags and playlist lines.
//!
//! Every score in the crate is computed over the output of [`Normalizer::clean`],
//! so the ordering of the cleaning steps matters. Track-number and vinyl prefixes
//! are removed while the original separators are still present, otherwise
//! "01-artist" turns into the tokens "01 artist" and the number survives as a word.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

/// Label suffixes commonly appended to scene-release filenames.
pub const DEFAULT_IGNORE_SUFFIXES: &[&str] = &["justify", "sob", "nrg", "dps", "trt", "pms"];

/// Tokens shorter than this never count as meaningful words.
pub const MIN_WORD_LEN: usize = 3;

/// Tokens longer than this are treated as hashes or glued garbage.
pub const MAX_WORD_LEN: usize = 20;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Audio file extensions at the end of a filename.
pub static FILE_EXTENSION: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\.(?:mp3|flac|m4a|aac|wav|ogg|opus|aiff?|wma|alac)$").unwrap()
);

/// Label catalog prefixes: "nrg001-", "trt045_".
pub static CATALOG_PREFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^[a-z]{2,4}\d{3,4}\s*[-._]\s*").unwrap()
);

/// Track number prefixes with an explicit separator: "01-", "03 - ", "track 5 - ", "7)".
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^(?:track\s*)?\d{1,4}\s*[-._)]\s*").unwrap()
);

/// Zero-padded track number followed only by a space: "01 title".
/// Unpadded numbers are left alone so "2 unlimited" keeps its digit.
pub static TRACK_NUMBER_SPACE_PREFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^0\d{1,2}\s+").unwrap()
);

/// Vinyl side positions: "a1-", "b2_", "a01 ".
pub static VINYL_PREFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^[a-d](?:\d|0\d)(?:\s*[-._)]\s*|\s+)").unwrap()
);

/// Compound underscore-dash separator used by scene releases.
pub static UNDERSCORE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+-+_+").unwrap());

/// Remaining separators that become plain spaces.
pub static SEPARATOR_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-.]+").unwrap());

/// Segment boundaries inside a filename, before separator conversion.
pub static SEGMENT_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+-+_+|\s*-+\s*").unwrap());

/// Parenthesized or bracketed remix/version qualifiers.
pub static REMIX_QUALIFIER: Lazy<Regex> = Lazy::new(||
    Regex::new(r"\s*[\(\[][^\)\]]*\b(?:remix(?:ed)?|mix|edit|version|remaster(?:ed)?|original|extended|radio|club|dub|vip)\b[^\)\]]*[\)\]]").unwrap()
);

/// Bracketed years: "(2009)", "[1997]".
pub static YEAR_QUALIFIER: Lazy<Regex> = Lazy::new(||
    Regex::new(r"\s*[\(\[](?:19|20)\d{2}[\)\]]").unwrap()
);

/// Anything that is not a letter, digit or whitespace.
pub static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Vinyl side labels and similar letter+digit tokens: "a1", "b12".
pub static SIDE_LABEL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]\d+$").unwrap());

/// Encoding jargon glued to a number: "320kbps", "44khz", "24bit".
pub static ENCODING_TOKEN: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^\d+(?:k|kbps|khz|bit|hz)$").unwrap()
);

// ============================================================================
// STOP WORDS
// ============================================================================

/// Words that carry no identity for a track: articles, credit markers,
/// mix descriptors and format/bitrate jargon.
pub static STOP_WORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "are", "feat", "featuring", "vs", "with",
        "original", "mix", "remix", "remixed", "edit", "extended", "radio", "club",
        "version", "remaster", "remastered",
        "mp3", "flac", "wav", "aac", "m4a", "ogg", "opus", "aiff", "wma", "alac",
        "kbps", "vbr", "cbr", "khz", "bitrate", "lossless", "web", "vinyl",
    ]
    .into_iter()
    .collect()
});

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

fn collapse(s: &str) -> String {
    MULTI_SPACE.replace_all(s, " ").trim().to_string()
}

/// True when a token of already-cleaned text identifies something.
pub fn is_meaningful_word(token: &str) -> bool {
    let len = token.chars().count();
    (MIN_WORD_LEN..=MAX_WORD_LEN).contains(&len)
        && !token.chars().all(|c| c.is_ascii_digit())
        && !SIDE_LABEL_TOKEN.is_match(token)
        && !ENCODING_TOKEN.is_match(token)
        && !STOP_WORDS.contains(token)
}

/// Meaningful words of already-cleaned text, deduplicated in first-seen order.
pub fn meaningful_words(cleaned: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    cleaned
        .split_whitespace()
        .filter(|t| is_meaningful_word(t))
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Cleaning policy. The only configurable part is the set of label suffixes
/// dropped from the end of filenames.
#[derive(Clone, Debug)]
pub struct Normalizer {
    ignore_suffixes: FxHashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_SUFFIXES.iter().copied())
    }
}

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);

impl Normalizer {
    pub fn new<I, S>(ignore_suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignore_suffixes: ignore_suffixes
                .into_iter()
                .map(|s| fold_to_ascii(s.as_ref()))
                .collect(),
        }
    }

    /// Clean a raw filename, tag value or playlist line.
    ///
    /// Steps, in order: fold to lowercase ASCII, strip the extension, strip
    /// leading position prefixes, turn separators into spaces, strip trailing
    /// qualifiers, drop punctuation, collapse whitespace.
    pub fn clean(&self, text: &str) -> String {
        let prepared = self.prepare(text);
        self.finish(&SEPARATOR_CHARS.replace_all(&UNDERSCORE_DASH.replace_all(&prepared, " "), " "))
    }

    /// Clean text but keep its internal dash-separated segments apart.
    ///
    /// "01-omi_-_the_claim-nrg.mp3" → ["omi", "the claim", "nrg"]
    pub fn segments(&self, text: &str) -> Vec<String> {
        let prepared = self.prepare(text);
        SEGMENT_SPLIT
            .split(&prepared)
            .map(|seg| self.finish_segment(&SEPARATOR_CHARS.replace_all(seg, " ")))
            .filter(|seg| !seg.is_empty())
            .collect()
    }

    /// Meaningful words of raw text.
    pub fn extract_words(&self, text: &str) -> Vec<String> {
        meaningful_words(&self.clean(text))
    }

    /// Count of letters and digits that survive cleaning.
    pub fn meaningful_char_count(&self, text: &str) -> usize {
        self.clean(text).chars().filter(|c| c.is_ascii_alphanumeric()).count()
    }

    fn prepare(&self, text: &str) -> String {
        let folded = fold_to_ascii(text);
        let trimmed = folded.trim();
        let without_ext = FILE_EXTENSION.replace(trimmed, "");
        let s = CATALOG_PREFIX.replace(&without_ext, "");
        let s = TRACK_NUMBER_PREFIX.replace(&s, "");
        let s = TRACK_NUMBER_SPACE_PREFIX.replace(&s, "");
        let s = VINYL_PREFIX.replace(&s, "");
        s.into_owned()
    }

    fn strip_qualifiers(&self, text: &str) -> String {
        let s = REMIX_QUALIFIER.replace_all(text, " ");
        let s = YEAR_QUALIFIER.replace_all(&s, " ");
        let s = s.replace('\'', "");
        collapse(&PUNCTUATION.replace_all(&s, " "))
    }

    fn finish(&self, text: &str) -> String {
        let cleaned = self.strip_qualifiers(text);
        match cleaned.rsplit_once(' ') {
            Some((head, last)) if self.ignore_suffixes.contains(last) => head.to_string(),
            _ => cleaned,
        }
    }

    // Segments keep label suffixes so "nrg" stays a segment of its own.
    fn finish_segment(&self, text: &str) -> String {
        self.strip_qualifiers(text)
    }
}

/// Clean text with the default normalizer.
pub fn clean(text: &str) -> String {
    DEFAULT_NORMALIZER.clean(text)
}

/// Meaningful words of raw text with the default normalizer.
pub fn extract_words(text: &str) -> Vec<String> {
    DEFAULT_NORMALIZER.extract_words(text)
}
