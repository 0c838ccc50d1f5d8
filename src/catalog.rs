//! Read-only catalog providers.
//!
//! The catalog of indexed files is owned by the indexer. The matcher only
//! needs three calls: everything, a word-filtered subset, and a count.

use crate::error::CatalogError;
use crate::models::{CatalogRecord, CatalogStats, SharedRecord};
use crate::normalize::fold_to_ascii;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Words shorter than this are useless as substring filters.
pub const MIN_FILTER_WORD_LEN: usize = 2;

pub trait CatalogProvider: Send + Sync {
    fn all_records(&self) -> Result<Vec<SharedRecord>, CatalogError>;

    /// Records whose artist or filename contains any artist word, or whose
    /// title or filename contains any title word. Both sides are compared
    /// ASCII-folded, so "beyonce" finds "Beyoncé". With no usable words, the
    /// first `limit` records.
    fn candidate_records(
        &self,
        artist_words: &[String],
        title_words: &[String],
        limit: usize,
    ) -> Result<Vec<SharedRecord>, CatalogError>;

    fn stats(&self) -> Result<CatalogStats, CatalogError>;
}

fn usable_words(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| fold_to_ascii(w.trim()))
        .filter(|w| w.chars().count() >= MIN_FILTER_WORD_LEN)
        .collect()
}

// ============================================================================
// In-memory catalog
// ============================================================================

/// Catalog held entirely in memory, built from records or a JSON export.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    records: Vec<SharedRecord>,
}

impl InMemoryCatalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load a JSON array of records.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        let records: Vec<CatalogRecord> = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

impl CatalogProvider for InMemoryCatalog {
    fn all_records(&self) -> Result<Vec<SharedRecord>, CatalogError> {
        Ok(self.records.clone())
    }

    fn candidate_records(
        &self,
        artist_words: &[String],
        title_words: &[String],
        limit: usize,
    ) -> Result<Vec<SharedRecord>, CatalogError> {
        let artist_words = usable_words(artist_words);
        let title_words = usable_words(title_words);
        if artist_words.is_empty() && title_words.is_empty() {
            return Ok(self.records.iter().take(limit).cloned().collect());
        }

        Ok(self
            .records
            .iter()
            .filter(|r| {
                let filename = fold_to_ascii(&r.filename);
                let artist = fold_to_ascii(r.artist.as_deref().unwrap_or(""));
                let title = fold_to_ascii(r.title.as_deref().unwrap_or(""));
                contains_any(&artist, &artist_words)
                    || contains_any(&filename, &artist_words)
                    || contains_any(&title, &title_words)
                    || contains_any(&filename, &title_words)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        Ok(CatalogStats {
            total_records: self.records.len(),
        })
    }
}

// ============================================================================
// SQLite catalog
// ============================================================================

const SELECT_COLUMNS: &str = "SELECT file_path, filename, artist, title, album, format, duration,
        bitrate, sample_rate, channels, artist_from_filename, title_from_filename
     FROM files";

/// SQL function registered on every catalog connection, see `fold_to_ascii`.
const FOLD_FUNCTION: &str = "fold_ascii";

/// Catalog backed by the indexer's SQLite `files` table, opened read-only.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection. Fails if it has no `files` table.
    pub fn from_connection(conn: Connection) -> Result<Self, CatalogError> {
        let has_files: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'files'",
            [],
            |row| row.get(0),
        )?;
        if has_files == 0 {
            return Err(CatalogError::Unavailable("no 'files' table in catalog".to_string()));
        }
        // SQLite's LOWER() only handles ASCII; filter on folded text instead.
        conn.create_scalar_function(
            FOLD_FUNCTION,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| fold_to_ascii(&t)))
            },
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CatalogError::Unavailable("catalog connection lock poisoned".to_string()))?;
        f(&conn)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SharedRecord> {
    let bitrate: Option<i64> = row.get(7)?;
    let sample_rate: Option<i64> = row.get(8)?;
    let channels: Option<i64> = row.get(9)?;
    let artist_from_filename: Option<bool> = row.get(10)?;
    let title_from_filename: Option<bool> = row.get(11)?;
    Ok(Arc::new(CatalogRecord {
        path: row.get(0)?,
        filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        artist: row.get(2)?,
        title: row.get(3)?,
        album: row.get(4)?,
        format: row.get(5)?,
        duration: row.get(6)?,
        bitrate: bitrate.and_then(|b| u32::try_from(b).ok()),
        sample_rate: sample_rate.and_then(|s| u32::try_from(s).ok()),
        channels: channels.and_then(|c| u16::try_from(c).ok()),
        artist_from_filename: artist_from_filename.unwrap_or(false),
        title_from_filename: title_from_filename.unwrap_or(false),
    }))
}

impl CatalogProvider for SqliteCatalog {
    fn all_records(&self) -> Result<Vec<SharedRecord>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
            let records = stmt
                .query_map([], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    fn candidate_records(
        &self,
        artist_words: &[String],
        title_words: &[String],
        limit: usize,
    ) -> Result<Vec<SharedRecord>, CatalogError> {
        let artist_words = usable_words(artist_words);
        let title_words = usable_words(title_words);

        let mut conditions = Vec::new();
        let mut patterns: Vec<String> = Vec::new();
        for word in &artist_words {
            conditions.push("(fold_ascii(artist) LIKE ? OR fold_ascii(filename) LIKE ?)");
            patterns.push(format!("%{}%", word));
            patterns.push(format!("%{}%", word));
        }
        for word in &title_words {
            conditions.push("(fold_ascii(title) LIKE ? OR fold_ascii(filename) LIKE ?)");
            patterns.push(format!("%{}%", word));
            patterns.push(format!("%{}%", word));
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = if conditions.is_empty() {
            format!("{} ORDER BY id LIMIT ?", SELECT_COLUMNS)
        } else {
            format!("{} WHERE {} ORDER BY id LIMIT ?", SELECT_COLUMNS, conditions.join(" OR "))
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::ToSql> =
                patterns.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            params.push(&limit);
            let records = stmt
                .query_map(params.as_slice(), record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            Ok(CatalogStats {
                total_records: usize::try_from(count).unwrap_or(0),
            })
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(artist: &str, title: &str, filename: &str) -> CatalogRecord {
        CatalogRecord {
            path: format!("/music/{}", filename),
            filename: filename.to_string(),
            artist: (!artist.is_empty()).then(|| artist.to_string()),
            title: (!title.is_empty()).then(|| title.to_string()),
            format: Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string),
            ..Default::default()
        }
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sqlite_catalog(records: &[CatalogRecord]) -> SqliteCatalog {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE files (
                id INTEGER PRIMARY KEY,
                file_path TEXT UNIQUE,
                filename TEXT,
                format TEXT,
                duration REAL,
                bitrate INTEGER,
                sample_rate INTEGER,
                channels INTEGER,
                artist TEXT,
                title TEXT,
                album TEXT,
                year TEXT,
                genre TEXT,
                artist_from_filename BOOLEAN,
                title_from_filename BOOLEAN,
                bits_per_sample INTEGER,
                last_modified REAL,
                last_scanned REAL,
                extra_data TEXT
            )",
        )
        .unwrap();
        for r in records {
            conn.execute(
                "INSERT INTO files (file_path, filename, format, duration, bitrate, artist, title,
                                    artist_from_filename, title_from_filename)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    r.path,
                    r.filename,
                    r.format,
                    r.duration,
                    r.bitrate,
                    r.artist,
                    r.title,
                    r.artist_from_filename,
                    r.title_from_filename
                ],
            )
            .unwrap();
        }
        SqliteCatalog::from_connection(conn).unwrap()
    }

    fn sample() -> Vec<CatalogRecord> {
        vec![
            record("Endymion", "Abduction", "endymion-abduction.flac"),
            record("", "", "01-omi_-_the_claim-nrg.mp3"),
            record("Other", "Song", "other-song.mp3"),
        ]
    }

    #[test]
    fn test_in_memory_candidates() {
        let catalog = InMemoryCatalog::new(sample());
        let found = catalog
            .candidate_records(&words(&["endymion"]), &words(&["claim"]), 10)
            .unwrap();
        let paths: Vec<&str> = found.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(paths, vec!["endymion-abduction.flac", "01-omi_-_the_claim-nrg.mp3"]);
    }

    #[test]
    fn test_in_memory_candidates_without_words() {
        let catalog = InMemoryCatalog::new(sample());
        let found = catalog.candidate_records(&words(&["a"]), &[], 2).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(catalog.stats().unwrap().total_records, 3);
    }

    #[test]
    fn test_in_memory_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"path": "/m/a.flac", "filename": "a.flac", "artist": "Endymion", "bitrate": 1000}]"#,
        )
        .unwrap();
        let catalog = InMemoryCatalog::from_json_file(&path).unwrap();
        let records = catalog.all_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].artist.as_deref(), Some("Endymion"));
        assert_eq!(records[0].bitrate, Some(1000));
        assert!(!records[0].artist_from_filename);
    }

    #[test]
    fn test_in_memory_from_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            InMemoryCatalog::from_json_file(&path),
            Err(CatalogError::Json(_))
        ));
    }

    #[test]
    fn test_sqlite_catalog_queries() {
        let mut records = sample();
        records[0].bitrate = Some(1411);
        records[0].duration = Some(412.5);
        records[1].artist_from_filename = true;
        let catalog = sqlite_catalog(&records);

        assert_eq!(catalog.stats().unwrap().total_records, 3);

        let all = catalog.all_records().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].bitrate, Some(1411));
        assert_eq!(all[0].duration, Some(412.5));
        assert!(all[1].artist_from_filename);
        assert_eq!(all[1].artist, None);

        let found = catalog
            .candidate_records(&words(&["ENDYMION"]), &words(&["claim"]), 10)
            .unwrap();
        assert_eq!(found.len(), 2);

        let limited = catalog.candidate_records(&[], &[], 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_candidates_match_accented_fields() {
        let records = vec![
            record("Beyoncé", "Déjà Vu", "Beyoncé - Déjà Vu.mp3"),
            record("Deja", "Song", "vu-0.mp3"),
            record("Other", "Song", "other-song.mp3"),
        ];
        let expected = vec!["Beyoncé - Déjà Vu.mp3"];

        let in_memory = InMemoryCatalog::new(records.clone());
        let sqlite = sqlite_catalog(&records);
        let catalogs: [&dyn CatalogProvider; 2] = [&in_memory, &sqlite];
        for catalog in catalogs {
            let folded = catalog
                .candidate_records(&words(&["beyonce"]), &[], 10)
                .unwrap();
            let paths: Vec<&str> = folded.iter().map(|r| r.filename.as_str()).collect();
            assert_eq!(paths, expected);

            // Accented query words fold the same way
            let accented = catalog
                .candidate_records(&words(&["Beyoncé"]), &[], 10)
                .unwrap();
            assert_eq!(accented.len(), 1);
        }
    }

    #[test]
    fn test_sqlite_requires_files_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            SqliteCatalog::from_connection(conn),
            Err(CatalogError::Unavailable(_))
        ));
    }
}
