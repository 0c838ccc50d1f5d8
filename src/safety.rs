//! Output path checks run before any report is written.
//!
//! Reports are created or overwritten in place, so an output path must never
//! point at the playlist or catalog it was produced from.

use crate::error::ExportError;
use std::path::Path;

const DATABASE_EXTENSIONS: [&str; 4] = ["db", "sqlite", "sqlite3", "db3"];

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Validates that a report path is safe to overwrite.
///
/// Checks:
/// - Output extension must be one of `allowed_extensions` (case-insensitive)
/// - Output cannot look like a database file
/// - Output cannot be the same file as any of `source_paths`
pub fn validate_output_path(
    output: &Path,
    allowed_extensions: &[&str],
    source_paths: &[&Path],
) -> Result<(), ExportError> {
    let ext = extension_lower(output).unwrap_or_default();

    if DATABASE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ExportError::UnsafePath(format!(
            "output '{}' looks like a database file",
            output.display()
        )));
    }

    if !allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
        return Err(ExportError::UnsafePath(format!(
            "output '{}' must have one of the extensions: {}",
            output.display(),
            allowed_extensions.join(", ")
        )));
    }

    for source in source_paths {
        if same_file(output, source) {
            return Err(ExportError::UnsafePath(format!(
                "output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_report_paths() {
        let playlist = PathBuf::from("/data/playlist.txt");
        let catalog = PathBuf::from("/data/catalog.sqlite3");
        let sources = [playlist.as_path(), catalog.as_path()];
        assert!(validate_output_path(Path::new("/tmp/results.csv"), &["csv"], &sources).is_ok());
        assert!(validate_output_path(Path::new("/tmp/RESULTS.JSON"), &["json"], &sources).is_ok());
        assert!(validate_output_path(Path::new("/tmp/missing.txt"), &["txt", "m3u"], &sources).is_ok());
    }

    #[test]
    fn test_wrong_extension() {
        let err = validate_output_path(Path::new("/tmp/results"), &["csv"], &[]).unwrap_err();
        assert!(err.to_string().contains("must have one of the extensions: csv"));
    }

    #[test]
    fn test_database_blocked() {
        let err = validate_output_path(Path::new("/tmp/catalog.db"), &["db", "csv"], &[]).unwrap_err();
        assert!(matches!(err, ExportError::UnsafePath(_)));
        assert!(err.to_string().contains("looks like a database"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/playlist.txt");
        let err = validate_output_path(&path, &["txt"], &[&path]).unwrap_err();
        assert!(err.to_string().contains("cannot be the same as source"));
    }

    #[test]
    fn test_output_equals_source_through_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("playlist.txt");
        std::fs::write(&playlist, "Artist - Title\n").unwrap();
        let indirect = dir.path().join(".").join("playlist.txt");
        assert!(validate_output_path(&indirect, &["txt"], &[&playlist]).is_err());
    }
}
