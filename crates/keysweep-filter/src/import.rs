//! Bulk import of target identifiers

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{StoreError, TargetStore};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to read import file: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Lines containing this substring are skipped. Empty disables the check.
    pub exclusion_marker: String,
    /// Rows per store batch
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            exclusion_marker: "wallet".to_string(),
            batch_size: 10_000,
        }
    }
}

impl ImportOptions {
    fn accepts(&self, line: &str) -> bool {
        !line.is_empty()
            && (self.exclusion_marker.is_empty() || !line.contains(&self.exclusion_marker))
    }
}

/// Counters for one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Lines read from the input
    pub lines: usize,
    /// New identifiers stored
    pub inserted: usize,
    /// Identifiers that were already present
    pub duplicates: usize,
    /// Empty or excluded lines
    pub skipped: usize,
    /// Rows the store rejected
    pub failed: usize,
}

/// Import newline-delimited identifiers from `path`
pub fn import_file(
    path: impl AsRef<Path>,
    store: &dyn TargetStore,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    info!(path = %path.display(), "importing target identifiers");
    import_lines(BufReader::new(file), store, options)
}

/// Import newline-delimited identifiers from any reader
pub fn import_lines<R: BufRead>(
    reader: R,
    store: &dyn TargetStore,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();
    let batch_size = options.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);

    for (index, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        report.lines += 1;

        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping line that is not valid UTF-8");
                report.failed += 1;
                continue;
            }
        };

        let identifier = line.trim();
        if !options.accepts(identifier) {
            report.skipped += 1;
            continue;
        }

        batch.push(identifier.to_string());
        if batch.len() >= batch_size {
            flush(store, &mut batch, &mut report)?;
        }
    }
    flush(store, &mut batch, &mut report)?;

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        skipped = report.skipped,
        failed = report.failed,
        "import finished"
    );
    Ok(report)
}

fn flush(
    store: &dyn TargetStore,
    batch: &mut Vec<String>,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    if batch.is_empty() {
        return Ok(());
    }

    let outcomes = store.insert_many(batch)?;
    for (identifier, outcome) in batch.iter().zip(outcomes) {
        match outcome {
            Ok(true) => report.inserted += 1,
            Ok(false) => report.duplicates += 1,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "failed to insert identifier");
                report.failed += 1;
            }
        }
    }

    batch.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Cursor;

    const INPUT: &str = "\
1AAA
1BBB
1CCC

1AAA
my wallet list
1DDD
1EEE
1BBB
";

    #[test]
    fn test_import_counts() {
        let store = MemoryStore::new();
        let report = import_lines(Cursor::new(INPUT), &store, &ImportOptions::default()).unwrap();

        assert_eq!(store.len().unwrap(), 5);
        assert_eq!(report.inserted, 5);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed, 0);
        assert!(!store.exists("my wallet list").unwrap());
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let store = MemoryStore::new();
        let options = ImportOptions {
            batch_size: 2,
            ..Default::default()
        };

        import_lines(Cursor::new(INPUT), &store, &options).unwrap();
        let mut first = store.load_all().unwrap();
        let second_report = import_lines(Cursor::new(INPUT), &store, &options).unwrap();
        let mut second = store.load_all().unwrap();

        first.sort();
        second.sort();
        assert_eq!(first, second);
        assert_eq!(second_report.inserted, 0);
        assert_eq!(second_report.duplicates, 7);
    }

    #[test]
    fn test_custom_marker_and_whitespace() {
        let store = MemoryStore::new();
        let options = ImportOptions {
            exclusion_marker: "#".to_string(),
            ..Default::default()
        };

        let report = import_lines(Cursor::new("  1AAA  \n# header\nwallet\n"), &store, &options).unwrap();

        assert!(store.exists("1AAA").unwrap());
        // "wallet" is only excluded under the default marker
        assert!(store.exists("wallet").unwrap());
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_undecodable_line_is_counted_and_skipped() {
        let store = MemoryStore::new();
        let options = ImportOptions {
            batch_size: 1,
            ..Default::default()
        };

        let input: &[u8] = b"1AAA\n\xff\xfe\n1BBB\r\n";
        let report = import_lines(Cursor::new(input), &store, &options).unwrap();

        assert!(store.exists("1AAA").unwrap());
        assert!(store.exists("1BBB").unwrap());
        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.lines, 3);
    }

    #[test]
    fn test_missing_file() {
        let store = MemoryStore::new();
        let err = import_file("/definitely/not/here.txt", &store, &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }
}
