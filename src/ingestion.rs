use crate::error::{DashboardError, Result};
use crate::statement::{StatementKind, TabularStatement};
use encoding_rs::EUC_KR;
use log::{debug, info};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const UTF8_BOM: char = '\u{feff}';

/// Anything that can hand over one of the dashboard's report tables.
pub trait StatementSource {
    fn load(&self, kind: StatementKind) -> Result<TabularStatement>;
}

/// Reads `<root>/<stem>.csv` exports, e.g. `data/cf.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, kind: StatementKind) -> PathBuf {
        self.root.join(format!("{}.csv", kind.file_stem()))
    }
}

impl StatementSource for CsvDirectorySource {
    fn load(&self, kind: StatementKind) -> Result<TabularStatement> {
        let path = self.path_for(kind);
        info!("Loading {:?} statement from {}", kind, path.display());
        let bytes = std::fs::read(&path)?;
        parse_csv_bytes(&bytes)
    }
}

/// Decodes report bytes: UTF-8 when valid, EUC-KR otherwise.
pub fn decode_report_text(bytes: &[u8]) -> Result<Cow<'_, str>> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(Cow::Borrowed(text));
    }

    let (text, _, had_errors) = EUC_KR.decode(bytes);
    if had_errors {
        return Err(DashboardError::Encoding(
            "input is neither UTF-8 nor EUC-KR".to_string(),
        ));
    }
    debug!("Decoded {} bytes as EUC-KR", bytes.len());
    Ok(text)
}

/// Parses a CSV export into a statement. The first non-blank record is the
/// header row; blank lines and records with only empty cells are skipped.
pub fn parse_csv_bytes(bytes: &[u8]) -> Result<TabularStatement> {
    let text = decode_report_text(bytes)?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(&text[..]);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        records.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    let mut records = records.into_iter();
    let headers = records.next().unwrap_or_default();
    let rows: Vec<Vec<String>> = records.collect();

    debug!(
        "Parsed statement with {} columns and {} rows",
        headers.len(),
        rows.len()
    );

    Ok(TabularStatement::new(headers, rows))
}
