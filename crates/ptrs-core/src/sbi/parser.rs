use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::abn::{is_well_formed_abn, normalize_abn};
use super::outcome::{OutcomeClassifier, SbiVerdict};
use crate::config::SbiConfig;
use crate::error::PtrsError;
use crate::PtrsResult;

/// One distinct ABN after deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSbiRow {
    pub abn: String,
    pub outcome: String,
    pub verdict: SbiVerdict,
    pub year: Option<i32>,
    /// 1-based line of the row that won deduplication (header is line 1).
    pub line: u64,
}

impl ParsedSbiRow {
    pub fn is_valid_abn(&self) -> bool {
        is_well_formed_abn(&self.abn) && self.verdict != SbiVerdict::InvalidAbn
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSbiFile {
    /// Lowercase hex SHA-256 of the raw upload bytes.
    pub file_hash: String,
    /// Data rows read, including skipped ones.
    pub raw_row_count: u64,
    pub skipped_empty_abn_rows: u64,
    /// Distinct ABNs ascending; where an ABN repeats, the last row wins.
    pub rows: Vec<ParsedSbiRow>,
}

impl ParsedSbiFile {
    pub fn invalid_abn_count(&self) -> u64 {
        self.rows.iter().filter(|r| !r.is_valid_abn()).count() as u64
    }

    pub fn unknown_outcome_count(&self) -> u64 {
        self.rows
            .iter()
            .filter(|r| r.verdict == SbiVerdict::Unknown)
            .count() as u64
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lowercases and folds `_`, `-` and runs of whitespace into single spaces.
fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_column(headers: &[String], synonyms: &[String]) -> Option<usize> {
    let wanted: Vec<String> = synonyms.iter().map(|s| normalize_header(s)).collect();
    headers.iter().position(|h| wanted.contains(h))
}

/// Parses an SBI results file.
///
/// The file must be UTF-8 (a leading BOM is ignored) with a header row naming
/// at least an ABN and an outcome column. Quoted fields may contain commas
/// and doubled quotes.
pub fn parse_sbi_csv(bytes: &[u8], config: &SbiConfig) -> PtrsResult<ParsedSbiFile> {
    let file_hash = content_hash(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| PtrsError::InvalidEncoding(e.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(PtrsError::EmptyUpload);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let abn_col = resolve_column(&headers, &config.abn_headers);
    let outcome_col = resolve_column(&headers, &config.outcome_headers);
    let year_col = resolve_column(&headers, &config.year_headers);

    let (abn_col, outcome_col) = match (abn_col, outcome_col) {
        (Some(a), Some(o)) => (a, o),
        (a, o) => {
            let mut missing = Vec::new();
            if a.is_none() {
                missing.push("ABN".to_string());
            }
            if o.is_none() {
                missing.push("Outcome".to_string());
            }
            return Err(PtrsError::MissingRequiredColumns { missing });
        }
    };

    let classifier = OutcomeClassifier::new(config);
    let mut raw_row_count = 0u64;
    let mut skipped_empty_abn_rows = 0u64;
    let mut by_abn: BTreeMap<String, ParsedSbiRow> = BTreeMap::new();

    for record in reader.records() {
        let record = record?;
        raw_row_count += 1;

        let abn = normalize_abn(record.get(abn_col).unwrap_or(""));
        if abn.is_empty() {
            skipped_empty_abn_rows += 1;
            continue;
        }
        let outcome = record.get(outcome_col).unwrap_or("").to_string();
        let year = year_col
            .and_then(|c| record.get(c))
            .and_then(|y| y.parse::<i32>().ok());
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(raw_row_count + 1);

        by_abn.insert(
            abn.clone(),
            ParsedSbiRow {
                verdict: classifier.classify(&outcome),
                abn,
                outcome,
                year,
                line,
            },
        );
    }

    if by_abn.is_empty() {
        return Err(PtrsError::NoAbnsParsed {
            raw_rows: raw_row_count,
        });
    }

    Ok(ParsedSbiFile {
        file_hash,
        raw_row_count,
        skipped_empty_abn_rows,
        rows: by_abn.into_values().collect(),
    })
}
