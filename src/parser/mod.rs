// 🏗️ Parser Framework - one parser per source format
//
// parse(bytes, format) -> ParseOutcome { records, errors }
//
// Partial-success policy: a bad row becomes a RowParseError and parsing
// continues. Undecodable bytes or missing required structure is fatal for
// the file: zero records plus one FileFatalError.

pub mod camt053;
pub mod sumup;
pub mod twint;

use crate::error::{FileFatalError, ParseError, RowParseError};
use crate::money::Money;
use anyhow::Result;
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

pub use camt053::{Camt053Parser, CamtEntryRow, StatementInfo};
pub use sumup::{SumUpParser, SumUpRow};
pub use twint::{TwintParser, TwintRow};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Declared format of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    SumupCsv,
    TwintCsv,
    #[serde(rename = "bank_camt053_xml")]
    BankCamt053Xml,
}

impl SourceFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceFormat::SumupCsv => "SumUp CSV",
            SourceFormat::TwintCsv => "TWINT CSV",
            SourceFormat::BankCamt053Xml => "Bank CAMT.053 XML",
        }
    }

    /// Format tag used by the upload collaborator
    pub fn code(&self) -> &str {
        match self {
            SourceFormat::SumupCsv => "sumup_csv",
            SourceFormat::TwintCsv => "twint_csv",
            SourceFormat::BankCamt053Xml => "bank_camt053_xml",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "sumup_csv" => Some(SourceFormat::SumupCsv),
            "twint_csv" => Some(SourceFormat::TwintCsv),
            "bank_camt053_xml" => Some(SourceFormat::BankCamt053Xml),
            _ => None,
        }
    }
}

/// Typed, already-validated row produced by a parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum RawRecord {
    SumUp(SumUpRow),
    Twint(TwintRow),
    Camt(CamtEntryRow),
}

/// Result of parsing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub format: SourceFormat,
    pub records: Vec<RawRecord>,
    pub errors: Vec<ParseError>,
    /// Rows deliberately ignored (non-payment types, unbooked entries)
    pub skipped: usize,
    /// CAMT statement headers (empty for CSV formats)
    pub statements: Vec<StatementInfo>,
}

impl ParseOutcome {
    pub fn new(format: SourceFormat) -> Self {
        ParseOutcome {
            format,
            records: Vec::new(),
            errors: Vec::new(),
            skipped: 0,
            statements: Vec::new(),
        }
    }

    /// Zero records plus one file-level error
    pub fn fatal(format: SourceFormat, reason: impl Into<String>) -> Self {
        let mut outcome = ParseOutcome::new(format);
        outcome.errors.push(ParseError::File(FileFatalError {
            format,
            reason: reason.into(),
        }));
        outcome
    }

    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(ParseError::is_fatal)
    }

    pub fn fatal_error(&self) -> Option<&FileFatalError> {
        self.errors.iter().find_map(|e| match e {
            ParseError::File(f) => Some(f),
            ParseError::Row(_) => None,
        })
    }

    pub fn row_error_count(&self) -> usize {
        self.errors.iter().filter(|e| !e.is_fatal()).count()
    }

    pub(crate) fn push_row_error(&mut self, row: usize, error: anyhow::Error) {
        tracing::debug!(format = self.format.code(), row, error = %format!("{:#}", error), "row skipped");
        self.errors.push(ParseError::Row(RowParseError {
            format: self.format,
            row,
            reason: format!("{:#}", error),
        }));
    }
}

// ============================================================================
// COMPOSABLE TRAITS
// ============================================================================

/// StatementParser - core trait every format implements
pub trait StatementParser: Send + Sync {
    /// Parse decoded file content. Never fails: errors are part of the outcome.
    fn parse(&self, content: &str) -> ParseOutcome;

    /// Format this parser handles
    fn source_format(&self) -> SourceFormat;

    /// Parser version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// AmountValidator - turns a raw amount cell into cents using the format's conventions
pub trait AmountValidator {
    fn validate_amount(&self, raw: &str) -> Result<Money>;
}

/// DateNormalizer - turns a raw date cell into a calendar date
pub trait DateNormalizer {
    fn normalize_date(&self, raw: &str) -> Result<NaiveDate>;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Factory: parser for a declared format
pub fn get_parser(format: SourceFormat) -> Box<dyn StatementParser> {
    match format {
        SourceFormat::SumupCsv => Box::new(SumUpParser::new()),
        SourceFormat::TwintCsv => Box::new(TwintParser::new()),
        SourceFormat::BankCamt053Xml => Box::new(Camt053Parser::new()),
    }
}

/// Decode bytes as UTF-8, tolerating a leading byte-order mark
pub fn decode_utf8(bytes: &[u8]) -> std::result::Result<&str, String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| format!("content is not valid UTF-8 ({})", e))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Parse raw uploaded bytes according to their declared format
pub fn parse(bytes: &[u8], format: SourceFormat) -> ParseOutcome {
    let content = match decode_utf8(bytes) {
        Ok(text) => text,
        Err(reason) => return ParseOutcome::fatal(format, reason),
    };
    if content.trim().is_empty() {
        return ParseOutcome::fatal(format, "file is empty");
    }

    let parser = get_parser(format);
    let outcome = parser.parse(content);
    tracing::info!(
        format = format.code(),
        parser_version = parser.version(),
        records = outcome.records.len(),
        row_errors = outcome.row_error_count(),
        skipped = outcome.skipped,
        fatal = outcome.is_fatal(),
        "file parsed"
    );
    outcome
}

// ============================================================================
// HEADER HELPERS (shared by the CSV parsers)
// ============================================================================

fn normalize_header(name: &str) -> String {
    name.trim()
        .trim_start_matches('\u{feff}')
        .trim_matches('"')
        .trim()
        .to_lowercase()
}

/// Index of the first header cell matching any allowed name (case-insensitive)
pub(crate) fn locate_column(headers: &StringRecord, allowed: &[&str]) -> Option<usize> {
    let allowed: Vec<String> = allowed.iter().map(|a| a.to_lowercase()).collect();
    headers
        .iter()
        .position(|h| allowed.contains(&normalize_header(h)))
}

/// Trimmed, non-empty cell value
pub(crate) fn cell(record: &StringRecord, column: Option<usize>) -> Option<&str> {
    column
        .and_then(|i| record.get(i))
        .map(|v| v.trim().trim_matches('"').trim())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
