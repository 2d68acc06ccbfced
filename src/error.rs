// ⚠️ Error Taxonomy - fatal file errors, skipped rows, data-quality warnings
//
// Only ImportError aborts a run. Everything else travels inside ImportResult.

use crate::parser::SourceFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whole file unusable (bad encoding, missing header columns, missing statement)
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{format:?}: file rejected: {reason}")]
pub struct FileFatalError {
    pub format: SourceFormat,
    pub reason: String,
}

/// One row (CSV line or `<Ntry>`) skipped; parsing continued
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{format:?}: row {row} skipped: {reason}")]
pub struct RowParseError {
    pub format: SourceFormat,
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum ParseError {
    #[error(transparent)]
    File(#[from] FileFatalError),
    #[error(transparent)]
    Row(#[from] RowParseError),
}

impl ParseError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseError::File(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Reported net differs from gross - fee by more than 1 cent
    NetMismatch,
    /// Same dedup key seen twice with different amounts
    DuplicateReference,
    /// Opening balance + entries != closing balance
    StatementBalanceMismatch,
    /// Several equally good bank counterparts for one settlement
    AmbiguousBankMatch,
    /// Reversal entry fits several settled transactions
    AmbiguousChargeback,
}

/// Collected alongside successful output, never a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl DataQualityWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        DataQualityWarning { kind, message: message.into() }
    }
}

/// Hard failures of an import run
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no input files supplied")]
    NoInput,
    #[error("none of the {} input files could be processed", .0.len())]
    AllFilesFailed(Vec<FileFatalError>),
    #[error("invalid matching configuration: {0}")]
    InvalidConfig(String),
}
