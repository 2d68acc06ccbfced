// 📱 TWINT Parser - settlement report CSV (semicolon-delimited, quoted)
//
// Layout:
//   "Datum Überweisung";"01.11.2024"        <- preamble (payout date)
//   "Datum Abrechnung";"01.11.2024"
//   "Währung";"CHF"                          <- preamble (file currency)
//   "Überweisung am";"Transaktionsgebühr";"Währung";"Gutgeschriebener Betrag";...
//   "01.11.2024";"0.59";"CHF";"44.41";...
//
// The header row is found by its required column names, not by position.

use super::{cell, locate_column, AmountValidator, DateNormalizer, ParseOutcome, RawRecord, SourceFormat, StatementParser};
use crate::calendar::parse_date;
use crate::money::{Money, LOCAL_CURRENCY};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};

// Preamble keys
const PREAMBLE_PAYOUT_DATE: &[&str] = &["Datum Überweisung", "Transfer date"];
const PREAMBLE_CURRENCY: &[&str] = &["Währung", "Currency"];

// Header allowlists
const DATE: &[&str] = &["Transaktionsdatum", "Transaction date"];
const GROSS: &[&str] = &["Betrag Transaktion", "Transaction amount"];
const REFERENCE: &[&str] = &["Transaktions-ID", "Transaction ID"];
const FEE: &[&str] = &["Transaktionsgebühr", "Transaction fee"];
const NET: &[&str] = &["Gutgeschriebener Betrag", "Credited amount"];
const CURRENCY: &[&str] = &["Währung", "Currency"];
const TYPE: &[&str] = &["Typ", "Type"];
const MERCHANT_REFERENCE: &[&str] = &["Händlertransaktions-ID", "Merchant transaction ID"];
const SETTLED_ON: &[&str] = &["Überweisung am", "Transferred on"];

/// Row types that represent a customer payment
const PAYMENT_TYPES: &[&str] = &["product", "payment"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwintRow {
    pub row: usize,
    pub transaction_date: NaiveDate,
    pub gross: Money,
    /// Absent in some exports; treated as zero downstream
    pub fee: Option<Money>,
    pub reported_net: Option<Money>,
    pub transaction_id: String,
    pub merchant_reference: Option<String>,
    pub tx_type: Option<String>,
    pub settlement_date: Option<NaiveDate>,
}

struct Columns {
    date: usize,
    gross: usize,
    reference: usize,
    fee: Option<usize>,
    net: Option<usize>,
    currency: Option<usize>,
    tx_type: Option<usize>,
    merchant_reference: Option<usize>,
    settled_on: Option<usize>,
}

impl Columns {
    /// Some(..) only for the header row
    fn detect(record: &StringRecord) -> Option<Self> {
        Some(Columns {
            date: locate_column(record, DATE)?,
            gross: locate_column(record, GROSS)?,
            reference: locate_column(record, REFERENCE)?,
            fee: locate_column(record, FEE),
            net: locate_column(record, NET),
            currency: locate_column(record, CURRENCY),
            tx_type: locate_column(record, TYPE),
            merchant_reference: locate_column(record, MERCHANT_REFERENCE),
            settled_on: locate_column(record, SETTLED_ON),
        })
    }
}

/// Metadata lines above the header row
#[derive(Debug, Default)]
struct Preamble {
    payout_date: Option<NaiveDate>,
    currency: Option<String>,
}

pub struct TwintParser;

impl TwintParser {
    pub fn new() -> Self {
        TwintParser
    }

    fn read_preamble_line(&self, record: &StringRecord, preamble: &mut Preamble) -> Result<()> {
        let key = match cell(record, Some(0)) {
            Some(k) => k.to_lowercase(),
            None => return Ok(()),
        };
        let value = cell(record, Some(1));

        if PREAMBLE_PAYOUT_DATE.iter().any(|k| k.to_lowercase() == key) {
            if let Some(raw) = value {
                preamble.payout_date = Some(self.normalize_date(raw).context("invalid payout date in preamble")?);
            }
        } else if PREAMBLE_CURRENCY.iter().any(|k| k.to_lowercase() == key) {
            preamble.currency = value.map(str::to_uppercase);
        }
        Ok(())
    }

    /// Ok(None) = row intentionally skipped (not a payment)
    fn decode_row(
        &self,
        record: &StringRecord,
        cols: &Columns,
        preamble: &Preamble,
        row: usize,
    ) -> Result<Option<TwintRow>> {
        let tx_type = cell(record, cols.tx_type).map(str::to_string);
        if let Some(t) = &tx_type {
            if !PAYMENT_TYPES.contains(&t.to_lowercase().as_str()) {
                return Ok(None);
            }
        }

        if let Some(currency) = cell(record, cols.currency) {
            if !currency.eq_ignore_ascii_case(LOCAL_CURRENCY) {
                bail!("unsupported currency '{}'", currency);
            }
        }

        let date_raw = cell(record, Some(cols.date)).context("missing transaction date")?;
        let transaction_date = self.normalize_date(date_raw).context("invalid transaction date")?;

        let gross_raw = cell(record, Some(cols.gross)).context("missing transaction amount")?;
        let gross = self.validate_amount(gross_raw).context("invalid transaction amount")?;

        let fee = cell(record, cols.fee)
            .map(|raw| self.validate_amount(raw).context("invalid transaction fee"))
            .transpose()?;
        let reported_net = cell(record, cols.net)
            .map(|raw| self.validate_amount(raw).context("invalid credited amount"))
            .transpose()?;

        let transaction_id = cell(record, Some(cols.reference))
            .context("missing transaction id")?
            .to_string();

        let settled_on = cell(record, cols.settled_on)
            .map(|raw| self.normalize_date(raw).context("invalid transfer date"))
            .transpose()?;

        Ok(Some(TwintRow {
            row,
            transaction_date,
            gross,
            fee,
            reported_net,
            transaction_id,
            merchant_reference: cell(record, cols.merchant_reference).map(str::to_string),
            tx_type,
            settlement_date: settled_on.or(preamble.payout_date),
        }))
    }
}

impl Default for TwintParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for TwintParser {
    fn parse(&self, content: &str) -> ParseOutcome {
        let format = SourceFormat::TwintCsv;
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let mut outcome = ParseOutcome::new(format);
        let mut preamble = Preamble::default();
        let mut columns: Option<Columns> = None;

        for (idx, result) in reader.records().enumerate() {
            let row = idx + 1; // 1-indexed line, preamble included
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    if columns.is_none() {
                        return ParseOutcome::fatal(format, format!("unreadable preamble: {}", e));
                    }
                    outcome.push_row_error(row, anyhow::Error::new(e).context("malformed CSV line"));
                    continue;
                }
            };
            if record.iter().all(|v| v.trim().is_empty()) {
                continue;
            }

            let Some(cols) = columns.as_ref() else {
                if let Some(detected) = Columns::detect(&record) {
                    if let Some(currency) = &preamble.currency {
                        if !currency.eq_ignore_ascii_case(LOCAL_CURRENCY) {
                            return ParseOutcome::fatal(
                                format,
                                format!("file currency '{}' is not {}", currency, LOCAL_CURRENCY),
                            );
                        }
                    }
                    columns = Some(detected);
                } else if let Err(e) = self.read_preamble_line(&record, &mut preamble) {
                    return ParseOutcome::fatal(format, format!("{:#}", e));
                }
                continue;
            };

            match self.decode_row(&record, cols, &preamble, row) {
                Ok(Some(parsed)) => outcome.records.push(RawRecord::Twint(parsed)),
                Ok(None) => outcome.skipped += 1,
                Err(e) => outcome.push_row_error(row, e),
            }
        }

        if columns.is_none() {
            return ParseOutcome::fatal(
                format,
                "header row not found (expected Transaktionsdatum, Betrag Transaktion, Transaktions-ID)",
            );
        }
        outcome
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::TwintCsv
    }
}

impl AmountValidator for TwintParser {
    fn validate_amount(&self, raw: &str) -> Result<Money> {
        Money::parse_localized(raw)
    }
}

impl DateNormalizer for TwintParser {
    fn normalize_date(&self, raw: &str) -> Result<NaiveDate> {
        parse_date(raw)
    }
}

// ============================================================================
// TESTS
// ============================================================================
