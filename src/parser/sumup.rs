// 💳 SumUp Parser - transaction report CSV (comma-delimited)
//
// German export header (English export accepted too):
//   E-Mail,Datum,Transaktions-ID,Zahlungsart,Status,Kartentyp,...,Zahlungsmethode,...,
//   Betrag inkl. MwSt.,Netto,Steuerbetrag,Trinkgeldbetrag,Gebühr,Auszahlung,
//   Auszahlungsdatum,Auszahlungs-ID,Referenz
//
// Required: date, gross, fee, transaction id, payment method.
// Only successful sales (Zahlungsart "Umsatz") are imported; refunds,
// chargebacks and failed attempts are counted as skipped.

use super::{cell, locate_column, AmountValidator, DateNormalizer, ParseOutcome, RawRecord, SourceFormat, StatementParser};
use crate::calendar::parse_date;
use crate::money::Money;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};

// Header allowlists
const DATE: &[&str] = &["Datum", "Date"];
const GROSS: &[&str] = &["Betrag inkl. MwSt.", "Total amount", "Amount incl. VAT"];
const FEE: &[&str] = &["Gebühr", "Fee"];
const REFERENCE: &[&str] = &["Transaktions-ID", "Transaction ID"];
const PAYMENT_METHOD: &[&str] = &["Zahlungsmethode", "Payment method"];
const NET: &[&str] = &["Auszahlung", "Payout"];
const STATUS: &[&str] = &["Status"];
const TRANSACTION_TYPE: &[&str] = &["Zahlungsart", "Transaction type"];
const PAYOUT_DATE: &[&str] = &["Auszahlungsdatum", "Payout date"];
const PAYOUT_ID: &[&str] = &["Auszahlungs-ID", "Payout ID"];

/// Statuses of rows that represent money actually collected
const SETTLED_STATUSES: &[&str] = &["erfolgreich", "gezahlt", "successful", "paid"];

/// Transaction types that are sales (refunds and payouts are not)
const SALE_TYPES: &[&str] = &["umsatz", "sale"];

/// Typed SumUp row, validated right after decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumUpRow {
    pub row: usize,
    pub transaction_date: NaiveDate,
    pub gross: Money,
    pub fee: Money,
    pub reported_net: Option<Money>,
    pub transaction_id: String,
    pub payment_method: String,
    pub payout_date: Option<NaiveDate>,
    pub payout_id: Option<String>,
}

struct Columns {
    date: usize,
    gross: usize,
    fee: usize,
    reference: usize,
    payment_method: usize,
    net: Option<usize>,
    status: Option<usize>,
    transaction_type: Option<usize>,
    payout_date: Option<usize>,
    payout_id: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> std::result::Result<Self, String> {
        let required = [
            ("date", DATE),
            ("gross", GROSS),
            ("fee", FEE),
            ("reference", REFERENCE),
            ("payment method", PAYMENT_METHOD),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, names)| locate_column(headers, names).is_none())
            .map(|(label, _)| *label)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required column(s): {}", missing.join(", ")));
        }

        let find = |names: &[&str]| locate_column(headers, names).unwrap_or_default();
        Ok(Columns {
            date: find(DATE),
            gross: find(GROSS),
            fee: find(FEE),
            reference: find(REFERENCE),
            payment_method: find(PAYMENT_METHOD),
            net: locate_column(headers, NET),
            status: locate_column(headers, STATUS),
            transaction_type: locate_column(headers, TRANSACTION_TYPE),
            payout_date: locate_column(headers, PAYOUT_DATE),
            payout_id: locate_column(headers, PAYOUT_ID),
        })
    }
}

pub struct SumUpParser;

impl SumUpParser {
    pub fn new() -> Self {
        SumUpParser
    }

    /// Ok(None) = row intentionally skipped (not a collected payment)
    fn decode_row(&self, record: &StringRecord, cols: &Columns, row: usize) -> Result<Option<SumUpRow>> {
        if let Some(status) = cell(record, cols.status) {
            if !SETTLED_STATUSES.contains(&status.to_lowercase().as_str()) {
                return Ok(None);
            }
        }
        if let Some(kind) = cell(record, cols.transaction_type) {
            if !SALE_TYPES.contains(&kind.to_lowercase().as_str()) {
                return Ok(None);
            }
        }

        let date_raw = cell(record, Some(cols.date)).context("missing date")?;
        let transaction_date = self.normalize_date(date_raw).context("invalid transaction date")?;

        let gross_raw = cell(record, Some(cols.gross)).context("missing gross amount")?;
        let gross = self.validate_amount(gross_raw).context("invalid gross amount")?;

        let fee_raw = cell(record, Some(cols.fee)).context("missing fee")?;
        let fee = self.validate_amount(fee_raw).context("invalid fee")?;

        let reported_net = cell(record, cols.net)
            .map(|raw| self.validate_amount(raw).context("invalid payout amount"))
            .transpose()?;

        let transaction_id = cell(record, Some(cols.reference))
            .context("missing transaction id")?
            .to_string();
        let payment_method = cell(record, Some(cols.payment_method))
            .context("missing payment method")?
            .to_string();

        let payout_date = cell(record, cols.payout_date)
            .map(|raw| self.normalize_date(raw).context("invalid payout date"))
            .transpose()?;

        Ok(Some(SumUpRow {
            row,
            transaction_date,
            gross,
            fee,
            reported_net,
            transaction_id,
            payment_method,
            payout_date,
            payout_id: cell(record, cols.payout_id).map(str::to_string),
        }))
    }
}

impl Default for SumUpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for SumUpParser {
    fn parse(&self, content: &str) -> ParseOutcome {
        let format = SourceFormat::SumupCsv;
        let mut reader = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(e) => return ParseOutcome::fatal(format, format!("unreadable header row: {}", e)),
        };
        let cols = match Columns::locate(&headers) {
            Ok(c) => c,
            Err(reason) => return ParseOutcome::fatal(format, reason),
        };

        let mut outcome = ParseOutcome::new(format);
        for (line_num, result) in reader.records().enumerate() {
            let row = line_num + 2; // 1-indexed + header row
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    outcome.push_row_error(row, anyhow::Error::new(e).context("malformed CSV line"));
                    continue;
                }
            };

            match self.decode_row(&record, &cols, row) {
                Ok(Some(parsed)) => outcome.records.push(RawRecord::SumUp(parsed)),
                Ok(None) => outcome.skipped += 1,
                Err(e) => outcome.push_row_error(row, e),
            }
        }
        outcome
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::SumupCsv
    }
}

impl AmountValidator for SumUpParser {
    fn validate_amount(&self, raw: &str) -> Result<Money> {
        Money::parse_localized(raw)
    }
}

impl DateNormalizer for SumUpParser {
    fn normalize_date(&self, raw: &str) -> Result<NaiveDate> {
        parse_date(raw)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    const HEADER: &str = "E-Mail,Datum,Transaktions-ID,Zahlungsart,Status,Zahlungsmethode,Betrag inkl. MwSt.,Gebühr,Auszahlung,Auszahlungsdatum,Auszahlungs-ID";

    fn rows(outcome: &ParseOutcome) -> Vec<&SumUpRow> {
        outcome
            .records
            .iter()
            .filter_map(|r| match r {
                RawRecord::SumUp(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sumup_parse_csv() {
        let csv = format!(
            "{}\n\
             salon@example.ch,2025-04-30 18:19:06,TX-1001,Umsatz,Erfolgreich,Karte,120.00,1.80,118.20,2025-05-02,PO-77\n\
             salon@example.ch,2025-04-30 19:02:10,TX-1002,Umsatz,Erfolgreich,Karte,\"45,50\",\"0,68\",\"44,82\",,\n",
            HEADER
        );
        let outcome = SumUpParser::new().parse(&csv);

        assert!(outcome.errors.is_empty(), "unexpected errors: {:?}", outcome.errors);
        let parsed = rows(&outcome);
        assert_eq!(parsed.len(), 2);

        assert_eq!(parsed[0].transaction_id, "TX-1001");
        assert_eq!(parsed[0].gross, Money::from_cents(12000));
        assert_eq!(parsed[0].fee, Money::from_cents(180));
        assert_eq!(parsed[0].reported_net, Some(Money::from_cents(11820)));
        assert_eq!(parsed[0].payout_id.as_deref(), Some("PO-77"));
        assert_eq!(parsed[0].row, 2);

        assert_eq!(parsed[1].gross, Money::from_cents(4550));
        assert_eq!(parsed[1].payout_date, None);
    }

    #[test]
    fn test_sumup_bad_row_is_skipped_not_fatal() {
        let csv = format!(
            "{}\n\
             a@b.ch,2025-04-30,TX-1,Umsatz,Erfolgreich,Karte,1.234,0.10,,,\n\
             a@b.ch,2025-04-30,TX-2,Umsatz,Erfolgreich,Karte,10.00,0.15,9.85,,\n\
             a@b.ch,30/04/2025,TX-3,Umsatz,Erfolgreich,Karte,10.00,0.15,9.85,,\n",
            HEADER
        );
        let outcome = SumUpParser::new().parse(&csv);

        assert_eq!(rows(&outcome).len(), 1);
        assert_eq!(outcome.errors.len(), 2);
        match &outcome.errors[0] {
            ParseError::Row(e) => {
                assert_eq!(e.row, 2);
                assert!(e.reason.contains("gross"), "reason was {}", e.reason);
            }
            other => panic!("expected row error, got {:?}", other),
        }
        assert!(!outcome.is_fatal());
    }

    #[test]
    fn test_sumup_failed_status_is_skipped() {
        let csv = format!(
            "{}\na@b.ch,2025-04-30,TX-9,Umsatz,Fehlgeschlagen,Karte,10.00,0.15,,,\n",
            HEADER
        );
        let outcome = SumUpParser::new().parse(&csv);
        assert!(outcome.records.is_empty());
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_sumup_refunds_are_not_sales() {
        let csv = format!(
            "{}
             a@b.ch,2025-04-30,TX-1,Umsatz,Erfolgreich,Karte,45.00,0.68,44.32,,
             a@b.ch,2025-05-02,TX-2,Rückerstattung,Erfolgreich,Karte,-45.00,0.00,-45.00,,
",
            HEADER
        );
        let outcome = SumUpParser::new().parse(&csv);

        let parsed = rows(&outcome);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].transaction_id, "TX-1");
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.errors.is_empty());

        let english = "Date,Transaction ID,Transaction type,Status,Payment method,Total amount,Fee
                       2025-05-10,T-1,Sale,Successful,Card,45.00,0.68
                       2025-05-11,T-2,Refund,Successful,Card,-45.00,0.00
";
        let outcome = SumUpParser::new().parse(english);
        assert_eq!(rows(&outcome).len(), 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_sumup_missing_columns_is_fatal() {
        let csv = "Datum,Transaktions-ID,Betrag inkl. MwSt.\n2025-04-30,TX-1,10.00\n";
        let outcome = SumUpParser::new().parse(csv);

        assert!(outcome.is_fatal());
        assert!(outcome.records.is_empty());
        let fatal = outcome.fatal_error().unwrap();
        assert!(fatal.reason.contains("fee"));
        assert!(fatal.reason.contains("payment method"));
    }

    #[test]
    fn test_sumup_english_headers() {
        let csv = "Date,Transaction ID,Status,Payment method,Total amount,Fee\n\
                   2025-05-10,T-1,Successful,Card,45.00,0.68\n";
        let outcome = SumUpParser::new().parse(csv);
        assert_eq!(rows(&outcome).len(), 1);
        assert_eq!(rows(&outcome)[0].reported_net, None);
    }
}
