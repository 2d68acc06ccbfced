// 🏦 CAMT.053 Parser - ISO 20022 Bank-to-Customer Statement (XML)
//
// Document
//   BkToCstmrStmt
//     Stmt*            Id, Acct/Id/IBAN, Bal* (OPBD / CLBD)
//       Ntry*          Amt@Ccy, CdtDbtInd, RvslInd, Sts, BookgDt, AcctSvcrRef,
//                      NtryRef, AddtlNtryInf, NtryDtls/TxDtls/RmtInf/Ustrd
//
// The document is walked with reader events; every child of a <Stmt> is
// deserialized from its own span, so one broken <Ntry> costs one row.
//
// Fatal: malformed XML, no BkToCstmrStmt, no Stmt.
// Row-level (one <Ntry> skipped): unreadable Ntry (e.g. a repeated field),
// bad amount, foreign currency, bad CdtDbtInd, missing booking date.
// Non-BOOK entries are skipped silently.

use super::{AmountValidator, DateNormalizer, ParseOutcome, RawRecord, SourceFormat, StatementParser};
use crate::calendar::parse_date;
use crate::money::{Money, LOCAL_CURRENCY};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::de::DeError;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// One booked `<Ntry>`, amount signed by CdtDbtInd (credit positive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CamtEntryRow {
    /// 1-based ordinal of the `<Ntry>` in the file
    pub row: usize,
    pub statement_id: String,
    pub booking_date: NaiveDate,
    pub amount: Money,
    pub reversal: bool,
    /// AcctSvcrRef, else NtryRef
    pub entry_reference: Option<String>,
    pub narrative: String,
}

/// Statement header data used for the balance check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementInfo {
    pub statement_id: String,
    pub iban: Option<String>,
    pub opening_balance: Option<Money>,
    pub closing_balance: Option<Money>,
}

// ============================================================================
// XML ELEMENTS (lenient: everything optional, unknown elements ignored)
// ============================================================================

/// Text-only element such as `<Stmt><Id>`
#[derive(Debug, Deserialize)]
struct TextElement {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Account {
    id: Option<AccountId>,
}

#[derive(Debug, Deserialize)]
struct AccountId {
    #[serde(rename = "IBAN")]
    iban: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Balance {
    tp: Option<BalanceType>,
    amt: Option<Amount>,
    cdt_dbt_ind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceType {
    #[serde(rename = "CdOrPrtry")]
    code_or_proprietary: Option<Code>,
}

#[derive(Debug, Deserialize)]
struct Code {
    #[serde(rename = "Cd")]
    cd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    #[serde(rename = "@Ccy")]
    currency: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

/// `<Sts>BOOK</Sts>` (older versions) or `<Sts><Cd>BOOK</Cd></Sts>`
#[derive(Debug, Deserialize)]
struct EntryStatus {
    #[serde(rename = "$text", default)]
    text: Option<String>,
    #[serde(rename = "Cd", default)]
    cd: Option<String>,
}

impl EntryStatus {
    fn code(&self) -> Option<&str> {
        self.cd
            .as_deref()
            .or(self.text.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Entry {
    ntry_ref: Option<String>,
    amt: Option<Amount>,
    cdt_dbt_ind: Option<String>,
    rvsl_ind: Option<String>,
    sts: Option<EntryStatus>,
    #[serde(rename = "BookgDt")]
    booking_date: Option<DateChoice>,
    acct_svcr_ref: Option<String>,
    #[serde(default)]
    ntry_dtls: Vec<EntryDetails>,
    addtl_ntry_inf: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DateChoice {
    dt: Option<String>,
    dt_tm: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntryDetails {
    #[serde(default)]
    tx_dtls: Vec<TransactionDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TransactionDetails {
    rmt_inf: Option<RemittanceInfo>,
    addtl_tx_inf: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemittanceInfo {
    #[serde(default)]
    ustrd: Vec<String>,
}

// ============================================================================
// STATEMENT SCANNER
// ============================================================================

const CONTAINER: &[u8] = b"BkToCstmrStmt";
const STATEMENT: &[u8] = b"Stmt";

type EntrySlot = (usize, std::result::Result<Entry, DeError>);

/// One `<Stmt>` with its children deserialized individually
struct ScannedStatement {
    id: String,
    account: Option<Account>,
    balances: Vec<Balance>,
    entries: Vec<EntrySlot>,
}

/// `<Stmt>` still being read; `start` is the byte offset of its start tag
struct OpenStatement {
    start: usize,
    id: Option<String>,
    account: Option<Account>,
    balances: Vec<Balance>,
    entries: Vec<EntrySlot>,
}

impl OpenStatement {
    fn at(start: usize) -> Self {
        OpenStatement {
            start,
            id: None,
            account: None,
            balances: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn absorb(&mut self, name: &[u8], span: &str, row: &mut usize) {
        match name {
            b"Ntry" => {
                *row += 1;
                self.entries.push((*row, quick_xml::de::from_str(span)));
            }
            b"Bal" => match quick_xml::de::from_str(span) {
                Ok(balance) => self.balances.push(balance),
                Err(e) => tracing::debug!(error = %e, "unreadable Bal ignored"),
            },
            b"Acct" => match quick_xml::de::from_str(span) {
                Ok(account) => self.account = Some(account),
                Err(e) => tracing::debug!(error = %e, "unreadable Acct ignored"),
            },
            b"Id" if self.id.is_none() => {
                self.id = quick_xml::de::from_str::<TextElement>(span)
                    .ok()
                    .and_then(|t| t.value)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
            }
            _ => {}
        }
    }

    /// `text` is the full `<Stmt>...</Stmt>` source
    fn close(self, text: &str) -> ScannedStatement {
        ScannedStatement {
            id: self.id.unwrap_or_else(|| fallback_statement_id(text)),
            account: self.account,
            balances: self.balances,
            entries: self.entries,
        }
    }
}

/// Id for a `<Stmt>` without `<Id>`: derived from its content, so the same
/// statement re-uploaded keeps its id and different files never share one
fn fallback_statement_id(text: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(text.trim().as_bytes()));
    format!("statement-{}", &digest[..12])
}

fn span(content: &str, from: usize, to: usize) -> &str {
    content.get(from..to).unwrap_or_default()
}

/// Walk Document / BkToCstmrStmt / Stmt. Err carries the fatal reason.
fn scan_statements(content: &str) -> std::result::Result<Vec<ScannedStatement>, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // 0 = outside the root, 1 = in Document, 2 = in BkToCstmrStmt, 3 = in Stmt
    let mut depth = 0usize;
    let mut container_seen = false;
    let mut open: Option<OpenStatement> = None;
    let mut statements = Vec::new();
    let mut row = 0;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| format!("malformed XML: {}", e))?;
        match event {
            Event::Start(e) => {
                let local = e.local_name();
                match depth {
                    0 => depth = 1,
                    1 if local.as_ref() == CONTAINER => {
                        container_seen = true;
                        depth = 2;
                    }
                    2 if local.as_ref() == STATEMENT => {
                        open = Some(OpenStatement::at(before));
                        depth = 3;
                    }
                    3 => {
                        reader
                            .read_to_end(e.name())
                            .map_err(|e| format!("malformed XML: {}", e))?;
                        let child = span(content, before, reader.buffer_position() as usize);
                        if let Some(stmt) = open.as_mut() {
                            stmt.absorb(local.as_ref(), child, &mut row);
                        }
                    }
                    _ => {
                        reader
                            .read_to_end(e.name())
                            .map_err(|e| format!("malformed XML: {}", e))?;
                    }
                }
            }
            Event::Empty(e) => {
                let local = e.local_name();
                let child = span(content, before, reader.buffer_position() as usize);
                match depth {
                    1 if local.as_ref() == CONTAINER => container_seen = true,
                    2 if local.as_ref() == STATEMENT => statements.push(OpenStatement::at(before).close(child)),
                    3 => {
                        if let Some(stmt) = open.as_mut() {
                            stmt.absorb(local.as_ref(), child, &mut row);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                if depth == 3 {
                    if let Some(stmt) = open.take() {
                        let whole = span(content, stmt.start, reader.buffer_position() as usize);
                        statements.push(stmt.close(whole));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err("malformed XML: document ends inside an open element".to_string());
    }
    if !container_seen {
        return Err("missing BkToCstmrStmt element".to_string());
    }
    if statements.is_empty() {
        return Err("statement contains no Stmt element".to_string());
    }
    Ok(statements)
}

// ============================================================================
// PARSER
// ============================================================================

pub struct Camt053Parser;

impl Camt053Parser {
    pub fn new() -> Self {
        Camt053Parser
    }

    /// Signed amount from `<Amt Ccy="..">` plus CdtDbtInd
    fn signed_amount(&self, amt: Option<&Amount>, indicator: Option<&str>) -> Result<Money> {
        let amt = amt.context("missing Amt")?;
        let currency = amt.currency.as_deref().map(str::trim).unwrap_or(LOCAL_CURRENCY);
        if !currency.eq_ignore_ascii_case(LOCAL_CURRENCY) {
            bail!("unsupported currency '{}'", currency);
        }
        let raw = amt.value.as_deref().context("empty Amt")?;
        let value = self.validate_amount(raw)?;
        if value.is_negative() {
            bail!("Amt '{}' must be unsigned; the sign comes from CdtDbtInd", raw.trim());
        }

        match indicator.map(str::trim) {
            Some("CRDT") => Ok(value),
            Some("DBIT") => Ok(-value),
            Some(other) => bail!("invalid CdtDbtInd '{}'", other),
            None => bail!("missing CdtDbtInd"),
        }
    }

    fn statement_info(&self, stmt: &ScannedStatement) -> StatementInfo {
        let statement_id = stmt.id.as_str();
        let mut info = StatementInfo {
            statement_id: statement_id.to_string(),
            iban: stmt
                .account
                .as_ref()
                .and_then(|a| a.id.as_ref())
                .and_then(|id| id.iban.as_deref())
                .map(|s| s.trim().to_string()),
            opening_balance: None,
            closing_balance: None,
        };

        for bal in &stmt.balances {
            let code = bal
                .tp
                .as_ref()
                .and_then(|t| t.code_or_proprietary.as_ref())
                .and_then(|c| c.cd.as_deref())
                .map(str::trim);
            let amount = match self.signed_amount(bal.amt.as_ref(), bal.cdt_dbt_ind.as_deref()) {
                Ok(a) => a,
                Err(e) => {
                    tracing::debug!(statement = statement_id, error = %format!("{:#}", e), "balance ignored");
                    continue;
                }
            };
            match code {
                Some("OPBD") => info.opening_balance = Some(amount),
                Some("CLBD") => info.closing_balance = Some(amount),
                _ => {}
            }
        }
        info
    }

    /// Ok(None) = entry not booked (pending / informational)
    fn decode_entry(&self, entry: &Entry, statement_id: &str, row: usize) -> Result<Option<CamtEntryRow>> {
        let status = entry.sts.as_ref().and_then(EntryStatus::code);
        if let Some(code) = status {
            if !code.eq_ignore_ascii_case("BOOK") {
                return Ok(None);
            }
        }

        let amount = self
            .signed_amount(entry.amt.as_ref(), entry.cdt_dbt_ind.as_deref())
            .context("invalid entry amount")?;

        let date_raw = entry
            .booking_date
            .as_ref()
            .and_then(|d| d.dt.as_deref().or(d.dt_tm.as_deref()))
            .context("missing booking date")?;
        let booking_date = self.normalize_date(date_raw).context("invalid booking date")?;

        let entry_reference = entry
            .acct_svcr_ref
            .as_deref()
            .or(entry.ntry_ref.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let reversal = entry
            .rvsl_ind
            .as_deref()
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Some(CamtEntryRow {
            row,
            statement_id: statement_id.to_string(),
            booking_date,
            amount,
            reversal,
            entry_reference,
            narrative: narrative(entry),
        }))
    }
}

/// AddtlNtryInf, unstructured remittance lines, AddtlTxInf (in that order)
fn narrative(entry: &Entry) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(info) = &entry.addtl_ntry_inf {
        parts.push(info);
    }
    for details in &entry.ntry_dtls {
        for tx in &details.tx_dtls {
            if let Some(rmt) = &tx.rmt_inf {
                parts.extend(rmt.ustrd.iter().map(String::as_str));
            }
            if let Some(info) = &tx.addtl_tx_inf {
                parts.push(info);
            }
        }
    }
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Default for Camt053Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for Camt053Parser {
    fn parse(&self, content: &str) -> ParseOutcome {
        let format = SourceFormat::BankCamt053Xml;

        let statements = match scan_statements(content) {
            Ok(statements) => statements,
            Err(reason) => return ParseOutcome::fatal(format, reason),
        };

        let mut outcome = ParseOutcome::new(format);
        for stmt in &statements {
            outcome.statements.push(self.statement_info(stmt));

            for (row, slot) in &stmt.entries {
                let entry = match slot {
                    Ok(entry) => entry,
                    Err(e) => {
                        outcome.push_row_error(*row, anyhow!("malformed Ntry: {}", e));
                        continue;
                    }
                };
                match self.decode_entry(entry, &stmt.id, *row) {
                    Ok(Some(parsed)) => outcome.records.push(RawRecord::Camt(parsed)),
                    Ok(None) => outcome.skipped += 1,
                    Err(e) => outcome.push_row_error(*row, e),
                }
            }
        }
        outcome
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::BankCamt053Xml
    }
}

impl AmountValidator for Camt053Parser {
    fn validate_amount(&self, raw: &str) -> Result<Money> {
        Money::parse_plain(raw)
    }
}

impl DateNormalizer for Camt053Parser {
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

    fn entry(amount: &str, ind: &str, date: &str, reference: &str, info: &str) -> String {
        format!(
            r#"<Ntry>
                <Amt Ccy="CHF">{}</Amt>
                <CdtDbtInd>{}</CdtDbtInd>
                <Sts><Cd>BOOK</Cd></Sts>
                <BookgDt><Dt>{}</Dt></BookgDt>
                <ValDt><Dt>{}</Dt></ValDt>
                <AcctSvcrRef>{}</AcctSvcrRef>
                <AddtlNtryInf>{}</AddtlNtryInf>
            </Ntry>"#,
            amount, ind, date, date, reference, info
        )
    }

    fn statement(entries: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.04">
  <BkToCstmrStmt>
    <GrpHdr><MsgId>MSG-1</MsgId><CreDtTm>2025-05-31T18:00:00</CreDtTm></GrpHdr>
    <Stmt>
      <Id>STMT-2025-05</Id>
      <Acct><Id><IBAN>CH9300762011623852957</IBAN></Id></Acct>
      <Bal>
        <Tp><CdOrPrtry><Cd>OPBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="CHF">1000.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Dt><Dt>2025-05-01</Dt></Dt>
      </Bal>
      <Bal>
        <Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="CHF">1044.10</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Dt><Dt>2025-05-31</Dt></Dt>
      </Bal>
      {}
    </Stmt>
  </BkToCstmrStmt>
</Document>"#,
            entries.join("\n")
        )
    }

    fn rows(outcome: &ParseOutcome) -> Vec<&CamtEntryRow> {
        outcome
            .records
            .iter()
            .filter_map(|r| match r {
                RawRecord::Camt(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_camt_parse_entries_and_balances() {
        let xml = statement(&[
            entry("44.10", "CRDT", "2025-05-12", "BANK-REF-1", "TWINT Acquiring AG Gutschrift"),
            entry("12.00", "DBIT", "2025-05-13", "BANK-REF-2", "Kontoführung"),
        ]);
        let outcome = Camt053Parser::new().parse(&xml);

        assert!(outcome.errors.is_empty(), "unexpected errors: {:?}", outcome.errors);
        let parsed = rows(&outcome);
        assert_eq!(parsed.len(), 2);

        assert_eq!(parsed[0].amount, Money::from_cents(4410));
        assert_eq!(parsed[0].booking_date, NaiveDate::from_ymd_opt(2025, 5, 12).unwrap());
        assert_eq!(parsed[0].entry_reference.as_deref(), Some("BANK-REF-1"));
        assert_eq!(parsed[0].narrative, "TWINT Acquiring AG Gutschrift");
        assert_eq!(parsed[0].statement_id, "STMT-2025-05");
        assert_eq!(parsed[1].amount, Money::from_cents(-1200));

        assert_eq!(outcome.statements.len(), 1);
        let info = &outcome.statements[0];
        assert_eq!(info.iban.as_deref(), Some("CH9300762011623852957"));
        assert_eq!(info.opening_balance, Some(Money::from_cents(100000)));
        assert_eq!(info.closing_balance, Some(Money::from_cents(104410)));
    }

    #[test]
    fn test_camt_malformed_entry_is_row_error() {
        let xml = statement(&[
            entry("44.10", "CRDT", "2025-05-12", "R1", "TWINT Acquiring AG"),
            entry("4x.10", "CRDT", "2025-05-12", "R2", "TWINT Acquiring AG"),
            entry("20.00", "CRDT", "2025-05-13", "R3", "SUMUP PAYMENTS LIMITED"),
        ]);
        let outcome = Camt053Parser::new().parse(&xml);

        assert_eq!(rows(&outcome).len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(!outcome.is_fatal());
        match &outcome.errors[0] {
            ParseError::Row(e) => {
                assert_eq!(e.row, 2);
                assert_eq!(e.format, SourceFormat::BankCamt053Xml);
            }
            other => panic!("expected row error, got {:?}", other),
        }
    }

    #[test]
    fn test_camt_duplicate_field_entry_is_row_error() {
        let twice_amt = entry("30.00", "CRDT", "2025-05-12", "R2", "x")
            .replace("<CdtDbtInd>", "<Amt Ccy=\"CHF\">31.00</Amt><CdtDbtInd>");
        let twice_date = entry("40.00", "CRDT", "2025-05-12", "R3", "y")
            .replace("<AcctSvcrRef>", "<BookgDt><Dt>2025-05-13</Dt></BookgDt><AcctSvcrRef>");
        let xml = statement(&[
            entry("44.10", "CRDT", "2025-05-12", "R1", "TWINT Acquiring AG"),
            twice_amt,
            entry("20.00", "CRDT", "2025-05-13", "R4", "SUMUP PAYMENTS LIMITED"),
            twice_date,
        ]);
        let outcome = Camt053Parser::new().parse(&xml);

        assert!(!outcome.is_fatal());
        let parsed = rows(&outcome);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].entry_reference.as_deref(), Some("R1"));
        assert_eq!(parsed[1].entry_reference.as_deref(), Some("R4"));
        assert_eq!(parsed[1].row, 3);

        let failed: Vec<usize> = outcome
            .errors
            .iter()
            .map(|e| match e {
                ParseError::Row(row) => row.row,
                other => panic!("expected row error, got {:?}", other),
            })
            .collect();
        assert_eq!(failed, vec![2, 4]);
        assert!(outcome.errors[0].to_string().contains("Ntry"));

        // Balances and header survive the broken entries
        assert_eq!(outcome.statements.len(), 1);
        assert_eq!(outcome.statements[0].closing_balance, Some(Money::from_cents(104410)));
    }

    #[test]
    fn test_camt_statement_without_id_gets_content_id() {
        let without_id = |entries: &[String]| statement(entries).replace("<Id>STMT-2025-05</Id>", "");
        let a = without_id(&[entry("44.10", "CRDT", "2025-05-12", "R1", "x")]);
        let b = without_id(&[entry("20.00", "CRDT", "2025-05-13", "R2", "y")]);
        let parser = Camt053Parser::new();

        let first = parser.parse(&a);
        let again = parser.parse(&a);
        let other = parser.parse(&b);

        let id = &first.statements[0].statement_id;
        assert!(id.starts_with("statement-"), "id was {}", id);
        assert_eq!(id, &again.statements[0].statement_id);
        assert_ne!(id, &other.statements[0].statement_id);
        assert_eq!(&rows(&first)[0].statement_id, id);
    }

    #[test]
    fn test_camt_foreign_currency_and_bad_indicator() {
        let eur = entry("10.00", "CRDT", "2025-05-12", "R1", "x").replace("Ccy=\"CHF\"", "Ccy=\"EUR\"");
        let bad_ind = entry("10.00", "CREDIT", "2025-05-12", "R2", "x");
        let outcome = Camt053Parser::new().parse(&statement(&[eur, bad_ind]));

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.row_error_count(), 2);
        let reasons: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        assert!(reasons[0].contains("EUR"));
        assert!(reasons[1].contains("CdtDbtInd"));
    }

    #[test]
    fn test_camt_pending_entries_skipped() {
        let pending = entry("10.00", "CRDT", "2025-05-12", "R1", "x").replace("BOOK", "PDNG");
        let booked = entry("20.00", "CRDT", "2025-05-12", "R2", "y");
        let outcome = Camt053Parser::new().parse(&statement(&[pending, booked]));

        assert_eq!(rows(&outcome).len(), 1);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_camt_narrative_and_reversal() {
        let xml = statement(&[r#"<Ntry>
            <NtryRef>NR-9</NtryRef>
            <Amt Ccy="CHF">44.10</Amt>
            <CdtDbtInd>DBIT</CdtDbtInd>
            <RvslInd>true</RvslInd>
            <Sts><Cd>BOOK</Cd></Sts>
            <BookgDt><Dt>2025-06-20</Dt></BookgDt>
            <NtryDtls><TxDtls>
                <RmtInf><Ustrd>Rueckbuchung</Ustrd><Ustrd>REF X1</Ustrd></RmtInf>
                <AddtlTxInf>TWINT Acquiring AG</AddtlTxInf>
            </TxDtls></NtryDtls>
        </Ntry>"#
            .to_string()]);
        let outcome = Camt053Parser::new().parse(&xml);

        let parsed = rows(&outcome);
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].reversal);
        assert_eq!(parsed[0].entry_reference.as_deref(), Some("NR-9"));
        assert_eq!(parsed[0].narrative, "Rueckbuchung REF X1 TWINT Acquiring AG");
        assert_eq!(parsed[0].amount, Money::from_cents(-4410));
    }

    #[test]
    fn test_camt_structural_errors_are_fatal() {
        let parser = Camt053Parser::new();

        let missing_root = parser.parse("<Document><Other/></Document>");
        assert!(missing_root.is_fatal());
        assert!(missing_root.fatal_error().unwrap().reason.contains("BkToCstmrStmt"));

        let no_statement = parser.parse("<Document><BkToCstmrStmt></BkToCstmrStmt></Document>");
        assert!(no_statement.is_fatal());

        let broken = parser.parse("<Document><BkToCstmrStmt><Stmt></BkToCstmrStmt>");
        assert!(broken.is_fatal());
        assert!(broken.records.is_empty());
    }
}
