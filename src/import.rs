// 📥 Import Orchestrator - files + sales snapshot → ImportResult
//
// Pipeline (one run, no I/O beyond the bytes handed in):
//   1. parse every file (in parallel, results kept in input order)
//   2. normalize rows into settlements / bank entries
//   3. deduplicate by key, first occurrence wins
//   4. check statement balances
//   5. match sales (inside the window) against settlements and bank entries
//   6. summarize
//
// Only "nothing usable at all" is an error; everything else is reported
// inside the result.

use crate::balance::{check_statement, BalanceReport};
use crate::calendar::DateRange;
use crate::config::MatchingConfig;
use crate::error::{DataQualityWarning, FileFatalError, ImportError, ParseError, WarningKind};
use crate::matching::MatchingEngine;
use crate::model::{
    BankEntry, BankLink, MatchCandidate, MatchState, PosSale, Provider, SaleReconciliation,
    SettlementTransaction,
};
use crate::money::Money;
use crate::normalize::{Normalized, Normalizer};
use crate::parser::{self, ParseOutcome, SourceFormat, StatementInfo};
use crate::signatures::SignatureRegistry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::thread;
use tracing::{debug, info, warn};

// ============================================================================
// INPUT
// ============================================================================

/// One uploaded file with its declared format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub format: SourceFormat,
    /// Display name, used in logs only
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(format: SourceFormat, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        UploadedFile {
            format,
            name: name.into(),
            content: content.into(),
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Settlement transaction ↔ bank entry link (also for unmatched settlements)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBankLink {
    pub provider: Provider,
    pub provider_reference_id: String,
    pub link: BankLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargebackRecord {
    pub entry_reference_id: String,
    pub provider: Provider,
    pub provider_reference_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub files_received: usize,
    pub files_rejected: usize,
    pub records_parsed: usize,
    pub rows_skipped: usize,
    pub row_errors: usize,
    pub duplicates_removed: usize,
    pub settlement_transactions: usize,
    pub bank_entries: usize,
    pub sales_in_window: usize,
    pub cash_sales: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub orphaned: usize,
    pub orphan_settlements: usize,
    pub orphan_bank_entries: usize,
    pub chargebacks: usize,
    pub warnings: usize,
    /// Matched share of non-cash sales, percent (rounded)
    pub matching_rate: u8,
}

impl ImportSummary {
    pub fn summary(&self) -> String {
        format!(
            "Import: {} files ({} rejected), {} settlements, {} bank entries, {} row errors | Sales: {} matched, {} ambiguous, {} orphaned ({}% matched) | {} orphan bank entries, {} chargebacks, {} warnings",
            self.files_received,
            self.files_rejected,
            self.settlement_transactions,
            self.bank_entries,
            self.row_errors,
            self.matched,
            self.ambiguous,
            self.orphaned,
            self.matching_rate,
            self.orphan_bank_entries,
            self.chargebacks,
            self.warnings
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub settlement_transactions: Vec<SettlementTransaction>,
    pub bank_entries: Vec<BankEntry>,
    /// MATCHED candidates, one per matched sale
    pub matches: Vec<MatchCandidate>,
    /// Per-sale view for every sale inside the window (input order)
    pub sales: Vec<SaleReconciliation>,
    /// Ids of sales left AMBIGUOUS or ORPHANED
    pub unmatched_sales: Vec<String>,
    pub orphan_settlements: Vec<SettlementTransaction>,
    pub orphan_bank_entries: Vec<BankEntry>,
    pub bank_links: Vec<SettlementBankLink>,
    pub chargebacks: Vec<ChargebackRecord>,
    pub statement_balances: Vec<BalanceReport>,
    pub parse_errors: Vec<ParseError>,
    pub warnings: Vec<DataQualityWarning>,
    pub summary: ImportSummary,
}

impl ImportResult {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize import result")
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct ImportOrchestrator<'a> {
    config: &'a MatchingConfig,
}

impl<'a> ImportOrchestrator<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        ImportOrchestrator { config }
    }

    pub fn run(
        &self,
        files: &[UploadedFile],
        window: DateRange,
        sales: &[PosSale],
    ) -> Result<ImportResult, ImportError> {
        self.config.validate()?;
        if files.is_empty() {
            return Err(ImportError::NoInput);
        }
        let signatures = SignatureRegistry::new(&self.config.provider_signatures, &self.config.reversal_patterns)
            .map_err(|e| ImportError::InvalidConfig(format!("{:#}", e)))?;

        // 1. Parse
        let outcomes = parse_all(files);
        let fatal: Vec<FileFatalError> = outcomes.iter().filter_map(|o| o.fatal_error().cloned()).collect();
        if fatal.len() == outcomes.len() {
            warn!(files = files.len(), "no input file could be processed");
            return Err(ImportError::AllFilesFailed(fatal));
        }

        // 2. Normalize
        let normalizer = Normalizer::new(&signatures);
        let mut normalized = Normalized::default();
        let mut parse_errors = Vec::new();
        let mut statements: Vec<StatementInfo> = Vec::new();
        for (idx, (file, outcome)) in files.iter().zip(&outcomes).enumerate() {
            normalizer.normalize_into(&outcome.records, &mut normalized);
            // Identical re-uploads: records go through dedup, errors are reported once
            let repeat = files[..idx]
                .iter()
                .any(|earlier| earlier.format == file.format && earlier.content == file.content);
            if repeat {
                debug!(file = file.name.as_str(), "identical upload, parse errors already reported");
                continue;
            }
            parse_errors.extend(outcome.errors.iter().cloned());
            statements.extend(outcome.statements.iter().cloned());
        }
        let Normalized { settlements, bank_entries, mut warnings } = normalized;

        // 3. Deduplicate
        let (settlements, settlement_dups) = dedup_settlements(settlements, &mut warnings);
        let (bank_entries, entry_dups) = dedup_bank_entries(bank_entries, &mut warnings);

        // 4. Statement balances (one check per statement id)
        let mut seen_statements = HashSet::new();
        let statement_balances: Vec<BalanceReport> = statements
            .iter()
            .filter(|s| seen_statements.insert(s.statement_id.clone()))
            .map(|s| check_statement(s, &bank_entries))
            .collect();
        warnings.extend(statement_balances.iter().filter_map(BalanceReport::to_warning));

        // 5. Match
        let window_sales: Vec<PosSale> = sales.iter().filter(|s| window.contains(s.date)).cloned().collect();
        let outcome = MatchingEngine::new(self.config).run(&window_sales, &settlements, &bank_entries, window.end);
        warnings.extend(outcome.warnings);

        let matches: Vec<MatchCandidate> = outcome
            .reconciliations
            .iter()
            .filter(|r| r.state == MatchState::Matched)
            .flat_map(|r| r.candidates.iter().cloned())
            .collect();
        let unmatched_sales: Vec<String> = outcome
            .reconciliations
            .iter()
            .filter(|r| matches!(r.state, MatchState::Ambiguous | MatchState::Orphaned))
            .map(|r| r.sale_id.clone())
            .collect();
        let bank_links: Vec<SettlementBankLink> = settlements
            .iter()
            .zip(&outcome.bank_links)
            .filter_map(|(tx, link)| {
                link.as_ref().map(|l| SettlementBankLink {
                    provider: tx.provider,
                    provider_reference_id: tx.provider_reference_id.clone(),
                    link: l.clone(),
                })
            })
            .collect();
        let chargebacks: Vec<ChargebackRecord> = outcome
            .chargebacks
            .iter()
            .map(|c| ChargebackRecord {
                entry_reference_id: bank_entries[c.entry].entry_reference_id.clone(),
                provider: settlements[c.settlement].provider,
                provider_reference_id: settlements[c.settlement].provider_reference_id.clone(),
                amount: bank_entries[c.entry].amount,
            })
            .collect();
        let orphan_settlements: Vec<SettlementTransaction> =
            outcome.orphan_settlements.iter().map(|&i| settlements[i].clone()).collect();
        let orphan_bank_entries: Vec<BankEntry> =
            outcome.orphan_bank_entries.iter().map(|&i| bank_entries[i].clone()).collect();

        // 6. Summarize
        let count_state = |state: MatchState| outcome.reconciliations.iter().filter(|r| r.state == state).count();
        let cash_sales = window_sales.iter().filter(|s| s.payment_method.provider().is_none()).count();
        let matched = count_state(MatchState::Matched);
        let non_cash = window_sales.len() - cash_sales;

        let summary = ImportSummary {
            files_received: files.len(),
            files_rejected: fatal.len(),
            records_parsed: outcomes.iter().map(|o| o.records.len()).sum(),
            rows_skipped: outcomes.iter().map(|o| o.skipped).sum(),
            row_errors: parse_errors.iter().filter(|e| !e.is_fatal()).count(),
            duplicates_removed: settlement_dups + entry_dups,
            settlement_transactions: settlements.len(),
            bank_entries: bank_entries.len(),
            sales_in_window: window_sales.len(),
            cash_sales,
            matched,
            ambiguous: count_state(MatchState::Ambiguous),
            orphaned: count_state(MatchState::Orphaned),
            orphan_settlements: orphan_settlements.len(),
            orphan_bank_entries: orphan_bank_entries.len(),
            chargebacks: chargebacks.len(),
            warnings: warnings.len(),
            matching_rate: rate(matched, non_cash),
        };
        info!("{}", summary.summary());

        Ok(ImportResult {
            settlement_transactions: settlements,
            bank_entries,
            matches,
            sales: outcome.reconciliations,
            unmatched_sales,
            orphan_settlements,
            orphan_bank_entries,
            bank_links,
            chargebacks,
            statement_balances,
            parse_errors,
            warnings,
            summary,
        })
    }
}

/// Run one import with an explicit configuration
pub fn run_import(
    files: &[UploadedFile],
    window: DateRange,
    sales: &[PosSale],
    config: &MatchingConfig,
) -> Result<ImportResult, ImportError> {
    ImportOrchestrator::new(config).run(files, window, sales)
}

/// Parse files concurrently; output order follows input order
fn parse_all(files: &[UploadedFile]) -> Vec<ParseOutcome> {
    thread::scope(|scope| {
        let handles: Vec<_> = files
            .iter()
            .map(|file| {
                let handle = scope.spawn(move || parser::parse(&file.content, file.format));
                (file, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(file, handle)| {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|_| ParseOutcome::fatal(file.format, "parser crashed"));
                debug!(
                    file = file.name.as_str(),
                    records = outcome.records.len(),
                    errors = outcome.errors.len(),
                    "file processed"
                );
                outcome
            })
            .collect()
    })
}

fn rate(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u8
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

/// Keep the first settlement per (provider, reference); returns (kept, removed)
pub fn dedup_settlements(
    settlements: Vec<SettlementTransaction>,
    warnings: &mut Vec<DataQualityWarning>,
) -> (Vec<SettlementTransaction>, usize) {
    let mut seen: HashMap<(Provider, String), usize> = HashMap::new();
    let mut kept: Vec<SettlementTransaction> = Vec::with_capacity(settlements.len());
    let mut removed = 0;

    for tx in settlements {
        let key = (tx.provider, tx.provider_reference_id.clone());
        if let Some(&first) = seen.get(&key) {
            removed += 1;
            let original = &kept[first];
            if original.gross_amount != tx.gross_amount || original.net_amount != tx.net_amount {
                warn!(
                    provider = tx.provider.code(),
                    reference = tx.provider_reference_id.as_str(),
                    "duplicate settlement reference with different amounts"
                );
                warnings.push(DataQualityWarning::new(
                    WarningKind::DuplicateReference,
                    format!(
                        "{} {}: duplicate with gross {} / net {} ignored; kept gross {} / net {}",
                        tx.provider.name(),
                        tx.provider_reference_id,
                        tx.gross_amount,
                        tx.net_amount,
                        original.gross_amount,
                        original.net_amount
                    ),
                ));
            }
            continue;
        }
        seen.insert(key, kept.len());
        kept.push(tx);
    }
    (kept, removed)
}

/// Keep the first bank entry per entry reference id; returns (kept, removed)
pub fn dedup_bank_entries(
    entries: Vec<BankEntry>,
    warnings: &mut Vec<DataQualityWarning>,
) -> (Vec<BankEntry>, usize) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<BankEntry> = Vec::with_capacity(entries.len());
    let mut removed = 0;

    for entry in entries {
        if let Some(&first) = seen.get(&entry.entry_reference_id) {
            removed += 1;
            let original = &kept[first];
            if original.amount != entry.amount {
                warn!(
                    entry = entry.entry_reference_id.as_str(),
                    "duplicate bank entry reference with different amounts"
                );
                warnings.push(DataQualityWarning::new(
                    WarningKind::DuplicateReference,
                    format!(
                        "bank entry {}: duplicate with amount {} ignored; kept {}",
                        entry.entry_reference_id, entry.amount, original.amount
                    ),
                ));
            }
            continue;
        }
        seen.insert(entry.entry_reference_id.clone(), kept.len());
        kept.push(entry);
    }
    (kept, removed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryProvider;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    fn tx(reference: &str, gross: i64) -> SettlementTransaction {
        SettlementTransaction {
            provider: Provider::Sumup,
            transaction_date: d(10),
            gross_amount: Money::from_cents(gross),
            provider_fee: Money::ZERO,
            net_amount: Money::from_cents(gross),
            provider_reference_id: reference.to_string(),
            raw_payment_method: "Karte".to_string(),
            merchant_reference: None,
            settlement_date: None,
            settlement_batch_id: None,
            source_row: 2,
        }
    }

    fn entry(id: &str, cents: i64) -> BankEntry {
        BankEntry {
            booking_date: d(12),
            amount: Money::from_cents(cents),
            counterparty_reference: String::new(),
            provider: EntryProvider::Other,
            entry_reference_id: id.to_string(),
            reversal: false,
            statement_id: None,
            source_row: 1,
        }
    }

    #[test]
    fn test_dedup_settlements_keeps_first() {
        let mut warnings = Vec::new();
        let (kept, removed) = dedup_settlements(vec![tx("A", 100), tx("B", 200), tx("A", 100)], &mut warnings);

        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 1);
        assert!(warnings.is_empty(), "exact duplicates are silent");
    }

    #[test]
    fn test_dedup_conflicting_amounts_warns() {
        let mut warnings = Vec::new();
        let (kept, _) = dedup_settlements(vec![tx("A", 100), tx("A", 150)], &mut warnings);
        assert_eq!(kept[0].gross_amount, Money::from_cents(100));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::DuplicateReference);

        let (entries, removed) = dedup_bank_entries(vec![entry("E1", 5), entry("E1", 6)], &mut warnings);
        assert_eq!(entries.len(), 1);
        assert_eq!(removed, 1);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_no_input_and_all_failed() {
        let config = MatchingConfig::default();
        let window = DateRange::day(d(10));

        assert!(matches!(run_import(&[], window, &[], &config), Err(ImportError::NoInput)));

        let broken = vec![
            UploadedFile::new(SourceFormat::SumupCsv, "a.csv", "just,some,columns\n1,2,3\n"),
            UploadedFile::new(SourceFormat::BankCamt053Xml, "b.xml", "<Document/>"),
        ];
        match run_import(&broken, window, &[], &config) {
            Err(ImportError::AllFilesFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected AllFilesFailed, got {:?}", other.map(|r| r.summary)),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MatchingConfig::default();
        config.reversal_patterns = vec!["(".to_string()];
        let files = vec![UploadedFile::new(SourceFormat::SumupCsv, "a.csv", "Datum\n")];
        assert!(matches!(
            run_import(&files, DateRange::day(d(10)), &[], &config),
            Err(ImportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rate_rounding() {
        assert_eq!(rate(2, 3), 67);
        assert_eq!(rate(0, 0), 0);
        assert_eq!(rate(5, 5), 100);
    }
}
