// 🔄 Normalization - typed parser rows → canonical records
//
// SumUpRow / TwintRow → SettlementTransaction
// CamtEntryRow        → BankEntry
//
// Net amount rule: computed = gross - |fee|. A reported net within 1 cent of
// the computed value is kept as reported; a larger gap is a NetMismatch
// warning and the computed value wins.

use crate::error::{DataQualityWarning, WarningKind};
use crate::model::{BankEntry, Provider, SettlementTransaction};
use crate::money::Money;
use crate::parser::{CamtEntryRow, RawRecord, SumUpRow, TwintRow};
use crate::signatures::SignatureRegistry;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Largest accepted gap between reported and computed net
const NET_TOLERANCE_CENTS: i64 = 1;

/// Canonical records produced from one or more parse outcomes
#[derive(Debug, Default)]
pub struct Normalized {
    pub settlements: Vec<SettlementTransaction>,
    pub bank_entries: Vec<BankEntry>,
    pub warnings: Vec<DataQualityWarning>,
}

pub struct Normalizer<'a> {
    signatures: &'a SignatureRegistry,
}

impl<'a> Normalizer<'a> {
    pub fn new(signatures: &'a SignatureRegistry) -> Self {
        Normalizer { signatures }
    }

    /// Normalize records in order, appending to `out`
    pub fn normalize_into(&self, records: &[RawRecord], out: &mut Normalized) {
        for record in records {
            match record {
                RawRecord::SumUp(row) => {
                    let (tx, warning) = settlement_from_sumup(row);
                    out.settlements.push(tx);
                    out.warnings.extend(warning);
                }
                RawRecord::Twint(row) => {
                    let (tx, warning) = settlement_from_twint(row);
                    out.settlements.push(tx);
                    out.warnings.extend(warning);
                }
                RawRecord::Camt(row) => out.bank_entries.push(self.bank_entry(row)),
            }
        }
    }

    pub fn bank_entry(&self, row: &CamtEntryRow) -> BankEntry {
        let provider = self.signatures.resolve(&row.narrative);
        let entry_reference_id = row
            .entry_reference
            .clone()
            .unwrap_or_else(|| entry_fingerprint(row));

        BankEntry {
            booking_date: row.booking_date,
            amount: row.amount,
            counterparty_reference: row.narrative.clone(),
            provider,
            entry_reference_id,
            reversal: row.reversal || self.signatures.is_reversal(&row.narrative),
            statement_id: Some(row.statement_id.clone()),
            source_row: row.row,
        }
    }
}

pub fn settlement_from_sumup(row: &SumUpRow) -> (SettlementTransaction, Option<DataQualityWarning>) {
    let fee = row.fee.abs();
    let (net, warning) = resolve_net(
        Provider::Sumup,
        &row.transaction_id,
        row.gross,
        fee,
        row.reported_net,
    );

    let tx = SettlementTransaction {
        provider: Provider::Sumup,
        transaction_date: row.transaction_date,
        gross_amount: row.gross,
        provider_fee: fee,
        net_amount: net,
        provider_reference_id: row.transaction_id.clone(),
        raw_payment_method: row.payment_method.clone(),
        merchant_reference: None,
        settlement_date: row.payout_date,
        settlement_batch_id: row.payout_id.clone(),
        source_row: row.row,
    };
    (tx, warning)
}

pub fn settlement_from_twint(row: &TwintRow) -> (SettlementTransaction, Option<DataQualityWarning>) {
    let fee = row.fee.map(Money::abs).unwrap_or(Money::ZERO);
    let (net, warning) = resolve_net(
        Provider::Twint,
        &row.transaction_id,
        row.gross,
        fee,
        row.reported_net,
    );

    let tx = SettlementTransaction {
        provider: Provider::Twint,
        transaction_date: row.transaction_date,
        gross_amount: row.gross,
        provider_fee: fee,
        net_amount: net,
        provider_reference_id: row.transaction_id.clone(),
        raw_payment_method: row.tx_type.clone().unwrap_or_else(|| "TWINT".to_string()),
        merchant_reference: row.merchant_reference.clone(),
        settlement_date: row.settlement_date,
        settlement_batch_id: None,
        source_row: row.row,
    };
    (tx, warning)
}

fn resolve_net(
    provider: Provider,
    reference: &str,
    gross: Money,
    fee: Money,
    reported: Option<Money>,
) -> (Money, Option<DataQualityWarning>) {
    let computed = gross - fee;
    match reported {
        Some(net) if net.distance(computed) <= NET_TOLERANCE_CENTS => (net, None),
        Some(net) => {
            warn!(
                provider = provider.code(),
                reference,
                reported = %net,
                computed = %computed,
                "reported net does not equal gross minus fee"
            );
            let warning = DataQualityWarning::new(
                WarningKind::NetMismatch,
                format!(
                    "{} {}: reported net {} differs from gross {} - fee {} = {}; using computed value",
                    provider.name(),
                    reference,
                    net,
                    gross,
                    fee,
                    computed
                ),
            );
            (computed, Some(warning))
        }
        None => (computed, None),
    }
}

/// Deterministic id for entries the bank sent without a reference.
/// Stable across re-imports of the same statement; two look-alike entries
/// in one statement still differ by their position.
pub fn entry_fingerprint(row: &CamtEntryRow) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}",
        row.statement_id,
        row.row,
        row.booking_date,
        row.amount.cents(),
        row.narrative
    ));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryProvider;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn twint_row(gross: i64, fee: Option<i64>, net: Option<i64>) -> TwintRow {
        TwintRow {
            row: 5,
            transaction_date: d(2025, 5, 10),
            gross: Money::from_cents(gross),
            fee: fee.map(Money::from_cents),
            reported_net: net.map(Money::from_cents),
            transaction_id: "X1".to_string(),
            merchant_reference: None,
            tx_type: Some("Product".to_string()),
            settlement_date: Some(d(2025, 5, 12)),
        }
    }

    fn camt_row(reference: Option<&str>, narrative: &str) -> CamtEntryRow {
        CamtEntryRow {
            row: 1,
            statement_id: "S1".to_string(),
            booking_date: d(2025, 5, 12),
            amount: Money::from_cents(4410),
            reversal: false,
            entry_reference: reference.map(str::to_string),
            narrative: narrative.to_string(),
        }
    }

    #[test]
    fn test_net_within_rounding_kept() {
        let (tx, warning) = settlement_from_twint(&twint_row(4500, Some(90), Some(4411)));
        assert_eq!(tx.net_amount, Money::from_cents(4411));
        assert!(warning.is_none());
    }

    #[test]
    fn test_net_mismatch_warns_and_uses_computed() {
        let (tx, warning) = settlement_from_twint(&twint_row(4500, Some(90), Some(4300)));
        assert_eq!(tx.net_amount, Money::from_cents(4410));
        assert_eq!(warning.unwrap().kind, WarningKind::NetMismatch);
    }

    #[test]
    fn test_missing_twint_fee_is_zero() {
        let (tx, warning) = settlement_from_twint(&twint_row(2000, None, None));
        assert_eq!(tx.provider_fee, Money::ZERO);
        assert_eq!(tx.net_amount, Money::from_cents(2000));
        assert!(warning.is_none());
        assert_eq!(tx.bank_anchor_date(), d(2025, 5, 12));
    }

    #[test]
    fn test_negative_fee_sign_normalized() {
        let row = SumUpRow {
            row: 2,
            transaction_date: d(2025, 5, 10),
            gross: Money::from_cents(12000),
            fee: Money::from_cents(-180),
            reported_net: Some(Money::from_cents(11820)),
            transaction_id: "TX-1".to_string(),
            payment_method: "Karte".to_string(),
            payout_date: None,
            payout_id: Some("PO-1".to_string()),
        };
        let (tx, warning) = settlement_from_sumup(&row);
        assert_eq!(tx.provider_fee, Money::from_cents(180));
        assert_eq!(tx.net_amount, Money::from_cents(11820));
        assert_eq!(tx.settlement_batch_id.as_deref(), Some("PO-1"));
        assert!(warning.is_none());
    }

    #[test]
    fn test_bank_entry_provider_and_fallback_id() {
        let registry = SignatureRegistry::builtin().unwrap();
        let normalizer = Normalizer::new(&registry);

        let with_ref = normalizer.bank_entry(&camt_row(Some("BANK-1"), "TWINT Acquiring AG"));
        assert_eq!(with_ref.entry_reference_id, "BANK-1");
        assert_eq!(with_ref.provider, EntryProvider::Twint);

        let a = normalizer.bank_entry(&camt_row(None, "Miete"));
        let b = normalizer.bank_entry(&camt_row(None, "Miete"));
        let c = normalizer.bank_entry(&camt_row(None, "Miete Juni"));
        assert_eq!(a.entry_reference_id, b.entry_reference_id);
        assert_ne!(a.entry_reference_id, c.entry_reference_id);
        assert_eq!(a.entry_reference_id.len(), 64);
        assert_eq!(a.provider, EntryProvider::Other);
    }

    #[test]
    fn test_fingerprint_keeps_look_alike_entries_apart() {
        let first = camt_row(None, "Bareinzahlung");
        let second = CamtEntryRow { row: 2, ..first.clone() };
        let other_statement = CamtEntryRow { statement_id: "S2".to_string(), ..first.clone() };

        assert_eq!(entry_fingerprint(&first), entry_fingerprint(&first.clone()));
        assert_ne!(entry_fingerprint(&first), entry_fingerprint(&second));
        assert_ne!(entry_fingerprint(&first), entry_fingerprint(&other_statement));
    }

    #[test]
    fn test_reversal_from_narrative() {
        let registry = SignatureRegistry::builtin().unwrap();
        let entry = Normalizer::new(&registry).bank_entry(&camt_row(Some("R"), "SUMUP Storno TX-1"));
        assert!(entry.reversal);
        assert_eq!(entry.provider, EntryProvider::Sumup);
    }
}
