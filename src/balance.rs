// ⚖️ Statement Balance Check - opening + credits - debits = closing
//
// Runs per CAMT statement over the entries that survived parsing. A skipped
// <Ntry> (row error) or a pending entry counted by the bank shows up here as a
// discrepancy, which is exactly the signal the user needs.

use crate::error::{DataQualityWarning, WarningKind};
use crate::model::BankEntry;
use crate::money::Money;
use crate::parser::StatementInfo;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BalanceResult {
    Balanced,
    Discrepancy { expected_closing: Money, difference: Money },
    /// Statement carries no OPBD or no CLBD balance
    Unverifiable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub statement_id: String,
    pub entry_count: usize,
    pub total_credits: Money,
    pub total_debits: Money,
    pub opening_balance: Option<Money>,
    pub closing_balance: Option<Money>,
    pub result: BalanceResult,
}

impl BalanceReport {
    pub fn is_balanced(&self) -> bool {
        self.result == BalanceResult::Balanced
    }

    pub fn summary(&self) -> String {
        match &self.result {
            BalanceResult::Balanced => format!(
                "Statement {}: {} entries, balanced",
                self.statement_id, self.entry_count
            ),
            BalanceResult::Discrepancy { expected_closing, difference } => format!(
                "Statement {}: {} entries, expected closing {}, reported {}, difference {}",
                self.statement_id,
                self.entry_count,
                expected_closing,
                self.closing_balance.unwrap_or(Money::ZERO),
                difference
            ),
            BalanceResult::Unverifiable => format!(
                "Statement {}: {} entries, no opening/closing balance to verify",
                self.statement_id, self.entry_count
            ),
        }
    }

    /// Warning for a failed check; None when balanced or unverifiable
    pub fn to_warning(&self) -> Option<DataQualityWarning> {
        match self.result {
            BalanceResult::Discrepancy { .. } => Some(DataQualityWarning::new(
                WarningKind::StatementBalanceMismatch,
                self.summary(),
            )),
            _ => None,
        }
    }
}

/// Check one statement against the entries attributed to it
pub fn check_statement(info: &StatementInfo, entries: &[BankEntry]) -> BalanceReport {
    let own: Vec<&BankEntry> = entries
        .iter()
        .filter(|e| e.statement_id.as_deref() == Some(info.statement_id.as_str()))
        .collect();

    let total_credits: Money = own.iter().filter(|e| e.amount.is_positive()).map(|e| e.amount).sum();
    let total_debits: Money = own.iter().filter(|e| e.amount.is_negative()).map(|e| e.amount.abs()).sum();

    let result = match (info.opening_balance, info.closing_balance) {
        (Some(opening), Some(closing)) => {
            let expected_closing = opening + total_credits - total_debits;
            if expected_closing == closing {
                BalanceResult::Balanced
            } else {
                let difference = closing - expected_closing;
                warn!(
                    statement = info.statement_id.as_str(),
                    expected = %expected_closing,
                    reported = %closing,
                    difference = %difference,
                    "statement does not balance"
                );
                BalanceResult::Discrepancy { expected_closing, difference }
            }
        }
        _ => BalanceResult::Unverifiable,
    };

    BalanceReport {
        statement_id: info.statement_id.clone(),
        entry_count: own.len(),
        total_credits,
        total_debits,
        opening_balance: info.opening_balance,
        closing_balance: info.closing_balance,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryProvider;
    use chrono::NaiveDate;

    fn entry(id: &str, cents: i64) -> BankEntry {
        BankEntry {
            booking_date: NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
            amount: Money::from_cents(cents),
            counterparty_reference: String::new(),
            provider: EntryProvider::Other,
            entry_reference_id: id.to_string(),
            reversal: false,
            statement_id: Some("S1".to_string()),
            source_row: 1,
        }
    }

    fn info(opening: Option<i64>, closing: Option<i64>) -> StatementInfo {
        StatementInfo {
            statement_id: "S1".to_string(),
            iban: None,
            opening_balance: opening.map(Money::from_cents),
            closing_balance: closing.map(Money::from_cents),
        }
    }

    #[test]
    fn test_balanced_statement() {
        let entries = vec![entry("a", 4410), entry("b", -1200)];
        let report = check_statement(&info(Some(100000), Some(103210)), &entries);

        assert!(report.is_balanced());
        assert_eq!(report.total_credits, Money::from_cents(4410));
        assert_eq!(report.total_debits, Money::from_cents(1200));
        assert!(report.to_warning().is_none());
    }

    #[test]
    fn test_missing_entry_shows_as_discrepancy() {
        let entries = vec![entry("a", 4410)];
        let report = check_statement(&info(Some(100000), Some(106410)), &entries);

        assert_eq!(
            report.result,
            BalanceResult::Discrepancy {
                expected_closing: Money::from_cents(104410),
                difference: Money::from_cents(2000),
            }
        );
        let warning = report.to_warning().unwrap();
        assert_eq!(warning.kind, WarningKind::StatementBalanceMismatch);
        assert!(warning.message.contains("20.00"));
    }

    #[test]
    fn test_missing_balances_unverifiable() {
        let report = check_statement(&info(None, Some(1)), &[entry("a", 1)]);
        assert_eq!(report.result, BalanceResult::Unverifiable);
        assert!(report.to_warning().is_none());
    }
}
