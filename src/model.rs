// 🧾 Canonical Model - Settlement transactions, bank entries, POS sales, matches
//
// Everything downstream of the parsers works on these types only.
// Records are created once per import run and never mutated afterwards.

use crate::money::Money;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// PROVIDERS & PAYMENT METHODS
// ============================================================================

/// Payment provider that settles card / wallet sales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Sumup,
    Twint,
}

impl Provider {
    pub fn name(&self) -> &str {
        match self {
            Provider::Sumup => "SumUp",
            Provider::Twint => "TWINT",
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Provider::Sumup => "sumup",
            Provider::Twint => "twint",
        }
    }
}

/// Provider resolved for a bank entry (`Other` when no signature matched)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryProvider {
    Sumup,
    Twint,
    Other,
}

impl EntryProvider {
    pub fn provider(&self) -> Option<Provider> {
        match self {
            EntryProvider::Sumup => Some(Provider::Sumup),
            EntryProvider::Twint => Some(Provider::Twint),
            EntryProvider::Other => None,
        }
    }
}

impl From<Provider> for EntryProvider {
    fn from(p: Provider) -> Self {
        match p {
            Provider::Sumup => EntryProvider::Sumup,
            Provider::Twint => EntryProvider::Twint,
        }
    }
}

/// How the POS recorded the sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Twint,
    Sumup,
}

impl PaymentMethod {
    /// Provider expected to settle this sale; cash never settles
    pub fn provider(&self) -> Option<Provider> {
        match self {
            PaymentMethod::Cash => None,
            PaymentMethod::Twint => Some(Provider::Twint),
            PaymentMethod::Sumup => Some(Provider::Sumup),
        }
    }
}

// ============================================================================
// SETTLEMENT TRANSACTION (provider side)
// ============================================================================

/// One provider CSV row, normalized.
///
/// Invariant: `net_amount == gross_amount - provider_fee` within 1 cent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTransaction {
    pub provider: Provider,
    pub transaction_date: NaiveDate,
    pub gross_amount: Money,
    pub provider_fee: Money,
    pub net_amount: Money,
    /// Unique within one provider's file; dedup key together with `provider`
    pub provider_reference_id: String,
    /// Passthrough for audit
    pub raw_payment_method: String,

    // Optional settlement metadata (provider-dependent)
    pub merchant_reference: Option<String>,
    pub settlement_date: Option<NaiveDate>,
    pub settlement_batch_id: Option<String>,

    /// Row in the source file
    pub source_row: usize,
}

impl SettlementTransaction {
    /// Date the bank deposit window starts from
    pub fn bank_anchor_date(&self) -> NaiveDate {
        self.settlement_date.unwrap_or(self.transaction_date)
    }

    /// True when `reference` equals the provider or merchant reference
    pub fn has_reference(&self, reference: &str) -> bool {
        self.provider_reference_id == reference
            || self.merchant_reference.as_deref() == Some(reference)
    }
}

// ============================================================================
// BANK ENTRY (bank side)
// ============================================================================

/// One booked CAMT.053 `<Ntry>`, normalized. Deposits are positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankEntry {
    pub booking_date: NaiveDate,
    pub amount: Money,
    /// Raw narrative / remittance text
    pub counterparty_reference: String,
    pub provider: EntryProvider,
    /// Bank's own id; dedup key across re-imports
    pub entry_reference_id: String,
    /// Reversal indicator or reversal wording in the narrative
    pub reversal: bool,
    pub statement_id: Option<String>,
    pub source_row: usize,
}

impl BankEntry {
    pub fn is_credit(&self) -> bool {
        self.amount.is_positive()
    }
}

// ============================================================================
// POS SALE (external, read-only)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosSale {
    pub id: String,
    pub date: NaiveDate,
    pub gross_amount: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub provider_reference_id: Option<String>,
}

// ============================================================================
// MATCH RESULTS
// ============================================================================

/// Why a candidate was proposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    ExactReference,
    AmountDateExact,
    AmountDateFuzzy,
    AmountOnly,
}

/// Per-sale matching state for one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Unmatched,
    CandidateFound,
    Matched,
    Ambiguous,
    Orphaned,
}

/// Settlement progress of a sale, shown by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Settled,
    WeekendDelay,
    Failed,
    ChargedBack,
}

/// Link from a settlement transaction to the bank entry that paid it out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankLink {
    pub entry_reference_id: String,
    pub confidence: u8,
    pub basis: MatchBasis,
    /// The bank entry covers several settlement transactions
    pub partial: bool,
}

/// One proposed sale ↔ settlement (↔ bank) link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Stable across runs: derived from sale id and settlement reference
    pub id: Uuid,
    pub sale_id: String,
    pub provider: Provider,
    pub settlement_reference: Option<String>,
    pub confidence: u8,
    pub basis: MatchBasis,
    pub state: MatchState,
    pub bank: Option<BankLink>,
}

impl MatchCandidate {
    pub fn stable_id(sale_id: &str, settlement_reference: Option<&str>) -> Uuid {
        let key = format!("{}|{}", sale_id, settlement_reference.unwrap_or(""));
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}

/// Final view of one POS sale after the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReconciliation {
    pub sale_id: String,
    pub payment_method: PaymentMethod,
    pub state: MatchState,
    /// Matched: exactly one. Ambiguous: every tied / best candidate. Orphaned: none.
    pub candidates: Vec<MatchCandidate>,
    /// None for cash sales
    pub settlement_status: Option<SettlementStatus>,
}

impl SaleReconciliation {
    /// Confidence of the best candidate, 0 when there is none
    pub fn confidence(&self) -> u8 {
        self.candidates.iter().map(|c| c.confidence).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_provider() {
        assert_eq!(PaymentMethod::Cash.provider(), None);
        assert_eq!(PaymentMethod::Twint.provider(), Some(Provider::Twint));
        assert_eq!(EntryProvider::Other.provider(), None);
        assert_eq!(EntryProvider::from(Provider::Sumup), EntryProvider::Sumup);
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = MatchCandidate::stable_id("sale-1", Some("X1"));
        let b = MatchCandidate::stable_id("sale-1", Some("X1"));
        let c = MatchCandidate::stable_id("sale-1", Some("X2"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_tags() {
        assert_eq!(serde_json::to_string(&MatchBasis::AmountDateExact).unwrap(), "\"amount_date_exact\"");
        assert_eq!(serde_json::to_string(&SettlementStatus::WeekendDelay).unwrap(), "\"weekend_delay\"");
        assert_eq!(serde_json::to_string(&Provider::Sumup).unwrap(), "\"sumup\"");
    }
}
