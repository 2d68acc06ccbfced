// 🔗 Matching Engine - POS sale ↔ settlement ↔ bank entry
//
// Runs after every file of the run is parsed: ambiguity can only be judged
// against the complete candidate set. Inputs are read-only snapshots; the
// engine returns fresh results and mutates nothing it was given.

pub mod bank;
pub mod lifecycle;
pub mod sales;
pub mod scoring;

pub use bank::{BankMatchOutcome, BankMatcher, Chargeback};
pub use lifecycle::{settlement_status, SettlementEvidence};
pub use sales::SaleMatcher;
pub use scoring::{Claim, Resolution};

use crate::config::MatchingConfig;
use crate::error::DataQualityWarning;
use crate::model::{
    BankEntry, BankLink, MatchCandidate, MatchState, PosSale, SaleReconciliation, SettlementTransaction,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::info;

/// Everything the engine derived for one run. Indexes refer to the slices
/// passed to `MatchingEngine::run`.
#[derive(Debug)]
pub struct MatchingOutcome {
    /// One per input sale, same order
    pub reconciliations: Vec<SaleReconciliation>,
    /// Bank link per settlement transaction
    pub bank_links: Vec<Option<BankLink>>,
    pub chargebacks: Vec<Chargeback>,
    /// Settlement transactions no sale was matched to
    pub orphan_settlements: Vec<usize>,
    /// Bank entries neither linked nor recognized as a chargeback
    pub orphan_bank_entries: Vec<usize>,
    pub warnings: Vec<DataQualityWarning>,
}

pub struct MatchingEngine<'a> {
    config: &'a MatchingConfig,
}

impl<'a> MatchingEngine<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        MatchingEngine { config }
    }

    /// `as_of` is the date settlement statuses are judged at (end of the window)
    pub fn run(
        &self,
        sales: &[PosSale],
        settlements: &[SettlementTransaction],
        entries: &[BankEntry],
        as_of: NaiveDate,
    ) -> MatchingOutcome {
        let sale_resolutions = SaleMatcher::new(self.config, settlements).run(sales);
        let bank = BankMatcher::new(self.config, settlements, entries).run();

        let charged_back: HashSet<usize> = bank.chargebacks.iter().map(|c| c.settlement).collect();
        let mut matched_settlements: HashSet<usize> = HashSet::new();

        let reconciliations: Vec<SaleReconciliation> = sales
            .iter()
            .enumerate()
            .map(|(sale_idx, sale)| {
                let (state, candidates, evidence) = match sale_resolutions.get(&sale_idx) {
                    None => (MatchState::Unmatched, Vec::new(), SettlementEvidence::default()),
                    Some(Resolution::NoCandidate) => {
                        (MatchState::Orphaned, Vec::new(), SettlementEvidence::default())
                    }
                    Some(Resolution::Matched(claim)) => {
                        matched_settlements.insert(claim.right);
                        let evidence = SettlementEvidence {
                            bank_linked: bank.links[claim.right].is_some(),
                            charged_back: charged_back.contains(&claim.right),
                        };
                        let candidate = self.candidate(sale, claim, MatchState::Matched, settlements, &bank.links);
                        (MatchState::Matched, vec![candidate], evidence)
                    }
                    Some(Resolution::Ambiguous(claims)) => {
                        let candidates = claims
                            .iter()
                            .map(|c| self.candidate(sale, c, MatchState::Ambiguous, settlements, &bank.links))
                            .collect();
                        (MatchState::Ambiguous, candidates, SettlementEvidence::default())
                    }
                };

                SaleReconciliation {
                    sale_id: sale.id.clone(),
                    payment_method: sale.payment_method,
                    state,
                    candidates,
                    settlement_status: settlement_status(sale, evidence, as_of, self.config),
                }
            })
            .collect();

        let orphan_settlements: Vec<usize> = (0..settlements.len())
            .filter(|i| !matched_settlements.contains(i))
            .collect();
        let orphan_bank_entries: Vec<usize> = (0..entries.len())
            .filter(|i| !bank.used_entries.contains(i))
            .collect();

        info!(
            sales = sales.len(),
            matched = reconciliations.iter().filter(|r| r.state == MatchState::Matched).count(),
            ambiguous = reconciliations.iter().filter(|r| r.state == MatchState::Ambiguous).count(),
            orphaned = reconciliations.iter().filter(|r| r.state == MatchState::Orphaned).count(),
            orphan_settlements = orphan_settlements.len(),
            orphan_bank_entries = orphan_bank_entries.len(),
            "matching finished"
        );

        MatchingOutcome {
            reconciliations,
            bank_links: bank.links,
            chargebacks: bank.chargebacks,
            orphan_settlements,
            orphan_bank_entries,
            warnings: bank.warnings,
        }
    }

    fn candidate(
        &self,
        sale: &PosSale,
        claim: &Claim,
        state: MatchState,
        settlements: &[SettlementTransaction],
        links: &[Option<BankLink>],
    ) -> MatchCandidate {
        let tx = &settlements[claim.right];
        MatchCandidate {
            id: MatchCandidate::stable_id(&sale.id, Some(&tx.provider_reference_id)),
            sale_id: sale.id.clone(),
            provider: tx.provider,
            settlement_reference: Some(tx.provider_reference_id.clone()),
            confidence: claim.score,
            basis: claim.basis,
            state,
            bank: links[claim.right].clone(),
        }
    }
}
