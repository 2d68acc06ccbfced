// 🧮 Sale ↔ Settlement Matching - three stages, strongest evidence first
//
//   1. reference   sale.provider_reference_id == tx reference   100  exact_reference
//   2. exact       same gross, lag 0..=expected_lag_days          90  amount_date_exact
//   3. fuzzy       gross ± tolerance, lag 0..=max_lag_days     70-…  amount_date_fuzzy
//
// A sale leaves the pipeline at the first stage that gives it a candidate
// (MATCHED or AMBIGUOUS). Settlements matched in one stage are unavailable to
// later stages. Lookups go through indexes keyed by (provider, reference) and
// (provider, gross cents) instead of scanning every settlement per sale.

use super::scoring::{penalized_score, resolve_stage, Claim, Resolution};
use crate::calendar::days_between;
use crate::config::MatchingConfig;
use crate::model::{MatchBasis, PosSale, Provider, SettlementTransaction};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

const REFERENCE_CONFIDENCE: u8 = 100;
const EXACT_CONFIDENCE: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaleStage {
    Reference,
    AmountExact,
    AmountFuzzy,
}

impl SaleStage {
    fn name(&self) -> &str {
        match self {
            SaleStage::Reference => "reference",
            SaleStage::AmountExact => "amount_exact",
            SaleStage::AmountFuzzy => "amount_fuzzy",
        }
    }
}

pub struct SaleMatcher<'a> {
    config: &'a MatchingConfig,
    settlements: &'a [SettlementTransaction],
    by_reference: HashMap<(Provider, &'a str), Vec<usize>>,
    by_amount: HashMap<(Provider, i64), Vec<usize>>,
}

impl<'a> SaleMatcher<'a> {
    pub fn new(config: &'a MatchingConfig, settlements: &'a [SettlementTransaction]) -> Self {
        let mut by_reference: HashMap<(Provider, &'a str), Vec<usize>> = HashMap::new();
        let mut by_amount: HashMap<(Provider, i64), Vec<usize>> = HashMap::new();

        for (idx, tx) in settlements.iter().enumerate() {
            by_reference
                .entry((tx.provider, tx.provider_reference_id.as_str()))
                .or_default()
                .push(idx);
            if let Some(merchant_ref) = tx.merchant_reference.as_deref() {
                if merchant_ref != tx.provider_reference_id {
                    by_reference.entry((tx.provider, merchant_ref)).or_default().push(idx);
                }
            }
            by_amount
                .entry((tx.provider, tx.gross_amount.cents()))
                .or_default()
                .push(idx);
        }

        SaleMatcher { config, settlements, by_reference, by_amount }
    }

    /// Resolution per sale index. Cash sales are absent; NoCandidate = orphaned.
    pub fn run(&self, sales: &[PosSale]) -> BTreeMap<usize, Resolution> {
        let mut pending: Vec<usize> = sales
            .iter()
            .enumerate()
            .filter(|(_, sale)| sale.payment_method.provider().is_some())
            .map(|(idx, _)| idx)
            .collect();
        let mut taken: HashSet<usize> = HashSet::new();
        let mut resolved: BTreeMap<usize, Resolution> = BTreeMap::new();

        for stage in [SaleStage::Reference, SaleStage::AmountExact, SaleStage::AmountFuzzy] {
            if pending.is_empty() {
                break;
            }
            let claims: Vec<Claim> = pending
                .iter()
                .flat_map(|&s| self.claims(stage, s, &sales[s], &taken))
                .collect();
            let floor = match stage {
                SaleStage::AmountFuzzy => self.config.confidence_floor,
                _ => 0,
            };

            let mut next = Vec::new();
            let mut matched = 0;
            let mut ambiguous = 0;
            for (sale_idx, resolution) in resolve_stage(&pending, &claims, floor) {
                match &resolution {
                    Resolution::NoCandidate => {
                        next.push(sale_idx);
                        continue;
                    }
                    Resolution::Matched(claim) => {
                        taken.insert(claim.right);
                        matched += 1;
                    }
                    Resolution::Ambiguous(_) => ambiguous += 1,
                }
                resolved.insert(sale_idx, resolution);
            }
            debug!(stage = stage.name(), matched, ambiguous, remaining = next.len(), "sale matching stage done");
            pending = next;
        }

        for sale_idx in pending {
            resolved.insert(sale_idx, Resolution::NoCandidate);
        }
        resolved
    }

    fn claims(&self, stage: SaleStage, sale_idx: usize, sale: &PosSale, taken: &HashSet<usize>) -> Vec<Claim> {
        let Some(provider) = sale.payment_method.provider() else {
            return Vec::new();
        };
        let settings = self.config.provider(provider);
        let mut claims = Vec::new();

        match stage {
            SaleStage::Reference => {
                let Some(reference) = sale.provider_reference_id.as_deref() else {
                    return claims;
                };
                for &tx_idx in self.by_reference.get(&(provider, reference)).into_iter().flatten() {
                    if !taken.contains(&tx_idx) {
                        claims.push(Claim {
                            left: sale_idx,
                            right: tx_idx,
                            score: REFERENCE_CONFIDENCE,
                            basis: MatchBasis::ExactReference,
                        });
                    }
                }
            }
            SaleStage::AmountExact => {
                for &tx_idx in self.by_amount.get(&(provider, sale.gross_amount.cents())).into_iter().flatten() {
                    if taken.contains(&tx_idx) {
                        continue;
                    }
                    let lag = days_between(sale.date, self.settlements[tx_idx].transaction_date);
                    if (0..=settings.expected_lag_days).contains(&lag) {
                        claims.push(Claim {
                            left: sale_idx,
                            right: tx_idx,
                            score: EXACT_CONFIDENCE,
                            basis: MatchBasis::AmountDateExact,
                        });
                    }
                }
            }
            SaleStage::AmountFuzzy => {
                let tolerance = self.config.amount_tolerance_cents;
                for delta in -tolerance..=tolerance {
                    let key = (provider, sale.gross_amount.cents() + delta);
                    for &tx_idx in self.by_amount.get(&key).into_iter().flatten() {
                        if taken.contains(&tx_idx) {
                            continue;
                        }
                        let lag = days_between(sale.date, self.settlements[tx_idx].transaction_date);
                        if !(0..=settings.max_lag_days).contains(&lag) {
                            continue;
                        }
                        claims.push(Claim {
                            left: sale_idx,
                            right: tx_idx,
                            score: penalized_score(
                                self.config.fuzzy_base_confidence,
                                self.config.day_penalty,
                                self.config.cent_penalty,
                                lag - settings.expected_lag_days,
                                delta,
                            ),
                            basis: MatchBasis::AmountDateFuzzy,
                        });
                    }
                }
            }
        }
        claims
    }
}
