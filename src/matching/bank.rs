// 🏦 Settlement ↔ Bank Matching - deposits, batch deposits, chargebacks
//
// Pass 1: one settlement ↔ one positive bank entry of the same provider
//         net == amount, lag 0..=bank_lag_days                 -> 90 exact
//         net ± bank tolerance, lag up to bank_lag + allowance  -> penalized fuzzy
// Pass 2: one bank entry == Σ net of a batch of still-unlinked settlements
//         (same provider + batch id, or same settlement date)   -> partial links
// Pass 3: negative entries that reverse a deposit linked in pass 1/2
//
// Entries whose provider resolved to `other` never link to a settlement.

use super::scoring::{penalized_score, resolve_stage, Claim, Resolution};
use crate::calendar::days_between;
use crate::config::MatchingConfig;
use crate::error::{DataQualityWarning, WarningKind};
use crate::model::{BankEntry, BankLink, MatchBasis, Provider, SettlementTransaction};
use crate::money::Money;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

const EXACT_CONFIDENCE: u8 = 90;

/// A negative bank entry recognized as reversing a settled transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chargeback {
    pub entry: usize,
    pub settlement: usize,
}

#[derive(Debug, Default)]
pub struct BankMatchOutcome {
    /// Link per settlement index
    pub links: Vec<Option<BankLink>>,
    pub chargebacks: Vec<Chargeback>,
    /// Entry indexes consumed by a link or a chargeback
    pub used_entries: HashSet<usize>,
    pub warnings: Vec<DataQualityWarning>,
}

pub struct BankMatcher<'a> {
    config: &'a MatchingConfig,
    settlements: &'a [SettlementTransaction],
    entries: &'a [BankEntry],
}

impl<'a> BankMatcher<'a> {
    pub fn new(config: &'a MatchingConfig, settlements: &'a [SettlementTransaction], entries: &'a [BankEntry]) -> Self {
        BankMatcher { config, settlements, entries }
    }

    pub fn run(&self) -> BankMatchOutcome {
        let mut outcome = BankMatchOutcome {
            links: vec![None; self.settlements.len()],
            ..Default::default()
        };

        self.match_single_deposits(&mut outcome);
        self.match_batch_deposits(&mut outcome);
        self.detect_chargebacks(&mut outcome);

        debug!(
            linked = outcome.links.iter().filter(|l| l.is_some()).count(),
            chargebacks = outcome.chargebacks.len(),
            used_entries = outcome.used_entries.len(),
            "bank matching done"
        );
        outcome
    }

    fn window_days(&self, provider: Provider) -> i64 {
        let settings = self.config.provider(provider);
        settings.bank_lag_days + settings.weekend_allowance_days
    }

    /// Positive, non-reversal entry paid by `provider`
    fn is_deposit_from(&self, entry: &BankEntry, provider: Provider) -> bool {
        entry.is_credit() && !entry.reversal && entry.provider.provider() == Some(provider)
    }

    // ========================================================================
    // PASS 1: one-to-one deposits
    // ========================================================================

    fn match_single_deposits(&self, outcome: &mut BankMatchOutcome) {
        let tolerance = self.config.bank_amount_tolerance_cents;
        let mut claims = Vec::new();

        for (tx_idx, tx) in self.settlements.iter().enumerate() {
            let settings = self.config.provider(tx.provider);
            let anchor = tx.bank_anchor_date();

            for (entry_idx, entry) in self.entries.iter().enumerate() {
                if !self.is_deposit_from(entry, tx.provider) {
                    continue;
                }
                let lag = days_between(anchor, entry.booking_date);
                if !(0..=self.window_days(tx.provider)).contains(&lag) {
                    continue;
                }
                let delta = entry.amount.cents() - tx.net_amount.cents();
                if delta.abs() > tolerance {
                    continue;
                }

                let (score, basis) = if delta == 0 && lag <= settings.bank_lag_days {
                    (EXACT_CONFIDENCE, MatchBasis::AmountDateExact)
                } else {
                    let score = penalized_score(
                        self.config.fuzzy_base_confidence,
                        self.config.day_penalty,
                        self.config.cent_penalty,
                        lag - settings.bank_lag_days,
                        delta,
                    );
                    (score, MatchBasis::AmountDateFuzzy)
                };
                claims.push(Claim { left: tx_idx, right: entry_idx, score, basis });
            }
        }

        let lefts: Vec<usize> = (0..self.settlements.len()).collect();
        for (tx_idx, resolution) in resolve_stage(&lefts, &claims, self.config.confidence_floor) {
            match resolution {
                Resolution::Matched(claim) => {
                    outcome.used_entries.insert(claim.right);
                    outcome.links[tx_idx] = Some(BankLink {
                        entry_reference_id: self.entries[claim.right].entry_reference_id.clone(),
                        confidence: claim.score,
                        basis: claim.basis,
                        partial: false,
                    });
                }
                Resolution::Ambiguous(candidates) => {
                    let tx = &self.settlements[tx_idx];
                    let refs: Vec<&str> = candidates
                        .iter()
                        .map(|c| self.entries[c.right].entry_reference_id.as_str())
                        .collect();
                    warn!(
                        provider = tx.provider.code(),
                        reference = tx.provider_reference_id.as_str(),
                        candidates = refs.len(),
                        "no unique bank entry for settlement"
                    );
                    outcome.warnings.push(DataQualityWarning::new(
                        WarningKind::AmbiguousBankMatch,
                        format!(
                            "{} {} (net {}): no unique bank entry among [{}]",
                            tx.provider.name(),
                            tx.provider_reference_id,
                            tx.net_amount,
                            refs.join(", ")
                        ),
                    ));
                }
                Resolution::NoCandidate => {}
            }
        }
    }

    // ========================================================================
    // PASS 2: batch deposits
    // ========================================================================

    fn match_batch_deposits(&self, outcome: &mut BankMatchOutcome) {
        let groups = self.unlinked_batches(outcome);
        if groups.is_empty() {
            return;
        }
        let mut consumed: HashSet<usize> = HashSet::new();

        for (entry_idx, entry) in self.entries.iter().enumerate() {
            if outcome.used_entries.contains(&entry_idx) {
                continue;
            }
            let Some(provider) = entry.provider.provider() else {
                continue;
            };
            if !self.is_deposit_from(entry, provider) {
                continue;
            }

            let fitting: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(g, group)| {
                    !consumed.contains(g)
                        && group.provider == provider
                        && group.net_total == entry.amount
                        && (0..=self.window_days(provider)).contains(&days_between(group.anchor, entry.booking_date))
                })
                .map(|(g, _)| g)
                .collect();

            match fitting.as_slice() {
                [] => {}
                [g] => {
                    let group = &groups[*g];
                    consumed.insert(*g);
                    outcome.used_entries.insert(entry_idx);
                    for &tx_idx in &group.members {
                        outcome.links[tx_idx] = Some(BankLink {
                            entry_reference_id: entry.entry_reference_id.clone(),
                            confidence: self.config.partial_deposit_confidence,
                            basis: MatchBasis::AmountOnly,
                            partial: true,
                        });
                    }
                    debug!(
                        entry = entry.entry_reference_id.as_str(),
                        batch = group.key.as_str(),
                        members = group.members.len(),
                        "batch deposit linked"
                    );
                }
                several => {
                    warn!(
                        entry = entry.entry_reference_id.as_str(),
                        batches = several.len(),
                        "bank entry fits several settlement batches"
                    );
                    outcome.warnings.push(DataQualityWarning::new(
                        WarningKind::AmbiguousBankMatch,
                        format!(
                            "bank entry {} ({}) equals the total of {} different settlement batches",
                            entry.entry_reference_id,
                            entry.amount,
                            several.len()
                        ),
                    ));
                }
            }
        }
    }

    fn unlinked_batches(&self, outcome: &BankMatchOutcome) -> Vec<Batch> {
        let mut by_key: BTreeMap<(Provider, String), Batch> = BTreeMap::new();

        for (tx_idx, tx) in self.settlements.iter().enumerate() {
            if outcome.links[tx_idx].is_some() {
                continue;
            }
            let key = match (&tx.settlement_batch_id, tx.settlement_date) {
                (Some(batch_id), _) => format!("batch:{}", batch_id),
                (None, Some(date)) => format!("date:{}", date),
                (None, None) => continue,
            };
            let batch = by_key.entry((tx.provider, key.clone())).or_insert_with(|| Batch {
                provider: tx.provider,
                key,
                anchor: tx.bank_anchor_date(),
                net_total: Money::ZERO,
                members: Vec::new(),
            });
            batch.anchor = batch.anchor.max(tx.bank_anchor_date());
            batch.net_total += tx.net_amount;
            batch.members.push(tx_idx);
        }

        by_key.into_values().filter(|b| b.members.len() >= 2).collect()
    }

    // ========================================================================
    // PASS 3: chargebacks
    // ========================================================================

    fn detect_chargebacks(&self, outcome: &mut BankMatchOutcome) {
        let lookback = self.config.chargeback_lookback_days;
        let mut reversed: HashSet<usize> = HashSet::new();

        for (entry_idx, entry) in self.entries.iter().enumerate() {
            if outcome.used_entries.contains(&entry_idx) || !entry.amount.is_negative() {
                continue;
            }
            let entry_provider = entry.provider.provider();
            if entry_provider.is_none() && !entry.reversal {
                continue;
            }

            let candidates: Vec<usize> = self
                .settlements
                .iter()
                .enumerate()
                .filter(|(tx_idx, tx)| {
                    if reversed.contains(tx_idx) || tx.net_amount != entry.amount.abs() {
                        return false;
                    }
                    if entry_provider.is_some_and(|p| p != tx.provider) {
                        return false;
                    }
                    let Some(settled_on) = self.linked_booking_date(outcome, *tx_idx) else {
                        return false;
                    };
                    (0..=lookback).contains(&days_between(settled_on, entry.booking_date))
                })
                .map(|(tx_idx, _)| tx_idx)
                .collect();

            let narrowed: Vec<usize> = if candidates.len() > 1 {
                let referenced: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| mentions_reference(&entry.counterparty_reference, &self.settlements[i]))
                    .collect();
                if referenced.is_empty() { candidates } else { referenced }
            } else {
                candidates
            };

            match narrowed.as_slice() {
                [] => {}
                [tx_idx] => {
                    reversed.insert(*tx_idx);
                    outcome.used_entries.insert(entry_idx);
                    outcome.chargebacks.push(Chargeback { entry: entry_idx, settlement: *tx_idx });
                    debug!(
                        entry = entry.entry_reference_id.as_str(),
                        reference = self.settlements[*tx_idx].provider_reference_id.as_str(),
                        "chargeback detected"
                    );
                }
                several => {
                    warn!(
                        entry = entry.entry_reference_id.as_str(),
                        candidates = several.len(),
                        "reversal fits several settled transactions"
                    );
                    outcome.warnings.push(DataQualityWarning::new(
                        WarningKind::AmbiguousChargeback,
                        format!(
                            "reversal {} ({}) fits {} settled transactions",
                            entry.entry_reference_id,
                            entry.amount,
                            several.len()
                        ),
                    ));
                }
            }
        }
    }

    fn linked_booking_date(&self, outcome: &BankMatchOutcome, tx_idx: usize) -> Option<NaiveDate> {
        let link = outcome.links[tx_idx].as_ref()?;
        self.entries
            .iter()
            .find(|e| e.entry_reference_id == link.entry_reference_id)
            .map(|e| e.booking_date)
    }
}

struct Batch {
    provider: Provider,
    key: String,
    /// Latest bank anchor among members
    anchor: NaiveDate,
    net_total: Money,
    members: Vec<usize>,
}

fn mentions_reference(narrative: &str, tx: &SettlementTransaction) -> bool {
    narrative.contains(tx.provider_reference_id.as_str())
        || tx
            .merchant_reference
            .as_deref()
            .is_some_and(|m| narrative.contains(m))
}
