// 🎯 Claim Resolution - one-to-one assignment without arbitrary picks
//
// A claim says "left item `left` could pair with right item `right` at
// `score`". Left = sale (or settlement), right = settlement (or bank entry).
//
// Per stage:
//   1. each left keeps its best-scoring claims
//      - none            -> NoCandidate (next stage may still find one)
//      - tie at the top  -> Ambiguous, every tied claim recorded
//   2. unique bests that target the same right compete
//      - strictly highest score wins, everyone else is Ambiguous
//      - tie at the top  -> all of them Ambiguous
//   3. a winner below the floor stays Ambiguous (best claim recorded)

use crate::model::MatchBasis;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub left: usize,
    pub right: usize,
    pub score: u8,
    pub basis: MatchBasis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(Claim),
    Ambiguous(Vec<Claim>),
    NoCandidate,
}

/// Score with per-day and per-cent penalties, floored at 0
pub fn penalized_score(base: u8, day_penalty: u8, cent_penalty: u8, extra_days: i64, cent_delta: i64) -> u8 {
    let penalty = i64::from(day_penalty) * extra_days.max(0) + i64::from(cent_penalty) * cent_delta.abs();
    (i64::from(base) - penalty).clamp(0, 100) as u8
}

/// Resolve one stage. Every left in `lefts` gets exactly one resolution.
pub fn resolve_stage(lefts: &[usize], claims: &[Claim], floor: u8) -> BTreeMap<usize, Resolution> {
    let mut by_left: BTreeMap<usize, Vec<Claim>> = BTreeMap::new();
    for claim in claims {
        by_left.entry(claim.left).or_default().push(*claim);
    }

    let mut resolutions: BTreeMap<usize, Resolution> = BTreeMap::new();
    let mut contenders: BTreeMap<usize, Vec<Claim>> = BTreeMap::new();

    for &left in lefts {
        let Some(own) = by_left.get(&left) else {
            resolutions.insert(left, Resolution::NoCandidate);
            continue;
        };
        let best = own.iter().map(|c| c.score).max().unwrap_or(0);
        let mut tied: Vec<Claim> = own.iter().copied().filter(|c| c.score == best).collect();
        tied.sort_by_key(|c| c.right);
        tied.dedup_by_key(|c| c.right);

        if tied.len() > 1 {
            resolutions.insert(left, Resolution::Ambiguous(tied));
        } else if let Some(unique) = tied.pop() {
            contenders.entry(unique.right).or_default().push(unique);
        }
    }

    for (_, mut competing) in contenders {
        competing.sort_by(|a, b| b.score.cmp(&a.score).then(a.left.cmp(&b.left)));
        let top = competing[0].score;
        let top_count = competing.iter().filter(|c| c.score == top).count();

        for (i, claim) in competing.iter().enumerate() {
            let resolution = if i == 0 && top_count == 1 {
                if claim.score >= floor {
                    Resolution::Matched(*claim)
                } else {
                    Resolution::Ambiguous(vec![*claim])
                }
            } else {
                Resolution::Ambiguous(vec![*claim])
            };
            resolutions.insert(claim.left, resolution);
        }
    }

    resolutions
}
