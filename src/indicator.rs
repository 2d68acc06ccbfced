// 🚦 Match Indicator - confidence → presentation status
//
//   >= 95  high_confidence
//   >= 80  medium_confidence
//   >= 50  low_confidence
//   else   none
//
// `matched` and `processing` are process states chosen by the caller.

use crate::model::{MatchState, SaleReconciliation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchIndicator {
    HighConfidence,
    MediumConfidence,
    LowConfidence,
    None,
    Matched,
    Processing,
}

impl MatchIndicator {
    pub fn label(&self) -> &str {
        match self {
            MatchIndicator::HighConfidence => "High confidence",
            MatchIndicator::MediumConfidence => "Medium confidence",
            MatchIndicator::LowConfidence => "Low confidence",
            MatchIndicator::None => "No match",
            MatchIndicator::Matched => "Matched",
            MatchIndicator::Processing => "Processing",
        }
    }
}

/// Total over u8; values above 100 count as high
pub fn indicator_for_confidence(confidence: u8) -> MatchIndicator {
    match confidence {
        95.. => MatchIndicator::HighConfidence,
        80..=94 => MatchIndicator::MediumConfidence,
        50..=79 => MatchIndicator::LowConfidence,
        _ => MatchIndicator::None,
    }
}

/// Indicator for a finished reconciliation (best candidate's confidence)
pub fn indicator_for(reconciliation: &SaleReconciliation) -> MatchIndicator {
    match reconciliation.state {
        MatchState::Orphaned | MatchState::Unmatched => MatchIndicator::None,
        _ => indicator_for_confidence(reconciliation.confidence()),
    }
}
