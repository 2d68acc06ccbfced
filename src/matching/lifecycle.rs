// ⏳ Settlement Lifecycle - per-sale status as of the end of the window
//
//   charged_back   the matched settlement was reversed by a bank entry
//   settled        the matched settlement has a bank link
//   pending        no deposit yet, lag <= max_lag + bank_lag
//   weekend_delay  no deposit yet, lag within the normal window pushed back
//                  by the weekend days and holidays inside it (at most
//                  weekend_allowance_days)
//   failed         anything later than that
//
// Cash sales never settle through a provider and get no status.

use crate::calendar::{days_between, non_business_days};
use crate::config::MatchingConfig;
use crate::model::{PosSale, SettlementStatus};
use chrono::{Duration, NaiveDate};

/// What the bank stage learned about a sale's matched settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettlementEvidence {
    pub bank_linked: bool,
    pub charged_back: bool,
}

pub fn settlement_status(
    sale: &PosSale,
    evidence: SettlementEvidence,
    as_of: NaiveDate,
    config: &MatchingConfig,
) -> Option<SettlementStatus> {
    let provider = sale.payment_method.provider()?;

    if evidence.charged_back {
        return Some(SettlementStatus::ChargedBack);
    }
    if evidence.bank_linked {
        return Some(SettlementStatus::Settled);
    }

    let settings = config.provider(provider);
    let lag = days_between(sale.date, as_of);
    let normal = settings.normal_settlement_days();

    let closed = non_business_days(sale.date, sale.date + Duration::days(normal), &config.holidays);
    let extension = closed.min(settings.weekend_allowance_days);

    let status = if lag <= normal {
        SettlementStatus::Pending
    } else if lag <= normal + extension {
        SettlementStatus::WeekendDelay
    } else {
        SettlementStatus::Failed
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PaymentMethod;
    use crate::money::Money;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    fn sale(method: PaymentMethod, day: u32) -> PosSale {
        PosSale {
            id: "s1".to_string(),
            date: d(day),
            gross_amount: Money::from_cents(4500),
            payment_method: method,
            provider_reference_id: None,
        }
    }

    #[test]
    fn test_cash_has_no_status() {
        let config = MatchingConfig::default();
        let status = settlement_status(&sale(PaymentMethod::Cash, 1), SettlementEvidence::default(), d(31), &config);
        assert_eq!(status, None);
    }

    #[test]
    fn test_evidence_wins_over_lag() {
        let config = MatchingConfig::default();
        let s = sale(PaymentMethod::Twint, 1);
        let settled = SettlementEvidence { bank_linked: true, charged_back: false };
        let reversed = SettlementEvidence { bank_linked: true, charged_back: true };

        assert_eq!(settlement_status(&s, settled, d(31), &config), Some(SettlementStatus::Settled));
        assert_eq!(settlement_status(&s, reversed, d(31), &config), Some(SettlementStatus::ChargedBack));
    }

    #[test]
    fn test_lag_thresholds() {
        let config = MatchingConfig::default();
        let none = SettlementEvidence::default();
        // Sale on Friday 2025-05-09; normal window = 5 + 3 = 8 days
        let s = sale(PaymentMethod::Sumup, 9);

        assert_eq!(settlement_status(&s, none, d(17), &config), Some(SettlementStatus::Pending));
        assert_eq!(settlement_status(&s, none, d(19), &config), Some(SettlementStatus::WeekendDelay));
        assert_eq!(settlement_status(&s, none, d(21), &config), Some(SettlementStatus::Failed));
    }

    #[test]
    fn test_weekend_delay_tracks_closed_days() {
        let config = MatchingConfig::default();
        let none = SettlementEvidence::default();

        // Friday 2025-05-02: (May 2, May 10] holds three weekend days
        let friday = sale(PaymentMethod::Twint, 2);
        assert_eq!(settlement_status(&friday, none, d(13), &config), Some(SettlementStatus::WeekendDelay));

        // Monday 2025-05-05: only two, so the same 11-day lag has failed
        let monday = sale(PaymentMethod::Twint, 5);
        assert_eq!(settlement_status(&monday, none, d(15), &config), Some(SettlementStatus::WeekendDelay));
        assert_eq!(settlement_status(&monday, none, d(16), &config), Some(SettlementStatus::Failed));
    }

    #[test]
    fn test_holiday_extends_window() {
        let mut config = MatchingConfig::default();
        let none = SettlementEvidence::default();
        let monday = sale(PaymentMethod::Sumup, 5);
        assert_eq!(settlement_status(&monday, none, d(16), &config), Some(SettlementStatus::Failed));

        config.holidays = vec![d(8)];
        assert_eq!(settlement_status(&monday, none, d(16), &config), Some(SettlementStatus::WeekendDelay));

        // Extension never exceeds the allowance
        config.holidays = vec![d(6), d(7), d(8)];
        assert_eq!(settlement_status(&monday, none, d(17), &config), Some(SettlementStatus::Failed));
    }
}
