// ⚙️ Matching Configuration - explicit values passed in at call time
//
// No environment variables, no global state. Defaults are documented here
// and can be overridden from JSON (missing keys keep their default).

use crate::error::ImportError;
use crate::model::Provider;
use crate::signatures::{default_reversal_patterns, default_signatures, ProviderSignature};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound for both amount tolerances; fuzzy lookups walk every cent in range
pub const MAX_AMOUNT_TOLERANCE_CENTS: i64 = 100;

// ============================================================================
// PER-PROVIDER SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Lag (days after the sale) still scored as an exact match (default: 0)
    pub expected_lag_days: i64,

    /// Largest lag considered at all by fuzzy matching (default: 5)
    pub max_lag_days: i64,

    /// Days from settlement to bank booking (default: 3)
    pub bank_lag_days: i64,

    /// Cap on extra days granted for weekends/holidays inside the normal window (default: 3)
    pub weekend_allowance_days: i64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            expected_lag_days: 0,
            max_lag_days: 5,
            bank_lag_days: 3,
            weekend_allowance_days: 3,
        }
    }
}

impl ProviderSettings {
    /// Days after the sale within which a bank deposit is normally expected
    pub fn normal_settlement_days(&self) -> i64 {
        self.max_lag_days + self.bank_lag_days
    }
}

// ============================================================================
// MATCHING CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub sumup: ProviderSettings,
    pub twint: ProviderSettings,

    /// Fuzzy score before penalties (default: 70)
    pub fuzzy_base_confidence: u8,

    /// Subtracted per day of lag beyond the expected window (default: 5)
    pub day_penalty: u8,

    /// Subtracted per cent of amount difference (default: 5)
    pub cent_penalty: u8,

    /// Max amount difference for sale ↔ settlement fuzzy matching (default: 5 cents)
    pub amount_tolerance_cents: i64,

    /// Fuzzy candidates below this stay ambiguous (default: 50)
    pub confidence_floor: u8,

    /// Max amount difference for settlement ↔ bank fuzzy matching (default: 2 cents)
    pub bank_amount_tolerance_cents: i64,

    /// Confidence of links to a deposit covering several settlements (default: 40)
    pub partial_deposit_confidence: u8,

    /// How far back a reversal may reach for its settled deposit (default: 120 days)
    pub chargeback_lookback_days: i64,

    /// Non-business days besides weekends
    pub holidays: Vec<NaiveDate>,

    /// Ordered bank narrative signatures
    pub provider_signatures: Vec<ProviderSignature>,

    /// Narrative patterns that mark an entry as a reversal
    pub reversal_patterns: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            sumup: ProviderSettings::default(),
            twint: ProviderSettings::default(),
            fuzzy_base_confidence: 70,
            day_penalty: 5,
            cent_penalty: 5,
            amount_tolerance_cents: 5,
            confidence_floor: 50,
            bank_amount_tolerance_cents: 2,
            partial_deposit_confidence: 40,
            chargeback_lookback_days: 120,
            holidays: Vec::new(),
            provider_signatures: default_signatures(),
            reversal_patterns: default_reversal_patterns(),
        }
    }
}

impl MatchingConfig {
    /// Load from JSON; absent keys fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: MatchingConfig =
            serde_json::from_str(json).context("Failed to parse matching config JSON")?;
        Ok(config)
    }

    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Sumup => &self.sumup,
            Provider::Twint => &self.twint,
        }
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        for (name, settings) in [("sumup", &self.sumup), ("twint", &self.twint)] {
            if settings.expected_lag_days < 0
                || settings.bank_lag_days < 0
                || settings.weekend_allowance_days < 0
            {
                return Err(ImportError::InvalidConfig(format!(
                    "{}: lag values must not be negative",
                    name
                )));
            }
            if settings.max_lag_days < settings.expected_lag_days {
                return Err(ImportError::InvalidConfig(format!(
                    "{}: max_lag_days ({}) is below expected_lag_days ({})",
                    name, settings.max_lag_days, settings.expected_lag_days
                )));
            }
        }

        if self.fuzzy_base_confidence > 100 || self.confidence_floor > 100 {
            return Err(ImportError::InvalidConfig(
                "confidence values must be within 0-100".to_string(),
            ));
        }
        if self.partial_deposit_confidence > 100 {
            return Err(ImportError::InvalidConfig(
                "partial_deposit_confidence must be within 0-100".to_string(),
            ));
        }
        if self.amount_tolerance_cents < 0 || self.bank_amount_tolerance_cents < 0 {
            return Err(ImportError::InvalidConfig(
                "amount tolerances must not be negative".to_string(),
            ));
        }
        for (name, tolerance) in [
            ("amount_tolerance_cents", self.amount_tolerance_cents),
            ("bank_amount_tolerance_cents", self.bank_amount_tolerance_cents),
        ] {
            if tolerance > MAX_AMOUNT_TOLERANCE_CENTS {
                return Err(ImportError::InvalidConfig(format!(
                    "{} ({}) exceeds the maximum of {} cents",
                    name, tolerance, MAX_AMOUNT_TOLERANCE_CENTS
                )));
            }
        }
        if self.chargeback_lookback_days < 0 {
            return Err(ImportError::InvalidConfig(
                "chargeback_lookback_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchingConfig::default();
        assert_eq!(config.fuzzy_base_confidence, 70);
        assert_eq!(config.confidence_floor, 50);
        assert_eq!(config.provider(Provider::Twint).max_lag_days, 5);
        assert_eq!(config.provider(Provider::Sumup).normal_settlement_days(), 8);
        assert_eq!(config.provider_signatures.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_override() {
        let json = r#"{
            "twint": { "max_lag_days": 7 },
            "confidence_floor": 60,
            "holidays": ["2025-12-25"]
        }"#;
        let config = MatchingConfig::from_json(json).unwrap();

        assert_eq!(config.twint.max_lag_days, 7);
        assert_eq!(config.twint.bank_lag_days, 3, "unspecified keys keep defaults");
        assert_eq!(config.confidence_floor, 60);
        assert_eq!(config.holidays, vec![NaiveDate::from_ymd_opt(2025, 12, 25).unwrap()]);
        assert_eq!(config.sumup, ProviderSettings::default());
    }

    #[test]
    fn test_validate_rejects_inconsistent_lags() {
        let mut config = MatchingConfig::default();
        config.sumup.expected_lag_days = 4;
        config.sumup.max_lag_days = 2;
        assert!(matches!(config.validate(), Err(ImportError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_caps_amount_tolerances() {
        let mut config = MatchingConfig::default();
        config.amount_tolerance_cents = MAX_AMOUNT_TOLERANCE_CENTS;
        assert!(config.validate().is_ok());

        config.amount_tolerance_cents = i64::MAX;
        assert!(matches!(config.validate(), Err(ImportError::InvalidConfig(_))));

        let config = MatchingConfig::from_json(r#"{ "bank_amount_tolerance_cents": 5000 }"#).unwrap();
        assert!(matches!(config.validate(), Err(ImportError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(MatchingConfig::from_json("{ not json").is_err());
    }
}
