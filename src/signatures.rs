// 🏷️ Provider Signatures - Rules as data for bank narrative classification
//
// Bank entries carry no provider field, only narrative text. An ordered list
// of regex signatures decides which provider paid the deposit.
//
// Resolution order (first match wins):
//   1. higher `priority` first
//   2. equal priority: declaration order
//
// Built-in order:
//   twint-acquiring  "TWINT Acquiring"        priority 100
//   sumup-payments   "SumUp Payments"         priority 100
//   twint-brand      "TWINT" as a word        priority 10
//   sumup-brand      "SumUp" / "Sum Up"       priority 10

use crate::model::{EntryProvider, Provider};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// SIGNATURE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSignature {
    /// Signature id for tracing which rule fired
    pub id: String,

    /// Regex applied to the narrative (use `(?i)` for case-insensitive)
    pub pattern: String,

    pub provider: Provider,

    /// Higher = tried first
    #[serde(default)]
    pub priority: i32,
}

impl ProviderSignature {
    pub fn new(id: &str, pattern: &str, provider: Provider, priority: i32) -> Self {
        ProviderSignature {
            id: id.to_string(),
            pattern: pattern.to_string(),
            provider,
            priority,
        }
    }
}

/// Built-in signatures for the providers' standard remittance wording
pub fn default_signatures() -> Vec<ProviderSignature> {
    vec![
        ProviderSignature::new("twint-acquiring", r"(?i)\bTWINT\s+Acquiring\b", Provider::Twint, 100),
        ProviderSignature::new("sumup-payments", r"(?i)\bSUM\s?UP\s+PAYMENTS\b", Provider::Sumup, 100),
        ProviderSignature::new("twint-brand", r"(?i)\bTWINT\b", Provider::Twint, 10),
        ProviderSignature::new("sumup-brand", r"(?i)\bSUM\s?UP\b", Provider::Sumup, 10),
    ]
}

/// Built-in reversal wording (German / French / English bank narratives)
pub fn default_reversal_patterns() -> Vec<String> {
    vec![
        r"(?i)\br(ü|ue|u)ckbuchung\b".to_string(),
        r"(?i)\bstorno\b".to_string(),
        r"(?i)\bcharge\s?back\b".to_string(),
        r"(?i)\breversal\b".to_string(),
        r"(?i)\bextourne\b".to_string(),
    ]
}

// ============================================================================
// SIGNATURE REGISTRY
// ============================================================================

pub struct SignatureRegistry {
    signatures: Vec<(ProviderSignature, Regex)>,
    reversals: Vec<Regex>,
}

impl SignatureRegistry {
    /// Compile signatures; invalid regexes are reported, never skipped silently
    pub fn new(signatures: &[ProviderSignature], reversal_patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(signatures.len());
        for sig in signatures {
            let regex = Regex::new(&sig.pattern)
                .with_context(|| format!("invalid pattern for signature '{}'", sig.id))?;
            compiled.push((sig.clone(), regex));
        }
        // Stable sort keeps declaration order within one priority
        compiled.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));

        let reversals = reversal_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid reversal pattern '{}'", p)))
            .collect::<Result<Vec<_>>>()?;

        Ok(SignatureRegistry { signatures: compiled, reversals })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(&default_signatures(), &default_reversal_patterns())
    }

    /// Resolve the provider behind a bank narrative
    pub fn resolve(&self, narrative: &str) -> EntryProvider {
        self.matching_signature(narrative)
            .map(|sig| EntryProvider::from(sig.provider))
            .unwrap_or(EntryProvider::Other)
    }

    /// First signature that fires, in resolution order
    pub fn matching_signature(&self, narrative: &str) -> Option<&ProviderSignature> {
        self.signatures
            .iter()
            .find(|(_, regex)| regex.is_match(narrative))
            .map(|(sig, _)| sig)
    }

    pub fn is_reversal(&self, narrative: &str) -> bool {
        self.reversals.iter().any(|r| r.is_match(narrative))
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolution() {
        let registry = SignatureRegistry::builtin().unwrap();

        assert_eq!(
            registry.resolve("Gutschrift TWINT Acquiring AG Zürich, Abrechnung 01.11.2024"),
            EntryProvider::Twint
        );
        assert_eq!(
            registry.resolve("SUMUP PAYMENTS LIMITED PAYOUT 2K3J"),
            EntryProvider::Sumup
        );
        assert_eq!(registry.resolve("Sum Up payout"), EntryProvider::Sumup);
        assert_eq!(registry.resolve("Miete Salon November"), EntryProvider::Other);
        // "twintig" is not the TWINT brand token
        assert_eq!(registry.resolve("twintig"), EntryProvider::Other);
    }

    #[test]
    fn test_priority_beats_text_position() {
        let registry = SignatureRegistry::builtin().unwrap();

        // Brand token for TWINT appears first, but the acquirer signature
        // for SumUp has the higher priority
        let sig = registry
            .matching_signature("TWINT Kasse / SUMUP PAYMENTS LIMITED")
            .unwrap();
        assert_eq!(sig.id, "sumup-payments");
    }

    #[test]
    fn test_custom_signature_priority() {
        let mut sigs = default_signatures();
        sigs.push(ProviderSignature::new("raiffeisen-twint", r"(?i)RAIFF.*TWT", Provider::Twint, 500));
        let registry = SignatureRegistry::new(&sigs, &[]).unwrap();

        let sig = registry.matching_signature("RAIFF SAMMEL TWT SUMUP").unwrap();
        assert_eq!(sig.id, "raiffeisen-twint");
        assert_eq!(registry.signature_count(), 5);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let sigs = vec![ProviderSignature::new("broken", "(unclosed", Provider::Twint, 0)];
        assert!(SignatureRegistry::new(&sigs, &[]).is_err());
    }

    #[test]
    fn test_reversal_detection() {
        let registry = SignatureRegistry::builtin().unwrap();
        assert!(registry.is_reversal("TWINT Acquiring AG Rückbuchung"));
        assert!(registry.is_reversal("SUMUP CHARGEBACK 1234"));
        assert!(!registry.is_reversal("TWINT Acquiring AG Gutschrift"));
    }
}
