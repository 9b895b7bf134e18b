use serde::{Deserialize, Serialize};

use crate::config::SbiConfig;

/// Typed reading of an SBI outcome string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SbiVerdict {
    SmallBusiness,
    NotSmallBusiness,
    /// The SBI tool did not recognise the ABN itself.
    InvalidAbn,
    /// Text matched no known phrase.
    Unknown,
}

impl SbiVerdict {
    /// Value a stage row's `isSmallBusiness` must hold for this verdict.
    pub fn expected_small_business(self) -> Option<bool> {
        match self {
            SbiVerdict::SmallBusiness => Some(true),
            SbiVerdict::NotSmallBusiness => Some(false),
            SbiVerdict::InvalidAbn | SbiVerdict::Unknown => None,
        }
    }
}

/// Maps outcome text to a verdict using the configured synonym table.
///
/// Invalid-ABN markers are case-insensitive substrings and take precedence;
/// the small-business phrases must match exactly (surrounding whitespace
/// ignored).
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    small_business: Vec<String>,
    not_small_business: Vec<String>,
    invalid_abn_markers: Vec<String>,
}

impl OutcomeClassifier {
    pub fn new(config: &SbiConfig) -> Self {
        Self {
            small_business: config.small_business_outcomes.clone(),
            not_small_business: config.not_small_business_outcomes.clone(),
            invalid_abn_markers: config
                .invalid_abn_markers
                .iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, outcome: &str) -> SbiVerdict {
        let text = outcome.trim();
        let lowered = text.to_lowercase();
        if self.invalid_abn_markers.iter().any(|m| lowered.contains(m)) {
            SbiVerdict::InvalidAbn
        } else if self.small_business.iter().any(|p| p == text) {
            SbiVerdict::SmallBusiness
        } else if self.not_small_business.iter().any(|p| p == text) {
            SbiVerdict::NotSmallBusiness
        } else {
            SbiVerdict::Unknown
        }
    }
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self::new(&SbiConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_phrases() {
        let c = OutcomeClassifier::default();
        assert_eq!(
            c.classify("Small business for payment times reporting"),
            SbiVerdict::SmallBusiness
        );
        assert_eq!(
            c.classify(" Not a small business for payment times reporting "),
            SbiVerdict::NotSmallBusiness
        );
    }

    #[test]
    fn test_phrase_match_is_exact() {
        let c = OutcomeClassifier::default();
        assert_eq!(
            c.classify("small business for payment times reporting"),
            SbiVerdict::Unknown
        );
        assert_eq!(c.classify("Small business"), SbiVerdict::Unknown);
        assert_eq!(c.classify(""), SbiVerdict::Unknown);
    }

    #[test]
    fn test_invalid_marker_overrides_and_ignores_case() {
        let c = OutcomeClassifier::default();
        assert_eq!(
            c.classify("The ABN entered is NOT RECOGNISED AS A VALID ABN"),
            SbiVerdict::InvalidAbn
        );
    }

    #[test]
    fn test_configured_synonyms() {
        let mut cfg = SbiConfig::default();
        cfg.small_business_outcomes.push("SB".to_string());
        let c = OutcomeClassifier::new(&cfg);
        assert_eq!(c.classify("SB"), SbiVerdict::SmallBusiness);
    }

    #[test]
    fn test_expected_flag() {
        assert_eq!(SbiVerdict::SmallBusiness.expected_small_business(), Some(true));
        assert_eq!(SbiVerdict::NotSmallBusiness.expected_small_business(), Some(false));
        assert_eq!(SbiVerdict::Unknown.expected_small_business(), None);
    }
}
