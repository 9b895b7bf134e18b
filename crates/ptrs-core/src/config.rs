use serde::{Deserialize, Serialize};

use crate::types::Days;

/// Engine-wide tunables. Every field has a default, so an empty document
/// (or no config file at all) yields the reference behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub metrics: MetricsConfig,
    pub sbi: SbiConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Term applied when neither invoice dates nor any term text yield a value.
    pub default_payment_term_days: Days,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            default_payment_term_days: 31,
        }
    }
}

/// Header synonyms and the outcome synonym table for SBI result files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbiConfig {
    pub abn_headers: Vec<String>,
    pub outcome_headers: Vec<String>,
    pub year_headers: Vec<String>,
    /// Exact phrases meaning "is a small business".
    pub small_business_outcomes: Vec<String>,
    /// Exact phrases meaning "is not a small business".
    pub not_small_business_outcomes: Vec<String>,
    /// Case-insensitive substrings marking the ABN itself as invalid.
    /// These win over both phrase lists.
    pub invalid_abn_markers: Vec<String>,
}

pub const SMALL_BUSINESS_OUTCOME: &str = "Small business for payment times reporting";
pub const NOT_SMALL_BUSINESS_OUTCOME: &str = "Not a small business for payment times reporting";
pub const INVALID_ABN_MARKER: &str = "not recognised as a valid abn";

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for SbiConfig {
    fn default() -> Self {
        Self {
            abn_headers: strings(&[
                "abn",
                "supplier abn",
                "entity abn",
                "payee abn",
                "business abn",
            ]),
            outcome_headers: strings(&[
                "outcome",
                "result",
                "status",
                "sbi outcome",
                "small business outcome",
            ]),
            year_headers: strings(&["year", "reporting year", "income year"]),
            small_business_outcomes: strings(&[SMALL_BUSINESS_OUTCOME]),
            not_small_business_outcomes: strings(&[NOT_SMALL_BUSINESS_OUTCOME]),
            invalid_abn_markers: strings(&[INVALID_ABN_MARKER]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Cap on each of the blocker and warning lists. Counts are never capped.
    pub max_issues: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { max_issues: 200 }
    }
}
