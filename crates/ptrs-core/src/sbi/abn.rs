/// Digits in an Australian Business Number.
pub const ABN_LEN: usize = 11;

/// Strips every non-digit character ("51 824 753 556" -> "51824753556").
pub fn normalize_abn(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn is_well_formed_abn(normalized: &str) -> bool {
    normalized.len() == ABN_LEN && normalized.bytes().all(|b| b.is_ascii_digit())
}

/// Shape of a stage row's payee ABN after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayeeAbn {
    Missing,
    Malformed(String),
    WellFormed(String),
}

pub fn classify_payee_abn(raw: Option<&str>) -> PayeeAbn {
    let normalized = raw.map(normalize_abn).unwrap_or_default();
    if normalized.is_empty() {
        PayeeAbn::Missing
    } else if is_well_formed_abn(&normalized) {
        PayeeAbn::WellFormed(normalized)
    } else {
        PayeeAbn::Malformed(normalized)
    }
}
