use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{DerivedMetricsUpdate, TransactionRecord};
use crate::types::Days;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a record's payment term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTermSource {
    /// Invoice due date minus issue date, inclusive.
    InvoiceDates,
    InvoicePaymentTerms,
    NoticeForPaymentTerms,
    ContractPoPaymentTerms,
    /// Term text was supplied but held no day count that fits in `Days`.
    UnreadableTerms,
    /// Nothing usable was supplied.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTerm {
    pub days: Days,
    pub source: PaymentTermSource,
}

/// Separator between notes accumulated in `explanatory_comment`.
pub const NOTE_SEPARATOR: &str = "; ";

impl PaymentTermSource {
    /// Sources that fell through to the configured default term.
    pub fn is_default(self) -> bool {
        matches!(
            self,
            PaymentTermSource::Default | PaymentTermSource::UnreadableTerms
        )
    }

    /// Explanatory note for a fallback source; `None` for the primary source.
    pub fn note(self, default_days: Days) -> Option<String> {
        match self {
            PaymentTermSource::InvoiceDates => None,
            PaymentTermSource::InvoicePaymentTerms => {
                Some("Payment term taken from invoice payment terms".to_string())
            }
            PaymentTermSource::NoticeForPaymentTerms => {
                Some("Payment term taken from notice for payment terms".to_string())
            }
            PaymentTermSource::ContractPoPaymentTerms => {
                Some("Payment term taken from contract/PO payment terms".to_string())
            }
            PaymentTermSource::UnreadableTerms => Some(format!(
                "Payment term defaulted to {} days as the supplied payment terms could not be read",
                default_days
            )),
            PaymentTermSource::Default => Some(format!(
                "Payment term defaulted to {} days as no invoice due date or payment terms were supplied",
                default_days
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn days_between(later: NaiveDate, earlier: NaiveDate) -> Days {
    (later - earlier).num_days()
}

/// Exclusive day count clamped at zero.
fn exclusive_days(paid: NaiveDate, from: NaiveDate) -> Days {
    days_between(paid, from).max(0)
}

/// Strips every non-digit and parses what is left, so "Net 45 days" is 45.
pub fn parse_term_days(text: &str) -> Option<Days> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<Days>().ok()
}

/// Appends `note` to `existing` unless it is already present.
pub fn append_note(existing: Option<&str>, note: &str) -> String {
    match existing.map(str::trim).filter(|e| !e.is_empty()) {
        None => note.to_string(),
        Some(e) if e.split(NOTE_SEPARATOR).any(|part| part.trim() == note) => e.to_string(),
        Some(e) => format!("{}{}{}", e, NOTE_SEPARATOR, note),
    }
}

// ---------------------------------------------------------------------------
// Per-record rules
// ---------------------------------------------------------------------------

/// Payment time in days, or `None` when the dates the applicable rule needs
/// are missing.
///
/// * RCTI: payment minus invoice issue, inclusive (same day is 1), negative
///   differences clamp to 0.
/// * Invoice issue or receipt date present: the shorter of the available
///   exclusive counts from each.
/// * Notice for payment issue date present: exclusive count from it.
/// * Otherwise: exclusive count from supply date.
pub fn payment_time_days(record: &TransactionRecord) -> Option<Days> {
    if record.is_rcti {
        let diff = days_between(record.payment_date?, record.invoice_issue_date?);
        return Some(if diff < 0 { 0 } else { diff + 1 });
    }

    if record.invoice_issue_date.is_some() || record.invoice_receipt_date.is_some() {
        let paid = record.payment_date?;
        return [record.invoice_issue_date, record.invoice_receipt_date]
            .into_iter()
            .flatten()
            .map(|from| exclusive_days(paid, from))
            .min();
    }

    if let Some(notice) = record.notice_for_payment_issue_date {
        return record.payment_date.map(|paid| exclusive_days(paid, notice));
    }

    Some(exclusive_days(record.payment_date?, record.supply_date?))
}

/// Payment term: inclusive invoice due-minus-issue when non-negative, else the
/// digits of the first non-empty term text, else `default_days`. Text whose
/// digits are absent or overflow is reported as [`PaymentTermSource::UnreadableTerms`].
pub fn payment_term(record: &TransactionRecord, default_days: Days) -> PaymentTerm {
    if let (Some(issue), Some(due)) = (record.invoice_issue_date, record.invoice_due_date) {
        let diff = days_between(due, issue);
        if diff >= 0 {
            return PaymentTerm {
                days: diff + 1,
                source: PaymentTermSource::InvoiceDates,
            };
        }
    }

    let fallbacks = [
        (
            record.invoice_payment_terms.as_deref(),
            PaymentTermSource::InvoicePaymentTerms,
        ),
        (
            record.notice_for_payment_terms.as_deref(),
            PaymentTermSource::NoticeForPaymentTerms,
        ),
        (
            record.contract_po_payment_terms.as_deref(),
            PaymentTermSource::ContractPoPaymentTerms,
        ),
    ];
    let first_text = fallbacks
        .into_iter()
        .find_map(|(text, source)| text.filter(|t| !t.trim().is_empty()).map(|t| (t, source)));

    match first_text {
        Some((text, source)) => match parse_term_days(text) {
            Some(days) => PaymentTerm { days, source },
            None => PaymentTerm {
                days: default_days,
                source: PaymentTermSource::UnreadableTerms,
            },
        },
        None => PaymentTerm {
            days: default_days,
            source: PaymentTermSource::Default,
        },
    }
}

/// Paid less than invoiced. Missing amounts count as not partial.
pub fn partial_payment(record: &TransactionRecord) -> bool {
    match (record.payment_amount, record.invoice_amount) {
        (Some(paid), Some(invoiced)) => paid < invoiced,
        _ => false,
    }
}

/// All derived fields for one record.
pub fn derive_record(
    record: &TransactionRecord,
    default_term_days: Days,
) -> (DerivedMetricsUpdate, PaymentTerm) {
    let term = payment_term(record, default_term_days);
    let explanatory_comment = match term.source.note(default_term_days) {
        Some(note) => Some(append_note(record.explanatory_comment.as_deref(), &note)),
        None => record.explanatory_comment.clone(),
    };
    let update = DerivedMetricsUpdate {
        record_id: record.id,
        payment_time_days: payment_time_days(record),
        payment_term_days: Some(term.days),
        partial_payment: partial_payment(record),
        explanatory_comment,
    };
    (update, term)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::TenantId;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn blank() -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            tenant_id: TenantId::parse("tenant0001").unwrap(),
            run_id: Uuid::new_v4(),
            supply_date: None,
            payment_date: None,
            invoice_issue_date: None,
            invoice_receipt_date: None,
            invoice_due_date: None,
            notice_for_payment_issue_date: None,
            payment_amount: None,
            invoice_amount: None,
            is_reportable: true,
            excluded_from_report: false,
            is_rcti: false,
            invoice_payment_terms: None,
            notice_for_payment_terms: None,
            contract_po_payment_terms: None,
            payment_time_days: None,
            payment_term_days: None,
            partial_payment: false,
            explanatory_comment: None,
        }
    }

    // -----------------------------------------------------------------------
    // Payment time
    // -----------------------------------------------------------------------

    #[test]
    fn test_rcti_same_day_counts_one() {
        let mut r = blank();
        r.is_rcti = true;
        r.invoice_issue_date = Some(d(2024, 3, 1));
        r.payment_date = Some(d(2024, 3, 1));
        assert_eq!(payment_time_days(&r), Some(1));
    }

    #[test]
    fn test_rcti_issue_after_payment_clamps_to_zero() {
        let mut r = blank();
        r.is_rcti = true;
        r.invoice_issue_date = Some(d(2024, 3, 2));
        r.payment_date = Some(d(2024, 3, 1));
        assert_eq!(payment_time_days(&r), Some(0));
    }

    #[test]
    fn test_rcti_is_inclusive() {
        let mut r = blank();
        r.is_rcti = true;
        r.invoice_issue_date = Some(d(2024, 3, 1));
        r.payment_date = Some(d(2024, 3, 11));
        assert_eq!(payment_time_days(&r), Some(11));
    }

    #[test]
    fn test_rcti_missing_issue_date_is_null() {
        let mut r = blank();
        r.is_rcti = true;
        r.payment_date = Some(d(2024, 3, 1));
        r.supply_date = Some(d(2024, 2, 1));
        assert_eq!(payment_time_days(&r), None);
    }

    #[test]
    fn test_shortest_invoice_path_wins() {
        let mut r = blank();
        r.payment_date = Some(d(2024, 3, 11));
        r.invoice_issue_date = Some(d(2024, 3, 1));
        r.invoice_receipt_date = Some(d(2024, 3, 7));
        assert_eq!(payment_time_days(&r), Some(4));
    }

    #[test]
    fn test_receipt_only_is_used_alone() {
        let mut r = blank();
        r.payment_date = Some(d(2024, 3, 11));
        r.invoice_receipt_date = Some(d(2024, 3, 1));
        r.supply_date = Some(d(2024, 1, 1));
        assert_eq!(payment_time_days(&r), Some(10));
    }

    #[test]
    fn test_invoice_path_clamps_each_candidate() {
        let mut r = blank();
        r.payment_date = Some(d(2024, 3, 1));
        r.invoice_issue_date = Some(d(2024, 3, 5));
        r.invoice_receipt_date = Some(d(2024, 2, 20));
        assert_eq!(payment_time_days(&r), Some(0));
    }

    #[test]
    fn test_invoice_path_without_payment_date_is_null() {
        let mut r = blank();
        r.invoice_issue_date = Some(d(2024, 3, 1));
        r.supply_date = Some(d(2024, 2, 1));
        assert_eq!(payment_time_days(&r), None);
    }

    #[test]
    fn test_notice_for_payment_used_before_supply() {
        let mut r = blank();
        r.payment_date = Some(d(2024, 3, 21));
        r.notice_for_payment_issue_date = Some(d(2024, 3, 1));
        r.supply_date = Some(d(2024, 1, 1));
        assert_eq!(payment_time_days(&r), Some(20));
    }

    #[test]
    fn test_supply_date_fallback_is_exclusive() {
        let mut r = blank();
        r.payment_date = Some(d(2024, 3, 31));
        r.supply_date = Some(d(2024, 3, 1));
        assert_eq!(payment_time_days(&r), Some(30));
    }

    #[test]
    fn test_no_dates_is_null() {
        assert_eq!(payment_time_days(&blank()), None);
    }

    // -----------------------------------------------------------------------
    // Payment term
    // -----------------------------------------------------------------------

    #[test]
    fn test_term_from_invoice_dates_is_inclusive() {
        let mut r = blank();
        r.invoice_issue_date = Some(d(2024, 3, 1));
        r.invoice_due_date = Some(d(2024, 3, 30));
        r.invoice_payment_terms = Some("Net 45".to_string());
        let term = payment_term(&r, 31);
        assert_eq!(term.days, 30);
        assert_eq!(term.source, PaymentTermSource::InvoiceDates);
    }

    #[test]
    fn test_negative_invoice_dates_fall_back_to_text() {
        let mut r = blank();
        r.invoice_issue_date = Some(d(2024, 3, 30));
        r.invoice_due_date = Some(d(2024, 3, 1));
        r.invoice_payment_terms = Some("Net 45 days".to_string());
        assert_eq!(
            payment_term(&r, 31),
            PaymentTerm {
                days: 45,
                source: PaymentTermSource::InvoicePaymentTerms
            }
        );
    }

    #[test]
    fn test_first_non_empty_term_text_is_used() {
        let mut r = blank();
        r.invoice_payment_terms = Some("   ".to_string());
        r.notice_for_payment_terms = Some("14 days EOM".to_string());
        r.contract_po_payment_terms = Some("60".to_string());
        let term = payment_term(&r, 31);
        assert_eq!(term.days, 14);
        assert_eq!(term.source, PaymentTermSource::NoticeForPaymentTerms);
    }

    #[test]
    fn test_digitless_term_text_defaults() {
        let mut r = blank();
        r.invoice_payment_terms = Some("End of month".to_string());
        r.contract_po_payment_terms = Some("30".to_string());
        let term = payment_term(&r, 31);
        assert_eq!(term.days, 31);
        assert_eq!(term.source, PaymentTermSource::UnreadableTerms);
        assert!(term.source.is_default());
    }

    #[test]
    fn test_overflowing_term_text_is_unreadable_not_absent() {
        let mut r = blank();
        r.invoice_payment_terms = Some("99999999999999999999999 days".to_string());
        let term = payment_term(&r, 31);
        assert_eq!(
            term,
            PaymentTerm {
                days: 31,
                source: PaymentTermSource::UnreadableTerms
            }
        );
        let note = term.source.note(31).unwrap();
        assert!(note.contains("could not be read"), "note was {note:?}");
        assert!(!note.contains("no invoice due date"));
    }

    #[test]
    fn test_no_term_text_uses_default_source() {
        let term = payment_term(&blank(), 31);
        assert_eq!(term.source, PaymentTermSource::Default);
        assert!(term.source.note(31).unwrap().contains("were supplied"));
    }

    #[test]
    fn test_parse_term_days_strips_all_non_digits() {
        assert_eq!(parse_term_days("Net 45 days"), Some(45));
        assert_eq!(parse_term_days("30/60"), Some(3060));
        assert_eq!(parse_term_days("net"), None);
    }

    // -----------------------------------------------------------------------
    // Notes and partial payment
    // -----------------------------------------------------------------------

    #[test]
    fn test_append_note_deduplicates() {
        let once = append_note(None, "n1");
        assert_eq!(once, "n1");
        let twice = append_note(Some(&once), "n1");
        assert_eq!(twice, "n1");
        let other = append_note(Some("manual comment"), "n1");
        assert_eq!(other, "manual comment; n1");
        assert_eq!(append_note(Some(&other), "n1"), other);
    }

    #[test]
    fn test_partial_payment_rules() {
        let mut r = blank();
        assert!(!partial_payment(&r));
        r.payment_amount = Some(dec!(90.00));
        assert!(!partial_payment(&r));
        r.invoice_amount = Some(dec!(100.00));
        assert!(partial_payment(&r));
        r.payment_amount = Some(dec!(100));
        assert!(!partial_payment(&r));
    }

    #[test]
    fn test_derive_record_keeps_comment_for_primary_term() {
        let mut r = blank();
        r.invoice_issue_date = Some(d(2024, 3, 1));
        r.invoice_due_date = Some(d(2024, 3, 1));
        r.explanatory_comment = Some("keep".to_string());
        let (update, term) = derive_record(&r, 31);
        assert_eq!(term.days, 1);
        assert_eq!(update.explanatory_comment.as_deref(), Some("keep"));
    }
}
