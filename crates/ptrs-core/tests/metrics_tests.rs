use chrono::NaiveDate;
use ptrs_core::config::EngineConfig;
use ptrs_core::metrics::payment_times::NOTE_SEPARATOR;
use ptrs_core::store::memory::MemoryDatabase;
use ptrs_core::store::{ReportingRun, TransactionRecord};
use ptrs_core::{ComplianceService, TenantId};
use rust_decimal_macros::dec;
use uuid::Uuid;

const TENANT_A: &str = "tenantA001";
const TENANT_B: &str = "tenantB002";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn run(db: &MemoryDatabase, tenant: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.insert_run(ReportingRun {
        id,
        tenant_id: TenantId::parse(tenant).unwrap(),
        name: "FY24 H1".into(),
        period_start: Some(d(2024, 1, 1)),
        period_end: Some(d(2024, 6, 30)),
    });
    id
}

fn record(tenant: &str, run_id: Uuid) -> TransactionRecord {
    TransactionRecord {
        id: Uuid::new_v4(),
        tenant_id: TenantId::parse(tenant).unwrap(),
        run_id,
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

fn stored(db: &MemoryDatabase, id: Uuid) -> TransactionRecord {
    db.snapshot()
        .transaction_records
        .into_iter()
        .find(|r| r.id == id)
        .unwrap()
}

// ===========================================================================
// Derivation over a run
// ===========================================================================

#[test]
fn test_derive_metrics_writes_every_reportable_record() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);

    let mut rcti = record(TENANT_A, run_id);
    rcti.is_rcti = true;
    rcti.invoice_issue_date = Some(d(2024, 3, 1));
    rcti.payment_date = Some(d(2024, 3, 1));

    let mut shortest = record(TENANT_A, run_id);
    shortest.payment_date = Some(d(2024, 3, 11));
    shortest.invoice_issue_date = Some(d(2024, 3, 1));
    shortest.invoice_receipt_date = Some(d(2024, 3, 7));
    shortest.invoice_due_date = Some(d(2024, 3, 30));

    let mut net45 = record(TENANT_A, run_id);
    net45.supply_date = Some(d(2024, 2, 1));
    net45.payment_date = Some(d(2024, 3, 2));
    net45.invoice_payment_terms = Some("Net 45 days".into());
    net45.payment_amount = Some(dec!(900.00));
    net45.invoice_amount = Some(dec!(1000.00));

    let ids = [rcti.id, shortest.id, net45.id];
    for r in [rcti, shortest, net45] {
        db.insert_transaction_record(r);
    }

    let service = ComplianceService::new(db.clone(), EngineConfig::default());
    let out = service.derive_metrics(TENANT_A, run_id).unwrap();

    assert_eq!(out.result.applied_count, 3);
    assert_eq!(out.result.invoice_date_term_count, 1);
    assert_eq!(out.result.fallback_term_count, 1);
    assert_eq!(out.result.default_term_count, 1);
    assert_eq!(out.result.unreadable_term_count, 0);
    assert_eq!(out.result.partial_payment_count, 1);

    let rcti = stored(&db, ids[0]);
    assert_eq!(rcti.payment_time_days, Some(1));
    assert_eq!(rcti.payment_term_days, Some(31));
    assert!(rcti
        .explanatory_comment
        .unwrap()
        .contains("defaulted to 31 days"));

    let shortest = stored(&db, ids[1]);
    assert_eq!(shortest.payment_time_days, Some(4));
    assert_eq!(shortest.payment_term_days, Some(30));
    assert_eq!(shortest.explanatory_comment, None);

    let net45 = stored(&db, ids[2]);
    assert_eq!(net45.payment_time_days, Some(30));
    assert_eq!(net45.payment_term_days, Some(45));
    assert!(net45.partial_payment);
    assert!(net45
        .explanatory_comment
        .unwrap()
        .contains("invoice payment terms"));
}

#[test]
fn test_rcti_issue_after_payment_clamps_to_zero() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);
    let mut r = record(TENANT_A, run_id);
    r.is_rcti = true;
    r.payment_date = Some(d(2024, 3, 1));
    r.invoice_issue_date = Some(d(2024, 3, 2));
    let id = r.id;
    db.insert_transaction_record(r);

    let service = ComplianceService::new(db.clone(), EngineConfig::default());
    service.derive_metrics(TENANT_A, run_id).unwrap();
    assert_eq!(stored(&db, id).payment_time_days, Some(0));
}

#[test]
fn test_default_term_note_attached_once_across_recomputes() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);
    let mut r = record(TENANT_A, run_id);
    r.invoice_payment_terms = Some("on account".into());
    r.explanatory_comment = Some("Supplier disputes invoice".into());
    let id = r.id;
    db.insert_transaction_record(r);

    let service = ComplianceService::new(db.clone(), EngineConfig::default());
    let first = service.derive_metrics(TENANT_A, run_id).unwrap();
    assert_eq!(first.result.default_term_count, 1);
    assert_eq!(first.result.unreadable_term_count, 1);
    assert!(first
        .warnings
        .iter()
        .any(|w| w.contains("no readable day count")));
    service.derive_metrics(TENANT_A, run_id).unwrap();

    let r = stored(&db, id);
    assert_eq!(r.payment_term_days, Some(31));
    let comment = r.explanatory_comment.unwrap();
    let notes: Vec<&str> = comment.split(NOTE_SEPARATOR).collect();
    assert_eq!(notes.len(), 2, "comment was {comment:?}");
    assert_eq!(notes[0], "Supplier disputes invoice");
    assert!(notes[1].contains("31 days"));
    assert!(notes[1].contains("could not be read"));
}

#[test]
fn test_configured_default_term_is_used() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);
    let r = record(TENANT_A, run_id);
    let id = r.id;
    db.insert_transaction_record(r);

    let mut config = EngineConfig::default();
    config.metrics.default_payment_term_days = 30;
    let service = ComplianceService::new(db.clone(), config);
    service.derive_metrics(TENANT_A, run_id).unwrap();

    let r = stored(&db, id);
    assert_eq!(r.payment_term_days, Some(30));
    assert_eq!(r.payment_time_days, None);
}

#[test]
fn test_excluded_and_non_reportable_records_untouched() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);

    let mut excluded = record(TENANT_A, run_id);
    excluded.excluded_from_report = true;
    excluded.supply_date = Some(d(2024, 1, 1));
    excluded.payment_date = Some(d(2024, 1, 11));
    let mut hidden = record(TENANT_A, run_id);
    hidden.is_reportable = false;
    hidden.supply_date = Some(d(2024, 1, 1));
    hidden.payment_date = Some(d(2024, 1, 11));
    let ids = [excluded.id, hidden.id];
    db.insert_transaction_record(excluded);
    db.insert_transaction_record(hidden);

    let service = ComplianceService::new(db.clone(), EngineConfig::default());
    let out = service.derive_metrics(TENANT_A, run_id).unwrap();
    assert_eq!(out.result.applied_count, 0);
    for id in ids {
        let r = stored(&db, id);
        assert_eq!(r.payment_time_days, None);
        assert_eq!(r.payment_term_days, None);
    }
}

// ===========================================================================
// Failure paths
// ===========================================================================

#[test]
fn test_run_of_another_tenant_is_not_found() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_B);
    let mut r = record(TENANT_B, run_id);
    r.supply_date = Some(d(2024, 1, 1));
    r.payment_date = Some(d(2024, 1, 11));
    db.insert_transaction_record(r);
    let before = db.snapshot();

    let service = ComplianceService::new(db.clone(), EngineConfig::default());
    let err = service.derive_metrics(TENANT_A, run_id).unwrap_err();
    assert_eq!(err.code(), "RUN_NOT_FOUND");
    assert_eq!(db.snapshot(), before);
}

#[test]
fn test_failed_batch_update_leaves_run_untouched() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);
    for _ in 0..5 {
        let mut r = record(TENANT_A, run_id);
        r.supply_date = Some(d(2024, 1, 1));
        r.payment_date = Some(d(2024, 1, 20));
        db.insert_transaction_record(r);
    }
    let before = db.snapshot();
    db.fail_operation("apply_derived_metrics");

    let service = ComplianceService::new(db.clone(), EngineConfig::default());
    let err = service.derive_metrics(TENANT_A, run_id).unwrap_err();
    assert_eq!(err.code(), "STORE_ERROR");
    assert_eq!(db.snapshot(), before);
    assert_eq!(db.open_transactions(), 0);
}

#[test]
fn test_negative_default_term_rejected_before_any_write() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);
    db.insert_transaction_record(record(TENANT_A, run_id));
    let before = db.snapshot();

    let mut config = EngineConfig::default();
    config.metrics.default_payment_term_days = -1;
    let service = ComplianceService::new(db.clone(), config);
    let err = service.derive_metrics(TENANT_A, run_id).unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(db.snapshot(), before);
}

#[test]
fn test_invalid_tenant_token_never_opens_a_transaction() {
    let db = MemoryDatabase::new();
    let run_id = run(&db, TENANT_A);
    let service = ComplianceService::new(db.clone(), EngineConfig::default());

    let err = service.derive_metrics("tenantA", run_id).unwrap_err();
    assert_eq!(err.code(), "INVALID_TENANT_ID");
    assert_eq!(db.begun_transactions(), 0);
}
