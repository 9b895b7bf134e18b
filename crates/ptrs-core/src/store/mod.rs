//! Persistence seam.
//!
//! The engine never filters rows by tenant itself. It binds the tenant on the
//! session (see [`TENANT_SETTING`]) and relies on the backend's row-level
//! security to scope every read and to reject every foreign write.

pub mod memory;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::tenancy::TenantId;
use crate::types::{Days, Money, RunId};

/// Transaction-local setting read by the row-level-security policies.
pub const TENANT_SETTING: &str = "app.current_tenant_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("row-level security policy rejected write to {table}")]
    RowLevelSecurity { table: &'static str },

    #[error("{table} row {id} is not visible in this transaction")]
    RowNotFound { table: &'static str, id: Uuid },

    #[error("duplicate key in {table}: {key}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("transaction already finished")]
    TransactionFinished,

    #[error("could not serialize access due to concurrent update")]
    SerializationFailure,

    #[error("{0} failed")]
    OperationFailed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A reporting run owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingRun {
    pub id: RunId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
}

/// One payment/invoice line of a reporting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    #[serde(default)]
    pub supply_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_receipt_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notice_for_payment_issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_amount: Option<Money>,
    #[serde(default)]
    pub invoice_amount: Option<Money>,
    #[serde(default = "default_true")]
    pub is_reportable: bool,
    #[serde(default)]
    pub excluded_from_report: bool,
    #[serde(default)]
    pub is_rcti: bool,
    #[serde(default)]
    pub invoice_payment_terms: Option<String>,
    #[serde(default)]
    pub notice_for_payment_terms: Option<String>,
    #[serde(default)]
    pub contract_po_payment_terms: Option<String>,
    // Derived
    #[serde(default)]
    pub payment_time_days: Option<Days>,
    #[serde(default)]
    pub payment_term_days: Option<Days>,
    #[serde(default)]
    pub partial_payment: bool,
    #[serde(default)]
    pub explanatory_comment: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Document payload of a stage row. Fields the engine does not own are kept
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRowPayload {
    #[serde(default)]
    pub payee_abn: Option<String>,
    #[serde(default)]
    pub is_small_business: Option<bool>,
    #[serde(default)]
    pub small_business_outcome: Option<String>,
    #[serde(default)]
    pub small_business_source: Option<String>,
    #[serde(default)]
    pub small_business_evidence_id: Option<Uuid>,
    #[serde(default)]
    pub small_business_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub excluded: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Pre-finalisation working copy of a transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    pub row_number: u32,
    #[serde(default)]
    pub payload: StageRowPayload,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SbiUploadStatus {
    Applied,
    AppliedWithWarnings,
    Blocked,
}

impl SbiUploadStatus {
    /// Uploads in these states are eligible evidence for validation.
    pub fn is_applied(self) -> bool {
        matches!(
            self,
            SbiUploadStatus::Applied | SbiUploadStatus::AppliedWithWarnings
        )
    }
}

/// Counts recorded against an SBI upload once its merge has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbiUploadSummary {
    pub raw_rows: u64,
    pub parsed_abns: u64,
    /// Rows skipped because the ABN cell held no digits.
    pub skipped_empty_abn_rows: u64,
    /// Distinct ABNs whose outcome marks them invalid, or that are not 11 digits.
    pub invalid_abns: u64,
    /// Distinct ABNs whose outcome text matched no known phrase.
    pub unknown_outcomes: u64,
    pub excluded_stage_rows: u64,
    pub missing_abn_stage_rows: u64,
    pub malformed_abn_stage_rows: u64,
    /// Well-formed stage ABNs the file has no result for.
    pub unmatched_stage_rows: u64,
    pub matched_stage_rows: u64,
    pub invalid_abn_matches: u64,
    pub unknown_outcome_matches: u64,
    /// Rows whose small-business flag changed; one audit entry each.
    pub affected_rows: u64,
    /// Rows whose only change was the evidence pointer moving to this upload.
    pub evidence_refreshed_rows: u64,
    pub blocking_reasons: Vec<String>,
}

/// One import attempt of an SBI results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbiUpload {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    pub file_name: String,
    pub file_hash: String,
    pub raw_row_count: u64,
    pub parsed_abn_count: u64,
    pub status: SbiUploadStatus,
    pub summary: SbiUploadSummary,
    pub uploaded_by: String,
    pub applied_by: String,
    pub created_at: DateTime<Utc>,
}

/// One distinct normalised ABN of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbiResult {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    pub sbi_upload_id: Uuid,
    pub abn: String,
    pub outcome: String,
    pub year: Option<i32>,
    pub is_valid_abn: bool,
}

/// Audit entry for a stage row whose small-business state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbiRowChange {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    pub sbi_upload_id: Uuid,
    pub stage_row_id: Uuid,
    pub row_number: u32,
    pub abn: String,
    pub previous_is_small_business: Option<bool>,
    pub new_is_small_business: bool,
    pub previous_evidence_id: Option<Uuid>,
    pub new_evidence_id: Uuid,
    pub outcome: String,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

/// Derived fields for one transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetricsUpdate {
    pub record_id: Uuid,
    pub payment_time_days: Option<Days>,
    pub payment_term_days: Option<Days>,
    pub partial_payment: bool,
    pub explanatory_comment: Option<String>,
}

/// Small-business fields written onto one stage row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRowSbiUpdate {
    pub stage_row_id: Uuid,
    pub is_small_business: bool,
    pub outcome: String,
    pub source: String,
    pub evidence_id: Uuid,
    pub checked_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Tenant-scoped data access. Implementations must apply row-level security
/// keyed on the session's [`TENANT_SETTING`]; callers pass no tenant filter.
pub trait ComplianceRepository {
    fn find_run(&mut self, run_id: RunId) -> StoreResult<Option<ReportingRun>>;

    /// Reportable, non-excluded records of a run ordered by id.
    fn reportable_records(&mut self, run_id: RunId) -> StoreResult<Vec<TransactionRecord>>;

    /// Applies every update as one statement. Either all rows are written or
    /// the call fails without touching any.
    fn apply_derived_metrics(
        &mut self,
        run_id: RunId,
        updates: &[DerivedMetricsUpdate],
    ) -> StoreResult<u64>;

    /// Non-deleted stage rows of a run in ascending row number.
    fn stage_rows(&mut self, run_id: RunId) -> StoreResult<Vec<StagedRow>>;

    fn update_stage_row_sbi(&mut self, update: &StageRowSbiUpdate) -> StoreResult<()>;

    fn insert_sbi_upload(&mut self, upload: &SbiUpload) -> StoreResult<()>;

    /// The single permitted status/summary update of an upload.
    fn finalize_sbi_upload(
        &mut self,
        upload_id: Uuid,
        status: SbiUploadStatus,
        summary: &SbiUploadSummary,
    ) -> StoreResult<()>;

    fn insert_sbi_results(&mut self, results: &[SbiResult]) -> StoreResult<()>;

    fn insert_sbi_row_changes(&mut self, changes: &[SbiRowChange]) -> StoreResult<()>;

    /// Most recent upload of the run whose status is applied.
    fn latest_applied_sbi_upload(&mut self, run_id: RunId) -> StoreResult<Option<SbiUpload>>;

    fn find_sbi_upload(&mut self, upload_id: Uuid) -> StoreResult<Option<SbiUpload>>;

    /// Results of an upload ordered by ABN.
    fn sbi_results(&mut self, upload_id: Uuid) -> StoreResult<Vec<SbiResult>>;

    /// Audit trail of an upload ordered by row number.
    fn sbi_row_changes(&mut self, upload_id: Uuid) -> StoreResult<Vec<SbiRowChange>>;
}

/// One open database transaction.
pub trait Session: ComplianceRepository {
    /// `set_config(name, value, is_local)`; local settings vanish at commit or
    /// rollback.
    fn set_config(&mut self, name: &str, value: &str, is_local: bool) -> StoreResult<()>;

    fn current_setting(&self, name: &str) -> Option<String>;

    fn commit(&mut self) -> StoreResult<()>;

    /// Rolling back a finished transaction is a no-op.
    fn rollback(&mut self) -> StoreResult<()>;
}

pub trait Database {
    type Session: Session;

    fn begin(&self) -> StoreResult<Self::Session>;
}
