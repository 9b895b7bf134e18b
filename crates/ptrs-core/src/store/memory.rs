//! In-memory store with row-level-security semantics.
//!
//! Each session works on a private copy of the tables that is published on
//! commit and discarded on rollback. Reads only see rows whose `tenant_id`
//! equals the session's [`TENANT_SETTING`] (no binding, no rows); writes to
//! rows of any other tenant are rejected. A session that wrote anything fails
//! to commit if another writer committed after it began.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ComplianceRepository, Database, DerivedMetricsUpdate, ReportingRun, SbiResult, SbiRowChange,
    SbiUpload, SbiUploadStatus, SbiUploadSummary, Session, StageRowSbiUpdate, StagedRow,
    StoreError, StoreResult, TransactionRecord, TENANT_SETTING,
};
use crate::tenancy::TenantId;
use crate::types::RunId;

/// Serializable image of every table, used to seed and export the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(default)]
    pub runs: Vec<ReportingRun>,
    #[serde(default)]
    pub transaction_records: Vec<TransactionRecord>,
    #[serde(default)]
    pub stage_rows: Vec<StagedRow>,
    #[serde(default)]
    pub sbi_uploads: Vec<SbiUpload>,
    #[serde(default)]
    pub sbi_results: Vec<SbiResult>,
    #[serde(default)]
    pub sbi_row_changes: Vec<SbiRowChange>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: DatasetSnapshot,
    version: u64,
    reject_tenant_binding: bool,
    failing_operations: HashSet<String>,
    begun: u64,
    open: u64,
}

/// Shared handle; clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DatasetSnapshot) -> Self {
        let db = Self::new();
        lock(&db.state).tables = snapshot;
        db
    }

    /// Copy of every committed row, all tenants included.
    pub fn snapshot(&self) -> DatasetSnapshot {
        lock(&self.state).tables.clone()
    }

    // -- Owner-role seeding (bypasses row-level security) --------------------

    pub fn insert_run(&self, run: ReportingRun) {
        let mut state = lock(&self.state);
        state.tables.runs.push(run);
        state.version += 1;
    }

    pub fn insert_transaction_record(&self, record: TransactionRecord) {
        let mut state = lock(&self.state);
        state.tables.transaction_records.push(record);
        state.version += 1;
    }

    pub fn insert_stage_row(&self, row: StagedRow) {
        let mut state = lock(&self.state);
        state.tables.stage_rows.push(row);
        state.version += 1;
    }

    // -- Fault injection -----------------------------------------------------

    /// Makes `set_config` of the tenant setting fail in new sessions.
    pub fn reject_tenant_binding(&self, reject: bool) {
        lock(&self.state).reject_tenant_binding = reject;
    }

    /// Makes the named repository operation fail in new sessions.
    pub fn fail_operation(&self, operation: &str) {
        lock(&self.state)
            .failing_operations
            .insert(operation.to_string());
    }

    pub fn clear_faults(&self) {
        let mut state = lock(&self.state);
        state.reject_tenant_binding = false;
        state.failing_operations.clear();
    }

    // -- Introspection -------------------------------------------------------

    pub fn begun_transactions(&self) -> u64 {
        lock(&self.state).begun
    }

    pub fn open_transactions(&self) -> u64 {
        lock(&self.state).open
    }
}

impl Database for MemoryDatabase {
    type Session = MemorySession;

    fn begin(&self) -> StoreResult<MemorySession> {
        let mut state = lock(&self.state);
        state.begun += 1;
        state.open += 1;
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            working: state.tables.clone(),
            base_version: state.version,
            settings: HashMap::new(),
            reject_tenant_binding: state.reject_tenant_binding,
            failing_operations: state.failing_operations.clone(),
            dirty: false,
            finished: false,
        })
    }
}

pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    working: DatasetSnapshot,
    base_version: u64,
    settings: HashMap<String, String>,
    reject_tenant_binding: bool,
    failing_operations: HashSet<String>,
    dirty: bool,
    finished: bool,
}

impl MemorySession {
    fn ensure_open(&self, operation: &str) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::TransactionFinished);
        }
        if self.failing_operations.contains(operation) {
            return Err(StoreError::OperationFailed(operation.to_string()));
        }
        Ok(())
    }

    fn visible(&self, tenant_id: &TenantId) -> bool {
        self.settings.get(TENANT_SETTING).map(String::as_str) == Some(tenant_id.as_str())
    }

    fn check_write(&self, tenant_id: &TenantId, table: &'static str) -> StoreResult<()> {
        if self.visible(tenant_id) {
            Ok(())
        } else {
            Err(StoreError::RowLevelSecurity { table })
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.settings.clear();
        self.working = DatasetSnapshot::default();
        let mut state = lock(&self.state);
        state.open = state.open.saturating_sub(1);
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}

impl Session for MemorySession {
    fn set_config(&mut self, name: &str, value: &str, _is_local: bool) -> StoreResult<()> {
        self.ensure_open("set_config")?;
        if name == TENANT_SETTING && self.reject_tenant_binding {
            return Err(StoreError::Unavailable(format!(
                "permission denied to set parameter \"{}\"",
                name
            )));
        }
        // Sessions live exactly one transaction, so local and session-level
        // settings share a lifetime here.
        self.settings.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn current_setting(&self, name: &str) -> Option<String> {
        if self.finished {
            return None;
        }
        self.settings.get(name).cloned()
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open("commit")?;
        if self.dirty {
            let mut state = lock(&self.state);
            if state.version != self.base_version {
                return Err(StoreError::SerializationFailure);
            }
            state.tables = std::mem::take(&mut self.working);
            state.version += 1;
        }
        self.finish();
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if !self.finished {
            self.finish();
        }
        Ok(())
    }
}

impl ComplianceRepository for MemorySession {
    fn find_run(&mut self, run_id: RunId) -> StoreResult<Option<ReportingRun>> {
        self.ensure_open("find_run")?;
        Ok(self
            .working
            .runs
            .iter()
            .find(|r| r.id == run_id && self.visible(&r.tenant_id))
            .cloned())
    }

    fn reportable_records(&mut self, run_id: RunId) -> StoreResult<Vec<TransactionRecord>> {
        self.ensure_open("reportable_records")?;
        let mut records: Vec<TransactionRecord> = self
            .working
            .transaction_records
            .iter()
            .filter(|r| {
                r.run_id == run_id
                    && self.visible(&r.tenant_id)
                    && r.is_reportable
                    && !r.excluded_from_report
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn apply_derived_metrics(
        &mut self,
        run_id: RunId,
        updates: &[DerivedMetricsUpdate],
    ) -> StoreResult<u64> {
        self.ensure_open("apply_derived_metrics")?;
        // Resolve every target first so a missing row leaves the table untouched.
        let mut targets = Vec::with_capacity(updates.len());
        for update in updates {
            let index = self
                .working
                .transaction_records
                .iter()
                .position(|r| {
                    r.id == update.record_id && r.run_id == run_id && self.visible(&r.tenant_id)
                })
                .ok_or(StoreError::RowNotFound {
                    table: "transaction_records",
                    id: update.record_id,
                })?;
            targets.push(index);
        }
        for (index, update) in targets.into_iter().zip(updates) {
            let record = &mut self.working.transaction_records[index];
            record.payment_time_days = update.payment_time_days;
            record.payment_term_days = update.payment_term_days;
            record.partial_payment = update.partial_payment;
            record.explanatory_comment = update.explanatory_comment.clone();
        }
        self.dirty = true;
        Ok(updates.len() as u64)
    }

    fn stage_rows(&mut self, run_id: RunId) -> StoreResult<Vec<StagedRow>> {
        self.ensure_open("stage_rows")?;
        let mut rows: Vec<StagedRow> = self
            .working
            .stage_rows
            .iter()
            .filter(|r| r.run_id == run_id && r.deleted_at.is_none() && self.visible(&r.tenant_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row_number);
        Ok(rows)
    }

    fn update_stage_row_sbi(&mut self, update: &StageRowSbiUpdate) -> StoreResult<()> {
        self.ensure_open("update_stage_row_sbi")?;
        let index = self
            .working
            .stage_rows
            .iter()
            .position(|r| {
                r.id == update.stage_row_id && r.deleted_at.is_none() && self.visible(&r.tenant_id)
            })
            .ok_or(StoreError::RowNotFound {
                table: "stage_rows",
                id: update.stage_row_id,
            })?;
        let payload = &mut self.working.stage_rows[index].payload;
        payload.is_small_business = Some(update.is_small_business);
        payload.small_business_outcome = Some(update.outcome.clone());
        payload.small_business_source = Some(update.source.clone());
        payload.small_business_evidence_id = Some(update.evidence_id);
        payload.small_business_checked_at = Some(update.checked_at);
        self.dirty = true;
        Ok(())
    }

    fn insert_sbi_upload(&mut self, upload: &SbiUpload) -> StoreResult<()> {
        self.ensure_open("insert_sbi_upload")?;
        self.check_write(&upload.tenant_id, "sbi_uploads")?;
        if self.working.sbi_uploads.iter().any(|u| u.id == upload.id) {
            return Err(StoreError::UniqueViolation {
                table: "sbi_uploads",
                key: upload.id.to_string(),
            });
        }
        self.working.sbi_uploads.push(upload.clone());
        self.dirty = true;
        Ok(())
    }

    fn finalize_sbi_upload(
        &mut self,
        upload_id: Uuid,
        status: SbiUploadStatus,
        summary: &SbiUploadSummary,
    ) -> StoreResult<()> {
        self.ensure_open("finalize_sbi_upload")?;
        let index = self
            .working
            .sbi_uploads
            .iter()
            .position(|u| u.id == upload_id && self.visible(&u.tenant_id))
            .ok_or(StoreError::RowNotFound {
                table: "sbi_uploads",
                id: upload_id,
            })?;
        let upload = &mut self.working.sbi_uploads[index];
        upload.status = status;
        upload.summary = summary.clone();
        self.dirty = true;
        Ok(())
    }

    fn insert_sbi_results(&mut self, results: &[SbiResult]) -> StoreResult<()> {
        self.ensure_open("insert_sbi_results")?;
        let mut keys: HashSet<(Uuid, &str)> = self
            .working
            .sbi_results
            .iter()
            .map(|r| (r.sbi_upload_id, r.abn.as_str()))
            .collect();
        for result in results {
            self.check_write(&result.tenant_id, "sbi_results")?;
            if !keys.insert((result.sbi_upload_id, result.abn.as_str())) {
                return Err(StoreError::UniqueViolation {
                    table: "sbi_results",
                    key: format!("{}/{}", result.sbi_upload_id, result.abn),
                });
            }
        }
        self.working.sbi_results.extend(results.iter().cloned());
        self.dirty = true;
        Ok(())
    }

    fn insert_sbi_row_changes(&mut self, changes: &[SbiRowChange]) -> StoreResult<()> {
        self.ensure_open("insert_sbi_row_changes")?;
        for change in changes {
            self.check_write(&change.tenant_id, "sbi_row_changes")?;
        }
        self.working.sbi_row_changes.extend(changes.iter().cloned());
        self.dirty = true;
        Ok(())
    }

    fn latest_applied_sbi_upload(&mut self, run_id: RunId) -> StoreResult<Option<SbiUpload>> {
        self.ensure_open("latest_applied_sbi_upload")?;
        Ok(self
            .working
            .sbi_uploads
            .iter()
            .enumerate()
            .filter(|(_, u)| {
                u.run_id == run_id && u.status.is_applied() && self.visible(&u.tenant_id)
            })
            .max_by_key(|(position, u)| (u.created_at, *position))
            .map(|(_, u)| u.clone()))
    }

    fn find_sbi_upload(&mut self, upload_id: Uuid) -> StoreResult<Option<SbiUpload>> {
        self.ensure_open("find_sbi_upload")?;
        Ok(self
            .working
            .sbi_uploads
            .iter()
            .find(|u| u.id == upload_id && self.visible(&u.tenant_id))
            .cloned())
    }

    fn sbi_results(&mut self, upload_id: Uuid) -> StoreResult<Vec<SbiResult>> {
        self.ensure_open("sbi_results")?;
        let mut results: Vec<SbiResult> = self
            .working
            .sbi_results
            .iter()
            .filter(|r| r.sbi_upload_id == upload_id && self.visible(&r.tenant_id))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.abn.cmp(&b.abn));
        Ok(results)
    }

    fn sbi_row_changes(&mut self, upload_id: Uuid) -> StoreResult<Vec<SbiRowChange>> {
        self.ensure_open("sbi_row_changes")?;
        let mut changes: Vec<SbiRowChange> = self
            .working
            .sbi_row_changes
            .iter()
            .filter(|c| c.sbi_upload_id == upload_id && self.visible(&c.tenant_id))
            .cloned()
            .collect();
        changes.sort_by_key(|c| c.row_number);
        Ok(changes)
    }
}
