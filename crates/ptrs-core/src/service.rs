//! Entry points taking an explicit tenant token.
//!
//! Every call opens exactly one tenant transaction, commits it when the
//! operation succeeds and rolls it back on any error.

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::EngineConfig;
use crate::store::Database;
use crate::tenancy::with_tenant_transaction;
use crate::types::RunId;
use crate::PtrsResult;

#[cfg(feature = "metrics")]
use crate::metrics::{self, MetricsDerivationOutput};
#[cfg(feature = "metrics")]
use crate::types::ComputationOutput;

#[cfg(feature = "sbi")]
use uuid::Uuid;

#[cfg(feature = "sbi")]
use crate::audit::AuditEvent;
#[cfg(feature = "sbi")]
use crate::certification::{self, CertificationOutcome};
#[cfg(feature = "sbi")]
use crate::sbi::{
    self, SbiAbnExport, SbiImportOutcome, SbiImportRequest, SbiUploadDetail, SbiValidationReport,
};

pub struct ComplianceService<D: Database> {
    db: D,
    config: EngineConfig,
    audit: Box<dyn AuditSink>,
}

impl<D: Database> ComplianceService<D> {
    pub fn new(db: D, config: EngineConfig) -> Self {
        Self {
            db,
            config,
            audit: Box::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[cfg(feature = "metrics")]
    pub fn derive_metrics(
        &self,
        tenant_id: &str,
        run_id: RunId,
    ) -> PtrsResult<ComputationOutput<MetricsDerivationOutput>> {
        with_tenant_transaction(&self.db, tenant_id, |tx| {
            metrics::derive_metrics(tx, run_id, &self.config.metrics)
        })
    }

    /// Imports an SBI file; the audit event is recorded only once the
    /// import has committed.
    #[cfg(feature = "sbi")]
    pub fn import_sbi_results(
        &self,
        tenant_id: &str,
        run_id: RunId,
        actor_id: &str,
        bytes: &[u8],
        file_name: &str,
    ) -> PtrsResult<SbiImportOutcome> {
        let request = SbiImportRequest {
            run_id,
            actor_id,
            file_name,
            bytes,
        };
        let (outcome, tenant) = with_tenant_transaction(&self.db, tenant_id, |tx| {
            let outcome = sbi::import_sbi_results(tx, &request, &self.config.sbi)?;
            Ok((outcome, tx.tenant_id().clone()))
        })?;

        self.audit.record(AuditEvent {
            tenant_id: tenant,
            actor_id: actor_id.to_string(),
            action: "sbi.import".to_string(),
            entity: "sbi_upload".to_string(),
            entity_id: outcome.upload_id,
            run_id,
            detail: serde_json::json!({
                "file_name": outcome.file_name,
                "file_hash": outcome.file_hash,
                "status": outcome.status,
                "affected_rows": outcome.summary.affected_rows,
            }),
            at: chrono::Utc::now(),
        });
        Ok(outcome)
    }

    #[cfg(feature = "sbi")]
    pub fn validate_sbi(&self, tenant_id: &str, run_id: RunId) -> PtrsResult<SbiValidationReport> {
        with_tenant_transaction(&self.db, tenant_id, |tx| {
            sbi::validate_sbi(tx, run_id, &self.config)
        })
    }

    #[cfg(feature = "sbi")]
    pub fn export_sbi_abns(&self, tenant_id: &str, run_id: RunId) -> PtrsResult<SbiAbnExport> {
        with_tenant_transaction(&self.db, tenant_id, |tx| sbi::export_sbi_abns(tx, run_id))
    }

    /// One upload by id, or the latest applied upload when `upload_id` is
    /// `None`.
    #[cfg(feature = "sbi")]
    pub fn sbi_upload(
        &self,
        tenant_id: &str,
        run_id: RunId,
        upload_id: Option<Uuid>,
    ) -> PtrsResult<SbiUploadDetail> {
        with_tenant_transaction(&self.db, tenant_id, |tx| {
            let upload_id = match upload_id {
                Some(id) => id,
                None => sbi::latest_applied_upload(tx, run_id)?.id,
            };
            sbi::sbi_upload_detail(tx, run_id, upload_id)
        })
    }

    #[cfg(feature = "sbi")]
    pub fn certify_run(&self, tenant_id: &str, run_id: RunId) -> PtrsResult<CertificationOutcome> {
        with_tenant_transaction(&self.db, tenant_id, |tx| {
            certification::certify_run(tx, run_id, &self.config)
        })
    }
}
