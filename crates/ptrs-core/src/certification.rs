use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::PtrsError;
use crate::sbi::validation::{validate_sbi, SbiValidationStatus};
use crate::store::Session;
use crate::tenancy::TenantTransaction;
use crate::types::RunId;
use crate::PtrsResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationOutcome {
    pub run_id: RunId,
    pub sbi_status: SbiValidationStatus,
    pub sbi_upload_id: Option<Uuid>,
    /// Warnings accepted at certification time.
    pub accepted_warnings: u64,
    pub checked_at: DateTime<Utc>,
}

/// Gate in front of certification and submission.
///
/// Runs the SBI validation pass and refuses with
/// [`PtrsError::SubmissionBlocked`] unless it passed, with or without
/// warnings.
pub fn certify_run<S: Session>(
    tx: &mut TenantTransaction<S>,
    run_id: RunId,
    config: &EngineConfig,
) -> PtrsResult<CertificationOutcome> {
    let report = validate_sbi(tx, run_id, config)?;

    if !report.is_submittable() {
        let codes = report.blocker_codes();
        warn!(
            tenant = %tx.tenant_id(),
            run = %run_id,
            blockers = report.counts.blockers,
            "certification refused"
        );
        return Err(PtrsError::SubmissionBlocked { codes });
    }

    info!(
        tenant = %tx.tenant_id(),
        run = %run_id,
        status = ?report.status,
        "run cleared for certification"
    );
    Ok(CertificationOutcome {
        run_id,
        sbi_status: report.status,
        sbi_upload_id: report.sbi_upload_id,
        accepted_warnings: report.counts.warnings,
        checked_at: Utc::now(),
    })
}
