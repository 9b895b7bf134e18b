use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PtrsError;
use crate::store::{ComplianceRepository, SbiResult, SbiRowChange, SbiUpload, Session};
use crate::tenancy::TenantTransaction;
use crate::types::RunId;
use crate::PtrsResult;

/// An upload together with the ABNs it carried and the rows it changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbiUploadDetail {
    pub upload: SbiUpload,
    pub results: Vec<SbiResult>,
    pub row_changes: Vec<SbiRowChange>,
}

/// Looks up one upload of a run. An upload belonging to another run, or one
/// not visible to the bound tenant, is reported as not found.
pub fn sbi_upload_detail<S: Session>(
    tx: &mut TenantTransaction<S>,
    run_id: RunId,
    upload_id: Uuid,
) -> PtrsResult<SbiUploadDetail> {
    let session = tx.session()?;

    if session.find_run(run_id)?.is_none() {
        return Err(PtrsError::RunNotFound(run_id));
    }
    let upload = session
        .find_sbi_upload(upload_id)?
        .filter(|u| u.run_id == run_id)
        .ok_or(PtrsError::UploadNotFound {
            run_id,
            upload_id: Some(upload_id),
        })?;

    let results = session.sbi_results(upload.id)?;
    let row_changes = session.sbi_row_changes(upload.id)?;
    Ok(SbiUploadDetail {
        upload,
        results,
        row_changes,
    })
}

/// The upload validation would check the run against.
pub fn latest_applied_upload<S: Session>(
    tx: &mut TenantTransaction<S>,
    run_id: RunId,
) -> PtrsResult<SbiUpload> {
    let session = tx.session()?;

    if session.find_run(run_id)?.is_none() {
        return Err(PtrsError::RunNotFound(run_id));
    }
    session
        .latest_applied_sbi_upload(run_id)?
        .ok_or(PtrsError::UploadNotFound {
            run_id,
            upload_id: None,
        })
}
