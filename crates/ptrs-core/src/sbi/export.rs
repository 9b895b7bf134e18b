use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::abn::{classify_payee_abn, PayeeAbn};
use crate::error::PtrsError;
use crate::store::{ComplianceRepository, Session};
use crate::tenancy::TenantTransaction;
use crate::types::RunId;
use crate::PtrsResult;

/// Input file for the external SBI determination tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbiAbnExport {
    pub run_id: RunId,
    pub abn_count: u64,
    pub abns: Vec<String>,
    /// Single `ABN` column, one distinct ABN per line, ascending.
    pub csv: String,
}

/// Collects the distinct well-formed payee ABNs of a run's non-excluded
/// stage rows.
pub fn export_sbi_abns<S: Session>(
    tx: &mut TenantTransaction<S>,
    run_id: RunId,
) -> PtrsResult<SbiAbnExport> {
    let tenant = tx.tenant_id().clone();
    let session = tx.session()?;

    if session.find_run(run_id)?.is_none() {
        return Err(PtrsError::RunNotFound(run_id));
    }

    let abns: BTreeSet<String> = session
        .stage_rows(run_id)?
        .into_iter()
        .filter(|row| !row.payload.excluded)
        .filter_map(|row| match classify_payee_abn(row.payload.payee_abn.as_deref()) {
            PayeeAbn::WellFormed(abn) => Some(abn),
            PayeeAbn::Missing | PayeeAbn::Malformed(_) => None,
        })
        .collect();

    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["ABN"])?;
    for abn in &abns {
        wtr.write_record([abn.as_str()])?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PtrsError::SerializationError(e.to_string()))?;
    let csv = String::from_utf8(bytes).map_err(|e| PtrsError::SerializationError(e.to_string()))?;

    info!(tenant = %tenant, run = %run_id, abns = abns.len(), "sbi abn export built");

    Ok(SbiAbnExport {
        run_id,
        abn_count: abns.len() as u64,
        abns: abns.into_iter().collect(),
        csv,
    })
}
