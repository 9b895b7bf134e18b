use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::abn::{classify_payee_abn, PayeeAbn};
use super::outcome::SbiVerdict;
use super::parser::{parse_sbi_csv, ParsedSbiRow};
use crate::config::SbiConfig;
use crate::error::PtrsError;
use crate::store::{
    ComplianceRepository, SbiResult, SbiRowChange, SbiUpload, SbiUploadStatus, SbiUploadSummary,
    Session, StageRowSbiUpdate,
};
use crate::tenancy::TenantTransaction;
use crate::types::RunId;
use crate::PtrsResult;

/// `smallBusinessSource` written onto rows merged from an upload.
pub const SBI_UPLOAD_SOURCE: &str = "SBI_UPLOAD";

#[derive(Debug, Clone, Copy)]
pub struct SbiImportRequest<'a> {
    pub run_id: RunId,
    pub actor_id: &'a str,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbiImportOutcome {
    pub upload_id: Uuid,
    pub run_id: RunId,
    pub status: SbiUploadStatus,
    pub file_name: String,
    pub file_hash: String,
    pub summary: SbiUploadSummary,
}

impl SbiImportOutcome {
    pub fn affected_rows(&self) -> u64 {
        self.summary.affected_rows
    }
}

fn rollup_status(summary: &SbiUploadSummary) -> SbiUploadStatus {
    if summary.unknown_outcome_matches > 0 {
        SbiUploadStatus::Blocked
    } else if summary.missing_abn_stage_rows > 0 || summary.invalid_abn_matches > 0 {
        SbiUploadStatus::AppliedWithWarnings
    } else {
        SbiUploadStatus::Applied
    }
}

fn blocking_reasons(summary: &SbiUploadSummary, unknown: &[&ParsedSbiRow]) -> Vec<String> {
    if summary.unknown_outcome_matches == 0 {
        return Vec::new();
    }
    let mut reasons = vec![format!(
        "{} stage row(s) match SBI results with an unrecognised outcome",
        summary.unknown_outcome_matches
    )];
    reasons.extend(
        unknown
            .iter()
            .map(|r| format!("ABN {} has unrecognised outcome {:?}", r.abn, r.outcome)),
    );
    reasons
}

/// Imports an SBI results file and merges it onto the run's stage rows.
///
/// The file is fully parsed and the run checked before anything is written.
/// The upload, its results, every stage-row update and the audit trail are
/// written through the caller's transaction and stand or fall together.
/// Re-importing the same file changes no small-business flags; rows only have
/// their evidence pointer moved to the new upload.
pub fn import_sbi_results<S: Session>(
    tx: &mut TenantTransaction<S>,
    request: &SbiImportRequest<'_>,
    config: &SbiConfig,
) -> PtrsResult<SbiImportOutcome> {
    if request.actor_id.trim().is_empty() {
        return Err(PtrsError::InvalidInput {
            field: "actor_id".to_string(),
            reason: "Actor is required".to_string(),
        });
    }

    let parsed = parse_sbi_csv(request.bytes, config)?;
    let run_id = request.run_id;
    let tenant_id = tx.tenant_id().clone();
    let session = tx.session()?;

    if session.find_run(run_id)?.is_none() {
        return Err(PtrsError::RunNotFound(run_id));
    }

    let now = Utc::now();
    let upload_id = Uuid::new_v4();
    let mut summary = SbiUploadSummary {
        raw_rows: parsed.raw_row_count,
        parsed_abns: parsed.rows.len() as u64,
        skipped_empty_abn_rows: parsed.skipped_empty_abn_rows,
        invalid_abns: parsed.invalid_abn_count(),
        unknown_outcomes: parsed.unknown_outcome_count(),
        ..SbiUploadSummary::default()
    };

    let upload = SbiUpload {
        id: upload_id,
        tenant_id: tenant_id.clone(),
        run_id,
        file_name: request.file_name.to_string(),
        file_hash: parsed.file_hash.clone(),
        raw_row_count: parsed.raw_row_count,
        parsed_abn_count: parsed.rows.len() as u64,
        status: SbiUploadStatus::Applied,
        summary: summary.clone(),
        uploaded_by: request.actor_id.to_string(),
        applied_by: request.actor_id.to_string(),
        created_at: now,
    };
    session.insert_sbi_upload(&upload)?;

    let results: Vec<SbiResult> = parsed
        .rows
        .iter()
        .map(|row| SbiResult {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            run_id,
            sbi_upload_id: upload_id,
            abn: row.abn.clone(),
            outcome: row.outcome.clone(),
            year: row.year,
            is_valid_abn: row.is_valid_abn(),
        })
        .collect();
    session.insert_sbi_results(&results)?;

    // -- Merge onto stage rows ----------------------------------------------

    let by_abn: HashMap<&str, &ParsedSbiRow> =
        parsed.rows.iter().map(|r| (r.abn.as_str(), r)).collect();
    let mut unknown_matched: Vec<&ParsedSbiRow> = Vec::new();
    let mut changes: Vec<SbiRowChange> = Vec::new();

    for row in session.stage_rows(run_id)? {
        if row.payload.excluded {
            summary.excluded_stage_rows += 1;
            continue;
        }
        let abn = match classify_payee_abn(row.payload.payee_abn.as_deref()) {
            PayeeAbn::Missing => {
                summary.missing_abn_stage_rows += 1;
                continue;
            }
            PayeeAbn::Malformed(_) => {
                summary.malformed_abn_stage_rows += 1;
                continue;
            }
            PayeeAbn::WellFormed(abn) => abn,
        };
        let Some(result) = by_abn.get(abn.as_str()).copied() else {
            summary.unmatched_stage_rows += 1;
            continue;
        };
        summary.matched_stage_rows += 1;

        let expected = match result.verdict {
            SbiVerdict::InvalidAbn => {
                summary.invalid_abn_matches += 1;
                continue;
            }
            SbiVerdict::Unknown => {
                summary.unknown_outcome_matches += 1;
                if !unknown_matched.iter().any(|r| r.abn == result.abn) {
                    unknown_matched.push(result);
                }
                continue;
            }
            SbiVerdict::SmallBusiness => true,
            SbiVerdict::NotSmallBusiness => false,
        };

        let flag_changed = row.payload.is_small_business != Some(expected);
        let evidence_changed = row.payload.small_business_evidence_id != Some(upload_id);
        if !flag_changed && !evidence_changed {
            continue;
        }

        session.update_stage_row_sbi(&StageRowSbiUpdate {
            stage_row_id: row.id,
            is_small_business: expected,
            outcome: result.outcome.clone(),
            source: SBI_UPLOAD_SOURCE.to_string(),
            evidence_id: upload_id,
            checked_at: now,
        })?;

        if flag_changed {
            summary.affected_rows += 1;
            changes.push(SbiRowChange {
                id: Uuid::new_v4(),
                tenant_id: tenant_id.clone(),
                run_id,
                sbi_upload_id: upload_id,
                stage_row_id: row.id,
                row_number: row.row_number,
                abn,
                previous_is_small_business: row.payload.is_small_business,
                new_is_small_business: expected,
                previous_evidence_id: row.payload.small_business_evidence_id,
                new_evidence_id: upload_id,
                outcome: result.outcome.clone(),
                changed_by: request.actor_id.to_string(),
                changed_at: now,
            });
        } else {
            summary.evidence_refreshed_rows += 1;
        }
    }

    session.insert_sbi_row_changes(&changes)?;

    summary.blocking_reasons = blocking_reasons(&summary, &unknown_matched);
    let status = rollup_status(&summary);
    session.finalize_sbi_upload(upload_id, status, &summary)?;

    if status == SbiUploadStatus::Blocked {
        warn!(
            tenant = %tenant_id,
            run = %run_id,
            upload = %upload_id,
            unknown = summary.unknown_outcome_matches,
            "sbi import blocked by unrecognised outcomes"
        );
    }
    info!(
        tenant = %tenant_id,
        run = %run_id,
        upload = %upload_id,
        status = ?status,
        affected = summary.affected_rows,
        "sbi results imported"
    );

    Ok(SbiImportOutcome {
        upload_id,
        run_id,
        status,
        file_name: request.file_name.to_string(),
        file_hash: parsed.file_hash,
        summary,
    })
}
