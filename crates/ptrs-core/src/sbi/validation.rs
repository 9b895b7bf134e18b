use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::abn::{classify_payee_abn, PayeeAbn};
use super::outcome::{OutcomeClassifier, SbiVerdict};
use crate::config::EngineConfig;
use crate::error::PtrsError;
use crate::store::{ComplianceRepository, SbiResult, Session};
use crate::tenancy::TenantTransaction;
use crate::types::RunId;
use crate::PtrsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SbiValidationStatus {
    Passed,
    PassedWithWarnings,
    Blocked,
}

impl SbiValidationStatus {
    /// Certification may proceed only from these states.
    pub fn is_submittable(self) -> bool {
        matches!(
            self,
            SbiValidationStatus::Passed | SbiValidationStatus::PassedWithWarnings
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SbiIssueCode {
    SbiNotApplied,
    SbiMissingAbn,
    SbiMalformedAbn,
    SbiInvalidAbn,
    SbiAbnNotInFile,
    SbiUnknownOutcome,
    SbiEvidenceMismatch,
    SbiFlagMismatch,
}

impl SbiIssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SbiIssueCode::SbiNotApplied => "SBI_NOT_APPLIED",
            SbiIssueCode::SbiMissingAbn => "SBI_MISSING_ABN",
            SbiIssueCode::SbiMalformedAbn => "SBI_MALFORMED_ABN",
            SbiIssueCode::SbiInvalidAbn => "SBI_INVALID_ABN",
            SbiIssueCode::SbiAbnNotInFile => "SBI_ABN_NOT_IN_FILE",
            SbiIssueCode::SbiUnknownOutcome => "SBI_UNKNOWN_OUTCOME",
            SbiIssueCode::SbiEvidenceMismatch => "SBI_EVIDENCE_MISMATCH",
            SbiIssueCode::SbiFlagMismatch => "SBI_FLAG_MISMATCH",
        }
    }

    /// Warnings are surfaced but do not block certification.
    pub fn is_warning(self) -> bool {
        matches!(self, SbiIssueCode::SbiAbnNotInFile)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbiIssue {
    pub code: SbiIssueCode,
    pub stage_row_id: Option<Uuid>,
    pub row_number: Option<u32>,
    pub abn: Option<String>,
    pub message: String,
}

/// True totals; unaffected by the issue-list cap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbiValidationCounts {
    pub stage_rows: u64,
    pub excluded: u64,
    pub compliant: u64,
    pub missing_abn: u64,
    pub malformed_abn: u64,
    pub invalid_abn: u64,
    pub abn_not_in_file: u64,
    pub unknown_outcome: u64,
    pub evidence_mismatch: u64,
    pub flag_mismatch: u64,
    pub blockers: u64,
    pub warnings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbiValidationReport {
    pub run_id: RunId,
    pub status: SbiValidationStatus,
    /// Upload the rows were checked against, if any has been applied.
    pub sbi_upload_id: Option<Uuid>,
    pub blockers: Vec<SbiIssue>,
    pub warnings: Vec<SbiIssue>,
    pub counts: SbiValidationCounts,
    /// Set when either issue list was cut at the configured cap.
    pub truncated: bool,
}

impl SbiValidationReport {
    pub fn is_submittable(&self) -> bool {
        self.status.is_submittable()
    }

    /// Distinct blocker codes in code order.
    pub fn blocker_codes(&self) -> Vec<String> {
        let mut codes: Vec<SbiIssueCode> = self.blockers.iter().map(|i| i.code).collect();
        codes.sort();
        codes.dedup();
        codes.into_iter().map(|c| c.as_str().to_string()).collect()
    }
}

struct IssueCollector {
    cap: usize,
    blockers: Vec<SbiIssue>,
    warnings: Vec<SbiIssue>,
    truncated: bool,
}

impl IssueCollector {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            blockers: Vec::new(),
            warnings: Vec::new(),
            truncated: false,
        }
    }

    fn push(&mut self, issue: SbiIssue) {
        let list = if issue.code.is_warning() {
            &mut self.warnings
        } else {
            &mut self.blockers
        };
        if list.len() < self.cap {
            list.push(issue);
        } else {
            self.truncated = true;
        }
    }
}

fn roll_up(counts: &SbiValidationCounts) -> SbiValidationStatus {
    if counts.blockers > 0 {
        SbiValidationStatus::Blocked
    } else if counts.warnings > 0 {
        SbiValidationStatus::PassedWithWarnings
    } else {
        SbiValidationStatus::Passed
    }
}

/// Checks every stage row of a run against the latest applied SBI upload.
///
/// Read-only. Rows are walked in ascending row number and each lands in the
/// first matching bucket, so issue lists are reproducible for the same data.
/// Without an applied upload the run is reported blocked without reading any
/// stage row.
pub fn validate_sbi<S: Session>(
    tx: &mut TenantTransaction<S>,
    run_id: RunId,
    config: &EngineConfig,
) -> PtrsResult<SbiValidationReport> {
    let tenant = tx.tenant_id().clone();
    let session = tx.session()?;

    if session.find_run(run_id)?.is_none() {
        return Err(PtrsError::RunNotFound(run_id));
    }

    let Some(upload) = session.latest_applied_sbi_upload(run_id)? else {
        info!(tenant = %tenant, run = %run_id, "sbi validation blocked, no applied upload");
        return Ok(SbiValidationReport {
            run_id,
            status: SbiValidationStatus::Blocked,
            sbi_upload_id: None,
            blockers: vec![SbiIssue {
                code: SbiIssueCode::SbiNotApplied,
                stage_row_id: None,
                row_number: None,
                abn: None,
                message: "SBI results have never been applied to this run".to_string(),
            }],
            warnings: Vec::new(),
            counts: SbiValidationCounts {
                blockers: 1,
                ..SbiValidationCounts::default()
            },
            truncated: false,
        });
    };

    let classifier = OutcomeClassifier::new(&config.sbi);
    let results = session.sbi_results(upload.id)?;
    let by_abn: HashMap<&str, (&SbiResult, SbiVerdict)> = results
        .iter()
        .map(|r| (r.abn.as_str(), (r, classifier.classify(&r.outcome))))
        .collect();
    debug!(run = %run_id, upload = %upload.id, results = by_abn.len(), "sbi result map built");

    let mut counts = SbiValidationCounts::default();
    let mut issues = IssueCollector::new(config.validation.max_issues);

    for row in session.stage_rows(run_id)? {
        counts.stage_rows += 1;
        if row.payload.excluded {
            counts.excluded += 1;
            continue;
        }

        let issue = |code: SbiIssueCode, abn: Option<String>, message: String| SbiIssue {
            code,
            stage_row_id: Some(row.id),
            row_number: Some(row.row_number),
            abn,
            message,
        };

        let abn = match classify_payee_abn(row.payload.payee_abn.as_deref()) {
            PayeeAbn::Missing => {
                counts.missing_abn += 1;
                issues.push(issue(
                    SbiIssueCode::SbiMissingAbn,
                    None,
                    format!("Row {} has no payee ABN", row.row_number),
                ));
                continue;
            }
            PayeeAbn::Malformed(abn) => {
                counts.malformed_abn += 1;
                issues.push(issue(
                    SbiIssueCode::SbiMalformedAbn,
                    Some(abn.clone()),
                    format!("Row {} payee ABN {:?} is not 11 digits", row.row_number, abn),
                ));
                continue;
            }
            PayeeAbn::WellFormed(abn) => abn,
        };

        let matched = by_abn.get(abn.as_str()).copied();
        if let Some((result, verdict)) = matched {
            if !result.is_valid_abn || verdict == SbiVerdict::InvalidAbn {
                counts.invalid_abn += 1;
                issues.push(issue(
                    SbiIssueCode::SbiInvalidAbn,
                    Some(abn.clone()),
                    format!(
                        "Row {} ABN {} was not recognised as a valid ABN by SBI",
                        row.row_number, abn
                    ),
                ));
                continue;
            }
        }
        let Some((result, verdict)) = matched else {
            counts.abn_not_in_file += 1;
            issues.push(issue(
                SbiIssueCode::SbiAbnNotInFile,
                Some(abn.clone()),
                format!(
                    "Row {} ABN {} is not in the applied SBI file",
                    row.row_number, abn
                ),
            ));
            continue;
        };

        let Some(expected) = verdict.expected_small_business() else {
            counts.unknown_outcome += 1;
            issues.push(issue(
                SbiIssueCode::SbiUnknownOutcome,
                Some(abn.clone()),
                format!(
                    "Row {} ABN {} has unrecognised SBI outcome {:?}",
                    row.row_number, abn, result.outcome
                ),
            ));
            continue;
        };

        if row.payload.small_business_evidence_id != Some(upload.id) {
            counts.evidence_mismatch += 1;
            issues.push(issue(
                SbiIssueCode::SbiEvidenceMismatch,
                Some(abn.clone()),
                format!(
                    "Row {} small-business evidence does not reference upload {}",
                    row.row_number, upload.id
                ),
            ));
            continue;
        }

        if row.payload.is_small_business != Some(expected) {
            counts.flag_mismatch += 1;
            issues.push(issue(
                SbiIssueCode::SbiFlagMismatch,
                Some(abn.clone()),
                format!(
                    "Row {} is marked small business = {:?}, SBI says {}",
                    row.row_number, row.payload.is_small_business, expected
                ),
            ));
            continue;
        }

        counts.compliant += 1;
    }

    counts.warnings = counts.abn_not_in_file;
    counts.blockers = counts.missing_abn
        + counts.malformed_abn
        + counts.invalid_abn
        + counts.unknown_outcome
        + counts.evidence_mismatch
        + counts.flag_mismatch;
    let status = roll_up(&counts);

    info!(
        tenant = %tenant,
        run = %run_id,
        upload = %upload.id,
        status = ?status,
        blockers = counts.blockers,
        warnings = counts.warnings,
        "sbi validation complete"
    );

    Ok(SbiValidationReport {
        run_id,
        status,
        sbi_upload_id: Some(upload.id),
        blockers: issues.blockers,
        warnings: issues.warnings,
        counts,
        truncated: issues.truncated,
    })
}
