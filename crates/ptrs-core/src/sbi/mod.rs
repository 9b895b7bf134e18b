//! Small Business Identification: parsing SBI result files, merging them onto
//! stage rows, validating a run's coverage and producing the ABN export the
//! external SBI tool consumes.

pub mod abn;
pub mod export;
pub mod import;
pub mod outcome;
pub mod parser;
pub mod uploads;
pub mod validation;

pub use export::{export_sbi_abns, SbiAbnExport};
pub use import::{import_sbi_results, SbiImportOutcome, SbiImportRequest};
pub use outcome::{OutcomeClassifier, SbiVerdict};
pub use uploads::{latest_applied_upload, sbi_upload_detail, SbiUploadDetail};
pub use validation::{
    validate_sbi, SbiIssue, SbiIssueCode, SbiValidationCounts, SbiValidationReport,
    SbiValidationStatus,
};
