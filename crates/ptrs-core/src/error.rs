use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PtrsError {
    #[error("Invalid tenant id: {0:?} must be exactly 10 characters from [A-Za-z0-9_-]")]
    InvalidTenantId(String),

    #[error("Tenant context setup failed: {0}")]
    TenantContextSetupFailed(String),

    #[error("Reporting run {0} not found for this tenant")]
    RunNotFound(Uuid),

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Uploaded file is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error("Missing required columns: {}", missing.join(", "))]
    MissingRequiredColumns { missing: Vec<String> },

    #[error("No ABNs could be parsed from {raw_rows} data rows")]
    NoAbnsParsed { raw_rows: u64 },

    #[error("No SBI upload{} found for run {run_id}", upload_id.map(|id| format!(" {}", id)).unwrap_or_default())]
    UploadNotFound {
        run_id: Uuid,
        upload_id: Option<Uuid>,
    },

    #[error("Submission blocked by {} SBI validation issue(s): {}", codes.len(), codes.join(", "))]
    SubmissionBlocked { codes: Vec<String> },

    #[error("Transaction is already committed or rolled back")]
    TransactionClosed,

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PtrsError {
    /// Stable machine-readable code, safe to return to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            PtrsError::InvalidTenantId(_) => "INVALID_TENANT_ID",
            PtrsError::TenantContextSetupFailed(_) => "TENANT_CONTEXT_SETUP_FAILED",
            PtrsError::RunNotFound(_) => "RUN_NOT_FOUND",
            PtrsError::EmptyUpload => "EMPTY_UPLOAD",
            PtrsError::InvalidEncoding(_) => "INVALID_ENCODING",
            PtrsError::MissingRequiredColumns { .. } => "MISSING_REQUIRED_COLUMNS",
            PtrsError::NoAbnsParsed { .. } => "NO_ABNS_PARSED",
            PtrsError::UploadNotFound { .. } => "UPLOAD_NOT_FOUND",
            PtrsError::SubmissionBlocked { .. } => "SUBMISSION_BLOCKED",
            PtrsError::TransactionClosed => "TRANSACTION_CLOSED",
            PtrsError::InvalidInput { .. } => "INVALID_INPUT",
            PtrsError::Csv(_) => "CSV_ERROR",
            PtrsError::Store(_) => "STORE_ERROR",
            PtrsError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for PtrsError {
    fn from(e: serde_json::Error) -> Self {
        PtrsError::SerializationError(e.to_string())
    }
}
