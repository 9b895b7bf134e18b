use clap::Args;
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

use ptrs_core::config::EngineConfig;

use super::dataset::{self, RunScope};
use crate::input;

/// Arguments for importing an SBI results file
#[derive(Args)]
pub struct SbiImportArgs {
    #[command(flatten)]
    pub scope: RunScope,

    /// Path to the SBI results CSV
    #[arg(long)]
    pub file: String,

    /// User recorded as uploader and approver
    #[arg(long)]
    pub actor: String,
}

/// Arguments for SBI validation
#[derive(Args)]
pub struct SbiValidateArgs {
    #[command(flatten)]
    pub scope: RunScope,

    /// Exit with an error when the run is blocked
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

/// Arguments for the SBI ABN export
#[derive(Args)]
pub struct SbiExportArgs {
    #[command(flatten)]
    pub scope: RunScope,

    /// Write the CSV to this path instead of embedding it in the output
    #[arg(long)]
    pub out: Option<String>,
}

/// Arguments for looking up an SBI upload
#[derive(Args)]
pub struct SbiUploadArgs {
    #[command(flatten)]
    pub scope: RunScope,

    /// Upload id (defaults to the latest applied upload)
    #[arg(long)]
    pub upload: Option<Uuid>,
}

/// Arguments for the certification gate
#[derive(Args)]
pub struct CertifyArgs {
    #[command(flatten)]
    pub scope: RunScope,
}

pub fn run_import(
    args: SbiImportArgs,
    config: EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let bytes = input::file::read_bytes(&args.file)?;
    let file_name = Path::new(&args.file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(args.file.as_str())
        .to_string();

    let service = dataset::open_service(&args.scope, config)?;
    let outcome = service.import_sbi_results(
        &args.scope.tenant,
        args.scope.run,
        &args.actor,
        &bytes,
        &file_name,
    )?;
    dataset::persist(&args.scope, &service)?;
    Ok(serde_json::to_value(outcome)?)
}

pub fn run_validate(
    args: SbiValidateArgs,
    config: EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let service = dataset::open_service(&args.scope, config)?;
    let report = service.validate_sbi(&args.scope.tenant, args.scope.run)?;
    if args.strict && !report.is_submittable() {
        return Err(format!(
            "SBI validation blocked: {}",
            report.blocker_codes().join(", ")
        )
        .into());
    }
    Ok(serde_json::to_value(report)?)
}

pub fn run_export(
    args: SbiExportArgs,
    config: EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let service = dataset::open_service(&args.scope, config)?;
    let export = service.export_sbi_abns(&args.scope.tenant, args.scope.run)?;
    if let Some(ref path) = args.out {
        input::file::write_text(path, &export.csv)?;
        return Ok(serde_json::json!({
            "run_id": export.run_id,
            "abn_count": export.abn_count,
            "path": path,
        }));
    }
    Ok(serde_json::to_value(export)?)
}

pub fn run_upload(
    args: SbiUploadArgs,
    config: EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let service = dataset::open_service(&args.scope, config)?;
    let detail = service.sbi_upload(&args.scope.tenant, args.scope.run, args.upload)?;
    Ok(serde_json::to_value(detail)?)
}

pub fn run_certify(
    args: CertifyArgs,
    config: EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let service = dataset::open_service(&args.scope, config)?;
    let outcome = service.certify_run(&args.scope.tenant, args.scope.run)?;
    Ok(serde_json::to_value(outcome)?)
}
